//! Real-time audio mixing and playback engine.
//!
//! polymix mixes any number of independently-decoded PCM [`Source`]s into a
//! single [`OutputStream`] delivered to the system audio device on a
//! real-time callback. Control operations — `play`, `stop`, volume,
//! `wait`-for-completion, finish notifications — are thread-safe and never
//! block or allocate on the audio thread.
//!
//! # Example
//!
//! ```no_run
//! use polymix::{OutputConfig, OutputStream, Source};
//! use std::sync::Arc;
//!
//! fn main() -> polymix::Result<()> {
//!     let config = OutputConfig::default();
//!     let stream = OutputStream::new(config.clone())?;
//!
//!     let chime = Arc::new(Source::from_file("chime.wav", &config)?);
//!     chime.set_finish_callback(|| println!("finished playing audio"));
//!
//!     stream.play(&chime)?;
//!     chime.wait();
//!
//!     stream.stop_stream()?;
//!     Ok(())
//! }
//! ```

pub mod audio_data;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
mod mixer;
pub mod source;
pub mod stream;

pub use audio_data::AudioData;
pub use config::OutputConfig;
pub use decoder::{Decoder, PcmDecoder};
pub use error::{PolymixError, Result};
pub use events::StreamEvent;
pub use source::{FinishCallback, Source};
pub use stream::OutputStream;
