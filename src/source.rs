//! A single playable audio source and its completion protocol.

use crate::audio_data::{load_audio_bytes, load_audio_file};
use crate::config::OutputConfig;
use crate::decoder::{Decoder, PcmDecoder};
use crate::error::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use uuid::Uuid;

/// One-shot notification fired on the real-time thread when a source
/// finishes a play cycle. Must be effectively non-blocking and must not
/// call back into the stream's control operations.
pub type FinishCallback = Box<dyn FnMut() + Send>;

/// One decodable audio stream plus its playback/completion state.
///
/// A `Source` is created by the application, handed to an
/// [`OutputStream`](crate::stream::OutputStream) via `play`, and becomes
/// silent again once the stream's callback has consumed it (or a stop was
/// requested). It can be replayed any number of times; each `play` starts a
/// fresh cycle from the first frame.
///
/// The same `Source` must not be active on two streams at once.
pub struct Source {
    id: Uuid,
    channels: u16,
    sample_rate: u32,
    /// Locked only by the real-time callback (`pull`) and by `rewind`,
    /// which the stream calls strictly before activation — the lock is
    /// never contended on the audio thread.
    decoder: Mutex<Box<dyn Decoder>>,
    /// Silence flag and its condvar are always updated together under this
    /// lock, so `wait` cannot miss a wakeup.
    silence: Mutex<bool>,
    finished: Condvar,
    stop_requested: AtomicBool,
    finish_callback: Mutex<Option<FinishCallback>>,
}

impl Source {
    /// Decode a file into memory and wrap it as a playable source.
    ///
    /// Fails with [`PolymixError::DecodeInit`](crate::PolymixError::DecodeInit)
    /// on an unreadable path or malformed contents; no partially-constructed
    /// source is ever exposed.
    pub fn from_file(path: impl AsRef<Path>, config: &OutputConfig) -> Result<Self> {
        let data = load_audio_file(path, config)?;
        Ok(Self::from_decoder(Box::new(PcmDecoder::new(data))))
    }

    /// Decode an in-memory encoded buffer (e.g. an embedded asset) into a
    /// playable source. Does not take ownership of `bytes`.
    pub fn from_bytes(bytes: &[u8], config: &OutputConfig) -> Result<Self> {
        let data = load_audio_bytes(bytes, config)?;
        Ok(Self::from_decoder(Box::new(PcmDecoder::new(data))))
    }

    /// Wrap an arbitrary [`Decoder`] implementation.
    pub fn from_decoder(decoder: Box<dyn Decoder>) -> Self {
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        Self {
            id: Uuid::new_v4(),
            channels,
            sample_rate,
            decoder: Mutex::new(decoder),
            silence: Mutex::new(true),
            finished: Condvar::new(),
            stop_requested: AtomicBool::new(false),
            finish_callback: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Non-blocking snapshot of "not silent".
    pub fn is_playing(&self) -> bool {
        self.silence.lock().map(|silence| !*silence).unwrap_or(false)
    }

    /// Block the calling thread until this source is silent. Returns
    /// immediately if it already is. Must not be called from a finish
    /// callback (it runs on the real-time thread).
    pub fn wait(&self) {
        let Ok(mut silence) = self.silence.lock() else {
            return;
        };
        while !*silence {
            silence = match self.finished.wait(silence) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }

    /// Request that the next `pull` treat this source as exhausted,
    /// regardless of remaining decodable data. Non-blocking; the silence
    /// transition and finish callback happen on the audio thread during the
    /// next callback (bounded by the stream's buffer duration).
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Register a callback invoked exactly once per play-to-completion
    /// cycle, from the real-time thread. It must not block and must not
    /// re-enter the engine's control operations.
    pub fn set_finish_callback<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        if let Ok(mut slot) = self.finish_callback.lock() {
            *slot = Some(Box::new(callback));
        }
    }

    /// Reposition the decoder to the first frame and clear any pending stop
    /// request. Called by the stream immediately before activation, never
    /// concurrently with an in-flight `pull`.
    pub(crate) fn rewind(&self) {
        if let Ok(mut decoder) = self.decoder.lock() {
            decoder.seek_to_start();
        }
        self.stop_requested.store(false, Ordering::Release);
    }

    /// Mark the start of a play cycle.
    pub(crate) fn begin_play(&self) {
        if let Ok(mut silence) = self.silence.lock() {
            *silence = false;
        }
    }

    /// Pull up to `frame_count` frames of interleaved audio into `buffer`.
    ///
    /// Runs on the real-time callback thread: no blocking, no allocation,
    /// no panics. Producing fewer frames than requested (or a pending stop)
    /// ends the play cycle: the source transitions to silent, the finish
    /// callback fires, and waiters are woken.
    pub(crate) fn pull(&self, buffer: &mut [f32], frame_count: usize) -> usize {
        let frames = if self.stop_requested.load(Ordering::Acquire) {
            0
        } else {
            match self.decoder.lock() {
                Ok(mut decoder) => decoder.read_frames(buffer, frame_count),
                Err(_) => 0,
            }
        };

        if frames < frame_count {
            self.finish_cycle(true);
        }
        frames
    }

    /// Force the source silent without invoking its finish callback.
    /// Used for abrupt stream-level stops: waiters are still woken, but an
    /// abrupt stop is not a graceful completion notification.
    pub(crate) fn force_silent(&self) {
        self.finish_cycle(false);
    }

    fn finish_cycle(&self, invoke_callback: bool) {
        let was_playing = {
            let Ok(mut silence) = self.silence.lock() else {
                return;
            };
            let was_playing = !*silence;
            *silence = true;
            was_playing
        };

        // Transition happens at most once per cycle; everything below is
        // skipped when the source was already silent.
        if !was_playing {
            return;
        }

        self.finished.notify_all();

        if invoke_callback {
            if let Ok(mut callback) = self.finish_callback.lock() {
                if let Some(callback) = callback.as_mut() {
                    callback();
                }
            }
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("playing", &self.is_playing())
            .finish()
    }
}
