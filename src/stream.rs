//! The public output stream: cpal device binding plus the thread-safe
//! control surface over the render core.

use crate::config::OutputConfig;
use crate::error::{PolymixError, Result};
use crate::events::StreamEvent;
use crate::mixer::{Renderer, Shared};
use crate::source::Source;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Events raised on the real-time thread are dropped once this many are
/// queued undrained; the channel must never block the callback.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// `cpal::Stream` is `!Send`, but its control entry points (`play`/`pause`)
/// take `&self` and are internally synchronized by the backends cpal
/// supports for output. Access from this crate is additionally serialized
/// through the backend's running flag.
struct StreamHolder(cpal::Stream);

unsafe impl Send for StreamHolder {}
unsafe impl Sync for StreamHolder {}

struct CpalBackend {
    stream: StreamHolder,
    running: AtomicBool,
}

impl CpalBackend {
    /// Start the device if it is stopped. The running check and the start
    /// are one atomic operation, so a `play` racing a `stop_stream` cannot
    /// observe a half-toggled device.
    fn start(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(()); // already running
        }

        if let Err(e) = self.stream.0.play() {
            self.running.store(false, Ordering::Release);
            return Err(PolymixError::DeviceStart(format!(
                "failed to start device: {}",
                e
            )));
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(()); // already stopped
        }

        self.stream.0.pause().map_err(|e| {
            PolymixError::DeviceStart(format!("failed to stop device: {}", e))
        })
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// A playback stream mixing zero or more [`Source`]s into one output device.
///
/// Construction binds the default output device with a fixed format; the
/// device callback then runs on its own real-time thread until stopped.
/// All control operations are safe to call from any thread.
pub struct OutputStream {
    config: OutputConfig,
    shared: Arc<Shared>,
    backend: CpalBackend,
    events: Receiver<StreamEvent>,
}

impl OutputStream {
    /// Bind the default output device with the given configuration.
    ///
    /// Fails with [`PolymixError::DeviceInit`] when no output device is
    /// available or the device rejects the configuration. The device is
    /// created stopped; `play` or `start` sets it running.
    pub fn new(config: OutputConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            PolymixError::DeviceInit("no default output device available".into())
        })?;

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.frames_per_buffer() as u32),
        };

        let (event_sender, event_receiver) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared::new(event_sender));
        let renderer = Renderer::new(shared.clone(), config.channels, config.frames_per_buffer());

        let default_config = device.default_output_config().map_err(|e| {
            PolymixError::DeviceInit(format!("failed to query device config: {}", e))
        })?;

        let max_frames = config.frames_per_buffer();
        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &stream_config, renderer, max_frames)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &stream_config, renderer, max_frames)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &stream_config, renderer, max_frames)?
            }
            other => {
                return Err(PolymixError::DeviceInit(format!(
                    "unsupported device sample format: {:?}",
                    other
                )));
            }
        };

        Ok(Self {
            config,
            shared,
            backend: CpalBackend {
                stream: StreamHolder(stream),
                running: AtomicBool::new(false),
            },
            events: event_receiver,
        })
    }

    /// Rewind `source`, add it to the active set, and ensure the device is
    /// running. Mixing is purely additive; any number of sources may be
    /// active at once.
    ///
    /// The stream keeps its own `Arc` clone while the source is active, so
    /// the caller may drop theirs; `wait` on the source still works.
    pub fn play(&self, source: &Arc<Source>) -> Result<()> {
        if source.channels() != self.config.channels
            || source.sample_rate() != self.config.sample_rate
        {
            return Err(PolymixError::AudioFormat(format!(
                "source format {} Hz/{} ch does not match stream format {} Hz/{} ch",
                source.sample_rate(),
                source.channels(),
                self.config.sample_rate,
                self.config.channels
            )));
        }

        log::debug!("play source {}", source.id());
        self.shared.activate(source);
        self.backend.start()
    }

    /// Start the device unconditionally if stopped, with no source
    /// requirement; useful to warm up the stream.
    pub fn start(&self) -> Result<()> {
        self.shared.mark_live();
        self.backend.start()
    }

    /// Drop every active source without invoking their finish callbacks and
    /// without stopping the device: abrupt silence, not graceful
    /// completion. Per-source and stream-level waiters are woken.
    pub fn stop_audios(&self) {
        log::debug!("dropping all active sources");
        self.shared.drop_all();
    }

    /// `stop_audios` followed by a synchronous device stop. After this
    /// returns no further callbacks will run; a subsequent `play` restarts
    /// the device cleanly.
    pub fn stop_stream(&self) -> Result<()> {
        self.shared.drop_all();
        self.backend.stop()?;
        log::debug!("device stopped");
        self.shared.emit(StreamEvent::StreamStopped);
        Ok(())
    }

    /// Set the linear multiplier applied to every mixed sample. Wait-free;
    /// takes effect on the next callback. Values above 1.0 are accepted but
    /// may clip when sources overlap.
    pub fn set_volume(&self, volume: f32) {
        self.shared.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    /// Block until the active-source set is empty. Returns immediately if
    /// the stream is already silent.
    pub fn wait(&self) {
        self.shared.wait();
    }

    pub fn is_silent(&self) -> bool {
        self.shared.is_silent()
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_running()
    }

    /// Best-effort lifecycle notifications; see [`StreamEvent`].
    pub fn events(&self) -> &Receiver<StreamEvent> {
        &self.events
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut renderer: Renderer,
        max_frames: usize,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        // Staging buffer for sample-format conversion, pre-sized so the
        // callback does not allocate.
        let mut staging = vec![0.0f32; max_frames.max(1) * config.channels as usize];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if staging.len() < data.len() {
                        staging.resize(data.len(), 0.0);
                    }
                    let staging = &mut staging[..data.len()];
                    renderer.render(staging);
                    for (out, &sample) in data.iter_mut().zip(staging.iter()) {
                        *out = T::from_sample(sample);
                    }
                },
                move |err| {
                    log::error!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| {
                PolymixError::DeviceInit(format!("failed to build stream: {}", e))
            })?;

        Ok(stream)
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let _ = self.backend.stop();
    }
}
