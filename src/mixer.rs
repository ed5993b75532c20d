//! The render core: shared control state plus the routine that runs inside
//! the real-time device callback.
//!
//! One mutex guards the active-source list together with the stream-level
//! silence flag, so `play`, the stop operations, and the callback's eviction
//! pass can never disagree about a slot. The callback holds it for the
//! duration of one buffer; every control-side critical section is a handful
//! of instructions, so the wait is bounded.

use crate::events::StreamEvent;
use crate::source::Source;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

pub(crate) struct MixerState {
    /// Insertion order = mixing order. Mutated by `play` (append, control
    /// thread) and by `render` / `drop_all` (removal).
    active: Vec<Arc<Source>>,
    silent: bool,
}

/// Control state shared between the stream handle and the render callback.
pub(crate) struct Shared {
    state: Mutex<MixerState>,
    finished: Condvar,
    /// Linear volume as f32 bits; wait-free to read and write.
    volume: AtomicU32,
    events: Sender<StreamEvent>,
}

impl Shared {
    pub(crate) fn new(events: Sender<StreamEvent>) -> Self {
        Self {
            state: Mutex::new(MixerState {
                active: Vec::new(),
                silent: true,
            }),
            finished: Condvar::new(),
            volume: AtomicU32::new(1.0f32.to_bits()),
            events,
        }
    }

    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Best-effort event delivery; never blocks, drops on a full channel.
    pub(crate) fn emit(&self, event: StreamEvent) {
        let _ = self.events.try_send(event);
    }

    /// Rewind `source` and append it to the active set. The silence flag
    /// flips under the same lock, so a concurrent `wait` observing
    /// `silent == false` is guaranteed a later notification.
    pub(crate) fn activate(&self, source: &Arc<Source>) {
        source.rewind();
        source.begin_play();
        if let Ok(mut state) = self.state.lock() {
            state.silent = false;
            state.active.push(Arc::clone(source));
        }
        self.emit(StreamEvent::SourceStarted {
            source_id: source.id(),
        });
    }

    /// Mark the stream live with no source requirement (warm-up). The next
    /// callback with an empty active set flips it back to silent.
    pub(crate) fn mark_live(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.silent = false;
        }
    }

    /// Drop every active source without invoking finish callbacks and mark
    /// the stream silent. Runs synchronously under the shared lock, so it
    /// cannot interleave with a pull on the same source; per-source waiters
    /// are still woken.
    pub(crate) fn drop_all(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        for source in state.active.drain(..) {
            source.force_silent();
            self.emit(StreamEvent::SourceDropped {
                source_id: source.id(),
            });
        }
        let was_silent = state.silent;
        state.silent = true;
        drop(state);

        if !was_silent {
            self.finished.notify_all();
            self.emit(StreamEvent::StreamSilent);
        }
    }

    /// Block until the active set is empty and the stream is silent.
    pub(crate) fn wait(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        while !state.silent {
            state = match self.finished.wait(state) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }

    pub(crate) fn is_silent(&self) -> bool {
        self.state.lock().map(|state| state.silent).unwrap_or(true)
    }

    #[cfg(test)]
    pub(crate) fn active_len(&self) -> usize {
        self.state.lock().map(|state| state.active.len()).unwrap_or(0)
    }
}

/// Owns the scratch buffer and runs inside the device callback.
///
/// Everything here executes on the real-time thread: the scratch buffer is
/// pre-sized to the largest frame count the device will request, and the
/// only lock taken is the shared control mutex described above.
pub(crate) struct Renderer {
    shared: Arc<Shared>,
    scratch: Vec<f32>,
    channels: usize,
}

impl Renderer {
    pub(crate) fn new(shared: Arc<Shared>, channels: u16, max_frames: usize) -> Self {
        let channels = channels as usize;
        Self {
            shared,
            scratch: vec![0.0; max_frames.max(1) * channels],
            channels,
        }
    }

    /// Fill one device buffer: zero the output, accumulate
    /// `volume * sample` from every active source, evict finished sources,
    /// and detect stream-level completion.
    pub(crate) fn render(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        let frame_count = output.len() / self.channels;
        let needed = frame_count * self.channels;
        if self.scratch.len() < needed {
            // Devices may exceed the configured buffer once, e.g. after a
            // reconfiguration; grow here rather than glitch.
            log::warn!(
                "callback requested {} frames, above the pre-sized maximum",
                frame_count
            );
            self.scratch.resize(needed, 0.0);
        }

        let volume = self.shared.volume();

        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };

        for source in &state.active {
            let frames = source.pull(&mut self.scratch[..needed], frame_count);
            let produced = frames * self.channels;
            for (out, &sample) in output[..produced].iter_mut().zip(&self.scratch[..produced]) {
                *out += volume * sample;
            }
        }

        state.active.retain(|source| {
            if source.is_playing() {
                true
            } else {
                self.shared.emit(StreamEvent::SourceCompleted {
                    source_id: source.id(),
                });
                false
            }
        });

        if state.active.is_empty() && !state.silent {
            state.silent = true;
            self.shared.finished.notify_all();
            self.shared.emit(StreamEvent::StreamSilent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::AudioData;
    use crate::decoder::PcmDecoder;
    use crossbeam_channel::Receiver;

    fn harness(channels: u16, max_frames: usize) -> (Arc<Shared>, Renderer, Receiver<StreamEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(64);
        let shared = Arc::new(Shared::new(sender));
        let renderer = Renderer::new(shared.clone(), channels, max_frames);
        (shared, renderer, receiver)
    }

    fn mono_source(samples: Vec<f32>) -> Arc<Source> {
        Arc::new(Source::from_decoder(Box::new(PcmDecoder::new(
            AudioData::new(samples, 44100, 1),
        ))))
    }

    #[test]
    fn mixing_is_additive_and_volume_scaled() {
        let (shared, mut renderer, _events) = harness(1, 4);
        let a_samples = [0.1, 0.2, 0.3, 0.4];
        let b_samples = [0.4, 0.3, 0.2, 0.1];
        let a = mono_source(a_samples.to_vec());
        let b = mono_source(b_samples.to_vec());

        shared.set_volume(0.5);
        shared.activate(&a);
        shared.activate(&b);

        let mut output = [0.0f32; 4];
        renderer.render(&mut output);

        for i in 0..4 {
            let expected = 0.5 * (a_samples[i] + b_samples[i]);
            assert!((output[i] - expected).abs() < 1e-6, "frame {}", i);
        }
    }

    #[test]
    fn shorter_source_contributes_only_where_defined() {
        let (shared, mut renderer, _events) = harness(1, 4);
        let long = mono_source(vec![0.1, 0.1, 0.1, 0.1]);
        let short = mono_source(vec![0.2]);

        shared.activate(&long);
        shared.activate(&short);

        let mut output = [0.0f32; 4];
        renderer.render(&mut output);

        assert!((output[0] - 0.3).abs() < 1e-6);
        for &sample in &output[1..] {
            assert!((sample - 0.1).abs() < 1e-6);
        }
        // The short source ended this callback and was evicted.
        assert!(!short.is_playing());
        assert_eq!(shared.active_len(), 1);
    }

    #[test]
    fn three_frame_clip_drains_over_two_callbacks() {
        let (shared, mut renderer, _events) = harness(1, 2);
        let source = mono_source(vec![0.1, 0.2, 0.3]);
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired_clone = fired.clone();
        source.set_finish_callback(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        shared.activate(&source);

        let mut output = [0.0f32; 2];
        renderer.render(&mut output);
        assert_eq!(output, [0.1, 0.2]);
        assert!(source.is_playing());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        renderer.render(&mut output);
        assert_eq!(output, [0.3, 0.0]); // tail padded with silence
        assert!(!source.is_playing());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(shared.is_silent());
    }

    #[test]
    fn stream_goes_silent_exactly_when_all_sources_finish() {
        let (shared, mut renderer, _events) = harness(1, 4);
        let a = mono_source(vec![0.1; 6]); // needs two callbacks
        let b = mono_source(vec![0.2; 2]); // done after one

        shared.activate(&a);
        shared.activate(&b);
        assert!(!shared.is_silent());

        let mut output = [0.0f32; 4];
        renderer.render(&mut output);
        assert!(!shared.is_silent(), "stream silent while a source remains");

        renderer.render(&mut output);
        assert!(shared.is_silent());
        shared.wait(); // returns immediately once silent
    }

    #[test]
    fn wait_is_woken_by_the_render_thread() {
        let (shared, mut renderer, _events) = harness(1, 4);
        let source = mono_source(vec![0.1; 4]);
        shared.activate(&source);

        let waiter = {
            let shared = shared.clone();
            std::thread::spawn(move || shared.wait())
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut output = [0.0f32; 4];
        renderer.render(&mut output); // consumes all 4 frames
        renderer.render(&mut output); // detects exhaustion, goes silent

        waiter.join().unwrap();
        assert!(shared.is_silent());
    }

    #[test]
    fn drop_all_skips_finish_callbacks_but_wakes_everyone() {
        let (shared, _renderer, _events) = harness(1, 4);
        let source = mono_source(vec![0.5; 1000]);
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired_clone = fired.clone();
        source.set_finish_callback(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        shared.activate(&source);

        let waiter = {
            let source = source.clone();
            std::thread::spawn(move || source.wait())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));

        shared.drop_all();

        waiter.join().unwrap();
        shared.wait();
        assert!(!source.is_playing());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(shared.active_len(), 0);
    }

    #[test]
    fn per_source_stop_takes_effect_on_the_next_callback() {
        let (shared, mut renderer, _events) = harness(1, 4);
        let source = mono_source(vec![0.5; 1000]);
        shared.activate(&source);

        let mut output = [0.0f32; 4];
        renderer.render(&mut output);
        assert!(source.is_playing());

        source.stop();
        assert!(source.is_playing(), "stop is a request, not a transition");

        renderer.render(&mut output);
        assert_eq!(output, [0.0; 4]);
        assert!(!source.is_playing());
        assert!(shared.is_silent());
    }

    #[test]
    fn volume_change_applies_on_the_next_callback() {
        let (shared, mut renderer, _events) = harness(1, 2);
        let source = mono_source(vec![1.0, 1.0, 1.0, 1.0]);
        shared.activate(&source);

        let mut output = [0.0f32; 2];
        renderer.render(&mut output);
        assert_eq!(output, [1.0, 1.0]);

        shared.set_volume(0.25);
        renderer.render(&mut output);
        assert_eq!(output, [0.25, 0.25]);
    }

    #[test]
    fn warm_up_with_no_sources_returns_to_silent() {
        let (shared, mut renderer, _events) = harness(2, 4);
        shared.mark_live();
        assert!(!shared.is_silent());

        let mut output = [0.1f32; 8];
        renderer.render(&mut output);
        assert_eq!(output, [0.0; 8]); // zero-filled
        assert!(shared.is_silent());
    }

    #[test]
    fn lifecycle_events_are_emitted_in_order() {
        let (shared, mut renderer, events) = harness(1, 4);
        let source = mono_source(vec![0.1, 0.2]);
        shared.activate(&source);

        let mut output = [0.0f32; 4];
        renderer.render(&mut output);

        let got: Vec<StreamEvent> = events.try_iter().collect();
        assert_eq!(
            got,
            vec![
                StreamEvent::SourceStarted {
                    source_id: source.id()
                },
                StreamEvent::SourceCompleted {
                    source_id: source.id()
                },
                StreamEvent::StreamSilent,
            ]
        );
    }

    #[test]
    fn dropped_sources_emit_dropped_not_completed() {
        let (shared, _renderer, events) = harness(1, 4);
        let source = mono_source(vec![0.5; 100]);
        shared.activate(&source);
        shared.drop_all();

        let got: Vec<StreamEvent> = events.try_iter().collect();
        assert!(got.contains(&StreamEvent::SourceDropped {
            source_id: source.id()
        }));
        assert!(!got.iter().any(|e| matches!(e, StreamEvent::SourceCompleted { .. })));
    }
}
