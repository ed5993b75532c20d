//! Decoded PCM data and loading functionality

mod symphonia_loader;

pub use symphonia_loader::{load_audio_bytes, load_audio_file};

use crate::error::{PolymixError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Immutable, decoded PCM audio: interleaved f32 samples plus format.
///
/// Cheap to clone; the sample storage is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
struct AudioDataInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let total_frames = samples.len() / channels.max(1) as usize;
        Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channels,
                total_frames,
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    /// Interleaved samples; length is `total_frames() * channels()`.
    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.inner.total_frames as f64 / self.inner.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Remap to a different channel count.
    ///
    /// Supported conversions: identity, any→mono (average), mono→any
    /// (duplicate). Anything else is an error; arbitrary channel matrixing
    /// is out of scope.
    pub fn remap_channels(&self, target: u16) -> Result<Self> {
        let current = self.inner.channels;
        if target == current {
            return Ok(self.clone());
        }

        let remapped: Vec<f32> = if target == 1 {
            self.inner
                .samples
                .chunks(current as usize)
                .map(|frame| frame.iter().sum::<f32>() / current as f32)
                .collect()
        } else if current == 1 {
            let mut out = Vec::with_capacity(self.inner.samples.len() * target as usize);
            for &sample in &self.inner.samples {
                out.extend(std::iter::repeat(sample).take(target as usize));
            }
            out
        } else {
            return Err(PolymixError::AudioFormat(format!(
                "unsupported channel conversion: {} -> {}",
                current, target
            )));
        };

        Ok(Self::new(remapped, self.inner.sample_rate, target))
    }

    /// Resample to a different sample rate using rubato.
    ///
    /// Runs offline at load time; never called from the real-time path.
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        use rubato::{
            Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
            WindowFunction,
        };

        const CHUNK_FRAMES: usize = 1024;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let channels = self.inner.channels as usize;
        let ratio = target_sample_rate as f64 / self.inner.sample_rate as f64;

        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, channels)
            .map_err(|e| {
                PolymixError::DecodeInit(format!("failed to create resampler: {}", e))
            })?;

        // Deinterleave into per-channel planes, the layout rubato expects.
        let mut planar: Vec<Vec<f32>> =
            vec![Vec::with_capacity(self.inner.total_frames); channels];
        for frame in self.inner.samples.chunks(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }

        let mut resampled: Vec<Vec<f32>> = vec![Vec::new(); channels];
        let mut input = vec![vec![0.0f32; CHUNK_FRAMES]; channels];
        let mut position = 0;

        while position < self.inner.total_frames {
            let take = (self.inner.total_frames - position).min(CHUNK_FRAMES);
            for ch in 0..channels {
                input[ch][..take].copy_from_slice(&planar[ch][position..position + take]);
                input[ch][take..].fill(0.0);
            }

            let output = resampler
                .process(&input, None)
                .map_err(|e| PolymixError::DecodeInit(format!("resampling error: {}", e)))?;

            for ch in 0..channels {
                resampled[ch].extend_from_slice(&output[ch]);
            }
            position += take;
        }

        // Re-interleave.
        let new_frames = resampled[0].len();
        let mut interleaved = Vec::with_capacity(new_frames * channels);
        for frame_idx in 0..new_frames {
            for plane in resampled.iter() {
                interleaved.push(plane[frame_idx]);
            }
        }

        Ok(Self::new(
            interleaved,
            target_sample_rate,
            self.inner.channels,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_accounting() {
        let data = AudioData::new(vec![0.0; 8], 44100, 2);
        assert_eq!(data.total_frames(), 4);
        assert_eq!(data.channels(), 2);
        assert!(!data.is_empty());
    }

    #[test]
    fn stereo_to_mono_averages_channels() {
        let data = AudioData::new(vec![1.0, 0.0, 0.5, 0.5], 44100, 2);
        let mono = data.remap_channels(1).unwrap();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn mono_to_stereo_duplicates_samples() {
        let data = AudioData::new(vec![0.25, -0.25], 44100, 1);
        let stereo = data.remap_channels(2).unwrap();
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.samples(), &[0.25, 0.25, -0.25, -0.25]);
    }

    #[test]
    fn arbitrary_channel_matrixing_is_rejected() {
        let data = AudioData::new(vec![0.0; 6], 44100, 3);
        assert!(data.remap_channels(2).is_err());
    }

    #[test]
    fn resample_is_identity_at_same_rate() {
        let data = AudioData::new(vec![0.1, 0.2, 0.3, 0.4], 44100, 2);
        let same = data.resample(44100).unwrap();
        assert_eq!(same.samples(), data.samples());
    }

    #[test]
    fn resample_changes_frame_count_proportionally() {
        let data = AudioData::new(vec![0.0; 44100], 44100, 1);
        let resampled = data.resample(22050).unwrap();
        assert_eq!(resampled.sample_rate(), 22050);
        // Sinc resampling pads the tail; the length should land near half.
        let frames = resampled.total_frames() as f64;
        assert!((frames - 22050.0).abs() < 2048.0, "got {} frames", frames);
    }
}
