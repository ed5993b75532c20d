//! Output stream configuration

use std::time::Duration;

/// Fixed format and buffering configuration for an [`OutputStream`].
///
/// The sample rate and channel count are negotiated once, at stream
/// construction; every source played on the stream must match them.
///
/// [`OutputStream`]: crate::stream::OutputStream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Duration of one device callback buffer. Bounds the latency of
    /// `stop`/`play` requests taking audible effect.
    pub buffer_duration: Duration,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            buffer_duration: Duration::from_millis(200),
        }
    }
}

impl OutputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn buffer_duration(mut self, duration: Duration) -> Self {
        self.buffer_duration = duration;
        self
    }

    /// Number of frames in one callback buffer at this configuration.
    pub fn frames_per_buffer(&self) -> usize {
        (self.sample_rate as f64 * self.buffer_duration.as_secs_f64()).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_cd_quality_stereo() {
        let config = OutputConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 2);
        assert_eq!(config.buffer_duration, Duration::from_millis(200));
    }

    #[test]
    fn frames_per_buffer_follows_duration() {
        let config = OutputConfig::new()
            .sample_rate(48000)
            .buffer_duration(Duration::from_millis(10));
        assert_eq!(config.frames_per_buffer(), 480);
    }
}
