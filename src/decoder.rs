//! The decoder capability boundary.
//!
//! A [`Decoder`] turns some underlying representation (a decoded file, a
//! byte buffer, a synthesizer) into fixed-format interleaved f32 frames on
//! demand. `read_frames` runs on the real-time audio thread; implementations
//! must not block, allocate, or panic there.

use crate::audio_data::AudioData;

pub trait Decoder: Send {
    /// Reposition to the first frame. Called between play cycles, never
    /// concurrently with `read_frames`.
    fn seek_to_start(&mut self);

    /// Fill `buffer` with up to `max_frames` interleaved frames and return
    /// the number of frames produced. `buffer` holds at least
    /// `max_frames * channels` samples. Producing fewer frames than
    /// requested signals exhaustion.
    fn read_frames(&mut self, buffer: &mut [f32], max_frames: usize) -> usize;

    fn channels(&self) -> u16;

    fn sample_rate(&self) -> u32;
}

/// Decoder over fully-decoded in-memory PCM.
///
/// Reads are a memcpy and seeking is a cursor reset, so every operation is
/// real-time safe. This is the decoder behind [`Source::from_file`] and
/// [`Source::from_bytes`].
///
/// [`Source::from_file`]: crate::source::Source::from_file
/// [`Source::from_bytes`]: crate::source::Source::from_bytes
pub struct PcmDecoder {
    data: AudioData,
    position: usize, // in frames
}

impl PcmDecoder {
    pub fn new(data: AudioData) -> Self {
        Self { data, position: 0 }
    }
}

impl Decoder for PcmDecoder {
    fn seek_to_start(&mut self) {
        self.position = 0;
    }

    fn read_frames(&mut self, buffer: &mut [f32], max_frames: usize) -> usize {
        let channels = self.data.channels() as usize;
        let remaining = self.data.total_frames().saturating_sub(self.position);
        let frames = remaining.min(max_frames);
        if frames == 0 {
            return 0;
        }

        let start = self.position * channels;
        let end = start + frames * channels;
        buffer[..frames * channels].copy_from_slice(&self.data.samples()[start..end]);
        self.position += frames;
        frames
    }

    fn channels(&self) -> u16 {
        self.data.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.data.sample_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_frame_mono() -> PcmDecoder {
        PcmDecoder::new(AudioData::new(vec![0.1, 0.2, 0.3], 44100, 1))
    }

    #[test]
    fn reads_in_chunks_until_exhausted() {
        let mut decoder = three_frame_mono();
        let mut buffer = [0.0f32; 2];

        assert_eq!(decoder.read_frames(&mut buffer, 2), 2);
        assert_eq!(buffer, [0.1, 0.2]);

        assert_eq!(decoder.read_frames(&mut buffer, 2), 1);
        assert_eq!(buffer[0], 0.3);

        assert_eq!(decoder.read_frames(&mut buffer, 2), 0);
    }

    #[test]
    fn seek_to_start_reproduces_the_stream() {
        let mut decoder = three_frame_mono();
        let mut first = [0.0f32; 3];
        assert_eq!(decoder.read_frames(&mut first, 3), 3);

        decoder.seek_to_start();
        let mut second = [0.0f32; 3];
        assert_eq!(decoder.read_frames(&mut second, 3), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn interleaved_stereo_reads_whole_frames() {
        let mut decoder = PcmDecoder::new(AudioData::new(vec![1.0, -1.0, 2.0, -2.0], 44100, 2));
        let mut buffer = [0.0f32; 4];
        assert_eq!(decoder.read_frames(&mut buffer, 1), 1);
        assert_eq!(&buffer[..2], &[1.0, -1.0]);
        assert_eq!(decoder.read_frames(&mut buffer, 4), 1);
        assert_eq!(&buffer[..2], &[2.0, -2.0]);
    }
}
