use crate::audio_data::AudioData;
use crate::config::OutputConfig;
use crate::error::{PolymixError, Result};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decode an audio file into PCM matching the target output format.
pub fn load_audio_file(path: impl AsRef<Path>, target: &OutputConfig) -> Result<AudioData> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| PolymixError::DecodeInit(format!("cannot open {}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    decode(mss, hint, target)
}

/// Decode an in-memory encoded audio buffer into PCM matching the target
/// output format. The bytes are copied; the caller keeps ownership of the
/// original buffer.
pub fn load_audio_bytes(bytes: &[u8], target: &OutputConfig) -> Result<AudioData> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    decode(mss, Hint::new(), target)
}

fn decode(mss: MediaSourceStream, hint: Hint, target: &OutputConfig) -> Result<AudioData> {
    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PolymixError::DecodeInit(format!("failed to probe audio format: {:?}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| PolymixError::DecodeInit("no default audio track found".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| PolymixError::DecodeInit("sample rate not found".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| PolymixError::DecodeInit("channel count not found".to_string()))?
        .count() as u16;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PolymixError::DecodeInit(format!("failed to create decoder: {:?}", e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break, // end-of-file
            Err(e) => {
                return Err(PolymixError::DecodeInit(format!(
                    "error reading packet: {:?}",
                    e
                )));
            }
        };

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::IoError(_)) => break, // also EOF in some formats
            Err(Error::DecodeError(_)) => continue, // recoverable corruption
            Err(e) => {
                return Err(PolymixError::DecodeInit(format!(
                    "error decoding packet: {:?}",
                    e
                )));
            }
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity();

        let mut tmp = SampleBuffer::<f32>::new(capacity as u64, spec);
        tmp.copy_interleaved_ref(decoded);
        samples.extend_from_slice(tmp.samples());
    }

    if samples.is_empty() {
        return Err(PolymixError::DecodeInit(
            "input contains no decodable audio".to_string(),
        ));
    }

    AudioData::new(samples, sample_rate, channels)
        .remap_channels(target.channels)?
        .resample(target.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_at_construction() {
        let target = OutputConfig::default();
        let err = load_audio_bytes(&[0u8; 64], &target).unwrap_err();
        assert!(matches!(err, PolymixError::DecodeInit(_)));
    }

    #[test]
    fn missing_file_fails_at_construction() {
        let target = OutputConfig::default();
        let err = load_audio_file("/nonexistent/clip.wav", &target).unwrap_err();
        assert!(matches!(err, PolymixError::DecodeInit(_)));
    }
}
