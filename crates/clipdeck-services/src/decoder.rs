//! WAV decoding and encoding via hound

use std::io::Cursor;
use std::path::Path;

use clipdeck_core::AudioBuffer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("No audio data")]
    Empty,
    #[error("Malformed WAV: {0}")]
    Malformed(#[from] hound::Error),
    #[error("Unsupported format: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode WAV bytes (8/16/24/32-bit PCM or 32-bit float) into a planar buffer
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(DecodeError::Unsupported(format!(
                    "{}-bit float",
                    spec.bits_per_sample
                )));
            }
            reader.samples::<f32>().collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
    };

    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    AudioBuffer::from_interleaved(&samples, spec.channels, spec.sample_rate)
        .map_err(|e| DecodeError::Unsupported(e.to_string()))
}

/// Read and decode a WAV file from disk
pub fn read_wav_file(path: &Path) -> Result<AudioBuffer, DecodeError> {
    let bytes = std::fs::read(path)?;
    decode_wav(&bytes)
}

/// Encode a buffer as 16-bit PCM WAV, clamping samples to [-1, 1]
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, DecodeError> {
    let spec = hound::WavSpec {
        channels: buffer.channel_count(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in buffer.to_interleaved() {
            let s = sample.clamp(-1.0, 1.0);
            let value = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
            writer.write_sample(value as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
