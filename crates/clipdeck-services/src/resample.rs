//! Sample rate conversion of buffers to the host rate

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use clipdeck_core::AudioBuffer;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use tracing::debug;

use crate::host::HostError;

/// Smallest block handed to the resampler, so short buffers still flush past the filter delay
const MIN_CHUNK: usize = 1024;
const MAX_FLUSHES: usize = 8;

/// Convert `buffer` to `to_rate` with a windowed sinc resampler. Same-rate input is copied.
pub fn resample(buffer: &AudioBuffer, to_rate: u32) -> Result<AudioBuffer, HostError> {
    let from_rate = buffer.sample_rate();
    if from_rate == to_rate || buffer.is_empty() {
        return AudioBuffer::new(buffer.channels().to_vec(), to_rate)
            .map_err(|e| HostError::Resample(e.to_string()));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let frames = buffer.frames();
    let channels = buffer.channel_count() as usize;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, frames.max(MIN_CHUNK), channels)
        .map_err(|e| HostError::Resample(format!("init: {e}")))?;

    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;
    let wanted = delay + expected;

    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];
    let mut block = resampler
        .process_partial(Some(buffer.channels()), None)
        .map_err(|e| HostError::Resample(e.to_string()))?;

    for _ in 0..MAX_FLUSHES {
        for (out, part) in planar.iter_mut().zip(&block) {
            out.extend_from_slice(part);
        }
        if planar[0].len() >= wanted {
            break;
        }
        block = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| HostError::Resample(e.to_string()))?;
    }

    for out in &mut planar {
        out.resize(wanted, 0.0);
        out.drain(..delay);
    }

    AudioBuffer::new(planar, to_rate).map_err(|e| HostError::Resample(e.to_string()))
}

/// Converted copies of buffers, reused while the source buffer is alive
#[derive(Debug, Default)]
pub struct ResampleCache {
    entries: HashMap<usize, (Weak<AudioBuffer>, Arc<AudioBuffer>)>,
}

impl ResampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `buffer` at `rate`: the buffer itself if it already matches, else a cached conversion
    pub fn conform(&mut self, buffer: Arc<AudioBuffer>, rate: u32) -> Result<Arc<AudioBuffer>, HostError> {
        if buffer.sample_rate() == rate {
            return Ok(buffer);
        }

        let key = Arc::as_ptr(&buffer) as usize;
        if let Some((source, converted)) = self.entries.get(&key) {
            let same_source = source.upgrade().is_some_and(|s| Arc::ptr_eq(&s, &buffer));
            if same_source && converted.sample_rate() == rate {
                return Ok(converted.clone());
            }
        }

        self.entries.retain(|_, (source, _)| source.strong_count() > 0);

        let converted = Arc::new(resample(&buffer, rate)?);
        debug!(from = buffer.sample_rate(), to = rate, frames = converted.frames(), "Resampled buffer");
        self.entries.insert(key, (Arc::downgrade(&buffer), converted.clone()));
        Ok(converted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
