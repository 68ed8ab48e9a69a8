//! Decoded audio buffers and the keyed buffer store

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ClipdeckError, Result};

/// Key of a buffer inside a [`BufferStore`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferKey(pub String);

impl BufferKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key with any `#fxN` derivation suffixes stripped
    pub fn root(&self) -> &str {
        self.0.split('#').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BufferKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Immutable block of decoded PCM samples (planar, one Vec per channel)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data. All channels must have the same length.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(ClipdeckError::InvalidBuffer("no channels".into()));
        }
        if sample_rate == 0 {
            return Err(ClipdeckError::InvalidBuffer("sample rate is zero".into()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(ClipdeckError::InvalidBuffer("channel lengths differ".into()));
        }
        Ok(Self { channels, sample_rate })
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Split interleaved samples into channels. Trailing partial frames are dropped.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(ClipdeckError::InvalidBuffer("channel count is zero".into()));
        }
        let channels = channels as usize;
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }
        Self::new(planar, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Read a channel at a position in seconds, linearly interpolated.
    /// Channels past the last one fold onto the last (mono fans out to all outputs).
    pub fn sample_at(&self, channel: usize, secs: f64) -> f32 {
        let data = &self.channels[channel.min(self.channels.len() - 1)];
        if secs < 0.0 || data.is_empty() {
            return 0.0;
        }
        let pos = secs * self.sample_rate as f64;
        let idx = pos.floor() as usize;
        let Some(&a) = data.get(idx) else {
            return 0.0;
        };
        let b = data.get(idx + 1).copied().unwrap_or(a);
        let frac = (pos - idx as f64) as f32;
        a + (b - a) * frac
    }

    /// Largest absolute sample across all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |max, s| max.max(s.abs()))
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let channels = self.channels.len();
        let mut out = Vec::with_capacity(self.frames() * channels);
        for i in 0..self.frames() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// Build a new buffer by transforming each channel independently
    pub fn map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[f32]) -> Vec<f32>,
    {
        let channels = self.channels.iter().map(|c| f(c)).collect();
        Self::new(channels, self.sample_rate)
    }
}

/// Keyed store of shared buffers. Clips hold keys, never the buffers themselves.
#[derive(Debug, Default, Clone)]
pub struct BufferStore {
    buffers: HashMap<BufferKey, Arc<AudioBuffer>>,
    next_derived: u64,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the buffer under `key`
    pub fn insert(&mut self, key: BufferKey, buffer: AudioBuffer) -> Arc<AudioBuffer> {
        let buffer = Arc::new(buffer);
        self.buffers.insert(key, buffer.clone());
        buffer
    }

    /// Insert under `name`, suffixing `-2`, `-3`, ... if the name is taken
    pub fn insert_unique(&mut self, name: &str, buffer: AudioBuffer) -> BufferKey {
        let mut key = BufferKey::new(name);
        let mut n = 2;
        while self.buffers.contains_key(&key) {
            key = BufferKey(format!("{name}-{n}"));
            n += 1;
        }
        self.insert(key.clone(), buffer);
        key
    }

    /// Fresh key derived from `base` that is not yet in the store
    pub fn derive_key(&mut self, base: &BufferKey) -> BufferKey {
        loop {
            self.next_derived += 1;
            let key = BufferKey(format!("{}#fx{}", base.root(), self.next_derived));
            if !self.buffers.contains_key(&key) {
                return key;
            }
        }
    }

    pub fn get(&self, key: &BufferKey) -> Option<Arc<AudioBuffer>> {
        self.buffers.get(key).cloned()
    }

    pub fn contains(&self, key: &BufferKey) -> bool {
        self.buffers.contains_key(key)
    }

    /// Explicitly drop a buffer. Clips still pointing at it will be skipped at play time.
    pub fn remove(&mut self, key: &BufferKey) -> Option<Arc<AudioBuffer>> {
        self.buffers.remove(key)
    }

    /// Remove every buffer whose key is not in `referenced`. Returns the removed keys.
    pub fn prune_unreferenced<'a, I>(&mut self, referenced: I) -> Vec<BufferKey>
    where
        I: IntoIterator<Item = &'a BufferKey>,
    {
        let keep: std::collections::HashSet<&BufferKey> = referenced.into_iter().collect();
        let mut removed: Vec<BufferKey> = self
            .buffers
            .keys()
            .filter(|k| !keep.contains(k))
            .cloned()
            .collect();
        for key in &removed {
            self.buffers.remove(key);
        }
        removed.sort();
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &BufferKey> {
        self.buffers.keys()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_split() {
        let buf = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3], 2, 10).unwrap();
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(1).unwrap(), &[-0.1, -0.2]);
        assert_eq!(buf.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2]);
        assert!((buf.duration_secs() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_mismatched_channels() {
        assert!(AudioBuffer::new(vec![vec![0.0; 4], vec![0.0; 3]], 44100).is_err());
        assert!(AudioBuffer::new(vec![], 44100).is_err());
        assert!(AudioBuffer::from_mono(vec![0.0], 0).is_err());
    }

    #[test]
    fn test_sample_at_interpolates() {
        let buf = AudioBuffer::from_mono(vec![0.0, 1.0, 0.0], 2).unwrap();
        assert_eq!(buf.sample_at(0, 0.5), 1.0);
        assert!((buf.sample_at(0, 0.25) - 0.5).abs() < 1e-6);
        assert_eq!(buf.sample_at(0, 5.0), 0.0);
        // Mono fans out to any requested channel
        assert_eq!(buf.sample_at(3, 0.5), 1.0);
    }

    #[test]
    fn test_derived_keys_are_fresh() {
        let mut store = BufferStore::new();
        let base = store.insert_unique("take", AudioBuffer::from_mono(vec![0.0; 4], 4).unwrap());
        let a = store.derive_key(&base);
        store.insert(a.clone(), AudioBuffer::from_mono(vec![0.0; 2], 4).unwrap());
        let b = store.derive_key(&a);
        assert_ne!(a, base);
        assert_ne!(a, b);
        assert_eq!(b.root(), "take");
        assert!(store.contains(&base));
    }

    #[test]
    fn test_insert_unique_suffixes() {
        let mut store = BufferStore::new();
        let a = store.insert_unique("rec", AudioBuffer::from_mono(vec![0.0], 1).unwrap());
        let b = store.insert_unique("rec", AudioBuffer::from_mono(vec![0.0], 1).unwrap());
        assert_eq!(a.as_str(), "rec");
        assert_eq!(b.as_str(), "rec-2");
    }

    #[test]
    fn test_prune_keeps_referenced() {
        let mut store = BufferStore::new();
        let a = store.insert_unique("a", AudioBuffer::from_mono(vec![0.0], 1).unwrap());
        let b = store.insert_unique("b", AudioBuffer::from_mono(vec![0.0], 1).unwrap());
        let removed = store.prune_unreferenced([&a]);
        assert_eq!(removed, vec![b]);
        assert!(store.contains(&a));
        assert_eq!(store.len(), 1);
    }
}
