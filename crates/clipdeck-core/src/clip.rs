//! Timeline clips: a trimmed, gain-enveloped reference into a buffer

use serde::{Deserialize, Serialize};

use crate::buffer::BufferKey;

/// Shortest duration a trim may leave a clip with, in seconds
pub const MIN_CLIP_DURATION: f64 = 0.1;

/// Two gain point times closer than this are treated as the same instant
pub const GAIN_POINT_TOLERANCE: f64 = 0.01;

/// Unique identifier for clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u64);

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One envelope point, time relative to the clip start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainPoint {
    pub time: f64,
    pub gain: f32,
}

impl GainPoint {
    pub fn new(time: f64, gain: f32) -> Self {
        Self { time, gain }
    }
}

/// Evaluate a sorted envelope at `time`, interpolating linearly between points.
/// Before the first point the first gain holds, after the last point the last gain holds.
pub fn envelope_gain(points: &[GainPoint], time: f64) -> f32 {
    let Some(first) = points.first() else {
        return 1.0;
    };
    if time <= first.time {
        return first.gain;
    }
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if time <= b.time {
            let span = b.time - a.time;
            if span <= f64::EPSILON {
                return b.gain;
            }
            let t = ((time - a.time) / span) as f32;
            return a.gain + (b.gain - a.gain) * t;
        }
    }
    points.last().map_or(1.0, |p| p.gain)
}

/// Audio clip on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    /// Source buffer in the project's buffer store
    pub buffer_key: BufferKey,
    /// Position on the timeline (seconds)
    pub start_time: f64,
    /// Read position inside the source buffer (seconds)
    pub offset: f64,
    /// Playback length (seconds)
    pub duration: f64,
    /// Volume envelope, sorted by time, spanning [0, duration]
    pub gain_points: Vec<GainPoint>,
    pub selected: bool,
    #[serde(default)]
    pub name: String,
}

impl Clip {
    pub fn new(id: ClipId, buffer_key: BufferKey, duration: f64) -> Self {
        Self {
            id,
            buffer_key,
            start_time: 0.0,
            offset: 0.0,
            duration,
            gain_points: vec![GainPoint::new(0.0, 1.0), GainPoint::new(duration, 1.0)],
            selected: false,
            name: String::new(),
        }
    }

    /// Timeline position where the clip stops sounding
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Resize the clip, keeping the envelope anchored to the new end
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
        self.gain_points.retain(|p| p.time < duration);

        let has_end = self
            .gain_points
            .iter()
            .any(|p| (p.time - duration).abs() < GAIN_POINT_TOLERANCE);
        if !has_end {
            self.gain_points.push(GainPoint::new(duration, 1.0));
        }

        self.gain_points.sort_by(|a, b| a.time.total_cmp(&b.time));

        if self.gain_points.len() < 2 {
            self.gain_points.insert(0, GainPoint::new(0.0, 1.0));
        }
    }

    /// Move the left edge by `delta` seconds (positive shortens the clip).
    /// Returns false and leaves the clip untouched if the result would be shorter
    /// than [`MIN_CLIP_DURATION`].
    pub fn trim_left(&mut self, delta: f64) -> bool {
        // Can't read before the buffer start or place the clip before zero
        let delta = delta.max(-self.offset).max(-self.start_time);
        let duration = self.duration - delta;
        if duration < MIN_CLIP_DURATION {
            return false;
        }
        self.offset += delta;
        self.start_time += delta;
        self.set_duration(duration);
        true
    }

    /// Move the right edge by `delta` seconds, bounded by the source length.
    /// Returns false and leaves the clip untouched if the result would be shorter
    /// than [`MIN_CLIP_DURATION`].
    pub fn trim_right(&mut self, delta: f64, source_duration: f64) -> bool {
        let max_duration = source_duration - self.offset;
        let duration = (self.duration + delta).min(max_duration);
        if duration < MIN_CLIP_DURATION {
            return false;
        }
        self.set_duration(duration);
        true
    }

    /// Place the clip on the timeline, never before zero
    pub fn move_to(&mut self, start_time: f64) {
        self.start_time = start_time.max(0.0);
    }

    /// Envelope gain at a clip-relative time
    pub fn gain_at(&self, time: f64) -> f32 {
        envelope_gain(&self.gain_points, time)
    }

    /// Add an envelope point, clamped into the clip. A point within
    /// [`GAIN_POINT_TOLERANCE`] of an existing one replaces its gain.
    pub fn add_gain_point(&mut self, time: f64, gain: f32) {
        let time = time.clamp(0.0, self.duration);
        let gain = gain.clamp(0.0, 1.0);

        if let Some(existing) = self
            .gain_points
            .iter_mut()
            .find(|p| (p.time - time).abs() < GAIN_POINT_TOLERANCE)
        {
            existing.gain = gain;
            return;
        }

        let idx = self
            .gain_points
            .iter()
            .position(|p| p.time > time)
            .unwrap_or(self.gain_points.len());
        self.gain_points.insert(idx, GainPoint::new(time, gain));
    }

    /// Remove an interior envelope point. The first and last points stay.
    pub fn remove_gain_point(&mut self, index: usize) -> Option<GainPoint> {
        if index == 0 || index + 1 >= self.gain_points.len() {
            return None;
        }
        Some(self.gain_points.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(duration: f64) -> Clip {
        Clip::new(ClipId(1), BufferKey::new("src"), duration)
    }

    fn assert_envelope_valid(c: &Clip) {
        assert!(c.gain_points.len() >= 2);
        assert!(c.gain_points.windows(2).all(|w| w[0].time <= w[1].time));
        let last = c.gain_points.last().unwrap();
        assert!((last.time - c.duration).abs() < GAIN_POINT_TOLERANCE);
    }

    #[test]
    fn test_new_clip_envelope() {
        let c = clip(4.0);
        assert_eq!(c.gain_points, vec![GainPoint::new(0.0, 1.0), GainPoint::new(4.0, 1.0)]);
        assert_eq!(c.end_time(), 4.0);
    }

    #[test]
    fn test_set_duration_keeps_envelope_valid() {
        let mut c = clip(10.0);
        c.add_gain_point(3.0, 0.5);
        c.add_gain_point(8.0, 0.2);

        for d in [9.0, 5.0, 3.0, 0.5, 12.0, 3.005] {
            c.set_duration(d);
            assert_envelope_valid(&c);
        }
        assert!(c.gain_points.iter().all(|p| p.time <= c.duration + GAIN_POINT_TOLERANCE));
    }

    #[test]
    fn test_set_duration_drops_points_past_end() {
        let mut c = clip(10.0);
        c.add_gain_point(6.0, 0.3);
        c.set_duration(5.0);
        assert_eq!(c.gain_points, vec![GainPoint::new(0.0, 1.0), GainPoint::new(5.0, 1.0)]);
    }

    #[test]
    fn test_trim_left_moves_start_and_offset() {
        let mut c = clip(10.0);
        c.start_time = 2.0;
        assert!(c.trim_left(1.5));
        assert_eq!(c.offset, 1.5);
        assert_eq!(c.start_time, 3.5);
        assert_eq!(c.duration, 8.5);
        assert_envelope_valid(&c);
    }

    #[test]
    fn test_trim_left_caps_offset_at_zero() {
        let mut c = clip(5.0);
        c.start_time = 4.0;
        c.offset = 1.0;
        c.duration = 3.0;
        assert!(c.trim_left(-3.0));
        assert_eq!(c.offset, 0.0);
        assert_eq!(c.start_time, 3.0);
        assert_eq!(c.duration, 4.0);
    }

    #[test]
    fn test_trim_left_below_floor_is_noop() {
        let mut c = clip(1.0);
        let before = c.clone();
        assert!(!c.trim_left(0.95));
        assert_eq!(c, before);
    }

    #[test]
    fn test_trim_right_clamps_to_source() {
        let mut c = clip(4.0);
        c.offset = 1.0;
        c.duration = 2.0;
        assert!(c.trim_right(10.0, 5.0));
        assert_eq!(c.duration, 4.0);
        assert!(c.offset + c.duration <= 5.0);
    }

    #[test]
    fn test_trim_right_below_floor_is_noop() {
        let mut c = clip(2.0);
        let before = c.clone();
        assert!(!c.trim_right(-1.95, 2.0));
        assert_eq!(c, before);
    }

    #[test]
    fn test_gain_interpolation() {
        let mut c = clip(4.0);
        c.add_gain_point(2.0, 0.0);
        assert_eq!(c.gain_at(0.0), 1.0);
        assert!((c.gain_at(1.0) - 0.5).abs() < 1e-6);
        assert_eq!(c.gain_at(2.0), 0.0);
        assert!((c.gain_at(3.0) - 0.5).abs() < 1e-6);
        assert_eq!(c.gain_at(9.0), 1.0);
    }

    #[test]
    fn test_gain_point_edit() {
        let mut c = clip(4.0);
        c.add_gain_point(-1.0, 2.0);
        assert_eq!(c.gain_points.len(), 2);
        assert_eq!(c.gain_points[0].gain, 1.0);

        c.add_gain_point(1.0, 0.4);
        assert_eq!(c.gain_points.len(), 3);
        assert!(c.remove_gain_point(0).is_none());
        assert!(c.remove_gain_point(2).is_none());
        assert_eq!(c.remove_gain_point(1), Some(GainPoint::new(1.0, 0.4)));
    }

    #[test]
    fn test_move_clamps_at_zero() {
        let mut c = clip(1.0);
        c.move_to(-3.0);
        assert_eq!(c.start_time, 0.0);
        c.move_to(7.25);
        assert_eq!(c.start_time, 7.25);
    }

    #[test]
    fn test_clip_serde() {
        let c = clip(2.0);
        let json = serde_json::to_string(&c).unwrap();
        let back: Clip = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
