//! Project: the clip collection plus timeline state

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::buffer::{AudioBuffer, BufferKey, BufferStore};
use crate::clip::{Clip, ClipId, MIN_CLIP_DURATION};
use crate::error::{ClipdeckError, Result};
use crate::settings::ProjectSettings;

/// Space left between existing clips and a newly imported recording
pub const IMPORT_GAP: f64 = 0.5;
/// Audio left after the last marker becomes its own clip only if longer than this
pub const MIN_TAIL: f64 = 0.5;

/// Editor state: clips on a shared timeline and the buffers they reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub clips: Vec<Clip>,
    /// Current timeline position in seconds
    pub playhead: f64,
    /// Timeline extent in seconds, only grows unless reset
    pub duration: f64,
    pub is_playing: bool,
    #[serde(skip)]
    pub buffers: BufferStore,
    settings: ProjectSettings,
    next_clip_id: u64,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(ProjectSettings::default())
    }
}

impl Project {
    pub fn new(settings: ProjectSettings) -> Self {
        Self {
            clips: Vec::new(),
            playhead: 0.0,
            duration: settings.default_duration,
            is_playing: false,
            buffers: BufferStore::new(),
            settings,
            next_clip_id: 1,
        }
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    /// Reserve a fresh clip id
    pub fn next_clip_id(&mut self) -> ClipId {
        let id = ClipId(self.next_clip_id);
        self.next_clip_id += 1;
        id
    }

    /// Append a clip. Ids must be unique within the project.
    pub fn add_clip(&mut self, clip: Clip) -> Result<ClipId> {
        let id = clip.id;
        if self.get_clip(id).is_some() {
            return Err(ClipdeckError::DuplicateClip(id.0));
        }
        self.next_clip_id = self.next_clip_id.max(id.0 + 1);
        self.clips.push(clip);
        self.update_duration();
        Ok(id)
    }

    /// Create a clip spanning the whole of a stored buffer, placed at `start_time`
    pub fn create_clip(&mut self, buffer_key: BufferKey, start_time: f64) -> Result<ClipId> {
        let buffer = self
            .buffers
            .get(&buffer_key)
            .ok_or_else(|| ClipdeckError::BufferNotFound(buffer_key.to_string()))?;
        if buffer.is_empty() {
            return Err(ClipdeckError::InvalidBuffer(format!("{buffer_key} has no samples")));
        }

        let id = self.next_clip_id();
        let mut clip = Clip::new(id, buffer_key, buffer.duration_secs());
        clip.name = clip.buffer_key.root().to_string();
        clip.move_to(start_time);
        self.add_clip(clip)
    }

    /// Split a stored recording into consecutive clips at `markers` (seconds into the
    /// buffer) and append them after the existing clips. Every clip shares `buffer_key`
    /// and reads from its own offset.
    ///
    /// A segment of `MIN_CLIP_DURATION` or less is folded into the next one. Audio after
    /// the last marker gets a final clip if it is longer than [`MIN_TAIL`]. With no
    /// markers the whole buffer becomes one clip.
    pub fn import_segments(&mut self, buffer_key: BufferKey, markers: &[f64], name: &str) -> Result<Vec<ClipId>> {
        let buffer = self
            .buffers
            .get(&buffer_key)
            .ok_or_else(|| ClipdeckError::BufferNotFound(buffer_key.to_string()))?;
        if buffer.is_empty() {
            return Err(ClipdeckError::InvalidBuffer(format!("{buffer_key} has no samples")));
        }
        let source = buffer.duration_secs();

        let mut at = self.clip_extent();
        if at > 0.0 {
            at += IMPORT_GAP;
        }

        if markers.is_empty() {
            let id = self.push_segment(&buffer_key, name.to_string(), at, 0.0, source)?;
            return Ok(vec![id]);
        }

        let mut cuts: Vec<f64> = markers
            .iter()
            .filter(|m| m.is_finite())
            .map(|m| m.clamp(0.0, source))
            .collect();
        cuts.sort_by(f64::total_cmp);

        let mut ids = Vec::new();
        let mut read_from = 0.0;
        for cut in cuts {
            let length = cut - read_from;
            if length <= MIN_CLIP_DURATION {
                continue;
            }
            let label = format!("{name} {}", ids.len() + 1);
            ids.push(self.push_segment(&buffer_key, label, at, read_from, length)?);
            at += length;
            read_from = cut;
        }

        if source > read_from + MIN_TAIL {
            let label = format!("{name} (end)");
            ids.push(self.push_segment(&buffer_key, label, at, read_from, source - read_from)?);
        }

        info!(key = %buffer_key, markers = markers.len(), clips = ids.len(), "Imported segments");
        Ok(ids)
    }

    fn push_segment(&mut self, key: &BufferKey, name: String, start_time: f64, offset: f64, duration: f64) -> Result<ClipId> {
        let id = self.next_clip_id();
        let mut clip = Clip::new(id, key.clone(), duration);
        clip.name = name;
        clip.offset = offset;
        clip.move_to(start_time);
        self.add_clip(clip)
    }

    /// Remove a clip. Its buffer stays in the store, other clips may share it.
    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let pos = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(pos))
    }

    pub fn get_clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn get_clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    fn clip_mut(&mut self, id: ClipId) -> Result<&mut Clip> {
        self.get_clip_mut(id).ok_or(ClipdeckError::ClipNotFound(id.0))
    }

    /// End of the last clip on the timeline
    pub fn clip_extent(&self) -> f64 {
        self.clips.iter().map(Clip::end_time).fold(0.0, f64::max)
    }

    /// Grow the timeline to fit every clip plus padding. Never shrinks.
    pub fn update_duration(&mut self) {
        let required = self.clip_extent() + self.settings.timeline_padding;
        self.duration = self.duration.max(required);
    }

    /// Explicitly shrink the timeline back to its default or the clip extent plus padding
    pub fn reset_duration(&mut self) {
        let required = self.clip_extent() + self.settings.timeline_padding;
        self.duration = self.settings.default_duration.max(required);
    }

    pub fn set_playhead(&mut self, secs: f64) {
        self.playhead = secs.max(0.0);
    }

    /// Select one clip, deselecting every other
    pub fn select_clip(&mut self, id: ClipId) -> Result<()> {
        if self.get_clip(id).is_none() {
            return Err(ClipdeckError::ClipNotFound(id.0));
        }
        for clip in &mut self.clips {
            clip.selected = clip.id == id;
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        for clip in &mut self.clips {
            clip.selected = false;
        }
    }

    pub fn selected_clip(&self) -> Option<&Clip> {
        self.clips.iter().find(|c| c.selected)
    }

    /// Clip an effect should apply to: the selected one, else the first
    pub fn effect_target(&self) -> Option<ClipId> {
        self.selected_clip().or_else(|| self.clips.first()).map(|c| c.id)
    }

    pub fn move_clip(&mut self, id: ClipId, start_time: f64) -> Result<()> {
        self.clip_mut(id)?.move_to(start_time);
        self.update_duration();
        Ok(())
    }

    /// Drag the left trim handle. Ok(false) means the trim was rejected and nothing changed.
    pub fn trim_clip_left(&mut self, id: ClipId, delta: f64) -> Result<bool> {
        let applied = self.clip_mut(id)?.trim_left(delta);
        if applied {
            self.update_duration();
        } else {
            debug!(clip = id.0, delta, "left trim rejected");
        }
        Ok(applied)
    }

    /// Drag the right trim handle, bounded by the source buffer length.
    /// Ok(false) means the trim was rejected and nothing changed.
    pub fn trim_clip_right(&mut self, id: ClipId, delta: f64) -> Result<bool> {
        let key = self
            .get_clip(id)
            .ok_or(ClipdeckError::ClipNotFound(id.0))?
            .buffer_key
            .clone();
        let source = self
            .buffers
            .get(&key)
            .ok_or_else(|| ClipdeckError::BufferNotFound(key.to_string()))?
            .duration_secs();

        let applied = self.clip_mut(id)?.trim_right(delta, source);
        if applied {
            self.update_duration();
        } else {
            debug!(clip = id.0, delta, "right trim rejected");
        }
        Ok(applied)
    }

    /// Register `buffer` under a key derived from the clip's current one and point
    /// the clip at it. The previous buffer is left in the store untouched.
    ///
    /// If the new buffer is shorter than the clip's current window, the window is
    /// pulled back inside it.
    pub fn replace_clip_buffer(&mut self, id: ClipId, buffer: AudioBuffer) -> Result<BufferKey> {
        if buffer.is_empty() {
            return Err(ClipdeckError::InvalidBuffer("derived buffer has no samples".into()));
        }
        let old_key = self
            .get_clip(id)
            .ok_or(ClipdeckError::ClipNotFound(id.0))?
            .buffer_key
            .clone();

        let source = buffer.duration_secs();
        let key = self.buffers.derive_key(&old_key);
        self.buffers.insert(key.clone(), buffer);

        let clip = self.clip_mut(id)?;
        clip.buffer_key = key.clone();
        if clip.offset + clip.duration > source {
            clip.offset = clip.offset.min((source - MIN_CLIP_DURATION).max(0.0));
            clip.set_duration(source - clip.offset);
        }
        self.update_duration();
        Ok(key)
    }

    /// Drop buffers that no clip references. Returns the removed keys.
    pub fn prune_unused_buffers(&mut self) -> Vec<BufferKey> {
        let referenced: Vec<BufferKey> = self.clips.iter().map(|c| c.buffer_key.clone()).collect();
        self.buffers.prune_unreferenced(referenced.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(secs: f64) -> AudioBuffer {
        let rate = 100;
        AudioBuffer::from_mono(vec![0.5; (secs * rate as f64) as usize], rate).unwrap()
    }

    fn project_with(secs: &[f64]) -> (Project, Vec<ClipId>) {
        let mut project = Project::default();
        let mut ids = Vec::new();
        let mut at = 0.0;
        for (i, s) in secs.iter().enumerate() {
            let key = project.buffers.insert_unique(&format!("take{i}"), buffer(*s));
            ids.push(project.create_clip(key, at).unwrap());
            at += s;
        }
        (project, ids)
    }

    #[test]
    fn test_add_clip_grows_duration() {
        let mut project = Project::default();
        assert_eq!(project.duration, 60.0);

        let mut clip = Clip::new(ClipId(7), BufferKey::new("x"), 30.0);
        clip.start_time = 45.0;
        project.add_clip(clip).unwrap();
        assert_eq!(project.duration, 85.0);
        assert_eq!(project.next_clip_id(), ClipId(8));
    }

    #[test]
    fn test_add_clip_rejects_duplicate_id() {
        let mut project = Project::default();
        project.add_clip(Clip::new(ClipId(1), BufferKey::new("x"), 2.0)).unwrap();

        let mut again = Clip::new(ClipId(1), BufferKey::new("y"), 50.0);
        again.start_time = 40.0;
        let err = project.add_clip(again).unwrap_err();
        assert!(matches!(err, ClipdeckError::DuplicateClip(1)));
        assert_eq!(project.clips.len(), 1);
        assert_eq!(project.duration, 60.0);
    }

    #[test]
    fn test_duration_is_monotonic() {
        let (mut project, ids) = project_with(&[5.0, 5.0]);
        project.move_clip(ids[1], 100.0).unwrap();
        let grown = project.duration;
        assert_eq!(grown, 115.0);

        let mut previous = grown;
        project.move_clip(ids[1], 0.0).unwrap();
        assert!(project.duration >= previous);
        previous = project.duration;
        project.trim_clip_right(ids[0], -4.0).unwrap();
        assert!(project.duration >= previous);

        project.reset_duration();
        assert_eq!(project.duration, 60.0);
    }

    #[test]
    fn test_get_and_remove() {
        let (mut project, ids) = project_with(&[1.0, 2.0]);
        assert!(project.get_clip(ids[0]).is_some());
        assert!(project.remove_clip(ids[0]).is_some());
        assert!(project.get_clip(ids[0]).is_none());
        assert!(project.remove_clip(ids[0]).is_none());
        assert_eq!(project.clips.len(), 1);
    }

    #[test]
    fn test_create_clip_missing_buffer() {
        let mut project = Project::default();
        let err = project.create_clip(BufferKey::new("nope"), 0.0).unwrap_err();
        assert!(matches!(err, ClipdeckError::BufferNotFound(_)));
        assert!(project.clips.is_empty());
    }

    #[test]
    fn test_remove_keeps_shared_buffer() {
        let mut project = Project::default();
        let key = project.buffers.insert_unique("shared", buffer(2.0));
        let a = project.create_clip(key.clone(), 0.0).unwrap();
        let b = project.create_clip(key.clone(), 4.0).unwrap();

        project.remove_clip(a);
        let survivor = project.get_clip(b).unwrap();
        assert!(project.buffers.get(&survivor.buffer_key).is_some());
        assert!(project.prune_unused_buffers().is_empty());
    }

    #[test]
    fn test_trims_respect_bounds() {
        let (mut project, ids) = project_with(&[3.0]);
        let id = ids[0];

        assert!(project.trim_clip_left(id, 1.0).unwrap());
        assert!(project.trim_clip_right(id, 5.0).unwrap());
        let clip = project.get_clip(id).unwrap();
        assert_eq!(clip.offset, 1.0);
        assert!((clip.offset + clip.duration - 3.0).abs() < 1e-9);

        let before = clip.clone();
        assert!(!project.trim_clip_right(id, -1.95).unwrap());
        assert!(!project.trim_clip_left(id, 1.95).unwrap());
        assert_eq!(project.get_clip(id).unwrap(), &before);
    }

    #[test]
    fn test_trim_unknown_clip() {
        let mut project = Project::default();
        assert!(matches!(
            project.trim_clip_left(ClipId(9), 0.5),
            Err(ClipdeckError::ClipNotFound(9))
        ));
    }

    #[test]
    fn test_selection_is_exclusive() {
        let (mut project, ids) = project_with(&[1.0, 1.0, 1.0]);
        assert_eq!(project.effect_target(), Some(ids[0]));

        project.select_clip(ids[1]).unwrap();
        project.select_clip(ids[2]).unwrap();
        assert_eq!(project.clips.iter().filter(|c| c.selected).count(), 1);
        assert_eq!(project.effect_target(), Some(ids[2]));

        project.clear_selection();
        assert!(project.selected_clip().is_none());
    }

    #[test]
    fn test_replace_buffer_is_non_destructive() {
        let mut project = Project::default();
        let key = project.buffers.insert_unique("voice", buffer(2.0));
        let a = project.create_clip(key.clone(), 0.0).unwrap();
        let b = project.create_clip(key.clone(), 2.0).unwrap();

        let new_key = project.replace_clip_buffer(a, buffer(1.0)).unwrap();
        assert_ne!(new_key, key);
        assert_eq!(project.get_clip(a).unwrap().buffer_key, new_key);
        assert_eq!(project.get_clip(b).unwrap().buffer_key, key);
        assert!((project.buffers.get(&key).unwrap().duration_secs() - 2.0).abs() < 1e-9);

        // Shorter derived buffer pulls the window back inside it
        let clip = project.get_clip(a).unwrap();
        assert!(clip.offset + clip.duration <= 1.0 + 1e-9);
        assert!(clip.gain_points.last().unwrap().time <= 1.0 + 1e-9);
    }

    #[test]
    fn test_import_segments_share_buffer() {
        let mut project = Project::default();
        let key = project.buffers.insert_unique("session", buffer(5.0));

        let ids = project.import_segments(key.clone(), &[3.0, 1.0, 1.05], "session").unwrap();
        assert_eq!(ids.len(), 3);

        let clips: Vec<&Clip> = ids.iter().map(|id| project.get_clip(*id).unwrap()).collect();
        assert!(clips.iter().all(|c| c.buffer_key == key));
        assert_eq!(project.buffers.len(), 1);

        // 1.0 to 1.05 is too short and folds into the next segment
        assert_eq!((clips[0].offset, clips[0].duration, clips[0].start_time), (0.0, 1.0, 0.0));
        assert_eq!((clips[1].offset, clips[1].duration, clips[1].start_time), (1.0, 2.0, 1.0));
        assert_eq!((clips[2].offset, clips[2].start_time), (3.0, 3.0));
        assert!((clips[2].duration - 2.0).abs() < 1e-9);
        assert_eq!(clips[0].name, "session 1");
        assert_eq!(clips[2].name, "session (end)");
    }

    #[test]
    fn test_import_segments_short_tail_dropped() {
        let mut project = Project::default();
        let key = project.buffers.insert_unique("take", buffer(3.4));

        let ids = project.import_segments(key, &[3.0], "take").unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(project.get_clip(ids[0]).unwrap().duration, 3.0);
    }

    #[test]
    fn test_import_segments_appends_after_gap() {
        let (mut project, _) = project_with(&[2.0]);
        let key = project.buffers.insert_unique("next", buffer(4.0));

        let ids = project.import_segments(key, &[], "next").unwrap();
        assert_eq!(ids.len(), 1);
        let clip = project.get_clip(ids[0]).unwrap();
        assert_eq!(clip.start_time, 2.0 + IMPORT_GAP);
        assert_eq!(clip.offset, 0.0);
        assert!((clip.duration - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_import_segments_removing_one_keeps_others_playable() {
        let mut project = Project::default();
        let key = project.buffers.insert_unique("take", buffer(4.0));
        let ids = project.import_segments(key.clone(), &[2.0], "take").unwrap();

        project.remove_clip(ids[0]);
        assert!(project.buffers.get(&project.get_clip(ids[1]).unwrap().buffer_key).is_some());
        assert!(project.prune_unused_buffers().is_empty());
    }

    #[test]
    fn test_playhead_clamped() {
        let mut project = Project::default();
        project.set_playhead(-4.0);
        assert_eq!(project.playhead, 0.0);
    }
}
