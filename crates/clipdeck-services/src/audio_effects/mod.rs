//! Offline buffer effects and non-destructive application to clips

mod native;

pub use native::{
    AntiPopEffect, EchoEffect, GainEffect, HighPassEffect, LowPassEffect, NormalizeEffect,
    PitchUpEffect, RobotEffect, SoftClipEffect,
};

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use clipdeck_core::{AudioBuffer, BufferKey, ClipId, ClipdeckError, Project};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),
    #[error("Invalid value {value} for parameter {name}")]
    InvalidParam { name: String, value: f32 },
    #[error("Project has no clips")]
    NoTarget,
    #[error(transparent)]
    Core(#[from] ClipdeckError),
}

/// Effect that turns one buffer into a new one. The input is never modified.
pub trait Effect: Send + Sync + Debug {
    fn name(&self) -> &str;
    /// Parameters with their defaults and ranges
    fn params(&self) -> Vec<EffectParam>;
    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectParam {
    pub name: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub unit: String,
}

impl EffectParam {
    pub fn new(name: &str, value: f32, min: f32, max: f32, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            min,
            max,
            unit: unit.to_string(),
        }
    }
}

/// Parameter values passed to [`Effect::apply`]; anything unset takes the effect default
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectParams {
    values: HashMap<String, f32>,
}

impl EffectParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f32) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn set(&mut self, name: &str, value: f32) {
        self.values.insert(name.to_string(), value);
    }

    /// Value of `param`, defaulted and range checked against its declaration
    pub fn resolve(&self, param: &EffectParam) -> Result<f32, EffectError> {
        let value = self.values.get(&param.name).copied().unwrap_or(param.value);
        if !value.is_finite() || value < param.min || value > param.max {
            return Err(EffectError::InvalidParam {
                name: param.name.clone(),
                value,
            });
        }
        Ok(value)
    }
}

/// Table of effects addressable by name
#[derive(Debug, Default)]
pub struct EffectRegistry {
    effects: BTreeMap<String, Box<dyn Effect>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in effect
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GainEffect));
        registry.register(Box::new(RobotEffect));
        registry.register(Box::new(EchoEffect));
        registry.register(Box::new(PitchUpEffect));
        registry.register(Box::new(NormalizeEffect));
        registry.register(Box::new(HighPassEffect));
        registry.register(Box::new(LowPassEffect));
        registry.register(Box::new(AntiPopEffect));
        registry.register(Box::new(SoftClipEffect));
        registry
    }

    /// Add an effect, replacing any with the same name
    pub fn register(&mut self, effect: Box<dyn Effect>) {
        self.effects.insert(effect.name().to_string(), effect);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Effect> {
        self.effects.get(name).map(|e| e.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.effects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Run `effect` on a clip's buffer and repoint the clip at the result.
    /// The source buffer stays in the store under its old key.
    pub fn apply_to_clip(
        &self,
        project: &mut Project,
        clip: ClipId,
        effect: &str,
        params: &EffectParams,
    ) -> Result<BufferKey, EffectError> {
        let fx = self
            .get(effect)
            .ok_or_else(|| EffectError::UnknownEffect(effect.to_string()))?;

        let source_key = project
            .get_clip(clip)
            .ok_or(ClipdeckError::ClipNotFound(clip.0))?
            .buffer_key
            .clone();
        let source = project
            .buffers
            .get(&source_key)
            .ok_or_else(|| ClipdeckError::BufferNotFound(source_key.to_string()))?;

        let output = fx.apply(&source, params)?;
        let key = project.replace_clip_buffer(clip, output)?;

        info!(clip = clip.0, effect, from = %source_key, to = %key, "Applied effect");
        Ok(key)
    }

    /// Apply to the selected clip, or the first clip if none is selected
    pub fn apply_to_selection(
        &self,
        project: &mut Project,
        effect: &str,
        params: &EffectParams,
    ) -> Result<BufferKey, EffectError> {
        let target = project.effect_target().ok_or(EffectError::NoTarget)?;
        self.apply_to_clip(project, target, effect, params)
    }
}
