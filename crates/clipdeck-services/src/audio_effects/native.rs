//! Built-in buffer effects

use std::f32::consts::PI;

use clipdeck_core::AudioBuffer;
use fundsp::hacker::{db_amp, highpass_hz, lowpass_hz, AudioNode, Frame};

use super::{Effect, EffectError, EffectParam, EffectParams};

/// Highest filter cutoff as a fraction of the sample rate
const MAX_CUTOFF_RATIO: f32 = 0.45;

fn param(effect: &dyn Effect, params: &EffectParams, name: &str) -> Result<f32, EffectError> {
    let decl = effect
        .params()
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| EffectError::UnknownEffect(format!("{}.{}", effect.name(), name)))?;
    params.resolve(&decl)
}

/// Volume change in dB
#[derive(Debug, Clone, Copy, Default)]
pub struct GainEffect;

impl Effect for GainEffect {
    fn name(&self) -> &str { "gain" }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("gain", 0.0, -60.0, 24.0, "dB")]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let gain = db_amp(param(self, params, "gain")?) as f32;
        Ok(input.map_channels(|data| data.iter().map(|s| s * gain).collect())?)
    }
}

/// Ring modulation against a low sine for a metallic voice
#[derive(Debug, Clone, Copy, Default)]
pub struct RobotEffect;

impl Effect for RobotEffect {
    fn name(&self) -> &str { "robot" }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("freq", 70.0, 1.0, 1000.0, "Hz")]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let freq = param(self, params, "freq")?;
        let rate = input.sample_rate() as f32;
        Ok(input.map_channels(|data| {
            data.iter()
                .enumerate()
                .map(|(i, s)| s * (2.0 * PI * freq * (i as f32 / rate)).sin())
                .collect()
        })?)
    }
}

/// Single feedback delay line
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoEffect;

impl Effect for EchoEffect {
    fn name(&self) -> &str { "echo" }

    fn params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("time", 0.18, 0.01, 2.0, "s"),
            EffectParam::new("feedback", 0.4, 0.0, 0.95, ""),
        ]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let time = param(self, params, "time")?;
        let feedback = param(self, params, "feedback")?;
        let delay = std::cmp::max((time * input.sample_rate() as f32) as usize, 1);
        Ok(input.map_channels(|data| {
            let mut out = data.to_vec();
            for i in delay..out.len() {
                out[i] += feedback * out[i - delay];
            }
            out
        })?)
    }
}

/// Raise pitch by resampling. The result is shorter than the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct PitchUpEffect;

impl Effect for PitchUpEffect {
    fn name(&self) -> &str { "pitch" }

    fn params(&self) -> Vec<EffectParam> {
        // 1.12 is roughly two semitones
        vec![EffectParam::new("factor", 1.12, 0.25, 4.0, "x")]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let factor = param(self, params, "factor")? as f64;
        let len = (input.frames() as f64 / factor).floor() as usize;
        Ok(input.map_channels(|data| {
            (0..len)
                .map(|i| data.get((i as f64 * factor) as usize).copied().unwrap_or(0.0))
                .collect()
        })?)
    }
}

/// Scale so the loudest sample across all channels hits the target peak
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeEffect;

impl Effect for NormalizeEffect {
    fn name(&self) -> &str { "normalize" }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("peak", 1.0, 0.01, 1.0, "")]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let target = param(self, params, "peak")?;
        let peak = input.peak();
        if peak <= 0.0 {
            return Ok(input.clone());
        }
        let scale = target / peak;
        Ok(input.map_channels(|data| data.iter().map(|s| s * scale).collect())?)
    }
}

fn clamp_cutoff(cutoff: f32, sample_rate: u32) -> f32 {
    cutoff.min(sample_rate as f32 * MAX_CUTOFF_RATIO)
}

/// High-pass filter
#[derive(Debug, Clone, Copy, Default)]
pub struct HighPassEffect;

impl Effect for HighPassEffect {
    fn name(&self) -> &str { "highpass" }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("cutoff", 200.0, 20.0, 2000.0, "Hz")]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let cutoff = clamp_cutoff(param(self, params, "cutoff")?, input.sample_rate());
        let rate = input.sample_rate() as f64;
        Ok(input.map_channels(|data| {
            let mut filter = highpass_hz(cutoff, 0.707);
            filter.set_sample_rate(rate);
            data.iter()
                .map(|s| filter.tick(&Frame::from([*s]))[0])
                .collect()
        })?)
    }
}

/// Low-pass filter
#[derive(Debug, Clone, Copy, Default)]
pub struct LowPassEffect;

impl Effect for LowPassEffect {
    fn name(&self) -> &str { "lowpass" }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("cutoff", 3000.0, 200.0, 20000.0, "Hz")]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let cutoff = clamp_cutoff(param(self, params, "cutoff")?, input.sample_rate());
        let rate = input.sample_rate() as f64;
        Ok(input.map_channels(|data| {
            let mut filter = lowpass_hz(cutoff, 0.707);
            filter.set_sample_rate(rate);
            data.iter()
                .map(|s| filter.tick(&Frame::from([*s]))[0])
                .collect()
        })?)
    }
}

/// Replace isolated peaks with the mean of their neighbours
#[derive(Debug, Clone, Copy, Default)]
pub struct AntiPopEffect;

impl Effect for AntiPopEffect {
    fn name(&self) -> &str { "antipop" }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("threshold", 0.85, 0.1, 1.0, "")]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let threshold = param(self, params, "threshold")?;
        Ok(input.map_channels(|data| {
            let mut out = data.to_vec();
            for i in 1..out.len().saturating_sub(1) {
                if out[i].abs() > threshold {
                    out[i] = (out[i - 1] + out[i + 1]) / 2.0;
                }
            }
            out
        })?)
    }
}

/// Soft knee above a threshold, a cheap compressor
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftClipEffect;

impl Effect for SoftClipEffect {
    fn name(&self) -> &str { "softclip" }

    fn params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("threshold", 0.7, 0.1, 1.0, ""),
            EffectParam::new("ratio", 0.2, 0.0, 1.0, ""),
        ]
    }

    fn apply(&self, input: &AudioBuffer, params: &EffectParams) -> Result<AudioBuffer, EffectError> {
        let threshold = param(self, params, "threshold")?;
        let ratio = param(self, params, "ratio")?;
        Ok(input.map_channels(|data| {
            data.iter()
                .map(|&s| {
                    if s > threshold {
                        threshold + ratio * (s - threshold)
                    } else if s < -threshold {
                        -threshold + ratio * (s + threshold)
                    } else {
                        s
                    }
                })
                .collect()
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: Vec<f32>) -> AudioBuffer {
        AudioBuffer::from_mono(samples, 100).unwrap()
    }

    fn run(effect: &dyn Effect, input: &AudioBuffer) -> Vec<f32> {
        effect
            .apply(input, &EffectParams::new())
            .unwrap()
            .channel(0)
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_gain_db() {
        let params = EffectParams::new().with("gain", -6.0);
        let out = GainEffect.apply(&mono(vec![1.0, -1.0]), &params).unwrap();
        let left = out.channel(0).unwrap();
        assert!((left[0] - 0.501).abs() < 0.01);
        assert!((left[1] + 0.501).abs() < 0.01);
    }

    #[test]
    fn test_echo_feeds_back() {
        let mut input = vec![0.0; 60];
        input[0] = 1.0;
        let out = run(&EchoEffect, &mono(input));
        // 0.18 s at 100 Hz is 18 samples
        assert_eq!(out[18], 0.4);
        assert!((out[36] - 0.16).abs() < 1e-6);
        assert_eq!(out[17], 0.0);
    }

    #[test]
    fn test_echo_short_delay_at_low_rate() {
        // 0.01 s at 50 Hz rounds down to zero samples; the delay line keeps one
        let mut input = vec![0.0; 4];
        input[0] = 1.0;
        let params = EffectParams::new().with("time", 0.01);
        let out = EchoEffect.apply(&AudioBuffer::from_mono(input, 50).unwrap(), &params).unwrap();
        let left = out.channel(0).unwrap();
        assert!((left[1] - 0.4).abs() < 1e-6);
        assert!((left[2] - 0.16).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_resamples() {
        let input: Vec<f32> = (0..113).map(|i| i as f32).collect();
        let out = run(&PitchUpEffect, &mono(input));
        assert_eq!(out.len(), 100);
        assert_eq!(out[1], 1.0);
        assert_eq!(out[50], 56.0);
    }

    #[test]
    fn test_normalize_silence_is_untouched() {
        let out = run(&NormalizeEffect, &mono(vec![0.0; 8]));
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_antipop_smooths_spike() {
        let out = run(&AntiPopEffect, &mono(vec![0.1, 0.95, 0.3, 0.2]));
        assert!((out[1] - 0.2).abs() < 1e-6);
        assert_eq!(out[0], 0.1);
    }

    #[test]
    fn test_softclip_knee() {
        let out = run(&SoftClipEffect, &mono(vec![0.5, 1.0, -1.0]));
        assert_eq!(out[0], 0.5);
        assert!((out[1] - 0.76).abs() < 1e-6);
        assert!((out[2] + 0.76).abs() < 1e-6);
    }

    #[test]
    fn test_robot_starts_silent() {
        let out = run(&RobotEffect, &mono(vec![1.0; 10]));
        assert_eq!(out[0], 0.0);
        assert!(out.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_highpass_removes_dc() {
        let input = AudioBuffer::from_mono(vec![1.0; 4800], 48000).unwrap();
        let out = HighPassEffect.apply(&input, &EffectParams::new()).unwrap();
        let tail = &out.channel(0).unwrap()[4000..];
        assert!(tail.iter().all(|s| s.abs() < 0.05));
    }

    #[test]
    fn test_lowpass_keeps_dc() {
        let input = AudioBuffer::from_mono(vec![1.0; 4800], 48000).unwrap();
        let out = LowPassEffect.apply(&input, &EffectParams::new()).unwrap();
        let last = *out.channel(0).unwrap().last().unwrap();
        assert!((last - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_effects_keep_channel_count() {
        let stereo = AudioBuffer::new(vec![vec![0.2; 50], vec![-0.2; 50]], 100).unwrap();
        let out = EchoEffect.apply(&stereo, &EffectParams::new()).unwrap();
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.sample_rate(), 100);
    }
}
