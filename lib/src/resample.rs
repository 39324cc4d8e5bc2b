//! Length-changing resampling by interpolation
//!
//! Used by pitch shifting to squeeze a time-stretched signal back to the
//! original duration.

use crate::error::VocoderError;
use std::fmt;
use std::str::FromStr;

/// Interpolation used when resampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Two-point linear interpolation
    #[default]
    Linear,
    /// Four-point Hermite interpolation
    Cubic,
}

impl Interpolation {
    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Linear => "Linear",
            Interpolation::Cubic => "Cubic",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Interpolation {
    type Err = VocoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Interpolation::Linear),
            "cubic" | "hermite" => Ok(Interpolation::Cubic),
            _ => Err(VocoderError::invalid(
                "interpolation",
                s,
                "one of linear, cubic",
            )),
        }
    }
}

/// Resample `input` to exactly `output_len` samples
pub fn resample(input: &[f64], output_len: usize, interpolation: Interpolation) -> Vec<f64> {
    match interpolation {
        Interpolation::Linear => resample_linear(input, output_len),
        Interpolation::Cubic => resample_cubic(input, output_len),
    }
}

/// Read position step so the first and last samples line up
fn step(input_len: usize, output_len: usize) -> f64 {
    (input_len - 1) as f64 / (output_len.max(2) - 1) as f64
}

/// Linear interpolation resampling
pub fn resample_linear(input: &[f64], output_len: usize) -> Vec<f64> {
    if input.is_empty() || output_len == 0 {
        return vec![0.0; output_len];
    }
    if input.len() == 1 {
        return vec![input[0]; output_len];
    }

    let ratio = step(input.len(), output_len);
    let last = input.len() - 1;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos as usize).min(last);
            let frac = pos - idx as f64;
            if idx < last {
                input[idx] * (1.0 - frac) + input[idx + 1] * frac
            } else {
                input[last]
            }
        })
        .collect()
}

/// Cubic (Hermite) interpolation resampling
pub fn resample_cubic(input: &[f64], output_len: usize) -> Vec<f64> {
    if input.len() < 4 {
        return resample_linear(input, output_len);
    }

    let ratio = step(input.len(), output_len);
    let last = input.len() - 1;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos as usize).min(last);
            let frac = pos - idx as f64;

            let s0 = input[idx.saturating_sub(1)];
            let s1 = input[idx];
            let s2 = input[(idx + 1).min(last)];
            let s3 = input[(idx + 2).min(last)];

            let c1 = 0.5 * (s2 - s0);
            let c2 = s0 - 2.5 * s1 + 2.0 * s2 - 0.5 * s3;
            let c3 = 0.5 * (s3 - s0) + 1.5 * (s1 - s2);

            ((c3 * frac + c2) * frac + c1) * frac + s1
        })
        .collect()
}
