//! Echo: a circular delay line mixed back into the signal
//!
//! `output[n] = input[n] + gain * line[(n - delay) mod delay]`. In feedback
//! mode the line stores the output, so every echo repeats and decays by
//! `gain`; in single-tap mode it stores the input and only one echo is heard.

use crate::error::VocoderError;
use crate::Result;
use std::fmt;
use std::str::FromStr;

/// What the delay line records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoMode {
    /// Record the output; echoes repeat with geometric decay
    #[default]
    Feedback,
    /// Record the input; a single echo
    SingleTap,
}

impl EchoMode {
    pub fn name(&self) -> &'static str {
        match self {
            EchoMode::Feedback => "Feedback",
            EchoMode::SingleTap => "Single tap",
        }
    }
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EchoMode {
    type Err = VocoderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "feedback" => Ok(EchoMode::Feedback),
            "single" | "single_tap" | "single-tap" | "tap" => Ok(EchoMode::SingleTap),
            _ => Err(VocoderError::invalid(
                "echo_mode",
                s,
                "one of feedback, single",
            )),
        }
    }
}

/// Check a gain is in `[0, 1)`
pub fn validate_gain(gain: f64) -> Result<()> {
    if !(0.0..1.0).contains(&gain) {
        return Err(VocoderError::invalid("gain", gain, "a value in [0, 1)"));
    }
    Ok(())
}

/// Convert a delay in seconds to whole samples, rejecting negative,
/// non-finite, and sub-sample delays
pub fn delay_in_samples(delay_seconds: f64, sample_rate: u32) -> Result<usize> {
    if !delay_seconds.is_finite() || delay_seconds < 0.0 {
        return Err(VocoderError::invalid(
            "delay_seconds",
            delay_seconds,
            "a finite value >= 0",
        ));
    }

    let samples = (delay_seconds * sample_rate as f64).round() as usize;
    if samples == 0 {
        return Err(VocoderError::invalid(
            "delay_seconds",
            delay_seconds,
            format!("at least one sample period ({:.6} s)", 1.0 / sample_rate as f64),
        ));
    }
    Ok(samples)
}

/// Delay line state for one channel
#[derive(Debug, Clone)]
pub struct Echo {
    line: Vec<f64>,
    position: usize,
    gain: f64,
    mode: EchoMode,
}

impl Echo {
    pub fn new(delay_samples: usize, gain: f64, mode: EchoMode) -> Result<Self> {
        if delay_samples == 0 {
            return Err(VocoderError::invalid("delay_samples", delay_samples, "at least 1"));
        }
        validate_gain(gain)?;

        Ok(Self {
            line: vec![0.0; delay_samples],
            position: 0,
            gain,
            mode,
        })
    }

    pub fn from_seconds(
        delay_seconds: f64,
        gain: f64,
        sample_rate: u32,
        mode: EchoMode,
    ) -> Result<Self> {
        let delay_samples = delay_in_samples(delay_seconds, sample_rate)?;
        Self::new(delay_samples, gain, mode)
    }

    pub fn delay_samples(&self) -> usize {
        self.line.len()
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn mode(&self) -> EchoMode {
        self.mode
    }

    /// Clear the delay line
    pub fn reset(&mut self) {
        self.line.fill(0.0);
        self.position = 0;
    }

    #[inline]
    pub fn process_sample(&mut self, input: f64) -> f64 {
        let delayed = self.line[self.position];
        let output = input + self.gain * delayed;

        self.line[self.position] = match self.mode {
            EchoMode::Feedback => output,
            EchoMode::SingleTap => input,
        };
        self.position += 1;
        if self.position == self.line.len() {
            self.position = 0;
        }

        output
    }

    /// Run a whole buffer through the delay line
    pub fn process(&mut self, signal: &[f64]) -> Vec<f64> {
        signal.iter().map(|&s| self.process_sample(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize) -> Vec<f64> {
        let mut signal = vec![0.0; len];
        signal[0] = 1.0;
        signal
    }

    #[test]
    fn test_single_tap_produces_one_echo() {
        let mut echo = Echo::new(4, 0.5, EchoMode::SingleTap).unwrap();
        let output = echo.process(&impulse(16));
        let mut expected = vec![0.0; 16];
        expected[0] = 1.0;
        expected[4] = 0.5;
        assert_eq!(output, expected);
    }

    #[test]
    fn test_feedback_repeats_with_decay() {
        let mut echo = Echo::new(3, 0.5, EchoMode::Feedback).unwrap();
        let output = echo.process(&impulse(13));
        assert_eq!(output[0], 1.0);
        assert_eq!(output[3], 0.5);
        assert_eq!(output[6], 0.25);
        assert_eq!(output[9], 0.125);
        assert_eq!(output[12], 0.0625);
        assert_eq!(output[1], 0.0);
        assert_eq!(output[4], 0.0);
    }

    #[test]
    fn test_feedback_energy_decays() {
        let mut echo = Echo::new(100, 0.95, EchoMode::Feedback).unwrap();
        let output = echo.process(&impulse(200_000));
        assert!(output.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        let tail = output[190_000..].iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        assert!(tail < 1e-20, "tail still at {}", tail);
    }

    #[test]
    fn test_feedback_bounded_for_sustained_input() {
        let gain = 0.9;
        let mut echo = Echo::new(37, gain, EchoMode::Feedback).unwrap();
        let input: Vec<f64> = (0..100_000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let output = echo.process(&input);
        let bound = 1.0 / (1.0 - gain) + 1e-9;
        assert!(output.iter().all(|s| s.abs() <= bound));
    }

    #[test]
    fn test_gain_validation() {
        assert!(Echo::new(10, 1.0, EchoMode::Feedback).is_err());
        assert!(Echo::new(10, -0.1, EchoMode::Feedback).is_err());
        assert!(Echo::new(10, f64::NAN, EchoMode::Feedback).is_err());
        assert!(Echo::new(10, 0.0, EchoMode::Feedback).is_ok());
        let err = Echo::new(10, 1.0, EchoMode::Feedback).unwrap_err();
        assert_eq!(err.parameter(), Some("gain"));
    }

    #[test]
    fn test_delay_validation() {
        assert_eq!(delay_in_samples(0.5, 44100).unwrap(), 22050);
        let err = delay_in_samples(-1.0, 44100).unwrap_err();
        assert_eq!(err.parameter(), Some("delay_seconds"));
        assert!(delay_in_samples(0.0, 44100).is_err());
        assert!(delay_in_samples(f64::INFINITY, 44100).is_err());
    }

    #[test]
    fn test_reset_clears_line() {
        let mut echo = Echo::new(2, 0.5, EchoMode::Feedback).unwrap();
        echo.process(&[1.0, 0.0]);
        echo.reset();
        assert_eq!(echo.process(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("single".parse::<EchoMode>().unwrap(), EchoMode::SingleTap);
        assert_eq!("Feedback".parse::<EchoMode>().unwrap(), EchoMode::Feedback);
        assert!("pingpong".parse::<EchoMode>().is_err());
    }
}
