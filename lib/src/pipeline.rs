//! Effect selection and the processing pass
//!
//! A [`Pipeline`] validates everything up front, then runs one pass per
//! channel with its own engine and phase state. Nothing is written to an
//! output buffer unless every parameter is within bounds.

use std::fmt;

use crate::effects::echo::{delay_in_samples, validate_gain};
use crate::effects::{robotize, Echo, EchoMode};
use crate::error::VocoderError;
use crate::modifier::{
    pitch_hops, pitch_shift, stretch_hops, stretched_length, time_stretch, validate_semitones,
    validate_stretch_factor, HopPair,
};
use crate::resample::Interpolation;
use crate::stft::{Resynthesis, StftEngine, MAX_FRAME_SIZE};
use crate::framer::WEIGHT_EPSILON;
use crate::window::{generate_window, min_overlap_weight, WindowKind};
use crate::Result;

/// One of the supported effects with its settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Flatten every frame's phase
    Robotize,
    /// Shift pitch by a number of semitones, keeping duration
    PitchShift { semitones: f64 },
    /// Change duration by `factor`, keeping pitch
    TimeStretch { factor: f64 },
    /// Mix in a delayed copy of the signal
    Echo { delay_seconds: f64, gain: f64 },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Robotize => "Robotize",
            Effect::PitchShift { .. } => "Pitch shift",
            Effect::TimeStretch { .. } => "Time stretch",
            Effect::Echo { .. } => "Echo",
        }
    }

    /// Check the effect's own settings
    pub fn validate(&self) -> Result<()> {
        match *self {
            Effect::Robotize => Ok(()),
            Effect::PitchShift { semitones } => validate_semitones(semitones),
            Effect::TimeStretch { factor } => validate_stretch_factor(factor),
            Effect::Echo {
                delay_seconds,
                gain,
            } => {
                if !delay_seconds.is_finite() || delay_seconds < 0.0 {
                    return Err(VocoderError::invalid(
                        "delay_seconds",
                        delay_seconds,
                        "a finite value >= 0",
                    ));
                }
                validate_gain(gain)
            }
        }
    }

    /// Output length for an input of `input_len` samples analysed every
    /// `hop_size` samples
    pub fn output_len(&self, input_len: usize, hop_size: usize) -> usize {
        match *self {
            Effect::TimeStretch { factor } => {
                let ratio = HopPair::for_stretch(hop_size, factor).map_or(factor, |h| h.ratio());
                stretched_length(input_len, ratio)
            }
            _ => input_len,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Robotize => write!(f, "Robotize"),
            Effect::PitchShift { semitones } => write!(f, "Pitch shift ({:+.2} semitones)", semitones),
            Effect::TimeStretch { factor } => write!(f, "Time stretch (x{:.3})", factor),
            Effect::Echo {
                delay_seconds,
                gain,
            } => write!(f, "Echo ({:.3} s, gain {:.2})", delay_seconds, gain),
        }
    }
}

/// Frame, hop and effect tuning shared by every pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessParams {
    pub frame_size: usize,
    /// Analysis hop; the synthesis hop is derived from the effect
    pub hop_size: usize,
    pub window: WindowKind,
    pub echo_mode: EchoMode,
    pub interpolation: Interpolation,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            window: WindowKind::Hann,
            echo_mode: EchoMode::Feedback,
            interpolation: Interpolation::Linear,
        }
    }
}

impl ProcessParams {
    /// Validated parameters with default echo mode and interpolation
    pub fn new(frame_size: usize, hop_size: usize, window: WindowKind) -> Result<Self> {
        let params = Self {
            frame_size,
            hop_size,
            window,
            ..Self::default()
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_echo_mode(mut self, echo_mode: EchoMode) -> Self {
        self.echo_mode = echo_mode;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(VocoderError::invalid("frame_size", self.frame_size, "greater than 0"));
        }
        if self.frame_size % 2 != 0 {
            return Err(VocoderError::invalid("frame_size", self.frame_size, "an even number"));
        }
        if self.frame_size > MAX_FRAME_SIZE {
            return Err(VocoderError::invalid(
                "frame_size",
                self.frame_size,
                format!("at most {}", MAX_FRAME_SIZE),
            ));
        }
        if self.hop_size == 0 {
            return Err(VocoderError::invalid("hop_size", self.hop_size, "greater than 0"));
        }
        if self.hop_size > self.frame_size {
            return Err(VocoderError::invalid(
                "hop_size",
                self.hop_size,
                format!("at most frame_size ({})", self.frame_size),
            ));
        }
        Ok(())
    }

    /// Overlap as a fraction of the frame
    pub fn overlap(&self) -> f64 {
        1.0 - self.hop_size as f64 / self.frame_size as f64
    }

    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }
}

/// Result of a pass: the waveform plus read-only analysis snapshots
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    samples: Vec<f64>,
    spectra: Vec<Vec<f64>>,
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
}

impl ProcessOutput {
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    /// Analysis magnitude spectrum per frame, empty unless captured
    pub fn spectra(&self) -> &[Vec<f64>] {
        &self.spectra
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Hop between the captured spectra
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A configured effect chain for one sample rate
#[derive(Debug, Clone)]
pub struct Pipeline {
    effect: Effect,
    params: ProcessParams,
    sample_rate: u32,
    capture_spectra: bool,
    post_echo: Option<(f64, f64)>,
}

impl Pipeline {
    /// Validate `effect` and `params` for `sample_rate`
    pub fn new(effect: Effect, params: ProcessParams, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VocoderError::invalid("sample_rate", sample_rate, "greater than 0"));
        }
        params.validate()?;
        effect.validate()?;
        match effect {
            Effect::Echo { delay_seconds, .. } => {
                delay_in_samples(delay_seconds, sample_rate)?;
            }
            Effect::TimeStretch { factor } => {
                stretch_hops(params.hop_size, factor)?;
            }
            Effect::PitchShift { semitones } => {
                pitch_hops(params.hop_size, semitones)?;
            }
            Effect::Robotize => {}
        }

        if !matches!(effect, Effect::Echo { .. }) {
            let window = generate_window(params.window, params.frame_size);
            let weight = min_overlap_weight(&window, params.hop_size);
            if weight < WEIGHT_EPSILON {
                log::warn!(
                    "{} window with hop {} leaves gaps (min overlap weight {:.2e}); those samples will be silent",
                    params.window,
                    params.hop_size,
                    weight
                );
            }
        }

        Ok(Self {
            effect,
            params,
            sample_rate,
            capture_spectra: false,
            post_echo: None,
        })
    }

    /// Keep the analysis magnitude spectra in the output
    pub fn capture_spectra(mut self, capture: bool) -> Self {
        self.capture_spectra = capture;
        self
    }

    /// Follow the spectral effect with an echo
    pub fn with_echo(mut self, delay_seconds: f64, gain: f64) -> Result<Self> {
        Effect::Echo {
            delay_seconds,
            gain,
        }
        .validate()?;
        delay_in_samples(delay_seconds, self.sample_rate)?;
        self.post_echo = Some((delay_seconds, gain));
        Ok(self)
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn params(&self) -> &ProcessParams {
        &self.params
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn check_signal(signal: &[f64]) -> Result<()> {
        if let Some(pos) = signal.iter().position(|s| !s.is_finite()) {
            return Err(VocoderError::invalid(
                "signal",
                format!("{} at sample {}", signal[pos], pos),
                "finite samples",
            ));
        }
        Ok(())
    }

    fn make_echo(&self, delay_seconds: f64, gain: f64) -> Result<Echo> {
        Echo::from_seconds(delay_seconds, gain, self.sample_rate, self.params.echo_mode)
    }

    /// Process one channel
    pub fn run(&self, signal: &[f64]) -> Result<ProcessOutput> {
        Self::check_signal(signal)?;
        let mut engine = StftEngine::new(self.params.frame_size, self.params.window)?;
        self.run_with_engine(&mut engine, signal)
    }

    fn run_with_engine(&self, engine: &mut StftEngine, signal: &[f64]) -> Result<ProcessOutput> {
        let hop = self.params.hop_size;
        let capture = self.capture_spectra;

        let Resynthesis {
            mut samples,
            magnitudes,
        } = match self.effect {
            Effect::Robotize => robotize(engine, signal, hop, capture)?,
            Effect::PitchShift { semitones } => pitch_shift(
                engine,
                signal,
                semitones,
                hop,
                self.params.interpolation,
                capture,
            )?,
            Effect::TimeStretch { factor } => time_stretch(engine, signal, factor, hop, capture)?,
            Effect::Echo {
                delay_seconds,
                gain,
            } => {
                let mut echo = self.make_echo(delay_seconds, gain)?;
                log::info!(
                    "Echo: {} samples delay, gain {:.2}, {}",
                    echo.delay_samples(),
                    gain,
                    echo.mode()
                );
                let magnitudes = if capture {
                    engine.analyze(signal, hop)?
                } else {
                    Vec::new()
                };
                Resynthesis {
                    samples: echo.process(signal),
                    magnitudes,
                }
            }
        };

        if let Some((delay_seconds, gain)) = self.post_echo {
            let mut echo = self.make_echo(delay_seconds, gain)?;
            samples = echo.process(&samples);
        }
        Ok(ProcessOutput {
            samples,
            spectra: magnitudes,
            frame_size: self.params.frame_size,
            hop_size: hop,
            sample_rate: self.sample_rate,
        })
    }

    /// Process each channel independently, in order.
    ///
    /// Every channel is checked before any of them is processed.
    pub fn run_channels(&self, channels: &[Vec<f64>]) -> Result<Vec<ProcessOutput>> {
        for channel in channels {
            Self::check_signal(channel)?;
        }

        let mut engine = StftEngine::new(self.params.frame_size, self.params.window)?;
        channels
            .iter()
            .enumerate()
            .map(|(idx, channel)| {
                log::debug!(
                    "Channel {}/{}: {} ({} samples)",
                    idx + 1,
                    channels.len(),
                    self.effect,
                    channel.len()
                );
                self.run_with_engine(&mut engine, channel)
            })
            .collect()
    }
}

/// Apply `effect` to a mono signal
pub fn process(
    signal: &[f64],
    sample_rate: u32,
    effect: &Effect,
    params: &ProcessParams,
) -> Result<Vec<f64>> {
    Pipeline::new(*effect, *params, sample_rate)?
        .run(signal)
        .map(ProcessOutput::into_samples)
}

/// Apply `effect` to each channel with independent state
pub fn process_channels(
    channels: &[Vec<f64>],
    sample_rate: u32,
    effect: &Effect,
    params: &ProcessParams,
) -> Result<Vec<Vec<f64>>> {
    let outputs = Pipeline::new(*effect, *params, sample_rate)?.run_channels(channels)?;
    Ok(outputs.into_iter().map(ProcessOutput::into_samples).collect())
}
