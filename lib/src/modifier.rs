//! Time and pitch scale modification
//!
//! Time stretching reads analysis frames every `Ha` samples and writes
//! synthesis frames every `Hs` samples through the phase vocoder. Pitch
//! shifting stretches by the pitch ratio and resamples back to the input
//! length.

use crate::error::VocoderError;
use crate::phase::PhaseVocoder;
use crate::resample::{resample, Interpolation};
use crate::stft::{Resynthesis, StftEngine};
use crate::Result;

/// Smallest accepted time-stretch factor
pub const MIN_STRETCH_FACTOR: f64 = 1.0 / 32.0;
/// Largest accepted time-stretch factor
pub const MAX_STRETCH_FACTOR: f64 = 32.0;
/// Pitch shifts are limited to five octaves either way
pub const MAX_SEMITONES: f64 = 60.0;

/// Largest relative gap between the requested stretch factor and `Hs / Ha`
pub const MAX_STRETCH_ERROR: f64 = 0.05;
/// Largest gap, in semitones, between the requested and effective pitch shift
pub const MAX_PITCH_ERROR_SEMITONES: f64 = 0.25;

/// Factors outside this range still work but sound noticeably worse
const QUALITY_RANGE: std::ops::RangeInclusive<f64> = 0.25..=4.0;

/// Analysis and synthesis hop sizes, both at least one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopPair {
    analysis: usize,
    synthesis: usize,
}

impl HopPair {
    pub fn new(analysis: usize, synthesis: usize) -> Result<Self> {
        if analysis == 0 {
            return Err(VocoderError::invalid("analysis_hop", analysis, "at least 1 sample"));
        }
        if synthesis == 0 {
            return Err(VocoderError::invalid("synthesis_hop", synthesis, "at least 1 sample"));
        }
        Ok(Self {
            analysis,
            synthesis,
        })
    }

    /// Hops for a stretch by `factor`; the synthesis hop is rounded and
    /// clamped to at least one sample.
    pub fn for_stretch(analysis: usize, factor: f64) -> Result<Self> {
        validate_stretch_factor(factor)?;
        let synthesis = ((analysis as f64 * factor).round() as usize).max(1);
        Self::new(analysis, synthesis)
    }

    pub fn analysis(&self) -> usize {
        self.analysis
    }

    pub fn synthesis(&self) -> usize {
        self.synthesis
    }

    /// Effective stretch factor `Hs / Ha`
    pub fn ratio(&self) -> f64 {
        self.synthesis as f64 / self.analysis as f64
    }
}

/// Hops for a time stretch by `factor`.
///
/// Fails when rounding (or clamping to one sample) moves `Hs / Ha` more than
/// [`MAX_STRETCH_ERROR`] away from `factor`.
pub fn stretch_hops(analysis_hop: usize, factor: f64) -> Result<HopPair> {
    let hops = HopPair::for_stretch(analysis_hop, factor)?;
    let error = (hops.ratio() / factor - 1.0).abs();
    if error > MAX_STRETCH_ERROR {
        return Err(VocoderError::invalid(
            "hop_size",
            analysis_hop,
            format!(
                "a hop large enough to stretch by x{} (Hs/Ha = {}/{} is off by {:.1}%)",
                factor,
                hops.synthesis(),
                hops.analysis(),
                error * 100.0
            ),
        ));
    }
    Ok(hops)
}

/// Hops for a pitch shift by `semitones`, rejecting hops whose rounded
/// ratio misses the shift by more than [`MAX_PITCH_ERROR_SEMITONES`].
pub fn pitch_hops(analysis_hop: usize, semitones: f64) -> Result<HopPair> {
    validate_semitones(semitones)?;
    let hops = HopPair::for_stretch(analysis_hop, pitch_ratio(semitones))?;
    let effective = 12.0 * hops.ratio().log2();
    if (effective - semitones).abs() > MAX_PITCH_ERROR_SEMITONES {
        return Err(VocoderError::invalid(
            "hop_size",
            analysis_hop,
            format!(
                "a hop large enough to shift by {:+} semitones (Hs/Ha = {}/{} gives {:+.2})",
                semitones,
                hops.synthesis(),
                hops.analysis(),
                effective
            ),
        ));
    }
    Ok(hops)
}

/// Frequency ratio for a shift of `semitones`
pub fn pitch_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Output length of a stretch by `factor`
pub fn stretched_length(input_len: usize, factor: f64) -> usize {
    (input_len as f64 * factor).round() as usize
}

pub fn validate_stretch_factor(factor: f64) -> Result<()> {
    if !factor.is_finite() || !(MIN_STRETCH_FACTOR..=MAX_STRETCH_FACTOR).contains(&factor) {
        return Err(VocoderError::invalid(
            "factor",
            factor,
            format!(
                "a finite value in {}..={}",
                MIN_STRETCH_FACTOR, MAX_STRETCH_FACTOR
            ),
        ));
    }
    Ok(())
}

pub fn validate_semitones(semitones: f64) -> Result<()> {
    if !semitones.is_finite() || semitones.abs() > MAX_SEMITONES {
        return Err(VocoderError::invalid(
            "semitones",
            semitones,
            format!("a finite value in -{0}..={0}", MAX_SEMITONES),
        ));
    }
    Ok(())
}

fn warn_on_extreme_ratio(ratio: f64) {
    if !QUALITY_RANGE.contains(&ratio) {
        log::warn!(
            "Stretch ratio {:.3} is outside {:.2}..={:.2}; expect smeared transients and phasiness",
            ratio,
            QUALITY_RANGE.start(),
            QUALITY_RANGE.end()
        );
    }
}

/// Stretch `signal` by `factor` without changing pitch.
///
/// The output holds `round(len * Hs / Ha)` samples, so every analysis frame
/// up to the end of the input lands in it.
pub fn time_stretch(
    engine: &mut StftEngine,
    signal: &[f64],
    factor: f64,
    analysis_hop: usize,
    capture_spectra: bool,
) -> Result<Resynthesis> {
    let hops = stretch_hops(analysis_hop, factor)?;
    warn_on_extreme_ratio(hops.ratio());

    let output_len = stretched_length(signal.len(), hops.ratio());
    log::info!(
        "Time stretch x{:.4} (effective {:.4}): Ha={} Hs={} ({} -> {} samples)",
        factor,
        hops.ratio(),
        hops.analysis(),
        hops.synthesis(),
        signal.len(),
        output_len
    );

    stretch_with_hops(engine, signal, hops, output_len, capture_spectra)
}

/// Shift pitch by `semitones` while keeping the input length
pub fn pitch_shift(
    engine: &mut StftEngine,
    signal: &[f64],
    semitones: f64,
    analysis_hop: usize,
    interpolation: Interpolation,
    capture_spectra: bool,
) -> Result<Resynthesis> {
    let ratio = pitch_ratio(semitones);
    let hops = pitch_hops(analysis_hop, semitones)?;
    warn_on_extreme_ratio(hops.ratio());

    // The resampler undoes the effective hop ratio, so the pitch lands on
    // Hs/Ha rather than the unrounded ratio.
    let stretched_len = stretched_length(signal.len(), hops.ratio());
    log::info!(
        "Pitch shift {:+.2} semitones: ratio {:.4} (effective {:.4}), Ha={} Hs={}",
        semitones,
        ratio,
        hops.ratio(),
        hops.analysis(),
        hops.synthesis()
    );

    let mut stretched = stretch_with_hops(engine, signal, hops, stretched_len, capture_spectra)?;
    stretched.samples = resample(&stretched.samples, signal.len(), interpolation);
    Ok(stretched)
}

fn stretch_with_hops(
    engine: &mut StftEngine,
    signal: &[f64],
    hops: HopPair,
    output_len: usize,
    capture_spectra: bool,
) -> Result<Resynthesis> {
    let mut vocoder = PhaseVocoder::new(engine.frame_size(), hops);
    engine.resynthesize(signal, hops, output_len, capture_spectra, |spectrum| {
        vocoder.process_frame(spectrum)
    })
}
