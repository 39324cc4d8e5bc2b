//! Phase vocoder core
//!
//! Tracks per-bin phase across consecutive analysis frames, estimates each
//! bin's instantaneous frequency from the wrapped phase difference, and
//! advances a synthesis phase accumulator by that frequency over the
//! synthesis hop. Magnitudes pass through untouched.

use crate::modifier::HopPair;
use num_complex::Complex64;
use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Bins quieter than this have no meaningful phase; their previous
/// analysis phase is carried forward instead.
pub const MAGNITUDE_FLOOR: f64 = 1e-12;

/// Map any angle in radians into `(-π, π]`
pub fn principal_angle(angle: f64) -> f64 {
    let wrapped = angle - TWO_PI * (angle / TWO_PI).round();
    if wrapped <= -PI {
        wrapped + TWO_PI
    } else if wrapped > PI {
        wrapped - TWO_PI
    } else {
        wrapped
    }
}

/// Per-pass phase state for one channel
#[derive(Debug, Clone)]
pub struct PhaseVocoder {
    hops: HopPair,
    /// Centre frequency of each bin in radians per sample, `2πk/N`
    bin_omega: Vec<f64>,
    /// Raw analysis phase of the previous frame
    prev_phase: Vec<f64>,
    /// Synthesis phase applied to the most recent output frame
    phase_accum: Vec<f64>,
    /// Instantaneous frequency estimate from the most recent frame
    true_freq: Vec<f64>,
    started: bool,
}

impl PhaseVocoder {
    /// Create state for frames of `frame_size` samples driven at `hops`
    pub fn new(frame_size: usize, hops: HopPair) -> Self {
        let num_bins = frame_size / 2 + 1;
        let bin_omega = (0..num_bins)
            .map(|k| TWO_PI * k as f64 / frame_size as f64)
            .collect();

        Self {
            hops,
            bin_omega,
            prev_phase: vec![0.0; num_bins],
            phase_accum: vec![0.0; num_bins],
            true_freq: vec![0.0; num_bins],
            started: false,
        }
    }

    pub fn hops(&self) -> HopPair {
        self.hops
    }

    pub fn num_bins(&self) -> usize {
        self.bin_omega.len()
    }

    /// Forget all phase history; the next frame starts a new pass
    pub fn reset(&mut self) {
        self.prev_phase.fill(0.0);
        self.phase_accum.fill(0.0);
        self.true_freq.fill(0.0);
        self.started = false;
    }

    /// Synthesis phases, one per bin, as applied to the last frame
    pub fn phase_accumulator(&self) -> &[f64] {
        &self.phase_accum
    }

    /// Instantaneous frequency per bin (radians per sample) from the last frame
    pub fn instantaneous_frequencies(&self) -> &[f64] {
        &self.true_freq
    }

    /// Replace an analysis spectrum with its resynthesis spectrum in place.
    ///
    /// The first frame after construction or [`reset`](Self::reset) keeps
    /// its own phases; every later frame gets phases advanced by the
    /// estimated instantaneous frequency times the synthesis hop.
    pub fn process_frame(&mut self, spectrum: &mut [Complex64]) {
        debug_assert_eq!(spectrum.len(), self.num_bins());

        let ha = self.hops.analysis() as f64;
        let hs = self.hops.synthesis() as f64;

        for (k, bin) in spectrum.iter_mut().enumerate() {
            let magnitude = bin.norm();
            let phase = if magnitude > MAGNITUDE_FLOOR {
                bin.arg()
            } else {
                self.prev_phase[k]
            };

            if self.started {
                let omega = self.bin_omega[k];
                let delta = phase - self.prev_phase[k];
                let deviation = principal_angle(delta - omega * ha);
                let freq = omega + deviation / ha;
                self.true_freq[k] = freq;
                self.phase_accum[k] = principal_angle(self.phase_accum[k] + freq * hs);
            } else {
                self.true_freq[k] = self.bin_omega[k];
                self.phase_accum[k] = phase;
            }

            self.prev_phase[k] = phase;
            *bin = Complex64::from_polar(magnitude, self.phase_accum[k]);
        }

        self.started = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::extract_frame;
    use crate::transform::SpectralTransform;
    use crate::window::{generate_window, WindowKind};

    #[test]
    fn test_principal_angle_range() {
        assert!((principal_angle(0.0)).abs() < 1e-15);
        assert!((principal_angle(PI) - PI).abs() < 1e-12);
        assert!((principal_angle(-PI) - PI).abs() < 1e-12);
        assert!((principal_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((principal_angle(TWO_PI + 0.25) - 0.25).abs() < 1e-12);
        assert!((principal_angle(-TWO_PI - 0.25) + 0.25).abs() < 1e-12);

        for i in -1000..1000 {
            let a = principal_angle(i as f64 * 0.137);
            assert!(a > -PI && a <= PI, "{} out of range", a);
        }
    }

    #[test]
    fn test_first_frame_keeps_analysis_phase() {
        let hops = HopPair::new(128, 256).unwrap();
        let mut pv = PhaseVocoder::new(8, hops);
        let original: Vec<Complex64> = (0..5)
            .map(|k| Complex64::from_polar(1.0 + k as f64, 0.3 * k as f64))
            .collect();
        let mut spectrum = original.clone();

        pv.process_frame(&mut spectrum);

        for (a, b) in original.iter().zip(&spectrum) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_identity_hops_preserve_phase() {
        let hops = HopPair::new(64, 64).unwrap();
        let mut pv = PhaseVocoder::new(16, hops);

        for frame in 0..20 {
            let original: Vec<Complex64> = (0..9)
                .map(|k| Complex64::from_polar(1.0, 0.41 * (k * frame) as f64 + 0.1 * k as f64))
                .collect();
            let mut spectrum = original.clone();
            pv.process_frame(&mut spectrum);

            for (k, (a, b)) in original.iter().zip(&spectrum).enumerate() {
                assert!(
                    (a - b).norm() < 1e-9,
                    "frame {} bin {}: {} vs {}",
                    frame,
                    k,
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_estimates_off_centre_frequency() {
        let size = 1024;
        let hop = 256;
        let sample_rate = 44100.0;
        let freq_hz = 1000.0;
        let signal: Vec<f64> = (0..size * 4)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / sample_rate).sin())
            .collect();

        let window = generate_window(WindowKind::Hann, size);
        let mut transform = SpectralTransform::new(size).unwrap();
        let mut pv = PhaseVocoder::new(size, HopPair::new(hop, hop).unwrap());
        let mut spectrum = vec![Complex64::new(0.0, 0.0); transform.num_bins()];

        for m in 0..2 {
            let frame = extract_frame(&signal, (m * hop) as isize, &window);
            transform.forward(&frame, &mut spectrum).unwrap();
            pv.process_frame(&mut spectrum);
        }

        let bin = (freq_hz * size as f64 / sample_rate).round() as usize;
        let expected = 2.0 * PI * freq_hz / sample_rate;
        let estimated = pv.instantaneous_frequencies()[bin];
        assert!(
            (estimated - expected).abs() < 1e-6,
            "estimated {} expected {}",
            estimated,
            expected
        );
    }

    #[test]
    fn test_silent_bins_stay_finite() {
        let hops = HopPair::new(128, 512).unwrap();
        let mut pv = PhaseVocoder::new(32, hops);
        for _ in 0..10 {
            let mut spectrum = vec![Complex64::new(0.0, 0.0); 17];
            pv.process_frame(&mut spectrum);
            assert!(spectrum.iter().all(|c| c.re == 0.0 && c.im == 0.0));
            assert!(pv.phase_accumulator().iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn test_stretch_scales_phase_advance() {
        let hops = HopPair::new(100, 200).unwrap();
        let mut pv = PhaseVocoder::new(1000, hops);
        let k = 3;
        let omega = TWO_PI * k as f64 / 1000.0;

        let mut spectrum = vec![Complex64::new(0.0, 0.0); 501];
        spectrum[k] = Complex64::from_polar(1.0, 0.0);
        pv.process_frame(&mut spectrum);

        let mut spectrum = vec![Complex64::new(0.0, 0.0); 501];
        spectrum[k] = Complex64::from_polar(1.0, principal_angle(omega * 100.0));
        pv.process_frame(&mut spectrum);

        let expected = principal_angle(omega * 200.0);
        assert!((pv.phase_accumulator()[k] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restarts_pass() {
        let hops = HopPair::new(64, 128).unwrap();
        let mut pv = PhaseVocoder::new(16, hops);
        let mut spectrum = vec![Complex64::from_polar(1.0, 0.5); 9];
        pv.process_frame(&mut spectrum);
        pv.process_frame(&mut spectrum);

        pv.reset();
        let mut spectrum = vec![Complex64::from_polar(1.0, -1.0); 9];
        pv.process_frame(&mut spectrum);
        assert!(pv.phase_accumulator().iter().all(|&p| (p + 1.0).abs() < 1e-12));
    }
}
