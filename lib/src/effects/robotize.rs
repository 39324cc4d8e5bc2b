//! Robot voice: every frame is resynthesized with zero phase
//!
//! Discarding phase turns each frame into a pulse centred on the frame, so
//! the output repeats once per hop. Its pitch is `sample_rate / hop_size`
//! whatever the pitch of the input.

use crate::modifier::HopPair;
use crate::stft::{Resynthesis, StftEngine};
use crate::Result;
use num_complex::Complex64;

/// Keep each bin's magnitude and force its phase to zero
pub fn robotize_frame(spectrum: &mut [Complex64]) {
    for bin in spectrum.iter_mut() {
        *bin = Complex64::new(bin.norm(), 0.0);
    }
}

/// Robotize `signal` with analysis and synthesis both at `hop`
pub fn robotize(
    engine: &mut StftEngine,
    signal: &[f64],
    hop: usize,
    capture_spectra: bool,
) -> Result<Resynthesis> {
    let hops = HopPair::new(hop, hop)?;
    log::info!(
        "Robotize: N={} hop={} ({} samples)",
        engine.frame_size(),
        hop,
        signal.len()
    );
    engine.resynthesize(signal, hops, signal.len(), capture_spectra, robotize_frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowKind;
    use std::f64::consts::PI;

    fn max_lag_difference(signal: &[f64], lag: usize, range: std::ops::Range<usize>) -> f64 {
        range
            .map(|i| (signal[i] - signal[i + lag]).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_frame_phases_are_zero() {
        let mut spectrum = vec![
            Complex64::new(3.0, 4.0),
            Complex64::new(-1.0, 0.0),
            Complex64::new(0.0, -2.0),
        ];
        robotize_frame(&mut spectrum);
        assert_eq!(
            spectrum,
            vec![
                Complex64::new(5.0, 0.0),
                Complex64::new(1.0, 0.0),
                Complex64::new(2.0, 0.0)
            ]
        );
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut engine = StftEngine::new(1024, WindowKind::Hann).unwrap();
        let signal = vec![0.0; 8000];
        let output = robotize(&mut engine, &signal, 256, false).unwrap();
        assert_eq!(output.samples.len(), signal.len());
        assert!(output.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_output_repeats_every_hop() {
        let sample_rate = 44100.0;
        let hop = 512;
        let signal: Vec<f64> = (0..44100)
            .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f64 / sample_rate).sin())
            .collect();

        let mut engine = StftEngine::new(2048, WindowKind::Hann).unwrap();
        let output = robotize(&mut engine, &signal, hop, false).unwrap();

        let peak = output.samples.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        assert!(peak > 0.01, "robotized output is nearly silent: {}", peak);

        let steady = 4096..40000;
        let output_diff = max_lag_difference(&output.samples, hop, steady.clone());
        assert!(
            output_diff < 1e-3 * peak,
            "output not periodic at the hop: {} (peak {})",
            output_diff,
            peak
        );

        // The input itself is not periodic at the hop, so the period comes
        // from the framing rather than the source.
        let input_diff = max_lag_difference(&signal, hop, steady);
        assert!(input_diff > 0.1, "input unexpectedly periodic: {}", input_diff);
    }
}
