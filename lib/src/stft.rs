//! Short-Time Fourier Transform analysis and resynthesis
//!
//! Frames are centred: frame `m` covers input samples around `m * Ha` and its
//! resynthesis lands around output sample `m * Hs`, with the signal
//! implicitly zero-padded by half a frame on each side. Output is normalized
//! by the accumulated squared window weight.

use crate::error::VocoderError;
use crate::framer::{extract_frame_into, OverlapAdd};
use crate::modifier::HopPair;
use crate::transform::SpectralTransform;
use crate::window::{generate_window, WindowKind};
use crate::Result;
use num_complex::Complex64;

/// Largest accepted frame size
pub const MAX_FRAME_SIZE: usize = 65536;

/// Samples produced by one pass, plus the analysis magnitudes if captured
#[derive(Debug, Clone, Default)]
pub struct Resynthesis {
    pub samples: Vec<f64>,
    /// One magnitude spectrum (`N/2 + 1` bins) per analysis frame
    pub magnitudes: Vec<Vec<f64>>,
}

/// Window, transform and scratch buffers for one frame size.
///
/// An engine holds no state between passes, but its buffers are reused, so
/// each channel being processed concurrently needs its own engine.
pub struct StftEngine {
    window_kind: WindowKind,
    window: Vec<f64>,
    transform: SpectralTransform,
    frame: Vec<f64>,
    spectrum: Vec<Complex64>,
}

impl StftEngine {
    /// Create an engine for frames of `frame_size` samples
    pub fn new(frame_size: usize, window_kind: WindowKind) -> Result<Self> {
        if frame_size > MAX_FRAME_SIZE {
            return Err(VocoderError::invalid(
                "frame_size",
                frame_size,
                format!("at most {}", MAX_FRAME_SIZE),
            ));
        }

        let transform = SpectralTransform::new(frame_size)?;
        let spectrum = vec![Complex64::new(0.0, 0.0); transform.num_bins()];

        Ok(Self {
            window_kind,
            window: generate_window(window_kind, frame_size),
            transform,
            frame: vec![0.0; frame_size],
            spectrum,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.transform.size()
    }

    pub fn num_bins(&self) -> usize {
        self.transform.num_bins()
    }

    pub fn window_kind(&self) -> WindowKind {
        self.window_kind
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Number of frames needed to cover `output_len` samples at hop `hop`
    pub fn frame_count(output_len: usize, hop: usize) -> usize {
        output_len.div_ceil(hop.max(1)) + 1
    }

    /// Run one analysis/resynthesis pass.
    ///
    /// Each analysis spectrum is handed to `modify` before the inverse
    /// transform. The result holds exactly `output_len` samples.
    pub fn resynthesize<F>(
        &mut self,
        signal: &[f64],
        hops: HopPair,
        output_len: usize,
        capture_spectra: bool,
        mut modify: F,
    ) -> Result<Resynthesis>
    where
        F: FnMut(&mut [Complex64]),
    {
        let frame_size = self.frame_size();
        let pad = frame_size / 2;
        let num_frames = Self::frame_count(output_len, hops.synthesis());

        log::debug!(
            "Resynthesizing {} frames (N={}, Ha={}, Hs={}) into {} samples",
            num_frames,
            frame_size,
            hops.analysis(),
            hops.synthesis(),
            output_len
        );

        let mut accumulator = OverlapAdd::new((num_frames - 1) * hops.synthesis() + frame_size);
        let mut magnitudes = if capture_spectra {
            Vec::with_capacity(num_frames)
        } else {
            Vec::new()
        };

        for frame_idx in 0..num_frames {
            let offset = (frame_idx * hops.analysis()) as isize - pad as isize;
            extract_frame_into(signal, offset, &self.window, &mut self.frame);
            self.transform.forward(&self.frame, &mut self.spectrum)?;

            if capture_spectra {
                magnitudes.push(self.spectrum.iter().map(|c| c.norm()).collect());
            }

            modify(&mut self.spectrum);

            self.transform.inverse(&self.spectrum, &mut self.frame)?;
            accumulator.add(&self.frame, frame_idx * hops.synthesis(), &self.window);
        }

        Ok(Resynthesis {
            samples: accumulator.finish(pad, output_len),
            magnitudes,
        })
    }

    /// Magnitude spectra of `signal` at hop `hop`, without resynthesis
    pub fn analyze(&mut self, signal: &[f64], hop: usize) -> Result<Vec<Vec<f64>>> {
        if hop == 0 {
            return Err(VocoderError::invalid("hop_size", hop, "at least 1 sample"));
        }

        let pad = self.frame_size() / 2;
        let num_frames = Self::frame_count(signal.len(), hop);
        let mut magnitudes = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let offset = (frame_idx * hop) as isize - pad as isize;
            extract_frame_into(signal, offset, &self.window, &mut self.frame);
            self.transform.forward(&self.frame, &mut self.spectrum)?;
            magnitudes.push(self.spectrum.iter().map(|c| c.norm()).collect());
        }

        Ok(magnitudes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn test_signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 44100.0;
                0.6 * (2.0 * PI * 440.0 * t).sin() + 0.3 * (2.0 * PI * 1250.0 * t).cos()
            })
            .collect()
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(StftEngine::frame_count(0, 256), 1);
        assert_eq!(StftEngine::frame_count(256, 256), 2);
        assert_eq!(StftEngine::frame_count(257, 256), 3);
    }

    #[test]
    fn test_unmodified_pass_reconstructs_signal() {
        let mut engine = StftEngine::new(1024, WindowKind::Hann).unwrap();
        let signal = test_signal(10000);
        let hops = HopPair::new(256, 256).unwrap();

        let result = engine
            .resynthesize(&signal, hops, signal.len(), false, |_| {})
            .unwrap();

        assert_eq!(result.samples.len(), signal.len());
        assert!(result.magnitudes.is_empty());
        let max_error = signal
            .iter()
            .zip(&result.samples)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(max_error < 1e-9, "max reconstruction error {}", max_error);
    }

    #[test]
    fn test_reconstruction_with_every_window() {
        let signal = test_signal(5000);
        for &kind in WindowKind::all() {
            let mut engine = StftEngine::new(512, kind).unwrap();
            let hops = HopPair::new(128, 128).unwrap();
            let result = engine
                .resynthesize(&signal, hops, signal.len(), false, |_| {})
                .unwrap();
            let max_error = signal
                .iter()
                .zip(&result.samples)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            assert!(max_error < 1e-9, "{}: max error {}", kind, max_error);
        }
    }

    #[test]
    fn test_capture_matches_analysis() {
        let mut engine = StftEngine::new(256, WindowKind::Hann).unwrap();
        let signal = test_signal(2000);
        let hops = HopPair::new(64, 64).unwrap();

        let captured = engine
            .resynthesize(&signal, hops, signal.len(), true, |_| {})
            .unwrap()
            .magnitudes;
        let analyzed = engine.analyze(&signal, 64).unwrap();

        assert_eq!(captured.len(), analyzed.len());
        assert_eq!(captured[0].len(), 129);
        for (a, b) in captured.iter().zip(&analyzed) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_zeroed_spectrum_gives_silence() {
        let mut engine = StftEngine::new(256, WindowKind::Hann).unwrap();
        let signal = test_signal(1000);
        let hops = HopPair::new(64, 64).unwrap();
        let result = engine
            .resynthesize(&signal, hops, signal.len(), false, |spectrum| {
                spectrum.fill(Complex64::new(0.0, 0.0))
            })
            .unwrap();
        assert!(result.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_frame_size_limits() {
        assert!(StftEngine::new(MAX_FRAME_SIZE * 2, WindowKind::Hann).is_err());
        assert!(StftEngine::new(0, WindowKind::Hann).is_err());
    }
}
