//! Spectral transform adapter
//!
//! Wraps a planned real FFT pair for one frame size. Only the `N/2 + 1`
//! independent bins of a real signal's spectrum are exchanged; the mirrored
//! half is implied.
//!
//! Frames are transformed with zero-phase framing: the frame is rotated by
//! `N/2` before the forward FFT and rotated back after the inverse, so bin
//! phases are measured relative to the frame centre rather than its first
//! sample. A zero-phase spectrum therefore resynthesizes to a pulse centred in
//! the frame, where the synthesis window is largest.

use crate::error::VocoderError;
use crate::Result;
use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Forward/inverse real FFT for a fixed frame size
pub struct SpectralTransform {
    size: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    time_buffer: Vec<f64>,
    spectrum_buffer: Vec<Complex64>,
    forward_scratch: Vec<Complex64>,
    inverse_scratch: Vec<Complex64>,
}

impl SpectralTransform {
    /// Plan transforms for frames of `size` samples
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 || size % 2 != 0 {
            return Err(VocoderError::invalid(
                "frame_size",
                size,
                "an even number of at least 2 samples",
            ));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let forward_scratch = forward.make_scratch_vec();
        let inverse_scratch = inverse.make_scratch_vec();

        Ok(Self {
            size,
            time_buffer: forward.make_input_vec(),
            spectrum_buffer: forward.make_output_vec(),
            forward,
            inverse,
            forward_scratch,
            inverse_scratch,
        })
    }

    /// Frame size `N`
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of independent bins, `N/2 + 1`
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Transform a real frame of length `N` into `N/2 + 1` bins.
    ///
    /// # Panics
    ///
    /// Panics if `frame` or `spectrum` do not match the planned size.
    pub fn forward(&mut self, frame: &[f64], spectrum: &mut [Complex64]) -> Result<()> {
        assert_eq!(frame.len(), self.size, "frame length does not match transform size");
        assert_eq!(
            spectrum.len(),
            self.num_bins(),
            "spectrum length does not match transform size"
        );

        let half = self.size / 2;
        self.time_buffer[..half].copy_from_slice(&frame[half..]);
        self.time_buffer[half..].copy_from_slice(&frame[..half]);

        self.forward
            .process_with_scratch(&mut self.time_buffer, spectrum, &mut self.forward_scratch)
            .map_err(|e| VocoderError::Transform(format!("forward FFT failed: {}", e)))
    }

    /// Transform `N/2 + 1` bins back into a real frame of length `N`.
    ///
    /// The DC and Nyquist bins must be real for a real signal; their
    /// imaginary parts are discarded. The output is scaled by `1/N`, so
    /// `inverse(forward(x)) == x` up to rounding.
    ///
    /// # Panics
    ///
    /// Panics if `spectrum` or `frame` do not match the planned size.
    pub fn inverse(&mut self, spectrum: &[Complex64], frame: &mut [f64]) -> Result<()> {
        assert_eq!(
            spectrum.len(),
            self.num_bins(),
            "spectrum length does not match transform size"
        );
        assert_eq!(frame.len(), self.size, "frame length does not match transform size");

        self.spectrum_buffer.copy_from_slice(spectrum);
        let last = self.spectrum_buffer.len() - 1;
        self.spectrum_buffer[0].im = 0.0;
        self.spectrum_buffer[last].im = 0.0;

        self.inverse
            .process_with_scratch(
                &mut self.spectrum_buffer,
                &mut self.time_buffer,
                &mut self.inverse_scratch,
            )
            .map_err(|e| VocoderError::Transform(format!("inverse FFT failed: {}", e)))?;

        let half = self.size / 2;
        let scale = 1.0 / self.size as f64;
        for (i, out) in frame.iter_mut().enumerate() {
            *out = self.time_buffer[(i + half) % self.size] * scale;
        }

        Ok(())
    }
}
