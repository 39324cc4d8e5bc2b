//! Frame extraction and overlap-add resynthesis
//!
//! Offsets are signed so frames may hang off either end of the signal;
//! samples outside the signal read as zero.

/// Accumulated weight below which an output sample is left at zero
pub const WEIGHT_EPSILON: f64 = 1e-3;

/// Copy `window.len()` samples starting at `offset` into `frame`, multiplied
/// by the window. Indices outside `signal` contribute zero.
pub fn extract_frame_into(signal: &[f64], offset: isize, window: &[f64], frame: &mut [f64]) {
    debug_assert_eq!(frame.len(), window.len());

    for (i, (out, &w)) in frame.iter_mut().zip(window).enumerate() {
        let pos = offset + i as isize;
        *out = if pos >= 0 && (pos as usize) < signal.len() {
            signal[pos as usize] * w
        } else {
            0.0
        };
    }
}

/// Allocating form of [`extract_frame_into`]
pub fn extract_frame(signal: &[f64], offset: isize, window: &[f64]) -> Vec<f64> {
    let mut frame = vec![0.0; window.len()];
    extract_frame_into(signal, offset, window, &mut frame);
    frame
}

/// Output samples and the squared-window weight each one received
#[derive(Debug, Clone)]
pub struct OverlapAdd {
    samples: Vec<f64>,
    weights: Vec<f64>,
}

impl OverlapAdd {
    /// Pre-size the accumulator for `length` output samples
    pub fn new(length: usize) -> Self {
        Self {
            samples: vec![0.0; length],
            weights: vec![0.0; length],
        }
    }

    /// Current accumulator length
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Add `frame * window` at `offset` and `window²` to the weights.
    ///
    /// Grows the buffers if the frame reaches past the current end.
    pub fn add(&mut self, frame: &[f64], offset: usize, window: &[f64]) {
        debug_assert_eq!(frame.len(), window.len());

        let end = offset + frame.len();
        if end > self.samples.len() {
            self.samples.resize(end, 0.0);
            self.weights.resize(end, 0.0);
        }

        let samples = &mut self.samples[offset..end];
        let weights = &mut self.weights[offset..end];
        for i in 0..frame.len() {
            samples[i] += frame[i] * window[i];
            weights[i] += window[i] * window[i];
        }
    }

    /// Accumulated weights, for inspection
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Normalize by the accumulated weight and return `length` samples
    /// starting at `start`. Samples whose weight is below
    /// [`WEIGHT_EPSILON`], or that were never reached, are zero.
    pub fn finish(self, start: usize, length: usize) -> Vec<f64> {
        (start..start + length)
            .map(|i| match (self.samples.get(i), self.weights.get(i)) {
                (Some(&sample), Some(&weight)) if weight >= WEIGHT_EPSILON => sample / weight,
                _ => 0.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{generate_window, WindowKind};

    #[test]
    fn test_extract_inside_signal() {
        let signal: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let window = vec![1.0; 4];
        assert_eq!(extract_frame(&signal, 3, &window), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_extract_zero_pads_both_ends() {
        let signal = vec![1.0, 2.0, 3.0];
        let window = vec![0.5; 4];
        assert_eq!(extract_frame(&signal, -2, &window), vec![0.0, 0.0, 0.5, 1.0]);
        assert_eq!(extract_frame(&signal, 2, &window), vec![1.5, 0.0, 0.0, 0.0]);
        assert_eq!(extract_frame(&signal, 10, &window), vec![0.0; 4]);
    }

    #[test]
    fn test_overlap_add_reconstructs_constant() {
        let size = 256;
        let hop = 64;
        let window = generate_window(WindowKind::Hann, size);
        let signal = vec![0.7; 2048];

        let pad = size / 2;
        let frames = signal.len() / hop + 1;
        let mut ola = OverlapAdd::new((frames - 1) * hop + size);
        for m in 0..frames {
            let offset = (m * hop) as isize - pad as isize;
            let frame = extract_frame(&signal, offset, &window);
            ola.add(&frame, m * hop, &window);
        }

        let output = ola.finish(pad, signal.len());
        for (i, &s) in output.iter().enumerate() {
            assert!((s - 0.7).abs() < 1e-12, "sample {} = {}", i, s);
        }
    }

    #[test]
    fn test_overlap_add_grows_past_presized_end() {
        let window = vec![1.0; 4];
        let mut ola = OverlapAdd::new(2);
        ola.add(&[1.0, 1.0, 1.0, 1.0], 3, &window);
        assert_eq!(ola.len(), 7);
        assert_eq!(ola.finish(0, 8), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_zero_weight_regions_are_zero_filled() {
        let window = vec![0.0, 1.0, 1.0, 0.0];
        let mut ola = OverlapAdd::new(4);
        ola.add(&[5.0, 2.0, 2.0, 5.0], 0, &window);
        let output = ola.finish(0, 4);
        assert_eq!(output, vec![0.0, 2.0, 2.0, 0.0]);
        assert!(output.iter().all(|s| s.is_finite()));
    }
}
