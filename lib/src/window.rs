//! Window functions for frame analysis and resynthesis
//!
//! All windows are generated in their periodic form, so a window of length
//! `N` is symmetric about sample `N/2`. That keeps zero-phase framing exact and
//! gives Hann its constant overlap-add property at hops of `N/2`, `N/4`, ...

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::VocoderError;

/// Window function applied at analysis and again at synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowKind {
    /// Hann window (default)
    #[default]
    Hann,
    /// Hamming window
    Hamming,
    /// Rectangular window (no tapering)
    Rectangular,
    /// Bartlett (triangular) window
    Bartlett,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for WindowKind {
    type Err = VocoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hann" | "hanning" => Ok(WindowKind::Hann),
            "hamming" => Ok(WindowKind::Hamming),
            "rectangular" | "rect" => Ok(WindowKind::Rectangular),
            "bartlett" | "triangular" => Ok(WindowKind::Bartlett),
            _ => Err(VocoderError::invalid(
                "window",
                s,
                "one of hann, hamming, rectangular, bartlett",
            )),
        }
    }
}

impl WindowKind {
    /// Get all available window kinds
    pub fn all() -> &'static [WindowKind] {
        &[
            WindowKind::Hann,
            WindowKind::Hamming,
            WindowKind::Rectangular,
            WindowKind::Bartlett,
        ]
    }

    /// Get the name of the window kind
    pub fn name(&self) -> &'static str {
        match self {
            WindowKind::Hann => "Hann",
            WindowKind::Hamming => "Hamming",
            WindowKind::Rectangular => "Rectangular",
            WindowKind::Bartlett => "Bartlett",
        }
    }

    /// Generate the window coefficients for a frame of `size` samples
    pub fn generate(&self, size: usize) -> Vec<f64> {
        generate_window(*self, size)
    }
}

/// Generate a window function of the specified kind and size
pub fn generate_window(kind: WindowKind, size: usize) -> Vec<f64> {
    let mut window = vec![0.0; size];
    if size == 0 {
        return window;
    }

    match kind {
        WindowKind::Hann => generate_cosine(&mut window, 0.5, 0.5),
        WindowKind::Hamming => generate_cosine(&mut window, 0.54, 0.46),
        WindowKind::Rectangular => window.fill(1.0),
        WindowKind::Bartlett => generate_bartlett(&mut window),
    }

    window
}

/// Raised-cosine family: `a0 - a1 * cos(2πi/N)`
fn generate_cosine(window: &mut [f64], a0: f64, a1: f64) {
    let n = window.len() as f64;
    for (i, w) in window.iter_mut().enumerate() {
        *w = a0 - a1 * (2.0 * PI * i as f64 / n).cos();
    }
}

fn generate_bartlett(window: &mut [f64]) {
    let half = window.len() as f64 / 2.0;
    for (i, w) in window.iter_mut().enumerate() {
        *w = 1.0 - ((i as f64 - half) / half).abs();
    }
}

/// Calculate the coherent gain of a window (sum of window values)
pub fn coherent_gain(window: &[f64]) -> f64 {
    window.iter().sum()
}

/// Squared-window weight that overlap-add accumulates at each position of
/// one hop period, for frames placed every `hop` samples.
pub fn overlap_weights(window: &[f64], hop: usize) -> Vec<f64> {
    let period = hop.max(1);
    let mut weights = vec![0.0; period];
    for (i, &w) in window.iter().enumerate() {
        weights[i % period] += w * w;
    }
    weights
}

/// Smallest accumulated weight in steady state; zero means gaps
pub fn min_overlap_weight(window: &[f64], hop: usize) -> f64 {
    overlap_weights(window, hop)
        .into_iter()
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_generation() {
        let size = 512;

        for &kind in WindowKind::all() {
            let window = generate_window(kind, size);
            assert_eq!(window.len(), size);
            assert!(window.iter().all(|&w| (0.0..=1.0 + 1e-12).contains(&w)));

            if kind == WindowKind::Rectangular {
                assert!(window.iter().all(|&w| (w - 1.0).abs() < 1e-10));
            }
        }
    }

    #[test]
    fn test_periodic_symmetry() {
        for &kind in WindowKind::all() {
            let window = generate_window(kind, 1024);
            let n = window.len();
            for i in 1..n / 2 {
                assert!(
                    (window[i] - window[n - i]).abs() < 1e-12,
                    "{} not symmetric about N/2 at {}",
                    kind,
                    i
                );
            }
        }
    }

    #[test]
    fn test_hann_peak_and_edges() {
        let window = generate_window(WindowKind::Hann, 2048);
        assert!(window[0].abs() < 1e-12);
        assert!((window[1024] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hann_squared_overlap_is_constant_at_quarter_hop() {
        let window = generate_window(WindowKind::Hann, 1024);
        let weights = overlap_weights(&window, 256);
        for &w in &weights {
            assert!((w - 1.5).abs() < 1e-9, "weight {} differs from 1.5", w);
        }
    }

    #[test]
    fn test_gaps_detected_for_hop_equal_to_frame() {
        let window = generate_window(WindowKind::Hann, 512);
        assert!(min_overlap_weight(&window, 512) < 1e-9);
        assert!(min_overlap_weight(&window, 128) > 1.0);
    }

    #[test]
    fn test_parse_window_kind() {
        assert_eq!("hann".parse::<WindowKind>().unwrap(), WindowKind::Hann);
        assert_eq!("Hanning".parse::<WindowKind>().unwrap(), WindowKind::Hann);
        assert_eq!(
            "bartlett".parse::<WindowKind>().unwrap(),
            WindowKind::Bartlett
        );
        let err = "kaiser".parse::<WindowKind>().unwrap_err();
        assert_eq!(err.parameter(), Some("window"));
    }

    #[test]
    fn test_coherent_gain() {
        let window = generate_window(WindowKind::Hann, 1024);
        assert!((coherent_gain(&window) - 512.0).abs() < 1e-9);
    }
}
