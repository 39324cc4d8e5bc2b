//! Spectrogram snapshots for visualization
//!
//! A [`Spectrogram`] is a copy of magnitude spectra, either captured during a
//! processing pass or analysed directly from a signal. Nothing here feeds
//! back into processing.

use std::fmt;
use std::str::FromStr;

use crate::error::VocoderError;
use crate::pipeline::{ProcessOutput, ProcessParams};
use crate::stft::StftEngine;
use crate::Result;

/// Floor for decibel conversion
pub const MIN_DB: f64 = -120.0;

/// Frequency axis layout for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequencyScale {
    Linear,
    #[default]
    Logarithmic,
}

impl fmt::Display for FrequencyScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyScale::Linear => write!(f, "linear"),
            FrequencyScale::Logarithmic => write!(f, "log"),
        }
    }
}

impl FromStr for FrequencyScale {
    type Err = VocoderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linear" | "lin" => Ok(FrequencyScale::Linear),
            "log" | "logarithmic" => Ok(FrequencyScale::Logarithmic),
            _ => Err(VocoderError::invalid(
                "frequency_scale",
                s,
                "one of linear, log",
            )),
        }
    }
}

/// Magnitude spectra over time
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Magnitudes indexed `[frame][bin]`
    pub magnitudes: Vec<Vec<f64>>,
    pub num_frames: usize,
    pub num_bins: usize,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
}

impl Spectrogram {
    /// Wrap existing magnitude frames, checking they all have `frame_size / 2 + 1` bins
    pub fn from_magnitudes(
        magnitudes: Vec<Vec<f64>>,
        sample_rate: u32,
        frame_size: usize,
        hop_size: usize,
    ) -> Result<Self> {
        if magnitudes.is_empty() {
            return Err(VocoderError::invalid("spectra", 0, "at least one frame"));
        }
        let num_bins = frame_size / 2 + 1;
        if let Some((i, frame)) = magnitudes
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() != num_bins)
        {
            return Err(VocoderError::invalid(
                "spectra",
                format!("frame {} with {} bins", i, frame.len()),
                format!("{} bins per frame", num_bins),
            ));
        }

        Ok(Self {
            num_frames: magnitudes.len(),
            num_bins,
            magnitudes,
            sample_rate,
            frame_size,
            hop_size,
        })
    }

    /// Spectra captured by a pipeline run
    pub fn from_output(output: &ProcessOutput) -> Result<Self> {
        Self::from_magnitudes(
            output.spectra().to_vec(),
            output.sample_rate(),
            output.frame_size(),
            output.hop_size(),
        )
    }

    /// Analyse `signal` with the frame, hop and window from `params`
    pub fn analyze(signal: &[f64], sample_rate: u32, params: &ProcessParams) -> Result<Self> {
        params.validate()?;
        let mut engine = StftEngine::new(params.frame_size, params.window)?;
        let magnitudes = engine.analyze(signal, params.hop_size)?;
        log::debug!(
            "Analysed {} frames of {} bins for display",
            magnitudes.len(),
            params.num_bins()
        );
        Self::from_magnitudes(magnitudes, sample_rate, params.frame_size, params.hop_size)
    }

    /// Magnitudes in dB relative to `reference`, floored at [`MIN_DB`]
    pub fn to_db(&self, reference: f64) -> Vec<Vec<f64>> {
        self.magnitudes
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .map(|&mag| {
                        if mag > 0.0 {
                            (20.0 * (mag / reference).log10()).max(MIN_DB)
                        } else {
                            MIN_DB
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Centre time of each frame in seconds
    pub fn time_axis(&self) -> Vec<f64> {
        (0..self.num_frames)
            .map(|i| (i * self.hop_size) as f64 / self.sample_rate as f64)
            .collect()
    }

    /// Centre frequency of each bin in Hz
    pub fn frequency_axis(&self) -> Vec<f64> {
        (0..self.num_bins)
            .map(|k| k as f64 * self.sample_rate as f64 / self.frame_size as f64)
            .collect()
    }

    /// Magnitude of one bin over time
    pub fn bin_evolution(&self, bin: usize) -> Vec<f64> {
        if bin >= self.num_bins {
            return vec![0.0; self.num_frames];
        }
        self.magnitudes.iter().map(|frame| frame[bin]).collect()
    }

    /// Mean magnitude per bin across all frames
    pub fn average_spectrum(&self) -> Vec<f64> {
        let mut average = vec![0.0; self.num_bins];
        for frame in &self.magnitudes {
            for (acc, &mag) in average.iter_mut().zip(frame) {
                *acc += mag;
            }
        }
        let scale = 1.0 / self.num_frames as f64;
        average.iter_mut().for_each(|v| *v *= scale);
        average
    }

    /// Frequency of the strongest non-DC bin in the average spectrum
    pub fn peak_frequency(&self) -> Option<f64> {
        let average = self.average_spectrum();
        let (bin, &mag) = average
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        if mag <= 0.0 {
            return None;
        }
        Some(bin as f64 * self.sample_rate as f64 / self.frame_size as f64)
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.num_frames.saturating_sub(1) * self.hop_size) as f64 / self.sample_rate as f64
    }
}

/// PNG rendering of spectrograms and waveforms
#[cfg(all(feature = "image", not(target_arch = "wasm32")))]
pub mod image {
    use super::*;
    use crate::waveform::Waveform;
    use ::image::{ImageBuffer, Rgb, RgbImage};
    use std::path::Path;

    /// Colour gradients for magnitude display
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum ColorMap {
        #[default]
        Viridis,
        Magma,
        Jet,
        Grayscale,
    }

    impl ColorMap {
        fn stops(&self) -> &'static [[f64; 3]] {
            match self {
                ColorMap::Viridis => &[
                    [68.0, 1.0, 84.0],
                    [59.0, 82.0, 139.0],
                    [33.0, 145.0, 140.0],
                    [94.0, 201.0, 98.0],
                    [253.0, 231.0, 37.0],
                ],
                ColorMap::Magma => &[
                    [0.0, 0.0, 4.0],
                    [81.0, 18.0, 124.0],
                    [183.0, 55.0, 121.0],
                    [252.0, 137.0, 97.0],
                    [252.0, 253.0, 191.0],
                ],
                ColorMap::Jet => &[
                    [0.0, 0.0, 128.0],
                    [0.0, 0.0, 255.0],
                    [0.0, 255.0, 255.0],
                    [255.0, 255.0, 0.0],
                    [255.0, 0.0, 0.0],
                    [128.0, 0.0, 0.0],
                ],
                ColorMap::Grayscale => &[[0.0, 0.0, 0.0], [255.0, 255.0, 255.0]],
            }
        }

        /// Colour for a value in `[0, 1]`
        pub fn color(&self, value: f64) -> Rgb<u8> {
            let stops = self.stops();
            let pos = value.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
            let idx = (pos as usize).min(stops.len() - 2);
            let t = pos - idx as f64;
            let (a, b) = (stops[idx], stops[idx + 1]);
            Rgb([
                (a[0] + (b[0] - a[0]) * t).round() as u8,
                (a[1] + (b[1] - a[1]) * t).round() as u8,
                (a[2] + (b[2] - a[2]) * t).round() as u8,
            ])
        }
    }

    impl FromStr for ColorMap {
        type Err = VocoderError;

        fn from_str(s: &str) -> Result<Self> {
            match s.to_lowercase().as_str() {
                "viridis" => Ok(ColorMap::Viridis),
                "magma" => Ok(ColorMap::Magma),
                "jet" => Ok(ColorMap::Jet),
                "gray" | "grey" | "grayscale" => Ok(ColorMap::Grayscale),
                _ => Err(VocoderError::invalid(
                    "colormap",
                    s,
                    "one of viridis, magma, jet, grayscale",
                )),
            }
        }
    }

    /// Options for spectrogram images
    #[derive(Debug, Clone)]
    pub struct SpectrogramImageOptions {
        pub width: u32,
        pub height: u32,
        pub colormap: ColorMap,
        /// Range below the loudest bin that still gets colour
        pub dynamic_range_db: f64,
        pub frequency_scale: FrequencyScale,
        /// Lowest frequency shown on a log axis
        pub min_frequency: f64,
    }

    impl Default for SpectrogramImageOptions {
        fn default() -> Self {
            Self {
                width: 800,
                height: 400,
                colormap: ColorMap::Viridis,
                dynamic_range_db: 80.0,
                frequency_scale: FrequencyScale::Logarithmic,
                min_frequency: 20.0,
            }
        }
    }

    /// Fractional bin shown on image row `row` (row 0 at the bottom)
    fn row_to_bin(row: u32, height: u32, spectrogram: &Spectrogram, options: &SpectrogramImageOptions) -> f64 {
        let t = row as f64 / (height.max(2) - 1) as f64;
        let max_bin = (spectrogram.num_bins - 1) as f64;
        match options.frequency_scale {
            FrequencyScale::Linear => t * max_bin,
            FrequencyScale::Logarithmic => {
                let bin_width = spectrogram.sample_rate as f64 / spectrogram.frame_size as f64;
                let nyquist = max_bin * bin_width;
                let low = options.min_frequency.clamp(bin_width.max(1.0), nyquist.max(1.0));
                let freq = low * (nyquist / low).powf(t);
                (freq / bin_width).min(max_bin)
            }
        }
    }

    fn draw_spectrogram(
        img: &mut RgbImage,
        y_offset: u32,
        spectrogram: &Spectrogram,
        options: &SpectrogramImageOptions,
    ) {
        let db = spectrogram.to_db(1.0);
        let max_db = db
            .iter()
            .flatten()
            .fold(MIN_DB, |m, &v| m.max(v));
        let min_db = max_db - options.dynamic_range_db.max(1.0);

        let last_frame = spectrogram.num_frames - 1;
        for x in 0..options.width {
            let frame = ((x as f64 / (options.width.max(2) - 1) as f64) * last_frame as f64)
                .round() as usize;
            let column = &db[frame.min(last_frame)];

            for row in 0..options.height {
                let bin = row_to_bin(row, options.height, spectrogram, options);
                let lo = bin.floor() as usize;
                let hi = (lo + 1).min(spectrogram.num_bins - 1);
                let t = bin - lo as f64;
                let value = column[lo] * (1.0 - t) + column[hi] * t;

                let normalized = (value - min_db) / (max_db - min_db);
                let y = y_offset + options.height - 1 - row;
                img.put_pixel(x, y, options.colormap.color(normalized));
            }
        }
    }

    /// Render a spectrogram with low frequencies at the bottom
    pub fn generate_spectrogram_image(
        spectrogram: &Spectrogram,
        options: &SpectrogramImageOptions,
    ) -> RgbImage {
        let mut img = ImageBuffer::new(options.width, options.height);
        if options.width > 0 && options.height > 0 {
            draw_spectrogram(&mut img, 0, spectrogram, options);
        }
        img
    }

    /// Original above processed, separated by a white line
    pub fn generate_comparison_image(
        original: &Spectrogram,
        processed: &Spectrogram,
        options: &SpectrogramImageOptions,
    ) -> RgbImage {
        let separator = 2;
        let mut img = ImageBuffer::from_pixel(
            options.width,
            options.height * 2 + separator,
            Rgb([255, 255, 255]),
        );
        if options.width > 0 && options.height > 0 {
            draw_spectrogram(&mut img, 0, original, options);
            draw_spectrogram(&mut img, options.height + separator, processed, options);
        }
        img
    }

    /// Render a waveform envelope centred on a dark background
    pub fn generate_waveform_image(waveform: &Waveform, height: u32) -> RgbImage {
        let width = waveform.columns() as u32;
        let mut img = ImageBuffer::from_pixel(width, height, Rgb([30, 30, 40]));
        if height < 2 {
            return img;
        }

        let peak = waveform.peak().max(1e-9);
        let centre = (height - 1) as f64 / 2.0;
        let to_row = |v: f64| (centre - (v / peak) * centre).round().clamp(0.0, (height - 1) as f64) as u32;

        for x in 0..width {
            let top = to_row(waveform.maxs[x as usize]);
            let bottom = to_row(waveform.mins[x as usize]);
            for y in top..=bottom {
                img.put_pixel(x, y, Rgb([100, 180, 255]));
            }
        }
        img
    }

    fn save_image<P: AsRef<Path>>(img: &RgbImage, path: P, what: &str) -> Result<()> {
        img.save(path.as_ref()).map_err(|e| {
            VocoderError::Image(format!(
                "Failed to save {} to {}: {}",
                what,
                path.as_ref().display(),
                e
            ))
        })?;
        log::info!("Saved {} to {}", what, path.as_ref().display());
        Ok(())
    }

    pub fn save_spectrogram<P: AsRef<Path>>(
        spectrogram: &Spectrogram,
        path: P,
        options: &SpectrogramImageOptions,
    ) -> Result<()> {
        save_image(&generate_spectrogram_image(spectrogram, options), path, "spectrogram")
    }

    pub fn save_comparison<P: AsRef<Path>>(
        original: &Spectrogram,
        processed: &Spectrogram,
        path: P,
        options: &SpectrogramImageOptions,
    ) -> Result<()> {
        save_image(
            &generate_comparison_image(original, processed, options),
            path,
            "comparison",
        )
    }

    pub fn save_waveform<P: AsRef<Path>>(waveform: &Waveform, height: u32, path: P) -> Result<()> {
        save_image(&generate_waveform_image(waveform, height), path, "waveform")
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowKind;
    use std::f64::consts::PI;

    fn ramp_spectrogram() -> Spectrogram {
        let magnitudes = (0..10)
            .map(|t| (0..5).map(|k| (t * k) as f64).collect())
            .collect();
        Spectrogram::from_magnitudes(magnitudes, 8000, 8, 4).unwrap()
    }

    #[test]
    fn test_from_magnitudes_checks_bins() {
        assert!(Spectrogram::from_magnitudes(vec![vec![0.0; 4]], 8000, 8, 4).is_err());
        assert!(Spectrogram::from_magnitudes(Vec::new(), 8000, 8, 4).is_err());
        let spec = ramp_spectrogram();
        assert_eq!(spec.num_frames, 10);
        assert_eq!(spec.num_bins, 5);
    }

    #[test]
    fn test_db_conversion() {
        let spec = ramp_spectrogram();
        let db = spec.to_db(1.0);
        assert_eq!(db[0][0], MIN_DB);
        assert!((db[1][1] - 0.0).abs() < 1e-12);
        assert!((db[5][2] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_axes() {
        let spec = ramp_spectrogram();
        let time = spec.time_axis();
        let freq = spec.frequency_axis();
        assert_eq!(time.len(), 10);
        assert!((time[1] - 0.0005).abs() < 1e-12);
        assert_eq!(freq, vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0]);
    }

    #[test]
    fn test_bin_evolution_and_average() {
        let spec = ramp_spectrogram();
        assert_eq!(spec.bin_evolution(2)[3], 6.0);
        assert_eq!(spec.bin_evolution(99), vec![0.0; 10]);
        let average = spec.average_spectrum();
        assert!((average[1] - 4.5).abs() < 1e-12);
        assert_eq!(spec.peak_frequency(), Some(4000.0));
    }

    #[test]
    fn test_analyze_finds_tone() {
        let sample_rate = 44100;
        let signal: Vec<f64> = (0..22050)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / sample_rate as f64).sin())
            .collect();
        let params = ProcessParams::new(2048, 512, WindowKind::Hann).unwrap();
        let spec = Spectrogram::analyze(&signal, sample_rate, &params).unwrap();

        assert_eq!(spec.num_bins, 1025);
        assert_eq!(spec.num_frames, StftEngine::frame_count(signal.len(), 512));
        let peak = spec.peak_frequency().unwrap();
        assert!((peak - 1000.0).abs() < 44100.0 / 2048.0, "peak {}", peak);
    }

    #[test]
    fn test_from_output_requires_capture() {
        let params = ProcessParams::default();
        let signal = vec![0.1; 4096];
        let pipeline = crate::pipeline::Pipeline::new(crate::pipeline::Effect::Robotize, params, 44100)
            .unwrap();
        let plain = pipeline.run(&signal).unwrap();
        assert!(Spectrogram::from_output(&plain).is_err());

        let captured = pipeline.capture_spectra(true).run(&signal).unwrap();
        let spec = Spectrogram::from_output(&captured).unwrap();
        assert_eq!(spec.num_bins, params.num_bins());
        assert_eq!(spec.hop_size, params.hop_size);
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!("lin".parse::<FrequencyScale>().unwrap(), FrequencyScale::Linear);
        assert!("mel".parse::<FrequencyScale>().is_err());
    }
}
