//! Display envelope of a signal
//!
//! Reduces a signal to one min/max pair per display column so a waveform can
//! be drawn at any width without touching every sample per frame.

/// Min/max envelope, one entry per column
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Largest sample in each column (never below 0)
    pub maxs: Vec<f64>,
    /// Smallest sample in each column (never above 0)
    pub mins: Vec<f64>,
    pub sample_rate: u32,
    pub num_samples: usize,
}

impl Waveform {
    /// Envelope of `signal` over `columns` equal-width buckets
    pub fn from_signal(signal: &[f64], columns: usize, sample_rate: u32) -> Self {
        if signal.is_empty() || columns == 0 {
            return Self {
                maxs: vec![0.0; columns],
                mins: vec![0.0; columns],
                sample_rate,
                num_samples: signal.len(),
            };
        }

        let per_column = signal.len() as f64 / columns as f64;
        let (maxs, mins) = (0..columns)
            .map(|i| {
                let start = (i as f64 * per_column) as usize;
                let end = (((i + 1) as f64 * per_column) as usize)
                    .max(start + 1)
                    .min(signal.len());
                signal[start.min(signal.len() - 1)..end]
                    .iter()
                    .fold((0.0_f64, 0.0_f64), |(hi, lo), &s| (hi.max(s), lo.min(s)))
            })
            .unzip();

        Self {
            maxs,
            mins,
            sample_rate,
            num_samples: signal.len(),
        }
    }

    /// Envelope of several channels mixed to mono
    pub fn from_channels(channels: &[Vec<f64>], columns: usize, sample_rate: u32) -> Self {
        let len = channels.iter().map(Vec::len).min().unwrap_or(0);
        let scale = 1.0 / channels.len().max(1) as f64;
        let mono: Vec<f64> = (0..len)
            .map(|i| channels.iter().map(|c| c[i]).sum::<f64>() * scale)
            .collect();
        Self::from_signal(&mono, columns, sample_rate)
    }

    pub fn columns(&self) -> usize {
        self.maxs.len()
    }

    /// Largest absolute value in the envelope
    pub fn peak(&self) -> f64 {
        self.maxs
            .iter()
            .chain(&self.mins)
            .fold(0.0, |m, s| m.max(s.abs()))
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples as f64 / self.sample_rate as f64
    }
}
