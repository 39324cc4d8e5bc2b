//! Stateful processor used by the front ends
//!
//! Holds the loaded audio, the current parameters and the result of the
//! effects applied so far. Each effect runs on the previous result, so
//! effects can be chained; `reset` goes back to the original audio.

use crate::audio_io::AudioInfo;
use crate::error::VocoderError;
use crate::pipeline::{Effect, Pipeline, ProcessOutput, ProcessParams};
use crate::spectrogram::Spectrogram;
use crate::Result;

pub struct Processor {
    params: ProcessParams,
    audio_info: Option<AudioInfo>,
    original: Option<Vec<Vec<f64>>>,
    processed: Option<Vec<ProcessOutput>>,
    history: Vec<Effect>,
}

impl Processor {
    pub fn new() -> Self {
        Self::with_params(ProcessParams::default())
    }

    pub fn with_params(params: ProcessParams) -> Self {
        Self {
            params,
            audio_info: None,
            original: None,
            processed: None,
            history: Vec::new(),
        }
    }

    pub fn params(&self) -> &ProcessParams {
        &self.params
    }

    /// Replace the parameters; applies to the next effect only
    pub fn set_params(&mut self, params: ProcessParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Load audio, discarding any previous result
    pub fn load_audio(&mut self, audio_info: AudioInfo, channel_data: Vec<Vec<f64>>) -> Result<()> {
        if channel_data.len() != audio_info.channels {
            return Err(VocoderError::Audio(format!(
                "Channel count mismatch: expected {}, got {}",
                audio_info.channels,
                channel_data.len()
            )));
        }
        if let Some((i, channel)) = channel_data
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != audio_info.duration_samples)
        {
            return Err(VocoderError::Audio(format!(
                "Channel {} has length {}, expected {}",
                i,
                channel.len(),
                audio_info.duration_samples
            )));
        }

        self.audio_info = Some(audio_info);
        self.original = Some(channel_data);
        self.processed = None;
        self.history.clear();
        Ok(())
    }

    pub fn has_audio(&self) -> bool {
        self.original.is_some()
    }

    pub fn has_processed(&self) -> bool {
        self.processed.is_some()
    }

    /// Info for the original audio
    pub fn audio_info(&self) -> Option<&AudioInfo> {
        self.audio_info.as_ref()
    }

    /// Info for the current result (length changes after time stretching)
    pub fn current_info(&self) -> Option<AudioInfo> {
        let info = self.audio_info.as_ref()?;
        match &self.processed {
            Some(outputs) => Some(info.with_duration(outputs.first().map_or(0, |o| o.samples().len()))),
            None => Some(info.clone()),
        }
    }

    pub fn original(&self) -> Option<&[Vec<f64>]> {
        self.original.as_deref()
    }

    /// Output of the last effect, one entry per channel
    pub fn last_outputs(&self) -> Option<&[ProcessOutput]> {
        self.processed.as_deref()
    }

    /// The current signal: the last result, or the original if nothing has run
    pub fn current_channels(&self) -> Option<Vec<Vec<f64>>> {
        match &self.processed {
            Some(outputs) => Some(outputs.iter().map(|o| o.samples().to_vec()).collect()),
            None => self.original.clone(),
        }
    }

    /// Effects applied since the audio was loaded or reset
    pub fn history(&self) -> &[Effect] {
        &self.history
    }

    /// Apply `effect` to the current signal
    pub fn apply(&mut self, effect: Effect) -> Result<()> {
        let info = self
            .audio_info
            .as_ref()
            .ok_or_else(|| VocoderError::Audio("No audio loaded".to_string()))?;
        let pipeline = Pipeline::new(effect, self.params, info.sample_rate)?.capture_spectra(true);

        let outputs = match &self.processed {
            Some(previous) => {
                let channels: Vec<Vec<f64>> =
                    previous.iter().map(|o| o.samples().to_vec()).collect();
                pipeline.run_channels(&channels)?
            }
            None => {
                let original = self
                    .original
                    .as_ref()
                    .ok_or_else(|| VocoderError::Audio("No audio loaded".to_string()))?;
                pipeline.run_channels(original)?
            }
        };

        log::info!(
            "Applied {} to {} channel(s), {} -> {} samples",
            effect,
            outputs.len(),
            info.duration_samples,
            outputs.first().map_or(0, |o| o.samples().len())
        );
        self.processed = Some(outputs);
        self.history.push(effect);
        Ok(())
    }

    /// Drop every applied effect
    pub fn reset(&mut self) {
        self.processed = None;
        self.history.clear();
    }

    /// Forget the loaded audio entirely
    pub fn clear(&mut self) {
        self.audio_info = None;
        self.original = None;
        self.reset();
    }

    /// Spectrogram of one channel of the original audio
    pub fn original_spectrogram(&self, channel: usize) -> Result<Spectrogram> {
        let info = self
            .audio_info
            .as_ref()
            .ok_or_else(|| VocoderError::Audio("No audio loaded".to_string()))?;
        let signal = self
            .original
            .as_ref()
            .and_then(|c| c.get(channel))
            .ok_or_else(|| VocoderError::invalid("channel", channel, "an existing channel"))?;
        Spectrogram::analyze(signal, info.sample_rate, &self.params)
    }

    /// Spectrogram of one channel of the current signal
    pub fn current_spectrogram(&self, channel: usize) -> Result<Spectrogram> {
        let Some(outputs) = &self.processed else {
            return self.original_spectrogram(channel);
        };
        let output = outputs
            .get(channel)
            .ok_or_else(|| VocoderError::invalid("channel", channel, "an existing channel"))?;
        Spectrogram::analyze(output.samples(), output.sample_rate(), &self.params)
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowKind;
    use std::f64::consts::PI;

    fn test_audio(sample_rate: u32, len: usize, channels: usize) -> (AudioInfo, Vec<Vec<f64>>) {
        let data = (0..channels)
            .map(|ch| {
                let freq = 440.0 * (ch + 1) as f64;
                (0..len)
                    .map(|i| 0.5 * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin())
                    .collect()
            })
            .collect();
        (AudioInfo::new(sample_rate, channels, len), data)
    }

    #[test]
    fn test_new_processor_is_empty() {
        let processor = Processor::new();
        assert!(!processor.has_audio());
        assert!(!processor.has_processed());
        assert_eq!(processor.params().frame_size, 2048);
        assert!(processor.current_channels().is_none());
    }

    #[test]
    fn test_load_audio_validates_shape() {
        let mut processor = Processor::new();
        let info = AudioInfo::new(44100, 2, 100);
        assert!(processor.load_audio(info.clone(), vec![vec![0.0; 100]]).is_err());
        assert!(processor
            .load_audio(info.clone(), vec![vec![0.0; 100], vec![0.0; 99]])
            .is_err());
        assert!(processor
            .load_audio(info, vec![vec![0.0; 100], vec![0.0; 100]])
            .is_ok());
        assert!(processor.has_audio());
    }

    #[test]
    fn test_apply_without_audio_fails() {
        let mut processor = Processor::new();
        assert!(processor.apply(Effect::Robotize).is_err());
    }

    #[test]
    fn test_effects_chain_and_reset() {
        let mut processor = Processor::new();
        let (info, data) = test_audio(22050, 11025, 2);
        processor.load_audio(info, data.clone()).unwrap();

        processor.apply(Effect::TimeStretch { factor: 2.0 }).unwrap();
        processor
            .apply(Effect::Echo {
                delay_seconds: 0.05,
                gain: 0.3,
            })
            .unwrap();

        assert_eq!(processor.history().len(), 2);
        let current = processor.current_info().unwrap();
        assert_eq!(current.duration_samples, 22050);
        assert_eq!(processor.current_channels().unwrap().len(), 2);
        assert!(!processor.last_outputs().unwrap()[0].spectra().is_empty());

        processor.reset();
        assert!(!processor.has_processed());
        assert_eq!(processor.current_channels().unwrap(), data);
    }

    #[test]
    fn test_invalid_effect_leaves_state_untouched() {
        let mut processor = Processor::new();
        let (info, data) = test_audio(44100, 4410, 1);
        processor.load_audio(info, data).unwrap();
        processor.apply(Effect::Robotize).unwrap();
        let before = processor.current_channels().unwrap();

        let err = processor
            .apply(Effect::Echo {
                delay_seconds: 0.1,
                gain: 1.0,
            })
            .unwrap_err();
        assert_eq!(err.parameter(), Some("gain"));
        assert_eq!(processor.current_channels().unwrap(), before);
        assert_eq!(processor.history(), &[Effect::Robotize]);
    }

    #[test]
    fn test_set_params_validates() {
        let mut processor = Processor::new();
        let bad = ProcessParams {
            hop_size: 4096,
            ..ProcessParams::default()
        };
        assert!(processor.set_params(bad).is_err());
        let good = ProcessParams::new(1024, 256, WindowKind::Hamming).unwrap();
        processor.set_params(good).unwrap();
        assert_eq!(processor.params().window, WindowKind::Hamming);
    }

    #[test]
    fn test_spectrograms() {
        let mut processor = Processor::new();
        let (info, data) = test_audio(44100, 8192, 1);
        processor.load_audio(info, data).unwrap();
        let original = processor.original_spectrogram(0).unwrap();
        assert!(processor.original_spectrogram(1).is_err());

        processor.apply(Effect::TimeStretch { factor: 2.0 }).unwrap();
        let current = processor.current_spectrogram(0).unwrap();
        assert!(current.num_frames > original.num_frames);
    }
}
