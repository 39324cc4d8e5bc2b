use js_sys::{Float32Array, Uint8Array};
use serde::{Deserialize, Serialize};
use vocoder_lib::{
    audio_io::{read_audio_bytes, write_audio_bytes, AudioInfo},
    utils::{self, presets},
    Effect, ProcessParams, Processor, VocoderError, Waveform,
};
use wasm_bindgen::prelude::*;

type JsResult<T> = std::result::Result<T, JsValue>;

fn to_js(err: VocoderError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn no_audio() -> JsValue {
    JsValue::from_str("No audio loaded")
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    vocoder_lib::init();
}

#[derive(Serialize)]
struct AudioInfoJs {
    sample_rate: u32,
    channels: usize,
    duration_samples: usize,
    duration_seconds: f64,
}

impl From<&AudioInfo> for AudioInfoJs {
    fn from(info: &AudioInfo) -> Self {
        Self {
            sample_rate: info.sample_rate,
            channels: info.channels,
            duration_samples: info.duration_samples,
            duration_seconds: info.duration_seconds,
        }
    }
}

#[derive(Serialize)]
struct ParamsJs {
    frame_size: usize,
    hop_size: usize,
    window: String,
    echo_mode: String,
    interpolation: String,
    overlap_percent: f64,
    num_bins: usize,
}

impl From<&ProcessParams> for ParamsJs {
    fn from(params: &ProcessParams) -> Self {
        Self {
            frame_size: params.frame_size,
            hop_size: params.hop_size,
            window: params.window.name().to_string(),
            echo_mode: params.echo_mode.name().to_string(),
            interpolation: params.interpolation.name().to_string(),
            overlap_percent: params.overlap() * 100.0,
            num_bins: params.num_bins(),
        }
    }
}

#[derive(Serialize)]
struct ProcessorInfoJs {
    original: Option<AudioInfoJs>,
    current: Option<AudioInfoJs>,
    params: ParamsJs,
    effects: Vec<String>,
}

/// Effect description coming from JavaScript, e.g.
/// `{ type: "pitch_shift", semitones: 12 }`
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EffectJs {
    Robotize,
    PitchShift { semitones: f64 },
    TimeStretch { factor: f64 },
    Echo { delay_seconds: f64, gain: f64 },
}

impl From<EffectJs> for Effect {
    fn from(effect: EffectJs) -> Self {
        match effect {
            EffectJs::Robotize => Effect::Robotize,
            EffectJs::PitchShift { semitones } => Effect::PitchShift { semitones },
            EffectJs::TimeStretch { factor } => Effect::TimeStretch { factor },
            EffectJs::Echo {
                delay_seconds,
                gain,
            } => Effect::Echo {
                delay_seconds,
                gain,
            },
        }
    }
}

#[derive(Serialize)]
struct WaveformJs {
    maxs: Vec<f32>,
    mins: Vec<f32>,
    duration_seconds: f64,
}

impl From<&Waveform> for WaveformJs {
    fn from(waveform: &Waveform) -> Self {
        Self {
            maxs: waveform.maxs.iter().map(|&v| v as f32).collect(),
            mins: waveform.mins.iter().map(|&v| v as f32).collect(),
            duration_seconds: waveform.duration_seconds(),
        }
    }
}

fn interleave(channels: &[Vec<f64>]) -> Float32Array {
    let num_channels = channels.len();
    let len = channels.first().map_or(0, Vec::len);
    let mut buffer = vec![0.0f32; num_channels * len];
    for (ch, channel) in channels.iter().enumerate() {
        for (i, &sample) in channel.iter().enumerate() {
            buffer[i * num_channels + ch] = sample as f32;
        }
    }
    Float32Array::from(&buffer[..])
}

#[wasm_bindgen]
pub struct WasmVocoder {
    processor: Processor,
}

#[wasm_bindgen]
impl WasmVocoder {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        console_error_panic_hook::set_once();
        Self {
            processor: Processor::new(),
        }
    }

    /// Load interleaved samples
    pub fn load_audio_data(
        &mut self,
        channels: u16,
        sample_rate: u32,
        audio_data: &Float32Array,
    ) -> JsResult<()> {
        if channels == 0 {
            return Err(JsValue::from_str("Channel count must be positive"));
        }
        let num_channels = channels as usize;
        let buffer = audio_data.to_vec();
        let channel_length = buffer.len() / num_channels;

        let samples: Vec<Vec<f64>> = (0..num_channels)
            .map(|ch| {
                (0..channel_length)
                    .map(|i| buffer[i * num_channels + ch] as f64)
                    .collect()
            })
            .collect();

        let audio_info = AudioInfo::new(sample_rate, num_channels, channel_length);
        self.processor.load_audio(audio_info, samples).map_err(to_js)
    }

    /// Decode an uploaded file
    pub fn read_audio_bytes(&mut self, data: Uint8Array) -> JsResult<()> {
        let (audio_info, channel_data) = read_audio_bytes(data.to_vec()).map_err(to_js)?;
        self.processor
            .load_audio(audio_info, channel_data)
            .map_err(to_js)
    }

    pub fn get_info(&self) -> JsValue {
        let info = ProcessorInfoJs {
            original: self.processor.audio_info().map(AudioInfoJs::from),
            current: self.processor.current_info().as_ref().map(AudioInfoJs::from),
            params: ParamsJs::from(self.processor.params()),
            effects: self
                .processor
                .history()
                .iter()
                .map(|e| e.to_string())
                .collect(),
        };
        serde_wasm_bindgen::to_value(&info).unwrap_or(JsValue::null())
    }

    pub fn set_params(
        &mut self,
        frame_size: usize,
        hop_size: usize,
        window: &str,
        echo_mode: &str,
        interpolation: &str,
    ) -> JsResult<()> {
        let params = ProcessParams {
            frame_size,
            hop_size,
            window: window.parse().map_err(to_js)?,
            echo_mode: echo_mode.parse().map_err(to_js)?,
            interpolation: interpolation.parse().map_err(to_js)?,
        };
        self.processor.set_params(params).map_err(to_js)
    }

    /// Load a preset by name; `fine_time_resolution` and "Fine Time Resolution" both work
    pub fn load_preset(&mut self, preset_name: &str) -> JsResult<()> {
        let preset = presets::find_preset(&preset_name.replace('_', " "))
            .ok_or_else(|| JsValue::from_str(&format!("Unknown preset: {}", preset_name)))?;
        self.processor.set_params(preset.params).map_err(to_js)
    }

    pub fn get_presets(&self) -> JsValue {
        let preset_info: Vec<_> = presets::list_presets()
            .iter()
            .map(|preset| {
                serde_json::json!({
                    "id": preset.id,
                    "name": preset.name,
                    "key": preset.name.to_lowercase().replace(' ', "_"),
                    "description": preset.description,
                    "frame_size": preset.params.frame_size,
                    "hop_size": preset.params.hop_size,
                    "window": preset.params.window.name(),
                })
            })
            .collect();
        serde_wasm_bindgen::to_value(&preset_info).unwrap_or(JsValue::null())
    }

    /// Apply an effect given as `{ type: "robotize" | "pitch_shift" | "time_stretch" | "echo", ... }`
    pub fn apply_effect(&mut self, effect: JsValue) -> JsResult<()> {
        let effect: EffectJs = serde_wasm_bindgen::from_value(effect)
            .map_err(|e| JsValue::from_str(&format!("Invalid effect: {}", e)))?;
        let effect = Effect::from(effect);
        log::debug!("Applying {} from JS", effect);
        self.processor.apply(effect).map_err(|e| {
            log::warn!("{} rejected: {}", effect, e);
            to_js(e)
        })
    }

    pub fn robotize(&mut self) -> JsResult<()> {
        self.processor.apply(Effect::Robotize).map_err(to_js)
    }

    pub fn pitch_shift(&mut self, semitones: f64) -> JsResult<()> {
        self.processor
            .apply(Effect::PitchShift { semitones })
            .map_err(to_js)
    }

    pub fn time_stretch(&mut self, factor: f64) -> JsResult<()> {
        self.processor
            .apply(Effect::TimeStretch { factor })
            .map_err(to_js)
    }

    pub fn echo(&mut self, delay_seconds: f64, gain: f64) -> JsResult<()> {
        self.processor
            .apply(Effect::Echo {
                delay_seconds,
                gain,
            })
            .map_err(to_js)
    }

    /// Current audio, interleaved and scaled down if it would clip
    pub fn get_processed_audio(&self) -> JsResult<Float32Array> {
        let mut channels = self.processor.current_channels().ok_or_else(no_audio)?;
        let peak = channels
            .iter()
            .map(|c| utils::peak_amplitude(c))
            .fold(0.0, f64::max);
        if peak > 1.0 {
            utils::normalize_peak(&mut channels, 1.0);
        }
        Ok(interleave(&channels))
    }

    pub fn get_original_audio(&self) -> JsResult<Float32Array> {
        let channels = self.processor.original().ok_or_else(no_audio)?;
        Ok(interleave(channels))
    }

    /// Current audio as WAV file bytes
    pub fn save_audio_bytes(&self) -> JsResult<Uint8Array> {
        let info = self.processor.current_info().ok_or_else(no_audio)?;
        let channels = self.processor.current_channels().ok_or_else(no_audio)?;
        let bytes = write_audio_bytes(&info, &channels).map_err(to_js)?;
        Ok(Uint8Array::from(&bytes[..]))
    }

    pub fn reset(&mut self) {
        self.processor.reset();
    }

    /// Magnitudes of one frame of the current audio, downsampled to at most `max_points`
    pub fn get_spectrum_data(
        &self,
        channel: usize,
        frame: usize,
        max_points: usize,
    ) -> JsResult<Float32Array> {
        let spectrogram = self.processor.current_spectrogram(channel).map_err(to_js)?;
        let magnitudes = spectrogram
            .magnitudes
            .get(frame)
            .ok_or_else(|| JsValue::from_str(&format!("Frame {} out of range", frame)))?;
        Ok(downsample(magnitudes, max_points))
    }

    /// Time-averaged spectrum of the current (or original) audio
    pub fn get_average_spectrum(
        &self,
        channel: usize,
        original: bool,
        max_points: usize,
    ) -> JsResult<Float32Array> {
        let spectrogram = if original {
            self.processor.original_spectrogram(channel)
        } else {
            self.processor.current_spectrogram(channel)
        }
        .map_err(to_js)?;
        Ok(downsample(&spectrogram.average_spectrum(), max_points))
    }

    /// Spectrogram in dB as a flat row-major array plus its shape
    pub fn get_spectrogram(&self, channel: usize, original: bool) -> JsResult<JsValue> {
        let spectrogram = if original {
            self.processor.original_spectrogram(channel)
        } else {
            self.processor.current_spectrogram(channel)
        }
        .map_err(to_js)?;

        let flat: Vec<f32> = spectrogram
            .to_db(1.0)
            .into_iter()
            .flatten()
            .map(|v| v as f32)
            .collect();
        let data = serde_json::json!({
            "num_frames": spectrogram.num_frames,
            "num_bins": spectrogram.num_bins,
            "hop_seconds": spectrogram.hop_size as f64 / spectrogram.sample_rate as f64,
            "max_frequency": spectrogram.frequency_axis().last().copied().unwrap_or(0.0),
            "magnitudes_db": flat,
        });
        serde_wasm_bindgen::to_value(&data).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Min/max envelope for drawing a waveform `columns` wide
    pub fn get_waveform(&self, columns: usize, original: bool) -> JsResult<JsValue> {
        let info = self.processor.audio_info().ok_or_else(no_audio)?;
        let waveform = if original {
            let channels = self.processor.original().ok_or_else(no_audio)?;
            Waveform::from_channels(channels, columns, info.sample_rate)
        } else {
            let channels = self.processor.current_channels().ok_or_else(no_audio)?;
            Waveform::from_channels(&channels, columns, info.sample_rate)
        };
        serde_wasm_bindgen::to_value(&WaveformJs::from(&waveform))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn get_bin_frequency(&self, bin: usize) -> f64 {
        match self.processor.audio_info() {
            Some(info) => {
                utils::bin_to_frequency(bin, info.sample_rate, self.processor.params().frame_size)
            }
            None => 0.0,
        }
    }

    /// Human-readable description of an effect with the current parameters
    pub fn describe_effect(&self, effect: JsValue) -> JsResult<String> {
        let effect: EffectJs = serde_wasm_bindgen::from_value(effect)
            .map_err(|e| JsValue::from_str(&format!("Invalid effect: {}", e)))?;
        let sample_rate = self.processor.audio_info().map_or(44100, |i| i.sample_rate);
        Ok(utils::effect_summary(
            &effect.into(),
            self.processor.params(),
            sample_rate,
        ))
    }
}

impl Default for WasmVocoder {
    fn default() -> Self {
        Self::new()
    }
}

fn downsample(values: &[f64], max_points: usize) -> Float32Array {
    let output_size = max_points.min(values.len());
    let points: Vec<f32> = if output_size == values.len() || output_size < 2 {
        values.iter().take(output_size).map(|&v| v as f32).collect()
    } else {
        (0..output_size)
            .map(|i| values[i * (values.len() - 1) / (output_size - 1)] as f32)
            .collect()
    };
    Float32Array::from(&points[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_json_shapes() {
        let parsed: EffectJs =
            serde_json::from_str(r#"{"type":"pitch_shift","semitones":-3}"#).unwrap();
        assert_eq!(parsed, EffectJs::PitchShift { semitones: -3.0 });

        let parsed: EffectJs =
            serde_json::from_str(r#"{"type":"echo","delay_seconds":0.25,"gain":0.5}"#).unwrap();
        assert_eq!(
            Effect::from(parsed),
            Effect::Echo {
                delay_seconds: 0.25,
                gain: 0.5
            }
        );

        let parsed: EffectJs = serde_json::from_str(r#"{"type":"robotize"}"#).unwrap();
        assert_eq!(Effect::from(parsed), Effect::Robotize);

        assert!(serde_json::from_str::<EffectJs>(r#"{"type":"chorus"}"#).is_err());
    }
}
