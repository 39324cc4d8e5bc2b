//! Helpers for front ends: file round trips, formatting, measurement
//! and parameter presets.

#[cfg(not(target_arch = "wasm32"))]
use crate::audio_io::{read_audio_file, write_audio_file};
use crate::pipeline::{Effect, ProcessParams};
#[cfg(not(target_arch = "wasm32"))]
use crate::processor::Processor;
use crate::window::{generate_window, WindowKind};
use crate::Result;
use realfft::RealFftPlanner;

/// Load an audio file into `processor`
#[cfg(not(target_arch = "wasm32"))]
pub fn load_audio<P: AsRef<std::path::Path>>(processor: &mut Processor, path: P) -> Result<()> {
    let (audio_info, channel_data) = read_audio_file(path.as_ref())?;
    log::info!(
        "Loaded {}: {} channels, {} Hz, {}",
        path.as_ref().display(),
        audio_info.channels,
        audio_info.sample_rate,
        format_time(audio_info.duration_seconds)
    );
    validate_params_for_audio(
        processor.params(),
        audio_info.sample_rate,
        audio_info.duration_samples,
    );
    processor.load_audio(audio_info, channel_data)
}

/// Write the processor's current signal to a WAV file
#[cfg(not(target_arch = "wasm32"))]
pub fn save_audio<P: AsRef<std::path::Path>>(processor: &Processor, path: P) -> Result<()> {
    let info = processor
        .current_info()
        .ok_or_else(|| crate::VocoderError::Audio("No audio loaded".to_string()))?;
    let channels = processor
        .current_channels()
        .ok_or_else(|| crate::VocoderError::Audio("No audio loaded".to_string()))?;
    write_audio_file(path.as_ref(), &info, &channels)?;
    log::info!(
        "Saved {} channels, {} to {}",
        info.channels,
        format_time(info.duration_seconds),
        path.as_ref().display()
    );
    Ok(())
}

/// Read `input`, apply `effect` to every channel and write `output`
#[cfg(not(target_arch = "wasm32"))]
pub fn process_file<P: AsRef<std::path::Path>, Q: AsRef<std::path::Path>>(
    input: P,
    output: Q,
    effect: Effect,
    params: &ProcessParams,
) -> Result<Processor> {
    let mut processor = Processor::with_params(*params);
    load_audio(&mut processor, input)?;
    processor.apply(effect)?;
    save_audio(&processor, output)?;
    Ok(processor)
}

pub fn format_frequency(freq_hz: f64) -> String {
    if freq_hz >= 1000.0 {
        format!("{:.2} kHz", freq_hz / 1000.0)
    } else {
        format!("{:.1} Hz", freq_hz)
    }
}

pub fn format_time(time_sec: f64) -> String {
    if time_sec >= 60.0 {
        let minutes = (time_sec / 60.0).floor();
        let seconds = time_sec - minutes * 60.0;
        format!("{:.0}m {:.1}s", minutes, seconds)
    } else {
        format!("{:.2}s", time_sec)
    }
}

pub fn format_duration(samples: usize, sample_rate: u32) -> String {
    format_time(samples as f64 / sample_rate as f64)
}

/// Centre frequency of `bin` for a transform of `fft_size` samples
pub fn bin_to_frequency(bin: usize, sample_rate: u32, fft_size: usize) -> f64 {
    bin as f64 * sample_rate as f64 / fft_size as f64
}

/// Nearest bin to `frequency`
pub fn frequency_to_bin(frequency: f64, sample_rate: u32, fft_size: usize) -> usize {
    (frequency * fft_size as f64 / sample_rate as f64).round() as usize
}

/// Frequency of the strongest component of `signal`.
///
/// Takes one Hann-windowed transform over the whole signal and refines the
/// peak bin by fitting a parabola through the log magnitudes around it.
/// Returns `None` for silent or too-short input.
pub fn dominant_frequency(signal: &[f64], sample_rate: u32) -> Option<f64> {
    let len = signal.len() & !1;
    if len < 4 {
        return None;
    }

    let window = generate_window(WindowKind::Hann, len);
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(len);
    let mut input: Vec<f64> = signal[..len]
        .iter()
        .zip(&window)
        .map(|(s, w)| s * w)
        .collect();
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut input, &mut spectrum).ok()?;

    let magnitudes: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
    let (peak, &peak_mag) = magnitudes
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if peak_mag <= 1e-12 {
        return None;
    }

    let mut position = peak as f64;
    if peak + 1 < magnitudes.len() {
        let (a, b, c) = (
            magnitudes[peak - 1].max(1e-30).ln(),
            peak_mag.ln(),
            magnitudes[peak + 1].max(1e-30).ln(),
        );
        let denom = a - 2.0 * b + c;
        if denom.abs() > 1e-12 {
            position += (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        }
    }

    Some(position * sample_rate as f64 / len as f64)
}

/// Largest absolute sample value
pub fn peak_amplitude(signal: &[f64]) -> f64 {
    signal.iter().fold(0.0, |m, s| m.max(s.abs()))
}

/// Scale every channel by the same gain so the loudest sample hits `target`.
/// Silent input is left alone.
pub fn normalize_peak(channels: &mut [Vec<f64>], target: f64) {
    let peak = channels
        .iter()
        .map(|c| peak_amplitude(c))
        .fold(0.0, f64::max);
    if peak <= 0.0 {
        return;
    }
    let gain = target / peak;
    for channel in channels.iter_mut() {
        channel.iter_mut().for_each(|s| *s *= gain);
    }
}

/// One-paragraph description of what `effect` will do with `params`
pub fn effect_summary(effect: &Effect, params: &ProcessParams, sample_rate: u32) -> String {
    let mut summary = format!("{}\n", effect);
    summary.push_str(&format!(
        "  Frame: {} samples ({:.1} ms), hop {} ({:.0}% overlap), {} window\n",
        params.frame_size,
        params.frame_size as f64 * 1000.0 / sample_rate as f64,
        params.hop_size,
        params.overlap() * 100.0,
        params.window
    ));

    match *effect {
        Effect::Robotize => {
            summary.push_str(&format!(
                "  Robot pitch: {}\n",
                format_frequency(sample_rate as f64 / params.hop_size as f64)
            ));
        }
        Effect::PitchShift { semitones } => {
            summary.push_str(&format!(
                "  Frequency ratio: {:.4}, {} resampling\n",
                crate::modifier::pitch_ratio(semitones),
                params.interpolation
            ));
        }
        Effect::TimeStretch { factor } => {
            summary.push_str(&format!(
                "  Synthesis hop: {} samples\n",
                ((params.hop_size as f64 * factor).round() as usize).max(1)
            ));
        }
        Effect::Echo {
            delay_seconds,
            gain,
        } => {
            summary.push_str(&format!(
                "  Delay: {} samples, gain {:.2}, {} mode\n",
                (delay_seconds * sample_rate as f64).round() as usize,
                gain,
                params.echo_mode
            ));
        }
    }

    summary
}

/// Log the resolution `params` gives at `sample_rate` and warn on coarse settings
pub fn validate_params_for_audio(params: &ProcessParams, sample_rate: u32, duration_samples: usize) {
    let freq_resolution = sample_rate as f64 / params.frame_size as f64;
    let time_resolution = params.hop_size as f64 / sample_rate as f64;

    log::info!(
        "Frequency resolution {}, time resolution {:.2} ms, Nyquist {}",
        format_frequency(freq_resolution),
        time_resolution * 1000.0,
        format_frequency(sample_rate as f64 / 2.0)
    );

    if duration_samples < params.frame_size {
        log::warn!(
            "Audio ({} samples) is shorter than one frame ({}); expect edge artifacts",
            duration_samples,
            params.frame_size
        );
    }
    if freq_resolution > 50.0 {
        log::warn!(
            "Frequency resolution ({}) is coarse, consider a larger frame",
            format_frequency(freq_resolution)
        );
    }
    if time_resolution > 0.05 {
        log::warn!(
            "Time resolution ({:.1} ms) is coarse, consider a smaller hop",
            time_resolution * 1000.0
        );
    }
}

/// Named parameter sets
pub mod presets {
    use super::*;

    pub struct PresetInfo {
        pub id: usize,
        pub name: &'static str,
        pub description: &'static str,
        pub params: ProcessParams,
    }

    fn params(frame_size: usize, hop_size: usize, window: WindowKind) -> ProcessParams {
        ProcessParams {
            frame_size,
            hop_size,
            window,
            ..ProcessParams::default()
        }
    }

    pub fn list_presets() -> Vec<PresetInfo> {
        vec![
            PresetInfo {
                id: 0,
                name: "Default",
                description: "Frame=2048, Hop=512, Hann",
                params: ProcessParams::default(),
            },
            PresetInfo {
                id: 1,
                name: "Speech",
                description: "Frame=1024, Hop=256, Hann",
                params: params(1024, 256, WindowKind::Hann),
            },
            PresetInfo {
                id: 2,
                name: "Music",
                description: "Frame=4096, Hop=1024, Hann, cubic resampling",
                params: params(4096, 1024, WindowKind::Hann)
                    .with_interpolation(crate::resample::Interpolation::Cubic),
            },
            PresetInfo {
                id: 3,
                name: "Fine Time Resolution",
                description: "Frame=512, Hop=128, Hann",
                params: params(512, 128, WindowKind::Hann),
            },
            PresetInfo {
                id: 4,
                name: "Fine Frequency Resolution",
                description: "Frame=8192, Hop=2048, Hann",
                params: params(8192, 2048, WindowKind::Hann),
            },
            PresetInfo {
                id: 5,
                name: "Fast",
                description: "Frame=1024, Hop=512, Hamming",
                params: params(1024, 512, WindowKind::Hamming),
            },
        ]
    }

    pub fn get_preset(id: usize) -> Option<PresetInfo> {
        list_presets().into_iter().find(|p| p.id == id)
    }

    /// Case-insensitive lookup by name
    pub fn find_preset(name: &str) -> Option<PresetInfo> {
        list_presets()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_frequency_formatting() {
        assert_eq!(format_frequency(440.0), "440.0 Hz");
        assert_eq!(format_frequency(1000.0), "1.00 kHz");
        assert_eq!(format_frequency(22050.0), "22.05 kHz");
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_time(0.5), "0.50s");
        assert_eq!(format_time(75.5), "1m 15.5s");
        assert_eq!(format_duration(88200, 44100), "2.00s");
    }

    #[test]
    fn test_bin_frequency_conversion() {
        assert_eq!(bin_to_frequency(0, 44100, 1024), 0.0);
        assert!((bin_to_frequency(512, 44100, 1024) - 22050.0).abs() < 1e-10);
        assert_eq!(frequency_to_bin(440.0, 44100, 1024), 10);
    }

    #[test]
    fn test_dominant_frequency() {
        for &freq in &[100.0, 440.0, 1234.5, 5000.0] {
            let found = dominant_frequency(&sine(freq, 44100, 44100), 44100).unwrap();
            assert!((found - freq).abs() < 1.0, "{} Hz detected as {}", freq, found);
        }
        assert_eq!(dominant_frequency(&vec![0.0; 1000], 44100), None);
        assert_eq!(dominant_frequency(&[1.0, 2.0], 44100), None);
    }

    #[test]
    fn test_peak_and_normalize() {
        let mut channels = vec![vec![0.1, -0.4], vec![0.2, 0.0]];
        assert!((peak_amplitude(&channels[0]) - 0.4).abs() < 1e-12);
        normalize_peak(&mut channels, 0.8);
        assert!((channels[0][1] + 0.8).abs() < 1e-12);
        assert!((channels[1][0] - 0.4).abs() < 1e-12);

        let mut silent = vec![vec![0.0; 4]];
        normalize_peak(&mut silent, 1.0);
        assert_eq!(silent[0], vec![0.0; 4]);
    }

    #[test]
    fn test_effect_summary_mentions_robot_pitch() {
        let summary = effect_summary(&Effect::Robotize, &ProcessParams::default(), 44100);
        assert!(summary.starts_with("Robotize"));
        assert!(summary.contains("86.1 Hz"), "{}", summary);
    }

    #[test]
    fn test_presets_are_valid() {
        let presets = presets::list_presets();
        assert_eq!(presets.len(), 6);
        for preset in &presets {
            assert!(preset.params.validate().is_ok(), "{} invalid", preset.name);
        }
        assert_eq!(presets::get_preset(1).unwrap().name, "Speech");
        assert_eq!(presets::find_preset("fast").unwrap().params.hop_size, 512);
        assert!(presets::get_preset(42).is_none());
        assert!(presets::find_preset("loud").is_none());
    }

    #[test]
    fn test_process_file_round_trip() {
        use crate::audio_io::{read_audio_file, write_audio_file, AudioInfo};

        let dir = std::env::temp_dir();
        let input = dir.join(format!("vocoder_utils_in_{}.wav", std::process::id()));
        let output = dir.join(format!("vocoder_utils_out_{}.wav", std::process::id()));

        let signal = sine(440.0, 22050, 11025);
        write_audio_file(&input, &AudioInfo::new(22050, 1, signal.len()), &[signal]).unwrap();

        let processor = process_file(
            &input,
            &output,
            Effect::TimeStretch { factor: 2.0 },
            &ProcessParams::default(),
        )
        .unwrap();
        assert_eq!(processor.history().len(), 1);

        let (info, data) = read_audio_file(&output).unwrap();
        assert_eq!(info.duration_samples, 22050);
        assert_eq!(data.len(), 1);

        let _ = std::fs::remove_file(input);
        let _ = std::fs::remove_file(output);
    }
}
