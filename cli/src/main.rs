//! Vocoder CLI
//!
//! Processes a file in one shot when `--effect` and `--output` are given,
//! otherwise opens an interactive shell.

use std::process;

use clap::{Arg, ArgMatches, Command};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use vocoder_lib::{
    utils::{self, presets},
    EchoMode, Effect, Interpolation, ProcessParams, Processor, VocoderError, WindowKind,
};

#[cfg(feature = "image")]
use vocoder_lib::{
    spectrogram::{
        image::{save_comparison, save_spectrogram, save_waveform, ColorMap, SpectrogramImageOptions},
        FrequencyScale,
    },
    Waveform,
};

/// Default echo settings when only `--effect echo` is given
const DEFAULT_DELAY_SECONDS: f64 = 0.3;
const DEFAULT_ECHO_GAIN: f64 = 0.5;

struct AppState {
    processor: Processor,
    current_file: Option<String>,
}

impl AppState {
    fn new(params: ProcessParams) -> Self {
        Self {
            processor: Processor::with_params(params),
            current_file: None,
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  load <filename>                    - Load an audio file");
    println!("  save <filename>                    - Save the processed audio as 32-bit float WAV");
    println!("  robot                              - Robot voice (pitch = sample rate / hop)");
    println!("  pitch <semitones>                  - Shift pitch, keep duration");
    println!("  speed <factor>                     - Stretch duration by factor, keep pitch");
    println!("  echo [delay_seconds] [gain]        - Add an echo (default 0.3 s, gain 0.5)");
    println!("  reset                              - Discard all applied effects");
    println!("  config                             - Show current parameters");
    println!("  set frame_size <n>                 - Frame size in samples (even, up to 65536)");
    println!("  set hop_size <n>                   - Analysis hop in samples (at most frame size)");
    println!("  set window <type>                  - hann, hamming, rectangular, bartlett");
    println!("  set echo_mode <mode>               - feedback or single");
    println!("  set interpolation <kind>           - linear or cubic (pitch shift resampling)");
    println!("  preset <n|name>                    - Load a parameter preset");
    println!("  presets                            - List available presets");
    println!("  info                               - Show loaded audio and applied effects");
    #[cfg(feature = "image")]
    {
        println!("  spectrogram <file.png> [options]   - Spectrogram of the current audio");
        println!("      options: original, linear|log, viridis|magma|jet|grayscale, <width> <height>");
        println!("  waveform <file.png> [width] [height] - Waveform of the current audio");
        println!("  compare <file.png> [options]       - Original above processed spectrogram");
    }
    println!("  help                               - Show this help message");
    println!("  quit                               - Exit the program");
    println!();
    println!("Examples:");
    println!("  load voice.wav");
    println!("  pitch -5");
    println!("  echo 0.25 0.4");
    println!("  save deep_echo.wav");
    println!("  preset speech");
    println!("  robot");
}

/// Parse one effect from a command name and its arguments
fn parse_effect(name: &str, args: &[&str]) -> Result<Effect, String> {
    let number = |idx: usize, what: &str| -> Result<Option<f64>, String> {
        match args.get(idx) {
            Some(s) => s
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("Invalid {}: {}", what, s)),
            None => Ok(None),
        }
    };

    match name {
        "robot" | "robotize" => Ok(Effect::Robotize),
        "pitch" => {
            let semitones = number(0, "semitones")?.ok_or("Usage: pitch <semitones>")?;
            Ok(Effect::PitchShift { semitones })
        }
        "speed" | "stretch" => {
            let factor = number(0, "factor")?.ok_or("Usage: speed <factor>")?;
            Ok(Effect::TimeStretch { factor })
        }
        "echo" => Ok(Effect::Echo {
            delay_seconds: number(0, "delay")?.unwrap_or(DEFAULT_DELAY_SECONDS),
            gain: number(1, "gain")?.unwrap_or(DEFAULT_ECHO_GAIN),
        }),
        _ => Err(format!("Unknown effect: {}", name)),
    }
}

fn describe_error(err: &VocoderError) -> String {
    match err {
        VocoderError::InvalidParameter { name, .. } => format!("{} (check '{}')", err, name),
        _ => err.to_string(),
    }
}

fn apply_effect(state: &mut AppState, effect: Effect) {
    let Some(info) = state.processor.audio_info() else {
        println!("No audio loaded. Load a file first.");
        return;
    };
    print!(
        "{}",
        utils::effect_summary(&effect, state.processor.params(), info.sample_rate)
    );

    match state.processor.apply(effect) {
        Ok(()) => {
            if let Some(current) = state.processor.current_info() {
                println!(
                    "Done. Current length: {}",
                    utils::format_duration(current.duration_samples, current.sample_rate)
                );
            }
        }
        Err(e) => {
            log::error!("{} failed: {}", effect, e);
            println!("Error: {}", describe_error(&e));
        }
    }
}

fn print_config(params: &ProcessParams) {
    println!("Current parameters:");
    println!("  Frame size: {}", params.frame_size);
    println!("  Hop size: {} ({:.0}% overlap)", params.hop_size, params.overlap() * 100.0);
    println!("  Window: {}", params.window);
    println!("  Echo mode: {}", params.echo_mode);
    println!("  Interpolation: {}", params.interpolation);
}

fn print_info(state: &AppState) {
    let Some(info) = state.processor.audio_info() else {
        println!("No audio loaded.");
        return;
    };
    if let Some(file) = &state.current_file {
        println!("File: {}", file);
    }
    println!(
        "Original: {} channels, {} Hz, {}",
        info.channels,
        info.sample_rate,
        utils::format_duration(info.duration_samples, info.sample_rate)
    );
    if let Some(channels) = state.processor.current_channels() {
        let peak = channels
            .iter()
            .map(|c| utils::peak_amplitude(c))
            .fold(0.0, f64::max);
        println!("Current peak amplitude: {:.3}", peak);
        if let Some(freq) = channels.first().and_then(|c| utils::dominant_frequency(c, info.sample_rate)) {
            println!("Dominant frequency (channel 0): {}", utils::format_frequency(freq));
        }
    }
    if state.processor.history().is_empty() {
        println!("No effects applied.");
    } else {
        println!("Applied effects:");
        for (i, effect) in state.processor.history().iter().enumerate() {
            println!("  {}. {}", i + 1, effect);
        }
    }
}

fn set_parameter(state: &mut AppState, param: &str, value: &str) -> Result<(), String> {
    let mut params = *state.processor.params();
    let parse_usize = |v: &str| {
        v.parse::<usize>()
            .map_err(|_| format!("Invalid {}: {}", param, v))
    };

    match param {
        "frame_size" => params.frame_size = parse_usize(value)?,
        "hop_size" => params.hop_size = parse_usize(value)?,
        "window" => params.window = value.parse::<WindowKind>().map_err(|e| e.to_string())?,
        "echo_mode" => params.echo_mode = value.parse::<EchoMode>().map_err(|e| e.to_string())?,
        "interpolation" => {
            params.interpolation = value.parse::<Interpolation>().map_err(|e| e.to_string())?
        }
        _ => {
            return Err(format!(
                "Unknown parameter: {} (valid: frame_size, hop_size, window, echo_mode, interpolation)",
                param
            ))
        }
    }

    state
        .processor
        .set_params(params)
        .map_err(|e| describe_error(&e))
}

#[cfg(feature = "image")]
fn parse_image_options(args: &[&str]) -> Result<(SpectrogramImageOptions, bool), String> {
    let mut options = SpectrogramImageOptions::default();
    let mut original = false;
    let mut sizes = Vec::new();

    for arg in args {
        if *arg == "original" {
            original = true;
        } else if let Ok(scale) = arg.parse::<FrequencyScale>() {
            options.frequency_scale = scale;
        } else if let Ok(colormap) = arg.parse::<ColorMap>() {
            options.colormap = colormap;
        } else if let Ok(size) = arg.parse::<u32>() {
            sizes.push(size);
        } else {
            return Err(format!("Unknown option: {}", arg));
        }
    }

    if let Some(&width) = sizes.first() {
        options.width = width;
    }
    if let Some(&height) = sizes.get(1) {
        options.height = height;
    }
    if options.width == 0 || options.height == 0 {
        return Err("Image dimensions must be positive".to_string());
    }
    Ok((options, original))
}

#[cfg(feature = "image")]
fn image_command(state: &AppState, parts: &[&str]) -> Result<(), String> {
    let command = parts[0];
    let path = parts
        .get(1)
        .ok_or_else(|| format!("Usage: {} <file.png> [options]", command))?;
    if !state.processor.has_audio() {
        return Err("No audio loaded. Load a file first.".to_string());
    }

    match command {
        "spectrogram" => {
            let (options, original) = parse_image_options(&parts[2..])?;
            let spectrogram = if original {
                state.processor.original_spectrogram(0)
            } else {
                state.processor.current_spectrogram(0)
            }
            .map_err(|e| describe_error(&e))?;
            save_spectrogram(&spectrogram, path, &options).map_err(|e| e.to_string())
        }
        "compare" => {
            let (options, _) = parse_image_options(&parts[2..])?;
            let original = state
                .processor
                .original_spectrogram(0)
                .map_err(|e| describe_error(&e))?;
            let processed = state
                .processor
                .current_spectrogram(0)
                .map_err(|e| describe_error(&e))?;
            save_comparison(&original, &processed, path, &options).map_err(|e| e.to_string())
        }
        "waveform" => {
            let width = parts.get(2).map_or(Ok(800), |s| s.parse::<usize>());
            let height = parts.get(3).map_or(Ok(200), |s| s.parse::<u32>());
            let (Ok(width), Ok(height)) = (width, height) else {
                return Err("Usage: waveform <file.png> [width] [height]".to_string());
            };
            let info = state
                .processor
                .current_info()
                .ok_or("No audio loaded")?;
            let channels = state.processor.current_channels().ok_or("No audio loaded")?;
            let waveform = Waveform::from_channels(&channels, width, info.sample_rate);
            save_waveform(&waveform, height, path).map_err(|e| e.to_string())
        }
        _ => Err(format!("Unknown command: {}", command)),
    }
}

/// Handle one shell command; returns false when the shell should exit
fn process_command(command: &str, state: &mut AppState) -> bool {
    let parts: Vec<&str> = command.split_whitespace().collect();
    if parts.is_empty() {
        return true;
    }

    match parts[0] {
        "load" => {
            if parts.len() != 2 {
                println!("Usage: load <filename>");
                return true;
            }
            let filename = parts[1];
            println!("Loading file: {}", filename);
            match utils::load_audio(&mut state.processor, filename) {
                Ok(()) => {
                    state.current_file = Some(filename.to_string());
                    println!("File loaded successfully!");
                    print_info(state);
                }
                Err(e) => println!("Error loading file: {}", e),
            }
        }

        "save" => {
            if parts.len() != 2 {
                println!("Usage: save <filename>");
                return true;
            }
            if !state.processor.has_audio() {
                println!("No audio loaded. Load a file first.");
                return true;
            }
            match utils::save_audio(&state.processor, parts[1]) {
                Ok(()) => println!("Saved to {}", parts[1]),
                Err(e) => println!("Error saving file: {}", e),
            }
        }

        "robot" | "robotize" | "pitch" | "speed" | "stretch" | "echo" => {
            match parse_effect(parts[0], &parts[1..]) {
                Ok(effect) => apply_effect(state, effect),
                Err(e) => println!("{}", e),
            }
        }

        "reset" => {
            state.processor.reset();
            println!("All effects discarded.");
        }

        "config" => print_config(state.processor.params()),

        "set" => {
            if parts.len() != 3 {
                println!("Usage: set <parameter> <value>");
                return true;
            }
            match set_parameter(state, parts[1], parts[2]) {
                Ok(()) => println!("{} set to {}", parts[1], parts[2]),
                Err(e) => println!("Error: {}", e),
            }
        }

        "preset" => {
            if parts.len() < 2 {
                println!("Usage: preset <number|name>");
                return true;
            }
            let query = parts[1..].join(" ");
            let preset = match query.parse::<usize>() {
                Ok(id) => presets::get_preset(id),
                Err(_) => presets::find_preset(&query),
            };
            match preset {
                Some(preset) => match state.processor.set_params(preset.params) {
                    Ok(()) => println!("Applied preset {}: {} ({})", preset.id, preset.name, preset.description),
                    Err(e) => println!("Error: {}", e),
                },
                None => println!("Unknown preset: {}", query),
            }
        }

        "presets" => {
            println!("Available presets:");
            for preset in presets::list_presets() {
                println!("  {}: {} - {}", preset.id, preset.name, preset.description);
            }
        }

        "info" => print_info(state),

        #[cfg(feature = "image")]
        "spectrogram" | "waveform" | "compare" => match image_command(state, &parts) {
            Ok(()) => println!("Saved {}", parts.get(1).unwrap_or(&"")),
            Err(e) => println!("Error: {}", e),
        },

        "help" => print_help(),

        "quit" | "exit" => return false,

        _ => {
            println!("Unknown command: '{}'", parts[0]);
            println!("Type 'help' for available commands");
        }
    }
    true
}

fn build_cli() -> Command {
    Command::new("vocoder")
        .version(vocoder_lib::VERSION)
        .about("Phase vocoder audio effects: robot voice, pitch shift, time stretch and echo")
        .arg(
            Arg::new("file")
                .help("Audio file to load")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("effect")
                .long("effect")
                .short('e')
                .help("Effect to apply (robot, pitch, speed, echo)")
                .value_name("EFFECT"),
        )
        .arg(
            Arg::new("semitones")
                .long("semitones")
                .short('s')
                .help("Pitch shift in semitones")
                .value_name("SEMITONES")
                .allow_negative_numbers(true),
        )
        .arg(
            Arg::new("factor")
                .long("factor")
                .short('f')
                .help("Time stretch factor (2.0 = twice as long)")
                .value_name("FACTOR"),
        )
        .arg(
            Arg::new("delay")
                .long("delay")
                .short('d')
                .help("Echo delay in seconds")
                .value_name("SECONDS"),
        )
        .arg(
            Arg::new("gain")
                .long("gain")
                .short('g')
                .help("Echo gain in [0, 1)")
                .value_name("GAIN"),
        )
        .arg(
            Arg::new("frame-size")
                .long("frame-size")
                .short('n')
                .help("Frame size in samples")
                .value_name("SIZE"),
        )
        .arg(
            Arg::new("hop-size")
                .long("hop-size")
                .help("Analysis hop in samples")
                .value_name("HOP"),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .short('w')
                .help("Window (hann, hamming, rectangular, bartlett)")
                .value_name("WINDOW"),
        )
        .arg(
            Arg::new("echo-mode")
                .long("echo-mode")
                .help("Echo mode (feedback, single)")
                .value_name("MODE"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .help("Output WAV file")
                .value_name("OUT"),
        )
        .arg(
            Arg::new("spectrogram")
                .long("spectrogram")
                .help("Write a spectrogram PNG of the result")
                .value_name("PNG"),
        )
}

/// Build parameters from command line flags
fn params_from_matches(matches: &ArgMatches) -> Result<ProcessParams, String> {
    let mut params = ProcessParams::default();

    if let Some(size) = matches.get_one::<String>("frame-size") {
        params.frame_size = size
            .parse()
            .map_err(|_| format!("Invalid frame size: {}", size))?;
    }
    if let Some(hop) = matches.get_one::<String>("hop-size") {
        params.hop_size = hop.parse().map_err(|_| format!("Invalid hop size: {}", hop))?;
    }
    if let Some(window) = matches.get_one::<String>("window") {
        params.window = window.parse().map_err(|e: VocoderError| e.to_string())?;
    }
    if let Some(mode) = matches.get_one::<String>("echo-mode") {
        params.echo_mode = mode.parse().map_err(|e: VocoderError| e.to_string())?;
    }

    params.validate().map_err(|e| describe_error(&e))?;
    Ok(params)
}

/// Build the effect named by `--effect` from its companion flags
fn effect_from_matches(matches: &ArgMatches) -> Result<Option<Effect>, String> {
    let Some(name) = matches.get_one::<String>("effect") else {
        return Ok(None);
    };
    let flag = |id: &str| matches.get_one::<String>(id).map(String::as_str);

    let args: Vec<&str> = match name.as_str() {
        "pitch" => flag("semitones").into_iter().collect(),
        "speed" | "stretch" => flag("factor").into_iter().collect(),
        "echo" => {
            let delay = flag("delay").unwrap_or("0.3");
            flag("gain").map_or(vec![delay], |gain| vec![delay, gain])
        }
        _ => Vec::new(),
    };
    parse_effect(name, &args).map(Some)
}

fn run_once(
    matches: &ArgMatches,
    params: ProcessParams,
    effect: Effect,
    input: &str,
    output: &str,
) -> Result<(), String> {
    log::info!(
        "One-shot {} with frame {} / hop {} ({})",
        effect,
        params.frame_size,
        params.hop_size,
        params.window
    );
    let processor = utils::process_file(input, output, effect, &params).map_err(|e| {
        log::error!("Processing {} failed: {}", input, e);
        describe_error(&e)
    })?;
    println!("{}: {} -> {}", effect, input, output);

    #[cfg(feature = "image")]
    {
        if let Some(png) = matches.get_one::<String>("spectrogram") {
            let spectrogram = processor
                .current_spectrogram(0)
                .map_err(|e| e.to_string())?;
            save_spectrogram(&spectrogram, png, &SpectrogramImageOptions::default())
                .map_err(|e| e.to_string())?;
            println!("Spectrogram written to {}", png);
        }
    }
    #[cfg(not(feature = "image"))]
    {
        let _ = (matches, processor);
    }

    Ok(())
}

fn main() {
    let matches = build_cli().get_matches();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let params = match params_from_matches(&matches) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    let effect = match effect_from_matches(&matches) {
        Ok(effect) => effect,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    let file = matches.get_one::<String>("file");
    let output = matches.get_one::<String>("output");

    if let (Some(effect), Some(input), Some(output)) = (effect, file, output) {
        if let Err(e) = run_once(&matches, params, effect, input, output) {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        return;
    }

    println!("Vocoder v{}", vocoder_lib::VERSION);
    println!("Type 'help' for available commands\n");

    let mut state = AppState::new(params);

    if let Some(filename) = file {
        process_command(&format!("load {}", filename), &mut state);
        if let Some(effect) = effect {
            apply_effect(&mut state, effect);
        }
    }

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to start line editor: {}", e);
            process::exit(1);
        }
    };

    loop {
        match rl.readline("vocoder> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    rl.add_history_entry(trimmed).ok();
                    if !process_command(trimmed, &mut state) {
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_effect() {
        assert_eq!(parse_effect("robot", &[]).unwrap(), Effect::Robotize);
        assert_eq!(
            parse_effect("pitch", &["-3.5"]).unwrap(),
            Effect::PitchShift { semitones: -3.5 }
        );
        assert_eq!(
            parse_effect("echo", &[]).unwrap(),
            Effect::Echo {
                delay_seconds: DEFAULT_DELAY_SECONDS,
                gain: DEFAULT_ECHO_GAIN
            }
        );
        assert!(parse_effect("pitch", &[]).is_err());
        assert!(parse_effect("speed", &["fast"]).is_err());
        assert!(parse_effect("flanger", &[]).is_err());
    }

    #[test]
    fn test_one_shot_flags() {
        let matches = build_cli()
            .try_get_matches_from([
                "vocoder", "in.wav", "--effect", "pitch", "--semitones", "-12", "--frame-size",
                "1024", "--hop-size", "256", "--output", "out.wav",
            ])
            .unwrap();
        let params = params_from_matches(&matches).unwrap();
        assert_eq!(params.frame_size, 1024);
        assert_eq!(params.hop_size, 256);
        assert_eq!(
            effect_from_matches(&matches).unwrap(),
            Some(Effect::PitchShift { semitones: -12.0 })
        );
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let matches = build_cli()
            .try_get_matches_from(["vocoder", "--frame-size", "512", "--hop-size", "1024"])
            .unwrap();
        assert!(params_from_matches(&matches).is_err());

        let matches = build_cli()
            .try_get_matches_from(["vocoder", "--effect", "echo", "--gain", "0.7", "--delay", "0.1"])
            .unwrap();
        assert_eq!(
            effect_from_matches(&matches).unwrap(),
            Some(Effect::Echo {
                delay_seconds: 0.1,
                gain: 0.7
            })
        );
    }

    #[test]
    fn test_set_parameter() {
        let mut state = AppState::new(ProcessParams::default());
        assert!(set_parameter(&mut state, "window", "hamming").is_ok());
        assert_eq!(state.processor.params().window, WindowKind::Hamming);
        assert!(set_parameter(&mut state, "hop_size", "999999").is_err());
        assert!(set_parameter(&mut state, "colour", "blue").is_err());
        assert_eq!(state.processor.params().hop_size, 512);
    }
}
