//! Vocoder Library
//!
//! Phase vocoder audio effects: time stretching and pitch shifting that keep
//! timbre, a robot voice that flattens every frame's phase, and a feedback
//! echo. Also provides audio decoding/encoding and read-only spectrogram and
//! waveform snapshots for front ends.

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

pub mod audio_io;
pub mod effects;
pub mod error;
pub mod framer;
pub mod modifier;
pub mod phase;
pub mod pipeline;
pub mod processor;
pub mod resample;
pub mod spectrogram;
pub mod stft;
pub mod transform;
pub mod utils;
pub mod waveform;
pub mod window;

pub use effects::EchoMode;
pub use error::VocoderError;
pub use num_complex::Complex64;
pub use pipeline::{process, process_channels, Effect, Pipeline, ProcessOutput, ProcessParams};
pub use processor::Processor;
pub use resample::Interpolation;
pub use spectrogram::Spectrogram;
pub use waveform::Waveform;
pub use window::WindowKind;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging and, under wasm, the panic hook
#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn init() {
    #[cfg(feature = "wasm")]
    {
        console_error_panic_hook::set_once();
    }

    #[cfg(all(not(target_arch = "wasm32"), feature = "env_logger"))]
    {
        let _ = env_logger::try_init();
    }
}

pub type Result<T> = std::result::Result<T, VocoderError>;
