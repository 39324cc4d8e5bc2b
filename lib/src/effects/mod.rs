//! Effects built on top of the resynthesis pass
//!
//! The robotizer works on spectra inside the pass; the echo runs on the
//! reconstructed time-domain signal afterwards.

pub mod echo;
pub mod robotize;

pub use echo::{Echo, EchoMode};
pub use robotize::{robotize, robotize_frame};
