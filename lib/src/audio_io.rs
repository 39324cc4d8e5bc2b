//! Audio decoding and encoding
//!
//! Any format symphonia can probe is decoded into planar `f64` channels;
//! output is always written as 32-bit float WAV through hound.

#[cfg(not(target_arch = "wasm32"))]
use std::fs::File;
use std::io::{Cursor, Seek, Write};
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::VocoderError;
use crate::Result;

/// Audio metadata
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub duration_samples: usize,
    pub duration_seconds: f64,
}

impl AudioInfo {
    pub fn new(sample_rate: u32, channels: usize, duration_samples: usize) -> Self {
        let duration_seconds = if sample_rate > 0 {
            duration_samples as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self {
            sample_rate,
            channels,
            duration_samples,
            duration_seconds,
        }
    }

    /// Same format, different length
    pub fn with_duration(&self, duration_samples: usize) -> Self {
        Self::new(self.sample_rate, self.channels, duration_samples)
    }
}

fn decode_error(context: &str, err: SymphoniaError) -> VocoderError {
    VocoderError::Audio(format!("{}: {}", context, err))
}

fn is_end_of_stream(err: &SymphoniaError) -> bool {
    matches!(err, SymphoniaError::IoError(io) if io.kind() == std::io::ErrorKind::UnexpectedEof)
}

fn read_audio_stream(mss: MediaSourceStream) -> Result<(AudioInfo, Vec<Vec<f64>>)> {
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error("Unrecognized audio format", e))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| VocoderError::Audio("No default track found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error("Unsupported codec", e))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| VocoderError::Audio("Sample rate not specified".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| VocoderError::Audio("Channel layout not specified".to_string()))?
        .count();

    let mut channel_buffers: Vec<Vec<f64>> = vec![Vec::new(); channels];
    let mut sample_buffer: Option<SampleBuffer<f64>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(err) if is_end_of_stream(&err) => break,
            Err(err) => return Err(decode_error("Failed to read packet", err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(err) if is_end_of_stream(&err) => break,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(err) => return Err(decode_error("Failed to decode packet", err)),
        };

        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }

        let buffer = sample_buffer.get_or_insert_with(|| {
            SampleBuffer::<f64>::new(decoded.capacity() as u64, *decoded.spec())
        });
        if buffer.capacity() < frames * channels {
            *buffer = SampleBuffer::<f64>::new(decoded.capacity() as u64, *decoded.spec());
        }
        buffer.copy_planar_ref(decoded);

        // Planar layout: all of channel 0, then all of channel 1, ...
        for (c, samples) in buffer.samples().chunks_exact(frames).enumerate().take(channels) {
            channel_buffers[c].extend_from_slice(samples);
        }
    }

    let duration_samples = channel_buffers.first().map_or(0, Vec::len);
    let info = AudioInfo::new(sample_rate, channels, duration_samples);
    log::info!(
        "Decoded {} channel(s), {} samples at {} Hz",
        channels,
        duration_samples,
        sample_rate
    );

    Ok((info, channel_buffers))
}

/// Read an audio file from disk
#[cfg(not(target_arch = "wasm32"))]
pub fn read_audio_file<P: AsRef<Path>>(path: P) -> Result<(AudioInfo, Vec<Vec<f64>>)> {
    let file = File::open(path.as_ref()).map_err(|e| {
        VocoderError::Audio(format!("Cannot open {}: {}", path.as_ref().display(), e))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    read_audio_stream(mss)
}

/// Read audio from an encoded byte buffer
pub fn read_audio_bytes(data: Vec<u8>) -> Result<(AudioInfo, Vec<Vec<f64>>)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());
    read_audio_stream(mss)
}

fn check_channels(audio_info: &AudioInfo, channel_data: &[Vec<f64>]) -> Result<usize> {
    if channel_data.len() != audio_info.channels {
        return Err(VocoderError::Audio(format!(
            "Channel count mismatch: expected {}, got {}",
            audio_info.channels,
            channel_data.len()
        )));
    }
    let num_samples = channel_data.first().map_or(0, Vec::len);
    if let Some((i, channel)) = channel_data
        .iter()
        .enumerate()
        .find(|(_, c)| c.len() != num_samples)
    {
        return Err(VocoderError::Audio(format!(
            "Channel {} has length {}, expected {}",
            i,
            channel.len(),
            num_samples
        )));
    }
    Ok(num_samples)
}

fn write_wav<W: Write + Seek>(
    sink: W,
    audio_info: &AudioInfo,
    channel_data: &[Vec<f64>],
) -> Result<()> {
    let num_samples = check_channels(audio_info, channel_data)?;
    let spec = WavSpec {
        channels: audio_info.channels as u16,
        sample_rate: audio_info.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let wav_error = |e: hound::Error| VocoderError::Audio(format!("WAV encoding failed: {}", e));
    let mut writer = WavWriter::new(sink, spec).map_err(wav_error)?;

    for sample_idx in 0..num_samples {
        for channel in channel_data {
            writer
                .write_sample(channel[sample_idx] as f32)
                .map_err(wav_error)?;
        }
    }

    writer.finalize().map_err(wav_error)
}

/// Write channels to a 32-bit float WAV file
#[cfg(not(target_arch = "wasm32"))]
pub fn write_audio_file<P: AsRef<Path>>(
    path: P,
    audio_info: &AudioInfo,
    channel_data: &[Vec<f64>],
) -> Result<()> {
    let file = File::create(path.as_ref()).map_err(|e| {
        VocoderError::Audio(format!("Cannot create {}: {}", path.as_ref().display(), e))
    })?;
    write_wav(std::io::BufWriter::new(file), audio_info, channel_data)
}

/// Encode channels as an in-memory 32-bit float WAV
pub fn write_audio_bytes(audio_info: &AudioInfo, channel_data: &[Vec<f64>]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, audio_info, channel_data)?;
    Ok(cursor.into_inner())
}
