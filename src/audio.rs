// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Audio output for one-shot voices.
//!
//! Every trigger builds a fresh [`voice::Voice`] and hands it to an [`Output`]; nothing
//! keeps a handle to it afterward. The output mixes voices until they run out of frames.
use std::{error::Error, fmt, sync::Arc, time::Duration};

use crate::config;

pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod voice;

pub use voice::{play, Voice};

/// Errors produced while building or starting a voice.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Sample has no frames")]
    EmptySample,

    #[error("Unsupported channel count: {0}")]
    ChannelCount(u16),

    #[error("Invalid playback rate: {0}")]
    Rate(f64),

    #[error("Output is closed")]
    OutputClosed,

    #[error("Audio file error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoded audio held in memory. Cloning shares the underlying data.
#[derive(Clone)]
pub struct Sample {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    /// Number of interleaved channels.
    channel_count: u16,
    /// Sample rate of the data.
    sample_rate: u32,
}

impl Sample {
    /// Wraps decoded, interleaved samples.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> Result<Sample, AudioError> {
        if channel_count == 0 {
            return Err(AudioError::ChannelCount(channel_count));
        }
        if sample_rate == 0 {
            return Err(AudioError::Rate(0.0));
        }
        if data.len() < channel_count as usize {
            return Err(AudioError::EmptySample);
        }
        Ok(Sample {
            data: Arc::new(data),
            channel_count,
            sample_rate,
        })
    }

    /// Returns the interleaved sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Returns the playing time at normal speed.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns true if both samples share the same decoded data.
    pub fn same_data(&self, other: &Sample) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Somewhere voices can be played.
pub trait Output: fmt::Display + Send + Sync {
    /// Starts the voice immediately. The output owns it until it finishes.
    fn play(&self, voice: Voice) -> Result<(), AudioError>;

    /// The sample rate the output mixes at.
    fn sample_rate(&self) -> u32;

    #[cfg(test)]
    fn to_mock(&self) -> Option<&mock::Output> {
        None
    }
}

/// Lists output devices known to cpal.
pub fn list_outputs() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the output named by the configuration.
pub fn get_output(config: &config::Audio) -> Result<Arc<dyn Output>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Output::get(device, config.sample_rate())));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
