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
//! Decoding kit sounds into memory.
//!
//! Sounds are decoded entirely up front so triggering them never touches the disk. A sound
//! that fails to decode is logged and left silent; its siblings still load.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rayon::prelude::*;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::{Kit, KitError, KitRegistry, Sound};
use crate::audio::{AudioError, Sample};
use crate::config;

/// Decodes an audio file (WAV, MP3, FLAC, etc.) and converts it to the target sample rate.
pub fn decode_file(path: &Path, target_sample_rate: u32) -> Result<Sample, KitError> {
    let failure = |source: AudioError| KitError::DecodeFailure {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|e| failure(e.into()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| failure(e.into()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| KitError::NoAudioTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| failure(e.into()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channel_count = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut sample_rate = params.sample_rate.unwrap_or(target_sample_rate);

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            // One-shots never change stream parameters mid-file, so treat a reset as the end.
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(failure(e.into())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channel_count = spec.channels.count() as u16;
                sample_rate = spec.rate;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, err = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(failure(e.into())),
        }
    }

    let samples = if sample_rate != target_sample_rate && channel_count > 0 {
        debug!(
            source_rate = sample_rate,
            target_rate = target_sample_rate,
            "Transcoding sample"
        );
        transcode_samples(&samples, channel_count, sample_rate, target_sample_rate)
    } else {
        samples
    };

    Sample::new(samples, channel_count, target_sample_rate).map_err(failure)
}

/// Converts interleaved audio between sample rates by linear interpolation. Good enough for
/// drum hits and one-shots.
fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let width = channel_count as usize;
    let frames: Vec<&[f32]> = samples.chunks_exact(width).collect();
    let Some(last) = frames.last() else {
        return Vec::new();
    };
    let step = source_rate as f64 / target_rate as f64;
    let length = (frames.len() as f64 / step).ceil() as usize;

    let mut output = Vec::with_capacity(length * width);
    for index in 0..length {
        let position = index as f64 * step;
        let before = frames.get(position as usize).unwrap_or(last);
        let after = frames.get(position as usize + 1).unwrap_or(before);
        let weight = position.fract() as f32;
        output.extend(
            before
                .iter()
                .zip(after.iter())
                .map(|(a, b)| a + (b - a) * weight),
        );
    }
    output
}

/// Decodes and caches sounds by path. Safe to share across rayon workers.
pub struct SampleLoader {
    /// Decoded samples by file path.
    cache: Mutex<HashMap<PathBuf, Sample>>,
    /// Target sample rate (matches the output).
    target_sample_rate: u32,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new(target_sample_rate: u32) -> SampleLoader {
        SampleLoader {
            cache: Mutex::new(HashMap::new()),
            target_sample_rate,
        }
    }

    /// Loads a sound, returning the cached copy if it was already decoded.
    pub fn load(&self, path: &Path) -> Result<Sample, KitError> {
        if let Some(sample) = self.cache.lock().get(path) {
            debug!(path = ?path, "Using cached sample");
            return Ok(sample.clone());
        }

        let sample = decode_file(path, self.target_sample_rate)?;
        info!(
            path = ?path,
            channels = sample.channel_count(),
            duration_ms = sample.duration().as_millis(),
            memory_kb = sample.memory_size() / 1024,
            "Sample loaded"
        );
        self.cache.lock().insert(path.to_path_buf(), sample.clone());
        Ok(sample)
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.lock().values().map(Sample::memory_size).sum()
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("cached_samples", &self.cache.lock().len())
            .field("target_sample_rate", &self.target_sample_rate)
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

/// Builds the kit registry from configuration, decoding every sound in parallel.
pub fn load_kits(player: &config::Player, loader: &SampleLoader) -> KitRegistry {
    let kits = player
        .kits()
        .iter()
        .map(|kit| {
            let sounds = kit
                .sounds
                .par_iter()
                .map(|definition| {
                    let path = player.resolve(&definition.path);
                    let audio = match loader.load(&path) {
                        Ok(sample) => Some(sample),
                        Err(e) => {
                            warn!(kit = kit.name, sound = definition.name, err = %e, "Failed to load sound");
                            None
                        }
                    };
                    Sound::new(definition, path, audio)
                })
                .collect();
            Kit {
                name: kit.name.clone(),
                sounds,
            }
        })
        .collect();

    let registry = KitRegistry::new(kits);
    info!(
        kits = registry.kits().len() - 1,
        memory_kb = loader.total_memory_usage() / 1024,
        "Kits loaded"
    );
    registry
}
