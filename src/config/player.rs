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
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audio::Audio;
use super::error::ConfigError;
use super::instrument::Instrument;
use super::kit::Kit;
use crate::timeline::{self, ALLOWED_STEPS};
use crate::util;

const DEFAULT_PULSE: &str = "100ms";

/// The configuration for the sequencer.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Player {
    /// The audio output configuration.
    #[serde(default)]
    audio: Audio,
    /// Starting global tempo in BPM.
    #[serde(default = "default_tempo")]
    tempo: f64,
    /// Starting master volume in [0, 1].
    #[serde(default = "default_master_volume")]
    master_volume: f32,
    /// Starting number of steps per loop.
    #[serde(default = "default_steps")]
    steps: usize,
    /// Tracks shown (and therefore audible) when a session starts.
    #[serde(default = "default_visible_tracks")]
    visible_tracks: Vec<String>,
    /// How long a pad pulse lasts, e.g. "100ms".
    pulse: Option<String>,
    /// Built-in kits, numbered from 1 in declaration order.
    #[serde(default)]
    kits: Vec<Kit>,
    /// Sampled instruments available to melodic recordings.
    #[serde(default)]
    instruments: Vec<Instrument>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_tempo() -> f64 {
    timeline::DEFAULT_TEMPO
}

fn default_master_volume() -> f32 {
    timeline::DEFAULT_MASTER_VOLUME
}

fn default_steps() -> usize {
    timeline::DEFAULT_STEPS
}

fn default_visible_tracks() -> Vec<String> {
    timeline::DEFAULT_VISIBLE_TRACKS
        .iter()
        .map(|name| name.to_string())
        .collect()
}

impl Default for Player {
    fn default() -> Self {
        Player {
            audio: Audio::default(),
            tempo: default_tempo(),
            master_volume: default_master_volume(),
            steps: default_steps(),
            visible_tracks: default_visible_tracks(),
            pulse: None,
            kits: Vec::new(),
            instruments: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Player {
    /// Loads and validates the player configuration from the given YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let mut player: Player = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        player.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        player.validate()?;

        info!(
            path = ?path,
            kits = player.kits.len(),
            instruments = player.instruments.len(),
            "Loaded player config"
        );
        Ok(player)
    }

    /// Writes this configuration as YAML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, serde_yml::to_string(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if util::beat_duration(self.tempo).is_none() {
            return Err(ConfigError::Invalid {
                field: "tempo",
                reason: format!("{} is not a usable tempo", self.tempo),
            });
        }
        if !(0.0..=1.0).contains(&self.master_volume) {
            return Err(ConfigError::Invalid {
                field: "master_volume",
                reason: format!("{} is outside 0..1", self.master_volume),
            });
        }
        if !ALLOWED_STEPS.contains(&self.steps) {
            return Err(ConfigError::Invalid {
                field: "steps",
                reason: format!("{} is not one of {:?}", self.steps, ALLOWED_STEPS),
            });
        }
        self.pulse()?;
        Ok(())
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Returns the starting tempo.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Returns the starting master volume.
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Returns the starting step count.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Returns the tracks visible at start.
    pub fn visible_tracks(&self) -> &[String] {
        &self.visible_tracks
    }

    /// Returns how long a pad pulse lasts.
    pub fn pulse(&self) -> Result<Duration, ConfigError> {
        let value = self.pulse.as_deref().unwrap_or(DEFAULT_PULSE);
        DurationString::from_string(value.to_string())
            .map(Into::into)
            .map_err(|e| ConfigError::Duration {
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    /// Returns the kit definitions.
    pub fn kits(&self) -> &[Kit] {
        &self.kits
    }

    /// Returns the instrument definitions.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Resolves a path from this configuration to a file on disk.
    pub fn resolve(&self, path: &str) -> PathBuf {
        super::resolve_path(&self.base_dir, path)
    }
}
