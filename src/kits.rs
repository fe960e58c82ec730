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
//! The sound source registry.
//!
//! Kits are ordered lists of sounds. Built-in kits come from configuration and are numbered
//! from 1; the custom kit follows them and grows as instruments are added during a session.
//! Pads refer to sounds by kit index and track name, and the registry turns that pair back
//! into decoded audio.

use std::fmt;
use std::path::PathBuf;

use rand::Rng;
use tracing::info;

use crate::audio::{AudioError, Sample};
use crate::config;

mod loader;

pub use loader::{decode_file, load_kits, SampleLoader};

/// Sound IDs of custom instruments start after the last built-in sound.
const CUSTOM_ID_OFFSET: u32 = 31;

/// Errors produced while loading sounds.
#[derive(Debug, thiserror::Error)]
pub enum KitError {
    #[error("Unable to decode {path}: {source}")]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: AudioError,
    },

    #[error("No audio track found in {0}")]
    NoAudioTrack(PathBuf),
}

/// A single sound. Everything but the decoded audio is fixed once loaded.
#[derive(Clone)]
pub struct Sound {
    pub id: u32,
    /// The instrument category; tracks with this name play this sound.
    pub kind: String,
    /// Where the audio came from.
    pub path: PathBuf,
    pub color: String,
    pub name: String,
    /// Decoded audio. None if decoding failed.
    audio: Option<Sample>,
}

impl Sound {
    /// Creates a sound from its definition and (possibly missing) audio.
    pub fn new(definition: &config::Sound, path: PathBuf, audio: Option<Sample>) -> Sound {
        Sound {
            id: definition.id,
            kind: definition.kind.clone(),
            path,
            color: definition.color.clone(),
            name: definition.name.clone(),
            audio,
        }
    }

    /// Returns the decoded audio, if there is any.
    pub fn audio(&self) -> Option<&Sample> {
        self.audio.as_ref()
    }
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("decoded", &self.audio.is_some())
            .finish()
    }
}

/// An ordered set of sounds loaded together.
#[derive(Clone, Debug)]
pub struct Kit {
    pub name: String,
    pub sounds: Vec<Sound>,
}

impl Kit {
    /// Returns the sound for the given track, if this kit has one.
    pub fn sound_for(&self, track: &str) -> Option<&Sound> {
        self.sounds.iter().find(|sound| sound.kind == track)
    }
}

/// All kits known to the session. The last kit is always the custom kit.
#[derive(Clone, Debug)]
pub struct KitRegistry {
    kits: Vec<Kit>,
}

impl Default for KitRegistry {
    fn default() -> Self {
        KitRegistry::new(Vec::new())
    }
}

impl KitRegistry {
    /// Creates a registry from built-in kits, adding an empty custom kit after them.
    pub fn new(mut kits: Vec<Kit>) -> KitRegistry {
        kits.push(Kit {
            name: "Custom".to_string(),
            sounds: Vec::new(),
        });
        KitRegistry { kits }
    }

    /// Returns every kit, the custom kit last.
    pub fn kits(&self) -> &[Kit] {
        &self.kits
    }

    /// Returns the kits that can play the given track, in kit order. Pad kit indices
    /// count from 1 within this list.
    pub fn sounds_for(&self, track: &str) -> Vec<&Sound> {
        self.kits
            .iter()
            .filter_map(|kit| kit.sound_for(track))
            .collect()
    }

    /// Looks up the decoded audio a pad on `track` set to `kit_index` should play.
    /// Unknown indices and undecoded sounds resolve to None.
    pub fn resolve(&self, kit_index: usize, track: &str) -> Option<Sample> {
        if kit_index == 0 {
            return None;
        }
        self.sounds_for(track)
            .get(kit_index - 1)
            .and_then(|sound| sound.audio().cloned())
    }

    /// Adds a custom instrument to the custom kit and returns it.
    pub fn add_custom_sound(&mut self, name: &str, audio: Sample) -> &Sound {
        let color = format!("#{:06x}", rand::thread_rng().gen_range(0..0x100_0000));
        // The custom kit is always present; see new().
        let custom = self.kits.len() - 1;
        let sounds = &mut self.kits[custom].sounds;
        let id = sounds.len() as u32 + CUSTOM_ID_OFFSET;
        info!(name, id, color = %color, "Adding custom instrument");
        sounds.push(Sound {
            id,
            kind: name.to_string(),
            path: PathBuf::from(name),
            color,
            name: name.to_string(),
            audio: Some(audio),
        });
        &sounds[sounds.len() - 1]
    }

    /// Returns the distinct track names the kits provide sounds for, in first-seen order.
    pub fn track_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for sound in self.kits.iter().flat_map(|kit| kit.sounds.iter()) {
            if !names.contains(&sound.kind) {
                names.push(sound.kind.clone());
            }
        }
        names
    }
}
