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
use serde::{Deserialize, Serialize};

/// A YAML representation of a kit: an ordered list of sounds loaded together.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Kit {
    /// Display name of the kit.
    pub name: String,
    /// Sounds in the kit, in pad order.
    pub sounds: Vec<Sound>,
}

/// A single sound within a kit.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Sound {
    pub id: u32,
    /// The instrument category. Tracks with this name play this sound.
    #[serde(rename = "type")]
    pub kind: String,
    /// Path to the audio file, relative to the config file.
    pub path: String,
    pub color: String,
    pub name: String,
}
