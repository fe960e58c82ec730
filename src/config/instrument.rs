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

/// A YAML representation of a sampled melodic instrument. A single recording is
/// pitch-shifted to every note, so `root` must name the pitch it was recorded at.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Instrument {
    /// Identifier stored in recordings, e.g. "acoustic_grand_piano".
    pub id: String,
    /// Path to the audio file, relative to the config file.
    pub path: String,
    /// Root note of the sample, e.g. "C4".
    #[serde(default = "default_root")]
    pub root: String,
}

fn default_root() -> String {
    "C4".to_string()
}
