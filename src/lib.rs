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
//! A step sequencer. A timeline of tracks and pads is played against kits of decoded
//! samples, with an optional free-timed melodic recording layered over the grid.
pub mod audio;
pub mod config;
pub mod instruments;
pub mod kits;
pub mod playsync;
pub mod recording;
pub mod timeline;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testutil;
