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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{AudioError, Sample, Voice};

/// A voice that reached the mock output.
#[derive(Clone, Debug)]
pub struct Played {
    pub voice_id: u64,
    pub sample: Sample,
    pub gain: f32,
    pub pan: f32,
    pub rate: f64,
    /// When the voice was started.
    pub at: Instant,
}

/// A mock output. Doesn't make any sound; it records every voice it was asked to play.
#[derive(Clone)]
pub struct Output {
    name: String,
    sample_rate: u32,
    played: Arc<Mutex<Vec<Played>>>,
    failing: Arc<AtomicBool>,
}

impl Output {
    /// Gets the given mock output.
    pub fn get(name: &str, sample_rate: u32) -> Output {
        Output {
            name: name.to_string(),
            sample_rate,
            played: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns every voice played so far, in order.
    pub fn played(&self) -> Vec<Played> {
        self.played.lock().clone()
    }

    /// Forgets every recorded voice.
    pub fn reset(&self) {
        self.played.lock().clear();
    }

    /// Makes subsequent plays fail as if the output had gone away.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl super::Output for Output {
    fn play(&self, voice: Voice) -> Result<(), AudioError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(AudioError::OutputClosed);
        }
        debug!(
            device = self.name,
            voice = voice.id(),
            gain = voice.gain(),
            pan = voice.pan(),
            "Playing voice"
        );
        self.played.lock().push(Played {
            voice_id: voice.id(),
            sample: voice.sample().clone(),
            gain: voice.gain(),
            pan: voice.pan(),
            rate: voice.rate(),
            at: Instant::now(),
        });
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[cfg(test)]
    fn to_mock(&self) -> Option<&Output> {
        Some(self)
    }
}
