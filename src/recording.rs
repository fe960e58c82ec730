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
//! Capturing melodic input.
//!
//! A recorder timestamps notes relative to the moment recording began. Finishing produces a
//! recording whose duration is the offset of its last note; a take with no notes produces
//! nothing.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::timeline::{MelodicRecording, Note};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordingError {
    #[error("Not recording")]
    NotRecording,

    #[error("Already recording")]
    AlreadyRecording,
}

/// Collects timestamped notes between `start` and `finish`.
#[derive(Debug, Default)]
pub struct Recorder {
    /// When the current take started, if one is in progress.
    started: Option<Instant>,
    /// Instrument used for notes in this take.
    instrument: String,
    notes: Vec<Note>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    pub fn is_recording(&self) -> bool {
        self.started.is_some()
    }

    /// Starts a new take played on the given instrument.
    pub fn start(&mut self, instrument: &str) -> Result<(), RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        info!(instrument, "Recording started");
        self.started = Some(Instant::now());
        self.instrument = instrument.to_string();
        self.notes.clear();
        Ok(())
    }

    /// Records a note played now.
    pub fn note(&mut self, pitch: &str, octave: i32) -> Result<(), RecordingError> {
        let started = self.started.ok_or(RecordingError::NotRecording)?;
        self.note_at(pitch, octave, started.elapsed())
    }

    /// Records a note at a known offset from the start of the take.
    pub fn note_at(
        &mut self,
        pitch: &str,
        octave: i32,
        offset: Duration,
    ) -> Result<(), RecordingError> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }
        debug!(pitch, octave, offset = ?offset, "Recorded note");
        self.notes.push(Note {
            pitch: pitch.to_string(),
            octave,
            instrument: self.instrument.clone(),
            offset: offset.as_secs_f64(),
        });
        Ok(())
    }

    /// Ends the take. Returns None if nothing was played.
    pub fn finish(&mut self) -> Result<Option<MelodicRecording>, RecordingError> {
        if self.started.take().is_none() {
            return Err(RecordingError::NotRecording);
        }
        let notes = std::mem::take(&mut self.notes);
        if notes.is_empty() {
            info!("Recording finished without notes");
            return Ok(None);
        }
        let duration = notes.iter().map(|note| note.offset).fold(0.0, f64::max);
        info!(notes = notes.len(), duration, "Recording finished");
        Ok(Some(MelodicRecording { notes, duration }))
    }
}
