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
//! The melodic overlay.
//!
//! Once per loop, on the first column, every note of a recording is scheduled as its own
//! deferred trigger. Offsets are stretched by the ratio between the track's own tempo and
//! the global tempo, and notes that would land past the end of the loop are dropped.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::instruments::Instrument;
use crate::playsync::CancelHandle;
use crate::timeline::{MelodicRecording, Track};
use crate::util;

/// Fixed boost applied to melodic notes on top of the track and master volume.
pub const MELODIC_BOOST: f32 = 5.0;

/// A note ready to be scheduled.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedNote {
    /// Delay from the start of the loop.
    pub offset: Duration,
    pub instrument: String,
    /// Note name such as "C#4".
    pub note: String,
    pub gain: f32,
}

/// Works out which notes of a track's recording play this loop, and when.
pub fn plan(track: &Track, tempo: f64, steps: usize, master_volume: f32) -> Vec<PlannedNote> {
    let Some(recording) = &track.recording else {
        return Vec::new();
    };
    plan_recording(
        recording,
        track.audio.bpm,
        tempo,
        steps,
        track.audio.volume * master_volume * MELODIC_BOOST,
    )
}

fn plan_recording(
    recording: &MelodicRecording,
    track_bpm: Option<f64>,
    tempo: f64,
    steps: usize,
    gain: f32,
) -> Vec<PlannedNote> {
    let loop_duration = util::loop_seconds(tempo, steps);
    let speed = track_bpm.unwrap_or(tempo) / tempo;

    recording
        .notes
        .iter()
        .filter_map(|note| {
            let adjusted = note.offset / speed;
            if !(adjusted.is_finite() && adjusted >= 0.0 && adjusted < loop_duration) {
                return None;
            }
            Some(PlannedNote {
                offset: Duration::try_from_secs_f64(adjusted).ok()?,
                instrument: note.instrument.clone(),
                note: note.name(),
                gain,
            })
        })
        .collect()
}

/// Distinct instruments the planned notes need.
pub fn instrument_ids(notes: &[PlannedNote]) -> BTreeSet<String> {
    notes.iter().map(|note| note.instrument.clone()).collect()
}

/// Outstanding note triggers. Scheduling a new pass or stopping cancels everything that
/// hasn't fired yet.
pub struct DeferredTriggers {
    tasks: Vec<JoinHandle<()>>,
    /// Cancelled whenever the table is cleared.
    batch: CancelHandle,
}

impl Default for DeferredTriggers {
    fn default() -> Self {
        DeferredTriggers {
            tasks: Vec::new(),
            batch: CancelHandle::new(),
        }
    }
}

impl DeferredTriggers {
    /// Cancels every trigger that hasn't fired.
    pub fn cancel_all(&mut self) {
        self.batch.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.batch = CancelHandle::new();
    }

    /// Number of triggers still waiting to fire.
    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Schedules notes from now. A trigger plays only if neither the batch nor `run` has been
    /// cancelled when its time comes. Notes whose instrument isn't in `instruments` are skipped.
    pub fn schedule(
        &mut self,
        notes: Vec<PlannedNote>,
        instruments: &HashMap<String, Arc<dyn Instrument>>,
        run: &CancelHandle,
    ) {
        self.tasks.retain(|task| !task.is_finished());

        for planned in notes {
            let Some(instrument) = instruments.get(&planned.instrument).cloned() else {
                debug!(
                    instrument = planned.instrument,
                    note = planned.note,
                    "Skipping note without an instrument"
                );
                continue;
            };

            let batch = self.batch.clone();
            let run = run.clone();
            self.tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = batch.cancelled() => return,
                    _ = run.cancelled() => return,
                    _ = tokio::time::sleep(planned.offset) => {}
                }
                if batch.is_cancelled() || run.is_cancelled() {
                    return;
                }
                debug!(note = planned.note, gain = planned.gain, "Melodic trigger");
                if let Err(e) = instrument.play(&planned.note, planned.gain) {
                    warn!(note = planned.note, err = %e, "Failed to play note");
                }
            }));
        }
    }
}

impl Drop for DeferredTriggers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
