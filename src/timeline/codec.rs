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
//! The `.beat` save format.
//!
//! A `.beat` file is a JSON document holding the settings and every track. Pads store only
//! their kit index; decoded audio is looked up again against the kits loaded at import time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    MelodicRecording, Note, Settings, Timeline, TimelinePad, Track, TrackAudio, TrackState,
    ALLOWED_STEPS, DEFAULT_STEPS,
};
use crate::util;

/// File extension of saved timelines.
pub const EXTENSION: &str = "beat";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed save file: {0}")]
    Malformed(String),

    #[error("Malformed save file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} is not a .beat file")]
    WrongExtension(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True if the document itself was unreadable or invalid.
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Malformed(_) | CodecError::Parse(_))
    }
}

#[derive(Serialize, Deserialize)]
struct BeatFile {
    settings: SettingsDoc,
    tracks: Vec<TrackDoc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsDoc {
    #[serde(rename = "BPM")]
    bpm: f64,
    master_volume: f32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackDoc {
    name: String,
    pads: Vec<PadDoc>,
    state: StateDoc,
    audio: AudioDoc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    piano_recording: Option<RecordingDoc>,
}

#[derive(Serialize, Deserialize)]
struct PadDoc {
    kit: Option<usize>,
    /// Always written as null. Whatever a file holds here is ignored.
    #[serde(default)]
    sound: serde_json::Value,
    #[serde(default)]
    playing: bool,
}

#[derive(Serialize, Deserialize)]
struct StateDoc {
    solo: bool,
    muted: bool,
    ignored: bool,
}

#[derive(Serialize, Deserialize)]
struct AudioDoc {
    volume: f32,
    panning: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bpm: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct RecordingDoc {
    notes: Vec<NoteDoc>,
    duration: f64,
}

#[derive(Serialize, Deserialize)]
struct NoteDoc {
    note: String,
    octave: i32,
    instrument: String,
    time: f64,
}

/// Serializes the timeline. Transient playback state is never written.
pub fn export(timeline: &Timeline) -> Result<String, CodecError> {
    let doc = BeatFile {
        settings: SettingsDoc {
            bpm: timeline.settings.tempo,
            master_volume: timeline.settings.master_volume,
        },
        tracks: timeline.tracks().iter().map(track_doc).collect(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn track_doc(track: &Track) -> TrackDoc {
    TrackDoc {
        name: track.name().to_string(),
        pads: track
            .pads()
            .iter()
            .map(|pad| PadDoc {
                kit: pad.kit(),
                sound: serde_json::Value::Null,
                playing: false,
            })
            .collect(),
        state: StateDoc {
            solo: track.state.solo,
            muted: track.state.muted,
            ignored: track.state.ignored,
        },
        audio: AudioDoc {
            volume: track.audio.volume,
            panning: track.audio.panning,
            bpm: track.audio.bpm,
        },
        piano_recording: track.recording.as_ref().map(|recording| RecordingDoc {
            notes: recording
                .notes
                .iter()
                .map(|note| NoteDoc {
                    note: note.pitch.clone(),
                    octave: note.octave,
                    instrument: note.instrument.clone(),
                    time: note.offset,
                })
                .collect(),
            duration: recording.duration,
        }),
    }
}

/// Parses and validates a document. Pads come back unresolved; the caller looks their
/// sounds up against the current kits.
pub fn import(text: &str) -> Result<Timeline, CodecError> {
    let doc: BeatFile = serde_json::from_str(text)?;
    validate(&doc)?;

    let steps = doc
        .tracks
        .first()
        .map(|track| track.pads.len())
        .unwrap_or(DEFAULT_STEPS);
    let tracks = doc.tracks.into_iter().map(track_from_doc).collect();
    Ok(Timeline::from_parts(
        Settings {
            tempo: doc.settings.bpm,
            master_volume: doc.settings.master_volume,
        },
        steps,
        tracks,
    ))
}

fn track_from_doc(doc: TrackDoc) -> Track {
    Track::from_parts(
        doc.name,
        doc.pads
            .into_iter()
            .map(|pad| TimelinePad::with_kit(pad.kit))
            .collect(),
        TrackState {
            solo: doc.state.solo,
            muted: doc.state.muted,
            ignored: doc.state.ignored,
        },
        TrackAudio {
            volume: doc.audio.volume,
            panning: doc.audio.panning,
            bpm: doc.audio.bpm,
        },
        doc.piano_recording.map(|recording| MelodicRecording {
            notes: recording
                .notes
                .into_iter()
                .map(|note| Note {
                    pitch: note.note,
                    octave: note.octave,
                    instrument: note.instrument,
                    offset: note.time,
                })
                .collect(),
            duration: recording.duration,
        }),
    )
}

fn validate(doc: &BeatFile) -> Result<(), CodecError> {
    let malformed = |reason: String| Err(CodecError::Malformed(reason));

    if util::beat_duration(doc.settings.bpm).is_none() {
        return malformed(format!("BPM {} is not a usable tempo", doc.settings.bpm));
    }
    if !(0.0..=1.0).contains(&doc.settings.master_volume) {
        return malformed(format!(
            "master volume {} is outside 0..1",
            doc.settings.master_volume
        ));
    }

    let mut names = HashSet::new();
    let steps = doc.tracks.first().map(|track| track.pads.len());
    for track in &doc.tracks {
        if !names.insert(track.name.as_str()) {
            return malformed(format!("track {} appears more than once", track.name));
        }
        if Some(track.pads.len()) != steps {
            return malformed(format!(
                "track {} has {} pads, expected {}",
                track.name,
                track.pads.len(),
                steps.unwrap_or_default()
            ));
        }
        if !(0.0..=1.0).contains(&track.audio.volume) {
            return malformed(format!("track {} volume is outside 0..1", track.name));
        }
        if !(-1.0..=1.0).contains(&track.audio.panning) {
            return malformed(format!("track {} panning is outside -1..1", track.name));
        }
        if track.audio.bpm.is_some_and(|bpm| util::beat_duration(bpm).is_none()) {
            return malformed(format!("track {} BPM is not a usable tempo", track.name));
        }
        if let Some(recording) = &track.piano_recording {
            let bad_time = |t: f64| !(t.is_finite() && t >= 0.0);
            if bad_time(recording.duration) || recording.notes.iter().any(|n| bad_time(n.time)) {
                return malformed(format!("track {} has a note with a bad time", track.name));
            }
        }
    }
    if let Some(steps) = steps {
        if !ALLOWED_STEPS.contains(&steps) {
            return malformed(format!("{} is not a supported step count", steps));
        }
    }
    Ok(())
}

/// Writes the timeline to a `.beat` file.
pub fn save(timeline: &Timeline, path: &Path) -> Result<(), CodecError> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
        return Err(CodecError::WrongExtension(path.to_path_buf()));
    }
    fs::write(path, export(timeline)?)?;
    info!(path = ?path, tracks = timeline.tracks().len(), "Saved timeline");
    Ok(())
}

/// Reads a timeline from a file.
pub fn load(path: &Path) -> Result<Timeline, CodecError> {
    let timeline = import(&fs::read_to_string(path)?)?;
    info!(path = ?path, tracks = timeline.tracks().len(), "Loaded timeline");
    Ok(timeline)
}
