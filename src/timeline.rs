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
//! The timeline model.
//!
//! A timeline is the global settings plus an ordered list of tracks. Every track has one pad
//! per step, and all tracks always have the same number of steps. Track names are unique and
//! are the only way tracks are identified.

use rand::Rng;
use tracing::debug;

use crate::audio::Sample;
use crate::kits::KitRegistry;
use crate::util;

pub mod codec;
pub mod resolver;
pub mod store;

pub use store::TimelineStore;

pub const DEFAULT_TEMPO: f64 = 240.0;
pub const DEFAULT_MASTER_VOLUME: f32 = 0.5;
pub const DEFAULT_STEPS: usize = 16;
pub const DEFAULT_TRACK_VOLUME: f32 = 0.5;
pub const DEFAULT_VISIBLE_TRACKS: [&str; 2] = ["Kick", "Snare"];

/// Step counts a loop may have.
pub const ALLOWED_STEPS: [usize; 8] = [4, 8, 12, 16, 20, 24, 28, 32];

/// The track melodic recordings are attached to.
pub const MELODIC_TRACK: &str = "Piano";
/// Tempo a newly created melodic track assumes its recording was played at.
pub const DEFAULT_MELODIC_TEMPO: f64 = 240.0;

/// Chance that a pad gets a sound when shuffling.
const SHUFFLE_DENSITY: f64 = 0.25;
/// Shuffle only picks from the built-in kits.
const SHUFFLE_KITS: usize = 3;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TimelineError {
    #[error("A track named {0} already exists")]
    DuplicateTrack(String),

    #[error("No track named {0}")]
    UnknownTrack(String),

    #[error("{0} is not a supported step count")]
    InvalidSteps(usize),

    #[error("Step {step} is outside a {steps} step loop")]
    StepOutOfRange { step: usize, steps: usize },

    #[error("Tempo {0} has no usable beat length")]
    InvalidTempo(f64),
}

/// Global settings shared by every track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// Global tempo in BPM. One step lasts one beat.
    pub tempo: f64,
    /// Applied on top of every track's volume, in [0, 1].
    pub master_volume: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tempo: DEFAULT_TEMPO,
            master_volume: DEFAULT_MASTER_VOLUME,
        }
    }
}

/// One step of one track.
#[derive(Clone, Default)]
pub struct TimelinePad {
    /// 1-based kit index, None when the pad is empty.
    kit: Option<usize>,
    /// Decoded audio for `kit`, kept in step with it by the store.
    sound: Option<Sample>,
    /// True only while the transport is on this column.
    playing: bool,
    /// Set when `kit` changed and `sound` hasn't been looked up again yet.
    stale: bool,
}

impl TimelinePad {
    /// Creates a pad pointing at a kit. The sound is looked up later.
    pub fn with_kit(kit: Option<usize>) -> TimelinePad {
        TimelinePad {
            kit,
            sound: None,
            playing: false,
            stale: kit.is_some(),
        }
    }

    pub fn kit(&self) -> Option<usize> {
        self.kit
    }

    pub fn sound(&self) -> Option<&Sample> {
        self.sound.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_empty(&self) -> bool {
        self.kit.is_none()
    }

    pub(crate) fn set_kit(&mut self, kit: Option<usize>) {
        self.kit = kit;
        self.sound = None;
        self.stale = true;
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    fn resolve(&mut self, track: &str, registry: &KitRegistry, all: bool) {
        if !(self.stale || all) {
            return;
        }
        self.sound = self
            .kit
            .and_then(|kit| registry.resolve(kit, track));
        if self.kit.is_some() && self.sound.is_none() {
            debug!(track, kit = ?self.kit, "Pad refers to a sound that isn't loaded");
        }
        self.stale = false;
    }
}

// Decoded audio is a cache of the kit index, so it doesn't take part in equality.
impl PartialEq for TimelinePad {
    fn eq(&self, other: &Self) -> bool {
        self.kit == other.kit && self.playing == other.playing
    }
}

impl std::fmt::Debug for TimelinePad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelinePad")
            .field("kit", &self.kit)
            .field("resolved", &self.sound.is_some())
            .field("playing", &self.playing)
            .finish()
    }
}

/// Mute and solo state. `ignored` is managed by [`resolver::toggle_solo`] and means some other
/// track is soloed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackState {
    pub solo: bool,
    pub muted: bool,
    pub ignored: bool,
}

/// Per-track mix settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackAudio {
    /// In [0, 1].
    pub volume: f32,
    /// In [-1, 1].
    pub panning: f32,
    /// Tempo the track's melodic recording was played at, if it differs from the global tempo.
    pub bpm: Option<f64>,
}

impl Default for TrackAudio {
    fn default() -> Self {
        TrackAudio {
            volume: DEFAULT_TRACK_VOLUME,
            panning: 0.0,
            bpm: None,
        }
    }
}

/// A single recorded note.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    /// Pitch class, e.g. "C#".
    pub pitch: String,
    pub octave: i32,
    /// Instrument that plays the note.
    pub instrument: String,
    /// Seconds from the start of the recording.
    pub offset: f64,
}

impl Note {
    /// Returns the note name with its octave, e.g. "C#4".
    pub fn name(&self) -> String {
        format!("{}{}", self.pitch, self.octave)
    }
}

/// A free-timed melodic recording. Notes are kept in capture order.
#[derive(Clone, Debug, PartialEq)]
pub struct MelodicRecording {
    pub notes: Vec<Note>,
    /// Seconds; the offset of the last note.
    pub duration: f64,
}

/// One instrument lane.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    name: String,
    pads: Vec<TimelinePad>,
    pub state: TrackState,
    pub audio: TrackAudio,
    pub recording: Option<MelodicRecording>,
}

impl Track {
    /// Creates a track with default mix settings and `steps` empty pads.
    pub fn new(name: &str, steps: usize) -> Track {
        Track {
            name: name.to_string(),
            pads: vec![TimelinePad::default(); steps],
            state: TrackState::default(),
            audio: TrackAudio::default(),
            recording: None,
        }
    }

    pub(crate) fn from_parts(
        name: String,
        pads: Vec<TimelinePad>,
        state: TrackState,
        audio: TrackAudio,
        recording: Option<MelodicRecording>,
    ) -> Track {
        Track {
            name,
            pads,
            state,
            audio,
            recording,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pads(&self) -> &[TimelinePad] {
        &self.pads
    }

    pub(crate) fn pads_mut(&mut self) -> &mut [TimelinePad] {
        &mut self.pads
    }

    /// Sets the volume, clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f32) {
        self.audio.volume = volume.clamp(0.0, 1.0);
    }

    /// Sets the panning, clamped to [-1, 1].
    pub fn set_panning(&mut self, panning: f32) {
        self.audio.panning = panning.clamp(-1.0, 1.0);
    }

    /// Sets the tempo the melodic recording was played at.
    pub fn set_bpm(&mut self, bpm: Option<f64>) -> Result<(), TimelineError> {
        if let Some(bpm) = bpm {
            check_tempo(bpm)?;
        }
        self.audio.bpm = bpm;
        Ok(())
    }

    /// Index of the pad currently marked as playing, if any.
    pub fn playing_step(&self) -> Option<usize> {
        self.pads.iter().position(TimelinePad::is_playing)
    }
}

/// The root aggregate.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    pub settings: Settings,
    steps: usize,
    tracks: Vec<Track>,
}

impl Default for Timeline {
    fn default() -> Self {
        Timeline::new(Settings::default(), DEFAULT_STEPS)
    }
}

impl Timeline {
    /// Creates an empty timeline.
    pub fn new(settings: Settings, steps: usize) -> Timeline {
        Timeline {
            settings,
            steps,
            tracks: Vec::new(),
        }
    }

    /// Creates a timeline with one empty track per name. Repeated names are skipped.
    pub fn template<S: AsRef<str>>(settings: Settings, steps: usize, names: &[S]) -> Timeline {
        let mut timeline = Timeline::new(settings, steps);
        for name in names {
            let _ = timeline.add_track(name.as_ref());
        }
        timeline
    }

    pub(crate) fn from_parts(settings: Settings, steps: usize, tracks: Vec<Track>) -> Timeline {
        Timeline {
            settings,
            steps,
            tracks,
        }
    }

    /// Number of steps in the loop.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.name == name)
    }

    pub fn track_mut(&mut self, name: &str) -> Result<&mut Track, TimelineError> {
        self.tracks
            .iter_mut()
            .find(|track| track.name == name)
            .ok_or_else(|| TimelineError::UnknownTrack(name.to_string()))
    }

    /// Sets the global tempo. Takes effect on the next step.
    pub fn set_tempo(&mut self, tempo: f64) -> Result<(), TimelineError> {
        check_tempo(tempo)?;
        self.settings.tempo = tempo;
        Ok(())
    }

    /// Sets the master volume, clamped to [0, 1].
    pub fn set_master_volume(&mut self, volume: f32) {
        self.settings.master_volume = volume.clamp(0.0, 1.0);
    }

    /// Appends an empty track. Names must be unique.
    pub fn add_track(&mut self, name: &str) -> Result<&mut Track, TimelineError> {
        if self.track(name).is_some() {
            return Err(TimelineError::DuplicateTrack(name.to_string()));
        }
        self.tracks.push(Track::new(name, self.steps));
        let last = self.tracks.len() - 1;
        Ok(&mut self.tracks[last])
    }

    /// Points a pad at a kit, or empties it with None.
    pub fn set_pad(
        &mut self,
        track: &str,
        step: usize,
        kit: Option<usize>,
    ) -> Result<(), TimelineError> {
        let steps = self.steps;
        let pad = self
            .track_mut(track)?
            .pads
            .get_mut(step)
            .ok_or(TimelineError::StepOutOfRange { step, steps })?;
        pad.set_kit(kit);
        Ok(())
    }

    /// Changes the number of steps. Shrinking drops trailing pads; growing appends empty ones.
    pub fn resize(&mut self, steps: usize) -> Result<(), TimelineError> {
        if !ALLOWED_STEPS.contains(&steps) {
            return Err(TimelineError::InvalidSteps(steps));
        }
        for track in &mut self.tracks {
            track.pads.resize_with(steps, TimelinePad::default);
        }
        self.steps = steps;
        Ok(())
    }

    /// Empties every pad.
    pub fn clear(&mut self) {
        for pad in self.tracks.iter_mut().flat_map(|track| track.pads.iter_mut()) {
            pad.set_kit(None);
            pad.playing = false;
        }
    }

    /// Empties every pad, then gives each pad a random built-in kit a quarter of the time.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.clear();
        for pad in self.tracks.iter_mut().flat_map(|track| track.pads.iter_mut()) {
            if rng.gen_bool(SHUFFLE_DENSITY) {
                pad.set_kit(Some(rng.gen_range(1..=SHUFFLE_KITS)));
            }
        }
    }

    /// Marks every pad as not playing.
    pub fn clear_playing(&mut self) {
        for pad in self.tracks.iter_mut().flat_map(|track| track.pads.iter_mut()) {
            pad.playing = false;
        }
    }

    /// Stores a melodic recording on the melodic track, creating the track if needed.
    pub fn attach_recording(&mut self, recording: MelodicRecording) -> &Track {
        let index = match self.tracks.iter().position(|t| t.name == MELODIC_TRACK) {
            Some(index) => index,
            None => {
                let mut track = Track::new(MELODIC_TRACK, self.steps);
                track.audio.bpm = Some(DEFAULT_MELODIC_TEMPO);
                self.tracks.push(track);
                self.tracks.len() - 1
            }
        };
        self.tracks[index].recording = Some(recording);
        &self.tracks[index]
    }

    /// Looks up decoded audio for pads whose kit changed, or for every pad when `all` is set.
    pub(crate) fn resolve_sounds(&mut self, registry: &KitRegistry, all: bool) {
        for track in &mut self.tracks {
            let name = track.name.as_str();
            for pad in track.pads.iter_mut() {
                pad.resolve(name, registry, all);
            }
        }
    }
}

fn check_tempo(tempo: f64) -> Result<(), TimelineError> {
    if util::beat_duration(tempo).is_some() {
        Ok(())
    } else {
        Err(TimelineError::InvalidTempo(tempo))
    }
}

/// Snaps a tempo the way the global tempo control does: 120 to 360 in steps of 20.
pub fn tempo_control(value: f64) -> f64 {
    snap(value, 120.0, 360.0, 20.0)
}

/// Snaps a tempo the way the melodic track's tempo control does: 60 to 480 in steps of 10.
pub fn melodic_tempo_control(value: f64) -> f64 {
    snap(value, 60.0, 480.0, 10.0)
}

fn snap(value: f64, min: f64, max: f64, step: f64) -> f64 {
    let snapped = min + ((value - min) / step).round() * step;
    snapped.clamp(min, max)
}
