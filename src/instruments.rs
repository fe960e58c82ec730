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
//! Melodic instruments.
//!
//! The transport only needs to look an instrument up by ID and ask it to play a named note.
//! [`SampledInstrument`] does that by pitch-shifting a single recorded note.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{AudioError, Output, Sample, Voice};
use crate::config;
use crate::kits::{KitError, SampleLoader};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Frequency of C0 in Hz.
const C0: f64 = 16.35;

#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("Unknown instrument {0}")]
    Unknown(String),

    #[error("Unable to load instrument {id}: {source}")]
    Load {
        id: String,
        #[source]
        source: KitError,
    },

    #[error("Instrument {0} failed to load earlier in this session")]
    Unavailable(String),

    #[error("Invalid note name {0}")]
    InvalidNote(String),

    #[error("Playback failed: {0}")]
    Playback(#[from] AudioError),
}

/// Something that can play named notes.
pub trait Instrument: Send + Sync {
    /// Plays a note such as "C#4" at the given linear gain.
    fn play(&self, note: &str, gain: f32) -> Result<(), InstrumentError>;
}

/// Produces instruments by ID.
pub trait InstrumentLoader: Send + Sync {
    fn load(&self, id: &str) -> Result<Arc<dyn Instrument>, InstrumentError>;
}

/// Caches instruments from a loader. An instrument that fails to load isn't tried again.
pub struct InstrumentBank {
    loader: Box<dyn InstrumentLoader>,
    cache: Mutex<HashMap<String, Arc<dyn Instrument>>>,
    failed: Mutex<HashSet<String>>,
}

impl InstrumentBank {
    pub fn new(loader: Box<dyn InstrumentLoader>) -> InstrumentBank {
        InstrumentBank {
            loader,
            cache: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the instrument, loading it on first use. Loading may decode audio, so call
    /// [`InstrumentBank::resolve`] from async code instead.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Instrument>, InstrumentError> {
        if let Some(instrument) = self.cached(id)? {
            return Ok(instrument);
        }
        match self.loader.load(id) {
            Ok(instrument) => {
                info!(instrument = id, "Instrument loaded");
                self.cache.lock().insert(id.to_string(), instrument.clone());
                Ok(instrument)
            }
            Err(e) => {
                self.failed.lock().insert(id.to_string());
                Err(e)
            }
        }
    }

    fn cached(&self, id: &str) -> Result<Option<Arc<dyn Instrument>>, InstrumentError> {
        if self.failed.lock().contains(id) {
            return Err(InstrumentError::Unavailable(id.to_string()));
        }
        Ok(self.cache.lock().get(id).cloned())
    }

    /// Looks up every instrument in `ids`. Instruments not yet loaded are loaded on the
    /// blocking pool. Instruments that can't be loaded are logged and left out.
    pub async fn resolve(
        self: &Arc<Self>,
        ids: BTreeSet<String>,
    ) -> HashMap<String, Arc<dyn Instrument>> {
        let mut resolved = HashMap::new();
        for id in ids {
            let found = match self.cached(&id) {
                Ok(Some(instrument)) => Ok(instrument),
                Ok(None) => {
                    let bank = self.clone();
                    let lookup = id.clone();
                    match tokio::task::spawn_blocking(move || bank.get(&lookup)).await {
                        Ok(found) => found,
                        Err(e) => {
                            warn!(instrument = id, err = %e, "Instrument load task failed");
                            continue;
                        }
                    }
                }
                Err(e) => Err(e),
            };
            match found {
                Ok(instrument) => {
                    resolved.insert(id, instrument);
                }
                Err(InstrumentError::Unavailable(_)) => {
                    debug!(instrument = id, "Instrument failed to load earlier, skipping")
                }
                Err(e) => warn!(instrument = id, err = %e, "Instrument unavailable"),
            }
        }
        resolved
    }
}

impl fmt::Debug for InstrumentBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBank")
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

/// One recorded note played back faster or slower to reach other pitches.
pub struct SampledInstrument {
    sample: Sample,
    /// Frequency the sample was recorded at.
    root: f64,
    output: Arc<dyn Output>,
}

impl SampledInstrument {
    pub fn new(
        sample: Sample,
        root: &str,
        output: Arc<dyn Output>,
    ) -> Result<SampledInstrument, InstrumentError> {
        Ok(SampledInstrument {
            sample,
            root: note_frequency(root)?,
            output,
        })
    }
}

impl Instrument for SampledInstrument {
    fn play(&self, note: &str, gain: f32) -> Result<(), InstrumentError> {
        let rate = note_frequency(note)? / self.root;
        debug!(note, rate, gain, "Playing note");
        let voice = Voice::new(self.sample.clone(), gain, 0.0).with_rate(rate)?;
        self.output.play(voice)?;
        Ok(())
    }
}

/// Loads sampled instruments named in the configuration.
pub struct SampledInstrumentLoader {
    /// Instrument ID to (file, root note).
    definitions: HashMap<String, (PathBuf, String)>,
    samples: Arc<SampleLoader>,
    output: Arc<dyn Output>,
}

impl SampledInstrumentLoader {
    pub fn new(
        player: &config::Player,
        samples: Arc<SampleLoader>,
        output: Arc<dyn Output>,
    ) -> SampledInstrumentLoader {
        let definitions = player
            .instruments()
            .iter()
            .map(|instrument| {
                (
                    instrument.id.clone(),
                    (player.resolve(&instrument.path), instrument.root.clone()),
                )
            })
            .collect();
        SampledInstrumentLoader {
            definitions,
            samples,
            output,
        }
    }
}

impl InstrumentLoader for SampledInstrumentLoader {
    fn load(&self, id: &str) -> Result<Arc<dyn Instrument>, InstrumentError> {
        let (path, root) = self
            .definitions
            .get(id)
            .ok_or_else(|| InstrumentError::Unknown(id.to_string()))?;
        let sample = self.samples.load(path).map_err(|source| {
            warn!(instrument = id, err = %source, "Failed to load instrument");
            InstrumentError::Load {
                id: id.to_string(),
                source,
            }
        })?;
        Ok(Arc::new(SampledInstrument::new(
            sample,
            root,
            self.output.clone(),
        )?))
    }
}

/// Parses a note name such as "A4", "C#3" or "Bb-1" into its MIDI note number.
fn midi_note(name: &str) -> Result<i32, InstrumentError> {
    let invalid = || InstrumentError::InvalidNote(name.to_string());
    let mut chars = name.chars();
    let letter = chars.next().ok_or_else(invalid)?;
    let base = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(invalid()),
    };
    let rest = chars.as_str();
    let (accidental, octave) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') => (-1, &rest[1..]),
        _ => (0, rest),
    };
    let octave: i32 = octave.parse().map_err(|_| invalid())?;
    Ok((octave + 1) * 12 + base + accidental)
}

/// Returns the equal-tempered frequency of a note name, with A4 at 440 Hz.
pub fn note_frequency(name: &str) -> Result<f64, InstrumentError> {
    let midi = midi_note(name)?;
    Ok(440.0 * 2f64.powf((midi - 69) as f64 / 12.0))
}

/// Returns the nearest note name for a frequency, e.g. 440.0 -> "A4".
pub fn frequency_to_note(frequency: f64) -> Option<String> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    let half_steps = (12.0 * (frequency / C0).log2()).round() as i64;
    let octave = half_steps.div_euclid(12);
    let name = NOTE_NAMES[half_steps.rem_euclid(12) as usize];
    Some(format!("{}{}", name, octave))
}

/// Playback rate that turns a recording of `from` into `to`.
pub fn pitch_ratio(from: &str, to: &str) -> Result<f64, InstrumentError> {
    Ok(note_frequency(to)? / note_frequency(from)?)
}
