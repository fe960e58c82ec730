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
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{MelodicRecording, Timeline, TimelineError, MELODIC_TRACK};
use crate::audio::Sample;
use crate::kits::KitRegistry;

/// Owns the live timeline. Every change goes through [`TimelineStore::update`], which holds
/// the write lock for the whole change and then refreshes the decoded sound of any pad whose
/// kit moved.
pub struct TimelineStore {
    timeline: RwLock<Timeline>,
    registry: Arc<RwLock<KitRegistry>>,
    /// Names of tracks currently shown. Hidden tracks never sound.
    visible: RwLock<Vec<String>>,
}

impl TimelineStore {
    /// Creates a store and resolves every pad against the registry.
    pub fn new(
        mut timeline: Timeline,
        registry: Arc<RwLock<KitRegistry>>,
        visible: Vec<String>,
    ) -> TimelineStore {
        timeline.resolve_sounds(&registry.read(), true);
        TimelineStore {
            timeline: RwLock::new(timeline),
            registry,
            visible: RwLock::new(visible),
        }
    }

    /// Applies a change to the timeline as one exclusive transaction.
    pub fn update<R>(&self, change: impl FnOnce(&mut Timeline) -> R) -> R {
        let mut timeline = self.timeline.write();
        let result = change(&mut timeline);
        timeline.resolve_sounds(&self.registry.read(), false);
        result
    }

    /// Reads the timeline under a shared lock.
    pub fn read<R>(&self, view: impl FnOnce(&Timeline) -> R) -> R {
        view(&self.timeline.read())
    }

    /// Returns a copy of the current timeline.
    pub fn snapshot(&self) -> Timeline {
        self.timeline.read().clone()
    }

    /// Replaces the whole timeline, e.g. after an import.
    pub fn replace(&self, mut timeline: Timeline) {
        timeline.resolve_sounds(&self.registry.read(), true);
        *self.timeline.write() = timeline;
    }

    /// Returns the kit registry.
    pub fn registry(&self) -> Arc<RwLock<KitRegistry>> {
        self.registry.clone()
    }

    /// Adds a custom instrument and an empty track to play it on.
    pub fn add_custom_instrument(&self, name: &str, audio: Sample) -> Result<(), TimelineError> {
        let mut timeline = self.timeline.write();
        if timeline.track(name).is_some() {
            return Err(TimelineError::DuplicateTrack(name.to_string()));
        }
        let mut registry = self.registry.write();
        registry.add_custom_sound(name, audio);
        timeline.add_track(name)?;
        timeline.resolve_sounds(&registry, true);
        info!(name, "Added custom instrument track");
        Ok(())
    }

    /// Stores a finished melodic recording and shows the melodic track.
    pub fn attach_recording(&self, recording: MelodicRecording) {
        self.update(|timeline| {
            timeline.attach_recording(recording);
        });
        self.show_track(MELODIC_TRACK);
    }

    /// Returns the visible track names.
    pub fn visible_tracks(&self) -> Vec<String> {
        self.visible.read().clone()
    }

    /// Returns true if the named track is visible.
    pub fn is_visible(&self, name: &str) -> bool {
        self.visible.read().iter().any(|visible| visible == name)
    }

    /// Shows a track. Showing a visible track does nothing.
    pub fn show_track(&self, name: &str) {
        let mut visible = self.visible.write();
        if !visible.iter().any(|visible| visible == name) {
            visible.push(name.to_string());
        }
    }

    /// Hides a track. Callers must stop the transport first.
    pub(crate) fn hide_track(&self, name: &str) {
        self.visible.write().retain(|visible| visible != name);
    }
}
