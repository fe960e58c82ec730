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
//! Deciding which tracks are heard.
//!
//! A soloed track always plays, even when muted. Otherwise a track plays unless it is muted
//! or another track is soloed. Only tracks in the visible list are considered at all.

use tracing::debug;

use super::{Timeline, TimelineError, Track, TrackState};

/// True if a track in this state may sound.
pub fn eligible(state: &TrackState) -> bool {
    state.solo || !(state.ignored || state.muted)
}

/// True if the track is both visible and eligible.
pub fn audible<S: AsRef<str>>(track: &Track, visible: &[S]) -> bool {
    visible.iter().any(|name| name.as_ref() == track.name()) && eligible(&track.state)
}

/// Number of soloed tracks.
pub fn solo_count(timeline: &Timeline) -> usize {
    timeline.tracks().iter().filter(|t| t.state.solo).count()
}

/// Toggles solo on the named track. Only one track is soloed at a time, and every track is
/// marked ignored while any solo is active.
pub fn toggle_solo(timeline: &mut Timeline, name: &str) -> Result<(), TimelineError> {
    if timeline.track(name).is_none() {
        return Err(TimelineError::UnknownTrack(name.to_string()));
    }

    for track in timeline.tracks_mut() {
        if track.name() == name {
            track.state.solo = !track.state.solo;
        } else {
            track.state.solo = false;
        }
        track.state.ignored = true;
    }

    if solo_count(timeline) == 0 {
        for track in timeline.tracks_mut() {
            track.state.ignored = false;
        }
    }
    debug!(track = name, solos = solo_count(timeline), "Toggled solo");
    Ok(())
}

/// Toggles mute on the named track.
pub fn toggle_mute(timeline: &mut Timeline, name: &str) -> Result<(), TimelineError> {
    let track = timeline.track_mut(name)?;
    track.state.muted = !track.state.muted;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timeline::Settings;

    fn timeline() -> Timeline {
        Timeline::template(Settings::default(), 16, &["Kick", "Snare", "HiHat"])
    }

    fn state(timeline: &Timeline, name: &str) -> TrackState {
        timeline.track(name).unwrap().state
    }

    #[test]
    fn test_eligible_table() {
        let cases = [
            // solo, muted, ignored, eligible
            (false, false, false, true),
            (false, true, false, false),
            (false, false, true, false),
            (false, true, true, false),
            (true, false, false, true),
            (true, true, false, true),
            (true, false, true, true),
            (true, true, true, true),
        ];
        for (solo, muted, ignored, expected) in cases {
            assert_eq!(
                expected,
                eligible(&TrackState {
                    solo,
                    muted,
                    ignored
                }),
                "solo={solo} muted={muted} ignored={ignored}"
            );
        }
    }

    #[test]
    fn test_solo_moves_between_tracks() {
        let mut timeline = timeline();

        toggle_solo(&mut timeline, "Kick").unwrap();
        toggle_solo(&mut timeline, "Snare").unwrap();
        assert_eq!(1, solo_count(&timeline));
        assert!(state(&timeline, "Snare").solo);
        assert!(!state(&timeline, "Kick").solo);
        for track in timeline.tracks() {
            assert!(track.state.ignored);
        }
        assert!(eligible(&state(&timeline, "Snare")));
        assert!(!eligible(&state(&timeline, "Kick")));

        toggle_solo(&mut timeline, "Snare").unwrap();
        assert_eq!(0, solo_count(&timeline));
        for track in timeline.tracks() {
            assert!(!track.state.ignored);
            assert!(eligible(&track.state));
        }
    }

    #[test]
    fn test_mute_is_independent_of_solo() {
        let mut timeline = timeline();
        toggle_mute(&mut timeline, "Snare").unwrap();
        toggle_solo(&mut timeline, "Snare").unwrap();
        assert!(eligible(&state(&timeline, "Snare")));

        toggle_solo(&mut timeline, "Snare").unwrap();
        assert!(state(&timeline, "Snare").muted);
        assert!(!eligible(&state(&timeline, "Snare")));
        assert!(eligible(&state(&timeline, "Kick")));
    }

    #[test]
    fn test_audible_requires_visibility() {
        let timeline = timeline();
        let kick = timeline.track("Kick").unwrap();
        assert!(audible(kick, &["Kick", "Snare"]));
        assert!(!audible(kick, &["Snare"]));
    }

    #[test]
    fn test_unknown_track() {
        let mut timeline = timeline();
        assert!(toggle_solo(&mut timeline, "Cowbell").is_err());
        assert!(toggle_mute(&mut timeline, "Cowbell").is_err());
        assert_eq!(0, solo_count(&timeline));
        assert!(!state(&timeline, "Kick").ignored);
    }
}
