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

use std::path::Path;
use std::time::Duration;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Length of one beat at `tempo`. None when the tempo isn't a positive number or the beat
/// doesn't fit in a `Duration`.
pub fn beat_duration(tempo: f64) -> Option<Duration> {
    if !(tempo.is_finite() && tempo > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(60.0 / tempo)
        .ok()
        .filter(|beat| !beat.is_zero())
}

/// Length of one pass over the timeline in seconds.
pub fn loop_seconds(tempo: f64, steps: usize) -> f64 {
    60.0 / tempo * steps as f64
}

/// Outputs the given duration in a minutes:seconds.millis format.
pub fn duration_display(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() % 60;
    format!("{}:{:02}.{:03}", minutes, secs, duration.subsec_millis())
}
