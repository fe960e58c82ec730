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
//! Configuration for the sequencer. A single YAML file describes the output device, the
//! kits and melodic instruments to load, and the session defaults.
use std::path::{Path, PathBuf};

mod audio;
mod error;
mod instrument;
mod kit;
mod player;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::instrument::Instrument;
pub use self::kit::{Kit, Sound};
pub use self::player::Player;

/// Resolves a path from the configuration against the directory holding the config file.
pub(crate) fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use super::resolve_path;

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/srv/beats");
        assert_eq!(
            PathBuf::from("/srv/beats/kits/kick.wav"),
            resolve_path(base, "kits/kick.wav")
        );
        assert_eq!(
            PathBuf::from("/tmp/kick.wav"),
            resolve_path(base, "/tmp/kick.wav")
        );
    }
}
