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
// Core mixing logic shared by the cpal stream and tests.
use crossbeam_channel::Receiver;
use tracing::debug;

use super::Voice;

/// Sums live voices into interleaved output blocks. Lives on the audio thread; new voices
/// arrive over a channel so the callback never takes a lock.
pub struct Mixer {
    /// Voices currently sounding.
    voices: Vec<Voice>,
    /// Incoming voices.
    incoming: Receiver<Voice>,
    /// Number of output channels.
    num_channels: u16,
    /// Output sample rate.
    sample_rate: u32,
}

impl Mixer {
    /// Creates a new mixer fed by the given channel.
    pub fn new(incoming: Receiver<Voice>, num_channels: u16, sample_rate: u32) -> Mixer {
        Mixer {
            voices: Vec::new(),
            incoming,
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    /// Number of voices still sounding.
    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Fills an interleaved output buffer, dropping voices as they finish.
    pub fn fill(&mut self, output: &mut [f32]) {
        while let Ok(mut voice) = self.incoming.try_recv() {
            voice.resample_to(self.sample_rate);
            self.voices.push(voice);
        }

        output.fill(0.0);
        let channels = self.num_channels as usize;
        for frame in output.chunks_mut(channels) {
            self.voices.retain_mut(|voice| match voice.next_frame() {
                Some([left, right]) => {
                    if channels == 1 {
                        frame[0] += (left + right) * 0.5;
                    } else {
                        frame[0] += left;
                        frame[1] += right;
                    }
                    true
                }
                None => {
                    debug!(voice = voice.id(), "Voice finished");
                    false
                }
            });
        }
    }
}
