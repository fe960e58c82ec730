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
//! The playback voice: source -> gain -> stereo pan, started once and discarded.

use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{AudioError, Output, Sample};

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Plays a sample once at `self_gain * master_gain`, panned by `panning`.
pub fn play(
    output: &dyn Output,
    sample: &Sample,
    panning: f32,
    self_gain: f32,
    master_gain: f32,
) -> Result<(), AudioError> {
    output.play(Voice::new(sample.clone(), self_gain * master_gain, panning))
}

/// A single one-shot voice. Owned by the mixer once it's been played.
pub struct Voice {
    /// Unique ID for this voice.
    id: u64,
    sample: Sample,
    /// Linear gain applied before panning.
    gain: f32,
    /// Pan position in [-1, 1].
    pan: f32,
    /// Playback rate relative to the sample's own speed. Also shifts pitch.
    rate: f64,
    /// Frames advanced per output frame, including any sample rate conversion.
    step: f64,
    /// Fractional read position in frames.
    position: f64,
}

impl Voice {
    /// Creates a voice at normal speed. Gain is floored at 0 and pan clamped to [-1, 1].
    pub fn new(sample: Sample, gain: f32, pan: f32) -> Voice {
        Voice {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst),
            sample,
            gain: gain.max(0.0),
            pan: pan.clamp(-1.0, 1.0),
            rate: 1.0,
            step: 1.0,
            position: 0.0,
        }
    }

    /// Sets the playback rate, e.g. 2.0 plays an octave up in half the time.
    pub fn with_rate(mut self, rate: f64) -> Result<Voice, AudioError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(AudioError::Rate(rate));
        }
        self.rate = rate;
        self.step = rate;
        Ok(self)
    }

    /// Adjusts the read step so the sample plays at the right speed on an output running
    /// at `output_rate`.
    pub fn resample_to(&mut self, output_rate: u32) {
        self.step = self.rate * self.sample.sample_rate() as f64 / output_rate as f64;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns true once every frame has been rendered.
    pub fn is_finished(&self) -> bool {
        self.position >= self.sample.frames() as f64
    }

    /// Renders the next stereo frame, or None when the voice is done.
    pub fn next_frame(&mut self) -> Option<[f32; 2]> {
        if self.is_finished() {
            return None;
        }

        let frame = self.position.floor() as usize;
        let frac = (self.position - frame as f64) as f32;
        let (left, right) = self.read(frame);
        let (left, right) = if frac > 0.0 && frame + 1 < self.sample.frames() {
            let (next_left, next_right) = self.read(frame + 1);
            (
                left + (next_left - left) * frac,
                right + (next_right - right) * frac,
            )
        } else {
            (left, right)
        };
        self.position += self.step;

        let mono = self.sample.channel_count() == 1;
        let [left, right] = pan_frame(left * self.gain, right * self.gain, self.pan, mono);
        Some([left, right])
    }

    /// Reads a frame as (left, right). Mono is duplicated; channels past the second are ignored.
    fn read(&self, frame: usize) -> (f32, f32) {
        let channels = self.sample.channel_count() as usize;
        let data = self.sample.data();
        let left = data[frame * channels];
        let right = if channels > 1 {
            data[frame * channels + 1]
        } else {
            left
        };
        (left, right)
    }
}

/// Equal-power stereo panning. Mono input is spread across both sides; stereo input keeps
/// its image and folds the far side into the near side as the pan moves.
pub(crate) fn pan_frame(left: f32, right: f32, pan: f32, mono: bool) -> [f32; 2] {
    if mono {
        let x = (pan + 1.0) / 2.0;
        return [left * (x * FRAC_PI_2).cos(), left * (x * FRAC_PI_2).sin()];
    }

    if pan <= 0.0 {
        let x = pan + 1.0;
        let (gain_left, gain_right) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
        [left + right * gain_left, right * gain_right]
    } else {
        let (gain_left, gain_right) = ((pan * FRAC_PI_2).cos(), (pan * FRAC_PI_2).sin());
        [left * gain_left, right + left * gain_right]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::mock;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_mono_pan_law() {
        let [l, r] = pan_frame(1.0, 1.0, 0.0, true);
        assert!(close(l, std::f32::consts::FRAC_1_SQRT_2));
        assert!(close(r, std::f32::consts::FRAC_1_SQRT_2));

        let [l, r] = pan_frame(1.0, 1.0, -1.0, true);
        assert!(close(l, 1.0));
        assert!(close(r, 0.0));

        let [l, r] = pan_frame(1.0, 1.0, 1.0, true);
        assert!(close(l, 0.0));
        assert!(close(r, 1.0));
    }

    #[test]
    fn test_stereo_pan_law() {
        let [l, r] = pan_frame(0.25, 0.5, 0.0, false);
        assert!(close(l, 0.25));
        assert!(close(r, 0.5));

        let [l, r] = pan_frame(0.25, 0.5, -1.0, false);
        assert!(close(l, 0.75));
        assert!(close(r, 0.0));

        let [l, r] = pan_frame(0.25, 0.5, 1.0, false);
        assert!(close(l, 0.0));
        assert!(close(r, 0.75));
    }

    #[test]
    fn test_voice_gain_and_length() {
        let sample = Sample::new(vec![1.0, 0.5, 0.25], 1, 44100).unwrap();
        let mut voice = Voice::new(sample, 0.5, -1.0);

        let frames: Vec<[f32; 2]> = std::iter::from_fn(|| voice.next_frame()).collect();
        assert_eq!(3, frames.len());
        assert!(close(frames[0][0], 0.5));
        assert!(close(frames[1][0], 0.25));
        assert!(close(frames[2][0], 0.125));
        assert!(frames.iter().all(|f| close(f[1], 0.0)));
        assert!(voice.is_finished());
    }

    #[test]
    fn test_voice_rate() {
        let sample = Sample::new(vec![0.0, 1.0, 2.0, 3.0], 1, 44100).unwrap();
        let mut voice = Voice::new(sample, 1.0, -1.0).with_rate(2.0).unwrap();
        let frames: Vec<[f32; 2]> = std::iter::from_fn(|| voice.next_frame()).collect();
        assert_eq!(2, frames.len());
        assert!(close(frames[1][0], 2.0));

        let sample = Sample::new(vec![0.0, 1.0], 1, 44100).unwrap();
        assert!(Voice::new(sample.clone(), 1.0, 0.0).with_rate(0.0).is_err());
        assert!(Voice::new(sample, 1.0, 0.0).with_rate(f64::NAN).is_err());
    }

    #[test]
    fn test_voice_resample() {
        let sample = Sample::new(vec![0.0; 22050], 1, 22050).unwrap();
        let mut voice = Voice::new(sample, 1.0, 0.0);
        voice.resample_to(44100);

        let mut count = 0;
        while voice.next_frame().is_some() {
            count += 1;
        }
        assert_eq!(44100, count);
    }

    #[test]
    fn test_play_combines_gains() {
        let output = mock::Output::get("mock", 44100);
        let sample = Sample::new(vec![1.0; 8], 1, 44100).unwrap();

        play(&output, &sample, 0.25, 0.5, 0.5).unwrap();

        let played = output.played();
        assert_eq!(1, played.len());
        assert!(close(played[0].gain, 0.25));
        assert!(close(played[0].pan, 0.25));
        assert!(played[0].sample.same_data(&sample));
    }
}
