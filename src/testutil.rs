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
//! Helpers shared by tests.
use std::{error::Error, fs::File, path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Wait for the given async predicate to return true or fail.
#[inline]
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Writes a 16-bit WAV file. `samples` holds one vector per channel, all the same length.
pub fn write_wav(path: &Path, samples: Vec<Vec<i32>>, sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let num_channels = samples.len();
    assert!(num_channels > 0, "At least one channel is required");
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    for frame in 0..samples[0].len() {
        for channel in &samples {
            writer.write_sample(channel[frame] as i16)?;
        }
    }
    writer.finalize()?;

    Ok(())
}
