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
use std::{error::Error, fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, Level};

use super::{mixer::Mixer, AudioError, Voice};
use crate::config;

/// A cpal output device with a running stream. Voices are sent to the stream's mixer
/// over a channel; the stream lives on its own thread until the device is dropped.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The number of channels the stream was opened with.
    channels: u16,
    /// The stream's sample rate.
    sample_rate: u32,
    /// Sends voices to the audio callback.
    voice_tx: Sender<Voice>,
    /// Dropping this stops the stream thread.
    _shutdown: Sender<()>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={}) ({})",
            self.name,
            self.channels,
            self.sample_rate,
            self.host_id.name()
        )
    }
}

/// Builds an output stream for sample type T, converting the mixer's f32 output.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.fill(&mut scratch);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

impl Device {
    /// Lists the names of cpal output devices across all hosts.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let mut names = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };
            for device in host_devices {
                if let Ok(name) = device.name() {
                    names.push(format!("{} ({})", name, host_id.name()));
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Opens the configured device and starts its stream. "default" picks the default
    /// output of the default host.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device().to_string();
        let (host_id, device) = Device::find(&name)?;
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.config();
        let channels = stream_config.channels;
        let sample_rate = stream_config.sample_rate;

        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<Voice>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        // cpal streams aren't Send everywhere, so the stream is built and held on its own thread.
        thread::spawn(move || {
            let span = span!(Level::INFO, "output stream (cpal)");
            let _enter = span.enter();

            let mixer = Mixer::new(voice_rx, channels, sample_rate);
            let stream = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, mixer),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, mixer),
                cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, mixer),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, mixer),
                other => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format {}", other)));
                    return;
                }
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            info!("CPAL output stream started");
            let _ = ready_tx.send(Ok(()));

            wait_for_shutdown(shutdown_rx);
            info!("CPAL output stream stopped");
        });

        ready_rx.recv()??;
        Ok(Device {
            name,
            host_id,
            channels,
            sample_rate,
            voice_tx,
            _shutdown: shutdown_tx,
        })
    }

    fn find(name: &str) -> Result<(cpal::HostId, cpal::Device), Box<dyn Error>> {
        if name == "default" {
            let host = cpal::default_host();
            return match host.default_output_device() {
                Some(device) => Ok((host.id(), device)),
                None => Err("no default output device".into()),
            };
        }

        for host_id in cpal::available_hosts() {
            let Ok(devices) = cpal::host_from_id(host_id)?.output_devices() else {
                continue;
            };
            for device in devices {
                if device.name().is_ok_and(|n| n.trim() == name) {
                    return Ok((host_id, device));
                }
            }
        }
        Err(format!("no device found with name {}", name).into())
    }
}

/// Blocks until the owning device is dropped.
fn wait_for_shutdown(shutdown: Receiver<()>) {
    let _ = shutdown.recv();
}

impl super::Output for Device {
    fn play(&self, voice: Voice) -> Result<(), AudioError> {
        self.voice_tx
            .send(voice)
            .map_err(|_| AudioError::OutputClosed)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
