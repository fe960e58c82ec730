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
use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use beatgrid::audio;
use beatgrid::config::Player;
use beatgrid::instruments::{InstrumentBank, SampledInstrumentLoader};
use beatgrid::kits::{self, SampleLoader};
use beatgrid::timeline::{codec, Settings, Timeline, TimelineStore};
use beatgrid::transport::{Transport, TransportEvent};
use beatgrid::util::{duration_display, filename_display, loop_seconds};
use clap::{crate_version, Parser, Subcommand};
use parking_lot::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A step sequencer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays a .beat file until interrupted.
    Play {
        /// The .beat file to play.
        file: PathBuf,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Stop after this many loops.
        #[arg(short, long)]
        loops: Option<u64>,
    },
    /// Parses and validates a .beat file.
    Verify {
        /// The .beat file to check.
        file: PathBuf,
    },
    /// Lists the configured kits and whether their sounds decode.
    Kits {
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Writes an empty timeline.
    Template {
        /// Where to write the .beat file.
        file: PathBuf,
        /// The path to the player config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The number of steps per loop.
        #[arg(short, long)]
        steps: Option<usize>,
    },
    /// Writes a default player config.
    Init {
        /// Where to write the YAML file.
        path: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices {},
}

fn load_player(config: Option<&Path>) -> Result<Player, Box<dyn Error>> {
    Ok(match config {
        Some(path) => Player::deserialize(path)?,
        None => Player::default(),
    })
}

async fn play(file: &Path, config: Option<&Path>, loops: Option<u64>) -> Result<(), Box<dyn Error>> {
    let player = load_player(config)?;
    let timeline = codec::load(file)?;

    let output = audio::get_output(player.audio())?;
    let samples = Arc::new(SampleLoader::new(output.sample_rate()));
    let registry = kits::load_kits(&player, &samples);
    let instruments = Arc::new(InstrumentBank::new(Box::new(SampledInstrumentLoader::new(
        &player,
        samples.clone(),
        output.clone(),
    ))));

    // Load instruments before the first loop so its notes aren't delayed by decoding.
    let ids: BTreeSet<&str> = timeline
        .tracks()
        .iter()
        .filter_map(|track| track.recording.as_ref())
        .flat_map(|recording| recording.notes.iter().map(|note| note.instrument.as_str()))
        .collect();
    for id in ids {
        if let Err(e) = instruments.get(id) {
            warn!(instrument = id, err = %e, "Instrument unavailable");
        }
    }
    debug!(samples = ?samples, "Samples loaded");

    let visible = timeline
        .tracks()
        .iter()
        .map(|track| track.name().to_string())
        .collect();
    let store = Arc::new(TimelineStore::new(
        Timeline::default(),
        Arc::new(RwLock::new(registry)),
        visible,
    ));
    let transport = Transport::new(store, output, instruments, player.pulse()?);
    transport.import(timeline);

    let mut events = transport.subscribe();
    info!(file = filename_display(file), "Playing");
    transport.start_with_limit(loops);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TransportEvent::Stopped) | Err(RecvError::Closed) => break,
                Ok(TransportEvent::Pulse { key, .. }) => debug!(key, "Pulse"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped transport events"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                transport.stop();
                break;
            }
        }
    }

    Ok(())
}

fn verify(file: &Path) -> Result<(), Box<dyn Error>> {
    let timeline = codec::load(file)?;
    let settings = timeline.settings;
    let length = Duration::try_from_secs_f64(loop_seconds(settings.tempo, timeline.steps()))
        .unwrap_or(Duration::MAX);

    println!(
        "{}: {} BPM, {} steps ({}), master volume {}",
        filename_display(file),
        settings.tempo,
        timeline.steps(),
        duration_display(length),
        settings.master_volume,
    );
    println!("Tracks (count: {}):", timeline.tracks().len());
    for track in timeline.tracks() {
        let filled = track.pads().iter().filter(|pad| !pad.is_empty()).count();
        let mut flags = Vec::new();
        if track.state.solo {
            flags.push("solo");
        }
        if track.state.muted {
            flags.push("muted");
        }
        if track.state.ignored {
            flags.push("ignored");
        }
        print!("- {} ({} pads set", track.name(), filled);
        if let Some(recording) = &track.recording {
            print!(", {} recorded notes", recording.notes.len());
        }
        if flags.is_empty() {
            println!(")");
        } else {
            println!(") [{}]", flags.join(", "));
        }
    }
    Ok(())
}

fn list_kits(config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let player = load_player(config)?;
    let samples = SampleLoader::new(player.audio().sample_rate());
    let registry = kits::load_kits(&player, &samples);

    let builtin = &registry.kits()[..registry.kits().len() - 1];
    if builtin.is_empty() {
        println!("No kits configured.");
        return Ok(());
    }

    println!("Kits (count: {}):", builtin.len());
    for (index, kit) in builtin.iter().enumerate() {
        println!("{}. {}", index + 1, kit.name);
        for sound in &kit.sounds {
            let status = match sound.audio() {
                Some(sample) => duration_display(sample.duration()),
                None => "failed to decode".to_string(),
            };
            println!(
                "   - {} [{}] {} ({})",
                sound.kind,
                sound.id,
                filename_display(&sound.path),
                status
            );
        }
    }
    println!("Decoded {} KiB of audio.", samples.total_memory_usage() / 1024);
    Ok(())
}

fn template(file: &Path, config: Option<&Path>, steps: Option<usize>) -> Result<(), Box<dyn Error>> {
    let player = load_player(config)?;
    let mut timeline = Timeline::template(
        Settings {
            tempo: player.tempo(),
            master_volume: player.master_volume(),
        },
        player.steps(),
        player.visible_tracks(),
    );
    if let Some(steps) = steps {
        timeline.resize(steps)?;
    }
    codec::save(&timeline, file)?;
    println!("Wrote {}.", file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            config,
            loops,
        } => play(&file, config.as_deref(), loops).await?,
        Commands::Verify { file } => verify(&file)?,
        Commands::Kits { config } => list_kits(config.as_deref())?,
        Commands::Template {
            file,
            config,
            steps,
        } => template(&file, config.as_deref(), steps)?,
        Commands::Init { path } => {
            Player::default().save(&path)?;
            println!("Wrote {}.", path.display());
        }
        Commands::Devices {} => {
            let devices = audio::list_outputs()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
    }

    Ok(())
}
