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
//! The transport drives playback.
//!
//! While running, a single task walks the columns of the timeline. Each step is one
//! transaction on the store: it moves the playing marker, collects the pads that should
//! sound and, on the first column, plans the melodic overlay. Voices are started after the
//! transaction, and the task then sleeps for one beat at the current tempo.
//!
//! Starting voices and scheduling the overlay happen under the deferred trigger lock, and
//! stopping cancels the run under that same lock. Once `stop` returns, a run never makes
//! another sound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, span, warn, Instrument, Level};

use crate::audio::{self, Output, Sample};
use crate::instruments::InstrumentBank;
use crate::playsync::CancelHandle;
use crate::timeline::codec::{self, CodecError};
use crate::timeline::{resolver, Timeline, TimelineError, TimelineStore};
use crate::util;

pub mod overlay;

use self::overlay::{DeferredTriggers, PlannedNote};

const EVENT_CAPACITY: usize = 256;

/// Something observers of the transport may want to draw.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Started,
    /// The playing marker moved to this column.
    Step { column: usize },
    /// A pad sounded. The key is "{track} {kit}".
    Pulse { key: String, duration: Duration },
    Stopped,
}

/// The state of the transport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransportState {
    Stopped,
    Running,
}

/// A pad that should sound this step.
struct Hit {
    track: String,
    kit: usize,
    sound: Sample,
    panning: f32,
    volume: f32,
}

/// Everything a step decided, gathered under the store's lock.
struct StepOutcome {
    hits: Vec<Hit>,
    melodic: Vec<PlannedNote>,
    master_volume: f32,
    tempo: f64,
}

/// One step of the loop. Marks `column` as playing on every track and collects the
/// audible hits and melodic notes.
fn step(timeline: &mut Timeline, column: usize, visible: &[String]) -> StepOutcome {
    let tempo = timeline.settings.tempo;
    let master_volume = timeline.settings.master_volume;
    let steps = timeline.steps();
    let mut hits = Vec::new();
    let mut melodic = Vec::new();

    for track in timeline.tracks_mut() {
        for (index, pad) in track.pads_mut().iter_mut().enumerate() {
            pad.set_playing(index == column);
        }

        if !resolver::audible(track, visible) {
            continue;
        }
        if let Some(pad) = track.pads().get(column) {
            if let (Some(kit), Some(sound)) = (pad.kit(), pad.sound()) {
                hits.push(Hit {
                    track: track.name().to_string(),
                    kit,
                    sound: sound.clone(),
                    panning: track.audio.panning,
                    volume: track.audio.volume,
                });
            }
        }
        if column == 0 {
            melodic.extend(overlay::plan(track, tempo, steps, master_volume));
        }
    }

    StepOutcome {
        hits,
        melodic,
        master_volume,
        tempo,
    }
}

/// State shared between the transport handle and its run task.
struct Shared {
    store: Arc<TimelineStore>,
    output: Arc<dyn Output>,
    instruments: Arc<InstrumentBank>,
    events: broadcast::Sender<TransportEvent>,
    /// How long a pad pulse lasts.
    pulse: Duration,
    deferred: Mutex<DeferredTriggers>,
}

/// A run in progress.
struct Run {
    cancel: CancelHandle,
    join: JoinHandle<()>,
}

/// Starts and stops playback of the store's timeline.
pub struct Transport {
    shared: Arc<Shared>,
    run: Mutex<Option<Run>>,
}

impl Transport {
    pub fn new(
        store: Arc<TimelineStore>,
        output: Arc<dyn Output>,
        instruments: Arc<InstrumentBank>,
        pulse: Duration,
    ) -> Transport {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Transport {
            shared: Arc::new(Shared {
                store,
                output,
                instruments,
                events,
                pulse,
                deferred: Mutex::new(DeferredTriggers::default()),
            }),
            run: Mutex::new(None),
        }
    }

    /// Returns the store the transport plays.
    pub fn store(&self) -> Arc<TimelineStore> {
        self.shared.store.clone()
    }

    /// Subscribes to transport events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> TransportState {
        match &*self.run.lock() {
            Some(run) if !run.cancel.is_cancelled() => TransportState::Running,
            _ => TransportState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }

    /// Starts playing from column 0. Does nothing if already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        self.start_with_limit(None);
    }

    /// Starts playing and stops by itself after `loops` complete loops, if given.
    pub fn start_with_limit(&self, loops: Option<u64>) {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(|run| !run.cancel.is_cancelled()) {
            debug!("Transport already running");
            return;
        }

        info!(loops = ?loops, "Transport started");
        let _ = self.shared.events.send(TransportEvent::Started);
        let cancel = CancelHandle::new();
        let span = span!(Level::INFO, "transport");
        let join = tokio::spawn(
            run_loop(self.shared.clone(), cancel.clone(), loops).instrument(span),
        );
        *run = Some(Run { cancel, join });
    }

    /// Stops playing. Pending melodic triggers are cancelled and no pad is left playing.
    pub fn stop(&self) {
        let Some(run) = self.run.lock().take() else {
            return;
        };
        finish(&self.shared, &run.cancel);
    }

    /// Changes the tempo. Takes effect from the next step.
    pub fn set_tempo(&self, tempo: f64) -> Result<(), TimelineError> {
        self.shared.store.update(|timeline| timeline.set_tempo(tempo))
    }

    /// Changes the number of steps. Stops playback first.
    pub fn set_steps(&self, steps: usize) -> Result<(), TimelineError> {
        self.stop();
        self.shared.store.update(|timeline| timeline.resize(steps))
    }

    /// Hides a track. Stops playback first.
    pub fn hide_track(&self, name: &str) {
        self.stop();
        self.shared.store.hide_track(name);
    }

    /// Empties every pad. Stops playback first.
    pub fn clear(&self) {
        self.stop();
        self.shared.store.update(Timeline::clear);
    }

    /// Randomizes the pads. Stops playback first.
    pub fn shuffle(&self) {
        self.stop();
        self.shared
            .store
            .update(|timeline| timeline.shuffle(&mut rand::thread_rng()));
    }

    /// Replaces the timeline. Stops playback first.
    pub fn import(&self, timeline: Timeline) {
        self.stop();
        info!(
            tempo = timeline.settings.tempo,
            master_volume = timeline.settings.master_volume,
            tracks = timeline.tracks().len(),
            "Importing timeline"
        );
        self.shared.store.replace(timeline);
    }

    /// Reads a `.beat` document and imports it. A malformed document leaves everything,
    /// including playback, as it was.
    pub fn import_str(&self, text: &str) -> Result<(), CodecError> {
        let timeline = codec::import(text)?;
        self.import(timeline);
        Ok(())
    }

    /// Number of melodic triggers waiting to fire.
    pub fn pending_triggers(&self) -> usize {
        self.shared.deferred.lock().pending()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.cancel.cancel();
            run.join.abort();
        }
        self.shared.deferred.lock().cancel_all();
    }
}

/// Ends a run. Only the first call for a run has any effect.
fn finish(shared: &Shared, cancel: &CancelHandle) {
    let mut deferred = shared.deferred.lock();
    if cancel.is_cancelled() {
        return;
    }
    cancel.cancel();
    deferred.cancel_all();
    shared.store.update(Timeline::clear_playing);
    info!("Transport stopped");
    let _ = shared.events.send(TransportEvent::Stopped);
}

async fn run_loop(shared: Arc<Shared>, cancel: CancelHandle, loops: Option<u64>) {
    let mut column = 0;
    let mut completed = 0u64;
    loop {
        let visible = shared.store.visible_tracks();
        let outcome = shared.store.update(|timeline| {
            // Checked under the lock so a concurrent stop can't be undone by this step.
            if cancel.is_cancelled() {
                return None;
            }
            // The timeline may have shrunk since the last step.
            if column >= timeline.steps() {
                column = 0;
            }
            Some(step(timeline, column, &visible))
        });
        let Some(outcome) = outcome else {
            return;
        };

        let instruments = if outcome.melodic.is_empty() {
            HashMap::new()
        } else {
            shared
                .instruments
                .resolve(overlay::instrument_ids(&outcome.melodic))
                .await
        };

        {
            let mut deferred = shared.deferred.lock();
            if cancel.is_cancelled() {
                return;
            }

            for hit in &outcome.hits {
                match audio::play(
                    shared.output.as_ref(),
                    &hit.sound,
                    hit.panning,
                    hit.volume,
                    outcome.master_volume,
                ) {
                    Ok(()) => {
                        let _ = shared.events.send(TransportEvent::Pulse {
                            key: format!("{} {}", hit.track, hit.kit),
                            duration: shared.pulse,
                        });
                    }
                    Err(e) => {
                        warn!(track = hit.track, kit = hit.kit, err = %e, "Failed to play pad")
                    }
                }
            }
            let _ = shared.events.send(TransportEvent::Step { column });

            if column == 0 {
                deferred.cancel_all();
                if !outcome.melodic.is_empty() {
                    debug!(notes = outcome.melodic.len(), "Scheduling melodic overlay");
                    deferred.schedule(outcome.melodic, &instruments, &cancel);
                }
            }
        }

        let Some(delay) = util::beat_duration(outcome.tempo) else {
            warn!(tempo = outcome.tempo, "Tempo has no usable beat length");
            finish(&shared, &cancel);
            return;
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let steps = shared.store.read(Timeline::steps);
        column += 1;
        if column >= steps {
            column = 0;
            completed += 1;
            if loops.is_some_and(|loops| completed >= loops) {
                info!(loops = completed, "Loop limit reached");
                finish(&shared, &cancel);
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use parking_lot::RwLock;
    use tokio::time::{sleep, Instant};

    use super::*;
    use crate::audio::mock;
    use crate::instruments::test::RecordingLoader;
    use crate::kits;
    use crate::testutil::eventually_async;
    use crate::timeline::{MelodicRecording, Note, Settings, MELODIC_TRACK};

    struct Harness {
        transport: Transport,
        output: Arc<mock::Output>,
        loader: RecordingLoader,
    }

    impl Harness {
        fn new(timeline: Timeline, visible: &[&str]) -> Harness {
            let store = Arc::new(TimelineStore::new(
                timeline,
                Arc::new(RwLock::new(kits::test::registry())),
                visible.iter().map(|name| name.to_string()).collect(),
            ));
            let output = Arc::new(mock::Output::get("mock", 44100));
            let mut loader = RecordingLoader::default();
            loader.missing.insert("theremin".to_string());
            let transport = Transport::new(
                store,
                output.clone(),
                Arc::new(InstrumentBank::new(Box::new(loader.clone()))),
                Duration::from_millis(100),
            );
            Harness {
                transport,
                output,
                loader,
            }
        }

        fn update<R>(&self, change: impl FnOnce(&mut Timeline) -> R) -> R {
            self.transport.store().update(change)
        }

        fn playing_steps(&self) -> Vec<Option<usize>> {
            self.transport.store().read(|timeline| {
                timeline.tracks().iter().map(|t| t.playing_step()).collect()
            })
        }
    }

    fn timeline(tempo: f64) -> Timeline {
        Timeline::template(
            Settings {
                tempo,
                master_volume: 0.5,
            },
            16,
            &["Kick", "Snare"],
        )
    }

    fn note(instrument: &str, offset: f64) -> Note {
        Note {
            pitch: "C".to_string(),
            octave: 4,
            instrument: instrument.to_string(),
            offset,
        }
    }

    fn offsets_since(start: Instant, times: impl Iterator<Item = Instant>) -> Vec<Duration> {
        times.map(|at| at.duration_since(start)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_muted_track_never_plays() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| {
            timeline.set_pad("Kick", 0, Some(1)).unwrap();
            resolver::toggle_mute(timeline, "Kick").unwrap();
        });

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.stop();

        assert!(harness.output.played().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_soloed_track_plays_even_when_muted() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| {
            timeline.set_pad("Kick", 0, Some(1)).unwrap();
            timeline.set_pad("Snare", 0, Some(1)).unwrap();
            resolver::toggle_mute(timeline, "Snare").unwrap();
            resolver::toggle_solo(timeline, "Snare").unwrap();
        });

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.stop();

        let played = harness.output.played();
        assert_eq!(1, played.len());
        assert_eq!(0.2, played[0].sample.data()[0]);
        assert!((played[0].gain - 0.25).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_track_is_silent() {
        let harness = Harness::new(timeline(240.0), &["Snare"]);
        harness.update(|timeline| timeline.set_pad("Kick", 0, Some(1)).unwrap());

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.stop();

        assert!(harness.output.played().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_follow_tempo() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| {
            timeline.set_pad("Kick", 0, Some(1)).unwrap();
            timeline.set_pad("Kick", 2, Some(2)).unwrap();
            timeline.track_mut("Kick").unwrap().set_panning(-0.5);
        });

        let start = Instant::now();
        harness.transport.start();
        sleep(Duration::from_millis(800)).await;
        harness.transport.stop();

        let played = harness.output.played();
        assert_eq!(
            vec![Duration::ZERO, Duration::from_millis(500)],
            offsets_since(start, played.iter().map(|p| p.at))
        );
        assert_eq!(0.1, played[0].sample.data()[0]);
        assert_eq!(0.4, played[1].sample.data()[0]);
        assert_eq!(-0.5, played[1].pan);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_playing_pad_per_track() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        assert_eq!(TransportState::Stopped, harness.transport.state());

        harness.transport.start();
        assert!(harness.transport.is_running());
        for column in 0..20 {
            sleep(Duration::from_millis(125)).await;
            let expected = Some(column % 16);
            assert_eq!(vec![expected, expected], harness.playing_steps());
            sleep(Duration::from_millis(125)).await;
        }

        harness.transport.stop();
        assert!(!harness.transport.is_running());
        assert_eq!(vec![None, None], harness.playing_steps());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_and_step_events() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| timeline.set_pad("Kick", 1, Some(2)).unwrap());
        let mut events = harness.transport.subscribe();

        harness.transport.start();
        sleep(Duration::from_millis(300)).await;
        harness.transport.stop();
        sleep(Duration::from_millis(10)).await;

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(
            vec![
                TransportEvent::Started,
                TransportEvent::Step { column: 0 },
                TransportEvent::Pulse {
                    key: "Kick 2".to_string(),
                    duration: Duration::from_millis(100)
                },
                TransportEvent::Step { column: 1 },
                TransportEvent::Stopped,
            ],
            received
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_stretches_recording() {
        let harness = Harness::new(timeline(120.0), &["Kick", "Snare"]);
        harness.transport.store().attach_recording(MelodicRecording {
            notes: vec![
                note("acoustic_grand_piano", 0.0),
                note("acoustic_grand_piano", 1.0),
                note("acoustic_grand_piano", 2.0),
            ],
            duration: 2.0,
        });

        let start = Instant::now();
        harness.transport.start();
        sleep(Duration::from_millis(1500)).await;
        harness.transport.stop();

        let played = harness.loader.played();
        assert_eq!(
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1000)
            ],
            offsets_since(start, played.iter().map(|p| p.at))
        );
        assert!(played.iter().all(|p| p.note == "C4"));
        assert!(played.iter().all(|p| (p.gain - 1.25).abs() < 1e-6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_triggers() {
        let harness = Harness::new(timeline(120.0), &["Kick", "Snare"]);
        harness.transport.store().attach_recording(MelodicRecording {
            notes: vec![
                note("acoustic_grand_piano", 3.0),
                note("acoustic_grand_piano", 5.0),
            ],
            duration: 5.0,
        });
        harness.update(|timeline| {
            timeline
                .track_mut(MELODIC_TRACK)
                .unwrap()
                .set_bpm(None)
                .unwrap()
        });

        harness.transport.start();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(2, harness.transport.pending_triggers());

        harness.transport.stop();
        assert_eq!(0, harness.transport.pending_triggers());
        sleep(Duration::from_secs(10)).await;

        assert!(harness.loader.played().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_requires_audible_track() {
        let harness = Harness::new(timeline(120.0), &["Kick", "Snare"]);
        let store = harness.transport.store();
        store.attach_recording(MelodicRecording {
            notes: vec![note("acoustic_grand_piano", 0.0)],
            duration: 0.0,
        });
        store.update(|timeline| resolver::toggle_mute(timeline, MELODIC_TRACK).unwrap());

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.stop();

        assert!(harness.loader.played().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_instrument_skips_only_its_notes() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.transport.store().attach_recording(MelodicRecording {
            notes: vec![
                note("theremin", 0.0),
                note("acoustic_grand_piano", 0.5),
            ],
            duration: 0.5,
        });

        harness.transport.start();
        sleep(Duration::from_millis(900)).await;
        assert!(harness.transport.is_running());
        harness.transport.stop();

        let played = harness.loader.played();
        assert_eq!(1, played.len());
        assert_eq!("acoustic_grand_piano", played[0].instrument);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_failure_keeps_running() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| {
            for step in 0..16 {
                timeline.set_pad("Kick", step, Some(1)).unwrap();
            }
        });
        harness.output.set_failing(true);
        let mut events = harness.transport.subscribe();

        harness.transport.start();
        sleep(Duration::from_millis(1100)).await;
        assert!(harness.transport.is_running());
        harness.transport.stop();

        let mut columns = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                TransportEvent::Step { column } => columns.push(column),
                TransportEvent::Pulse { .. } => panic!("pulse for a pad that failed to play"),
                _ => {}
            }
        }
        assert_eq!(vec![0, 1, 2, 3, 4], columns);
        assert!(harness.output.played().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nothing_sounds_after_stop_returns() {
        let harness = Harness::new(timeline(6000.0), &["Kick", "Snare"]);
        harness.update(|timeline| {
            for step in 0..16 {
                timeline.set_pad("Kick", step, Some(1)).unwrap();
            }
        });

        for round in 0..40u64 {
            let mut events = harness.transport.subscribe();
            harness.transport.start();
            sleep(Duration::from_micros(round * 250)).await;
            harness.transport.stop();
            let played = harness.output.played().len();

            sleep(Duration::from_millis(25)).await;
            assert_eq!(played, harness.output.played().len(), "round {round}");
            assert_eq!(vec![None, None], harness.playing_steps(), "round {round}");

            let mut received = Vec::new();
            while let Ok(event) = events.try_recv() {
                received.push(event);
            }
            assert_eq!(Some(&TransportEvent::Started), received.first(), "round {round}");
            assert_eq!(Some(&TransportEvent::Stopped), received.last(), "round {round}");
            assert_eq!(
                1,
                received
                    .iter()
                    .filter(|event| **event == TransportEvent::Stopped)
                    .count(),
                "round {round}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_tempo_stops_cleanly() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| timeline.settings.tempo = 1e-18);
        let mut events = harness.transport.subscribe();

        harness.transport.start();
        sleep(Duration::from_millis(10)).await;

        assert!(!harness.transport.is_running());
        assert_eq!(vec![None, None], harness.playing_steps());
        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(
            vec![
                TransportEvent::Started,
                TransportEvent::Step { column: 0 },
                TransportEvent::Stopped,
            ],
            received
        );

        harness.update(|timeline| timeline.set_tempo(240.0).unwrap());
        harness.transport.start();
        assert!(harness.transport.is_running());
        harness.transport.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinking_while_running_wraps_to_first_column() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);

        harness.transport.start();
        sleep(Duration::from_millis(2600)).await;
        assert_eq!(vec![Some(10), Some(10)], harness.playing_steps());

        let mut events = harness.transport.subscribe();
        harness.update(|timeline| timeline.resize(8)).unwrap();
        sleep(Duration::from_millis(250)).await;
        assert!(harness.transport.is_running());

        let mut columns = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let TransportEvent::Step { column } = event {
                columns.push(column);
            }
        }
        assert_eq!(vec![0], columns);
        assert_eq!(vec![Some(0), Some(0)], harness.playing_steps());
        harness.transport.store().read(|timeline| {
            for track in timeline.tracks() {
                assert!(track.pads().iter().filter(|pad| pad.is_playing()).count() <= 1);
            }
        });
        harness.transport.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_instrument_is_not_reloaded() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.transport.set_steps(4).unwrap();
        harness.transport.store().attach_recording(MelodicRecording {
            notes: vec![note("theremin", 0.0), note("acoustic_grand_piano", 0.5)],
            duration: 0.5,
        });

        harness.transport.start();
        sleep(Duration::from_millis(2900)).await;
        harness.transport.stop();

        assert_eq!(3, harness.loader.played().len());
        assert_eq!(
            vec!["acoustic_grand_piano", "theremin"],
            harness.loader.loads()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tempo_change_applies_next_step() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| {
            for step in 0..16 {
                timeline.set_pad("Kick", step, Some(1)).unwrap();
            }
        });

        let start = Instant::now();
        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.set_tempo(60.0).unwrap();
        assert!(harness.transport.set_tempo(-1.0).is_err());
        sleep(Duration::from_millis(1200)).await;
        harness.transport.stop();

        assert_eq!(
            vec![
                Duration::ZERO,
                Duration::from_millis(250),
                Duration::from_millis(1250)
            ],
            offsets_since(start, harness.output.played().iter().map(|p| p.at))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_structural_changes_stop_playback() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);

        harness.transport.start();
        sleep(Duration::from_millis(600)).await;
        harness.transport.set_steps(8).unwrap();
        assert!(!harness.transport.is_running());
        assert_eq!(vec![None, None], harness.playing_steps());
        assert_eq!(8, harness.transport.store().read(Timeline::steps));

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.shuffle();
        assert!(!harness.transport.is_running());

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.clear();
        assert!(!harness.transport.is_running());
        harness.transport.store().read(|timeline| {
            assert!(timeline
                .tracks()
                .iter()
                .all(|t| t.pads().iter().all(|p| p.is_empty())));
        });

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness.transport.hide_track("Kick");
        assert!(!harness.transport.is_running());
        assert_eq!(vec!["Snare"], harness.transport.store().visible_tracks());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_limit() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.transport.set_steps(4).unwrap();
        let mut events = harness.transport.subscribe();

        harness.transport.start_with_limit(Some(2));
        let mut columns = Vec::new();
        loop {
            match events.recv().await.unwrap() {
                TransportEvent::Step { column } => columns.push(column),
                TransportEvent::Stopped => break,
                _ => {}
            }
        }

        assert_eq!(vec![0, 1, 2, 3, 0, 1, 2, 3], columns);
        assert!(!harness.transport.is_running());
        assert_eq!(vec![None, None], harness.playing_steps());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_loop_limit() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.transport.set_steps(4).unwrap();
        harness.transport.start_with_limit(Some(1));
        let transport = &harness.transport;
        eventually_async(
            || async move { !transport.is_running() },
            "Transport never reached its loop limit",
        )
        .await;
        assert!(harness.output.played().is_empty());

        harness.update(|timeline| timeline.set_pad("Snare", 0, Some(1)).unwrap());
        harness.transport.start();
        let output = &harness.output;
        eventually_async(
            || async move { !output.played().is_empty() },
            "Restarted transport never played",
        )
        .await;
        harness.transport.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_import_leaves_session_alone() {
        let harness = Harness::new(timeline(240.0), &["Kick", "Snare"]);
        harness.update(|timeline| timeline.set_pad("Kick", 3, Some(1)).unwrap());
        let before = harness.transport.store().snapshot();

        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        let err = harness.transport.import_str("{\"settings\": 3}").unwrap_err();
        assert!(err.is_malformed());
        assert!(harness.transport.is_running());
        harness.transport.stop();
        assert_eq!(before, harness.transport.store().snapshot());

        let mut replacement = Timeline::template(
            Settings {
                tempo: 300.0,
                master_volume: 0.9,
            },
            8,
            &["Snare"],
        );
        replacement.set_pad("Snare", 0, Some(3)).unwrap();
        harness.transport.start();
        sleep(Duration::from_millis(100)).await;
        harness
            .transport
            .import_str(&codec::export(&replacement).unwrap())
            .unwrap();
        assert!(!harness.transport.is_running());

        let store = harness.transport.store();
        assert_eq!(replacement, store.snapshot());
        store.read(|timeline| {
            let pad = &timeline.track("Snare").unwrap().pads()[0];
            assert_eq!(0.5, pad.sound().unwrap().data()[0]);
        });
    }
}
