#![deny(unsafe_code)]
//! Match orchestrator: wires the simulation core, the sandboxed player
//! runtimes and the action-resolution bridge together and drives one match
//! tick by tick.
//!
//! `World` is the single writer; the orchestrator is the only thing that
//! ever calls its methods. Player threads only ever reach the world through
//! the bridge's request/response channels, drained once per tick.

pub mod error;
pub mod logging;

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use redoubt_replay::{acquire_build_fingerprint, RecordedAction, RecordedActionKind, ReplayConfig, ReplayRecorder};
use redoubt_runtime::{
    bridge, build_engine, ingest, spawn_player, ActionOutcome, ActionRequest, ForfeitReason, OrchestratorSide,
    PlayerLogLine, PlayerResponse, RequestKind, SandboxLimits, StopSignal, Watchdog,
};
use redoubt_sim::{Constants, MatchEndReason, SimEvent, Slot, TankClass, TickCount, World};
use redoubt_wire::{MatchEndProto, StateProto};

pub use error::MatchError;
pub use logging::init_tracing;

/// One player's submitted source. The tank class is declared inside the
/// source itself (the `CLASS` constant); the orchestrator never sees it
/// before `ingest` runs.
#[derive(Debug, Clone)]
pub struct PlayerSpec {
    pub slot: Slot,
    pub source: String,
}

/// Settings governing how a match is run, independent of any one match's
/// seed, constants or roster.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub sandbox_limits: SandboxLimits,
    /// Whether to hash the running executable and attach it to the replay
    /// artifact. Disabled in tests that don't want to touch the filesystem.
    pub record_build_fingerprint: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            sandbox_limits: SandboxLimits::default(),
            record_build_fingerprint: true,
        }
    }
}

/// The result of a completed match.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub winner: Option<Slot>,
    pub reason: MatchEndReason,
    pub ticks: TickCount,
    pub end: MatchEndProto,
    pub replay: redoubt_wire::ReplayArtifactProto,
    pub transcript: Vec<PlayerLogLine>,
}

/// Loads every player's program, spawns its sandboxed thread, and drives the
/// match to completion at a fixed timestep. Returns once a `MatchEnd` event
/// fires or a player's program fails to load.
pub async fn run_match(
    seed: u32,
    constants: Constants,
    players: Vec<PlayerSpec>,
    settings: OrchestratorSettings,
    snapshot_tx: Option<mpsc::Sender<StateProto>>,
) -> Result<MatchOutcome, MatchError> {
    if players.is_empty() {
        return Err(MatchError::NoPlayers);
    }

    let ingest_engine = rhai::Engine::new();
    let mut programs = Vec::with_capacity(players.len());
    for player in players {
        let program = ingest(&player.source, &ingest_engine, constants.max_code_size_bytes)
            .map_err(|source| MatchError::PlayerLoadFailed { slot: player.slot.clone(), source })?;
        programs.push((player.slot, program));
    }

    let player_classes: Vec<(Slot, TankClass)> = programs.iter().map(|(slot, p)| (slot.clone(), p.class)).collect();
    let mut world = World::new(seed, constants, &player_classes);

    let mut recorder = ReplayRecorder::new(ReplayConfig {
        seed,
        constants,
        players: player_classes,
    });
    if settings.record_build_fingerprint {
        if let Ok(fingerprint) = acquire_build_fingerprint() {
            recorder.set_build_fingerprint(fingerprint);
        }
    }

    let (log_tx, log_rx) = mpsc::channel::<PlayerLogLine>();
    let mut sides: HashMap<Slot, OrchestratorSide> = HashMap::new();
    let mut player_handles: HashMap<Slot, Option<JoinHandle<Result<(), ForfeitReason>>>> = HashMap::new();
    let mut watchdog_tasks: HashMap<Slot, tokio::task::JoinHandle<()>> = HashMap::new();
    let mut watchdog_handled: HashSet<Slot> = HashSet::new();

    for (slot, program) in programs {
        let watchdog = Arc::new(Watchdog::with_default_timeout());
        let (tank, orchestrator_side) = bridge(slot.clone(), Arc::clone(&watchdog));
        let stop = orchestrator_side.stop.clone();
        let engine = build_engine(slot.clone(), settings.sandbox_limits, log_tx.clone());
        watchdog_tasks.insert(slot.clone(), watchdog.spawn_timeout_task());
        let handle = spawn_player(slot.clone(), program, engine, tank, watchdog, stop);
        player_handles.insert(slot.clone(), Some(handle));
        sides.insert(slot, orchestrator_side);
    }
    drop(log_tx);

    let mut pending: HashMap<Slot, ()> = HashMap::new();
    let mut transcript: Vec<PlayerLogLine> = Vec::new();
    let dt = Duration::from_secs_f64(world.constants().dt());
    let cap = dt * 10;
    let ticks_per_snapshot = world.constants().ticks_per_snapshot();

    let mut accumulator = Duration::ZERO;
    let mut last_wake = tokio::time::Instant::now();

    let (winner, reason) = 'outer: loop {
        let now = tokio::time::Instant::now();
        accumulator += now - last_wake;
        last_wake = now;
        if accumulator > cap {
            accumulator = cap;
        }

        while accumulator >= dt {
            drain_requests(&mut world, &sides, &mut pending, &mut recorder, &mut transcript);

            let events = match panic::catch_unwind(AssertUnwindSafe(|| world.step())) {
                Ok(events) => events,
                Err(_) => {
                    tracing::error!("world.step panicked; ending the match with a synthetic error result");
                    vec![SimEvent::MatchEnd { winner: None, reason: MatchEndReason::Error }]
                }
            };

            let mut match_end = None;
            for event in &events {
                match event {
                    SimEvent::ActionComplete { slot, scan_result, .. } => {
                        if pending.remove(slot).is_some() {
                            if let Some(side) = sides.get(slot) {
                                let _ = side
                                    .responses
                                    .send(PlayerResponse::Action(ActionOutcome::Completed { scan_result: *scan_result }));
                            }
                        }
                    }
                    SimEvent::Hit { target, .. } => {
                        let target_died = world.tank(target).is_some_and(|t| !t.is_alive());
                        if target_died && pending.remove(target).is_some() {
                            if let Some(side) = sides.get(target) {
                                let _ = side.responses.send(PlayerResponse::Action(ActionOutcome::TankDied));
                            }
                        }
                    }
                    SimEvent::Despawn { .. } => {}
                    SimEvent::MatchEnd { winner, reason } => {
                        match_end = Some((winner.clone(), *reason));
                    }
                }
            }

            reap_finished_players(&mut world, &mut player_handles, &mut pending, &sides);
            reap_timed_out_players(&mut world, &watchdog_tasks, &mut watchdog_handled, &mut pending, &sides);

            if ticks_per_snapshot > 0 && world.tick() % ticks_per_snapshot == 0 {
                if let Some(tx) = &snapshot_tx {
                    let _ = tx.send(world.snapshot().into());
                }
            }

            accumulator -= dt;

            if let Some(outcome) = match_end {
                for (slot, _) in pending.drain() {
                    if let Some(side) = sides.get(&slot) {
                        let _ = side.responses.send(PlayerResponse::Action(ActionOutcome::MatchEnded));
                    }
                }
                break 'outer outcome;
            }
        }

        let wake_in = dt.saturating_sub(accumulator).max(Duration::from_millis(1));
        tokio::time::sleep(wake_in).await;
    };

    let final_digest = world.state_digest();
    let checkpoint_tick = world.tick();
    let end = MatchEndProto {
        winner: winner.clone(),
        reason: reason.as_str().to_string(),
        detail: None,
    };
    let replay = recorder.finalize(final_digest, checkpoint_tick, reason.as_str());

    // Raising `stop` makes the fast-path check in `TankApi::call` refuse any
    // further request, and dropping every side's channels disconnects any
    // call already blocked in `recv`, so every player thread is guaranteed
    // to return (or error) on its own rather than staying parked forever.
    for side in sides.values() {
        side.stop.stop();
    }
    sides.clear();
    for (_, task) in watchdog_tasks {
        task.abort();
    }
    for (slot, handle_opt) in player_handles {
        if let Some(handle) = handle_opt {
            if let Err(panic) = handle.join() {
                tracing::warn!(slot = %slot, panic = ?panic, "player thread panicked during teardown");
            }
        }
    }
    transcript.extend(log_rx.try_iter());

    Ok(MatchOutcome {
        winner,
        reason,
        ticks: checkpoint_tick,
        end,
        replay,
        transcript,
    })
}

fn drain_requests(
    world: &mut World,
    sides: &HashMap<Slot, OrchestratorSide>,
    pending: &mut HashMap<Slot, ()>,
    recorder: &mut ReplayRecorder,
    transcript: &mut Vec<PlayerLogLine>,
) {
    for side in sides.values() {
        while let Ok(request) = side.requests.try_recv() {
            match request.kind {
                RequestKind::Shoot => {
                    let fired = world.shoot(&request.slot);
                    let _ = side.responses.send(PlayerResponse::Shoot(fired));
                }
                RequestKind::Random => {
                    let value = world.random();
                    let _ = side.responses.send(PlayerResponse::Random(value));
                }
                RequestKind::Log(message) => {
                    transcript.push(PlayerLogLine { slot: request.slot.clone(), message });
                    let _ = side.responses.send(PlayerResponse::Ack);
                }
                RequestKind::StartAction(action) => {
                    let started = match &action {
                        ActionRequest::TurnLeft { degrees } => world.turn_left(&request.slot, *degrees),
                        ActionRequest::TurnRight { degrees } => world.turn_right(&request.slot, *degrees),
                        ActionRequest::MoveForward => world.move_forward(&request.slot),
                        ActionRequest::MoveBackward => world.move_backward(&request.slot),
                        ActionRequest::Scan { a_deg, b_deg } => world.scan(&request.slot, *a_deg, *b_deg),
                    };
                    if started {
                        recorder.record_action(RecordedAction {
                            tick: world.tick(),
                            slot: request.slot.clone(),
                            kind: recorded_kind(&action),
                        });
                        pending.insert(request.slot.clone(), ());
                    } else {
                        let _ = side.responses.send(PlayerResponse::Action(ActionOutcome::TankDied));
                    }
                }
            }
        }
    }
}

fn recorded_kind(action: &ActionRequest) -> RecordedActionKind {
    match action {
        ActionRequest::TurnLeft { degrees } => RecordedActionKind::TurnLeft { degrees: *degrees },
        ActionRequest::TurnRight { degrees } => RecordedActionKind::TurnRight { degrees: *degrees },
        ActionRequest::MoveForward => RecordedActionKind::MoveForward,
        ActionRequest::MoveBackward => RecordedActionKind::MoveBackward,
        ActionRequest::Scan { a_deg, b_deg } => RecordedActionKind::Scan { a_deg: *a_deg, b_deg: *b_deg },
    }
}

/// Joins any player thread that has stopped running (its entry-point loop
/// returned an error, or it panicked) and forfeits its tank.
fn reap_finished_players(
    world: &mut World,
    handles: &mut HashMap<Slot, Option<JoinHandle<Result<(), ForfeitReason>>>>,
    pending: &mut HashMap<Slot, ()>,
    sides: &HashMap<Slot, OrchestratorSide>,
) {
    for (slot, handle_opt) in handles.iter_mut() {
        let finished = handle_opt.as_ref().is_some_and(|h| h.is_finished());
        if !finished {
            continue;
        }
        let Some(handle) = handle_opt.take() else {
            continue;
        };
        let forfeit_reason = match handle.join() {
            Ok(Ok(())) => continue,
            Ok(Err(reason)) => reason,
            Err(_) => ForfeitReason::Panicked,
        };
        tracing::warn!(slot = %slot, error = %forfeit_reason, "player forfeited");
        world.forfeit(slot);
        if pending.remove(slot).is_some() {
            if let Some(side) = sides.get(slot) {
                let _ = side.responses.send(PlayerResponse::Action(ActionOutcome::TankDied));
            }
        }
    }
}

/// Forfeits any player whose watchdog fired: the entry point, or a single
/// action-start call within it, took longer than the allotted timeout.
fn reap_timed_out_players(
    world: &mut World,
    watchdog_tasks: &HashMap<Slot, tokio::task::JoinHandle<()>>,
    handled: &mut HashSet<Slot>,
    pending: &mut HashMap<Slot, ()>,
    sides: &HashMap<Slot, OrchestratorSide>,
) {
    for (slot, task) in watchdog_tasks.iter() {
        if handled.contains(slot) || !task.is_finished() {
            continue;
        }
        handled.insert(slot.clone());
        tracing::warn!(slot = %slot, "player watchdog timed out");
        world.forfeit(slot);
        if pending.remove(slot).is_some() {
            if let Some(side) = sides.get(slot) {
                let _ = side.responses.send(PlayerResponse::Action(ActionOutcome::TankDied));
            }
        }
    }
}
