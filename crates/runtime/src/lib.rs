#![deny(unsafe_code)]
//! Sandboxed player-program execution: ingest, the Rhai sandbox, the
//! watchdog, and the action-resolution bridge connecting a player's
//! dedicated execution thread to the orchestrator's single-writer world.
//!
//! This crate is deliberately silent about *how* a match is driven tick by
//! tick — that belongs to the orchestrator. It only provides the pieces an
//! orchestrator wires together: a way to load a player's program, a thread
//! to run it on, and a channel protocol for the timed actions it calls.

pub mod bridge;
pub mod error;
pub mod sandbox;
pub mod watchdog;

pub use bridge::{
    bridge, ActionOutcome, ActionRequest, OrchestratorSide, PlayerRequest, PlayerResponse, RequestKind, StopSignal,
    TankApi,
};
pub use error::{ForfeitReason, LoadError};
pub use sandbox::{build_engine, ingest, PlayerLogLine, PlayerProgram, SandboxLimits};
pub use watchdog::{Watchdog, DEFAULT_TIMEOUT};

use std::sync::Arc;
use std::thread::JoinHandle;

use sandbox::ENTRY_POINT;

/// Spawns a player's entry-point loop on its own OS thread. The loop calls
/// `default(tank)` repeatedly until the orchestrator raises `stop`, which
/// unblocks any in-flight bridge call and aborts the next one before it
/// sends anything. The entry point is expected to be an infinite loop in
/// well-formed player code; this wrapper also tolerates one that returns,
/// by simply calling it again.
pub fn spawn_player(
    slot: redoubt_sim::Slot,
    program: PlayerProgram,
    engine: rhai::Engine,
    tank: TankApi,
    watchdog: Arc<Watchdog>,
    stop: StopSignal,
) -> JoinHandle<Result<(), ForfeitReason>> {
    std::thread::Builder::new()
        .name(format!("player-{slot}"))
        .spawn(move || run_player(program, engine, tank, watchdog, stop))
        .expect("failed to spawn player thread")
}

fn run_player(
    program: PlayerProgram,
    engine: rhai::Engine,
    tank: TankApi,
    watchdog: Arc<Watchdog>,
    stop: StopSignal,
) -> Result<(), ForfeitReason> {
    let mut scope = rhai::Scope::new();

    loop {
        if stop.is_stopped() {
            return Ok(());
        }
        watchdog.arm();
        let result: Result<(), _> = engine.call_fn(&mut scope, &program.ast, ENTRY_POINT, (tank.clone(),));
        watchdog.disarm();
        if let Err(e) = result {
            if stop.is_stopped() {
                return Ok(());
            }
            return Err(ForfeitReason::RuntimeError(e.to_string()));
        }
    }
}
