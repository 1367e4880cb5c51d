//! The action-resolution bridge: the channel protocol a player's dedicated
//! execution thread uses to hand timed actions off to the orchestrator's
//! single-writer `World` and block until they resolve.
//!
//! Each player gets one `TankApi` instance, constructed once per match and
//! registered with the sandbox as the `Tank` custom type. Calling one of its
//! methods from player code sends a `PlayerRequest` to the orchestrator and
//! blocks the player's OS thread on a dedicated response channel — this is
//! the synchronous stand-in for `await` the interpreter itself doesn't have.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use redoubt_sim::Slot;

use crate::watchdog::Watchdog;

/// A bridge call resolved because the match already stopped rather than
/// because of anything the world did. Registered sandbox functions turn
/// this into a script-level error so it unwinds the player's program
/// instead of leaving its thread blocked forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stopped;

/// Shared flag the orchestrator raises once a match is over. Checked by
/// every bridge call before it would otherwise block, and alongside the
/// channel disconnect that dropping a match's `OrchestratorSide` already
/// causes, so both an in-flight call and the next one ever made resolve
/// promptly instead of parking the player thread forever.
#[derive(Clone)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Marks the match stopped. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    TurnLeft { degrees: Option<f64> },
    TurnRight { degrees: Option<f64> },
    MoveForward,
    MoveBackward,
    Scan { a_deg: f64, b_deg: f64 },
}

/// How a timed action resolved. `TankDied`/`MatchEnded` let the player
/// thread stop waiting on an action that will never complete because the
/// world moved on without it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionOutcome {
    Completed { scan_result: Option<bool> },
    TankDied,
    MatchEnded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    StartAction(ActionRequest),
    Shoot,
    Random,
    Log(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRequest {
    pub slot: Slot,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerResponse {
    Action(ActionOutcome),
    Shoot(bool),
    Random(f64),
    Ack,
}

/// The orchestrator-facing half of one player's channel pair.
pub struct OrchestratorSide {
    pub slot: Slot,
    pub requests: mpsc::Receiver<PlayerRequest>,
    pub responses: mpsc::Sender<PlayerResponse>,
    pub stop: StopSignal,
}

/// Builds a connected `(TankApi, OrchestratorSide)` pair for one player.
pub fn bridge(slot: Slot, watchdog: Arc<Watchdog>) -> (TankApi, OrchestratorSide) {
    let (request_tx, request_rx) = mpsc::channel();
    let (response_tx, response_rx) = mpsc::channel();
    let stop = StopSignal::new();
    let api = TankApi {
        slot: slot.clone(),
        requests: request_tx,
        responses: Arc::new(Mutex::new(response_rx)),
        watchdog,
        stop: stop.clone(),
    };
    let orchestrator_side = OrchestratorSide {
        slot,
        requests: request_rx,
        responses: response_tx,
        stop,
    };
    (api, orchestrator_side)
}

/// The capability object passed into a player program's entry point as
/// `Tank`. Blocking, synchronous-looking methods that are actually round
/// trips to the orchestrator thread.
#[derive(Clone)]
pub struct TankApi {
    slot: Slot,
    requests: mpsc::Sender<PlayerRequest>,
    responses: Arc<Mutex<mpsc::Receiver<PlayerResponse>>>,
    watchdog: Arc<Watchdog>,
    stop: StopSignal,
}

impl TankApi {
    /// Sends a request and blocks for its response. Does not touch the
    /// watchdog — callers that start a timed action arm it themselves via
    /// `start_action`; instant calls (`shoot`/`random`/`log`) never do.
    fn call(&self, kind: RequestKind) -> Result<PlayerResponse, Stopped> {
        if self.stop.is_stopped() {
            return Err(Stopped);
        }
        let sent = self.requests.send(PlayerRequest {
            slot: self.slot.clone(),
            kind,
        });
        if sent.is_err() {
            return Err(Stopped);
        }
        let guard = self.responses.lock().expect("tank api mutex poisoned");
        guard.recv().map_err(|_| Stopped)
    }

    fn start_action(&self, action: ActionRequest) -> Result<ActionOutcome, Stopped> {
        self.watchdog.arm();
        match self.call(RequestKind::StartAction(action))? {
            PlayerResponse::Action(outcome) => Ok(outcome),
            other => unreachable!("expected an action response, got {other:?}"),
        }
    }

    pub fn turn_left(&self) -> Result<bool, Stopped> {
        self.start_action(ActionRequest::TurnLeft { degrees: None }).map(|o| self.finish(o))
    }

    pub fn turn_left_degrees(&self, degrees: f64) -> Result<bool, Stopped> {
        self.start_action(ActionRequest::TurnLeft { degrees: Some(degrees) })
            .map(|o| self.finish(o))
    }

    pub fn turn_right(&self) -> Result<bool, Stopped> {
        self.start_action(ActionRequest::TurnRight { degrees: None }).map(|o| self.finish(o))
    }

    pub fn turn_right_degrees(&self, degrees: f64) -> Result<bool, Stopped> {
        self.start_action(ActionRequest::TurnRight { degrees: Some(degrees) })
            .map(|o| self.finish(o))
    }

    pub fn move_forward(&self) -> Result<bool, Stopped> {
        self.start_action(ActionRequest::MoveForward).map(|o| self.finish(o))
    }

    pub fn move_backward(&self) -> Result<bool, Stopped> {
        self.start_action(ActionRequest::MoveBackward).map(|o| self.finish(o))
    }

    /// Resolves to whether the scan found an opponent, or `false` if the
    /// tank died or the match ended before the scan resolved.
    pub fn scan(&self, a_deg: f64, b_deg: f64) -> Result<bool, Stopped> {
        match self.start_action(ActionRequest::Scan { a_deg, b_deg })? {
            ActionOutcome::Completed { scan_result } => Ok(scan_result.unwrap_or(false)),
            ActionOutcome::TankDied | ActionOutcome::MatchEnded => Ok(false),
        }
    }

    pub fn shoot(&self) -> Result<bool, Stopped> {
        match self.call(RequestKind::Shoot)? {
            PlayerResponse::Shoot(fired) => Ok(fired),
            other => unreachable!("expected a shoot response, got {other:?}"),
        }
    }

    pub fn random(&self) -> Result<f64, Stopped> {
        match self.call(RequestKind::Random)? {
            PlayerResponse::Random(value) => Ok(value),
            other => unreachable!("expected a random response, got {other:?}"),
        }
    }

    pub fn log(&self, message: String) -> Result<(), Stopped> {
        self.call(RequestKind::Log(message))?;
        Ok(())
    }

    fn finish(&self, outcome: ActionOutcome) -> bool {
        !matches!(outcome, ActionOutcome::TankDied | ActionOutcome::MatchEnded)
    }
}
