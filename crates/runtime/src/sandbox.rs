//! Sandboxed Rhai engine construction and player-program ingest.
//!
//! Player code gets a curated, resource-limited interpreter: no `eval`, no
//! filesystem or network access (Rhai never exposes either by default), and
//! hard caps on operation count, recursion depth, and string/array/map
//! sizes so a pathological program fails fast instead of starving the
//! orchestrator's tick loop.

use std::sync::mpsc;

use redoubt_sim::TankClass;
use rhai::{Engine, EvalAltResult, AST};

use crate::bridge::TankApi;
use crate::error::LoadError;

/// The entry point's binding name. Player code is expected to declare
/// `fn default(tank) { ... }`, taking the `Tank` capability as its one
/// argument. `loop` is not accepted as an alternate binding: it is a
/// reserved Rhai statement keyword, so `fn loop(...)` can never parse.
pub(crate) const ENTRY_POINT: &str = "default";

/// Operation/recursion/size limits applied to every match's interpreter.
/// Not configurable per match: these bound worst-case interpreter cost,
/// not gameplay.
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 10_000_000,
            max_expr_depth: 64,
            max_string_size: 64 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

/// A line of player-emitted output, routed to the match transcript rather
/// than the orchestrator's own structured logs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLogLine {
    pub slot: redoubt_sim::Slot,
    pub message: String,
}

/// Turns a bridge call's `Stopped` signal into a genuine Rhai script-level
/// error, so it unwinds the player's whole call stack (including any
/// enclosing `while true { ... }`) instead of leaving the call dangling.
fn stopped<T>(result: Result<T, crate::bridge::Stopped>) -> Result<T, Box<EvalAltResult>> {
    result.map_err(|_| "match stopped".into())
}

/// Builds a fresh sandboxed engine. Registers `TankApi` as the `Tank`
/// custom type so player code calls its verbs as instance methods
/// (`tank.moveForward()`, `tank.scan(a, b)`, ...) on the value passed into
/// its entry point, rather than through bare global functions.
/// `print`/`debug` output is routed to `log_tx` tagged with `slot`, never
/// through the orchestrator's own structured logs.
pub fn build_engine(slot: redoubt_sim::Slot, limits: SandboxLimits, log_tx: mpsc::Sender<PlayerLogLine>) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(limits.max_operations);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.disable_symbol("eval");

    let print_slot = slot.clone();
    let print_tx = log_tx.clone();
    engine.on_print(move |text| {
        let _ = print_tx.send(PlayerLogLine {
            slot: print_slot.clone(),
            message: text.to_string(),
        });
    });
    let debug_slot = slot;
    engine.on_debug(move |text, source, pos| {
        let tag = source.unwrap_or("");
        let _ = log_tx.send(PlayerLogLine {
            slot: debug_slot.clone(),
            message: format!("[{tag}:{pos:?}] {text}"),
        });
    });

    engine.register_type_with_name::<TankApi>("Tank");
    engine.register_fn("turnLeft", |t: &mut TankApi| stopped(t.turn_left()));
    engine.register_fn("turnLeft", |t: &mut TankApi, degrees: f64| stopped(t.turn_left_degrees(degrees)));
    engine.register_fn("turnRight", |t: &mut TankApi| stopped(t.turn_right()));
    engine.register_fn("turnRight", |t: &mut TankApi, degrees: f64| stopped(t.turn_right_degrees(degrees)));
    engine.register_fn("moveForward", |t: &mut TankApi| stopped(t.move_forward()));
    engine.register_fn("moveBackward", |t: &mut TankApi| stopped(t.move_backward()));
    engine.register_fn("scan", |t: &mut TankApi, a_deg: f64, b_deg: f64| stopped(t.scan(a_deg, b_deg)));
    engine.register_fn("shoot", |t: &mut TankApi| stopped(t.shoot()));
    engine.register_fn("random", |t: &mut TankApi| stopped(t.random()));
    engine.register_fn("log", |t: &mut TankApi, message: String| stopped(t.log(message)));

    engine
}

/// A compiled, validated player program: its declared tank class and the
/// AST its entry point is called from, once per invocation.
pub struct PlayerProgram {
    pub class: TankClass,
    pub ast: AST,
}

/// Parses and validates a player's submitted source: size limit, a
/// top-level `CLASS` constant, and a one-argument `default(tank)` entry
/// point. Does not execute anything.
pub fn ingest(source: &str, engine: &Engine, max_code_size_bytes: usize) -> Result<PlayerProgram, LoadError> {
    if source.len() > max_code_size_bytes {
        return Err(LoadError::TooLarge {
            limit: max_code_size_bytes,
            actual: source.len(),
        });
    }

    let ast = engine
        .compile(source)
        .map_err(|e| LoadError::ParseError(e.to_string()))?;

    let has_entry_point = ast
        .iter_functions()
        .any(|f| f.name == ENTRY_POINT && f.params.len() == 1);
    if !has_entry_point {
        return Err(LoadError::MissingEntryPoint);
    }

    let class_value = ast
        .iter_literal_variables(true, false)
        .find(|(name, _, _)| *name == "CLASS")
        .map(|(_, _, value)| value)
        .ok_or(LoadError::MissingClassConstant)?;

    let class_str = class_value
        .into_string()
        .map_err(|_| LoadError::InvalidClassConstant("<non-string>".to_string()))?;
    let class = TankClass::parse(&class_str).ok_or(LoadError::InvalidClassConstant(class_str))?;

    Ok(PlayerProgram { class, ast })
}
