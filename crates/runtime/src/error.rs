//! Error taxonomy for loading and running a player program.

use thiserror::Error;

/// Failure while ingesting a player's submitted program, before a match
/// can start. All of these are the player's fault and should be reported
/// back to them rather than retried.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("program source exceeds the maximum size of {limit} bytes (got {actual})")]
    TooLarge { limit: usize, actual: usize },

    #[error("program failed to parse: {0}")]
    ParseError(String),

    #[error("program is missing a top-level CLASS constant")]
    MissingClassConstant,

    #[error("CLASS constant must be \"light\" or \"heavy\", got {0:?}")]
    InvalidClassConstant(String),

    #[error("program is missing a one-argument \"default\" entry point function")]
    MissingEntryPoint,
}

/// Why a player's tank was forcibly removed from the match. Folds both
/// runtime misbehavior and the watchdog timeout into one taxonomy so the
/// orchestrator has a single type to match on when killing a tank.
#[derive(Debug, Error)]
pub enum ForfeitReason {
    #[error("program load failed: {0}")]
    Load(#[from] LoadError),

    #[error("entry point did not return within the time limit")]
    Timeout,

    #[error("entry point raised an error: {0}")]
    RuntimeError(String),

    #[error("entry point panicked")]
    Panicked,
}
