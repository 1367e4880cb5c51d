//! Orchestrator-level errors: failures that happen before or around a
//! match, as opposed to [`redoubt_runtime::ForfeitReason`], which is
//! per-player and mid-match.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("match needs at least one player")]
    NoPlayers,
    #[error("player {slot} failed to load: {source}")]
    PlayerLoadFailed {
        slot: redoubt_sim::Slot,
        #[source]
        source: redoubt_runtime::LoadError,
    },
}
