//! Redoubt replay system.
//!
//! This crate provides replay artifact generation and verification.
//!
//! # Architecture
//!
//! - `ReplayRecorder`: collects action-start calls during a match
//! - `verify_replay`: re-simulates a recorded match and confirms the same
//!   final state digest
//! - Build fingerprint acquisition, so a verifier can tell whether it is
//!   comparing against the binary that produced the recording

#![deny(unsafe_code)]

use std::fs;
use std::io::{self, Read as _, Write as _};
use std::path::Path;

use prost::Message;
use redoubt_sim::digest::STATE_DIGEST_ALGO_ID;
use redoubt_sim::{Constants, Slot, TankClass, TickCount, World};
use redoubt_wire::{BuildFingerprint, PlayerSpawnProto, RecordedActionProto, ReplayArtifactProto};
use sha2::{Digest, Sha256};

const REPLAY_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Recorded action
// ============================================================================

/// One action-start call, enough to reproduce it against a fresh `World`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAction {
    pub tick: TickCount,
    pub slot: Slot,
    pub kind: RecordedActionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedActionKind {
    TurnLeft { degrees: Option<f64> },
    TurnRight { degrees: Option<f64> },
    MoveForward,
    MoveBackward,
    Scan { a_deg: f64, b_deg: f64 },
    Shoot,
    Forfeit,
}

impl RecordedActionKind {
    fn wire_tag(&self) -> &'static str {
        match self {
            RecordedActionKind::TurnLeft { .. } => "turnLeft",
            RecordedActionKind::TurnRight { .. } => "turnRight",
            RecordedActionKind::MoveForward => "moveForward",
            RecordedActionKind::MoveBackward => "moveBackward",
            RecordedActionKind::Scan { .. } => "scan",
            RecordedActionKind::Shoot => "shoot",
            RecordedActionKind::Forfeit => "forfeit",
        }
    }

    /// Replays this action against `world`. Ignores the starter's boolean
    /// return: a recorded action that was legal when it happened is legal
    /// again against a bit-identical world state.
    fn apply(&self, world: &mut World, slot: &str) {
        match self {
            RecordedActionKind::TurnLeft { degrees } => {
                world.turn_left(slot, *degrees);
            }
            RecordedActionKind::TurnRight { degrees } => {
                world.turn_right(slot, *degrees);
            }
            RecordedActionKind::MoveForward => {
                world.move_forward(slot);
            }
            RecordedActionKind::MoveBackward => {
                world.move_backward(slot);
            }
            RecordedActionKind::Scan { a_deg, b_deg } => {
                world.scan(slot, *a_deg, *b_deg);
            }
            RecordedActionKind::Shoot => {
                world.shoot(slot);
            }
            RecordedActionKind::Forfeit => {
                world.forfeit(slot);
            }
        }
    }
}

impl From<RecordedAction> for RecordedActionProto {
    fn from(action: RecordedAction) -> Self {
        let (degrees, a_deg, b_deg) = match action.kind {
            RecordedActionKind::TurnLeft { degrees } | RecordedActionKind::TurnRight { degrees } => {
                (degrees, None, None)
            }
            RecordedActionKind::Scan { a_deg, b_deg } => (None, Some(a_deg), Some(b_deg)),
            _ => (None, None, None),
        };
        Self {
            tick: action.tick,
            slot: action.slot,
            kind: action.kind.wire_tag().to_string(),
            degrees,
            a_deg,
            b_deg,
        }
    }
}

impl TryFrom<RecordedActionProto> for RecordedAction {
    type Error = String;

    fn try_from(proto: RecordedActionProto) -> Result<Self, Self::Error> {
        let kind = match proto.kind.as_str() {
            "turnLeft" => RecordedActionKind::TurnLeft {
                degrees: proto.degrees,
            },
            "turnRight" => RecordedActionKind::TurnRight {
                degrees: proto.degrees,
            },
            "moveForward" => RecordedActionKind::MoveForward,
            "moveBackward" => RecordedActionKind::MoveBackward,
            "scan" => RecordedActionKind::Scan {
                a_deg: proto.a_deg.ok_or("scan action missing a_deg")?,
                b_deg: proto.b_deg.ok_or("scan action missing b_deg")?,
            },
            "shoot" => RecordedActionKind::Shoot,
            "forfeit" => RecordedActionKind::Forfeit,
            other => return Err(format!("unknown action kind {other:?}")),
        };
        Ok(Self {
            tick: proto.tick,
            slot: proto.slot,
            kind,
        })
    }
}

// ============================================================================
// Replay recorder
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub seed: u32,
    pub constants: Constants,
    pub players: Vec<(Slot, TankClass)>,
}

/// Build fingerprint data.
#[derive(Debug, Clone)]
pub struct BuildFingerprintData {
    pub binary_sha256: String,
    pub target_triple: String,
    pub profile: String,
    pub git_commit: String,
}

/// Records a match's seed, constants and action-start calls as they happen,
/// for later re-simulation and digest comparison.
pub struct ReplayRecorder {
    config: ReplayConfig,
    actions: Vec<RecordedAction>,
    build_fingerprint: Option<BuildFingerprintData>,
}

impl ReplayRecorder {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            actions: Vec::new(),
            build_fingerprint: None,
        }
    }

    pub fn record_action(&mut self, action: RecordedAction) {
        self.actions.push(action);
    }

    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint);
    }

    pub fn finalize(
        self,
        final_digest: u64,
        checkpoint_tick: TickCount,
        end_reason: &str,
    ) -> ReplayArtifactProto {
        let players = self
            .config
            .players
            .iter()
            .map(|(slot, class)| PlayerSpawnProto {
                slot: slot.clone(),
                tank_type: class.as_str().to_string(),
            })
            .collect();

        let build_fingerprint = self.build_fingerprint.map(|f| BuildFingerprint {
            binary_sha256: f.binary_sha256,
            target_triple: f.target_triple,
            profile: f.profile,
            git_commit: f.git_commit,
        });

        ReplayArtifactProto {
            replay_format_version: REPLAY_FORMAT_VERSION,
            seed: self.config.seed,
            constants: Some(self.config.constants.into()),
            players,
            state_digest_algo_id: STATE_DIGEST_ALGO_ID.to_string(),
            actions: self.actions.into_iter().map(Into::into).collect(),
            build_fingerprint,
            final_digest,
            checkpoint_tick,
            end_reason: end_reason.to_string(),
        }
    }
}

// ============================================================================
// Replay verification
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyError {
    BuildMismatch { expected: String, actual: String },
    UnsupportedFormatVersion { expected: u32, actual: u32 },
    MissingConstants,
    InvalidAction { reason: String },
    CheckpointTickMismatch { expected: TickCount, actual: TickCount },
    FinalDigestMismatch { expected: u64, actual: u64 },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildMismatch { expected, actual } => {
                write!(f, "build fingerprint mismatch: expected {expected}, got {actual}")
            }
            Self::UnsupportedFormatVersion { expected, actual } => {
                write!(f, "unsupported replay format version: expected {expected}, got {actual}")
            }
            Self::MissingConstants => write!(f, "replay artifact is missing its constants"),
            Self::InvalidAction { reason } => write!(f, "invalid recorded action: {reason}"),
            Self::CheckpointTickMismatch { expected, actual } => {
                write!(f, "checkpoint tick mismatch: expected {expected}, got {actual}")
            }
            Self::FinalDigestMismatch { expected, actual } => {
                write!(f, "final digest mismatch: expected {expected:#x}, got {actual:#x}")
            }
        }
    }
}

impl std::error::Error for VerifyError {}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// `true`: mismatched build fingerprints fail verification (CI). `false`:
    /// verification proceeds regardless (local dev replay of an older build).
    pub strict_build_check: bool,
    pub current_build: Option<BuildFingerprintData>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict_build_check: true,
            current_build: None,
        }
    }
}

/// Re-simulates a recorded match from its seed and constants and confirms
/// it reaches the same tick count and the same final state digest.
pub fn verify_replay(artifact: &ReplayArtifactProto, options: &VerifyOptions) -> Result<(), VerifyError> {
    if artifact.replay_format_version != REPLAY_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedFormatVersion {
            expected: REPLAY_FORMAT_VERSION,
            actual: artifact.replay_format_version,
        });
    }

    if let (Some(recorded), Some(current)) = (&artifact.build_fingerprint, &options.current_build) {
        let mismatch = recorded.binary_sha256 != current.binary_sha256
            || recorded.target_triple != current.target_triple
            || recorded.profile != current.profile;
        if mismatch && options.strict_build_check {
            return Err(VerifyError::BuildMismatch {
                expected: recorded.binary_sha256.clone(),
                actual: current.binary_sha256.clone(),
            });
        }
    }

    let constants: Constants = artifact
        .constants
        .clone()
        .ok_or(VerifyError::MissingConstants)?
        .try_into()
        .map_err(|reason: &str| VerifyError::InvalidAction {
            reason: reason.to_string(),
        })?;

    let players: Vec<(Slot, TankClass)> = artifact
        .players
        .iter()
        .map(|p| {
            let class = TankClass::parse(&p.tank_type).ok_or_else(|| VerifyError::InvalidAction {
                reason: format!("unknown tank type {:?}", p.tank_type),
            })?;
            Ok((p.slot.clone(), class))
        })
        .collect::<Result<_, VerifyError>>()?;

    let mut world = World::new(artifact.seed, constants, &players);

    let mut actions: Vec<RecordedAction> = artifact
        .actions
        .iter()
        .cloned()
        .map(|proto| {
            RecordedAction::try_from(proto).map_err(|reason| VerifyError::InvalidAction {
                reason: reason.to_string(),
            })
        })
        .collect::<Result<_, VerifyError>>()?;
    actions.sort_by_key(|a| a.tick);
    let mut next_action = 0;

    while world.tick() < artifact.checkpoint_tick {
        let current_tick = world.tick();
        while next_action < actions.len() && actions[next_action].tick == current_tick {
            let action = &actions[next_action];
            action.kind.apply(&mut world, &action.slot);
            next_action += 1;
        }
        world.step();
    }

    if world.tick() != artifact.checkpoint_tick {
        return Err(VerifyError::CheckpointTickMismatch {
            expected: artifact.checkpoint_tick,
            actual: world.tick(),
        });
    }

    let actual_digest = world.state_digest();
    if actual_digest != artifact.final_digest {
        return Err(VerifyError::FinalDigestMismatch {
            expected: artifact.final_digest,
            actual: actual_digest,
        });
    }

    Ok(())
}

// ============================================================================
// Build fingerprint acquisition
// ============================================================================

/// Acquires the current build's fingerprint by hashing the running
/// executable. Replays recorded under a different binary can still be
/// replayed; `VerifyOptions::strict_build_check` decides whether that is
/// an error.
pub fn acquire_build_fingerprint() -> io::Result<BuildFingerprintData> {
    let exe_path = std::env::current_exe()?;

    let mut file = fs::File::open(&exe_path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let binary_sha256 = format!("{:x}", hasher.finalize());

    let target_triple = target_triple();
    let profile = if cfg!(debug_assertions) { "dev" } else { "release" };
    let git_commit = std::env::var("REDOUBT_GIT_COMMIT").unwrap_or_else(|_| "unknown".to_string());

    Ok(BuildFingerprintData {
        binary_sha256,
        target_triple,
        profile: profile.to_string(),
        git_commit,
    })
}

fn target_triple() -> String {
    #[cfg(target_os = "linux")]
    {
        #[cfg(target_arch = "x86_64")]
        return "x86_64-unknown-linux-gnu".to_string();
        #[cfg(target_arch = "aarch64")]
        return "aarch64-unknown-linux-gnu".to_string();
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        return "unknown-unknown-linux-gnu".to_string();
    }
    #[cfg(target_os = "macos")]
    {
        #[cfg(target_arch = "x86_64")]
        return "x86_64-apple-darwin".to_string();
        #[cfg(target_arch = "aarch64")]
        return "aarch64-apple-darwin".to_string();
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        return "unknown-apple-darwin".to_string();
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "unknown-unknown-unknown".to_string()
    }
}

// ============================================================================
// Replay I/O
// ============================================================================

pub fn write_replay(artifact: &ReplayArtifactProto, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("replay artifact already exists at {}", path.display()),
        ));
    }
    let encoded = artifact.encode_to_vec();
    let mut file = fs::File::create(path)?;
    file.write_all(&encoded)?;
    Ok(())
}

pub fn read_replay(path: &Path) -> io::Result<ReplayArtifactProto> {
    let data = fs::read(path)?;
    ReplayArtifactProto::decode(data.as_slice())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("failed to decode replay: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_config() -> ReplayConfig {
        ReplayConfig {
            seed: 42,
            constants: Constants::default(),
            players: vec![
                ("p1".to_string(), TankClass::Light),
                ("p2".to_string(), TankClass::Heavy),
            ],
        }
    }

    fn record_a_short_match() -> ReplayArtifactProto {
        let config = two_player_config();
        let mut recorder = ReplayRecorder::new(config.clone());
        let mut world = World::new(config.seed, config.constants, &config.players);

        world.move_forward("p1");
        recorder.record_action(RecordedAction {
            tick: world.tick(),
            slot: "p1".to_string(),
            kind: RecordedActionKind::MoveForward,
        });

        for _ in 0..120 {
            world.step();
        }

        world.scan("p2", -45.0, 45.0);
        recorder.record_action(RecordedAction {
            tick: world.tick(),
            slot: "p2".to_string(),
            kind: RecordedActionKind::Scan {
                a_deg: -45.0,
                b_deg: 45.0,
            },
        });

        for _ in 0..60 {
            world.step();
        }

        recorder.finalize(world.state_digest(), world.tick(), "complete")
    }

    #[test]
    fn replay_artifact_has_expected_shape() {
        let artifact = record_a_short_match();
        assert_eq!(artifact.replay_format_version, 1);
        assert!(artifact.constants.is_some());
        assert_eq!(artifact.players.len(), 2);
        assert_eq!(artifact.actions.len(), 2);
        assert_eq!(artifact.checkpoint_tick, 180);
        assert_eq!(artifact.end_reason, "complete");
        assert_eq!(artifact.state_digest_algo_id, STATE_DIGEST_ALGO_ID);
    }

    #[test]
    fn verification_passes_for_an_unmodified_recording() {
        let artifact = record_a_short_match();
        let options = VerifyOptions {
            strict_build_check: false,
            current_build: None,
        };
        let result = verify_replay(&artifact, &options);
        assert!(result.is_ok(), "verification failed: {result:?}");
    }

    #[test]
    fn tampered_final_digest_is_detected() {
        let mut artifact = record_a_short_match();
        artifact.final_digest ^= 0xDEAD_BEEF;
        let options = VerifyOptions {
            strict_build_check: false,
            current_build: None,
        };
        let result = verify_replay(&artifact, &options);
        assert!(matches!(result, Err(VerifyError::FinalDigestMismatch { .. })));
    }

    #[test]
    fn missing_action_changes_the_outcome() {
        let mut artifact = record_a_short_match();
        artifact.actions.clear();
        let options = VerifyOptions {
            strict_build_check: false,
            current_build: None,
        };
        let result = verify_replay(&artifact, &options);
        assert!(matches!(result, Err(VerifyError::FinalDigestMismatch { .. })));
    }

    #[test]
    fn build_mismatch_is_rejected_only_in_strict_mode() {
        let mut artifact = record_a_short_match();
        artifact.build_fingerprint = Some(BuildFingerprint {
            binary_sha256: "aaaa".to_string(),
            target_triple: "x86_64-unknown-linux-gnu".to_string(),
            profile: "release".to_string(),
            git_commit: "deadbeef".to_string(),
        });
        let current = BuildFingerprintData {
            binary_sha256: "bbbb".to_string(),
            target_triple: "x86_64-unknown-linux-gnu".to_string(),
            profile: "release".to_string(),
            git_commit: "deadbeef".to_string(),
        };

        let strict = verify_replay(
            &artifact,
            &VerifyOptions {
                strict_build_check: true,
                current_build: Some(current.clone()),
            },
        );
        assert!(matches!(strict, Err(VerifyError::BuildMismatch { .. })));

        let lenient = verify_replay(
            &artifact,
            &VerifyOptions {
                strict_build_check: false,
                current_build: Some(current),
            },
        );
        assert!(lenient.is_ok());
    }

    #[test]
    fn recorded_action_roundtrips_through_proto() {
        let action = RecordedAction {
            tick: 12,
            slot: "p1".to_string(),
            kind: RecordedActionKind::Scan {
                a_deg: -30.0,
                b_deg: 30.0,
            },
        };
        let proto: RecordedActionProto = action.clone().into();
        let back: RecordedAction = proto.try_into().unwrap();
        assert_eq!(action, back);
    }

    #[test]
    fn write_then_read_replay_roundtrips() {
        let artifact = record_a_short_match();
        let dir = std::env::temp_dir().join(format!(
            "redoubt-replay-test-{}",
            std::process::id()
        ));
        let path = dir.join("match.replay");
        let _ = fs::remove_file(&path);
        write_replay(&artifact, &path).expect("write succeeds");
        let read_back = read_replay(&path).expect("read succeeds");
        assert_eq!(read_back, artifact);
        let _ = fs::remove_file(&path);
    }
}
