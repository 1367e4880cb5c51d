//! Wire protocol types for Redoubt match events.
//!
//! Defines the Protobuf message shapes exchanged with the broadcaster
//! collaborator (§6 of the external-interfaces contract: `matchStart`,
//! `state`, `matchEnd`) plus a build-fingerprint message shared with the
//! replay crate. These are plain data: conversion to/from the simulation
//! core's own types lives in the `From`/`TryFrom` impls below, so the sim
//! crate itself never needs to know Protobuf exists.

#![deny(unsafe_code)]

use prost::Message;
use redoubt_sim::{ProjectileSnapshot, ScanHint, SimEvent, TankClass, TankSnapshot, WorldSnapshot};

#[derive(Clone, PartialEq, Message)]
pub struct ClassStatsProto {
    #[prost(int32, tag = "1")]
    pub hp_max: i32,
    #[prost(double, tag = "2")]
    pub move_speed: f64,
    #[prost(double, tag = "3")]
    pub turn_rate: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConstantsProto {
    #[prost(double, tag = "1")]
    pub arena_width: f64,
    #[prost(double, tag = "2")]
    pub arena_height: f64,
    #[prost(uint32, tag = "3")]
    pub tick_rate_hz: u32,
    #[prost(double, tag = "4")]
    pub action_duration_s: f64,
    #[prost(double, tag = "5")]
    pub scan_range: f64,
    #[prost(double, tag = "6")]
    pub tank_radius: f64,
    #[prost(double, tag = "7")]
    pub projectile_radius: f64,
    #[prost(double, tag = "8")]
    pub projectile_speed: f64,
    #[prost(int32, tag = "9")]
    pub projectile_damage: i32,
    #[prost(message, optional, tag = "10")]
    pub light: Option<ClassStatsProto>,
    #[prost(message, optional, tag = "11")]
    pub heavy: Option<ClassStatsProto>,
    #[prost(uint32, tag = "12")]
    pub snapshot_rate_hz: u32,
    #[prost(double, tag = "13")]
    pub match_time_limit_s: f64,
    #[prost(uint64, tag = "14")]
    pub max_code_size_bytes: u64,
}

/// One entry of the `matchStart` `tanks: { slot -> { tankType, name } }` map.
#[derive(Clone, PartialEq, Message)]
pub struct MatchStartTankProto {
    #[prost(string, tag = "1")]
    pub slot: String,
    #[prost(string, tag = "2")]
    pub tank_type: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MatchStartProto {
    #[prost(uint32, tag = "1")]
    pub seed: u32,
    #[prost(message, optional, tag = "2")]
    pub constants: Option<ConstantsProto>,
    #[prost(message, repeated, tag = "3")]
    pub tanks: Vec<MatchStartTankProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ScanHintProto {
    #[prost(double, tag = "1")]
    pub a_deg: f64,
    #[prost(double, tag = "2")]
    pub b_deg: f64,
    #[prost(bool, tag = "3")]
    pub found: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct TankStateProto {
    #[prost(string, tag = "1")]
    pub slot: String,
    #[prost(double, tag = "2")]
    pub x: f64,
    #[prost(double, tag = "3")]
    pub y: f64,
    #[prost(double, tag = "4")]
    pub heading_deg: f64,
    #[prost(int32, tag = "5")]
    pub hp: i32,
    #[prost(string, tag = "6")]
    pub tank_type: String,
    #[prost(message, optional, tag = "7")]
    pub scan: Option<ScanHintProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProjectileStateProto {
    #[prost(string, tag = "1")]
    pub owner: String,
    #[prost(double, tag = "2")]
    pub x: f64,
    #[prost(double, tag = "3")]
    pub y: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateProto {
    #[prost(double, tag = "1")]
    pub t: f64,
    #[prost(message, repeated, tag = "2")]
    pub tanks: Vec<TankStateProto>,
    #[prost(message, repeated, tag = "3")]
    pub projectiles: Vec<ProjectileStateProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MatchEndProto {
    #[prost(string, optional, tag = "1")]
    pub winner: Option<String>,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(string, optional, tag = "3")]
    pub detail: Option<String>,
}

/// Per-runtime error forfeit notification: an error string and the slot
/// whose tank the orchestrator is about to kill.
#[derive(Clone, PartialEq, Message)]
pub struct RuntimeForfeitProto {
    #[prost(string, tag = "1")]
    pub slot: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

/// Identifies the exact binary that produced a recording, so a verifier can
/// detect it is comparing against a different build than the one that ran
/// the match.
#[derive(Clone, PartialEq, Message)]
pub struct BuildFingerprint {
    #[prost(string, tag = "1")]
    pub binary_sha256: String,
    #[prost(string, tag = "2")]
    pub target_triple: String,
    #[prost(string, tag = "3")]
    pub profile: String,
    #[prost(string, tag = "4")]
    pub git_commit: String,
}

/// One spawned player, in spawn order, for replay reconstruction.
#[derive(Clone, PartialEq, Message)]
pub struct PlayerSpawnProto {
    #[prost(string, tag = "1")]
    pub slot: String,
    #[prost(string, tag = "2")]
    pub tank_type: String,
}

/// One recorded action-start call. `degrees`/`a_deg`/`b_deg` are populated
/// only for the action kinds that use them; unused fields are left at their
/// prost default (`None`/`0.0`) rather than encoded.
#[derive(Clone, PartialEq, Message)]
pub struct RecordedActionProto {
    #[prost(uint64, tag = "1")]
    pub tick: u64,
    #[prost(string, tag = "2")]
    pub slot: String,
    #[prost(string, tag = "3")]
    pub kind: String,
    #[prost(double, optional, tag = "4")]
    pub degrees: Option<f64>,
    #[prost(double, optional, tag = "5")]
    pub a_deg: Option<f64>,
    #[prost(double, optional, tag = "6")]
    pub b_deg: Option<f64>,
}

/// A complete recording of one match: enough to re-simulate it from the
/// same seed and constants and confirm the same final state digest.
#[derive(Clone, PartialEq, Message)]
pub struct ReplayArtifactProto {
    #[prost(uint32, tag = "1")]
    pub replay_format_version: u32,
    #[prost(uint32, tag = "2")]
    pub seed: u32,
    #[prost(message, optional, tag = "3")]
    pub constants: Option<ConstantsProto>,
    #[prost(message, repeated, tag = "4")]
    pub players: Vec<PlayerSpawnProto>,
    #[prost(string, tag = "5")]
    pub state_digest_algo_id: String,
    #[prost(message, repeated, tag = "6")]
    pub actions: Vec<RecordedActionProto>,
    #[prost(message, optional, tag = "7")]
    pub build_fingerprint: Option<BuildFingerprint>,
    #[prost(uint64, tag = "8")]
    pub final_digest: u64,
    #[prost(uint64, tag = "9")]
    pub checkpoint_tick: u64,
    #[prost(string, tag = "10")]
    pub end_reason: String,
}

// ============================================================================
// Conversions between the simulation core's types and wire messages
// ============================================================================

impl From<redoubt_sim::ClassStats> for ClassStatsProto {
    fn from(s: redoubt_sim::ClassStats) -> Self {
        Self {
            hp_max: s.hp_max,
            move_speed: s.move_speed,
            turn_rate: s.turn_rate,
        }
    }
}

impl TryFrom<ClassStatsProto> for redoubt_sim::ClassStats {
    type Error = &'static str;

    fn try_from(s: ClassStatsProto) -> Result<Self, Self::Error> {
        Ok(Self {
            hp_max: s.hp_max,
            move_speed: s.move_speed,
            turn_rate: s.turn_rate,
        })
    }
}

impl From<redoubt_sim::Constants> for ConstantsProto {
    fn from(c: redoubt_sim::Constants) -> Self {
        Self {
            arena_width: c.arena_width,
            arena_height: c.arena_height,
            tick_rate_hz: c.tick_rate_hz,
            action_duration_s: c.action_duration_s,
            scan_range: c.scan_range,
            tank_radius: c.tank_radius,
            projectile_radius: c.projectile_radius,
            projectile_speed: c.projectile_speed,
            projectile_damage: c.projectile_damage,
            light: Some(c.light.into()),
            heavy: Some(c.heavy.into()),
            snapshot_rate_hz: c.snapshot_rate_hz,
            match_time_limit_s: c.match_time_limit_s,
            max_code_size_bytes: c.max_code_size_bytes as u64,
        }
    }
}

impl TryFrom<ConstantsProto> for redoubt_sim::Constants {
    type Error = &'static str;

    fn try_from(c: ConstantsProto) -> Result<Self, Self::Error> {
        Ok(Self {
            arena_width: c.arena_width,
            arena_height: c.arena_height,
            tick_rate_hz: c.tick_rate_hz,
            action_duration_s: c.action_duration_s,
            scan_range: c.scan_range,
            tank_radius: c.tank_radius,
            projectile_radius: c.projectile_radius,
            projectile_speed: c.projectile_speed,
            projectile_damage: c.projectile_damage,
            light: c.light.ok_or("missing light class stats")?.try_into()?,
            heavy: c.heavy.ok_or("missing heavy class stats")?.try_into()?,
            snapshot_rate_hz: c.snapshot_rate_hz,
            match_time_limit_s: c.match_time_limit_s,
            max_code_size_bytes: c.max_code_size_bytes as usize,
        })
    }
}

fn tank_class_str(class: TankClass) -> String {
    class.as_str().to_string()
}

impl From<ScanHint> for ScanHintProto {
    fn from(h: ScanHint) -> Self {
        Self {
            a_deg: h.a_deg,
            b_deg: h.b_deg,
            found: h.found,
        }
    }
}

impl From<TankSnapshot> for TankStateProto {
    fn from(t: TankSnapshot) -> Self {
        Self {
            slot: t.slot,
            x: t.x,
            y: t.y,
            heading_deg: t.heading_deg,
            hp: t.hp,
            tank_type: tank_class_str(t.class),
            scan: t.scan.map(Into::into),
        }
    }
}

impl From<ProjectileSnapshot> for ProjectileStateProto {
    fn from(p: ProjectileSnapshot) -> Self {
        Self {
            owner: p.owner,
            x: p.x,
            y: p.y,
        }
    }
}

impl From<WorldSnapshot> for StateProto {
    fn from(s: WorldSnapshot) -> Self {
        Self {
            t: s.t,
            tanks: s.tanks.into_iter().map(Into::into).collect(),
            projectiles: s.projectiles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Builds the `matchEnd` wire message from a core `MatchEnd` event. Panics
/// if handed a different event variant — callers should match on
/// `SimEvent::MatchEnd` before calling this.
impl From<SimEvent> for MatchEndProto {
    fn from(event: SimEvent) -> Self {
        match event {
            SimEvent::MatchEnd { winner, reason } => Self {
                winner,
                reason: reason.as_str().to_string(),
                detail: None,
            },
            other => panic!("MatchEndProto::from called with non-MatchEnd event: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redoubt_sim::{ClassStats, Constants, MatchEndReason};

    #[test]
    fn constants_roundtrip_through_proto() {
        let constants = Constants::default();
        let proto: ConstantsProto = constants.into();
        let back: Constants = proto.try_into().expect("valid constants roundtrip");
        assert_eq!(back, constants);
    }

    #[test]
    fn class_stats_roundtrip() {
        let stats = ClassStats {
            hp_max: 60,
            move_speed: 160.0,
            turn_rate: 120.0,
        };
        let proto: ClassStatsProto = stats.into();
        let back: ClassStats = proto.try_into().unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn constants_proto_roundtrips_through_bytes() {
        let constants = Constants::default();
        let proto: ConstantsProto = constants.into();
        let bytes = proto.encode_to_vec();
        let decoded = ConstantsProto::decode(bytes.as_slice()).expect("valid protobuf bytes");
        assert_eq!(decoded, proto);
    }

    #[test]
    fn state_proto_carries_scan_hint() {
        let snapshot = WorldSnapshot {
            t: 1.5,
            tanks: vec![TankSnapshot {
                slot: "p1".to_string(),
                x: 10.0,
                y: 20.0,
                heading_deg: 90.0,
                hp: 60,
                class: TankClass::Light,
                scan: Some(ScanHint {
                    a_deg: -30.0,
                    b_deg: 30.0,
                    found: true,
                }),
            }],
            projectiles: vec![],
        };
        let proto: StateProto = snapshot.into();
        assert_eq!(proto.tanks.len(), 1);
        let scan = proto.tanks[0].scan.clone().expect("scan hint present");
        assert!(scan.found);
    }

    #[test]
    fn replay_artifact_proto_roundtrips_through_bytes() {
        let artifact = ReplayArtifactProto {
            replay_format_version: 1,
            seed: 7,
            constants: Some(Constants::default().into()),
            players: vec![PlayerSpawnProto {
                slot: "p1".to_string(),
                tank_type: "light".to_string(),
            }],
            state_digest_algo_id: redoubt_sim::digest::STATE_DIGEST_ALGO_ID.to_string(),
            actions: vec![RecordedActionProto {
                tick: 0,
                slot: "p1".to_string(),
                kind: "moveForward".to_string(),
                degrees: None,
                a_deg: None,
                b_deg: None,
            }],
            build_fingerprint: None,
            final_digest: 123,
            checkpoint_tick: 60,
            end_reason: "hp".to_string(),
        };
        let bytes = artifact.encode_to_vec();
        let decoded = ReplayArtifactProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, artifact);
    }

    #[test]
    fn match_end_proto_reports_winner_and_reason() {
        let event = SimEvent::MatchEnd {
            winner: Some("p1".to_string()),
            reason: MatchEndReason::Hp,
        };
        let proto: MatchEndProto = event.into();
        assert_eq!(proto.winner.as_deref(), Some("p1"));
        assert_eq!(proto.reason, "hp");
    }

    #[test]
    #[should_panic]
    fn match_end_proto_rejects_non_match_end_events() {
        let _: MatchEndProto = SimEvent::Hit {
            projectile_id: 1,
            owner: "p1".to_string(),
            target: "p2".to_string(),
            damage: 20,
        }
        .into();
    }
}
