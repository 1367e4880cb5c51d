#![deny(unsafe_code)]
//! Deterministic fixed-timestep simulation core for a programmable-tank
//! arena match: world state, the timed-action busy-window model, scan
//! geometry, projectile motion and collision, and match termination.
//!
//! This crate is intentionally dependency-free: nothing in a transitive
//! dependency graph should be able to perturb the bit-exact determinism
//! the rest of the system (replay verification, cross-run parity) relies
//! on.

pub mod digest;
pub mod geometry;
pub mod prng;

use std::collections::BTreeMap;

use digest::{canonicalize_f64, Fnv1a64};
use prng::Mulberry32;

/// Stable per-match slot identifier, e.g. `"p1"`, `"p2"`.
pub type Slot = String;
pub type ProjectileId = u64;
/// Number of completed `step` calls since match start.
pub type TickCount = u64;

/// Idleness tolerance absorbing floating-point accumulation across many
/// tick increments: a tank is considered idle once `t >= busy_until - eps`.
pub const IDLE_EPS: f64 = 1e-9;

/// Player-chosen tank category; selects a row of derived stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TankClass {
    Light,
    Heavy,
}

impl TankClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TankClass::Light => "light",
            TankClass::Heavy => "heavy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(TankClass::Light),
            "heavy" => Some(TankClass::Heavy),
            _ => None,
        }
    }
}

/// Derived stats for a tank class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassStats {
    pub hp_max: i32,
    pub move_speed: f64,
    pub turn_rate: f64,
}

/// Frozen per-match constants snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constants {
    pub arena_width: f64,
    pub arena_height: f64,
    pub tick_rate_hz: u32,
    pub action_duration_s: f64,
    pub scan_range: f64,
    pub tank_radius: f64,
    pub projectile_radius: f64,
    pub projectile_speed: f64,
    pub projectile_damage: i32,
    pub light: ClassStats,
    pub heavy: ClassStats,
    pub snapshot_rate_hz: u32,
    pub match_time_limit_s: f64,
    pub max_code_size_bytes: usize,
}

impl Constants {
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate_hz as f64
    }

    pub fn stats_for(&self, class: TankClass) -> ClassStats {
        match class {
            TankClass::Light => self.light,
            TankClass::Heavy => self.heavy,
        }
    }

    /// Number of ticks between snapshots, `round(tickRate / snapshotRate)`.
    pub fn ticks_per_snapshot(&self) -> u64 {
        (self.tick_rate_hz as f64 / self.snapshot_rate_hz as f64).round() as u64
    }
}

impl Default for Constants {
    /// Canonical values from the external-interfaces contract. The heavy
    /// class's move speed is the one open question (source documents
    /// disagreed between 60 and 100); 60 is the default here, meant to be
    /// overridden by constructing a non-default `Constants` where a
    /// deployment wants the other value.
    fn default() -> Self {
        Self {
            arena_width: 1200.0,
            arena_height: 800.0,
            tick_rate_hz: 60,
            action_duration_s: 1.0,
            scan_range: 700.0,
            tank_radius: 18.0,
            projectile_radius: 4.0,
            projectile_speed: 420.0,
            projectile_damage: 20,
            light: ClassStats {
                hp_max: 60,
                move_speed: 160.0,
                turn_rate: 120.0,
            },
            heavy: ClassStats {
                hp_max: 120,
                move_speed: 60.0,
                turn_rate: 90.0,
            },
            snapshot_rate_hz: 20,
            match_time_limit_s: 180.0,
            max_code_size_bytes: 50 * 1024,
        }
    }
}

/// What a tank is doing during its busy window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionKind {
    TurnLeft,
    TurnRight,
    MoveForward,
    MoveBackward,
    Scan,
}

/// A tank's active timed action and any parameters it needs while busy.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveAction {
    TurnLeft,
    TurnRight,
    MoveForward,
    MoveBackward,
    Scan { a_deg: f64, b_deg: f64 },
}

impl ActiveAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActiveAction::TurnLeft => ActionKind::TurnLeft,
            ActiveAction::TurnRight => ActionKind::TurnRight,
            ActiveAction::MoveForward => ActionKind::MoveForward,
            ActiveAction::MoveBackward => ActionKind::MoveBackward,
            ActiveAction::Scan { .. } => ActionKind::Scan,
        }
    }
}

/// One tank, one per participating slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Tank {
    pub slot: Slot,
    pub class: TankClass,
    pub position: [f64; 2],
    /// Degrees, `0 = +x`, grows clockwise, normalized to `[0, 360)`.
    pub heading_deg: f64,
    pub hp: i32,
    pub hp_max: i32,
    pub move_speed: f64,
    pub turn_rate: f64,
    /// Simulated time at which the current timed action completes. Zero
    /// while idle.
    pub busy_until: f64,
    pub active_action: Option<ActiveAction>,
    pub active_projectile_id: Option<ProjectileId>,
    pub last_scan_result: bool,
}

impl Tank {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn is_idle(&self, t: f64) -> bool {
        t >= self.busy_until - IDLE_EPS
    }
}

/// A single in-flight shot.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: ProjectileId,
    pub owner: Slot,
    pub position: [f64; 2],
    pub velocity: [f64; 2],
}

/// Why a projectile left the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DespawnReason {
    OutOfBounds,
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEndReason {
    Hp,
    DoubleKo,
    Timeout,
    Aborted,
    Forfeit,
    Error,
}

impl MatchEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchEndReason::Hp => "hp",
            MatchEndReason::DoubleKo => "double_ko",
            MatchEndReason::Timeout => "timeout",
            MatchEndReason::Aborted => "aborted",
            MatchEndReason::Forfeit => "forfeit",
            MatchEndReason::Error => "error",
        }
    }
}

/// One event emitted by a tick, in the order `step` produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    ActionComplete {
        slot: Slot,
        action: ActionKind,
        scan_result: Option<bool>,
    },
    Hit {
        projectile_id: ProjectileId,
        owner: Slot,
        target: Slot,
        damage: i32,
    },
    Despawn {
        projectile_id: ProjectileId,
        owner: Slot,
        reason: DespawnReason,
    },
    MatchEnd {
        winner: Option<Slot>,
        reason: MatchEndReason,
    },
}

/// A read-only rendering of a live scan's parameters and live outcome,
/// recomputed at snapshot time rather than cached from action start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanHint {
    pub a_deg: f64,
    pub b_deg: f64,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TankSnapshot {
    pub slot: Slot,
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub hp: i32,
    pub class: TankClass,
    pub scan: Option<ScanHint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileSnapshot {
    pub owner: Slot,
    pub x: f64,
    pub y: f64,
}

/// A read-only summary of world state for external rendering, at the
/// throttled snapshot rate described in the external interfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub t: f64,
    pub tanks: Vec<TankSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
}

/// The authoritative, single-writer simulation state for one match.
pub struct World {
    tick_count: TickCount,
    seed: u32,
    constants: Constants,
    rng: Mulberry32,
    tanks: BTreeMap<Slot, Tank>,
    projectiles: BTreeMap<ProjectileId, Projectile>,
    next_projectile_id: ProjectileId,
}

impl World {
    /// Spawns tanks evenly on a ring around the arena center, with a
    /// random rotational offset drawn once from the freshly seeded PRNG.
    /// `players` order determines ring position order; iteration over
    /// tanks afterward is by slot (BTreeMap), not spawn order.
    pub fn new(seed: u32, constants: Constants, players: &[(Slot, TankClass)]) -> Self {
        let mut rng = Mulberry32::new(seed);
        let offset_deg = rng.next_f64() * 360.0;
        let center = [constants.arena_width / 2.0, constants.arena_height / 2.0];
        let radius = 0.55 * constants.arena_width.min(constants.arena_height) / 2.0;
        let n = players.len().max(1);

        let mut tanks = BTreeMap::new();
        for (i, (slot, class)) in players.iter().enumerate() {
            let angle_deg = offset_deg + (i as f64) * (360.0 / n as f64);
            let rad = angle_deg.to_radians();
            let position = [
                center[0] + radius * rad.cos(),
                center[1] + radius * rad.sin(),
            ];
            let heading_deg = geometry::normalize_deg(angle_deg + 180.0);
            let stats = constants.stats_for(*class);
            tanks.insert(
                slot.clone(),
                Tank {
                    slot: slot.clone(),
                    class: *class,
                    position,
                    heading_deg,
                    hp: stats.hp_max,
                    hp_max: stats.hp_max,
                    move_speed: stats.move_speed,
                    turn_rate: stats.turn_rate,
                    busy_until: 0.0,
                    active_action: None,
                    active_projectile_id: None,
                    last_scan_result: false,
                },
            );
        }

        Self {
            tick_count: 0,
            seed,
            constants,
            rng,
            tanks,
            projectiles: BTreeMap::new(),
            next_projectile_id: 1,
        }
    }

    pub fn tick(&self) -> TickCount {
        self.tick_count
    }

    /// Simulated time, derived from the tick counter rather than
    /// accumulated, so it can never drift from invariant I6.
    pub fn t(&self) -> f64 {
        self.tick_count as f64 * self.constants.dt()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn tank(&self, slot: &str) -> Option<&Tank> {
        self.tanks.get(slot)
    }

    pub fn tanks(&self) -> &BTreeMap<Slot, Tank> {
        &self.tanks
    }

    pub fn projectiles(&self) -> &BTreeMap<ProjectileId, Projectile> {
        &self.projectiles
    }

    pub fn alive_slots(&self) -> Vec<&Slot> {
        self.tanks
            .values()
            .filter(|t| t.is_alive())
            .map(|t| &t.slot)
            .collect()
    }

    /// Exposed to player programs as `random()`.
    pub fn random(&mut self) -> f64 {
        self.rng.next_f64()
    }

    /// Death-handling write available to the orchestrator: kills a tank
    /// outside the normal tick flow (runtime forfeit). `step` will observe
    /// the hp drop and surface match-end naturally on the next call.
    pub fn forfeit(&mut self, slot: &str) {
        if let Some(tank) = self.tanks.get_mut(slot) {
            tank.hp = 0;
            tank.active_action = None;
        }
    }

    // --- Action starters (component D) ---

    pub fn turn_left(&mut self, slot: &str, degrees: Option<f64>) -> bool {
        self.start_turn(slot, degrees, ActiveAction::TurnLeft)
    }

    pub fn turn_right(&mut self, slot: &str, degrees: Option<f64>) -> bool {
        self.start_turn(slot, degrees, ActiveAction::TurnRight)
    }

    fn start_turn(&mut self, slot: &str, degrees: Option<f64>, action: ActiveAction) -> bool {
        let t = self.t();
        let turn_rate = match self.tanks.get(slot) {
            Some(tank) => tank.turn_rate,
            None => return false,
        };
        let duration = match degrees {
            Some(deg) if turn_rate > 0.0 => deg.abs() / turn_rate,
            _ => self.constants.action_duration_s,
        };
        self.start_action(slot, t, duration, action)
    }

    pub fn move_forward(&mut self, slot: &str) -> bool {
        let t = self.t();
        self.start_action(slot, t, self.constants.action_duration_s, ActiveAction::MoveForward)
    }

    pub fn move_backward(&mut self, slot: &str) -> bool {
        let t = self.t();
        self.start_action(slot, t, self.constants.action_duration_s, ActiveAction::MoveBackward)
    }

    pub fn scan(&mut self, slot: &str, a_deg: f64, b_deg: f64) -> bool {
        let t = self.t();
        self.start_action(
            slot,
            t,
            self.constants.action_duration_s,
            ActiveAction::Scan { a_deg, b_deg },
        )
    }

    fn start_action(&mut self, slot: &str, t: f64, duration: f64, action: ActiveAction) -> bool {
        let Some(tank) = self.tanks.get_mut(slot) else {
            return false;
        };
        if !tank.is_alive() || !tank.is_idle(t) {
            return false;
        }
        tank.busy_until = t + duration;
        tank.active_action = Some(action);
        true
    }

    /// Instant action. Fails if a projectile from this slot is already
    /// live (one-shot-at-a-time).
    pub fn shoot(&mut self, slot: &str) -> bool {
        let Some(tank) = self.tanks.get(slot) else {
            return false;
        };
        if !tank.is_alive() || tank.active_projectile_id.is_some() {
            return false;
        }
        let offset = self.constants.tank_radius + self.constants.projectile_radius + 1.0;
        let rad = tank.heading_deg.to_radians();
        let spawn = [
            tank.position[0] + rad.cos() * offset,
            tank.position[1] + rad.sin() * offset,
        ];
        let velocity = [
            rad.cos() * self.constants.projectile_speed,
            rad.sin() * self.constants.projectile_speed,
        ];
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        self.projectiles.insert(
            id,
            Projectile {
                id,
                owner: slot.to_string(),
                position: spawn,
                velocity,
            },
        );
        self.tanks.get_mut(slot).expect("checked above").active_projectile_id = Some(id);
        true
    }

    // --- Step function (component F), canonical tick order ---

    pub fn step(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();
        self.apply_actions(&mut events);
        self.advance_projectiles();
        self.despawn_out_of_bounds(&mut events);
        self.detect_hits(&mut events);
        self.tick_count += 1;
        if let Some(end) = self.check_match_end() {
            events.push(end);
        }
        self.debug_check_invariants();
        events
    }

    /// Component E: per-tick action applicator.
    fn apply_actions(&mut self, events: &mut Vec<SimEvent>) {
        let dt = self.constants.dt();
        let t_next = self.t() + dt;
        let scan_range = self.constants.scan_range;
        let tank_radius = self.constants.tank_radius;
        let arena = (self.constants.arena_width, self.constants.arena_height);

        let slots: Vec<Slot> = self.tanks.keys().cloned().collect();
        for slot in slots {
            let Some(mut tank) = self.tanks.remove(&slot) else {
                continue;
            };
            if tank.is_alive() {
                if let Some(action) = tank.active_action.clone() {
                    match &action {
                        ActiveAction::TurnLeft => {
                            tank.heading_deg = geometry::normalize_deg(tank.heading_deg - tank.turn_rate * dt);
                        }
                        ActiveAction::TurnRight => {
                            tank.heading_deg = geometry::normalize_deg(tank.heading_deg + tank.turn_rate * dt);
                        }
                        ActiveAction::MoveForward => apply_move(&mut tank, 1.0, dt, tank_radius, arena),
                        ActiveAction::MoveBackward => apply_move(&mut tank, -1.0, dt, tank_radius, arena),
                        ActiveAction::Scan { .. } => {}
                    }

                    if t_next >= tank.busy_until - IDLE_EPS {
                        let scan_result = if let ActiveAction::Scan { a_deg, b_deg } = &action {
                            let found = self.tanks.values().any(|other| {
                                other.is_alive()
                                    && geometry::is_in_scan_arc(
                                        tank.position,
                                        tank.heading_deg,
                                        other.position,
                                        *a_deg,
                                        *b_deg,
                                        scan_range,
                                    )
                            });
                            tank.last_scan_result = found;
                            Some(found)
                        } else {
                            None
                        };
                        events.push(SimEvent::ActionComplete {
                            slot: slot.clone(),
                            action: action.kind(),
                            scan_result,
                        });
                        tank.active_action = None;
                    }
                }
            }
            self.tanks.insert(slot, tank);
        }
    }

    fn advance_projectiles(&mut self) {
        let dt = self.constants.dt();
        for projectile in self.projectiles.values_mut() {
            projectile.position[0] += projectile.velocity[0] * dt;
            projectile.position[1] += projectile.velocity[1] * dt;
        }
    }

    fn despawn_out_of_bounds(&mut self, events: &mut Vec<SimEvent>) {
        let r = self.constants.projectile_radius;
        let (w, h) = (self.constants.arena_width, self.constants.arena_height);
        let out_of_bounds: Vec<ProjectileId> = self
            .projectiles
            .iter()
            .filter(|(_, p)| {
                p.position[0] < -r || p.position[0] > w + r || p.position[1] < -r || p.position[1] > h + r
            })
            .map(|(id, _)| *id)
            .collect();

        for id in out_of_bounds {
            let projectile = self.projectiles.remove(&id).expect("id came from this map");
            if let Some(tank) = self.tanks.get_mut(&projectile.owner) {
                if tank.active_projectile_id == Some(id) {
                    tank.active_projectile_id = None;
                }
            }
            events.push(SimEvent::Despawn {
                projectile_id: id,
                owner: projectile.owner,
                reason: DespawnReason::OutOfBounds,
            });
        }
    }

    fn detect_hits(&mut self, events: &mut Vec<SimEvent>) {
        let hit_radius_sq = {
            let r = self.constants.projectile_radius + self.constants.tank_radius;
            r * r
        };
        let damage = self.constants.projectile_damage;
        let projectile_ids: Vec<ProjectileId> = self.projectiles.keys().cloned().collect();

        for id in projectile_ids {
            let Some(projectile) = self.projectiles.get(&id) else {
                continue;
            };
            let (position, owner) = (projectile.position, projectile.owner.clone());

            let target = self.tanks.iter().find_map(|(slot, tank)| {
                if *slot == owner || !tank.is_alive() {
                    return None;
                }
                let dx = tank.position[0] - position[0];
                let dy = tank.position[1] - position[1];
                (dx * dx + dy * dy <= hit_radius_sq).then(|| slot.clone())
            });

            if let Some(target) = target {
                self.projectiles.remove(&id);
                if let Some(tank) = self.tanks.get_mut(&owner) {
                    if tank.active_projectile_id == Some(id) {
                        tank.active_projectile_id = None;
                    }
                }
                let tank = self.tanks.get_mut(&target).expect("target slot exists");
                tank.hp = (tank.hp - damage).max(0);
                events.push(SimEvent::Hit {
                    projectile_id: id,
                    owner,
                    target,
                    damage,
                });
            }
        }
    }

    fn check_match_end(&self) -> Option<SimEvent> {
        let alive: Vec<&Tank> = self.tanks.values().filter(|t| t.is_alive()).collect();
        if alive.len() <= 1 {
            let winner = alive.first().map(|t| t.slot.clone());
            let reason = if alive.len() == 1 { MatchEndReason::Hp } else { MatchEndReason::DoubleKo };
            return Some(SimEvent::MatchEnd { winner, reason });
        }
        if self.t() >= self.constants.match_time_limit_s {
            let mut sorted = alive;
            sorted.sort_by(|a, b| b.hp.cmp(&a.hp));
            let winner = if sorted[0].hp > sorted[1].hp {
                Some(sorted[0].slot.clone())
            } else {
                None
            };
            return Some(SimEvent::MatchEnd {
                winner,
                reason: MatchEndReason::Timeout,
            });
        }
        None
    }

    fn debug_check_invariants(&self) {
        debug_assert!(self.tanks.values().all(|t| {
            !t.is_alive() || (t.busy_until >= self.t() - IDLE_EPS) == t.active_action.is_some()
        }));
        debug_assert!(self.tanks.values().all(|t| (0.0..360.0).contains(&t.heading_deg)));
        debug_assert!(self.tanks.values().all(|t| {
            !t.is_alive()
                || (self.constants.tank_radius - IDLE_EPS <= t.position[0]
                    && t.position[0] <= self.constants.arena_width - self.constants.tank_radius + IDLE_EPS)
        }));
    }

    /// Read-only summary of world state for external rendering, at the
    /// throttled snapshot rate described in the external interfaces.
    pub fn snapshot(&self) -> WorldSnapshot {
        let scan_range = self.constants.scan_range;
        let tanks = self
            .tanks
            .values()
            .map(|tank| {
                let scan = match &tank.active_action {
                    Some(ActiveAction::Scan { a_deg, b_deg }) => {
                        let found = self.tanks.values().any(|other| {
                            other.slot != tank.slot
                                && other.is_alive()
                                && geometry::is_in_scan_arc(
                                    tank.position,
                                    tank.heading_deg,
                                    other.position,
                                    *a_deg,
                                    *b_deg,
                                    scan_range,
                                )
                        });
                        Some(ScanHint {
                            a_deg: *a_deg,
                            b_deg: *b_deg,
                            found,
                        })
                    }
                    _ => None,
                };
                TankSnapshot {
                    slot: tank.slot.clone(),
                    x: tank.position[0],
                    y: tank.position[1],
                    heading_deg: tank.heading_deg,
                    hp: tank.hp,
                    class: tank.class,
                    scan,
                }
            })
            .collect();
        let projectiles = self
            .projectiles
            .values()
            .map(|p| ProjectileSnapshot {
                owner: p.owner.clone(),
                x: p.position[0],
                y: p.position[1],
            })
            .collect();
        WorldSnapshot {
            t: self.t(),
            tanks,
            projectiles,
        }
    }

    /// Deterministic digest of the current state, for replay verification.
    pub fn state_digest(&self) -> u64 {
        let mut hasher = Fnv1a64::new();
        hasher.update(&self.tick_count.to_le_bytes());
        for (slot, tank) in self.tanks.iter() {
            hasher.update(slot.as_bytes());
            hasher.update(&canonicalize_f64(tank.position[0]).to_le_bytes());
            hasher.update(&canonicalize_f64(tank.position[1]).to_le_bytes());
            hasher.update(&canonicalize_f64(tank.heading_deg).to_le_bytes());
            hasher.update(&(tank.hp as i64).to_le_bytes());
            hasher.update(&canonicalize_f64(tank.busy_until).to_le_bytes());
        }
        for (id, projectile) in self.projectiles.iter() {
            hasher.update(&id.to_le_bytes());
            hasher.update(&canonicalize_f64(projectile.position[0]).to_le_bytes());
            hasher.update(&canonicalize_f64(projectile.position[1]).to_le_bytes());
            hasher.update(&canonicalize_f64(projectile.velocity[0]).to_le_bytes());
            hasher.update(&canonicalize_f64(projectile.velocity[1]).to_le_bytes());
        }
        hasher.finish()
    }
}

fn apply_move(tank: &mut Tank, sign: f64, dt: f64, tank_radius: f64, arena: (f64, f64)) {
    let rad = tank.heading_deg.to_radians();
    tank.position[0] += sign * rad.cos() * tank.move_speed * dt;
    tank.position[1] += sign * rad.sin() * tank.move_speed * dt;
    tank.position[0] = tank.position[0].clamp(tank_radius, arena.0 - tank_radius);
    tank.position[1] = tank.position[1].clamp(tank_radius, arena.1 - tank_radius);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_world() -> World {
        World::new(
            1,
            Constants::default(),
            &[("p1".to_string(), TankClass::Light), ("p2".to_string(), TankClass::Heavy)],
        )
    }

    #[test]
    fn world_starts_at_tick_zero() {
        let world = two_player_world();
        assert_eq!(world.tick(), 0);
        assert_eq!(world.t(), 0.0);
    }

    #[test]
    fn spawned_tanks_face_the_arena_center() {
        let world = two_player_world();
        let constants = Constants::default();
        let center = [constants.arena_width / 2.0, constants.arena_height / 2.0];
        for tank in world.tanks().values() {
            let to_center = [center[0] - tank.position[0], center[1] - tank.position[1]];
            let expected_heading = geometry::normalize_deg(to_center[1].atan2(to_center[0]).to_degrees());
            assert!((tank.heading_deg - expected_heading).abs() < 1e-6);
        }
    }

    #[test]
    fn spawn_positions_are_within_the_arena() {
        let world = two_player_world();
        let constants = Constants::default();
        for tank in world.tanks().values() {
            assert!(tank.position[0] >= 0.0 && tank.position[0] <= constants.arena_width);
            assert!(tank.position[1] >= 0.0 && tank.position[1] <= constants.arena_height);
        }
    }

    #[test]
    fn determinism_same_seed_same_actions_same_trajectory() {
        let make = || {
            let mut world = two_player_world();
            world.move_forward("p1");
            world
        };
        let mut a = make();
        let mut b = make();
        for _ in 0..120 {
            assert_eq!(a.step(), b.step());
            assert_eq!(a.state_digest(), b.state_digest());
        }
    }

    #[test]
    fn scenario_forward_move_covers_exact_distance() {
        let mut world = World::new(5, Constants::default(), &[("p1".to_string(), TankClass::Light)]);
        {
            let tank = world.tanks.get_mut("p1").unwrap();
            tank.position = [100.0, 100.0];
            tank.heading_deg = 0.0;
        }
        assert!(world.move_forward("p1"));
        for _ in 0..60 {
            world.step();
        }
        let tank = world.tank("p1").unwrap();
        assert!((tank.position[0] - 260.0).abs() < 1e-9, "x = {}", tank.position[0]);
        assert!((tank.position[1] - 100.0).abs() < 1e-9, "y = {}", tank.position[1]);
        assert_eq!(tank.heading_deg, 0.0);
        assert!(tank.active_action.is_none());
    }

    #[test]
    fn scenario_scan_directly_ahead_detects_opponent() {
        let mut world = World::new(
            9,
            Constants::default(),
            &[("p1".to_string(), TankClass::Light), ("p2".to_string(), TankClass::Light)],
        );
        {
            let p1 = world.tanks.get_mut("p1").unwrap();
            p1.position = [100.0, 100.0];
            p1.heading_deg = 0.0;
        }
        world.tanks.get_mut("p2").unwrap().position = [200.0, 100.0];
        assert!(world.scan("p1", -30.0, 30.0));
        let mut events = Vec::new();
        for _ in 0..60 {
            events = world.step();
        }
        let completion = events
            .into_iter()
            .find(|e| matches!(e, SimEvent::ActionComplete { slot, .. } if slot == "p1"))
            .expect("expected a completion event on the final tick");
        match completion {
            SimEvent::ActionComplete { scan_result, .. } => assert_eq!(scan_result, Some(true)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn scenario_one_shot_rule() {
        let mut world = two_player_world();
        assert!(world.shoot("p1"));
        assert!(world.tank("p1").unwrap().active_projectile_id.is_some());
        assert!(!world.shoot("p1"));

        loop {
            let events = world.step();
            if events.iter().any(|e| matches!(e, SimEvent::Despawn { owner, .. } if owner == "p1")) {
                break;
            }
            if world.tick() > 10_000 {
                panic!("projectile never despawned");
            }
        }
        assert!(world.tank("p1").unwrap().active_projectile_id.is_none());
        assert!(world.shoot("p1"));
    }

    #[test]
    fn shoot_fails_while_a_projectile_is_live() {
        let mut world = two_player_world();
        assert!(world.shoot("p1"));
        assert!(!world.shoot("p1"));
        assert_eq!(world.projectiles().len(), 1);
    }

    #[test]
    fn hit_detection_consumes_the_projectile_and_damages_the_target() {
        let mut world = World::new(
            3,
            Constants::default(),
            &[("p1".to_string(), TankClass::Light), ("p2".to_string(), TankClass::Light)],
        );
        {
            let p1 = world.tanks.get_mut("p1").unwrap();
            p1.position = [100.0, 100.0];
            p1.heading_deg = 0.0;
        }
        world.tanks.get_mut("p2").unwrap().position = [150.0, 100.0];
        assert!(world.shoot("p1"));
        let mut hit = None;
        for _ in 0..200 {
            for event in world.step() {
                if let SimEvent::Hit { target, damage, .. } = event {
                    hit = Some((target, damage));
                }
            }
            if hit.is_some() {
                break;
            }
        }
        let (target, damage) = hit.expect("expected a hit");
        assert_eq!(target, "p2");
        assert_eq!(damage, Constants::default().projectile_damage);
        assert_eq!(world.tank("p2").unwrap().hp, Constants::default().light.hp_max - damage);
    }

    #[test]
    fn match_ends_with_single_survivor() {
        let mut world = two_player_world();
        world.forfeit("p2");
        let events = world.step();
        let end = events.iter().find(|e| matches!(e, SimEvent::MatchEnd { .. }));
        match end {
            Some(SimEvent::MatchEnd { winner, reason }) => {
                assert_eq!(winner.as_deref(), Some("p1"));
                assert_eq!(*reason, MatchEndReason::Hp);
            }
            _ => panic!("expected match end"),
        }
    }

    #[test]
    fn match_ends_double_ko_when_both_die_same_tick() {
        let mut world = two_player_world();
        world.forfeit("p1");
        world.forfeit("p2");
        let events = world.step();
        let end = events.iter().find(|e| matches!(e, SimEvent::MatchEnd { .. }));
        match end {
            Some(SimEvent::MatchEnd { winner, reason }) => {
                assert!(winner.is_none());
                assert_eq!(*reason, MatchEndReason::DoubleKo);
            }
            _ => panic!("expected match end"),
        }
    }

    #[test]
    fn busy_tank_rejects_a_second_action() {
        let mut world = two_player_world();
        assert!(world.move_forward("p1"));
        assert!(!world.turn_left("p1", None));
        assert!(!world.scan("p1", 0.0, 10.0));
    }

    #[test]
    fn turn_with_explicit_degrees_rescales_duration() {
        let mut world = two_player_world();
        let turn_rate = world.tank("p1").unwrap().turn_rate;
        assert!(world.turn_left("p1", Some(turn_rate / 2.0)));
        let busy_until = world.tank("p1").unwrap().busy_until;
        assert!((busy_until - 0.5).abs() < 1e-9);
    }

    #[test]
    fn heading_stays_normalized_across_many_turns() {
        let mut world = two_player_world();
        for _ in 0..10 {
            world.turn_left("p1", None);
            for _ in 0..60 {
                world.step();
            }
        }
        let heading = world.tank("p1").unwrap().heading_deg;
        assert!((0.0..360.0).contains(&heading));
    }

    #[test]
    fn dead_tank_pose_is_quiescent() {
        let mut world = two_player_world();
        assert!(world.move_forward("p1"));
        world.forfeit("p1");
        let pos_before = world.tank("p1").unwrap().position;
        for _ in 0..30 {
            world.step();
        }
        assert_eq!(world.tank("p1").unwrap().position, pos_before);
    }
}
