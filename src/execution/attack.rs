//! Land Attacks
//!
//! An attack conquers border tiles of its target every tick. The number of
//! tiles per tick is bounded by a budget from [`attack_tiles_per_tick`];
//! each conquered tile costs troops as computed by [`attack_logic`].

use std::collections::BTreeSet;

use tracing::debug;

use crate::core::math::floor_u64;
use crate::core::DeterministicRng;
use crate::execution::{ExecutionBehavior, ExecutionQueue};
use crate::game::attack::{AttackId, Owner};
use crate::game::formulas::{attack_logic, attack_tiles_per_tick, Attacker, Defender, TileConditions};
use crate::game::map::TileRef;
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::world::World;

/// Relation penalty the target applies to an attacker.
const ATTACK_RELATION_PENALTY: i32 = -80;

/// Land attack against a player or unclaimed land.
#[derive(Debug)]
pub struct AttackExecution {
    attacker: SmallId,
    target: Owner,
    start_troops: Option<u64>,
    source_tile: Option<TileRef>,
    remove_troops: bool,
    attack: Option<AttackId>,
    // (priority, tile), lowest first.
    to_conquer: BTreeSet<(i64, TileRef)>,
    rng: DeterministicRng,
    active: bool,
}

impl AttackExecution {
    /// Attack ordered by a player. `troops: None` commits a fifth of the
    /// attacker's troops.
    pub fn new(attacker: SmallId, target: Owner, troops: Option<u64>) -> Self {
        Self {
            attacker,
            target,
            start_troops: troops,
            source_tile: None,
            remove_troops: true,
            attack: None,
            to_conquer: BTreeSet::new(),
            rng: DeterministicRng::new(0),
            active: true,
        }
    }

    /// Attack started by a landing boat; its troops were already embarked.
    pub fn from_landing(attacker: SmallId, target: Owner, troops: u64, landing: TileRef) -> Self {
        Self {
            source_tile: Some(landing),
            remove_troops: false,
            ..Self::new(attacker, target, Some(troops))
        }
    }

    /// Attack state id, once started.
    pub fn attack_id(&self) -> Option<AttackId> {
        self.attack
    }

    fn finish(&mut self, world: &mut World, refund: bool) {
        self.active = false;
        let Some(id) = self.attack else {
            return;
        };
        let troops = world.attack(id).filter(|a| a.active).map(|a| a.troops).unwrap_or(0);
        if refund {
            if let Some(p) = world.player_mut(self.attacker) {
                p.troops += troops;
            }
        }
        if let Some(a) = world.attack_mut(id) {
            a.retreated = refund;
        }
        world.delete_attack(id);
    }

    fn add_neighbors(&mut self, world: &World, tile: TileRef) {
        let target = self.target.small_id();
        for n in world.map().neighbors(tile) {
            if world.owner_id(n) == target && world.map().is_land(n) {
                self.push(world, n);
            }
        }
    }

    fn push(&mut self, world: &World, tile: TileRef) {
        let owned = world
            .map()
            .neighbors(tile)
            .filter(|&n| world.owner_id(n) == self.attacker)
            .count() as i64;
        let priority = world.ticks() as i64 + self.rng.next_int(7) as i64 - 2 * owned;
        self.to_conquer.insert((priority, tile));
    }

    fn refresh_border(&mut self, world: &World) {
        self.to_conquer.clear();
        let Some(p) = world.player(self.attacker) else {
            return;
        };
        let tiles: Vec<TileRef> = p.tiles.iter().copied().collect();
        for tile in tiles {
            self.add_neighbors(world, tile);
        }
    }

    fn defender(&self, world: &World) -> Defender {
        match self.target.player().and_then(|t| world.player(t)) {
            Some(p) => Defender::Player {
                player_type: p.player_type(),
                troops: p.troops as f64,
                population: p.population() as f64,
                tiles_owned: p.num_tiles_owned(),
                is_traitor: p.is_traitor(),
            },
            None => Defender::Unclaimed,
        }
    }
}

impl ExecutionBehavior for AttackExecution {
    fn init(&mut self, world: &mut World) -> Result<(), TickError> {
        let Some(attacker) = world.player(self.attacker) else {
            return Err(TickError::PlayerNotFound(self.attacker));
        };
        if let Owner::Player(target) = self.target {
            if world.player(target).is_none() || world.is_friendly(self.attacker, target) {
                debug!(attacker = self.attacker, target, "attack on friendly or unknown player ignored");
                self.active = false;
                return Ok(());
            }
        }

        let mut troops = self.start_troops.unwrap_or(attacker.troops / 5);
        if self.remove_troops {
            troops = world
                .player_mut(self.attacker)
                .map(|p| p.remove_troops(troops))
                .unwrap_or(0);
        }

        // Incoming attacks from the target absorb troops first.
        if let Owner::Player(target) = self.target {
            let incoming = world.player(self.attacker).map(|p| p.incoming_attacks.clone()).unwrap_or_default();
            for id in incoming {
                let Some(counter) = world.attack(id).filter(|a| a.active && a.attacker == target) else {
                    continue;
                };
                if counter.troops > troops {
                    if let Some(a) = world.attack_mut(id) {
                        a.troops -= troops;
                    }
                    self.active = false;
                    return Ok(());
                }
                troops -= counter.troops;
                world.delete_attack(id);
            }
        }

        // A second order against the same target reinforces the running attack.
        if self.source_tile.is_none() {
            let outgoing = world.player(self.attacker).map(|p| p.outgoing_attacks.clone()).unwrap_or_default();
            for id in outgoing {
                if let Some(existing) = world.attack_mut(id) {
                    if existing.active && existing.target == self.target && existing.source_tile.is_none() {
                        existing.troops += troops;
                        self.active = false;
                        return Ok(());
                    }
                }
            }
        }

        let id = world.create_attack(self.attacker, self.target, troops, self.source_tile);
        self.attack = Some(id);
        self.rng = DeterministicRng::for_entity(0xA77A_0000_0000_0000 | id.0 as u64, world.ticks());
        if let Some(t) = self.target.player().and_then(|t| world.player_mut(t)) {
            t.update_relation(self.attacker, ATTACK_RELATION_PENALTY);
        }
        self.refresh_border(world);
        Ok(())
    }

    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let Some(id) = self.attack else {
            self.active = false;
            return Ok(());
        };
        let Some(attack) = world.attack(id).filter(|a| a.active) else {
            self.active = false;
            return Ok(());
        };
        if attack.retreating {
            self.finish(world, true);
            return Ok(());
        }
        if let Owner::Player(target) = self.target {
            if world.is_friendly(self.attacker, target) {
                self.finish(world, true);
                return Ok(());
            }
        }

        let mut budget = attack_tiles_per_tick(
            attack.troops as f64,
            &self.defender(world),
            self.to_conquer.len() as u64,
        );

        while budget > 0.0 {
            let troops = world.attack(id).map(|a| a.troops).unwrap_or(0);
            if troops < 1 {
                self.finish(world, false);
                return Ok(());
            }

            let Some((_, tile)) = self.to_conquer.pop_first() else {
                self.refresh_border(world);
                if self.to_conquer.is_empty() {
                    self.finish(world, true);
                    return Ok(());
                }
                continue;
            };

            if world.owner(tile) != self.target || !world.borders_player(tile, self.attacker) {
                continue;
            }

            let Some(attacker) = world.player(self.attacker) else {
                return Err(TickError::PlayerNotFound(self.attacker));
            };
            let combatant = Attacker {
                player_type: attacker.player_type(),
                troops: troops as f64,
                tiles_owned: attacker.num_tiles_owned(),
            };
            let num_land = world.map().num_land_tiles().max(1) as f64;
            let conditions = TileConditions {
                terrain: world.map().terrain(tile),
                defense_post_in_range: self
                    .target
                    .player()
                    .map(|t| world.defense_post_in_range(t, tile))
                    .unwrap_or(false),
                fallout_ratio: world
                    .has_fallout(tile)
                    .then(|| world.num_fallout() as f64 / num_land),
            };
            let outcome = attack_logic(world.config(), &combatant, &self.defender(world), &conditions)?;

            budget -= outcome.tiles_per_tick_used.max(1.0);
            if let Some(a) = world.attack_mut(id) {
                a.troops = a.troops.saturating_sub(floor_u64(outcome.attacker_troop_loss));
            }
            if let Some(defender) = self.target.player().and_then(|t| world.player_mut(t)) {
                defender.remove_troops(floor_u64(outcome.defender_troop_loss));
            }
            world.conquer(self.attacker, tile);
            self.add_neighbors(world, tile);
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(attack = %id, remaining = self.to_conquer.len(), "attack tick");

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Order an attack to retreat; its troops return on the attack's next tick.
#[derive(Debug)]
pub struct RetreatExecution {
    player: SmallId,
    attack: AttackId,
    active: bool,
}

impl RetreatExecution {
    /// Retreat `attack`, which must belong to `player`.
    pub fn new(player: SmallId, attack: AttackId) -> Self {
        Self { player, attack, active: true }
    }
}

impl ExecutionBehavior for RetreatExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        self.active = false;
        match world.attack_mut(self.attack) {
            Some(a) if a.active && a.attacker == self.player => a.retreating = true,
            _ => debug!(player = self.player, attack = %self.attack, "cannot retreat attack"),
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::tests::coastal_world;

    fn run(exec: &mut AttackExecution, world: &mut World, ticks: usize) {
        let mut queue = Vec::new();
        for _ in 0..ticks {
            if !exec.is_active() {
                break;
            }
            exec.tick(world, &mut queue).unwrap();
        }
    }

    #[test]
    fn test_expands_into_unclaimed_land() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        let mut exec = AttackExecution::new(1, Owner::Unclaimed, Some(5_000));
        exec.init(&mut world).unwrap();
        assert_eq!(world.player(1).unwrap().troops, 20_000);

        run(&mut exec, &mut world, 200);
        // All 60 land tiles end up owned; leftover troops come home.
        assert_eq!(world.player(1).unwrap().num_tiles_owned(), 60);
        assert!(!exec.is_active());
        let troops = world.player(1).unwrap().troops;
        assert!(troops > 20_000 && troops < 25_000);
    }

    #[test]
    fn test_attack_on_player_costs_both_sides() {
        let mut world = coastal_world();
        for x in 0..3 {
            world.conquer(1, x);
        }
        for x in 3..6 {
            world.conquer(2, x);
        }
        let mut exec = AttackExecution::new(1, Owner::Player(2), Some(10_000));
        exec.init(&mut world).unwrap();
        exec.tick(&mut world, &mut Vec::new()).unwrap();

        assert!(world.player(1).unwrap().num_tiles_owned() > 3);
        assert!(world.player(2).unwrap().troops < 25_000);
        assert!(world.player(2).unwrap().relation_score(1) < 0);
    }

    #[test]
    fn test_second_order_reinforces() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        let mut first = AttackExecution::new(1, Owner::Unclaimed, Some(1_000));
        first.init(&mut world).unwrap();
        let mut second = AttackExecution::new(1, Owner::Unclaimed, Some(500));
        second.init(&mut world).unwrap();

        assert!(!second.is_active());
        let id = first.attack_id().unwrap();
        assert_eq!(world.attack(id).unwrap().troops, 1_500);
    }

    #[test]
    fn test_counter_attack_cancels_troops() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        world.conquer(2, 1);
        let mut incoming = AttackExecution::new(2, Owner::Player(1), Some(3_000));
        incoming.init(&mut world).unwrap();
        let mut counter = AttackExecution::new(1, Owner::Player(2), Some(1_000));
        counter.init(&mut world).unwrap();

        assert!(!counter.is_active());
        let id = incoming.attack_id().unwrap();
        assert_eq!(world.attack(id).unwrap().troops, 2_000);
    }

    #[test]
    fn test_retreat_returns_troops() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        let mut exec = AttackExecution::new(1, Owner::Unclaimed, Some(5_000));
        exec.init(&mut world).unwrap();
        let id = exec.attack_id().unwrap();

        let mut retreat = RetreatExecution::new(1, id);
        retreat.tick(&mut world, &mut Vec::new()).unwrap();
        exec.tick(&mut world, &mut Vec::new()).unwrap();

        assert!(!exec.is_active());
        assert_eq!(world.player(1).unwrap().troops, 25_000);
        assert!(!world.attack(id).unwrap().active);
    }

    #[test]
    fn test_cannot_attack_ally() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        world.conquer(2, 1);
        world.create_alliance_request(1, 2);
        world.resolve_alliance_request(1, 2, true);
        let mut exec = AttackExecution::new(1, Owner::Player(2), Some(1_000));
        exec.init(&mut world).unwrap();
        assert!(!exec.is_active());
        assert_eq!(world.player(1).unwrap().troops, 25_000);
    }
}
