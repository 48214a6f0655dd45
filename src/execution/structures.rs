//! Structures: defense posts, missile silos, ports and cities.
//!
//! Each structure builds its unit lazily on its first tick and goes inactive
//! when the site is no longer buildable or the unit is destroyed.

use tracing::debug;

use crate::core::DeterministicRng;
use crate::execution::shell::ShellBattery;
use crate::execution::{Execution, ExecutionBehavior, ExecutionQueue, TradeShipExecution};
use crate::game::formulas::trade_ship_spawn_rate;
use crate::game::map::TileRef;
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::{UnitId, UnitType};
use crate::game::world::{UnitParams, World};

/// Build `unit_type` for `owner` at `tile`, or report why not.
fn build_structure(world: &mut World, owner: SmallId, unit_type: UnitType, tile: TileRef) -> Option<UnitId> {
    match world.can_build(owner, unit_type, tile) {
        Some(site) => Some(world.build_unit(unit_type, owner, site, UnitParams::default())),
        None => {
            debug!(owner, ?unit_type, tile, "cannot build structure");
            None
        }
    }
}

// =============================================================================
// Defense post
// =============================================================================

/// Fires shells at hostile transport ships and warships in range.
#[derive(Debug)]
pub struct DefensePostExecution {
    owner: SmallId,
    tile: TileRef,
    post: Option<UnitId>,
    battery: ShellBattery,
    active: bool,
}

impl DefensePostExecution {
    /// Defense post for `owner` at `tile`.
    pub fn new(owner: SmallId, tile: TileRef) -> Self {
        Self {
            owner,
            tile,
            post: None,
            battery: ShellBattery::new(),
            active: true,
        }
    }

    /// Hostile ship to fire at: transports first, then closest.
    fn find_target(&self, world: &World, post: UnitId) -> Option<UnitId> {
        let unit = world.active_unit(post)?;
        let range = world.config().defense_post_targetting_range;
        world
            .nearby_units(unit.tile, range, &[UnitType::TransportShip, UnitType::Warship])
            .into_iter()
            .filter_map(|(id, dist)| world.unit(id).map(|u| (u, dist)))
            .filter(|(u, _)| u.owner != unit.owner && !world.is_friendly(unit.owner, u.owner))
            .filter(|(u, _)| !self.battery.already_fired_at(u.id))
            .min_by_key(|(u, dist)| (u.unit_type != UnitType::TransportShip, *dist, u.id))
            .map(|(u, _)| u.id)
    }
}

impl ExecutionBehavior for DefensePostExecution {
    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let post = match self.post {
            Some(id) => id,
            None => match build_structure(world, self.owner, UnitType::DefensePost, self.tile) {
                Some(id) => {
                    self.post = Some(id);
                    id
                }
                None => {
                    self.active = false;
                    return Ok(());
                }
            },
        };
        if world.active_unit(post).is_none() {
            self.active = false;
            return Ok(());
        }
        if let Some(target) = self.find_target(world, post) {
            let rate = world.config().defense_post_shell_attack_rate;
            self.battery.fire(world, queue, post, target, rate);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// Missile silo
// =============================================================================

/// Launch site for nukes; clears its cooldown when it runs out.
#[derive(Debug)]
pub struct MissileSiloExecution {
    owner: SmallId,
    tile: TileRef,
    silo: Option<UnitId>,
    active: bool,
}

impl MissileSiloExecution {
    /// Silo for `owner` at `tile`.
    pub fn new(owner: SmallId, tile: TileRef) -> Self {
        Self { owner, tile, silo: None, active: true }
    }
}

impl ExecutionBehavior for MissileSiloExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let silo = match self.silo {
            Some(id) => id,
            None => match build_structure(world, self.owner, UnitType::MissileSilo, self.tile) {
                Some(id) => {
                    self.silo = Some(id);
                    id
                }
                None => {
                    self.active = false;
                    return Ok(());
                }
            },
        };
        let Some(unit) = world.active_unit(silo) else {
            self.active = false;
            return Ok(());
        };
        let cooldown = world.config().silo_cooldown;
        if unit.in_cooldown() && unit.ticks_left_in_cooldown(cooldown, world.ticks()) == 0 {
            world.set_cooldown(silo, None);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// Port
// =============================================================================

/// Coastal structure that sends trade ships to other players' ports.
#[derive(Debug)]
pub struct PortExecution {
    owner: SmallId,
    tile: TileRef,
    port: Option<UnitId>,
    rng: DeterministicRng,
    active: bool,
}

impl PortExecution {
    /// Port for `owner` near `tile`.
    pub fn new(owner: SmallId, tile: TileRef) -> Self {
        Self {
            owner,
            tile,
            port: None,
            rng: DeterministicRng::new(0),
            active: true,
        }
    }

    /// Ports of other players the port's owner may trade with.
    fn trading_ports(world: &World, owner: SmallId) -> Vec<UnitId> {
        world
            .units_of_type(UnitType::Port)
            .into_iter()
            .filter(|&id| {
                world
                    .unit(id)
                    .map(|p| p.owner != owner && world.can_trade(owner, p.owner))
                    .unwrap_or(false)
            })
            .collect()
    }
}

impl ExecutionBehavior for PortExecution {
    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let port = match self.port {
            Some(id) => id,
            None => match build_structure(world, self.owner, UnitType::Port, self.tile) {
                Some(id) => {
                    self.port = Some(id);
                    self.rng = DeterministicRng::for_entity(0x9077_0000_0000_0000 | id.0 as u64, world.ticks());
                    id
                }
                None => {
                    self.active = false;
                    return Ok(());
                }
            },
        };
        let Some(unit) = world.active_unit(port) else {
            self.active = false;
            return Ok(());
        };
        // Captured ports trade for their new owner.
        let owner = unit.owner;

        let total_ports = world.units_of_type(UnitType::Port).len();
        if !self.rng.chance(trade_ship_spawn_rate(total_ports)) {
            return Ok(());
        }
        let partners = Self::trading_ports(world, owner);
        let Some(&dst) = self.rng.choose(&partners) else {
            return Ok(());
        };
        queue.push(Execution::TradeShip(TradeShipExecution::new(owner, port, dst)));
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// City
// =============================================================================

/// Raises its owner's max population while standing.
#[derive(Debug)]
pub struct CityExecution {
    owner: SmallId,
    tile: TileRef,
    city: Option<UnitId>,
    active: bool,
}

impl CityExecution {
    /// City for `owner` at `tile`.
    pub fn new(owner: SmallId, tile: TileRef) -> Self {
        Self { owner, tile, city: None, active: true }
    }
}

impl ExecutionBehavior for CityExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let city = match self.city {
            Some(id) => id,
            None => match build_structure(world, self.owner, UnitType::City, self.tile) {
                Some(id) => {
                    self.city = Some(id);
                    id
                }
                None => {
                    self.active = false;
                    return Ok(());
                }
            },
        };
        if world.active_unit(city).is_none() {
            self.active = false;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
