//! Shells and the firing cooldown shared by warships and defense posts.

use std::collections::BTreeSet;

use crate::execution::{Execution, ExecutionBehavior, ExecutionQueue};
use crate::game::map::TileRef;
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::{UnitId, UnitType};
use crate::game::world::{UnitParams, World};

/// Firing state of a gun: last shot tick and one-shot targets already fired upon.
#[derive(Debug, Default)]
pub struct ShellBattery {
    last_shell_attack: u32,
    already_sent: BTreeSet<UnitId>,
}

impl ShellBattery {
    /// Fresh battery; the first shot is possible once `ticks > rate`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Was a shell already sent at this unit (which a single hit destroys)?
    pub fn already_fired_at(&self, target: UnitId) -> bool {
        self.already_sent.contains(&target)
    }

    /// Can the gun fire at tick `ticks`?
    #[inline]
    pub fn ready(&self, ticks: u32, rate: u32) -> bool {
        ticks.saturating_sub(self.last_shell_attack) > rate
    }

    /// Fire at `target` if the cooldown allows. Returns whether a shell was sent.
    pub fn fire(
        &mut self,
        world: &World,
        queue: &mut ExecutionQueue,
        source: UnitId,
        target: UnitId,
        rate: u32,
    ) -> bool {
        let ticks = world.ticks();
        if !self.ready(ticks, rate) {
            return false;
        }
        let (Some(gun), Some(victim)) = (world.active_unit(source), world.active_unit(target)) else {
            return false;
        };
        self.last_shell_attack = ticks;
        queue.push(Execution::Shell(ShellExecution::new(gun.tile, gun.owner, source, target)));
        if !victim.has_health() {
            self.already_sent.insert(target);
        }
        true
    }
}

/// A shell flying toward its target.
#[derive(Debug)]
pub struct ShellExecution {
    spawn: TileRef,
    owner: SmallId,
    source: UnitId,
    target: UnitId,
    shell: Option<UnitId>,
    destroy_at: u32,
    active: bool,
}

impl ShellExecution {
    /// Shell fired from `spawn` by `source` at `target`.
    pub fn new(spawn: TileRef, owner: SmallId, source: UnitId, target: UnitId) -> Self {
        Self {
            spawn,
            owner,
            source,
            target,
            shell: None,
            destroy_at: 0,
            active: true,
        }
    }

    /// Unit that fired the shell.
    pub fn source(&self) -> UnitId {
        self.source
    }

    fn discard(&mut self, world: &mut World, shell: UnitId) {
        world.delete_unit(shell);
        self.active = false;
    }
}

impl ExecutionBehavior for ShellExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let shell = match self.shell {
            Some(id) => id,
            None => {
                let id = world.build_unit(UnitType::Shell, self.owner, self.spawn, UnitParams::default());
                self.destroy_at = world.ticks() + world.config().shell_lifetime;
                self.shell = Some(id);
                id
            }
        };
        let Some(current) = world.active_unit(shell) else {
            self.active = false;
            return Ok(());
        };
        let (shell_owner, mut at) = (current.owner, current.tile);
        let target = world
            .active_unit(self.target)
            .filter(|t| t.owner != shell_owner)
            .map(|t| t.tile);
        let Some(target) = target.filter(|_| world.ticks() < self.destroy_at) else {
            self.discard(world, shell);
            return Ok(());
        };

        let speed = world.config().shell_speed;
        let damage = world.config().shell_damage;
        for _ in 0..speed {
            if at == target {
                world.damage_unit(self.target, damage);
                self.discard(world, shell);
                return Ok(());
            }
            at = world.map().step_toward(at, target);
            world.move_unit(shell, at);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
