//! Executions
//!
//! An execution is the behavior bound to one unit, attack or one-shot
//! effect. The scheduler owns every execution; executions own no world data
//! and refer to entities by id only.
//!
//! Each tick the scheduler:
//! 1. ticks every initialized, active execution in registration order
//!    (only those active during the spawn phase while it lasts),
//! 2. initializes pending executions, deferring spawn-phase-gated ones,
//! 3. drops executions that reported inactive,
//! 4. appends the newly initialized ones.

pub mod attack;
pub mod construction;
pub mod diplomacy;
pub mod nuke;
pub mod player;
pub mod shell;
pub mod spawn;
pub mod structures;
pub mod trade;
pub mod transport;
pub mod warship;
pub mod win_check;

use crate::game::tick::TickError;
use crate::game::world::World;

pub use attack::{AttackExecution, RetreatExecution};
pub use construction::ConstructionExecution;
pub use diplomacy::{
    AllianceReplyExecution, AllianceRequestExecution, BreakAllianceExecution, ChatExecution,
    DonateExecution, EmbargoExecution, EmojiExecution, TargetPlayerExecution, TroopRatioExecution,
};
pub use nuke::NukeExecution;
pub use player::PlayerExecution;
pub use shell::ShellExecution;
pub use spawn::SpawnExecution;
pub use structures::{CityExecution, DefensePostExecution, MissileSiloExecution, PortExecution};
pub use trade::TradeShipExecution;
pub use transport::TransportShipExecution;
pub use warship::{MoveWarshipExecution, WarshipExecution};
pub use win_check::WinCheckExecution;

/// Executions registered during a tick; initialized before the tick ends.
pub type ExecutionQueue = Vec<Execution>;

/// Behavior shared by every execution.
pub trait ExecutionBehavior {
    /// Called once before the first tick.
    fn init(&mut self, _world: &mut World) -> Result<(), TickError> {
        Ok(())
    }

    /// Advance by one tick. New executions go into `queue`.
    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError>;

    /// Inactive executions are dropped and never ticked again.
    fn is_active(&self) -> bool;

    /// Does this execution run while players are still choosing spawns?
    fn active_during_spawn_phase(&self) -> bool {
        false
    }
}

/// Every kind of execution.
#[derive(Debug)]
pub enum Execution {
    /// Place a player's starting territory.
    Spawn(SpawnExecution),
    /// Per-player economy.
    Player(PlayerExecution),
    /// Land attack.
    Attack(AttackExecution),
    /// Retreat order for an attack.
    Retreat(RetreatExecution),
    /// Boat attack.
    TransportShip(TransportShipExecution),
    /// Structure under construction.
    Construction(ConstructionExecution),
    /// Defense post.
    DefensePost(DefensePostExecution),
    /// Missile silo.
    MissileSilo(MissileSiloExecution),
    /// Port.
    Port(PortExecution),
    /// City.
    City(CityExecution),
    /// Warship.
    Warship(WarshipExecution),
    /// Warship move order.
    MoveWarship(MoveWarshipExecution),
    /// Shell in flight.
    Shell(ShellExecution),
    /// Trade ship voyage.
    TradeShip(TradeShipExecution),
    /// Nuke in flight.
    Nuke(NukeExecution),
    /// Alliance proposal.
    AllianceRequest(AllianceRequestExecution),
    /// Alliance answer.
    AllianceReply(AllianceReplyExecution),
    /// Alliance break.
    BreakAlliance(BreakAllianceExecution),
    /// Target mark.
    TargetPlayer(TargetPlayerExecution),
    /// Emoji.
    Emoji(EmojiExecution),
    /// Quick chat.
    Chat(ChatExecution),
    /// Troop or gold donation.
    Donate(DonateExecution),
    /// Embargo start/stop.
    Embargo(EmbargoExecution),
    /// Troop ratio change.
    TroopRatio(TroopRatioExecution),
    /// Victory condition.
    WinCheck(WinCheckExecution),
}

macro_rules! dispatch {
    ($self:expr, $exec:ident => $body:expr) => {
        match $self {
            Execution::Spawn($exec) => $body,
            Execution::Player($exec) => $body,
            Execution::Attack($exec) => $body,
            Execution::Retreat($exec) => $body,
            Execution::TransportShip($exec) => $body,
            Execution::Construction($exec) => $body,
            Execution::DefensePost($exec) => $body,
            Execution::MissileSilo($exec) => $body,
            Execution::Port($exec) => $body,
            Execution::City($exec) => $body,
            Execution::Warship($exec) => $body,
            Execution::MoveWarship($exec) => $body,
            Execution::Shell($exec) => $body,
            Execution::TradeShip($exec) => $body,
            Execution::Nuke($exec) => $body,
            Execution::AllianceRequest($exec) => $body,
            Execution::AllianceReply($exec) => $body,
            Execution::BreakAlliance($exec) => $body,
            Execution::TargetPlayer($exec) => $body,
            Execution::Emoji($exec) => $body,
            Execution::Chat($exec) => $body,
            Execution::Donate($exec) => $body,
            Execution::Embargo($exec) => $body,
            Execution::TroopRatio($exec) => $body,
            Execution::WinCheck($exec) => $body,
        }
    };
}

impl ExecutionBehavior for Execution {
    fn init(&mut self, world: &mut World) -> Result<(), TickError> {
        dispatch!(self, e => e.init(world))
    }

    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError> {
        dispatch!(self, e => e.tick(world, queue))
    }

    fn is_active(&self) -> bool {
        dispatch!(self, e => e.is_active())
    }

    fn active_during_spawn_phase(&self) -> bool {
        dispatch!(self, e => e.active_during_spawn_phase())
    }
}

/// Owns all executions and runs the per-tick execution passes.
#[derive(Debug, Default)]
pub struct Scheduler {
    active: Vec<Execution>,
    pending: Vec<Execution>,
}

impl Scheduler {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution; it is initialized during the next pass.
    pub fn add(&mut self, exec: Execution) {
        self.pending.push(exec);
    }

    /// Register several executions in order.
    pub fn extend(&mut self, execs: impl IntoIterator<Item = Execution>) {
        self.pending.extend(execs);
    }

    /// Initialized executions.
    pub fn active(&self) -> &[Execution] {
        &self.active
    }

    /// Executions waiting for initialization.
    pub fn pending(&self) -> &[Execution] {
        &self.pending
    }

    /// Run the execution passes of one tick.
    pub fn run(&mut self, world: &mut World) -> Result<(), TickError> {
        let in_spawn_phase = world.in_spawn_phase();
        let mut queue = ExecutionQueue::new();

        for exec in &mut self.active {
            if (!in_spawn_phase || exec.active_during_spawn_phase()) && exec.is_active() {
                exec.tick(world, &mut queue)?;
            }
        }
        self.pending.append(&mut queue);

        let mut initialized = Vec::new();
        let mut deferred = Vec::new();
        for mut exec in std::mem::take(&mut self.pending) {
            if !in_spawn_phase || exec.active_during_spawn_phase() {
                exec.init(world)?;
                initialized.push(exec);
            } else {
                deferred.push(exec);
            }
        }

        self.active.retain(|e| e.is_active());
        self.active.append(&mut initialized);
        self.pending = deferred;
        Ok(())
    }
}
