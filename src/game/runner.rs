//! Game Runner
//!
//! Owns a world, its scheduler and the turn queue of one replica. The relay
//! feeds turns in; every processed turn produces exactly one
//! [`RunnerUpdate`] for the consumer.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{error, info};

use crate::execution::{Execution, Scheduler, WinCheckExecution};
use crate::game::config::GameConfig;
use crate::game::executor::Executor;
use crate::game::intent::Turn;
use crate::game::map::{GameMap, TileRef};
use crate::game::names::{place_name, NameViewData};
use crate::game::player::{ClientId, PlayerId, PlayerInfo, PlayerType, Relation, SmallId};
use crate::game::tick::{execute_next_tick, TickError};
use crate::game::unit::UnitType;
use crate::game::updates::{GameUpdate, GameUpdateType, GameUpdates};
use crate::game::world::World;

/// Longest display name kept after sanitizing.
const MAX_USERNAME_LEN: usize = 27;

/// Units a player can order through `BuildUnit`.
const BUILDABLE_UNITS: [UnitType; 7] = [
    UnitType::City,
    UnitType::DefensePost,
    UnitType::Port,
    UnitType::Warship,
    UnitType::MissileSilo,
    UnitType::AtomBomb,
    UnitType::HydrogenBomb,
];

/// A player in the start roster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartPlayer {
    /// Stable player id.
    #[serde(rename = "playerID")]
    pub player_id: PlayerId,
    /// Owning client.
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    /// Chosen name.
    pub username: String,
    /// Flag code.
    #[serde(default)]
    pub flag: String,
}

/// Everything a replica needs to build the initial world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameStartInfo {
    /// Game id.
    #[serde(rename = "gameID")]
    pub game_id: String,
    /// Rules.
    pub config: GameConfig,
    /// Human players in roster order.
    pub players: Vec<StartPlayer>,
}

/// Output of one processed turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunnerUpdate {
    /// A tick completed.
    Tick {
        /// Tick counter after the tick.
        tick: u32,
        /// Tile updates, packed.
        packed_tile_updates: Vec<u64>,
        /// All other updates.
        updates: GameUpdates,
        /// Name placement per player, refreshed on a schedule.
        player_name_view_data: BTreeMap<PlayerId, NameViewData>,
    },
    /// The tick failed; the runner is halted.
    Error {
        /// Error text.
        message: String,
    },
}

/// Failed runner query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No such player.
    #[error("player {0} not found")]
    PlayerNotFound(String),
    /// Tile outside the map.
    #[error("tile {0} is not on the map")]
    InvalidTile(TileRef),
}

/// Cost and placement of one unit type for a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildableUnit {
    /// Unit type.
    pub unit_type: UnitType,
    /// Gold cost of the next one.
    pub cost: u64,
    /// Where it would be placed, if it can be built.
    pub can_build: Option<TileRef>,
}

/// What a player may do toward another player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInteraction {
    /// Territories touch.
    pub shared_border: bool,
    /// Emoji allowed.
    pub can_send_emoji: bool,
    /// Target mark allowed.
    pub can_target: bool,
    /// Alliance request allowed.
    pub can_send_alliance_request: bool,
    /// Currently allied.
    pub can_break_alliance: bool,
    /// Donation allowed.
    pub can_donate: bool,
    /// Not yet embargoed.
    pub can_embargo: bool,
}

/// Actions available to a player at a tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerActions {
    /// A boat attack can land here.
    pub can_boat: bool,
    /// A land attack can take this tile.
    pub can_attack: bool,
    /// Unit options.
    pub buildable_units: Vec<BuildableUnit>,
    /// Emoji to everyone allowed.
    pub can_send_emoji_all_players: bool,
    /// Options toward the tile's owner, if owned by someone.
    pub interaction: Option<PlayerInteraction>,
}

/// Relations and alliances of a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    /// Relation towards every player it has a score for.
    pub relations: BTreeMap<SmallId, Relation>,
    /// Allies.
    pub alliances: Vec<SmallId>,
}

/// Border tiles of a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerBorderTiles {
    /// Owned tiles touching other territory.
    pub border_tiles: Vec<TileRef>,
}

/// Strip everything but letters, digits, spaces and a few separators.
pub fn sanitize_username(name: &str) -> String {
    let clean: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.' | '[' | ']'))
        .take(MAX_USERNAME_LEN)
        .collect();
    let trimmed = clean.trim();
    if trimmed.is_empty() {
        "Anon".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Build the initial world for a game.
pub fn create_world(start: &GameStartInfo, map: GameMap) -> World {
    let roster = start
        .players
        .iter()
        .map(|p| PlayerInfo {
            id: p.player_id.clone(),
            name: sanitize_username(&p.username),
            player_type: PlayerType::Human,
            client_id: Some(p.client_id.clone()),
            flag: p.flag.clone(),
        })
        .collect();
    World::new(map, start.config.clone(), roster)
}

/// Resimulate a game from scratch, as a late joiner does.
pub fn replay_turns(start: &GameStartInfo, map: GameMap, turns: &[Turn]) -> Result<World, TickError> {
    let mut world = create_world(start, map);
    let mut scheduler = Scheduler::new();
    scheduler.add(Execution::WinCheck(WinCheckExecution::new()));
    let executor = Executor::new(start.game_id.clone());
    for turn in turns {
        scheduler.extend(executor.create_executions(&world, turn));
        execute_next_tick(&mut world, &mut scheduler)?;
    }
    Ok(world)
}

/// Callback receiving runner output.
pub type UpdateCallback = Box<dyn FnMut(RunnerUpdate) + Send>;

/// One replica of a game.
pub struct GameRunner {
    world: World,
    scheduler: Scheduler,
    executor: Executor,
    turns: Vec<Turn>,
    curr_turn: usize,
    halted: bool,
    name_view: BTreeMap<PlayerId, NameViewData>,
    callback: UpdateCallback,
}

impl std::fmt::Debug for GameRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameRunner")
            .field("ticks", &self.world.ticks())
            .field("turns", &self.turns.len())
            .field("curr_turn", &self.curr_turn)
            .field("halted", &self.halted)
            .finish()
    }
}

impl GameRunner {
    /// Create a runner and register the game-wide executions.
    pub fn new(start: &GameStartInfo, map: GameMap, callback: UpdateCallback) -> Self {
        let world = create_world(start, map);
        let mut scheduler = Scheduler::new();
        scheduler.add(Execution::WinCheck(WinCheckExecution::new()));
        info!(game_id = %start.game_id, players = start.players.len(), "game runner created");
        Self {
            world,
            scheduler,
            executor: Executor::new(start.game_id.clone()),
            turns: Vec::new(),
            curr_turn: 0,
            halted: false,
            name_view: BTreeMap::new(),
            callback,
        }
    }

    /// The simulated world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Has a tick error stopped this runner?
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Turns received but not yet processed.
    pub fn pending_turns(&self) -> usize {
        self.turns.len() - self.curr_turn
    }

    /// Queue a turn from the relay.
    pub fn add_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Process the next queued turn, if any.
    ///
    /// A failed tick reports [`RunnerUpdate::Error`] and halts the runner;
    /// later calls do nothing.
    pub fn execute_next_tick(&mut self) {
        if self.halted || self.curr_turn >= self.turns.len() {
            return;
        }
        let execs = self.executor.create_executions(&self.world, &self.turns[self.curr_turn]);
        self.scheduler.extend(execs);
        self.curr_turn += 1;

        let mut updates = match execute_next_tick(&mut self.world, &mut self.scheduler) {
            Ok(updates) => updates,
            Err(e) => {
                error!(tick = self.world.ticks(), error = %e, "game tick failed");
                self.halted = true;
                (self.callback)(RunnerUpdate::Error { message: e.to_string() });
                return;
            }
        };

        self.refresh_names();

        let packed_tile_updates = updates
            .take(GameUpdateType::Tile)
            .into_iter()
            .filter_map(|u| match u {
                GameUpdate::Tile { update } => Some(update),
                _ => None,
            })
            .collect();

        (self.callback)(RunnerUpdate::Tick {
            tick: self.world.ticks(),
            packed_tile_updates,
            updates,
            player_name_view_data: self.name_view.clone(),
        });
    }

    /// Process every queued turn.
    pub fn execute_pending(&mut self) {
        while !self.halted && self.curr_turn < self.turns.len() {
            self.execute_next_tick();
        }
    }

    fn refresh_names(&mut self) {
        let ticks = self.world.ticks();
        let all = ticks < 3 || ticks % 30 == 0;
        let humans = self.world.in_spawn_phase() && ticks % 2 == 0;
        if !all && !humans {
            return;
        }
        for p in self.world.players() {
            let human_like = matches!(p.player_type(), PlayerType::Human | PlayerType::FakeHuman);
            if all || human_like {
                self.name_view.insert(p.id().clone(), place_name(&self.world, p.small_id));
            }
        }
    }

    fn small_id(&self, player: &PlayerId) -> Result<SmallId, QueryError> {
        self.world
            .player_by_id(player)
            .ok_or_else(|| QueryError::PlayerNotFound(player.to_string()))
    }

    /// What `player` can do at `tile`.
    pub fn player_actions(&self, player: &PlayerId, tile: TileRef) -> Result<PlayerActions, QueryError> {
        let me = self.small_id(player)?;
        let world = &self.world;
        let map = world.map();
        if !map.is_valid(tile) {
            return Err(QueryError::InvalidTile(tile));
        }
        let owner = world.owner_id(tile);
        let hostile_land = map.is_land(tile) && owner != me && !world.is_friendly(me, owner);

        let buildable_units = BUILDABLE_UNITS
            .iter()
            .map(|&unit_type| BuildableUnit {
                unit_type,
                cost: world.unit_cost(me, unit_type),
                can_build: world.can_build(me, unit_type, tile),
            })
            .collect();

        let interaction = world.player(owner).map(|other| {
            let other = other.small_id;
            let p = world.player(me);
            PlayerInteraction {
                shared_border: world.neighbor_players(me).contains(&other),
                can_send_emoji: world.can_send_emoji(me, Some(other)),
                can_target: world.can_target(me, other),
                can_send_alliance_request: world.can_send_alliance_request(me, other),
                can_break_alliance: p.map(|p| p.is_allied_with(other)).unwrap_or(false),
                can_donate: world.can_donate(me, other),
                can_embargo: p.map(|p| !p.has_embargo_against(other)).unwrap_or(false),
            }
        });

        Ok(PlayerActions {
            can_boat: hostile_land
                && map.is_shoreline(tile)
                && world.can_build(me, UnitType::TransportShip, tile).is_some(),
            can_attack: hostile_land && world.borders_player(tile, me),
            buildable_units,
            can_send_emoji_all_players: world.can_send_emoji(me, None),
            interaction,
        })
    }

    /// Relations and alliances of the player with small id `player`.
    pub fn player_profile(&self, player: SmallId) -> Result<PlayerProfile, QueryError> {
        let p = self
            .world
            .player(player)
            .ok_or_else(|| QueryError::PlayerNotFound(player.to_string()))?;
        Ok(PlayerProfile {
            relations: p.relations.keys().map(|&other| (other, p.relation(other))).collect(),
            alliances: p.alliances.keys().copied().collect(),
        })
    }

    /// Border tiles of `player`.
    pub fn border_tiles(&self, player: &PlayerId) -> Result<PlayerBorderTiles, QueryError> {
        let me = self.small_id(player)?;
        Ok(PlayerBorderTiles { border_tiles: self.world.border_tiles(me) })
    }
}
