//! World State
//!
//! The single mutable game state every execution operates on. Entities live
//! in dense arrays addressed by stable ids: players by [`SmallId`], units by
//! [`UnitId`], attacks by [`AttackId`]. Tile ownership is one `Vec<SmallId>`,
//! so every tile has exactly one owner (possibly unclaimed) at all times.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::core::hash::compute_state_hash;
use crate::core::fold_hash;
use crate::game::attack::{AttackId, AttackState, Owner};
use crate::game::config::GameConfig;
use crate::game::formulas::{self, unit_cost};
use crate::game::map::{GameMap, TileRef};
use crate::game::player::{ClientId, PlayerId, PlayerInfo, PlayerState, Recipient, SmallId, UNCLAIMED};
use crate::game::unit::{UnitId, UnitState, UnitType};
use crate::game::updates::{
    pack_tile_update, AttackUpdate, GameUpdate, GameUpdates, MessageType, PlayerUpdate, UnitUpdate,
};

/// Unit types that occupy territory and block nearby construction.
pub const STRUCTURE_TYPES: [UnitType; 5] = [
    UnitType::Port,
    UnitType::City,
    UnitType::DefensePost,
    UnitType::MissileSilo,
    UnitType::Construction,
];

/// A pending alliance proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceRequest {
    /// Proposer.
    pub requestor: SmallId,
    /// Addressee.
    pub recipient: SmallId,
    /// Tick the request was made.
    pub created_at: u32,
}

/// Optional attributes for a new unit.
#[derive(Clone, Debug, Default)]
pub struct UnitParams {
    /// Troops carried.
    pub troops: u64,
    /// Destination port (trade ships).
    pub dst_port: Option<UnitId>,
    /// Impact tile (nukes).
    pub detonation_dst: Option<TileRef>,
    /// Structure under construction.
    pub construction_type: Option<UnitType>,
}

/// The simulated world.
#[derive(Clone, Debug)]
pub struct World {
    map: GameMap,
    config: GameConfig,

    owners: Vec<SmallId>,
    fallout: Vec<bool>,
    num_fallout: u32,

    players: Vec<PlayerState>,
    player_index: BTreeMap<PlayerId, SmallId>,
    client_index: BTreeMap<ClientId, SmallId>,

    units: Vec<UnitState>,
    attacks: Vec<AttackState>,
    alliance_requests: Vec<AllianceRequest>,
    last_alliance_request: BTreeMap<(SmallId, SmallId), u32>,

    ticks: u32,
    winner: Option<PlayerId>,
    updates: GameUpdates,
}

impl World {
    /// Create a world from a map, its configuration and the player roster.
    ///
    /// Players receive small ids in roster order, starting at 1.
    pub fn new(map: GameMap, config: GameConfig, roster: Vec<PlayerInfo>) -> Self {
        let num_tiles = map.num_tiles() as usize;
        let mut world = Self {
            map,
            config,
            owners: vec![UNCLAIMED; num_tiles],
            fallout: vec![false; num_tiles],
            num_fallout: 0,
            players: Vec::with_capacity(roster.len()),
            player_index: BTreeMap::new(),
            client_index: BTreeMap::new(),
            units: Vec::new(),
            attacks: Vec::new(),
            alliance_requests: Vec::new(),
            last_alliance_request: BTreeMap::new(),
            ticks: 0,
            winner: None,
            updates: GameUpdates::new(),
        };
        for info in roster {
            world.add_player(info);
        }
        world
    }

    fn add_player(&mut self, info: PlayerInfo) -> SmallId {
        let small_id = (self.players.len() + 1) as SmallId;
        let troops = formulas::start_manpower(&self.config, info.player_type);
        self.player_index.insert(info.id.clone(), small_id);
        if let Some(client) = &info.client_id {
            self.client_index.insert(client.clone(), small_id);
        }
        self.players.push(PlayerState::new(small_id, info, troops));
        small_id
    }

    // =========================================================================
    // Time & configuration
    // =========================================================================

    /// Static terrain.
    #[inline]
    pub fn map(&self) -> &GameMap {
        &self.map
    }

    /// Game parameters.
    #[inline]
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Ticks processed so far.
    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub(crate) fn advance_tick(&mut self) {
        self.ticks += 1;
    }

    /// Players may (re)place their spawn while this holds.
    #[inline]
    pub fn in_spawn_phase(&self) -> bool {
        self.ticks <= self.config.num_spawn_phase_turns()
    }

    /// Winner, once decided.
    pub fn winner(&self) -> Option<&PlayerId> {
        self.winner.as_ref()
    }

    /// Record the winner and announce it.
    pub fn set_winner(&mut self, winner: SmallId) {
        if let Some(player) = self.player(winner) {
            let id = player.id().clone();
            self.winner = Some(id.clone());
            self.add_update(GameUpdate::Win { winner: id });
        }
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Record an update for the current tick.
    pub fn add_update(&mut self, update: GameUpdate) {
        self.updates.push(update);
    }

    /// Show a message, optionally to one player only.
    pub fn display_message(&mut self, message: impl Into<String>, message_type: MessageType, player: Option<SmallId>) {
        self.add_update(GameUpdate::DisplayEvent {
            message: message.into(),
            message_type,
            player,
        });
    }

    pub(crate) fn take_updates(&mut self) -> GameUpdates {
        std::mem::take(&mut self.updates)
    }

    // =========================================================================
    // Tiles
    // =========================================================================

    /// Owner of a tile.
    #[inline]
    pub fn owner(&self, tile: TileRef) -> Owner {
        Owner::from_small_id(self.owners[tile as usize])
    }

    /// Raw owner small id of a tile (0 when unclaimed).
    #[inline]
    pub fn owner_id(&self, tile: TileRef) -> SmallId {
        self.owners[tile as usize]
    }

    /// Does any player own this tile?
    #[inline]
    pub fn has_owner(&self, tile: TileRef) -> bool {
        self.owners[tile as usize] != UNCLAIMED
    }

    /// Does the tile carry nuclear fallout?
    #[inline]
    pub fn has_fallout(&self, tile: TileRef) -> bool {
        self.fallout[tile as usize]
    }

    /// Number of tiles with fallout.
    #[inline]
    pub fn num_fallout(&self) -> u32 {
        self.num_fallout
    }

    /// Transfer a tile to `player`. Structures standing on it change hands.
    pub fn conquer(&mut self, player: SmallId, tile: TileRef) {
        if player == UNCLAIMED || self.player(player).is_none() {
            return;
        }
        let previous = self.owners[tile as usize];
        if previous == player {
            return;
        }
        if let Some(prev) = self.player_mut(previous) {
            prev.tiles.remove(&tile);
        }
        self.owners[tile as usize] = player;
        let ticks = self.ticks;
        if let Some(p) = self.player_mut(player) {
            p.tiles.insert(tile);
            p.last_tile_change = ticks;
        }
        if self.fallout[tile as usize] {
            self.fallout[tile as usize] = false;
            self.num_fallout -= 1;
        }

        if previous != UNCLAIMED {
            let captured: Vec<UnitId> = self
                .units
                .iter()
                .filter(|u| u.active && u.tile == tile && u.owner == previous && u.unit_type.territory_bound())
                .map(|u| u.id)
                .collect();
            for id in captured {
                self.capture_unit(id, player);
            }
        }

        self.push_tile_update(tile);
    }

    /// Return a tile to unclaimed land.
    pub fn relinquish(&mut self, tile: TileRef) {
        let previous = self.owners[tile as usize];
        if previous == UNCLAIMED {
            return;
        }
        let ticks = self.ticks;
        if let Some(prev) = self.player_mut(previous) {
            prev.tiles.remove(&tile);
            prev.last_tile_change = ticks;
        }
        self.owners[tile as usize] = UNCLAIMED;
        self.push_tile_update(tile);
    }

    /// Set or clear fallout on a tile.
    pub fn set_fallout(&mut self, tile: TileRef, value: bool) {
        let current = &mut self.fallout[tile as usize];
        if *current == value {
            return;
        }
        *current = value;
        if value {
            self.num_fallout += 1;
        } else {
            self.num_fallout -= 1;
        }
        self.push_tile_update(tile);
    }

    fn push_tile_update(&mut self, tile: TileRef) {
        let packed = pack_tile_update(tile, self.owners[tile as usize], self.fallout[tile as usize]);
        self.add_update(GameUpdate::Tile { update: packed });
    }

    /// Does the tile touch territory of `player`?
    pub fn borders_player(&self, tile: TileRef, player: SmallId) -> bool {
        self.map.neighbors(tile).any(|n| self.owner_id(n) == player)
    }

    /// Owned tiles of `player` with a neighbor owned by someone else.
    pub fn border_tiles(&self, player: SmallId) -> Vec<TileRef> {
        match self.player(player) {
            Some(p) => p
                .tiles
                .iter()
                .copied()
                .filter(|&t| self.map.neighbors(t).any(|n| self.owner_id(n) != player))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Players whose territory touches `player`, in small id order.
    pub fn neighbor_players(&self, player: SmallId) -> BTreeSet<SmallId> {
        let mut out = BTreeSet::new();
        for tile in self.border_tiles(player) {
            for n in self.map.neighbors(tile) {
                let owner = self.owner_id(n);
                if owner != UNCLAIMED && owner != player {
                    out.insert(owner);
                }
            }
        }
        out
    }

    /// Owned shoreline tile of `player` closest to `target`.
    pub fn closest_shore_tile(&self, player: SmallId, target: TileRef) -> Option<TileRef> {
        let p = self.player(player)?;
        p.tiles
            .iter()
            .copied()
            .filter(|&t| self.map.is_shoreline(t))
            .min_by_key(|&t| (self.map.euclidean_dist_squared(t, target), t))
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// All players in small id order.
    #[inline]
    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    /// Player by small id.
    #[inline]
    pub fn player(&self, id: SmallId) -> Option<&PlayerState> {
        if id == UNCLAIMED {
            return None;
        }
        self.players.get(id as usize - 1)
    }

    /// Mutable player by small id.
    #[inline]
    pub fn player_mut(&mut self, id: SmallId) -> Option<&mut PlayerState> {
        if id == UNCLAIMED {
            return None;
        }
        self.players.get_mut(id as usize - 1)
    }

    /// Small id of a player.
    pub fn player_by_id(&self, id: &PlayerId) -> Option<SmallId> {
        self.player_index.get(id).copied()
    }

    /// Small id of the player a client controls.
    pub fn player_by_client(&self, client: &ClientId) -> Option<SmallId> {
        self.client_index.get(client).copied()
    }

    /// Both ids are the same player or allies.
    pub fn is_friendly(&self, a: SmallId, b: SmallId) -> bool {
        self.player(a).map(|p| p.is_friendly(b)).unwrap_or(false)
    }

    /// Neither side embargoes the other.
    pub fn can_trade(&self, a: SmallId, b: SmallId) -> bool {
        match (self.player(a), self.player(b)) {
            (Some(pa), Some(pb)) => !pa.has_embargo_against(b) && !pb.has_embargo_against(a),
            _ => false,
        }
    }

    /// Snapshot of a player for the update stream.
    pub fn player_update(&self, id: SmallId) -> Option<PlayerUpdate> {
        let p = self.player(id)?;
        let attack_update = |aid: &AttackId| {
            self.attack(*aid).filter(|a| a.active).map(|a| AttackUpdate {
                id: a.id,
                attacker: a.attacker,
                target: a.target,
                troops: a.troops,
                retreating: a.retreating,
            })
        };
        Some(PlayerUpdate {
            small_id: p.small_id,
            id: p.id().clone(),
            name: p.info.name.clone(),
            player_type: p.player_type(),
            is_alive: p.is_alive(),
            is_traitor: p.is_traitor(),
            tiles_owned: p.num_tiles_owned(),
            gold: p.gold,
            population: p.population(),
            workers: p.workers,
            troops: p.troops,
            target_troop_ratio: p.target_troop_ratio,
            allies: p.alliances.keys().copied().collect(),
            embargoes: p.embargoes.iter().copied().collect(),
            targets: self.active_targets(id),
            outgoing_attacks: p.outgoing_attacks.iter().filter_map(attack_update).collect(),
            incoming_attacks: p.incoming_attacks.iter().filter_map(attack_update).collect(),
            has_spawned: p.has_spawned,
        })
    }

    /// Targets marked by `player` that have not run out.
    pub fn active_targets(&self, player: SmallId) -> Vec<SmallId> {
        let duration = self.config.target_duration;
        self.player(player)
            .map(|p| {
                p.targets
                    .iter()
                    .filter(|(_, &at)| self.ticks.saturating_sub(at) < duration)
                    .map(|(&id, _)| id)
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Diplomacy
    // =========================================================================

    /// Pending alliance requests.
    pub fn alliance_requests(&self) -> &[AllianceRequest] {
        &self.alliance_requests
    }

    /// May `requestor` propose an alliance to `recipient` now?
    pub fn can_send_alliance_request(&self, requestor: SmallId, recipient: SmallId) -> bool {
        if requestor == recipient {
            return false;
        }
        let (Some(a), Some(b)) = (self.player(requestor), self.player(recipient)) else {
            return false;
        };
        if !a.is_alive() || !b.is_alive() || a.is_allied_with(recipient) {
            return false;
        }
        if self.pending_request(requestor, recipient).is_some() {
            return false;
        }
        match self.last_alliance_request.get(&(requestor, recipient)) {
            Some(&at) => self.ticks.saturating_sub(at) >= self.config.alliance_request_cooldown,
            None => true,
        }
    }

    /// Index of the pending request from `requestor` to `recipient`.
    pub fn pending_request(&self, requestor: SmallId, recipient: SmallId) -> Option<usize> {
        self.alliance_requests
            .iter()
            .position(|r| r.requestor == requestor && r.recipient == recipient)
    }

    /// Record a new alliance request.
    pub fn create_alliance_request(&mut self, requestor: SmallId, recipient: SmallId) {
        let request = AllianceRequest { requestor, recipient, created_at: self.ticks };
        self.alliance_requests.push(request);
        self.last_alliance_request.insert((requestor, recipient), self.ticks);
        self.add_update(GameUpdate::AllianceRequest {
            requestor,
            recipient,
            created_at: self.ticks,
        });
    }

    /// Accept or reject a pending request. Returns false if none was pending.
    pub fn resolve_alliance_request(&mut self, requestor: SmallId, recipient: SmallId, accept: bool) -> bool {
        let Some(index) = self.pending_request(requestor, recipient) else {
            return false;
        };
        self.alliance_requests.remove(index);
        if accept {
            self.create_alliance(requestor, recipient);
        }
        self.add_update(GameUpdate::AllianceRequestReply {
            requestor,
            recipient,
            accepted: accept,
        });
        true
    }

    fn create_alliance(&mut self, a: SmallId, b: SmallId) {
        let ticks = self.ticks;
        if let Some(p) = self.player_mut(a) {
            p.alliances.insert(b, ticks);
        }
        if let Some(p) = self.player_mut(b) {
            p.alliances.insert(a, ticks);
        }
        // Requests in either direction are settled by the alliance.
        self.alliance_requests.retain(|r| {
            !((r.requestor == a && r.recipient == b) || (r.requestor == b && r.recipient == a))
        });
    }

    /// `traitor` breaks its alliance with `betrayed` and is marked traitor.
    pub fn break_alliance(&mut self, traitor: SmallId, betrayed: SmallId) -> bool {
        if !self.player(traitor).map(|p| p.is_allied_with(betrayed)).unwrap_or(false) {
            return false;
        }
        let ticks = self.ticks;
        if let Some(p) = self.player_mut(traitor) {
            p.alliances.remove(&betrayed);
            p.traitor_since = Some(ticks);
        }
        if let Some(p) = self.player_mut(betrayed) {
            p.alliances.remove(&traitor);
            p.update_relation(traitor, -100);
        }
        self.add_update(GameUpdate::BrokeAlliance { traitor, betrayed });
        true
    }

    /// End alliances older than the configured duration.
    pub fn expire_alliances(&mut self) {
        let duration = self.config.alliance_duration;
        let ticks = self.ticks;
        let mut expired = Vec::new();
        for p in &self.players {
            for (&other, &since) in &p.alliances {
                if p.small_id < other && ticks.saturating_sub(since) >= duration {
                    expired.push((p.small_id, other));
                }
            }
        }
        for (a, b) in expired {
            if let Some(p) = self.player_mut(a) {
                p.alliances.remove(&b);
            }
            if let Some(p) = self.player_mut(b) {
                p.alliances.remove(&a);
            }
            self.add_update(GameUpdate::AllianceExpired { player1: a, player2: b });
        }
    }

    /// Move all relation scores one step toward neutral on the decay interval.
    pub fn decay_relations(&mut self) {
        let interval = self.config.relation_decay_interval.max(1);
        if self.ticks % interval != 0 {
            return;
        }
        for p in &mut self.players {
            p.decay_relations();
        }
    }

    /// May `sender` send an emoji to `recipient` (`None` for everyone)?
    pub fn can_send_emoji(&self, sender: SmallId, recipient: Option<SmallId>) -> bool {
        let Some(p) = self.player(sender) else {
            return false;
        };
        if recipient == Some(sender) {
            return false;
        }
        let cooldown = self.config.emoji_message_cooldown;
        !p.outgoing_emojis.iter().any(|e| {
            let same = match (e.recipient, recipient) {
                (Recipient::AllPlayers, None) => true,
                (Recipient::Player(a), Some(b)) => a == b,
                _ => false,
            };
            same && self.ticks.saturating_sub(e.created_at) < cooldown
        })
    }

    /// May `player` donate to `recipient` now?
    pub fn can_donate(&self, player: SmallId, recipient: SmallId) -> bool {
        let Some(p) = self.player(player) else {
            return false;
        };
        if player == recipient || !p.is_allied_with(recipient) {
            return false;
        }
        match p.last_donation {
            Some(at) => self.ticks.saturating_sub(at) >= self.config.donate_cooldown,
            None => true,
        }
    }

    /// May `player` mark `target` now?
    pub fn can_target(&self, player: SmallId, target: SmallId) -> bool {
        let Some(p) = self.player(player) else {
            return false;
        };
        if player == target || p.is_allied_with(target) || self.player(target).is_none() {
            return false;
        }
        match p.last_target {
            Some(at) => self.ticks.saturating_sub(at) >= self.config.target_cooldown,
            None => true,
        }
    }

    // =========================================================================
    // Units
    // =========================================================================

    /// All units, including inactive tombstones.
    #[inline]
    pub fn units(&self) -> &[UnitState] {
        &self.units
    }

    /// Unit by id.
    #[inline]
    pub fn unit(&self, id: UnitId) -> Option<&UnitState> {
        self.units.get(id.0 as usize)
    }

    /// Active unit by id.
    #[inline]
    pub fn active_unit(&self, id: UnitId) -> Option<&UnitState> {
        self.unit(id).filter(|u| u.active)
    }

    /// Mutable unit by id.
    #[inline]
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut UnitState> {
        self.units.get_mut(id.0 as usize)
    }

    /// Active units of one type owned by `owner`, in id order.
    pub fn units_of(&self, owner: SmallId, unit_type: UnitType) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.active && u.owner == owner && u.unit_type == unit_type)
            .map(|u| u.id)
            .collect()
    }

    /// Active units of one type, any owner.
    pub fn units_of_type(&self, unit_type: UnitType) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|u| u.active && u.unit_type == unit_type)
            .map(|u| u.id)
            .collect()
    }

    /// Units a player owns of a type, counting constructions of that type.
    pub fn units_owned_count(&self, owner: SmallId, unit_type: UnitType) -> u64 {
        self.units
            .iter()
            .filter(|u| {
                u.active
                    && u.owner == owner
                    && (u.unit_type == unit_type || u.construction_type == Some(unit_type))
            })
            .count() as u64
    }

    /// Active units of the given types within euclidean `range` of `tile`,
    /// with their squared distance, in id order.
    pub fn nearby_units(&self, tile: TileRef, range: u32, types: &[UnitType]) -> Vec<(UnitId, u64)> {
        let range2 = range as u64 * range as u64;
        self.units
            .iter()
            .filter(|u| u.active && types.contains(&u.unit_type))
            .filter_map(|u| {
                let d = self.map.euclidean_dist_squared(tile, u.tile);
                (d <= range2).then_some((u.id, d))
            })
            .collect()
    }

    /// Does `owner` have a defense post within range of `tile`?
    pub fn defense_post_in_range(&self, owner: SmallId, tile: TileRef) -> bool {
        self.nearby_units(tile, self.config.defense_post_range, &[UnitType::DefensePost])
            .iter()
            .any(|(id, _)| self.unit(*id).map(|u| u.owner == owner).unwrap_or(false))
    }

    /// Gold cost of the next unit of a type for `owner`.
    pub fn unit_cost(&self, owner: SmallId, unit_type: UnitType) -> u64 {
        match self.player(owner) {
            Some(p) => unit_cost(
                &self.config,
                p.player_type(),
                unit_type,
                self.units_owned_count(owner, unit_type),
            ),
            None => u64::MAX,
        }
    }

    /// Where `owner` could place a unit of `unit_type` aimed at `tile`, if at all.
    ///
    /// For ships and nukes the returned tile is the launch point (a port,
    /// shore tile or silo); for structures it is the build site.
    pub fn can_build(&self, owner: SmallId, unit_type: UnitType, tile: TileRef) -> Option<TileRef> {
        let player = self.player(owner)?;
        if !self.map.is_valid(tile) || player.eliminated {
            return None;
        }
        if player.gold < self.unit_cost(owner, unit_type) {
            return None;
        }
        match unit_type {
            UnitType::AtomBomb | UnitType::HydrogenBomb => {
                if self.config.disable_nukes {
                    return None;
                }
                self.units_of(owner, UnitType::MissileSilo)
                    .into_iter()
                    .filter_map(|id| self.unit(id))
                    .filter(|silo| !silo.in_cooldown())
                    .min_by_key(|silo| (self.map.euclidean_dist_squared(silo.tile, tile), silo.id))
                    .map(|silo| silo.tile)
            }
            UnitType::Port => {
                let radius = self.config.radius_port_spawn;
                self.map
                    .tiles_within(tile, radius)
                    .into_iter()
                    .filter(|&t| self.owner_id(t) == owner && self.map.is_land(t) && self.map.is_shoreline(t))
                    .filter(|&t| self.structure_site_free(t))
                    .min_by_key(|&t| (self.map.manhattan_dist(t, tile), t))
            }
            UnitType::MissileSilo | UnitType::DefensePost | UnitType::City => {
                (self.owner_id(tile) == owner && self.map.is_land(tile) && self.structure_site_free(tile))
                    .then_some(tile)
            }
            UnitType::Warship => {
                if !self.map.is_ocean(tile) {
                    return None;
                }
                self.units_of(owner, UnitType::Port)
                    .into_iter()
                    .filter_map(|id| self.unit(id))
                    .min_by_key(|port| (self.map.manhattan_dist(port.tile, tile), port.id))
                    .map(|port| port.tile)
            }
            UnitType::TransportShip => {
                let boats = self.units_of(owner, UnitType::TransportShip).len() as u32;
                if boats >= self.config.boat_max_number {
                    return None;
                }
                self.closest_shore_tile(owner, tile)
            }
            UnitType::TradeShip => {
                (!self.units_of(owner, UnitType::Port).is_empty()).then_some(tile)
            }
            UnitType::Shell | UnitType::Construction => Some(tile),
        }
    }

    fn structure_site_free(&self, tile: TileRef) -> bool {
        self.nearby_units(tile, self.config.structure_min_dist, &STRUCTURE_TYPES).is_empty()
    }

    /// Create a unit, charge its cost to the owner and announce it.
    pub fn build_unit(&mut self, unit_type: UnitType, owner: SmallId, tile: TileRef, params: UnitParams) -> UnitId {
        let cost = self.unit_cost(owner, unit_type);
        if let Some(p) = self.player_mut(owner) {
            p.remove_gold(cost);
        }
        let id = UnitId(self.units.len() as u32);
        let health = match unit_type {
            UnitType::Warship => Some(self.config.warship_max_health),
            _ => None,
        };
        self.units.push(UnitState {
            id,
            unit_type,
            owner,
            tile,
            last_tile: tile,
            health,
            troops: params.troops,
            active: true,
            cooldown_start: None,
            move_target: None,
            target_unit: None,
            dst_port: params.dst_port,
            detonation_dst: params.detonation_dst,
            construction_type: params.construction_type,
            created_at: self.ticks,
        });
        self.push_unit_update(id);
        id
    }

    /// Move a unit to `tile`.
    pub fn move_unit(&mut self, id: UnitId, tile: TileRef) {
        if let Some(u) = self.unit_mut(id) {
            u.last_tile = u.tile;
            u.tile = tile;
        }
        self.push_unit_update(id);
    }

    /// Delete a unit, leaving an inactive tombstone.
    pub fn delete_unit(&mut self, id: UnitId) {
        match self.unit_mut(id) {
            Some(u) if u.active => u.active = false,
            _ => return,
        }
        self.push_unit_update(id);
    }

    /// Transfer a unit to a new owner.
    pub fn capture_unit(&mut self, id: UnitId, new_owner: SmallId) {
        if self.player(new_owner).is_none() {
            return;
        }
        let Some(u) = self.unit_mut(id) else {
            return;
        };
        if !u.active || u.owner == new_owner {
            return;
        }
        let previous = u.owner;
        u.owner = new_owner;
        let unit_type = u.unit_type;
        self.push_unit_update(id);
        self.display_message(
            format!("{unit_type:?} captured"),
            MessageType::Warn,
            Some(previous),
        );
    }

    /// Apply damage. Units without health are destroyed by any hit.
    pub fn damage_unit(&mut self, id: UnitId, damage: i64) {
        let destroyed = match self.unit_mut(id) {
            Some(u) if u.active => match u.health.as_mut() {
                Some(h) => {
                    *h = (*h - damage).max(0);
                    *h == 0
                }
                None => true,
            },
            _ => return,
        };
        if destroyed {
            self.delete_unit(id);
        } else {
            self.push_unit_update(id);
        }
    }

    /// Set the engaged unit shown to clients.
    pub fn set_target_unit(&mut self, id: UnitId, target: Option<UnitId>) {
        let changed = match self.unit_mut(id) {
            Some(u) if u.target_unit != target => {
                u.target_unit = target;
                true
            }
            _ => false,
        };
        if changed {
            self.push_unit_update(id);
        }
    }

    /// Start or clear a unit's cooldown.
    pub fn set_cooldown(&mut self, id: UnitId, start: Option<u32>) {
        if let Some(u) = self.unit_mut(id) {
            u.cooldown_start = start;
        }
        self.push_unit_update(id);
    }

    fn push_unit_update(&mut self, id: UnitId) {
        let Some(u) = self.unit(id) else {
            return;
        };
        let update = UnitUpdate {
            id: u.id,
            unit_type: u.unit_type,
            owner: u.owner,
            tile: u.tile,
            last_tile: u.last_tile,
            health: u.health,
            troops: u.troops,
            active: u.active,
            target_unit: u.target_unit,
            construction_type: u.construction_type,
        };
        self.add_update(GameUpdate::Unit(update));
    }

    // =========================================================================
    // Attacks
    // =========================================================================

    /// All attacks, including resolved ones.
    #[inline]
    pub fn attacks(&self) -> &[AttackState] {
        &self.attacks
    }

    /// Attack by id.
    #[inline]
    pub fn attack(&self, id: AttackId) -> Option<&AttackState> {
        self.attacks.get(id.0 as usize)
    }

    /// Mutable attack by id.
    #[inline]
    pub fn attack_mut(&mut self, id: AttackId) -> Option<&mut AttackState> {
        self.attacks.get_mut(id.0 as usize)
    }

    /// Register a new attack on both sides.
    pub fn create_attack(
        &mut self,
        attacker: SmallId,
        target: Owner,
        troops: u64,
        source_tile: Option<TileRef>,
    ) -> AttackId {
        let id = AttackId(self.attacks.len() as u32);
        self.attacks.push(AttackState {
            id,
            attacker,
            target,
            troops,
            source_tile,
            retreating: false,
            retreated: false,
            active: true,
        });
        if let Some(p) = self.player_mut(attacker) {
            p.outgoing_attacks.push(id);
        }
        if let Some(p) = target.player().and_then(|t| self.player_mut(t)) {
            p.incoming_attacks.push(id);
        }
        id
    }

    /// Resolve an attack and unlink it from both players.
    pub fn delete_attack(&mut self, id: AttackId) {
        let Some(attack) = self.attack_mut(id) else {
            return;
        };
        attack.active = false;
        let (attacker, target) = (attack.attacker, attack.target);
        if let Some(p) = self.player_mut(attacker) {
            p.outgoing_attacks.retain(|a| *a != id);
        }
        if let Some(p) = target.player().and_then(|t| self.player_mut(t)) {
            p.incoming_attacks.retain(|a| *a != id);
        }
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    /// Folded hash over every piece of simulated state.
    pub fn hash(&self) -> Result<u64, bincode::Error> {
        let mut result = Ok(());
        let hash = compute_state_hash(self.ticks, |h| {
            for &owner in &self.owners {
                h.update_u16(owner);
            }
            h.update_u32(self.num_fallout);
            result = (|| {
                h.update_encoded(&self.fallout)?;
                h.update_encoded(&self.players)?;
                h.update_encoded(&self.units)?;
                h.update_encoded(&self.attacks)?;
                h.update_encoded(&self.alliance_requests)?;
                h.update_encoded(&self.winner)
            })();
        });
        result.map(|()| fold_hash(&hash))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::player::PlayerType;

    pub(crate) fn info(id: &str, player_type: PlayerType) -> PlayerInfo {
        PlayerInfo {
            id: PlayerId::new(id),
            name: id.to_uppercase(),
            player_type,
            client_id: Some(ClientId::new(format!("c-{id}"))),
            flag: String::new(),
        }
    }

    /// 10x10 map: left 6 columns land, right 4 ocean.
    pub(crate) fn coastal_world() -> World {
        let rows: Vec<String> = (0..10).map(|_| "......~~~~".to_string()).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let map = GameMap::from_ascii(&rows).unwrap();
        World::new(
            map,
            GameConfig::default(),
            vec![info("a", PlayerType::Human), info("b", PlayerType::Human)],
        )
    }

    #[test]
    fn test_small_ids_follow_roster() {
        let world = coastal_world();
        assert_eq!(world.player_by_id(&PlayerId::new("a")), Some(1));
        assert_eq!(world.player_by_client(&ClientId::new("c-b")), Some(2));
        assert!(world.player(UNCLAIMED).is_none());
        assert_eq!(world.player(1).unwrap().troops, 25_000);
    }

    #[test]
    fn test_conquer_keeps_partition() {
        let mut world = coastal_world();
        world.conquer(1, 5);
        world.conquer(2, 5);
        assert_eq!(world.owner(5), Owner::Player(2));
        assert!(!world.player(1).unwrap().tiles.contains(&5));
        assert!(world.player(2).unwrap().tiles.contains(&5));

        world.relinquish(5);
        assert_eq!(world.owner(5), Owner::Unclaimed);
        assert!(world.player(2).unwrap().tiles.is_empty());

        let tile_updates = world.take_updates().get(crate::game::updates::GameUpdateType::Tile).len();
        assert_eq!(tile_updates, 3);
    }

    #[test]
    fn test_conquer_captures_structures() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        let city = world.build_unit(UnitType::City, 1, 0, UnitParams::default());
        world.conquer(2, 0);
        assert_eq!(world.unit(city).unwrap().owner, 2);
    }

    #[test]
    fn test_can_build_requires_gold_and_territory() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        assert_eq!(world.can_build(1, UnitType::City, 0), None);

        world.player_mut(1).unwrap().gold = 1_000_000;
        assert_eq!(world.can_build(1, UnitType::City, 0), Some(0));
        assert_eq!(world.can_build(1, UnitType::City, 1), None);

        world.build_unit(UnitType::City, 1, 0, UnitParams::default());
        assert_eq!(world.player(1).unwrap().gold, 875_000);
        world.conquer(1, 2);
        // Another structure within the minimum distance.
        assert_eq!(world.can_build(1, UnitType::City, 2), None);
    }

    #[test]
    fn test_port_snaps_to_shore() {
        let mut world = coastal_world();
        for x in 0..6 {
            world.conquer(1, x);
        }
        world.player_mut(1).unwrap().gold = 1_000_000;
        assert_eq!(world.can_build(1, UnitType::Port, 2), Some(5));
    }

    #[test]
    fn test_damage_unit() {
        let mut world = coastal_world();
        let ship = world.build_unit(UnitType::Warship, 1, 8, UnitParams::default());
        world.damage_unit(ship, 250);
        assert_eq!(world.unit(ship).unwrap().health, Some(750));
        world.damage_unit(ship, 1000);
        assert!(!world.unit(ship).unwrap().active);

        let boat = world.build_unit(UnitType::TransportShip, 1, 8, UnitParams::default());
        world.damage_unit(boat, 1);
        assert!(!world.unit(boat).unwrap().active);
    }

    #[test]
    fn test_alliance_lifecycle() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        world.conquer(2, 9 * 10);
        assert!(world.can_send_alliance_request(1, 2));
        world.create_alliance_request(1, 2);
        assert!(!world.can_send_alliance_request(1, 2));
        assert!(world.resolve_alliance_request(1, 2, true));
        assert!(world.is_friendly(1, 2));

        assert!(world.break_alliance(2, 1));
        assert!(!world.is_friendly(1, 2));
        assert!(world.player(2).unwrap().is_traitor());
    }

    #[test]
    fn test_alliances_expire() {
        let mut world = coastal_world();
        world.create_alliance(1, 2);
        world.ticks = world.config.alliance_duration;
        world.expire_alliances();
        assert!(!world.is_friendly(1, 2));
        let expired = world.take_updates();
        assert_eq!(expired.get(crate::game::updates::GameUpdateType::AllianceExpired).len(), 1);
    }

    #[test]
    fn test_hash_tracks_state() {
        let mut a = coastal_world();
        let b = coastal_world();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        a.conquer(1, 3);
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }
}
