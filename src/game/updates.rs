//! Per-Tick Game Updates
//!
//! Everything a tick changed, grouped by kind, for the consumer that renders
//! or records the game. Cleared at the start of every tick.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::game::attack::{AttackId, Owner};
use crate::game::map::TileRef;
use crate::game::player::{PlayerId, PlayerType, Recipient, SmallId};
use crate::game::unit::{UnitId, UnitType};

/// Update kinds, in the fixed order they are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameUpdateType {
    /// Tile ownership/fallout change (packed).
    Tile,
    /// Unit created, moved, damaged or deleted.
    Unit,
    /// Player snapshot.
    Player,
    /// Human-readable notification.
    DisplayEvent,
    /// Alliance proposed.
    AllianceRequest,
    /// Alliance accepted or rejected.
    AllianceRequestReply,
    /// Alliance broken.
    BrokeAlliance,
    /// Alliance ran out.
    AllianceExpired,
    /// Player marked a target.
    TargetPlayer,
    /// Emoji sent.
    Emoji,
    /// Chat line sent.
    Chat,
    /// Game won.
    Win,
    /// Periodic world hash.
    Hash,
}

/// Severity of a display event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Positive outcome.
    Success,
    /// Neutral information.
    Info,
    /// Something to watch.
    Warn,
    /// Something went wrong.
    Error,
}

/// Snapshot of a unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitUpdate {
    /// Id.
    pub id: UnitId,
    /// Kind.
    pub unit_type: UnitType,
    /// Owner.
    pub owner: SmallId,
    /// Current tile.
    pub tile: TileRef,
    /// Previous tile.
    pub last_tile: TileRef,
    /// Hit points.
    pub health: Option<i64>,
    /// Troops carried.
    pub troops: u64,
    /// False when deleted.
    pub active: bool,
    /// Engaged unit.
    pub target_unit: Option<UnitId>,
    /// Structure under construction.
    pub construction_type: Option<UnitType>,
}

/// Snapshot of an attack inside a player update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttackUpdate {
    /// Id.
    pub id: AttackId,
    /// Attacker.
    pub attacker: SmallId,
    /// Defender.
    pub target: Owner,
    /// Troops committed.
    pub troops: u64,
    /// Retreat ordered.
    pub retreating: bool,
}

/// Snapshot of a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    /// Small id.
    pub small_id: SmallId,
    /// Stable id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Controller kind.
    pub player_type: PlayerType,
    /// Alive flag.
    pub is_alive: bool,
    /// Traitor flag.
    pub is_traitor: bool,
    /// Tiles owned.
    pub tiles_owned: u64,
    /// Gold.
    pub gold: u64,
    /// Troops plus workers.
    pub population: u64,
    /// Workers.
    pub workers: u64,
    /// Troops.
    pub troops: u64,
    /// Desired troop share.
    pub target_troop_ratio: f64,
    /// Allies.
    pub allies: Vec<SmallId>,
    /// Embargoed players.
    pub embargoes: Vec<SmallId>,
    /// Current targets.
    pub targets: Vec<SmallId>,
    /// Attacks launched.
    pub outgoing_attacks: Vec<AttackUpdate>,
    /// Attacks received.
    pub incoming_attacks: Vec<AttackUpdate>,
    /// Spawned flag.
    pub has_spawned: bool,
}

/// A single change produced by a tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameUpdate {
    /// Packed tile update, see [`pack_tile_update`].
    Tile {
        /// Packed value.
        update: u64,
    },
    /// Unit snapshot.
    Unit(UnitUpdate),
    /// Player snapshot.
    Player(PlayerUpdate),
    /// Notification.
    DisplayEvent {
        /// Text.
        message: String,
        /// Severity.
        message_type: MessageType,
        /// Only shown to this player when set.
        player: Option<SmallId>,
    },
    /// Alliance proposed.
    AllianceRequest {
        /// Proposer.
        requestor: SmallId,
        /// Addressee.
        recipient: SmallId,
        /// Tick.
        created_at: u32,
    },
    /// Alliance answered.
    AllianceRequestReply {
        /// Proposer.
        requestor: SmallId,
        /// Addressee.
        recipient: SmallId,
        /// Answer.
        accepted: bool,
    },
    /// Alliance broken.
    BrokeAlliance {
        /// Breaker.
        traitor: SmallId,
        /// Other party.
        betrayed: SmallId,
    },
    /// Alliance ran out.
    AllianceExpired {
        /// One party.
        player1: SmallId,
        /// The other party.
        player2: SmallId,
    },
    /// Target marked.
    TargetPlayer {
        /// Marker.
        player: SmallId,
        /// Marked player.
        target: SmallId,
    },
    /// Emoji.
    Emoji {
        /// Sender.
        sender: SmallId,
        /// Recipient.
        recipient: Recipient,
        /// Emoji text.
        emoji: String,
    },
    /// Chat line.
    Chat {
        /// Sender.
        sender: SmallId,
        /// Recipient.
        recipient: Recipient,
        /// Message key.
        message: String,
    },
    /// Winner decided.
    Win {
        /// Winning player.
        winner: PlayerId,
    },
    /// World hash for the desync check.
    Hash {
        /// Tick hashed.
        tick: u32,
        /// Folded hash.
        hash: u64,
    },
}

impl GameUpdate {
    /// Kind of this update.
    pub fn kind(&self) -> GameUpdateType {
        match self {
            GameUpdate::Tile { .. } => GameUpdateType::Tile,
            GameUpdate::Unit(_) => GameUpdateType::Unit,
            GameUpdate::Player(_) => GameUpdateType::Player,
            GameUpdate::DisplayEvent { .. } => GameUpdateType::DisplayEvent,
            GameUpdate::AllianceRequest { .. } => GameUpdateType::AllianceRequest,
            GameUpdate::AllianceRequestReply { .. } => GameUpdateType::AllianceRequestReply,
            GameUpdate::BrokeAlliance { .. } => GameUpdateType::BrokeAlliance,
            GameUpdate::AllianceExpired { .. } => GameUpdateType::AllianceExpired,
            GameUpdate::TargetPlayer { .. } => GameUpdateType::TargetPlayer,
            GameUpdate::Emoji { .. } => GameUpdateType::Emoji,
            GameUpdate::Chat { .. } => GameUpdateType::Chat,
            GameUpdate::Win { .. } => GameUpdateType::Win,
            GameUpdate::Hash { .. } => GameUpdateType::Hash,
        }
    }
}

/// Updates grouped by kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameUpdates {
    by_kind: BTreeMap<GameUpdateType, Vec<GameUpdate>>,
}

impl GameUpdates {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an update under its kind.
    pub fn push(&mut self, update: GameUpdate) {
        self.by_kind.entry(update.kind()).or_default().push(update);
    }

    /// Updates of one kind.
    pub fn get(&self, kind: GameUpdateType) -> &[GameUpdate] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove and return all updates of one kind.
    pub fn take(&mut self, kind: GameUpdateType) -> Vec<GameUpdate> {
        self.by_kind.remove(&kind).unwrap_or_default()
    }

    /// Total number of updates.
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    /// No updates recorded?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate kinds in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (&GameUpdateType, &Vec<GameUpdate>)> {
        self.by_kind.iter()
    }
}

/// Pack a tile change: tile in the high 32 bits, owner in bits 1..16, fallout in bit 0.
#[inline]
pub fn pack_tile_update(tile: TileRef, owner: SmallId, fallout: bool) -> u64 {
    ((tile as u64) << 32) | ((owner as u64 & 0x7FFF) << 1) | fallout as u64
}

/// Inverse of [`pack_tile_update`].
#[inline]
pub fn unpack_tile_update(packed: u64) -> (TileRef, SmallId, bool) {
    (
        (packed >> 32) as TileRef,
        ((packed >> 1) & 0x7FFF) as SmallId,
        packed & 1 == 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_tile_update() {
        let packed = pack_tile_update(123_456, 42, true);
        assert_eq!(unpack_tile_update(packed), (123_456, 42, true));
        assert_eq!(unpack_tile_update(pack_tile_update(0, 0, false)), (0, 0, false));
    }

    #[test]
    fn test_updates_grouped_by_kind() {
        let mut updates = GameUpdates::new();
        updates.push(GameUpdate::Hash { tick: 10, hash: 7 });
        updates.push(GameUpdate::Tile { update: 1 });
        updates.push(GameUpdate::Tile { update: 2 });

        assert_eq!(updates.len(), 3);
        assert_eq!(updates.get(GameUpdateType::Tile).len(), 2);
        let kinds: Vec<_> = updates.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![GameUpdateType::Tile, GameUpdateType::Hash]);

        let tiles = updates.take(GameUpdateType::Tile);
        assert_eq!(tiles.len(), 2);
        assert!(updates.get(GameUpdateType::Tile).is_empty());
    }

    #[test]
    fn test_update_json_tag() {
        let json = serde_json::to_string(&GameUpdate::Hash { tick: 10, hash: 7 }).unwrap();
        assert!(json.contains("\"type\":\"hash\""));
    }
}
