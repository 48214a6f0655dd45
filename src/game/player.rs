//! Player State
//!
//! Players live in a dense array inside the world and are addressed by their
//! small id (array index + 1). Small id 0 is reserved for unclaimed land.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::attack::AttackId;
use crate::game::map::TileRef;

/// Compact per-game player index. `0` is unclaimed land.
pub type SmallId = u16;

/// Owner index of unclaimed land.
pub const UNCLAIMED: SmallId = 0;

/// Stable player identifier shared by every replica.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a connected client.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who controls a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerType {
    /// Connected human.
    Human,
    /// Simple AI filler.
    Bot,
    /// Nation AI that behaves like a human.
    FakeHuman,
}

/// Coarse relation derived from the relation score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Relation {
    /// Score <= -50.
    Hostile = 0,
    /// Score in (-50, 0).
    Distrustful = 1,
    /// Score in [0, 50).
    Neutral = 2,
    /// Score >= 50.
    Friendly = 3,
}

impl Relation {
    /// Map a score in [-100, 100] to a relation.
    pub fn from_score(score: i32) -> Self {
        if score <= -50 {
            Relation::Hostile
        } else if score < 0 {
            Relation::Distrustful
        } else if score < 50 {
            Relation::Neutral
        } else {
            Relation::Friendly
        }
    }
}

/// Recipient of an emoji or chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// Everyone in the game.
    AllPlayers,
    /// One player.
    Player(SmallId),
}

/// An emoji sent by a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmojiMessage {
    /// Emoji text.
    pub message: String,
    /// Sender small id.
    pub sender: SmallId,
    /// Recipient.
    pub recipient: Recipient,
    /// Tick it was sent.
    pub created_at: u32,
}

/// A quick-chat line sent by a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender small id.
    pub sender: SmallId,
    /// Recipient.
    pub recipient: Recipient,
    /// Message key.
    pub message: String,
    /// Tick it was sent.
    pub created_at: u32,
}

/// Roster entry a player is created from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Stable id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Controller kind.
    pub player_type: PlayerType,
    /// Owning client, if human.
    pub client_id: Option<ClientId>,
    /// Flag code.
    pub flag: String,
}

/// State of a single player.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerState {
    /// Index into the world's player array, plus one.
    pub small_id: SmallId,
    /// Roster data.
    pub info: PlayerInfo,

    /// Gold treasury.
    pub gold: u64,
    /// Troops available for attacks.
    pub troops: u64,
    /// Working population producing gold.
    pub workers: u64,
    /// Fraction of population the player wants as troops.
    pub target_troop_ratio: f64,

    /// Owned tiles.
    pub tiles: BTreeSet<TileRef>,
    /// Relation scores towards other players, in [-100, 100].
    pub relations: BTreeMap<SmallId, i32>,
    /// Allies and the tick each alliance was formed.
    pub alliances: BTreeMap<SmallId, u32>,
    /// Players this player refuses to trade with.
    pub embargoes: BTreeSet<SmallId>,
    /// Players marked as targets and the tick they were marked.
    pub targets: BTreeMap<SmallId, u32>,
    /// Emojis sent, newest last.
    pub outgoing_emojis: Vec<EmojiMessage>,
    /// Chat lines sent, newest last.
    pub outgoing_chat: Vec<ChatMessage>,
    /// Attacks this player launched.
    pub outgoing_attacks: Vec<AttackId>,
    /// Attacks against this player.
    pub incoming_attacks: Vec<AttackId>,

    /// Tick the player last broke an alliance.
    pub traitor_since: Option<u32>,
    /// Has the player placed its spawn?
    pub has_spawned: bool,
    /// Eliminated players never act again.
    pub eliminated: bool,
    /// Tick of the last donation sent.
    pub last_donation: Option<u32>,
    /// Tick of the last target mark.
    pub last_target: Option<u32>,
    /// Tick of the last ownership change.
    pub last_tile_change: u32,
}

impl PlayerState {
    /// Create a player from its roster entry.
    pub fn new(small_id: SmallId, info: PlayerInfo, start_troops: u64) -> Self {
        Self {
            small_id,
            info,
            gold: 0,
            troops: start_troops,
            workers: 0,
            target_troop_ratio: 0.95,
            tiles: BTreeSet::new(),
            relations: BTreeMap::new(),
            alliances: BTreeMap::new(),
            embargoes: BTreeSet::new(),
            targets: BTreeMap::new(),
            outgoing_emojis: Vec::new(),
            outgoing_chat: Vec::new(),
            outgoing_attacks: Vec::new(),
            incoming_attacks: Vec::new(),
            traitor_since: None,
            has_spawned: false,
            eliminated: false,
            last_donation: None,
            last_target: None,
            last_tile_change: 0,
        }
    }

    /// Stable id.
    #[inline]
    pub fn id(&self) -> &PlayerId {
        &self.info.id
    }

    /// Controller kind.
    #[inline]
    pub fn player_type(&self) -> PlayerType {
        self.info.player_type
    }

    /// Troops plus workers.
    #[inline]
    pub fn population(&self) -> u64 {
        self.troops + self.workers
    }

    /// Number of owned tiles.
    #[inline]
    pub fn num_tiles_owned(&self) -> u64 {
        self.tiles.len() as u64
    }

    /// A player is alive while it owns territory.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.eliminated && !self.tiles.is_empty()
    }

    /// Did the player break an alliance recently?
    #[inline]
    pub fn is_traitor(&self) -> bool {
        self.traitor_since.is_some()
    }

    /// Remove up to `amount` troops and return how many were removed.
    pub fn remove_troops(&mut self, amount: u64) -> u64 {
        let removed = amount.min(self.troops);
        self.troops -= removed;
        removed
    }

    /// Remove up to `amount` gold and return how much was removed.
    pub fn remove_gold(&mut self, amount: u64) -> u64 {
        let removed = amount.min(self.gold);
        self.gold -= removed;
        removed
    }

    /// Relation score towards another player (0 if never interacted).
    pub fn relation_score(&self, other: SmallId) -> i32 {
        self.relations.get(&other).copied().unwrap_or(0)
    }

    /// Coarse relation towards another player.
    pub fn relation(&self, other: SmallId) -> Relation {
        Relation::from_score(self.relation_score(other))
    }

    /// Adjust the relation score, clamped to [-100, 100].
    pub fn update_relation(&mut self, other: SmallId, delta: i32) {
        let score = (self.relation_score(other) + delta).clamp(-100, 100);
        self.relations.insert(other, score);
    }

    /// Move every relation score one point toward zero.
    pub fn decay_relations(&mut self) {
        for score in self.relations.values_mut() {
            *score -= score.signum();
        }
        self.relations.retain(|_, score| *score != 0);
    }

    /// Allied with `other`?
    #[inline]
    pub fn is_allied_with(&self, other: SmallId) -> bool {
        self.alliances.contains_key(&other)
    }

    /// Friendly players are never targeted by this player's weapons.
    #[inline]
    pub fn is_friendly(&self, other: SmallId) -> bool {
        other == self.small_id || self.is_allied_with(other)
    }

    /// Has this player embargoed `other`?
    #[inline]
    pub fn has_embargo_against(&self, other: SmallId) -> bool {
        self.embargoes.contains(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> PlayerState {
        PlayerState::new(
            1,
            PlayerInfo {
                id: PlayerId::new("p1"),
                name: "Alice".into(),
                player_type: PlayerType::Human,
                client_id: Some(ClientId::new("c1")),
                flag: String::new(),
            },
            25_000,
        )
    }

    #[test]
    fn test_relation_thresholds() {
        assert_eq!(Relation::from_score(-100), Relation::Hostile);
        assert_eq!(Relation::from_score(-50), Relation::Hostile);
        assert_eq!(Relation::from_score(-1), Relation::Distrustful);
        assert_eq!(Relation::from_score(0), Relation::Neutral);
        assert_eq!(Relation::from_score(50), Relation::Friendly);
    }

    #[test]
    fn test_update_relation_clamps() {
        let mut p = player();
        p.update_relation(2, 250);
        assert_eq!(p.relation_score(2), 100);
        p.update_relation(2, -500);
        assert_eq!(p.relation_score(2), -100);
    }

    #[test]
    fn test_decay_relations_moves_toward_zero() {
        let mut p = player();
        p.update_relation(2, 2);
        p.update_relation(3, -1);
        p.decay_relations();
        assert_eq!(p.relation_score(2), 1);
        assert_eq!(p.relation_score(3), 0);
        assert!(!p.relations.contains_key(&3));
    }

    #[test]
    fn test_remove_troops_saturates() {
        let mut p = player();
        assert_eq!(p.remove_troops(30_000), 25_000);
        assert_eq!(p.troops, 0);
    }

    #[test]
    fn test_player_id_serializes_as_string() {
        let json = serde_json::to_string(&PlayerId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
