//! Intents and Turns
//!
//! An intent is one player action as submitted over the wire. The relay
//! batches intents into turns; every replica feeds the same turns to its
//! engine in the same order.

use serde::{Serialize, Deserialize};

use crate::game::map::TileRef;
use crate::game::player::{ClientId, PlayerId};
use crate::game::unit::UnitType;

/// Start or stop an embargo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbargoAction {
    /// Stop trading with the target.
    Start,
    /// Resume trading.
    Stop,
}

/// What the player wants to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum IntentKind {
    /// Place (or move, during spawn phase) the starting territory.
    Spawn {
        /// Chosen land tile.
        tile: TileRef,
    },
    /// Land attack. `target: None` expands into unclaimed land.
    Attack {
        /// Defender.
        target: Option<PlayerId>,
        /// Troops to commit.
        troops: u64,
    },
    /// Order an outgoing attack to retreat.
    CancelAttack {
        /// Attack id.
        attack_id: u32,
    },
    /// Send troops by transport ship to a shore tile.
    BoatAttack {
        /// Defender (`None` for unclaimed land).
        target: Option<PlayerId>,
        /// Troops to embark.
        troops: u64,
        /// Landing tile.
        dst: TileRef,
    },
    /// Build a structure, warship or nuke.
    BuildUnit {
        /// What to build.
        unit: UnitType,
        /// Where (or, for nukes, the impact tile).
        tile: TileRef,
    },
    /// Order a warship to a tile.
    MoveWarship {
        /// Warship id.
        unit_id: u32,
        /// Destination.
        tile: TileRef,
    },
    /// Propose an alliance.
    AllianceRequest {
        /// Addressee.
        recipient: PlayerId,
    },
    /// Answer an alliance proposal.
    AllianceRequestReply {
        /// Proposer.
        requestor: PlayerId,
        /// Answer.
        accept: bool,
    },
    /// Break an existing alliance.
    BreakAlliance {
        /// Current ally.
        recipient: PlayerId,
    },
    /// Mark a player as a target for allies.
    TargetPlayer {
        /// Player to mark.
        target: PlayerId,
    },
    /// Send an emoji (`recipient: None` addresses everyone).
    Emoji {
        /// Addressee.
        recipient: Option<PlayerId>,
        /// Emoji text.
        emoji: String,
    },
    /// Send a quick-chat line (`recipient: None` addresses everyone).
    Chat {
        /// Addressee.
        recipient: Option<PlayerId>,
        /// Message key.
        message: String,
    },
    /// Give troops to an ally. `None` sends a third of current troops.
    DonateTroops {
        /// Ally.
        recipient: PlayerId,
        /// Amount.
        troops: Option<u64>,
    },
    /// Give gold to an ally. `None` sends a third of current gold.
    DonateGold {
        /// Ally.
        recipient: PlayerId,
        /// Amount.
        gold: Option<u64>,
    },
    /// Start or stop an embargo.
    Embargo {
        /// Other player.
        target: PlayerId,
        /// Start/stop.
        action: EmbargoAction,
    },
    /// Change the desired troop share of population.
    TroopRatio {
        /// Ratio in [0, 1].
        ratio: f64,
    },
}

/// One player action, attributed to the client that sent it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Sending client.
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    /// Action.
    #[serde(flatten)]
    pub kind: IntentKind,
}

impl Intent {
    /// Build an intent for a client.
    pub fn new(client_id: ClientId, kind: IntentKind) -> Self {
        Self { client_id, kind }
    }
}

/// A batch of intents applied atomically as one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Position in the turn log (equals the tick it produces).
    pub turn_number: u32,
    /// Game the turn belongs to.
    #[serde(rename = "gameID")]
    pub game_id: String,
    /// Intents in arrival order.
    pub intents: Vec<Intent>,
    /// World hash agreed on by the majority, once checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<u64>,
}

impl Turn {
    /// Turn without intents.
    pub fn empty(turn_number: u32, game_id: impl Into<String>) -> Self {
        Self { turn_number, game_id: game_id.into(), intents: Vec::new(), hash: None }
    }
}
