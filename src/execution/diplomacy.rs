//! Diplomacy and other one-shot player actions.
//!
//! Each execution here applies its effect on its first tick and then goes
//! inactive. Invalid requests (cooldowns, unknown recipients) are dropped.

use tracing::debug;

use crate::core::math::floor_u64;
use crate::execution::{ExecutionBehavior, ExecutionQueue};
use crate::game::intent::EmbargoAction;
use crate::game::player::{ChatMessage, EmojiMessage, Recipient, SmallId};
use crate::game::tick::TickError;
use crate::game::updates::{GameUpdate, MessageType};
use crate::game::world::World;

/// Relation gained by the recipient of a donation towards the donor.
const DONATION_RELATION_BONUS: i32 = 50;

/// Share of current troops or gold sent when no amount is given.
const DEFAULT_DONATION_SHARE: f64 = 1.0 / 3.0;

macro_rules! one_shot {
    ($name:ident) => {
        impl ExecutionBehavior for $name {
            fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
                self.active = false;
                self.apply(world);
                Ok(())
            }

            fn is_active(&self) -> bool {
                self.active
            }
        }
    };
}

fn recipient_of(target: Option<SmallId>) -> Recipient {
    match target {
        Some(id) => Recipient::Player(id),
        None => Recipient::AllPlayers,
    }
}

// =============================================================================
// Alliances
// =============================================================================

/// Propose an alliance. A request crossing one already pending in the other
/// direction forms the alliance at once.
#[derive(Debug)]
pub struct AllianceRequestExecution {
    requestor: SmallId,
    recipient: SmallId,
    active: bool,
}

impl AllianceRequestExecution {
    /// `requestor` proposes to `recipient`.
    pub fn new(requestor: SmallId, recipient: SmallId) -> Self {
        Self { requestor, recipient, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if world.pending_request(self.recipient, self.requestor).is_some() {
            world.resolve_alliance_request(self.recipient, self.requestor, true);
        } else if world.can_send_alliance_request(self.requestor, self.recipient) {
            world.create_alliance_request(self.requestor, self.recipient);
        } else {
            debug!(requestor = self.requestor, recipient = self.recipient, "alliance request rejected");
        }
    }
}

one_shot!(AllianceRequestExecution);

/// Answer a pending alliance request.
#[derive(Debug)]
pub struct AllianceReplyExecution {
    requestor: SmallId,
    recipient: SmallId,
    accept: bool,
    active: bool,
}

impl AllianceReplyExecution {
    /// `recipient` answers the request `requestor` sent.
    pub fn new(requestor: SmallId, recipient: SmallId, accept: bool) -> Self {
        Self { requestor, recipient, accept, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if !world.resolve_alliance_request(self.requestor, self.recipient, self.accept) {
            debug!(requestor = self.requestor, recipient = self.recipient, "no pending alliance request");
        }
    }
}

one_shot!(AllianceReplyExecution);

/// Break an alliance; the breaker becomes a traitor.
#[derive(Debug)]
pub struct BreakAllianceExecution {
    traitor: SmallId,
    betrayed: SmallId,
    active: bool,
}

impl BreakAllianceExecution {
    /// `traitor` leaves its alliance with `betrayed`.
    pub fn new(traitor: SmallId, betrayed: SmallId) -> Self {
        Self { traitor, betrayed, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if world.break_alliance(self.traitor, self.betrayed) {
            world.display_message("Your ally broke the alliance", MessageType::Error, Some(self.betrayed));
        }
    }
}

one_shot!(BreakAllianceExecution);

// =============================================================================
// Communication
// =============================================================================

/// Mark a player as a target for allies.
#[derive(Debug)]
pub struct TargetPlayerExecution {
    player: SmallId,
    target: SmallId,
    active: bool,
}

impl TargetPlayerExecution {
    /// `player` marks `target`.
    pub fn new(player: SmallId, target: SmallId) -> Self {
        Self { player, target, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if !world.can_target(self.player, self.target) {
            return;
        }
        let ticks = world.ticks();
        if let Some(p) = world.player_mut(self.player) {
            p.targets.insert(self.target, ticks);
            p.last_target = Some(ticks);
        }
        world.add_update(GameUpdate::TargetPlayer { player: self.player, target: self.target });
    }
}

one_shot!(TargetPlayerExecution);

/// Send an emoji to one player or everyone.
#[derive(Debug)]
pub struct EmojiExecution {
    sender: SmallId,
    recipient: Option<SmallId>,
    emoji: String,
    active: bool,
}

impl EmojiExecution {
    /// `recipient: None` addresses every player.
    pub fn new(sender: SmallId, recipient: Option<SmallId>, emoji: String) -> Self {
        Self { sender, recipient, emoji, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if !world.can_send_emoji(self.sender, self.recipient) {
            debug!(sender = self.sender, "emoji on cooldown");
            return;
        }
        let recipient = recipient_of(self.recipient);
        let ticks = world.ticks();
        let emoji = std::mem::take(&mut self.emoji);
        if let Some(p) = world.player_mut(self.sender) {
            p.outgoing_emojis.push(EmojiMessage {
                message: emoji.clone(),
                sender: self.sender,
                recipient,
                created_at: ticks,
            });
        }
        world.add_update(GameUpdate::Emoji { sender: self.sender, recipient, emoji });
    }
}

one_shot!(EmojiExecution);

/// Send a quick-chat line.
#[derive(Debug)]
pub struct ChatExecution {
    sender: SmallId,
    recipient: Option<SmallId>,
    message: String,
    active: bool,
}

impl ChatExecution {
    /// `recipient: None` addresses every player.
    pub fn new(sender: SmallId, recipient: Option<SmallId>, message: String) -> Self {
        Self { sender, recipient, message, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if self.recipient == Some(self.sender) {
            return;
        }
        if let Some(r) = self.recipient {
            if world.player(r).is_none() {
                return;
            }
        }
        let recipient = recipient_of(self.recipient);
        let ticks = world.ticks();
        let message = std::mem::take(&mut self.message);
        let Some(p) = world.player_mut(self.sender) else {
            return;
        };
        p.outgoing_chat.push(ChatMessage {
            sender: self.sender,
            recipient,
            message: message.clone(),
            created_at: ticks,
        });
        world.add_update(GameUpdate::Chat { sender: self.sender, recipient, message });
    }
}

one_shot!(ChatExecution);

// =============================================================================
// Economy
// =============================================================================

/// What a donation sends. `None` sends a third of the current stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Donation {
    /// Troops.
    Troops(Option<u64>),
    /// Gold.
    Gold(Option<u64>),
}

/// Give troops or gold to an ally.
#[derive(Debug)]
pub struct DonateExecution {
    sender: SmallId,
    recipient: SmallId,
    donation: Donation,
    active: bool,
}

impl DonateExecution {
    /// `sender` gives `donation` to `recipient`.
    pub fn new(sender: SmallId, recipient: SmallId, donation: Donation) -> Self {
        Self { sender, recipient, donation, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if !world.can_donate(self.sender, self.recipient) {
            debug!(sender = self.sender, recipient = self.recipient, "donation not allowed");
            return;
        }
        let ticks = world.ticks();
        let Some(sender) = world.player_mut(self.sender) else {
            return;
        };
        let sent = match self.donation {
            Donation::Troops(amount) => {
                let amount = amount.unwrap_or(floor_u64(sender.troops as f64 * DEFAULT_DONATION_SHARE));
                Donation::Troops(Some(sender.remove_troops(amount)))
            }
            Donation::Gold(amount) => {
                let amount = amount.unwrap_or(floor_u64(sender.gold as f64 * DEFAULT_DONATION_SHARE));
                Donation::Gold(Some(sender.remove_gold(amount)))
            }
        };
        sender.last_donation = Some(ticks);

        let Some(recipient) = world.player_mut(self.recipient) else {
            return;
        };
        let text = match sent {
            Donation::Troops(amount) => {
                let amount = amount.unwrap_or(0);
                recipient.troops += amount;
                format!("Received {amount} troops")
            }
            Donation::Gold(amount) => {
                let amount = amount.unwrap_or(0);
                recipient.gold = recipient.gold.saturating_add(amount);
                format!("Received {amount} gold")
            }
        };
        recipient.update_relation(self.sender, DONATION_RELATION_BONUS);
        world.display_message(text, MessageType::Success, Some(self.recipient));
    }
}

one_shot!(DonateExecution);

/// Start or stop trading with a player.
#[derive(Debug)]
pub struct EmbargoExecution {
    player: SmallId,
    target: SmallId,
    action: EmbargoAction,
    active: bool,
}

impl EmbargoExecution {
    /// `player` starts or stops an embargo against `target`.
    pub fn new(player: SmallId, target: SmallId, action: EmbargoAction) -> Self {
        Self { player, target, action, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if self.player == self.target || world.player(self.target).is_none() {
            return;
        }
        let Some(p) = world.player_mut(self.player) else {
            return;
        };
        match self.action {
            EmbargoAction::Start => p.embargoes.insert(self.target),
            EmbargoAction::Stop => p.embargoes.remove(&self.target),
        };
    }
}

one_shot!(EmbargoExecution);

/// Set the share of population a player wants as troops.
#[derive(Debug)]
pub struct TroopRatioExecution {
    player: SmallId,
    ratio: f64,
    active: bool,
}

impl TroopRatioExecution {
    /// Ratios outside [0, 1] are clamped; non-finite ones are ignored.
    pub fn new(player: SmallId, ratio: f64) -> Self {
        Self { player, ratio, active: true }
    }

    fn apply(&mut self, world: &mut World) {
        if !self.ratio.is_finite() {
            return;
        }
        if let Some(p) = world.player_mut(self.player) {
            p.target_troop_ratio = self.ratio.clamp(0.0, 1.0);
        }
    }
}

one_shot!(TroopRatioExecution);
