//! Intent Translation
//!
//! Turns intents into executions. Intents are resolved against the world
//! at the start of the tick that consumes them: the sender by client id and
//! every named player by player id. Anything that does not resolve is
//! dropped with a debug log.

use tracing::{debug, warn};

use crate::execution::construction::unit_execution;
use crate::execution::diplomacy::Donation;
use crate::execution::{
    AllianceReplyExecution, AllianceRequestExecution, AttackExecution, BreakAllianceExecution,
    ChatExecution, ConstructionExecution, DonateExecution, EmbargoExecution, EmojiExecution,
    Execution, MoveWarshipExecution, RetreatExecution, SpawnExecution, TargetPlayerExecution,
    TransportShipExecution, TroopRatioExecution,
};
use crate::game::attack::{AttackId, Owner};
use crate::game::intent::{Intent, IntentKind, Turn};
use crate::game::player::{PlayerId, SmallId};
use crate::game::unit::{UnitId, UnitType};
use crate::game::world::World;

/// Translates the intents of one game.
#[derive(Clone, Debug)]
pub struct Executor {
    game_id: String,
}

impl Executor {
    /// Executor for the game with id `game_id`.
    pub fn new(game_id: impl Into<String>) -> Self {
        Self { game_id: game_id.into() }
    }

    /// Executions for every intent of `turn`, in intent order.
    pub fn create_executions(&self, world: &World, turn: &Turn) -> Vec<Execution> {
        if turn.game_id != self.game_id {
            warn!(expected = %self.game_id, got = %turn.game_id, turn = turn.turn_number, "turn for another game");
            return Vec::new();
        }
        turn.intents
            .iter()
            .filter_map(|intent| self.create_execution(world, intent))
            .collect()
    }

    /// Execution for one intent, if its sender and targets resolve.
    pub fn create_execution(&self, world: &World, intent: &Intent) -> Option<Execution> {
        let Some(player) = world.player_by_client(&intent.client_id) else {
            debug!(client = %intent.client_id, "intent from unknown client dropped");
            return None;
        };
        let resolve = |id: &PlayerId| -> Option<SmallId> {
            let found = world.player_by_id(id);
            if found.is_none() {
                debug!(player = %id, "intent names unknown player");
            }
            found
        };
        let owner = |target: &Option<PlayerId>| -> Option<Owner> {
            match target {
                Some(id) => resolve(id).map(Owner::Player),
                None => Some(Owner::Unclaimed),
            }
        };
        let recipient = |target: &Option<PlayerId>| -> Option<Option<SmallId>> {
            match target {
                Some(id) => resolve(id).map(Some),
                None => Some(None),
            }
        };

        let exec = match &intent.kind {
            IntentKind::Spawn { tile } => Execution::Spawn(SpawnExecution::new(player, *tile)),
            IntentKind::Attack { target, troops } => {
                Execution::Attack(AttackExecution::new(player, owner(target)?, Some(*troops)))
            }
            IntentKind::CancelAttack { attack_id } => {
                Execution::Retreat(RetreatExecution::new(player, AttackId(*attack_id)))
            }
            IntentKind::BoatAttack { target, troops, dst } => Execution::TransportShip(
                TransportShipExecution::new(player, owner(target)?, *dst, Some(*troops)),
            ),
            IntentKind::BuildUnit { unit, tile } => match unit {
                UnitType::Port | UnitType::City | UnitType::DefensePost | UnitType::MissileSilo => {
                    Execution::Construction(ConstructionExecution::new(player, *unit, *tile))
                }
                _ => unit_execution(player, *unit, *tile)?,
            },
            IntentKind::MoveWarship { unit_id, tile } => {
                Execution::MoveWarship(MoveWarshipExecution::new(player, UnitId(*unit_id), *tile))
            }
            IntentKind::AllianceRequest { recipient } => {
                Execution::AllianceRequest(AllianceRequestExecution::new(player, resolve(recipient)?))
            }
            IntentKind::AllianceRequestReply { requestor, accept } => Execution::AllianceReply(
                AllianceReplyExecution::new(resolve(requestor)?, player, *accept),
            ),
            IntentKind::BreakAlliance { recipient } => {
                Execution::BreakAlliance(BreakAllianceExecution::new(player, resolve(recipient)?))
            }
            IntentKind::TargetPlayer { target } => {
                Execution::TargetPlayer(TargetPlayerExecution::new(player, resolve(target)?))
            }
            IntentKind::Emoji { recipient: to, emoji } => {
                Execution::Emoji(EmojiExecution::new(player, recipient(to)?, emoji.clone()))
            }
            IntentKind::Chat { recipient: to, message } => {
                Execution::Chat(ChatExecution::new(player, recipient(to)?, message.clone()))
            }
            IntentKind::DonateTroops { recipient, troops } => Execution::Donate(DonateExecution::new(
                player,
                resolve(recipient)?,
                Donation::Troops(*troops),
            )),
            IntentKind::DonateGold { recipient, gold } => Execution::Donate(DonateExecution::new(
                player,
                resolve(recipient)?,
                Donation::Gold(*gold),
            )),
            IntentKind::Embargo { target, action } => {
                Execution::Embargo(EmbargoExecution::new(player, resolve(target)?, *action))
            }
            IntentKind::TroopRatio { ratio } => {
                Execution::TroopRatio(TroopRatioExecution::new(player, *ratio))
            }
        };
        Some(exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::ClientId;
    use crate::game::world::tests::coastal_world;

    fn turn(intents: Vec<Intent>) -> Turn {
        Turn { turn_number: 0, game_id: "g1".to_string(), intents, hash: None }
    }

    fn intent(client: &str, kind: IntentKind) -> Intent {
        Intent::new(ClientId::new(client), kind)
    }

    #[test]
    fn test_intents_map_in_order() {
        let world = coastal_world();
        let executor = Executor::new("g1");
        let execs = executor.create_executions(
            &world,
            &turn(vec![
                intent("c-a", IntentKind::Spawn { tile: 22 }),
                intent("c-b", IntentKind::Attack { target: Some(PlayerId::new("a")), troops: 10 }),
                intent("c-a", IntentKind::BuildUnit { unit: UnitType::City, tile: 22 }),
                intent("c-a", IntentKind::BuildUnit { unit: UnitType::AtomBomb, tile: 99 }),
                intent("c-a", IntentKind::BuildUnit { unit: UnitType::Warship, tile: 99 }),
            ]),
        );
        assert_eq!(execs.len(), 5);
        assert!(matches!(execs[0], Execution::Spawn(_)));
        assert!(matches!(execs[1], Execution::Attack(_)));
        assert!(matches!(execs[2], Execution::Construction(_)));
        assert!(matches!(execs[3], Execution::Nuke(_)));
        assert!(matches!(execs[4], Execution::Warship(_)));
    }

    #[test]
    fn test_unknown_ids_are_dropped() {
        let world = coastal_world();
        let executor = Executor::new("g1");
        let execs = executor.create_executions(
            &world,
            &turn(vec![
                intent("stranger", IntentKind::Spawn { tile: 22 }),
                intent("c-a", IntentKind::TargetPlayer { target: PlayerId::new("nobody") }),
                intent("c-a", IntentKind::BuildUnit { unit: UnitType::Shell, tile: 1 }),
                intent("c-a", IntentKind::Emoji { recipient: None, emoji: "👍".to_string() }),
            ]),
        );
        assert_eq!(execs.len(), 1);
        assert!(matches!(execs[0], Execution::Emoji(_)));
    }

    #[test]
    fn test_turn_for_other_game_ignored() {
        let world = coastal_world();
        let executor = Executor::new("other");
        let execs = executor.create_executions(&world, &turn(vec![intent("c-a", IntentKind::Spawn { tile: 22 })]));
        assert!(execs.is_empty());
    }
}
