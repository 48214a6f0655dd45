//! Combat & Economy Formulas
//!
//! Pure functions of their inputs. They return floating point values; the
//! engine floors every result before it touches world state, which keeps all
//! replicas on the same integer trajectory.

use crate::core::math::{floor_u64, within};
use crate::game::config::GameConfig;
use crate::game::map::Terrain;
use crate::game::player::PlayerType;
use crate::game::unit::UnitType;

/// Formula evaluation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    /// Water tiles cannot be conquered by land.
    #[error("terrain {0:?} not supported")]
    UnsupportedTerrain(Terrain),
}

/// The attacking side of a combat evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attacker {
    /// Controller kind.
    pub player_type: PlayerType,
    /// Troops committed to the attack.
    pub troops: f64,
    /// Tiles the attacker owns.
    pub tiles_owned: u64,
}

/// The defending side of a combat evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Defender {
    /// A player.
    Player {
        /// Controller kind.
        player_type: PlayerType,
        /// Troops.
        troops: f64,
        /// Troops plus workers.
        population: f64,
        /// Tiles owned.
        tiles_owned: u64,
        /// Broke an alliance recently.
        is_traitor: bool,
    },
    /// Unclaimed land.
    Unclaimed,
}

/// Conditions on the tile being conquered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileConditions {
    /// Terrain of the tile.
    pub terrain: Terrain,
    /// A defense post owned by the defender is within range.
    pub defense_post_in_range: bool,
    /// Fallout ratio (fallout tiles / land tiles) if the tile has fallout.
    pub fallout_ratio: Option<f64>,
}

/// Result of conquering one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttackOutcome {
    /// Troops the attack loses.
    pub attacker_troop_loss: f64,
    /// Troops the defender loses.
    pub defender_troop_loss: f64,
    /// Share of the per-tick tile budget consumed.
    pub tiles_per_tick_used: f64,
}

/// Base `(magnitude, speed)` for a terrain.
pub fn terrain_magnitude(terrain: Terrain) -> Result<(f64, f64), FormulaError> {
    match terrain {
        Terrain::Plains => Ok((85.0, 16.5)),
        Terrain::Highland => Ok((100.0, 20.0)),
        Terrain::Mountain => Ok((120.0, 25.0)),
        other => Err(FormulaError::UnsupportedTerrain(other)),
    }
}

/// Defense multiplier on fallout tiles.
#[inline]
pub fn fallout_defense_modifier(fallout_ratio: f64) -> f64 {
    5.0 - fallout_ratio * 2.0
}

/// Cost of conquering one tile.
pub fn attack_logic(
    config: &GameConfig,
    attacker: &Attacker,
    defender: &Defender,
    tile: &TileConditions,
) -> Result<AttackOutcome, FormulaError> {
    let (mut mag, mut speed) = terrain_magnitude(tile.terrain)?;

    if matches!(defender, Defender::Player { .. }) && tile.defense_post_in_range {
        mag *= config.defense_post_defense_bonus;
        speed *= config.defense_post_defense_bonus;
    }

    if let Some(ratio) = tile.fallout_ratio {
        mag *= fallout_defense_modifier(ratio);
        speed *= fallout_defense_modifier(ratio);
    }

    if let Defender::Player { player_type: PlayerType::Bot, .. } = defender {
        if matches!(attacker.player_type, PlayerType::Human | PlayerType::FakeHuman) {
            mag *= 0.8;
        }
    }

    let tiles = attacker.tiles_owned as f64;
    let large_loss_modifier = if attacker.tiles_owned > 100_000 {
        (100_000.0 / tiles).sqrt()
    } else {
        1.0
    };
    let large_speed_malus = if attacker.tiles_owned > 75_000 {
        (75_000.0 / tiles).powf(0.6)
    } else {
        1.0
    };

    match *defender {
        Defender::Player { troops, population, tiles_owned, is_traitor, .. } => {
            let ratio = within((troops / attacker.troops).powf(0.4), 0.1, 10.0);
            let speed_ratio = within(troops / (5.0 * attacker.troops), 0.1, 10.0);
            let traitor = if is_traitor { config.traitor_defense_debuff } else { 1.0 };

            Ok(AttackOutcome {
                attacker_troop_loss: ratio * mag * large_loss_modifier * traitor,
                defender_troop_loss: population / (tiles_owned.max(1) as f64),
                tiles_per_tick_used: (speed_ratio * speed * large_speed_malus).floor(),
            })
        }
        Defender::Unclaimed => Ok(AttackOutcome {
            attacker_troop_loss: if attacker.player_type == PlayerType::Bot {
                mag / 10.0
            } else {
                mag / 5.0
            },
            defender_troop_loss: 0.0,
            tiles_per_tick_used: within(2000.0 * speed.max(10.0) / attacker.troops, 5.0, 100.0),
        }),
    }
}

/// Tile budget an attack gets per tick.
pub fn attack_tiles_per_tick(attack_troops: f64, defender: &Defender, num_adjacent_tiles: u64) -> f64 {
    let adjacent = num_adjacent_tiles as f64;
    match *defender {
        Defender::Player { troops, .. } => {
            within(5.0 * attack_troops / troops.max(1.0) * 2.0, 0.01, 0.5) * adjacent * 3.0
        }
        Defender::Unclaimed => adjacent * 2.0,
    }
}

/// Inputs of the population/economy formulas for one player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Economy {
    /// Controller kind.
    pub player_type: PlayerType,
    /// Tiles owned.
    pub tiles_owned: u64,
    /// Cities owned.
    pub cities: u64,
    /// Troops.
    pub troops: f64,
    /// Workers.
    pub workers: f64,
    /// Desired troop share.
    pub target_troop_ratio: f64,
}

impl Economy {
    fn population(&self) -> f64 {
        self.troops + self.workers
    }
}

/// Population cap.
pub fn max_population(config: &GameConfig, economy: &Economy) -> f64 {
    if economy.player_type == PlayerType::Human && config.infinite_troops {
        return 1_000_000_000.0;
    }
    let max = 2.0 * ((economy.tiles_owned as f64).powf(0.6) * 1000.0 + 50_000.0)
        + economy.cities as f64 * config.city_population_increase as f64;
    if economy.player_type == PlayerType::Bot {
        max / 2.0
    } else {
        max
    }
}

/// Population growth this tick.
pub fn population_increase_rate(config: &GameConfig, economy: &Economy) -> f64 {
    let max = max_population(config, economy);
    let population = economy.population();

    let mut to_add = 10.0 + population.powf(0.73) / 4.0;
    to_add *= 1.0 - population / max;
    if economy.player_type == PlayerType::Bot {
        to_add *= 0.7;
    }

    (population + to_add).min(max) - population
}

/// Gold income this tick.
pub fn gold_addition_rate(economy: &Economy) -> f64 {
    let population = economy.population();
    if population <= 0.0 {
        return 0.0;
    }
    let ratio = (economy.workers / population).powf(1.3);
    (economy.workers.sqrt() * ratio * 5.0).floor()
}

/// Troop change this tick: toward population * target ratio, ramping down 5x faster.
pub fn troop_adjustment_rate(config: &GameConfig, economy: &Economy) -> f64 {
    let max_diff = max_population(config, economy) / 1000.0;
    let target = economy.population() * economy.target_troop_ratio;
    let diff = target - economy.troops;
    if diff.abs() < max_diff {
        return diff;
    }
    let adjustment = max_diff * diff.signum();
    if adjustment < 0.0 {
        adjustment * 5.0
    } else {
        adjustment
    }
}

/// Starting troops.
pub fn start_manpower(config: &GameConfig, player_type: PlayerType) -> u64 {
    match player_type {
        PlayerType::Bot => config.start_manpower_bot,
        _ if config.infinite_troops => 1_000_000,
        _ => config.start_manpower_human,
    }
}

/// Gold cost of the next unit of a type, given how many the player owns
/// (including constructions).
pub fn unit_cost(config: &GameConfig, player_type: PlayerType, unit: UnitType, owned: u64) -> u64 {
    if player_type == PlayerType::Human && config.infinite_gold {
        return 0;
    }
    match unit {
        UnitType::Warship => (250_000 * (owned + 1)).min(1_000_000),
        UnitType::Port | UnitType::City => {
            (2u64.saturating_pow(owned.min(63) as u32).saturating_mul(125_000)).min(1_000_000)
        }
        UnitType::AtomBomb => 750_000,
        UnitType::HydrogenBomb => 5_000_000,
        UnitType::MissileSilo => 1_000_000,
        UnitType::DefensePost => (50_000 * (owned + 1)).min(250_000),
        UnitType::TransportShip
        | UnitType::Shell
        | UnitType::TradeShip
        | UnitType::Construction => 0,
    }
}

/// Construction time of a structure in ticks.
pub fn construction_duration(config: &GameConfig, unit: UnitType) -> Option<u32> {
    if config.instant_build {
        return None;
    }
    match unit {
        UnitType::Port | UnitType::City => Some(2 * 10),
        UnitType::DefensePost => Some(5 * 10),
        UnitType::MissileSilo => Some(10 * 10),
        _ => None,
    }
}

/// Gold a completed trade run pays each side.
pub fn trade_ship_gold(dist: u32) -> u64 {
    floor_u64(10_000.0 + 150.0 * (dist as f64).powf(1.1))
}

/// One-in-N odds per tick that a port launches a trade ship.
pub fn trade_ship_spawn_rate(num_ports: usize) -> u32 {
    match num_ports {
        0..=3 => 18,
        4..=5 => 25,
        6..=8 => 35,
        9..=10 => 40,
        11..=12 => 45,
        _ => 50,
    }
}

/// Share of population killed per blasted tile.
pub fn nuke_death_factor(humans: f64, tiles_owned: u64) -> f64 {
    5.0 * humans / (tiles_owned.max(1) as f64)
}

/// Default troops sent by a boat attack.
pub fn boat_attack_amount(troops: u64) -> u64 {
    troops / 5
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plains() -> TileConditions {
        TileConditions {
            terrain: Terrain::Plains,
            defense_post_in_range: false,
            fallout_ratio: None,
        }
    }

    fn human(troops: f64) -> Attacker {
        Attacker { player_type: PlayerType::Human, troops, tiles_owned: 500 }
    }

    fn defender(troops: f64) -> Defender {
        Defender::Player {
            player_type: PlayerType::Human,
            troops,
            population: 5000.0,
            tiles_owned: 100,
            is_traitor: false,
        }
    }

    #[test]
    fn test_attack_logic_plains_scenario() {
        let config = GameConfig::default();
        let outcome = attack_logic(&config, &human(1000.0), &defender(2000.0), &plains()).unwrap();

        // ratio = (2000/1000)^0.4, inside [0.1, 10]
        let ratio = 2f64.powf(0.4);
        assert_eq!(outcome.attacker_troop_loss, ratio * 85.0);
        assert!((outcome.attacker_troop_loss - 112.158).abs() < 0.01);
        assert_eq!(outcome.defender_troop_loss, 50.0);
        // speed ratio = 2000 / 5000 = 0.4 -> floor(0.4 * 16.5) = 6
        assert_eq!(outcome.tiles_per_tick_used, 6.0);

        let again = attack_logic(&config, &human(1000.0), &defender(2000.0), &plains()).unwrap();
        assert_eq!(outcome, again);
    }

    #[test]
    fn test_attack_logic_rejects_water() {
        let config = GameConfig::default();
        let tile = TileConditions { terrain: Terrain::Ocean, ..plains() };
        let err = attack_logic(&config, &human(1000.0), &Defender::Unclaimed, &tile).unwrap_err();
        assert_eq!(err, FormulaError::UnsupportedTerrain(Terrain::Ocean));
    }

    #[test]
    fn test_defense_post_and_fallout_multiply() {
        let config = GameConfig::default();
        let base = attack_logic(&config, &human(1000.0), &defender(2000.0), &plains()).unwrap();
        let posted = attack_logic(
            &config,
            &human(1000.0),
            &defender(2000.0),
            &TileConditions { defense_post_in_range: true, ..plains() },
        )
        .unwrap();
        assert!((posted.attacker_troop_loss - base.attacker_troop_loss * 5.0).abs() < 1e-9);

        let fallout = attack_logic(
            &config,
            &human(1000.0),
            &defender(2000.0),
            &TileConditions { fallout_ratio: Some(0.5), ..plains() },
        )
        .unwrap();
        assert!((fallout.attacker_troop_loss - base.attacker_troop_loss * 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_unclaimed_land() {
        let config = GameConfig::default();
        let outcome = attack_logic(&config, &human(1000.0), &Defender::Unclaimed, &plains()).unwrap();
        assert_eq!(outcome.attacker_troop_loss, 17.0);
        assert_eq!(outcome.defender_troop_loss, 0.0);
        assert_eq!(outcome.tiles_per_tick_used, 33.0);

        let bot = Attacker { player_type: PlayerType::Bot, ..human(1000.0) };
        let outcome = attack_logic(&config, &bot, &Defender::Unclaimed, &plains()).unwrap();
        assert_eq!(outcome.attacker_troop_loss, 8.5);
    }

    #[test]
    fn test_traitor_and_bot_modifiers() {
        let config = GameConfig::default();
        let traitor = Defender::Player {
            player_type: PlayerType::Human,
            troops: 2000.0,
            population: 5000.0,
            tiles_owned: 100,
            is_traitor: true,
        };
        let base = attack_logic(&config, &human(1000.0), &defender(2000.0), &plains()).unwrap();
        let vs_traitor = attack_logic(&config, &human(1000.0), &traitor, &plains()).unwrap();
        assert_eq!(vs_traitor.attacker_troop_loss, base.attacker_troop_loss * 0.5);

        let bot = Defender::Player {
            player_type: PlayerType::Bot,
            troops: 2000.0,
            population: 5000.0,
            tiles_owned: 100,
            is_traitor: false,
        };
        let vs_bot = attack_logic(&config, &human(1000.0), &bot, &plains()).unwrap();
        assert!((vs_bot.attacker_troop_loss - base.attacker_troop_loss * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_large_territory_dampening() {
        let config = GameConfig::default();
        let big = Attacker { tiles_owned: 400_000, ..human(1000.0) };
        let outcome = attack_logic(&config, &big, &defender(2000.0), &plains()).unwrap();
        let base = attack_logic(&config, &human(1000.0), &defender(2000.0), &plains()).unwrap();
        assert!((outcome.attacker_troop_loss - base.attacker_troop_loss * 0.5).abs() < 1e-9);
        assert!(outcome.tiles_per_tick_used < base.tiles_per_tick_used);
    }

    #[test]
    fn test_attack_tiles_per_tick() {
        assert_eq!(attack_tiles_per_tick(1000.0, &Defender::Unclaimed, 10), 20.0);
        // 5 * 1000 / 2000 * 2 = 5 -> clamped to 0.5
        assert_eq!(attack_tiles_per_tick(1000.0, &defender(2000.0), 10), 15.0);
    }

    #[test]
    fn test_troop_adjustment_ramps_down_faster() {
        let config = GameConfig::default();
        let economy = Economy {
            player_type: PlayerType::Human,
            tiles_owned: 1000,
            cities: 0,
            troops: 100_000.0,
            workers: 100_000.0,
            target_troop_ratio: 0.1,
        };
        let max_diff = max_population(&config, &economy) / 1000.0;
        assert_eq!(troop_adjustment_rate(&config, &economy), -max_diff * 5.0);

        let up = Economy { target_troop_ratio: 0.9, ..economy };
        assert_eq!(troop_adjustment_rate(&config, &up), max_diff);
    }

    #[test]
    fn test_population_growth_capped() {
        let config = GameConfig::default();
        let economy = Economy {
            player_type: PlayerType::Human,
            tiles_owned: 10,
            cities: 0,
            troops: 0.0,
            workers: 0.0,
            target_troop_ratio: 0.5,
        };
        let max = max_population(&config, &economy);
        let full = Economy { workers: max, ..economy };
        assert_eq!(population_increase_rate(&config, &full), 0.0);
        assert!(population_increase_rate(&config, &economy) > 0.0);
    }

    #[test]
    fn test_unit_costs() {
        let config = GameConfig::default();
        assert_eq!(unit_cost(&config, PlayerType::Human, UnitType::Warship, 0), 250_000);
        assert_eq!(unit_cost(&config, PlayerType::Human, UnitType::Warship, 9), 1_000_000);
        assert_eq!(unit_cost(&config, PlayerType::Human, UnitType::DefensePost, 2), 150_000);
        assert_eq!(unit_cost(&config, PlayerType::Human, UnitType::DefensePost, 9), 250_000);
        assert_eq!(unit_cost(&config, PlayerType::Human, UnitType::Port, 2), 500_000);
        assert_eq!(unit_cost(&config, PlayerType::Human, UnitType::MissileSilo, 0), 1_000_000);

        let free = GameConfig { infinite_gold: true, ..Default::default() };
        assert_eq!(unit_cost(&free, PlayerType::Human, UnitType::MissileSilo, 0), 0);
        assert_eq!(unit_cost(&free, PlayerType::Bot, UnitType::MissileSilo, 0), 1_000_000);
    }

    proptest! {
        #[test]
        fn prop_player_losses_bounded(atk in 1.0f64..1e7, def in 0.0f64..1e7) {
            let config = GameConfig::default();
            let outcome = attack_logic(&config, &human(atk), &defender(def), &plains()).unwrap();
            // ratio clamped to [0.1, 10] times magnitude 85
            prop_assert!(outcome.attacker_troop_loss >= 8.5 - 1e-9);
            prop_assert!(outcome.attacker_troop_loss <= 850.0 + 1e-9);
            prop_assert!(outcome.tiles_per_tick_used >= 1.0);
            prop_assert!(outcome.tiles_per_tick_used <= 165.0);
        }

        #[test]
        fn prop_unclaimed_tiles_clamped(atk in 1.0f64..1e9) {
            let config = GameConfig::default();
            let outcome = attack_logic(&config, &human(atk), &Defender::Unclaimed, &plains()).unwrap();
            prop_assert!(outcome.tiles_per_tick_used >= 5.0);
            prop_assert!(outcome.tiles_per_tick_used <= 100.0);
        }
    }
}
