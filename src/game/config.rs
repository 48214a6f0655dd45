//! Game Configuration
//!
//! The numeric parameters a game is played with. A [`GameConfig`] travels
//! inside the start message, so every replica builds its world from the same
//! values; nothing in the engine reads configuration from anywhere else.

use serde::{Serialize, Deserialize};

/// Kind of game, which drives lobby and spawn-phase rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// Single human against the engine.
    Singleplayer,
    /// Listed lobby that starts on a timer.
    Public,
    /// Invite-only lobby started by its host.
    Private,
}

/// Victory condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Free for all.
    Ffa,
    /// Team play (higher ownership threshold).
    Team,
}

/// Configuration for a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Name of the map the game is played on.
    pub game_map: String,
    /// Lobby/spawn rules.
    pub game_type: GameType,
    /// Victory condition.
    pub game_mode: GameMode,
    /// Lobby cap for public games.
    pub max_players: usize,
    /// Humans build for free.
    pub infinite_gold: bool,
    /// Humans get effectively unlimited population.
    pub infinite_troops: bool,
    /// Structures skip their construction phase.
    pub instant_build: bool,
    /// Reject nuke construction.
    pub disable_nukes: bool,

    /// Spawn phase length outside singleplayer (ticks).
    pub spawn_phase_turns: u32,
    /// Spawn phase length in singleplayer (ticks).
    pub singleplayer_spawn_phase_turns: u32,
    /// Radius of the territory granted on spawn.
    pub spawn_radius: u32,

    /// Starting troops for humans and fake humans.
    pub start_manpower_human: u64,
    /// Starting troops for bots.
    pub start_manpower_bot: u64,
    /// Extra max population per city.
    pub city_population_increase: u64,

    /// Range within which a defense post boosts its owner's defense.
    pub defense_post_range: u32,
    /// Multiplier on magnitude and speed near a defense post.
    pub defense_post_defense_bonus: f64,
    /// Ticks between defense post shells.
    pub defense_post_shell_attack_rate: u32,
    /// Defense post targeting radius.
    pub defense_post_targetting_range: u32,

    /// Ticks between warship shells.
    pub warship_shell_attack_rate: u32,
    /// Warship targeting radius.
    pub warship_targetting_range: u32,
    /// Warship patrol radius around its patrol centre.
    pub warship_patrol_range: u32,
    /// Warship hit points.
    pub warship_max_health: i64,
    /// Path steps closer than this count as caught for trade ship capture.
    pub trade_ship_capture_distance: u32,

    /// Damage a shell deals on impact.
    pub shell_damage: i64,
    /// Maximum shell flight time in ticks.
    pub shell_lifetime: u32,
    /// Tiles a shell covers per tick.
    pub shell_speed: u32,

    /// Ticks a silo stays in cooldown after launching.
    pub silo_cooldown: u32,
    /// Tiles a nuke covers per tick.
    pub nuke_speed: u32,

    /// Minimum distance between two structures of the same type.
    pub structure_min_dist: u32,
    /// Maximum simultaneous transport ships per player.
    pub boat_max_number: u32,
    /// Radius a port may be placed away from the clicked tile.
    pub radius_port_spawn: u32,

    /// Attacker loss multiplier against a traitor.
    pub traitor_defense_debuff: f64,
    /// Ticks a player stays marked as traitor.
    pub traitor_duration: u32,
    /// Ticks an alliance lasts.
    pub alliance_duration: u32,
    /// Ticks between alliance requests to the same player.
    pub alliance_request_cooldown: u32,
    /// Ticks between donations.
    pub donate_cooldown: u32,
    /// Ticks between emojis to the same recipient.
    pub emoji_message_cooldown: u32,
    /// Ticks a target mark lasts.
    pub target_duration: u32,
    /// Ticks between target marks.
    pub target_cooldown: u32,
    /// Ticks between one-point relation decay steps.
    pub relation_decay_interval: u32,

    /// Percent of land a player must own to win.
    pub percentage_tiles_owned_to_win: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_map: "World".to_string(),
            game_type: GameType::Public,
            game_mode: GameMode::Ffa,
            max_players: 50,
            infinite_gold: false,
            infinite_troops: false,
            instant_build: false,
            disable_nukes: false,

            spawn_phase_turns: 300,
            singleplayer_spawn_phase_turns: 100,
            spawn_radius: 4,

            start_manpower_human: 25_000,
            start_manpower_bot: 10_000,
            city_population_increase: 250_000,

            defense_post_range: 30,
            defense_post_defense_bonus: 5.0,
            defense_post_shell_attack_rate: 100,
            defense_post_targetting_range: 75,

            warship_shell_attack_rate: 20,
            warship_targetting_range: 130,
            warship_patrol_range: 100,
            warship_max_health: 1000,
            trade_ship_capture_distance: 5,

            shell_damage: 250,
            shell_lifetime: 50,
            shell_speed: 3,

            silo_cooldown: 75,
            nuke_speed: 4,

            structure_min_dist: 18,
            boat_max_number: 9,
            radius_port_spawn: 20,

            traitor_defense_debuff: 0.5,
            traitor_duration: 30 * 10,
            alliance_duration: 600 * 10,
            alliance_request_cooldown: 30 * 10,
            donate_cooldown: 10 * 10,
            emoji_message_cooldown: 5 * 10,
            target_duration: 10 * 10,
            target_cooldown: 15 * 10,
            relation_decay_interval: 50,

            percentage_tiles_owned_to_win: 80,
        }
    }
}

impl GameConfig {
    /// Number of ticks in the spawn phase.
    pub fn num_spawn_phase_turns(&self) -> u32 {
        match self.game_type {
            GameType::Singleplayer => self.singleplayer_spawn_phase_turns,
            _ => self.spawn_phase_turns,
        }
    }

    /// Ownership threshold for victory, by mode.
    pub fn win_threshold_percent(&self) -> u32 {
        match self.game_mode {
            GameMode::Team => 95,
            GameMode::Ffa => self.percentage_tiles_owned_to_win,
        }
    }

    /// Load from a JSON document, filling gaps with defaults.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_phase_by_game_type() {
        let mut config = GameConfig::default();
        assert_eq!(config.num_spawn_phase_turns(), 300);
        config.game_type = GameType::Singleplayer;
        assert_eq!(config.num_spawn_phase_turns(), 100);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GameConfig::from_json(r#"{"game_map":"Europe","game_type":"private"}"#).unwrap();
        assert_eq!(config.game_map, "Europe");
        assert_eq!(config.game_type, GameType::Private);
        assert_eq!(config.warship_shell_attack_rate, 20);
    }

    #[test]
    fn test_team_threshold() {
        let config = GameConfig { game_mode: GameMode::Team, ..Default::default() };
        assert_eq!(config.win_threshold_percent(), 95);
        assert_eq!(GameConfig::default().win_threshold_percent(), 80);
    }
}
