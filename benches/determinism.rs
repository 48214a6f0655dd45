//! Tick throughput and replay determinism benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use warfront::game::map::GameMap;
use warfront::game::player::{ClientId, PlayerId};
use warfront::game::runner::{replay_turns, StartPlayer};
use warfront::game::unit::UnitType;
use warfront::{GameConfig, GameStartInfo, Intent, IntentKind, Turn};

const SIDE: u32 = 64;

fn map() -> GameMap {
    let rows: Vec<String> = (0..SIDE)
        .map(|_| format!("{}{}", ".".repeat(48), "~".repeat(16)))
        .collect();
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    GameMap::from_ascii(&rows).expect("valid map")
}

fn start_info() -> GameStartInfo {
    let config = GameConfig { spawn_phase_turns: 20, ..GameConfig::default() };
    GameStartInfo {
        game_id: "bench".to_string(),
        config,
        players: (0..4)
            .map(|i| StartPlayer {
                player_id: PlayerId::new(format!("p{i}")),
                client_id: ClientId::new(format!("c{i}")),
                username: format!("player{i}"),
                flag: String::new(),
            })
            .collect(),
    }
}

/// Spawns on turn 0, then a seeded stream of attacks and builds.
fn turn_stream(seed: u64, count: u32) -> Vec<Turn> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|n| {
            let mut turn = Turn::empty(n, "bench");
            if n == 0 {
                for (i, (x, y)) in [(8, 8), (40, 8), (8, 56), (40, 56)].into_iter().enumerate() {
                    turn.intents.push(Intent::new(
                        ClientId::new(format!("c{i}")),
                        IntentKind::Spawn { tile: y * SIDE + x },
                    ));
                }
                return turn;
            }
            for _ in 0..rng.gen_range(0..4) {
                let client = ClientId::new(format!("c{}", rng.gen_range(0..4)));
                let kind = match rng.gen_range(0..4) {
                    0 => IntentKind::Attack { target: None, troops: rng.gen_range(500..8_000) },
                    1 => IntentKind::Attack {
                        target: Some(PlayerId::new(format!("p{}", rng.gen_range(0..4)))),
                        troops: rng.gen_range(500..8_000),
                    },
                    2 => IntentKind::BuildUnit { unit: UnitType::City, tile: rng.gen_range(0..SIDE * SIDE) },
                    _ => IntentKind::TroopRatio { ratio: rng.gen_range(0.2..0.8) },
                };
                turn.intents.push(Intent::new(client, kind));
            }
            turn
        })
        .collect()
}

fn bench_replay(c: &mut Criterion) {
    let start = start_info();
    let turns = turn_stream(7, 200);

    c.bench_function("replay_200_turns", |b| {
        b.iter(|| {
            let world = replay_turns(&start, map(), black_box(&turns)).expect("replay");
            black_box(world.ticks())
        })
    });

    let world = replay_turns(&start, map(), &turns).expect("replay");
    c.bench_function("world_hash", |b| b.iter(|| black_box(world.hash().expect("hash"))));

    let a = replay_turns(&start, map(), &turns).expect("replay").hash().expect("hash");
    let b = replay_turns(&start, map(), &turns).expect("replay").hash().expect("hash");
    assert_eq!(a, b, "replays diverged");
}

criterion_group!(benches, bench_replay);
criterion_main!(benches);
