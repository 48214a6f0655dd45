//! Name Placement
//!
//! Where to draw a player's name: the centre of the largest square fully
//! inside its territory, scaled to that square. Computed by the runner on a
//! schedule rather than every tick.

use serde::{Serialize, Deserialize};

use crate::game::player::SmallId;
use crate::game::world::World;

/// Label position and size for one player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameViewData {
    /// Tile column of the label centre.
    pub x: u32,
    /// Tile row of the label centre.
    pub y: u32,
    /// Side of the square the label fits in, in tiles.
    pub size: u32,
}

/// Label placement for `player`, or the default for players without land.
pub fn place_name(world: &World, player: SmallId) -> NameViewData {
    let Some(p) = world.player(player) else {
        return NameViewData::default();
    };
    let map = world.map();
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0, 0);
    for &tile in &p.tiles {
        let (x, y) = (map.x(tile), map.y(tile));
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    if min_x > max_x {
        return NameViewData::default();
    }

    // Largest all-owned square by dynamic programming over the bounding box;
    // `side[i]` is the square ending at that cell.
    let w = (max_x - min_x + 1) as usize;
    let h = (max_y - min_y + 1) as usize;
    let mut prev = vec![0u32; w];
    let mut row = vec![0u32; w];
    let mut best = (0u32, min_x, min_y);
    for dy in 0..h {
        for dx in 0..w {
            let owned = map
                .tile(min_x + dx as u32, min_y + dy as u32)
                .map(|t| world.owner_id(t) == player)
                .unwrap_or(false);
            row[dx] = if !owned {
                0
            } else if dx == 0 || dy == 0 {
                1
            } else {
                1 + prev[dx].min(row[dx - 1]).min(prev[dx - 1])
            };
            if row[dx] > best.0 {
                best = (row[dx], min_x + dx as u32, min_y + dy as u32);
            }
        }
        std::mem::swap(&mut prev, &mut row);
    }

    let (side, end_x, end_y) = best;
    NameViewData {
        x: end_x + 1 - side + side / 2,
        y: end_y + 1 - side + side / 2,
        size: side,
    }
}
