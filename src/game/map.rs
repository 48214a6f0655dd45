//! Tile Grid Geometry
//!
//! Static terrain for a game. Generating maps from assets happens elsewhere;
//! the engine receives a finished [`GameMap`] and never mutates it.

use serde::{Serialize, Deserialize};

/// Index of a tile: `y * width + x`.
pub type TileRef = u32;

/// Terrain kind of a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Terrain {
    /// Flat land, fastest to conquer.
    Plains = 0,
    /// Hills.
    Highland = 1,
    /// Mountains, slowest and most costly to conquer.
    Mountain = 2,
    /// Inland water.
    Lake = 3,
    /// Navigable water.
    Ocean = 4,
}

impl Terrain {
    /// Is this terrain land?
    #[inline]
    pub fn is_land(self) -> bool {
        matches!(self, Terrain::Plains | Terrain::Highland | Terrain::Mountain)
    }
}

/// Map construction errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MapError {
    /// Terrain vector does not match the declared dimensions.
    #[error("terrain has {actual} tiles, expected {expected}")]
    SizeMismatch {
        /// width * height
        expected: usize,
        /// Length of the supplied terrain.
        actual: usize,
    },

    /// Zero-sized map.
    #[error("map must be non-empty")]
    Empty,
}

/// Immutable tile grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameMap {
    width: u32,
    height: u32,
    terrain: Vec<Terrain>,
    num_land_tiles: u32,
}

impl GameMap {
    /// Build a map from row-major terrain.
    pub fn new(width: u32, height: u32, terrain: Vec<Terrain>) -> Result<Self, MapError> {
        if width == 0 || height == 0 {
            return Err(MapError::Empty);
        }
        let expected = (width * height) as usize;
        if terrain.len() != expected {
            return Err(MapError::SizeMismatch { expected, actual: terrain.len() });
        }
        let num_land_tiles = terrain.iter().filter(|t| t.is_land()).count() as u32;
        Ok(Self { width, height, terrain, num_land_tiles })
    }

    /// Build a map from an ASCII sketch, one row per line.
    ///
    /// `.` plains, `h` highland, `m` mountain, `l` lake, `~` ocean.
    pub fn from_ascii(rows: &[&str]) -> Result<Self, MapError> {
        let height = rows.len() as u32;
        let width = rows.first().map(|r| r.len()).unwrap_or(0) as u32;
        let terrain = rows
            .iter()
            .flat_map(|row| row.chars())
            .map(|c| match c {
                'h' => Terrain::Highland,
                'm' => Terrain::Mountain,
                'l' => Terrain::Lake,
                '~' => Terrain::Ocean,
                _ => Terrain::Plains,
            })
            .collect();
        Self::new(width, height, terrain)
    }

    /// Map width in tiles.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Map height in tiles.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total number of tiles.
    #[inline]
    pub fn num_tiles(&self) -> u32 {
        self.width * self.height
    }

    /// Number of land tiles.
    #[inline]
    pub fn num_land_tiles(&self) -> u32 {
        self.num_land_tiles
    }

    /// Tile reference for in-bounds coordinates.
    #[inline]
    pub fn tile(&self, x: u32, y: u32) -> Option<TileRef> {
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Is this a valid tile reference?
    #[inline]
    pub fn is_valid(&self, tile: TileRef) -> bool {
        tile < self.num_tiles()
    }

    /// Column of a tile.
    #[inline]
    pub fn x(&self, tile: TileRef) -> u32 {
        tile % self.width
    }

    /// Row of a tile.
    #[inline]
    pub fn y(&self, tile: TileRef) -> u32 {
        tile / self.width
    }

    /// Terrain of a tile.
    #[inline]
    pub fn terrain(&self, tile: TileRef) -> Terrain {
        self.terrain[tile as usize]
    }

    /// Is the tile land?
    #[inline]
    pub fn is_land(&self, tile: TileRef) -> bool {
        self.terrain(tile).is_land()
    }

    /// Is the tile ocean?
    #[inline]
    pub fn is_ocean(&self, tile: TileRef) -> bool {
        self.terrain(tile) == Terrain::Ocean
    }

    /// A land tile touching ocean, or an ocean tile touching land.
    pub fn is_shoreline(&self, tile: TileRef) -> bool {
        let land = self.is_land(tile);
        let ocean = self.is_ocean(tile);
        self.neighbors(tile)
            .any(|n| (land && self.is_ocean(n)) || (ocean && self.is_land(n)))
    }

    /// Four-neighborhood in fixed N, E, S, W order.
    pub fn neighbors(&self, tile: TileRef) -> impl Iterator<Item = TileRef> {
        let x = self.x(tile);
        let y = self.y(tile);
        let w = self.width;
        let h = self.height;
        [
            (y > 0).then(|| tile - w),
            (x + 1 < w).then(|| tile + 1),
            (y + 1 < h).then(|| tile + w),
            (x > 0).then(|| tile - 1),
        ]
        .into_iter()
        .flatten()
    }

    /// Squared euclidean distance between two tiles.
    #[inline]
    pub fn euclidean_dist_squared(&self, a: TileRef, b: TileRef) -> u64 {
        let dx = self.x(a) as i64 - self.x(b) as i64;
        let dy = self.y(a) as i64 - self.y(b) as i64;
        (dx * dx + dy * dy) as u64
    }

    /// Manhattan distance between two tiles.
    #[inline]
    pub fn manhattan_dist(&self, a: TileRef, b: TileRef) -> u32 {
        self.x(a).abs_diff(self.x(b)) + self.y(a).abs_diff(self.y(b))
    }

    /// All tiles within euclidean `radius` of `center`, in index order.
    pub fn tiles_within(&self, center: TileRef, radius: u32) -> Vec<TileRef> {
        let cx = self.x(center) as i64;
        let cy = self.y(center) as i64;
        let r = radius as i64;
        let r2 = (r * r) as u64;
        let mut out = Vec::new();
        for y in (cy - r).max(0)..=(cy + r).min(self.height as i64 - 1) {
            for x in (cx - r).max(0)..=(cx + r).min(self.width as i64 - 1) {
                let t = (y as u32) * self.width + x as u32;
                if self.euclidean_dist_squared(center, t) <= r2 {
                    out.push(t);
                }
            }
        }
        out
    }

    /// One step from `from` toward `to` along the dominant axis.
    ///
    /// Straight-line movement for ordnance that ignores terrain.
    pub fn step_toward(&self, from: TileRef, to: TileRef) -> TileRef {
        if from == to {
            return from;
        }
        let (fx, fy) = (self.x(from) as i64, self.y(from) as i64);
        let (tx, ty) = (self.x(to) as i64, self.y(to) as i64);
        let (dx, dy) = (tx - fx, ty - fy);
        let (nx, ny) = if dx.abs() >= dy.abs() {
            (fx + dx.signum(), fy)
        } else {
            (fx, fy + dy.signum())
        };
        (ny as u32) * self.width + nx as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GameMap {
        GameMap::from_ascii(&[
            "~~~~",
            "~..~",
            "~.m~",
            "~~~~",
        ])
        .unwrap()
    }

    #[test]
    fn test_dimensions_and_land() {
        let map = sample();
        assert_eq!(map.width(), 4);
        assert_eq!(map.num_tiles(), 16);
        assert_eq!(map.num_land_tiles(), 4);
        assert_eq!(map.terrain(map.tile(2, 2).unwrap()), Terrain::Mountain);
    }

    #[test]
    fn test_size_mismatch() {
        let err = GameMap::new(3, 3, vec![Terrain::Plains; 4]).unwrap_err();
        assert!(matches!(err, MapError::SizeMismatch { expected: 9, actual: 4 }));
    }

    #[test]
    fn test_neighbor_order_is_fixed() {
        let map = sample();
        let t = map.tile(1, 1).unwrap();
        let n: Vec<_> = map.neighbors(t).collect();
        assert_eq!(n, vec![t - 4, t + 1, t + 4, t - 1]);

        let corner: Vec<_> = map.neighbors(0).collect();
        assert_eq!(corner, vec![1, 4]);
    }

    #[test]
    fn test_shoreline() {
        let map = sample();
        assert!(map.is_shoreline(map.tile(1, 1).unwrap()));
        assert!(map.is_shoreline(map.tile(0, 1).unwrap()));
        assert!(!map.is_shoreline(0));
    }

    #[test]
    fn test_step_toward() {
        let map = GameMap::new(10, 10, vec![Terrain::Ocean; 100]).unwrap();
        let from = map.tile(0, 0).unwrap();
        let to = map.tile(3, 1).unwrap();
        assert_eq!(map.step_toward(from, to), map.tile(1, 0).unwrap());
        assert_eq!(map.step_toward(to, to), to);
    }

    #[test]
    fn test_tiles_within() {
        let map = GameMap::new(10, 10, vec![Terrain::Plains; 100]).unwrap();
        let c = map.tile(5, 5).unwrap();
        assert_eq!(map.tiles_within(c, 1).len(), 5);
        assert_eq!(map.tiles_within(c, 0), vec![c]);
    }
}
