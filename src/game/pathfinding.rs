//! Ship Pathfinding
//!
//! Executions ask a [`PathFinder`] for one step at a time. The reference
//! backend, [`OceanPathFinder`], runs an incremental A* over ocean tiles
//! with a per-call expansion budget, so a long search spreads over several
//! ticks (reporting [`PathStep::Pending`]) instead of stalling one tick.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt;

use crate::game::map::{GameMap, TileRef};

/// Node expansions allowed per call before a search yields.
pub const DEFAULT_ITERATION_BUDGET: usize = 10_000;

/// Result of asking for the next step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStep {
    /// Within the requested distance of the destination; carries the current tile.
    Completed(TileRef),
    /// Move here next.
    NextTile(TileRef),
    /// Search still running; ask again next tick.
    Pending,
    /// Destination unreachable.
    PathNotFound,
}

/// Incremental path query used by ships.
pub trait PathFinder: Send + fmt::Debug {
    /// Next step from `from` toward `to`. Arrival is reached once the
    /// manhattan distance is at most `dist`.
    fn next_tile(&mut self, map: &GameMap, from: TileRef, to: TileRef, dist: u32) -> PathStep;
}

#[derive(Debug)]
struct OpenNode {
    f: u32,
    h: u32,
    tile: TileRef,
}

impl OpenNode {
    fn key(&self) -> (u32, u32, TileRef) {
        (self.f, self.h, self.tile)
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the smallest key.
        other.key().cmp(&self.key())
    }
}

#[derive(Debug)]
struct Search {
    start: TileRef,
    goal: TileRef,
    dist: u32,
    open: BinaryHeap<OpenNode>,
    g_score: HashMap<TileRef, u32>,
    came_from: HashMap<TileRef, TileRef>,
}

enum SearchState {
    Found(TileRef),
    Exhausted,
    Running,
}

impl Search {
    fn new(map: &GameMap, start: TileRef, goal: TileRef, dist: u32) -> Self {
        let mut open = BinaryHeap::new();
        let h = map.manhattan_dist(start, goal);
        open.push(OpenNode { f: h, h, tile: start });
        let mut g_score = HashMap::new();
        g_score.insert(start, 0);
        Self {
            start,
            goal,
            dist,
            open,
            g_score,
            came_from: HashMap::new(),
        }
    }

    fn passable(&self, map: &GameMap, tile: TileRef) -> bool {
        map.is_ocean(tile) || tile == self.goal
    }

    fn run(&mut self, map: &GameMap, budget: usize) -> SearchState {
        for _ in 0..budget {
            let Some(node) = self.open.pop() else {
                return SearchState::Exhausted;
            };
            if node.h <= self.dist {
                return SearchState::Found(node.tile);
            }
            let g = self.g_score.get(&node.tile).copied().unwrap_or(u32::MAX);
            if node.f != g.saturating_add(node.h) {
                // Stale heap entry.
                continue;
            }
            for n in map.neighbors(node.tile) {
                if !self.passable(map, n) {
                    continue;
                }
                let tentative = g + 1;
                if tentative >= self.g_score.get(&n).copied().unwrap_or(u32::MAX) {
                    continue;
                }
                self.g_score.insert(n, tentative);
                self.came_from.insert(n, node.tile);
                let h = map.manhattan_dist(n, self.goal);
                self.open.push(OpenNode { f: tentative + h, h, tile: n });
            }
        }
        SearchState::Running
    }

    fn reconstruct(&self, end: TileRef) -> VecDeque<TileRef> {
        let mut path = VecDeque::new();
        let mut current = end;
        while current != self.start {
            path.push_front(current);
            match self.came_from.get(&current) {
                Some(&prev) => current = prev,
                None => break,
            }
        }
        path
    }
}

/// Incremental A* over ocean tiles.
///
/// The start tile may be land (ships leave from ports and shores) and so
/// may the destination (ships land on shores).
#[derive(Debug)]
pub struct OceanPathFinder {
    budget: usize,
    search: Option<Search>,
    path: VecDeque<TileRef>,
    path_goal: Option<(TileRef, u32)>,
    position: Option<TileRef>,
}

impl Default for OceanPathFinder {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATION_BUDGET)
    }
}

impl OceanPathFinder {
    /// Create with a per-call expansion budget.
    pub fn new(budget: usize) -> Self {
        Self {
            budget: budget.max(1),
            search: None,
            path: VecDeque::new(),
            path_goal: None,
            position: None,
        }
    }

    fn reset(&mut self) {
        self.search = None;
        self.path.clear();
        self.path_goal = None;
        self.position = None;
    }

    fn pop_step(&mut self) -> PathStep {
        match self.path.pop_front() {
            Some(next) => {
                self.position = Some(next);
                PathStep::NextTile(next)
            }
            None => PathStep::PathNotFound,
        }
    }
}

impl PathFinder for OceanPathFinder {
    fn next_tile(&mut self, map: &GameMap, from: TileRef, to: TileRef, dist: u32) -> PathStep {
        if !map.is_valid(from) || !map.is_valid(to) {
            return PathStep::PathNotFound;
        }
        if map.manhattan_dist(from, to) <= dist {
            self.reset();
            return PathStep::Completed(from);
        }

        // Follow the cached path while the caller stays on it.
        if self.path_goal == Some((to, dist)) && self.position == Some(from) && !self.path.is_empty() {
            return self.pop_step();
        }

        let resume = matches!(
            &self.search,
            Some(s) if s.start == from && s.goal == to && s.dist == dist
        );
        if !resume {
            self.reset();
            self.search = Some(Search::new(map, from, to, dist));
        }

        let Some(search) = self.search.as_mut() else {
            return PathStep::PathNotFound;
        };
        match search.run(map, self.budget) {
            SearchState::Running => PathStep::Pending,
            SearchState::Exhausted => {
                self.reset();
                PathStep::PathNotFound
            }
            SearchState::Found(end) => {
                self.path = search.reconstruct(end);
                self.search = None;
                self.path_goal = Some((to, dist));
                self.position = Some(from);
                self.pop_step()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lake_map() -> GameMap {
        GameMap::from_ascii(&[
            "..........",
            ".~~~~~~~~.",
            ".~......~.",
            ".~~~~~~.~.",
            "..........",
        ])
        .unwrap()
    }

    fn walk(finder: &mut OceanPathFinder, map: &GameMap, mut from: TileRef, to: TileRef) -> (TileRef, usize) {
        for steps in 0..200 {
            match finder.next_tile(map, from, to, 0) {
                PathStep::Completed(t) => return (t, steps),
                PathStep::NextTile(t) => {
                    assert!(map.is_ocean(t) || t == to);
                    assert_eq!(map.manhattan_dist(from, t), 1);
                    from = t;
                }
                PathStep::Pending => {}
                PathStep::PathNotFound => panic!("no path"),
            }
        }
        panic!("did not arrive");
    }

    #[test]
    fn test_follows_ocean() {
        let map = lake_map();
        let from = map.tile(1, 1).unwrap();
        let to = map.tile(1, 3).unwrap();
        let mut finder = OceanPathFinder::default();
        let (end, _) = walk(&mut finder, &map, from, to);
        assert_eq!(end, to);
    }

    #[test]
    fn test_small_budget_reports_pending() {
        let map = lake_map();
        let from = map.tile(1, 1).unwrap();
        let to = map.tile(6, 3).unwrap();
        let mut finder = OceanPathFinder::new(1);
        assert_eq!(finder.next_tile(&map, from, to, 0), PathStep::Pending);
        let (end, _) = walk(&mut finder, &map, from, to);
        assert_eq!(end, to);
    }

    #[test]
    fn test_land_locked_destination() {
        let map = lake_map();
        let from = map.tile(1, 1).unwrap();
        let to = map.tile(0, 0).unwrap();
        let mut finder = OceanPathFinder::default();
        let mut saw_not_found = false;
        for _ in 0..5 {
            if finder.next_tile(&map, from, to, 0) == PathStep::PathNotFound {
                saw_not_found = true;
                break;
            }
        }
        assert!(saw_not_found);
    }

    #[test]
    fn test_completed_within_distance() {
        let map = lake_map();
        let from = map.tile(1, 1).unwrap();
        let to = map.tile(4, 1).unwrap();
        let mut finder = OceanPathFinder::default();
        assert_eq!(finder.next_tile(&map, from, to, 5), PathStep::Completed(from));
    }

    #[test]
    fn test_same_inputs_same_route() {
        let map = lake_map();
        let from = map.tile(1, 1).unwrap();
        let to = map.tile(8, 3).unwrap();
        let route = || {
            let mut finder = OceanPathFinder::default();
            let mut at = from;
            let mut tiles = vec![];
            while let PathStep::NextTile(t) = finder.next_tile(&map, at, to, 0) {
                tiles.push(t);
                at = t;
            }
            tiles
        };
        assert_eq!(route(), route());
    }
}
