//! A* pathfinding over the station cell grid.
//!
//! Search is 8-connected. A diagonal step is only allowed when both
//! orthogonal cells beside it are pathable, so paths never cut corners.
//! Step cost and remaining-distance estimate both come from the caller's
//! heuristic. Equal-cost ties resolve in whatever order the open heap
//! yields them.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::components::Vector2Int;

/// Upper bound on expanded cells for a single search. Pathable regions are
/// finite in a station, but a predicate over an open plane is not.
pub const SEARCH_LIMIT: usize = 65_536;

const NEIGHBOURS: [Vector2Int; 8] = [
    Vector2Int::new(0, -1),
    Vector2Int::new(1, 0),
    Vector2Int::new(0, 1),
    Vector2Int::new(-1, 0),
    Vector2Int::new(1, -1),
    Vector2Int::new(1, 1),
    Vector2Int::new(-1, 1),
    Vector2Int::new(-1, -1),
];

pub fn euclidean(a: Vector2Int, b: Vector2Int) -> f32 {
    a.to_vector2().distance(&b.to_vector2())
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    f_cost: f32,
    g_cost: f32,
    position: Vector2Int,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.f_cost.total_cmp(&other.f_cost) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    // Reversed so the max-heap pops the lowest f-cost first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.f_cost.total_cmp(&self.f_cost)
    }
}

/// Find a path from `start` to `end`.
///
/// Returns the cells after `start` up to and including `end`. Returns an
/// empty path if `start == end` or if `end` cannot be reached.
pub fn a_star<H, P>(start: Vector2Int, end: Vector2Int, heuristic: H, pathable: P) -> VecDeque<Vector2Int>
where
    H: Fn(Vector2Int, Vector2Int) -> f32,
    P: Fn(Vector2Int) -> bool,
{
    if start == end || !pathable(end) {
        return VecDeque::new();
    }

    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<Vector2Int, Vector2Int> = HashMap::new();
    let mut best_cost: HashMap<Vector2Int, f32> = HashMap::new();
    let mut closed: HashSet<Vector2Int> = HashSet::new();

    open.push(OpenNode {
        f_cost: heuristic(start, end),
        g_cost: 0.0,
        position: start,
    });
    best_cost.insert(start, 0.0);

    while let Some(node) = open.pop() {
        let current = node.position;
        if current == end {
            return reconstruct(&came_from, start, end);
        }
        if !closed.insert(current) {
            continue;
        }
        if closed.len() > SEARCH_LIMIT {
            break;
        }

        for step in NEIGHBOURS {
            let next = current + step;
            if closed.contains(&next) || !pathable(next) {
                continue;
            }
            if step.is_diagonal_step()
                && !(pathable(current + Vector2Int::new(step.x, 0))
                    && pathable(current + Vector2Int::new(0, step.y)))
            {
                continue;
            }

            let g_cost = node.g_cost + heuristic(current, next);
            if best_cost.get(&next).is_some_and(|&c| c <= g_cost) {
                continue;
            }
            best_cost.insert(next, g_cost);
            came_from.insert(next, current);
            open.push(OpenNode {
                f_cost: g_cost + heuristic(next, end),
                g_cost,
                position: next,
            });
        }
    }

    VecDeque::new()
}

fn reconstruct(
    came_from: &HashMap<Vector2Int, Vector2Int>,
    start: Vector2Int,
    end: Vector2Int,
) -> VecDeque<Vector2Int> {
    let mut path = VecDeque::new();
    let mut node = end;
    while node != start {
        path.push_front(node);
        match came_from.get(&node) {
            Some(&prev) => node = prev,
            None => return VecDeque::new(),
        }
    }
    path
}

/// Whether any waypoint of a cached path has become unpathable.
pub fn does_path_have_obstacles<'a, I, P>(path: I, pathable: P) -> bool
where
    I: IntoIterator<Item = &'a Vector2Int>,
    P: Fn(Vector2Int) -> bool,
{
    path.into_iter().any(|&p| !pathable(p))
}
