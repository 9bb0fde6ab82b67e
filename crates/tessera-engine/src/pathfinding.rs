//! A* over the grid's 4-neighbourhood, honouring [`can_move`].
//!
//! Ties are broken by heuristic, then row, then column, so the same grid
//! always yields the same route.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tessera_core::grid::{CellCoord, Grid};

use crate::movement::can_move;

const NEIGHBOURS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// A route from `start` to `goal`, both included, or `None` if unreachable.
pub fn find_path(grid: &Grid, start: CellCoord, goal: CellCoord) -> Option<Vec<CellCoord>> {
    if !grid.in_bounds(start.col, start.row) || !grid.in_bounds(goal.col, goal.row) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let mut open = BinaryHeap::new();
    let mut best: HashMap<CellCoord, u32> = HashMap::new();
    let mut parent: HashMap<CellCoord, CellCoord> = HashMap::new();

    best.insert(start, 0);
    open.push(Reverse((start.manhattan(goal), start.manhattan(goal), start.row, start.col)));

    while let Some(Reverse((f, h, row, col))) = open.pop() {
        let current = CellCoord::new(col, row);
        let g = f - h;
        if best.get(&current).is_some_and(|&known| known < g) {
            continue;
        }
        if current == goal {
            return Some(reconstruct(&parent, start, goal));
        }

        for (dc, dr) in NEIGHBOURS {
            let next = current.offset(dc, dr);
            if !can_move(grid, current, next) {
                continue;
            }
            let tentative = g + 1;
            if best.get(&next).is_some_and(|&known| known <= tentative) {
                continue;
            }
            best.insert(next, tentative);
            parent.insert(next, current);
            let h = next.manhattan(goal);
            open.push(Reverse((tentative + h, h, next.row, next.col)));
        }
    }
    None
}

fn reconstruct(parent: &HashMap<CellCoord, CellCoord>, start: CellCoord, goal: CellCoord) -> Vec<CellCoord> {
    let mut path = vec![goal];
    let mut cursor = goal;
    while cursor != start {
        match parent.get(&cursor) {
            Some(&previous) => {
                cursor = previous;
                path.push(cursor);
            }
            None => break,
        }
    }
    path.reverse();
    path
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
