//! Local move legality and global structure audits.
//!
//! A move accepted by [`is_legal_move`] keeps a connected, hole-free lattice
//! configuration connected and hole-free, while only looking at the cells
//! around the mover and its target.

use crate::geometry::{Direction, Position};
use crate::grid::{Grid, ParticleFilter};
use crate::{GridError, ParticleId};
use std::collections::{HashSet, VecDeque};

/// Number of occupied/empty changes along a run of neighbor slots.
fn transitions(occupancy: &[bool]) -> usize {
    occupancy.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

/// Whether `id` may move along `direction` without breaking connectivity or opening a hole.
///
/// The occupancy of the target is read without `filter`; every other count uses it.
pub fn is_legal_move(
    grid: &Grid,
    id: ParticleId,
    direction: Direction,
    swaps_allowed: bool,
    non_swaps_allowed: bool,
    filter: Option<ParticleFilter<'_>>,
) -> Result<bool, GridError> {
    if !grid.is_direction_in_bounds(id, direction)? {
        return Ok(false);
    }
    let occupied = grid.relative_neighbor(id, direction, 0, None)?.is_some();
    if occupied && swaps_allowed {
        return Ok(true);
    }
    if occupied || !non_swaps_allowed {
        return Ok(false);
    }
    if grid.particle_neighbors(id, filter)?.len() >= 5 {
        return Ok(false);
    }
    Ok(check_property_1(grid, id, direction, filter)?
        || check_property_2(grid, id, direction, filter)?)
}

/// Mover and target share an occupied neighbor, and the occupied cells around
/// each form one contiguous run.
pub fn check_property_1(
    grid: &Grid,
    id: ParticleId,
    direction: Direction,
    filter: Option<ParticleFilter<'_>>,
) -> Result<bool, GridError> {
    let right = grid.relative_neighbor(id, direction, 5, filter)?;
    let left = grid.relative_neighbor(id, direction, 1, filter)?;
    if right.is_none() && left.is_none() {
        return Ok(false);
    }

    let mut around_particle = [false; 5];
    let mut around_target = [false; 5];
    for i in 0..5 {
        around_particle[i] = grid
            .relative_neighbor(id, direction, i as i32 + 1, filter)?
            .is_some();
        around_target[i] = grid
            .adjacent_position_relative_neighbor(id, direction, i as i32 + 4, filter)?
            .is_some();
    }
    Ok(transitions(&around_particle) < 3 && transitions(&around_target) < 3)
}

/// No shared neighbors, yet the mover's and the target's neighborhoods are each
/// connected and the target touches someone besides the mover.
pub fn check_property_2(
    grid: &Grid,
    id: ParticleId,
    direction: Direction,
    filter: Option<ParticleFilter<'_>>,
) -> Result<bool, GridError> {
    let occupied = |shift: i32| -> Result<bool, GridError> {
        Ok(grid.relative_neighbor(id, direction, shift, filter)?.is_some())
    };
    let target_occupied = |shift: i32| -> Result<bool, GridError> {
        Ok(grid
            .adjacent_position_relative_neighbor(id, direction, shift, filter)?
            .is_some())
    };

    if occupied(5)? || occupied(1)? {
        return Ok(false);
    }
    // Counts the mover itself.
    if grid.adjacent_position_neighbors(id, direction, filter)?.len() <= 1 {
        return Ok(false);
    }
    if occupied(2)? && !occupied(3)? && occupied(4)? {
        return Ok(false);
    }
    Ok(!target_occupied(1)? || target_occupied(0)? || !target_occupied(5)?)
}

/// Whether the valid positions accepted by `include` form one connected region.
///
/// Vacuously true when no position qualifies.
pub fn is_connected(grid: &Grid, include: impl Fn(&Position) -> bool) -> bool {
    let eligible: Vec<Position> = grid
        .topology()
        .valid_positions()
        .into_iter()
        .filter(|position| include(position))
        .collect();
    let Some(&start) = eligible.first() else {
        return true;
    };

    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(position) = queue.pop_front() {
        for next in grid.adjacent_positions(&position) {
            if grid.is_position_valid(&next, None) && include(&next) && visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    visited.len() == eligible.len()
}

/// Whether all particles form a single connected component.
#[must_use]
pub fn check_particle_connection(grid: &Grid) -> bool {
    is_connected(grid, |position| grid.is_occupied(position))
}

/// Whether the empty cells form a single region, i.e. there are no holes.
#[must_use]
pub fn check_particle_holes(grid: &Grid) -> bool {
    is_connected(grid, |position| !grid.is_occupied(position))
}

/// Particles reachable from `id` through neighbor links, `id` first.
#[must_use]
pub fn component(grid: &Grid, id: ParticleId) -> Vec<ParticleId> {
    if !grid.contains(id) {
        return Vec::new();
    }
    let mut visited = HashSet::from([id]);
    let mut members = vec![id];
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        let Ok(neighbors) = grid.particle_neighbors(current, None) else {
            continue;
        };
        for neighbor in neighbors {
            if visited.insert(neighbor) {
                members.push(neighbor);
                queue.push_back(neighbor);
            }
        }
    }
    members
}

/// Biggest connected component; ties go to the one found first in slot order.
#[must_use]
pub fn largest_component(grid: &Grid) -> Vec<ParticleId> {
    let mut seen = HashSet::new();
    let mut largest = Vec::new();
    for (id, _) in grid.particles() {
        if seen.contains(&id) {
            continue;
        }
        let members = component(grid, id);
        seen.extend(members.iter().copied());
        if members.len() > largest.len() {
            largest = members;
        }
    }
    largest
}

/// Neighboring pairs that share a color class.
#[must_use]
pub fn same_class_adjacencies(grid: &Grid) -> usize {
    let endpoints: usize = grid
        .particles()
        .filter_map(|(id, particle)| {
            let class = particle.class_id()?;
            let same = move |_: ParticleId, other: &crate::Particle| other.class_id() == Some(class);
            grid.particle_neighbors(id, Some(&same)).ok().map(|found| found.len())
        })
        .sum();
    endpoints / 2
}
