use crate::dynamics::solver::MpmHooks;
use crate::dynamics::GridState;
use crate::geometry::{SpGrid, BLOCK_BITS};
use crate::MpmError;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Mutex;

/// Color of a block under the 2×2×2 parity partition. Two blocks whose
/// 3×3×3 block neighborhoods overlap never share a color.
#[inline]
pub(crate) fn block_color(block_offset: u64) -> usize {
    let base = SpGrid::<GridState>::linear_to_coord(block_offset);
    let bx = (base.x >> BLOCK_BITS) & 1;
    let by = (base.y >> BLOCK_BITS) & 1;
    let bz = (base.z >> BLOCK_BITS) & 1;
    (bx | (by << 1) | (bz << 2)) as usize
}

/// Runs `f` over every live block, in parallel.
///
/// With `touch_halo_write`, blocks run color-by-color so that no two
/// concurrently executing closures can touch the same cell (each color owns
/// its halos exclusively); colors are barriers. Without it, all blocks run
/// in one parallel pass.
///
/// Cancellation is polled between blocks; a started block completes. Worker
/// errors are collected and surfaced as a single aggregated error after the
/// phase barrier. Returns whether the phase was cancelled.
pub(crate) fn for_each_block<F>(
    grid: &mut SpGrid<GridState>,
    touch_halo_write: bool,
    _touch_halo_read: bool,
    hooks: &dyn MpmHooks,
    f: F,
) -> Result<bool, MpmError>
where
    F: Fn(u32, u64, &mut SpGrid<GridState>) -> Result<(), MpmError> + Sync,
{
    let live: Vec<u64> = grid.live_blocks().to_vec();
    let grid_ptr = AtomicPtr::new(grid as *mut SpGrid<GridState>);
    let errors = Mutex::new(Vec::new());
    let cancelled = AtomicBool::new(false);

    let run_block = |b: usize, block_offset: u64| {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        if hooks.cancelled() {
            cancelled.store(true, Ordering::Relaxed);
            return;
        }
        let grid: &mut SpGrid<GridState> = unsafe { &mut *grid_ptr.load(Ordering::Relaxed) };
        if let Err(err) = f(b as u32, block_offset, grid) {
            errors.lock().unwrap().push(err);
            cancelled.store(true, Ordering::Relaxed);
        }
    };

    if touch_halo_write {
        for color in 0..8 {
            live.par_iter()
                .enumerate()
                .filter(|(_, offset)| block_color(**offset) == color)
                .for_each(|(b, &offset)| run_block(b, offset));
        }
    } else {
        live.par_iter()
            .enumerate()
            .for_each(|(b, &offset)| run_block(b, offset));
    }

    let mut errors = errors.into_inner().unwrap();
    match errors.len() {
        0 => Ok(cancelled.load(Ordering::Relaxed)),
        1 => Err(errors.pop().unwrap()),
        n => Err(MpmError::InternalInvariant(format!(
            "{} block workers failed; first: {}",
            n, errors[0]
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use na::vector;

    #[test]
    fn neighboring_blocks_never_share_a_color() {
        let offset_of = |bx: i32, by: i32, bz: i32| {
            SpGrid::<GridState>::coord_to_block_offset(vector![bx * 4, by * 4, bz * 4])
        };
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if (dx, dy, dz) == (0, 0, 0) {
                        continue;
                    }
                    let a = block_color(offset_of(4, 4, 4));
                    let b = block_color(offset_of(4 + dx, 4 + dy, 4 + dz));
                    assert_ne!(a, b, "shift ({}, {}, {})", dx, dy, dz);
                }
            }
        }
    }

    #[test]
    fn every_color_is_reachable() {
        let mut seen = [false; 8];
        for bx in 0..2 {
            for by in 0..2 {
                for bz in 0..2 {
                    let offset = SpGrid::<GridState>::coord_to_block_offset(vector![
                        bx * 4,
                        by * 4,
                        bz * 4
                    ]);
                    seen[block_color(offset)] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
