use crate::dynamics::GridState;
use crate::geometry::{SpGrid, BLOCK_WIDTH};
use crate::math::{CellCoord, Real, Vector4};

pub(crate) const SCRATCH_WIDTH: usize = BLOCK_WIDTH + 2;
pub(crate) const SCRATCH_CELLS: usize = SCRATCH_WIDTH * SCRATCH_WIDTH * SCRATCH_WIDTH;

/// The slice of a grid cell a transfer pass needs in its scratch copy.
pub(crate) trait CacheCell: Copy {
    fn zeroed() -> Self;
    fn load(cell: &GridState) -> Self;
    fn store(self, cell: &mut GridState);
}

impl CacheCell for GridState {
    #[inline(always)]
    fn zeroed() -> Self {
        GridState::default()
    }

    #[inline(always)]
    fn load(cell: &GridState) -> Self {
        *cell
    }

    #[inline(always)]
    fn store(self, cell: &mut GridState) {
        *cell = self;
    }
}

impl CacheCell for Vector4<Real> {
    #[inline(always)]
    fn zeroed() -> Self {
        na::zero()
    }

    #[inline(always)]
    fn load(cell: &GridState) -> Self {
        cell.velocity_and_mass
    }

    #[inline(always)]
    fn store(self, cell: &mut GridState) {
        cell.velocity_and_mass = self;
    }
}

/// Block-local scratch copy of one block plus a two-cell halo on the
/// positive sides.
///
/// Particles owned by a block have their base cell inside the block, so
/// their 3-cell stencils always land inside the scratch. The element type
/// selects between the full cell (rigid-aware path) and the packed
/// momentum/mass lanes (pure-momentum path).
pub(crate) struct GridCache<E> {
    base: CellCoord,
    cells: [E; SCRATCH_CELLS],
}

impl<E: CacheCell> GridCache<E> {
    pub fn load(grid: &SpGrid<GridState>, block_offset: u64) -> Self {
        let base = SpGrid::<GridState>::linear_to_coord(block_offset);
        let mut cells = [E::zeroed(); SCRATCH_CELLS];
        let mut idx = 0;
        for i in 0..SCRATCH_WIDTH as i32 {
            for j in 0..SCRATCH_WIDTH as i32 {
                for k in 0..SCRATCH_WIDTH as i32 {
                    cells[idx] = E::load(&grid.get(base + na::vector![i, j, k]));
                    idx += 1;
                }
            }
        }
        Self { base, cells }
    }

    /// Writes the scratch back to the grid. Safe under the block coloring:
    /// the halo region is owned exclusively while this block executes.
    pub fn flush(&self, grid: &mut SpGrid<GridState>) {
        let mut idx = 0;
        for i in 0..SCRATCH_WIDTH as i32 {
            for j in 0..SCRATCH_WIDTH as i32 {
                for k in 0..SCRATCH_WIDTH as i32 {
                    let coord = self.base + na::vector![i, j, k];
                    if let Some(cell) = grid.get_mut(coord) {
                        self.cells[idx].store(cell);
                    }
                    idx += 1;
                }
            }
        }
    }

    #[inline(always)]
    pub fn cell(&self, linear: usize) -> &E {
        &self.cells[linear]
    }

    #[inline(always)]
    pub fn cell_mut(&mut self, linear: usize) -> &mut E {
        &mut self.cells[linear]
    }

    #[inline(always)]
    pub const fn linearized_offset(x: usize, y: usize, z: usize) -> usize {
        x * SCRATCH_WIDTH * SCRATCH_WIDTH + y * SCRATCH_WIDTH + z
    }

    /// Scratch offset of stencil node `node ∈ [0, 27)` relative to the
    /// scratch offset of the particle's base cell.
    #[inline(always)]
    pub const fn kernel_linearized(node: usize) -> usize {
        (node / 9) * SCRATCH_WIDTH * SCRATCH_WIDTH + (node / 3 % 3) * SCRATCH_WIDTH + node % 3
    }

    /// Scratch offset of a block-linear cell index.
    #[inline(always)]
    pub fn block_cell_to_scratch(t: usize) -> usize {
        let shift = SpGrid::<GridState>::block_local_to_shift(t);
        Self::linearized_offset(shift.x as usize, shift.y as usize, shift.z as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use na::vector;

    #[test]
    fn scratch_indexing_is_consistent() {
        for t in 0..crate::geometry::CELLS_PER_BLOCK {
            let shift = SpGrid::<GridState>::block_local_to_shift(t);
            let scratch = GridCache::<GridState>::block_cell_to_scratch(t);
            assert_eq!(
                scratch,
                GridCache::<GridState>::linearized_offset(
                    shift.x as usize,
                    shift.y as usize,
                    shift.z as usize
                )
            );
        }
        // A full stencil from the block's far corner stays inside the scratch.
        let far = GridCache::<GridState>::block_cell_to_scratch(CELLS_LAST);
        assert!(far + GridCache::<GridState>::kernel_linearized(26) < SCRATCH_CELLS);
    }

    const CELLS_LAST: usize = crate::geometry::CELLS_PER_BLOCK - 1;

    #[test]
    fn load_flush_roundtrip_preserves_cells() {
        let mut grid =
            SpGrid::<GridState>::with_capacity(0.1, vector![32, 32, 32], 64).unwrap();
        grid.touch_cell(vector![4, 4, 4]).unwrap();
        grid.get_mut(vector![5, 6, 7]).unwrap().velocity_and_mass =
            na::vector![1.0, 2.0, 3.0, 4.0];
        grid.get_mut(vector![5, 6, 7]).unwrap().states = 0xAB;

        let code = SpGrid::<GridState>::coord_to_block_offset(vector![4, 4, 4]);
        let mut cache = GridCache::<GridState>::load(&grid, code);
        let scratch = GridCache::<GridState>::linearized_offset(1, 2, 3);
        assert_eq!(cache.cell(scratch).states, 0xAB);

        cache.cell_mut(scratch).velocity_and_mass.w += 1.0;
        cache.flush(&mut grid);
        assert_eq!(
            grid.get(vector![5, 6, 7]).velocity_and_mass,
            na::vector![1.0, 2.0, 3.0, 5.0]
        );
    }
}
