use crate::dynamics::models::Material;
use crate::dynamics::solver::grid_cache::GridCache;
use crate::dynamics::solver::kernel::{KernelStencil, STENCIL_OFFSETS};
use crate::dynamics::solver::{scheduler, MlsEngine, MpmHooks};
use crate::dynamics::{GridState, ParticleSet};
use crate::geometry::{SpGrid, CELLS_PER_BLOCK};
use crate::math::Real;
use crate::utils::inv_exact;
use crate::MpmError;
use std::sync::atomic::{AtomicPtr, Ordering};

impl MlsEngine {
    /// Builds the node granular-fluidity field and its Laplacian for the
    /// nonlocal rheology: particle fluidity is rasterized mass-weighted into
    /// `aux0`/`aux1`, normalized into `granular_fluidity`, then a 7-point
    /// Laplacian lands in `aux2` for the resample gather.
    pub(crate) fn update_grid_fluidity(
        grid: &mut SpGrid<GridState>,
        particles: &mut ParticleSet,
        hooks: &dyn MpmHooks,
    ) -> Result<(), MpmError> {
        let inv_dx = grid.inv_cell_width();
        let particles_ptr = AtomicPtr::new(particles as *mut ParticleSet);

        // Scatter w·m·gf and w·m.
        scheduler::for_each_block(grid, true, true, hooks, |b, block_offset, grid| {
            let particles: &mut ParticleSet =
                unsafe { &mut *particles_ptr.load(Ordering::Relaxed) };
            scatter_block_fluidity(b, block_offset, grid, particles, inv_dx)
        })?;

        // Normalize into the node fluidity.
        scheduler::for_each_block(grid, false, false, hooks, |_b, block_offset, grid| {
            let cells = grid.block_cells_mut(block_offset).ok_or_else(|| {
                MpmError::InternalInvariant(format!(
                    "live block {:#x} has no storage",
                    block_offset
                ))
            })?;
            for cell in cells.iter_mut() {
                cell.granular_fluidity = cell.aux0 * inv_exact(cell.aux1);
            }
            Ok(())
        })?;

        // 7-point Laplacian of the node fluidity. Colored: the pass reads
        // neighbor cells of adjacent blocks while writing its own.
        let inv_dx2 = inv_dx * inv_dx;
        scheduler::for_each_block(grid, true, true, hooks, |_b, block_offset, grid| {
            let block_base = SpGrid::<GridState>::linear_to_coord(block_offset);
            let mut laplacian = [0.0f64; CELLS_PER_BLOCK];
            for (t, lap) in laplacian.iter_mut().enumerate() {
                let coord = block_base + SpGrid::<GridState>::block_local_to_shift(t);
                let center = grid.get(coord).granular_fluidity;
                let mut sum = 0.0f32;
                for axis in 0..3 {
                    let mut e = na::Vector3::<i32>::zeros();
                    e[axis] = 1;
                    sum += grid.get(coord + e).granular_fluidity
                        + grid.get(coord - e).granular_fluidity
                        - 2.0 * center;
                }
                *lap = (sum * inv_dx2) as f64;
            }

            let cells = grid.block_cells_mut(block_offset).ok_or_else(|| {
                MpmError::InternalInvariant(format!(
                    "live block {:#x} has no storage",
                    block_offset
                ))
            })?;
            for t in 0..CELLS_PER_BLOCK {
                cells[t].aux2 = laplacian[t];
            }
            Ok(())
        })?;

        Ok(())
    }
}

fn scatter_block_fluidity(
    b: u32,
    block_offset: u64,
    grid: &mut SpGrid<GridState>,
    particles: &mut ParticleSet,
    inv_dx: Real,
) -> Result<(), MpmError> {
    let mut cache = GridCache::<GridState>::load(grid, block_offset);
    let block_base = SpGrid::<GridState>::linear_to_coord(block_offset);

    let mut particle_end = particles.block_meta[b as usize].particle_offset as usize;
    let mut touched = false;

    for t in 0..CELLS_PER_BLOCK {
        let grid_cache_offset = GridCache::<GridState>::block_cell_to_scratch(t);
        let particle_begin = particle_end;
        particle_end += cache.cell(grid_cache_offset).particle_count as usize;

        let cell_f = (block_base + SpGrid::<GridState>::block_local_to_shift(t)).cast::<Real>();

        for pi in particle_begin..particle_end {
            let pid = particles.order[pi] as usize;
            let p = &particles.particles[pid];
            let gf = match &p.material {
                Material::Nonlocal(m) => m.gf,
                _ => continue,
            };
            touched = true;

            let rel_pos = p.pos * inv_dx - cell_f;
            let kernel = KernelStencil::new(&rel_pos, inv_dx);
            let mass = p.mass;

            for (node, _) in STENCIL_OFFSETS.iter().enumerate() {
                let (i, j, k) = (node / 9, node / 3 % 3, node % 3);
                let w = kernel.w(i, j, k);
                let g = cache
                    .cell_mut(grid_cache_offset + GridCache::<GridState>::kernel_linearized(node));
                g.aux0 += w * mass * gf;
                g.aux1 += w * mass;
            }
        }
    }

    if touched {
        cache.flush(grid);
    }
    Ok(())
}
