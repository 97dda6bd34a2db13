use crate::dynamics::cdf::{friction_project, BodyStates};
use crate::dynamics::solver::grid_cache::GridCache;
use crate::dynamics::solver::kernel::{KernelStencil, MlsKernel, QuadraticKernel, STENCIL_OFFSETS};
use crate::dynamics::solver::{scheduler, MlsEngine, MpmHooks, SolverParameters};
use crate::dynamics::{GridState, ParticleSet, RigidBodySet};
use crate::geometry::{SpGrid, CELLS_PER_BLOCK};
use crate::math::{Real, Vector, Vector4, DIM, USE_MLS_MPM};
use crate::MpmError;
use std::sync::atomic::{AtomicPtr, Ordering};

impl MlsEngine {
    /// Rasterize (P2G): scatters particle mass, momentum, and stress onto
    /// the grid, diverting cross-surface transfers into rigid-body impulses.
    ///
    /// Returns whether the phase was cancelled.
    pub fn rasterize(
        dt: Real,
        gravity: &Vector<Real>,
        params: &SolverParameters,
        rigids: &RigidBodySet,
        grid: &mut SpGrid<GridState>,
        particles: &mut ParticleSet,
        hooks: &dyn MpmHooks,
    ) -> Result<bool, MpmError> {
        rigids.reset_tmp_velocities();

        let cell_width = grid.cell_width();
        let inv_dx = grid.inv_cell_width();
        let gravity = *gravity;
        let particle_gravity = params.particle_gravity;

        let particles_ptr = AtomicPtr::new(particles as *mut ParticleSet);

        let cancelled = scheduler::for_each_block(grid, true, true, hooks, |b, block_offset, grid| {
            let particles: &mut ParticleSet =
                unsafe { &mut *particles_ptr.load(Ordering::Relaxed) };

            if grid.is_rigid_page(block_offset) {
                rasterize_block_rigid(
                    b,
                    block_offset,
                    grid,
                    particles,
                    rigids,
                    dt,
                    &gravity,
                    particle_gravity,
                    cell_width,
                    inv_dx,
                )
            } else {
                rasterize_block_normal(
                    b,
                    block_offset,
                    grid,
                    particles,
                    dt,
                    &gravity,
                    particle_gravity,
                    inv_dx,
                )
            }
        })?;

        rigids.apply_tmp_velocities();
        Ok(cancelled)
    }
}

/// Block kernel for blocks near rigid surfaces: full-cell scratch, per-node
/// coloring test, impulse diversion on incompatibility.
#[allow(clippy::too_many_arguments)]
fn rasterize_block_rigid(
    b: u32,
    block_offset: u64,
    grid: &mut SpGrid<GridState>,
    particles: &mut ParticleSet,
    rigids: &RigidBodySet,
    dt: Real,
    gravity: &Vector<Real>,
    particle_gravity: bool,
    cell_width: Real,
    inv_dx: Real,
) -> Result<(), MpmError> {
    let mut cache = GridCache::<GridState>::load(grid, block_offset);
    let block_base = SpGrid::<GridState>::linear_to_coord(block_offset);

    let mut particle_end = particles.block_meta[b as usize].particle_offset as usize;

    for t in 0..CELLS_PER_BLOCK {
        let grid_cache_offset = GridCache::<GridState>::block_cell_to_scratch(t);
        let particle_begin = particle_end;
        particle_end += cache.cell(grid_cache_offset).particle_count as usize;

        let cell_f = (block_base + SpGrid::<GridState>::block_local_to_shift(t)).cast::<Real>();

        for pi in particle_begin..particle_end {
            let pid = particles.order[pi] as usize;
            let p = &mut particles.particles[pid];
            if particle_gravity {
                p.velocity += gravity * dt;
            }

            // pos is the magnified (grid-unit) position.
            let pos = p.pos * inv_dx;
            let rel_pos = pos - cell_f;
            let kernel = KernelStencil::new(&rel_pos, inv_dx);

            let v = p.velocity;
            let mass = p.mass;
            let apic_b_inv_d_mass = p.apic_b * (QuadraticKernel::inv_d() * mass);
            let apic_c_inv_d_mass = p.apic_c * (16.0 * mass);
            let mass_v = mass * v;
            let stress_dt = p.calculate_force() * dt;
            let particle_states = p.states;
            let boundary_normal = p.boundary_normal;

            for node in 0..27 {
                let (i, j, k) = (node / 9, node / 3 % 3, node % 3);
                let dpos = rel_pos - STENCIL_OFFSETS[node].cast::<Real>();
                let (dw, w) = kernel.dw_w(i, j, k);

                let g = cache.cell_mut(grid_cache_offset + GridCache::<GridState>::kernel_linearized(node));

                if BodyStates::incompatible(g.get_states(), particle_states) {
                    // The node lies across a rigid surface: divert the
                    // transfer into an impulse on the body.
                    let Some(r) = rigids.get(g.get_rigid_body_id()) else {
                        continue;
                    };
                    let node_pos =
                        (cell_f + STENCIL_OFFSETS[node].cast::<Real>()) * cell_width;
                    let rigid_v = r.velocity_at(node_pos);
                    let side = (particle_states >> (2 * r.id())) & 1;
                    let friction = r.frictions()[side as usize];

                    let velocity_change =
                        v - friction_project(v, rigid_v, boundary_normal, friction);
                    let impulse = mass * w * velocity_change + stress_dt * dw;
                    r.apply_tmp_impulse(impulse, node_pos);
                    continue;
                }

                let mut dposc: Vector<Real> = na::zero();
                for a in 0..DIM {
                    dposc[a] = dpos[a] * dpos[(a + 1) % 3];
                }

                let delta = if USE_MLS_MPM {
                    let momentum = mass_v
                        + apic_b_inv_d_mass * dpos
                        + apic_c_inv_d_mass * dposc
                        - stress_dt * dpos * (4.0 * inv_dx);
                    w * Vector4::new(momentum.x, momentum.y, momentum.z, mass)
                } else {
                    let momentum = mass_v + apic_b_inv_d_mass * dpos;
                    let f = stress_dt * dw;
                    w * Vector4::new(momentum.x, momentum.y, momentum.z, mass)
                        + Vector4::new(f.x, f.y, f.z, 0.0)
                };
                g.velocity_and_mass += delta;
            }
        }
    }

    cache.flush(grid);
    Ok(())
}

/// Block kernel away from rigid surfaces: packed momentum/mass scratch and
/// the fast axis-separable kernel.
#[allow(clippy::too_many_arguments)]
fn rasterize_block_normal(
    b: u32,
    block_offset: u64,
    grid: &mut SpGrid<GridState>,
    particles: &mut ParticleSet,
    dt: Real,
    gravity: &Vector<Real>,
    particle_gravity: bool,
    inv_dx: Real,
) -> Result<(), MpmError> {
    let cells = grid.block_cells(block_offset).ok_or_else(|| {
        MpmError::InternalInvariant(format!("live block {:#x} has no storage", block_offset))
    })?;
    let mut counts = [0u32; CELLS_PER_BLOCK];
    for (t, cell) in cells.iter().enumerate() {
        counts[t] = cell.particle_count;
    }

    let mut cache = GridCache::<Vector4<Real>>::load(grid, block_offset);
    let block_base = SpGrid::<GridState>::linear_to_coord(block_offset);

    let mut particle_end = particles.block_meta[b as usize].particle_offset as usize;

    for t in 0..CELLS_PER_BLOCK {
        let grid_cache_offset = GridCache::<Vector4<Real>>::block_cell_to_scratch(t);
        let particle_begin = particle_end;
        particle_end += counts[t] as usize;

        let cell_f = (block_base + SpGrid::<GridState>::block_local_to_shift(t)).cast::<Real>();

        for pi in particle_begin..particle_end {
            let pid = particles.order[pi] as usize;
            let p = &mut particles.particles[pid];
            if particle_gravity {
                p.velocity += gravity * dt;
            }

            let pos = p.pos * inv_dx;
            let rel_pos = pos - cell_f;

            let v = p.velocity;
            let mass = p.mass;
            let apic_b_inv_d_mass = p.apic_b * (QuadraticKernel::inv_d() * mass);
            let apic_c_inv_d_mass = p.apic_c * (16.0 * mass);
            let mass_v = mass * v;
            let stress = p.calculate_force();

            if USE_MLS_MPM {
                let kernel = MlsKernel::new(&rel_pos);
                // The stress term folds into the affine matrix.
                let affine = apic_b_inv_d_mass + stress * (-4.0 * inv_dx * dt);

                for node in 0..27 {
                    let dpos = rel_pos - STENCIL_OFFSETS[node].cast::<Real>();
                    let w = kernel.w(node);

                    let mut dposc: Vector<Real> = na::zero();
                    for a in 0..DIM {
                        dposc[a] = dpos[a] * dpos[(a + 1) % 3];
                    }

                    let momentum = mass_v + affine * dpos + apic_c_inv_d_mass * dposc;
                    let delta = w * Vector4::new(momentum.x, momentum.y, momentum.z, mass);
                    *cache.cell_mut(
                        grid_cache_offset + GridCache::<Vector4<Real>>::kernel_linearized(node),
                    ) += delta;
                }
            } else {
                let kernel = KernelStencil::new(&rel_pos, inv_dx);
                let stress_dt = stress * dt;

                for node in 0..27 {
                    let (i, j, k) = (node / 9, node / 3 % 3, node % 3);
                    let dpos = rel_pos - STENCIL_OFFSETS[node].cast::<Real>();
                    let (dw, w) = kernel.dw_w(i, j, k);

                    let momentum = mass_v + apic_b_inv_d_mass * dpos;
                    let f = stress_dt * dw;
                    let delta = w * Vector4::new(momentum.x, momentum.y, momentum.z, mass)
                        + Vector4::new(f.x, f.y, f.z, 0.0);
                    *cache.cell_mut(
                        grid_cache_offset + GridCache::<Vector4<Real>>::kernel_linearized(node),
                    ) += delta;
                }
            }
        }
    }

    cache.flush(grid);
    Ok(())
}
