use crate::dynamics::cdf::{friction_project, BodyStates};
use crate::dynamics::solver::grid_cache::GridCache;
use crate::dynamics::solver::kernel::{KernelStencil, MlsKernel, STENCIL_OFFSETS};
use crate::dynamics::solver::{scheduler, MlsEngine, MpmHooks, SolverParameters};
use crate::dynamics::{GridState, MpmParticle, ParticleSet, RigidBodySet};
use crate::geometry::{SpGrid, CELLS_PER_BLOCK};
use crate::math::{Matrix, Real, Vector, Vector4, DIM, USE_MLS_MPM};
use crate::MpmError;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// Damps the skew-symmetric (RPIC) and symmetric (APIC) parts of an affine
/// momentum matrix independently.
fn damp_affine_momentum(m: &Matrix<Real>, rpic_damping: Real, apic_damping: Real) -> Matrix<Real> {
    (1.0 - rpic_damping) * 0.5 * (m - m.transpose())
        + (1.0 - apic_damping) * 0.5 * (m + m.transpose())
}

impl MlsEngine {
    /// Resample (G2P): gathers grid velocity back onto particles, rebuilds
    /// the APIC matrices and the deformation increment, applies plasticity,
    /// advances positions, and applies the boundary-penetration penalty.
    ///
    /// Returns whether the phase was cancelled.
    #[allow(clippy::too_many_arguments)]
    pub fn resample(
        dt: Real,
        params: &SolverParameters,
        rigids: &RigidBodySet,
        grid: &mut SpGrid<GridState>,
        particles: &mut ParticleSet,
        hooks: &dyn MpmHooks,
        plasticity_counter: &AtomicU64,
        domain_resets: &AtomicU64,
    ) -> Result<bool, MpmError> {
        rigids.reset_tmp_velocities();

        let cell_width = grid.cell_width();
        let inv_dx = grid.inv_cell_width();
        let res = grid.res();
        // The nonlocal Laplacian gather needs the full-cell scratch.
        let force_full_cells = particles.has_nonlocal();

        let particles_ptr = AtomicPtr::new(particles as *mut ParticleSet);

        let cancelled =
            scheduler::for_each_block(grid, false, true, hooks, |b, block_offset, grid| {
                let particles: &mut ParticleSet =
                    unsafe { &mut *particles_ptr.load(Ordering::Relaxed) };

                if force_full_cells || grid.is_rigid_page(block_offset) {
                    resample_block_rigid(
                        b,
                        block_offset,
                        grid,
                        particles,
                        rigids,
                        dt,
                        params,
                        cell_width,
                        inv_dx,
                        res,
                        plasticity_counter,
                        domain_resets,
                    )
                } else {
                    resample_block_normal(
                        b,
                        block_offset,
                        grid,
                        particles,
                        dt,
                        params,
                        inv_dx,
                        res,
                        plasticity_counter,
                        domain_resets,
                    )
                }
            })?;

        rigids.apply_tmp_velocities();
        Ok(cancelled)
    }
}

/// Advection, deformation update, plasticity, and position correction shared
/// by both block kernels.
#[allow(clippy::too_many_arguments)]
fn integrate_particle(
    p: &mut MpmParticle,
    v: Vector<Real>,
    b_cols: [Vector<Real>; 3],
    c_cols: [Vector<Real>; 3],
    cdg_cols: [Vector<Real>; 3],
    laplacian_gf: Real,
    dt: Real,
    params: &SolverParameters,
    inv_dx: Real,
    res: na::Vector3<i32>,
    plasticity_total: &mut u64,
    reset_total: &mut u64,
) {
    let b = Matrix::from_columns(&b_cols);
    let c = Matrix::from_columns(&c_cols);

    if p.near_boundary() {
        p.apic_b = Matrix::zeros();
        p.apic_c = Matrix::zeros();
    } else {
        p.apic_b = damp_affine_momentum(&b, params.rpic_damping, params.apic_damping);
        p.apic_c = damp_affine_momentum(&c, params.rpic_damping, params.apic_damping);
    }
    p.velocity = v;

    let mut cdg = if USE_MLS_MPM {
        b * (-4.0 * inv_dx)
    } else {
        Matrix::from_columns(&cdg_cols)
    };
    cdg = Matrix::identity() + dt * cdg;

    *plasticity_total += p.plasticity(&cdg, laplacian_gf) as u64;

    p.pos += dt * p.velocity;

    // Position correction: keep every stencil inside the committed region.
    let eps = 1.0e-4;
    let lo = 0.5;
    p.pos = (p.pos * inv_dx).zip_map(&res.cast::<Real>(), |x, r| x.clamp(lo, r - 1.5 - eps))
        / inv_dx;

    // Numerical blowups are reset locally; the step continues.
    if !p.dg_e.iter().all(|e| e.is_finite()) || !p.velocity.iter().all(|e| e.is_finite()) {
        p.dg_e = Matrix::identity();
        p.apic_b = Matrix::zeros();
        p.apic_c = Matrix::zeros();
        p.velocity = Vector::zeros();
        *reset_total += 1;
    }
}

/// Block kernel for rigid-aware (or nonlocal) blocks: full-cell scratch with
/// coloring tests, fake velocities across cuts, and the boundary penalty.
#[allow(clippy::too_many_arguments)]
fn resample_block_rigid(
    b: u32,
    block_offset: u64,
    grid: &mut SpGrid<GridState>,
    particles: &mut ParticleSet,
    rigids: &RigidBodySet,
    dt: Real,
    params: &SolverParameters,
    cell_width: Real,
    inv_dx: Real,
    res: na::Vector3<i32>,
    plasticity_counter: &AtomicU64,
    domain_resets: &AtomicU64,
) -> Result<(), MpmError> {
    let cache = GridCache::<GridState>::load(grid, block_offset);
    let block_base = SpGrid::<GridState>::linear_to_coord(block_offset);

    let mut particle_end = particles.block_meta[b as usize].particle_offset as usize;
    let mut plasticity_total = 0u64;
    let mut reset_total = 0u64;

    for t in 0..CELLS_PER_BLOCK {
        let grid_cache_offset = GridCache::<GridState>::block_cell_to_scratch(t);
        let particle_begin = particle_end;
        particle_end += cache.cell(grid_cache_offset).particle_count as usize;

        let cell_f = (block_base + SpGrid::<GridState>::block_local_to_shift(t)).cast::<Real>();

        for pi in particle_begin..particle_end {
            let pid = particles.order[pi] as usize;
            let p = &mut particles.particles[pid];

            let pos = p.pos * inv_dx;
            let rel_pos = pos - cell_f;
            let kernel = KernelStencil::new(&rel_pos, inv_dx);

            let mut v: Vector<Real> = na::zero();
            let mut b_cols = [Vector::<Real>::zeros(); 3];
            let mut c_cols = [Vector::<Real>::zeros(); 3];
            let mut cdg_cols = [Vector::<Real>::zeros(); 3];
            let mut laplacian_gf = 0.0;
            let mut rigid_id = -1;

            for node in 0..27 {
                let (i, j, k) = (node / 9, node / 3 % 3, node % 3);
                let dpos = rel_pos - STENCIL_OFFSETS[node].cast::<Real>();
                let (dw, w) = kernel.dw_w(i, j, k);

                let g = cache.cell(grid_cache_offset + GridCache::<GridState>::kernel_linearized(node));
                let mut grid_vel = g.velocity_and_mass.xyz();

                if BodyStates::incompatible(g.get_states(), p.states) {
                    let mut fake_v = p.velocity;
                    let mut v_g: Vector<Real> = na::zero();
                    let mut friction = 0.0;
                    if let Some(r) = rigids.get(g.get_rigid_body_id()) {
                        let node_pos =
                            (cell_f + STENCIL_OFFSETS[node].cast::<Real>()) * cell_width;
                        v_g = r.velocity_at(node_pos);
                        rigid_id = g.get_rigid_body_id();
                        let side = (p.states >> (2 * r.id())) & 1;
                        friction = r.frictions()[side as usize];
                    }
                    if p.near_boundary() {
                        if p.sticky {
                            friction = -1.0;
                        }
                        fake_v = friction_project(p.velocity, v_g, p.boundary_normal, friction)
                            + p.boundary_normal * (dt * cell_width * params.pushing_force);
                    }
                    grid_vel = fake_v;
                }

                v += w * grid_vel;
                let w_grid_vel = w * grid_vel;
                for r in 0..DIM {
                    b_cols[r] += w_grid_vel * dpos[r];
                    c_cols[r] += b_cols[r] * dpos[(r + 1) % 3];
                    cdg_cols[r] += grid_vel * dw[r];
                }
                laplacian_gf += w * g.aux2 as Real;
            }

            integrate_particle(
                p,
                v,
                b_cols,
                c_cols,
                cdg_cols,
                laplacian_gf,
                dt,
                params,
                inv_dx,
                res,
                &mut plasticity_total,
                &mut reset_total,
            );

            // Boundary-penetration penalty, mirrored onto the rigid body.
            if p.near_boundary()
                && p.boundary_distance < -0.05 * cell_width
                && p.boundary_distance > -0.3 * cell_width
            {
                let delta_velocity = p.boundary_distance * p.boundary_normal * params.penalty;
                p.velocity -= delta_velocity;
                if rigid_id != -1 {
                    if let Some(r) = rigids.get(rigid_id) {
                        r.apply_tmp_impulse(delta_velocity * p.mass, p.pos);
                    }
                }
            }
        }
    }

    plasticity_counter.fetch_add(plasticity_total, Ordering::Relaxed);
    domain_resets.fetch_add(reset_total, Ordering::Relaxed);
    Ok(())
}

/// Block kernel away from rigid surfaces: packed momentum/mass scratch.
#[allow(clippy::too_many_arguments)]
fn resample_block_normal(
    b: u32,
    block_offset: u64,
    grid: &mut SpGrid<GridState>,
    particles: &mut ParticleSet,
    dt: Real,
    params: &SolverParameters,
    inv_dx: Real,
    res: na::Vector3<i32>,
    plasticity_counter: &AtomicU64,
    domain_resets: &AtomicU64,
) -> Result<(), MpmError> {
    let cells = grid.block_cells(block_offset).ok_or_else(|| {
        MpmError::InternalInvariant(format!("live block {:#x} has no storage", block_offset))
    })?;
    let mut counts = [0u32; CELLS_PER_BLOCK];
    for (t, cell) in cells.iter().enumerate() {
        counts[t] = cell.particle_count;
    }

    let cache = GridCache::<Vector4<Real>>::load(grid, block_offset);
    let block_base = SpGrid::<GridState>::linear_to_coord(block_offset);

    let mut particle_end = particles.block_meta[b as usize].particle_offset as usize;
    let mut plasticity_total = 0u64;
    let mut reset_total = 0u64;

    for t in 0..CELLS_PER_BLOCK {
        let grid_cache_offset = GridCache::<Vector4<Real>>::block_cell_to_scratch(t);
        let particle_begin = particle_end;
        particle_end += counts[t] as usize;

        let cell_f = (block_base + SpGrid::<GridState>::block_local_to_shift(t)).cast::<Real>();

        for pi in particle_begin..particle_end {
            let pid = particles.order[pi] as usize;
            let p = &mut particles.particles[pid];

            let pos = p.pos * inv_dx;
            let rel_pos = pos - cell_f;

            let mut v: Vector<Real> = na::zero();
            let mut b_cols = [Vector::<Real>::zeros(); 3];
            let mut c_cols = [Vector::<Real>::zeros(); 3];
            let mut cdg_cols = [Vector::<Real>::zeros(); 3];

            if USE_MLS_MPM {
                let kernel = MlsKernel::new(&rel_pos);
                for node in 0..27 {
                    let dpos = rel_pos - STENCIL_OFFSETS[node].cast::<Real>();
                    let w = kernel.w(node);
                    let grid_vel = cache
                        .cell(grid_cache_offset + GridCache::<Vector4<Real>>::kernel_linearized(node))
                        .xyz();

                    v += w * grid_vel;
                    let w_grid_vel = w * grid_vel;
                    for r in 0..DIM {
                        b_cols[r] += w_grid_vel * dpos[r];
                        c_cols[r] += b_cols[r] * dpos[(r + 1) % 3];
                    }
                }
            } else {
                let kernel = KernelStencil::new(&rel_pos, inv_dx);
                for node in 0..27 {
                    let (i, j, k) = (node / 9, node / 3 % 3, node % 3);
                    let dpos = rel_pos - STENCIL_OFFSETS[node].cast::<Real>();
                    let (dw, w) = kernel.dw_w(i, j, k);
                    let grid_vel = cache
                        .cell(grid_cache_offset + GridCache::<Vector4<Real>>::kernel_linearized(node))
                        .xyz();

                    v += w * grid_vel;
                    let w_grid_vel = w * grid_vel;
                    for r in 0..DIM {
                        b_cols[r] += w_grid_vel * dpos[r];
                        c_cols[r] += b_cols[r] * dpos[(r + 1) % 3];
                        cdg_cols[r] += grid_vel * dw[r];
                    }
                }
            }

            integrate_particle(
                p,
                v,
                b_cols,
                c_cols,
                cdg_cols,
                0.0,
                dt,
                params,
                inv_dx,
                res,
                &mut plasticity_total,
                &mut reset_total,
            );
        }
    }

    plasticity_counter.fetch_add(plasticity_total, Ordering::Relaxed);
    domain_resets.fetch_add(reset_total, Ordering::Relaxed);
    Ok(())
}
