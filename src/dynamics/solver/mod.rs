pub use self::kernel::{KernelStencil, MlsKernel, QuadraticKernel};
pub use self::mpm_hooks::MpmHooks;
pub use self::solver_parameters::{DomainBoundary, SimulationDofs, SolverParameters};

mod fluidity;
mod grid_cache;
mod grid_update;
mod kernel;
mod mpm_hooks;
mod rasterize;
mod resample;
mod scheduler;
mod solver_parameters;
mod timestep_estimator;

use crate::dynamics::{GridState, ParticleSet, RigidBodySet};
use crate::geometry::SpGrid;
use crate::math::{Real, Vector};
use crate::MpmError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics accumulated over one `step` call.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct StepStats {
    pub substeps: u32,
    /// Smallest substep length taken.
    pub min_dt: Real,
    /// Total of the counters returned by the materials' plastic updates.
    pub plasticity_counter: u64,
    /// Particles whose deformation state was reset after a numerical blowup.
    pub domain_resets: u64,
    /// True when a cooperative cancellation interrupted the step.
    pub cancelled: bool,
}

/// The MLS-MPM transfer engine: rasterize, grid update, resample.
pub struct MlsEngine;

impl MlsEngine {
    /// Advances the simulation by `params.dt`, substepping as needed.
    ///
    /// Phases within a substep are separated by barriers; rigid bodies see
    /// their accumulated coupling impulses flushed once per transfer phase.
    pub fn step(
        params: &SolverParameters,
        gravity: &Vector<Real>,
        rigids: &RigidBodySet,
        grid: &mut SpGrid<GridState>,
        particles: &mut ParticleSet,
        hooks: &mut dyn MpmHooks,
    ) -> Result<StepStats, MpmError> {
        let mut stats = StepStats {
            min_dt: Real::MAX,
            ..StepStats::default()
        };

        if particles.is_empty() || params.dt == 0.0 {
            stats.min_dt = 0.0;
            return Ok(stats);
        }
        params.validate()?;

        let plasticity_counter = AtomicU64::new(0);
        let domain_resets = AtomicU64::new(0);

        let min_dt = params.dt / (params.max_num_substeps as Real);
        let mut remaining_time = params.dt;

        while remaining_time > 0.0 {
            let tt0 = instant::now();

            let t0 = instant::now();
            particles.sort(grid)?;
            info!("Sort time: {}ms", instant::now() - t0);

            let t0 = instant::now();
            let mut dt = remaining_time.min(params.max_substep_dt);
            if params.use_adaptive_dt {
                dt = dt.min(Self::adaptive_timestep_length(dt, grid, particles));
                if dt < min_dt && remaining_time > min_dt {
                    dt = min_dt;
                }
            }
            info!("Adaptive timestep: {}ms", instant::now() - t0);

            let t0 = instant::now();
            let cancelled = Self::rasterize(dt, gravity, params, rigids, grid, particles, hooks)?;
            info!("Rasterize: {}ms", instant::now() - t0);
            if cancelled {
                stats.cancelled = true;
                break;
            }

            let t0 = instant::now();
            Self::grid_update(dt, gravity, params, grid, hooks)?;
            hooks.post_grid_update(grid);
            info!("Grid update: {}ms", instant::now() - t0);

            if particles.has_nonlocal() {
                let t0 = instant::now();
                Self::update_grid_fluidity(grid, particles, hooks)?;
                info!("Fluidity: {}ms", instant::now() - t0);
            }

            let t0 = instant::now();
            let cancelled = Self::resample(
                dt,
                params,
                rigids,
                grid,
                particles,
                hooks,
                &plasticity_counter,
                &domain_resets,
            )?;
            info!("Resample: {}ms", instant::now() - t0);

            stats.substeps += 1;
            stats.min_dt = stats.min_dt.min(dt);
            remaining_time -= dt;

            info!(
                ">> Substep ({}s, {}Hz) computation time: {}ms",
                dt,
                1.0 / dt,
                instant::now() - tt0
            );

            if cancelled {
                stats.cancelled = true;
                break;
            }
            if params.stop_after_one_substep {
                break;
            }
        }

        if stats.substeps == 0 {
            stats.min_dt = 0.0;
        }
        stats.plasticity_counter = plasticity_counter.load(Ordering::Relaxed);
        stats.domain_resets = domain_resets.load(Ordering::Relaxed);
        Ok(stats)
    }
}
