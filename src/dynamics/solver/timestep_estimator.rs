use crate::dynamics::solver::MlsEngine;
use crate::dynamics::{GridState, ParticleSet};
use crate::geometry::SpGrid;
use crate::math::Real;
use ordered_float::NotNan;
use rayon::prelude::*;

impl MlsEngine {
    /// Largest substep every material allows: a parallel min over the
    /// particles' `get_allowed_dt`, where 0 means "no constraint".
    pub(crate) fn adaptive_timestep_length(
        max_dt: Real,
        grid: &SpGrid<GridState>,
        particles: &ParticleSet,
    ) -> Real {
        let cell_width = grid.cell_width();

        particles
            .order
            .par_iter()
            .map(|i| {
                let particle = &particles.particles[*i as usize];
                let allowed = particle.get_allowed_dt(cell_width);
                let dt = if allowed > 0.0 {
                    max_dt.min(allowed)
                } else {
                    max_dt
                };
                NotNan::new(dt).unwrap_or_else(|_| NotNan::new(max_dt).unwrap())
            })
            .min()
            .map(NotNan::into_inner)
            .unwrap_or(max_dt)
    }
}
