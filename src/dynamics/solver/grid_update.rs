use crate::dynamics::solver::{scheduler, DomainBoundary, MlsEngine, MpmHooks, SimulationDofs, SolverParameters};
use crate::dynamics::GridState;
use crate::geometry::{SpGrid, CELLS_PER_BLOCK};
use crate::math::{Real, Vector};
use crate::MpmError;

impl MlsEngine {
    /// Grid update: normalizes momentum into velocity on every cell with
    /// mass, applies grid-level gravity, degree-of-freedom locks, and the
    /// domain-face boundary condition.
    ///
    /// Cell-local, so blocks run in a single uncolored parallel pass.
    pub fn grid_update(
        dt: Real,
        gravity: &Vector<Real>,
        params: &SolverParameters,
        grid: &mut SpGrid<GridState>,
        hooks: &dyn MpmHooks,
    ) -> Result<(), MpmError> {
        let res = grid.res();
        let margin = params.boundary_margin;
        let boundary = params.domain_boundary;
        let dofs = params.simulation_dofs;
        // Gravity goes through the particles when particle_gravity is set.
        let grid_gravity = if params.particle_gravity {
            Vector::zeros()
        } else {
            gravity * dt
        };

        scheduler::for_each_block(grid, false, false, hooks, |_b, block_offset, grid| {
            let block_base = SpGrid::<GridState>::linear_to_coord(block_offset);
            let cells = grid.block_cells_mut(block_offset).ok_or_else(|| {
                MpmError::InternalInvariant(format!(
                    "live block {:#x} has no storage",
                    block_offset
                ))
            })?;

            for t in 0..CELLS_PER_BLOCK {
                let cell = &mut cells[t];
                let mass = cell.velocity_and_mass.w;
                if mass <= 0.0 {
                    continue;
                }

                let inv_mass = 1.0 / mass;
                let mut velocity = cell.velocity_and_mass.xyz() * inv_mass + grid_gravity;

                if dofs.contains(SimulationDofs::LOCK_X) {
                    velocity.x = 0.0;
                }
                if dofs.contains(SimulationDofs::LOCK_Y) {
                    velocity.y = 0.0;
                }
                if dofs.contains(SimulationDofs::LOCK_Z) {
                    velocity.z = 0.0;
                }

                let coord = block_base + SpGrid::<GridState>::block_local_to_shift(t);
                match boundary {
                    DomainBoundary::None => {}
                    DomainBoundary::Slip => {
                        for axis in 0..3 {
                            if (coord[axis] < margin && velocity[axis] < 0.0)
                                || (coord[axis] > res[axis] - 1 - margin && velocity[axis] > 0.0)
                            {
                                velocity[axis] = 0.0;
                            }
                        }
                    }
                    DomainBoundary::Stick => {
                        let near_face = (0..3).any(|axis| {
                            coord[axis] < margin || coord[axis] > res[axis] - 1 - margin
                        });
                        if near_face {
                            velocity.fill(0.0);
                        }
                    }
                }

                cell.velocity_and_mass =
                    na::vector![velocity.x, velocity.y, velocity.z, mass];
            }
            Ok(())
        })?;

        Ok(())
    }
}
