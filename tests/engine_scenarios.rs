//! End-to-end scenarios for the full substep pipeline.

use approx::assert_relative_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use talus::na::{vector, Vector3};
use talus::prelude::*;

fn free_material() -> Material {
    Material::Linear(
        Linear::new(&LinearParams {
            youngs_modulus: 0.0,
            poisson_ratio: 0.3,
        })
        .unwrap(),
    )
}

fn one_substep_params() -> SolverParameters {
    SolverParameters {
        dt: 1.0e-4,
        max_substep_dt: 1.0e-4,
        particle_gravity: true,
        domain_boundary: DomainBoundary::None,
        ..Default::default()
    }
}

#[test]
fn single_free_particle_advects_ballistically() {
    let dx = 0.1;
    let dt = 1.0e-4;
    let mut grid = SpGrid::<GridState>::with_capacity(dx, vector![32, 32, 32], 512).unwrap();
    let mut particles = ParticleSet::new();

    let mut p = MpmParticle::new(free_material(), vector![0.5, 0.5, 0.5] * dx, 1.0, 1.0e-6);
    p.velocity = vector![1.0, 0.0, 0.0];
    particles.insert(p);

    let params = one_substep_params();
    let rigids = RigidBodySet::new();
    let stats = MlsEngine::step(
        &params,
        &Vector3::zeros(),
        &rigids,
        &mut grid,
        &mut particles,
        &mut (),
    )
    .unwrap();

    assert_eq!(stats.substeps, 1);
    let p = &particles.particles()[0];
    assert_relative_eq!(p.velocity, vector![1.0, 0.0, 0.0], epsilon = 1.0e-6);
    assert_relative_eq!(
        p.pos,
        vector![0.5 * dx + dt, 0.5 * dx, 0.5 * dx],
        epsilon = 1.0e-6
    );
}

#[test]
fn resting_jelly_cube_free_falls_uniformly() {
    let dx = 0.05;
    let dt = 1.0e-4;
    let mut grid = SpGrid::<GridState>::with_capacity(dx, vector![32, 32, 32], 2048).unwrap();
    let mut particles = ParticleSet::new();

    let jelly = Material::Jelly(Jelly::new(&JellyParams::default()).unwrap());
    for i in 0..8 {
        for j in 0..8 {
            for k in 0..8 {
                let pos = vector![
                    0.4 + i as f32 * 0.025,
                    0.4 + j as f32 * 0.025,
                    0.4 + k as f32 * 0.025
                ];
                particles.insert(MpmParticle::new(jelly.clone(), pos, 1.0e-3, 1.5e-5));
            }
        }
    }

    let params = one_substep_params();
    let rigids = RigidBodySet::new();
    MlsEngine::step(
        &params,
        &vector![0.0, -9.8, 0.0],
        &rigids,
        &mut grid,
        &mut particles,
        &mut (),
    )
    .unwrap();

    for p in particles.iter() {
        assert_relative_eq!(
            p.velocity,
            vector![0.0, -9.8 * dt, 0.0],
            epsilon = 1.0e-6
        );
    }
}

/// Paints the 27-node stencil of a particle with one rigid body's coloring.
fn paint_stencil(
    grid: &mut SpGrid<GridState>,
    pos: Vector3<f32>,
    grid_side: u32,
    body_id: i32,
) {
    let inv_dx = grid.inv_cell_width();
    let base = (pos * inv_dx).map(|e| (e - 0.5).floor() as i32);
    let mut grid_states = BodyStates::default();
    grid_states.set_active(0, true);
    grid_states.set_side(0, grid_side);

    for di in 0..3 {
        for dj in 0..3 {
            for dk in 0..3 {
                let coord = base + vector![di, dj, dk];
                let cell = grid.get_mut(coord).expect("stencil cell not committed");
                cell.set_states(grid_states.0);
                cell.set_rigid_body_id(body_id);
            }
        }
    }
    grid.mark_rigid_page(SpGrid::<GridState>::coord_to_block_offset(base));
}

fn plate_impulse_scenario(grid_side: u32, cut_side: u32, friction: f32) -> (Vector3<f32>, f32) {
    let dx = 0.1;
    let mut grid = SpGrid::<GridState>::with_capacity(dx, vector![32, 32, 32], 512).unwrap();
    let mut particles = ParticleSet::new();

    // A particle moving into the plate, colored on the far side of it.
    let pos = vector![1.05, 1.05, 1.05];
    let mut p = MpmParticle::new(free_material(), pos, 2.0, 1.0e-6);
    p.velocity = vector![-1.0, 0.0, 0.0];
    p.boundary_normal = vector![1.0, 0.0, 0.0];
    let mut states = BodyStates::default();
    states.set_active(0, true);
    states.set_side(0, cut_side);
    p.states = states.0;
    particles.insert(p);

    // A compatible particle far away: its momentum must reach the grid.
    let mut witness = MpmParticle::new(free_material(), vector![2.5, 2.5, 2.5], 3.0, 1.0e-6);
    witness.velocity = vector![0.5, 0.0, 0.0];
    particles.insert(witness);

    let mut rigids = RigidBodySet::new();
    let body = std::sync::Arc::new(KinematicRigidBody::new(
        0,
        vector![1.0, 1.05, 1.05],
        [friction, friction],
    ));
    rigids.insert(Box::new(body.clone())).unwrap();

    let params = one_substep_params();
    particles.sort(&mut grid).unwrap();
    paint_stencil(&mut grid, pos, grid_side, 0);

    MlsEngine::rasterize(
        1.0e-4,
        &Vector3::zeros(),
        &params,
        &rigids,
        &mut grid,
        &mut particles,
        &(),
    )
    .unwrap();

    let mut grid_mass = 0.0;
    for &block in grid.live_blocks() {
        for cell in grid.block_cells(block).unwrap() {
            grid_mass += cell.velocity_and_mass.w;
        }
    }

    (body.accumulated_impulse(), grid_mass)
}

#[test]
fn cut_particle_transfers_momentum_to_the_plate_not_the_grid() {
    let (impulse, grid_mass) = plate_impulse_scenario(0, 1, 0.0);

    // Frictionless approach: the diverted impulse is the normal momentum.
    assert_relative_eq!(impulse, vector![-2.0, 0.0, 0.0], epsilon = 1.0e-4);
    // Only the witness particle's mass reached the grid.
    assert_relative_eq!(grid_mass, 3.0, max_relative = 1.0e-5);
}

#[test]
fn relabeling_the_cut_sides_changes_nothing() {
    let baseline = plate_impulse_scenario(0, 1, 0.25);
    let relabeled = plate_impulse_scenario(1, 0, 0.25);
    assert_eq!(baseline.0, relabeled.0);
    assert_eq!(baseline.1, relabeled.1);
}

#[test]
fn compatible_sides_do_not_generate_impulses() {
    let (impulse, grid_mass) = plate_impulse_scenario(1, 1, 0.0);
    assert_relative_eq!(impulse, Vector3::zeros());
    // Both particles rasterized.
    assert_relative_eq!(grid_mass, 5.0, max_relative = 1.0e-5);
}

#[test]
fn sticky_plate_absorbs_the_full_momentum() {
    // friction = -1 is the sticky encoding: the projected velocity equals
    // the (zero) plate velocity, so the whole momentum diverts.
    let (impulse, _) = plate_impulse_scenario(0, 1, -1.0);
    assert_relative_eq!(impulse, vector![-2.0, 0.0, 0.0], epsilon = 1.0e-4);
}

#[test]
fn nonlocal_step_builds_the_fluidity_field() {
    let dx = 0.05;
    let mut grid = SpGrid::<GridState>::with_capacity(dx, vector![32, 32, 32], 2048).unwrap();
    let mut particles = ParticleSet::new();

    let params_mat = NonlocalParams::default();
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                let pos = vector![
                    0.4 + i as f32 * 0.025,
                    0.4 + j as f32 * 0.025,
                    0.4 + k as f32 * 0.025
                ];
                let vol = 1.5e-5;
                let mass = params_mat.density * vol;
                let mut m = Nonlocal::new(&params_mat).unwrap();
                m.gf = 2.0;
                let mut p = MpmParticle::new(Material::Nonlocal(m), pos, mass, vol);
                p.velocity = vector![0.1, 0.0, 0.0];
                particles.insert(p);
            }
        }
    }

    let params = one_substep_params();
    let rigids = RigidBodySet::new();
    let stats = MlsEngine::step(
        &params,
        &vector![0.0, -9.8, 0.0],
        &rigids,
        &mut grid,
        &mut particles,
        &mut (),
    )
    .unwrap();
    assert_eq!(stats.substeps, 1);
    assert_eq!(stats.domain_resets, 0);

    // The node fluidity field was rasterized from the particle gf.
    let mut max_gf = 0.0f32;
    for &block in grid.live_blocks() {
        for cell in grid.block_cells(block).unwrap() {
            max_gf = max_gf.max(cell.granular_fluidity);
        }
    }
    assert_relative_eq!(max_gf, 2.0, epsilon = 1.0e-4);

    for p in particles.iter() {
        assert!(p.velocity.iter().all(|v| v.is_finite()));
        assert!(p.dg_e.iter().all(|v| v.is_finite()));
    }
}

struct CancelAfterFirstPoll {
    polled: AtomicBool,
}

impl MpmHooks for CancelAfterFirstPoll {
    fn cancelled(&self) -> bool {
        self.polled.swap(true, Ordering::Relaxed)
    }
}

#[test]
fn cancellation_stops_the_step_cooperatively() {
    let dx = 0.1;
    let mut grid = SpGrid::<GridState>::with_capacity(dx, vector![32, 32, 32], 2048).unwrap();
    let mut particles = ParticleSet::new();
    let mut rng_pos = 0.8f32;
    for _ in 0..64 {
        particles.insert(MpmParticle::new(
            free_material(),
            vector![rng_pos, 1.0, 1.0],
            1.0,
            1.0e-6,
        ));
        rng_pos += 0.02;
    }

    let params = SolverParameters {
        dt: 1.0e-3,
        max_substep_dt: 1.0e-4,
        ..Default::default()
    };
    let rigids = RigidBodySet::new();
    let mut hooks = CancelAfterFirstPoll {
        polled: AtomicBool::new(false),
    };
    let stats = MlsEngine::step(
        &params,
        &Vector3::zeros(),
        &rigids,
        &mut grid,
        &mut particles,
        &mut hooks,
    )
    .unwrap();
    assert!(stats.cancelled);
    assert!(stats.substeps <= 1);
}
