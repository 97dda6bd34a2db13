//! Transfer-level properties of the P2G/G2P kernels: conservation of mass
//! and momentum through rasterization, exact reproduction of affine velocity
//! fields, and schedule determinism.

use approx::{assert_relative_eq, relative_eq};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::AtomicU64;
use talus::na;
use talus::na::{vector, Matrix3, Vector3};
use talus::prelude::*;

fn zero_stiffness_material() -> Material {
    // E = 0 makes the stress identically zero without touching the transfer.
    Material::Linear(
        Linear::new(&LinearParams {
            youngs_modulus: 0.0,
            poisson_ratio: 0.3,
        })
        .unwrap(),
    )
}

fn free_space_params() -> SolverParameters {
    SolverParameters {
        dt: 1.0e-4,
        max_substep_dt: 1.0e-4,
        particle_gravity: true,
        domain_boundary: DomainBoundary::None,
        ..Default::default()
    }
}

fn grid_mass_and_momentum(grid: &SpGrid<GridState>) -> (f32, Vector3<f32>) {
    let mut mass = 0.0;
    let mut momentum = Vector3::zeros();
    for &block in grid.live_blocks() {
        for cell in grid.block_cells(block).unwrap() {
            mass += cell.velocity_and_mass.w;
            momentum += cell.velocity_and_mass.xyz();
        }
    }
    (mass, momentum)
}

fn random_particles(n: usize, seed: u64) -> Vec<MpmParticle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let pos = vector![
                rng.gen_range(0.8..2.4),
                rng.gen_range(0.8..2.4),
                rng.gen_range(0.8..2.4)
            ];
            let mut p = MpmParticle::new(
                zero_stiffness_material(),
                pos,
                rng.gen_range(0.5..2.0),
                1.0e-6,
            );
            p.velocity = vector![
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0)
            ];
            p.apic_b = Matrix3::from_fn(|_, _| rng.gen_range(-0.1..0.1));
            p
        })
        .collect()
}

#[test]
fn rasterize_conserves_mass_and_momentum() {
    let mut grid = SpGrid::<GridState>::with_capacity(0.1, vector![32, 32, 32], 2048).unwrap();
    let mut particles = ParticleSet::new();
    for p in random_particles(200, 42) {
        particles.insert(p);
    }

    let expected_mass = particles.total_mass();
    let expected_momentum: Vector3<f32> = particles
        .iter()
        .map(|p| p.velocity * p.mass)
        .sum::<Vector3<f32>>();

    let params = free_space_params();
    let rigids = RigidBodySet::new();
    particles.sort(&mut grid).unwrap();
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

    let (mass, momentum) = grid_mass_and_momentum(&grid);
    assert_relative_eq!(mass, expected_mass, max_relative = 1.0e-5);
    assert_relative_eq!(momentum, expected_momentum, max_relative = 1.0e-4, epsilon = 1.0e-3);
}

#[test]
fn affine_velocity_field_is_reproduced_exactly() {
    let dx = 0.1;
    let mut grid = SpGrid::<GridState>::with_capacity(dx, vector![32, 32, 32], 2048).unwrap();
    let mut particles = ParticleSet::new();

    let a = vector![0.3, -0.2, 0.1];
    let b_field = Matrix3::new(0.1, 0.3, -0.2, 0.0, -0.4, 0.2, 0.5, 0.1, 0.0);

    // A small lattice of particles carrying the exact affine field
    // v(x) = a + B·x and the matching APIC matrix.
    let mut reference = Vec::new();
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..4 {
                let pos = vector![
                    1.0 + i as f32 * 0.05,
                    1.0 + j as f32 * 0.05,
                    1.0 + k as f32 * 0.05
                ];
                let mut p = MpmParticle::new(zero_stiffness_material(), pos, 1.0, 1.0e-6);
                p.velocity = a + b_field * pos;
                p.apic_b = -0.25 * dx * b_field;
                reference.push((pos, p.velocity));
                particles.insert(p);
            }
        }
    }

    let params = free_space_params();
    let rigids = RigidBodySet::new();
    let plasticity = AtomicU64::new(0);
    let resets = AtomicU64::new(0);

    particles.sort(&mut grid).unwrap();
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
    MlsEngine::grid_update(1.0e-4, &Vector3::zeros(), &params, &mut grid, &()).unwrap();
    MlsEngine::resample(
        1.0e-4,
        &params,
        &rigids,
        &mut grid,
        &mut particles,
        &(),
        &plasticity,
        &resets,
    )
    .unwrap();

    for p in particles.iter() {
        // Find the reference entry by matching ids through positions is
        // fragile after advection; instead recompute from the stored state.
        let expected_b = -0.25 * dx * b_field;
        assert_relative_eq!(p.apic_b, expected_b, epsilon = 1.0e-4);
    }
    // Velocities match v(x_p) for the pre-advection positions.
    for (i, p) in particles.iter().enumerate() {
        let (_, expected_v) = reference[i];
        assert_relative_eq!(p.velocity, expected_v, epsilon = 1.0e-3);
    }
    assert_eq!(resets.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[test]
fn apic_c_accumulation_uses_the_shifted_running_form() {
    // Pins the quadratic-term recurrence: within the 27-node loop, column r
    // of C accumulates the *running* column r of B scaled by dpos[(r+1)%3].
    let dx = 0.1;
    let inv_dx = 1.0 / dx;
    let mut grid = SpGrid::<GridState>::with_capacity(dx, vector![32, 32, 32], 512).unwrap();
    let mut particles = ParticleSet::new();

    let pos = vector![1.03, 1.07, 0.99];
    let mut p = MpmParticle::new(zero_stiffness_material(), pos, 1.0, 1.0e-6);
    p.velocity = vector![0.0, 0.0, 0.0];
    particles.insert(p);
    particles.sort(&mut grid).unwrap();

    // Prescribe a linear grid velocity field directly.
    let field = |coord: Vector3<f32>| vector![0.2 * coord.x, -0.1 * coord.y, 0.3 * coord.z];
    for &block in grid.live_blocks().to_vec().iter() {
        let base = SpGrid::<GridState>::linear_to_coord(block);
        for t in 0..CELLS_PER_BLOCK {
            let coord = base + SpGrid::<GridState>::block_local_to_shift(t);
            let v = field(coord.cast::<f32>() * dx);
            let cell = grid.get_mut(coord).unwrap();
            cell.velocity_and_mass = na::vector![v.x, v.y, v.z, 1.0];
        }
    }

    let params = free_space_params();
    let rigids = RigidBodySet::new();
    let plasticity = AtomicU64::new(0);
    let resets = AtomicU64::new(0);
    MlsEngine::resample(
        1.0e-4,
        &params,
        &rigids,
        &mut grid,
        &mut particles,
        &(),
        &plasticity,
        &resets,
    )
    .unwrap();

    // Independent reference evaluation of the same recurrence.
    let grid_pos = pos * inv_dx;
    let base = grid_pos.map(|e| (e - 0.5).floor());
    let rel = grid_pos - base;
    let kernel = MlsKernel::new(&rel);
    let mut b_cols = [Vector3::<f32>::zeros(); 3];
    let mut c_cols = [Vector3::<f32>::zeros(); 3];
    for node in 0..27 {
        let offset = vector![(node / 9) as f32, (node / 3 % 3) as f32, (node % 3) as f32];
        let dpos = rel - offset;
        let node_world = (base + offset) * dx;
        let w = kernel.w(node);
        let w_grid_vel = w * field(node_world);
        for r in 0..3 {
            b_cols[r] += w_grid_vel * dpos[r];
            c_cols[r] += b_cols[r] * dpos[(r + 1) % 3];
        }
    }
    let expected_c = Matrix3::from_columns(&c_cols);

    assert_relative_eq!(particles.particles()[0].apic_c, expected_c, epsilon = 1.0e-5);
}

#[test]
fn fixed_schedule_runs_are_bit_identical() {
    let run = || {
        let mut grid =
            SpGrid::<GridState>::with_capacity(0.1, vector![32, 32, 32], 2048).unwrap();
        let mut particles = ParticleSet::new();
        for p in random_particles(150, 7) {
            particles.insert(p);
        }
        let params = SolverParameters {
            dt: 5.0e-4,
            max_substep_dt: 1.0e-4,
            ..Default::default()
        };
        let rigids = RigidBodySet::new();
        let gravity = vector![0.0, -9.8, 0.0];
        for _ in 0..3 {
            MlsEngine::step(
                &params,
                &gravity,
                &rigids,
                &mut grid,
                &mut particles,
                &mut (),
            )
            .unwrap();
        }
        particles
            .particles()
            .iter()
            .map(|p| (p.pos, p.velocity, p.dg_e))
            .collect::<Vec<_>>()
    };

    let first = run();
    let second = run();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        // Bit-identical, not merely close.
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
        assert_eq!(a.2, b.2);
    }
    // Sanity: the run actually moved things.
    assert!(first
        .iter()
        .any(|(_, v, _)| !relative_eq!(*v, Vector3::zeros())));
}
