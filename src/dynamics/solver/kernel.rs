use crate::math::{CellCoord, Real, Vector, Vector4};
use na::vector;

/// The quadratic B-spline particle-grid kernel.
///
/// All stencil evaluations take the particle position in grid units; the
/// base node of the 3×3×3 stencil is `floor(pos - 0.5)`, so the per-axis
/// distance from the particle to the first stencil node lies in `[0.5, 1.5)`.
pub struct QuadraticKernel;

impl QuadraticKernel {
    /// The APIC `D⁻¹` factor of the quadratic kernel, with the grid-unit
    /// scaling of the stencil offsets folded in.
    #[inline(always)]
    pub fn inv_d() -> Real {
        4.0
    }

    /// Per-axis weights of the three stencil nodes, for a particle at
    /// distance `x ∈ [0.5, 1.5)` from the first node.
    #[inline(always)]
    pub fn eval_all(x: Real) -> [Real; 3] {
        [
            0.5 * (1.5 - x) * (1.5 - x),
            0.75 - (x - 1.0) * (x - 1.0),
            0.5 * (x - 0.5) * (x - 0.5),
        ]
    }

    /// Per-axis weight derivatives with respect to the particle position, in
    /// grid units.
    #[inline(always)]
    pub fn eval_all_derivatives(x: Real) -> [Real; 3] {
        [x - 1.5, -2.0 * (x - 1.0), x - 0.5]
    }
}

/// Packed axis-separable stencil weights for the MLS fast path.
///
/// `kernels[i][j]` holds the three z-axis weights (and a zero lane) already
/// multiplied by `w_x[i] · w_y[j]`, so one 4-lane product covers four stencil
/// cells at a time.
pub struct MlsKernel {
    pub kernels: [[Vector4<Real>; 3]; 3],
}

impl MlsKernel {
    /// `rel_pos` is the particle position minus the base node, per axis in
    /// `[0.5, 1.5)`.
    #[inline(always)]
    pub fn new(rel_pos: &Vector<Real>) -> Self {
        let wx = QuadraticKernel::eval_all(rel_pos.x);
        let wy = QuadraticKernel::eval_all(rel_pos.y);
        let wz = QuadraticKernel::eval_all(rel_pos.z);
        let wz_packed = Vector4::new(wz[0], wz[1], wz[2], 0.0);

        let mut kernels = [[Vector4::zeros(); 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                kernels[i][j] = wz_packed * (wx[i] * wy[j]);
            }
        }
        Self { kernels }
    }

    /// Weight of stencil node `node ∈ [0, 27)`, nodes ordered x-major.
    #[inline(always)]
    pub fn w(&self, node: usize) -> Real {
        self.kernels[node / 9][node / 3 % 3][node % 3]
    }
}

/// Full stencil with weights and world-space weight gradients, used by the
/// rigid-aware transfer path and the non-MLS form.
pub struct KernelStencil {
    w: [[Real; 3]; 3],
    dw: [[Real; 3]; 3],
    inv_dx: Real,
}

impl KernelStencil {
    #[inline(always)]
    pub fn new(rel_pos: &Vector<Real>, inv_dx: Real) -> Self {
        let mut w = [[0.0; 3]; 3];
        let mut dw = [[0.0; 3]; 3];
        for axis in 0..3 {
            w[axis] = QuadraticKernel::eval_all(rel_pos[axis]);
            dw[axis] = QuadraticKernel::eval_all_derivatives(rel_pos[axis]);
        }
        Self { w, dw, inv_dx }
    }

    /// Weight of the stencil node at offset `(i, j, k)`.
    #[inline(always)]
    pub fn w(&self, i: usize, j: usize, k: usize) -> Real {
        self.w[0][i] * self.w[1][j] * self.w[2][k]
    }

    /// World-space weight gradient and weight of one stencil node.
    #[inline(always)]
    pub fn dw_w(&self, i: usize, j: usize, k: usize) -> (Vector<Real>, Real) {
        let grad = vector![
            self.dw[0][i] * self.w[1][j] * self.w[2][k],
            self.w[0][i] * self.dw[1][j] * self.w[2][k],
            self.w[0][i] * self.w[1][j] * self.dw[2][k]
        ] * self.inv_dx;
        (grad, self.w(i, j, k))
    }
}

/// Integer offsets of the 27 stencil nodes, x-major.
#[rustfmt::skip]
pub(crate) const STENCIL_OFFSETS: [CellCoord; 27] = [
    vector![0, 0, 0],
    vector![0, 0, 1],
    vector![0, 0, 2],
    vector![0, 1, 0],
    vector![0, 1, 1],
    vector![0, 1, 2],
    vector![0, 2, 0],
    vector![0, 2, 1],
    vector![0, 2, 2],
    vector![1, 0, 0],
    vector![1, 0, 1],
    vector![1, 0, 2],
    vector![1, 1, 0],
    vector![1, 1, 1],
    vector![1, 1, 2],
    vector![1, 2, 0],
    vector![1, 2, 1],
    vector![1, 2, 2],
    vector![2, 0, 0],
    vector![2, 0, 1],
    vector![2, 0, 2],
    vector![2, 1, 0],
    vector![2, 1, 1],
    vector![2, 1, 2],
    vector![2, 2, 0],
    vector![2, 2, 1],
    vector![2, 2, 2],
];

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn stencil_offsets_are_x_major() {
        for n in 0..27 {
            assert_eq!(
                STENCIL_OFFSETS[n],
                vector![(n / 9) as i32, (n / 3 % 3) as i32, (n % 3) as i32]
            );
        }
    }

    #[test]
    fn weights_partition_unity() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let x: Real = rng.gen_range(0.5..1.5);
            let w = QuadraticKernel::eval_all(x);
            assert_relative_eq!(w[0] + w[1] + w[2], 1.0, epsilon = 1.0e-6);
            assert!(w.iter().all(|&wi| wi >= 0.0));
        }
    }

    #[test]
    fn weight_derivatives_sum_to_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let x: Real = rng.gen_range(0.5..1.5);
            let dw = QuadraticKernel::eval_all_derivatives(x);
            assert_relative_eq!(dw[0] + dw[1] + dw[2], 0.0, epsilon = 1.0e-6);
        }
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let h = 1.0e-3;
        for &x in &[0.6, 0.9, 1.1, 1.4] {
            let dw = QuadraticKernel::eval_all_derivatives(x);
            let wp = QuadraticKernel::eval_all(x + h);
            let wm = QuadraticKernel::eval_all(x - h);
            for axis in 0..3 {
                assert_relative_eq!(
                    dw[axis],
                    (wp[axis] - wm[axis]) / (2.0 * h),
                    epsilon = 1.0e-3
                );
            }
        }
    }

    #[test]
    fn fast_kernel_matches_full_stencil() {
        let mut rng = StdRng::seed_from_u64(1234);
        for _ in 0..1000 {
            let rel = vector![
                rng.gen_range(0.5..1.5),
                rng.gen_range(0.5..1.5),
                rng.gen_range(0.5..1.5)
            ];
            let fast = MlsKernel::new(&rel);
            let full = KernelStencil::new(&rel, 1.0);
            for n in 0..27 {
                assert_relative_eq!(
                    fast.w(n),
                    full.w(n / 9, n / 3 % 3, n % 3),
                    epsilon = 1.0e-6
                );
            }
        }
    }

    #[test]
    fn trilinear_partition_of_unity_over_the_stencil() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..100 {
            let rel = vector![
                rng.gen_range(0.5..1.5),
                rng.gen_range(0.5..1.5),
                rng.gen_range(0.5..1.5)
            ];
            let kernel = MlsKernel::new(&rel);
            let total: Real = (0..27).map(|n| kernel.w(n)).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1.0e-5);
        }
    }
}
