use crate::dynamics::models::svd3;
use crate::math::{Matrix, Real, Vector, DIM};
use crate::MpmError;

/// Nonlocal granular fluidity (NGF) rheology.
///
/// The particle keeps the total and plastic deformation gradients separately;
/// the elastic part is recovered as `F_e = F_t · F_p⁻¹`. The granular
/// fluidity `gf` evolves by a local reaction term plus a diffusion term fed
/// by the grid Laplacian of the node fluidity field.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct NonlocalParams {
    /// Shear modulus.
    #[cfg_attr(feature = "serde-serialize", serde(alias = "S_mod"))]
    pub s_mod: Real,
    /// Bulk modulus.
    #[cfg_attr(feature = "serde-serialize", serde(alias = "B_mod"))]
    pub b_mod: Real,
    /// Nonlocal amplitude.
    #[cfg_attr(feature = "serde-serialize", serde(alias = "A_mat"))]
    pub a_mat: Real,
    /// Grain diameter.
    pub dia: Real,
    /// Solid grain density.
    pub density: Real,
    /// Density below which the material is disconnected.
    pub critical_density: Real,
    pub mu_s: Real,
    pub mu_2: Real,
    #[cfg_attr(feature = "serde-serialize", serde(alias = "I_0"))]
    pub i_0: Real,
    pub t_0: Real,
    pub base_delta_t: Real,
}

impl Default for NonlocalParams {
    fn default() -> Self {
        Self {
            s_mod: 3.4483e3,
            b_mod: 3.3333e4,
            a_mat: 0.48,
            dia: 0.005,
            density: 2550.0,
            critical_density: 2000.0,
            // mu_s should exceed sqrt(3)·(1 − 2ν)/(1 + ν).
            mu_s: 0.3819,
            mu_2: 0.6435,
            i_0: 0.278,
            t_0: 1.0e-3,
            base_delta_t: 1.0e-4,
        }
    }
}

impl NonlocalParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.density > 0.0 && self.critical_density > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "nonlocal: densities must be positive, got {} / {}",
                self.density, self.critical_density
            )));
        }
        if !(self.mu_2 > self.mu_s && self.mu_s > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "nonlocal: friction bounds must satisfy 0 < mu_s < mu_2, got {} / {}",
                self.mu_s, self.mu_2
            )));
        }
        if !(self.dia > 0.0 && self.t_0 > 0.0 && self.i_0 > 0.0) {
            return Err(MpmError::InvalidConfig(
                "nonlocal: dia, t_0 and I_0 must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Nonlocal {
    pub s_mod: Real,
    pub b_mod: Real,
    pub a_mat: Real,
    pub dia: Real,
    pub rho_s: Real,
    pub rho_c: Real,
    pub mu_s: Real,
    pub mu_2: Real,
    pub i_0: Real,
    pub t_0: Real,
    pub delta_t: Real,

    /// Total deformation gradient.
    pub dg_t: Matrix<Real>,
    /// Plastic deformation gradient.
    pub dg_p: Matrix<Real>,
    /// Pressure at the last update.
    pub p: Real,
    /// Equivalent shear stress.
    pub tau: Real,
    /// Granular fluidity.
    pub gf: Real,
    /// Cauchy stress from the last update.
    pub t: Matrix<Real>,
}

impl Nonlocal {
    pub fn new(params: &NonlocalParams) -> Result<Self, MpmError> {
        params.validate()?;
        Ok(Self {
            s_mod: params.s_mod,
            b_mod: params.b_mod,
            a_mat: params.a_mat,
            dia: params.dia,
            rho_s: params.density,
            rho_c: params.critical_density,
            mu_s: params.mu_s,
            mu_2: params.mu_2,
            i_0: params.i_0,
            t_0: params.t_0,
            delta_t: params.base_delta_t,
            dg_t: Matrix::identity(),
            dg_p: Matrix::identity(),
            p: 0.0,
            tau: 0.0,
            gf: 0.0,
            t: Matrix::zeros(),
        })
    }

    pub fn calculate_force(&self, vol: Real) -> Matrix<Real> {
        -vol * self.t
    }

    /// Equivalent total shear strain rate recovered from the increment.
    fn equivalent_shear_rate(cdg: &Matrix<Real>, delta_t: Real) -> Real {
        let l = (cdg - Matrix::identity()) * (1.0 / delta_t);
        let d = (l + l.transpose()) * 0.5;
        let mut gamma_dot_equ = 0.0;
        for i in 0..DIM {
            for j in 0..DIM {
                gamma_dot_equ += d[(i, j)] * d[(i, j)];
            }
        }
        1.414 * gamma_dot_equ.sqrt()
    }

    /// Updates the stress, fluidity, and plastic flow. The update order
    /// (including the late `p_n == 0` fluidity overwrite) matches the
    /// published rheology implementation and must not be reordered.
    pub fn plasticity(
        &mut self,
        dg_e: &mut Matrix<Real>,
        cdg: &Matrix<Real>,
        laplacian_gf: Real,
        mass: Real,
        vol: Real,
    ) -> u32 {
        let identity = Matrix::identity();
        let eps = 1.0e-20;
        let p_n = self.p;

        self.dg_t = cdg * self.dg_t;
        let rho = mass / vol / self.dg_t.determinant();

        let dg_el = self.dg_t * self.dg_p.try_inverse().unwrap_or(identity);
        let (u, sig, v_t) = svd3(&dg_el);
        let re = u * v_t;

        let log_sig = sig.map(|e| e.ln());
        let ee = v_t.transpose() * Matrix::from_diagonal(&log_sig) * v_t;
        let tr_ee = ee.trace();
        let ee_0 = ee - (tr_ee / 3.0) * identity;

        let mut me = (2.0 * self.s_mod * ee_0) + (self.b_mod * tr_ee * identity);

        self.p = -me.trace() / 3.0;

        if rho < self.rho_c || self.p <= 0.0 {
            // Disconnected.
            self.t = Matrix::zeros();
            self.dg_p = self.dg_t;
            self.p = 0.0;
            self.gf = (Self::equivalent_shear_rate(cdg, self.delta_t) / self.mu_2).max(0.0);
        } else {
            // Dense.
            let mut mu = (self.tau / p_n).min(self.mu_2 - eps);
            let gdot_loc = -((self.mu_s - mu) * self.gf)
                - ((self.mu_2 - self.mu_s) / self.i_0
                    * (self.rho_s * self.dia * self.dia / p_n).sqrt()
                    * mu
                    * self.gf
                    * self.gf);
            let gdot_nonloc = self.a_mat * self.a_mat * self.dia * self.dia * laplacian_gf;
            self.gf = ((self.delta_t * (gdot_loc + gdot_nonloc) / self.t_0) + self.gf).max(0.0);

            let me_0 = me + self.p * identity;
            let mut me_0_mag = 0.0;
            for i in 0..DIM {
                for j in 0..DIM {
                    me_0_mag += me_0[(i, j)] * me_0[(i, j)];
                }
            }
            me_0_mag = me_0_mag.sqrt();

            let tau_trial = 0.707 * me_0_mag;
            let np = if tau_trial > 0.0 {
                (0.707 / tau_trial) * me_0
            } else {
                Matrix::zeros()
            };

            if p_n == 0.0 {
                self.gf = (Self::equivalent_shear_rate(cdg, self.delta_t) / self.mu_2).max(0.0);
            }

            self.tau =
                tau_trial * self.p / (self.p + self.s_mod * self.delta_t * self.gf).max(eps);

            if self.tau < 0.0 {
                self.tau = 0.0;
            }
            // No plastic flow when the trial state is already elastic.
            if self.tau > tau_trial {
                self.tau = tau_trial;
            }

            me = me - 1.414 * (tau_trial - self.tau) * np;

            if p_n > 0.0 {
                mu = (self.tau / self.p.max(eps)).min(self.mu_2 - eps);
            } else {
                mu = self.mu_2;
            }

            self.t = (1.0 / self.dg_t.determinant()) * re * me * re.transpose();

            self.dg_p =
                (identity + self.delta_t * 0.707 * mu * self.gf * np) * self.dg_p;
        }

        *dg_e = self.dg_t * self.dg_p.try_inverse().unwrap_or(identity);
        0
    }

    pub fn get_allowed_dt(
        &self,
        mass: Real,
        vol: Real,
        velocity: &Vector<Real>,
        dx: Real,
    ) -> Real {
        let j = self.dg_t.determinant();
        let (lambda_0, mu_0) = (204057.0, 136038.0);
        super::bulk_wave_dt(mu_0, lambda_0, j, mass, vol, velocity, dx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn dense_mass_for(m: &Nonlocal, vol: Real) -> Real {
        // rho = mass / vol / det(dg_t); pick a density above critical.
        (m.rho_c + 100.0) * vol
    }

    #[test]
    fn disconnected_state_carries_no_stress() {
        let mut m = Nonlocal::new(&NonlocalParams::default()).unwrap();
        let vol = 1.0e-6;
        // Density below critical.
        let mass = (m.rho_c - 500.0) * vol;
        let mut dg_e = Matrix::identity();
        let shear = Matrix::identity() + Matrix::from_fn(|i, j| if (i, j) == (0, 1) { 1.0e-3 } else { 0.0 });
        m.plasticity(&mut dg_e, &shear, 0.0, mass, vol);

        assert_eq!(m.t, Matrix::zeros());
        assert_eq!(m.p, 0.0);
        assert_relative_eq!(m.dg_p, m.dg_t, epsilon = 1.0e-7);
        let expected_gf =
            (Nonlocal::equivalent_shear_rate(&shear, m.delta_t) / m.mu_2).max(0.0);
        assert_relative_eq!(m.gf, expected_gf, epsilon = 1.0e-5);
        assert_relative_eq!(m.calculate_force(vol), Matrix::zeros());
    }

    #[test]
    fn dense_compression_builds_pressure() {
        let mut m = Nonlocal::new(&NonlocalParams::default()).unwrap();
        let vol = 1.0e-6;
        let mass = dense_mass_for(&m, vol);
        let mut dg_e = Matrix::identity();
        m.plasticity(&mut dg_e, &(Matrix::identity() * 0.999), 0.0, mass, vol);
        assert!(m.p > 0.0);
        assert!(m.t.trace() < 0.0);
    }

    #[test]
    fn laplacian_feeds_the_fluidity() {
        let params = NonlocalParams::default();
        let vol = 1.0e-6;
        let compress = Matrix::identity() * 0.999;

        let mut with_diffusion = Nonlocal::new(&params).unwrap();
        let mass = dense_mass_for(&with_diffusion, vol);
        // First update pressurizes; second update sees p_n > 0 and applies
        // the fluidity reaction-diffusion step.
        let mut dg_e = Matrix::identity();
        with_diffusion.plasticity(&mut dg_e, &compress, 0.0, mass, vol);
        let mut without_diffusion = with_diffusion;
        with_diffusion.plasticity(&mut dg_e, &compress, 50.0, mass, vol);
        without_diffusion.plasticity(&mut dg_e, &compress, 0.0, mass, vol);
        assert!(with_diffusion.gf >= without_diffusion.gf);
    }
}
