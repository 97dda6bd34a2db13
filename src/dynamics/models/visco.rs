use crate::dynamics::models::{corotated_piola, svd3};
use crate::math::{Matrix, Real, Vector, DIM};
use crate::utils::lame_lambda_mu;
use crate::MpmError;

/// Rate-dependent viscoplasticity on top of fixed-corotated elasticity.
///
/// The plastic flow is integrated with a matrix-exponential approximation;
/// the yield stress `tau` hardens by `kappa` per unit of dissipated stress.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ViscoParams {
    pub youngs_modulus: Real,
    pub poisson_ratio: Real,
    pub tau: Real,
    /// Flow rate (the `ν` of the rate law, not the Poisson ratio).
    pub nu: Real,
    pub kappa: Real,
    pub base_delta_t: Real,
}

impl Default for ViscoParams {
    fn default() -> Self {
        Self {
            youngs_modulus: 4.0e4,
            poisson_ratio: 0.4,
            tau: 1000.0,
            nu: 10000.0,
            kappa: 0.0,
            base_delta_t: 1.0e-4,
        }
    }
}

impl ViscoParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.nu >= 0.0 && self.tau >= 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "visco: rate-law parameters tau = {}, nu = {} must be non-negative",
                self.tau, self.nu
            )));
        }
        if !(self.base_delta_t > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "visco: base_delta_t must be positive, got {}",
                self.base_delta_t
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Visco {
    pub visco_tau: Real,
    pub visco_nu: Real,
    pub visco_kappa: Real,
    pub lambda_0: Real,
    pub mu_0: Real,
    pub dt: Real,
}

impl Visco {
    pub fn new(params: &ViscoParams) -> Result<Self, MpmError> {
        params.validate()?;
        let (lambda_0, mu_0) = lame_lambda_mu(params.youngs_modulus, params.poisson_ratio);
        Ok(Self {
            visco_tau: params.tau,
            visco_nu: params.nu,
            visco_kappa: params.kappa,
            lambda_0,
            mu_0,
            dt: params.base_delta_t,
        })
    }

    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        -vol * corotated_piola(dg_e, self.mu_0, self.lambda_0) * dg_e.transpose()
    }

    /// Second-order approximation of `exp(m·dt)`, halving the step until the
    /// approximation keeps a positive determinant.
    fn approximate_exponent(dt: Real, m: &Matrix<Real>) -> Matrix<Real> {
        let s = m * dt;
        let r = (s * 0.5 + Matrix::identity()) * s + Matrix::identity();
        if r.determinant() > 0.0 {
            return r;
        }
        let tmp = Self::approximate_exponent(dt / 2.0, m);
        tmp * tmp
    }

    pub fn plasticity(&mut self, dg_e: &mut Matrix<Real>, cdg: &Matrix<Real>) -> u32 {
        let dt = self.dt;
        let dg_e_hat =
            Self::approximate_exponent(dt, &((cdg - Matrix::identity()) * (1.0 / dt))) * *dg_e;
        let (svd_u, sig, svd_v_t) = svd3(&dg_e_hat);
        let pnorm = corotated_piola(dg_e, self.mu_0, self.lambda_0).norm();
        let mut gamma = 0.0;
        if pnorm > 1.0e-5 {
            gamma = (dt * self.visco_nu * (pnorm - self.visco_tau) / pnorm).clamp(0.0, 1.0);
        }

        let sig_det = sig.product();
        let mut scale = 1.0;
        if sig_det.abs() > 1.0e-5 {
            scale = 1.0 / sig_det.powf(1.0 / DIM as Real);
        }
        let middle = sig.map(|s| (s * scale).powf(gamma));
        let middle_inv = middle.map(|m| if m.abs() > 1.0e-5 { 1.0 / m } else { 1.0 });
        *dg_e = svd_u
            * Matrix::from_diagonal(&sig)
            * Matrix::from_diagonal(&middle_inv)
            * svd_v_t;

        let (svd_u, sig, svd_v_t) = svd3(dg_e);
        let sig = sig.map(|s| s.clamp(0.1, 10.0));
        *dg_e = svd_u * Matrix::from_diagonal(&sig) * svd_v_t;

        self.visco_tau += self.visco_kappa * gamma * pnorm;
        0
    }

    pub fn get_allowed_dt(
        &self,
        dg_e: &Matrix<Real>,
        mass: Real,
        vol: Real,
        velocity: &Vector<Real>,
        dx: Real,
    ) -> Real {
        let j = dg_e.determinant();
        super::bulk_wave_dt(self.mu_0, self.lambda_0, j, mass, vol, velocity, dx)
    }
}
