use crate::dynamics::models::{hencky_force, svd3};
use crate::math::{Matrix, Real, Vector, DIM};
use crate::utils::lame_lambda_mu;
use crate::MpmError;

/// Von Mises elastoplasticity: StVK-Hencky elasticity with a deviatoric
/// return mapping of radius `yield_stress / (2μ)`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct VonMisesParams {
    pub youngs_modulus: Real,
    pub poisson_ratio: Real,
    pub yield_stress: Real,
}

impl Default for VonMisesParams {
    fn default() -> Self {
        Self {
            youngs_modulus: 5.0e3,
            poisson_ratio: 0.4,
            yield_stress: 1.0,
        }
    }
}

impl VonMisesParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.yield_stress >= 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "von_mises: yield_stress must be non-negative, got {}",
                self.yield_stress
            )));
        }
        if !(self.youngs_modulus > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "von_mises: youngs_modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct VonMises {
    pub lambda_0: Real,
    pub mu_0: Real,
    pub yield_stress: Real,
}

impl VonMises {
    pub fn new(params: &VonMisesParams) -> Result<Self, MpmError> {
        params.validate()?;
        let (lambda_0, mu_0) = lame_lambda_mu(params.youngs_modulus, params.poisson_ratio);
        Ok(Self {
            lambda_0,
            mu_0,
            yield_stress: params.yield_stress,
        })
    }

    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        hencky_force(dg_e, vol, self.mu_0, self.lambda_0)
    }

    pub fn plasticity(&mut self, dg_e: &mut Matrix<Real>, cdg: &Matrix<Real>) -> u32 {
        *dg_e = cdg * *dg_e;
        let (u, sigma, v_t) = svd3(dg_e);
        let epsilon = sigma.map(|s| s.ln());
        let trace_epsilon = epsilon.sum();
        let epsilon_hat = epsilon - Vector::repeat(trace_epsilon / DIM as Real);
        let epsilon_hat_norm = epsilon_hat.norm_squared();
        let delta_gamma = epsilon_hat_norm - self.yield_stress / (2.0 * self.mu_0);
        if delta_gamma <= 0.0 {
            return 0;
        }
        let h = epsilon - (delta_gamma / epsilon_hat_norm) * epsilon_hat;
        *dg_e = u * Matrix::from_diagonal(&h.map(|e| e.exp())) * v_t;
        1
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
