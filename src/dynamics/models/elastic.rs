use crate::dynamics::models::{hencky_force, svd3};
use crate::math::{Matrix, Real, Vector};
use crate::utils::lame_lambda_mu;
use crate::MpmError;

/// StVK elasticity with Hencky (logarithmic) strain.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ElasticParams {
    #[cfg_attr(feature = "serde-serialize", serde(alias = "E"))]
    pub youngs_modulus: Real,
    #[cfg_attr(feature = "serde-serialize", serde(alias = "nu"))]
    pub poisson_ratio: Real,
}

impl Default for ElasticParams {
    fn default() -> Self {
        Self {
            youngs_modulus: 5.0e3,
            poisson_ratio: 0.4,
        }
    }
}

impl ElasticParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.youngs_modulus >= 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "elastic: youngs_modulus must be non-negative, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(MpmError::InvalidConfig(format!(
                "elastic: poisson_ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Elastic {
    pub lambda_0: Real,
    pub mu_0: Real,
    pub youngs_modulus: Real,
    pub poisson_ratio: Real,
}

impl Elastic {
    pub fn new(params: &ElasticParams) -> Result<Self, MpmError> {
        params.validate()?;
        let (lambda_0, mu_0) = lame_lambda_mu(params.youngs_modulus, params.poisson_ratio);
        Ok(Self {
            lambda_0,
            mu_0,
            youngs_modulus: params.youngs_modulus,
            poisson_ratio: params.poisson_ratio,
        })
    }

    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        hencky_force(dg_e, vol, self.mu_0, self.lambda_0)
    }

    pub fn plasticity(&mut self, dg_e: &mut Matrix<Real>, cdg: &Matrix<Real>) -> u32 {
        *dg_e = cdg * *dg_e;
        0
    }

    pub fn potential_energy(&self, dg_e: &Matrix<Real>, vol: Real) -> Real {
        let (_, sig, _) = svd3(dg_e);
        let log_sigma = sig.map(|e| e.abs().ln());
        let log_sigma_squared: Real = log_sigma.map(|e| e * e).sum();
        (self.mu_0 * log_sigma_squared
            + 0.5 * self.lambda_0 * log_sigma.sum() * log_sigma.sum())
            * vol
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
