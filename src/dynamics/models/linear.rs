use crate::math::{Matrix, Real, DIM};
use crate::utils::lame_lambda_mu;
use crate::MpmError;

/// Small-strain linear elasticity.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct LinearParams {
    #[cfg_attr(feature = "serde-serialize", serde(alias = "E"))]
    pub youngs_modulus: Real,
    #[cfg_attr(feature = "serde-serialize", serde(alias = "nu"))]
    pub poisson_ratio: Real,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            youngs_modulus: 1.0e5,
            poisson_ratio: 0.3,
        }
    }
}

impl LinearParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.youngs_modulus >= 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "linear: youngs_modulus must be non-negative, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(MpmError::InvalidConfig(format!(
                "linear: poisson_ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Linear {
    pub mu: Real,
    pub lambda: Real,
}

impl Linear {
    pub fn new(params: &LinearParams) -> Result<Self, MpmError> {
        params.validate()?;
        let (lambda, mu) = lame_lambda_mu(params.youngs_modulus, params.poisson_ratio);
        Ok(Self { mu, lambda })
    }

    pub fn first_piola_kirchhoff(&self, dg_e: &Matrix<Real>) -> Matrix<Real> {
        self.mu * (dg_e + dg_e.transpose() - 2.0 * Matrix::<Real>::identity())
            + Matrix::<Real>::identity() * (self.lambda * (dg_e.trace() - DIM as Real))
    }

    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        -vol * self.first_piola_kirchhoff(dg_e) * dg_e.transpose()
    }

    pub fn plasticity(&mut self, dg_e: &mut Matrix<Real>, cdg: &Matrix<Real>) -> u32 {
        *dg_e = cdg * *dg_e;
        0
    }

    pub fn potential_energy(&self, dg_e: &Matrix<Real>, vol: Real) -> Real {
        let e = 0.5 * (dg_e + dg_e.transpose()) - Matrix::identity();
        vol * (self.mu * e.norm_squared() + 0.5 * self.lambda * e.trace() * e.trace())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stress_is_linear_in_strain() {
        let m = Linear::new(&LinearParams::default()).unwrap();
        let strain = Matrix::identity() * 1.0e-3;
        let p1 = m.first_piola_kirchhoff(&(Matrix::identity() + strain));
        let p2 = m.first_piola_kirchhoff(&(Matrix::identity() + 2.0 * strain));
        assert_relative_eq!(p2, 2.0 * p1, epsilon = 1.0e-3);
    }
}
