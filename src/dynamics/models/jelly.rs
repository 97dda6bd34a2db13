use crate::dynamics::models::corotated_piola;
use crate::math::{Matrix, Real};
use crate::utils::lame_lambda_mu;
use crate::MpmError;

/// Fixed-corotated hyperelasticity without plasticity.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct JellyParams {
    #[cfg_attr(feature = "serde-serialize", serde(alias = "E"))]
    pub youngs_modulus: Real,
    #[cfg_attr(feature = "serde-serialize", serde(alias = "nu"))]
    pub poisson_ratio: Real,
}

impl Default for JellyParams {
    fn default() -> Self {
        Self {
            youngs_modulus: 1.0e5,
            poisson_ratio: 0.3,
        }
    }
}

impl JellyParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.youngs_modulus >= 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "jelly: youngs_modulus must be non-negative, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(MpmError::InvalidConfig(format!(
                "jelly: poisson_ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Jelly {
    pub mu: Real,
    pub lambda: Real,
}

impl Jelly {
    pub fn new(params: &JellyParams) -> Result<Self, MpmError> {
        params.validate()?;
        let (lambda, mu) = lame_lambda_mu(params.youngs_modulus, params.poisson_ratio);
        Ok(Self { mu, lambda })
    }

    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        -vol * corotated_piola(dg_e, self.mu, self.lambda) * dg_e.transpose()
    }

    pub fn plasticity(&mut self, dg_e: &mut Matrix<Real>, cdg: &Matrix<Real>) -> u32 {
        *dg_e = cdg * *dg_e;
        0
    }

    pub fn potential_energy(&self, dg_e: &Matrix<Real>, vol: Real) -> Real {
        let j = dg_e.determinant();
        let mut svd = dg_e.svd_unordered(true, true);
        svd.singular_values.add_scalar_mut(-1.0);
        let f_minus_r = svd.recompose().unwrap();
        (self.mu * f_minus_r.norm_squared() + 0.5 * self.lambda * (j - 1.0) * (j - 1.0)) * vol
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn force_and_energy_vanish_at_rest() {
        let m = Jelly::new(&JellyParams::default()).unwrap();
        assert_relative_eq!(
            m.calculate_force(&Matrix::identity(), 1.0e-6),
            Matrix::zeros(),
            epsilon = 1.0e-10
        );
        assert_relative_eq!(m.potential_energy(&Matrix::identity(), 1.0e-6), 0.0);
    }

    #[test]
    fn deformation_gradient_integrates_increment() {
        let mut m = Jelly::new(&JellyParams::default()).unwrap();
        let mut dg = Matrix::identity();
        let cdg = Matrix::identity() * 1.01;
        m.plasticity(&mut dg, &cdg);
        assert_relative_eq!(dg, Matrix::identity() * 1.01, epsilon = 1.0e-6);
    }
}
