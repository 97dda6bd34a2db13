use crate::math::{Matrix, Real, Vector, DIM};
use crate::MpmError;

/// Weakly compressible water: `p = k (J^{-γ} − 1)`, `σ = −p I`.
///
/// Only the volume ratio `j` is tracked; the deformation gradient is not
/// used.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WaterParams {
    pub k: Real,
    pub gamma: Real,
}

impl Default for WaterParams {
    fn default() -> Self {
        Self {
            k: 10000.0,
            gamma: 7.0,
        }
    }
}

impl WaterParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.k > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "water: bulk modulus k must be positive, got {}",
                self.k
            )));
        }
        if !(self.gamma >= 1.0) {
            return Err(MpmError::InvalidConfig(format!(
                "water: gamma must be at least 1, got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Water {
    pub k: Real,
    pub gamma: Real,
    pub j: Real,
}

impl Water {
    pub fn new(params: &WaterParams) -> Result<Self, MpmError> {
        params.validate()?;
        Ok(Self {
            k: params.k,
            gamma: params.gamma,
            j: 1.0,
        })
    }

    pub fn calculate_force(&self, vol: Real) -> Matrix<Real> {
        let p = self.k * (self.j.powf(-self.gamma) - 1.0);
        let sigma = Matrix::identity() * -p;
        -vol * self.j * sigma
    }

    pub fn plasticity(&mut self, cdg: &Matrix<Real>) -> u32 {
        self.j *= cdg.trace() - (DIM as Real - 1.0);
        const THRESHOLD: Real = 0.1;
        if self.j < THRESHOLD {
            info!("liquid particle collapsed to j = {}", self.j);
            self.j = THRESHOLD;
        }
        (self.j > 1.0) as u32
    }

    pub fn get_allowed_dt(&self, velocity: &Vector<Real>, dx: Real) -> Real {
        let c2 = self.k * self.gamma / self.j.powf(self.gamma - 1.0);
        crate::utils::sound_speed_timestep(c2, velocity, dx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rest_water_exerts_no_force() {
        let m = Water::new(&WaterParams {
            k: 1.0e4,
            gamma: 7.0,
        })
        .unwrap();
        assert_relative_eq!(m.calculate_force(1.0e-6), Matrix::zeros());
    }

    #[test]
    fn compression_raises_pressure() {
        let mut m = Water::new(&WaterParams::default()).unwrap();
        // Uniform compression: tr(F_inc) - 2 = 0.97.
        m.plasticity(&(Matrix::identity() * 0.99));
        assert!(m.j < 1.0);
        let f = m.calculate_force(1.0e-6);
        // -vol*j*sigma with sigma = -p*I and p > 0: positive diagonal.
        assert!(f[(0, 0)] > 0.0);
    }

    #[test]
    fn collapse_is_clamped() {
        let mut m = Water::new(&WaterParams::default()).unwrap();
        m.plasticity(&(Matrix::identity() * 0.01));
        assert_relative_eq!(m.j, 0.1);
    }
}
