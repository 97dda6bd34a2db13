use crate::dynamics::models::{hencky_force, svd3};
use crate::math::{Matrix, Real, Vector, DIM};
use crate::MpmError;

/// Drucker-Prager sand: StVK-Hencky elasticity with a return mapping on the
/// logarithmic strain and volume correction through `logJp`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct SandParams {
    pub lambda_0: Real,
    pub mu_0: Real,
    /// Friction angle, in degrees.
    pub friction_angle: Real,
    pub cohesion: Real,
    /// Dilatancy factor applied to the volume gain tracked in `logJp`.
    pub beta: Real,
}

impl Default for SandParams {
    fn default() -> Self {
        Self {
            lambda_0: 204057.0,
            mu_0: 136038.0,
            friction_angle: 30.0,
            cohesion: 0.0,
            beta: 1.0,
        }
    }
}

impl SandParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.friction_angle > 0.0 && self.friction_angle < 90.0) {
            return Err(MpmError::InvalidConfig(format!(
                "sand: friction_angle must lie in (0, 90) degrees, got {}",
                self.friction_angle
            )));
        }
        if !(self.mu_0 > 0.0 && self.lambda_0 >= 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "sand: Lamé parameters (lambda_0 = {}, mu_0 = {}) out of range",
                self.lambda_0, self.mu_0
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Sand {
    pub lambda_0: Real,
    pub mu_0: Real,
    pub alpha: Real,
    pub cohesion: Real,
    pub logjp: Real,
    pub beta: Real,
}

impl Sand {
    pub fn new(params: &SandParams) -> Result<Self, MpmError> {
        params.validate()?;
        let sin_phi = (params.friction_angle.to_radians()).sin();
        let alpha = (2.0f32 / 3.0).sqrt() * 2.0 * sin_phi / (3.0 - sin_phi);
        Ok(Self {
            lambda_0: params.lambda_0,
            mu_0: params.mu_0,
            alpha,
            cohesion: params.cohesion,
            logjp: 0.0,
            beta: params.beta,
        })
    }

    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        hencky_force(dg_e, vol, self.mu_0, self.lambda_0)
    }

    /// Drucker-Prager return mapping of the singular values.
    fn project(&mut self, sigma: Vector<Real>, alpha: Real) -> Vector<Real> {
        let d = DIM as Real;
        let epsilon = sigma.map(|s| s.abs().max(1.0e-4).ln() - self.cohesion);
        let tr = epsilon.sum() + self.logjp;
        let epsilon_hat = epsilon - Vector::repeat(tr / d);
        let epsilon_hat_norm = epsilon_hat.norm();

        if tr >= 0.0 {
            // Expansion: project to the cone tip, bank the volume gain.
            self.logjp = self.beta * epsilon.sum() + self.logjp;
            Vector::repeat(self.cohesion.exp())
        } else {
            self.logjp = 0.0;
            let delta_gamma = epsilon_hat_norm
                + (d * self.lambda_0 + 2.0 * self.mu_0) / (2.0 * self.mu_0) * tr * alpha;
            if delta_gamma <= 0.0 {
                // Inside the yield surface.
                let h = epsilon + Vector::repeat(self.cohesion);
                h.map(|e| e.exp())
            } else {
                let h = epsilon - (delta_gamma / epsilon_hat_norm) * epsilon_hat
                    + Vector::repeat(self.cohesion);
                h.map(|e| e.exp())
            }
        }
    }

    pub fn plasticity(&mut self, dg_e: &mut Matrix<Real>, cdg: &Matrix<Real>) -> u32 {
        *dg_e = cdg * *dg_e;
        let (u, sig, v_t) = svd3(dg_e);
        let alpha = self.alpha;
        let t = self.project(sig, alpha);
        *dg_e = u * Matrix::from_diagonal(&t) * v_t;
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
