use crate::dynamics::models::{corotated_piola, svd3};
use crate::math::{Matrix, Real, Vector, DIM};
use crate::utils::lame_lambda_mu;
use crate::MpmError;

/// Snow: fixed-corotated elasticity with plastic hardening by clamping the
/// singular values of the elastic deformation gradient.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct SnowParams {
    pub hardening: Real,
    pub youngs_modulus: Real,
    pub poisson_ratio: Real,
    pub theta_c: Real,
    pub theta_s: Real,
    #[cfg_attr(feature = "serde-serialize", serde(alias = "min_Jp"))]
    pub min_jp: Real,
    #[cfg_attr(feature = "serde-serialize", serde(alias = "max_Jp"))]
    pub max_jp: Real,
    #[cfg_attr(feature = "serde-serialize", serde(alias = "Jp"))]
    pub jp: Real,
}

impl Default for SnowParams {
    fn default() -> Self {
        Self {
            hardening: 10.0,
            youngs_modulus: 1.4e5,
            poisson_ratio: 0.2,
            theta_c: 2.5e-2,
            theta_s: 7.5e-3,
            min_jp: 0.6,
            max_jp: 20.0,
            jp: 1.0,
        }
    }
}

impl SnowParams {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.theta_c >= 0.0 && self.theta_c < 1.0) || !(self.theta_s >= 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "snow: plastic clamps theta_c = {}, theta_s = {} out of range",
                self.theta_c, self.theta_s
            )));
        }
        if !(self.min_jp > 0.0 && self.min_jp <= self.max_jp) {
            return Err(MpmError::InvalidConfig(format!(
                "snow: Jp bounds [{}, {}] are not an interval",
                self.min_jp, self.max_jp
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Snow {
    /// Determinant of the plastic part of the deformation gradient.
    pub jp: Real,
    pub hardening: Real,
    pub mu_0: Real,
    pub lambda_0: Real,
    pub theta_c: Real,
    pub theta_s: Real,
    pub min_jp: Real,
    pub max_jp: Real,
}

impl Snow {
    pub fn new(params: &SnowParams) -> Result<Self, MpmError> {
        params.validate()?;
        let (lambda_0, mu_0) = lame_lambda_mu(params.youngs_modulus, params.poisson_ratio);
        Ok(Self {
            jp: params.jp,
            hardening: params.hardening,
            mu_0,
            lambda_0,
            theta_c: params.theta_c,
            theta_s: params.theta_s,
            min_jp: params.min_jp,
            max_jp: params.max_jp,
        })
    }

    /// Lamé parameters hardened by the accumulated plastic compression.
    pub fn lame_parameters(&self) -> (Real, Real) {
        let e = (self.hardening * (1.0 - self.jp)).exp();
        (self.mu_0 * e, self.lambda_0 * e)
    }

    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        let (mu, lambda) = self.lame_parameters();
        -vol * corotated_piola(dg_e, mu, lambda) * dg_e.transpose()
    }

    pub fn plasticity(&mut self, dg_e: &mut Matrix<Real>, cdg: &Matrix<Real>) -> u32 {
        *dg_e = cdg * *dg_e;
        let (u, sig, v_t) = svd3(dg_e);
        let mut dg_e_det_orig = 1.0;
        let mut dg_e_det = 1.0;
        let clamped = sig.map(|s| {
            s.clamp(1.0 - self.theta_c, 1.0 + self.theta_s)
        });
        for i in 0..DIM {
            dg_e_det_orig *= sig[i];
            dg_e_det *= clamped[i];
        }
        *dg_e = u * Matrix::from_diagonal(&clamped) * v_t;

        // The NaN-robust clamp form keeps Jp in range even when the SVD blew up.
        let mut jp_new = self.jp * dg_e_det_orig / dg_e_det;
        if !(jp_new <= self.max_jp) {
            jp_new = self.max_jp;
        }
        if !(jp_new >= self.min_jp) {
            jp_new = self.min_jp;
        }
        self.jp = jp_new;
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
        let j = dg_e.determinant() * self.jp;
        let rho0 = mass / vol;
        let rho = rho0 / j;
        let (mu, lambda) = self.lame_parameters();
        let c2 = (lambda + 2.0 * mu) / rho;
        if !c2.is_finite() {
            warn!(
                "snow sound speed diverged: det = {}, Jp = {}",
                dg_e.determinant(),
                self.jp
            );
        }
        crate::utils::sound_speed_timestep(c2, velocity, dx)
    }
}
