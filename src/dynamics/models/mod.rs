pub use self::elastic::{Elastic, ElasticParams};
pub use self::jelly::{Jelly, JellyParams};
pub use self::linear::{Linear, LinearParams};
pub use self::nonlocal::{Nonlocal, NonlocalParams};
pub use self::sand::{Sand, SandParams};
pub use self::snow::{Snow, SnowParams};
pub use self::visco::{Visco, ViscoParams};
pub use self::von_mises::{VonMises, VonMisesParams};
pub use self::water::{Water, WaterParams};

mod elastic;
mod jelly;
mod linear;
mod nonlocal;
mod sand;
mod snow;
mod visco;
mod von_mises;
mod water;

use crate::math::{Matrix, Real, Vector};

/// Discriminant of the material carried by a particle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum MaterialTag {
    Elastic,
    Jelly,
    Linear,
    Snow,
    Sand,
    VonMises,
    Visco,
    Water,
    Nonlocal,
}

/// The constitutive model of a particle, with its parameters and private
/// state stored inline.
///
/// Dispatch is a plain `match` on the tag; the transfer kernels never go
/// through a vtable.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum Material {
    Elastic(Elastic),
    Jelly(Jelly),
    Linear(Linear),
    Snow(Snow),
    Sand(Sand),
    VonMises(VonMises),
    Visco(Visco),
    Water(Water),
    Nonlocal(Nonlocal),
}

impl Material {
    pub fn tag(&self) -> MaterialTag {
        match self {
            Material::Elastic(_) => MaterialTag::Elastic,
            Material::Jelly(_) => MaterialTag::Jelly,
            Material::Linear(_) => MaterialTag::Linear,
            Material::Snow(_) => MaterialTag::Snow,
            Material::Sand(_) => MaterialTag::Sand,
            Material::VonMises(_) => MaterialTag::VonMises,
            Material::Visco(_) => MaterialTag::Visco,
            Material::Water(_) => MaterialTag::Water,
            Material::Nonlocal(_) => MaterialTag::Nonlocal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Material::Elastic(_) => "elastic",
            Material::Jelly(_) => "jelly",
            Material::Linear(_) => "linear",
            Material::Snow(_) => "snow",
            Material::Sand(_) => "sand",
            Material::VonMises(_) => "von_mises",
            Material::Visco(_) => "visco",
            Material::Water(_) => "water",
            Material::Nonlocal(_) => "nonlocal",
        }
    }

    /// The stress tensor `-vol · P · Fᵀ` scattered to the grid during
    /// rasterization. Pure: does not mutate the material state.
    pub fn calculate_force(&self, dg_e: &Matrix<Real>, vol: Real) -> Matrix<Real> {
        match self {
            Material::Elastic(m) => m.calculate_force(dg_e, vol),
            Material::Jelly(m) => m.calculate_force(dg_e, vol),
            Material::Linear(m) => m.calculate_force(dg_e, vol),
            Material::Snow(m) => m.calculate_force(dg_e, vol),
            Material::Sand(m) => m.calculate_force(dg_e, vol),
            Material::VonMises(m) => m.calculate_force(dg_e, vol),
            Material::Visco(m) => m.calculate_force(dg_e, vol),
            Material::Water(m) => m.calculate_force(vol),
            Material::Nonlocal(m) => m.calculate_force(vol),
        }
    }

    /// Advances the elastic deformation gradient by the increment `cdg` and
    /// applies the material's plastic return mapping.
    ///
    /// `laplacian_gf` is the grid Laplacian of the granular fluidity at the
    /// particle; only the nonlocal model reads it. Returns a model-defined
    /// counter.
    pub fn plasticity(
        &mut self,
        dg_e: &mut Matrix<Real>,
        cdg: &Matrix<Real>,
        laplacian_gf: Real,
        mass: Real,
        vol: Real,
    ) -> u32 {
        match self {
            Material::Elastic(m) => m.plasticity(dg_e, cdg),
            Material::Jelly(m) => m.plasticity(dg_e, cdg),
            Material::Linear(m) => m.plasticity(dg_e, cdg),
            Material::Snow(m) => m.plasticity(dg_e, cdg),
            Material::Sand(m) => m.plasticity(dg_e, cdg),
            Material::VonMises(m) => m.plasticity(dg_e, cdg),
            Material::Visco(m) => m.plasticity(dg_e, cdg),
            Material::Water(m) => m.plasticity(cdg),
            Material::Nonlocal(m) => m.plasticity(dg_e, cdg, laplacian_gf, mass, vol),
        }
    }

    /// CFL-style timestep bound `dx / (c + |v|)`; 0 means "no constraint".
    pub fn get_allowed_dt(
        &self,
        dg_e: &Matrix<Real>,
        mass: Real,
        vol: Real,
        velocity: &Vector<Real>,
        dx: Real,
    ) -> Real {
        match self {
            Material::Elastic(m) => m.get_allowed_dt(dg_e, mass, vol, velocity, dx),
            Material::Jelly(_) | Material::Linear(_) => 0.0,
            Material::Snow(m) => m.get_allowed_dt(dg_e, mass, vol, velocity, dx),
            Material::Sand(m) => m.get_allowed_dt(dg_e, mass, vol, velocity, dx),
            Material::VonMises(m) => m.get_allowed_dt(dg_e, mass, vol, velocity, dx),
            Material::Visco(m) => m.get_allowed_dt(dg_e, mass, vol, velocity, dx),
            Material::Water(m) => m.get_allowed_dt(velocity, dx),
            Material::Nonlocal(m) => m.get_allowed_dt(mass, vol, velocity, dx),
        }
    }

    pub fn potential_energy(&self, dg_e: &Matrix<Real>, vol: Real) -> Real {
        match self {
            Material::Elastic(m) => m.potential_energy(dg_e, vol),
            Material::Jelly(m) => m.potential_energy(dg_e, vol),
            Material::Linear(m) => m.potential_energy(dg_e, vol),
            _ => 0.0,
        }
    }

    /// The first Piola-Kirchhoff stress, where the model defines one.
    pub fn first_piola_kirchhoff(&self, dg_e: &Matrix<Real>) -> Matrix<Real> {
        match self {
            Material::Elastic(m) => hencky_piola(dg_e, m.mu_0, m.lambda_0),
            Material::Sand(m) => hencky_piola(dg_e, m.mu_0, m.lambda_0),
            Material::VonMises(m) => hencky_piola(dg_e, m.mu_0, m.lambda_0),
            Material::Jelly(m) => corotated_piola(dg_e, m.mu, m.lambda),
            Material::Snow(m) => {
                let (mu, lambda) = m.lame_parameters();
                corotated_piola(dg_e, mu, lambda)
            }
            Material::Visco(m) => corotated_piola(dg_e, m.mu_0, m.lambda_0),
            Material::Linear(m) => m.first_piola_kirchhoff(dg_e),
            Material::Water(_) | Material::Nonlocal(_) => Matrix::zeros(),
        }
    }

    /// Ancillary visualization triple (model-defined).
    pub fn get_debug_info(&self) -> Vector<Real> {
        match self {
            Material::Visco(_) => na::vector![0.0, 1.0, 0.0],
            Material::Snow(_) => na::vector![0.0, 2.0, 0.0],
            Material::Linear(_) => na::vector![0.0, 3.0, 0.0],
            Material::Jelly(_) => na::vector![0.0, 4.0, 0.0],
            Material::Water(m) => na::vector![m.j, 5.0, 0.0],
            Material::Sand(_) | Material::Nonlocal(_) => na::vector![0.0, 6.0, 0.0],
            Material::VonMises(_) => na::vector![0.0, 7.0, 0.0],
            Material::Elastic(m) => na::vector![m.youngs_modulus, 8.0, 0.0],
        }
    }
}

/// Unordered SVD of a 3×3 matrix, as (U, Σ, Vᵀ).
pub(crate) fn svd3(m: &Matrix<Real>) -> (Matrix<Real>, Vector<Real>, Matrix<Real>) {
    let svd = m.svd_unordered(true, true);
    (svd.u.unwrap(), svd.singular_values, svd.v_t.unwrap())
}

/// StVK-with-Hencky-strain first Piola-Kirchhoff stress:
/// `P = U · (2μ Σ⁻¹ log Σ + λ tr(log Σ) Σ⁻¹) · Vᵀ`.
pub(crate) fn hencky_piola(dg_e: &Matrix<Real>, mu_0: Real, lambda_0: Real) -> Matrix<Real> {
    let (u, sig, v_t) = svd3(dg_e);
    let log_sig = sig.map(|e| e.ln());
    let inv_sig = sig.map(|e| 1.0 / e);
    let center =
        2.0 * mu_0 * inv_sig.component_mul(&log_sig) + lambda_0 * log_sig.sum() * inv_sig;
    u * Matrix::from_diagonal(&center) * v_t
}

/// Hencky-family grid force `-vol · P · Fᵀ`.
pub(crate) fn hencky_force(
    dg_e: &Matrix<Real>,
    vol: Real,
    mu_0: Real,
    lambda_0: Real,
) -> Matrix<Real> {
    -vol * hencky_piola(dg_e, mu_0, lambda_0) * dg_e.transpose()
}

/// Fixed-corotated first Piola-Kirchhoff stress:
/// `P = 2μ (F − R) + λ (J − 1) J F⁻ᵀ`.
pub(crate) fn corotated_piola(dg_e: &Matrix<Real>, mu: Real, lambda: Real) -> Matrix<Real> {
    let j = dg_e.determinant();
    let mut svd = dg_e.svd_unordered(true, true);
    svd.singular_values.add_scalar_mut(-1.0);
    let f_minus_r = svd.recompose().unwrap();
    let f_inv_t = dg_e
        .transpose()
        .try_inverse()
        .unwrap_or_else(Matrix::zeros);
    2.0 * mu * f_minus_r + lambda * (j - 1.0) * j * f_inv_t
}

/// Timestep bound from the bulk wave speed of the Hencky/corotated family.
pub(crate) fn bulk_wave_dt(
    mu_0: Real,
    lambda_0: Real,
    j: Real,
    mass: Real,
    vol: Real,
    velocity: &Vector<Real>,
    dx: Real,
) -> Real {
    let rho0 = mass / vol;
    let rho = rho0 / j;
    let k = 2.0 * mu_0 / 3.0 + lambda_0;
    let c2 = 4.0 * mu_0 / (3.0 * rho) + k * (1.0 - j.ln()) / rho0;
    crate::utils::sound_speed_timestep(c2, velocity, dx)
}
