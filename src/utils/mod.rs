use crate::math::{Real, Vector};

/// Inverts a scalar, mapping zero to zero.
///
/// Used to normalize grid momentum by mass without introducing a threshold:
/// empty cells must stay exactly zero.
pub fn inv_exact(e: Real) -> Real {
    if e == 0.0 {
        0.0
    } else {
        1.0 / e
    }
}

/// Computes the Lamé parameters (lambda, mu) from the Young modulus and
/// Poisson ratio.
pub fn lame_lambda_mu(young_modulus: Real, poisson_ratio: Real) -> (Real, Real) {
    (
        young_modulus * poisson_ratio
            / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio)),
        shear_modulus(young_modulus, poisson_ratio),
    )
}

pub fn shear_modulus(young_modulus: Real, poisson_ratio: Real) -> Real {
    young_modulus / (2.0 * (1.0 + poisson_ratio))
}

/// CFL-style timestep bound `dx / (c + |v|)` from a squared sound speed.
///
/// The squared sound speed is clamped away from zero so a fully collapsed
/// element cannot produce a NaN bound.
pub fn sound_speed_timestep(c2: Real, velocity: &Vector<Real>, dx: Real) -> Real {
    let c = c2.max(1.0e-20).sqrt();
    dx / (c + velocity.norm())
}

#[cfg(test)]
mod test {
    use super::*;
    use na::vector;

    #[test]
    fn inv_exact_zero_maps_to_zero() {
        assert_eq!(inv_exact(0.0), 0.0);
        assert_eq!(inv_exact(2.0), 0.5);
    }

    #[test]
    fn sound_speed_timestep_is_finite_for_degenerate_inputs() {
        let dt = sound_speed_timestep(0.0, &vector![0.0, 0.0, 0.0], 0.1);
        assert!(dt.is_finite());
    }
}
