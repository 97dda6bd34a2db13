use crate::dynamics::GridState;
use crate::math::{Real, Vector};

/// Per-rigid-body coloring tags, packed two bits per body.
///
/// For body `r`, bit `2r + 1` is the "active" bit (the entity is close enough
/// to `r` for its side to be known) and bit `2r` is the side tag. A grid node
/// and a particle are separated by a rigid surface when, for some body both
/// are active for, their side tags differ.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BodyStates(pub u32);

impl BodyStates {
    /// Mask selecting the "active" bits of all tag pairs.
    pub const STATE_MASK: u32 = 0x00AA_AAAA;

    pub fn side(self, body: u32) -> u32 {
        (self.0 >> (2 * body)) & 1
    }

    pub fn active(self, body: u32) -> bool {
        (self.0 >> (2 * body + 1)) & 1 == 1
    }

    /// The full two-bit tag of one body.
    pub fn side_tag(self, body: u32) -> u32 {
        (self.0 >> (2 * body)) & 3
    }

    pub fn set_side(&mut self, body: u32, side: u32) {
        assert!(body < GridState::MAX_NUM_RIGID_BODIES);
        let bit = 2 * body;
        self.0 = (self.0 & !(1 << bit)) | ((side & 1) << bit);
    }

    pub fn set_active(&mut self, body: u32, active: bool) {
        assert!(body < GridState::MAX_NUM_RIGID_BODIES);
        let bit = 2 * body + 1;
        self.0 = (self.0 & !(1 << bit)) | ((active as u32) << bit);
    }

    /// Whether a grid node and a particle lie on opposite sides of some rigid
    /// body both are active for.
    pub fn incompatible(grid_states: u32, particle_states: u32) -> bool {
        let mask = (grid_states & particle_states & Self::STATE_MASK) >> 1;
        (grid_states & mask) != (particle_states & mask)
    }
}

/// Projects a velocity onto the friction cone of a surface moving at
/// `base_velocity` with outward normal `normal`.
///
/// The friction coefficient doubles as a mode selector:
/// - `friction == -1`: sticky, the result is `base_velocity`;
/// - `friction <= -2`: slip mode with coefficient `-friction - 2` (the
///   separating normal component is removed as well);
/// - otherwise: separating contact with Coulomb friction.
pub fn friction_project(
    velocity: Vector<Real>,
    base_velocity: Vector<Real>,
    normal: Vector<Real>,
    friction: Real,
) -> Vector<Real> {
    let relative_vel = velocity - base_velocity;

    // sticky
    if friction == -1.0 {
        return base_velocity;
    }

    let slip = friction <= -2.0;
    let friction = if slip { -friction - 2.0 } else { friction };

    let normal_norm = normal.dot(&relative_vel);
    let tangential_relative_vel = relative_vel - normal_norm * normal;
    let tangential_norm = tangential_relative_vel.norm();
    let tangential_scale = (tangential_norm + normal_norm.min(0.0) * friction).max(0.0)
        / tangential_norm.max(1.0e-30);

    let projected_relative_vel = tangential_scale * tangential_relative_vel
        + (normal_norm * !slip as u32 as Real).max(0.0) * normal;

    projected_relative_vel + base_velocity
}
