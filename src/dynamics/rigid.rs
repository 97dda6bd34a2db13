use crate::dynamics::GridState;
use crate::math::{Real, Vector};
use crate::MpmError;
use std::sync::{Arc, Mutex};

/// A rigid body two-way coupled to the particle grid.
///
/// Bodies are simulated elsewhere; the engine only reads surface velocities
/// and accumulates coupling impulses. `apply_tmp_impulse` must be callable
/// concurrently from the transfer workers; accumulated impulses are flushed
/// once per phase through `apply_tmp_velocity`.
pub trait RigidBody: Send + Sync {
    /// Stable body id in `[0, 12)`, matching the grid/particle coloring bits.
    fn id(&self) -> u32;

    /// Velocity of the body surface at a world-space point.
    fn velocity_at(&self, point: Vector<Real>) -> Vector<Real>;

    /// Accumulates a coupling impulse applied at a world-space point.
    fn apply_tmp_impulse(&self, impulse: Vector<Real>, point: Vector<Real>);

    /// Drops any impulse accumulated since the last flush.
    fn reset_tmp_velocity(&self);

    /// Folds the accumulated impulse into the body velocity.
    fn apply_tmp_velocity(&self);

    /// Friction coefficients for the two sides of the body surface.
    fn frictions(&self) -> [Real; 2];
}

impl<T: RigidBody + ?Sized> RigidBody for Arc<T> {
    fn id(&self) -> u32 {
        (**self).id()
    }

    fn velocity_at(&self, point: Vector<Real>) -> Vector<Real> {
        (**self).velocity_at(point)
    }

    fn apply_tmp_impulse(&self, impulse: Vector<Real>, point: Vector<Real>) {
        (**self).apply_tmp_impulse(impulse, point)
    }

    fn reset_tmp_velocity(&self) {
        (**self).reset_tmp_velocity()
    }

    fn apply_tmp_velocity(&self) {
        (**self).apply_tmp_velocity()
    }

    fn frictions(&self) -> [Real; 2] {
        (**self).frictions()
    }
}

/// The registry owning the rigid bodies, indexed by id.
#[derive(Default)]
pub struct RigidBodySet {
    bodies: Vec<Option<Box<dyn RigidBody>>>,
}

impl RigidBodySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, body: Box<dyn RigidBody>) -> Result<(), MpmError> {
        let id = body.id();
        if id >= GridState::MAX_NUM_RIGID_BODIES {
            return Err(MpmError::InvalidConfig(format!(
                "rigid-body id {} exceeds the supported maximum of {}",
                id,
                GridState::MAX_NUM_RIGID_BODIES - 1
            )));
        }
        let slot = id as usize;
        if self.bodies.len() <= slot {
            self.bodies.resize_with(slot + 1, || None);
        }
        if self.bodies[slot].is_some() {
            return Err(MpmError::InvalidConfig(format!(
                "rigid-body id {} is already registered",
                id
            )));
        }
        self.bodies[slot] = Some(body);
        Ok(())
    }

    /// Resolves a signed id as decoded from a grid cell; -1 maps to `None`.
    pub fn get(&self, id: i32) -> Option<&dyn RigidBody> {
        if id < 0 {
            return None;
        }
        self.bodies.get(id as usize)?.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RigidBody> {
        self.bodies.iter().filter_map(|b| b.as_deref())
    }

    pub fn reset_tmp_velocities(&self) {
        for body in self.iter() {
            body.reset_tmp_velocity();
        }
    }

    pub fn apply_tmp_velocities(&self) {
        for body in self.iter() {
            body.apply_tmp_velocity();
        }
    }
}

/// A kinematic rigid body with an optional inverse mass, sufficient for
/// prescribed-motion obstacles (wheels, blades, drums) and for tests.
///
/// With `inv_mass == 0` the body ignores accumulated impulses; otherwise
/// `apply_tmp_velocity` folds them into the linear velocity.
pub struct KinematicRigidBody {
    id: u32,
    pub center: Vector<Real>,
    pub linear_velocity: Mutex<Vector<Real>>,
    pub angular_velocity: Vector<Real>,
    pub inv_mass: Real,
    pub frictions: [Real; 2],
    tmp_impulse: Mutex<Vector<Real>>,
}

impl KinematicRigidBody {
    pub fn new(id: u32, center: Vector<Real>, frictions: [Real; 2]) -> Self {
        Self {
            id,
            center,
            linear_velocity: Mutex::new(na::zero()),
            angular_velocity: na::zero(),
            inv_mass: 0.0,
            frictions,
            tmp_impulse: Mutex::new(na::zero()),
        }
    }

    /// The impulse accumulated since the last `reset_tmp_velocity`.
    pub fn accumulated_impulse(&self) -> Vector<Real> {
        *self.tmp_impulse.lock().unwrap()
    }
}

impl RigidBody for KinematicRigidBody {
    fn id(&self) -> u32 {
        self.id
    }

    fn velocity_at(&self, point: Vector<Real>) -> Vector<Real> {
        *self.linear_velocity.lock().unwrap() + self.angular_velocity.cross(&(point - self.center))
    }

    fn apply_tmp_impulse(&self, impulse: Vector<Real>, _point: Vector<Real>) {
        *self.tmp_impulse.lock().unwrap() += impulse;
    }

    fn reset_tmp_velocity(&self) {
        *self.tmp_impulse.lock().unwrap() = na::zero();
    }

    fn apply_tmp_velocity(&self) {
        if self.inv_mass != 0.0 {
            let impulse = *self.tmp_impulse.lock().unwrap();
            *self.linear_velocity.lock().unwrap() += impulse * self.inv_mass;
        }
    }

    fn frictions(&self) -> [Real; 2] {
        self.frictions
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use na::vector;

    #[test]
    fn rigid_set_rejects_out_of_range_ids() {
        let mut set = RigidBodySet::new();
        let body = KinematicRigidBody::new(12, na::zero(), [0.0, 0.0]);
        assert!(matches!(
            set.insert(Box::new(body)),
            Err(MpmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rigid_set_resolves_signed_ids() {
        let mut set = RigidBodySet::new();
        set.insert(Box::new(KinematicRigidBody::new(3, na::zero(), [0.0, 0.0])))
            .unwrap();
        assert!(set.get(-1).is_none());
        assert!(set.get(0).is_none());
        assert_eq!(set.get(3).unwrap().id(), 3);
    }

    #[test]
    fn kinematic_body_rotates_surface_velocity() {
        let mut body = KinematicRigidBody::new(0, vector![1.0, 0.0, 0.0], [0.0, 0.0]);
        body.angular_velocity = vector![0.0, 0.0, 2.0];
        let v = body.velocity_at(vector![2.0, 0.0, 0.0]);
        assert_eq!(v, vector![0.0, 2.0, 0.0]);
    }
}
