pub use self::cdf::{friction_project, BodyStates};
pub use self::grid_state::{CellFlags, GridState};
pub use self::models::{Material, MaterialTag};
pub use self::particle::MpmParticle;
pub use self::particle_set::{BlockMeta, ParticleSet};
pub use self::rigid::{KinematicRigidBody, RigidBody, RigidBodySet};
#[cfg(feature = "serde-serialize")]
pub use self::snapshot::Snapshot;

pub mod cdf;
mod grid_state;
pub mod models;
mod particle;
mod particle_set;
mod rigid;
#[cfg(feature = "serde-serialize")]
mod snapshot;
pub mod solver;
