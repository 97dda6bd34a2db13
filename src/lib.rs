//! # Talus
//!
//! A 3D continuum-simulation engine based on MLS-MPM (Moving-Least-Squares
//! Material Point Method) with APIC transfers.
//!
//! Particles carry mass, momentum, and a deformation gradient; a sparse,
//! block-paged background grid solves momentum. Each substep runs three
//! barrier-separated phases:
//! 1. **Rasterize (P2G)**: particle mass, momentum, and stress are scattered
//!    onto the 3×3×3 quadratic B-spline stencil of each particle.
//! 2. **Grid update**: grid momentum is normalized into velocity, gravity and
//!    boundary conditions are applied.
//! 3. **Resample (G2P)**: grid velocity is gathered back onto particles, the
//!    deformation gradient is advanced, and each particle's material applies
//!    its plastic return mapping.
//!
//! Rigid bodies are two-way coupled through CPIC "coloring": grid nodes and
//! particles carry per-body side tags, and momentum that would cross a thin
//! rigid surface is diverted into impulses on the body instead.

pub extern crate nalgebra as na;

#[macro_use]
extern crate log;

#[cfg(feature = "serde-serialize")]
#[macro_use]
extern crate serde;

pub use crate::error::MpmError;

pub mod prelude {
    pub use crate::dynamics::models::*;
    pub use crate::dynamics::solver::*;
    pub use crate::dynamics::*;
    pub use crate::geometry::*;
    pub use crate::math::*;
    pub use crate::MpmError;
}

/// Aliases for the mathematical types used throughout this crate.
pub mod math {
    /// The scalar type used throughout this crate.
    pub type Real = f32;

    /// The dimension of the simulated space.
    pub const DIM: usize = 3;

    /// The B-spline order of the particle-grid transfer kernel.
    pub const KERNEL_ORDER: usize = 2;

    /// Whether the MLS form of the transfers is used.
    ///
    /// The MLS form folds the stress term into the affine momentum matrix and
    /// reconstructs the velocity gradient from the APIC matrix instead of
    /// accumulating kernel gradients explicitly.
    pub const USE_MLS_MPM: bool = true;

    /// The vector type.
    pub type Vector<N> = na::Vector3<N>;

    /// The 4-lane vector type used by the packed (momentum, mass) grid lanes.
    pub type Vector4<N> = na::Vector4<N>;

    /// The matrix type.
    pub type Matrix<N> = na::Matrix3<N>;

    /// The point type.
    pub type Point<N> = na::Point3<N>;

    /// Integer lattice coordinates of a grid cell.
    pub type CellCoord = na::Vector3<i32>;
}

mod error;
pub mod dynamics;
pub mod geometry;
pub mod utils;
