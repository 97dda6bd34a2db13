use crate::dynamics::models::Material;
use crate::math::{CellCoord, Matrix, Real, Vector};

/// One material point.
///
/// Particles are owned by the particle set and, within a substep, mutated
/// only by the block owning their base cell.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct MpmParticle {
    pub pos: Vector<Real>,
    pub velocity: Vector<Real>,
    pub mass: Real,
    /// Reference volume.
    pub vol: Real,

    /// APIC affine velocity matrix.
    pub apic_b: Matrix<Real>,
    /// APIC quadratic term matrix.
    pub apic_c: Matrix<Real>,
    /// Elastic deformation gradient.
    pub dg_e: Matrix<Real>,

    /// Per-rigid coloring tags, mirroring the grid encoding.
    pub states: u32,

    // Boundary-contact info maintained by the rigid-surface collaborator.
    pub boundary_normal: Vector<Real>,
    pub boundary_distance: Real,
    pub near_boundary: bool,
    pub sticky: bool,

    pub material: Material,

    /// Sort key: owning block offset and base-cell slot, packed.
    #[cfg_attr(feature = "serde-serialize", serde(skip))]
    pub grid_index: u64,
}

impl MpmParticle {
    pub fn new(material: Material, pos: Vector<Real>, mass: Real, vol: Real) -> Self {
        Self {
            pos,
            velocity: na::zero(),
            mass,
            vol,
            apic_b: Matrix::zeros(),
            apic_c: Matrix::zeros(),
            dg_e: Matrix::identity(),
            states: 0,
            boundary_normal: na::zero(),
            boundary_distance: 0.0,
            near_boundary: false,
            sticky: false,
            material,
            grid_index: 0,
        }
    }

    pub fn get_velocity(&self) -> Vector<Real> {
        self.velocity
    }

    pub fn set_velocity(&mut self, v: Vector<Real>) {
        self.velocity = v;
    }

    pub fn get_mass(&self) -> Real {
        self.mass
    }

    pub fn near_boundary(&self) -> bool {
        self.near_boundary
    }

    /// The base cell of the quadratic stencil, in grid units.
    pub fn base_cell(&self, inv_dx: Real) -> CellCoord {
        (self.pos * inv_dx).map(|e| (e - 0.5).floor() as i32)
    }

    pub fn calculate_force(&self) -> Matrix<Real> {
        self.material.calculate_force(&self.dg_e, self.vol)
    }

    pub fn plasticity(&mut self, cdg: &Matrix<Real>, laplacian_gf: Real) -> u32 {
        let Self {
            dg_e,
            material,
            mass,
            vol,
            ..
        } = self;
        material.plasticity(dg_e, cdg, laplacian_gf, *mass, *vol)
    }

    pub fn get_allowed_dt(&self, dx: Real) -> Real {
        self.material
            .get_allowed_dt(&self.dg_e, self.mass, self.vol, &self.velocity, dx)
    }

    pub fn potential_energy(&self) -> Real {
        self.material.potential_energy(&self.dg_e, self.vol)
    }
}
