use crate::math::Real;
use crate::MpmError;

bitflags::bitflags! {
    /// Axes whose grid velocity is zeroed, locking motion along them.
    #[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
    pub struct SimulationDofs: u32 {
        const LOCK_NONE = 0;
        const LOCK_X = 1 << 0;
        const LOCK_Y = 1 << 1;
        const LOCK_Z = 1 << 2;
    }
}

/// Handling of the outer domain faces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum DomainBoundary {
    /// No velocity correction at the domain faces.
    None,
    /// Zero the outward normal velocity component within the margin.
    Slip,
    /// Zero the full velocity within the margin.
    Stick,
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct SolverParameters {
    /// Frame timestep; a `step` call advances this much simulated time.
    pub dt: Real,
    pub max_substep_dt: Real,
    pub max_num_substeps: u32,
    /// When true, substep lengths shrink to the materials' allowed dt.
    pub use_adaptive_dt: bool,

    /// Apply gravity per particle before rasterization instead of on the
    /// grid after normalization.
    pub particle_gravity: bool,

    /// Outward force pushing near-boundary particles off rigid surfaces,
    /// applied through the resample fake velocity.
    pub pushing_force: Real,
    /// Stiffness of the boundary-penetration penalty.
    pub penalty: Real,

    /// Damping of the skew-symmetric (rotational) part of the APIC matrices.
    pub rpic_damping: Real,
    /// Damping of the symmetric part of the APIC matrices.
    pub apic_damping: Real,

    pub domain_boundary: DomainBoundary,
    /// Width of the boundary-condition margin, in cells.
    pub boundary_margin: i32,
    pub simulation_dofs: SimulationDofs,

    pub stop_after_one_substep: bool,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            dt: 1.0e-3,
            max_substep_dt: 1.0e-4,
            max_num_substeps: 1000,
            use_adaptive_dt: false,
            particle_gravity: true,
            pushing_force: 0.0,
            penalty: 0.0,
            rpic_damping: 0.0,
            apic_damping: 0.0,
            domain_boundary: DomainBoundary::Slip,
            boundary_margin: 3,
            simulation_dofs: SimulationDofs::LOCK_NONE,
            stop_after_one_substep: false,
        }
    }
}

impl SolverParameters {
    pub fn validate(&self) -> Result<(), MpmError> {
        if !(self.dt >= 0.0) || !(self.max_substep_dt > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "timesteps must be positive, got dt = {}, max_substep_dt = {}",
                self.dt, self.max_substep_dt
            )));
        }
        if self.max_num_substeps == 0 {
            return Err(MpmError::InvalidConfig(
                "max_num_substeps must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rpic_damping) || !(0.0..=1.0).contains(&self.apic_damping)
        {
            return Err(MpmError::InvalidConfig(format!(
                "APIC damping factors must lie in [0, 1], got rpic = {}, apic = {}",
                self.rpic_damping, self.apic_damping
            )));
        }
        if self.boundary_margin < 0 {
            return Err(MpmError::InvalidConfig(format!(
                "boundary_margin must be non-negative, got {}",
                self.boundary_margin
            )));
        }
        Ok(())
    }
}
