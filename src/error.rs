use std::fmt;

/// Fatal errors surfaced by the engine.
///
/// Numerical anomalies (NaN deformation gradients, collapsed volumes) are not
/// errors: they are clamped or reset at the site and counted in the step
/// statistics.
#[derive(Clone, Debug, PartialEq)]
pub enum MpmError {
    /// A grid block could not be committed because the reserved block
    /// capacity is exhausted.
    ResourceExhausted {
        requested_blocks: usize,
        capacity: usize,
    },
    /// A material or solver parameter is outside its physical range.
    ///
    /// Reported at initialization; parameters are never auto-corrected.
    InvalidConfig(String),
    /// An internal invariant was violated (stencil escaping the allocated
    /// region, particle-count mismatch, rigid-id overflow).
    InternalInvariant(String),
}

impl fmt::Display for MpmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MpmError::ResourceExhausted {
                requested_blocks,
                capacity,
            } => write!(
                f,
                "grid block allocation failed: {} blocks requested, {} reserved",
                requested_blocks, capacity
            ),
            MpmError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            MpmError::InternalInvariant(msg) => write!(f, "internal invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for MpmError {}
