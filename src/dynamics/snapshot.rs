use crate::dynamics::{GridState, MpmParticle, ParticleSet};
use crate::geometry::SpGrid;
use crate::math::Real;
use crate::MpmError;

/// Persisted engine state: a block-ordered dump of the particles plus the
/// live-block set.
///
/// The `states` coloring words round-trip bit-exactly, which replay
/// compatibility depends on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cell_width: Real,
    pub res: [u32; 3],
    pub live_blocks: Vec<u64>,
    pub particles: Vec<MpmParticle>,
}

impl Snapshot {
    /// Captures the particle set in block-sorted order together with the
    /// grid's live-block set.
    pub fn capture(grid: &SpGrid<GridState>, particles: &ParticleSet) -> Self {
        let records = particles
            .sorted_ids()
            .iter()
            .map(|&i| particles.particles()[i as usize].clone())
            .collect();

        let res = grid.res();
        Self {
            cell_width: grid.cell_width(),
            res: [res.x as u32, res.y as u32, res.z as u32],
            live_blocks: grid.live_blocks().to_vec(),
            particles: records,
        }
    }

    /// Rebuilds a grid and particle set from the snapshot.
    pub fn restore(
        &self,
        block_capacity: usize,
    ) -> Result<(SpGrid<GridState>, ParticleSet), MpmError> {
        let mut grid = SpGrid::<GridState>::with_capacity(
            self.cell_width,
            na::vector![self.res[0], self.res[1], self.res[2]],
            block_capacity,
        )?;
        for &block in &self.live_blocks {
            grid.allocate(block)?;
        }

        let mut particles = ParticleSet::new();
        for p in &self.particles {
            particles.insert(p.clone());
        }
        Ok((grid, particles))
    }
}
