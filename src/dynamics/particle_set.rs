use crate::dynamics::{GridState, MaterialTag, MpmParticle};
use crate::geometry::{SpGrid, BLOCK_BITS};
use crate::MpmError;
use rayon::prelude::*;

/// Per-live-block bookkeeping produced by the sort.
#[derive(Copy, Clone, Debug, Default)]
pub struct BlockMeta {
    /// Start of the block's particle range in the sorted id array. Within
    /// the block, the per-cell `particle_count` fields partition the range in
    /// block-linear cell order.
    pub particle_offset: u32,
}

/// The particle array plus the block-sorted id order used by the transfer
/// kernels.
#[derive(Default)]
pub struct ParticleSet {
    pub(crate) particles: Vec<MpmParticle>,
    pub(crate) order: Vec<u32>,
    pub(crate) block_meta: Vec<BlockMeta>,
    has_nonlocal: bool,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[MpmParticle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [MpmParticle] {
        &mut self.particles
    }

    pub fn iter(&self) -> impl Iterator<Item = &MpmParticle> {
        self.particles.iter()
    }

    pub fn insert(&mut self, particle: MpmParticle) {
        self.has_nonlocal |= particle.material.tag() == MaterialTag::Nonlocal;
        self.order.push(self.particles.len() as u32);
        self.particles.push(particle);
    }

    pub fn insert_batch(&mut self, particles: Vec<MpmParticle>) {
        for p in particles {
            self.insert(p);
        }
    }

    pub fn has_nonlocal(&self) -> bool {
        self.has_nonlocal
    }

    /// The particle ids in block-sorted order.
    pub fn sorted_ids(&self) -> &[u32] {
        &self.order
    }

    pub fn block_meta(&self) -> &[BlockMeta] {
        &self.block_meta
    }

    /// Total mass of the set.
    pub fn total_mass(&self) -> f32 {
        self.particles.iter().map(|p| p.mass).sum()
    }

    /// Re-sorts particles by owning block and base cell, committing grid
    /// blocks under every stencil and rebuilding the per-cell
    /// `particle_count` partition and per-block offsets.
    ///
    /// Transfer fields of live cells (momentum, mass, counts, fluidity
    /// scratch) are cleared; the externally maintained coloring fields
    /// (`states`, `distance`, flags) are preserved.
    pub fn sort(&mut self, grid: &mut SpGrid<GridState>) -> Result<(), MpmError> {
        let inv_dx = grid.inv_cell_width();

        grid.all_blocks_mut().par_iter_mut().for_each(|cells| {
            for cell in cells.iter_mut() {
                cell.velocity_and_mass = na::zero();
                cell.particle_count = 0;
                cell.granular_fluidity = 0.0;
                cell.aux0 = 0.0;
                cell.aux1 = 0.0;
                cell.aux2 = 0.0;
                cell.aux3 = 0.0;
            }
        });

        // Commit every block a stencil can reach and compute the sort keys.
        for i in 0..self.particles.len() {
            let base = self.particles[i].base_cell(inv_dx);
            grid.touch_cell(base)?;
            let code = SpGrid::<GridState>::coord_to_block_offset(base);
            debug_assert!(code < 1 << (64 - 3 * BLOCK_BITS));
            let cell = SpGrid::<GridState>::cell_index_in_block(base) as u64;
            self.particles[i].grid_index = (code << (3 * BLOCK_BITS)) | cell;
        }

        let particles = &self.particles;
        self.order
            .par_sort_by_key(|i| particles[*i as usize].grid_index);

        grid.sort_live_blocks();

        // Per-cell particle counts.
        for &pid in &self.order {
            let base = self.particles[pid as usize].base_cell(inv_dx);
            if let Some(cell) = grid.get_mut(base) {
                cell.particle_count += 1;
            }
        }

        // Per-block offsets into the sorted id array.
        self.block_meta.clear();
        let mut offset = 0u32;
        for &code in grid.live_blocks() {
            self.block_meta.push(BlockMeta {
                particle_offset: offset,
            });
            let cells = grid.block_cells(code).ok_or_else(|| {
                MpmError::InternalInvariant(format!("live block {:#x} has no storage", code))
            })?;
            offset += cells.iter().map(|c| c.particle_count).sum::<u32>();
        }

        if offset as usize != self.particles.len() {
            return Err(MpmError::InternalInvariant(format!(
                "particle_count sum {} does not match the particle total {}",
                offset,
                self.particles.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dynamics::models::{Material, Water, WaterParams};
    use na::vector;

    fn water_particle(pos: na::Vector3<f32>) -> MpmParticle {
        let m = Material::Water(Water::new(&WaterParams::default()).unwrap());
        MpmParticle::new(m, pos, 1.0, 1.0)
    }

    #[test]
    fn sort_partitions_particles_by_cell() {
        let mut grid = SpGrid::<GridState>::with_capacity(0.1, vector![32, 32, 32], 256).unwrap();
        let mut set = ParticleSet::new();
        // Two particles in one cell, one in another block.
        set.insert(water_particle(vector![0.66, 0.66, 0.66]));
        set.insert(water_particle(vector![0.67, 0.67, 0.67]));
        set.insert(water_particle(vector![1.66, 0.66, 0.66]));
        set.sort(&mut grid).unwrap();

        let total: u32 = grid
            .live_blocks()
            .iter()
            .map(|&c| {
                grid.block_cells(c)
                    .unwrap()
                    .iter()
                    .map(|cell| cell.particle_count)
                    .sum::<u32>()
            })
            .sum();
        assert_eq!(total, 3);
        assert_eq!(set.block_meta().len(), grid.live_blocks().len());

        // Sorted order groups the two same-cell particles together.
        let keys: Vec<u64> = set
            .sorted_ids()
            .iter()
            .map(|&i| set.particles()[i as usize].grid_index)
            .collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(keys[0], keys[1]);
    }

    #[test]
    fn sort_preserves_grid_states() {
        let mut grid = SpGrid::<GridState>::with_capacity(0.1, vector![32, 32, 32], 256).unwrap();
        let mut set = ParticleSet::new();
        set.insert(water_particle(vector![0.66, 0.66, 0.66]));
        set.sort(&mut grid).unwrap();

        let coord = vector![6, 6, 6];
        grid.get_mut(coord).unwrap().set_states(0b10);
        set.sort(&mut grid).unwrap();
        assert_eq!(grid.get(coord).get_states(), 0b10);
        assert_eq!(grid.get(coord).particle_count, 1);
    }
}
