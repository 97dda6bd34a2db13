use crate::math::{Real, Vector4};
use std::sync::atomic::{AtomicU16, Ordering};

bitflags::bitflags! {
    /// Reserved per-cell flag bits.
    pub struct CellFlags: u16 {
        const NONE = 0;
        const NEAR_RIGID = 1 << 0;
    }
}

/// One grid node of the sparse paged grid.
///
/// The layout is frozen at exactly 64 bytes (a power of two, for cache
/// alignment and replay compatibility): field widths must not change. The
/// mixed `f32`/`f64` widths are deliberate; `distance` keeps 64 bits.
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(C)]
pub struct GridState {
    /// Momentum (xyz lanes) and mass (w lane) during rasterization; velocity
    /// and mass after grid normalization.
    pub velocity_and_mass: Vector4<Real>,
    /// Signed distance to the nearest rigid surface.
    pub distance: f64,
    /// Packed coloring state: low `2·12` bits are per-rigid (side, active)
    /// tag pairs, high 8 bits hold the rigid-body id as `id + 1`.
    pub states: u32,
    /// Number of particles whose base cell is this node.
    pub particle_count: u32,
    /// Per-cell spinlock, used only by the lock-based transfer mode.
    pub lock: u16,
    /// Reserved flag bits.
    pub flags: u16,
    /// Node-scalar granular fluidity (nonlocal rheology).
    pub granular_fluidity: f32,
    /// Scratch node scalars for the nonlocal rheology passes.
    pub aux0: f32,
    pub aux1: f32,
    pub aux2: f64,
    pub aux3: f64,
}

unsafe impl bytemuck::Zeroable for GridState {}
unsafe impl bytemuck::Pod for GridState {}

impl Default for GridState {
    fn default() -> Self {
        Self {
            velocity_and_mass: na::zero(),
            distance: 0.0,
            states: 0,
            particle_count: 0,
            lock: 0,
            flags: 0,
            granular_fluidity: 0.0,
            aux0: 0.0,
            aux1: 0.0,
            aux2: 0.0,
            aux3: 0.0,
        }
    }
}

impl GridState {
    pub const MAX_NUM_RIGID_BODIES: u32 = 12;
    pub const TOTAL_BITS: u32 = 32;
    pub const TAG_BITS: u32 = Self::MAX_NUM_RIGID_BODIES * 2;
    pub const ID_BITS: u32 = Self::TOTAL_BITS - Self::TAG_BITS;

    pub const TAG_MASK: u32 = (1 << Self::TAG_BITS) - 1;
    pub const ID_MASK: u32 = ((1 << Self::ID_BITS) - 1) << Self::TAG_BITS;

    /// The rigid-body id associated to this node, or -1 if none.
    pub fn get_rigid_body_id(&self) -> i32 {
        (self.states >> Self::TAG_BITS) as i32 - 1
    }

    pub fn set_rigid_body_id(&mut self, id: i32) {
        assert!(
            id >= -1 && ((id + 1) as u32) < (1 << Self::ID_BITS),
            "rigid-body id {} overflows the id bits",
            id
        );
        self.states = (self.states & !Self::ID_MASK) | (((id + 1) as u32) << Self::TAG_BITS);
    }

    /// The per-rigid (side, active) tag pairs, without the id bits.
    pub fn get_states(&self) -> u32 {
        self.states & Self::TAG_MASK
    }

    pub fn set_states(&mut self, new_states: u32) {
        self.states = (self.states & !Self::TAG_MASK) | (new_states & Self::TAG_MASK);
    }

    pub fn get_distance(&self) -> f64 {
        self.distance
    }

    pub fn set_distance(&mut self, new_distance: f64) {
        self.distance = new_distance;
    }

    pub fn flags(&self) -> CellFlags {
        CellFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: CellFlags) {
        self.flags = flags.bits();
    }

    /// Spin-locks this cell.
    ///
    /// Only meaningful in the lock-based transfer mode, where cells are
    /// mutated through shared raw pointers instead of the block coloring.
    ///
    /// # Safety
    /// `cell` must point to a live `GridState` that outlives the lock.
    pub unsafe fn lock(cell: *mut GridState) {
        let lock = &*(std::ptr::addr_of_mut!((*cell).lock) as *const AtomicU16);
        while lock
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    /// # Safety
    /// `cell` must currently be locked by this thread.
    pub unsafe fn unlock(cell: *mut GridState) {
        let lock = &*(std::ptr::addr_of_mut!((*cell).lock) as *const AtomicU16);
        lock.store(0, Ordering::Release);
    }
}
