use crate::dynamics::GridState;
use crate::geometry::SpGrid;

/// Engine extension points.
///
/// `cancelled` is polled at block boundaries by every parallel phase; a
/// block that already started always runs to completion.
pub trait MpmHooks: Send + Sync {
    fn post_grid_update(&mut self, _grid: &mut SpGrid<GridState>) {}

    fn cancelled(&self) -> bool {
        false
    }
}

impl MpmHooks for () {}
