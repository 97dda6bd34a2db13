pub use self::sp_grid::{SpGrid, BLOCK_BITS, BLOCK_WIDTH, CELLS_PER_BLOCK};

mod sp_grid;
