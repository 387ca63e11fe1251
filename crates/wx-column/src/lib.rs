//! The chunked, compressed, memory-mapped column file (spec §4.1): a
//! dense `[nLocations x nTime]` array stored as a grid of independently
//! compressed chunks, addressable by location without decoding unrelated
//! timesteps, and written atomically via temp-file-then-rename.

pub mod codec;
pub mod file;
pub mod header;

pub use file::{write_dense, ColumnFile};
pub use header::{ChunkIndexEntry, Header};
