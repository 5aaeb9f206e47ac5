//! Persisted layouts of the graph and its preparations
//!
//! Every file starts with a magic/version header and ends with a CRC-64
//! footer over everything before it. Files are written next to their final
//! path and renamed into place once complete.

pub mod ch_file;
pub mod crc;
pub mod graph_file;
pub mod index_file;
pub mod lm_file;
pub mod storage;

pub use ch_file::ChFile;
pub use graph_file::GraphFile;
pub use index_file::IndexFile;
pub use lm_file::LmFile;
pub use storage::{Stamp, StorageLock};
