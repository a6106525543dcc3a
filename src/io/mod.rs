//! In-memory codec helpers, buffer pools, and the block reader/writer.

/// Synchronous varint/string codec over byte slices.
pub mod buffer_utils;
/// Block codec and the column factory.
pub mod block_stream;
/// Shared buffer pools with scoped guards.
pub mod pool;

pub use block_stream::{
    create_column,
    BlockReader,
    BlockWriter,
};
