//! # clickhouse-tcp
//!
//! An async Rust client for ClickHouse speaking the native TCP binary
//! protocol (default port 9000): columnar result streaming, LZ4/ZSTD
//! compressed blocks with CityHash128 checksums, query parameters, and a
//! typed bulk-insert pipeline.
//!
//! # Quick Start
//!
//! ```no_run
//! use clickhouse_tcp::{Client, ClientOptions, Block};
//! use clickhouse_tcp::column::ColumnUInt64;
//! use std::sync::Arc;
//!
//! # async fn example() -> clickhouse_tcp::Result<()> {
//! let options = ClientOptions::new("localhost", 9000)
//!     .database("default")
//!     .user("default");
//! let mut client = Client::connect(options).await?;
//!
//! client
//!     .execute("CREATE TABLE IF NOT EXISTS t (id UInt64) ENGINE = Memory")
//!     .await?;
//!
//! let mut ids = ColumnUInt64::new();
//! ids.append(1);
//! ids.append(2);
//! let mut block = Block::new();
//! block.append_column("id", Arc::new(ids))?;
//! client.insert("t", block).await?;
//!
//! let result = client.query("SELECT id FROM t").await?;
//! for block in result.blocks() {
//!     println!("rows: {}", block.row_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`client`] - the client API: connect, query, stream, cancel
//! - [`block`] - data blocks
//! - [`mod@column`] - column buffers for every supported type, plus
//!   skippers
//! - [`types`] - the type descriptor and its parser
//! - [`compression`] - the compressed-frame codec
//! - [`params`] - `@name` query parameters
//! - [`insert`] - block inserts and the row-based bulk inserter
//! - [`query`] - query builder and server message payloads
//! - [`protocol`] - packet codes and revision gates
//! - [`connection`] - the buffered transport wrapper
//! - [`wire_format`] - async wire primitives
//! - [`io`] - in-memory codecs, pools, and the block reader/writer

/// Data blocks (collections of named columns).
pub mod block;
/// Async client API.
pub mod client;
/// Column implementations for all supported ClickHouse types.
pub mod column;
/// Compressed-frame codec (LZ4, ZSTD, CityHash128).
pub mod compression;
/// Buffered duplex transport wrapper.
pub mod connection;
/// Error types and the `Result` alias.
pub mod error;
/// Insert pipelines.
pub mod insert;
/// In-memory codec helpers, pools, block reader/writer.
pub mod io;
/// Query parameter pipeline.
pub mod params;
/// Protocol constants and revision gates.
pub mod protocol;
/// Query builder and server message payloads.
pub mod query;
/// ClickHouse type system.
pub mod types;
/// Async wire primitives.
pub mod wire_format;

pub use block::{
    Block,
    BlockInfo,
};
pub use client::{
    Client,
    ClientOptions,
    ConnectionState,
    QueryResult,
    QueryStream,
};
pub use column::column_value::ColumnValue;
pub use connection::Connection;
pub use error::{
    Error,
    Result,
    ServerException,
};
pub use insert::{
    BulkInserter,
    Row,
};
pub use params::ParamValue;
pub use protocol::{
    CompressionMethod,
    StringMaterialization,
};
pub use query::{
    ClientInfo,
    Profile,
    Progress,
    Query,
    ServerInfo,
};
pub use types::Type;
