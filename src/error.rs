//! Error types for the ClickHouse client.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`.

use thiserror::Error;

/// An exception reported by the ClickHouse server.
///
/// Carries the server-side error code, symbolic name, human-readable message
/// and stack trace, plus an optional chain of nested causes.
#[derive(Clone, Debug)]
pub struct ServerException {
    /// ClickHouse error code (see `ErrorCodes.cpp` in the server sources).
    pub code: i32,
    /// Symbolic exception name, e.g. `DB::Exception`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Server-side stack trace.
    pub stack_trace: String,
    /// Nested cause, if the server chained exceptions.
    pub nested: Option<Box<ServerException>>,
}

impl std::fmt::Display for ServerException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.code, self.message)
    }
}

/// Errors that can occur when using the ClickHouse client.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish a connection to the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed wire data: varint overrun, truncated input, or a block
    /// preamble that does not match the protocol.
    #[error("Malformed wire data: {0}")]
    MalformedWire(String),

    /// The CityHash128 checksum of a compressed frame does not match its
    /// payload.
    #[error("Compressed frame checksum mismatch")]
    ChecksumMismatch,

    /// A compressed frame carries an algorithm byte this client does not
    /// handle.
    #[error("Unsupported compression algorithm: 0x{0:02x}")]
    UnsupportedAlgorithm(u8),

    /// The server sent a JSON column in the object serialisation the client
    /// cannot decode; request string serialisation via
    /// `output_format_native_write_json_as_string`.
    #[error(
        "Unsupported JSON serialization version {0}; \
         enable string serialization on the connection"
    )]
    UnsupportedJsonSerialization(u64),

    /// The bulk-insert pipeline met a column it has no extractor for.
    #[error("Unsupported bulk insert column: {0}")]
    UnsupportedBulkInsertColumn(String),

    /// A type string received from the server failed to parse.
    #[error("Malformed type: {0}")]
    MalformedType(String),

    /// An error during LZ4 or ZSTD compression/decompression.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A type mismatch between expected and actual column types.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type that was expected.
        expected: String,
        /// The type that was received.
        actual: String,
    },

    /// A validation error, such as mismatched row counts in a block.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An exception message received from the server.
    #[error("Server error: {0}")]
    Server(ServerException),

    /// A second query was issued while another query was still active on
    /// the connection.
    #[error("A query is already active on this connection")]
    ConcurrentQuery,

    /// The query text references a parameter that was not supplied.
    #[error("Missing query parameter: @{0}")]
    MissingParameter(String),

    /// A parameter value's ClickHouse type could not be inferred.
    #[error("Cannot infer parameter type: {0}")]
    TypeInference(String),

    /// A cancellation drain or per-operation deadline elapsed.
    #[error("Operation timed out")]
    Timeout,

    /// An invalid argument was provided to a function.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid UTF-8 was encountered when reading a string.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// A type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
