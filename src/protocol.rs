//! Protocol constants: packet discriminators, revision gates, compression
//! methods.

/// Types of packets received from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ServerCode {
    /// Server handshake response containing name, version, and revision.
    Hello = 0,
    /// Block of data, may be compressed.
    Data = 1,
    /// Exception that occurred during query execution.
    Exception = 2,
    /// Query execution progress: rows and bytes read.
    Progress = 3,
    /// Response to a client Ping request.
    Pong = 4,
    /// Signals that all packets for the current operation have been sent.
    EndOfStream = 5,
    /// Profiling data for query execution.
    ProfileInfo = 6,
    /// Block of totals, may be compressed.
    Totals = 7,
    /// Block of extremes (mins and maxs), may be compressed.
    Extremes = 8,
    /// Response to a TablesStatus request.
    TablesStatusResponse = 9,
    /// Query execution log (always uncompressed).
    Log = 10,
    /// Columns description for default values calculation.
    TableColumns = 11,
    /// List of unique part UUIDs.
    PartUUIDs = 12,
    /// Request for the next distributed read task.
    ReadTaskRequest = 13,
    /// Profile events from the server (always uncompressed).
    ProfileEvents = 14,
}

impl TryFrom<u64> for ServerCode {
    type Error = crate::Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerCode::Hello),
            1 => Ok(ServerCode::Data),
            2 => Ok(ServerCode::Exception),
            3 => Ok(ServerCode::Progress),
            4 => Ok(ServerCode::Pong),
            5 => Ok(ServerCode::EndOfStream),
            6 => Ok(ServerCode::ProfileInfo),
            7 => Ok(ServerCode::Totals),
            8 => Ok(ServerCode::Extremes),
            9 => Ok(ServerCode::TablesStatusResponse),
            10 => Ok(ServerCode::Log),
            11 => Ok(ServerCode::TableColumns),
            12 => Ok(ServerCode::PartUUIDs),
            13 => Ok(ServerCode::ReadTaskRequest),
            14 => Ok(ServerCode::ProfileEvents),
            _ => Err(crate::Error::MalformedWire(format!(
                "Unknown server packet code: {}",
                value
            ))),
        }
    }
}

/// Types of packets sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ClientCode {
    /// Client handshake containing name, version, and default database.
    Hello = 0,
    /// Query packet with query id, settings, stage, compression, and query
    /// text.
    Query = 1,
    /// Data block (e.g. INSERT data), may be compressed.
    Data = 2,
    /// Cancel the currently running query.
    Cancel = 3,
    /// Ping the server to check the connection is alive.
    Ping = 4,
}

/// Query processing stage requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Stage {
    /// Fully process the query and return the final result.
    Complete = 2,
}

/// Block compression negotiated for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression; blocks travel inline without framing.
    #[default]
    None,
    /// LZ4 compression: fast with a good ratio.
    Lz4,
    /// ZSTD compression: better ratio, slower than LZ4.
    Zstd,
}

impl CompressionMethod {
    /// Whether compressed framing is applied to data blocks.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CompressionMethod::None)
    }
}

/// How `String` columns are materialised when reading blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringMaterialization {
    /// Decode each row into an owned heap string up front.
    #[default]
    Eager,
    /// Keep one contiguous pooled byte buffer plus per-row offsets and
    /// lengths; rows decode on access.
    Lazy,
}

// Revision thresholds gating per-field serialisation. The client must only
// emit or expect a gated field when the negotiated revision reaches the
// threshold.
pub const DBMS_MIN_REVISION_WITH_CLIENT_INFO: u64 = 54032;
pub const DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE: u64 = 54058;
pub const DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;
pub const DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES: u64 = 50264;
pub const DBMS_MIN_REVISION_WITH_BLOCK_INFO: u64 = 51903;
pub const DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME: u64 = 54372;
pub const DBMS_MIN_REVISION_WITH_VERSION_PATCH: u64 = 54401;
pub const DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO: u64 = 54420;
pub const DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS: u64 = 54429;
pub const DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET: u64 = 54441;
pub const DBMS_MIN_REVISION_WITH_OPENTELEMETRY: u64 = 54442;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH: u64 = 54448;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_INITIAL_QUERY_START_TIME: u64 = 54449;
pub const DBMS_MIN_REVISION_WITH_PARALLEL_REPLICAS: u64 = 54453;
pub const DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM: u64 = 54458;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS: u64 = 54459;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_SERVER_QUERY_TIME_IN_PROGRESS: u64 =
    54460;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_PASSWORD_COMPLEXITY_RULES: u64 =
    54461;
pub const DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET_V2: u64 = 54462;
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS: u64 = 54463;

/// The highest revision this client declares. Every gate at or below this
/// threshold is fully encoded and decoded; declaring higher would desync the
/// stream on the first unknown trailing field.
pub const DBMS_TCP_PROTOCOL_VERSION: u64 =
    DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS;

/// Settings flag: the setting is marked important and must not be ignored
/// by an older server.
pub const SETTING_FLAG_IMPORTANT: u64 = 0x01;

/// Parameter flag: parameters are always serialised as custom strings.
pub const PARAM_FLAG_CUSTOM: u64 = 0x02;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_code_conversion() {
        assert_eq!(ServerCode::try_from(0).unwrap(), ServerCode::Hello);
        assert_eq!(ServerCode::try_from(1).unwrap(), ServerCode::Data);
        assert_eq!(
            ServerCode::try_from(14).unwrap(),
            ServerCode::ProfileEvents
        );
        assert!(ServerCode::try_from(99).is_err());
    }

    #[test]
    fn compression_method_default() {
        assert_eq!(CompressionMethod::default(), CompressionMethod::None);
        assert!(!CompressionMethod::None.is_enabled());
        assert!(CompressionMethod::Lz4.is_enabled());
    }

    #[test]
    fn declared_revision_covers_known_gates() {
        assert!(
            DBMS_TCP_PROTOCOL_VERSION
                >= DBMS_MIN_PROTOCOL_VERSION_WITH_PASSWORD_COMPLEXITY_RULES
        );
        assert!(
            DBMS_TCP_PROTOCOL_VERSION
                >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET_V2
        );
    }
}
