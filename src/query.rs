//! Message-layer structures: the query builder and the server message
//! payloads (hello, progress, profile info, exceptions, table columns).

use crate::{
    connection::Connection,
    error::ServerException,
    params::ParamValue,
    protocol::*,
    Result,
};
use std::collections::HashMap;

/// One query setting: `(name, value, important)`.
#[derive(Debug, Clone)]
pub struct Setting {
    /// Setting name.
    pub name: String,
    /// Value, always serialised as a string.
    pub value: String,
    /// Important settings must not be ignored by older servers.
    pub important: bool,
}

/// A SQL query plus its id, settings and parameters.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    query_id: String,
    settings: Vec<Setting>,
    params: HashMap<String, ParamValue>,
    param_types: HashMap<String, String>,
}

impl Query {
    /// Create a query from SQL text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            query_id: String::new(),
            settings: Vec::new(),
            params: HashMap::new(),
            param_types: HashMap::new(),
        }
    }

    /// Set the query id.
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = query_id.into();
        self
    }

    /// Add a setting.
    pub fn with_setting(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.settings.push(Setting {
            name: name.into(),
            value: value.into(),
            important: false,
        });
        self
    }

    /// Add a setting the server must not ignore.
    pub fn with_important_setting(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.settings.push(Setting {
            name: name.into(),
            value: value.into(),
            important: true,
        });
        self
    }

    /// Bind a value for an `@name` placeholder; the ClickHouse type is
    /// inferred from the value.
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Bind a value with an explicit ClickHouse type.
    pub fn with_typed_param(
        mut self,
        name: impl Into<String>,
        declared_type: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Self {
        let name = name.into();
        self.param_types.insert(name.clone(), declared_type.into());
        self.params.insert(name, value.into());
        self
    }

    /// The SQL text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The query id, empty when server-assigned.
    pub fn id(&self) -> &str {
        &self.query_id
    }

    /// The settings in insertion order.
    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    /// The bound parameters.
    pub fn params(&self) -> &HashMap<String, ParamValue> {
        &self.params
    }

    /// Explicitly declared parameter types.
    pub fn param_types(&self) -> &HashMap<String, String> {
        &self.param_types
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Query::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Query::new(s)
    }
}

/// Client identity sent in the handshake and with every query.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub query_kind: u8,
    pub initial_user: String,
    pub initial_query_id: String,
    pub quota_key: String,
    pub os_user: String,
    pub client_hostname: String,
    pub client_name: String,
    pub client_version_major: u64,
    pub client_version_minor: u64,
    pub client_version_patch: u64,
    pub client_revision: u64,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            query_kind: 1, // initial query
            initial_user: String::new(),
            initial_query_id: String::new(),
            quota_key: String::new(),
            os_user: std::env::var("USER")
                .unwrap_or_else(|_| "default".to_string()),
            client_hostname: "localhost".to_string(),
            client_name: "clickhouse-tcp".to_string(),
            client_version_major: 1,
            client_version_minor: 0,
            client_version_patch: 0,
            client_revision: DBMS_TCP_PROTOCOL_VERSION,
        }
    }
}

/// A password complexity rule advertised by newer servers.
#[derive(Clone, Debug)]
pub struct PasswordComplexityRule {
    /// The pattern a password must match.
    pub pattern: String,
    /// The message shown when it does not.
    pub message: String,
}

/// Server identity received in the handshake.
#[derive(Clone, Debug, Default)]
pub struct ServerInfo {
    pub name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub version_patch: u64,
    pub revision: u64,
    pub timezone: String,
    pub display_name: String,
    pub password_rules: Vec<PasswordComplexityRule>,
    pub nonce: Option<u64>,
}

impl ServerInfo {
    /// Read the server hello payload. Revision-gated fields are read only
    /// when both sides' revisions reach the gate, so the client never
    /// reads fields it did not declare support for.
    pub async fn read(conn: &mut Connection) -> Result<Self> {
        let name = conn.read_string().await?;
        let version_major = conn.read_varint().await?;
        let version_minor = conn.read_varint().await?;
        let revision = conn.read_varint().await?;

        let gated = revision.min(DBMS_TCP_PROTOCOL_VERSION);

        let timezone = if gated >= DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE {
            conn.read_string().await?
        } else {
            String::new()
        };

        let display_name =
            if gated >= DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
                conn.read_string().await?
            } else {
                String::new()
            };

        let version_patch = if gated >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
            conn.read_varint().await?
        } else {
            0
        };

        let mut password_rules = Vec::new();
        if gated >= DBMS_MIN_PROTOCOL_VERSION_WITH_PASSWORD_COMPLEXITY_RULES {
            let count = conn.read_varint().await?;
            for _ in 0..count {
                let pattern = conn.read_string().await?;
                let message = conn.read_string().await?;
                password_rules
                    .push(PasswordComplexityRule { pattern, message });
            }
        }

        let nonce = if gated >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET_V2 {
            Some(conn.read_u64().await?)
        } else {
            None
        };

        Ok(Self {
            name,
            version_major,
            version_minor,
            version_patch,
            revision,
            timezone,
            display_name,
            password_rules,
            nonce,
        })
    }
}

/// Query execution progress.
#[derive(Clone, Debug, Default)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
    pub total_bytes: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
    pub elapsed_ns: u64,
}

impl Progress {
    /// Read a progress payload; later revisions append fields in-band.
    pub async fn read(conn: &mut Connection, revision: u64) -> Result<Self> {
        let rows = conn.read_varint().await?;
        let bytes = conn.read_varint().await?;
        let total_rows = conn.read_varint().await?;

        let total_bytes = if revision
            >= DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS
        {
            conn.read_varint().await?
        } else {
            0
        };

        let (written_rows, written_bytes) =
            if revision >= DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
                (conn.read_varint().await?, conn.read_varint().await?)
            } else {
                (0, 0)
            };

        let elapsed_ns = if revision
            >= DBMS_MIN_PROTOCOL_VERSION_WITH_SERVER_QUERY_TIME_IN_PROGRESS
        {
            conn.read_varint().await?
        } else {
            0
        };

        Ok(Self {
            rows,
            bytes,
            total_rows,
            total_bytes,
            written_rows,
            written_bytes,
            elapsed_ns,
        })
    }

    /// Fold another progress packet into this running total.
    pub fn accumulate(&mut self, other: &Progress) {
        self.rows += other.rows;
        self.bytes += other.bytes;
        self.total_rows = self.total_rows.max(other.total_rows);
        self.total_bytes = self.total_bytes.max(other.total_bytes);
        self.written_rows += other.written_rows;
        self.written_bytes += other.written_bytes;
        self.elapsed_ns = self.elapsed_ns.max(other.elapsed_ns);
    }
}

/// Query profile information sent before end-of-stream.
#[derive(Clone, Debug, Default)]
pub struct Profile {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

impl Profile {
    /// Read a profile-info payload.
    pub async fn read(conn: &mut Connection) -> Result<Self> {
        let rows = conn.read_varint().await?;
        let blocks = conn.read_varint().await?;
        let bytes = conn.read_varint().await?;
        let applied_limit = conn.read_u8().await? != 0;
        let rows_before_limit = conn.read_varint().await?;
        let calculated_rows_before_limit = conn.read_u8().await? != 0;

        Ok(Self {
            rows,
            blocks,
            bytes,
            applied_limit,
            rows_before_limit,
            calculated_rows_before_limit,
        })
    }
}

/// Column metadata for default-value calculation during inserts.
#[derive(Clone, Debug)]
pub struct TableColumns {
    /// External table name, usually empty.
    pub name: String,
    /// Column descriptions in the server's text format.
    pub description: String,
}

impl TableColumns {
    /// Read a table-columns payload.
    pub async fn read(conn: &mut Connection) -> Result<Self> {
        let name = conn.read_string().await?;
        let description = conn.read_string().await?;
        Ok(Self { name, description })
    }
}

/// Read an exception payload, following the nested chain.
pub async fn read_exception(conn: &mut Connection) -> Result<ServerException> {
    let mut chain = Vec::new();

    loop {
        let code = conn.read_i32().await?;
        let name = conn.read_string().await?;
        let message = conn.read_string().await?;
        let stack_trace = conn.read_string().await?;
        let has_nested = conn.read_u8().await? != 0;

        chain.push(ServerException {
            code,
            name,
            message,
            stack_trace,
            nested: None,
        });

        if !has_nested {
            break;
        }
    }

    let mut exception = chain.pop().expect("at least one exception");
    while let Some(mut outer) = chain.pop() {
        outer.nested = Some(Box::new(exception));
        exception = outer;
    }
    Ok(exception)
}
