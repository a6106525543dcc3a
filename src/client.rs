//! Client connection: handshake, query lifecycle, cancellation.
//!
//! A connection is single-owner and non-reentrant: one caller drives it,
//! operations form a strict FIFO, and at most one query is in flight.
//! State moves `Closed → Connecting → Handshaking → Ready ⇄ QueryActive`;
//! any I/O failure or malformed message closes the connection for good,
//! while a server exception during a query only returns it to `Ready`.

use crate::{
    block::Block,
    column::column_value::{
        get_column_item,
        ColumnValue,
    },
    connection::Connection,
    io::{
        BlockReader,
        BlockWriter,
    },
    params,
    protocol::*,
    query::{
        ClientInfo,
        Profile,
        Progress,
        Query,
        ServerInfo,
        TableColumns,
    },
    Error,
    Result,
};
use std::time::Duration;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, or failed; the connection is not reusable.
    Closed,
    /// TCP connect in progress.
    Connecting,
    /// Hello exchange in progress.
    Handshaking,
    /// Connected and idle.
    Ready,
    /// A query is in flight; no second query may start.
    QueryActive,
}

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Server host.
    pub host: String,
    /// Native protocol port.
    pub port: u16,
    /// Default database.
    pub database: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: String,
    /// Block compression for both directions.
    pub compression: CompressionMethod,
    /// String column materialisation.
    pub strings: StringMaterialization,
    /// Rows buffered per bulk-insert block.
    pub insert_batch_size: usize,
    /// Bound on the cancellation drain.
    pub drain_timeout: Duration,
    /// Client identity sent to the server.
    pub client_info: ClientInfo,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            compression: CompressionMethod::Lz4,
            strings: StringMaterialization::Eager,
            insert_batch_size: 65_536,
            drain_timeout: Duration::from_secs(10),
            client_info: ClientInfo::default(),
        }
    }
}

impl ClientOptions {
    /// Options for a host and port, defaults elsewhere.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Default::default() }
    }

    /// Set the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the compression method.
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Set the string materialisation mode.
    pub fn strings(mut self, strings: StringMaterialization) -> Self {
        self.strings = strings;
        self
    }

    /// Set the bulk-insert flush threshold in rows.
    pub fn insert_batch_size(mut self, rows: usize) -> Self {
        self.insert_batch_size = rows;
        self
    }
}

/// A message from the server, payload already parsed.
pub(crate) enum ServerMessage {
    Data(Block),
    Totals(Block),
    Extremes(Block),
    Progress(Progress),
    Profile(Profile),
    Log(Block),
    ProfileEvents(Block),
    TableColumns(TableColumns),
    EndOfStream,
    Pong,
}

/// A ClickHouse client over one native-protocol connection.
pub struct Client {
    pub(crate) conn: Connection,
    pub(crate) server_info: ServerInfo,
    pub(crate) revision: u64,
    pub(crate) state: ConnectionState,
    pub(crate) options: ClientOptions,
    pub(crate) reader: BlockReader,
    pub(crate) writer: BlockWriter,
}

impl Client {
    /// Connect over TCP and perform the handshake.
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        tracing::debug!(host = %options.host, port = options.port, "connecting");
        let conn = Connection::connect(&options.host, options.port).await?;
        Self::handshake(conn, options).await
    }

    /// Perform the handshake over an established transport. Tests drive
    /// this with an in-memory duplex.
    pub async fn handshake(
        mut conn: Connection,
        options: ClientOptions,
    ) -> Result<Self> {
        conn.write_varint(ClientCode::Hello as u64).await?;
        conn.write_string(&options.client_info.client_name).await?;
        conn.write_varint(options.client_info.client_version_major).await?;
        conn.write_varint(options.client_info.client_version_minor).await?;
        conn.write_varint(options.client_info.client_revision).await?;
        conn.write_string(&options.database).await?;
        conn.write_string(&options.user).await?;
        conn.write_string(&options.password).await?;
        conn.flush().await?;

        let code = conn.read_varint().await?;
        let server_info = match ServerCode::try_from(code)? {
            ServerCode::Hello => ServerInfo::read(&mut conn).await?,
            ServerCode::Exception => {
                // A refusal during handshake is a connection-level fault.
                let exception = crate::query::read_exception(&mut conn).await?;
                return Err(Error::Server(exception));
            }
            other => {
                return Err(Error::MalformedWire(format!(
                    "expected Hello, got {:?}",
                    other
                )))
            }
        };

        let revision =
            server_info.revision.min(options.client_info.client_revision);
        tracing::debug!(
            server = %server_info.name,
            server_revision = server_info.revision,
            negotiated = revision,
            timezone = %server_info.timezone,
            "handshake complete"
        );

        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM {
            conn.write_string(&options.client_info.quota_key).await?;
            conn.flush().await?;
        }

        let reader = BlockReader::new(revision)
            .with_compression(options.compression)
            .with_strings(options.strings);
        let writer =
            BlockWriter::new(revision).with_compression(options.compression);

        Ok(Self {
            conn,
            server_info,
            revision,
            state: ConnectionState::Ready,
            options,
            reader,
            writer,
        })
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// The negotiated protocol revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The client options, tunable between operations.
    pub fn options_mut(&mut self) -> &mut ClientOptions {
        &mut self.options
    }

    // A query may only start from Ready; this check consumes no wire
    // bytes.
    pub(crate) fn ensure_ready(&self) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::QueryActive => Err(Error::ConcurrentQuery),
            _ => Err(Error::Connection(
                "connection is closed".to_string(),
            )),
        }
    }

    pub(crate) fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Ping the server.
    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.conn.write_varint(ClientCode::Ping as u64).await?;
        self.conn.flush().await?;

        loop {
            match self.receive_message().await? {
                ServerMessage::Pong => return Ok(()),
                // Stray progress packets may precede the pong.
                ServerMessage::Progress(_) => continue,
                _ => {
                    self.close();
                    return Err(Error::MalformedWire(
                        "unexpected packet while waiting for Pong".to_string(),
                    ));
                }
            }
        }
    }

    /// Execute a query and discard its result blocks.
    pub async fn execute(&mut self, query: impl Into<Query>) -> Result<()> {
        self.query(query).await.map(|_| ())
    }

    /// Execute a query and collect all result blocks.
    pub async fn query(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryResult> {
        let mut stream = self.query_stream(query.into()).await?;

        let mut blocks = Vec::new();
        while let Some(block) = stream.next().await? {
            blocks.push(block);
        }

        Ok(QueryResult {
            blocks,
            totals: stream.totals.take(),
            extremes: stream.extremes.take(),
            progress: std::mem::take(&mut stream.progress),
            profile: stream.profile.take(),
        })
    }

    /// Execute a query and return the first value of its first column.
    pub async fn query_scalar(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<ColumnValue> {
        let result = self.query(query).await?;
        let block = result
            .blocks
            .iter()
            .find(|b| !b.is_empty())
            .ok_or_else(|| {
                Error::Validation("query returned no rows".to_string())
            })?;
        let column = block.column(0).expect("non-empty block has a column");
        get_column_item(column.as_ref(), 0)
    }

    /// Start a query and stream its result blocks one at a time.
    pub async fn query_stream(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryStream<'_>> {
        let query = query.into();
        self.ensure_ready()?;

        self.send_query(&query).await.map_err(|e| {
            self.close();
            e
        })?;
        self.state = ConnectionState::QueryActive;

        Ok(QueryStream {
            client: self,
            finished: false,
            cancelled: false,
            totals: None,
            extremes: None,
            progress: Progress::default(),
            profile: None,
        })
    }

    pub(crate) async fn send_query(&mut self, query: &Query) -> Result<()> {
        let (text, param_section) = if query.params().is_empty() {
            (query.text().to_string(), Vec::new())
        } else {
            params::rewrite_query(query)?
        };

        tracing::debug!(query_id = query.id(), %text, "sending query");

        self.conn.write_varint(ClientCode::Query as u64).await?;
        self.conn.write_string(query.id()).await?;

        let revision = self.revision;
        if revision >= DBMS_MIN_REVISION_WITH_CLIENT_INFO {
            let info = self.options.client_info.clone();

            self.conn.write_u8(info.query_kind).await?;
            self.conn.write_string(&info.initial_user).await?;
            self.conn.write_string(&info.initial_query_id).await?;
            self.conn.write_string("0.0.0.0:0").await?;

            if revision
                >= DBMS_MIN_PROTOCOL_VERSION_WITH_INITIAL_QUERY_START_TIME
            {
                self.conn.write_i64(0).await?;
            }

            self.conn.write_u8(1).await?; // interface: TCP
            self.conn.write_string(&info.os_user).await?;
            self.conn.write_string(&info.client_hostname).await?;
            self.conn.write_string(&info.client_name).await?;
            self.conn.write_varint(info.client_version_major).await?;
            self.conn.write_varint(info.client_version_minor).await?;
            self.conn.write_varint(info.client_revision).await?;

            if revision >= DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO {
                self.conn.write_string(&info.quota_key).await?;
            }
            if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH {
                self.conn.write_varint(0).await?;
            }
            if revision >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
                self.conn.write_varint(info.client_version_patch).await?;
            }
            if revision >= DBMS_MIN_REVISION_WITH_OPENTELEMETRY {
                self.conn.write_u8(0).await?; // no trace context
            }
            if revision >= DBMS_MIN_REVISION_WITH_PARALLEL_REPLICAS {
                self.conn.write_varint(0).await?; // collaborate_with_initiator
                self.conn.write_varint(0).await?; // count_participating_replicas
                self.conn.write_varint(0).await?; // number_of_current_replica
            }
        }

        if revision >= DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS {
            for setting in query.settings() {
                self.conn.write_string(&setting.name).await?;
                let flags =
                    if setting.important { SETTING_FLAG_IMPORTANT } else { 0 };
                self.conn.write_varint(flags).await?;
                self.conn.write_string(&setting.value).await?;
            }
        }
        self.conn.write_string("").await?; // end of settings

        if revision >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET {
            self.conn.write_string("").await?; // not a replica peer
        }

        self.conn.write_varint(Stage::Complete as u64).await?;
        let compression_flag =
            if self.options.compression.is_enabled() { 1 } else { 0 };
        self.conn.write_varint(compression_flag).await?;
        self.conn.write_string(&text).await?;

        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS {
            for (name, dump) in &param_section {
                self.conn.write_string(name).await?;
                self.conn.write_varint(PARAM_FLAG_CUSTOM).await?;
                self.conn.write_string(dump).await?;
            }
            self.conn.write_string("").await?; // end of parameters
        }

        self.conn.flush().await?;
        Ok(())
    }

    // Read one server message; `Exception` surfaces as `Error::Server`.
    pub(crate) async fn receive_message(&mut self) -> Result<ServerMessage> {
        let code = self.conn.read_varint().await?;
        let code = ServerCode::try_from(code)?;
        tracing::trace!(?code, "server packet");

        match code {
            ServerCode::Data | ServerCode::Totals | ServerCode::Extremes => {
                if self.revision >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
                    let _table_name = self.conn.read_string().await?;
                }
                let block = self.reader.read_block(&mut self.conn).await?;
                Ok(match code {
                    ServerCode::Totals => ServerMessage::Totals(block),
                    ServerCode::Extremes => ServerMessage::Extremes(block),
                    _ => ServerMessage::Data(block),
                })
            }
            ServerCode::Log | ServerCode::ProfileEvents => {
                let _table_name = self.conn.read_string().await?;
                // These blocks are never compressed, whatever the session
                // negotiated.
                let plain = BlockReader::new(self.revision);
                let block = plain.read_block(&mut self.conn).await?;
                Ok(if code == ServerCode::Log {
                    ServerMessage::Log(block)
                } else {
                    ServerMessage::ProfileEvents(block)
                })
            }
            ServerCode::Progress => Ok(ServerMessage::Progress(
                Progress::read(&mut self.conn, self.revision).await?,
            )),
            ServerCode::ProfileInfo => {
                Ok(ServerMessage::Profile(Profile::read(&mut self.conn).await?))
            }
            ServerCode::TableColumns => Ok(ServerMessage::TableColumns(
                TableColumns::read(&mut self.conn).await?,
            )),
            ServerCode::EndOfStream => Ok(ServerMessage::EndOfStream),
            ServerCode::Pong => Ok(ServerMessage::Pong),
            ServerCode::Exception => {
                let exception =
                    crate::query::read_exception(&mut self.conn).await?;
                Err(Error::Server(exception))
            }
            other => Err(Error::MalformedWire(format!(
                "unexpected server packet: {:?}",
                other
            ))),
        }
    }

    /// Cancel the active query, if any, and drain to the terminal
    /// message. A no-op when no query is active.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.state != ConnectionState::QueryActive {
            return Ok(());
        }

        self.conn.write_varint(ClientCode::Cancel as u64).await?;
        self.conn.flush().await?;
        self.drain().await
    }

    // Consume in-flight messages until the terminal one, bounded by the
    // drain timeout. Blocks are applied to buffers but not surfaced.
    pub(crate) async fn drain(&mut self) -> Result<()> {
        let deadline = self.options.drain_timeout;
        let drained = tokio::time::timeout(deadline, async {
            loop {
                match self.receive_message().await {
                    Ok(ServerMessage::EndOfStream) => return Ok(()),
                    // An exception is also terminal; cancellation does not
                    // raise it.
                    Err(Error::Server(e)) => {
                        tracing::debug!(code = e.code, "exception during drain");
                        return Ok(());
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match drained {
            Ok(Ok(())) => {
                self.state = ConnectionState::Ready;
                Ok(())
            }
            Ok(Err(e)) => {
                self.close();
                Err(e)
            }
            Err(_) => {
                self.close();
                Err(Error::Timeout)
            }
        }
    }
}

/// Streaming access to a query's result blocks.
///
/// Dropping the stream before the terminal message leaves the connection
/// in `QueryActive`; a later operation fails with `ConcurrentQuery` until
/// [`Client::cancel`] drains it.
pub struct QueryStream<'a> {
    client: &'a mut Client,
    finished: bool,
    cancelled: bool,
    pub(crate) totals: Option<Block>,
    pub(crate) extremes: Option<Block>,
    pub(crate) progress: Progress,
    pub(crate) profile: Option<Profile>,
}

impl QueryStream<'_> {
    /// The next data block, or `None` after end-of-stream.
    pub async fn next(&mut self) -> Result<Option<Block>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            match self.client.receive_message().await {
                Ok(ServerMessage::Data(block)) => {
                    if block.is_empty() || self.cancelled {
                        continue;
                    }
                    return Ok(Some(block));
                }
                Ok(ServerMessage::Totals(block)) => self.totals = Some(block),
                Ok(ServerMessage::Extremes(block)) => {
                    self.extremes = Some(block)
                }
                Ok(ServerMessage::Progress(progress)) => {
                    self.progress.accumulate(&progress)
                }
                Ok(ServerMessage::Profile(profile)) => {
                    self.profile = Some(profile)
                }
                Ok(ServerMessage::Log(block)) => {
                    tracing::debug!(rows = block.row_count(), "server log");
                }
                Ok(ServerMessage::ProfileEvents(_)) => continue,
                Ok(ServerMessage::TableColumns(_)) => continue,
                Ok(ServerMessage::EndOfStream) => {
                    self.finished = true;
                    self.client.state = ConnectionState::Ready;
                    return Ok(None);
                }
                Ok(ServerMessage::Pong) => {
                    self.finished = true;
                    self.client.close();
                    return Err(Error::MalformedWire(
                        "unexpected Pong during query".to_string(),
                    ));
                }
                Err(Error::Server(exception)) => {
                    // The exception terminates the stream but not the
                    // connection.
                    self.finished = true;
                    self.client.state = ConnectionState::Ready;
                    return Err(Error::Server(exception));
                }
                Err(e) => {
                    self.finished = true;
                    self.client.close();
                    return Err(e);
                }
            }
        }
    }

    /// Cancel the query: stop surfacing rows, send `Cancel`, and drain
    /// in-flight messages until the terminal one.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.cancelled = true;

        self.client.conn.write_varint(ClientCode::Cancel as u64).await?;
        self.client.conn.flush().await?;

        let result = self.client.drain().await;
        self.finished = true;
        result
    }

    /// Accumulated progress so far.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }
}

/// The collected result of a query.
#[derive(Debug)]
pub struct QueryResult {
    /// Data blocks in arrival order.
    pub blocks: Vec<Block>,
    /// The totals block, when WITH TOTALS was used.
    pub totals: Option<Block>,
    /// The extremes block, when enabled.
    pub extremes: Option<Block>,
    /// Accumulated progress.
    pub progress: Progress,
    /// Profile info, when the server sent it.
    pub profile: Option<Profile>,
}

impl QueryResult {
    /// The result blocks.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Total data rows across all blocks.
    pub fn total_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.row_count()).sum()
    }
}
