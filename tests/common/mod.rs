//! Test harness: a scripted ClickHouse server over an in-memory duplex,
//! plus sample columns for the codec suites.
//!
//! The harness speaks the native protocol from the server side using the
//! crate's own wire primitives, so client tests exercise the full message
//! layer without a live server.

#![allow(dead_code)]

/// Sample columns covering every supported type.
pub mod samples;

use clickhouse_tcp::{
    block::Block,
    connection::Connection,
    io::{
        BlockReader,
        BlockWriter,
    },
    protocol::*,
    Client,
    ClientOptions,
};

/// What the harness observed in a client Query packet.
#[derive(Debug)]
pub struct ObservedQuery {
    pub query_id: String,
    pub text: String,
    pub compression_flag: u64,
    pub settings: Vec<(String, u64, String)>,
    pub params: Vec<(String, u64, String)>,
}

pub struct ServerHarness {
    pub conn: Connection,
    pub revision: u64,
    pub negotiated: u64,
    pub compression: CompressionMethod,
}

impl ServerHarness {
    pub fn new(
        stream: tokio::io::DuplexStream,
        revision: u64,
        compression: CompressionMethod,
    ) -> Self {
        Self {
            conn: Connection::new(stream),
            revision,
            negotiated: revision,
            compression,
        }
    }

    /// Read the client hello, answer with a server hello, and consume the
    /// addendum. Returns the client's declared revision.
    pub async fn accept_hello(&mut self) -> u64 {
        let code = self.conn.read_varint().await.unwrap();
        assert_eq!(code, ClientCode::Hello as u64);

        let _client_name = self.conn.read_string().await.unwrap();
        let _major = self.conn.read_varint().await.unwrap();
        let _minor = self.conn.read_varint().await.unwrap();
        let client_revision = self.conn.read_varint().await.unwrap();
        let _database = self.conn.read_string().await.unwrap();
        let _user = self.conn.read_string().await.unwrap();
        let _password = self.conn.read_string().await.unwrap();

        self.negotiated = self.revision.min(client_revision);

        self.conn.write_varint(ServerCode::Hello as u64).await.unwrap();
        self.conn.write_string("ClickHouse").await.unwrap();
        self.conn.write_varint(24).await.unwrap();
        self.conn.write_varint(8).await.unwrap();
        self.conn.write_varint(self.revision).await.unwrap();

        if self.negotiated >= DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE {
            self.conn.write_string("UTC").await.unwrap();
        }
        if self.negotiated >= DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
            self.conn.write_string("mock-server").await.unwrap();
        }
        if self.negotiated >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
            self.conn.write_varint(1).await.unwrap();
        }
        if self.negotiated
            >= DBMS_MIN_PROTOCOL_VERSION_WITH_PASSWORD_COMPLEXITY_RULES
        {
            self.conn.write_varint(0).await.unwrap();
        }
        if self.negotiated >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET_V2 {
            self.conn.write_bytes(&1u64.to_le_bytes()).await.unwrap();
        }
        self.conn.flush().await.unwrap();

        if self.negotiated >= DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM {
            let _quota_key = self.conn.read_string().await.unwrap();
        }

        client_revision
    }

    /// Read a full client Query packet.
    pub async fn read_query(&mut self) -> ObservedQuery {
        let code = self.conn.read_varint().await.unwrap();
        assert_eq!(code, ClientCode::Query as u64, "expected a Query packet");

        let query_id = self.conn.read_string().await.unwrap();

        let rev = self.negotiated;
        if rev >= DBMS_MIN_REVISION_WITH_CLIENT_INFO {
            let _query_kind = self.conn.read_u8().await.unwrap();
            let _initial_user = self.conn.read_string().await.unwrap();
            let _initial_query_id = self.conn.read_string().await.unwrap();
            let _initial_address = self.conn.read_string().await.unwrap();
            if rev >= DBMS_MIN_PROTOCOL_VERSION_WITH_INITIAL_QUERY_START_TIME {
                let _start_time = self.conn.read_fixed::<i64>().await.unwrap();
            }
            let _interface = self.conn.read_u8().await.unwrap();
            let _os_user = self.conn.read_string().await.unwrap();
            let _hostname = self.conn.read_string().await.unwrap();
            let _client_name = self.conn.read_string().await.unwrap();
            let _vmajor = self.conn.read_varint().await.unwrap();
            let _vminor = self.conn.read_varint().await.unwrap();
            let _crev = self.conn.read_varint().await.unwrap();
            if rev >= DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO {
                let _quota_key = self.conn.read_string().await.unwrap();
            }
            if rev >= DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH {
                let _depth = self.conn.read_varint().await.unwrap();
            }
            if rev >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
                let _patch = self.conn.read_varint().await.unwrap();
            }
            if rev >= DBMS_MIN_REVISION_WITH_OPENTELEMETRY {
                let _otel = self.conn.read_u8().await.unwrap();
            }
            if rev >= DBMS_MIN_REVISION_WITH_PARALLEL_REPLICAS {
                let _a = self.conn.read_varint().await.unwrap();
                let _b = self.conn.read_varint().await.unwrap();
                let _c = self.conn.read_varint().await.unwrap();
            }
        }

        let mut settings = Vec::new();
        loop {
            let name = self.conn.read_string().await.unwrap();
            if name.is_empty() {
                break;
            }
            let flags = self.conn.read_varint().await.unwrap();
            let value = self.conn.read_string().await.unwrap();
            settings.push((name, flags, value));
        }

        if rev >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET {
            let _secret = self.conn.read_string().await.unwrap();
        }

        let _stage = self.conn.read_varint().await.unwrap();
        let compression_flag = self.conn.read_varint().await.unwrap();
        let text = self.conn.read_string().await.unwrap();

        let mut params = Vec::new();
        if rev >= DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS {
            loop {
                let name = self.conn.read_string().await.unwrap();
                if name.is_empty() {
                    break;
                }
                let flags = self.conn.read_varint().await.unwrap();
                let value = self.conn.read_string().await.unwrap();
                params.push((name, flags, value));
            }
        }

        ObservedQuery { query_id, text, compression_flag, settings, params }
    }

    /// Read a client Data packet and return its block.
    pub async fn read_data_block(&mut self) -> Block {
        let code = self.conn.read_varint().await.unwrap();
        assert_eq!(code, ClientCode::Data as u64, "expected a Data packet");

        if self.negotiated >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
            let _table_name = self.conn.read_string().await.unwrap();
        }

        let reader =
            BlockReader::new(self.negotiated).with_compression(self.compression);
        reader.read_block(&mut self.conn).await.unwrap()
    }

    /// Read a client packet discriminator and assert it is Cancel.
    pub async fn expect_cancel(&mut self) {
        let code = self.conn.read_varint().await.unwrap();
        assert_eq!(code, ClientCode::Cancel as u64, "expected Cancel");
    }

    /// Read a client packet discriminator and assert it is Ping.
    pub async fn expect_ping(&mut self) {
        let code = self.conn.read_varint().await.unwrap();
        assert_eq!(code, ClientCode::Ping as u64, "expected Ping");
    }

    pub async fn send_data_block(&mut self, block: &Block) {
        self.conn.write_varint(ServerCode::Data as u64).await.unwrap();
        let writer = BlockWriter::new(self.negotiated)
            .with_compression(self.compression);
        writer.write_block(&mut self.conn, block).await.unwrap();
        self.conn.flush().await.unwrap();
    }

    pub async fn send_end_of_stream(&mut self) {
        self.conn
            .write_varint(ServerCode::EndOfStream as u64)
            .await
            .unwrap();
        self.conn.flush().await.unwrap();
    }

    pub async fn send_pong(&mut self) {
        self.conn.write_varint(ServerCode::Pong as u64).await.unwrap();
        self.conn.flush().await.unwrap();
    }

    pub async fn send_progress(&mut self, rows: u64, bytes: u64) {
        self.conn.write_varint(ServerCode::Progress as u64).await.unwrap();
        self.conn.write_varint(rows).await.unwrap();
        self.conn.write_varint(bytes).await.unwrap();
        self.conn.write_varint(0).await.unwrap(); // total rows
        if self.negotiated
            >= DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS
        {
            self.conn.write_varint(0).await.unwrap();
        }
        if self.negotiated >= DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
            self.conn.write_varint(0).await.unwrap();
            self.conn.write_varint(0).await.unwrap();
        }
        if self.negotiated
            >= DBMS_MIN_PROTOCOL_VERSION_WITH_SERVER_QUERY_TIME_IN_PROGRESS
        {
            self.conn.write_varint(0).await.unwrap();
        }
        self.conn.flush().await.unwrap();
    }

    pub async fn send_exception(&mut self, code: i32, message: &str) {
        self.conn.write_varint(ServerCode::Exception as u64).await.unwrap();
        self.conn.write_bytes(&code.to_le_bytes()).await.unwrap();
        self.conn.write_string("DB::Exception").await.unwrap();
        self.conn.write_string(message).await.unwrap();
        self.conn.write_string("<stack trace>").await.unwrap();
        self.conn.write_u8(0).await.unwrap();
        self.conn.flush().await.unwrap();
    }
}

/// Connect a client and a scripted server over an in-memory duplex.
pub async fn connect_pair(
    server_revision: u64,
    compression: CompressionMethod,
) -> (Client, ServerHarness) {
    let (client_end, server_end) = tokio::io::duplex(1 << 20);

    let mut harness =
        ServerHarness::new(server_end, server_revision, compression);
    let options = ClientOptions::new("mock", 9000).compression(compression);

    let accept = tokio::spawn(async move {
        harness.accept_hello().await;
        harness
    });

    let client = Client::handshake(Connection::new(client_end), options)
        .await
        .expect("handshake");
    let harness = accept.await.expect("server task");

    (client, harness)
}
