//! Protocol scenarios against a scripted in-memory server: handshake,
//! selects, compressed sessions, parameters, cancellation, concurrent
//! query rejection, and server exceptions.

mod common;

use clickhouse_tcp::{
    block::Block,
    column::{
        Column,
        ColumnInt32,
        ColumnString,
        ColumnUInt64,
        ColumnUInt8,
    },
    protocol::DBMS_TCP_PROTOCOL_VERSION,
    ColumnValue,
    CompressionMethod,
    ConnectionState,
    Error,
    Query,
};
use common::connect_pair;
use std::sync::Arc;

#[tokio::test]
async fn handshake_negotiates_revision() {
    // The server is newer than the client; negotiation takes the minimum.
    let (client, harness) =
        connect_pair(54467, CompressionMethod::None).await;

    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(client.revision(), DBMS_TCP_PROTOCOL_VERSION);
    assert_eq!(client.server_info().name, "ClickHouse");
    assert_eq!(client.server_info().timezone, "UTC");
    assert_eq!(client.server_info().display_name, "mock-server");
    assert_eq!(harness.negotiated, DBMS_TCP_PROTOCOL_VERSION);
}

#[tokio::test]
async fn scalar_select() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        let observed = harness.read_query().await;
        assert_eq!(observed.text, "SELECT 1 FORMAT Native");
        assert_eq!(observed.compression_flag, 0);

        let mut ones = ColumnUInt8::new();
        ones.append(1);
        let mut block = Block::new();
        block.append_column("1", Arc::new(ones)).unwrap();
        harness.send_data_block(&block).await;
        harness.send_end_of_stream().await;
        harness
    });

    let value = client.query_scalar("SELECT 1 FORMAT Native").await.unwrap();
    assert_eq!(value, ColumnValue::UInt8(1));
    assert_eq!(client.state(), ConnectionState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn compressed_select_streams_verified_blocks() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::Lz4).await;

    let server = tokio::spawn(async move {
        let observed = harness.read_query().await;
        assert_eq!(observed.compression_flag, 1);

        let mut numbers = ColumnUInt64::new();
        for n in 0..10 {
            numbers.append(n);
        }
        let mut block = Block::new();
        block.append_column("number", Arc::new(numbers)).unwrap();
        harness.send_progress(10, 80).await;
        harness.send_data_block(&block).await;
        harness.send_end_of_stream().await;
    });

    let result = client
        .query("SELECT number FROM system.numbers LIMIT 10")
        .await
        .unwrap();

    assert_eq!(result.total_rows(), 10);
    let numbers = result.blocks()[0].column_by_name("number").unwrap();
    let numbers = numbers.as_any().downcast_ref::<ColumnUInt64>().unwrap();
    assert_eq!(numbers.data(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    assert_eq!(result.progress.rows, 10);

    server.await.unwrap();
}

#[tokio::test]
async fn zstd_session_roundtrips() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::Zstd).await;

    let server = tokio::spawn(async move {
        harness.read_query().await;
        let mut names = ColumnString::new();
        names.append("zstd works");
        let mut block = Block::new();
        block.append_column("s", Arc::new(names)).unwrap();
        harness.send_data_block(&block).await;
        harness.send_end_of_stream().await;
    });

    let value = client.query_scalar("SELECT 's'").await.unwrap();
    assert_eq!(value, ColumnValue::String("zstd works".to_string()));

    server.await.unwrap();
}

#[tokio::test]
async fn parameters_are_rewritten_and_shipped() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        let observed = harness.read_query().await;
        assert_eq!(
            observed.text,
            "SELECT * FROM u WHERE id IN {ids:Array(Int32)}"
        );
        assert_eq!(observed.params.len(), 1);
        let (name, flags, value) = &observed.params[0];
        assert_eq!(name, "ids");
        assert_eq!(*flags, 2);
        assert_eq!(value, "'[1, 2, 3]'");

        harness.send_end_of_stream().await;
    });

    let query = Query::new("SELECT * FROM u WHERE id IN @ids")
        .with_param("ids", vec![1i32, 2, 3]);
    client.execute(query).await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn settings_carry_importance_flag() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        let observed = harness.read_query().await;
        assert_eq!(
            observed.settings,
            vec![
                ("max_threads".to_string(), 0, "4".to_string()),
                ("readonly".to_string(), 1, "1".to_string()),
            ]
        );
        harness.send_end_of_stream().await;
    });

    let query = Query::new("SELECT 1")
        .with_setting("max_threads", "4")
        .with_important_setting("readonly", "1");
    client.execute(query).await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn cancellation_drains_and_returns_ready() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        harness.read_query().await;

        let mut numbers = ColumnUInt64::new();
        numbers.append(1);
        let mut block = Block::new();
        block.append_column("n", Arc::new(numbers)).unwrap();
        harness.send_data_block(&block).await;

        // The client cancels after the first block; finish the stream
        // with one more in-flight block and the terminal marker.
        harness.expect_cancel().await;
        let mut more = ColumnUInt64::new();
        more.append(2);
        let mut late_block = Block::new();
        late_block.append_column("n", Arc::new(more)).unwrap();
        harness.send_data_block(&late_block).await;
        harness.send_end_of_stream().await;

        // The connection is reusable afterwards.
        harness.read_query().await;
        harness.send_end_of_stream().await;
    });

    let mut stream = client.query_stream("SELECT long_running()").await.unwrap();
    let first = stream.next().await.unwrap();
    assert!(first.is_some());

    stream.cancel().await.unwrap();
    drop(stream);
    assert_eq!(client.state(), ConnectionState::Ready);

    client.execute("SELECT 1").await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn second_query_fails_with_concurrent_query() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        harness.read_query().await;
        // Keep the first query open until the client cancels it.
        harness.expect_cancel().await;
        harness.send_end_of_stream().await;
        harness
    });

    let stream = client.query_stream("SELECT 1").await.unwrap();
    drop(stream);
    assert_eq!(client.state(), ConnectionState::QueryActive);

    // The order violation is detected before any bytes are written.
    let err = client.query("SELECT 2").await.unwrap_err();
    assert!(matches!(err, Error::ConcurrentQuery));

    client.cancel().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn server_exception_surfaces_and_keeps_connection() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        harness.read_query().await;
        harness.send_exception(60, "Table default.missing does not exist").await;

        harness.read_query().await;
        harness.send_end_of_stream().await;
    });

    let err = client.query("SELECT * FROM missing").await.unwrap_err();
    match err {
        Error::Server(exception) => {
            assert_eq!(exception.code, 60);
            assert_eq!(exception.name, "DB::Exception");
            assert!(exception.message.contains("does not exist"));
        }
        other => panic!("expected a server error, got {other:?}"),
    }

    // A server exception is not a connection fault.
    assert_eq!(client.state(), ConnectionState::Ready);
    client.execute("SELECT 1").await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn ping_pong() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        harness.expect_ping().await;
        harness.send_pong().await;
    });

    client.ping().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn one_shot_insert_flow() {
    let (mut client, mut harness) =
        connect_pair(54467, CompressionMethod::None).await;

    let server = tokio::spawn(async move {
        let observed = harness.read_query().await;
        assert_eq!(observed.text, "INSERT INTO t (`id`, `name`) VALUES");

        // Schema negotiation: empty block from client, schema from server.
        let empty = harness.read_data_block().await;
        assert_eq!(empty.row_count(), 0);

        let mut schema = Block::new();
        schema
            .append_column(
                "id",
                clickhouse_tcp::io::create_column(
                    &clickhouse_tcp::Type::int32(),
                )
                .unwrap(),
            )
            .unwrap();
        schema
            .append_column(
                "name",
                clickhouse_tcp::io::create_column(
                    &clickhouse_tcp::Type::string(),
                )
                .unwrap(),
            )
            .unwrap();
        harness.send_data_block(&schema).await;

        let data = harness.read_data_block().await;
        assert_eq!(data.row_count(), 2);
        let terminal = harness.read_data_block().await;
        assert_eq!(terminal.row_count(), 0);

        harness.send_end_of_stream().await;
    });

    let mut ids = ColumnInt32::new();
    ids.append(10);
    ids.append(20);
    let mut names = ColumnString::new();
    names.append("ten");
    names.append("twenty");

    let mut block = Block::new();
    block.append_column("id", Arc::new(ids)).unwrap();
    block.append_column("name", Arc::new(names)).unwrap();

    client.insert("t", block).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);

    server.await.unwrap();
}
