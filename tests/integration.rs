use std::time::Duration;

use rmpv::Value;
use tarantool_mux::{Connection, Connector, IteratorType};

use crate::common::{init_logging, MockBehavior, MockServer};

mod common;

const WAIT_TIMEOUT: Duration = Duration::from_millis(1000);

fn connect(client: &mut Connector, server: &MockServer) -> Connection {
    let conn = Connection::new();
    client
        .connect(&conn, "127.0.0.1", server.port)
        .expect("connect to mock server");
    conn
}

#[test]
fn trivial() {
    init_logging();
    let mut client = Connector::new();
    let conn = Connection::new();
    // Nonexistent future.
    assert!(conn.get_response(666).is_none());
    // Request without connecting to a host: the wait fails and the error
    // slot explains why.
    let f = conn.ping().unwrap();
    let res = client.wait(&conn, f, Some(Duration::from_millis(100)));
    assert!(res.is_err());
    assert!(!conn.error().unwrap().msg.is_empty());
}

#[test]
fn request_encoded_before_connect_is_delivered() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn = Connection::new();
    // Encoding does not require an established socket; the request goes
    // out once the connection is up, even if its response arrives glued
    // to the greeting.
    let f = conn.ping().unwrap();
    client
        .connect(&conn, "127.0.0.1", server.port)
        .expect("connect to mock server");
    client.wait(&conn, f, Some(WAIT_TIMEOUT)).unwrap();
    let response = conn.get_response(f).unwrap();
    assert_eq!(response.header.code, 0);
    client.close(&conn);
}

#[test]
fn single_conn_ping() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn = connect(&mut client, &server);
    assert!(conn.greeting().is_some());
    assert!(conn.greeting().unwrap().version.starts_with("Tarantool"));

    let f = conn.ping().unwrap();
    assert!(!conn.future_is_ready(f));
    client.wait(&conn, f, Some(WAIT_TIMEOUT)).unwrap();
    assert!(conn.future_is_ready(f));
    let response = conn.get_response(f).unwrap();
    assert_eq!(response.header.code, 0);
    assert!(response.tuples().is_empty());

    let f = conn.ping().unwrap();
    client.wait(&conn, f, Some(WAIT_TIMEOUT)).unwrap();
    assert!(conn.future_is_ready(f));
    // Second wait terminates immediately.
    client.wait(&conn, f, Some(WAIT_TIMEOUT)).unwrap();
    let response = conn.get_response(f).unwrap();
    assert_eq!(response.header.code, 0);
    assert!(response.body.error_stack.is_none());
    client.close(&conn);
}

#[test]
fn parallel_pings_drained_by_wait_all() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn = connect(&mut client, &server);

    let futures = [
        conn.ping().unwrap(),
        conn.ping().unwrap(),
        conn.ping().unwrap(),
    ];
    client.wait_all(&conn, &futures, Some(WAIT_TIMEOUT)).unwrap();
    for f in futures {
        assert!(conn.future_is_ready(f));
        let response = conn.get_response(f).unwrap();
        assert_eq!(response.header.code, 0);
        assert!(response.body.error_stack.is_none());
    }
    client.close(&conn);
}

#[test]
fn out_of_order_responses_match_by_sync() {
    init_logging();
    let server = MockServer::with_behavior(MockBehavior { reorder_pings: 3 });
    let mut client = Connector::new();
    let conn = connect(&mut client, &server);

    let futures = [
        conn.ping().unwrap(),
        conn.ping().unwrap(),
        conn.ping().unwrap(),
    ];
    client.wait_all(&conn, &futures, Some(WAIT_TIMEOUT)).unwrap();
    for f in futures {
        let response = conn.get_response(f).unwrap();
        assert_eq!(response.header.sync, f);
    }
    client.close(&conn);
}

#[test]
fn replace_then_select() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn = connect(&mut client, &server);

    let space_id = 512;
    let replace = conn.replace(space_id, (666u64, "111", 1.0f64)).unwrap();
    let select = conn
        .select(space_id, 0, 1, 0, IteratorType::Eq, (666u64,))
        .unwrap();
    client
        .wait_all(&conn, &[replace, select], Some(WAIT_TIMEOUT))
        .unwrap();

    let response = conn.get_response(replace).unwrap();
    assert!(response.body.data.is_some());
    assert!(response.body.error_stack.is_none());

    let response = conn.get_response(select).unwrap();
    let tuples = response.decode_tuples().unwrap();
    assert_eq!(tuples.len(), 1);
    assert_eq!(
        tuples[0],
        Value::Array(vec![666u64.into(), "111".into(), 1.0f64.into()])
    );
    client.close(&conn);
}

#[test]
fn select_missing_key_returns_empty_data() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn = connect(&mut client, &server);

    let f = conn
        .space(512)
        .index(0)
        .select((424242u64,), 1, 0, IteratorType::Eq)
        .unwrap();
    client.wait(&conn, f, Some(WAIT_TIMEOUT)).unwrap();
    let response = conn.get_response(f).unwrap();
    assert!(response.body.data.is_some());
    assert!(response.tuples().is_empty());
    client.close(&conn);
}

#[test]
fn call_roundtrips_arguments() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn = connect(&mut client, &server);

    let f = conn
        .call("remote_procedure", (1u64, "x", 2.5f64))
        .unwrap();
    client.wait(&conn, f, Some(WAIT_TIMEOUT)).unwrap();
    let response = conn.get_response(f).unwrap();
    let tuples = response.decode_tuples().unwrap();
    assert_eq!(
        tuples[0],
        Value::Array(vec![1u64.into(), "x".into(), 2.5f64.into()])
    );
    client.close(&conn);
}

#[test]
fn many_connections_wait_any() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn1 = connect(&mut client, &server);
    let conn2 = connect(&mut client, &server);
    let conn3 = connect(&mut client, &server);

    // Re-connecting an established connection is refused.
    assert!(client.connect(&conn2, "127.0.0.1", server.port).is_err());
    conn2.reset();

    let f1 = conn1.ping().unwrap();
    let f2 = conn2.ping().unwrap();
    let f3 = conn3.ping().unwrap();
    let first = client.wait_any(Some(WAIT_TIMEOUT)).unwrap();
    assert!(
        conn1.future_is_ready(f1) || conn2.future_is_ready(f2) || conn3.future_is_ready(f3)
    );
    assert!(first == conn1 || first == conn2 || first == conn3);
    client.close(&conn1);
    client.close(&conn2);
    client.close(&conn3);
}

#[test]
fn futures_survive_close_until_drained() {
    init_logging();
    let server = MockServer::start();
    let mut client = Connector::new();
    let conn = connect(&mut client, &server);

    let f = conn.ping().unwrap();
    client.wait(&conn, f, Some(WAIT_TIMEOUT)).unwrap();
    client.close(&conn);
    assert!(!conn.is_connected());
    assert!(conn.future_is_ready(f));
    assert_eq!(conn.get_response(f).unwrap().header.code, 0);
}
