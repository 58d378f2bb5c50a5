//! In-process mock server speaking enough of the wire protocol for the
//! integration tests: greeting, PING, REPLACE/SELECT against one in-memory
//! space, and CALL echoing its arguments back as a tuple.

use std::{
    collections::HashMap,
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    thread,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use rmpv::Value;

const REQUEST_TYPE: u64 = 0x00;
const SYNC: u64 = 0x01;
const SPACE_ID: u64 = 0x10;
const KEY: u64 = 0x20;
const TUPLE: u64 = 0x21;

const TYPE_SELECT: u64 = 1;
const TYPE_REPLACE: u64 = 3;
const TYPE_CALL: u64 = 10;
const TYPE_PING: u64 = 64;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().try_init();
}

#[derive(Clone, Copy, Default)]
pub struct MockBehavior {
    /// Collect this many pings, then answer them in reverse order.
    pub reorder_pings: usize,
}

pub struct MockServer {
    pub port: u16,
}

impl MockServer {
    pub fn start() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                thread::spawn(move || serve(stream, behavior));
            }
        });
        Self { port }
    }
}

fn serve(mut stream: TcpStream, behavior: MockBehavior) {
    stream.write_all(&greeting()).expect("send greeting");
    // space 512, keyed by the first tuple field
    let mut space: HashMap<String, Value> = HashMap::new();
    let mut parked_pings: Vec<u64> = Vec::new();
    loop {
        let mut prefix = [0u8; 5];
        if stream.read_exact(&mut prefix).is_err() {
            return;
        }
        assert_eq!(prefix[0], 0xce, "client sent a malformed frame prefix");
        let len = u32::from_be_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize;
        let mut frame = vec![0u8; len];
        if stream.read_exact(&mut frame).is_err() {
            return;
        }
        let mut rd = frame.as_slice();
        let header = rmpv::decode::read_value(&mut rd).expect("request header");
        let body = rmpv::decode::read_value(&mut rd).expect("request body");
        let request_type = map_uint(&header, REQUEST_TYPE).expect("request type");
        let sync = map_uint(&header, SYNC).expect("sync");

        let reply = match request_type {
            TYPE_PING => {
                if behavior.reorder_pings > 0 {
                    parked_pings.push(sync);
                    if parked_pings.len() == behavior.reorder_pings {
                        let mut out = Vec::new();
                        for s in parked_pings.drain(..).rev() {
                            out.extend(ok_frame(s, None));
                        }
                        out
                    } else {
                        continue;
                    }
                } else {
                    ok_frame(sync, None)
                }
            }
            TYPE_REPLACE => {
                assert_eq!(map_uint(&body, SPACE_ID), Some(512));
                let tuple = map_value(&body, TUPLE).expect("tuple");
                space.insert(tuple_key(&tuple), tuple.clone());
                ok_frame(sync, Some(vec![tuple]))
            }
            TYPE_SELECT => {
                assert_eq!(map_uint(&body, SPACE_ID), Some(512));
                let key = map_value(&body, KEY).expect("key");
                let matched = space.get(&tuple_key(&key)).cloned();
                ok_frame(sync, Some(matched.into_iter().collect()))
            }
            TYPE_CALL => {
                let args = map_value(&body, TUPLE).expect("args");
                ok_frame(sync, Some(vec![args]))
            }
            _ => ok_frame(sync, None),
        };
        if stream.write_all(&reply).is_err() {
            return;
        }
    }
}

fn greeting() -> [u8; 128] {
    let mut raw = [b' '; 128];
    let banner = b"Tarantool 2.10.0 (Binary) 00000000-0000-0000-0000-000000000000";
    raw[..banner.len()].copy_from_slice(banner);
    raw[63] = b'\n';
    let salt: Vec<u8> = (0u8..32).collect();
    let b64 = STANDARD.encode(salt);
    raw[64..64 + b64.len()].copy_from_slice(b64.as_bytes());
    raw[127] = b'\n';
    raw
}

/// First field of a key or tuple array, stringified for map lookup.
fn tuple_key(v: &Value) -> String {
    match v {
        Value::Array(items) => items.first().map(|x| x.to_string()).unwrap_or_default(),
        other => other.to_string(),
    }
}

fn map_uint(map: &Value, key: u64) -> Option<u64> {
    map_value(map, key).and_then(|v| v.as_u64())
}

fn map_value(map: &Value, key: u64) -> Option<Value> {
    let Value::Map(entries) = map else { return None };
    entries
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key))
        .map(|(_, v)| v.clone())
}

fn ok_frame(sync: u64, data: Option<Vec<Value>>) -> Vec<u8> {
    let mut payload = Vec::new();
    rmp::encode::write_map_len(&mut payload, 3).unwrap();
    rmp::encode::write_pfix(&mut payload, 0x00).unwrap();
    rmp::encode::write_uint(&mut payload, 0).unwrap();
    rmp::encode::write_pfix(&mut payload, 0x01).unwrap();
    rmp::encode::write_uint(&mut payload, sync).unwrap();
    rmp::encode::write_pfix(&mut payload, 0x05).unwrap();
    rmp::encode::write_uint(&mut payload, 1).unwrap();
    match data {
        Some(tuples) => {
            rmp::encode::write_map_len(&mut payload, 1).unwrap();
            rmp::encode::write_pfix(&mut payload, 0x30).unwrap();
            rmpv::encode::write_value(&mut payload, &Value::Array(tuples)).unwrap();
        }
        None => {
            rmp::encode::write_map_len(&mut payload, 0).unwrap();
        }
    }
    let mut out = vec![0xce];
    out.extend((payload.len() as u32).to_be_bytes());
    out.extend(payload);
    out
}
