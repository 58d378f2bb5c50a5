//! Single-threaded multiplexing client for the Tarantool binary protocol.
//!
//! Requests are encoded straight into a segmented outbound buffer and
//! identified by a monotonically growing sync id (the *future*); a
//! caller-driven reactor ([`Connector`]) moves bytes with scatter/gather IO
//! and parks decoded responses in each connection's futures map. There are
//! no background threads: progress happens only inside
//! [`Connector::connect`] and the `wait*` methods.
//!
//! ```no_run
//! use tarantool_mux::{Connection, Connector, IteratorType};
//!
//! let mut client = Connector::new();
//! let conn = Connection::new();
//! client.connect(&conn, "127.0.0.1", 3301)?;
//!
//! let ping = conn.ping()?;
//! client.wait(&conn, ping, None)?;
//! let response = conn.get_response(ping).expect("future is ready");
//! assert_eq!(response.header.code, 0);
//!
//! let select = conn.space(512).index(0).select((666,), 1, 0, IteratorType::Eq)?;
//! client.wait(&conn, select, None)?;
//! for tuple in conn.get_response(select).expect("future is ready").tuples() {
//!     println!("{}", tuple.value()?);
//! }
//! client.close(&conn);
//! # Ok::<(), tarantool_mux::Error>(())
//! ```

pub use rmpv::Value;

pub use self::{
    alloc::{Allocator, HeapAllocator},
    buffer::{BufIter, BufVal, Buffer, DEFAULT_BLOCK_SIZE},
    codec::{
        consts::IteratorType,
        encode::{as_fixed, AsArr, AsBin, AsExt, AsFixTag, AsFixed, AsMap, AsRaw, AsStr, Encode},
        response::{Data, ProtoError, ResponseBody, ResponseHeader},
        ByteRange, Greeting,
    },
    connection::{Connection, Index, Response, Space},
    connector::{Connector, DEFAULT_TIMEOUT},
    errors::{ConnError, DecodingError, EncodingError, Error, OutOfMemory},
};

mod alloc;
mod buffer;
pub mod codec;
mod connection;
mod connector;
mod errors;
