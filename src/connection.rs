//! Connection: per-socket state and the request surface.
//!
//! A [`Connection`] is a cheap shared handle over the per-socket state, so
//! copies alias one another and can serve as keys in ordered or hashed
//! containers (ordering follows the socket fd, equality the handle
//! identity). The state owns the inbound/outbound buffers, the futures map
//! keyed by sync, the greeting and the error slot.

use std::{
    borrow::Cow,
    cell::RefCell,
    cmp::Ordering,
    collections::HashMap,
    hash::{Hash, Hasher},
    net::TcpStream,
    os::fd::{AsRawFd, RawFd},
    rc::Rc,
};

use tracing::{debug, trace};

use crate::{
    buffer::{BufIter, Buffer, DEFAULT_BLOCK_SIZE},
    codec::{
        consts::{IteratorType, MP_RESPONSE_SIZE},
        decode::Cur,
        encode::Encode,
        request::{
            encode_request, Call, Delete, Eval, Insert, Ping, Replace, RequestBody, Select,
            Update, Upsert,
        },
        response::{decode_response, decode_response_size, DecodeStatus},
        Greeting,
    },
    errors::{ConnError, Error},
};

/// Buffers of the protocol layer use the production block size.
pub(crate) type IoBuffer = Buffer<DEFAULT_BLOCK_SIZE>;
pub(crate) type IoBufIter = BufIter<DEFAULT_BLOCK_SIZE>;

/// Response with the production block size.
pub type Response = crate::codec::response::Response<DEFAULT_BLOCK_SIZE>;

/// Inbound-buffer GC runs every this many delivered frames.
const GC_STEP_CNT: u32 = 100;

pub(crate) struct ConnectionImpl {
    // Field order doubles as drop order: futures pin tuple ranges and
    // end_decoded points into in_buf, so both must go before the buffers.
    pub(crate) futures: HashMap<u64, Response>,
    pub(crate) end_decoded: IoBufIter,
    pub(crate) error: Option<ConnError>,
    pub(crate) greeting: Option<Greeting>,
    gc_step: u32,
    pub(crate) sock: Option<TcpStream>,
    pub(crate) in_buf: IoBuffer,
    pub(crate) out_buf: IoBuffer,
}

impl ConnectionImpl {
    fn new() -> Self {
        let in_buf = IoBuffer::new();
        let end_decoded = in_buf.begin();
        Self {
            futures: HashMap::new(),
            end_decoded,
            error: None,
            greeting: None,
            gc_step: 0,
            sock: None,
            in_buf,
            out_buf: IoBuffer::new(),
        }
    }

    pub(crate) fn set_error(&mut self, msg: impl Into<String>, saved_errno: i32) {
        self.error = Some(ConnError::new(msg, saved_errno));
    }

    pub(crate) fn fd(&self) -> Option<RawFd> {
        self.sock.as_ref().map(|s| s.as_raw_fd())
    }

    /// The outbound buffer is dropped as bytes hit the wire, so emptiness
    /// is the send-pending check.
    pub(crate) fn has_data_to_send(&self) -> bool {
        !self.out_buf.is_empty()
    }

    pub(crate) fn has_data_to_decode(&self) -> bool {
        self.end_decoded != self.in_buf.end()
    }

    /// Parse the greeting from the first bytes of the inbound stream.
    pub(crate) fn decode_greeting(&mut self) -> Result<(), Error> {
        debug_assert!(self.in_buf.has(&self.end_decoded, Greeting::SIZE));
        let mut raw = [0u8; Greeting::SIZE];
        self.in_buf.get(&self.end_decoded, &mut raw);
        let greeting = Greeting::decode(raw)?;
        self.end_decoded.advance(Greeting::SIZE);
        debug!("Server: {}", greeting.version);
        trace!("Salt: {:?}", greeting.salt);
        self.greeting = Some(greeting);
        Ok(())
    }

    /// Try to decode one frame past `end_decoded` and deliver it into the
    /// futures map.
    ///
    /// `Ok(NeedMore)` leaves the decode position at the frame start so the
    /// call is re-entrant once more bytes arrive. `Ok(Error)` means the
    /// frame body was bad: the error slot is set and the frame is skipped,
    /// keeping later frames decodable. `Err(_)` means the stream itself is
    /// unrecoverable.
    pub(crate) fn process_response(&mut self) -> Result<DecodeStatus, Error> {
        if !self.in_buf.has(&self.end_decoded, MP_RESPONSE_SIZE) {
            return Ok(DecodeStatus::NeedMore);
        }
        let mut cur = Cur::new(&self.in_buf, self.end_decoded.clone());
        let size = decode_response_size(&mut cur)?;
        if !self.in_buf.has(&self.end_decoded, MP_RESPONSE_SIZE + size) {
            return Ok(DecodeStatus::NeedMore);
        }
        let status = match decode_response(&mut cur, size) {
            Ok(response) => {
                trace!(
                    "Header: sync={}, code={}, schema={}",
                    response.header.sync,
                    response.header.code,
                    response.header.schema_id
                );
                self.futures.insert(response.header.sync, response);
                DecodeStatus::Success
            }
            Err(e) => {
                self.error = Some(ConnError::new(
                    format!("Failed to decode response, skipping frame: {e}"),
                    0,
                ));
                DecodeStatus::Error
            }
        };
        drop(cur);
        self.end_decoded.advance(MP_RESPONSE_SIZE + size);
        self.input_buf_gc();
        Ok(status)
    }

    /// Deliver every fully buffered frame into the futures map, stopping
    /// at the first partial one.
    pub(crate) fn drain_decoded(&mut self) -> Result<(), Error> {
        while self.has_data_to_decode() {
            match self.process_response()? {
                DecodeStatus::Success | DecodeStatus::Error => continue,
                DecodeStatus::NeedMore => break,
            }
        }
        Ok(())
    }

    fn input_buf_gc(&mut self) {
        self.gc_step += 1;
        if self.gc_step % GC_STEP_CNT == 0 {
            debug!("Flushing input buffer of the connection");
            self.in_buf.flush();
        }
    }
}

/// Shared handle over one connection's state.
pub struct Connection {
    pub(crate) inner: Rc<RefCell<ConnectionImpl>>,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ConnectionImpl::new())),
        }
    }

    fn request<B: RequestBody>(&self, body: &B) -> Result<u64, Error> {
        let mut impl_ = self.inner.borrow_mut();
        let sync = encode_request(&mut impl_.out_buf, body)?;
        Ok(sync)
    }

    /// PING. Returns the future id.
    pub fn ping(&self) -> Result<u64, Error> {
        self.request(&Ping {})
    }

    /// SELECT. `key` must encode as a MessagePack array of key parts.
    pub fn select<K: Encode>(
        &self,
        space_id: u32,
        index_id: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: K,
    ) -> Result<u64, Error> {
        self.request(&Select {
            space_id,
            index_id,
            limit,
            offset,
            iterator,
            key,
        })
    }

    pub fn insert<T: Encode>(&self, space_id: u32, tuple: T) -> Result<u64, Error> {
        self.request(&Insert { space_id, tuple })
    }

    pub fn replace<T: Encode>(&self, space_id: u32, tuple: T) -> Result<u64, Error> {
        self.request(&Replace { space_id, tuple })
    }

    pub fn update<K: Encode, O: Encode>(
        &self,
        space_id: u32,
        index_id: u32,
        key: K,
        ops: O,
    ) -> Result<u64, Error> {
        self.request(&Update {
            space_id,
            index_id,
            key,
            ops,
        })
    }

    pub fn delete<K: Encode>(&self, space_id: u32, index_id: u32, key: K) -> Result<u64, Error> {
        self.request(&Delete {
            space_id,
            index_id,
            key,
        })
    }

    pub fn upsert<T: Encode, O: Encode>(
        &self,
        space_id: u32,
        index_base: u32,
        tuple: T,
        ops: O,
    ) -> Result<u64, Error> {
        self.request(&Upsert {
            space_id,
            index_base,
            tuple,
            ops,
        })
    }

    /// CALL a server-side function. `args` must encode as an array.
    pub fn call<A: Encode>(
        &self,
        function_name: impl Into<Cow<'static, str>>,
        args: A,
    ) -> Result<u64, Error> {
        self.request(&Call {
            function_name: function_name.into(),
            args,
        })
    }

    /// EVAL a Lua expression on the server.
    pub fn eval<A: Encode>(
        &self,
        expr: impl Into<Cow<'static, str>>,
        args: A,
    ) -> Result<u64, Error> {
        self.request(&Eval {
            expr: expr.into(),
            args,
        })
    }

    pub fn future_is_ready(&self, sync: u64) -> bool {
        self.inner.borrow().futures.contains_key(&sync)
    }

    /// Remove and return the response for `sync`, if it has arrived.
    /// Callers are expected to check [`Connection::future_is_ready`] first;
    /// an absent future is reported as `None` rather than trapping.
    pub fn get_response(&self, sync: u64) -> Option<Response> {
        self.inner.borrow_mut().futures.remove(&sync)
    }

    /// Forget every pending future.
    pub fn flush(&self) {
        self.inner.borrow_mut().futures.clear();
    }

    /// Clear the error slot.
    pub fn reset(&self) {
        self.inner.borrow_mut().error = None;
    }

    pub fn error(&self) -> Option<ConnError> {
        self.inner.borrow().error.clone()
    }

    pub fn greeting(&self) -> Option<Greeting> {
        self.inner.borrow().greeting.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.borrow().sock.is_some()
    }

    pub(crate) fn set_error(&self, msg: impl Into<String>, saved_errno: i32) {
        self.inner.borrow_mut().set_error(msg, saved_errno);
    }

    fn fd(&self) -> RawFd {
        self.inner.borrow().fd().unwrap_or(-1)
    }

    /// Space sugar: `conn.space(sid).replace(...)`,
    /// `conn.space(sid).index(iid).select(...)`.
    pub fn space(&self, space_id: u32) -> Space {
        Space {
            conn: self.clone(),
            space_id,
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl PartialOrd for Connection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Connection {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fd().cmp(&other.fd())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let impl_ = self.inner.borrow();
        f.debug_struct("Connection")
            .field("fd", &impl_.fd())
            .field("pending_futures", &impl_.futures.len())
            .field("error", &impl_.error)
            .finish()
    }
}

/// Transient space-scoped view of a connection.
#[derive(Clone)]
pub struct Space {
    conn: Connection,
    space_id: u32,
}

impl Space {
    pub fn index(&self, index_id: u32) -> Index {
        Index {
            conn: self.conn.clone(),
            space_id: self.space_id,
            index_id,
        }
    }

    pub fn insert<T: Encode>(&self, tuple: T) -> Result<u64, Error> {
        self.conn.insert(self.space_id, tuple)
    }

    pub fn replace<T: Encode>(&self, tuple: T) -> Result<u64, Error> {
        self.conn.replace(self.space_id, tuple)
    }

    pub fn delete<K: Encode>(&self, key: K) -> Result<u64, Error> {
        self.conn.delete(self.space_id, 0, key)
    }

    pub fn update<K: Encode, O: Encode>(&self, key: K, ops: O) -> Result<u64, Error> {
        self.conn.update(self.space_id, 0, key, ops)
    }

    pub fn upsert<T: Encode, O: Encode>(&self, tuple: T, ops: O) -> Result<u64, Error> {
        self.conn.upsert(self.space_id, 0, tuple, ops)
    }

    pub fn select<K: Encode>(
        &self,
        key: K,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
    ) -> Result<u64, Error> {
        self.conn
            .select(self.space_id, 0, limit, offset, iterator, key)
    }
}

/// Transient index-scoped view of a space.
#[derive(Clone)]
pub struct Index {
    conn: Connection,
    space_id: u32,
    index_id: u32,
}

impl Index {
    pub fn delete<K: Encode>(&self, key: K) -> Result<u64, Error> {
        self.conn.delete(self.space_id, self.index_id, key)
    }

    pub fn update<K: Encode, O: Encode>(&self, key: K, ops: O) -> Result<u64, Error> {
        self.conn.update(self.space_id, self.index_id, key, ops)
    }

    pub fn select<K: Encode>(
        &self,
        key: K,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
    ) -> Result<u64, Error> {
        self.conn
            .select(self.space_id, self.index_id, limit, offset, iterator, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(conn: &Connection, bytes: &[u8]) {
        conn.inner.borrow_mut().in_buf.add_back(bytes).unwrap();
    }

    fn ok_frame(sync: u64) -> Vec<u8> {
        let mut buf: IoBuffer = IoBuffer::new();
        buf.add_back(&[0xce]).unwrap();
        let len_at = buf.append_back(4).unwrap();
        let begin = buf.end();
        {
            let mut enc = crate::codec::encode::Encoder::new(&mut buf);
            enc.encode_map_len(2).unwrap();
            enc.encode_uint(0).unwrap();
            enc.encode_uint(0).unwrap();
            enc.encode_uint(1).unwrap();
            enc.encode_uint(sync).unwrap();
            enc.encode_map_len(0).unwrap();
        }
        let total = begin.offset_to(&buf.end());
        buf.set(&len_at, &(total as u32).to_be_bytes());
        let mut out = vec![0u8; buf.len()];
        buf.get(&buf.begin(), &mut out);
        out
    }

    #[test]
    fn request_methods_fill_outbound_buffer() {
        let conn = Connection::new();
        assert!(!conn.inner.borrow().has_data_to_send());
        let a = conn.ping().unwrap();
        let b = conn.replace(512, (666u64, "111", 1.0f64)).unwrap();
        assert!(b > a);
        assert!(conn.inner.borrow().has_data_to_send());
    }

    #[test]
    fn responses_deliver_to_matching_futures_once() {
        let conn = Connection::new();
        feed(&conn, &ok_frame(5));
        feed(&conn, &ok_frame(3));
        {
            let mut impl_ = conn.inner.borrow_mut();
            assert_eq!(impl_.process_response().unwrap(), DecodeStatus::Success);
            assert_eq!(impl_.process_response().unwrap(), DecodeStatus::Success);
            assert_eq!(impl_.process_response().unwrap(), DecodeStatus::NeedMore);
        }
        assert!(conn.future_is_ready(5));
        assert!(conn.future_is_ready(3));
        let resp = conn.get_response(3).unwrap();
        assert_eq!(resp.header.sync, 3);
        assert!(conn.get_response(3).is_none());
        assert!(conn.get_response(999).is_none());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let conn = Connection::new();
        let frame = ok_frame(9);
        feed(&conn, &frame[..frame.len() - 2]);
        {
            let mut impl_ = conn.inner.borrow_mut();
            assert_eq!(impl_.process_response().unwrap(), DecodeStatus::NeedMore);
        }
        feed(&conn, &frame[frame.len() - 2..]);
        {
            let mut impl_ = conn.inner.borrow_mut();
            assert_eq!(impl_.process_response().unwrap(), DecodeStatus::Success);
        }
        assert!(conn.future_is_ready(9));
    }

    #[test]
    fn frames_glued_to_greeting_are_delivered() {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let conn = Connection::new();
        let mut raw = [b' '; Greeting::SIZE];
        raw[..9].copy_from_slice(b"Tarantool");
        raw[63] = b'\n';
        let b64 = STANDARD.encode([0u8; 32]);
        raw[64..64 + b64.len()].copy_from_slice(b64.as_bytes());
        raw[127] = b'\n';
        // Greeting and a complete response land in one read.
        feed(&conn, &raw);
        feed(&conn, &ok_frame(4));
        {
            let mut impl_ = conn.inner.borrow_mut();
            impl_.decode_greeting().unwrap();
            impl_.drain_decoded().unwrap();
        }
        assert!(conn.future_is_ready(4));
    }

    #[test]
    fn corrupt_body_skips_frame_but_stream_recovers() {
        let conn = Connection::new();
        let mut bad = ok_frame(1);
        // Overwrite the header map marker with a string marker: body decode
        // fails but the frame length stays intact.
        bad[5] = 0xa1;
        feed(&conn, &bad);
        feed(&conn, &ok_frame(2));
        {
            let mut impl_ = conn.inner.borrow_mut();
            assert_eq!(impl_.process_response().unwrap(), DecodeStatus::Error);
            assert!(impl_.error.is_some());
            assert_eq!(impl_.process_response().unwrap(), DecodeStatus::Success);
        }
        assert!(!conn.future_is_ready(1));
        assert!(conn.future_is_ready(2));
    }

    #[test]
    fn corrupt_length_marker_is_unrecoverable() {
        let conn = Connection::new();
        feed(&conn, &[0x00, 1, 2, 3, 4, 5]);
        let mut impl_ = conn.inner.borrow_mut();
        assert!(matches!(impl_.process_response(), Err(Error::Protocol(_))));
    }

    #[test]
    fn flush_and_reset() {
        let conn = Connection::new();
        feed(&conn, &ok_frame(7));
        conn.inner.borrow_mut().process_response().unwrap();
        assert!(conn.future_is_ready(7));
        conn.flush();
        assert!(!conn.future_is_ready(7));
        conn.set_error("boom", 0);
        assert!(conn.error().is_some());
        conn.reset();
        assert!(conn.error().is_none());
    }

    #[test]
    fn connections_alias_and_compare_by_handle() {
        let a = Connection::new();
        let b = a.clone();
        let c = Connection::new();
        assert_eq!(a, b);
        assert_ne!(a, c);
        let _ = a.ping().unwrap();
        assert!(b.inner.borrow().has_data_to_send());
        let mut set = std::collections::HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn space_sugar_forwards() {
        let conn = Connection::new();
        let sync = conn
            .space(512)
            .index(0)
            .select((666u64,), 1, 0, IteratorType::Eq)
            .unwrap();
        assert!(conn.inner.borrow().has_data_to_send());
        let _ = sync;
    }
}
