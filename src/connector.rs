//! Connector: a single-threaded, caller-driven reactor over many
//! connections.
//!
//! The connector owns no threads. All progress happens inside
//! [`Connector::connect`] and the `wait*` methods, which run the poll loop
//! until the requested future arrives or the deadline passes. Sockets are
//! nonblocking; reads and writes go straight to and from the segmented
//! buffers via `readv`/`writev` over the buffers' own IO slices.

use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{
    buffer::DEFAULT_BLOCK_SIZE,
    codec::Greeting,
    connection::Connection,
    errors::Error,
};

/// Default deadline for `connect` and the `wait*` family.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// At most this many IO slices per readv/writev call.
const AVAILABLE_IOVEC_COUNT: usize = 32;

/// Bytes reserved in the inbound buffer ahead of each readv.
const READAHEAD: usize = DEFAULT_BLOCK_SIZE;

/// Reactor over a set of connections. One instance per thread; drive it
/// through `connect`/`wait`/`wait_all`/`wait_any`.
pub struct Connector {
    conns: Vec<Connection>,
    send_ready: Vec<Connection>,
    timeout: Duration,
}

impl Connector {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            conns: Vec::new(),
            send_ready: Vec::new(),
            timeout,
        }
    }

    /// Resolve `host:port`, establish a nonblocking TCP connection bounded
    /// by the default timeout, and consume the server greeting. On failure
    /// the connection's error slot describes what went wrong.
    pub fn connect(&mut self, conn: &Connection, host: &str, port: u16) -> Result<(), Error> {
        if conn.is_connected() {
            conn.set_error("Connection is already established", 0);
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "connection is already established",
            )
            .into());
        }
        debug!("Connecting to {}:{}", host, port);
        let sock = match self.open_socket(host, port) {
            Ok(sock) => sock,
            Err(e) => {
                conn.set_error(
                    format!("Failed to connect to {host}:{port}: {e}"),
                    e.raw_os_error().unwrap_or(0),
                );
                return Err(e.into());
            }
        };
        {
            let mut impl_ = conn.inner.borrow_mut();
            impl_.sock = Some(sock);
            impl_.error = None;
        }
        if !self.conns.contains(conn) {
            self.conns.push(conn.clone());
        }

        // The greeting must arrive before anything is decoded.
        let deadline = Instant::now() + self.timeout;
        loop {
            let have = {
                let impl_ = conn.inner.borrow();
                impl_.in_buf.has(&impl_.end_decoded, Greeting::SIZE)
            };
            if have {
                break;
            }
            if !conn.is_connected() {
                self.detach(conn);
                return Err(Error::NotConnected);
            }
            let now = Instant::now();
            if now >= deadline {
                conn.set_error("Timed out waiting for server greeting", 0);
                self.detach_and_close(conn);
                return Err(Error::Timeout);
            }
            self.step(deadline - now)?;
        }
        if let Err(e) = conn.inner.borrow_mut().decode_greeting() {
            conn.set_error(format!("Failed to parse greeting: {e}"), 0);
            self.detach_and_close(conn);
            return Err(e);
        }
        // Response frames may arrive glued to the greeting (the caller is
        // free to encode requests before connecting). Deliver anything
        // already buffered now: the socket is drained, so no POLLIN will
        // fire for these bytes again.
        let drained = conn.inner.borrow_mut().drain_decoded();
        if let Err(e) = drained {
            conn.set_error(format!("{e}"), 0);
            self.detach_and_close(conn);
            return Err(e);
        }
        trace!("Connection to {}:{} is ready", host, port);
        Ok(())
    }

    fn open_socket(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let addrs = (host, port).to_socket_addrs()?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(sock) => {
                    sock.set_nonblocking(true)?;
                    return Ok(sock);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
        }))
    }

    /// Run the reactor until the future `sync` is ready on `conn`.
    pub fn wait(
        &mut self,
        conn: &Connection,
        sync: u64,
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        self.wait_all(conn, &[sync], timeout)
    }

    /// Run the reactor until every listed future is ready on `conn`.
    pub fn wait_all(
        &mut self,
        conn: &Connection,
        syncs: &[u64],
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        let deadline = Instant::now() + timeout.unwrap_or(self.timeout);
        loop {
            if syncs.iter().all(|s| conn.future_is_ready(*s)) {
                return Ok(());
            }
            if !conn.is_connected() {
                if conn.error().is_none() {
                    conn.set_error("Connection is not established", 0);
                }
                return Err(Error::NotConnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            self.step(deadline - now)?;
        }
    }

    /// Run the reactor until any attached connection holds at least one
    /// ready future; returns that connection.
    pub fn wait_any(&mut self, timeout: Option<Duration>) -> Result<Connection, Error> {
        let deadline = Instant::now() + timeout.unwrap_or(self.timeout);
        loop {
            if let Some(ready) = self
                .conns
                .iter()
                .find(|c| !c.inner.borrow().futures.is_empty())
            {
                return Ok(ready.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            self.step(deadline - now)?;
        }
    }

    /// Close the socket and detach the connection from the reactor.
    /// Futures already delivered stay readable until drained.
    pub fn close(&mut self, conn: &Connection) {
        debug!("Closing connection {:?}", conn);
        self.detach_and_close(conn);
    }

    fn detach(&mut self, conn: &Connection) {
        self.conns.retain(|c| c != conn);
        self.send_ready.retain(|c| c != conn);
    }

    fn detach_and_close(&mut self, conn: &Connection) {
        conn.inner.borrow_mut().sock = None;
        self.detach(conn);
    }

    /// Register a connection for the next write pass. Invoked by the poll
    /// loop for every attached connection with pending outbound bytes.
    fn ready_to_send(&mut self, conn: &Connection) {
        if !self.send_ready.contains(conn) {
            self.send_ready.push(conn.clone());
        }
    }

    /// One reactor turn: poll every attached socket, then service the
    /// readable and writable ones. Sleeps inside `poll` for at most
    /// `timeout` when nothing is ready.
    fn step(&mut self, timeout: Duration) -> Result<(), Error> {
        let pending: Vec<Connection> = self
            .conns
            .iter()
            .filter(|c| c.inner.borrow().has_data_to_send())
            .cloned()
            .collect();
        for conn in &pending {
            self.ready_to_send(conn);
        }

        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(self.conns.len());
        let mut polled: Vec<Connection> = Vec::with_capacity(self.conns.len());
        for conn in &self.conns {
            let impl_ = conn.inner.borrow();
            let Some(fd) = impl_.fd() else { continue };
            let mut events = libc::POLLIN;
            if self.send_ready.contains(conn) {
                events |= libc::POLLOUT;
            }
            fds.push(libc::pollfd {
                fd,
                events,
                revents: 0,
            });
            polled.push(conn.clone());
        }

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        // SAFETY: `fds` is a valid array of initialized pollfd structs for
        // the duration of the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err.into());
        }
        if rc == 0 {
            return Ok(());
        }

        for (pfd, conn) in fds.iter().zip(&polled) {
            if pfd.revents & libc::POLLOUT != 0 {
                self.write_pending(conn);
            }
            if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                self.read_and_decode(conn);
            }
        }
        self.send_ready
            .retain(|c| c.inner.borrow().has_data_to_send());
        Ok(())
    }

    /// Flush outbound bytes. Partial writes leave the rest in the buffer
    /// (and the connection in the send set).
    fn write_pending(&self, conn: &Connection) {
        loop {
            let mut impl_ = conn.inner.borrow_mut();
            if !impl_.has_data_to_send() {
                return;
            }
            let Some(fd) = impl_.fd() else { return };
            let (written, write_err) = {
                let begin = impl_.out_buf.begin();
                impl_
                    .out_buf
                    .with_iov(&begin, AVAILABLE_IOVEC_COUNT, |vecs| {
                        // SAFETY: IoSlice is ABI-compatible with iovec and
                        // the slices stay borrowed for the whole call.
                        let n = unsafe {
                            libc::writev(
                                fd,
                                vecs.as_ptr() as *const libc::iovec,
                                vecs.len() as libc::c_int,
                            )
                        };
                        let err = (n < 0).then(io::Error::last_os_error);
                        (n, err)
                    })
            };
            if written < 0 {
                let err = write_err.unwrap_or_else(io::Error::last_os_error);
                match err.kind() {
                    io::ErrorKind::WouldBlock => return,
                    io::ErrorKind::Interrupted => continue,
                    _ => {
                        warn!("Write failed: {}", err);
                        impl_.set_error(
                            format!("Failed to send requests: {err}"),
                            err.raw_os_error().unwrap_or(0),
                        );
                        impl_.sock = None;
                        return;
                    }
                }
            }
            if written == 0 {
                return;
            }
            trace!("Sent {} bytes", written);
            impl_.out_buf.drop_front(written as usize);
        }
    }

    /// Pull everything the socket has into the inbound buffer and advance
    /// the decoder. Responses are parsed only once the greeting has been.
    fn read_and_decode(&self, conn: &Connection) {
        loop {
            let mut impl_ = conn.inner.borrow_mut();
            let Some(fd) = impl_.fd() else { return };
            let reserved = match impl_.in_buf.append_back(READAHEAD) {
                Ok(it) => it,
                Err(e) => {
                    impl_.set_error(format!("Failed to grow inbound buffer: {e}"), 0);
                    impl_.sock = None;
                    return;
                }
            };
            let (nread, read_err) = impl_
                .in_buf
                .with_iov_mut(&reserved, AVAILABLE_IOVEC_COUNT, |vecs| {
                    // SAFETY: IoSliceMut is ABI-compatible with iovec and
                    // addresses only the bytes reserved above.
                    let n = unsafe {
                        libc::readv(
                            fd,
                            vecs.as_mut_ptr() as *mut libc::iovec,
                            vecs.len() as libc::c_int,
                        )
                    };
                    let err = (n < 0).then(io::Error::last_os_error);
                    (n, err)
                });
            drop(reserved);
            if nread < 0 {
                impl_.in_buf.drop_back(READAHEAD);
                let err = read_err.unwrap_or_else(io::Error::last_os_error);
                match err.kind() {
                    io::ErrorKind::WouldBlock => return,
                    io::ErrorKind::Interrupted => continue,
                    _ => {
                        warn!("Read failed: {}", err);
                        impl_.set_error(
                            format!("Failed to receive responses: {err}"),
                            err.raw_os_error().unwrap_or(0),
                        );
                        impl_.sock = None;
                        return;
                    }
                }
            }
            if nread == 0 {
                impl_.in_buf.drop_back(READAHEAD);
                debug!("Connection closed by peer");
                impl_.set_error("Connection closed by peer", 0);
                impl_.sock = None;
                return;
            }
            impl_.in_buf.drop_back(READAHEAD - nread as usize);
            trace!("Received {} bytes", nread);

            if impl_.greeting.is_some() {
                if let Err(e) = impl_.drain_decoded() {
                    warn!("Unrecoverable decode failure: {}", e);
                    impl_.set_error(format!("{e}"), 0);
                    impl_.sock = None;
                    return;
                }
            }
            if (nread as usize) < READAHEAD {
                return;
            }
        }
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}
