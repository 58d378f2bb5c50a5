//! Response frame decoder.
//!
//! Frames arrive as `0xce <u32be length> <header map> <body map>`. The
//! decoder separates transport concerns (is the whole frame buffered?) from
//! body parsing, and never interprets tuple contents: each tuple in a DATA
//! body is pinned as a [`ByteRange`] for deferred decoding by the caller.

use tracing::{debug, trace};

use crate::{
    buffer::DEFAULT_BLOCK_SIZE,
    codec::{
        consts::{error_fields, keys, MP_RESPONSE_SIZE},
        decode::{Cur, ReadError},
        ByteRange,
    },
    errors::{DecodingError, Error},
};

/// Outcome of one decode attempt over the inbound buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    Success,
    NeedMore,
    Error,
}

#[derive(Clone, Debug, Default)]
pub struct ResponseHeader {
    pub sync: u64,
    /// 0 means OK and a DATA body; nonzero carries an error body.
    pub code: u32,
    pub schema_id: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Data<const N: usize = DEFAULT_BLOCK_SIZE> {
    pub tuples: Vec<ByteRange<N>>,
}

/// One entry of the server error stack.
#[derive(Clone, Debug, Default)]
pub struct ProtoError {
    pub code: u32,
    pub msg: String,
    pub file: String,
    pub line: u32,
    pub saved_errno: i32,
    pub type_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct ResponseBody<const N: usize = DEFAULT_BLOCK_SIZE> {
    pub data: Option<Data<N>>,
    /// Legacy single-message error.
    pub error_24: Option<String>,
    pub error_stack: Option<Vec<ProtoError>>,
}

#[derive(Clone, Debug)]
pub struct Response<const N: usize = DEFAULT_BLOCK_SIZE> {
    pub header: ResponseHeader,
    pub body: ResponseBody<N>,
    /// Frame payload length (excluding the 5 prefix bytes).
    pub size: usize,
}

impl<const N: usize> Response<N> {
    pub fn tuples(&self) -> &[ByteRange<N>] {
        self.body.data.as_ref().map_or(&[], |d| &d.tuples)
    }

    /// Decode every pinned tuple into a dynamic value.
    pub fn decode_tuples(&self) -> Result<Vec<rmpv::Value>, DecodingError> {
        self.tuples().iter().map(ByteRange::value).collect()
    }
}

/// Read the frame length prefix. The caller must have checked that
/// [`MP_RESPONSE_SIZE`] bytes are available. A wrong marker makes the rest
/// of the stream undecodable, hence the connection-fatal error.
pub fn decode_response_size<const N: usize>(cur: &mut Cur<'_, N>) -> Result<usize, Error> {
    debug_assert!(cur.has(MP_RESPONSE_SIZE));
    let mut prefix = [0u8; MP_RESPONSE_SIZE];
    cur.pos.read_bytes(&mut prefix);
    if prefix[0] != 0xce {
        return Err(Error::Protocol(format!(
            "Invalid frame length marker 0x{:02x}",
            prefix[0]
        )));
    }
    cur.pos.advance(MP_RESPONSE_SIZE);
    Ok(u32::from_be_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize)
}

fn complete(e: ReadError) -> DecodingError {
    match e {
        // The whole frame is buffered, so running dry means the declared
        // length lied about the body.
        ReadError::NeedMore => DecodingError::message("Response body shorter than frame length"),
        ReadError::Abort(err) => err,
    }
}

/// Decode header and body of one fully buffered frame.
pub fn decode_response<const N: usize>(
    cur: &mut Cur<'_, N>,
    size: usize,
) -> Result<Response<N>, DecodingError> {
    let frame_start = cur.pos.clone();
    let header = decode_header(cur)?;
    trace!(
        "decoded response header: sync={}, code={}, schema={}",
        header.sync,
        header.code,
        header.schema_id
    );
    let mut body = ResponseBody::default();
    if frame_start.offset_to(&cur.pos) < size {
        decode_body(cur, &mut body)?;
    }
    Ok(Response { header, body, size })
}

fn decode_header<const N: usize>(cur: &mut Cur<'_, N>) -> Result<ResponseHeader, DecodingError> {
    let map_len = cur.read_map_len().map_err(complete)?;
    let mut code = None;
    let mut sync = None;
    let mut schema_id = 0;
    for _ in 0..map_len {
        let key = cur.read_uint().map_err(complete)?;
        match key as u8 {
            keys::RESPONSE_CODE => code = Some(cur.read_uint().map_err(complete)? as u32),
            keys::SYNC => sync = Some(cur.read_uint().map_err(complete)?),
            keys::SCHEMA_ID => schema_id = cur.read_uint().map_err(complete)?,
            rest => {
                debug!("Unexpected key in response header: {}", rest);
                cur.skip_value().map_err(complete)?;
            }
        }
    }
    Ok(ResponseHeader {
        sync: sync.ok_or_else(|| DecodingError::message("Missing sync in response header"))?,
        code: code.ok_or_else(|| DecodingError::message("Missing code in response header"))?,
        schema_id,
    })
}

fn decode_body<const N: usize>(
    cur: &mut Cur<'_, N>,
    body: &mut ResponseBody<N>,
) -> Result<(), DecodingError> {
    let map_len = cur.read_map_len().map_err(complete)?;
    for _ in 0..map_len {
        let key = cur.read_uint().map_err(complete)?;
        match key as u8 {
            keys::DATA => {
                let count = cur.read_arr_len().map_err(complete)?;
                let mut tuples = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let begin = cur.pos.clone();
                    cur.skip_value().map_err(complete)?;
                    let end = cur.pos.clone();
                    tuples.push(ByteRange { begin, end });
                }
                body.data = Some(Data { tuples });
            }
            keys::ERROR_24 => {
                body.error_24 = Some(cur.read_str().map_err(complete)?);
            }
            keys::ERROR => {
                body.error_stack = Some(decode_error_stack(cur)?);
            }
            rest => {
                debug!("Unexpected key in response body: {}", rest);
                cur.skip_value().map_err(complete)?;
            }
        }
    }
    Ok(())
}

fn decode_error_stack<const N: usize>(
    cur: &mut Cur<'_, N>,
) -> Result<Vec<ProtoError>, DecodingError> {
    let mut stack = Vec::new();
    let outer = cur.read_map_len().map_err(complete)?;
    for _ in 0..outer {
        let key = cur.read_uint().map_err(complete)?;
        if key as u8 != error_fields::STACK {
            cur.skip_value().map_err(complete)?;
            continue;
        }
        let entries = cur.read_arr_len().map_err(complete)?;
        for _ in 0..entries {
            let mut err = ProtoError::default();
            let fields = cur.read_map_len().map_err(complete)?;
            for _ in 0..fields {
                let field = cur.read_uint().map_err(complete)?;
                match field as u8 {
                    error_fields::TYPE => err.type_name = cur.read_str().map_err(complete)?,
                    error_fields::FILE => err.file = cur.read_str().map_err(complete)?,
                    error_fields::LINE => {
                        err.line = cur.read_uint().map_err(complete)? as u32;
                    }
                    error_fields::MESSAGE => err.msg = cur.read_str().map_err(complete)?,
                    error_fields::ERRNO => {
                        err.saved_errno = cur.read_int().map_err(complete)? as i32;
                    }
                    error_fields::CODE => {
                        err.code = cur.read_uint().map_err(complete)? as u32;
                    }
                    _ => cur.skip_value().map_err(complete)?,
                }
            }
            stack.push(err);
        }
    }
    Ok(stack)
}
