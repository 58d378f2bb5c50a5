//! Request frame encoder.
//!
//! Every request shares the frame `0xce <u32be length> <header map>
//! <body map>`. The encoder reserves the five prefix bytes, writes header
//! and body, then back-patches the length through the buffer's set-at-
//! iterator; the sync id comes from a process-wide monotonic counter and
//! doubles as the caller's future id.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::{
    buffer::Buffer,
    codec::{
        consts::{keys, RequestType},
        encode::Encoder,
    },
    errors::EncodingError,
};

pub use self::{
    call::Call, delete::Delete, eval::Eval, insert::Insert, ping::Ping, replace::Replace,
    select::Select, update::Update, upsert::Upsert,
};

mod call;
mod delete;
mod eval;
mod insert;
mod ping;
mod replace;
mod select;
mod update;
mod upsert;

// 2^63 syncs outlast any practical connection lifetime; wraparound is not
// handled.
static NEXT_SYNC: AtomicU64 = AtomicU64::new(0);

fn next_sync() -> u64 {
    NEXT_SYNC.fetch_add(1, Ordering::Relaxed)
}

/// Body of one concrete request type.
pub trait RequestBody {
    fn request_type() -> RequestType
    where
        Self: Sized;

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError>;
}

/// Encode a complete request frame into `buf` and return the assigned sync.
pub fn encode_request<const N: usize, B: RequestBody>(
    buf: &mut Buffer<N>,
    body: &B,
) -> Result<u64, EncodingError> {
    let sync = next_sync();
    trace!("encoding request type {:?}, sync {}", B::request_type(), sync);
    buf.add_back(&[0xce])?;
    let len_at = buf.append_back(4)?;
    let body_begin = buf.end();
    {
        let mut enc = Encoder::new(buf);
        enc.encode_map_len(2)?;
        enc.encode_uint(keys::REQUEST_TYPE as u64)?;
        enc.encode_uint(B::request_type() as u8 as u64)?;
        enc.encode_uint(keys::SYNC as u64)?;
        enc.encode_uint(sync)?;
        body.encode_body(&mut enc)?;
    }
    let total = body_begin.offset_to(&buf.end());
    buf.set(&len_at, &(total as u32).to_be_bytes());
    Ok(sync)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::codec::consts::IteratorType;

    fn frame_bytes<const N: usize>(buf: &Buffer<N>) -> Vec<u8> {
        let mut out = vec![0u8; buf.len()];
        buf.get(&buf.begin(), &mut out);
        out
    }

    #[test]
    fn ping_frame_layout() {
        let mut buf: Buffer<64> = Buffer::new();
        let sync = encode_request(&mut buf, &Ping {}).unwrap();
        let bytes = frame_bytes(&buf);
        assert_eq!(bytes[0], 0xce);
        let len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        assert_eq!(len, bytes.len() - 5);
        // header: fixmap(2), REQUEST_TYPE, 64, SYNC, <sync>, body: fixmap(0)
        assert_eq!(bytes[5], 0x82);
        assert_eq!(bytes[6], keys::REQUEST_TYPE);
        assert_eq!(bytes[7], RequestType::Ping as u8);
        assert_eq!(bytes[8], keys::SYNC);
        assert_eq!(*bytes.last().unwrap(), 0x80);
        let _ = sync;
    }

    #[test]
    fn syncs_are_monotonic() {
        let mut buf: Buffer<64> = Buffer::new();
        let a = encode_request(&mut buf, &Ping {}).unwrap();
        let b = encode_request(&mut buf, &Ping {}).unwrap();
        assert!(b > a);
    }

    #[test]
    fn select_body_keys() {
        let mut buf: Buffer<64> = Buffer::new();
        encode_request(
            &mut buf,
            &Select {
                space_id: 512,
                index_id: 0,
                limit: 1,
                offset: 0,
                iterator: IteratorType::Eq,
                key: (666u64,),
            },
        )
        .unwrap();
        let bytes = frame_bytes(&buf);
        let len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        assert_eq!(len, bytes.len() - 5);
        // Body map carries all six SELECT keys.
        let body = &bytes[5..];
        for key in [
            keys::SPACE_ID,
            keys::INDEX_ID,
            keys::LIMIT,
            keys::OFFSET,
            keys::ITERATOR,
            keys::KEY,
        ] {
            assert!(body.contains(&key), "missing key 0x{key:02x}");
        }
    }
}
