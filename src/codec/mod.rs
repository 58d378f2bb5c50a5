//! Wire codec: MessagePack primitives over the segmented buffer plus the
//! request/response layer of the IPROTO framing.

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    buffer::{BufIter, DEFAULT_BLOCK_SIZE},
    errors::{DecodingError, Error},
};

pub mod consts;
pub mod decode;
pub mod encode;
pub mod request;
pub mod response;
pub(crate) mod utils;

/// A pair of buffer iterators pinning the MessagePack bytes of one encoded
/// value, for deferred decoding. The iterators keep the underlying bytes
/// from being reclaimed by the inbound buffer GC.
#[derive(Clone, Debug)]
pub struct ByteRange<const N: usize = DEFAULT_BLOCK_SIZE> {
    pub begin: BufIter<N>,
    pub end: BufIter<N>,
}

impl<const N: usize> ByteRange<N> {
    pub fn len(&self) -> usize {
        self.begin.offset_to(&self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the pinned bytes out of the buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len()];
        self.begin.read_bytes(&mut out);
        out
    }

    /// Decode the pinned bytes into a dynamic MessagePack value.
    pub fn value(&self) -> Result<rmpv::Value, DecodingError> {
        let bytes = self.to_vec();
        rmpv::decode::read_value(&mut bytes.as_slice())
            .map_err(|e| DecodingError::message(format!("Failed to decode tuple: {e}")))
    }
}

/// Greeting message from server.
///
/// [Docs](https://www.tarantool.io/en/doc/latest/dev_guide/internals/box_protocol/#greeting-message).
#[derive(Clone, Debug)]
pub struct Greeting {
    pub version: String,
    pub salt: Vec<u8>,
}

impl Greeting {
    /// Size of the full message from server in bytes.
    pub const SIZE: usize = consts::GREETING_SIZE;

    /// Decode greeting from the first [`Greeting::SIZE`] bytes received on
    /// a fresh connection.
    pub fn decode(buffer: [u8; Self::SIZE]) -> Result<Self, Error> {
        let line1 = &buffer[..consts::GREETING_VERSION_SIZE];
        let version = String::from_utf8_lossy(line1)
            .trim_end_matches(['\n', ' ', '\0'])
            .to_string();
        let line2 = &buffer
            [consts::GREETING_VERSION_SIZE..consts::GREETING_VERSION_SIZE + consts::GREETING_SALT_SIZE];
        let salt_b64 = String::from_utf8_lossy(line2);
        let mut salt = STANDARD
            .decode(salt_b64.trim_end_matches(['\n', ' ']))
            .context("Failed to decode salt from base64")?;
        salt.truncate(consts::MAX_SALT_SIZE);
        Ok(Self { version, salt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use base64::{engine::general_purpose::STANDARD, Engine};

    #[test]
    fn greeting_roundtrip() {
        let mut raw = [b' '; Greeting::SIZE];
        let banner = b"Tarantool 2.10.0 (Binary) 550e8400-e29b-41d4-a716-446655440000";
        raw[..banner.len()].copy_from_slice(banner);
        raw[63] = b'\n';
        let salt: Vec<u8> = (0u8..32).collect();
        let b64 = STANDARD.encode(&salt);
        raw[64..64 + b64.len()].copy_from_slice(b64.as_bytes());
        raw[127] = b'\n';

        let greeting = Greeting::decode(raw).unwrap();
        assert!(greeting.version.starts_with("Tarantool 2.10.0"));
        assert_eq!(greeting.salt, salt);
    }

    #[test]
    fn greeting_rejects_garbage_salt() {
        let mut raw = [b' '; Greeting::SIZE];
        raw[64..70].copy_from_slice(b"!!!###");
        assert!(Greeting::decode(raw).is_err());
    }
}
