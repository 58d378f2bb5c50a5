use crate::{
    codec::{
        consts::{keys, RequestType},
        encode::{Encode, Encoder},
        utils::{write_kv, write_kv_uint},
    },
    errors::EncodingError,
};

use super::RequestBody;

/// Update operations ride under the TUPLE key, matching the server's
/// reading of the UPDATE body.
#[derive(Clone, Debug)]
pub struct Update<K, O> {
    pub space_id: u32,
    pub index_id: u32,
    pub key: K,
    pub ops: O,
}

impl<K: Encode, O: Encode> RequestBody for Update<K, O> {
    fn request_type() -> RequestType {
        RequestType::Update
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(4)?;
        write_kv_uint(enc, keys::SPACE_ID, self.space_id as u64)?;
        write_kv_uint(enc, keys::INDEX_ID, self.index_id as u64)?;
        write_kv(enc, keys::KEY, &self.key)?;
        write_kv(enc, keys::TUPLE, &self.ops)?;
        Ok(())
    }
}
