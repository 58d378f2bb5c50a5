use crate::{
    codec::{
        consts::{keys, IteratorType, RequestType},
        encode::{Encode, Encoder},
        utils::{write_kv, write_kv_uint},
    },
    errors::EncodingError,
};

use super::RequestBody;

/// `key` must encode as a MessagePack array of key parts.
#[derive(Clone, Debug)]
pub struct Select<K> {
    pub space_id: u32,
    pub index_id: u32,
    pub limit: u32,
    pub offset: u32,
    pub iterator: IteratorType,
    pub key: K,
}

impl<K: Encode> RequestBody for Select<K> {
    fn request_type() -> RequestType {
        RequestType::Select
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(6)?;
        write_kv_uint(enc, keys::SPACE_ID, self.space_id as u64)?;
        write_kv_uint(enc, keys::INDEX_ID, self.index_id as u64)?;
        write_kv_uint(enc, keys::LIMIT, self.limit as u64)?;
        write_kv_uint(enc, keys::OFFSET, self.offset as u64)?;
        write_kv_uint(enc, keys::ITERATOR, self.iterator as u32 as u64)?;
        write_kv(enc, keys::KEY, &self.key)?;
        Ok(())
    }
}
