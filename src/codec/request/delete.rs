use crate::{
    codec::{
        consts::{keys, RequestType},
        encode::{Encode, Encoder},
        utils::{write_kv, write_kv_uint},
    },
    errors::EncodingError,
};

use super::RequestBody;

#[derive(Clone, Debug)]
pub struct Delete<K> {
    pub space_id: u32,
    pub index_id: u32,
    pub key: K,
}

impl<K: Encode> RequestBody for Delete<K> {
    fn request_type() -> RequestType {
        RequestType::Delete
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(3)?;
        write_kv_uint(enc, keys::SPACE_ID, self.space_id as u64)?;
        write_kv_uint(enc, keys::INDEX_ID, self.index_id as u64)?;
        write_kv(enc, keys::KEY, &self.key)?;
        Ok(())
    }
}
