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
pub struct Upsert<T, O> {
    pub space_id: u32,
    pub index_base: u32,
    pub tuple: T,
    pub ops: O,
}

impl<T: Encode, O: Encode> RequestBody for Upsert<T, O> {
    fn request_type() -> RequestType {
        RequestType::Upsert
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(4)?;
        write_kv_uint(enc, keys::SPACE_ID, self.space_id as u64)?;
        write_kv_uint(enc, keys::INDEX_BASE, self.index_base as u64)?;
        write_kv(enc, keys::TUPLE, &self.tuple)?;
        write_kv(enc, keys::OPS, &self.ops)?;
        Ok(())
    }
}
