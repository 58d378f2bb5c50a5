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
pub struct Replace<T> {
    pub space_id: u32,
    pub tuple: T,
}

impl<T: Encode> RequestBody for Replace<T> {
    fn request_type() -> RequestType {
        RequestType::Replace
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(2)?;
        write_kv_uint(enc, keys::SPACE_ID, self.space_id as u64)?;
        write_kv(enc, keys::TUPLE, &self.tuple)?;
        Ok(())
    }
}
