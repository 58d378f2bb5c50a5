use std::borrow::Cow;

use crate::{
    codec::{
        consts::{keys, RequestType},
        encode::{Encode, Encoder},
        utils::{write_kv, write_kv_str},
    },
    errors::EncodingError,
};

use super::RequestBody;

/// `args` must encode as a MessagePack array.
#[derive(Clone, Debug)]
pub struct Call<A> {
    pub function_name: Cow<'static, str>,
    pub args: A,
}

impl<A: Encode> RequestBody for Call<A> {
    fn request_type() -> RequestType {
        RequestType::Call
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(2)?;
        write_kv_str(enc, keys::FUNCTION_NAME, self.function_name.as_ref())?;
        write_kv(enc, keys::TUPLE, &self.args)?;
        Ok(())
    }
}
