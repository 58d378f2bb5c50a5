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

#[derive(Clone, Debug)]
pub struct Eval<A> {
    pub expr: Cow<'static, str>,
    pub args: A,
}

impl<A: Encode> RequestBody for Eval<A> {
    fn request_type() -> RequestType {
        RequestType::Eval
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(2)?;
        write_kv_str(enc, keys::EXPR, self.expr.as_ref())?;
        write_kv(enc, keys::TUPLE, &self.args)?;
        Ok(())
    }
}
