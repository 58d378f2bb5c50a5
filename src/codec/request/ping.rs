use crate::{
    codec::{
        consts::RequestType,
        encode::Encoder,
    },
    errors::EncodingError,
};

use super::RequestBody;

#[derive(Clone, Debug)]
pub struct Ping {}

impl RequestBody for Ping {
    fn request_type() -> RequestType {
        RequestType::Ping
    }

    fn encode_body<const N: usize>(&self, enc: &mut Encoder<'_, N>) -> Result<(), EncodingError> {
        enc.encode_map_len(0)
    }
}
