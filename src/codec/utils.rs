use crate::{
    codec::encode::{Encode, Encoder},
    errors::EncodingError,
};

pub(crate) fn write_kv_uint<const N: usize>(
    enc: &mut Encoder<'_, N>,
    key: u8,
    value: u64,
) -> Result<(), EncodingError> {
    enc.encode_uint(key as u64)?;
    enc.encode_uint(value)
}

pub(crate) fn write_kv_str<const N: usize>(
    enc: &mut Encoder<'_, N>,
    key: u8,
    value: &str,
) -> Result<(), EncodingError> {
    enc.encode_uint(key as u64)?;
    enc.encode_str(value)
}

pub(crate) fn write_kv<const N: usize, T: Encode + ?Sized>(
    enc: &mut Encoder<'_, N>,
    key: u8,
    value: &T,
) -> Result<(), EncodingError> {
    enc.encode_uint(key as u64)?;
    enc.add(value)
}
