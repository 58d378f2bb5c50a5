/// IPROTO map keys.
///
/// Describes only keys used in this crate.
///
/// See details [here](https://github.com/tarantool/tarantool/blob/master/src/box/iproto_constants.h).
pub mod keys {
    pub const REQUEST_TYPE: u8 = 0x00;
    pub const RESPONSE_CODE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_ID: u8 = 0x05;
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const INDEX_BASE: u8 = 0x15;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const EXPR: u8 = 0x27;
    pub const OPS: u8 = 0x28;
    pub const DATA: u8 = 0x30;
    pub const ERROR_24: u8 = 0x31;
    pub const ERROR: u8 = 0x52;
}

/// Keys of one entry of the `MP_ERROR_STACK` array inside `IPROTO_ERROR`.
pub mod error_fields {
    pub const STACK: u8 = 0x00;
    pub const TYPE: u8 = 0x00;
    pub const FILE: u8 = 0x01;
    pub const LINE: u8 = 0x02;
    pub const MESSAGE: u8 = 0x03;
    pub const ERRNO: u8 = 0x04;
    pub const CODE: u8 = 0x05;
}

pub mod response_codes {
    pub const OK: u32 = 0x0;
    pub const ERROR_RANGE_START: u32 = 0x8000;
    pub const ERROR_RANGE_END: u32 = 0x8fff;
}

/// IPROTO command codes.
///
/// Describes only types used in this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Replace = 3,
    Update = 4,
    Delete = 5,
    Auth = 7,
    Eval = 8,
    Upsert = 9,
    /// CALL request - returns arbitrary MessagePack.
    Call = 10,
    Ping = 64,
}

/// Iterator of a SELECT request.
///
/// [Docs](https://www.tarantool.io/en/doc/latest/reference/reference_lua/box_index/pairs/).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum IteratorType {
    /// Equality (keys match exactly).
    #[default]
    Eq = 0,
    /// Reverse equality.
    Req = 1,
    /// All tuples.
    All = 2,
    /// Less than.
    Lt = 3,
    /// Less than or equal.
    Le = 4,
    /// Greater than or equal.
    Ge = 5,
    /// Greater than.
    Gt = 6,
}

/// Greeting geometry: total size and its three newline-padded sections.
pub const GREETING_SIZE: usize = 128;
pub const GREETING_VERSION_SIZE: usize = 64;
pub const GREETING_SALT_SIZE: usize = 44;
pub const MAX_SALT_SIZE: usize = 44;

/// Frame prefix: `0xce` marker plus big-endian u32 payload length.
pub const MP_RESPONSE_SIZE: usize = 5;
