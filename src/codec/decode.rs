//! MessagePack decoding from a segmented [`Buffer`].
//!
//! Two layers:
//!
//! * [`Cur`] — a pull cursor with typed reads. Reads never over-advance:
//!   when the buffer holds only a prefix of the requested object the cursor
//!   is left at the start of that object and [`ReadError::NeedMore`] is
//!   returned, so the call can be repeated once more bytes arrive.
//! * [`decode_with`] — push dispatch into a caller-supplied [`Reader`],
//!   which declares the MessagePack families it accepts and receives one
//!   callback per value. String/binary/ext payloads are reported as
//!   `{offset, size}` views against the value's start iterator so the
//!   caller can keep the range instead of copying.

use std::{fmt, ops::BitOr};

use rmp::Marker;

use crate::{
    buffer::{BufIter, Buffer, DEFAULT_BLOCK_SIZE},
    errors::DecodingError,
};

/// Outcome of a failed read.
#[derive(Clone, Debug)]
pub enum ReadError {
    /// Not enough bytes buffered; the cursor was restored to the start of
    /// the partial object.
    NeedMore,
    /// Malformed input; the stream position is unreliable.
    Abort(DecodingError),
}

impl From<DecodingError> for ReadError {
    fn from(value: DecodingError) -> Self {
        ReadError::Abort(value)
    }
}

pub type ReadResult<T> = Result<T, ReadError>;

/// MessagePack type family of one value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum MpType {
    Nil = 0,
    Bool,
    Uint,
    Int,
    Flt,
    Dbl,
    Str,
    Bin,
    Arr,
    Map,
    Ext,
}

impl MpType {
    pub fn mask(self) -> TypeMask {
        TypeMask(1 << self as u16)
    }
}

impl fmt::Display for MpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MpType::Nil => "nil",
            MpType::Bool => "bool",
            MpType::Uint => "uint",
            MpType::Int => "int",
            MpType::Flt => "float32",
            MpType::Dbl => "float64",
            MpType::Str => "str",
            MpType::Bin => "bin",
            MpType::Arr => "array",
            MpType::Map => "map",
            MpType::Ext => "ext",
        };
        f.write_str(name)
    }
}

/// Bitmask over MessagePack families, used by readers to declare what they
/// accept.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeMask(pub u16);

impl TypeMask {
    pub const NIL: TypeMask = TypeMask(1 << MpType::Nil as u16);
    pub const BOOL: TypeMask = TypeMask(1 << MpType::Bool as u16);
    pub const UINT: TypeMask = TypeMask(1 << MpType::Uint as u16);
    pub const INT: TypeMask = TypeMask(1 << MpType::Int as u16);
    pub const FLT: TypeMask = TypeMask(1 << MpType::Flt as u16);
    pub const DBL: TypeMask = TypeMask(1 << MpType::Dbl as u16);
    pub const STR: TypeMask = TypeMask(1 << MpType::Str as u16);
    pub const BIN: TypeMask = TypeMask(1 << MpType::Bin as u16);
    pub const ARR: TypeMask = TypeMask(1 << MpType::Arr as u16);
    pub const MAP: TypeMask = TypeMask(1 << MpType::Map as u16);
    pub const EXT: TypeMask = TypeMask(1 << MpType::Ext as u16);
    pub const ANY: TypeMask = TypeMask(0x7ff);

    pub fn contains(self, ty: MpType) -> bool {
        self.0 & ty.mask().0 != 0
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: Self) -> Self {
        TypeMask(self.0 | rhs.0)
    }
}

/// String payload view: `offset` bytes past the value's start iterator,
/// `size` bytes long.
#[derive(Copy, Clone, Debug)]
pub struct StrValue {
    pub offset: u32,
    pub size: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct BinValue {
    pub offset: u32,
    pub size: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct ExtValue {
    pub ext_type: i8,
    pub offset: u32,
    pub size: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct ArrValue {
    pub size: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct MapValue {
    pub size: u32,
}

/// One decoded value as reported to a [`Reader`]. Primitives are passed by
/// value; payload-carrying types as views.
#[derive(Copy, Clone, Debug)]
pub enum MpValue {
    Nil,
    Bool(bool),
    Uint(u64),
    Int(i64),
    Flt(f32),
    Dbl(f64),
    Str(StrValue),
    Bin(BinValue),
    Arr(ArrValue),
    Map(MapValue),
    Ext(ExtValue),
}

impl MpValue {
    fn ty(&self) -> MpType {
        match self {
            MpValue::Nil => MpType::Nil,
            MpValue::Bool(_) => MpType::Bool,
            MpValue::Uint(_) => MpType::Uint,
            MpValue::Int(_) => MpType::Int,
            MpValue::Flt(_) => MpType::Flt,
            MpValue::Dbl(_) => MpType::Dbl,
            MpValue::Str(_) => MpType::Str,
            MpValue::Bin(_) => MpType::Bin,
            MpValue::Arr(_) => MpType::Arr,
            MpValue::Map(_) => MpType::Map,
            MpValue::Ext(_) => MpType::Ext,
        }
    }
}

/// What the dispatcher should do after a [`Reader::value`] callback.
pub enum ReadAction<const N: usize = DEFAULT_BLOCK_SIZE> {
    /// Keep dispatching to the same reader.
    Continue,
    /// Dispatch the elements of the composite just reported to this reader,
    /// then discard it.
    Child(Box<dyn Reader<N>>),
    /// Skip the elements of the composite just reported without callbacks.
    Skip,
}

/// Caller-supplied callback bundle for [`decode_with`].
pub trait Reader<const N: usize = DEFAULT_BLOCK_SIZE> {
    /// Families this reader accepts. A value outside the set triggers
    /// [`Reader::wrong_type`] and aborts the read.
    fn valid_types(&self) -> TypeMask;

    /// Called once per value. `at` points at the value's first byte (the
    /// marker); payload views in `v` are relative to it.
    fn value(&mut self, at: &BufIter<N>, v: MpValue) -> ReadAction<N>;

    fn wrong_type(&mut self, _expected: TypeMask, _got: MpType) {}

    /// Called with the position one past the last byte this reader
    /// consumed.
    fn store_end(&mut self, _end: &BufIter<N>) {}
}

/// Pull cursor over buffered MessagePack.
pub struct Cur<'a, const N: usize = DEFAULT_BLOCK_SIZE> {
    buf: &'a Buffer<N>,
    pub pos: BufIter<N>,
}

impl<'a, const N: usize> Cur<'a, N> {
    pub fn new(buf: &'a Buffer<N>, pos: BufIter<N>) -> Self {
        Self { buf, pos }
    }

    pub fn has(&self, n: usize) -> bool {
        self.buf.has(&self.pos, n)
    }

    fn take(&mut self, out: &mut [u8]) -> ReadResult<()> {
        if !self.has(out.len()) {
            return Err(ReadError::NeedMore);
        }
        self.buf.get(&self.pos, out);
        self.pos.advance(out.len());
        Ok(())
    }

    fn take_u8(&mut self) -> ReadResult<u8> {
        let mut b = [0u8];
        self.take(&mut b)?;
        Ok(b[0])
    }

    fn take_u16(&mut self) -> ReadResult<u16> {
        let mut b = [0u8; 2];
        self.take(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    fn take_u32(&mut self) -> ReadResult<u32> {
        let mut b = [0u8; 4];
        self.take(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn take_u64(&mut self) -> ReadResult<u64> {
        let mut b = [0u8; 8];
        self.take(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    fn skip_payload(&mut self, n: usize) -> ReadResult<()> {
        if !self.has(n) {
            return Err(ReadError::NeedMore);
        }
        self.pos.advance(n);
        Ok(())
    }

    /// Run `f`; on failure restore the cursor to where it was, so partial
    /// reads are re-entrant.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> ReadResult<T>) -> ReadResult<T> {
        let save = self.pos.clone();
        match f(self) {
            Ok(x) => Ok(x),
            Err(e) => {
                self.pos = save;
                Err(e)
            }
        }
    }

    pub fn read_marker(&mut self) -> ReadResult<Marker> {
        let b = self.take_u8()?;
        let marker = Marker::from_u8(b);
        if matches!(marker, Marker::Reserved) {
            return Err(DecodingError::UnknownMarker(b).into());
        }
        Ok(marker)
    }

    pub fn read_uint(&mut self) -> ReadResult<u64> {
        self.guarded(|cur| {
            let v = match cur.read_marker()? {
                Marker::FixPos(x) => x as u64,
                Marker::U8 => cur.take_u8()? as u64,
                Marker::U16 => cur.take_u16()? as u64,
                Marker::U32 => cur.take_u32()? as u64,
                Marker::U64 => cur.take_u64()?,
                Marker::I8 => {
                    let x = cur.take_u8()? as i8;
                    u64::try_from(x).map_err(|_| DecodingError::NumberRange("u64"))?
                }
                Marker::I16 => {
                    let x = cur.take_u16()? as i16;
                    u64::try_from(x).map_err(|_| DecodingError::NumberRange("u64"))?
                }
                Marker::I32 => {
                    let x = cur.take_u32()? as i32;
                    u64::try_from(x).map_err(|_| DecodingError::NumberRange("u64"))?
                }
                Marker::I64 => {
                    let x = cur.take_u64()? as i64;
                    u64::try_from(x).map_err(|_| DecodingError::NumberRange("u64"))?
                }
                rest => {
                    return Err(
                        DecodingError::type_mismatch("unsigned integer", format!("{rest:?}")).into(),
                    )
                }
            };
            Ok(v)
        })
    }

    pub fn read_int(&mut self) -> ReadResult<i64> {
        self.guarded(|cur| {
            let v = match cur.read_marker()? {
                Marker::FixPos(x) => x as i64,
                Marker::FixNeg(x) => x as i64,
                Marker::U8 => cur.take_u8()? as i64,
                Marker::U16 => cur.take_u16()? as i64,
                Marker::U32 => cur.take_u32()? as i64,
                Marker::U64 => {
                    let x = cur.take_u64()?;
                    i64::try_from(x).map_err(|_| DecodingError::NumberRange("i64"))?
                }
                Marker::I8 => cur.take_u8()? as i8 as i64,
                Marker::I16 => cur.take_u16()? as i16 as i64,
                Marker::I32 => cur.take_u32()? as i32 as i64,
                Marker::I64 => cur.take_u64()? as i64,
                rest => {
                    return Err(
                        DecodingError::type_mismatch("integer", format!("{rest:?}")).into()
                    )
                }
            };
            Ok(v)
        })
    }

    pub fn read_bool(&mut self) -> ReadResult<bool> {
        self.guarded(|cur| match cur.read_marker()? {
            Marker::True => Ok(true),
            Marker::False => Ok(false),
            rest => Err(DecodingError::type_mismatch("bool", format!("{rest:?}")).into()),
        })
    }

    /// Exact float32 only; widening from an integer or narrowing from
    /// float64 is rejected.
    pub fn read_f32(&mut self) -> ReadResult<f32> {
        self.guarded(|cur| match cur.read_marker()? {
            Marker::F32 => Ok(f32::from_bits(cur.take_u32()?)),
            rest => Err(DecodingError::type_mismatch("float32", format!("{rest:?}")).into()),
        })
    }

    /// Accepts float64 and widens float32.
    pub fn read_f64(&mut self) -> ReadResult<f64> {
        self.guarded(|cur| match cur.read_marker()? {
            Marker::F64 => Ok(f64::from_bits(cur.take_u64()?)),
            Marker::F32 => Ok(f32::from_bits(cur.take_u32()?) as f64),
            rest => Err(DecodingError::type_mismatch("float64", format!("{rest:?}")).into()),
        })
    }

    pub fn read_str_len(&mut self) -> ReadResult<u32> {
        self.guarded(|cur| match cur.read_marker()? {
            Marker::FixStr(x) => Ok(x as u32),
            Marker::Str8 => Ok(cur.take_u8()? as u32),
            Marker::Str16 => Ok(cur.take_u16()? as u32),
            Marker::Str32 => Ok(cur.take_u32()?),
            rest => Err(DecodingError::type_mismatch("str", format!("{rest:?}")).into()),
        })
    }

    pub fn read_bin_len(&mut self) -> ReadResult<u32> {
        self.guarded(|cur| match cur.read_marker()? {
            Marker::Bin8 => Ok(cur.take_u8()? as u32),
            Marker::Bin16 => Ok(cur.take_u16()? as u32),
            Marker::Bin32 => Ok(cur.take_u32()?),
            rest => Err(DecodingError::type_mismatch("bin", format!("{rest:?}")).into()),
        })
    }

    pub fn read_arr_len(&mut self) -> ReadResult<u32> {
        self.guarded(|cur| match cur.read_marker()? {
            Marker::FixArray(x) => Ok(x as u32),
            Marker::Array16 => Ok(cur.take_u16()? as u32),
            Marker::Array32 => Ok(cur.take_u32()?),
            rest => Err(DecodingError::type_mismatch("array", format!("{rest:?}")).into()),
        })
    }

    pub fn read_map_len(&mut self) -> ReadResult<u32> {
        self.guarded(|cur| match cur.read_marker()? {
            Marker::FixMap(x) => Ok(x as u32),
            Marker::Map16 => Ok(cur.take_u16()? as u32),
            Marker::Map32 => Ok(cur.take_u32()?),
            rest => Err(DecodingError::type_mismatch("map", format!("{rest:?}")).into()),
        })
    }

    /// Read a string in full. Payload must be valid UTF-8.
    pub fn read_str(&mut self) -> ReadResult<String> {
        self.guarded(|cur| {
            let len = cur.read_str_len()? as usize;
            let mut bytes = vec![0u8; len];
            cur.take(&mut bytes)?;
            String::from_utf8(bytes)
                .map_err(|e| DecodingError::message(format!("Invalid UTF-8 in string: {e}")).into())
        })
    }

    /// Skip exactly one value, including nested composites. Iterative, so
    /// hostile nesting depth cannot exhaust the stack.
    pub fn skip_value(&mut self) -> ReadResult<()> {
        self.guarded(|cur| {
            let mut pending = 1u64;
            while pending > 0 {
                pending -= 1;
                match cur.read_marker()? {
                    Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True
                    | Marker::False => {}
                    Marker::U8 | Marker::I8 => cur.skip_payload(1)?,
                    Marker::U16 | Marker::I16 => cur.skip_payload(2)?,
                    Marker::U32 | Marker::I32 | Marker::F32 => cur.skip_payload(4)?,
                    Marker::U64 | Marker::I64 | Marker::F64 => cur.skip_payload(8)?,
                    Marker::FixStr(x) => cur.skip_payload(x as usize)?,
                    Marker::Str8 | Marker::Bin8 => {
                        let n = cur.take_u8()? as usize;
                        cur.skip_payload(n)?;
                    }
                    Marker::Str16 | Marker::Bin16 => {
                        let n = cur.take_u16()? as usize;
                        cur.skip_payload(n)?;
                    }
                    Marker::Str32 | Marker::Bin32 => {
                        let n = cur.take_u32()? as usize;
                        cur.skip_payload(n)?;
                    }
                    Marker::FixArray(x) => pending += x as u64,
                    Marker::Array16 => pending += cur.take_u16()? as u64,
                    Marker::Array32 => pending += cur.take_u32()? as u64,
                    Marker::FixMap(x) => pending += 2 * x as u64,
                    Marker::Map16 => pending += 2 * cur.take_u16()? as u64,
                    Marker::Map32 => pending += 2 * cur.take_u32()? as u64,
                    Marker::FixExt1 => cur.skip_payload(2)?,
                    Marker::FixExt2 => cur.skip_payload(3)?,
                    Marker::FixExt4 => cur.skip_payload(5)?,
                    Marker::FixExt8 => cur.skip_payload(9)?,
                    Marker::FixExt16 => cur.skip_payload(17)?,
                    Marker::Ext8 => {
                        let n = cur.take_u8()? as usize;
                        cur.skip_payload(n + 1)?;
                    }
                    Marker::Ext16 => {
                        let n = cur.take_u16()? as usize;
                        cur.skip_payload(n + 1)?;
                    }
                    Marker::Ext32 => {
                        let n = cur.take_u32()? as usize;
                        cur.skip_payload(n + 1)?;
                    }
                    Marker::Reserved => {
                        return Err(DecodingError::UnknownMarker(0xc1).into());
                    }
                }
            }
            Ok(())
        })
    }

    /// Read one value header, advancing past the whole value (payload
    /// included for str/bin/ext, elements excluded for arr/map).
    fn read_value(&mut self) -> ReadResult<MpValue> {
        self.guarded(|cur| {
            let start = cur.pos.clone();
            let v = match cur.read_marker()? {
                Marker::Null => MpValue::Nil,
                Marker::True => MpValue::Bool(true),
                Marker::False => MpValue::Bool(false),
                Marker::FixPos(x) => MpValue::Uint(x as u64),
                Marker::FixNeg(x) => MpValue::Int(x as i64),
                Marker::U8 => MpValue::Uint(cur.take_u8()? as u64),
                Marker::U16 => MpValue::Uint(cur.take_u16()? as u64),
                Marker::U32 => MpValue::Uint(cur.take_u32()? as u64),
                Marker::U64 => MpValue::Uint(cur.take_u64()?),
                Marker::I8 => MpValue::Int(cur.take_u8()? as i8 as i64),
                Marker::I16 => MpValue::Int(cur.take_u16()? as i16 as i64),
                Marker::I32 => MpValue::Int(cur.take_u32()? as i32 as i64),
                Marker::I64 => MpValue::Int(cur.take_u64()? as i64),
                Marker::F32 => MpValue::Flt(f32::from_bits(cur.take_u32()?)),
                Marker::F64 => MpValue::Dbl(f64::from_bits(cur.take_u64()?)),
                Marker::FixStr(len) => {
                    let offset = start.offset_to(&cur.pos) as u32;
                    cur.skip_payload(len as usize)?;
                    MpValue::Str(StrValue {
                        offset,
                        size: len as u32,
                    })
                }
                Marker::Str8 => {
                    let size = cur.take_u8()? as u32;
                    let offset = start.offset_to(&cur.pos) as u32;
                    cur.skip_payload(size as usize)?;
                    MpValue::Str(StrValue { offset, size })
                }
                Marker::Str16 => {
                    let size = cur.take_u16()? as u32;
                    let offset = start.offset_to(&cur.pos) as u32;
                    cur.skip_payload(size as usize)?;
                    MpValue::Str(StrValue { offset, size })
                }
                Marker::Str32 => {
                    let size = cur.take_u32()?;
                    let offset = start.offset_to(&cur.pos) as u32;
                    cur.skip_payload(size as usize)?;
                    MpValue::Str(StrValue { offset, size })
                }
                Marker::Bin8 => {
                    let size = cur.take_u8()? as u32;
                    let offset = start.offset_to(&cur.pos) as u32;
                    cur.skip_payload(size as usize)?;
                    MpValue::Bin(BinValue { offset, size })
                }
                Marker::Bin16 => {
                    let size = cur.take_u16()? as u32;
                    let offset = start.offset_to(&cur.pos) as u32;
                    cur.skip_payload(size as usize)?;
                    MpValue::Bin(BinValue { offset, size })
                }
                Marker::Bin32 => {
                    let size = cur.take_u32()?;
                    let offset = start.offset_to(&cur.pos) as u32;
                    cur.skip_payload(size as usize)?;
                    MpValue::Bin(BinValue { offset, size })
                }
                Marker::FixArray(x) => MpValue::Arr(ArrValue { size: x as u32 }),
                Marker::Array16 => MpValue::Arr(ArrValue {
                    size: cur.take_u16()? as u32,
                }),
                Marker::Array32 => MpValue::Arr(ArrValue {
                    size: cur.take_u32()?,
                }),
                Marker::FixMap(x) => MpValue::Map(MapValue { size: x as u32 }),
                Marker::Map16 => MpValue::Map(MapValue {
                    size: cur.take_u16()? as u32,
                }),
                Marker::Map32 => MpValue::Map(MapValue {
                    size: cur.take_u32()?,
                }),
                Marker::FixExt1 => cur.read_ext_tail(&start, 1)?,
                Marker::FixExt2 => cur.read_ext_tail(&start, 2)?,
                Marker::FixExt4 => cur.read_ext_tail(&start, 4)?,
                Marker::FixExt8 => cur.read_ext_tail(&start, 8)?,
                Marker::FixExt16 => cur.read_ext_tail(&start, 16)?,
                Marker::Ext8 => {
                    let size = cur.take_u8()? as u32;
                    cur.read_ext_tail(&start, size)?
                }
                Marker::Ext16 => {
                    let size = cur.take_u16()? as u32;
                    cur.read_ext_tail(&start, size)?
                }
                Marker::Ext32 => {
                    let size = cur.take_u32()?;
                    cur.read_ext_tail(&start, size)?
                }
                Marker::Reserved => return Err(DecodingError::UnknownMarker(0xc1).into()),
            };
            Ok(v)
        })
    }

    fn read_ext_tail(&mut self, start: &BufIter<N>, size: u32) -> ReadResult<MpValue> {
        let ext_type = self.take_u8()? as i8;
        let offset = start.offset_to(&self.pos) as u32;
        self.skip_payload(size as usize)?;
        Ok(MpValue::Ext(ExtValue {
            ext_type,
            offset,
            size,
        }))
    }
}

enum FrameReader<const N: usize> {
    Root,
    Owned(Box<dyn Reader<N>>),
    Skip,
    /// Use the nearest enclosing Root/Owned reader.
    Inherit,
}

struct Frame<const N: usize> {
    remaining: u64,
    reader: FrameReader<N>,
}

/// Decode one complete top-level value, dispatching every nested value to
/// `root` (or to the child readers it installs). On failure the cursor is
/// restored to the start of the value.
pub fn decode_with<const N: usize>(
    cur: &mut Cur<'_, N>,
    root: &mut dyn Reader<N>,
) -> ReadResult<()> {
    let save = cur.pos.clone();
    match decode_with_inner(cur, root) {
        Ok(()) => Ok(()),
        Err(e) => {
            cur.pos = save;
            Err(e)
        }
    }
}

fn decode_with_inner<const N: usize>(
    cur: &mut Cur<'_, N>,
    root: &mut dyn Reader<N>,
) -> ReadResult<()> {
    let mut stack: Vec<Frame<N>> = vec![Frame {
        remaining: 1,
        reader: FrameReader::Root,
    }];
    while let Some(top) = stack.last_mut() {
        if top.remaining == 0 {
            let frame = stack.pop().unwrap();
            if let FrameReader::Owned(mut r) = frame.reader {
                r.store_end(&cur.pos);
            }
            continue;
        }
        top.remaining -= 1;

        let skipping = {
            let ridx = stack
                .iter()
                .rposition(|f| !matches!(f.reader, FrameReader::Inherit))
                .unwrap_or(0);
            matches!(stack[ridx].reader, FrameReader::Skip)
        };

        let at = cur.pos.clone();
        let value = cur.read_value()?;

        if skipping {
            match value {
                MpValue::Arr(a) => stack.push(Frame {
                    remaining: a.size as u64,
                    reader: FrameReader::Skip,
                }),
                MpValue::Map(m) => stack.push(Frame {
                    remaining: 2 * m.size as u64,
                    reader: FrameReader::Skip,
                }),
                _ => {}
            }
            continue;
        }

        let ridx = stack
            .iter()
            .rposition(|f| !matches!(f.reader, FrameReader::Inherit))
            .unwrap_or(0);
        let action = match &mut stack[ridx].reader {
            FrameReader::Root => {
                let expected = root.valid_types();
                if !expected.contains(value.ty()) {
                    root.wrong_type(expected, value.ty());
                    return Err(DecodingError::type_mismatch("reader-accepted type", value.ty())
                        .into());
                }
                root.value(&at, value)
            }
            FrameReader::Owned(r) => {
                let expected = r.valid_types();
                if !expected.contains(value.ty()) {
                    r.wrong_type(expected, value.ty());
                    return Err(DecodingError::type_mismatch("reader-accepted type", value.ty())
                        .into());
                }
                r.value(&at, value)
            }
            _ => unreachable!(),
        };

        let elements = match value {
            MpValue::Arr(a) => Some(a.size as u64),
            MpValue::Map(m) => Some(2 * m.size as u64),
            _ => None,
        };
        if let Some(count) = elements {
            let reader = match action {
                ReadAction::Continue => FrameReader::Inherit,
                ReadAction::Child(c) => FrameReader::Owned(c),
                ReadAction::Skip => FrameReader::Skip,
            };
            stack.push(Frame {
                remaining: count,
                reader,
            });
        }
    }
    root.store_end(&cur.pos);
    Ok(())
}
