use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::cursor::Cursor;
use crate::error::DecodeError;

/// Highest tag byte a script may legally carry for an operand type.
pub const MAX_OPERAND_TAG: u8 = 0x13;

/// Operand data types as encoded in the script stream.
///
/// The numeric values matter: they are the tag bytes read from the
/// byte stream when an operand's type has not been discovered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandType {
    /// End-of-argument-list marker.
    EndMarker = 0x00,
    S32 = 0x01,
    /// 16-bit offset into global storage.
    GlobalIntFloat = 0x02,
    /// 16-bit offset into local storage.
    LocalIntFloat = 0x03,
    S8 = 0x04,
    S16 = 0x05,
    F32 = 0x06,
    GlobalIntFloatArr = 0x07,
    LocalIntFloatArr = 0x08,
    String8 = 0x09,
    GlobalString8 = 0x0A,
    LocalString8 = 0x0B,
    GlobalString8Arr = 0x0C,
    LocalString8Arr = 0x0D,
    /// Length-prefixed string, 8-bit size followed by the characters.
    StringVar = 0x0E,
    String16 = 0x0F,
    GlobalString16 = 0x10,
    LocalString16 = 0x11,
    GlobalString16Arr = 0x12,
    LocalString16Arr = 0x13,

    /// Placeholder until the first decoded occurrence reveals the type.
    Unknown = 0xFF,
}

impl OperandType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        use OperandType::*;
        Some(match tag {
            0x00 => EndMarker,
            0x01 => S32,
            0x02 => GlobalIntFloat,
            0x03 => LocalIntFloat,
            0x04 => S8,
            0x05 => S16,
            0x06 => F32,
            0x07 => GlobalIntFloatArr,
            0x08 => LocalIntFloatArr,
            0x09 => String8,
            0x0A => GlobalString8,
            0x0B => LocalString8,
            0x0C => GlobalString8Arr,
            0x0D => LocalString8Arr,
            0x0E => StringVar,
            0x0F => String16,
            0x10 => GlobalString16,
            0x11 => LocalString16,
            0x12 => GlobalString16Arr,
            0x13 => LocalString16Arr,
            _ => return None,
        })
    }

    /// Payload size in bytes for fixed-size types. Zero for the
    /// end marker, the length-prefixed string and the placeholder.
    pub fn fixed_size(self) -> usize {
        use OperandType::*;
        match self {
            EndMarker | StringVar | Unknown => 0,
            S8 => 1,
            GlobalIntFloat | LocalIntFloat | S16 | GlobalString8 | LocalString8
            | GlobalString16 | LocalString16 => 2,
            S32 | F32 => 4,
            GlobalIntFloatArr | LocalIntFloatArr | GlobalString8Arr | LocalString8Arr
            | GlobalString16Arr | LocalString16Arr => 6,
            String8 => 8,
            String16 => 16,
        }
    }

    pub fn is_array(self) -> bool {
        use OperandType::*;
        matches!(
            self,
            GlobalIntFloatArr
                | LocalIntFloatArr
                | GlobalString8Arr
                | LocalString8Arr
                | GlobalString16Arr
                | LocalString16Arr
        )
    }

    /// Non-array reference into global storage.
    pub fn is_global_ref(self) -> bool {
        use OperandType::*;
        matches!(self, GlobalIntFloat | GlobalString8 | GlobalString16)
    }

    /// Non-array reference into local storage.
    pub fn is_local_ref(self) -> bool {
        use OperandType::*;
        matches!(self, LocalIntFloat | LocalString8 | LocalString16)
    }

    pub fn name(self) -> &'static str {
        use OperandType::*;
        match self {
            EndMarker => "<null type>",
            S32 => "Int32",
            GlobalIntFloat => "GIntFloat",
            LocalIntFloat => "LIntFloat",
            S8 => "Int8",
            S16 => "Int16",
            F32 => "Float",
            GlobalIntFloatArr => "GIntFloatArr",
            LocalIntFloatArr => "LIntFloatArr",
            String8 => "Char[8]",
            GlobalString8 => "GChar8",
            LocalString8 => "LChar8",
            GlobalString8Arr => "GChar8Arr",
            LocalString8Arr => "LChar8Arr",
            StringVar => "Char[]",
            String16 => "Char[16]",
            GlobalString16 => "GChar16",
            LocalString16 => "LChar16",
            GlobalString16Arr => "GChar16Arr",
            LocalString16Arr => "LChar16Arr",
            Unknown => "<unknown type>",
        }
    }
}

/// Element type of an array reference, stored in the low seven bits of
/// the packed properties byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayElemType {
    Integer,
    Float,
    Char8,
    Char16,
}

impl ArrayElemType {
    pub fn name(self) -> &'static str {
        match self {
            ArrayElemType::Integer => "Int",
            ArrayElemType::Float => "Float",
            ArrayElemType::Char8 => "Char8",
            ArrayElemType::Char16 => "Char16",
        }
    }
}

/// Decoded view of the packed 6-byte array operand record.
///
/// Layout: u16 storage offset, i16 element index, u8 element count,
/// u8 properties (low 7 bits element type, high bit set when the index
/// is itself a global variable reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRef {
    pub offset: u16,
    pub index: i16,
    pub elem_count: u8,
    pub elem_type: ArrayElemType,
    pub index_is_global: bool,
}

impl ArrayRef {
    pub fn unpack(raw: &[u8]) -> Option<Self> {
        if raw.len() < 6 {
            return None;
        }
        let props = raw[5];
        let elem_type = match props & 0x7f {
            0 => ArrayElemType::Integer,
            1 => ArrayElemType::Float,
            2 => ArrayElemType::Char8,
            3 => ArrayElemType::Char16,
            _ => return None,
        };
        Some(Self {
            offset: LittleEndian::read_u16(&raw[0..2]),
            index: LittleEndian::read_i16(&raw[2..4]),
            elem_count: raw[4],
            elem_type,
            index_is_global: props & 0x80 != 0,
        })
    }
}

/// One decoded operand: its type and the raw payload bytes, kept for
/// re-interpretation (jump targets, global offsets, serialization).
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    ty: OperandType,
    bytes: Vec<u8>,
}

impl Operand {
    pub fn new(ty: OperandType, bytes: Vec<u8>) -> Self {
        Self { ty, bytes }
    }

    /// Decode one operand.
    ///
    /// When `expected` is [`OperandType::Unknown`] the type tag is read
    /// from the stream first; a tag above [`MAX_OPERAND_TAG`] is the
    /// desynchronization signal and fails without consuming it.
    /// A known `expected` type reads its payload directly.
    pub fn read(cur: &mut Cursor<'_>, expected: OperandType) -> Result<Self, DecodeError> {
        let ty = if expected == OperandType::Unknown {
            let tag_pos = cur.pos();
            let tag = cur.read_u8()?;
            match OperandType::from_tag(tag) {
                Some(ty) => ty,
                None => {
                    cur.seek(tag_pos);
                    return Err(DecodeError::UnknownOperandTag {
                        tag,
                        offset: tag_pos,
                    });
                }
            }
        } else {
            expected
        };

        if ty == OperandType::StringVar {
            return Self::read_var_string(cur);
        }

        let size = ty.fixed_size();
        let bytes = cur.read_bytes(size)?.to_vec();
        Ok(Self { ty, bytes })
    }

    /// Length-prefixed string: the declared span is always consumed so
    /// the stream stays in sync, but any byte from the first
    /// non-printable one onwards is recorded as zero padding.
    fn read_var_string(cur: &mut Cursor<'_>) -> Result<Self, DecodeError> {
        let declared = cur.read_u8()? as usize;
        let span = cur.read_bytes(declared.min(cur.remaining()))?;

        let mut bytes = Vec::with_capacity(span.len());
        let mut terminated = false;
        for &b in span {
            if !(0x20..0x7f).contains(&b) {
                terminated = true;
            }
            bytes.push(if terminated { 0 } else { b });
        }

        Ok(Self {
            ty: OperandType::StringVar,
            bytes,
        })
    }

    pub fn ty(&self) -> OperandType {
        self.ty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    // Value accessors tolerate short payloads by yielding zero; a
    // truncated trailing instruction must not bring the pipeline down.

    pub fn as_u8(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    pub fn as_i8(&self) -> i8 {
        self.as_u8() as i8
    }

    pub fn as_u16(&self) -> u16 {
        if self.bytes.len() >= 2 {
            LittleEndian::read_u16(&self.bytes)
        } else {
            u16::from(self.as_u8())
        }
    }

    pub fn as_i16(&self) -> i16 {
        self.as_u16() as i16
    }

    pub fn as_i32(&self) -> i32 {
        if self.bytes.len() >= 4 {
            LittleEndian::read_i32(&self.bytes)
        } else {
            i32::from(self.as_i16())
        }
    }

    pub fn as_f32(&self) -> f32 {
        if self.bytes.len() >= 4 {
            LittleEndian::read_f32(&self.bytes)
        } else {
            0.0
        }
    }

    pub fn array_ref(&self) -> Option<ArrayRef> {
        if !self.ty.is_array() {
            return None;
        }
        ArrayRef::unpack(&self.bytes)
    }

    pub fn sum_bytes(&self) -> u32 {
        self.bytes.iter().map(|&b| u32::from(b)).sum()
    }

    fn string_lossy(&self) -> String {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use OperandType::*;
        match self.ty {
            EndMarker => write!(f, "end"),
            S32 => write!(f, "{}", self.as_i32()),
            GlobalIntFloat | LocalIntFloat | GlobalString8 | LocalString8 | GlobalString16
            | LocalString16 => write!(f, "{}", self.as_u16()),
            S8 => write!(f, "{}", self.as_i8()),
            S16 => write!(f, "{}", self.as_i16()),
            F32 => write!(f, "{}", self.as_f32()),
            String8 | StringVar | String16 => write!(f, "'{}'", self.string_lossy()),
            ty if ty.is_array() => match self.array_ref() {
                Some(arr) => write!(f, "<{} array>[{}]", arr.elem_type.name(), arr.index),
                None => write!(f, "<array>"),
            },
            _ => write!(f, "<unknown>"),
        }
    }
}
