//! # Pickle Wire Format
//!
//! The version-tagged binary serialization of values. The format is
//! bit-exact and endian-canonical: all multibyte integers and the float
//! bit pattern travel big-endian, so blobs are portable across hosts.
//!
//! ```text
//! blob    := "PQL\0" version:u8 vaxfloat:u8 value
//! value   := 0x00                                   ; nil
//!          | 0x01 u8                                ; bool
//!          | 0x02 u32                               ; positive int
//!          | 0x03 u32                               ; negative int (magnitude)
//!          | 0x04 u64                               ; float bit pattern
//!          | 0x05 length bytes                      ; string
//!          | 0x06 u32 u64 u64                       ; struct (dbnum, oid, subid)
//!          | 0x07 value value value                 ; path element
//!          | 0x08 num value*                        ; tuple
//!          | 0x09 num value*                        ; set
//!          | 0x0a num value*                        ; sequence
//! length  := u8 < 0xFF | 0xFF u32 < 0xFFFFFFFF | 0xFF 0xFFFFFFFF u64
//! num     := u8 < 0xFF | 0xFF u32
//! ```
//!
//! Decoding tolerates arbitrary garbage: bad magic, wrong version, an
//! unexpected float format flag, NaN floats, unknown tags, and truncated
//! buffers are all rejected with a typed error, never a crash.

use thiserror::Error;

use crate::types::TypeManager;
use crate::value::Value;

const MAGIC: &[u8; 4] = b"PQL\0";
const VERSION: u8 = 0;

const TC_NIL: u8 = 0x00;
const TC_BOOL: u8 = 0x01;
const TC_POSINT: u8 = 0x02;
const TC_NEGINT: u8 = 0x03;
const TC_FLOAT: u8 = 0x04;
const TC_STRING: u8 = 0x05;
const TC_STRUCT: u8 = 0x06;
const TC_PATHELEMENT: u8 = 0x07;
const TC_TUPLE: u8 = 0x08;
const TC_SET: u8 = 0x09;
const TC_SEQUENCE: u8 = 0x0a;

/// Nesting bound for hostile input; genuine values never get near it.
const MAX_DEPTH: usize = 512;

/// Decode (and encode) failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PickleError {
    /// The blob does not start with the pickle magic.
    #[error("bad magic in pickle header")]
    BadMagic,

    /// Written by an incompatible representation version.
    #[error("pickle version mismatch")]
    VersionMismatch,

    /// Written by a host with an alien float format.
    #[error("unsupported float format")]
    FloatFormat,

    /// A float decoded to NaN.
    #[error("float value out of range")]
    FloatRange,

    /// The buffer ended mid-value.
    #[error("unexpected end of pickle data")]
    Truncated,

    #[error("unknown type code 0x{0:02x}")]
    BadTag(u8),

    #[error("string payload is not valid UTF-8")]
    BadString,

    /// Nesting deeper than any well-formed blob.
    #[error("pickle nesting too deep")]
    TooDeep,

    /// Distinguishers and lambdas have no wire form.
    #[error("value of this type cannot be pickled")]
    Unpicklable,
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize a value. Fails only for value kinds with no wire form.
pub fn pickle(val: &Value) -> Result<Vec<u8>, PickleError> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(0); // IEEE floats only
    pickle_value(&mut out, val)?;
    Ok(out)
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn putlength(out: &mut Vec<u8>, len: usize) {
    if len < 0xff {
        out.push(len as u8);
    } else if len < 0xffff_ffff {
        out.push(0xff);
        put32(out, len as u32);
    } else {
        out.push(0xff);
        put32(out, 0xffff_ffff);
        put64(out, len as u64);
    }
}

fn putnum(out: &mut Vec<u8>, num: usize) {
    if num < 0xff {
        out.push(num as u8);
    } else {
        out.push(0xff);
        put32(out, num as u32);
    }
}

fn pickle_value(out: &mut Vec<u8>, val: &Value) -> Result<(), PickleError> {
    match val {
        Value::Nil => out.push(TC_NIL),
        Value::Bool(b) => {
            out.push(TC_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(i) => {
            out.push(if *i < 0 { TC_NEGINT } else { TC_POSINT });
            put32(out, i.unsigned_abs());
        }
        Value::Float(f) => {
            out.push(TC_FLOAT);
            put64(out, f.to_bits());
        }
        Value::Str(s) => {
            out.push(TC_STRING);
            putlength(out, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Struct(o) => {
            out.push(TC_STRUCT);
            put32(out, o.dbnum as u32);
            put64(out, o.oid);
            put64(out, o.subid);
        }
        Value::PathElement(p) => {
            out.push(TC_PATHELEMENT);
            pickle_value(out, &p.leftobj)?;
            pickle_value(out, &p.edgename)?;
            pickle_value(out, &p.rightobj)?;
        }
        Value::Tuple(members) => {
            out.push(TC_TUPLE);
            putnum(out, members.len());
            for m in members {
                pickle_value(out, m)?;
            }
        }
        Value::Set { members, .. } => {
            out.push(TC_SET);
            putnum(out, members.len());
            for m in members {
                pickle_value(out, m)?;
            }
        }
        Value::Sequence { members, .. } => {
            out.push(TC_SEQUENCE);
            putnum(out, members.len());
            for m in members {
                pickle_value(out, m)?;
            }
        }
        Value::Distinguisher(_) | Value::Lambda(_) => return Err(PickleError::Unpicklable),
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn get8(&mut self) -> Result<u8, PickleError> {
        if self.pos >= self.data.len() {
            return Err(PickleError::Truncated);
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn getchars(&mut self, len: usize) -> Result<&'a [u8], PickleError> {
        if len > self.data.len() - self.pos {
            return Err(PickleError::Truncated);
        }
        let s = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(s)
    }

    fn get32(&mut self) -> Result<u32, PickleError> {
        let b = self.getchars(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get64(&mut self) -> Result<u64, PickleError> {
        let b = self.getchars(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn getlength(&mut self) -> Result<usize, PickleError> {
        let u8v = self.get8()?;
        if u8v < 0xff {
            return Ok(u8v as usize);
        }
        let u32v = self.get32()?;
        if u32v < 0xffff_ffff {
            return Ok(u32v as usize);
        }
        let u64v = self.get64()?;
        usize::try_from(u64v).map_err(|_| PickleError::Truncated)
    }

    fn getnum(&mut self) -> Result<usize, PickleError> {
        let u8v = self.get8()?;
        if u8v < 0xff {
            return Ok(u8v as usize);
        }
        Ok(self.get32()? as usize)
    }
}

/// Deserialize a blob produced by [`pickle`]. The type manager supplies
/// interned member types for decoded collections.
pub fn unpickle(tm: &TypeManager, data: &[u8]) -> Result<Value, PickleError> {
    let mut r = Reader { data, pos: 0 };

    let magic = r.getchars(4)?;
    if magic != MAGIC {
        return Err(PickleError::BadMagic);
    }
    if r.get8()? != VERSION {
        return Err(PickleError::VersionMismatch);
    }
    if r.get8()? != 0 {
        return Err(PickleError::FloatFormat);
    }

    unpickle_value(tm, &mut r, 0)
}

fn unpickle_value(tm: &TypeManager, r: &mut Reader, depth: usize) -> Result<Value, PickleError> {
    if depth > MAX_DEPTH {
        return Err(PickleError::TooDeep);
    }
    let tag = r.get8()?;
    match tag {
        TC_NIL => Ok(Value::Nil),
        TC_BOOL => Ok(Value::Bool(r.get8()? != 0)),
        TC_POSINT => Ok(Value::Int(r.get32()? as i32)),
        TC_NEGINT => Ok(Value::Int(r.get32()?.wrapping_neg() as i32)),
        TC_FLOAT => {
            let f = f64::from_bits(r.get64()?);
            if f.is_nan() {
                return Err(PickleError::FloatRange);
            }
            Ok(Value::Float(f))
        }
        TC_STRING => {
            let len = r.getlength()?;
            let bytes = r.getchars(len)?;
            let s = std::str::from_utf8(bytes).map_err(|_| PickleError::BadString)?;
            Ok(Value::string(s))
        }
        TC_STRUCT => {
            let dbnum = r.get32()? as i32;
            let oid = r.get64()?;
            let subid = r.get64()?;
            Ok(Value::struct_(dbnum, oid, subid))
        }
        TC_PATHELEMENT => {
            let left = unpickle_value(tm, r, depth + 1)?;
            let edge = unpickle_value(tm, r, depth + 1)?;
            let right = unpickle_value(tm, r, depth + 1)?;
            Ok(Value::pathelement(left, edge, right))
        }
        TC_TUPLE => {
            let num = r.getnum()?;
            let mut members = Vec::new();
            for _ in 0..num {
                members.push(unpickle_value(tm, r, depth + 1)?);
            }
            Ok(Value::tuple_specific(members))
        }
        TC_SET => {
            let (elem, members) = unpickle_members(tm, r, depth)?;
            Ok(Value::Set { elem, members })
        }
        TC_SEQUENCE => {
            let (elem, members) = unpickle_members(tm, r, depth)?;
            Ok(Value::Sequence { elem, members })
        }
        other => Err(PickleError::BadTag(other)),
    }
}

/// Collection members, widening the member type with generalize. Unlike
/// the in-engine insert path this never faults: garbage input must come
/// back as an error or a value, not an abort.
fn unpickle_members(
    tm: &TypeManager,
    r: &mut Reader,
    depth: usize,
) -> Result<(crate::types::Datatype, Vec<Value>), PickleError> {
    let num = r.getnum()?;
    let mut elem = tm.bottom();
    let mut members = Vec::new();
    for _ in 0..num {
        let v = unpickle_value(tm, r, depth + 1)?;
        elem = tm.generalize(&elem, &v.datatype(tm));
        members.push(v);
    }
    Ok((elem, members))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tm() -> TypeManager {
        TypeManager::new()
    }

    fn roundtrip(v: &Value) -> Value {
        let tm = tm();
        let blob = pickle(v).unwrap();
        unpickle(&tm, &blob).unwrap()
    }

    #[test]
    fn scalars_roundtrip_identical() {
        for v in [
            Value::Nil,
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(0),
            Value::Int(123456),
            Value::Int(-123456),
            Value::Int(i32::MIN),
            Value::Int(i32::MAX),
            Value::Float(5.42),
            Value::Float(-1e300),
            Value::string(""),
            Value::string("hello world"),
            Value::struct_(3, 5, 0),
            Value::struct_(-1, u64::MAX, 7),
        ] {
            assert!(roundtrip(&v).identical(&v), "roundtrip failed for {}", v);
        }
    }

    #[test]
    fn compounds_roundtrip_identical() {
        let tm = tm();
        let v = Value::tuple_specific(vec![
            Value::Int(1),
            Value::string("x"),
            Value::set_from(&tm, vec![Value::Float(5.42)]),
        ]);
        let back = roundtrip(&v);
        assert!(back.identical(&v));
        assert_eq!(back.to_string(), "(1, x, {5.42})");

        let p = Value::pathelement(
            Value::struct_(0, 1, 0),
            Value::string("input"),
            Value::struct_(0, 2, 0),
        );
        assert!(roundtrip(&p).identical(&p));

        let seq = Value::sequence_from(&tm, vec![Value::Int(1), Value::Int(1)]);
        assert!(roundtrip(&seq).identical(&seq));
    }

    #[test]
    fn tuple_blob_is_at_least_fourteen_bytes() {
        let tm = tm();
        let v = Value::tuple_specific(vec![
            Value::Int(1),
            Value::string("x"),
            Value::set_from(&tm, vec![Value::Float(5.42)]),
        ]);
        let blob = pickle(&v).unwrap();
        assert!(blob.len() >= 14, "blob only {} bytes", blob.len());
        assert_eq!(&blob[0..4], b"PQL\0");
        assert_eq!(blob[4], 0);
        assert_eq!(blob[5], 0);
        assert_eq!(blob[6], TC_TUPLE);
    }

    #[test]
    fn zero_float_keeps_its_sign_out_of_the_way() {
        let z = roundtrip(&Value::Float(0.0));
        assert!(z.identical(&Value::Float(0.0)));
        assert_eq!(z.as_float().to_bits(), 0);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let tm = tm();
        let mut blob = pickle(&Value::Int(1)).unwrap();
        blob[4] = 1;
        assert_eq!(unpickle(&tm, &blob), Err(PickleError::VersionMismatch));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let tm = tm();
        let mut blob = pickle(&Value::Int(1)).unwrap();
        blob[0] = b'Q';
        assert_eq!(unpickle(&tm, &blob), Err(PickleError::BadMagic));
    }

    #[test]
    fn alien_float_flag_is_rejected() {
        let tm = tm();
        let mut blob = pickle(&Value::Int(1)).unwrap();
        blob[5] = 1;
        assert_eq!(unpickle(&tm, &blob), Err(PickleError::FloatFormat));
    }

    #[test]
    fn nan_float_is_rejected() {
        let tm = tm();
        let mut blob = pickle(&Value::Float(1.0)).unwrap();
        // overwrite the payload with a NaN bit pattern
        blob.truncate(7);
        blob.extend_from_slice(&f64::NAN.to_bits().to_be_bytes());
        assert_eq!(unpickle(&tm, &blob), Err(PickleError::FloatRange));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let tm = tm();
        let mut blob = pickle(&Value::Nil).unwrap();
        blob[6] = 0x77;
        assert_eq!(unpickle(&tm, &blob), Err(PickleError::BadTag(0x77)));
    }

    #[test]
    fn truncation_is_rejected_everywhere() {
        let tm = tm();
        let v = Value::tuple_specific(vec![
            Value::Int(1),
            Value::string("hello"),
            Value::Float(2.5),
        ]);
        let blob = pickle(&v).unwrap();
        for cut in 0..blob.len() {
            let r = unpickle(&tm, &blob[..cut]);
            assert!(r.is_err(), "accepted a blob cut at {}", cut);
        }
    }

    #[test]
    fn int_extremes_use_magnitude_encoding() {
        let blob = pickle(&Value::Int(i32::MIN)).unwrap();
        assert_eq!(blob[6], TC_NEGINT);
        assert_eq!(&blob[7..11], &0x8000_0000u32.to_be_bytes());
        let blob = pickle(&Value::Int(-1)).unwrap();
        assert_eq!(&blob[7..11], &1u32.to_be_bytes());
    }

    #[test]
    fn unpicklable_values_fail_encode() {
        assert_eq!(
            pickle(&Value::Distinguisher(3)),
            Err(PickleError::Unpicklable)
        );
    }

    #[test]
    fn mixed_member_garbage_does_not_abort() {
        // a hand-built set whose members would violate the engine's
        // insert-time typing must decode (or fail) gracefully
        let tm = tm();
        let mut blob = Vec::new();
        blob.extend_from_slice(b"PQL\0");
        blob.push(0);
        blob.push(0);
        blob.push(TC_SET);
        blob.push(2);
        blob.push(TC_POSINT);
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.push(TC_TUPLE);
        blob.push(0);
        let v = unpickle(&tm, &blob).unwrap();
        assert_eq!(v.set_num(), 2);
    }
}
