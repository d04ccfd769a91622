// Per-column statistics and their persisted wire format.
//
// Maintains the running null/non-null counts, average width, and
// min/max (or per-component counts for vectors) a column's
// `ValueStatistics` needs to carry. Serialization uses length-prefixed
// big-endian counts, versioned by a `DboVersion` tag so readers can
// reject formats they don't understand. `min`/`max` are persisted as
// tagged `Value` bytes, with a dedicated sentinel tag standing in for
// `None` — scalar-only, since `insert` never updates them for vectors.

use crate::error::{DbError, Result};
use crate::value::types::Value;

/// Tags a persisted statistics blob. Unknown/future versions must be
/// rejected by readers rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DboVersion {
    Undefined,
    V1_0,
    V2_0,
    V3_0,
}

impl DboVersion {
    fn to_tag(self) -> u8 {
        match self {
            DboVersion::Undefined => 0,
            DboVersion::V1_0 => 1,
            DboVersion::V2_0 => 2,
            DboVersion::V3_0 => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(DboVersion::Undefined),
            1 => Ok(DboVersion::V1_0),
            2 => Ok(DboVersion::V2_0),
            3 => Ok(DboVersion::V3_0),
            other => Err(DbError::Serialization(format!(
                "unknown persisted-statistics version tag {other}"
            ))),
        }
    }
}

/// Current serialization version new blobs are written with. `V3_0`
/// is the layout that carries `min`/`max`; it was already the newest
/// tag in the closed version set when that field was added, so there
/// is no higher tag to bump to — older tags read with the same parser
/// since the wire shape has never varied by version, only the set of
/// tags accepted has.
pub const CURRENT_VERSION: DboVersion = DboVersion::V3_0;

/// Tag byte for a persisted `Value`. `NONE` stands in for an absent
/// `min`/`max`; the rest mirror `Value`'s scalar variants (vectors
/// never appear here since `insert` only tracks min/max for scalars).
mod value_tag {
    pub const NONE: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const BYTE: u8 = 2;
    pub const SHORT: u8 = 3;
    pub const INT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const FLOAT: u8 = 6;
    pub const DOUBLE: u8 = 7;
    pub const STRING: u8 = 8;
    pub const DATE: u8 = 9;
    pub const COMPLEX32: u8 = 10;
    pub const COMPLEX64: u8 = 11;
}

fn encode_value(v: &Value, buf: &mut Vec<u8>) {
    match v {
        Value::Boolean(b) => {
            buf.push(value_tag::BOOLEAN);
            buf.push(*b as u8);
        }
        Value::Byte(b) => {
            buf.push(value_tag::BYTE);
            buf.push(*b as u8);
        }
        Value::Short(s) => {
            buf.push(value_tag::SHORT);
            buf.extend_from_slice(&s.to_be_bytes());
        }
        Value::Int(i) => {
            buf.push(value_tag::INT);
            buf.extend_from_slice(&i.to_be_bytes());
        }
        Value::Long(l) => {
            buf.push(value_tag::LONG);
            buf.extend_from_slice(&l.to_be_bytes());
        }
        Value::Float(f) => {
            buf.push(value_tag::FLOAT);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        Value::Double(d) => {
            buf.push(value_tag::DOUBLE);
            buf.extend_from_slice(&d.to_be_bytes());
        }
        Value::StringValue(s) => {
            buf.push(value_tag::STRING);
            let bytes = s.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
            buf.extend_from_slice(bytes);
        }
        Value::Date(d) => {
            buf.push(value_tag::DATE);
            buf.extend_from_slice(&d.to_be_bytes());
        }
        Value::Complex32(r, i) => {
            buf.push(value_tag::COMPLEX32);
            buf.extend_from_slice(&r.to_be_bytes());
            buf.extend_from_slice(&i.to_be_bytes());
        }
        Value::Complex64(r, i) => {
            buf.push(value_tag::COMPLEX64);
            buf.extend_from_slice(&r.to_be_bytes());
            buf.extend_from_slice(&i.to_be_bytes());
        }
        other => unreachable!("min/max only ever holds a scalar value, got {other:?}"),
    }
}

fn encode_optional_value(v: Option<&Value>, buf: &mut Vec<u8>) {
    match v {
        None => buf.push(value_tag::NONE),
        Some(value) => encode_value(value, buf),
    }
}

fn read_bytes<'a>(bytes: &'a [u8], at: &mut usize, len: usize) -> Result<&'a [u8]> {
    let slice = bytes
        .get(*at..*at + len)
        .ok_or_else(|| DbError::Serialization("truncated statistics blob".to_string()))?;
    *at += len;
    Ok(slice)
}

fn read_u64(bytes: &[u8], at: &mut usize) -> Result<u64> {
    Ok(u64::from_be_bytes(read_bytes(bytes, at, 8)?.try_into().unwrap()))
}

fn decode_optional_value(bytes: &[u8], at: &mut usize) -> Result<Option<Value>> {
    let tag = *read_bytes(bytes, at, 1)?.first().unwrap();
    let value = match tag {
        value_tag::NONE => return Ok(None),
        value_tag::BOOLEAN => Value::Boolean(read_bytes(bytes, at, 1)?[0] != 0),
        value_tag::BYTE => Value::Byte(read_bytes(bytes, at, 1)?[0] as i8),
        value_tag::SHORT => Value::Short(i16::from_be_bytes(read_bytes(bytes, at, 2)?.try_into().unwrap())),
        value_tag::INT => Value::Int(i32::from_be_bytes(read_bytes(bytes, at, 4)?.try_into().unwrap())),
        value_tag::LONG => Value::Long(i64::from_be_bytes(read_bytes(bytes, at, 8)?.try_into().unwrap())),
        value_tag::FLOAT => Value::Float(f32::from_be_bytes(read_bytes(bytes, at, 4)?.try_into().unwrap())),
        value_tag::DOUBLE => Value::Double(f64::from_be_bytes(read_bytes(bytes, at, 8)?.try_into().unwrap())),
        value_tag::STRING => {
            let len = read_u64(bytes, at)? as usize;
            let slice = read_bytes(bytes, at, len)?;
            let s = String::from_utf8(slice.to_vec())
                .map_err(|_| DbError::Serialization("invalid utf-8 in persisted string value".to_string()))?;
            Value::StringValue(s)
        }
        value_tag::DATE => Value::Date(i64::from_be_bytes(read_bytes(bytes, at, 8)?.try_into().unwrap())),
        value_tag::COMPLEX32 => {
            let r = f32::from_be_bytes(read_bytes(bytes, at, 4)?.try_into().unwrap());
            let i = f32::from_be_bytes(read_bytes(bytes, at, 4)?.try_into().unwrap());
            Value::Complex32(r, i)
        }
        value_tag::COMPLEX64 => {
            let r = f64::from_be_bytes(read_bytes(bytes, at, 8)?.try_into().unwrap());
            let i = f64::from_be_bytes(read_bytes(bytes, at, 8)?.try_into().unwrap());
            Value::Complex64(r, i)
        }
        other => return Err(DbError::Serialization(format!("unknown persisted value tag {other}"))),
    };
    Ok(Some(value))
}

/// Per-component counts for vector columns: how many times each
/// component position was present/absent across inserted values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentCounts {
    pub present: Vec<u64>,
}

/// Running statistics for one column.
///
/// Invariant: `nulls + non_nulls == total_rows` after every
/// committed insert/delete — maintained by routing every mutation
/// through `insert`/`delete` rather than letting callers poke the
/// counters directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueStatistics {
    null_count: u64,
    non_null_count: u64,
    total_width: u64,
    min: Option<Value>,
    max: Option<Value>,
    component_counts: ComponentCounts,
}

impl ValueStatistics {
    pub fn new() -> Self {
        Self {
            null_count: 0,
            non_null_count: 0,
            total_width: 0,
            min: None,
            max: None,
            component_counts: ComponentCounts::default(),
        }
    }

    pub fn null_count(&self) -> u64 {
        self.null_count
    }

    pub fn non_null_count(&self) -> u64 {
        self.non_null_count
    }

    pub fn total_rows(&self) -> u64 {
        self.null_count + self.non_null_count
    }

    /// Average width in characters for string columns, serialized
    /// bytes otherwise. `row_width`'s cost estimate multiplies this by
    /// `SIZE_OF_CHAR` for string-typed columns.
    pub fn average_width(&self) -> f64 {
        if self.non_null_count == 0 {
            0.0
        } else {
            self.total_width as f64 / self.non_null_count as f64
        }
    }

    pub fn min(&self) -> Option<&Value> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Value> {
        self.max.as_ref()
    }

    pub fn insert(&mut self, value: Option<&Value>) {
        match value {
            None => self.null_count += 1,
            Some(v) => {
                self.non_null_count += 1;
                self.total_width += Self::width_of(v);

                if v.is_vector() {
                    self.record_component_presence(v);
                } else {
                    self.update_min_max(v);
                }
            }
        }
    }

    pub fn delete(&mut self, value: Option<&Value>) {
        match value {
            None => self.null_count = self.null_count.saturating_sub(1),
            Some(v) => {
                self.non_null_count = self.non_null_count.saturating_sub(1);
                self.total_width = self.total_width.saturating_sub(Self::width_of(v));
                // min/max and per-component counts are not retracted
                // incrementally: a precise recompute on delete would
                // require scanning the column, which is the storage
                // engine's job, not this in-memory summary's.
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Width contribution of one inserted value: character count for
    /// strings (there is no fixed `physical_size` that means anything
    /// for a variable-length column), serialized byte width otherwise.
    fn width_of(value: &Value) -> u64 {
        match value {
            Value::StringValue(s) => s.chars().count() as u64,
            other => other.value_type().physical_size() as u64,
        }
    }

    fn update_min_max(&mut self, v: &Value) {
        match &self.min {
            None => self.min = Some(v.clone()),
            Some(current) => {
                if v.partial_cmp(current) == Some(std::cmp::Ordering::Less) {
                    self.min = Some(v.clone());
                }
            }
        }
        match &self.max {
            None => self.max = Some(v.clone()),
            Some(current) => {
                if v.partial_cmp(current) == Some(std::cmp::Ordering::Greater) {
                    self.max = Some(v.clone());
                }
            }
        }
    }

    fn record_component_presence(&mut self, v: &Value) {
        let len = v.len();
        if self.component_counts.present.len() < len {
            self.component_counts.present.resize(len, 0);
        }
        for slot in self.component_counts.present.iter_mut().take(len) {
            *slot += 1;
        }
    }

    /// Serializes to the persisted format: a one-byte version tag,
    /// length-prefixed big-endian `u64` counts, tagged `min`/`max`
    /// values (a `NONE` tag standing in for an absent bound), then the
    /// component-counts array.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(CURRENT_VERSION.to_tag());
        buf.extend_from_slice(&self.null_count.to_be_bytes());
        buf.extend_from_slice(&self.non_null_count.to_be_bytes());
        buf.extend_from_slice(&self.total_width.to_be_bytes());
        encode_optional_value(self.min.as_ref(), &mut buf);
        encode_optional_value(self.max.as_ref(), &mut buf);

        let component_len = self.component_counts.present.len() as u64;
        buf.extend_from_slice(&component_len.to_be_bytes());
        for count in &self.component_counts.present {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;

        let tag = *bytes
            .first()
            .ok_or_else(|| DbError::Serialization("empty statistics blob".to_string()))?;
        let _version = DboVersion::from_tag(tag)?;
        cursor += 1;

        let null_count = read_u64(bytes, &mut cursor)?;
        let non_null_count = read_u64(bytes, &mut cursor)?;
        let total_width = read_u64(bytes, &mut cursor)?;
        let min = decode_optional_value(bytes, &mut cursor)?;
        let max = decode_optional_value(bytes, &mut cursor)?;
        let component_len = read_u64(bytes, &mut cursor)? as usize;

        let mut present = Vec::with_capacity(component_len);
        for _ in 0..component_len {
            present.push(read_u64(bytes, &mut cursor)?);
        }

        Ok(Self {
            null_count,
            non_null_count,
            total_width,
            min,
            max,
            component_counts: ComponentCounts { present },
        })
    }
}

impl Default for ValueStatistics {
    fn default() -> Self {
        Self::new()
    }
}
