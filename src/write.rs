//! Write ISO 8211 records.
//!
//! Field bodies are built with [`encode_ddr_field`] (descriptive fields) or
//! [`encode_field`]/[`encode_values`] (data fields), then assembled into a
//! complete record, leader and directory included, by a [`RecordBuilder`]:
//!
//! ```
//! # use iso8211::write::{RecordBuilder, encode_ddr_field};
//! # use iso8211::ddr::DdrRecord;
//! let ddr = RecordBuilder::ddr(3, 6)
//!     .field("0001", encode_ddr_field("0100;&", "Record id", "", "(I(5))"))
//!     .build()
//!     .unwrap();
//! let parsed = DdrRecord::parse(&ddr).unwrap();
//! assert_eq!(parsed.catalogue.len(), 1);
//! ```
use log::debug;

use crate::ddr::FieldDescriptor;
use crate::directory::{DirectoryEntry, digits, encode_directory};
use crate::dr::Value;
use crate::format_specs::{DataType, FormatList, FormatUnit};
use crate::iso_error::{IsoError, IsoResult};
use crate::leader::Leader;
use crate::{FIELD_TERM, LEADER_LENGTH, UNIT_TERM};

/// Encode a descriptive field body: controls, then name, label and format
/// separated by unit terminators, closed by a field terminator.
pub fn encode_ddr_field(controls: &str, name: &str, label: &str, format: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(controls.len() + name.len() + label.len() + format.len() + 3);
    out.extend_from_slice(controls.as_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(UNIT_TERM);
    out.extend_from_slice(label.as_bytes());
    out.push(UNIT_TERM);
    out.extend_from_slice(format.as_bytes());
    out.push(FIELD_TERM);
    out
}

/// Encode a descriptor back into a descriptive field body.
pub fn encode_descriptor(desc: &FieldDescriptor) -> Vec<u8> {
    let label = desc.label.as_ref().map(|l| l.to_string()).unwrap_or_default();
    encode_ddr_field(&desc.controls, &desc.name, &label, &desc.format.to_string())
}

/// Encode values as a data field body under `format`, reusing its repeating
/// tail as long as values remain.
///
/// Fixed units are padded: text to the left, numbers to the right, with
/// integers zero filled. Returns `InvalidValue` if a value does not fit its
/// unit or does not match the unit's type.
pub fn encode_values(values: &[Value], format: &FormatList) -> IsoResult<Vec<u8>> {
    encode(values, format, true, "")
}

/// Encode values as the body of the data field described by `desc`.
///
/// Only vector and array fields repeat their format; an elementary field with
/// more values than units is an `InvalidValue` error.
pub fn encode_field(desc: &FieldDescriptor, values: &[Value]) -> IsoResult<Vec<u8>> {
    encode(values, &desc.format, desc.structure_type.repeats(), &desc.tag)
}

fn encode(values: &[Value], format: &FormatList, repeat: bool, tag: &str) -> IsoResult<Vec<u8>> {
    let mut out = vec![];

    if format.is_empty() {
        match values {
            [] => (),
            [Value::Str(s)] => out.extend_from_slice(s.as_bytes()),
            [v, ..] => return Err(invalid(tag, 0, v, "string", "a field without a format holds a single string")),
        }
        out.push(FIELD_TERM);
        return Ok(out);
    }

    let mut cursor = format.cursor(repeat);
    for value in values {
        let (_, unit) = cursor.next()
            .ok_or_else(|| invalid(tag, out.len(), value, type_name(DataType::Ignore), "no format unit is left for this value"))?;
        encode_unit(value, unit, tag, &mut out)?;
    }

    out.push(FIELD_TERM);
    Ok(out)
}

fn encode_unit(value: &Value, unit: &FormatUnit, tag: &str, out: &mut Vec<u8>) -> IsoResult<()> {
    let offset = out.len();
    let t = type_name(unit.data_type);
    let text = value_bytes(value, unit.data_type)
        .ok_or_else(|| invalid(tag, offset, value, t, "value does not match the unit type"))?;

    if let Some(n) = unit.byte_len() {
        match value {
            Value::Bits(_) | Value::Opaque(_) if text.len() != n => {
                return Err(invalid(tag, offset, value, t, format!("needs exactly {n} bytes, got {}", text.len())));
            },
            _ if text.len() > n => {
                return Err(invalid(tag, offset, value, t, format!("does not fit in {n} bytes")));
            },
            _ => (),
        }

        let pad = n - text.len();
        match (value, unit.data_type) {
            (Value::Int(i), DataType::Int) if *i < 0 => {
                out.push(b'-');
                out.extend(std::iter::repeat(b'0').take(pad));
                out.extend_from_slice(&text[1..]);
            },
            (Value::Int(_), DataType::Int) => {
                out.extend(std::iter::repeat(b'0').take(pad));
                out.extend_from_slice(&text);
            },
            (_, t) if t.is_numeric() => {
                out.extend(std::iter::repeat(b' ').take(pad));
                out.extend_from_slice(&text);
            },
            _ => {
                out.extend_from_slice(&text);
                out.extend(std::iter::repeat(b' ').take(pad));
            },
        }
    } else {
        let delim = if unit.delimiter != 0 { unit.delimiter } else { UNIT_TERM };
        if text.iter().any(|b| *b == delim || *b == FIELD_TERM) {
            return Err(invalid(tag, offset, value, t, "value contains its own delimiter"));
        }
        out.extend_from_slice(&text);
        out.push(delim);
    }

    Ok(())
}

/// The unpadded bytes of a value under a unit type, `None` if the two do not match.
fn value_bytes(value: &Value, data_type: DataType) -> Option<Vec<u8>> {
    let bytes = match (value, data_type) {
        (Value::Str(s), DataType::Char) => s.as_bytes().to_vec(),
        (Value::Int(i), DataType::Int) => {
            let mut b = itoa::Buffer::new();
            b.format(*i).as_bytes().to_vec()
        },
        (Value::Int(i), DataType::Float) => format_float(*i as f64, false)?.into_bytes(),
        (Value::Int(i), DataType::ExpFloat) => format_float(*i as f64, true)?.into_bytes(),
        (Value::Float(v), DataType::Float) => format_float(*v, false)?.into_bytes(),
        (Value::Float(v), DataType::ExpFloat) => format_float(*v, true)?.into_bytes(),
        (Value::Missing, t) if t.is_numeric() => vec![],
        (Value::Bits(b), DataType::CharBitString | DataType::Bitfield) => b.clone(),
        (Value::Bits(b) | Value::Opaque(b), DataType::Ignore) => b.clone(),
        _ => return None,
    };
    Some(bytes)
}

/// Shortest text that reads back as `v`, e.g. "12.5" or (scaled) "1.25E1".
///
/// Returns `None` for infinities and NaN, which have no representation.
fn format_float(v: f64, scaled: bool) -> Option<String> {
    if !v.is_finite() {
        return None;
    }
    if v == 0.0 {
        return Some(if scaled { "0.0E0" } else { "0.0" }.to_string());
    }

    let d = ryu_floating_decimal::d2d(v.abs());
    let mut b = itoa::Buffer::new();
    let m = b.format(d.mantissa);
    let sign = if v < 0.0 { "-" } else { "" };

    if scaled {
        let (first, rest) = m.split_at(1);
        let rest = rest.trim_end_matches('0');
        let rest = if rest.is_empty() { "0" } else { rest };
        let exponent = d.exponent + m.len() as i32 - 1;
        let mut eb = itoa::Buffer::new();
        return Some(format!("{sign}{first}.{rest}E{}", eb.format(exponent)));
    }

    let s = if d.exponent >= 0 {
        format!("{sign}{m}{}.0", "0".repeat(d.exponent as usize))
    } else {
        let k = d.exponent.unsigned_abs() as usize;
        if m.len() > k {
            let (int, frac) = m.split_at(m.len() - k);
            format!("{sign}{int}.{frac}")
        } else {
            format!("{sign}0.{}{m}", "0".repeat(k - m.len()))
        }
    };
    Some(s)
}

fn type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Char => "string",
        DataType::Int => "implicit point integer",
        DataType::Float => "explicit point number",
        DataType::ExpFloat => "scaled explicit point number",
        DataType::CharBitString => "character bit string",
        DataType::Bitfield => "bit field",
        DataType::Ignore => "ignored subfield",
    }
}

fn invalid(tag: &str, offset: usize, value: &Value, t: &'static str, reason: impl Into<String>) -> IsoError {
    IsoError::InvalidValue { tag: tag.to_string(), offset, s: value.to_string(), t, reason: reason.into() }
}


/// Assembles field bodies into a complete record.
///
/// The directory widths, base, and record length are computed at build time,
/// using the smallest widths that hold every length and position.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    leader: Leader,
    fields: Vec<(String, Vec<u8>)>,
}

impl RecordBuilder {
    /// Start a descriptive record.
    pub fn ddr(interchange_level: u8, field_control_length: usize) -> Self {
        Self { leader: Leader::new_ddr(interchange_level, field_control_length), fields: vec![] }
    }

    /// Start a data record.
    pub fn dr() -> Self {
        Self { leader: Leader::new_dr(), fields: vec![] }
    }

    /// Start from an existing leader; its widths, base and length are replaced at build time.
    pub fn with_leader(leader: Leader) -> Self {
        Self { leader, fields: vec![] }
    }

    /// Append a field. `body` must end with a field terminator.
    pub fn field(mut self, tag: impl Into<String>, body: Vec<u8>) -> Self {
        self.fields.push((tag.into(), body));
        self
    }

    pub fn build(self) -> IsoResult<Vec<u8>> {
        let Self { mut leader, fields } = self;

        let tag_size = fields.first().map(|(t, _)| t.len()).unwrap_or(1);
        let mut entries = Vec::with_capacity(fields.len());
        let mut position = 0;
        for (tag, body) in fields.iter() {
            if tag.len() != tag_size || tag.is_empty() {
                return Err(IsoError::directory(LEADER_LENGTH, format!("tag '{tag}' does not have the common tag width {tag_size}")));
            }
            if body.last() != Some(&FIELD_TERM) {
                return Err(IsoError::FieldOverrun { tag: tag.clone(), offset: position + body.len(), needed: 1, available: 0 });
            }
            entries.push(DirectoryEntry::new(tag.as_str(), body.len(), position));
            position += body.len();
        }

        leader.tag_size = tag_size;
        leader.length_size = entries.iter().map(|e| digits(e.length)).max().unwrap_or(1);
        leader.position_size = entries.iter().map(|e| digits(e.position)).max().unwrap_or(1);
        leader.base = LEADER_LENGTH + entries.len() * leader.entry_width() + 1;
        leader.record_length = leader.base + position;

        let mut record = Vec::with_capacity(leader.record_length);
        record.extend_from_slice(&leader.to_bytes()?);
        record.extend(encode_directory(&entries, &leader)?);
        for (_, body) in fields {
            record.extend(body);
        }

        debug!("built {} record of {} bytes with {} fields", leader.leader_id, record.len(), entries.len());
        Ok(record)
    }
}
