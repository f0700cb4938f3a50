//! Decode data records (DRs) against a DDR catalogue.
//!
//! Every field in a data record is walked with the format of its descriptor,
//! producing one [`DecodedValue`] per subfield consumed:
//!
//! ```
//! # use iso8211::ddr::{Catalogue, FieldDescriptor};
//! # use iso8211::directory::DirectoryEntry;
//! # use iso8211::dr::{parse_dr, Value};
//! # use iso8211::leader::Leader;
//! let fd = FieldDescriptor::parse("PAIR", b"1100;&Pair\x1fA!B\x1f(2I(4))", 6).unwrap();
//! let catalogue = Catalogue::new(Leader::new_ddr(3, 6), vec![fd]).unwrap();
//!
//! let area = b"00120034\x1e";
//! let values = parse_dr(area, &[DirectoryEntry::new("PAIR", 9, 0)], &catalogue).unwrap();
//! assert_eq!(values[0].value, Value::Int(12));
//! assert_eq!(values[1].vec_tag.as_deref(), Some("B"));
//! ```
//!
//! Decoding can be adjusted with [`DecodeSettings`], passed to the `_custom`
//! variants of the decoding functions. The non-custom versions use
//! `DecodeSettings::default()`.
use std::fmt::Display;

use log::{debug, trace};

use crate::ddr::{Catalogue, FieldDescriptor, field_area};
use crate::directory::{DirectoryEntry, parse_dr_directory};
use crate::format_specs::DataType;
use crate::iso_error::{IsoError, IsoResult};
use crate::leader::{Leader, parse_dr_leader};
use crate::parsing::{self, BadValue};
use crate::{LEADER_LENGTH, UNIT_TERM};

/// Settings for decoding data records
///
/// To use, instantiate the default version with `DecodeSettings::default()` and
/// modify the desired settings with the public methods:
///
/// ```
/// # use iso8211::dr::DecodeSettings;
/// let settings = DecodeSettings::default().do_trim(true);
/// ```
#[derive(Debug, Clone)]
pub struct DecodeSettings {
    trim_strings: bool,
    blank_numbers_as_missing: bool,
}

impl DecodeSettings {
    /// Set whether to trim leading and trailing whitespace from character subfields.
    ///
    /// Default is `false`, i.e. strings are returned verbatim.
    pub fn do_trim(mut self, trim_strings: bool) -> Self {
        self.trim_strings = trim_strings;
        self
    }

    /// Set whether an empty or all-blank numeric subfield decodes as [`Value::Missing`].
    ///
    /// Default is `true`. When `false`, such subfields are an `InvalidValue` error.
    pub fn blank_numbers_as_missing(mut self, missing: bool) -> Self {
        self.blank_numbers_as_missing = missing;
        self
    }
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self { trim_strings: false, blank_numbers_as_missing: true }
    }
}


/// The payload of one decoded subfield.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    /// Raw bytes of a bit string or bit field subfield
    Bits(Vec<u8>),
    /// Raw bytes of an ignored subfield
    Opaque(Vec<u8>),
    /// A numeric subfield that was empty or blank
    Missing,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        if let Self::Str(s) = self { Some(s) } else { None }
    }

    pub fn as_i64(&self) -> Option<i64> {
        if let Self::Int(i) = self { Some(*i) } else { None }
    }

    /// Floating point view of a numeric value; integers are converted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bits(b) | Self::Opaque(b) => Some(b),
            _ => None
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bits(b) | Value::Opaque(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            },
            Value::Missing => write!(f, ""),
        }
    }
}

/// One subfield of a data record, with the field and element it came from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecodedValue {
    pub field_tag: String,
    /// The element's name within a vector or array field
    pub vec_tag: Option<String>,
    /// Type of the format unit that produced the value
    pub data_type: DataType,
    pub value: Value,
}


/// Decode every field of a data record with the default settings.
///
/// `area` is the record's data area (from the leader's base to its record
/// length) and `entries` its directory. Error offsets are relative to `area`.
pub fn parse_dr(area: &[u8], entries: &[DirectoryEntry], catalogue: &Catalogue) -> IsoResult<Vec<DecodedValue>> {
    parse_dr_custom(area, entries, catalogue, DecodeSettings::default())
}

/// Decode every field of a data record with customized settings.
pub fn parse_dr_custom(area: &[u8], entries: &[DirectoryEntry], catalogue: &Catalogue, settings: DecodeSettings) -> IsoResult<Vec<DecodedValue>> {
    let mut values = vec![];
    for entry in entries {
        let desc = catalogue.get(&entry.tag)
            .ok_or_else(|| IsoError::UnknownFieldTag(entry.tag.clone()))?;
        let content = entry.slice(area)?;
        let n = values.len();
        decode_field(desc, content, entry.position, &settings, &mut values)?;
        trace!("field '{}': {} values from {} bytes", entry.tag, values.len() - n, entry.length);
    }

    Ok(values)
}

fn decode_field(desc: &FieldDescriptor, content: &[u8], offset: usize, settings: &DecodeSettings, out: &mut Vec<DecodedValue>) -> IsoResult<()> {
    if desc.format.is_empty() {
        let value = decode_value(DataType::Char, content, settings, &desc.tag, offset)?;
        out.push(DecodedValue { field_tag: desc.tag.clone(), vec_tag: desc.vec_tag(0, 0), data_type: DataType::Char, value });
        return Ok(());
    }

    let mut cursor = desc.format.cursor(desc.structure_type.repeats());
    let mut pos = 0;
    let mut element = 0;
    let mut last_unit = None;

    while pos < content.len() {
        let (unit_idx, unit) = cursor.next()
            .ok_or_else(|| IsoError::FieldUnderrun {
                tag: desc.tag.clone(),
                offset: offset + pos,
                remaining: content.len() - pos,
            })?;

        let rest = &content[pos..];
        let (raw, consumed) = if let Some(n) = unit.byte_len() {
            if n > rest.len() {
                return Err(IsoError::FieldOverrun {
                    tag: desc.tag.clone(),
                    offset: offset + pos,
                    needed: n,
                    available: rest.len(),
                });
            }
            (&rest[..n], n)
        } else {
            let delim = if unit.delimiter != 0 { unit.delimiter } else { UNIT_TERM };
            match rest.iter().position(|b| *b == delim) {
                Some(i) => (&rest[..i], i + 1),
                None => (rest, rest.len()),
            }
        };

        let value = decode_value(unit.data_type, raw, settings, &desc.tag, offset + pos)?;
        out.push(DecodedValue {
            field_tag: desc.tag.clone(),
            vec_tag: desc.vec_tag(unit_idx, element),
            data_type: unit.data_type,
            value,
        });

        pos += consumed;
        element += 1;
        last_unit = Some(unit_idx);
    }

    // The content must end on a pass boundary, never partway through the units.
    let units = desc.format.units();
    if let Some(i) = last_unit.filter(|i| i + 1 < units.len()) {
        let needed = units[i + 1..].iter().map(|u| u.byte_len().unwrap_or(1)).sum();
        return Err(IsoError::FieldOverrun {
            tag: desc.tag.clone(),
            offset: offset + pos,
            needed,
            available: 0,
        });
    }

    Ok(())
}

fn decode_value(data_type: DataType, raw: &[u8], settings: &DecodeSettings, tag: &str, offset: usize) -> IsoResult<Value> {
    let bad = |t: &'static str, reason: String| IsoError::InvalidValue {
        tag: tag.to_string(),
        offset,
        s: String::from_utf8_lossy(raw).into_owned(),
        t,
        reason,
    };

    let text = || std::str::from_utf8(raw)
        .map_err(|e| bad("string", format!("not valid UTF-8 ({e})")));

    let numeric = |t: &'static str, parse: fn(&str) -> Result<Value, BadValue>| -> IsoResult<Value> {
        let s = text()?.trim();
        if s.is_empty() {
            return if settings.blank_numbers_as_missing {
                Ok(Value::Missing)
            } else {
                Err(bad(t, "subfield is blank".to_string()))
            };
        }
        parse(s).map_err(|e| bad(e.t, e.reason))
    };

    match data_type {
        DataType::Char => {
            let s = text()?;
            let s = if settings.trim_strings { s.trim() } else { s };
            Ok(Value::Str(s.to_string()))
        },
        DataType::Int => numeric("implicit point integer", |s| parsing::parse_implicit_point(s).map(Value::Int)),
        DataType::Float => numeric("explicit point number", |s| parsing::parse_explicit_point(s).map(Value::Float)),
        DataType::ExpFloat => numeric("scaled explicit point number", |s| parsing::parse_scaled_point(s).map(Value::Float)),
        DataType::CharBitString | DataType::Bitfield => Ok(Value::Bits(raw.to_vec())),
        DataType::Ignore => Ok(Value::Opaque(raw.to_vec())),
    }
}


/// A decoded data record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataRecord {
    pub leader: Leader,
    pub directory: Vec<DirectoryEntry>,
    pub values: Vec<DecodedValue>,
}

impl DataRecord {
    /// Parse a complete data record, leader included, with the default settings.
    pub fn parse(record: &[u8], catalogue: &Catalogue) -> IsoResult<Self> {
        Self::parse_custom(record, catalogue, DecodeSettings::default())
    }

    /// Parse a complete data record with customized settings.
    ///
    /// A record with leader id `R` takes any zero directory widths from the catalogue's leader.
    pub fn parse_custom(record: &[u8], catalogue: &Catalogue, settings: DecodeSettings) -> IsoResult<Self> {
        let leader = parse_dr_leader(record, Some(catalogue.leader()))?;
        let directory = parse_dr_directory(&record[LEADER_LENGTH..], &leader)?;
        let area = field_area(record, &leader)?;
        let values = parse_dr_custom(area, &directory, catalogue, settings)?;
        debug!("data record: {} fields, {} values", directory.len(), values.len());
        Ok(Self { leader, directory, values })
    }

    /// All values decoded from fields with this tag, in record order.
    pub fn values_for<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a DecodedValue> + 'a {
        self.values.iter().filter(move |v| v.field_tag == tag)
    }

    /// The first value decoded from a field with this tag.
    pub fn first(&self, tag: &str) -> Option<&DecodedValue> {
        self.values.iter().find(|v| v.field_tag == tag)
    }

    /// The first value of element `vec_tag` in a field with this tag.
    pub fn get(&self, tag: &str, vec_tag: &str) -> Option<&Value> {
        self.values.iter()
            .find(|v| v.field_tag == tag && v.vec_tag.as_deref() == Some(vec_tag))
            .map(|v| &v.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FIELD_TERM;

    fn catalogue(fields: &[(&str, &str, &str, &str)]) -> IsoResult<Catalogue> {
        let mut descs = vec![];
        for (tag, controls, label, format) in fields {
            let mut body = controls.as_bytes().to_vec();
            body.extend_from_slice(b"name\x1f");
            body.extend_from_slice(label.as_bytes());
            body.push(UNIT_TERM);
            body.extend_from_slice(format.as_bytes());
            descs.push(FieldDescriptor::parse(tag, &body, 6)?);
        }
        Catalogue::new(Leader::new_ddr(3, 6), descs)
    }

    /// Lay out fields back to back, returning the area and its directory
    fn area(fields: &[(&str, &[u8])]) -> (Vec<u8>, Vec<DirectoryEntry>) {
        let mut area = vec![];
        let mut entries = vec![];
        for (tag, content) in fields {
            let position = area.len();
            area.extend_from_slice(content);
            area.push(FIELD_TERM);
            entries.push(DirectoryEntry::new(*tag, content.len() + 1, position));
        }
        (area, entries)
    }

    #[test]
    fn test_two_ints() -> IsoResult<()> {
        let cat = catalogue(&[("NUMS", "0100;&", "", "2I(4)")])?;
        let (area, entries) = area(&[("NUMS", b"00120034")]);
        let values = parse_dr(&area, &entries, &cat)?;
        let ints: Vec<_> = values.iter().map(|v| v.value.clone()).collect();
        assert_eq!(ints, [Value::Int(12), Value::Int(34)]);
        assert!(values.iter().all(|v| v.vec_tag.is_none() && v.data_type == DataType::Int));
        Ok(())
    }

    #[test]
    fn test_repeating_tail() -> IsoResult<()> {
        let cat = catalogue(&[("SG2D", "1600;&", "*YCOO!XCOO", "(2I(3))")])?;
        let (area, entries) = area(&[("SG2D", b"001002003004005006")]);
        let values = parse_dr(&area, &entries, &cat)?;
        assert_eq!(values.len(), 6, "18 bytes of 6-byte groups should give three repeats");
        let tags: Vec<_> = values.iter().filter_map(|v| v.vec_tag.as_deref()).collect();
        assert_eq!(tags, ["YCOO", "XCOO", "YCOO", "XCOO", "YCOO", "XCOO"]);
        assert_eq!(values[5].value, Value::Int(6));
        Ok(())
    }

    #[test]
    fn test_head_and_tail() -> IsoResult<()> {
        let cat = catalogue(&[("HDTL", "1600;&", "N!A!B", "(A(2),(I(1),R(3)))")])?;
        let (area, entries) = area(&[("HDTL", b"xy11.522.5")]);
        let values = parse_dr(&area, &entries, &cat)?;
        let got: Vec<_> = values.iter().map(|v| v.value.clone()).collect();
        assert_eq!(got, [
            Value::Str("xy".into()), Value::Int(1), Value::Float(1.5), Value::Int(2), Value::Float(2.5)
        ]);
        let tags: Vec<_> = values.iter().filter_map(|v| v.vec_tag.as_deref()).collect();
        assert_eq!(tags, ["N", "A", "B", "A", "B"]);
        Ok(())
    }

    #[test]
    fn test_partial_group() {
        let cat = catalogue(&[("SG2D", "1600;&", "YCOO!XCOO", "(2I(3))")]).unwrap();
        let (area, entries) = area(&[("SG2D", b"00100200")]);
        let e = parse_dr(&area, &entries, &cat);
        assert!(matches!(e, Err(IsoError::FieldOverrun { offset: 6, needed: 3, available: 2, .. })), "Got {e:?}");
    }

    #[test]
    fn test_incomplete_group() {
        let cat = catalogue(&[("SG2D", "1600;&", "YCOO!XCOO", "(2I(3))")]).unwrap();
        let (area, entries) = area(&[("SG2D", b"001002003")]);
        let e = parse_dr(&area, &entries, &cat);
        assert!(matches!(e, Err(IsoError::FieldOverrun { offset: 9, needed: 3, available: 0, .. })), "Got {e:?}");

        let cat = catalogue(&[("PAIR", "0100;&", "", "(I(2),I(2))")]).unwrap();
        let (area, entries) = self::area(&[("PAIR", b"12")]);
        let e = parse_dr(&area, &entries, &cat);
        assert!(matches!(e, Err(IsoError::FieldOverrun { offset: 2, needed: 2, available: 0, .. })), "Got {e:?}");
    }

    #[test]
    fn test_elementary_underrun() {
        let cat = catalogue(&[("ELEM", "0100;&", "", "(I(2))")]).unwrap();
        let (area, entries) = area(&[("ELEM", b"1234")]);
        let e = parse_dr(&area, &entries, &cat);
        assert_eq!(e, Err(IsoError::FieldUnderrun { tag: "ELEM".into(), offset: 2, remaining: 2 }));
    }

    #[test]
    fn test_delimited() -> IsoResult<()> {
        let cat = catalogue(&[("ATTF", "1600;&", "ATTL!ATVL", "(I(,),A)")])?;
        let (area, entries) = area(&[("ATTF", b"42,deep water\x1f7,\x1f")]);
        let values = parse_dr(&area, &entries, &cat)?;
        let got: Vec<_> = values.iter().map(|v| v.value.clone()).collect();
        assert_eq!(got, [Value::Int(42), Value::Str("deep water".into()), Value::Int(7), Value::Str("".into())]);
        Ok(())
    }

    #[test]
    fn test_missing_numbers() -> IsoResult<()> {
        let cat = catalogue(&[("NUMS", "0100;&", "", "(I(4),R(4))")])?;
        let (area, entries) = area(&[("NUMS", b"    12.5")]);
        let values = parse_dr(&area, &entries, &cat)?;
        assert!(values[0].value.is_missing());
        assert_eq!(values[1].value, Value::Float(12.5));

        let settings = DecodeSettings::default().blank_numbers_as_missing(false);
        let e = parse_dr_custom(&area, &entries, &cat, settings);
        assert!(matches!(e, Err(IsoError::InvalidValue { offset: 0, .. })), "Blank integer accepted: {e:?}");
        Ok(())
    }

    #[test]
    fn test_bad_number() {
        let cat = catalogue(&[("NUMS", "0100;&", "", "(I(4))")]).unwrap();
        let (area, entries) = area(&[("NUMS", b"12x4")]);
        let e = parse_dr(&area, &entries, &cat);
        if let Err(IsoError::InvalidValue { tag, s, .. }) = e {
            assert_eq!((tag.as_str(), s.as_str()), ("NUMS", "12x4"));
        } else {
            panic!("Bad integer gave {e:?}");
        }
    }

    #[test]
    fn test_trim() -> IsoResult<()> {
        let cat = catalogue(&[("NAME", "0000;&", "", "(A(8))")])?;
        let (area, entries) = area(&[("NAME", b"Harbor  ")]);
        let values = parse_dr(&area, &entries, &cat)?;
        assert_eq!(values[0].value.as_str(), Some("Harbor  "));

        let values = parse_dr_custom(&area, &entries, &cat, DecodeSettings::default().do_trim(true))?;
        assert_eq!(values[0].value.as_str(), Some("Harbor"));
        Ok(())
    }

    #[test]
    fn test_binary_types() -> IsoResult<()> {
        let cat = catalogue(&[("BITS", "1600;&", "FLAG!SKIP", "(B(12),X(1))")])?;
        let (area, entries) = area(&[("BITS", &[0xab, 0xc0, 0x00])]);
        let values = parse_dr(&area, &entries, &cat)?;
        assert_eq!(values[0].value, Value::Bits(vec![0xab, 0xc0]));
        assert_eq!(values[1].value, Value::Opaque(vec![0x00]));
        assert_eq!(values[0].value.to_string(), "abc0");
        Ok(())
    }

    #[test]
    fn test_no_format() -> IsoResult<()> {
        let cat = catalogue(&[("0000", "0000;&", "", "")])?;
        let (area, entries) = area(&[("0000", b"file title")]);
        let values = parse_dr(&area, &entries, &cat)?;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, Value::Str("file title".into()));
        Ok(())
    }

    #[test]
    fn test_array_tags() -> IsoResult<()> {
        let cat = catalogue(&[
            ("GRID", "2100;&", "R1!R2*C1!C2", "(I(1))"),
            ("CUBE", "2100;&", "[2,2]", "(I(1))"),
        ])?;
        let (area, entries) = area(&[("GRID", b"1234"), ("CUBE", b"5678")]);
        let values = parse_dr(&area, &entries, &cat)?;
        let tags: Vec<_> = values.iter().filter_map(|v| v.vec_tag.as_deref()).collect();
        assert_eq!(tags, ["R1!C1", "R1!C2", "R2!C1", "R2!C2", "[0,0]", "[1,0]", "[0,1]", "[1,1]"]);
        Ok(())
    }

    #[test]
    fn test_unknown_tag() {
        let cat = catalogue(&[("NUMS", "0100;&", "", "(I(4))")]).unwrap();
        let (area, entries) = area(&[("NOPE", b"1234")]);
        assert_eq!(parse_dr(&area, &entries, &cat), Err(IsoError::UnknownFieldTag("NOPE".into())));
    }

    #[test]
    fn test_non_utf8_text() {
        let cat = catalogue(&[("NAME", "0000;&", "", "(A(2))")]).unwrap();
        let (area, entries) = area(&[("NAME", &[0xff, 0xfe])]);
        let e = parse_dr(&area, &entries, &cat);
        assert!(matches!(e, Err(IsoError::InvalidValue { .. })), "Invalid UTF-8 accepted: {e:?}");
    }

    #[test]
    fn test_lookup() -> IsoResult<()> {
        let cat = catalogue(&[("VRID", "1600;&", "RCNM!RCID", "(I(2),I(5))"), ("NAME", "0000;&", "", "(A)")])?;
        let (area, directory) = area(&[("VRID", b"1100042"), ("NAME", b"buoy")]);
        let values = parse_dr(&area, &directory, &cat)?;
        let rec = DataRecord { leader: Leader::new_dr(), directory, values };

        assert_eq!(rec.values_for("VRID").count(), 2);
        assert_eq!(rec.first("NAME").map(|v| &v.value), Some(&Value::Str("buoy".into())));
        assert_eq!(rec.get("VRID", "RCID").and_then(Value::as_i64), Some(42));
        assert!(rec.first("NONE").is_none());
        Ok(())
    }
}
