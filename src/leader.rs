//! Decode and encode the fixed 24-byte record leader.
//!
//! Both kinds of record open with a leader. The descriptive record (DDR) leader
//! carries the interchange level and the length of the field controls, while a
//! data record (DR) leader leaves those slots reserved. Both end with the three
//! single-digit widths used to read the directory that follows:
//!
//! ```
//! # use iso8211::leader::{parse_ddr_leader, LeaderId};
//! let leader = parse_ddr_leader(b"000243LE1 0900000 ! 1201").unwrap();
//! assert_eq!(leader.leader_id, LeaderId::Ddr);
//! assert_eq!(leader.field_control_length, 9);
//! assert_eq!((leader.length_size, leader.position_size, leader.tag_size), (1, 2, 1));
//! ```
use std::fmt::Display;
use std::ops::Range;

use log::trace;

use crate::iso_error::{IsoError, IsoResult};
use crate::parsing::ascii_decimal;
use crate::LEADER_LENGTH;

const RECORD_LENGTH: Range<usize> = 0..5;
const INTERCHANGE_LEVEL: usize = 5;
const LEADER_ID: usize = 6;
const EXTENSION_FLAG: usize = 7;
const VERSION: usize = 8;
const APPLICATION_FLAG: usize = 9;
const FIELD_CONTROL_LENGTH: Range<usize> = 10..12;
const BASE: Range<usize> = 12..17;
const EXTENDED_CHARSET: Range<usize> = 17..20;
const LENGTH_SIZE: usize = 20;
const POSITION_SIZE: usize = 21;
const RESERVED_ZERO: usize = 22;
const TAG_SIZE: usize = 23;

/// What kind of record a leader opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LeaderId {
    /// `L`: the data descriptive record.
    Ddr,
    /// `D`: a data record with its own complete leader.
    Data,
    /// `R`: a data record repeating the structure of the prior descriptive record.
    /// Its zero widths are inherited from the governing DDR leader.
    Repeating,
}

impl LeaderId {
    /// The leader id byte as written in the leader.
    pub fn code(&self) -> u8 {
        match self {
            LeaderId::Ddr => b'L',
            LeaderId::Data => b'D',
            LeaderId::Repeating => b'R',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'L' => Some(Self::Ddr),
            b'D' => Some(Self::Data),
            b'R' => Some(Self::Repeating),
            _ => None
        }
    }

    /// `true` for either kind of data record
    pub fn is_data(&self) -> bool {
        !matches!(self, Self::Ddr)
    }
}

impl Display for LeaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code() as char)
    }
}

/// A decoded record leader.
///
/// For data records, `interchange_level` and `field_control_length` are always 0,
/// and the flag and character set slots hold the reserved blanks.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Leader {
    /// Total record length in bytes, leader included.
    pub record_length: usize,
    pub interchange_level: u8,
    pub leader_id: LeaderId,
    /// Inline code extension indicator, `E` or blank.
    pub extension_flag: char,
    /// Version of the standard, `1` for ISO 8211:1994 or blank for earlier editions.
    pub version: char,
    pub application_flag: char,
    /// Number of bytes of field controls opening each descriptive field.
    pub field_control_length: usize,
    /// Offset from the start of the record to the field area.
    pub base: usize,
    /// Extended character set indicator, kept verbatim (3 characters).
    pub extended_charset: String,
    /// Digits used for each field length in the directory.
    pub length_size: usize,
    /// Digits used for each field position in the directory.
    pub position_size: usize,
    /// Characters used for each field tag in the directory.
    pub tag_size: usize,
}

impl Leader {
    /// Build a descriptive record leader; the record length and base are usually
    /// filled in later by the record writer.
    pub fn new_ddr(interchange_level: u8, field_control_length: usize) -> Self {
        Self {
            record_length: LEADER_LENGTH,
            interchange_level,
            leader_id: LeaderId::Ddr,
            extension_flag: ' ',
            version: ' ',
            application_flag: ' ',
            field_control_length,
            base: LEADER_LENGTH,
            extended_charset: "   ".to_string(),
            length_size: 1,
            position_size: 1,
            tag_size: 1,
        }
    }

    /// Build a data record leader with leader id `D`.
    pub fn new_dr() -> Self {
        Self {
            interchange_level: 0,
            leader_id: LeaderId::Data,
            field_control_length: 0,
            ..Self::new_ddr(0, 0)
        }
    }

    /// Width in bytes of one directory entry.
    pub fn entry_width(&self) -> usize {
        self.tag_size + self.length_size + self.position_size
    }

    /// Number of bytes in the field area (descriptive or user data area).
    pub fn area_length(&self) -> usize {
        self.record_length.saturating_sub(self.base)
    }

    /// Encode this leader as its 24 fixed-width bytes.
    ///
    /// Returns `MalformedLeader` if any value does not fit its slot.
    pub fn to_bytes(&self) -> IsoResult<[u8; LEADER_LENGTH]> {
        let mut buf = [b' '; LEADER_LENGTH];
        put_decimal(&mut buf, RECORD_LENGTH, self.record_length)?;
        buf[LEADER_ID] = self.leader_id.code();
        put_decimal(&mut buf, BASE, self.base)?;
        put_decimal(&mut buf, LENGTH_SIZE..LENGTH_SIZE+1, self.length_size)?;
        put_decimal(&mut buf, POSITION_SIZE..POSITION_SIZE+1, self.position_size)?;
        buf[RESERVED_ZERO] = b'0';
        put_decimal(&mut buf, TAG_SIZE..TAG_SIZE+1, self.tag_size)?;

        if self.leader_id == LeaderId::Ddr {
            put_decimal(&mut buf, INTERCHANGE_LEVEL..INTERCHANGE_LEVEL+1, self.interchange_level as usize)?;
            buf[EXTENSION_FLAG] = put_char(self.extension_flag, EXTENSION_FLAG)?;
            buf[VERSION] = put_char(self.version, VERSION)?;
            buf[APPLICATION_FLAG] = put_char(self.application_flag, APPLICATION_FLAG)?;
            put_decimal(&mut buf, FIELD_CONTROL_LENGTH, self.field_control_length)?;

            let charset = self.extended_charset.as_bytes();
            if charset.len() != EXTENDED_CHARSET.len() || !charset.iter().all(|b| is_leader_char(*b)) {
                return Err(IsoError::leader(EXTENDED_CHARSET.start, format!("extended character set '{}' is not 3 ASCII characters", self.extended_charset)));
            }
            buf[EXTENDED_CHARSET].copy_from_slice(charset);
        }

        Ok(buf)
    }
}

/// Decode the leader of a data descriptive record.
///
/// `bytes` must hold at least the 24 leader bytes; anything after them is ignored.
pub fn parse_ddr_leader(bytes: &[u8]) -> IsoResult<Leader> {
    let buf = leader_bytes(bytes)?;
    let record_length = record_length(buf)?;

    let leader_id = LeaderId::from_code(buf[LEADER_ID])
        .filter(|id| *id == LeaderId::Ddr)
        .ok_or_else(|| IsoError::leader(LEADER_ID, format!("leader id '{}' does not mark a descriptive record", buf[LEADER_ID].escape_ascii())))?;

    let interchange_level = match buf[INTERCHANGE_LEVEL] {
        b' ' => 0,
        b @ b'0'..=b'9' => b - b'0',
        b => return Err(IsoError::leader(INTERCHANGE_LEVEL, format!("interchange level '{}' is not a digit", b.escape_ascii())))
    };

    let extension_flag = get_char(buf, EXTENSION_FLAG)?;
    let version = get_char(buf, VERSION)?;
    let application_flag = get_char(buf, APPLICATION_FLAG)?;
    let field_control_length = get_decimal(buf, FIELD_CONTROL_LENGTH, "field control length")?;
    let base = get_decimal(buf, BASE, "field area base")?;

    let charset = &buf[EXTENDED_CHARSET];
    if !charset.iter().all(|b| is_leader_char(*b)) {
        return Err(IsoError::leader(EXTENDED_CHARSET.start, "extended character set is not printable ASCII"));
    }
    // Checked above: every byte is printable ASCII
    let extended_charset = charset.iter().map(|b| *b as char).collect();

    let length_size = required_width(buf, LENGTH_SIZE, "length size")?;
    let position_size = required_width(buf, POSITION_SIZE, "position size")?;
    let tag_size = required_width(buf, TAG_SIZE, "tag size")?;

    let leader = Leader {
        record_length, interchange_level, leader_id, extension_flag, version, application_flag,
        field_control_length, base, extended_charset, length_size, position_size, tag_size
    };
    trace!("DDR leader: {leader:?}");
    Ok(leader)
}

/// Decode the leader of a data record.
///
/// A record with leader id `R` may leave its widths zero (or blank); those are
/// then taken from `governing`, the leader of the DDR it repeats. Any other data
/// record must carry nonzero widths of its own.
pub fn parse_dr_leader(bytes: &[u8], governing: Option<&Leader>) -> IsoResult<Leader> {
    let buf = leader_bytes(bytes)?;
    let record_length = record_length(buf)?;

    let leader_id = LeaderId::from_code(buf[LEADER_ID])
        .filter(|id| id.is_data())
        .ok_or_else(|| IsoError::leader(LEADER_ID, format!("leader id '{}' does not mark a data record", buf[LEADER_ID].escape_ascii())))?;

    let base = get_decimal(buf, BASE, "data area base")?;

    let mut widths = [0usize; 3];
    for (width, (idx, what)) in widths.iter_mut().zip([(LENGTH_SIZE, "length size"), (POSITION_SIZE, "position size"), (TAG_SIZE, "tag size")]) {
        let own = optional_width(buf, idx, what)?;
        *width = if own > 0 {
            own
        } else if leader_id == LeaderId::Repeating {
            let governing = governing.ok_or_else(|| IsoError::leader(idx, format!("{what} is zero and no governing DDR leader was given")))?;
            match idx {
                LENGTH_SIZE => governing.length_size,
                POSITION_SIZE => governing.position_size,
                _ => governing.tag_size,
            }
        } else {
            return Err(IsoError::leader(idx, format!("{what} is zero, which is only legal for a repeating data record")));
        };
    }
    let [length_size, position_size, tag_size] = widths;

    let leader = Leader {
        record_length,
        interchange_level: 0,
        leader_id,
        extension_flag: ' ',
        version: ' ',
        application_flag: ' ',
        field_control_length: 0,
        base,
        extended_charset: "   ".to_string(),
        length_size,
        position_size,
        tag_size,
    };
    trace!("DR leader: {leader:?}");
    Ok(leader)
}

fn leader_bytes(bytes: &[u8]) -> IsoResult<&[u8]> {
    bytes.get(..LEADER_LENGTH)
        .ok_or_else(|| IsoError::leader(bytes.len(), format!("expected {LEADER_LENGTH} leader bytes, got {}", bytes.len())))
}

fn record_length(buf: &[u8]) -> IsoResult<usize> {
    let n = get_decimal(buf, RECORD_LENGTH, "record length")?;
    if n < LEADER_LENGTH {
        return Err(IsoError::leader(RECORD_LENGTH.start, format!("record length {n} is shorter than the leader")));
    }
    Ok(n)
}

fn get_decimal(buf: &[u8], range: Range<usize>, what: &str) -> IsoResult<usize> {
    let raw = &buf[range.clone()];
    ascii_decimal(raw).ok_or_else(|| {
        IsoError::leader(range.start, format!("{what} '{}' is not a {}-digit decimal", raw.escape_ascii(), raw.len()))
    })
}

fn required_width(buf: &[u8], idx: usize, what: &str) -> IsoResult<usize> {
    let w = get_decimal(buf, idx..idx+1, what)?;
    if w == 0 {
        return Err(IsoError::leader(idx, format!("{what} is zero, which is only legal for a repeating data record")));
    }
    Ok(w)
}

fn optional_width(buf: &[u8], idx: usize, what: &str) -> IsoResult<usize> {
    if buf[idx] == b' ' {
        Ok(0)
    } else {
        get_decimal(buf, idx..idx+1, what)
    }
}

fn get_char(buf: &[u8], idx: usize) -> IsoResult<char> {
    let b = buf[idx];
    if is_leader_char(b) {
        Ok(b as char)
    } else {
        Err(IsoError::leader(idx, format!("byte '{}' is not printable ASCII", b.escape_ascii())))
    }
}

fn put_char(c: char, idx: usize) -> IsoResult<u8> {
    u8::try_from(c).ok()
        .filter(|b| is_leader_char(*b))
        .ok_or_else(|| IsoError::leader(idx, format!("'{c}' is not printable ASCII")))
}

fn put_decimal(buf: &mut [u8], range: Range<usize>, value: usize) -> IsoResult<()> {
    let mut b = itoa::Buffer::new();
    let digits = b.format(value).as_bytes();
    let width = range.len();
    if digits.len() > width {
        return Err(IsoError::leader(range.start, format!("{value} does not fit in {width} digits")));
    }

    let slot = &mut buf[range];
    let npad = width - digits.len();
    slot[..npad].fill(b'0');
    slot[npad..].copy_from_slice(digits);
    Ok(())
}

fn is_leader_char(b: u8) -> bool {
    b.is_ascii_graphic() || b == b' '
}
