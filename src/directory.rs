//! The record directory: one (tag, length, position) entry per field.
//!
//! The directory follows the leader and ends with a field terminator. Each entry
//! is three fixed-width ASCII subfields whose widths come from the leader. The
//! position is relative to the start of the field area (the leader's base), and
//! the length includes the field's closing terminator.
use log::{debug, trace};

use crate::iso_error::{IsoError, IsoResult};
use crate::leader::{Leader, LeaderId};
use crate::parsing::ascii_decimal;
use crate::{FIELD_TERM, LEADER_LENGTH};

/// The two field tags with a fixed meaning in every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReservedTag {
    /// Tag `0`: the file (or record) name field
    RecordName,
    /// Tag `1`: the record identifier field
    RecordIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DirectoryEntry {
    pub tag: String,
    /// Byte length of the field, including its field terminator
    pub length: usize,
    /// Offset of the field from the start of the field area
    pub position: usize,
}

impl DirectoryEntry {
    pub fn new(tag: impl Into<String>, length: usize, position: usize) -> Self {
        Self { tag: tag.into(), length, position }
    }

    /// Which reserved field this is, if any. Tags are compared by numeric value,
    /// so "0", "00" and "0000" are all the record name.
    pub fn reserved(&self) -> Option<ReservedTag> {
        match ascii_decimal(self.tag.as_bytes()) {
            Some(0) => Some(ReservedTag::RecordName),
            Some(1) => Some(ReservedTag::RecordIdentifier),
            _ => None
        }
    }

    /// The field's content within `area`, without its field terminator.
    ///
    /// Returns `FieldOverrun` if the field runs past the end of the area or
    /// does not end in a field terminator.
    pub(crate) fn slice<'a>(&self, area: &'a [u8]) -> IsoResult<&'a [u8]> {
        let end = self.position.checked_add(self.length).unwrap_or(usize::MAX);
        if self.length == 0 || end > area.len() {
            return Err(IsoError::FieldOverrun {
                tag: self.tag.clone(),
                offset: self.position,
                needed: self.length,
                available: area.len().saturating_sub(self.position),
            });
        }

        if area[end - 1] != FIELD_TERM {
            return Err(IsoError::FieldOverrun {
                tag: self.tag.clone(),
                offset: end - 1,
                needed: 1,
                available: 0,
            });
        }

        Ok(&area[self.position..end - 1])
    }
}

/// Parse the directory of a descriptive record.
///
/// `bytes` starts just after the leader and must run at least through the
/// directory's field terminator. Offsets in errors count from the start of the record.
pub fn parse_ddr_directory(bytes: &[u8], leader: &Leader) -> IsoResult<Vec<DirectoryEntry>> {
    if leader.leader_id != LeaderId::Ddr {
        return Err(IsoError::directory(LEADER_LENGTH, format!("expected a DDR leader, got leader id '{}'", leader.leader_id)));
    }
    parse_directory(bytes, leader)
}

/// Parse the directory of a data record; see [`parse_ddr_directory`].
pub fn parse_dr_directory(bytes: &[u8], leader: &Leader) -> IsoResult<Vec<DirectoryEntry>> {
    if !leader.leader_id.is_data() {
        return Err(IsoError::directory(LEADER_LENGTH, format!("expected a data record leader, got leader id '{}'", leader.leader_id)));
    }
    parse_directory(bytes, leader)
}

fn parse_directory(bytes: &[u8], leader: &Leader) -> IsoResult<Vec<DirectoryEntry>> {
    let width = leader.entry_width();
    if width == 0 {
        return Err(IsoError::directory(LEADER_LENGTH, "directory entries have zero width"));
    }

    let mut entries = vec![];
    let mut pos = 0;
    loop {
        match bytes.get(pos) {
            None => return Err(IsoError::TruncatedDirectory { offset: LEADER_LENGTH + pos }),
            Some(&FIELD_TERM) => break,
            Some(_) => (),
        }

        let raw = bytes.get(pos..pos + width)
            .ok_or(IsoError::TruncatedDirectory { offset: LEADER_LENGTH + bytes.len() })?;
        let (tag, rest) = raw.split_at(leader.tag_size);
        let (length, position) = rest.split_at(leader.length_size);

        let offset = LEADER_LENGTH + pos;
        if !tag.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(IsoError::directory(offset, format!("tag {tag:?} is not printable ASCII")));
        }
        let tag = String::from_utf8_lossy(tag).into_owned();

        let length = ascii_decimal(length)
            .ok_or_else(|| IsoError::directory(offset + leader.tag_size, format!("field length for '{tag}' is not a decimal number")))?;
        let position = ascii_decimal(position)
            .ok_or_else(|| IsoError::directory(offset + leader.tag_size + leader.length_size, format!("field position for '{tag}' is not a decimal number")))?;

        trace!("directory entry: tag = '{tag}', length = {length}, position = {position}");
        entries.push(DirectoryEntry { tag, length, position });
        pos += width;
    }

    let size = pos + 1;
    if leader.base != LEADER_LENGTH + size {
        return Err(IsoError::directory(
            LEADER_LENGTH + pos,
            format!("leader gives base {} but the directory ends at byte {}", leader.base, LEADER_LENGTH + size)
        ));
    }

    debug!("parsed directory with {} entries", entries.len());
    Ok(entries)
}

/// Encode a directory, including its field terminator, with the widths given in `leader`.
///
/// Returns `MalformedDirectory` if a tag is not exactly `tag_size` bytes or a
/// length or position does not fit its width.
pub fn encode_directory(entries: &[DirectoryEntry], leader: &Leader) -> IsoResult<Vec<u8>> {
    let mut out = Vec::with_capacity(entries.len() * leader.entry_width() + 1);
    for entry in entries {
        let offset = LEADER_LENGTH + out.len();
        if entry.tag.len() != leader.tag_size {
            return Err(IsoError::directory(offset, format!("tag '{}' is not {} bytes wide", entry.tag, leader.tag_size)));
        }
        out.extend_from_slice(entry.tag.as_bytes());

        if !put_padded(&mut out, entry.length, leader.length_size) {
            return Err(IsoError::directory(offset, format!("length {} of '{}' does not fit in {} digits", entry.length, entry.tag, leader.length_size)));
        }
        if !put_padded(&mut out, entry.position, leader.position_size) {
            return Err(IsoError::directory(offset, format!("position {} of '{}' does not fit in {} digits", entry.position, entry.tag, leader.position_size)));
        }
    }
    out.push(FIELD_TERM);
    Ok(out)
}

/// Number of decimal digits needed to write `value`.
pub(crate) fn digits(value: usize) -> usize {
    let mut buf = itoa::Buffer::new();
    buf.format(value).len()
}

fn put_padded(out: &mut Vec<u8>, value: usize, width: usize) -> bool {
    let mut buf = itoa::Buffer::new();
    let s = buf.format(value);
    if s.len() > width {
        return false;
    }
    out.extend(std::iter::repeat(b'0').take(width - s.len()));
    out.extend_from_slice(s.as_bytes());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dr_leader(base: usize) -> Leader {
        Leader { base, length_size: 2, position_size: 3, tag_size: 4, ..Leader::new_dr() }
    }

    #[test]
    fn test_parse() -> IsoResult<()> {
        let bytes = b"000110000010501010\x1efield data";
        let leader = dr_leader(LEADER_LENGTH + 19);
        let entries = parse_dr_directory(bytes, &leader)?;
        assert_eq!(entries, [DirectoryEntry::new("0001", 10, 0), DirectoryEntry::new("0105", 1, 10)]);
        assert_eq!(entries[0].reserved(), Some(ReservedTag::RecordIdentifier));
        assert_eq!(entries[1].reserved(), None);

        // Parsing again gives the same result
        assert_eq!(parse_dr_directory(bytes, &leader)?, entries);
        Ok(())
    }

    #[test]
    fn test_empty() -> IsoResult<()> {
        let entries = parse_dr_directory(b"\x1e", &dr_leader(LEADER_LENGTH + 1))?;
        assert!(entries.is_empty());
        Ok(())
    }

    #[test]
    fn test_truncated() {
        let leader = dr_leader(LEADER_LENGTH + 19);
        let e = parse_dr_directory(b"000110000010501010", &leader);
        assert_eq!(e, Err(IsoError::TruncatedDirectory { offset: LEADER_LENGTH + 18 }));

        let e = parse_dr_directory(b"0001100000105", &leader);
        assert!(matches!(e, Err(IsoError::TruncatedDirectory { .. })), "A cut-short entry did not give TruncatedDirectory");
    }

    #[test]
    fn test_malformed() {
        let leader = dr_leader(LEADER_LENGTH + 10);
        let e = parse_dr_directory(b"00011x000\x1e", &leader);
        assert!(matches!(e, Err(IsoError::MalformedDirectory { offset: 28, .. })), "Bad length gave {e:?}");

        let leader = dr_leader(LEADER_LENGTH + 11);
        let e = parse_dr_directory(b"000110000\x1e", &leader);
        assert!(matches!(e, Err(IsoError::MalformedDirectory { .. })), "Wrong base gave {e:?}");

        let e = parse_ddr_directory(b"000110000\x1e", &leader);
        assert!(matches!(e, Err(IsoError::MalformedDirectory { .. })), "DR leader accepted for a DDR directory");
    }

    #[test]
    fn test_reserved_widths() {
        assert_eq!(DirectoryEntry::new("0", 1, 0).reserved(), Some(ReservedTag::RecordName));
        assert_eq!(DirectoryEntry::new("0000", 1, 0).reserved(), Some(ReservedTag::RecordName));
        assert_eq!(DirectoryEntry::new("1", 1, 0).reserved(), Some(ReservedTag::RecordIdentifier));
        assert_eq!(DirectoryEntry::new("DSID", 1, 0).reserved(), None);
    }

    #[test]
    fn test_slice() -> IsoResult<()> {
        let area = b"abc\x1ede\x1e";
        assert_eq!(DirectoryEntry::new("A", 4, 0).slice(area)?, b"abc");
        assert_eq!(DirectoryEntry::new("B", 3, 4).slice(area)?, b"de");

        let e = DirectoryEntry::new("C", 5, 4).slice(area);
        assert!(matches!(e, Err(IsoError::FieldOverrun { .. })), "Span past the area was accepted");
        let e = DirectoryEntry::new("D", 2, 0).slice(area);
        assert!(matches!(e, Err(IsoError::FieldOverrun { offset: 1, .. })), "Span without a terminator was accepted");
        Ok(())
    }

    #[test]
    fn test_encode() -> IsoResult<()> {
        let leader = dr_leader(LEADER_LENGTH + 19);
        let entries = vec![DirectoryEntry::new("0001", 10, 0), DirectoryEntry::new("0105", 1, 10)];
        let bytes = encode_directory(&entries, &leader)?;
        assert_eq!(bytes, b"000110000010501010\x1e");
        assert_eq!(parse_dr_directory(&bytes, &leader)?, entries);

        let e = encode_directory(&[DirectoryEntry::new("0001", 100, 0)], &leader);
        assert!(matches!(e, Err(IsoError::MalformedDirectory { .. })), "Oversized length was encoded");
        let e = encode_directory(&[DirectoryEntry::new("01", 1, 0)], &leader);
        assert!(matches!(e, Err(IsoError::MalformedDirectory { .. })), "Short tag was encoded");
        Ok(())
    }
}
