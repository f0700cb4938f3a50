//! The data descriptive record (DDR): one field description per tag.
//!
//! Each DDR field body is laid out as
//!
//! ```text
//! controls | name UT label UT format FT
//! ```
//!
//! where `controls` is `field_control_length` bytes, the first two of which give
//! the field's structure and data type. The catalogue built from these
//! descriptions is then used to decode every data record that follows.
use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::directory::{DirectoryEntry, parse_ddr_directory};
use crate::format_specs::{DataType, FormatList, StructureType};
use crate::iso_error::{IsoError, IsoResult};
use crate::label::Label;
use crate::leader::{Leader, parse_ddr_leader};
use crate::{LEADER_LENGTH, UNIT_TERM};

/// The description of one field, shared by every data record under its DDR.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldDescriptor {
    pub tag: String,
    pub structure_type: StructureType,
    pub data_type: DataType,
    /// The raw field controls, verbatim
    pub controls: String,
    pub name: String,
    pub label: Option<Label>,
    pub format: FormatList,
}

impl FieldDescriptor {
    /// Build a descriptor from the content of one DDR field (without its field terminator).
    pub fn parse(tag: &str, content: &[u8], field_control_length: usize) -> IsoResult<Self> {
        let controls = content.get(..field_control_length)
            .ok_or_else(|| IsoError::FieldOverrun {
                tag: tag.to_string(),
                offset: 0,
                needed: field_control_length,
                available: content.len(),
            })?;

        let (structure_type, data_type) = if field_control_length == 0 {
            (StructureType::Elementary, DataType::Char)
        } else {
            let structure_type = StructureType::from_code(controls[0])
                .ok_or_else(|| IsoError::UnknownStructureCode { tag: tag.to_string(), code: controls[0] as char })?;
            let data_type = match controls.get(1) {
                Some(&c) => DataType::from_control_code(c)
                    .ok_or_else(|| IsoError::UnsupportedDataType { tag: tag.to_string(), code: c as char })?,
                None => DataType::Char,
            };
            (structure_type, data_type)
        };

        let mut parts = content[field_control_length..].splitn(3, |b| *b == UNIT_TERM);
        let name = String::from_utf8_lossy(parts.next().unwrap_or_default()).into_owned();
        let label = String::from_utf8_lossy(parts.next().unwrap_or_default());
        let format = String::from_utf8_lossy(parts.next().unwrap_or_default());

        let label = Label::parse(&label, structure_type)?;
        let format = FormatList::parse(&format)?;

        Ok(Self {
            tag: tag.to_string(),
            structure_type,
            data_type,
            controls: String::from_utf8_lossy(controls).into_owned(),
            name,
            label,
            format,
        })
    }

    /// Name of the `element`th value decoded from this field, by the unit that produced it.
    ///
    /// Elementary fields have no element names.
    pub fn vec_tag(&self, unit_idx: usize, element: usize) -> Option<String> {
        if self.structure_type == StructureType::Elementary {
            return None;
        }

        let tag = match &self.label {
            Some(label) => label.vec_tag(unit_idx, element, self.format.len()),
            None => element.to_string(),
        };
        Some(tag)
    }
}


/// All field descriptions from one DDR, looked up by tag.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Catalogue {
    leader: Leader,
    fields: Vec<FieldDescriptor>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<String, usize>,
}

impl Catalogue {
    /// Returns `DuplicateTag` if two descriptors share a tag.
    pub fn new(leader: Leader, fields: Vec<FieldDescriptor>) -> IsoResult<Self> {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.tag.clone(), i).is_some() {
                return Err(IsoError::DuplicateTag(field.tag.clone()));
            }
        }

        Ok(Self { leader, fields, index })
    }

    pub fn get(&self, tag: &str) -> Option<&FieldDescriptor> {
        self.index.get(tag).map(|&i| &self.fields[i])
    }

    /// The descriptors in DDR order
    pub fn iter(&self) -> std::slice::Iter<'_, FieldDescriptor> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn leader(&self) -> &Leader {
        &self.leader
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalogue {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}


/// Build the field catalogue from the DDR's field area.
///
/// `area` is the record from the leader's base up to its record length;
/// `entries` is the DDR directory. Nothing is returned if any field fails.
pub fn parse_ddr(area: &[u8], leader: &Leader, entries: &[DirectoryEntry]) -> IsoResult<Catalogue> {
    let mut fields = Vec::with_capacity(entries.len());
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.tag.as_str()) {
            return Err(IsoError::DuplicateTag(entry.tag.clone()));
        }
        let content = entry.slice(area)?;
        let field = FieldDescriptor::parse(&entry.tag, content, leader.field_control_length)?;
        trace!("field '{}' ({}): {} {} {}", field.tag, field.name, field.structure_type, field.data_type, field.format);
        fields.push(field);
    }

    let catalogue = Catalogue::new(leader.clone(), fields)?;
    debug!("DDR catalogue has {} fields", catalogue.len());
    Ok(catalogue)
}

/// A whole descriptive record: its directory and the catalogue built from it.
#[derive(Debug, Clone)]
pub struct DdrRecord {
    pub directory: Vec<DirectoryEntry>,
    pub catalogue: Catalogue,
}

impl DdrRecord {
    /// Parse a complete DDR, leader included.
    pub fn parse(record: &[u8]) -> IsoResult<Self> {
        let leader = parse_ddr_leader(record)?;
        let directory = parse_ddr_directory(&record[LEADER_LENGTH..], &leader)?;
        let area = field_area(record, &leader)?;
        let catalogue = parse_ddr(area, &leader, &directory)?;
        Ok(Self { directory, catalogue })
    }

    pub fn into_catalogue(self) -> Catalogue {
        self.catalogue
    }
}

/// The bytes of `record` from the leader's base to its record length.
pub(crate) fn field_area<'r>(record: &'r [u8], leader: &Leader) -> IsoResult<&'r [u8]> {
    if record.len() < leader.record_length {
        return Err(IsoError::leader(0, format!("leader gives record length {} but only {} bytes are available", leader.record_length, record.len())));
    }
    record.get(leader.base..leader.record_length)
        .ok_or_else(|| IsoError::leader(12, format!("base {} is past the record length {}", leader.base, leader.record_length)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FIELD_TERM;
    use crate::format_specs::FormatUnit;

    const FCL: usize = 6;

    fn body(controls: &str, name: &str, label: &str, format: &str) -> Vec<u8> {
        let mut b = controls.as_bytes().to_vec();
        b.extend_from_slice(name.as_bytes());
        b.push(UNIT_TERM);
        b.extend_from_slice(label.as_bytes());
        b.push(UNIT_TERM);
        b.extend_from_slice(format.as_bytes());
        b
    }

    #[test]
    fn test_vector_field() -> IsoResult<()> {
        let content = body("1600;&", "Feature record identifier", "RCNM!RCID!PRIM", "(I(2),I(10),A(1))");
        let fd = FieldDescriptor::parse("FRID", &content, FCL)?;
        assert_eq!(fd.structure_type, StructureType::Vector);
        assert_eq!(fd.data_type, DataType::Ignore);
        assert_eq!(fd.controls, "1600;&");
        assert_eq!(fd.name, "Feature record identifier");
        assert_eq!(fd.label, Some(Label::Vector(vec!["RCNM".into(), "RCID".into(), "PRIM".into()])));
        assert_eq!(fd.format.units(), &[
            FormatUnit::fixed(DataType::Int, 2),
            FormatUnit::fixed(DataType::Int, 10),
            FormatUnit::fixed(DataType::Char, 1),
        ]);
        assert_eq!(fd.vec_tag(1, 1), Some("RCID".to_string()));
        Ok(())
    }

    #[test]
    fn test_elementary_field() -> IsoResult<()> {
        let content = body("0100;&", "DDF RECORD IDENTIFIER", "", "(I(5))");
        let fd = FieldDescriptor::parse("0001", &content, FCL)?;
        assert_eq!(fd.structure_type, StructureType::Elementary);
        assert_eq!(fd.data_type, DataType::Int);
        assert_eq!(fd.label, None);
        assert_eq!(fd.vec_tag(0, 0), None);

        // A file control field with no label or format
        let fd = FieldDescriptor::parse("0000", b"0000;&file name", FCL)?;
        assert_eq!(fd.name, "file name");
        assert!(fd.format.is_empty());
        Ok(())
    }

    #[test]
    fn test_no_controls() -> IsoResult<()> {
        let fd = FieldDescriptor::parse("T", b"Title", 0)?;
        assert_eq!((fd.structure_type, fd.data_type), (StructureType::Elementary, DataType::Char));
        assert_eq!(fd.name, "Title");
        Ok(())
    }

    #[test]
    fn test_bad_controls() {
        let e = FieldDescriptor::parse("ABCD", &body("3100;&", "x", "", ""), FCL);
        assert_eq!(e, Err(IsoError::UnknownStructureCode { tag: "ABCD".into(), code: '3' }));

        let e = FieldDescriptor::parse("ABCD", &body("1900;&", "x", "A", ""), FCL);
        assert_eq!(e, Err(IsoError::UnsupportedDataType { tag: "ABCD".into(), code: '9' }));

        let e = FieldDescriptor::parse("ABCD", b"16", FCL);
        assert!(matches!(e, Err(IsoError::FieldOverrun { .. })), "Short controls were accepted");
    }

    #[test]
    fn test_array_field() -> IsoResult<()> {
        let content = body("2100;&", "Grid", "ROW!COL", "(I(3))");
        let fd = FieldDescriptor::parse("GRID", &content, FCL)?;
        assert_eq!(fd.label, Some(Label::Cartesian { rows: vec!["ROW".into()], cols: vec!["COL".into()], extra: vec![] }));
        Ok(())
    }

    #[test]
    fn test_parse_ddr() -> IsoResult<()> {
        let mut area = body("0100;&", "Record id", "", "(I(5))");
        area.push(FIELD_TERM);
        let first = area.len();
        area.extend(body("1600;&", "Point", "X!Y", "(2R(6))"));
        area.push(FIELD_TERM);

        let leader = Leader::new_ddr(3, FCL);
        let entries = vec![
            DirectoryEntry::new("0001", first, 0),
            DirectoryEntry::new("PNTS", area.len() - first, first),
        ];
        let cat = parse_ddr(&area, &leader, &entries)?;
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.get("PNTS").map(|f| f.name.as_str()), Some("Point"));
        assert!(cat.get("NONE").is_none());
        let tags: Vec<_> = cat.iter().map(|f| f.tag.as_str()).collect();
        assert_eq!(tags, ["0001", "PNTS"]);

        let dup = vec![entries[0].clone(), DirectoryEntry::new("0001", area.len() - first, first)];
        let e = parse_ddr(&area, &leader, &dup);
        assert_eq!(e.map(|c| c.len()), Err(IsoError::DuplicateTag("0001".into())));
        Ok(())
    }

    #[test]
    fn test_duplicate_before_body() {
        let mut area = body("0100;&", "Record id", "", "(I(5))");
        area.push(FIELD_TERM);
        let first = area.len();
        area.extend(body("0100;&", "Broken", "", "(Q(5))"));
        area.push(FIELD_TERM);

        let entries = [
            DirectoryEntry::new("0001", first, 0),
            DirectoryEntry::new("0001", area.len() - first, first),
        ];
        let e = parse_ddr(&area, &Leader::new_ddr(3, FCL), &entries);
        assert_eq!(e.map(|c| c.len()), Err(IsoError::DuplicateTag("0001".into())));
    }

    #[test]
    fn test_field_overrun() {
        let area = body("0100;&", "Record id", "", "(I(5))");
        let leader = Leader::new_ddr(3, FCL);
        let e = parse_ddr(&area, &leader, &[DirectoryEntry::new("0001", area.len(), 0)]);
        assert!(matches!(e, Err(IsoError::FieldOverrun { .. })), "A field without a terminator was accepted");
    }
}
