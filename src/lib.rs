//! Read and write ISO/IEC 8211 files, the record format underneath S-57 charts
//! and several other exchange standards.
//!
//! A file is one data descriptive record (DDR) describing every field, followed
//! by data records (DRs) holding the values. Decoding goes leader, directory,
//! then fields: [`leader`], [`directory`], [`ddr`] and [`dr`] expose each step,
//! and [`reader::Iso8211Reader`] runs them over a whole stream.
extern crate pest;
#[macro_use]
extern crate pest_derive;
pub mod iso_error;
pub mod leader;
pub mod directory;
pub mod format_specs;
pub mod label;
pub mod ddr;
pub mod dr;
pub(crate) mod parsing;
pub mod write;
pub mod reader;

/// Length of every record leader
pub const LEADER_LENGTH: usize = 24;
/// Ends each field and the directory
pub const FIELD_TERM: u8 = 0x1e;
/// Separates delimited subfields
pub const UNIT_TERM: u8 = 0x1f;

pub use iso_error::{IsoError, IsoResult};
pub use leader::{Leader, LeaderId, parse_ddr_leader, parse_dr_leader};
pub use directory::{DirectoryEntry, parse_ddr_directory, parse_dr_directory};
pub use ddr::{Catalogue, FieldDescriptor, parse_ddr};
pub use dr::{DataRecord, DecodedValue, DecodeSettings, Value, parse_dr, parse_dr_custom};
pub use reader::Iso8211Reader;
