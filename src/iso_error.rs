//! Errors in ISO 8211 leaders, directories, descriptions, or data
use std::fmt::Display;
use pest::RuleType;

/// Type alias for a `Result` with [`IsoError`] as the error type.
pub type IsoResult<T> = Result<T, IsoError>;


/// An error decoding (or encoding) one ISO 8211 record.
///
/// Every variant is terminal for the record in progress: no partial values are
/// returned alongside it. Variants carry enough context (tag, byte offset) for a
/// caller to report the problem or skip to the next record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsoError {
    /// The 24-byte leader had a subfield that was not valid fixed-width ASCII,
    /// an unrecognized leader id, or widths that cannot be used.
    MalformedLeader{ offset: usize, reason: String },

    /// The directory ended before its field terminator was found.
    TruncatedDirectory{ offset: usize },

    /// A directory entry had a non-decimal length or position, a non-ASCII tag,
    /// or the directory disagreed with the leader.
    MalformedDirectory{ offset: usize, reason: String },

    /// A field's format controls did not follow the format grammar.
    InvalidFormatSpec{ spec: String, reason: String },

    /// A field's label did not match the pattern required by its structure type.
    InvalidLabel{ label: String, reason: String },

    /// The structure code in a field's controls was not elementary, vector, or array.
    UnknownStructureCode{ tag: String, code: char },

    /// Two descriptive fields declared the same tag.
    DuplicateTag(String),

    /// A data record field had a tag with no descriptive field.
    UnknownFieldTag(String),

    /// Decoding needed more bytes than the field (or record area) holds.
    FieldOverrun{ tag: String, offset: usize, needed: usize, available: usize },

    /// Bytes were left in a field after its format was exhausted.
    FieldUnderrun{ tag: String, offset: usize, remaining: usize },

    /// The data type code in a field's controls is not one this crate decodes.
    UnsupportedDataType{ tag: String, code: char },

    /// A subfield's text could not be read (or written) as its declared type.
    InvalidValue{ tag: String, offset: usize, s: String, t: &'static str, reason: String },
}

impl Display for IsoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsoError::MalformedLeader { offset, reason } => {
                write!(f, "Malformed leader at byte {offset}: {reason}")
            },
            IsoError::TruncatedDirectory { offset } => {
                write!(f, "Directory truncated at byte {offset} before its field terminator")
            },
            IsoError::MalformedDirectory { offset, reason } => {
                write!(f, "Malformed directory at byte {offset}: {reason}")
            },
            IsoError::InvalidFormatSpec { spec, reason } => {
                write!(f, "Invalid format controls '{spec}': {reason}")
            },
            IsoError::InvalidLabel { label, reason } => {
                write!(f, "Invalid label '{label}': {reason}")
            },
            IsoError::UnknownStructureCode { tag, code } => {
                write!(f, "Field '{tag}' has unknown structure code '{code}'")
            },
            IsoError::DuplicateTag(tag) => {
                write!(f, "Field tag '{tag}' is declared more than once")
            },
            IsoError::UnknownFieldTag(tag) => {
                write!(f, "Field tag '{tag}' has no description in the governing DDR")
            },
            IsoError::FieldOverrun { tag, offset, needed, available } => {
                write!(f, "Field '{tag}' overrun at byte {offset}: needed {needed} bytes, {available} available")
            },
            IsoError::FieldUnderrun { tag, offset, remaining } => {
                write!(f, "Field '{tag}' has {remaining} bytes left at byte {offset} after its format was exhausted")
            },
            IsoError::UnsupportedDataType { tag, code } => {
                write!(f, "Field '{tag}' has unsupported data type code '{code}'")
            },
            IsoError::InvalidValue { tag, offset, s, t, reason } => {
                write!(f, "Could not read '{s}' as a {t} in field '{tag}' at byte {offset}: {reason}")
            },
        }
    }
}

impl std::error::Error for IsoError {}

impl IsoError {
    pub fn format_from_pest<R: RuleType>(e: pest::error::Error<R>, spec: &str) -> Self {
        Self::InvalidFormatSpec { spec: spec.to_string(), reason: e.to_string() }
    }

    pub fn label_from_pest<R: RuleType>(e: pest::error::Error<R>, label: &str) -> Self {
        Self::InvalidLabel { label: label.to_string(), reason: e.to_string() }
    }

    /// The field tag this error refers to, if it refers to one.
    pub fn tag(&self) -> Option<&str> {
        match self {
            IsoError::UnknownStructureCode { tag, .. }
            | IsoError::FieldOverrun { tag, .. }
            | IsoError::FieldUnderrun { tag, .. }
            | IsoError::UnsupportedDataType { tag, .. }
            | IsoError::InvalidValue { tag, .. } => Some(tag),
            IsoError::DuplicateTag(tag) | IsoError::UnknownFieldTag(tag) => Some(tag),
            _ => None
        }
    }

    pub(crate) fn leader(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedLeader { offset, reason: reason.into() }
    }

    pub(crate) fn directory(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedDirectory { offset, reason: reason.into() }
    }
}
