//! Represent ISO 8211 format controls as Rust types.
//!
//! Each descriptive field ends with its format controls, a FORTRAN-like list
//! such as "(A(4),I(3),2(R,S(;)))" describing how the field's data splits into
//! subfields. The first step in working with one is to parse it into a
//! [`FormatList`]:
//!
//! ```
//! # use iso8211::format_specs::{FormatList, FormatUnit, DataType};
//! let fl = FormatList::parse("(A(4),2I(3))").unwrap();
//! assert_eq!(fl.units(), &[
//!     FormatUnit::fixed(DataType::Char, 4),
//!     FormatUnit::fixed(DataType::Int, 3),
//!     FormatUnit::fixed(DataType::Int, 3),
//! ]);
//! ```
//!
//! Repeat counts on every item except the last are expanded into literal copies.
//! The last parenthesised group (or the whole list, if it does not end in a group)
//! is the repeating tail: it is reused for as long as a vector or array field has
//! data left. The tail is kept as an index into the unit list, see
//! [`FormatList::repeat_from`] and [`FormatList::cursor`].
use std::fmt::Display;

use itertools::Itertools;
use pest::{Parser, iterators::Pair};

use crate::iso_error::{IsoError, IsoResult};

/// Upper bound on the number of units a format may expand to.
const MAX_UNITS: usize = 1 << 16;

#[derive(Parser)]
#[grammar = "iso8211.pest"]
pub(crate) struct IsoParser;

/// How a field's elements are arranged, from the first character of its controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StructureType {
    /// `0`: a single value
    Elementary,
    /// `1`: a linear sequence of labelled subfields
    Vector,
    /// `2`: a multi-dimensional array of subfields
    Array,
}

impl StructureType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'0' => Some(Self::Elementary),
            b'1' => Some(Self::Vector),
            b'2' => Some(Self::Array),
            _ => None
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            StructureType::Elementary => b'0',
            StructureType::Vector => b'1',
            StructureType::Array => b'2',
        }
    }

    /// `true` if the field's format repeats to absorb all of its data
    pub fn repeats(&self) -> bool {
        !matches!(self, Self::Elementary)
    }
}

impl Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StructureType::Elementary => "elementary",
            StructureType::Vector => "vector",
            StructureType::Array => "array",
        };

        write!(f, "{s}")
    }
}

/// The type of a subfield.
///
/// The standard calls the numeric types "implicit point" (`I`), "explicit point"
/// (`R`) and "scaled explicit point" (`S`); here they are `Int`, `Float` and
/// `ExpFloat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DataType {
    Char,
    Int,
    Float,
    ExpFloat,
    CharBitString,
    Bitfield,
    Ignore,
}

impl DataType {
    /// Look up the type for a format control letter (`A`, `I`, `R`, `S`, `C`, `B`, or `X`)
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::Char),
            'I' => Some(Self::Int),
            'R' => Some(Self::Float),
            'S' => Some(Self::ExpFloat),
            'C' => Some(Self::CharBitString),
            'B' => Some(Self::Bitfield),
            'X' => Some(Self::Ignore),
            _ => None
        }
    }

    /// The format control letter for this type, also used as its type code in decoded values.
    pub fn code(&self) -> char {
        match self {
            DataType::Char => 'A',
            DataType::Int => 'I',
            DataType::Float => 'R',
            DataType::ExpFloat => 'S',
            DataType::CharBitString => 'C',
            DataType::Bitfield => 'B',
            DataType::Ignore => 'X',
        }
    }

    /// Look up the type for the second character of a field's controls.
    ///
    /// Code `6` marks a field of mixed types; its units carry the real types, so
    /// the field as a whole is reported as `Ignore`.
    pub fn from_control_code(code: u8) -> Option<Self> {
        match code {
            b'0' => Some(Self::Char),
            b'1' => Some(Self::Int),
            b'2' => Some(Self::Float),
            b'3' => Some(Self::ExpFloat),
            b'4' => Some(Self::CharBitString),
            b'5' => Some(Self::Bitfield),
            b'6' => Some(Self::Ignore),
            _ => None
        }
    }

    pub fn control_code(&self) -> u8 {
        match self {
            DataType::Char => b'0',
            DataType::Int => b'1',
            DataType::Float => b'2',
            DataType::ExpFloat => b'3',
            DataType::CharBitString => b'4',
            DataType::Bitfield => b'5',
            DataType::Ignore => b'6',
        }
    }

    /// `true` for the three decimal types
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::ExpFloat)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}


/// One subfield of a format: a type plus either a fixed width or a delimiter.
///
/// At most one of `length` and `delimiter` is nonzero. If both are zero the subfield
/// runs up to the next unit terminator (or the end of the field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FormatUnit {
    pub data_type: DataType,
    /// Fixed width; bits for `Bitfield`, bytes otherwise
    pub length: usize,
    pub delimiter: u8,
}

impl FormatUnit {
    /// A unit of fixed width, e.g. `A(4)`
    pub fn fixed(data_type: DataType, length: usize) -> Self {
        Self { data_type, length, delimiter: 0 }
    }

    /// A unit ending at a specific delimiter, e.g. `A(,)`
    pub fn delimited(data_type: DataType, delimiter: u8) -> Self {
        Self { data_type, length: 0, delimiter }
    }

    /// A unit ending at the unit terminator, e.g. `A`
    pub fn terminated(data_type: DataType) -> Self {
        Self { data_type, length: 0, delimiter: 0 }
    }

    pub fn is_fixed(&self) -> bool {
        self.length > 0
    }

    /// Number of bytes a fixed unit occupies, `None` for delimited units.
    ///
    /// Bit field widths are given in bits and round up to whole bytes.
    pub fn byte_len(&self) -> Option<usize> {
        if !self.is_fixed() {
            None
        } else if let DataType::Bitfield = self.data_type {
            Some((self.length + 7) / 8)
        } else {
            Some(self.length)
        }
    }
}

impl Display for FormatUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.length > 0 {
            write!(f, "{}({})", self.data_type, self.length)
        } else if self.delimiter != 0 {
            write!(f, "{}({})", self.data_type, self.delimiter as char)
        } else {
            write!(f, "{}", self.data_type)
        }
    }
}


/// An iterator over the units of a format, in the order they apply to data.
///
/// When created to repeat, it restarts at the repeating tail every time the unit
/// list is exhausted, and so never ends on its own (unless the format is empty).
/// Each item is the unit's index in [`FormatList::units`] along with the unit.
#[derive(Debug, Clone)]
pub struct UnitCursor<'f> {
    format: &'f FormatList,
    next: usize,
    repeat: bool,
}

impl<'f> Iterator for UnitCursor<'f> {
    type Item = (usize, &'f FormatUnit);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.format.units.len() {
            if !self.repeat || self.format.repeat_from >= self.format.units.len() {
                return None;
            }
            self.next = self.format.repeat_from;
        }

        let i = self.next;
        self.next += 1;
        Some((i, &self.format.units[i]))
    }
}


/// A parsed format: the unit sequence and where its repeating tail starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FormatList {
    pub(crate) units: Vec<FormatUnit>,
    pub(crate) repeat_from: usize,
}

impl FormatList {
    /// Build a format list directly from units. `repeat_from` is clamped to the
    /// number of units.
    pub fn new(units: Vec<FormatUnit>, repeat_from: usize) -> Self {
        let repeat_from = repeat_from.min(units.len());
        Self { units, repeat_from }
    }

    /// Parse format controls and return a `FormatList` instance.
    ///
    /// The controls may be wrapped in parentheses (`"(A,I)"`) or not (`"A,I"`);
    /// an empty string gives an empty list. Whitespace is not allowed.
    ///
    /// Returns `InvalidFormatSpec` if the controls have invalid syntax, an unknown
    /// type letter, or a unit with both a width and a delimiter.
    pub fn parse(fmt_str: &str) -> IsoResult<Self> {
        let tree = IsoParser::parse(Rule::format, fmt_str)
            .map_err(|e| IsoError::format_from_pest(e, fmt_str))?
            .next()
            .ok_or_else(|| invalid(fmt_str, "no format found"))?;

        let list = match tree.into_inner().find(|p| p.as_rule() == Rule::list) {
            Some(list) => list,
            None => return Ok(Self::default()),
        };

        let mut items: Vec<_> = list.into_inner().collect();
        let last = items.pop().ok_or_else(|| invalid(fmt_str, "empty list"))?;

        let mut units = vec![];
        expand(items, &mut units, fmt_str)?;

        // The repeat count on a trailing group is dropped: the group repeats as
        // often as the data requires.
        let tail_group = last.clone().into_inner().find(|p| p.as_rule() == Rule::group);
        let repeat_from = if let Some(group) = tail_group {
            let start = units.len();
            expand(group.into_inner().collect(), &mut units, fmt_str)?;
            start
        } else {
            expand(vec![last], &mut units, fmt_str)?;
            0
        };

        Ok(Self { units, repeat_from })
    }

    /// Consume the `FormatList` instance and return the inner `Vec<FormatUnit>`.
    pub fn into_units(self) -> Vec<FormatUnit> {
        self.units
    }

    pub fn units(&self) -> &[FormatUnit] {
        &self.units
    }

    /// Index of the first unit of the repeating tail
    pub fn repeat_from(&self) -> usize {
        self.repeat_from
    }

    /// The units that repeat
    pub fn tail(&self) -> &[FormatUnit] {
        &self.units[self.repeat_from..]
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Walk the units in data order; with `repeat` the tail is reused indefinitely.
    pub fn cursor(&self, repeat: bool) -> UnitCursor<'_> {
        UnitCursor { format: self, next: 0, repeat }
    }

    /// Bytes used by one pass over the tail, if every tail unit is fixed.
    pub fn tail_byte_len(&self) -> Option<usize> {
        self.tail().iter().map(|u| u.byte_len()).sum()
    }
}

impl Display for FormatList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.units.is_empty() {
            return Ok(());
        }

        let head = self.units[..self.repeat_from].iter().join(",");
        let tail = self.tail().iter().join(",");
        match (head.is_empty(), self.repeat_from == 0) {
            (_, true) => write!(f, "({tail})"),
            (false, false) if tail.is_empty() => write!(f, "({head})"),
            _ => write!(f, "({head},({tail}))"),
        }
    }
}

fn invalid(spec: &str, reason: impl Into<String>) -> IsoError {
    IsoError::InvalidFormatSpec { spec: spec.to_string(), reason: reason.into() }
}

/// Append the units for a sequence of list items, expanding repeat counts.
fn expand(items: Vec<Pair<Rule>>, units: &mut Vec<FormatUnit>, spec: &str) -> IsoResult<()> {
    let mut stack: Vec<_> = items.into_iter().rev().collect();
    let mut next_repeat: usize = 1;

    while let Some(pair) = stack.pop() {
        let unit = match pair.as_rule() {
            // End of string, exit the loop
            Rule::EOI => break,

            Rule::repeat => {
                next_repeat = pair.as_str().parse()
                    .map_err(|e| invalid(spec, format!("repeat count '{}' is too large ({e})", pair.as_str())))?;
                if next_repeat == 0 {
                    return Err(invalid(spec, "repeat count must be at least 1"));
                }
                continue;
            },

            Rule::list | Rule::item => {
                for inner in pair.into_inner().rev() {
                    stack.push(inner);
                }
                continue;
            },

            Rule::group => {
                // Every copy adds at least one unit, so check before building them.
                if next_repeat > MAX_UNITS - units.len() {
                    return Err(invalid(spec, format!("expands to more than {MAX_UNITS} units")));
                }
                for _ in 0..next_repeat {
                    for inner in pair.clone().into_inner().rev() {
                        stack.push(inner);
                    }
                }
                next_repeat = 1;
                continue;
            },

            Rule::unit => unit_from_pair(pair, spec)?,

            // Widths and delimiters are consumed as part of their unit, so
            // reaching one here means the tree is not what we expect.
            rule => return Err(invalid(spec, format!("unexpected {rule:?} at '{}'", pair.as_str()))),
        };

        if next_repeat > MAX_UNITS - units.len() {
            return Err(invalid(spec, format!("expands to more than {MAX_UNITS} units")));
        }
        for _ in 0..next_repeat {
            units.push(unit);
        }
        next_repeat = 1;
    }

    Ok(())
}

fn unit_from_pair(pair: Pair<Rule>, spec: &str) -> IsoResult<FormatUnit> {
    let mut inner = pair.into_inner();
    let letter = inner.next()
        .and_then(|p| p.as_str().chars().next())
        .ok_or_else(|| invalid(spec, "unit without a type letter"))?;
    let data_type = DataType::from_letter(letter)
        .ok_or_else(|| invalid(spec, format!("unknown data type letter '{letter}'")))?;

    let sizing = match inner.next().and_then(|p| p.into_inner().next()) {
        Some(s) => s,
        None => return Ok(FormatUnit::terminated(data_type)),
    };

    match sizing.as_rule() {
        Rule::width => {
            let width = sizing.as_str().parse()
                .map_err(|e| invalid(spec, format!("width '{}' is too large ({e})", sizing.as_str())))?;
            Ok(FormatUnit::fixed(data_type, width))
        },
        Rule::delimiter => {
            let delim = sizing.as_str().as_bytes();
            if delim.len() != 1 {
                return Err(invalid(spec, format!("delimiter '{}' is not a single byte", sizing.as_str())));
            }
            Ok(FormatUnit::delimited(data_type, delim[0]))
        },
        Rule::both => Err(invalid(spec, format!("unit '{letter}({})' declares both a width and a delimiter", sizing.as_str()))),
        rule => Err(invalid(spec, format!("unexpected {rule:?} in unit sizing"))),
    }
}
