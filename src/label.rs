//! Field labels: the names given to the elements of vector and array fields.
//!
//! A label's shape depends on the field's structure:
//!
//! - vector fields list one tag per subfield, `RCNM!RCID!PRIM`;
//! - array fields give either a tag vector per dimension, `ROW1!ROW2*COL1!COL2`
//!   (or `ROW!COL`, one tag per dimension), or just the dimension lengths, `[3,4]`;
//! - elementary fields have no label at all.
//!
//! A leading `*` on vector and array labels marks the field as repeating; it
//! carries no information once the field's structure is known and is dropped.
use std::fmt::Display;

use itertools::Itertools;
use pest::{Parser, iterators::Pair};

use crate::format_specs::{IsoParser, Rule, StructureType};
use crate::iso_error::{IsoError, IsoResult};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Label {
    /// Sub-tags of a vector field, in format order
    Vector(Vec<String>),
    /// Tag vectors for each dimension of an array field
    Cartesian{ rows: Vec<String>, cols: Vec<String>, extra: Vec<Vec<String>> },
    /// Lengths of each dimension of an array field, innermost first
    ArrayDescriptor(Vec<usize>),
}

impl Label {
    /// Parse a label for a field of the given structure.
    ///
    /// Returns `Ok(None)` for elementary fields, which must have an empty label.
    /// Any label whose shape does not match the structure gives `InvalidLabel`.
    pub fn parse(label: &str, structure: StructureType) -> IsoResult<Option<Self>> {
        match structure {
            StructureType::Elementary => {
                if label.is_empty() {
                    Ok(None)
                } else {
                    Err(invalid(label, "elementary fields cannot have a label"))
                }
            },
            StructureType::Vector => Self::parse_vector(label).map(Some),
            StructureType::Array => Self::parse_array(label).map(Some),
        }
    }

    fn parse_vector(label: &str) -> IsoResult<Self> {
        let tree = IsoParser::parse(Rule::vector_label, label)
            .map_err(|e| IsoError::label_from_pest(e, label))?;

        let tags = tree.flatten()
            .filter(|p| p.as_rule() == Rule::tag)
            .map(|p| p.as_str().to_string())
            .collect();
        Ok(Self::Vector(tags))
    }

    fn parse_array(label: &str) -> IsoResult<Self> {
        if label.is_empty() {
            return Err(invalid(label, "array fields need a label"));
        }

        if label.starts_with('[') || label.starts_with('(') {
            let tree = IsoParser::parse(Rule::array_descriptor, label)
                .map_err(|e| IsoError::label_from_pest(e, label))?;

            let mut extents = vec![];
            for p in tree.flatten().filter(|p| p.as_rule() == Rule::extent) {
                let n: usize = p.as_str().parse()
                    .map_err(|e| invalid(label, format!("dimension length '{}' is too large ({e})", p.as_str())))?;
                if n == 0 {
                    return Err(invalid(label, "dimension lengths must be at least 1"));
                }
                extents.push(n);
            }
            return Ok(Self::ArrayDescriptor(extents));
        }

        let body = label.strip_prefix('*').unwrap_or(label);
        let mut vectors: Vec<Vec<String>> = if body.contains('*') {
            let tree = IsoParser::parse(Rule::cartesian_label, label)
                .map_err(|e| IsoError::label_from_pest(e, label))?;
            tree.flatten()
                .filter(|p| p.as_rule() == Rule::tags)
                .map(tag_vector)
                .collect()
        } else {
            let tree = IsoParser::parse(Rule::dimension_label, label)
                .map_err(|e| IsoError::label_from_pest(e, label))?;
            tree.flatten()
                .filter(|p| p.as_rule() == Rule::tag)
                .map(|p| vec![p.as_str().to_string()])
                .collect()
        };

        if vectors.len() < 2 {
            return Err(invalid(label, "array labels need at least two dimensions"));
        }
        let extra = vectors.split_off(2);
        let cols = vectors.pop().unwrap_or_default();
        let rows = vectors.pop().unwrap_or_default();
        Ok(Self::Cartesian { rows, cols, extra })
    }

    /// Length of each dimension the label describes.
    ///
    /// For a Cartesian label this is outermost (rows) first; for an array
    /// descriptor it is innermost first, as written.
    pub fn dimensions(&self) -> Vec<usize> {
        match self {
            Label::Vector(tags) => vec![tags.len()],
            Label::Cartesian { rows, cols, extra } => {
                let mut dims = vec![rows.len(), cols.len()];
                dims.extend(extra.iter().map(|v| v.len()));
                dims
            },
            Label::ArrayDescriptor(extents) => extents.clone(),
        }
    }

    /// Name the `element`th value decoded from a field with this label.
    ///
    /// `unit_idx` is the index of the format unit that produced the value and
    /// `n_units` the number of units in the format.
    pub fn vec_tag(&self, unit_idx: usize, element: usize, n_units: usize) -> String {
        match self {
            Label::Vector(tags) => {
                let tag = if tags.len() > n_units {
                    tags.get(element % tags.len())
                } else {
                    tags.get(unit_idx)
                };
                tag.cloned().unwrap_or_else(|| element.to_string())
            },

            Label::Cartesian { rows, cols, extra } => {
                let dims: Vec<&Vec<String>> = [rows, cols].into_iter().chain(extra.iter()).collect();
                let mut coords = vec![0; dims.len()];
                let mut rem = element;
                for (c, dim) in coords.iter_mut().zip(dims.iter()).rev() {
                    *c = rem % dim.len().max(1);
                    rem /= dim.len().max(1);
                }

                dims.iter().zip(coords)
                    .map(|(dim, c)| dim.get(c).map(String::as_str).unwrap_or_default())
                    .join("!")
            },

            Label::ArrayDescriptor(extents) => {
                let mut rem = element;
                let coords = extents.iter().map(|&n| {
                    let c = rem % n.max(1);
                    rem /= n.max(1);
                    c
                });
                format!("[{}]", coords.format(","))
            },
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Vector(tags) => write!(f, "{}", tags.iter().join("!")),
            Label::Cartesian { rows, cols, extra } => {
                let dims: Vec<_> = [rows, cols].into_iter().chain(extra.iter()).collect();
                // One tag per dimension is written in the short `ROW!COL` form.
                let s = if dims.iter().all(|v| v.len() == 1) {
                    dims.iter().flat_map(|v| v.iter()).join("!")
                } else {
                    dims.iter().map(|v| v.iter().join("!")).join("*")
                };
                write!(f, "{s}")
            },
            Label::ArrayDescriptor(extents) => write!(f, "[{}]", extents.iter().join(",")),
        }
    }
}

fn tag_vector(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::tag)
        .map(|p| p.as_str().to_string())
        .collect()
}

fn invalid(label: &str, reason: impl Into<String>) -> IsoError {
    IsoError::InvalidLabel { label: label.to_string(), reason: reason.into() }
}
