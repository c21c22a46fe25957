//! Core types for the query tree

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::match_data::SlotHandle;

/// Stable numeric identity of a term-bearing node
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TermId(pub u32);

impl TermId {
    /// The following id, or `None` once the id space is exhausted
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// First id not used by a tree whose largest id is `max`
    pub fn first_free(max: Option<TermId>) -> Option<Self> {
        match max {
            Some(id) => id.next(),
            None => Some(TermId(1)),
        }
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Term weight as used by the ranking framework
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weight(pub i32);

impl Default for Weight {
    fn default() -> Self {
        Weight(100)
    }
}

/// How the value of a leaf term is matched
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    /// Exact word
    #[default]
    Word,
    /// Number or `[lo;hi]` range
    Number,
    Prefix,
    Substring,
    Suffix,
    Regexp,
    /// Geo location spec on a z-curve attribute
    Location,
}

impl TermKind {
    pub fn name(&self) -> &'static str {
        match self {
            TermKind::Word => "word",
            TermKind::Number => "number",
            TermKind::Prefix => "prefix",
            TermKind::Substring => "substring",
            TermKind::Suffix => "suffix",
            TermKind::Regexp => "regexp",
            TermKind::Location => "location",
        }
    }
}

/// Posting unpacking strategy chosen for a term-bearing node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unpacking {
    /// Unpack positions as soon as the node matches
    #[default]
    Eager,
    /// Evaluate after all cheaper siblings have matched
    Lazy,
    /// Cheap unranked word terms filter ahead of this node
    Split,
}

impl Unpacking {
    pub fn is_expensive(&self) -> bool {
        !matches!(self, Unpacking::Eager)
    }
}

/// A concrete field a term was resolved to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub field_id: u32,
    pub name: String,
    pub is_attribute: bool,
    pub filter_only: bool,
    /// Match-data slot, assigned by the reservation pass
    #[serde(skip)]
    pub handle: Option<SlotHandle>,
}

impl FieldBinding {
    pub fn new(field_id: u32, name: impl Into<String>, is_attribute: bool) -> Self {
        Self {
            field_id,
            name: name.into(),
            is_attribute,
            filter_only: false,
            handle: None,
        }
    }
}

/// Data carried by every term-bearing node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermHeader {
    pub id: TermId,
    /// Logical field (view) name as written in the query
    pub view: String,
    #[serde(default)]
    pub weight: Weight,
    /// Unranked terms only filter; they never feed ranking features
    #[serde(default = "default_ranked")]
    pub ranked: bool,
    #[serde(default)]
    pub unpacking: Unpacking,
    /// Concrete fields, populated by view resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldBinding>,
}

fn default_ranked() -> bool {
    true
}

impl TermHeader {
    pub fn new(id: TermId, view: impl Into<String>, weight: Weight) -> Self {
        Self {
            id,
            view: view.into(),
            weight,
            ranked: true,
            unpacking: Unpacking::Eager,
            fields: Vec::new(),
        }
    }
}
