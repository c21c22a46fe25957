//! In-memory storage collaborators
//!
//! A small term dictionary per field, enough to drive the planner end to
//! end in tests, benchmarks and the `matchplan` binary. Text fields are
//! indexed as lowercase tokens; numbers and booleans are stored as exact
//! attribute values; `{ "x": .., "y": .. }` objects become positions on the
//! field's z-curve attribute.

mod leaf;

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use regex::Regex;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub use leaf::MemoryLeaf;

use crate::blueprint::{LeafSearch, LeafSpec, RequestContext, SearchContext, Searchable};
use crate::query::location::{zcurve_field_name, LocationSpec};
use crate::query::resolve_view::{FieldKind, SimpleIndexEnvironment};
use crate::query::types::TermKind;

/// A document as loaded from JSON
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: u32,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug)]
enum FieldData {
    Terms(BTreeMap<String, RoaringBitmap>),
    Positions(BTreeMap<u32, (i32, i32)>),
}

#[derive(Debug)]
struct MemoryField {
    kind: FieldKind,
    data: FieldData,
    filter_sensitive: bool,
}

#[derive(Debug, Default)]
struct Inner {
    fields: HashMap<String, MemoryField>,
    doc_id_limit: u32,
}

impl Inner {
    fn terms_mut(&mut self, field: &str, kind: FieldKind) -> &mut BTreeMap<String, RoaringBitmap> {
        let entry = self.fields.entry(field.to_string()).or_insert_with(|| MemoryField {
            kind,
            data: FieldData::Terms(BTreeMap::new()),
            filter_sensitive: false,
        });
        if let FieldData::Positions(_) = entry.data {
            entry.data = FieldData::Terms(BTreeMap::new());
        }
        match &mut entry.data {
            FieldData::Terms(terms) => terms,
            FieldData::Positions(_) => unreachable!("positions replaced above"),
        }
    }

    fn saw_doc(&mut self, doc_id: u32) {
        self.doc_id_limit = self.doc_id_limit.max(doc_id.saturating_add(1));
    }
}

/// Thread-safe in-memory index
#[derive(Debug, Default)]
pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(docs: &[Document]) -> Self {
        let index = Self::new();
        for doc in docs {
            index.add_document(doc);
        }
        index
    }

    pub fn add_document(&self, doc: &Document) {
        for (name, value) in &doc.fields {
            self.add_value(name, doc.id, value);
        }
        self.inner.write().saw_doc(doc.id);
    }

    fn add_value(&self, field: &str, doc_id: u32, value: &Value) {
        match value {
            Value::String(text) => self.index_text(field, doc_id, text),
            Value::Number(n) => self.set_attribute(field, doc_id, &n.to_string()),
            Value::Bool(b) => self.set_attribute(field, doc_id, if *b { "true" } else { "false" }),
            Value::Array(items) => {
                for item in items {
                    self.add_value(field, doc_id, item);
                }
            }
            Value::Object(obj) => {
                let coord = |key: &str| obj.get(key).and_then(Value::as_i64).and_then(|v| i32::try_from(v).ok());
                match (coord("x"), coord("y")) {
                    (Some(x), Some(y)) => self.set_position(field, doc_id, x, y),
                    _ => warn!(field, doc_id, "Ignoring object value without x/y"),
                }
            }
            Value::Null => {}
        }
    }

    /// Index lowercase alphanumeric tokens of `text`
    pub fn index_text(&self, field: &str, doc_id: u32, text: &str) {
        let mut inner = self.inner.write();
        let terms = inner.terms_mut(field, FieldKind::Index);
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            terms.entry(token.to_lowercase()).or_default().insert(doc_id);
        }
        inner.saw_doc(doc_id);
    }

    /// Store an exact attribute value
    pub fn set_attribute(&self, field: &str, doc_id: u32, value: &str) {
        let mut inner = self.inner.write();
        inner
            .terms_mut(field, FieldKind::Attribute)
            .entry(value.to_string())
            .or_default()
            .insert(doc_id);
        inner.saw_doc(doc_id);
    }

    /// Store a position on the z-curve attribute of `field`
    pub fn set_position(&self, field: &str, doc_id: u32, x: i32, y: i32) {
        let mut inner = self.inner.write();
        let entry = inner
            .fields
            .entry(zcurve_field_name(field))
            .or_insert_with(|| MemoryField {
                kind: FieldKind::Attribute,
                data: FieldData::Positions(BTreeMap::new()),
                filter_sensitive: false,
            });
        match &mut entry.data {
            FieldData::Positions(positions) => {
                positions.insert(doc_id, (x, y));
            }
            FieldData::Terms(_) => warn!(field, "Field already holds terms, position ignored"),
        }
        inner.saw_doc(doc_id);
    }

    /// Leaves over a filter-sensitive field want the global filter
    pub fn set_filter_sensitive(&self, field: &str, sensitive: bool) {
        if let Some(f) = self.inner.write().fields.get_mut(field) {
            f.filter_sensitive = sensitive;
        }
    }

    pub fn doc_id_limit(&self) -> u32 {
        self.inner.read().doc_id_limit
    }

    /// Index environment listing every field, sorted by name
    pub fn index_environment(&self) -> SimpleIndexEnvironment {
        let inner = self.inner.read();
        let mut names: Vec<(&String, &MemoryField)> = inner.fields.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        let mut env = SimpleIndexEnvironment::new();
        for (name, field) in names {
            env.add_field(name.clone(), field.kind, false);
        }
        env
    }

    fn is_filter_sensitive(&self, field: &str) -> Option<bool> {
        self.inner.read().fields.get(field).map(|f| f.filter_sensitive)
    }

    /// Documents matching `term` in `field`, or `None` for an unknown field
    pub fn lookup(&self, field: &str, term: &str, kind: TermKind, max_expansions: usize) -> Option<RoaringBitmap> {
        let inner = self.inner.read();
        let f = inner.fields.get(field)?;
        let bits = match (&f.data, kind) {
            (FieldData::Positions(positions), TermKind::Location) => match LocationSpec::parse(term) {
                Ok(spec) => positions
                    .iter()
                    .filter(|&(_, &(x, y))| spec.contains(x, y))
                    .map(|(&doc, _)| doc)
                    .collect(),
                Err(e) => {
                    warn!(field, error = %e, "Unusable location term");
                    RoaringBitmap::new()
                }
            },
            (FieldData::Positions(_), _) => RoaringBitmap::new(),
            (FieldData::Terms(terms), kind) => match_terms(terms, term, kind, max_expansions),
        };
        Some(bits)
    }
}

fn union_of<'m>(
    matches: impl Iterator<Item = (&'m String, &'m RoaringBitmap)>,
    max_expansions: usize,
) -> RoaringBitmap {
    let mut out = RoaringBitmap::new();
    for (_, bits) in matches.take(max_expansions) {
        out |= bits;
    }
    out
}

/// Parse `[lo;hi]`, either bound may be left out
fn parse_range(term: &str) -> Option<(f64, f64)> {
    let inner = term.strip_prefix('[')?.strip_suffix(']')?;
    let (lo, hi) = inner.split_once(';')?;
    let bound = |s: &str, default: f64| {
        let s = s.trim();
        if s.is_empty() {
            Some(default)
        } else {
            s.parse::<f64>().ok()
        }
    };
    Some((bound(lo, f64::NEG_INFINITY)?, bound(hi, f64::INFINITY)?))
}

fn match_terms(
    terms: &BTreeMap<String, RoaringBitmap>,
    term: &str,
    kind: TermKind,
    max_expansions: usize,
) -> RoaringBitmap {
    let lowered = term.to_lowercase();
    match kind {
        TermKind::Word | TermKind::Location => terms
            .get(term)
            .or_else(|| terms.get(&lowered))
            .cloned()
            .unwrap_or_default(),
        TermKind::Number => match parse_range(term) {
            Some((lo, hi)) => union_of(
                terms.iter().filter(|(k, _)| {
                    k.parse::<f64>().map_or(false, |v| v >= lo && v <= hi)
                }),
                max_expansions,
            ),
            None => terms.get(term).cloned().unwrap_or_default(),
        },
        TermKind::Prefix => union_of(
            terms
                .range(lowered.clone()..)
                .take_while(|(k, _)| k.starts_with(&lowered)),
            max_expansions,
        ),
        TermKind::Substring => union_of(
            terms.iter().filter(|(k, _)| k.contains(&lowered)),
            max_expansions,
        ),
        TermKind::Suffix => union_of(
            terms.iter().filter(|(k, _)| k.ends_with(&lowered)),
            max_expansions,
        ),
        TermKind::Regexp => match Regex::new(term) {
            Ok(re) => union_of(terms.iter().filter(|(k, _)| re.is_match(k)), max_expansions),
            Err(e) => {
                warn!(pattern = term, error = %e, "Invalid regexp term");
                RoaringBitmap::new()
            }
        },
    }
}

impl Searchable for MemoryIndex {
    fn create_leaf<'s>(
        &'s self,
        request: &RequestContext,
        spec: &LeafSpec<'_>,
    ) -> Option<Box<dyn LeafSearch + 's>> {
        let filter_sensitive = self.is_filter_sensitive(&spec.field.name)?;
        let leaf = MemoryLeaf::new(
            self,
            &spec.field.name,
            spec.term,
            spec.kind,
            request.max_term_expansions,
            filter_sensitive,
        );
        Some(Box::new(leaf))
    }
}

/// Search context over one [`MemoryIndex`]
#[derive(Debug)]
pub struct MemorySearchContext<'a> {
    index: &'a MemoryIndex,
    doc_id_limit: u32,
}

impl<'a> MemorySearchContext<'a> {
    pub fn new(index: &'a MemoryIndex) -> Self {
        Self {
            index,
            doc_id_limit: index.doc_id_limit(),
        }
    }
}

impl<'a> SearchContext for MemorySearchContext<'a> {
    fn indexes(&self) -> &dyn Searchable {
        self.index
    }

    fn attributes(&self) -> &dyn Searchable {
        self.index
    }

    fn doc_id_limit(&self) -> u32 {
        self.doc_id_limit
    }
}
