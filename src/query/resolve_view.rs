//! View resolution
//!
//! A view is the field name written in the query. It may name one concrete
//! field or a group of fields (an index alias). Resolution binds every
//! term-bearing node to the concrete fields the index environment knows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::ast::{Node, NodeKind, VisitMut};
use super::types::{FieldBinding, TermHeader};

/// How a field is stored
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Index,
    Attribute,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: u32,
    pub name: String,
    pub kind: FieldKind,
    /// Filter-only fields produce no ranking signal
    #[serde(default)]
    pub filter_only: bool,
}

/// Read-only snapshot of the fields available for matching
pub trait IndexEnvironment: Send + Sync {
    fn field_by_name(&self, name: &str) -> Option<&FieldInfo>;

    fn field_count(&self) -> usize;
}

/// Index environment backed by a field list
#[derive(Clone, Debug, Default)]
pub struct SimpleIndexEnvironment {
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, usize>,
}

impl SimpleIndexEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field and return its id
    pub fn add_field(&mut self, name: impl Into<String>, kind: FieldKind, filter_only: bool) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.by_name.get(&name) {
            return self.fields[idx].id;
        }
        let id = self.fields.len() as u32;
        self.by_name.insert(name.clone(), self.fields.len());
        self.fields.push(FieldInfo {
            id,
            name,
            kind,
            filter_only,
        });
        id
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.add_field(name, kind, false);
        self
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }
}

impl IndexEnvironment for SimpleIndexEnvironment {
    fn field_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Maps views to the concrete fields they cover
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViewResolver {
    views: HashMap<String, Vec<String>>,
}

impl ViewResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field` to `view`; fields keep insertion order
    pub fn add(&mut self, view: impl Into<String>, field: impl Into<String>) -> &mut Self {
        let field = field.into();
        let fields = self.views.entry(view.into()).or_default();
        if !fields.contains(&field) {
            fields.push(field);
        }
        self
    }

    /// Concrete field names for `view`; an unknown view names a single field
    pub fn resolve<'r>(&'r self, view: &'r str) -> Vec<&'r str> {
        match self.views.get(view) {
            Some(fields) => fields.iter().map(String::as_str).collect(),
            None => vec![view],
        }
    }
}

/// Bind every term-bearing node of `root` to its concrete fields
pub fn resolve_views(root: &mut Node, resolver: &ViewResolver, env: &dyn IndexEnvironment) {
    ResolveViewVisitor { resolver, env }.visit_node_mut(root);
}

struct ResolveViewVisitor<'a> {
    resolver: &'a ViewResolver,
    env: &'a dyn IndexEnvironment,
}

impl<'a> VisitMut for ResolveViewVisitor<'a> {
    fn visit_header_mut(&mut self, kind: NodeKind, header: &mut TermHeader) {
        let mut fields = Vec::new();
        for name in self.resolver.resolve(&header.view) {
            match self.env.field_by_name(name) {
                Some(info) => {
                    let mut binding =
                        FieldBinding::new(info.id, &info.name, info.kind == FieldKind::Attribute);
                    binding.filter_only = info.filter_only;
                    fields.push(binding);
                }
                None => debug!(view = %header.view, field = name, "Dropping unknown field"),
            }
        }
        trace!(
            term_id = %header.id,
            kind = kind.name(),
            view = %header.view,
            fields = fields.len(),
            "Resolved view"
        );
        header.fields = fields;
    }
}
