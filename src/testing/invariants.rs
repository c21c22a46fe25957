//! Invariant checking framework for query plans
//!
//! Invariants are checked against a [`Query`] at whatever stage it has
//! reached; each checker skips what does not exist yet.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;
use crate::matching::{Query, Stage};
use crate::query::ast::{NodeKind, Visit};
use crate::query::types::TermHeader;

/// A violation of an invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub invariant: String,
    pub description: String,
    pub context: BTreeMap<String, String>,
}

impl Violation {
    fn new(invariant: &str, description: impl Into<String>) -> Self {
        Self {
            invariant: invariant.to_string(),
            description: description.into(),
            context: BTreeMap::new(),
        }
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INVARIANT VIOLATION: {}", self.invariant)?;
        writeln!(f, "  Description: {}", self.description)?;
        if !self.context.is_empty() {
            writeln!(f, "  Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "    {}: {}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Trait for invariant checkers
pub trait Invariant: Send + Sync {
    /// Name of the invariant
    fn name(&self) -> &str;

    /// Check the invariant against a query plan
    fn check(&self, query: &Query<'_>) -> Result<(), Violation>;

    /// Human-readable description
    fn description(&self) -> &str {
        "No description provided"
    }
}

/// Check all invariants and return violations
pub fn check_all_invariants(query: &Query<'_>, invariants: &[Box<dyn Invariant>]) -> Vec<Violation> {
    invariants
        .iter()
        .filter_map(|invariant| invariant.check(query).err())
        .collect()
}

/// Invariant: term ids are unique within the tree
pub struct UniqueTermIds;

impl Invariant for UniqueTermIds {
    fn name(&self) -> &str {
        "UniqueTermIds"
    }

    fn description(&self) -> &str {
        "No two term-bearing nodes share a term id"
    }

    fn check(&self, query: &Query<'_>) -> Result<(), Violation> {
        let Some(tree) = query.tree() else {
            return Ok(());
        };
        let mut seen = HashSet::new();
        for id in tree.term_ids() {
            if !seen.insert(id) {
                return Err(Violation::new(self.name(), "Term id used twice").with("term_id", id));
            }
        }
        Ok(())
    }
}

/// Invariant: after reservation every field binding owns a distinct slot
pub struct OneSlotPerTermField;

impl Invariant for OneSlotPerTermField {
    fn name(&self) -> &str {
        "OneSlotPerTermField"
    }

    fn description(&self) -> &str {
        "Every (term, field) binding has its own match-data slot"
    }

    fn check(&self, query: &Query<'_>) -> Result<(), Violation> {
        if query.stage() < Stage::HandlesReserved {
            return Ok(());
        }
        let Some(tree) = query.tree() else {
            return Ok(());
        };

        struct Slots {
            seen: HashSet<u32>,
            problem: Option<(TermHeader, &'static str)>,
        }
        impl Visit for Slots {
            fn visit_header(&mut self, _kind: NodeKind, header: &TermHeader) {
                if self.problem.is_some() {
                    return;
                }
                for field in &header.fields {
                    match field.handle {
                        None => self.problem = Some((header.clone(), "unreserved field")),
                        Some(h) if !self.seen.insert(h.0) => {
                            self.problem = Some((header.clone(), "slot shared with another binding"))
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        let mut slots = Slots {
            seen: HashSet::new(),
            problem: None,
        };
        slots.visit_node(tree);
        match slots.problem {
            Some((header, what)) => Err(Violation::new(self.name(), what)
                .with("term_id", header.id)
                .with("view", header.view)),
            None => Ok(()),
        }
    }
}

/// Invariant: a frozen query has a fully frozen blueprint
pub struct BlueprintFrozen;

impl Invariant for BlueprintFrozen {
    fn name(&self) -> &str {
        "BlueprintFrozen"
    }

    fn description(&self) -> &str {
        "Every blueprint node is frozen once the query is frozen"
    }

    fn check(&self, query: &Query<'_>) -> Result<(), Violation> {
        if query.stage() != Stage::Frozen {
            return Ok(());
        }
        fn all_frozen(bp: &Blueprint<'_>) -> bool {
            bp.is_frozen() && bp.children().iter().all(all_frozen)
        }
        match query.blueprint() {
            Some(bp) if all_frozen(bp) => Ok(()),
            Some(_) => Err(Violation::new(self.name(), "Mutable node below frozen root")),
            None => Err(Violation::new(self.name(), "Frozen query without blueprint")),
        }
    }
}

/// Invariant: no estimate exceeds the doc-id limit
pub struct EstimatesWithinLimit;

impl Invariant for EstimatesWithinLimit {
    fn name(&self) -> &str {
        "EstimatesWithinLimit"
    }

    fn description(&self) -> &str {
        "Hit estimates never exceed the number of documents"
    }

    fn check(&self, query: &Query<'_>) -> Result<(), Violation> {
        fn first_over(bp: &Blueprint<'_>) -> Option<(u64, u32)> {
            let state = bp.state();
            if state.estimate().est_hits > u64::from(state.doc_id_limit()) {
                return Some((state.estimate().est_hits, state.doc_id_limit()));
            }
            bp.children().iter().find_map(first_over)
        }
        match query.blueprint().and_then(first_over) {
            Some((est_hits, limit)) => Err(Violation::new(self.name(), "Estimate above doc-id limit")
                .with("est_hits", est_hits)
                .with("doc_id_limit", limit)),
            None => Ok(()),
        }
    }
}

/// Get all default invariants
pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(UniqueTermIds),
        Box::new(OneSlotPerTermField),
        Box::new(BlueprintFrozen),
        Box::new(EstimatesWithinLimit),
    ]
}
