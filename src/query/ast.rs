//! Typed query tree
//!
//! The tree is a closed set of node variants. Term-bearing nodes carry a
//! [`TermHeader`]; intermediate nodes own their children in evaluation order.
//! Passes walk the tree through [`Visit`] and [`VisitMut`], which visit a
//! node's header before its children (pre-order).

use serde::{Deserialize, Serialize};

use super::types::{TermHeader, TermId, TermKind, Weight};

/// A leaf term bound to one view and value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermNode {
    #[serde(flatten)]
    pub header: TermHeader,
    pub term: String,
    #[serde(default)]
    pub kind: TermKind,
}

/// Children of a plain boolean operator
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Intermediate {
    pub children: Vec<Node>,
}

/// Children of a proximity operator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proximity {
    pub window: u32,
    pub children: Vec<Node>,
}

/// A term-bearing operator over child terms (phrase, same-element, equiv)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermGroup {
    #[serde(flatten)]
    pub header: TermHeader,
    pub children: Vec<Node>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedToken {
    pub token: String,
    pub weight: Weight,
}

/// A single term matching any of a set of weighted tokens
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedSetTerm {
    #[serde(flatten)]
    pub header: TermHeader,
    pub tokens: Vec<WeightedToken>,
}

/// Query tree node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Term(TermNode),
    And(Intermediate),
    Or(Intermediate),
    AndNot(Intermediate),
    Rank(Intermediate),
    Near(Proximity),
    #[serde(rename = "onear")]
    ONear(Proximity),
    Phrase(TermGroup),
    SameElement(TermGroup),
    Equiv(TermGroup),
    WeightedSet(WeightedSetTerm),
}

/// Discriminant of a [`Node`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Term,
    And,
    Or,
    AndNot,
    Rank,
    Near,
    ONear,
    Phrase,
    SameElement,
    Equiv,
    WeightedSet,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Term => "term",
            NodeKind::And => "and",
            NodeKind::Or => "or",
            NodeKind::AndNot => "and_not",
            NodeKind::Rank => "rank",
            NodeKind::Near => "near",
            NodeKind::ONear => "onear",
            NodeKind::Phrase => "phrase",
            NodeKind::SameElement => "same_element",
            NodeKind::Equiv => "equiv",
            NodeKind::WeightedSet => "weighted_set",
        }
    }
}

impl Node {
    /// Create a word term
    pub fn word(id: u32, view: impl Into<String>, term: impl Into<String>) -> Self {
        Self::term_of_kind(id, view, term, TermKind::Word)
    }

    pub fn term_of_kind(
        id: u32,
        view: impl Into<String>,
        term: impl Into<String>,
        kind: TermKind,
    ) -> Self {
        Node::Term(TermNode {
            header: TermHeader::new(TermId(id), view, Weight::default()),
            term: term.into(),
            kind,
        })
    }

    pub fn and(children: Vec<Node>) -> Self {
        Node::And(Intermediate { children })
    }

    pub fn or(children: Vec<Node>) -> Self {
        Node::Or(Intermediate { children })
    }

    pub fn and_not(children: Vec<Node>) -> Self {
        Node::AndNot(Intermediate { children })
    }

    pub fn rank(children: Vec<Node>) -> Self {
        Node::Rank(Intermediate { children })
    }

    pub fn phrase(id: u32, view: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Phrase(TermGroup {
            header: TermHeader::new(TermId(id), view, Weight::default()),
            children,
        })
    }

    pub fn same_element(id: u32, view: impl Into<String>, children: Vec<Node>) -> Self {
        Node::SameElement(TermGroup {
            header: TermHeader::new(TermId(id), view, Weight::default()),
            children,
        })
    }

    pub fn equiv(id: u32, view: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Equiv(TermGroup {
            header: TermHeader::new(TermId(id), view, Weight::default()),
            children,
        })
    }

    pub fn near(window: u32, children: Vec<Node>) -> Self {
        Node::Near(Proximity { window, children })
    }

    pub fn onear(window: u32, children: Vec<Node>) -> Self {
        Node::ONear(Proximity { window, children })
    }

    /// Create a weighted set from `(token, weight)` pairs
    pub fn weighted_set<T: Into<String>>(
        id: u32,
        view: impl Into<String>,
        tokens: impl IntoIterator<Item = (T, i32)>,
    ) -> Self {
        Node::WeightedSet(WeightedSetTerm {
            header: TermHeader::new(TermId(id), view, Weight::default()),
            tokens: tokens
                .into_iter()
                .map(|(token, weight)| WeightedToken {
                    token: token.into(),
                    weight: Weight(weight),
                })
                .collect(),
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Term(_) => NodeKind::Term,
            Node::And(_) => NodeKind::And,
            Node::Or(_) => NodeKind::Or,
            Node::AndNot(_) => NodeKind::AndNot,
            Node::Rank(_) => NodeKind::Rank,
            Node::Near(_) => NodeKind::Near,
            Node::ONear(_) => NodeKind::ONear,
            Node::Phrase(_) => NodeKind::Phrase,
            Node::SameElement(_) => NodeKind::SameElement,
            Node::Equiv(_) => NodeKind::Equiv,
            Node::WeightedSet(_) => NodeKind::WeightedSet,
        }
    }

    pub fn header(&self) -> Option<&TermHeader> {
        match self {
            Node::Term(t) => Some(&t.header),
            Node::Phrase(g) | Node::SameElement(g) | Node::Equiv(g) => Some(&g.header),
            Node::WeightedSet(ws) => Some(&ws.header),
            _ => None,
        }
    }

    pub fn header_mut(&mut self) -> Option<&mut TermHeader> {
        match self {
            Node::Term(t) => Some(&mut t.header),
            Node::Phrase(g) | Node::SameElement(g) | Node::Equiv(g) => Some(&mut g.header),
            Node::WeightedSet(ws) => Some(&mut ws.header),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::And(i) | Node::Or(i) | Node::AndNot(i) | Node::Rank(i) => &i.children,
            Node::Near(p) | Node::ONear(p) => &p.children,
            Node::Phrase(g) | Node::SameElement(g) | Node::Equiv(g) => &g.children,
            Node::Term(_) | Node::WeightedSet(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::And(i) | Node::Or(i) | Node::AndNot(i) | Node::Rank(i) => Some(&mut i.children),
            Node::Near(p) | Node::ONear(p) => Some(&mut p.children),
            Node::Phrase(g) | Node::SameElement(g) | Node::Equiv(g) => Some(&mut g.children),
            Node::Term(_) | Node::WeightedSet(_) => None,
        }
    }

    /// Rank and AndNot only let their first child decide the matching set
    pub fn is_rank_or_and_not(&self) -> bool {
        matches!(self, Node::Rank(_) | Node::AndNot(_))
    }

    /// Number of leaf terms in this subtree.
    ///
    /// A weighted set is one leaf however many tokens it holds. Phrase,
    /// same-element and equiv groups contribute their child terms.
    pub fn term_count(&self) -> usize {
        match self {
            Node::Term(_) | Node::WeightedSet(_) => 1,
            other => other.children().iter().map(Node::term_count).sum(),
        }
    }

    /// All term ids in pre-order
    pub fn term_ids(&self) -> Vec<TermId> {
        struct Collect(Vec<TermId>);
        impl Visit for Collect {
            fn visit_header(&mut self, _kind: NodeKind, header: &TermHeader) {
                self.0.push(header.id);
            }
        }
        let mut collect = Collect(Vec::new());
        collect.visit_node(self);
        collect.0
    }

    /// Largest term id in this subtree, if any node carries one
    pub fn max_term_id(&self) -> Option<TermId> {
        self.term_ids().into_iter().max()
    }
}

/// Read-only pre-order traversal
pub trait Visit {
    fn visit_node(&mut self, node: &Node) {
        walk_node(self, node);
    }

    fn visit_header(&mut self, _kind: NodeKind, _header: &TermHeader) {}
}

pub fn walk_node<V: Visit + ?Sized>(visitor: &mut V, node: &Node) {
    if let Some(header) = node.header() {
        visitor.visit_header(node.kind(), header);
    }
    for child in node.children() {
        visitor.visit_node(child);
    }
}

/// Mutating pre-order traversal
pub trait VisitMut {
    fn visit_node_mut(&mut self, node: &mut Node) {
        walk_node_mut(self, node);
    }

    fn visit_header_mut(&mut self, _kind: NodeKind, _header: &mut TermHeader) {}
}

pub fn walk_node_mut<V: VisitMut + ?Sized>(visitor: &mut V, node: &mut Node) {
    let kind = node.kind();
    if let Some(header) = node.header_mut() {
        visitor.visit_header_mut(kind, header);
    }
    if let Some(children) = node.children_mut() {
        for child in children.iter_mut() {
            visitor.visit_node_mut(child);
        }
    }
}
