//! Geo location specs and constraint injection
//!
//! A location string has the form `<field>:<spec>`, where `<spec>` is
//! either a point `(2,x,y,radius,table,rank,prune,x_aspect)` (everything
//! after `y` optional, parentheses optional) or a bounding box
//! `[2,x0,y0,x1,y1]`. The term is matched against the field's z-curve
//! attribute.

use serde::Serialize;
use tracing::{debug, warn};

use super::ast::{Intermediate, Node, TermNode};
use super::types::{TermHeader, TermId, TermKind, Weight};
use crate::error::{MatchError, Result};

/// Name of the z-curve attribute backing a position field
pub fn zcurve_field_name(field: &str) -> String {
    format!("{}_zcurve", field)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

/// Parsed location spec
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationSpec {
    pub point: Option<(i32, i32)>,
    /// `None` means unbounded
    pub radius: Option<u32>,
    pub bounding_box: Option<BoundingBox>,
    pub rank_on_distance: bool,
    pub prune_on_distance: bool,
    pub x_aspect: u32,
}

impl LocationSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if let Some(inner) = spec.strip_prefix('[') {
            let inner = inner
                .strip_suffix(']')
                .ok_or_else(|| invalid(spec, "unterminated bounding box"))?;
            return Self::parse_bounding_box(spec, inner);
        }
        let inner = match spec.strip_prefix('(') {
            Some(rest) => rest
                .strip_suffix(')')
                .ok_or_else(|| invalid(spec, "unterminated point"))?,
            None => spec,
        };
        Self::parse_point(spec, inner)
    }

    fn parse_point(spec: &str, inner: &str) -> Result<Self> {
        let values = parse_numbers(spec, inner)?;
        if values.len() < 3 || values.len() > 8 {
            return Err(invalid(spec, "point needs between 3 and 8 values"));
        }
        check_dimensions(spec, values[0])?;

        let x = to_i32(spec, values[1])?;
        let y = to_i32(spec, values[2])?;
        let radius = match values.get(3) {
            Some(&r) if r >= 0 => Some(u32::try_from(r).map_err(|_| invalid(spec, "radius out of range"))?),
            _ => None,
        };
        // values[4] names a legacy distance table and is ignored
        let rank_on_distance = values.get(5).map_or(true, |&v| v != 0);
        let prune_on_distance = values.get(6).map_or(false, |&v| v != 0);
        let x_aspect = match values.get(7) {
            Some(&a) => u32::try_from(a).map_err(|_| invalid(spec, "x aspect out of range"))?,
            None => 0,
        };

        Ok(Self {
            point: Some((x, y)),
            radius,
            bounding_box: None,
            rank_on_distance,
            prune_on_distance,
            x_aspect,
        })
    }

    fn parse_bounding_box(spec: &str, inner: &str) -> Result<Self> {
        let values = parse_numbers(spec, inner)?;
        if values.len() != 5 {
            return Err(invalid(spec, "bounding box needs exactly 5 values"));
        }
        check_dimensions(spec, values[0])?;
        let (a, b, c, d) = (
            to_i32(spec, values[1])?,
            to_i32(spec, values[2])?,
            to_i32(spec, values[3])?,
            to_i32(spec, values[4])?,
        );
        Ok(Self {
            point: None,
            radius: None,
            bounding_box: Some(BoundingBox {
                x0: a.min(c),
                y0: b.min(d),
                x1: a.max(c),
                y1: b.max(d),
            }),
            rank_on_distance: false,
            prune_on_distance: true,
            x_aspect: 0,
        })
    }

    /// Whether a position satisfies this spec
    pub fn contains(&self, x: i32, y: i32) -> bool {
        if let Some(bb) = &self.bounding_box {
            if x < bb.x0 || x > bb.x1 || y < bb.y0 || y > bb.y1 {
                return false;
            }
        }
        match (self.point, self.radius) {
            (Some((px, py)), Some(radius)) => {
                let mut dx = (x as f64) - (px as f64);
                if self.x_aspect != 0 {
                    dx = dx * (self.x_aspect as f64) / 4_294_967_296.0;
                }
                let dy = (y as f64) - (py as f64);
                dx * dx + dy * dy <= (radius as f64) * (radius as f64)
            }
            _ => true,
        }
    }
}

fn invalid(spec: &str, reason: &str) -> MatchError {
    MatchError::InvalidLocation(format!("'{}': {}", spec, reason))
}

fn parse_numbers(spec: &str, inner: &str) -> Result<Vec<i64>> {
    inner
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| invalid(spec, "expected an integer"))
        })
        .collect()
}

fn check_dimensions(spec: &str, dims: i64) -> Result<()> {
    if dims != 2 {
        return Err(invalid(spec, "only 2 dimensions are supported"));
    }
    Ok(())
}

fn to_i32(spec: &str, v: i64) -> Result<i32> {
    i32::try_from(v).map_err(|_| invalid(spec, "coordinate out of range"))
}

/// Location descriptor handed to the ranking framework
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub attribute: String,
    pub x: i32,
    pub y: i32,
    pub x_aspect: u32,
    pub valid: bool,
}

/// Conjoin `to_inject` with the matching part of `root`.
///
/// An And root takes the node as a new child. Rank and AndNot pass the
/// injection on to their first child. Any other root is wrapped in a new
/// And together with the injected node.
pub fn inject(root: Node, to_inject: Node) -> Node {
    match root {
        Node::And(mut and) => {
            and.children.push(to_inject);
            Node::And(and)
        }
        Node::Rank(inner) => Node::Rank(inject_first(inner, to_inject)),
        Node::AndNot(inner) => Node::AndNot(inject_first(inner, to_inject)),
        other => Node::and(vec![other, to_inject]),
    }
}

fn inject_first(mut inner: Intermediate, to_inject: Node) -> Intermediate {
    match inner.children.first_mut() {
        Some(first) => {
            let old = std::mem::replace(first, Node::and(Vec::new()));
            *first = inject(old, to_inject);
        }
        None => inner.children.push(to_inject),
    }
    inner
}

/// Parse `location_str` and inject the resulting location term into `tree`.
///
/// Input problems are logged and leave the tree untouched.
pub fn add_location_node(
    location_str: &str,
    tree: Node,
    location: &mut Location,
    weight: i32,
) -> Node {
    if location_str.is_empty() {
        return tree;
    }
    let Some((field, loc)) = location_str.split_once(':') else {
        warn!(
            loc = location_str,
            "Location string lacks attribute vector specification"
        );
        return tree;
    };
    let spec = match LocationSpec::parse(loc) {
        Ok(spec) => spec,
        Err(e) => {
            warn!(loc = location_str, error = %e, "Location parse error");
            return tree;
        }
    };
    if !spec.rank_on_distance && !spec.prune_on_distance {
        debug!(loc = location_str, "Location neither ranks nor prunes, skipping");
        return tree;
    }

    let Some(id) = TermId::first_free(tree.max_term_id()) else {
        warn!(loc = location_str, "No free term id for location term, skipping");
        return tree;
    };
    let view = zcurve_field_name(field);
    let term = Node::Term(TermNode {
        header: TermHeader::new(id, view.clone(), Weight(weight)),
        term: loc.to_string(),
        kind: TermKind::Location,
    });

    if spec.rank_on_distance {
        if let Some((x, y)) = spec.point {
            *location = Location {
                attribute: view,
                x,
                y,
                x_aspect: spec.x_aspect,
                valid: true,
            };
        }
    }
    debug!(term_id = %id, "Injected location term");
    inject(tree, term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::NodeKind;

    #[test]
    fn test_parse_point_defaults() {
        let spec = LocationSpec::parse("2,100,10,0").unwrap();
        assert_eq!(spec.point, Some((100, 10)));
        assert_eq!(spec.radius, Some(0));
        assert!(spec.rank_on_distance);
        assert!(!spec.prune_on_distance);
    }

    #[test]
    fn test_parse_full_point() {
        let spec = LocationSpec::parse("(2,-5,7,-1,0,0,1,1000)").unwrap();
        assert_eq!(spec.point, Some((-5, 7)));
        assert_eq!(spec.radius, None);
        assert!(!spec.rank_on_distance);
        assert!(spec.prune_on_distance);
        assert_eq!(spec.x_aspect, 1000);
    }

    #[test]
    fn test_parse_bounding_box() {
        let spec = LocationSpec::parse("[2,10,10,0,0]").unwrap();
        let bb = spec.bounding_box.unwrap();
        assert_eq!((bb.x0, bb.y0, bb.x1, bb.y1), (0, 0, 10, 10));
        assert!(spec.contains(5, 5));
        assert!(!spec.contains(11, 5));
        assert!(!spec.rank_on_distance);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "3,1,2", "2,x,1", "(2,1,2", "[2,1,2]", "2,1"] {
            let err = LocationSpec::parse(bad).unwrap_err();
            assert!(err.is_degraded(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_contains_radius() {
        let spec = LocationSpec::parse("2,0,0,5").unwrap();
        assert!(spec.contains(3, 4));
        assert!(!spec.contains(4, 4));
    }

    #[test]
    fn test_inject_into_and() {
        let root = Node::and(vec![Node::word(1, "f", "a")]);
        let out = inject(root, Node::word(2, "f", "b"));
        assert_eq!(out.kind(), NodeKind::And);
        assert_eq!(out.children().len(), 2);
    }

    #[test]
    fn test_inject_descends_rank_and_not() {
        let root = Node::and_not(vec![
            Node::rank(vec![Node::word(1, "f", "a"), Node::word(2, "f", "b")]),
            Node::word(3, "f", "c"),
        ]);
        let out = inject(root, Node::word(4, "f", "d"));
        let rank = &out.children()[0];
        let and = &rank.children()[0];
        assert_eq!(and.kind(), NodeKind::And);
        assert_eq!(and.term_ids(), vec![TermId(1), TermId(4)]);
        assert_eq!(rank.children()[1], Node::word(2, "f", "b"));
        assert_eq!(out.children()[1], Node::word(3, "f", "c"));
    }

    #[test]
    fn test_add_location_node_rank() {
        let mut location = Location::default();
        let tree = add_location_node("view1:2,100,10,0", Node::word(1, "f", "a"), &mut location, 100);
        assert!(location.valid);
        assert_eq!((location.x, location.y), (100, 10));
        assert_eq!(location.attribute, "view1_zcurve");
        assert_eq!(tree.term_count(), 2);

        let injected = &tree.children()[1];
        let header = injected.header().unwrap();
        assert_eq!(header.id, TermId(2));
        assert_eq!(header.weight, Weight(100));
        assert_eq!(header.view, "view1_zcurve");
    }

    #[test]
    fn test_add_location_node_prune_only() {
        let mut location = Location::default();
        let tree = add_location_node("pos:[2,0,0,10,10]", Node::word(1, "f", "a"), &mut location, 100);
        assert!(!location.valid);
        assert_eq!(tree.term_count(), 2);
    }

    #[test]
    fn test_add_location_node_without_free_id() {
        let mut location = Location::default();
        let before = Node::word(u32::MAX, "f", "a");
        let after = add_location_node("view1:2,0,0,5", before.clone(), &mut location, 100);
        assert_eq!(after, before);
        assert!(!location.valid);
    }

    #[test]
    fn test_add_location_node_degraded_inputs() {
        for loc in ["", "no separator here", "view:2,abc,1"] {
            let mut location = Location::default();
            let before = Node::word(1, "f", "a");
            let after = add_location_node(loc, before.clone(), &mut location, 100);
            assert_eq!(after, before);
            assert!(!location.valid);
        }
    }
}
