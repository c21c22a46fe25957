use matchplan::blueprint::RequestContext;
use matchplan::query::{Node, QueryTreeCreator, StackDump, ViewResolver};
use matchplan::testing::{check_all_invariants, default_invariants};
use matchplan::{MatchDataLayout, MemoryIndex, MemorySearchContext, Query, UnpackingFlags};
use proptest::prelude::*;

const WORDS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];
const VIEWS: [&str; 3] = ["title", "body", "default"];
const STRUCT_FIELDS: [&str; 2] = ["key", "value"];

#[derive(Debug, Clone)]
enum Shape {
    Word(usize, usize),
    Phrase(usize, Vec<usize>),
    Equiv(usize, Vec<usize>),
    /// Words over the sub-fields of the `attrs` struct
    SameElement(Vec<(usize, usize)>),
    WeightedSet(usize, Vec<(usize, i32)>),
    And(Vec<Shape>),
    Or(Vec<Shape>),
    Rank(Vec<Shape>),
    AndNot(Vec<Shape>),
    Near(u32, Vec<Shape>),
    ONear(u32, Vec<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        (0..VIEWS.len(), 0..WORDS.len()).prop_map(|(v, w)| Shape::Word(v, w)),
        (0..2usize, prop::collection::vec(0..WORDS.len(), 1..=3)).prop_map(|(v, ws)| Shape::Phrase(v, ws)),
        (0..VIEWS.len(), prop::collection::vec(0..WORDS.len(), 1..=3)).prop_map(|(v, ws)| Shape::Equiv(v, ws)),
        prop::collection::vec((0..STRUCT_FIELDS.len(), 0..WORDS.len()), 1..=2).prop_map(Shape::SameElement),
        (0..VIEWS.len(), prop::collection::vec((0..WORDS.len(), -50i32..50), 1..=4))
            .prop_map(|(v, tokens)| Shape::WeightedSet(v, tokens)),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..=4).prop_map(Shape::And),
            prop::collection::vec(inner.clone(), 1..=4).prop_map(Shape::Or),
            prop::collection::vec(inner.clone(), 1..=3).prop_map(Shape::Rank),
            prop::collection::vec(inner.clone(), 1..=3).prop_map(Shape::AndNot),
            (1..5u32, prop::collection::vec(inner.clone(), 1..=3)).prop_map(|(w, c)| Shape::Near(w, c)),
            (1..5u32, prop::collection::vec(inner, 1..=3)).prop_map(|(w, c)| Shape::ONear(w, c)),
        ]
    })
}

/// Build the node, numbering term ids in pre-order from `next`
fn to_node(shape: &Shape, next: &mut u32) -> Node {
    let mut id = || {
        *next += 1;
        *next
    };
    match shape {
        Shape::Word(v, w) => Node::word(id(), VIEWS[*v], WORDS[*w]),
        Shape::Phrase(v, ws) => {
            let phrase_id = id();
            let children = ws.iter().map(|w| Node::word(id(), VIEWS[*v], WORDS[*w])).collect();
            Node::phrase(phrase_id, VIEWS[*v], children)
        }
        Shape::Equiv(v, ws) => {
            let equiv_id = id();
            let children = ws.iter().map(|w| Node::word(id(), VIEWS[*v], WORDS[*w])).collect();
            Node::equiv(equiv_id, VIEWS[*v], children)
        }
        Shape::SameElement(items) => {
            let group_id = id();
            let children = items
                .iter()
                .map(|(f, w)| Node::word(id(), STRUCT_FIELDS[*f], WORDS[*w]))
                .collect();
            Node::same_element(group_id, "attrs", children)
        }
        Shape::WeightedSet(v, tokens) => {
            Node::weighted_set(id(), VIEWS[*v], tokens.iter().map(|(w, weight)| (WORDS[*w], *weight)))
        }
        Shape::And(c) => Node::and(c.iter().map(|s| to_node(s, next)).collect()),
        Shape::Or(c) => Node::or(c.iter().map(|s| to_node(s, next)).collect()),
        Shape::Rank(c) => Node::rank(c.iter().map(|s| to_node(s, next)).collect()),
        Shape::AndNot(c) => Node::and_not(c.iter().map(|s| to_node(s, next)).collect()),
        Shape::Near(w, c) => Node::near(*w, c.iter().map(|s| to_node(s, next)).collect()),
        Shape::ONear(w, c) => Node::onear(*w, c.iter().map(|s| to_node(s, next)).collect()),
    }
}

fn leaf_count(shape: &Shape) -> usize {
    match shape {
        Shape::Word(..) | Shape::WeightedSet(..) => 1,
        Shape::Phrase(_, ws) | Shape::Equiv(_, ws) => ws.len(),
        Shape::SameElement(items) => items.len(),
        Shape::And(c) | Shape::Or(c) | Shape::Rank(c) | Shape::AndNot(c) => c.iter().map(leaf_count).sum(),
        Shape::Near(_, c) | Shape::ONear(_, c) => c.iter().map(leaf_count).sum(),
    }
}

/// Term-bearing nodes bound to a field below. The `attrs` struct itself
/// is not a field, so a same-element group reserves only for its children.
fn header_count(shape: &Shape) -> usize {
    match shape {
        Shape::Word(..) | Shape::WeightedSet(..) => 1,
        Shape::Phrase(_, ws) | Shape::Equiv(_, ws) => ws.len() + 1,
        Shape::SameElement(items) => items.len(),
        Shape::And(c) | Shape::Or(c) | Shape::Rank(c) | Shape::AndNot(c) => c.iter().map(header_count).sum(),
        Shape::Near(_, c) | Shape::ONear(_, c) => c.iter().map(header_count).sum(),
    }
}

fn test_index() -> MemoryIndex {
    let index = MemoryIndex::new();
    for doc in 0..16u32 {
        let title: Vec<&str> = WORDS.iter().enumerate().filter(|(i, _)| doc as usize % (i + 2) == 0).map(|(_, w)| *w).collect();
        index.index_text("title", doc, &title.join(" "));
        index.index_text("body", doc, WORDS[doc as usize % WORDS.len()]);
        index.index_text("attrs.key", doc, WORDS[(doc as usize + 1) % WORDS.len()]);
        index.index_text("attrs.value", doc, WORDS[(doc as usize / 2) % WORDS.len()]);
        index.set_position("pos", doc, doc as i32, 0);
    }
    index
}

fn resolver() -> ViewResolver {
    let mut resolver = ViewResolver::new();
    resolver.add("default", "title");
    resolver
}

proptest! {
    #[test]
    fn prop_stack_preserves_tree(shape in arb_shape()) {
        let tree = to_node(&shape, &mut 0);
        let decoded = QueryTreeCreator::create(&StackDump::encode(&tree)).unwrap();
        prop_assert_eq!(decoded, tree);
    }

    #[test]
    fn prop_term_count_matches_leaves(shape in arb_shape(), with_location in any::<bool>()) {
        let index = test_index();
        let env = index.index_environment();
        let tree = to_node(&shape, &mut 0);
        let location = if with_location { "pos:2,3,0,5" } else { "" };

        let mut query = Query::new();
        prop_assert!(query
            .build_tree(&StackDump::encode(&tree), location, &resolver(), &env, UnpackingFlags::default())
            .is_ok());
        let expected = leaf_count(&shape) + usize::from(with_location);
        prop_assert_eq!(query.term_count(), expected);
        prop_assert_eq!(query.extract_location().valid, with_location);
    }

    #[test]
    fn prop_pipeline_keeps_plan_invariants(shape in arb_shape(), white_list in prop::collection::vec(0u32..16, 0..8)) {
        let index = test_index();
        let env = index.index_environment();
        let context = MemorySearchContext::new(&index);
        let tree = to_node(&shape, &mut 0);

        let mut query = Query::new();
        if !white_list.is_empty() {
            let bits: roaring::RoaringBitmap = white_list.iter().copied().collect();
            query.set_white_list_blueprint(matchplan::blueprint::Blueprint::white_list(std::sync::Arc::new(bits)));
        }
        query
            .build_tree(&StackDump::encode(&tree), "", &resolver(), &env, UnpackingFlags::default())
            .unwrap();
        let mut layout = MatchDataLayout::new();
        query.reserve_handles(&RequestContext::new(), &context, &mut layout);
        prop_assert_eq!(layout.len(), header_count(&shape));

        query.optimize();
        query.fetch_postings();
        query.freeze();
        let violations = check_all_invariants(&query, &default_invariants());
        prop_assert!(violations.is_empty(), "{:?}", violations);

        let mut md = layout.create_match_data();
        let mut search = query.create_search(&md).unwrap();
        let hits = matchplan::search::matching_docs(search.as_mut(), &mut md, query.doc_id_limit());
        if !white_list.is_empty() {
            prop_assert!(hits.iter().all(|doc| white_list.contains(doc)));
        }
    }
}
