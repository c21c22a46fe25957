//! End-to-end planning over the in-memory collaborators
//!
//! Each test drives a `Query` from a serialized stack to evaluated hits.

use matchplan::blueprint::{Blueprint, Op, RequestContext};
use matchplan::query::ast::{WeightedSetTerm, WeightedToken};
use matchplan::query::{Node, StackDump, TermData, TermHeader, TermId, TermKind, ViewResolver, Weight};
use matchplan::search::SearchIterator;
use matchplan::{
    Document, MatchData, MatchDataLayout, MatchingConfig, MemoryIndex, MemorySearchContext, Query,
    SlotHandle, UnpackingProfile,
};
use roaring::RoaringBitmap;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn test_index() -> MemoryIndex {
    let docs: Vec<Document> = serde_json::from_value(json!([
        { "id": 0, "fields": { "title": "rust query planner", "body": "fast", "year": 2015 } },
        { "id": 1, "fields": { "title": "rust borrow checker", "body": "query", "year": 2020 } },
        { "id": 2, "fields": { "title": "query engine", "body": "rust", "year": 2021 } },
        { "id": 3, "fields": { "title": "python scripting", "body": "slow", "year": 2010 } },
        { "id": 4, "fields": { "title": "rust query engine", "body": "planner", "year": 2022 } }
    ]))
    .unwrap();
    MemoryIndex::from_documents(&docs)
}

fn default_resolver() -> ViewResolver {
    let mut resolver = ViewResolver::new();
    resolver.add("default", "title").add("default", "body");
    resolver
}

/// What a finished pipeline run produced
struct Outcome {
    /// Matching documents with the slots hit on each
    hits: Vec<(u32, Vec<SlotHandle>)>,
    layout: MatchDataLayout,
    terms: Vec<TermData>,
    term_count: usize,
    estimate: u64,
    last_child_op: Option<Op>,
    weights: Vec<(u32, i32)>,
}

impl Outcome {
    fn docs(&self) -> Vec<u32> {
        self.hits.iter().map(|(doc, _)| *doc).collect()
    }

    fn slots_of(&self, doc: u32) -> Vec<SlotHandle> {
        self.hits
            .iter()
            .find(|(d, _)| *d == doc)
            .map(|(_, slots)| slots.clone())
            .unwrap_or_default()
    }
}

fn evaluate(search: &mut dyn SearchIterator, md: &mut MatchData, limit: u32) -> Vec<(u32, Vec<SlotHandle>, Vec<i32>)> {
    let mut out = Vec::new();
    let mut target = 0;
    while let Some(doc) = search.seek(target) {
        if doc >= limit {
            break;
        }
        search.unpack(doc, md);
        let slots = md.hits(doc);
        let weights = slots.iter().map(|&h| md.get(h).weight).collect();
        out.push((doc, slots, weights));
        target = doc + 1;
    }
    out
}

fn run(
    index: &MemoryIndex,
    root: &Node,
    resolver: &ViewResolver,
    config: MatchingConfig,
    white_list: Option<&[u32]>,
) -> Outcome {
    let env = index.index_environment();
    let context = MemorySearchContext::new(index);
    let flags = config.unpacking();
    let request = RequestContext::from_config(&config);

    let mut query = Query::with_config(config);
    if let Some(ids) = white_list {
        let bits: RoaringBitmap = ids.iter().copied().collect();
        query.set_white_list_blueprint(Blueprint::white_list(Arc::new(bits)));
    }
    query
        .build_tree(&StackDump::encode(root), "", resolver, &env, flags)
        .unwrap();
    let mut layout = MatchDataLayout::new();
    query.reserve_handles(&request, &context, &mut layout);
    query.optimize();
    query.fetch_postings();
    query.freeze();

    let mut md = layout.create_match_data();
    let mut search = query.create_search(&md).unwrap();
    let evaluated = evaluate(search.as_mut(), &mut md, query.doc_id_limit());
    drop(search);

    let blueprint = query.blueprint().unwrap();
    Outcome {
        hits: evaluated.iter().map(|(d, s, _)| (*d, s.clone())).collect(),
        weights: evaluated
            .iter()
            .filter_map(|(d, _, w)| w.first().map(|w| (*d, *w)))
            .collect(),
        terms: query.extract_terms(),
        term_count: query.term_count(),
        estimate: query.estimate().est_hits,
        last_child_op: blueprint.children().last().and_then(Blueprint::op),
        layout,
    }
}

#[test]
fn test_field_expansion_reserves_one_slot_per_field() {
    let index = test_index();
    let root = Node::word(1, "default", "rust");
    let out = run(&index, &root, &default_resolver(), MatchingConfig::default(), None);

    assert_eq!(out.term_count, 1);
    assert_eq!(out.layout.len(), 2);
    assert_eq!(out.terms.len(), 1);
    assert_eq!(out.terms[0].fields.len(), 2);
    assert_eq!(out.estimate, 4);
    assert_eq!(out.docs(), vec![0, 1, 2, 4]);

    // fields are numbered by name: body=0, title=1
    let body_slot = out.layout.lookup(TermId(1), 0).unwrap();
    let title_slot = out.layout.lookup(TermId(1), 1).unwrap();
    assert_eq!(title_slot, SlotHandle(0));
    assert_eq!(out.slots_of(2), vec![body_slot]);
    assert_eq!(out.slots_of(0), vec![title_slot]);
}

#[test]
fn test_rank_and_not_evaluation() {
    let index = test_index();
    let root = Node::rank(vec![
        Node::and_not(vec![Node::word(1, "title", "rust"), Node::word(2, "body", "query")]),
        Node::word(3, "body", "planner"),
    ]);
    let out = run(&index, &root, &ViewResolver::new(), MatchingConfig::default(), None);

    assert_eq!(out.docs(), vec![0, 4]);
    let planner = out.layout.lookup(TermId(3), 0).unwrap();
    assert!(out.slots_of(4).contains(&planner));
    assert!(!out.slots_of(0).contains(&planner));
    // the excluded term never writes match data
    let excluded = out.layout.lookup(TermId(2), 0).unwrap();
    assert!(out.hits.iter().all(|(_, slots)| !slots.contains(&excluded)));
}

#[test]
fn test_number_range_and_prefix_terms() {
    let index = test_index();
    let root = Node::and(vec![
        Node::term_of_kind(1, "year", "[2015;2021]", TermKind::Number),
        Node::term_of_kind(2, "title", "eng", TermKind::Prefix),
    ]);
    let out = run(&index, &root, &ViewResolver::new(), MatchingConfig::default(), None);
    assert_eq!(out.docs(), vec![2]);
}

#[test]
fn test_white_list_restricts_matches() {
    let index = test_index();
    let root = Node::word(1, "title", "rust");
    let out = run(
        &index,
        &root,
        &ViewResolver::new(),
        MatchingConfig::default(),
        Some(&[1, 2, 4]),
    );
    assert_eq!(out.docs(), vec![1, 4]);
    assert_eq!(out.estimate, 3);
}

#[test]
fn test_split_unpacking_adds_unranked_filter_terms() {
    let index = test_index();
    let root = Node::and(vec![
        Node::phrase(
            1,
            "title",
            vec![Node::word(2, "title", "query"), Node::word(3, "title", "engine")],
        ),
        Node::word(4, "title", "rust"),
    ]);
    let config = MatchingConfig::default().with_profile(UnpackingProfile::Split);
    let out = run(&index, &root, &ViewResolver::new(), config, None);

    // phrase children, the plain word and two unranked copies
    assert_eq!(out.term_count, 5);
    let ranked: Vec<TermId> = out.terms.iter().map(|t| t.id).collect();
    assert_eq!(ranked, vec![TermId(1), TermId(4)]);
    assert_eq!(out.terms[0].phrase_length, 2);
    assert_eq!(out.docs(), vec![4]);
    assert_eq!(out.last_child_op, Some(Op::Phrase));
}

#[test]
fn test_delayed_phrase_is_evaluated_last() {
    let index = test_index();
    let root = Node::and(vec![
        Node::phrase(
            1,
            "title",
            vec![Node::word(2, "title", "rust"), Node::word(3, "title", "query")],
        ),
        Node::word(4, "body", "planner"),
    ]);
    let config = MatchingConfig::default().with_profile(UnpackingProfile::Delayed);
    let out = run(&index, &root, &ViewResolver::new(), config, None);
    assert_eq!(out.last_child_op, Some(Op::Phrase));
    assert_eq!(out.docs(), vec![4]);
}

#[test]
fn test_weighted_set_records_best_token_weight() {
    let index = test_index();
    let root = Node::WeightedSet(WeightedSetTerm {
        header: TermHeader::new(TermId(1), "body", Weight(100)),
        tokens: vec![
            WeightedToken {
                token: "fast".into(),
                weight: Weight(5),
            },
            WeightedToken {
                token: "rust".into(),
                weight: Weight(9),
            },
        ],
    });
    let out = run(&index, &root, &ViewResolver::new(), MatchingConfig::default(), None);
    assert_eq!(out.docs(), vec![0, 2]);
    assert_eq!(out.weights, vec![(0, 5), (2, 9)]);
    assert_eq!(out.layout.len(), 1);
}

#[test]
fn test_config_file_limits_term_expansion() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("matching.json");
    std::fs::write(&path, r#"{ "max_term_expansions": 1 }"#).unwrap();
    let config = MatchingConfig::from_json_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(config.location_weight, 100);

    let index = test_index();
    let root = Node::term_of_kind(1, "title", "p", TermKind::Prefix);
    let limited = run(&index, &root, &ViewResolver::new(), config, None);
    // "planner" sorts before "python"
    assert_eq!(limited.docs(), vec![0]);

    let unlimited = run(&index, &root, &ViewResolver::new(), MatchingConfig::default(), None);
    assert_eq!(unlimited.docs(), vec![0, 3]);
}

#[test]
fn test_unknown_field_yields_empty_plan() {
    let index = test_index();
    let root = Node::word(1, "nowhere", "rust");
    let out = run(&index, &root, &ViewResolver::new(), MatchingConfig::default(), None);
    assert!(out.docs().is_empty());
    assert_eq!(out.estimate, 0);
    assert_eq!(out.layout.len(), 0);
}
