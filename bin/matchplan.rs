use anyhow::{bail, Context, Result};
use clap::Parser;
use matchplan::blueprint::{Blueprint, RequestContext};
use matchplan::query::{Node, StackDump, ViewResolver};
use matchplan::search::matching_docs;
use matchplan::testing::{check_all_invariants, default_invariants};
use matchplan::{
    Document, MatchDataLayout, MatchingConfig, MemoryIndex, MemorySearchContext, Query,
    UnpackingProfile,
};
use roaring::RoaringBitmap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "matchplan")]
#[command(about = "Plan and run a query against a JSON document set", long_about = None)]
struct Args {
    /// JSON query tree
    #[arg(long)]
    query: PathBuf,

    /// JSON array of documents ({"id": .., "fields": {..}})
    #[arg(long)]
    docs: PathBuf,

    /// View mapping as view=field, may be repeated
    #[arg(long = "view", value_name = "VIEW=FIELD")]
    views: Vec<String>,

    /// Location constraint, e.g. pos:2,100,10,50
    #[arg(long, default_value = "")]
    location: String,

    /// Comma-separated visible document ids
    #[arg(long, value_delimiter = ',')]
    white_list: Option<Vec<u32>>,

    /// Fields whose estimates depend on the global filter
    #[arg(long, value_delimiter = ',')]
    filter_sensitive: Vec<String>,

    /// Unpacking profile (eager, split, delayed, split-delayed)
    #[arg(long, env = "MATCHPLAN_PROFILE", default_value = "eager")]
    profile: String,

    /// JSON matching configuration
    #[arg(long, env = "MATCHPLAN_CONFIG")]
    config: Option<PathBuf>,

    /// Request id to tag log lines with
    #[arg(long)]
    request_id: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("matchplan v{}", matchplan::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            MatchingConfig::from_json_str(&json)?
        }
        None => MatchingConfig::default(),
    };
    match UnpackingProfile::from_name(&args.profile) {
        Some(profile) => profile.apply_to(&mut config),
        None => warn!("Unknown profile '{}', using configured flags", args.profile),
    }

    let tree: Node = serde_json::from_str(
        &std::fs::read_to_string(&args.query)
            .with_context(|| format!("reading query {}", args.query.display()))?,
    )
    .context("parsing query tree")?;
    let docs: Vec<Document> = serde_json::from_str(
        &std::fs::read_to_string(&args.docs)
            .with_context(|| format!("reading documents {}", args.docs.display()))?,
    )
    .context("parsing documents")?;

    let index = MemoryIndex::from_documents(&docs);
    for field in &args.filter_sensitive {
        index.set_filter_sensitive(field, true);
    }
    let env = index.index_environment();
    let context = MemorySearchContext::new(&index);
    info!(documents = docs.len(), fields = env.fields().len(), "Index loaded");

    let mut resolver = ViewResolver::new();
    for mapping in &args.views {
        let Some((view, field)) = mapping.split_once('=') else {
            bail!("view mapping '{}' is not of the form view=field", mapping);
        };
        resolver.add(view, field);
    }

    let flags = config.unpacking();
    let mut request = RequestContext::from_config(&config);
    if let Some(id) = &args.request_id {
        request = request.with_request_id(id.clone());
    }

    let mut query = Query::with_config(config);
    if let Some(ids) = &args.white_list {
        let bits: RoaringBitmap = ids.iter().copied().collect();
        query.set_white_list_blueprint(Blueprint::white_list(Arc::new(bits)));
    }
    query.build_tree(&StackDump::encode(&tree), &args.location, &resolver, &env, flags)?;

    let location = query.extract_location();
    if location.valid {
        info!(attribute = %location.attribute, x = location.x, y = location.y, "Ranking on distance");
    }
    for term in query.extract_terms() {
        info!(term_id = %term.id, view = %term.view, fields = term.fields.len(), "Ranked term");
    }

    let mut layout = MatchDataLayout::new();
    query.reserve_handles(&request, &context, &mut layout);
    query.optimize();
    query.fetch_postings();
    query.freeze();

    for violation in check_all_invariants(&query, &default_invariants()) {
        warn!("{}", violation);
    }

    println!("{}", query.explain());
    println!("estimate: {}", query.estimate().est_hits);

    let mut md = layout.create_match_data();
    let mut search = query.create_search(&md)?;
    for doc in matching_docs(search.as_mut(), &mut md, query.doc_id_limit()) {
        let terms: Vec<String> = md
            .hits(doc)
            .into_iter()
            .filter_map(|handle| layout.owner(handle))
            .map(|(term, field)| format!("{}@{}", term, field))
            .collect();
        println!("{}\t{}", doc, terms.join(" "));
    }
    Ok(())
}
