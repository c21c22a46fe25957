//! Aggregators
//!
//! Each group of numbers is aggregated by one call to `first`, any number
//! of calls to `next` and a final `result`. Blueprints use them to combine
//! child estimates.

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Aggr {
    Avg,
    Count,
    Prod,
    Sum,
    Max,
    Min,
}

struct AggrNames {
    name_aggr: HashMap<&'static str, Aggr>,
    aggr_name: HashMap<Aggr, &'static str>,
}

static AGGR_NAMES: OnceLock<AggrNames> = OnceLock::new();

fn names() -> &'static AggrNames {
    AGGR_NAMES.get_or_init(|| {
        let mut names = AggrNames {
            name_aggr: HashMap::new(),
            aggr_name: HashMap::new(),
        };
        for (aggr, name) in [
            (Aggr::Avg, "avg"),
            (Aggr::Count, "count"),
            (Aggr::Prod, "prod"),
            (Aggr::Sum, "sum"),
            (Aggr::Max, "max"),
            (Aggr::Min, "min"),
        ] {
            names.name_aggr.insert(name, aggr);
            names.aggr_name.insert(aggr, name);
        }
        names
    })
}

impl Aggr {
    pub fn list() -> [Aggr; 6] {
        [Aggr::Avg, Aggr::Count, Aggr::Prod, Aggr::Sum, Aggr::Max, Aggr::Min]
    }

    pub fn name_of(self) -> &'static str {
        names().aggr_name[&self]
    }

    pub fn from_name(name: &str) -> Option<Aggr> {
        names().name_aggr.get(name).copied()
    }

    pub fn create(self) -> Box<dyn Aggregator> {
        match self {
            Aggr::Avg => Box::new(Avg::default()),
            Aggr::Count => Box::new(Count::default()),
            Aggr::Prod => Box::new(Prod::default()),
            Aggr::Sum => Box::new(Sum::default()),
            Aggr::Max => Box::new(Max::default()),
            Aggr::Min => Box::new(Min::default()),
        }
    }

    /// Aggregate `values`; `None` for an empty input
    pub fn fold(self, values: impl IntoIterator<Item = f64>) -> Option<f64> {
        let mut values = values.into_iter();
        let mut aggr = self.create();
        aggr.first(values.next()?);
        for v in values {
            aggr.next(v);
        }
        Some(aggr.result())
    }
}

pub trait Aggregator: Send {
    fn first(&mut self, value: f64);
    fn next(&mut self, value: f64);
    fn result(&self) -> f64;
}

#[derive(Default)]
struct Avg {
    sum: f64,
    cnt: usize,
}

impl Aggregator for Avg {
    fn first(&mut self, value: f64) {
        self.sum = value;
        self.cnt = 1;
    }
    fn next(&mut self, value: f64) {
        self.sum += value;
        self.cnt += 1;
    }
    fn result(&self) -> f64 {
        self.sum / self.cnt.max(1) as f64
    }
}

#[derive(Default)]
struct Count(usize);

impl Aggregator for Count {
    fn first(&mut self, _value: f64) {
        self.0 = 1;
    }
    fn next(&mut self, _value: f64) {
        self.0 += 1;
    }
    fn result(&self) -> f64 {
        self.0 as f64
    }
}

#[derive(Default)]
struct Prod(f64);

impl Aggregator for Prod {
    fn first(&mut self, value: f64) {
        self.0 = value;
    }
    fn next(&mut self, value: f64) {
        self.0 *= value;
    }
    fn result(&self) -> f64 {
        self.0
    }
}

#[derive(Default)]
struct Sum(f64);

impl Aggregator for Sum {
    fn first(&mut self, value: f64) {
        self.0 = value;
    }
    fn next(&mut self, value: f64) {
        self.0 += value;
    }
    fn result(&self) -> f64 {
        self.0
    }
}

#[derive(Default)]
struct Max(f64);

impl Aggregator for Max {
    fn first(&mut self, value: f64) {
        self.0 = value;
    }
    fn next(&mut self, value: f64) {
        self.0 = self.0.max(value);
    }
    fn result(&self) -> f64 {
        self.0
    }
}

#[derive(Default)]
struct Min(f64);

impl Aggregator for Min {
    fn first(&mut self, value: f64) {
        self.0 = value;
    }
    fn next(&mut self, value: f64) {
        self.0 = self.0.min(value);
    }
    fn result(&self) -> f64 {
        self.0
    }
}
