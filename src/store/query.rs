//! A small document query language, evaluated in-process over JSON documents.
//!
//! Paths are dotted (`metadata.matchId`). An equality condition against an array field matches
//! when the array contains the value, so `Filter::new().eq("metadata.participants", puuid)`
//! selects every match the player appears in.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// Look up a dotted path in a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |value, key| value.get(key))
}

/// A condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals (or, for arrays, contains) the value.
    Eq(Value),
    /// Field equals (or, for arrays, contains) any of the values.
    In(Vec<Value>),
}
impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        let Some(field) = field else {
            return false;
        };
        let hit = |target: &Value| match field {
            Value::Array(items) if !target.is_array() => items.contains(target),
            _ => field == target,
        };
        match self {
            Self::Eq(target) => hit(target),
            Self::In(targets) => targets.iter().any(hit),
        }
    }
}

/// Conjunction of field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}
impl Filter {
    /// Empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `path == value`.
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push((path.into(), Condition::Eq(value.into())));
        self
    }

    /// Require `path` to be one of `values`.
    pub fn is_in<V>(mut self, path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push((path.into(), Condition::In(values)));
        self
    }

    /// The conditions, in insertion order.
    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    /// If `doc` satisfies every condition.
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(path, condition)| condition.matches(lookup(doc, path)))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Stable sort on one field. Missing fields sort before everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Dotted path.
    pub path: String,
    /// Direction.
    pub order: Order,
}
impl Sort {
    /// Ascending on `path`.
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order: Order::Ascending,
        }
    }

    /// Descending on `path`.
    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order: Order::Descending,
        }
    }

    fn apply(&self, docs: &mut [Value]) {
        docs.sort_by(|a, b| {
            let ord = compare(lookup(a, &self.path), lookup(b, &self.path));
            match self.order {
                Order::Ascending => ord,
                Order::Descending => ord.reverse(),
            }
        });
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Keep only `paths` (nested objects are rebuilt along the way).
pub fn project(doc: &Value, paths: &[String]) -> Value {
    let mut out = Map::new();
    for path in paths {
        if let Some(value) = lookup(doc, path) {
            insert_path(&mut out, path, value.clone());
        }
    }
    Value::Object(out)
}

fn insert_path(out: &mut Map<String, Value>, path: &str, value: Value) {
    let Some((head, rest)) = path.split_once('.') else {
        out.insert(path.to_owned(), value);
        return;
    };
    let next = out
        .entry(head.to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
    if !next.is_object() {
        *next = Value::Object(Map::new());
    }
    if let Some(map) = next.as_object_mut() {
        insert_path(map, rest, value);
    }
}

/// Options for [`crate::store::Store::get`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Documents must match.
    pub filter: Option<Filter>,
    /// Fields to keep.
    pub projection: Option<Vec<String>>,
    /// Result order.
    pub sort: Option<Sort>,
    /// Most documents returned.
    pub limit: Option<usize>,
}
impl Query {
    /// Everything, in storage order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Set the filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the projection.
    pub fn project<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Set the sort.
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate: filter, then sort, then limit, then project.
    pub fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some(filter) = &self.filter {
            docs.retain(|doc| filter.matches(doc));
        }
        if let Some(sort) = &self.sort {
            sort.apply(&mut docs);
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        if let Some(paths) = &self.projection {
            docs = docs.iter().map(|doc| project(doc, paths)).collect();
        }
        docs
    }
}

/// Group accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    /// Number of documents in the group.
    Count,
    /// Mean of a numeric or boolean (`true` = 1) field. `null` if no document has it.
    Avg(String),
}

/// One aggregation stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep matching documents.
    Match(Filter),
    /// Stable sort.
    Sort(Sort),
    /// Keep the first `n`.
    Limit(usize),
    /// Keep only these paths.
    Project(Vec<String>),
    /// Group by the value at `by` into `{ "_id": <value>, <name>: <accumulated>, .. }`, in order
    /// of first appearance.
    Group {
        /// Dotted path of the group key.
        by: String,
        /// Output field name and accumulator.
        accumulators: Vec<(String, Accumulator)>,
    },
}

fn group(docs: Vec<Value>, by: &str, accumulators: &[(String, Accumulator)]) -> Vec<Value> {
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for doc in docs {
        let key = lookup(&doc, by).cloned().unwrap_or(Value::Null);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }
    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Map::new();
            out.insert("_id".to_owned(), key);
            for (name, accumulator) in accumulators {
                let value = match accumulator {
                    Accumulator::Count => Value::from(members.len()),
                    Accumulator::Avg(path) => {
                        let values = members
                            .iter()
                            .filter_map(|doc| match lookup(doc, path)? {
                                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                                other => other.as_f64(),
                            })
                            .collect::<Vec<_>>();
                        if values.is_empty() {
                            Value::Null
                        } else {
                            Value::from(values.iter().sum::<f64>() / values.len() as f64)
                        }
                    }
                };
                out.insert(name.clone(), value);
            }
            Value::Object(out)
        })
        .collect()
}

/// Run each stage in order.
pub fn aggregate(docs: Vec<Value>, stages: &[Stage]) -> Vec<Value> {
    stages.iter().fold(docs, |mut docs, stage| match stage {
        Stage::Match(filter) => {
            docs.retain(|doc| filter.matches(doc));
            docs
        }
        Stage::Sort(sort) => {
            sort.apply(&mut docs);
            docs
        }
        Stage::Limit(n) => {
            docs.truncate(*n);
            docs
        }
        Stage::Project(paths) => docs.iter().map(|doc| project(doc, paths)).collect(),
        Stage::Group { by, accumulators } => group(docs, by, accumulators),
    })
}
