//! Structural diffs between reconstructed states.
//!
//! States are compared through their JSON form. Objects are compared field
//! by field and arrays position by position; a reordered array shows up as
//! positional `Changed` entries, never as a move. Strings that both parse as
//! RFC 3339 instants are equal when they agree to the millisecond.

use crate::path::{PathPattern, PathSegment, format_path};
use chrono::DateTime;
use rewind_core::CoreResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of change at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present only in the after state
    Added,
    /// Present only in the before state
    Removed,
    /// Present in both with different values
    Changed,
}

impl ChangeKind {
    /// The kind seen from the other side
    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
            Self::Changed => Self::Changed,
        }
    }

    const fn sigil(self) -> char {
        match self {
            Self::Added => '+',
            Self::Removed => '-',
            Self::Changed => '~',
        }
    }
}

/// One difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Location in the state; empty for the root
    pub path: Vec<PathSegment>,
    /// Kind of change
    pub kind: ChangeKind,
    /// Value in the before state
    pub before: Option<Value>,
    /// Value in the after state
    pub after: Option<Value>,
}

impl DiffEntry {
    /// Path in text form
    #[must_use]
    pub fn path_string(&self) -> String {
        format_path(&self.path)
    }

    /// The same change seen from the other side
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            path: self.path.clone(),
            kind: self.kind.inverted(),
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "<root>".to_string()
        } else {
            self.path_string()
        };
        write!(f, "{} {}", self.kind.sigil(), path)?;
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => write!(f, ": {before} -> {after}"),
            (Some(value), None) | (None, Some(value)) => write!(f, ": {value}"),
            (None, None) => Ok(()),
        }
    }
}

/// Counts per change kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// `Added` entries
    pub added: usize,
    /// `Removed` entries
    pub removed: usize,
    /// `Changed` entries
    pub changed: usize,
}

/// Ordered list of differences between two states
///
/// Entries follow the document order of the after state, with removals
/// placed after the surviving fields of their parent in before-state order.
/// Each path appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDiff {
    entries: Vec<DiffEntry>,
}

impl StateDiff {
    /// Whether the states were structurally equal
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All entries in order
    #[must_use]
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    /// Iterate entries in order
    pub fn iter(&self) -> std::slice::Iter<'_, DiffEntry> {
        self.entries.iter()
    }

    /// Entry at exactly `path`
    #[must_use]
    pub fn get(&self, path: &[PathSegment]) -> Option<&DiffEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// Swap the sides of every entry; entry order is kept
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            entries: self.entries.iter().map(DiffEntry::inverted).collect(),
        }
    }

    /// Count entries by kind
    #[must_use]
    pub fn summary(&self) -> DiffSummary {
        self.entries
            .iter()
            .fold(DiffSummary::default(), |mut summary, entry| {
                match entry.kind {
                    ChangeKind::Added => summary.added += 1,
                    ChangeKind::Removed => summary.removed += 1,
                    ChangeKind::Changed => summary.changed += 1,
                }
                summary
            })
    }
}

impl fmt::Display for StateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl IntoIterator for StateDiff {
    type Item = DiffEntry;
    type IntoIter = std::vec::IntoIter<DiffEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a StateDiff {
    type Item = &'a DiffEntry;
    type IntoIter = std::slice::Iter<'a, DiffEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Diff options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Subtrees never visited
    pub ignore_paths: Vec<PathPattern>,
    /// Depth past which an unequal subtree is reported as one `Changed`
    pub max_depth: Option<usize>,
}

impl DiffOptions {
    /// Skip subtrees matching `pattern`
    #[must_use]
    pub fn ignore(mut self, pattern: PathPattern) -> Self {
        self.ignore_paths.push(pattern);
        self
    }

    /// Stop descending at `depth`
    #[must_use]
    pub const fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// Computes [`StateDiff`]s under fixed options
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    /// Create an engine
    #[must_use]
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Active options
    #[must_use]
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Diff two states through their JSON form
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if either state cannot be serialized
    pub fn diff<S: Serialize + ?Sized>(&self, before: &S, after: &S) -> CoreResult<StateDiff> {
        let before = serde_json::to_value(before)?;
        let after = serde_json::to_value(after)?;
        Ok(self.diff_values(&before, &after))
    }

    /// Diff two JSON values
    #[must_use]
    pub fn diff_values(&self, before: &Value, after: &Value) -> StateDiff {
        let mut walk = Walk {
            options: &self.options,
            path: Vec::new(),
            entries: Vec::new(),
        };
        walk.compare(before, after);
        StateDiff {
            entries: walk.entries,
        }
    }
}

/// Diff two JSON values
#[must_use]
pub fn diff(before: &Value, after: &Value, options: &DiffOptions) -> StateDiff {
    DiffEngine::new(options.clone()).diff_values(before, after)
}

struct Walk<'a> {
    options: &'a DiffOptions,
    path: Vec<PathSegment>,
    entries: Vec<DiffEntry>,
}

impl Walk<'_> {
    fn ignored(&self) -> bool {
        self.options
            .ignore_paths
            .iter()
            .any(|pattern| pattern.matches(&self.path))
    }

    fn at_depth_limit(&self) -> bool {
        self.options
            .max_depth
            .is_some_and(|max| self.path.len() >= max)
    }

    fn record(&mut self, kind: ChangeKind, before: Option<&Value>, after: Option<&Value>) {
        self.entries.push(DiffEntry {
            path: self.path.clone(),
            kind,
            before: before.cloned(),
            after: after.cloned(),
        });
    }

    fn compare(&mut self, before: &Value, after: &Value) {
        if self.ignored() {
            return;
        }
        match (before, after) {
            (Value::Object(b), Value::Object(a)) if !self.at_depth_limit() => {
                self.compare_objects(b, a);
            }
            (Value::Array(b), Value::Array(a)) if !self.at_depth_limit() => {
                self.compare_arrays(b, a);
            }
            _ => {
                if !self.equivalent(before, after) {
                    self.record(ChangeKind::Changed, Some(before), Some(after));
                }
            }
        }
    }

    fn compare_objects(&mut self, before: &Map<String, Value>, after: &Map<String, Value>) {
        for (key, a) in after {
            self.path.push(PathSegment::Key(key.clone()));
            match before.get(key) {
                Some(b) => self.compare(b, a),
                None => self.one_sided(ChangeKind::Added, a),
            }
            self.path.pop();
        }
        for (key, b) in before {
            if !after.contains_key(key) {
                self.path.push(PathSegment::Key(key.clone()));
                self.one_sided(ChangeKind::Removed, b);
                self.path.pop();
            }
        }
    }

    fn compare_arrays(&mut self, before: &[Value], after: &[Value]) {
        for i in 0..before.len().max(after.len()) {
            self.path.push(PathSegment::Index(i));
            match (before.get(i), after.get(i)) {
                (Some(b), Some(a)) => self.compare(b, a),
                (None, Some(a)) => self.one_sided(ChangeKind::Added, a),
                (Some(b), None) => self.one_sided(ChangeKind::Removed, b),
                (None, None) => {}
            }
            self.path.pop();
        }
    }

    fn one_sided(&mut self, kind: ChangeKind, value: &Value) {
        if self.ignored() {
            return;
        }
        match kind {
            ChangeKind::Added => self.record(kind, None, Some(value)),
            _ => self.record(kind, Some(value), None),
        }
    }

    /// Equality under the diff rules, honouring ignored paths below the
    /// current one
    fn equivalent(&mut self, before: &Value, after: &Value) -> bool {
        if self.ignored() {
            return true;
        }
        match (before, after) {
            (Value::Object(b), Value::Object(a)) => {
                let keys_match = a.keys().chain(b.keys()).all(|key| {
                    (a.contains_key(key) && b.contains_key(key)) || {
                        self.path.push(PathSegment::Key(key.clone()));
                        let ignored = self.ignored();
                        self.path.pop();
                        ignored
                    }
                });
                keys_match
                    && a.iter().all(|(key, av)| match b.get(key) {
                        Some(bv) => {
                            self.path.push(PathSegment::Key(key.clone()));
                            let same = self.equivalent(bv, av);
                            self.path.pop();
                            same
                        }
                        None => true,
                    })
            }
            (Value::Array(b), Value::Array(a)) => (0..b.len().max(a.len())).all(|i| {
                self.path.push(PathSegment::Index(i));
                let same = match (b.get(i), a.get(i)) {
                    (Some(bv), Some(av)) => self.equivalent(bv, av),
                    _ => self.ignored(),
                };
                self.path.pop();
                same
            }),
            _ => scalars_equal(before, after),
        }
    }
}

fn scalars_equal(before: &Value, after: &Value) -> bool {
    match (before, after) {
        (Value::Number(b), Value::Number(a)) if b.is_f64() || a.is_f64() => {
            b.as_f64() == a.as_f64()
        }
        (Value::String(b), Value::String(a)) if b != a => instants_equal(b, a),
        _ => before == after,
    }
}

fn instants_equal(before: &str, after: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(before),
        DateTime::parse_from_rfc3339(after),
    ) {
        (Ok(b), Ok(a)) => b.timestamp_millis() == a.timestamp_millis(),
        _ => false,
    }
}
