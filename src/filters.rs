//! Per-record community predicate, the derived `created_date` column, and the
//! stage that strings them together with flattening.

use serde_json::{Map, Value};

use crate::date::{format_created_date, parse_epoch_seconds};
use crate::flatten::{flatten_with, FlatRow, FlattenOptions};

/// Keeps records whose community field equals the target exactly (case-sensitive).
#[derive(Clone, Debug)]
pub struct CommunityFilter {
    field: String,
    target: String,
}

impl CommunityFilter {
    pub fn new(field: impl Into<String>, target: impl Into<String>) -> Self {
        Self { field: field.into(), target: target.into() }
    }

    pub fn accept(&self, record: &Map<String, Value>) -> bool {
        record.get(&self.field).and_then(Value::as_str) == Some(self.target.as_str())
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Adds a `YYYY-MM-DD-HHMMSS` (UTC) column computed from the first epoch
/// field present in the flat row.
#[derive(Clone, Debug)]
pub struct CreatedDate {
    source_fields: Vec<String>,
    column: String,
}

impl CreatedDate {
    pub fn new<I, S>(source_fields: I, column: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { source_fields: source_fields.into_iter().map(Into::into).collect(), column: column.into() }
    }

    /// Insert the derived column. Returns false (row untouched) when no source
    /// field is present or its value is not a usable epoch.
    pub fn apply(&self, row: &mut FlatRow) -> bool {
        let Some(raw) = self.source_fields.iter().find_map(|f| row.get(f).filter(|v| !v.is_empty())) else {
            return false;
        };
        match parse_epoch_seconds(raw).and_then(format_created_date) {
            Some(date) => {
                row.insert(self.column.clone(), date);
                true
            }
            None => {
                tracing::debug!(value = %raw, "epoch field is not a valid timestamp; no derived date");
                false
            }
        }
    }
}

impl Default for CreatedDate {
    fn default() -> Self {
        Self::new(["created_utc", "created"], "created_date")
    }
}

/// Filter → flatten → transform for one record kind, with a running count of
/// accepted records and a progress line every `milestone_every` acceptances.
#[derive(Clone, Debug)]
pub struct RecordStage {
    filter: CommunityFilter,
    created: CreatedDate,
    flatten: FlattenOptions,
    label: String,
    milestone_every: u64,
    accepted: u64,
}

impl RecordStage {
    pub fn new(filter: CommunityFilter, created: CreatedDate, flatten: FlattenOptions, label: impl Into<String>) -> Self {
        Self { filter, created, flatten, label: label.into(), milestone_every: 1000, accepted: 0 }
    }

    /// Milestone interval; `0` disables the progress lines.
    pub fn milestone_every(mut self, n: u64) -> Self {
        self.milestone_every = n;
        self
    }

    pub fn accept(&self, record: &Map<String, Value>) -> bool {
        self.filter.accept(record)
    }

    pub fn transform(&self, mut row: FlatRow) -> FlatRow {
        self.created.apply(&mut row);
        row
    }

    /// Flat row for an accepted record, `None` for a rejected one.
    pub fn project(&mut self, record: &Map<String, Value>) -> Option<FlatRow> {
        if !self.accept(record) {
            return None;
        }
        let row = self.transform(flatten_map(record, &self.flatten));
        self.accepted += 1;
        if self.milestone_every > 0 && self.accepted % self.milestone_every == 0 {
            tracing::info!("Processed {} {} {}", self.accepted, self.filter.target(), self.label);
        }
        Some(row)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }
}

fn flatten_map(record: &Map<String, Value>, opts: &FlattenOptions) -> FlatRow {
    // Top level walked here so the record is never cloned into a `Value`.
    let mut row = FlatRow::new();
    for (k, v) in record {
        row.append(&mut flatten_with(v, k, opts));
    }
    row
}
