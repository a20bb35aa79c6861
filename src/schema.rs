//! Ordered, append-only column list of one output file.

use ahash::AHashSet;

use crate::flatten::FlatRow;

/// Columns of an output file. Unique, and once added never removed or reordered.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    columns: Vec<String>,
    known: AHashSet<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed order for the two-pass strategy: the `important` columns that were
    /// actually `discovered`, in the given priority order, then every other
    /// discovered column sorted lexicographically.
    pub fn prioritized<I>(important: &[String], discovered: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let discovered: AHashSet<String> = discovered.into_iter().collect();
        let mut schema = Self::new();
        for col in important {
            if discovered.contains(col) {
                schema.push(col.clone());
            }
        }
        let mut rest: Vec<String> = discovered.into_iter().filter(|c| !schema.contains(c)).collect();
        rest.sort();
        for col in rest {
            schema.push(col);
        }
        schema
    }

    /// Append the keys of `row` not seen before, sorted among themselves.
    /// Returns the newly added columns (empty when the schema did not change).
    pub fn extend_from_row(&mut self, row: &FlatRow) -> Vec<String> {
        let added = self.unseen_columns(row);
        self.append(added.clone());
        added
    }

    /// Keys of `row` not in the schema yet, sorted. The schema is left unchanged.
    pub fn unseen_columns(&self, row: &FlatRow) -> Vec<String> {
        // FlatRow iterates in key order, so the result comes out sorted.
        row.keys().filter(|k| !self.known.contains(k.as_str())).cloned().collect()
    }

    /// Append `cols` in order, skipping any already present.
    pub fn append(&mut self, cols: Vec<String>) {
        for col in cols {
            self.push(col);
        }
    }

    fn push(&mut self, col: String) {
        if self.known.insert(col.clone()) {
            self.columns.push(col);
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, col: &str) -> bool {
        self.known.contains(col)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Cells of `row` in schema order; columns the row lacks come out empty.
    pub fn project<'a>(&'a self, row: &'a FlatRow) -> impl Iterator<Item = &'a str> + 'a {
        self.columns.iter().map(move |c| row.get(c).map(String::as_str).unwrap_or(""))
    }
}
