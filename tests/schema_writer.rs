use std::cell::Cell;
use std::io::{self, Write};
use std::rc::Rc;
use subcsv::{FlatRow, Schema, SchemaWriter};

fn row(pairs: &[(&str, &str)]) -> FlatRow {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn strings(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|s| s.to_string()).collect()
}

fn records(bytes: &[u8]) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(bytes);
    rdr.records().map(|r| r.unwrap().iter().map(str::to_string).collect()).collect()
}

/// Incremental strategy: the second record brings `b`, so the header is
/// written again (old columns first, then `b`) right before that row.
#[test]
fn growing_writer_replays_header_on_new_columns() {
    let mut w = SchemaWriter::growing(Vec::new(), true);
    w.write_row(&row(&[("subreddit", "X"), ("a", "1")])).unwrap();
    w.write_row(&row(&[("subreddit", "X"), ("a", "2"), ("b", "3")])).unwrap();
    // No new column: no extra header, missing cells empty.
    w.write_row(&row(&[("subreddit", "X"), ("b", "4")])).unwrap();

    assert_eq!(w.rows_written(), 3);
    assert_eq!(w.header_lines(), 2);
    assert_eq!(w.schema().columns(), ["a", "subreddit", "b"]);

    let out = w.finish().unwrap();
    assert_eq!(
        records(&out),
        vec![
            strings(&["a", "subreddit"]),
            strings(&["1", "X"]),
            strings(&["a", "subreddit", "b"]),
            strings(&["2", "X", "3"]),
            strings(&["", "X", "4"]),
        ]
    );
}

/// Every cell is quoted by default; minimal quoting only quotes when needed.
#[test]
fn quoting_modes() {
    let mut w = SchemaWriter::growing(Vec::new(), true);
    w.write_row(&row(&[("a", "1")])).unwrap();
    let out = String::from_utf8(w.finish().unwrap()).unwrap();
    assert_eq!(out.lines().collect::<Vec<_>>(), ["\"a\"", "\"1\""]);

    let mut w = SchemaWriter::growing(Vec::new(), false);
    w.write_row(&row(&[("a", "1"), ("b", "x,y")])).unwrap();
    let out = String::from_utf8(w.finish().unwrap()).unwrap();
    assert_eq!(out.lines().collect::<Vec<_>>(), ["a,b", "1,\"x,y\""]);
}

/// Cells with quotes, commas and newlines survive the CSV round trip.
#[test]
fn awkward_cells_survive() {
    let body = "line one\nline \"two\", with comma";
    let mut w = SchemaWriter::growing(Vec::new(), true);
    w.write_row(&row(&[("body", body), ("id", "c1")])).unwrap();
    let out = w.finish().unwrap();
    assert_eq!(records(&out), vec![strings(&["body", "id"]), strings(&[body, "c1"])]);
}

/// Schema columns only ever grow, and positions never move.
#[test]
fn schema_is_monotonic() {
    let rows = [
        row(&[("m", "1"), ("c", "2")]),
        row(&[("a", "1")]),
        row(&[("z", "1"), ("c", "3"), ("b", "0")]),
        row(&[("m", "1")]),
    ];
    let mut schema = Schema::new();
    let mut previous: Vec<String> = Vec::new();
    for r in &rows {
        let added = schema.extend_from_row(r);
        assert_eq!(&schema.columns()[..previous.len()], previous.as_slice());
        assert_eq!(schema.len(), previous.len() + added.len());
        let mut sorted = added.clone();
        sorted.sort();
        assert_eq!(added, sorted, "new columns are appended in sorted order");
        previous = schema.columns().to_vec();
    }
    assert_eq!(schema.columns(), ["c", "m", "a", "b", "z"]);
}

/// Two-pass schema: discovered important columns first (in priority order), the rest sorted.
#[test]
fn prioritized_schema_orders_columns() {
    let important = strings(&["created_date", "author", "body", "permalink"]);
    let discovered = strings(&["score", "body", "id", "created_date", "author", "archived"]);
    let schema = Schema::prioritized(&important, discovered);
    assert_eq!(schema.columns(), ["created_date", "author", "body", "archived", "id", "score"]);
    assert!(!schema.contains("permalink"));
}

/// Fixed writer: exactly one header, written even before the first row.
#[test]
fn fixed_writer_single_header() {
    let schema = Schema::prioritized(&strings(&["id"]), strings(&["id", "a", "b"]));
    let mut w = SchemaWriter::fixed(Vec::new(), schema, true).unwrap();
    assert_eq!(w.header_lines(), 1);
    w.write_row(&row(&[("id", "1"), ("b", "x")])).unwrap();
    w.write_row(&row(&[("id", "2"), ("a", "y")])).unwrap();
    assert_eq!(w.unknown_cells(), 0);
    assert_eq!(w.header_lines(), 1);

    let out = w.finish().unwrap();
    assert_eq!(
        records(&out),
        vec![strings(&["id", "a", "b"]), strings(&["1", "", "x"]), strings(&["2", "y", ""])]
    );
}

/// A fixed schema drops (and counts) cells it does not know.
#[test]
fn fixed_writer_counts_unknown_cells() {
    let schema = Schema::prioritized(&[], strings(&["id"]));
    let mut w = SchemaWriter::fixed(Vec::new(), schema, true).unwrap();
    w.write_row(&row(&[("id", "1"), ("late", "x")])).unwrap();
    assert_eq!(w.unknown_cells(), 1);
    assert_eq!(w.schema().columns(), ["id"]);
    let out = w.finish().unwrap();
    assert_eq!(records(&out), vec![strings(&["id"]), strings(&["1"])]);
}

/// Sink whose next `fail` writes return an error; everything else is kept.
struct FlakySink {
    out: Vec<u8>,
    fail: Rc<Cell<u32>>,
}

impl Write for FlakySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail.get() > 0 {
            self.fail.set(self.fail.get() - 1);
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A header that fails to reach the sink does not grow the schema: the row is
/// reported as failed and the next row carrying the same column writes the header.
#[test]
fn failed_header_write_keeps_schema_consistent() {
    let fail = Rc::new(Cell::new(0));
    let mut w = SchemaWriter::growing(FlakySink { out: Vec::new(), fail: fail.clone() }, true);
    let rows = [
        row(&[("a", "1")]),
        row(&[("a", "2"), ("b", "3")]),
        row(&[("a", "4"), ("b", "5")]),
        row(&[("a", "6")]),
    ];

    let mut failed = 0u64;
    for (i, r) in rows.iter().enumerate() {
        if i == 1 {
            fail.set(1);
        }
        if w.write_row(r).is_err() {
            failed += 1;
            assert_eq!(w.schema().columns(), ["a"], "schema must not grow past the header on disk");
        }
    }

    assert_eq!(failed, 1);
    assert_eq!(w.rows_written() + failed, rows.len() as u64);
    assert_eq!(w.header_lines(), 2);
    let out = w.finish().unwrap().out;
    assert_eq!(
        records(&out),
        vec![
            strings(&["a"]),
            strings(&["1"]),
            strings(&["a", "b"]),
            strings(&["4", "5"]),
            strings(&["6", ""]),
        ]
    );
}

/// A failed row write loses only that row; later rows land intact.
#[test]
fn failed_row_write_skips_only_that_row() {
    let fail = Rc::new(Cell::new(0));
    let mut w = SchemaWriter::growing(FlakySink { out: Vec::new(), fail: fail.clone() }, false);
    w.write_row(&row(&[("id", "1")])).unwrap();
    fail.set(1);
    assert!(w.write_row(&row(&[("id", "2")])).is_err());
    w.write_row(&row(&[("id", "3")])).unwrap();

    assert_eq!(w.rows_written(), 2);
    let out = w.finish().unwrap().out;
    assert_eq!(records(&out), vec![strings(&["id"]), strings(&["1"]), strings(&["3"])]);
}
