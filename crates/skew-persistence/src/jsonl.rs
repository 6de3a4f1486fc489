//! JSON Lines backed tick store.
//!
//! Every accepted row goes into an in-memory index and is appended to a
//! daily file per table (`quotes_20250301.jsonl`, `marks_...`,
//! `skewness_...`). Files are opened in append mode, so an interrupted
//! write only loses its own line. On open, rows inside the retention
//! window are reloaded.

use crate::error::{PersistenceError, PersistenceResult};
use crate::store::TickStore;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skew_core::{MarkQuote, OptionKind, OptionQuote, SkewnessRecord, Strike};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const QUOTES: &str = "quotes";
const MARKS: &str = "marks";
const SKEWNESS: &str = "skewness";

/// How often (by row timestamp) the in-memory index drops expired rows.
const PRUNE_INTERVAL_MS: i64 = 60_000;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for the daily files. `None` keeps rows in memory only.
    pub data_dir: Option<PathBuf>,
    /// Rows older than this are pruned from memory and not reloaded.
    pub retention_ms: i64,
    /// Buffered lines per table before a flush.
    pub flush_every: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            retention_ms: 48 * 3_600_000,
            flush_every: 64,
        }
    }
}

/// Open daily file of one table.
struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Buffered appender for one table.
struct TableWriter {
    base_dir: PathBuf,
    table: &'static str,
    /// `(file date, encoded line)`
    buffer: Vec<(String, String)>,
    flush_every: usize,
    active: Option<ActiveFile>,
}

impl TableWriter {
    fn new(base_dir: &Path, table: &'static str, flush_every: usize) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            table,
            buffer: Vec::with_capacity(flush_every),
            flush_every: flush_every.max(1),
            active: None,
        }
    }

    fn append<T: Serialize>(&mut self, timestamp_ms: i64, row: &T) -> PersistenceResult<()> {
        let line = serde_json::to_string(row)?;
        self.buffer.push((file_date(timestamp_ms), line));
        if self.buffer.len() >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let count = self.buffer.len();
        let buffer = std::mem::take(&mut self.buffer);
        for (date, line) in &buffer {
            let active = self.writer_for(date)?;
            writeln!(active.writer, "{line}")?;
            active.records_written += 1;
        }
        if let Some(active) = self.active.as_mut() {
            active.writer.flush()?;
        }

        debug!(table = self.table, records = count, "Flushed rows to JSON Lines");
        Ok(())
    }

    /// Writer for `date`, rotating the open file when the date changes.
    fn writer_for(&mut self, date: &str) -> PersistenceResult<&mut ActiveFile> {
        let rotate = self.active.as_ref().map(|a| a.date != date).unwrap_or(true);
        if rotate {
            self.close_active();
            let path = self.base_dir.join(format!("{}_{}.jsonl", self.table, date));
            info!(path = %path.display(), "Opening JSON Lines file (append mode)");
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.active = Some(ActiveFile {
                writer: BufWriter::new(file),
                date: date.to_string(),
                records_written: 0,
            });
        }
        let table = self.table;
        self.active
            .as_mut()
            .ok_or_else(|| PersistenceError::NoActiveFile(table.to_string()))
    }

    fn close_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, table = self.table, "Failed to flush writer on close");
            }
            debug!(
                table = self.table,
                date = %active.date,
                records = active.records_written,
                "Closed JSON Lines file"
            );
        }
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, table = self.table, "Failed to flush buffer on drop");
        }
        self.close_active();
    }
}

/// In-memory index, keyed by expiration timestamp.
///
/// Row vectors stay sorted by `timestamp_ms`; rows with equal timestamps
/// keep insertion order.
#[derive(Default)]
struct Index {
    quotes: BTreeMap<i64, Vec<OptionQuote>>,
    marks: BTreeMap<i64, Vec<MarkQuote>>,
    skewness: BTreeMap<(i64, i64), SkewnessRecord>,
    last_prune_ms: i64,
}

impl Index {
    fn prune(&mut self, cutoff_ms: i64) -> usize {
        let mut removed = 0;
        for rows in self.quotes.values_mut() {
            let before = rows.len();
            rows.retain(|q| q.timestamp_ms >= cutoff_ms);
            removed += before - rows.len();
        }
        for rows in self.marks.values_mut() {
            let before = rows.len();
            rows.retain(|m| m.timestamp_ms >= cutoff_ms);
            removed += before - rows.len();
        }
        let before = self.skewness.len();
        self.skewness.retain(|(ts, _), _| *ts >= cutoff_ms);
        removed += before - self.skewness.len();

        self.quotes.retain(|_, rows| !rows.is_empty());
        self.marks.retain(|_, rows| !rows.is_empty());
        removed
    }
}

/// JSON Lines tick store.
pub struct JsonLinesStore {
    config: StoreConfig,
    index: RwLock<Index>,
    writers: Option<Writers>,
}

struct Writers {
    quotes: Mutex<TableWriter>,
    marks: Mutex<TableWriter>,
    skewness: Mutex<TableWriter>,
}

impl JsonLinesStore {
    /// Open the store, reloading rows inside the retention window.
    pub fn open(config: StoreConfig) -> PersistenceResult<Self> {
        let mut index = Index::default();
        let writers = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let cutoff_ms = Utc::now().timestamp_millis() - config.retention_ms;
                reload(dir, cutoff_ms, &mut index)?;
                Some(Writers {
                    quotes: Mutex::new(TableWriter::new(dir, QUOTES, config.flush_every)),
                    marks: Mutex::new(TableWriter::new(dir, MARKS, config.flush_every)),
                    skewness: Mutex::new(TableWriter::new(dir, SKEWNESS, config.flush_every)),
                })
            }
            None => None,
        };

        Ok(Self {
            config,
            index: RwLock::new(index),
            writers,
        })
    }

    /// Store without backing files.
    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::default(),
            index: RwLock::new(Index::default()),
            writers: None,
        }
    }

    /// Flush buffered lines of every table.
    pub fn flush(&self) -> PersistenceResult<()> {
        if let Some(writers) = &self.writers {
            writers.quotes.lock().flush()?;
            writers.marks.lock().flush()?;
            writers.skewness.lock().flush()?;
        }
        Ok(())
    }

    /// Drop rows older than the retention window ending at `now_ms`.
    pub fn prune(&self, now_ms: i64) -> usize {
        let removed = self.index.write().prune(now_ms - self.config.retention_ms);
        if removed > 0 {
            debug!(removed, "Pruned expired rows");
        }
        removed
    }

    /// Number of rows held in memory (quotes, marks, skewness).
    pub fn row_counts(&self) -> (usize, usize, usize) {
        let index = self.index.read();
        (
            index.quotes.values().map(Vec::len).sum(),
            index.marks.values().map(Vec::len).sum(),
            index.skewness.len(),
        )
    }

    fn maybe_prune(&self, timestamp_ms: i64) {
        let due = {
            let index = self.index.read();
            timestamp_ms - index.last_prune_ms >= PRUNE_INTERVAL_MS
        };
        if due {
            let mut index = self.index.write();
            index.last_prune_ms = timestamp_ms;
            index.prune(timestamp_ms - self.config.retention_ms);
        }
    }
}

impl TickStore for JsonLinesStore {
    fn insert_quote(&self, quote: &OptionQuote) -> PersistenceResult<()> {
        self.maybe_prune(quote.timestamp_ms);
        {
            let mut index = self.index.write();
            let rows = index.quotes.entry(quote.expiration_ts).or_default();
            insert_sorted(rows, quote.clone(), |q| q.timestamp_ms);
        }
        if let Some(writers) = &self.writers {
            writers.quotes.lock().append(quote.timestamp_ms, quote)?;
        }
        Ok(())
    }

    fn insert_mark(&self, mark: &MarkQuote) -> PersistenceResult<()> {
        self.maybe_prune(mark.timestamp_ms);
        {
            let mut index = self.index.write();
            let rows = index.marks.entry(mark.expiration_ts).or_default();
            insert_sorted(rows, mark.clone(), |m| m.timestamp_ms);
        }
        if let Some(writers) = &self.writers {
            writers.marks.lock().append(mark.timestamp_ms, mark)?;
        }
        Ok(())
    }

    fn insert_skewness(&self, record: &SkewnessRecord) -> PersistenceResult<bool> {
        {
            let mut index = self.index.write();
            if index.skewness.contains_key(&record.key()) {
                return Ok(false);
            }
            index.skewness.insert(record.key(), *record);
        }
        if let Some(writers) = &self.writers {
            writers.skewness.lock().append(record.timestamp_ms, record)?;
        }
        Ok(true)
    }

    fn quotes_since(&self, expiration_ts: i64, since_ms: i64) -> Vec<OptionQuote> {
        let index = self.index.read();
        newest_first(index.quotes.get(&expiration_ts), since_ms, |q| q.timestamp_ms)
    }

    fn marks_since(&self, expiration_ts: i64, since_ms: i64) -> Vec<MarkQuote> {
        let index = self.index.read();
        newest_first(index.marks.get(&expiration_ts), since_ms, |m| m.timestamp_ms)
    }

    fn latest_marks_per_strike(&self, expiration_ts: i64, since_ms: i64) -> Vec<MarkQuote> {
        let index = self.index.read();
        let Some(rows) = index.marks.get(&expiration_ts) else {
            return Vec::new();
        };
        let mut seen: BTreeSet<(OptionKind, Strike)> = BTreeSet::new();
        window(rows, since_ms, |m| m.timestamp_ms)
            .iter()
            .rev()
            .filter(|m| seen.insert((m.kind, m.strike)))
            .cloned()
            .collect()
    }

    fn skewness_for(&self, expiration_ts: i64) -> Vec<SkewnessRecord> {
        let index = self.index.read();
        let mut rows: Vec<SkewnessRecord> = index
            .skewness
            .values()
            .filter(|r| r.expiration_ts == expiration_ts)
            .copied()
            .collect();
        rows.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        rows
    }
}

/// Insert after every row with a timestamp at or before `row`'s.
///
/// Feed rows arrive almost in order, so this is a push in the common case.
fn insert_sorted<T>(rows: &mut Vec<T>, row: T, ts: impl Fn(&T) -> i64) {
    let at = ts(&row);
    match rows.last() {
        Some(last) if ts(last) > at => {
            let pos = rows.partition_point(|r| ts(r) <= at);
            rows.insert(pos, row);
        }
        _ => rows.push(row),
    }
}

/// Tail of a sorted vector with `timestamp >= since_ms`.
fn window<T>(rows: &[T], since_ms: i64, ts: impl Fn(&T) -> i64) -> &[T] {
    let start = rows.partition_point(|r| ts(r) < since_ms);
    &rows[start..]
}

/// Rows at or after `since_ms`, newest first. Ties keep the later insert first.
fn newest_first<T: Clone>(rows: Option<&Vec<T>>, since_ms: i64, ts: impl Fn(&T) -> i64) -> Vec<T> {
    rows.map(|rows| window(rows, since_ms, ts).iter().rev().cloned().collect())
        .unwrap_or_default()
}

fn file_date(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_else(Utc::now)
        .format("%Y%m%d")
        .to_string()
}

fn reload(dir: &Path, cutoff_ms: i64, index: &mut Index) -> PersistenceResult<()> {
    let cutoff_date = file_date(cutoff_ms);

    let quotes: Vec<OptionQuote> = read_table(dir, QUOTES, &cutoff_date)?;
    for quote in quotes.into_iter().filter(|q| q.timestamp_ms >= cutoff_ms) {
        index.quotes.entry(quote.expiration_ts).or_default().push(quote);
    }

    let marks: Vec<MarkQuote> = read_table(dir, MARKS, &cutoff_date)?;
    for mark in marks.into_iter().filter(|m| m.timestamp_ms >= cutoff_ms) {
        index.marks.entry(mark.expiration_ts).or_default().push(mark);
    }

    let skewness: Vec<SkewnessRecord> = read_table(dir, SKEWNESS, &cutoff_date)?;
    for record in skewness.into_iter().filter(|r| r.timestamp_ms >= cutoff_ms) {
        index.skewness.entry(record.key()).or_insert(record);
    }

    for rows in index.quotes.values_mut() {
        rows.sort_by_key(|q| q.timestamp_ms);
    }
    for rows in index.marks.values_mut() {
        rows.sort_by_key(|m| m.timestamp_ms);
    }

    info!(
        quotes = index.quotes.values().map(Vec::len).sum::<usize>(),
        marks = index.marks.values().map(Vec::len).sum::<usize>(),
        skewness = index.skewness.len(),
        "Reloaded rows inside retention window"
    );
    Ok(())
}

/// Read every `{table}_{YYYYMMDD}.jsonl` file dated on or after `cutoff_date`.
fn read_table<T: DeserializeOwned>(dir: &Path, table: &str, cutoff_date: &str) -> PersistenceResult<Vec<T>> {
    let prefix = format!("{table}_");
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    let mut seen = HashSet::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".jsonl"))
        else {
            continue;
        };
        if NaiveDate::parse_from_str(date, "%Y%m%d").is_err() || date < cutoff_date {
            continue;
        }
        if seen.insert(date.to_string()) {
            files.push((date.to_string(), path.clone()));
        }
    }
    files.sort();

    let mut rows = Vec::new();
    let mut malformed = 0usize;
    for (_, path) in files {
        let reader = BufReader::new(File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(row) => rows.push(row),
                Err(_) => malformed += 1,
            }
        }
    }
    if malformed > 0 {
        warn!(table, malformed, "Skipped malformed lines while reloading");
    }
    Ok(rows)
}
