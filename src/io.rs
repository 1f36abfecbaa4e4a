use crate::parse::{parse_line, parse_scalability_line};
use crate::record::{Record, ScalabilityRecord, Table};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Trace suffix stripped when canonicalizing manifest entries.
static ORACLE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.oracleGeneral\S*").expect("oracle suffix pattern"));

/// Maps a trace's short name to its canonical path, built once per run from
/// the manifest file (one trace path per line). Log files whose trace is not
/// listed here are stale or foreign and get skipped.
#[derive(Debug, Clone)]
pub struct TraceLookup {
    traces: HashMap<String, String>,
}

impl TraceLookup {
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("unable to open trace manifest {}", path.display()))?;
        let mut traces = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line.context("failed to read manifest line")?;
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            let key = basename(entry).to_string();
            let canonical = ORACLE_SUFFIX.replace(entry, "").into_owned();
            traces.insert(key, canonical);
        }
        Ok(Self { traces })
    }

    pub fn canonical_path(&self, key: &str) -> Option<&str> {
        self.traces.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Recursively lists files under `dir`, lexicographically sorted so the
/// dedup tie-break downstream does not depend on readdir order.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("unable to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("unable to read entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            walk(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Parses every log file under `data_dir` into one deduplicated table.
///
/// A file's trace key is its name up to the `.cachesim` suffix; files whose
/// key is absent from the manifest are skipped. Unmatched lines are skipped;
/// a matched line that fails identity or config decoding aborts with the
/// file and line number.
pub fn read_data(data_dir: &Path, lookup: &TraceLookup) -> Result<Table> {
    let mut table = Table::new();
    for path in list_files(data_dir)? {
        let file_name = path.to_string_lossy();
        let stem = file_name.split(".cachesim").next().unwrap_or(&file_name);
        let key = basename(stem);
        let Some(trace_path) = lookup.canonical_path(key) else {
            debug!(file = %file_name, %key, "trace not in manifest, skipping file");
            continue;
        };
        scan_log_file(&path, trace_path, &mut table)?;
    }
    info!(rows = table.len(), "assembled experiment table");
    Ok(table)
}

fn scan_log_file(path: &Path, trace_path: &str, table: &mut Table) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("unable to open log file {}", path.display()))?;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let parsed = parse_line(&line)
            .with_context(|| format!("{}:{}", path.display(), idx + 1))?;
        if let Some(parsed) = parsed {
            let record = Record::assemble(&parsed, trace_path)
                .with_context(|| format!("{}:{}", path.display(), idx + 1))?;
            table.insert(record);
        }
    }
    Ok(())
}

/// Parses every `.txt` scalability log under `dir`.
pub fn read_scalability_data(dir: &Path) -> Result<Vec<ScalabilityRecord>> {
    let mut rows = Vec::new();
    for path in list_files(dir)? {
        let is_txt = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if !is_txt {
            continue;
        }
        let file = File::open(&path)
            .with_context(|| format!("unable to open log file {}", path.display()))?;
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            let parsed = parse_scalability_line(&line)
                .with_context(|| format!("{}:{}", path.display(), idx + 1))?;
            if let Some(parsed) = parsed {
                rows.push(ScalabilityRecord::from(&parsed));
            }
        }
    }
    info!(rows = rows.len(), "assembled scalability table");
    Ok(rows)
}

/// Writes rows as CSV.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("unable to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes rows as a zstd-compressed CSV snapshot next to the plain mirror.
pub fn write_csv_zst<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }
    let mut buf = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    let file =
        File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    zstd::stream::copy_encode(buf.as_slice(), file, 0)
        .with_context(|| format!("unable to compress {}", path.display()))?;
    Ok(())
}

/// Reads a CSV snapshot back into rows.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("unable to open {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("bad row in {}", path.display()))?);
    }
    Ok(rows)
}

/// Reads a zstd-compressed CSV snapshot back into rows.
pub fn read_csv_zst<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file =
        File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let decoder = zstd::stream::Decoder::new(file)
        .with_context(|| format!("unable to decompress {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(decoder);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("bad row in {}", path.display()))?);
    }
    Ok(rows)
}
