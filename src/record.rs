use crate::algo::ConfigFields;
use crate::parse::{ParsedLine, ScalabilityLine};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One normalized experiment row. Created once per matched log line and never
/// mutated afterwards; the metric deriver produces enriched copies instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Config")]
    pub config: Option<String>,
    #[serde(rename = "Algorithm")]
    pub algorithm: String,
    #[serde(rename = "Real Cache Size")]
    pub real_cache_size: u64,
    #[serde(rename = "Request")]
    pub request: u64,
    #[serde(rename = "Miss Ratio")]
    pub miss_ratio: f64,
    #[serde(rename = "Reinserted")]
    pub reinserted: u64,
    #[serde(rename = "Throughput")]
    pub throughput: f64,
    #[serde(rename = "Trace")]
    pub trace: String,
    #[serde(rename = "Trace Path")]
    pub trace_path: String,
    #[serde(rename = "Cache Size")]
    pub cache_size: f64,
    #[serde(rename = "Ignore Obj Size")]
    pub ignore_obj_size: u8,
    #[serde(rename = "Scale")]
    pub scale: Option<f64>,
    #[serde(rename = "Bit")]
    pub bit: Option<f64>,
    #[serde(rename = "Variant")]
    pub variant: Option<String>,
    #[serde(rename = "BEE Fraction")]
    pub bee_fraction: Option<f64>,
}

/// Fractional cache size of the study's sweep; the simulator is always run at
/// 1% of the trace footprint.
pub const CACHE_SIZE_FRACTION: f64 = 0.01;

impl Record {
    /// Assembles one row from a parsed line and its canonical trace path.
    pub fn assemble(parsed: &ParsedLine, trace_path: &str) -> Result<Self> {
        let fields: ConfigFields = parsed.algorithm.decode_config(parsed.config.as_deref())?;
        let trace = match trace_path.rfind('/') {
            Some(idx) => trace_path[idx + 1..].to_string(),
            None => trace_path.to_string(),
        };
        Ok(Record {
            config: fields.config_override.or_else(|| parsed.config.clone()),
            algorithm: parsed.algorithm.display_name().to_string(),
            real_cache_size: parsed.cache_size,
            request: parsed.requests,
            miss_ratio: parsed.miss_ratio,
            reinserted: parsed.promotion,
            throughput: parsed.throughput,
            trace,
            trace_path: trace_path.to_string(),
            cache_size: CACHE_SIZE_FRACTION,
            ignore_obj_size: 1,
            scale: fields.scale,
            bit: fields.bit,
            variant: fields.variant,
            bee_fraction: fields.bee_fraction,
        })
    }

    /// Identity key: at most one row per key survives deduplication.
    pub fn identity_key(&self) -> RecordKey {
        RecordKey {
            trace_path: self.trace_path.clone(),
            cache_size_bits: self.cache_size.to_bits(),
            algorithm: self.algorithm.clone(),
            config: self.config.clone(),
        }
    }
}

/// (Trace Path, Cache Size, Algorithm, Config). Cache size is stored by bit
/// pattern so the key can be hashed and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub trace_path: String,
    pub cache_size_bits: u64,
    pub algorithm: String,
    pub config: Option<String>,
}

/// Accumulates records from every scanned file, keeping the first row seen
/// for each identity key. The scan feeding this table visits files in sorted
/// order, so "first seen" is deterministic across runs.
#[derive(Debug, Default)]
pub struct Table {
    rows: Vec<Record>,
    seen: HashSet<RecordKey>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless its identity key is already present.
    /// Returns whether the row was kept.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.seen.insert(record.identity_key()) {
            self.rows.push(record);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }
}

/// One row of the multi-thread scalability table. No dedup key here; every
/// matching line is one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalabilityRecord {
    #[serde(rename = "Algorithm")]
    pub algorithm: String,
    #[serde(rename = "Param")]
    pub param: f64,
    #[serde(rename = "Cache Bytes")]
    pub cache_bytes: u64,
    #[serde(rename = "Miss Ratio")]
    pub miss_ratio: f64,
    #[serde(rename = "Throughput")]
    pub throughput: f64,
    #[serde(rename = "Thread")]
    pub thread: f64,
}

impl From<&ScalabilityLine> for ScalabilityRecord {
    fn from(line: &ScalabilityLine) -> Self {
        ScalabilityRecord {
            algorithm: line.algorithm.display_name().to_string(),
            param: line.param,
            cache_bytes: line.cache_bytes,
            miss_ratio: line.miss_ratio,
            throughput: line.throughput,
            thread: line.threads as f64,
        }
    }
}
