use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::info;

/// A base row enriched with the derived relative-metric columns.
///
/// Derived columns are `None` when the baseline join found no row for the
/// key; that models the undefined value of a missing baseline and must be
/// filtered (not crashed on) downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
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
    #[serde(rename = "Trace Group")]
    pub trace_group: String,
    #[serde(rename = "Miss")]
    pub miss: f64,
    #[serde(rename = "Relative Miss Ratio [FIFO]")]
    pub rel_miss_ratio_fifo: Option<f64>,
    #[serde(rename = "Promotion Efficiency")]
    pub promotion_efficiency: Option<f64>,
    #[serde(rename = "Relative Promotion [LRU]")]
    pub rel_promotion_lru: Option<f64>,
    #[serde(rename = "Relative Miss Ratio [LRU]")]
    pub rel_miss_ratio_lru: Option<f64>,
    #[serde(rename = "Relative Promotion [Base FR]")]
    pub rel_promotion_base_fr: Option<f64>,
    #[serde(rename = "Relative Miss Ratio [Base FR]")]
    pub rel_miss_ratio_base_fr: Option<f64>,
    #[serde(rename = "Relative Promotion [Bit FR]")]
    pub rel_promotion_bit_fr: Option<f64>,
    #[serde(rename = "Relative Miss Ratio [Bit FR]")]
    pub rel_miss_ratio_bit_fr: Option<f64>,
    #[serde(rename = "Relative Promotion [Adv]")]
    pub rel_promotion_adv: Option<f64>,
    #[serde(rename = "Relative Miss Ratio [Adv]")]
    pub rel_miss_ratio_adv: Option<f64>,
}

/// One grouped-mean row of the zipf throughput aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputRow {
    #[serde(rename = "Algorithm")]
    pub algorithm: String,
    #[serde(rename = "Scale")]
    pub scale: Option<f64>,
    #[serde(rename = "Bit")]
    pub bit: Option<f64>,
    #[serde(rename = "Request")]
    pub request: f64,
    #[serde(rename = "Miss Ratio")]
    pub miss_ratio: f64,
    #[serde(rename = "Reinserted")]
    pub reinserted: f64,
    #[serde(rename = "Throughput")]
    pub throughput: f64,
}

/// Splits rows on the zipf marker in the trace name: zipf traces carry no
/// trace-relative baseline and feed the throughput aggregation instead.
pub fn split_zipf(rows: Vec<Record>) -> (Vec<Record>, Vec<Record>) {
    rows.into_iter()
        .partition(|r| !r.trace.to_ascii_lowercase().contains("zipf"))
}

/// Key shared by the global baselines: (Cache Size, Trace Path).
type SizeTraceKey = (u64, String);
/// Widened key for the per-bit FR baseline.
type SizeTraceBitKey = (u64, String, Option<u64>);
/// Widened key for the advanced-variant baseline.
type SizeTraceAlgoKey = (u64, String, String);

fn size_trace(r: &Record) -> SizeTraceKey {
    (r.cache_size.to_bits(), r.trace_path.clone())
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Applies the pre-filter and derives every relative-metric column.
///
/// Filter policy (in order): round float columns to 4 decimals, keep rows
/// with Ignore Obj Size == 1, sort by Trace Path, keep Real Cache Size >= 10
/// and Request >= 1,000,000. Each derived column is a left-join against one
/// baseline subset; all the baseline maps are built once before the pass.
pub fn process(rows: &[Record]) -> Vec<ProcessedRecord> {
    let mut rows: Vec<Record> = rows
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r.miss_ratio = round4(r.miss_ratio);
            r.throughput = round4(r.throughput);
            r.cache_size = round4(r.cache_size);
            r.scale = r.scale.map(round4);
            r.bit = r.bit.map(round4);
            r.bee_fraction = r.bee_fraction.map(round4);
            r
        })
        .filter(|r| r.ignore_obj_size == 1)
        .collect();
    rows.sort_by(|a, b| a.trace_path.cmp(&b.trace_path));
    rows.retain(|r| r.real_cache_size >= 10 && r.request >= 1_000_000);

    let fifo = baseline_by_size_trace(&rows, |r| r.algorithm == "FIFO");
    let lru = baseline_by_size_trace(&rows, |r| r.algorithm == "LRU");
    let base_fr = baseline_by_size_trace(&rows, |r| r.algorithm == "FR" && r.bit == Some(1.0));
    let bit_fr: HashMap<SizeTraceBitKey, &Record> = rows
        .iter()
        .filter(|r| r.algorithm == "FR")
        .map(|r| {
            let (size, trace) = size_trace(r);
            ((size, trace, r.bit.map(f64::to_bits)), r)
        })
        .collect();
    let adv: HashMap<SizeTraceAlgoKey, &Record> = rows
        .iter()
        .filter(|r| r.variant.as_deref() == Some("LRU"))
        .map(|r| {
            let (size, trace) = size_trace(r);
            ((size, trace, r.algorithm.clone()), r)
        })
        .collect();

    let processed = rows
        .iter()
        .map(|r| {
            let key = size_trace(r);
            let fifo_row = fifo.get(&key).copied();
            let lru_row = lru.get(&key).copied();
            let base_fr_row = base_fr.get(&key).copied();
            let bit_fr_row = bit_fr
                .get(&(key.0, key.1.clone(), r.bit.map(f64::to_bits)))
                .copied();
            let adv_row = adv.get(&(key.0, key.1.clone(), r.algorithm.clone())).copied();

            ProcessedRecord {
                config: r.config.clone(),
                algorithm: r.algorithm.clone(),
                real_cache_size: r.real_cache_size,
                request: r.request,
                miss_ratio: r.miss_ratio,
                reinserted: r.reinserted,
                throughput: r.throughput,
                trace: r.trace.clone(),
                trace_path: r.trace_path.clone(),
                cache_size: r.cache_size,
                ignore_obj_size: r.ignore_obj_size,
                scale: r.scale,
                bit: r.bit,
                variant: r.variant.clone(),
                bee_fraction: r.bee_fraction,
                trace_group: trace_group(&r.trace_path),
                miss: r.request as f64 * r.miss_ratio,
                rel_miss_ratio_fifo: fifo_row.map(|b| r.miss_ratio / b.miss_ratio),
                promotion_efficiency: fifo_row.map(|b| {
                    (b.miss_ratio - r.miss_ratio) * r.request as f64 / r.reinserted as f64
                }),
                rel_promotion_lru: lru_row.map(|b| ratio(r.reinserted, b.reinserted)),
                rel_miss_ratio_lru: lru_row.map(|b| r.miss_ratio / b.miss_ratio),
                rel_promotion_base_fr: base_fr_row.map(|b| ratio(r.reinserted, b.reinserted)),
                rel_miss_ratio_base_fr: base_fr_row.map(|b| r.miss_ratio / b.miss_ratio),
                rel_promotion_bit_fr: bit_fr_row.map(|b| ratio(r.reinserted, b.reinserted)),
                rel_miss_ratio_bit_fr: bit_fr_row.map(|b| r.miss_ratio / b.miss_ratio),
                rel_promotion_adv: adv_row.map(|b| ratio(r.reinserted, b.reinserted)),
                rel_miss_ratio_adv: adv_row.map(|b| r.miss_ratio / b.miss_ratio),
            }
        })
        .collect::<Vec<_>>();
    info!(rows = processed.len(), "derived relative metrics");
    processed
}

fn baseline_by_size_trace<'a>(
    rows: &'a [Record],
    subset: impl Fn(&Record) -> bool,
) -> HashMap<SizeTraceKey, &'a Record> {
    rows.iter().filter(|r| subset(r)).map(|r| (size_trace(r), r)).collect()
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    numerator as f64 / denominator as f64
}

fn trace_group(trace_path: &str) -> String {
    trace_path.split('/').next().unwrap_or(trace_path).to_string()
}

/// Grouped mean of the zipf subset over (Algorithm, Scale, Bit). Rows with no
/// Scale or Bit form their own group instead of being dropped.
pub fn throughput_summary(rows: &[Record]) -> Vec<ThroughputRow> {
    #[derive(Default)]
    struct Acc {
        request: f64,
        miss_ratio: f64,
        reinserted: f64,
        throughput: f64,
        count: f64,
    }

    let mut groups: BTreeMap<(String, Option<u64>, Option<u64>), Acc> = BTreeMap::new();
    for r in rows {
        let key = (
            r.algorithm.clone(),
            r.scale.map(f64::to_bits),
            r.bit.map(f64::to_bits),
        );
        let acc = groups.entry(key).or_default();
        acc.request += r.request as f64;
        acc.miss_ratio += r.miss_ratio;
        acc.reinserted += r.reinserted as f64;
        acc.throughput += r.throughput;
        acc.count += 1.0;
    }

    groups
        .into_iter()
        .map(|((algorithm, scale, bit), acc)| ThroughputRow {
            algorithm,
            scale: scale.map(f64::from_bits),
            bit: bit.map(f64::from_bits),
            request: acc.request / acc.count,
            miss_ratio: acc.miss_ratio / acc.count,
            reinserted: acc.reinserted / acc.count,
            throughput: acc.throughput / acc.count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(algorithm: &str, trace_path: &str) -> Record {
        Record {
            config: None,
            algorithm: algorithm.to_string(),
            real_cache_size: 100,
            request: 2_000_000,
            miss_ratio: 0.4,
            reinserted: 1000,
            throughput: 10.0,
            trace: trace_path.rsplit('/').next().unwrap().to_string(),
            trace_path: trace_path.to_string(),
            cache_size: 0.01,
            ignore_obj_size: 1,
            scale: None,
            bit: None,
            variant: None,
            bee_fraction: None,
        }
    }

    #[test]
    fn lru_rows_are_self_relative() {
        let lru = record("LRU", "c1/t1");
        let processed = process(&[lru]);
        assert_eq!(processed[0].rel_miss_ratio_lru, Some(1.0));
        assert_eq!(processed[0].rel_promotion_lru, Some(1.0));
    }

    #[test]
    fn missing_baseline_yields_none_not_error() {
        let mut fr = record("FR", "c1/t1");
        fr.bit = Some(2.0);
        let processed = process(&[fr]);
        let row = &processed[0];
        assert_eq!(row.rel_miss_ratio_lru, None);
        assert_eq!(row.rel_miss_ratio_fifo, None);
        assert_eq!(row.promotion_efficiency, None);
        // No Bit==1 FR row, but the row is its own bit-matched baseline.
        assert_eq!(row.rel_miss_ratio_base_fr, None);
        assert_eq!(row.rel_miss_ratio_bit_fr, Some(1.0));
    }

    #[test]
    fn fifo_baseline_feeds_relative_miss_and_efficiency() {
        let mut fifo = record("FIFO", "c1/t1");
        fifo.miss_ratio = 0.5;
        fifo.reinserted = 0;
        let mut delay = record("Delay", "c1/t1");
        delay.miss_ratio = 0.4;
        delay.reinserted = 1000;
        delay.scale = Some(0.2);

        let processed = process(&[fifo, delay]);
        let row = processed.iter().find(|r| r.algorithm == "Delay").unwrap();
        assert_eq!(row.rel_miss_ratio_fifo, Some(0.8));
        // (0.5 - 0.4) * 2e6 / 1000
        assert_eq!(row.promotion_efficiency, Some(200.0));
    }

    #[test]
    fn baselines_join_only_within_the_same_trace() {
        let lru = record("LRU", "c1/t1");
        let fr = {
            let mut r = record("FR", "c1/t2");
            r.bit = Some(1.0);
            r
        };
        let processed = process(&[lru, fr]);
        let fr_row = processed.iter().find(|r| r.algorithm == "FR").unwrap();
        assert_eq!(fr_row.rel_miss_ratio_lru, None);
        assert_eq!(fr_row.rel_miss_ratio_base_fr, Some(1.0));
    }

    #[test]
    fn bit_fr_baseline_compares_within_matching_bit() {
        let mut fr1 = record("FR", "c1/t1");
        fr1.bit = Some(1.0);
        fr1.config = Some("1".to_string());
        fr1.miss_ratio = 0.5;
        fr1.reinserted = 2000;
        let mut dfr = record("D-FR", "c1/t1");
        dfr.bit = Some(1.0);
        dfr.scale = Some(0.05);
        dfr.miss_ratio = 0.25;
        dfr.reinserted = 500;

        let processed = process(&[fr1, dfr]);
        let row = processed.iter().find(|r| r.algorithm == "D-FR").unwrap();
        assert_eq!(row.rel_miss_ratio_bit_fr, Some(0.5));
        assert_eq!(row.rel_promotion_bit_fr, Some(0.25));
        assert_eq!(row.rel_miss_ratio_base_fr, Some(0.5));
    }

    #[test]
    fn adv_baseline_joins_within_the_same_algorithm() {
        let mut arc_lru = record("ARC", "c1/t1");
        arc_lru.variant = Some("LRU".to_string());
        arc_lru.config = Some("LRU".to_string());
        arc_lru.miss_ratio = 0.4;
        arc_lru.reinserted = 1000;
        let mut arc_adv = record("ARC", "c1/t1");
        arc_adv.variant = Some("lazy".to_string());
        arc_adv.config = Some("lazy".to_string());
        arc_adv.miss_ratio = 0.3;
        arc_adv.reinserted = 100;
        let mut twoq = record("TwoQ", "c1/t1");
        twoq.variant = Some("lazy".to_string());
        twoq.config = Some("lazy".to_string());

        let processed = process(&[arc_lru, arc_adv, twoq]);
        let adv = processed
            .iter()
            .find(|r| r.algorithm == "ARC" && r.variant.as_deref() == Some("lazy"))
            .unwrap();
        assert_eq!(adv.rel_miss_ratio_adv, Some(0.75));
        assert_eq!(adv.rel_promotion_adv, Some(0.1));
        // TwoQ has no LRU-variant row of its own.
        let twoq = processed.iter().find(|r| r.algorithm == "TwoQ").unwrap();
        assert_eq!(twoq.rel_miss_ratio_adv, None);
    }

    #[test]
    fn prefilter_drops_small_runs_and_foreign_rows() {
        let keep = record("LRU", "c1/t1");
        let mut small_cache = record("LRU", "c1/t2");
        small_cache.real_cache_size = 5;
        let mut short_run = record("LRU", "c1/t3");
        short_run.request = 999_999;
        let mut sized = record("LRU", "c1/t4");
        sized.ignore_obj_size = 0;

        let processed = process(&[keep, small_cache, short_run, sized]);
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].trace_path, "c1/t1");
        assert!(processed.iter().all(|r| {
            r.request >= 1_000_000 && r.real_cache_size >= 10 && r.ignore_obj_size == 1
        }));
    }

    #[test]
    fn metrics_are_rounded_before_joining() {
        let mut lru = record("LRU", "c1/t1");
        lru.miss_ratio = 0.123456;
        let processed = process(&[lru]);
        assert_eq!(processed[0].miss_ratio, 0.1235);
    }

    #[test]
    fn processed_rows_are_sorted_by_trace_path() {
        let rows = vec![record("LRU", "c2/t9"), record("LRU", "c1/t1")];
        let processed = process(&rows);
        assert_eq!(processed[0].trace_path, "c1/t1");
        assert_eq!(processed[1].trace_path, "c2/t9");
    }

    #[test]
    fn trace_group_is_the_leading_path_component() {
        let processed = process(&[record("LRU", "cluster7/disk/t1")]);
        assert_eq!(processed[0].trace_group, "cluster7");
    }

    #[test]
    fn throughput_summary_groups_by_algorithm_scale_bit() {
        let mut a = record("Prob", "zipf/z1");
        a.scale = Some(0.5);
        a.throughput = 10.0;
        let mut b = record("Prob", "zipf/z2");
        b.scale = Some(0.5);
        b.throughput = 20.0;
        let mut c = record("Prob", "zipf/z1");
        c.scale = Some(0.1);
        c.throughput = 40.0;

        let summary = throughput_summary(&[a, b, c]);
        assert_eq!(summary.len(), 2);
        let half = summary.iter().find(|r| r.scale == Some(0.5)).unwrap();
        assert_eq!(half.throughput, 15.0);
        let tenth = summary.iter().find(|r| r.scale == Some(0.1)).unwrap();
        assert_eq!(tenth.throughput, 40.0);
    }

    #[test]
    fn zipf_split_is_case_insensitive() {
        let rows = vec![record("LRU", "c1/t1"), record("LRU", "bench/Zipf-1.0")];
        let (kept, zipf) = split_zipf(rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(zipf.len(), 1);
        assert_eq!(zipf[0].trace, "Zipf-1.0");
    }
}
