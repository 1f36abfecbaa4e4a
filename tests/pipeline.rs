use promo_figures::cli::Cli;
use promo_figures::io;
use promo_figures::metrics::{ProcessedRecord, ThroughputRow};
use promo_figures::record::Record;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    File::create(path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
}

fn cli(root: &Path, charts: &[&str]) -> Cli {
    Cli {
        data_dir: root.join("logs"),
        charts: charts.iter().map(|s| s.to_string()).collect(),
        manifest: root.join("datasets.txt"),
        out_dir: root.join("data"),
        figures_dir: root.join("figures"),
        scalability_dir: None,
    }
}

fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write_file(
        &root.join("datasets.txt"),
        "cluster1/xyz.oracleGeneral.zst\nbench/zipf1\n",
    );

    write_file(
        &root.join("logs/xyz.oracleGeneral.zst.cachesim.log"),
        concat!(
            "=== simulation start ===\n",
            "result xyz.trace LRU cache size 100, 1000000 req, miss ratio 0.2000, \
             throughput 8.0 MQPS, promotion 1000\n",
            "result xyz.trace FIFO cache size 100, 1000000 req, miss ratio 0.2500, \
             throughput 9.0 MQPS, promotion 0\n",
            "result xyz.trace Clock-4 cache size 100, 1000000 req, miss ratio 0.1234, \
             throughput 5.6 MQPS, promotion 789\n",
            "result xyz.trace Clock-1 cache size 100, 1000000 req, miss ratio 0.1500, \
             throughput 6.0 MQPS, promotion 900\n",
            "result xyz.trace lpLRU_prob-0.5 cache size 100, 1000000 req, miss ratio 0.1800, \
             throughput 7.0 MQPS, promotion 500\n",
            "done in 12.3s\n",
        ),
    );

    // Same keys again from another directory; dedup must keep one row each.
    write_file(
        &root.join("logs/zz_rerun/xyz.oracleGeneral.zst.cachesim.log"),
        "result xyz.trace LRU cache size 100, 1000000 req, miss ratio 0.9000, \
         throughput 1.0 MQPS, promotion 1\n",
    );

    // A trace outside the manifest is skipped wholesale.
    write_file(
        &root.join("logs/foreign.cachesim.log"),
        "result foreign.trace LRU cache size 100, 1000000 req, miss ratio 0.5, \
         throughput 1.0 MQPS, promotion 1\n",
    );

    // Zipf trace feeds the throughput aggregation, not the relative table.
    write_file(
        &root.join("logs/zipf1.cachesim.log"),
        "result zipf1.trace lpLRU_prob-0.5 cache size 100, 1000000 req, miss ratio 0.3, \
         throughput 30.0 MQPS, promotion 100\n",
    );

    dir
}

#[test]
fn pipeline_produces_all_artifacts() {
    let dir = setup_workspace();
    let root = dir.path();
    promo_figures::run(cli(root, &["overview", "prob_miss_ratio"])).unwrap();

    let data: Vec<Record> = io::read_csv(&root.join("data/data.csv")).unwrap();
    // 5 unique keys from xyz + 1 zipf; the rerun duplicate is dropped.
    assert_eq!(data.len(), 6);
    let lru = data.iter().find(|r| r.algorithm == "LRU").unwrap();
    assert_eq!(lru.miss_ratio, 0.2, "first-seen row wins dedup");
    assert_eq!(lru.trace_path, "cluster1/xyz");

    let processed: Vec<ProcessedRecord> =
        io::read_csv(&root.join("data/processed.csv")).unwrap();
    assert_eq!(processed.len(), 5, "zipf rows leave the relative table");

    let fr = processed
        .iter()
        .find(|r| r.algorithm == "FR" && r.bit == Some(4.0))
        .unwrap();
    assert_eq!(fr.miss_ratio, 0.1234);
    assert_eq!(fr.request, 1_000_000);
    assert_eq!(fr.reinserted, 789);
    assert_eq!(fr.real_cache_size, 100);
    assert_eq!(fr.rel_miss_ratio_lru, Some(0.1234 / 0.2));
    assert_eq!(fr.rel_miss_ratio_fifo, Some(0.1234 / 0.25));
    assert_eq!(fr.rel_miss_ratio_base_fr, Some(0.1234 / 0.15));
    assert_eq!(fr.rel_miss_ratio_bit_fr, Some(1.0));

    let lru = processed.iter().find(|r| r.algorithm == "LRU").unwrap();
    assert_eq!(lru.rel_miss_ratio_lru, Some(1.0));
    assert_eq!(lru.rel_promotion_lru, Some(1.0));

    let throughput: Vec<ThroughputRow> =
        io::read_csv(&root.join("data/throughput.csv")).unwrap();
    assert_eq!(throughput.len(), 1);
    assert_eq!(throughput[0].algorithm, "Prob");
    assert_eq!(throughput[0].throughput, 30.0);

    assert!(root.join("data/data.csv.zst").exists());
    assert!(root.join("data/processed.csv.zst").exists());
    assert!(root.join("figures/overview.csv").exists());
    assert!(root.join("figures/prob_miss_ratio.csv").exists());
}

#[test]
fn unknown_chart_name_aborts() {
    let dir = setup_workspace();
    let err = promo_figures::run(cli(dir.path(), &["nope"])).unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn unknown_algorithm_token_aborts_with_context() {
    let dir = setup_workspace();
    let root = dir.path();
    write_file(
        &root.join("logs/xyz.oracleGeneral.zst.cachesim.extra.log"),
        "result xyz.trace FooBar cache size 100, 1000000 req, miss ratio 0.5, \
         throughput 1.0 MQPS, promotion 1\n",
    );
    let err = promo_figures::run(cli(root, &[])).unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("FooBar"), "{chain}");
    assert!(chain.contains("cachesim.extra.log"), "{chain}");
}

#[test]
fn scalability_logs_produce_their_own_table() {
    let dir = setup_workspace();
    let root = dir.path();
    write_file(
        &root.join("scal/run1.txt"),
        concat!(
            "warmup done\n",
            "zipf.txt Clock-2 cache size 1GiB, miss ratio 0.31, \
             throughput 42.5 MQPS, thread_num 16\n",
            "zipf.txt FIFO cache size 1GiB, miss ratio 0.40, \
             throughput 55.0 MQPS, thread_num 16\n",
        ),
    );
    let mut cli = cli(root, &[]);
    cli.scalability_dir = Some(root.join("scal"));
    promo_figures::run(cli).unwrap();

    let rows: Vec<promo_figures::record::ScalabilityRecord> =
        io::read_csv(&root.join("data/scalability.csv")).unwrap();
    assert_eq!(rows.len(), 2);
    let fr = rows.iter().find(|r| r.algorithm == "FR").unwrap();
    assert_eq!(fr.param, 2.0);
    assert_eq!(fr.cache_bytes, 1024_u64.pow(3));
    assert_eq!(fr.thread, 16.0);
}

#[test]
fn missing_zipf_subset_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(&root.join("datasets.txt"), "cluster1/xyz.oracleGeneral.zst\n");
    write_file(
        &root.join("logs/xyz.oracleGeneral.zst.cachesim.log"),
        "result xyz.trace LRU cache size 100, 1000000 req, miss ratio 0.2, \
         throughput 8.0 MQPS, promotion 1000\n",
    );
    promo_figures::run(cli(root, &[])).unwrap();
    assert!(!root.join("data/throughput.csv").exists());
    assert!(root.join("data/processed.csv").exists());
}
