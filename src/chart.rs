use crate::metrics::ProcessedRecord;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A column of the processed table that a chart can plot or group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Algorithm,
    Trace,
    Scale,
    Bit,
    MissRatio,
    Throughput,
    PromotionEfficiency,
    RelMissRatioFifo,
    RelPromotionLru,
    RelMissRatioLru,
    RelPromotionBaseFr,
    RelMissRatioBaseFr,
    RelPromotionBitFr,
    RelMissRatioBitFr,
    RelPromotionAdv,
    RelMissRatioAdv,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Algorithm => "Algorithm",
            Self::Trace => "Trace",
            Self::Scale => "Scale",
            Self::Bit => "Bit",
            Self::MissRatio => "Miss Ratio",
            Self::Throughput => "Throughput",
            Self::PromotionEfficiency => "Promotion Efficiency",
            Self::RelMissRatioFifo => "Relative Miss Ratio [FIFO]",
            Self::RelPromotionLru => "Relative Promotion [LRU]",
            Self::RelMissRatioLru => "Relative Miss Ratio [LRU]",
            Self::RelPromotionBaseFr => "Relative Promotion [Base FR]",
            Self::RelMissRatioBaseFr => "Relative Miss Ratio [Base FR]",
            Self::RelPromotionBitFr => "Relative Promotion [Bit FR]",
            Self::RelMissRatioBitFr => "Relative Miss Ratio [Bit FR]",
            Self::RelPromotionAdv => "Relative Promotion [Adv]",
            Self::RelMissRatioAdv => "Relative Miss Ratio [Adv]",
        }
    }

    /// Numeric view of the column; `None` for missing joins or for
    /// categorical columns.
    pub fn numeric(&self, r: &ProcessedRecord) -> Option<f64> {
        match self {
            Self::Algorithm | Self::Trace => None,
            Self::Scale => r.scale,
            Self::Bit => r.bit,
            Self::MissRatio => Some(r.miss_ratio),
            Self::Throughput => Some(r.throughput),
            Self::PromotionEfficiency => r.promotion_efficiency,
            Self::RelMissRatioFifo => r.rel_miss_ratio_fifo,
            Self::RelPromotionLru => r.rel_promotion_lru,
            Self::RelMissRatioLru => r.rel_miss_ratio_lru,
            Self::RelPromotionBaseFr => r.rel_promotion_base_fr,
            Self::RelMissRatioBaseFr => r.rel_miss_ratio_base_fr,
            Self::RelPromotionBitFr => r.rel_promotion_bit_fr,
            Self::RelMissRatioBitFr => r.rel_miss_ratio_bit_fr,
            Self::RelPromotionAdv => r.rel_promotion_adv,
            Self::RelMissRatioAdv => r.rel_miss_ratio_adv,
        }
    }

    /// Categorical view of the column.
    pub fn label(&self, r: &ProcessedRecord) -> Option<String> {
        match self {
            Self::Algorithm => Some(r.algorithm.clone()),
            Self::Trace => Some(r.trace.clone()),
            _ => self.numeric(r).map(format_number),
        }
    }
}

fn format_number(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Scatter,
    Box,
    Bar,
}

/// One cell handed to the renderer: numeric for measures, text for
/// categorical axes.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Num(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Num(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One plotted point/sample: the correctly-shaped table the renderer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub x: CellValue,
    pub y: f64,
    pub hue: String,
}

/// Everything the external plotting backend needs besides the data itself.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: Column,
    pub y: Column,
    pub hue: Column,
    pub x_label: String,
    pub y_label: String,
    /// category -> color, e.g. "FR" -> "#3182bd".
    pub palette: Vec<(String, String)>,
    /// category -> marker shape.
    pub markers: Vec<(String, String)>,
    /// plotting order of hue categories; empty = data order.
    pub order: Vec<String>,
    pub tick_step: Option<f64>,
    pub output: PathBuf,
}

impl ChartSpec {
    fn new(kind: ChartKind, x: Column, y: Column, output: PathBuf) -> Self {
        ChartSpec {
            kind,
            x,
            y,
            hue: Column::Algorithm,
            x_label: x.name().to_string(),
            y_label: y.name().to_string(),
            palette: Vec::new(),
            markers: Vec::new(),
            order: Vec::new(),
            tick_step: None,
            output,
        }
    }

    fn labels(mut self, x_label: &str, y_label: &str) -> Self {
        self.x_label = x_label.to_string();
        self.y_label = y_label.to_string();
        self
    }

    fn tick_step(mut self, step: f64) -> Self {
        self.tick_step = Some(step);
        self
    }
}

/// The figure sink. The real plotting backend lives outside this crate; the
/// pipeline's obligation ends at handing over a labeled (x, y, hue) table
/// and the style options.
pub trait Renderer {
    fn render(&self, rows: &[ChartRow], spec: &ChartSpec) -> Result<()>;
}

/// Stand-in sink that writes the chart's input table as CSV to the output
/// path, so every figure can be inspected (or re-plotted) without a plotting
/// backend in the build.
#[derive(Debug, Default)]
pub struct TableRenderer;

impl Renderer for TableRenderer {
    fn render(&self, rows: &[ChartRow], spec: &ChartSpec) -> Result<()> {
        if let Some(parent) = spec.output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(&spec.output)
            .with_context(|| format!("unable to create {}", spec.output.display()))?;
        writer.write_record([spec.x.name(), spec.y.name(), spec.hue.name()])?;
        for row in rows {
            writer.write_record([row.x.to_string(), row.y.to_string(), row.hue.clone()])?;
        }
        writer.flush()?;
        info!(chart = %spec.output.display(), rows = rows.len(), "rendered chart table");
        Ok(())
    }
}

/// Study-wide color assignment for the headline algorithms.
fn algorithm_palette() -> Vec<(String, String)> {
    [
        ("Batch", "#eff3ff"),
        ("Prob", "#bdd7e7"),
        ("Delay", "#6baed6"),
        ("FR", "#3182bd"),
        ("D-FR", "#31a354"),
        ("AGE", "#bae4b3"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn algorithm_markers() -> Vec<(String, String)> {
    [
        ("Batch", "o"),
        ("Prob", "s"),
        ("Delay", "D"),
        ("FR", "^"),
        ("D-FR", "v"),
        ("AGE", "P"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

type ChartFn = fn(&[ProcessedRecord], &dyn Renderer, &Path) -> Result<()>;

/// Name -> figure function. Chart names are part of the CLI surface;
/// requesting anything outside this set is a usage error.
pub fn registry() -> BTreeMap<&'static str, ChartFn> {
    let mut charts: BTreeMap<&'static str, ChartFn> = BTreeMap::new();
    charts.insert("overview", overview);
    charts.insert("prob_promotion", prob_promotion);
    charts.insert("prob_miss_ratio", prob_miss_ratio);
    charts.insert("batch_promotion", batch_promotion);
    charts.insert("batch_miss_ratio", batch_miss_ratio);
    charts.insert("fr_bits", fr_bits);
    charts.insert("efficiency", efficiency);
    charts
}

/// Runs one registered chart; an unknown name is fatal.
pub fn render_chart(
    name: &str,
    data: &[ProcessedRecord],
    renderer: &dyn Renderer,
    figures_dir: &Path,
) -> Result<()> {
    let charts = registry();
    let Some(chart) = charts.get(name) else {
        let known: Vec<&str> = charts.keys().copied().collect();
        bail!("chart '{name}' is not available (known charts: {})", known.join(", "));
    };
    chart(data, renderer, figures_dir)
}

/// Per-row (x, y, hue) points, dropping rows where either side is missing.
fn points(data: &[ProcessedRecord], x: Column, y: Column, hue: Column) -> Vec<ChartRow> {
    data.iter()
        .filter_map(|r| {
            let x_cell = match x.numeric(r) {
                Some(v) => CellValue::Num(v),
                None => CellValue::Text(x.label(r)?),
            };
            Some(ChartRow {
                x: x_cell,
                y: y.numeric(r)?,
                hue: hue.label(r)?,
            })
        })
        .collect()
}

/// One (x, y) point per hue category, each coordinate the mean over the
/// category's rows with that coordinate present.
fn mean_points(data: &[ProcessedRecord], x: Column, y: Column, hue: Column) -> Vec<ChartRow> {
    #[derive(Default)]
    struct Acc {
        x_sum: f64,
        x_count: f64,
        y_sum: f64,
        y_count: f64,
    }
    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for r in data {
        let Some(label) = hue.label(r) else { continue };
        let acc = groups.entry(label).or_default();
        if let Some(v) = x.numeric(r) {
            acc.x_sum += v;
            acc.x_count += 1.0;
        }
        if let Some(v) = y.numeric(r) {
            acc.y_sum += v;
            acc.y_count += 1.0;
        }
    }
    groups
        .into_iter()
        .filter(|(_, acc)| acc.x_count > 0.0 && acc.y_count > 0.0)
        .map(|(label, acc)| ChartRow {
            x: CellValue::Num(acc.x_sum / acc.x_count),
            y: acc.y_sum / acc.y_count,
            hue: label,
        })
        .collect()
}

/// Keeps the study's headline configuration of each algorithm.
fn headline_configs(r: &ProcessedRecord) -> bool {
    match r.algorithm.as_str() {
        "Delay" => r.scale == Some(0.2),
        "Prob" | "Batch" => r.scale == Some(0.5),
        "FR" => r.bit == Some(1.0),
        "D-FR" => r.bit == Some(1.0) && r.scale == Some(0.05),
        "AGE" => r.scale == Some(0.5),
        _ => false,
    }
}

fn select<'a>(
    data: &'a [ProcessedRecord],
    pred: impl Fn(&ProcessedRecord) -> bool + 'a,
) -> Vec<ProcessedRecord> {
    data.iter().filter(|r| pred(r)).cloned().collect()
}

fn overview(data: &[ProcessedRecord], renderer: &dyn Renderer, dir: &Path) -> Result<()> {
    let selected = select(data, headline_configs);
    let rows = mean_points(
        &selected,
        Column::RelMissRatioLru,
        Column::RelPromotionLru,
        Column::Algorithm,
    );
    let mut spec = ChartSpec::new(
        ChartKind::Scatter,
        Column::RelMissRatioLru,
        Column::RelPromotionLru,
        dir.join("overview.csv"),
    )
    .labels("Miss ratio relative to LRU", "Promotions relative to LRU");
    spec.palette = algorithm_palette();
    spec.markers = algorithm_markers();
    spec.order = ["Delay", "FR", "Batch", "Prob", "D-FR", "AGE"]
        .into_iter()
        .map(String::from)
        .collect();
    renderer.render(&rows, &spec)
}

fn scale_box(
    data: &[ProcessedRecord],
    algorithm: &str,
    y: Column,
    x_label: &str,
    output: &str,
    tick_step: Option<f64>,
    renderer: &dyn Renderer,
    dir: &Path,
) -> Result<()> {
    let selected = select(data, |r| r.algorithm == algorithm);
    let rows = points(&selected, Column::Scale, y, Column::Algorithm);
    let mut spec = ChartSpec::new(ChartKind::Box, Column::Scale, y, dir.join(output))
        .labels(x_label, y.name());
    spec.palette = vec![(algorithm.to_string(), "lightblue".to_string())];
    if let Some(step) = tick_step {
        spec = spec.tick_step(step);
    }
    renderer.render(&rows, &spec)
}

fn prob_promotion(data: &[ProcessedRecord], renderer: &dyn Renderer, dir: &Path) -> Result<()> {
    scale_box(
        data,
        "Prob",
        Column::RelPromotionLru,
        "Prob",
        "prob_promotion.csv",
        Some(0.2),
        renderer,
        dir,
    )
}

fn prob_miss_ratio(data: &[ProcessedRecord], renderer: &dyn Renderer, dir: &Path) -> Result<()> {
    scale_box(
        data,
        "Prob",
        Column::RelMissRatioLru,
        "Prob",
        "prob_miss_ratio.csv",
        None,
        renderer,
        dir,
    )
}

fn batch_promotion(data: &[ProcessedRecord], renderer: &dyn Renderer, dir: &Path) -> Result<()> {
    scale_box(
        data,
        "Batch",
        Column::RelPromotionLru,
        "Batch size",
        "batch_promotion.csv",
        Some(0.2),
        renderer,
        dir,
    )
}

fn batch_miss_ratio(data: &[ProcessedRecord], renderer: &dyn Renderer, dir: &Path) -> Result<()> {
    scale_box(
        data,
        "Batch",
        Column::RelMissRatioLru,
        "Batch size",
        "batch_miss_ratio.csv",
        None,
        renderer,
        dir,
    )
}

fn fr_bits(data: &[ProcessedRecord], renderer: &dyn Renderer, dir: &Path) -> Result<()> {
    let selected = select(data, |r| r.algorithm == "FR");
    let rows = points(
        &selected,
        Column::Bit,
        Column::RelPromotionLru,
        Column::Algorithm,
    );
    let mut spec = ChartSpec::new(
        ChartKind::Box,
        Column::Bit,
        Column::RelPromotionLru,
        dir.join("fr_bits.csv"),
    )
    .labels("Reference bits", "Promotions relative to LRU");
    spec.palette = vec![("FR".to_string(), "lightblue".to_string())];
    renderer.render(&rows, &spec)
}

fn efficiency(data: &[ProcessedRecord], renderer: &dyn Renderer, dir: &Path) -> Result<()> {
    let selected = select(data, headline_configs);
    let rows = mean_points(
        &selected,
        Column::RelMissRatioLru,
        Column::PromotionEfficiency,
        Column::Algorithm,
    )
    .into_iter()
    .map(|row| ChartRow {
        x: CellValue::Text(row.hue.clone()),
        y: row.y,
        hue: row.hue,
    })
    .collect::<Vec<_>>();
    let mut spec = ChartSpec::new(
        ChartKind::Bar,
        Column::Algorithm,
        Column::PromotionEfficiency,
        dir.join("efficiency.csv"),
    )
    .labels("Algorithm", "Miss reduction per promotion");
    spec.palette = algorithm_palette();
    renderer.render(&rows, &spec)
}
