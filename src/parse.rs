use crate::algo::Algorithm;
use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;

/// Grammar for one miss-ratio result line:
/// `<prefix> <algo>[-<config>] cache size <n>, <n> req, miss ratio <f>,
/// throughput <f> MQPS, promotion <n>`.
static RESULT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        .*?\s+
        (?P<algo>[A-Za-z0-9_]+)
        (?:-(?P<config>[A-Za-z0-9_.=\ -]+))?
        \s+cache\ size\s+(?P<cache_size>\d+),\s+
        (?P<requests>\d+)\s+req,\s+
        miss\ ratio\s+(?P<miss_ratio>\d+(?:\.\d+)?),\s+
        throughput\s+(?P<throughput>\d+(?:\.\d+)?)\s+MQPS,\s+
        promotion\s+(?P<promotion>\d+)",
    )
    .expect("result line grammar")
});

/// Grammar for one scalability (multi-thread throughput) result line:
/// `.<ext> <algo>[-_<param>] cache size <size-with-unit>, ... miss ratio <f>,
/// ... throughput <f> ... thread_num <n>`.
static SCALABILITY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \.[A-Za-z0-9]+\s+
        (?P<algo>[A-Za-z0-9_]+?)
        (?:[-_](?P<param>[0-9.]+))?
        \s+cache\ size\s+(?P<cache_size>[0-9.]+\s*[A-Za-z]*),
        .*?miss\ ratio\s+(?P<miss_ratio>[0-9.]+)
        .*?throughput\s+(?P<throughput>[0-9.]+)
        .*?thread_num\s+(?P<num_thread>[0-9]+)",
    )
    .expect("scalability line grammar")
});

/// Fields lifted out of one matching miss-ratio log line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub algorithm: Algorithm,
    pub config: Option<String>,
    pub cache_size: u64,
    pub requests: u64,
    pub miss_ratio: f64,
    pub throughput: f64,
    pub promotion: u64,
}

/// Fields lifted out of one matching scalability log line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalabilityLine {
    pub algorithm: Algorithm,
    pub param: f64,
    pub cache_bytes: u64,
    pub miss_ratio: f64,
    pub throughput: f64,
    pub threads: u64,
}

/// Matches one line against the result grammar.
///
/// `Ok(None)` means the line is not a data line (headers, progress output) and
/// is skipped. A matching line with an unknown algorithm token is fatal.
pub fn parse_line(line: &str) -> Result<Option<ParsedLine>> {
    let Some(caps) = RESULT_LINE.captures(line) else {
        return Ok(None);
    };
    let token = &caps["algo"];
    let algorithm = Algorithm::from_token(token)?;
    Ok(Some(ParsedLine {
        algorithm,
        config: caps.name("config").map(|m| m.as_str().to_string()),
        cache_size: field_u64(&caps, "cache_size")?,
        requests: field_u64(&caps, "requests")?,
        miss_ratio: field_f64(&caps, "miss_ratio")?,
        throughput: field_f64(&caps, "throughput")?,
        promotion: field_u64(&caps, "promotion")?,
    }))
}

/// Matches one line against the scalability grammar. Same skip/fatal split as
/// [`parse_line`]; a missing param defaults to 1.0 for FR and 0.0 otherwise.
pub fn parse_scalability_line(line: &str) -> Result<Option<ScalabilityLine>> {
    let Some(caps) = SCALABILITY_LINE.captures(line) else {
        return Ok(None);
    };
    let algorithm = Algorithm::from_scalability_token(&caps["algo"])?;
    let param = match caps.name("param") {
        Some(m) => m
            .as_str()
            .parse::<f64>()
            .with_context(|| format!("bad param '{}'", m.as_str()))?,
        None if algorithm == Algorithm::Fr => 1.0,
        None => 0.0,
    };
    Ok(Some(ScalabilityLine {
        algorithm,
        param,
        cache_bytes: parse_size(&caps["cache_size"])?,
        miss_ratio: field_f64(&caps, "miss_ratio")?,
        throughput: field_f64(&caps, "throughput")?,
        threads: field_u64(&caps, "num_thread")?,
    }))
}

/// Converts a size string with an optional unit suffix into bytes.
///
/// Decimal units (KB, MB, ...) multiply by powers of 1000, binary units
/// (KiB, MiB, ...) by powers of 1024. A bare number or a trailing `B` is
/// already bytes. Anything else is a corrupt log and fatal.
pub fn parse_size(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number
        .parse()
        .with_context(|| format!("unparseable cache size '{raw}'"))?;
    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "KB" => 1000,
        "MB" => 1000_u64.pow(2),
        "GB" => 1000_u64.pow(3),
        "TB" => 1000_u64.pow(4),
        "PB" => 1000_u64.pow(5),
        "KiB" => 1024,
        "MiB" => 1024_u64.pow(2),
        "GiB" => 1024_u64.pow(3),
        "TiB" => 1024_u64.pow(4),
        "PiB" => 1024_u64.pow(5),
        other => bail!("unknown cache size unit '{other}' in '{raw}'"),
    };
    Ok((value * multiplier as f64).round() as u64)
}

fn field_u64(caps: &regex::Captures, name: &str) -> Result<u64> {
    caps[name]
        .parse()
        .with_context(|| format!("field {name} '{}' out of range", &caps[name]))
}

fn field_f64(caps: &regex::Captures, name: &str) -> Result<f64> {
    caps[name]
        .parse()
        .with_context(|| format!("field {name} '{}' is not a number", &caps[name]))
}
