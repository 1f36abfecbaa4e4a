use anyhow::{Context, Result, bail};

/// Every eviction algorithm the simulator can emit, keyed by its simulator
/// token. Anything outside this set in a data line is a broken mapping, not
/// noise, and aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Fifo,
    Lru,
    Batch,
    Delay,
    Prob,
    Age,
    Arc,
    TwoQ,
    Fr,
    DFr,
    Random,
    RandomK,
    OfflineFr,
    BeladyRandom,
    BeladyRandomLru,
}

/// Typed fields decoded from an algorithm's raw configuration suffix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFields {
    pub scale: Option<f64>,
    pub bit: Option<f64>,
    pub variant: Option<String>,
    pub bee_fraction: Option<f64>,
    /// Replacement display config for the Belady family (the scale part
    /// echoed back without the BEE segment).
    pub config_override: Option<String>,
}

impl Algorithm {
    /// Resolves a simulator token from a miss-ratio log line.
    pub fn from_token(token: &str) -> Result<Self> {
        Ok(match token {
            "FIFO" => Self::Fifo,
            "LRU" => Self::Lru,
            "lpFIFO_batch" => Self::Batch,
            "LRU_delay" => Self::Delay,
            "lpLRU_prob" => Self::Prob,
            "AGE" => Self::Age,
            "ARC" => Self::Arc,
            "TwoQ" => Self::TwoQ,
            "Clock" => Self::Fr,
            "DelayFR" => Self::DFr,
            "RandomLRU" => Self::Random,
            "Random" => Self::RandomK,
            "OptClock" => Self::OfflineFr,
            "RandomBelady" => Self::BeladyRandom,
            "BeladyRandomLRU" => Self::BeladyRandomLru,
            _ => bail!("unknown algorithm token '{token}'"),
        })
    }

    /// Resolves a token from a scalability (throughput) log, which covers a
    /// smaller algorithm set and spells some tokens differently.
    pub fn from_scalability_token(token: &str) -> Result<Self> {
        Ok(match token {
            "FIFO" => Self::Fifo,
            "LRU" => Self::Lru,
            "Random" => Self::Random,
            "lpFIFO_batch" => Self::Batch,
            "LRU_Prob" => Self::Prob,
            "LRU_delay" => Self::Delay,
            "Clock" => Self::Fr,
            _ => bail!("unknown algorithm token '{token}' in scalability log"),
        })
    }

    /// Paper-facing display name, used as the table's Algorithm column.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fifo => "FIFO",
            Self::Lru => "LRU",
            Self::Batch => "Batch",
            Self::Delay => "Delay",
            Self::Prob => "Prob",
            Self::Age => "AGE",
            Self::Arc => "ARC",
            Self::TwoQ => "TwoQ",
            Self::Fr => "FR",
            Self::DFr => "D-FR",
            Self::Random => "Random",
            Self::RandomK => "RandomK",
            Self::OfflineFr => "Offline-FR",
            Self::BeladyRandom => "Belady-Random",
            Self::BeladyRandomLru => "Belady-RandomLRU",
        }
    }

    /// Decodes the hyphen-led configuration suffix into typed fields.
    ///
    /// Total over the enum: every identity has exactly one decoder. A config
    /// that is missing parts the decoder needs is a corrupt log and fails.
    pub fn decode_config(&self, config: Option<&str>) -> Result<ConfigFields> {
        let mut fields = ConfigFields::default();
        match self {
            Self::Fifo | Self::Lru => {}
            Self::Batch | Self::Delay | Self::Prob | Self::Age | Self::Random | Self::RandomK => {
                let raw = expect_config(self, config)?;
                fields.scale = Some(parse_float(self, raw)?);
            }
            Self::Arc | Self::TwoQ => {
                let raw = expect_config(self, config)?;
                fields.variant = Some(raw.to_string());
            }
            Self::Fr => {
                let raw = expect_config(self, config)?;
                let parts = split_parts(self, raw, 1)?;
                fields.bit = Some(parse_float(self, parts[0])?);
            }
            Self::DFr | Self::OfflineFr => {
                let raw = expect_config(self, config)?;
                let parts = split_parts(self, raw, 2)?;
                fields.bit = Some(parse_float(self, parts[0])?);
                fields.scale = Some(parse_float(self, parts[1])?);
            }
            Self::BeladyRandom | Self::BeladyRandomLru => {
                let raw = expect_config(self, config)?;
                let parts = split_parts(self, raw, 2)?;
                fields.scale = Some(parse_float(self, parts[0])?);
                let frac = parts[1].split('=').nth(1).with_context(|| {
                    format!(
                        "config '{raw}' for {}: expected key=value BEE segment",
                        self.display_name()
                    )
                })?;
                fields.bee_fraction = Some(parse_float(self, frac)?);
                fields.config_override = Some(parts[0].to_string());
            }
        }
        Ok(fields)
    }
}

fn expect_config<'a>(algo: &Algorithm, config: Option<&'a str>) -> Result<&'a str> {
    config.with_context(|| {
        format!(
            "algorithm {} requires a configuration suffix but none was present",
            algo.display_name()
        )
    })
}

fn split_parts<'a>(algo: &Algorithm, raw: &'a str, need: usize) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() < need {
        bail!(
            "config '{raw}' for {}: expected {need} hyphen-delimited part(s), found {}",
            algo.display_name(),
            parts.len()
        );
    }
    Ok(parts)
}

fn parse_float(algo: &Algorithm, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("config part '{raw}' for {} is not a number", algo.display_name()))
}
