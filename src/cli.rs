use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "promo-figures",
    version,
    about = "Turns cache-simulator logs into comparison tables and figures"
)]
pub struct Cli {
    /// Directory tree of simulator log files
    pub data_dir: PathBuf,

    /// Charts to render after processing (none = tables only)
    pub charts: Vec<String>,

    /// Manifest of known trace paths, one per line
    #[arg(short, long, default_value = "datasets.txt")]
    pub manifest: PathBuf,

    /// Directory for table snapshots
    #[arg(short, long, default_value = "data")]
    pub out_dir: PathBuf,

    /// Directory for rendered figures
    #[arg(short, long, default_value = "figures")]
    pub figures_dir: PathBuf,

    /// Directory of multi-thread scalability logs
    #[arg(long)]
    pub scalability_dir: Option<PathBuf>,
}
