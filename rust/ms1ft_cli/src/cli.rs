use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the spectra file, `.json` or `.json.zst` (will over-write the config file)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Lowest candidate mass of the sweep, in Da
    #[arg(long)]
    pub min_mass: Option<f64>,

    /// Highest candidate mass of the sweep, in Da
    #[arg(long)]
    pub max_mass: Option<f64>,

    /// Number of worker threads (0 uses every core)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Merge features one or two Da apart (mis-assigned monoisotopic peak)
    #[arg(long)]
    pub mass_collapse: bool,
}
