use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Raw data files, in alignment order (will over-write the config file)
    #[arg(short, long, num_args = 1..)]
    pub raw_files: Option<Vec<PathBuf>>,

    /// MSP spectral library (will over-write the config file)
    #[arg(short, long)]
    pub msp_library: Option<PathBuf>,

    /// Tab separated precursor library (will over-write the config file)
    #[arg(short, long)]
    pub text_library: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of worker threads, 0 uses all cores
    #[arg(short, long)]
    pub num_threads: Option<usize>,
}
