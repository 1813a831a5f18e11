use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sysrun", version, about = "A system-test execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (stdout sink); the per-test `run.log` sink
    /// mirrors whatever level this resolves to, per spec.md §4.C.3.
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute every descriptor in a catalog manifest.
    Run {
        /// Path to a TOML catalog manifest (see `catalog.rs` for the
        /// `[[test]]` entry format).
        #[arg(long)]
        catalog: PathBuf,

        /// Number of passes over the descriptor list.
        #[arg(long, default_value_t = 1)]
        cycles: usize,

        /// Worker pool size; `1` runs every test inline on the calling
        /// thread.
        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Run mode requested for this invocation (descriptors whose
        /// `modes` is non-empty and excludes this value are skipped).
        #[arg(long, default_value = "")]
        mode: String,

        /// Remove non-zero-length output files for all-PASSED tests.
        #[arg(long)]
        purge: bool,

        /// Directory the text/XML summary writers are written into.
        #[arg(long, default_value = "sysrun-output")]
        summary_dir: PathBuf,

        /// If set, a keyboard interrupt exits immediately instead of
        /// prompting to continue.
        #[arg(long)]
        no_prompt: bool,
    },

    /// Merge N performance CSV files into one aggregated file.
    AggregatePerf {
        /// Input performance CSV files (as produced by a prior `run`).
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output path for the merged CSV.
        #[arg(long)]
        output: PathBuf,
    },
}
