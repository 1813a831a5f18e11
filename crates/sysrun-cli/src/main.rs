//! `sysrun` — the CLI front end over the sysrun test-execution engine.
//!
//! This binary is explicitly out of the core engine's scope (per spec.md
//! §1): it only bootstraps logging, parses a small TOML descriptor catalog,
//! wires up the runner with the two canonical writers and the performance
//! reporter, and maps the run's outcome to a process exit code. All the
//! actual test-execution logic lives in `sysrun-runner`/`sysrun-container`/
//! `sysrun-user`/`sysrun-perf`.

mod catalog;
mod cli;
mod demo_tests;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use cli::{Cli, Commands};
use sysrun_container::TestRegistry;
use sysrun_core::{hostname, RunnerConfig};
use sysrun_perf::{aggregate_files, format_header, format_row, render_summary_path, PerfReporter};
use sysrun_runner::Runner;
use sysrun_writer::{TextWriter, XmlWriter};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    match cli.command {
        Commands::Run {
            catalog,
            cycles,
            threads,
            mode,
            purge,
            summary_dir,
            no_prompt,
        } => run_catalog(catalog, cycles, threads, mode, purge, summary_dir, no_prompt, level),
        Commands::AggregatePerf { inputs, output } => aggregate_perf(inputs, output),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_catalog(
    catalog_path: std::path::PathBuf,
    cycles: usize,
    threads: usize,
    mode: String,
    purge: bool,
    summary_dir: std::path::PathBuf,
    no_prompt: bool,
    log_level: Level,
) -> Result<()> {
    let descriptors = catalog::load_manifest(&catalog_path)
        .with_context(|| format!("loading catalog manifest {}", catalog_path.display()))?;

    let now = chrono::Local::now();
    let perf_csv_path = render_summary_path(
        &RunnerConfig::default().perf_summary_template,
        &summary_dir.display().to_string(),
        &hostname(),
        &now.format("%Y-%m-%d").to_string(),
        &now.format("%H%M%S").to_string(),
        "",
    );
    let reporter = Arc::new(PerfReporter::new(perf_csv_path));

    let mut registry = TestRegistry::new();
    demo_tests::register_builtins(&mut registry, Arc::clone(&reporter));

    let config = RunnerConfig {
        cycles: cycles.max(1),
        threads: threads.max(1),
        mode,
        purge,
        prompt_on_interrupt: !no_prompt,
        ..RunnerConfig::default()
    };

    std::fs::create_dir_all(&summary_dir).with_context(|| format!("creating summary directory {}", summary_dir.display()))?;

    let mut runner = Runner::new(config, registry, descriptors)
        .with_writer(Box::new(TextWriter::new(summary_dir.join("results.txt"))))
        .with_writer(Box::new(XmlWriter::new(summary_dir.join("results.xml"))))
        .with_log_level(log_level);
    runner.enable_interrupt_watch();

    let results = runner.run();

    println!(
        "sysrun: {} test(s) published, {:.2}s total duration, {:.2}s wall clock",
        results.published.len(),
        results.total_duration_secs,
        results.wall_clock_secs
    );
    for result in &results.published {
        println!("  {}: {} (cycle {})", result.outcome.label(), result.test_id, result.cycle);
    }

    if results.interrupted {
        anyhow::bail!("run interrupted by keyboard interrupt");
    }
    if results.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn aggregate_perf(inputs: Vec<std::path::PathBuf>, output: std::path::PathBuf) -> Result<()> {
    let (run_details, results) = aggregate_files(&inputs).context("aggregating performance files")?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let mut contents = String::new();
    contents.push_str(&format_header(&run_details));
    contents.push('\n');
    for result in &results {
        contents.push_str(&format_row(result));
        contents.push('\n');
    }
    std::fs::write(&output, contents).with_context(|| format!("writing aggregated file {}", output.display()))?;

    println!("sysrun: aggregated {} file(s) into {} result key(s) at {}", inputs.len(), results.len(), output.display());
    Ok(())
}
