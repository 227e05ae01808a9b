use clap::Parser;

mod config;
mod converter;
mod datatypes;
mod error;
mod mesher;

use config::Config;
use error::ApatiteError;
use mesher::MesherOutcome;

/// Meshes micro-CT bone scans and converts the result into solver input files
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the job configuration json
    config: String,

    /// Convert existing mesher tables without running the mesher
    #[arg(long)]
    skip_mesher: bool,
}

fn run(cli: &Cli) -> Result<(), ApatiteError> {
    let config = Config::load(&cli.config)?;

    let out_dir = std::path::Path::new(&config.out_dir);
    if !out_dir.is_dir() {
        if let Err(err) = std::fs::create_dir_all(out_dir) {
            return Err(ApatiteError::Config(format!(
                "Unable to create output directory {}: {}",
                config.out_dir, err
            )));
        }
    }

    if cli.skip_mesher {
        println!("info: skipping mesher stage");
    } else if mesher::run(&config)? == MesherOutcome::Submitted {
        // the tables only exist once the batch job has run, so conversion
        // happens in a later --skip-mesher invocation
        println!(
            "info: batch job submitted; rerun with --skip-mesher once the mesher output is in {}",
            config.out_dir
        );
        return Ok(());
    }

    for path in converter::output_paths(out_dir, &config.job_name) {
        if path.exists() {
            println!(
                "warning: {} already exists and will be overwritten",
                path.display()
            );
        }
    }

    let totals = converter::run(
        out_dir,
        &config.job_name,
        config.displacement_ratio,
        &config.solver,
    )?;
    println!(
        "info: conversion complete: {} nodes, {} elements, {} restrained, {} loaded, {} fixed",
        totals.nodes, totals.elements, totals.restrained, totals.loaded, totals.fixed
    );

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
