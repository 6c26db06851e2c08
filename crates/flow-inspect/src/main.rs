// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use flow_inspect::{Inspection, StructureConfig};
use log::{debug, LevelFilter};
use mos6502_flow::options::Options;
use simplelog::{Config, TermLogger, TerminalMode};

#[derive(Parser)]
#[clap(
    name = env!("CARGO_BIN_NAME"),
    about = "Structures the control flow of a 6502 block listing, builds SSA over registers and flags, and prints the diagnostics of every function",
    rename_all = "kebab-case",
    author,
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Args {
    /// Path to a block listing (TOML)
    pub listing: PathBuf,

    /// Path to an options file (TOML)
    #[clap(long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Display per-block structuring and SSA decisions
    #[clap(name = "verbose", long, short = 'v')]
    pub verbose: bool,

    /// Structuring options
    #[clap(flatten)]
    pub structure_config: StructureConfig,
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut options = match &args.config {
        Some(path) => Options::from_file(path)?,
        None => Options::default(),
    };
    if args.verbose {
        options.verbosity_level = LevelFilter::Debug;
    }
    args.structure_config.apply(&mut options.structure);

    let _ = TermLogger::init(options.verbosity_level, Config::default(), TerminalMode::Stderr);
    debug!("flow-inspect version: {}", env!("CARGO_PKG_VERSION"));

    let inspection = Inspection::from_file(&args.listing, &options)?;
    for analysis in &inspection.analyses {
        println!("{}", inspection.title(analysis).bold());
        print!("{}", inspection.render_function(analysis));
        let report = &analysis.structure.report;
        if !report.is_complete() {
            println!("{}", format!("{} edge(s) missing", report.missing_edges.len()).red());
        } else if report.is_fully_structured() {
            println!("{}", "fully structured".green());
        } else {
            let gotos = format!("{} goto edge(s)", report.unstructured_edges.len());
            println!("{}", gotos.yellow());
        }
        println!();
    }
    inspection.check_complete()
}

fn main() {
    #[cfg(windows)]
    let _ = colored::control::set_virtual_terminal(true);

    match run(Args::parse()) {
        Ok(_) => (),
        Err(err) => {
            let err = format!("{:?}", err);
            println!("{}", err.bold().red());
            std::process::exit(1);
        }
    }
}
