use clap::Parser;
use log::{debug, info};
use snafu::{prelude::*, ErrorCompat};

use std::path::{Path, PathBuf};

mod args;
mod rcv;

use crate::args::Args;
use crate::rcv::config_reader::{read_import_config, ImportConfig, ReaderParams};
use crate::rcv::{run_import, write_metadata, RcvResult};

/// Builds the import from the configuration file, if any, and the flags.
///
/// Returns the configuration and the directory that its file paths are
/// relative to.
fn import_config(args: &Args) -> RcvResult<(ImportConfig, PathBuf)> {
    let (mut config, mut base_dir) = match args.config.as_ref() {
        Some(path) => {
            let config = read_import_config(path)?;
            let base_dir = Path::new(path)
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (config, base_dir)
        }
        None => {
            let format = match args.format.clone() {
                Some(f) => f,
                None => whatever!("No format given: use --format or --config"),
            };
            let config = ImportConfig {
                format,
                files: vec![],
                params: ReaderParams::default(),
                normalize: false,
                output: None,
            };
            (config, PathBuf::from("."))
        }
    };

    if let Some(format) = args.format.clone() {
        config.format = format;
    }
    // Files given on the command line are relative to the working directory.
    if !args.input.is_empty() {
        config.files = args.input.clone();
        base_dir = PathBuf::from(".");
    }
    if let Some(contest) = args.contest.clone() {
        config.params.contest = Some(contest);
    }
    if let Some(report_path) = args.report_path.clone() {
        config.params.report_path = Some(report_path);
    }
    config.normalize |= args.normalize;
    if let Some(out) = args.out.clone() {
        config.output = Some(out);
    }
    debug!("import_config: {:?} base dir: {:?}", config, base_dir);
    Ok((config, base_dir))
}

fn run(args: &Args) -> RcvResult<()> {
    let (config, base_dir) = import_config(args)?;
    let metadata = run_import(&config, &base_dir)?;
    info!(
        "Imported {} ballots for {} candidates",
        metadata.num_ballots,
        metadata.candidates.len()
    );
    write_metadata(&metadata, config.output.as_deref())
}

fn main() {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("args: {:?}", args);

    if let Err(e) = run(&args) {
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
