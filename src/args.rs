use clap::Parser;

/// Imports ranked-choice ballot data published by election administrations.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the import: format, files, options.
    /// Relative file paths in this file are resolved against its directory.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// The format of the input: us_ca_sfo, us_me, us_nm_saf or us_vt_btv.
    /// Setting this option overrides the format given with --config.
    #[clap(short, long, value_parser)]
    pub format: Option<String>,

    /// (file path, repeated) The source files, in the order the format expects them.
    /// Setting this option overrides the files given with --config.
    #[clap(short, long, value_parser)]
    pub input: Vec<String>,

    /// The contest to read, for the formats that hold several contests.
    #[clap(long, value_parser)]
    pub contest: Option<String>,

    /// The path of the report inside the archive (us_vt_btv).
    #[clap(long, value_parser)]
    pub report_path: Option<String>,

    /// If passed as an argument, the ballots are normalized with the rules of the jurisdiction.
    #[clap(long, takes_value = false)]
    pub normalize: bool,

    /// (file path, 'stdout' or empty) If specified, the metadata of the import will be written
    /// in JSON format to the given location. Setting this option overrides the output given
    /// with --config.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
