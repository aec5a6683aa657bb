use crate::rcv::*;

use serde::{Deserialize, Serialize};

/// The options given to a reader, as written in the configuration file or on
/// the command line.
///
/// Each format checks them into its own options structure: options that a
/// format does not use are rejected.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderParams {
    #[serde(rename = "contest")]
    pub contest: Option<String>,
    #[serde(rename = "reportPath")]
    pub report_path: Option<String>,
}

pub const CONTEST_OPTION: &str = "contest";
pub const REPORT_PATH_OPTION: &str = "report_path";

impl ReaderParams {
    fn given(&self) -> Vec<(&'static str, &String)> {
        let mut res = Vec::new();
        if let Some(c) = self.contest.as_ref() {
            res.push((CONTEST_OPTION, c));
        }
        if let Some(p) = self.report_path.as_ref() {
            res.push((REPORT_PATH_OPTION, p));
        }
        res
    }

    /// Fails on the first option that is not in `accepted`.
    pub fn check_accepted(&self, format: &str, accepted: &[&str]) -> RcvResult<()> {
        for (option, _) in self.given() {
            ensure!(
                accepted.contains(&option),
                UnexpectedOptionSnafu { format, option }
            );
        }
        Ok(())
    }

    pub fn require_contest(&self, format: &str) -> RcvResult<String> {
        self.contest.clone().context(MissingOptionSnafu {
            format,
            option: CONTEST_OPTION,
        })
    }

    pub fn require_report_path(&self, format: &str) -> RcvResult<String> {
        self.report_path.clone().context(MissingOptionSnafu {
            format,
            option: REPORT_PATH_OPTION,
        })
    }
}

/// Checks that a format received as many files as it reads.
pub fn check_file_count(format: &str, files: &[PathBuf], expected: usize) -> RcvResult<()> {
    ensure!(
        files.len() == expected,
        WrongFileCountSnafu {
            format,
            expected: expected.to_string(),
            found: files.len(),
        }
    );
    Ok(())
}

/// The description of an import, as found in a JSON configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    pub format: String,
    pub files: Vec<String>,
    #[serde(default)]
    pub params: ReaderParams,
    #[serde(default)]
    pub normalize: bool,
    /// Where the metadata is written: a file path or `stdout`.
    pub output: Option<String>,
}

pub fn read_import_config(path: &str) -> RcvResult<ImportConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_import_config: {:?}", contents);
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
}
