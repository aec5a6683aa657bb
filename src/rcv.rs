use log::{debug, info};

use ranked_vote::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::rcv::config_reader::*;
use crate::rcv::io_common::{describe_file, SourceFile};

pub mod config_reader;
mod io_burlington;
mod io_common;
mod io_maine;
mod io_santa_fe;
mod io_sf;

#[derive(Debug, Snafu)]
pub enum RcvError {
    // Configuration errors: raised before any ballot is read.
    #[snafu(display("Format {format} not understood"))]
    UnknownFormat { format: String },
    #[snafu(display("Format {format} requires the option {option}"))]
    MissingOption { format: String, option: String },
    #[snafu(display("Format {format} does not accept the option {option}"))]
    UnexpectedOption { format: String, option: String },
    #[snafu(display("Invalid value {value:?} for the option {option}"))]
    InvalidOption { option: String, value: String },
    #[snafu(display("Format {format} expects {expected} file(s), {found} given"))]
    WrongFileCount {
        format: String,
        expected: String,
        found: usize,
    },
    #[snafu(display("Contest {contest:?} not found"))]
    UnknownContest { contest: String },

    // Access to the sources
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading file {path}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening workbook {path}"))]
    OpeningExcel {
        source: calamine::Error,
        path: String,
    },
    #[snafu(display("Workbook {path} has no data"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening archive {path}"))]
    OpeningArchive {
        source: zip::result::ZipError,
        path: String,
    },
    #[snafu(display("Archive {path} has no member {member}"))]
    MissingArchiveMember {
        source: zip::result::ZipError,
        path: String,
        member: String,
    },
    #[snafu(display("Error reading member {member}"))]
    ReadingArchiveMember {
        source: std::io::Error,
        member: String,
    },
    #[snafu(display("Error reading CSV table {member}"))]
    ParsingCsv { source: csv::Error, member: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error in JSON content"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },

    // Structural errors: the source does not have the expected layout.
    #[snafu(display("{path}:{lineno}: cannot decode field {field} in {line:?}"))]
    FixedWidthField {
        path: String,
        lineno: usize,
        field: String,
        line: String,
    },
    #[snafu(display("Ballot {ballot_id} is for contest {found}, expected contest {expected}"))]
    ContestMismatch {
        ballot_id: String,
        expected: u32,
        found: u32,
    },
    #[snafu(display(
        "Ballot image is not grouped by voter: voter {voter_id} appears again for contest {contest_id}"
    ))]
    UnsortedBallotImage { voter_id: u32, contest_id: u32 },
    #[snafu(display("{path}: column {column:?} has rank {found}, expected rank {expected}"))]
    NonContiguousRanks {
        path: String,
        column: String,
        expected: u32,
        found: u32,
    },
    #[snafu(display("{path}: no rank column found"))]
    MissingChoiceColumns { path: String },
    #[snafu(display("{path}: column {column:?} is missing"))]
    MissingColumn { path: String, column: String },
    #[snafu(display("{path}: {found} rank columns, previous files had {expected}"))]
    InconsistentRankCount {
        path: String,
        expected: usize,
        found: usize,
    },
    #[snafu(display("{path}: unexpected cell at row {row}: {content}"))]
    UnexpectedCell {
        path: String,
        row: usize,
        content: String,
    },
    #[snafu(display("{member}: invalid value {value:?} in column {column}"))]
    InvalidManifestValue {
        member: String,
        column: String,
        value: String,
    },
    #[snafu(display("Ballot {ballot_id}: unknown candidate id {candidate_id}"))]
    UnknownCandidateId {
        ballot_id: String,
        candidate_id: String,
    },
    #[snafu(display("Ballot {ballot_id}: invalid rank {value:?}"))]
    InvalidRank { ballot_id: String, value: String },
    #[snafu(display("Report {member} is not ASCII text"))]
    NonAsciiReport { member: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RcvResult<T> = Result<T, RcvError>;

/// A source of raw ballots for a single contest.
///
/// Implementations parse their lookup data (candidates, contests) when they
/// are built and read the ballots lazily, one at a time, in file order.
pub trait BallotReader {
    /// The candidates of the contest being read.
    ///
    /// Some formats only learn which contest they read from the first ballot:
    /// before that, the list may be empty.
    fn candidates(&self) -> Vec<Choice>;

    /// The next ballot, or `None` once all the ballots have been read.
    fn read_next_ballot(&mut self) -> RcvResult<Option<Ballot>>;

    /// Releases the files still held by the reader.
    fn close(&mut self);
}

/// A supported input format.
pub struct Format {
    pub name: &'static str,
    open: fn(&[PathBuf], &ReaderParams) -> RcvResult<Box<dyn BallotReader>>,
    normalizer: fn() -> Box<dyn Normalizer>,
}

pub const FORMATS: &[Format] = &[
    Format {
        name: io_sf::FORMAT_NAME,
        open: io_sf::open,
        normalizer: sanfrancisco_normalizer,
    },
    Format {
        name: io_maine::FORMAT_NAME,
        open: io_maine::open,
        normalizer: maine_normalizer,
    },
    Format {
        name: io_santa_fe::FORMAT_NAME,
        open: io_santa_fe::open,
        normalizer: santafe_normalizer,
    },
    Format {
        name: io_burlington::FORMAT_NAME,
        open: io_burlington::open,
        normalizer: burlington_normalizer,
    },
];

fn sanfrancisco_normalizer() -> Box<dyn Normalizer> {
    Box::new(SanFranciscoNormalizer)
}

fn maine_normalizer() -> Box<dyn Normalizer> {
    Box::new(MaineNormalizer)
}

fn santafe_normalizer() -> Box<dyn Normalizer> {
    Box::new(SantaFeNormalizer)
}

fn burlington_normalizer() -> Box<dyn Normalizer> {
    Box::new(BurlingtonNormalizer)
}

pub fn lookup_format(name: &str) -> RcvResult<&'static Format> {
    FORMATS
        .iter()
        .find(|f| f.name == name)
        .context(UnknownFormatSnafu { format: name })
}

/// The normalizer that encodes the ballot rules of the jurisdiction behind a
/// format.
pub fn normalizer_for(format: &str) -> RcvResult<Box<dyn Normalizer>> {
    Ok((lookup_format(format)?.normalizer)())
}

/// Description of a finished import.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub format: String,
    pub num_ballots: usize,
    pub candidates: Vec<String>,
    pub files: Vec<SourceFile>,
    pub normalized: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum ReadState {
    Reading,
    Done,
    Failed,
}

/// The ballots of one import, as a stream.
///
/// The stream must be read until it returns `None`; it cannot be read again
/// afterwards. The metadata is only available once the stream is exhausted.
pub struct Import {
    format: &'static str,
    reader: Box<dyn BallotReader>,
    files: Vec<SourceFile>,
    normalizer: Option<Box<dyn Normalizer>>,
    num_ballots: usize,
    state: ReadState,
}

impl Import {
    pub fn new(
        format: &'static str,
        reader: Box<dyn BallotReader>,
        files: Vec<SourceFile>,
        normalizer: Option<Box<dyn Normalizer>>,
    ) -> Import {
        Import {
            format,
            reader,
            files,
            normalizer,
            num_ballots: 0,
            state: ReadState::Reading,
        }
    }

    pub fn candidates(&self) -> Vec<Choice> {
        self.reader.candidates()
    }

    pub fn metadata(&self) -> RunMetadata {
        assert_eq!(
            self.state,
            ReadState::Done,
            "the metadata of an import is only available once all the ballots are read"
        );
        RunMetadata {
            format: self.format.to_string(),
            num_ballots: self.num_ballots,
            candidates: self.candidates().iter().map(|c| c.to_string()).collect(),
            files: self.files.clone(),
            normalized: self.normalizer.is_some(),
        }
    }
}

impl Iterator for Import {
    type Item = RcvResult<Ballot>;

    fn next(&mut self) -> Option<RcvResult<Ballot>> {
        assert_eq!(
            self.state,
            ReadState::Reading,
            "the ballots of an import can only be read once"
        );
        match self.reader.read_next_ballot() {
            Ok(Some(ballot)) => {
                self.num_ballots += 1;
                let ballot = match self.normalizer.as_ref() {
                    Some(n) => n.normalize(&ballot),
                    None => ballot,
                };
                Some(Ok(ballot))
            }
            Ok(None) => {
                info!(
                    "Import {}: read {} ballots",
                    self.format, self.num_ballots
                );
                self.reader.close();
                self.state = ReadState::Done;
                None
            }
            Err(e) => {
                self.reader.close();
                self.state = ReadState::Failed;
                Some(Err(e))
            }
        }
    }
}

/// Opens an import.
///
/// Relative file paths are resolved against `base_dir`. The options are
/// checked and the lookup data of the format is read before returning.
pub fn open_import(
    format: &str,
    files: &[String],
    params: &ReaderParams,
    base_dir: &Path,
    normalize: bool,
) -> RcvResult<Import> {
    let f = lookup_format(format)?;
    let paths: Vec<PathBuf> = files.iter().map(|p| base_dir.join(p)).collect();
    let mut sources: Vec<SourceFile> = Vec::new();
    for (name, path) in files.iter().zip(paths.iter()) {
        info!("Attempting to read file {:?}", path);
        sources.push(describe_file(name, path)?);
    }
    let reader = (f.open)(&paths, params)?;
    let normalizer = if normalize {
        Some(normalizer_for(f.name)?)
    } else {
        None
    };
    Ok(Import::new(f.name, reader, sources, normalizer))
}

/// Reads all the ballots described by the configuration and returns the
/// metadata of the import.
pub fn run_import(config: &ImportConfig, base_dir: &Path) -> RcvResult<RunMetadata> {
    info!("config: {:?}", config);
    let mut import = open_import(
        &config.format,
        &config.files,
        &config.params,
        base_dir,
        config.normalize,
    )?;
    for ballot_r in import.by_ref() {
        let ballot = ballot_r?;
        debug!(
            "ballot {}: {}",
            ballot.id,
            ballot
                .choices
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<String>>()
                .join(",")
        );
    }
    Ok(import.metadata())
}

/// Writes the metadata in JSON, to a file or to the standard output.
pub fn write_metadata(metadata: &RunMetadata, out: Option<&str>) -> RcvResult<()> {
    let pretty_js = serde_json::to_string_pretty(metadata).context(ParsingJsonSnafu {})?;
    match out {
        None | Some("stdout") => {
            println!("{}", pretty_js);
        }
        Some(path) => {
            fs::write(path, pretty_js).context(WritingOutputSnafu { path })?;
            info!("Metadata written to {}", path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct VecReader {
        candidates: Vec<Rc<Candidate>>,
        ballots: VecDeque<RcvResult<Ballot>>,
        closed: Rc<std::cell::Cell<bool>>,
    }

    impl BallotReader for VecReader {
        fn candidates(&self) -> Vec<Choice> {
            self.candidates.iter().cloned().map(Choice::Vote).collect()
        }

        fn read_next_ballot(&mut self) -> RcvResult<Option<Ballot>> {
            self.ballots.pop_front().transpose()
        }

        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    fn make_import(
        ballots: Vec<RcvResult<Ballot>>,
        normalizer: Option<Box<dyn Normalizer>>,
    ) -> (Import, Rc<std::cell::Cell<bool>>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut registry = CandidateRegistry::new();
        let a = registry.intern("A");
        let b = registry.intern("B");
        let closed = Rc::new(std::cell::Cell::new(false));
        let reader = VecReader {
            candidates: vec![a, b],
            ballots: ballots.into_iter().collect(),
            closed: closed.clone(),
        };
        let files = vec![SourceFile {
            name: "ballots.txt".to_string(),
            sha256: "00".to_string(),
        }];
        (
            Import::new("test", Box::new(reader), files, normalizer),
            closed,
        )
    }

    fn ballots() -> Vec<RcvResult<Ballot>> {
        let mut registry = CandidateRegistry::new();
        let a = Choice::Vote(registry.intern("A"));
        vec![
            Ok(Ballot::new("1", vec![Choice::Undervote, a.clone()])),
            Ok(Ballot::new("2", vec![a.clone(), a])),
        ]
    }

    #[test]
    fn metadata_after_exhaustion() {
        let (mut import, closed) = make_import(ballots(), None);
        let read: Vec<Ballot> = import.by_ref().collect::<RcvResult<Vec<Ballot>>>().unwrap();
        assert_eq!(read.len(), 2);
        assert!(closed.get());
        let md = import.metadata();
        assert_eq!(md.num_ballots, 2);
        assert_eq!(md.candidates, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(md.format, "test");
        assert!(!md.normalized);
        assert_eq!(md.files.len(), 1);
    }

    #[test]
    #[should_panic(expected = "only available once all the ballots are read")]
    fn metadata_before_exhaustion() {
        let (mut import, _) = make_import(ballots(), None);
        let _ = import.next();
        import.metadata();
    }

    #[test]
    #[should_panic(expected = "can only be read once")]
    fn read_after_exhaustion() {
        let (mut import, _) = make_import(ballots(), None);
        for b in import.by_ref() {
            b.unwrap();
        }
        let _ = import.next();
    }

    #[test]
    fn normalization_is_applied() {
        let (import, _) = make_import(ballots(), Some(Box::new(MaineNormalizer)));
        let read: Vec<Ballot> = import.collect::<RcvResult<Vec<Ballot>>>().unwrap();
        let mut registry = CandidateRegistry::new();
        let a = Choice::Vote(registry.intern("A"));
        assert_eq!(read[0].choices, vec![a.clone(), Choice::Undervote]);
        assert_eq!(read[1].choices, vec![a, Choice::Undervote]);
    }

    #[test]
    fn normalized_flag_in_metadata() {
        let (mut import, _) = make_import(vec![], Some(Box::new(SanFranciscoNormalizer)));
        assert!(import.next().is_none());
        let md = import.metadata();
        assert_eq!(md.num_ballots, 0);
        assert!(md.normalized);
    }

    #[test]
    #[should_panic(expected = "only available once all the ballots are read")]
    fn no_metadata_after_failure() {
        let mut input = ballots();
        input.insert(
            1,
            Err(RcvError::InvalidRank {
                ballot_id: "x".to_string(),
                value: "?".to_string(),
            }),
        );
        let (mut import, closed) = make_import(input, None);
        let res: RcvResult<Vec<Ballot>> = import.by_ref().collect();
        assert!(matches!(res, Err(RcvError::InvalidRank { .. })));
        assert!(closed.get());
        import.metadata();
    }

    #[test]
    fn format_registry() {
        let names: Vec<&str> = FORMATS.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["us_ca_sfo", "us_me", "us_nm_saf", "us_vt_btv"]);
        assert!(normalizer_for("us_me").is_ok());
        assert!(matches!(
            normalizer_for("us_xx"),
            Err(RcvError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn unknown_format() {
        let res = open_import(
            "us_ca_sf",
            &[],
            &ReaderParams::default(),
            Path::new("."),
            false,
        );
        assert!(matches!(res, Err(RcvError::UnknownFormat { .. })));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let res = open_import(
            "us_me",
            &["missing.xlsx".to_string()],
            &ReaderParams::default(),
            dir.path(),
            false,
        );
        assert!(matches!(res, Err(RcvError::OpeningFile { .. })));
    }

    #[test]
    fn end_to_end_with_config() {
        let dir = tempfile::tempdir().unwrap();
        io_common::tests::write_archive(
            &dir.path().join("report.zip"),
            &[(
                "pile.txt",
                ".CANDIDATE C01, \"Anna\"\r\n.CANDIDATE C02, \"Bob\"\r\n.FINAL-PILE\r\n0001, 1) C01,C01,C02\r\n0002, 1) C02\r\n",
            )],
        );
        let config: ImportConfig = serde_json::from_str(
            r#"{"format": "us_vt_btv", "files": ["report.zip"],
                "params": {"reportPath": "pile.txt"}, "normalize": true}"#,
        )
        .unwrap();
        let md = run_import(&config, dir.path()).unwrap();
        assert_eq!(md.num_ballots, 2);
        assert_eq!(md.candidates, vec!["Anna".to_string(), "Bob".to_string()]);
        assert!(md.normalized);
        assert_eq!(md.files[0].name, "report.zip");
        assert_eq!(md.files[0].sha256.len(), 64);

        let out = dir.path().join("metadata.json");
        write_metadata(&md, out.to_str()).unwrap();
        let js: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(js["numBallots"], 2);
        assert_eq!(js["files"][0]["name"], "report.zip");
    }
}
