// Reader for the pile reports of Burlington: a plain text report inside a
// zip archive, listing the candidates and then one line per ballot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::vec;

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

use crate::rcv::io_common::{open_archive, read_archive_member};
use crate::rcv::*;

pub const FORMAT_NAME: &str = "us_vt_btv";

const FINAL_PILE: &str = ".FINAL-PILE";

lazy_static! {
    static ref CANDIDATE_RX: Regex = Regex::new(r#"^\.CANDIDATE ([^,]+), "([^"]+)""#).unwrap();
    static ref BALLOT_RX: Regex = Regex::new(r"^([^,]+), \d\) (.+)").unwrap();
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct BurlingtonOptions {
    report_path: String,
}

impl BurlingtonOptions {
    fn from_params(params: &ReaderParams) -> RcvResult<BurlingtonOptions> {
        params.check_accepted(FORMAT_NAME, &[REPORT_PATH_OPTION])?;
        Ok(BurlingtonOptions {
            report_path: params.require_report_path(FORMAT_NAME)?,
        })
    }
}

/// Splits a ballot line into its identifier and its candidate codes.
fn split_ballot_line(line: &str) -> Option<(&str, Vec<&str>)> {
    let caps = BALLOT_RX.captures(line)?;
    let id = caps.get(1)?.as_str();
    let votes = caps.get(2)?.as_str().split(',').collect();
    Some((id, votes))
}

struct BurlingtonReader {
    by_code: HashMap<String, Rc<Candidate>>,
    registry: CandidateRegistry,
    lines: vec::IntoIter<String>,
    num_ranks: usize,
}

pub fn open(files: &[PathBuf], params: &ReaderParams) -> RcvResult<Box<dyn BallotReader>> {
    let options = BurlingtonOptions::from_params(params)?;
    check_file_count(FORMAT_NAME, files, 1)?;
    let path = &files[0];
    let member = options.report_path.as_str();
    let mut archive = open_archive(path)?;
    let bytes = read_archive_member(&mut archive, path, member)?;
    let report = String::from_utf8(bytes)
        .ok()
        .filter(|s| s.is_ascii())
        .context(NonAsciiReportSnafu { member })?;
    Ok(Box::new(BurlingtonReader::new(&report)))
}

impl BurlingtonReader {
    fn new(report: &str) -> BurlingtonReader {
        let mut registry = CandidateRegistry::new();
        let mut by_code: HashMap<String, Rc<Candidate>> = HashMap::new();
        let mut lines = report.split("\r\n");
        for line in lines.by_ref() {
            if let Some(caps) = CANDIDATE_RX.captures(line) {
                let candidate = registry.intern(&caps[2]);
                debug!("BurlingtonReader: candidate {} -> {}", &caps[1], candidate);
                by_code.insert(caps[1].to_string(), candidate);
            } else if line.starts_with(FINAL_PILE) {
                break;
            }
        }
        let lines: Vec<String> = lines.map(|l| l.to_string()).collect();
        // Ballots list as many codes as the voter marked: all of them are
        // padded to the longest one.
        let num_ranks = lines
            .iter()
            .filter_map(|l| split_ballot_line(l))
            .map(|(_, votes)| votes.len())
            .max()
            .unwrap_or(0);
        info!(
            "BurlingtonReader: {} candidates, {} ranks",
            registry.len(),
            num_ranks
        );
        BurlingtonReader {
            by_code,
            registry,
            lines: lines.into_iter(),
            num_ranks,
        }
    }

    fn choice(&self, code: &str) -> Choice {
        match self.by_code.get(code) {
            Some(c) => Choice::Vote(c.clone()),
            None => {
                debug!("BurlingtonReader: unknown code {:?} read as overvote", code);
                Choice::Overvote
            }
        }
    }
}

impl BallotReader for BurlingtonReader {
    fn candidates(&self) -> Vec<Choice> {
        self.registry
            .candidates()
            .iter()
            .cloned()
            .map(Choice::Vote)
            .collect()
    }

    fn read_next_ballot(&mut self) -> RcvResult<Option<Ballot>> {
        while let Some(line) = self.lines.next() {
            if let Some((id, votes)) = split_ballot_line(&line) {
                let mut choices: Vec<Choice> = votes.iter().map(|v| self.choice(v)).collect();
                choices.resize(self.num_ranks, Choice::Undervote);
                let ballot = Ballot::new(id, choices);
                debug!("BurlingtonReader: ballot: {:?}", ballot);
                return Ok(Some(ballot));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.lines = Vec::new().into_iter();
    }
}
