// Reader for the fixed-width exports of San Francisco: a master lookup file
// describing contests and candidates, and a ballot image with one record per
// (voter, contest, rank).

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use log::{debug, info};

use ranked_vote::builder::BallotBuilder;
use ranked_vote::is_named_write_in;

use crate::rcv::io_common::simplify_file_name;
use crate::rcv::*;

pub const FORMAT_NAME: &str = "us_ca_sfo";

const MASTER_CONTEST: &str = "Contest";
const MASTER_CANDIDATE: &str = "Candidate";

/// Byte slicing of one fixed-width line, with errors that point at the field.
struct FixedWidth<'a> {
    line: &'a str,
    path: &'a str,
    lineno: usize,
}

impl<'a> FixedWidth<'a> {
    fn text(&self, field: &str, start: usize, end: usize) -> RcvResult<&'a str> {
        self.line.get(start..end).context(FixedWidthFieldSnafu {
            path: self.path,
            lineno: self.lineno,
            field,
            line: self.line,
        })
    }

    fn int(&self, field: &str, start: usize, end: usize) -> RcvResult<u32> {
        let s = self.text(field, start, end)?;
        s.trim().parse::<u32>().ok().context(FixedWidthFieldSnafu {
            path: self.path,
            lineno: self.lineno,
            field,
            line: self.line,
        })
    }

    fn flag(&self, field: &str, pos: usize) -> RcvResult<bool> {
        Ok(self.text(field, pos, pos + 1)? == "1")
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct MasterRecord {
    record_type: String,
    record_id: u32,
    description: String,
    _list_order: u32,
    contest_id: u32,
    is_writein: bool,
    _is_provisional: bool,
}

impl MasterRecord {
    fn parse(line: &str, path: &str, lineno: usize) -> RcvResult<MasterRecord> {
        let fw = FixedWidth { line, path, lineno };
        Ok(MasterRecord {
            record_type: fw.text("record_type", 0, 10)?.trim().to_string(),
            record_id: fw.int("record_id", 10, 17)?,
            description: fw.text("description", 17, 67)?.trim().to_string(),
            _list_order: fw.int("list_order", 67, 74)?,
            contest_id: fw.int("contest_id", 74, 81)?,
            is_writein: fw.flag("is_writein", 81)?,
            _is_provisional: fw.int("is_provisional", 82, 83)? == 1,
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct BallotRecord {
    contest_id: u32,
    pref_voter_id: u32,
    _serial_number: u32,
    _tally_type_id: u32,
    _precinct_id: u32,
    vote_rank: u32,
    candidate_id: u32,
    over_vote: bool,
    under_vote: bool,
}

impl BallotRecord {
    fn parse(line: &str, path: &str, lineno: usize) -> RcvResult<BallotRecord> {
        let fw = FixedWidth { line, path, lineno };
        Ok(BallotRecord {
            contest_id: fw.int("contest_id", 0, 7)?,
            pref_voter_id: fw.int("pref_voter_id", 7, 16)?,
            _serial_number: fw.int("serial_number", 16, 23)?,
            _tally_type_id: fw.int("tally_type_id", 23, 26)?,
            _precinct_id: fw.int("precinct_id", 26, 33)?,
            vote_rank: fw.int("vote_rank", 33, 36)?,
            candidate_id: fw.int("candidate_id", 36, 43)?,
            over_vote: fw.flag("over_vote", 43)?,
            under_vote: fw.flag("under_vote", 44)?,
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
struct SanFranciscoOptions {
    contest: Option<u32>,
}

impl SanFranciscoOptions {
    fn from_params(params: &ReaderParams) -> RcvResult<SanFranciscoOptions> {
        params.check_accepted(FORMAT_NAME, &[CONTEST_OPTION])?;
        let contest = match params.contest.as_ref() {
            None => None,
            Some(s) => Some(s.trim().parse::<u32>().ok().context(InvalidOptionSnafu {
                option: CONTEST_OPTION,
                value: s.clone(),
            })?),
        };
        Ok(SanFranciscoOptions { contest })
    }
}

/// The candidates of one contest, in the order of the master file.
#[derive(Debug, Default)]
struct ContestCandidates {
    by_id: HashMap<u32, Choice>,
    ordered: Vec<Choice>,
}

impl ContestCandidates {
    fn insert(&mut self, id: u32, choice: Choice) {
        if !self.ordered.contains(&choice) {
            self.ordered.push(choice.clone());
        }
        self.by_id.insert(id, choice);
    }
}

struct SanFranciscoReader {
    candidates: HashMap<u32, ContestCandidates>,
    // Highest vote rank of every contest in the ballot image.
    num_ranks: HashMap<u32, usize>,
    // Set at construction when a contest is selected, or by the first ballot.
    contest: Option<u32>,
    filter: bool,
    image: Option<Lines<BufReader<File>>>,
    image_path: String,
    lineno: usize,
    pending: Option<BallotRecord>,
    seen_voters: HashSet<u32>,
}

pub fn open(files: &[PathBuf], params: &ReaderParams) -> RcvResult<Box<dyn BallotReader>> {
    let options = SanFranciscoOptions::from_params(params)?;
    check_file_count(FORMAT_NAME, files, 2)?;
    let reader = SanFranciscoReader::new(&files[0], &files[1], &options)?;
    Ok(Box::new(reader))
}

fn open_lines(path: &Path) -> RcvResult<Lines<BufReader<File>>> {
    let file = File::open(path).context(OpeningFileSnafu {
        path: path.display().to_string(),
    })?;
    Ok(BufReader::new(file).lines())
}

/// Scans the ballot image once for the number of ranks of each contest.
fn rank_counts(path: &Path) -> RcvResult<HashMap<u32, usize>> {
    let p = path.display().to_string();
    let mut res: HashMap<u32, usize> = HashMap::new();
    for (idx, line_r) in open_lines(path)?.enumerate() {
        let line = line_r.context(ReadingFileSnafu { path: p.clone() })?;
        if line.trim().is_empty() {
            continue;
        }
        let br = BallotRecord::parse(&line, &p, idx + 1)?;
        let max_rank = res.entry(br.contest_id).or_insert(0);
        *max_rank = (*max_rank).max(br.vote_rank as usize);
    }
    debug!("rank_counts: {:?}", res);
    Ok(res)
}

impl SanFranciscoReader {
    fn new(
        master_path: &Path,
        image_path: &Path,
        options: &SanFranciscoOptions,
    ) -> RcvResult<SanFranciscoReader> {
        let master_name = master_path.display().to_string();
        info!("Reading master lookup {}", master_name);
        let mut registry = CandidateRegistry::new();
        let mut contests: HashMap<u32, String> = HashMap::new();
        let mut candidates: HashMap<u32, ContestCandidates> = HashMap::new();
        for (idx, line_r) in open_lines(master_path)?.enumerate() {
            let line = line_r.context(ReadingFileSnafu {
                path: master_name.clone(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let mr = MasterRecord::parse(&line, &master_name, idx + 1)?;
            debug!("SanFranciscoReader: master record: {:?}", mr);
            match mr.record_type.as_str() {
                MASTER_CONTEST => {
                    contests.insert(mr.record_id, mr.description);
                }
                MASTER_CANDIDATE => {
                    let choice = if mr.is_writein && !is_named_write_in(&mr.description) {
                        Choice::WriteIn
                    } else {
                        registry.resolve_description(&mr.description)
                    };
                    candidates
                        .entry(mr.contest_id)
                        .or_default()
                        .insert(mr.record_id, choice);
                }
                _ => {}
            }
        }

        if let Some(c) = options.contest {
            ensure!(
                contests.contains_key(&c),
                UnknownContestSnafu {
                    contest: c.to_string()
                }
            );
            info!("SanFranciscoReader: selected contest {} ({})", c, contests[&c]);
        }

        info!(
            "Reading ballot image {}",
            simplify_file_name(image_path)
        );
        let num_ranks = rank_counts(image_path)?;
        Ok(SanFranciscoReader {
            candidates,
            num_ranks,
            contest: options.contest,
            filter: options.contest.is_some(),
            image: Some(open_lines(image_path)?),
            image_path: image_path.display().to_string(),
            lineno: 0,
            pending: None,
            seen_voters: HashSet::new(),
        })
    }

    fn next_record(&mut self) -> RcvResult<Option<BallotRecord>> {
        if let Some(r) = self.pending.take() {
            return Ok(Some(r));
        }
        let lines = match self.image.as_mut() {
            Some(l) => l,
            None => return Ok(None),
        };
        for line_r in lines.by_ref() {
            self.lineno += 1;
            let line = line_r.context(ReadingFileSnafu {
                path: self.image_path.clone(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            return BallotRecord::parse(&line, &self.image_path, self.lineno).map(Some);
        }
        Ok(None)
    }

    /// The next run of consecutive records sharing a (voter, contest) key.
    fn next_group(&mut self) -> RcvResult<Option<Vec<BallotRecord>>> {
        let first = match self.next_record()? {
            Some(r) => r,
            None => return Ok(None),
        };
        let key = (first.pref_voter_id, first.contest_id);
        let mut records = vec![first];
        while let Some(r) = self.next_record()? {
            if (r.pref_voter_id, r.contest_id) == key {
                records.push(r);
            } else {
                self.pending = Some(r);
                break;
            }
        }
        Ok(Some(records))
    }

    fn choice(&self, record: &BallotRecord) -> RcvResult<Choice> {
        if record.under_vote {
            return Ok(Choice::Undervote);
        }
        if record.over_vote {
            return Ok(Choice::Overvote);
        }
        self.candidates
            .get(&record.contest_id)
            .and_then(|cc| cc.by_id.get(&record.candidate_id))
            .cloned()
            .context(UnknownCandidateIdSnafu {
                ballot_id: record.pref_voter_id.to_string(),
                candidate_id: record.candidate_id.to_string(),
            })
    }
}

impl BallotReader for SanFranciscoReader {
    fn candidates(&self) -> Vec<Choice> {
        self.contest
            .and_then(|c| self.candidates.get(&c))
            .map(|cc| cc.ordered.clone())
            .unwrap_or_default()
    }

    fn read_next_ballot(&mut self) -> RcvResult<Option<Ballot>> {
        while let Some(records) = self.next_group()? {
            let voter_id = records[0].pref_voter_id;
            let contest_id = records[0].contest_id;
            match self.contest {
                Some(c) if self.filter && c != contest_id => continue,
                Some(c) => {
                    ensure!(
                        c == contest_id,
                        ContestMismatchSnafu {
                            ballot_id: voter_id.to_string(),
                            expected: c,
                            found: contest_id,
                        }
                    );
                }
                None => {
                    info!("SanFranciscoReader: reading contest {}", contest_id);
                    self.contest = Some(contest_id);
                }
            }
            ensure!(
                self.seen_voters.insert(voter_id),
                UnsortedBallotImageSnafu {
                    voter_id,
                    contest_id
                }
            );
            let num_ranks = self.num_ranks.get(&contest_id).copied().unwrap_or(0);
            let mut builder = BallotBuilder::new(voter_id.to_string(), num_ranks);
            for r in records.iter() {
                ensure!(
                    r.vote_rank >= 1,
                    InvalidRankSnafu {
                        ballot_id: voter_id.to_string(),
                        value: r.vote_rank.to_string(),
                    }
                );
                builder.mark(r.vote_rank as usize - 1, self.choice(r)?);
            }
            let ballot = builder.build();
            debug!("SanFranciscoReader: ballot: {:?}", ballot);
            return Ok(Some(ballot));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.image = None;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn master_line(
        record_type: &str,
        id: u32,
        description: &str,
        contest_id: u32,
        is_writein: bool,
    ) -> String {
        format!(
            "{:<10}{:07}{:<50}{:07}{:07}{}{}",
            record_type, id, description, 1, contest_id, is_writein as u8, 0
        )
    }

    fn ballot_line(contest: u32, voter: u32, rank: u32, candidate: u32, flags: (u8, u8)) -> String {
        format!(
            "{:07}{:09}{:07}{:03}{:07}{:03}{:07}{}{}",
            contest, voter, 12, 1, 1100, rank, candidate, flags.0, flags.1
        )
    }

    fn master_file() -> String {
        vec![
            master_line("Contest", 1, "Mayor", 0, false),
            master_line("Contest", 2, "Sheriff", 0, false),
            master_line("Candidate", 10, "ANNA SMITH", 1, false),
            master_line("Candidate", 11, "BOB JONES", 1, false),
            master_line("Candidate", 12, "WRITE-IN", 1, true),
            master_line("Candidate", 13, "WRITE-IN - carl  HILL", 1, true),
            master_line("Candidate", 20, "DORA LEE", 2, false),
            master_line("Precinct", 1100, "PCT 1100", 0, false),
        ]
        .join("\n")
    }

    fn make_reader(
        ballot_lines: &[String],
        contest: Option<&str>,
    ) -> RcvResult<(Box<dyn BallotReader>, tempfile::TempDir)> {
        make_reader_with_master(&master_file(), ballot_lines, contest)
    }

    fn make_reader_with_master(
        master_content: &str,
        ballot_lines: &[String],
        contest: Option<&str>,
    ) -> RcvResult<(Box<dyn BallotReader>, tempfile::TempDir)> {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.txt");
        let image = dir.path().join("ballots.txt");
        fs::write(&master, master_content).unwrap();
        fs::write(&image, ballot_lines.join("\r\n")).unwrap();
        let params = ReaderParams {
            contest: contest.map(|s| s.to_string()),
            report_path: None,
        };
        let reader = open(&[master, image], &params)?;
        Ok((reader, dir))
    }

    fn read_all(reader: &mut Box<dyn BallotReader>) -> RcvResult<Vec<Ballot>> {
        let mut res = Vec::new();
        while let Some(b) = reader.read_next_ballot()? {
            res.push(b);
        }
        Ok(res)
    }

    fn names(ballot: &Ballot) -> Vec<String> {
        ballot.choices.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn master_record_offsets() {
        let line = master_line("Candidate", 123, "ANNA SMITH", 4, true);
        assert_eq!(line.len(), 83);
        let mr = MasterRecord::parse(&line, "m", 1).unwrap();
        assert_eq!(
            mr,
            MasterRecord {
                record_type: "Candidate".to_string(),
                record_id: 123,
                description: "ANNA SMITH".to_string(),
                _list_order: 1,
                contest_id: 4,
                is_writein: true,
                _is_provisional: false,
            }
        );
    }

    #[test]
    fn ballot_record_offsets() {
        let line = "000000100000004200000120010001100002000001101";
        assert_eq!(line.len(), 45);
        let br = BallotRecord::parse(line, "b", 1).unwrap();
        assert_eq!(
            br,
            BallotRecord {
                contest_id: 1,
                pref_voter_id: 42,
                _serial_number: 12,
                _tally_type_id: 1,
                _precinct_id: 1100,
                vote_rank: 2,
                candidate_id: 11,
                over_vote: false,
                under_vote: true,
            }
        );
    }

    #[test]
    fn short_record_is_an_error() {
        let res = BallotRecord::parse("0000001000000042", "b", 3);
        match res {
            Err(RcvError::FixedWidthField { lineno, field, .. }) => {
                assert_eq!(lineno, 3);
                assert_eq!(field, "serial_number");
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn reads_grouped_ballots() {
        let lines = vec![
            ballot_line(1, 1, 1, 10, (0, 0)),
            ballot_line(1, 1, 2, 12, (0, 0)),
            ballot_line(1, 1, 3, 0, (0, 1)),
            ballot_line(1, 2, 1, 0, (1, 0)),
            ballot_line(1, 2, 2, 13, (0, 0)),
            ballot_line(1, 2, 3, 0, (1, 1)),
        ];
        let (mut reader, _dir) = make_reader(&lines, None).unwrap();
        assert!(reader.candidates().is_empty());
        let ballots = read_all(&mut reader).unwrap();
        assert_eq!(ballots.len(), 2);
        assert_eq!(ballots[0].id, "1");
        assert_eq!(names(&ballots[0]), vec!["ANNA SMITH", "Write-in", "$UNDERVOTE"]);
        assert_eq!(names(&ballots[1]), vec!["$OVERVOTE", "Carl Hill", "$UNDERVOTE"]);
        assert_eq!(
            reader
                .candidates()
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<String>>(),
            vec!["ANNA SMITH", "BOB JONES", "Write-in", "Carl Hill"]
        );
        reader.close();
        assert!(reader.read_next_ballot().unwrap().is_none());
    }

    #[test]
    fn short_groups_are_padded() {
        let lines = vec![
            ballot_line(1, 1, 1, 10, (0, 0)),
            ballot_line(1, 1, 2, 11, (0, 0)),
            ballot_line(1, 1, 3, 12, (0, 0)),
            ballot_line(1, 2, 1, 11, (0, 0)),
            ballot_line(1, 2, 2, 10, (0, 0)),
        ];
        let (mut reader, _dir) = make_reader(&lines, None).unwrap();
        let ballots = read_all(&mut reader).unwrap();
        assert_eq!(ballots.len(), 2);
        assert_eq!(ballots[0].len(), 3);
        assert_eq!(ballots[1].len(), 3);
        assert_eq!(names(&ballots[1]), vec!["BOB JONES", "ANNA SMITH", "$UNDERVOTE"]);
    }

    #[test]
    fn marks_follow_vote_rank() {
        let lines = vec![
            ballot_line(1, 1, 2, 11, (0, 0)),
            ballot_line(1, 1, 1, 10, (0, 0)),
            ballot_line(1, 1, 3, 0, (0, 1)),
        ];
        let (mut reader, _dir) = make_reader(&lines, None).unwrap();
        let ballots = read_all(&mut reader).unwrap();
        assert_eq!(names(&ballots[0]), vec!["ANNA SMITH", "BOB JONES", "$UNDERVOTE"]);
    }

    #[test]
    fn rank_zero_is_an_error() {
        let lines = vec![ballot_line(1, 1, 0, 10, (0, 0))];
        let (mut reader, _dir) = make_reader(&lines, None).unwrap();
        assert!(matches!(
            reader.read_next_ballot(),
            Err(RcvError::InvalidRank { .. })
        ));
    }

    #[test]
    fn named_write_in_matching_a_candidate() {
        let master = vec![
            master_line("Contest", 1, "Mayor", 0, false),
            master_line("Candidate", 10, "Carl Hill", 1, false),
            master_line("Candidate", 11, "WRITE-IN - CARL HILL", 1, true),
            master_line("Candidate", 12, "WRITE-IN", 1, true),
        ]
        .join("\n");
        let lines = vec![
            ballot_line(1, 1, 1, 11, (0, 0)),
            ballot_line(1, 1, 2, 12, (0, 0)),
        ];
        let (mut reader, _dir) = make_reader_with_master(&master, &lines, None).unwrap();
        let ballots = read_all(&mut reader).unwrap();
        assert_eq!(names(&ballots[0]), vec!["Carl Hill", "Write-in"]);
        assert!(matches!(ballots[0].choices[0], Choice::Vote(_)));
    }

    #[test]
    fn contest_selector_filters() {
        let lines = vec![
            ballot_line(1, 1, 1, 10, (0, 0)),
            ballot_line(2, 1, 1, 20, (0, 0)),
            ballot_line(1, 2, 1, 11, (0, 0)),
            ballot_line(2, 2, 1, 0, (0, 1)),
        ];
        let (mut reader, _dir) = make_reader(&lines, Some("2")).unwrap();
        let ballots = read_all(&mut reader).unwrap();
        assert_eq!(ballots.len(), 2);
        assert_eq!(names(&ballots[0]), vec!["DORA LEE"]);
        assert_eq!(names(&ballots[1]), vec!["$UNDERVOTE"]);
        assert_eq!(reader.candidates().len(), 1);
    }

    #[test]
    fn mixed_contests_without_selector() {
        let lines = vec![
            ballot_line(1, 1, 1, 10, (0, 0)),
            ballot_line(2, 1, 1, 20, (0, 0)),
        ];
        let (mut reader, _dir) = make_reader(&lines, None).unwrap();
        assert!(reader.read_next_ballot().unwrap().is_some());
        assert!(matches!(
            reader.read_next_ballot(),
            Err(RcvError::ContestMismatch {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn unsorted_image() {
        let lines = vec![
            ballot_line(1, 1, 1, 10, (0, 0)),
            ballot_line(1, 2, 1, 11, (0, 0)),
            ballot_line(1, 1, 2, 11, (0, 0)),
        ];
        let (mut reader, _dir) = make_reader(&lines, None).unwrap();
        assert!(matches!(
            read_all(&mut reader),
            Err(RcvError::UnsortedBallotImage {
                voter_id: 1,
                contest_id: 1
            })
        ));
    }

    #[test]
    fn unknown_candidate() {
        let lines = vec![ballot_line(1, 1, 1, 99, (0, 0))];
        let (mut reader, _dir) = make_reader(&lines, None).unwrap();
        assert!(matches!(
            reader.read_next_ballot(),
            Err(RcvError::UnknownCandidateId { .. })
        ));
    }

    #[test]
    fn options() {
        assert!(matches!(
            make_reader(&[], Some("7")),
            Err(RcvError::UnknownContest { .. })
        ));
        assert!(matches!(
            make_reader(&[], Some("mayor")),
            Err(RcvError::InvalidOption { .. })
        ));
        let params = ReaderParams {
            contest: None,
            report_path: Some("x".to_string()),
        };
        assert!(matches!(
            open(&[], &params),
            Err(RcvError::UnexpectedOption { .. })
        ));
        assert!(matches!(
            open(&[], &ReaderParams::default()),
            Err(RcvError::WrongFileCount { .. })
        ));
    }
}
