// Reader for the cast vote record exports of Santa Fe: a zip archive of CSV
// tables (contest manifest, candidate manifest and one wide row per ballot).

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use ranked_vote::builder::BallotBuilder;

use crate::rcv::io_common::{open_archive, read_archive_member};
use crate::rcv::*;

pub const FORMAT_NAME: &str = "us_nm_saf";

const CONTEST_MANIFEST: &str = "csvFiles/ContestManifest.csv";
const CANDIDATE_MANIFEST: &str = "csvFiles/CandidateManifest.csv";
const CVR_EXPORT: &str = "csvFiles/CvrExport.csv";

const RECORD_ID_COLUMN: &str = "RecordId";
// Upper bound on the number of contests printed on one card.
const MAX_CONTEST_SLOTS: usize = 100;

#[derive(Debug, Deserialize)]
struct ContestRow {
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "NumOfRanks")]
    num_of_ranks: String,
}

#[derive(Debug, Deserialize)]
struct CandidateRow {
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "ContestId")]
    contest_id: String,
}

fn read_manifest<T: DeserializeOwned>(bytes: &[u8], member: &str) -> RcvResult<Vec<T>> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let mut rows: Vec<T> = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.context(ParsingCsvSnafu { member })?;
        rows.push(row);
    }
    Ok(rows)
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct SantaFeOptions {
    contest: String,
}

impl SantaFeOptions {
    fn from_params(params: &ReaderParams) -> RcvResult<SantaFeOptions> {
        params.check_accepted(FORMAT_NAME, &[CONTEST_OPTION])?;
        Ok(SantaFeOptions {
            contest: params.require_contest(FORMAT_NAME)?,
        })
    }
}

/// The columns of one contest slot of the export.
#[derive(Eq, PartialEq, Debug, Clone)]
struct SlotColumns {
    contest_id: usize,
    // (candidate id, rank) column pairs, in mark order.
    marks: Vec<(usize, usize)>,
}

/// Where the columns of the export are, found once from its header.
#[derive(Eq, PartialEq, Debug, Clone)]
struct ContestLayout {
    record_id: usize,
    slots: Vec<SlotColumns>,
}

impl ContestLayout {
    fn from_header(header: &csv::StringRecord, num_ranks: usize) -> RcvResult<ContestLayout> {
        let columns: HashMap<&str, usize> =
            header.iter().enumerate().map(|(idx, h)| (h, idx)).collect();
        let record_id = *columns
            .get(RECORD_ID_COLUMN)
            .context(MissingColumnSnafu {
                path: CVR_EXPORT,
                column: RECORD_ID_COLUMN,
            })?;
        let mut slots: Vec<SlotColumns> = Vec::new();
        for slot in 0..MAX_CONTEST_SLOTS {
            let prefix = format!("Original/Cards/0/Contests/{}", slot);
            let contest_id = match columns.get(format!("{}/Id", prefix).as_str()) {
                Some(idx) => *idx,
                None => break,
            };
            let mut marks: Vec<(usize, usize)> = Vec::new();
            for mark in 0..num_ranks {
                let candidate_name = format!("{}/Marks/{}/CandidateId", prefix, mark);
                let candidate_col = *columns.get(candidate_name.as_str()).context(MissingColumnSnafu {
                    path: CVR_EXPORT,
                    column: candidate_name.clone(),
                })?;
                let rank_name = format!("{}/Marks/{}/Rank", prefix, mark);
                let rank_col = *columns.get(rank_name.as_str()).context(MissingColumnSnafu {
                    path: CVR_EXPORT,
                    column: rank_name.clone(),
                })?;
                marks.push((candidate_col, rank_col));
            }
            slots.push(SlotColumns { contest_id, marks });
        }
        debug!("ContestLayout: {} contest slots", slots.len());
        Ok(ContestLayout { record_id, slots })
    }
}

struct SantaFeReader {
    contest_id: String,
    num_ranks: usize,
    candidates: HashMap<String, Rc<Candidate>>,
    registry: CandidateRegistry,
    layout: ContestLayout,
    records: Option<csv::StringRecordsIntoIter<Cursor<Vec<u8>>>>,
}

pub fn open(files: &[PathBuf], params: &ReaderParams) -> RcvResult<Box<dyn BallotReader>> {
    let options = SantaFeOptions::from_params(params)?;
    check_file_count(FORMAT_NAME, files, 1)?;
    let path = &files[0];
    let mut archive = open_archive(path)?;

    let contests: Vec<ContestRow> =
        read_manifest(&read_archive_member(&mut archive, path, CONTEST_MANIFEST)?, CONTEST_MANIFEST)?;
    let contest = contests
        .into_iter()
        .find(|c| c.description == options.contest)
        .context(UnknownContestSnafu {
            contest: options.contest.clone(),
        })?;
    let num_ranks = contest
        .num_of_ranks
        .trim()
        .parse::<usize>()
        .ok()
        .context(InvalidManifestValueSnafu {
            member: CONTEST_MANIFEST,
            column: "NumOfRanks",
            value: contest.num_of_ranks.clone(),
        })?
        + 1;
    info!(
        "SantaFeReader: contest {:?} has id {} and {} ranks",
        contest.description, contest.id, num_ranks
    );

    let mut registry = CandidateRegistry::new();
    let mut candidates: HashMap<String, Rc<Candidate>> = HashMap::new();
    let candidate_rows: Vec<CandidateRow> = read_manifest(
        &read_archive_member(&mut archive, path, CANDIDATE_MANIFEST)?,
        CANDIDATE_MANIFEST,
    )?;
    for row in candidate_rows.iter().filter(|r| r.contest_id == contest.id) {
        candidates.insert(row.id.clone(), registry.intern(&row.description));
    }

    let export = read_archive_member(&mut archive, path, CVR_EXPORT)?;
    let mut rdr = csv::Reader::from_reader(Cursor::new(export));
    let header = rdr
        .headers()
        .context(ParsingCsvSnafu { member: CVR_EXPORT })?
        .clone();
    let layout = ContestLayout::from_header(&header, num_ranks)?;

    Ok(Box::new(SantaFeReader {
        contest_id: contest.id,
        num_ranks,
        candidates,
        registry,
        layout,
        records: Some(rdr.into_records()),
    }))
}

impl SantaFeReader {
    fn read_marks(&self, record: &csv::StringRecord, slot: &SlotColumns) -> RcvResult<Ballot> {
        let ballot_id = record.get(self.layout.record_id).unwrap_or_default();
        let mut builder = BallotBuilder::new(ballot_id, self.num_ranks);
        for (candidate_col, rank_col) in slot.marks.iter() {
            let candidate_id = record.get(*candidate_col).unwrap_or_default();
            if candidate_id.is_empty() {
                break;
            }
            let rank_s = record.get(*rank_col).unwrap_or_default();
            let rank = rank_s.trim().parse::<usize>().ok().context(InvalidRankSnafu {
                ballot_id,
                value: rank_s,
            })?;
            let candidate = self
                .candidates
                .get(candidate_id)
                .context(UnknownCandidateIdSnafu {
                    ballot_id,
                    candidate_id,
                })?;
            if rank == 0 || !builder.mark(rank - 1, Choice::Vote(candidate.clone())) {
                warn!(
                    "SantaFeReader: ballot {}: rank {} ignored, the contest has {} ranks",
                    ballot_id, rank, self.num_ranks
                );
            }
        }
        Ok(builder.build())
    }
}

impl BallotReader for SantaFeReader {
    fn candidates(&self) -> Vec<Choice> {
        self.registry
            .candidates()
            .iter()
            .cloned()
            .map(Choice::Vote)
            .collect()
    }

    fn read_next_ballot(&mut self) -> RcvResult<Option<Ballot>> {
        loop {
            let record = match self.records.as_mut().and_then(|r| r.next()) {
                Some(r) => r.context(ParsingCsvSnafu { member: CVR_EXPORT })?,
                None => return Ok(None),
            };
            let slot = self
                .layout
                .slots
                .iter()
                .find(|s| record.get(s.contest_id) == Some(self.contest_id.as_str()));
            if let Some(slot) = slot {
                let ballot = self.read_marks(&record, slot)?;
                debug!("SantaFeReader: ballot: {:?}", ballot);
                return Ok(Some(ballot));
            }
        }
    }

    fn close(&mut self) {
        self.records = None;
    }
}
