// Reader for the cast vote records published by Maine: one or more
// workbooks with one row per ballot and one column per rank.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::vec;

use calamine::{open_workbook_auto, DataType, Reader};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

use crate::rcv::*;

pub const FORMAT_NAME: &str = "us_me";

const ID_COLUMN: &str = "Cast Vote Record";
const UNDERVOTE_CELL: &str = "undervote";
const OVERVOTE_CELL: &str = "overvote";
const WRITE_IN_CELL: &str = "Write-in";

lazy_static! {
    static ref CHOICE_COLUMN_RX: Regex = Regex::new(r"^.+ (\d+)(?:st|nd|rd|th) Choice").unwrap();
    static ref NAME_RX: Regex =
        Regex::new(r"^(?:DEM |REP )?(.+?), (.+?) ?(?: \(\d+\))?$").unwrap();
}

/// Turns `DEM Last, First (123)` into `First Last`.
fn fix_name(name: &str) -> String {
    NAME_RX.replace(name, "${2} ${1}").to_string()
}

fn header_name(cell: &DataType) -> Option<&str> {
    match cell {
        DataType::String(s) => Some(s.as_str()),
        _ => None,
    }
}

/// The indexes of the rank columns, in rank order.
fn choice_columns(header: &[DataType], path: &str) -> RcvResult<Vec<usize>> {
    let mut res: Vec<usize> = Vec::new();
    for (idx, cell) in header.iter().enumerate() {
        let name = match header_name(cell) {
            Some(n) => n,
            None => continue,
        };
        if let Some(caps) = CHOICE_COLUMN_RX.captures(name) {
            let expected = res.len() as u32 + 1;
            let found = caps[1].parse::<u32>().unwrap_or(0);
            ensure!(
                found == expected,
                NonContiguousRanksSnafu {
                    path,
                    column: name,
                    expected,
                    found,
                }
            );
            res.push(idx);
        }
    }
    ensure!(!res.is_empty(), MissingChoiceColumnsSnafu { path });
    Ok(res)
}

fn id_column(header: &[DataType], path: &str) -> RcvResult<usize> {
    header
        .iter()
        .position(|c| header_name(c) == Some(ID_COLUMN))
        .context(MissingColumnSnafu {
            path,
            column: ID_COLUMN,
        })
}

fn read_id(cell: Option<&DataType>, path: &str, row: usize) -> RcvResult<String> {
    match cell {
        Some(DataType::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(DataType::Int(i)) => Ok(i.to_string()),
        Some(DataType::Float(f)) if f.fract() == 0.0 => Ok(format!("{}", *f as i64)),
        Some(DataType::Float(f)) => Ok(f.to_string()),
        x => UnexpectedCellSnafu {
            path,
            row,
            content: format!("{:?}", x),
        }
        .fail(),
    }
}

fn read_choice(
    cell: Option<&DataType>,
    registry: &mut CandidateRegistry,
    path: &str,
    row: usize,
) -> RcvResult<Choice> {
    match cell {
        Some(DataType::String(s)) if !s.is_empty() => Ok(match s.as_str() {
            UNDERVOTE_CELL => Choice::Undervote,
            OVERVOTE_CELL => Choice::Overvote,
            WRITE_IN_CELL => Choice::WriteIn,
            name => Choice::Vote(registry.intern(&fix_name(name))),
        }),
        x => UnexpectedCellSnafu {
            path,
            row,
            content: format!("{:?}", x),
        }
        .fail(),
    }
}

/// The rows of one worksheet, after the header was checked.
struct SheetRows {
    path: String,
    id_col: usize,
    choice_cols: Vec<usize>,
    rows: std::iter::Enumerate<vec::IntoIter<Vec<DataType>>>,
}

impl SheetRows {
    fn load(path: &Path) -> RcvResult<SheetRows> {
        let p = path.display().to_string();
        info!("Opening workbook {}", p);
        let mut workbook = open_workbook_auto(path).context(OpeningExcelSnafu { path: p.clone() })?;
        let wrange = workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path: p.clone() })?
            .context(OpeningExcelSnafu { path: p.clone() })?;
        let mut rows = wrange.rows().map(|r| r.to_vec());
        let header = rows.next().context(EmptyExcelSnafu { path: p.clone() })?;
        debug!("SheetRows: header: {:?}", header);
        let id_col = id_column(&header, &p)?;
        let choice_cols = choice_columns(&header, &p)?;
        let body: Vec<Vec<DataType>> = rows.collect();
        info!("{}: {} rows, {} ranks", p, body.len(), choice_cols.len());
        Ok(SheetRows {
            path: p,
            id_col,
            choice_cols,
            rows: body.into_iter().enumerate(),
        })
    }

    fn read_row(
        &self,
        idx: usize,
        row: &[DataType],
        registry: &mut CandidateRegistry,
    ) -> RcvResult<Ballot> {
        // Spreadsheet row numbers start at 1, after the header.
        let rowno = idx + 2;
        let id = read_id(row.get(self.id_col), &self.path, rowno)?;
        let choices = self
            .choice_cols
            .iter()
            .map(|c| read_choice(row.get(*c), registry, &self.path, rowno))
            .collect::<RcvResult<Vec<Choice>>>()?;
        Ok(Ballot::new(id, choices))
    }
}

struct MaineReader {
    pending_files: VecDeque<PathBuf>,
    current: Option<SheetRows>,
    load: fn(&Path) -> RcvResult<SheetRows>,
    num_ranks: usize,
    registry: CandidateRegistry,
}

pub fn open(files: &[PathBuf], params: &ReaderParams) -> RcvResult<Box<dyn BallotReader>> {
    params.check_accepted(FORMAT_NAME, &[])?;
    let mut pending_files: VecDeque<PathBuf> = files.iter().cloned().collect();
    // The first workbook is checked right away, the others when they are reached.
    let first = pending_files.pop_front().context(WrongFileCountSnafu {
        format: FORMAT_NAME,
        expected: "at least 1",
        found: 0usize,
    })?;
    let sheet = SheetRows::load(&first)?;
    Ok(Box::new(MaineReader {
        pending_files,
        num_ranks: sheet.choice_cols.len(),
        current: Some(sheet),
        load: SheetRows::load,
        registry: CandidateRegistry::new(),
    }))
}

impl BallotReader for MaineReader {
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
            if self.current.is_none() {
                let path = match self.pending_files.pop_front() {
                    Some(p) => p,
                    None => return Ok(None),
                };
                let sheet = (self.load)(&path)?;
                ensure!(
                    sheet.choice_cols.len() == self.num_ranks,
                    InconsistentRankCountSnafu {
                        path: sheet.path.clone(),
                        expected: self.num_ranks,
                        found: sheet.choice_cols.len(),
                    }
                );
                self.current = Some(sheet);
            }
            if let Some(sheet) = self.current.as_mut() {
                match sheet.rows.next() {
                    Some((idx, row)) => {
                        let ballot = sheet.read_row(idx, &row, &mut self.registry)?;
                        debug!("MaineReader: ballot: {:?}", ballot);
                        return Ok(Some(ballot));
                    }
                    None => {
                        self.current = None;
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        self.current = None;
        self.pending_files.clear();
    }
}
