// ********* Ballot data structures ***********

use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A named contestant.
///
/// Candidates are normally obtained from a [`crate::CandidateRegistry`], which
/// guarantees that a given name always maps to the same shared instance.
/// Equality and hashing only look at the canonical name, so two candidates
/// built separately with the same name are still the same candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub write_in: bool,
}

impl Candidate {
    pub fn new(name: &str) -> Candidate {
        Candidate {
            name: crate::registry::canonical_key(name),
            write_in: false,
        }
    }

    pub fn new_write_in(name: &str) -> Candidate {
        Candidate {
            name: crate::registry::canonical_key(name),
            write_in: true,
        }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Candidate {}

impl Hash for Candidate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The label used when a write-in is displayed.
pub const WRITE_IN_LABEL: &str = "Write-in";
pub const UNDERVOTE_LABEL: &str = "$UNDERVOTE";
pub const OVERVOTE_LABEL: &str = "$OVERVOTE";

/// All the possible states of one rank on a ballot.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Choice {
    /// A registered candidate.
    Vote(Rc<Candidate>),
    /// A write-in that was not resolved to a named candidate.
    WriteIn,
    /// The voter left this rank blank.
    Undervote,
    /// More than one candidate was marked at this rank, or the ballot was
    /// declared exhausted at this point.
    Overvote,
}

impl Choice {
    pub fn is_undervote(&self) -> bool {
        matches!(self, Choice::Undervote)
    }

    pub fn is_overvote(&self) -> bool {
        matches!(self, Choice::Overvote)
    }
}

impl From<Rc<Candidate>> for Choice {
    fn from(candidate: Rc<Candidate>) -> Self {
        Choice::Vote(candidate)
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::Vote(c) => write!(f, "{}", c),
            Choice::WriteIn => write!(f, "{}", WRITE_IN_LABEL),
            Choice::Undervote => write!(f, "{}", UNDERVOTE_LABEL),
            Choice::Overvote => write!(f, "{}", OVERVOTE_LABEL),
        }
    }
}

/// One voter's ranked choices for a single contest.
///
/// All the ballots read from one import have the same number of choices.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Ballot {
    pub id: String,
    pub choices: Vec<Choice>,
}

impl Ballot {
    pub fn new(id: impl Into<String>, choices: Vec<Choice>) -> Ballot {
        Ballot {
            id: id.into(),
            choices,
        }
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

// ********* Normalization rules **********

/// How a blank rank is treated while normalizing a ballot.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UndervoteRule {
    /// The blank rank is dropped and the next marked rank moves up.
    SkipAndShift,
    /// A single blank rank is dropped, but two blank ranks in a row
    /// exhaust the ballot.
    StopAtSecondConsecutive,
}

/// The rules that turn the raw marks of a ballot into the ranking used for
/// tabulation.
///
/// Overvotes always exhaust the ballot and a repeated candidate is always
/// skipped; jurisdictions only differ in the treatment of blank ranks.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizationRules {
    pub undervote_rule: UndervoteRule,
}

impl NormalizationRules {
    pub const SKIP_AND_SHIFT: NormalizationRules = NormalizationRules {
        undervote_rule: UndervoteRule::SkipAndShift,
    };

    pub const STOP_AT_DOUBLE_UNDERVOTE: NormalizationRules = NormalizationRules {
        undervote_rule: UndervoteRule::StopAtSecondConsecutive,
    };
}
