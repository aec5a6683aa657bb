/*!
Canonical ballots for ranked-choice elections, and the rules that
different jurisdictions apply to turn the raw marks of a ballot into a
ranking.

Reading ballots out of administrative exports is done by the
`rcv-import` program; this crate only holds the data model and the
normalization rules, which do not perform any I/O. See the [`manual`]
for the formats and rules that are supported.

```
use ranked_vote::*;

let mut registry = CandidateRegistry::new();
let a = Choice::Vote(registry.intern("A"));
let b = Choice::Vote(registry.intern("B"));

let raw = Ballot::new("332", vec![a.clone(), Choice::Undervote, a.clone(), b.clone()]);
let normalized = SanFranciscoNormalizer.normalize(&raw);
assert_eq!(
    normalized.choices,
    vec![a, b, Choice::Undervote, Choice::Undervote]
);
```
*/
mod config;
mod registry;

pub mod builder;
pub mod manual;

use std::collections::HashSet;

pub use crate::config::*;
pub use crate::registry::{is_named_write_in, title_case, CandidateRegistry};

/// Maps one raw ballot to the ballot used for tabulation.
///
/// Implementations are stateless: the same ballot always normalizes to the
/// same result, and normalizing twice is the same as normalizing once.
pub trait Normalizer {
    fn rules(&self) -> &NormalizationRules;

    fn normalize(&self, ballot: &Ballot) -> Ballot {
        normalize(ballot, self.rules())
    }
}

/// San Francisco Charter 13.102(a): a skipped rank transfers the vote to the
/// next ranked choice; equal rankings exhaust the ballot.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct SanFranciscoNormalizer;

impl Normalizer for SanFranciscoNormalizer {
    fn rules(&self) -> &NormalizationRules {
        &NormalizationRules::SKIP_AND_SHIFT
    }
}

/// Santa Fe Code of Ordinances 9-1.15(B): skipped rankings are ignored and
/// counting stops at the first rank shared by several candidates.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct SantaFeNormalizer;

impl Normalizer for SantaFeNormalizer {
    fn rules(&self) -> &NormalizationRules {
        &NormalizationRules::SKIP_AND_SHIFT
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct BurlingtonNormalizer;

impl Normalizer for BurlingtonNormalizer {
    fn rules(&self) -> &NormalizationRules {
        &NormalizationRules::SKIP_AND_SHIFT
    }
}

/// Maine: two consecutive skipped rankings exhaust the ballot.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct MaineNormalizer;

impl Normalizer for MaineNormalizer {
    fn rules(&self) -> &NormalizationRules {
        &NormalizationRules::STOP_AT_DOUBLE_UNDERVOTE
    }
}

/// Applies the normalization rules to a ballot.
///
/// The choices are scanned once, left to right:
/// - a candidate (or write-in) is kept the first time it appears and skipped
///   afterwards
/// - an overvote is kept and ends the scan
/// - an undervote is dropped, or ends the scan when it is the second one in
///   a row under [`UndervoteRule::StopAtSecondConsecutive`]
///
/// The result is padded with undervotes to the length of the input.
pub fn normalize(ballot: &Ballot, rules: &NormalizationRules) -> Ballot {
    let mut normalized: Vec<Choice> = Vec::with_capacity(ballot.choices.len());
    let mut seen: HashSet<&Choice> = HashSet::new();
    let mut pending_undervote = false;
    for choice in ballot.choices.iter() {
        match choice {
            Choice::Undervote => match rules.undervote_rule {
                UndervoteRule::SkipAndShift => {}
                UndervoteRule::StopAtSecondConsecutive if pending_undervote => {
                    normalized.push(Choice::Undervote);
                    break;
                }
                UndervoteRule::StopAtSecondConsecutive => {
                    pending_undervote = true;
                    continue;
                }
            },
            Choice::Overvote => {
                normalized.push(Choice::Overvote);
                break;
            }
            c => {
                if seen.insert(c) {
                    normalized.push(c.clone());
                }
            }
        }
        pending_undervote = false;
    }
    normalized.resize(ballot.choices.len(), Choice::Undervote);
    Ballot::new(ballot.id.clone(), normalized)
}
