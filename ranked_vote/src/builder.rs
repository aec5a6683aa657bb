use std::collections::HashMap;

pub use crate::config::*;

/// Assembles a ballot from individual marks, when a source lists the marks of
/// a ballot by rank rather than in rank order.
///
/// ```
/// use ranked_vote::builder::BallotBuilder;
/// use ranked_vote::{CandidateRegistry, Choice};
///
/// let mut registry = CandidateRegistry::new();
/// let anna = registry.intern("Anna");
/// let bob = registry.intern("Bob");
///
/// let mut builder = BallotBuilder::new("42", 3);
/// builder.mark(2, Choice::Vote(anna.clone()));
/// builder.mark(0, Choice::Vote(anna));
/// builder.mark(0, Choice::Vote(bob));
///
/// let ballot = builder.build();
/// assert_eq!(ballot.choices[0], Choice::Overvote);
/// assert_eq!(ballot.choices[1], Choice::Undervote);
/// ```
pub struct BallotBuilder {
    id: String,
    num_ranks: usize,
    ranks: HashMap<usize, Choice>,
}

impl BallotBuilder {
    pub fn new(id: impl Into<String>, num_ranks: usize) -> BallotBuilder {
        BallotBuilder {
            id: id.into(),
            num_ranks,
            ranks: HashMap::new(),
        }
    }

    /// Records a mark at a 0-based rank.
    ///
    /// A rank that already holds a mark becomes an overvote, and stays one
    /// whatever is marked there afterwards. Returns false (and records
    /// nothing) when the rank is outside of the ballot.
    pub fn mark(&mut self, rank: usize, choice: Choice) -> bool {
        if rank >= self.num_ranks {
            return false;
        }
        self.ranks
            .entry(rank)
            .and_modify(|c| *c = Choice::Overvote)
            .or_insert(choice);
        true
    }

    pub fn num_marks(&self) -> usize {
        self.ranks.len()
    }

    /// Builds the ballot. Ranks without a mark are undervotes.
    pub fn build(mut self) -> Ballot {
        let choices: Vec<Choice> = (0..self.num_ranks)
            .map(|rank| self.ranks.remove(&rank).unwrap_or(Choice::Undervote))
            .collect();
        Ballot::new(self.id, choices)
    }
}
