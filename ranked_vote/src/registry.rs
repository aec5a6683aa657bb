use log::debug;

use std::collections::HashMap;
use std::rc::Rc;

use crate::config::{Candidate, Choice};

const WRITE_IN_DESCRIPTION: &str = "WRITE-IN";
const WRITE_IN_PREFIX: &str = "WRITE-IN - ";

/// Interns candidate names so that every mention of a candidate in one import
/// shares the same instance.
///
/// A registry belongs to a single import: identities never leak from one
/// import to the next.
///
/// ```
/// use ranked_vote::CandidateRegistry;
/// use std::rc::Rc;
///
/// let mut registry = CandidateRegistry::new();
/// let a = registry.intern("Anna Smith");
/// let b = registry.intern("Anna  Smith ");
/// assert!(Rc::ptr_eq(&a, &b));
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CandidateRegistry {
    by_key: HashMap<String, Rc<Candidate>>,
    // Registration order, which is the order candidates are reported in.
    ordered: Vec<Rc<Candidate>>,
}

impl CandidateRegistry {
    pub fn new() -> CandidateRegistry {
        CandidateRegistry::default()
    }

    /// Returns the candidate registered under this name, creating it if needed.
    pub fn intern(&mut self, name: &str) -> Rc<Candidate> {
        self.intern_candidate(Candidate::new(name))
    }

    /// Like [`CandidateRegistry::intern`], for a candidate that was written in
    /// by name.
    pub fn intern_write_in(&mut self, name: &str) -> Rc<Candidate> {
        self.intern_candidate(Candidate::new_write_in(name))
    }

    fn intern_candidate(&mut self, candidate: Candidate) -> Rc<Candidate> {
        if let Some(c) = self.by_key.get(&candidate.name) {
            return c.clone();
        }
        debug!("CandidateRegistry: new candidate {:?}", candidate);
        let c = Rc::new(candidate);
        self.by_key.insert(c.name.clone(), c.clone());
        self.ordered.push(c.clone());
        c
    }

    /// Resolves an administrative candidate description.
    ///
    /// A bare `WRITE-IN` is the unresolved write-in. A description starting
    /// with `WRITE-IN - ` is a named write-in: the rest is title-cased.
    /// Anything else is a regular candidate.
    pub fn resolve_description(&mut self, description: &str) -> Choice {
        let description = description.trim();
        if description == WRITE_IN_DESCRIPTION {
            Choice::WriteIn
        } else if let Some(name) = description.strip_prefix(WRITE_IN_PREFIX) {
            Choice::Vote(self.intern_write_in(&title_case(name.trim())))
        } else {
            Choice::Vote(self.intern(description))
        }
    }

    pub fn candidates(&self) -> &[Rc<Candidate>] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Whether a description names the candidate that was written in, as in
/// `WRITE-IN - JOHN DOE`.
pub fn is_named_write_in(description: &str) -> bool {
    description.trim().starts_with(WRITE_IN_PREFIX)
}

/// The key under which a candidate name is registered: surrounding
/// whitespace is dropped and inner runs of whitespace become a single space.
pub(crate) fn canonical_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Upper-cases the first letter of every word and lower-cases the rest.
/// A word starts after any character that is not a letter.
pub fn title_case(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if prev_is_letter {
            res.extend(c.to_lowercase());
        } else {
            res.extend(c.to_uppercase());
        }
        prev_is_letter = c.is_alphabetic();
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_entry() {
        let mut registry = CandidateRegistry::new();
        let a1 = registry.intern("Jared Golden");
        let a2 = registry.intern(" Jared   Golden");
        assert!(Rc::ptr_eq(&a1, &a2));
        assert_eq!(a1, a2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn separately_built_candidates_compare_equal() {
        assert_eq!(Candidate::new("Anna"), Candidate::new("Anna "));
        assert_ne!(Candidate::new("Anna"), Candidate::new("Anne"));
    }

    #[test]
    fn different_keys_never_collide() {
        let mut registry = CandidateRegistry::new();
        let a = registry.intern("Anna");
        let b = registry.intern("Bob");
        let c = registry.intern("anna");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.len(), 3);
        let names: Vec<&str> = registry
            .candidates()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Anna", "Bob", "anna"]);
    }

    #[test]
    fn registries_do_not_share_identities() {
        let mut r1 = CandidateRegistry::new();
        let mut r2 = CandidateRegistry::new();
        let a1 = r1.intern("Anna");
        let a2 = r2.intern("Anna");
        assert_eq!(a1, a2);
        assert!(!Rc::ptr_eq(&a1, &a2));
    }

    #[test]
    fn write_in_descriptions() {
        let mut registry = CandidateRegistry::new();
        assert_eq!(registry.resolve_description("WRITE-IN"), Choice::WriteIn);
        assert_eq!(registry.resolve_description("  WRITE-IN  "), Choice::WriteIn);
        match registry.resolve_description("WRITE-IN - JOHN O'BRIEN ") {
            Choice::Vote(c) => {
                assert_eq!(c.name, "John O'Brien");
                assert!(c.write_in);
            }
            x => panic!("unexpected choice {:?}", x),
        }
        match registry.resolve_description("LONDON BREED") {
            Choice::Vote(c) => {
                assert_eq!(c.name, "LONDON BREED");
                assert!(!c.write_in);
            }
            x => panic!("unexpected choice {:?}", x),
        }
        assert_eq!(registry.len(), 2);
        assert!(is_named_write_in(" WRITE-IN - JOHN O'BRIEN"));
        assert!(!is_named_write_in("WRITE-IN"));
        assert!(!is_named_write_in("LONDON BREED"));
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("MARY-ANN SMITH"), "Mary-Ann Smith");
        assert_eq!(title_case("de la cruz"), "De La Cruz");
        assert_eq!(title_case(""), "");
    }
}
