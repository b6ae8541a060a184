//! Unique user names
//!
//! `NameRegistry` hands out first names that are not currently in use and
//! takes them back when their user leaves. Where the candidates come from is
//! behind the `NameSource` trait so tests can drive collisions.

use std::collections::HashSet;

use rand::seq::SliceRandom;

/// Random draws attempted before falling back to a numbered name
const MAX_RANDOM_DRAWS: usize = 64;

/// Embedded pool of first names, one per line
const FIRST_NAMES: &str = include_str!("first_names.txt");

/// Supplier of candidate names
pub trait NameSource {
    /// Produce the next candidate; may repeat earlier values
    fn next_name(&mut self) -> String;
}

/// Random first names sampled from the embedded pool
#[derive(Debug, Clone)]
pub struct FirstNames {
    pool: Vec<&'static str>,
}

impl FirstNames {
    pub fn new() -> Self {
        let pool = FIRST_NAMES
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        Self { pool }
    }

    /// Number of distinct names in the pool
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}

impl Default for FirstNames {
    fn default() -> Self {
        Self::new()
    }
}

impl NameSource for FirstNames {
    fn next_name(&mut self) -> String {
        self.pool
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("Guest")
            .to_string()
    }
}

/// Set of names currently held by connected users
///
/// `allocate` never returns a name that is already held, and it records the
/// name before returning it.
pub struct NameRegistry<S = FirstNames> {
    source: S,
    allocated: HashSet<String>,
}

impl NameRegistry<FirstNames> {
    /// Create a registry drawing from the embedded first-name pool
    pub fn new() -> Self {
        Self::with_source(FirstNames::new())
    }
}

impl Default for NameRegistry<FirstNames> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NameSource> NameRegistry<S> {
    /// Create a registry drawing candidates from `source`
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            allocated: HashSet::new(),
        }
    }

    /// Allocate a name no current user holds
    pub fn allocate(&mut self) -> String {
        let mut candidate = self.source.next_name();
        for _ in 1..MAX_RANDOM_DRAWS {
            if !self.allocated.contains(&candidate) {
                break;
            }
            candidate = self.source.next_name();
        }

        if self.allocated.contains(&candidate) {
            // Pool is (nearly) exhausted: number the last draw
            let base = candidate;
            let mut n = 2;
            candidate = format!("{}{}", base, n);
            while self.allocated.contains(&candidate) {
                n += 1;
                candidate = format!("{}{}", base, n);
            }
        }

        self.allocated.insert(candidate.clone());
        candidate
    }

    /// Give `name` back. Returns false if it was not allocated.
    pub fn release(&mut self, name: &str) -> bool {
        self.allocated.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.allocated.contains(name)
    }

    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cycles through a fixed list of names
    struct Scripted {
        names: Vec<&'static str>,
        next: usize,
    }

    impl Scripted {
        fn new(names: Vec<&'static str>) -> Self {
            Self { names, next: 0 }
        }
    }

    impl NameSource for Scripted {
        fn next_name(&mut self) -> String {
            let name = self.names[self.next % self.names.len()];
            self.next += 1;
            name.to_string()
        }
    }

    #[test]
    fn test_first_name_has_no_spaces() {
        let mut names = NameRegistry::new();
        for _ in 0..5 {
            let name = names.allocate();
            assert!(!name.is_empty());
            assert!(!name.contains(' '));
        }
    }

    #[test]
    fn test_pool_is_large() {
        assert!(FirstNames::new().pool_size() >= 400);
    }

    #[test]
    fn test_allocations_are_distinct() {
        let mut names = NameRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..600 {
            let name = names.allocate();
            assert!(seen.insert(name.clone()), "duplicate name {}", name);
            assert!(!name.contains(char::is_whitespace));
        }
        assert_eq!(names.len(), 600);
    }

    #[test]
    fn test_collision_retries_next_candidate() {
        let mut names = NameRegistry::with_source(Scripted::new(vec!["Alice", "Alice", "Bob"]));
        assert_eq!(names.allocate(), "Alice");
        assert_eq!(names.allocate(), "Bob");
    }

    #[test]
    fn test_exhausted_source_numbers_names() {
        let mut names = NameRegistry::with_source(Scripted::new(vec!["Alice"]));
        assert_eq!(names.allocate(), "Alice");
        assert_eq!(names.allocate(), "Alice2");
        assert_eq!(names.allocate(), "Alice3");
        assert!(names.release("Alice2"));
        assert_eq!(names.allocate(), "Alice2");
    }

    #[test]
    fn test_release() {
        let mut names = NameRegistry::new();
        let name = names.allocate();
        assert!(names.contains(&name));

        assert!(names.release(&name));
        assert!(!names.contains(&name));

        // Second release is a no-op
        assert!(!names.release(&name));
        assert!(names.is_empty());
    }

    #[test]
    fn test_released_name_can_be_reallocated() {
        let mut names = NameRegistry::with_source(Scripted::new(vec!["Alice"]));
        let name = names.allocate();
        names.release(&name);
        assert_eq!(names.allocate(), name);
    }

    #[test]
    fn test_release_unknown_name() {
        let mut names = NameRegistry::new();
        assert!(!names.release("Nobody"));
    }
}
