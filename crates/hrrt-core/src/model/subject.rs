use std::fmt;

use crate::grammar::ParsedName;

/// Uppercase and keep only ASCII letters and digits.
pub fn clean_name(value: &str) -> String {
    value
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Identity of a subject: the cleaned name triplet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectKey {
    pub name_last: String,
    pub name_first: String,
    pub history: String,
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.name_last, self.name_first, self.history)
    }
}

/// A scanned person. Immutable once created.
#[derive(Debug, Clone)]
pub struct Subject {
    name_last: String,
    name_first: String,
    history: String,
}

impl Subject {
    pub fn new(name_last: &str, name_first: &str, history: &str) -> Self {
        Self {
            name_last: name_last.trim().to_uppercase(),
            name_first: name_first.trim().to_uppercase(),
            history: history.trim().to_uppercase(),
        }
    }

    pub fn from_parsed(parsed: &ParsedName) -> Self {
        Self::new(&parsed.name_last, &parsed.name_first, &parsed.history)
    }

    pub fn name_last(&self) -> &str {
        &self.name_last
    }

    pub fn name_first(&self) -> &str {
        &self.name_first
    }

    pub fn history(&self) -> &str {
        &self.history
    }

    pub fn key(&self) -> SubjectKey {
        SubjectKey {
            name_last: clean_name(&self.name_last),
            name_first: clean_name(&self.name_first),
            history: clean_name(&self.history),
        }
    }

    /// `LAST_FIRST_HISTORY` from the cleaned triplet, safe inside file names.
    pub fn file_name_part(&self) -> String {
        let key = self.key();
        format!("{}_{}_{}", key.name_last, key.name_first, key.history)
    }

    /// `LAST-FIRST-HISTORY` from the raw triplet, as the scanner console writes it.
    pub fn acs_name_part(&self) -> String {
        format!("{}-{}-{}", self.name_last, self.name_first, self.history)
    }

    pub fn summary(&self) -> String {
        format!(
            "{:<12} {:<12} {:<12}",
            self.name_last, self.name_first, self.history
        )
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Subject {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("o'Brien-Smith Jr."), "OBRIENSMITHJR");
        assert_eq!(clean_name("1234567"), "1234567");
    }

    #[test]
    fn test_subjects_equal_on_cleaned_triplet() {
        let a = Subject::new("O'Brien", "Mary Ann", "12-34");
        let b = Subject::new("OBRIEN", "MARYANN", "1234");
        assert_eq!(a, b);
        assert_eq!(a.file_name_part(), "OBRIEN_MARYANN_1234");
        assert_eq!(a.acs_name_part(), "O'BRIEN-MARY ANN-12-34");
    }
}
