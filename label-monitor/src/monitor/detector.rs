//! Change detection against an in-memory baseline
//!
//! Only the store's current last record is compared. When several records
//! are appended between two ticks a single change is reported; the others
//! are visible only through the fetched window.

use shared::Record;
use std::fmt;
use std::str::FromStr;

/// How the last record is compared with the baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BaselineComparison {
    /// Any difference in the measured data counts as a change (catches
    /// in-place rewrites); the print counter is ignored
    #[default]
    FullRecord,
    /// Only a different primary key counts as a change
    KeyOnly,
}

impl fmt::Display for BaselineComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineComparison::FullRecord => write!(f, "full"),
            BaselineComparison::KeyOnly => write!(f, "key"),
        }
    }
}

impl FromStr for BaselineComparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "record" | "full_record" => Ok(BaselineComparison::FullRecord),
            "key" | "key_only" => Ok(BaselineComparison::KeyOnly),
            other => Err(format!("Unknown baseline comparison: {}", other)),
        }
    }
}

/// Result of comparing a fetched record with the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// No baseline yet
    Missing,
    Same,
    Differs,
}

/// Holds the last observed record
#[derive(Debug, Default)]
pub struct ChangeDetector {
    baseline: Option<Record>,
    comparison: BaselineComparison,
}

impl ChangeDetector {
    pub fn new(comparison: BaselineComparison) -> Self {
        Self {
            baseline: None,
            comparison,
        }
    }

    pub fn baseline(&self) -> Option<&Record> {
        self.baseline.as_ref()
    }

    pub fn compare(&self, current: &Record) -> Comparison {
        match &self.baseline {
            None => Comparison::Missing,
            Some(base) => {
                let same = match self.comparison {
                    BaselineComparison::FullRecord => base.same_reading(current),
                    BaselineComparison::KeyOnly => base.key == current.key,
                };
                if same {
                    Comparison::Same
                } else {
                    Comparison::Differs
                }
            }
        }
    }

    /// Move the baseline to `current`, returning the previous one
    pub fn advance(&mut self, current: Record) -> Option<Record> {
        self.baseline.replace(current)
    }

    /// Forget the baseline; returns whether one was held
    pub fn clear(&mut self) -> bool {
        self.baseline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(key: i64, value: f64) -> Record {
        Record::new(key).with_measurement("Voltage", Some(value))
    }

    #[test]
    fn test_bootstrap_then_compare() {
        let mut d = ChangeDetector::new(BaselineComparison::FullRecord);
        assert_eq!(d.compare(&rec(1, 1.0)), Comparison::Missing);

        d.advance(rec(1, 1.0));
        assert_eq!(d.compare(&rec(1, 1.0)), Comparison::Same);
        assert_eq!(d.compare(&rec(2, 1.0)), Comparison::Differs);
    }

    #[test]
    fn test_same_key_rewritten_in_place() {
        let mut full = ChangeDetector::new(BaselineComparison::FullRecord);
        let mut key_only = ChangeDetector::new(BaselineComparison::KeyOnly);
        full.advance(rec(5, 1.0));
        key_only.advance(rec(5, 1.0));

        assert_eq!(full.compare(&rec(5, 2.0)), Comparison::Differs);
        assert_eq!(key_only.compare(&rec(5, 2.0)), Comparison::Same);
    }

    #[test]
    fn test_print_count_bump_is_not_a_change() {
        let mut d = ChangeDetector::new(BaselineComparison::FullRecord);
        d.advance(rec(3, 1.0));
        assert_eq!(d.compare(&rec(3, 1.0).with_print_count(1)), Comparison::Same);
        assert_eq!(d.compare(&rec(3, 1.5).with_print_count(1)), Comparison::Differs);
    }

    #[test]
    fn test_clear() {
        let mut d = ChangeDetector::default();
        assert!(!d.clear());
        d.advance(rec(1, 1.0));
        assert!(d.clear());
        assert!(d.baseline().is_none());
    }

    #[test]
    fn test_parse_comparison() {
        assert_eq!("KEY".parse::<BaselineComparison>().unwrap(), BaselineComparison::KeyOnly);
        assert_eq!("full".parse::<BaselineComparison>().unwrap(), BaselineComparison::FullRecord);
        assert!("fuzzy".parse::<BaselineComparison>().is_err());
    }
}
