//! Number candidates from raw recognizer text
//!
//! Three shapes are recognized, tried in this order at every position of the
//! text (leftmost-first alternation, so results come out in reading order):
//!
//! 1. grouped decimal, `123.456.789`
//! 2. single decimal with one or two fraction digits, `123.45`
//! 3. bare integer, `42`
//!
//! Comma separators are normalized to `.` before validation.

use crate::config::{ExtractorConfig, ValidationRange};
use crate::Result;
use regex::Regex;
use std::collections::HashSet;

const NUMBER_PATTERN: &str = r"\d+(?:[.,]\d+){2,}|\d+[.,]\d{1,2}\b|\d+";

/// Shape of a matched candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Two or more separators (digit groups)
    Grouped,
    /// One separator, one or two fraction digits
    Decimal,
    /// Digits only
    Integer,
}

/// A normalized number candidate, not yet range-checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub kind: CandidateKind,
}

impl Candidate {
    /// Numeric value used for range validation
    ///
    /// Grouped candidates are read as digit-grouped integers, so
    /// `1.234.567` is 1234567.
    pub fn value(&self) -> Option<f64> {
        let value = match self.kind {
            CandidateKind::Grouped => self.text.replace('.', "").parse::<f64>().ok()?,
            CandidateKind::Decimal | CandidateKind::Integer => self.text.parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Compiled number patterns
#[derive(Debug, Clone)]
pub struct NumberParser {
    pattern: Regex,
}

impl NumberParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(NUMBER_PATTERN)?,
        })
    }

    /// All candidates in reading order, separators normalized
    ///
    /// Bare integers shorter than `min_integer_digits` are skipped.
    pub fn candidates(&self, raw: &str, min_integer_digits: usize) -> Vec<Candidate> {
        self.pattern
            .find_iter(raw)
            .filter_map(|m| {
                let text = m.as_str().replace(',', ".");
                let kind = match text.matches('.').count() {
                    0 => CandidateKind::Integer,
                    1 => CandidateKind::Decimal,
                    _ => CandidateKind::Grouped,
                };
                if kind == CandidateKind::Integer && text.len() < min_integer_digits {
                    return None;
                }
                Some(Candidate { text, kind })
            })
            .collect()
    }

    /// Range-checked, de-duplicated numbers found in `raw`
    pub fn parse(&self, raw: &str, config: &ExtractorConfig) -> Vec<String> {
        let candidates = self.candidates(raw, config.min_integer_digits);
        validate(candidates, &config.valid_range)
    }
}

/// Keep candidates inside `range`, dropping repeats while preserving first-seen order
pub fn validate(candidates: Vec<Candidate>, range: &ValidationRange) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| c.value().is_some_and(|v| range.contains(v)))
        .filter_map(|c| seen.insert(c.text.clone()).then_some(c.text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(candidates: Vec<Candidate>) -> Vec<String> {
        candidates.into_iter().map(|c| c.text).collect()
    }

    #[test]
    fn test_precedence_keeps_reading_order() {
        let parser = NumberParser::new().unwrap();
        let found = parser.candidates("123.45 7 200.123.456", 1);
        assert_eq!(texts(found.clone()), vec!["123.45", "7", "200.123.456"]);
        assert_eq!(
            found.iter().map(|c| c.kind).collect::<Vec<_>>(),
            vec![
                CandidateKind::Decimal,
                CandidateKind::Integer,
                CandidateKind::Grouped
            ]
        );
    }

    #[test]
    fn test_single_digits_need_lower_minimum() {
        let parser = NumberParser::new().unwrap();
        let found = parser.candidates("123.45 7 200.123.456", 2);
        assert_eq!(texts(found), vec!["123.45", "200.123.456"]);
    }

    #[test]
    fn test_three_fraction_digits_are_not_a_decimal() {
        let parser = NumberParser::new().unwrap();
        assert_eq!(texts(parser.candidates("123.456", 2)), vec!["123", "456"]);
    }

    #[test]
    fn test_comma_is_normalized() {
        let parser = NumberParser::new().unwrap();
        assert_eq!(texts(parser.candidates("87,5", 2)), vec!["87.5"]);
        assert_eq!(texts(parser.candidates("1,234,567", 2)), vec!["1.234.567"]);
    }

    #[test]
    fn test_range_boundary() {
        let parser = NumberParser::new().unwrap();
        let config = ExtractorConfig::default().with_valid_range(ValidationRange::METER);
        assert_eq!(parser.parse("200", &config), vec!["200"]);
        assert!(parser.parse("200.01", &config).is_empty());
    }

    #[test]
    fn test_duplicates_removed_in_order() {
        let parser = NumberParser::new().unwrap();
        let config = ExtractorConfig::default();
        assert_eq!(parser.parse("12 12 34", &config), vec!["12", "34"]);
    }

    #[test]
    fn test_grouped_value_uses_digit_groups() {
        let parser = NumberParser::new().unwrap();
        let wide = ExtractorConfig::default().with_valid_range(ValidationRange::WIDE);
        assert_eq!(parser.parse("12.345.6", &wide), vec!["12.345.6"]);
        assert!(parser.parse("123.456.789", &wide).is_empty());
    }

    #[test]
    fn test_noise_yields_nothing() {
        let parser = NumberParser::new().unwrap();
        assert!(parser.parse("", &ExtractorConfig::default()).is_empty());
        assert!(parser.parse(".,. ,", &ExtractorConfig::default()).is_empty());
    }
}
