//! Ticket numbering configuration.
//!
//! A raffle's numbering config decides how ticket numbers look: a numeric
//! sequence with optional padding, prefix and suffix, a `{n}` template, a
//! seeded shuffle of the sequence, or an explicit list supplied by the
//! organizer. The same formatter powers the dashboard preview and the
//! generation of the ticket pool when a raffle is created.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Widest padding accepted for ticket numbers.
pub const MAX_PAD_WIDTH: u8 = 12;

/// Largest ticket pool a single raffle can hold.
pub const MAX_TOTAL_TICKETS: u32 = 10_000_000;

/// Placeholder replaced by the padded number in template mode.
pub const TEMPLATE_PLACEHOLDER: &str = "{n}";

/// Seed used for `random_permutation` when the config carries none.
const DEFAULT_SEED: u64 = 0x5241_4646_4c45;

/// How ticket numbers are produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberingMode {
    /// `start, start + step, ...` with affixes
    #[default]
    Sequential,
    /// The sequential set, shuffled with a seeded RNG
    RandomPermutation,
    /// `custom_numbers` verbatim
    CustomList,
    /// `template` with `{n}` replaced by the padded number
    Template,
}

/// Numbering configuration stored with each raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    /// Generation mode
    pub mode: NumberingMode,
    /// Size of the ticket pool
    pub total_tickets: u32,
    /// First number of the sequence
    pub start_number: u64,
    /// Distance between consecutive numbers
    pub step: u64,
    /// Minimum width of the numeric part; 0 disables padding
    pub pad_width: u8,
    /// Character used for left padding
    pub pad_char: char,
    /// Text before the number
    pub prefix: String,
    /// Text after the number
    pub suffix: String,
    /// Joins prefix, number and suffix (only the non-empty ones)
    pub separator: String,
    /// Template for `template` mode
    pub template: Option<String>,
    /// Numbers for `custom_list` mode
    pub custom_numbers: Vec<String>,
    /// Shuffle seed for `random_permutation` mode
    pub seed: Option<u64>,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            mode: NumberingMode::Sequential,
            total_tickets: 100,
            start_number: 1,
            step: 1,
            pad_width: 0,
            pad_char: '0',
            prefix: String::new(),
            suffix: String::new(),
            separator: String::new(),
            template: None,
            custom_numbers: Vec::new(),
            seed: None,
        }
    }
}

/// Reasons a numbering configuration cannot be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumberingError {
    /// `total_tickets` is zero
    #[error("Raffle must have at least one ticket")]
    NoTickets,

    /// `total_tickets` exceeds [`MAX_TOTAL_TICKETS`]
    #[error("Raffle cannot have more than {max} tickets (got {actual})")]
    TooManyTickets {
        /// Limit
        max: u32,
        /// Requested
        actual: u32,
    },

    /// `step` is zero
    #[error("Step must be greater than zero")]
    ZeroStep,

    /// `pad_width` exceeds [`MAX_PAD_WIDTH`]
    #[error("Padding width cannot exceed {MAX_PAD_WIDTH} (got {0})")]
    PadWidthTooLarge(u8),

    /// Template mode without a `{n}` placeholder
    #[error("Template must contain the {{n}} placeholder")]
    MissingPlaceholder,

    /// Custom list length differs from `total_tickets`
    #[error("Custom list has {actual} numbers but the raffle has {expected} tickets")]
    CustomListSize {
        /// `total_tickets`
        expected: u32,
        /// Entries supplied
        actual: usize,
    },

    /// Custom list repeats a number
    #[error("Custom list contains duplicate number: {0}")]
    DuplicateNumber(String),

    /// Custom list contains an empty entry
    #[error("Custom list contains an empty number")]
    EmptyNumber,

    /// The last number does not fit in 64 bits
    #[error("Numbering sequence overflows")]
    Overflow,
}

/// First numbers of a configuration plus the last one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingPreview {
    /// First `min(count, total)` numbers in pool order
    pub numbers: Vec<String>,
    /// Last number of the pool
    pub last: String,
    /// Pool size
    pub total: u32,
}

impl NumberingConfig {
    /// Sequential config with the given pool size and defaults elsewhere.
    #[must_use]
    pub fn sequential(total_tickets: u32) -> Self {
        Self {
            total_tickets,
            ..Self::default()
        }
    }

    /// Check the configuration without generating numbers.
    ///
    /// # Errors
    ///
    /// Returns the first [`NumberingError`] found.
    pub fn validate(&self) -> Result<(), NumberingError> {
        if self.total_tickets == 0 {
            return Err(NumberingError::NoTickets);
        }
        if self.total_tickets > MAX_TOTAL_TICKETS {
            return Err(NumberingError::TooManyTickets {
                max: MAX_TOTAL_TICKETS,
                actual: self.total_tickets,
            });
        }
        if self.pad_width > MAX_PAD_WIDTH {
            return Err(NumberingError::PadWidthTooLarge(self.pad_width));
        }

        match self.mode {
            NumberingMode::CustomList => self.validate_custom_list(),
            NumberingMode::Template => {
                let has_placeholder = self
                    .template
                    .as_deref()
                    .is_some_and(|t| t.contains(TEMPLATE_PLACEHOLDER));
                if !has_placeholder {
                    return Err(NumberingError::MissingPlaceholder);
                }
                self.validate_sequence()
            },
            NumberingMode::Sequential | NumberingMode::RandomPermutation => {
                self.validate_sequence()
            },
        }
    }

    fn validate_sequence(&self) -> Result<(), NumberingError> {
        if self.step == 0 {
            return Err(NumberingError::ZeroStep);
        }
        self.number_at(self.total_tickets - 1).map(|_| ())
    }

    fn validate_custom_list(&self) -> Result<(), NumberingError> {
        let expected = self.total_tickets;
        if self.custom_numbers.len() != expected as usize {
            return Err(NumberingError::CustomListSize {
                expected,
                actual: self.custom_numbers.len(),
            });
        }
        let mut seen = HashSet::with_capacity(self.custom_numbers.len());
        for number in &self.custom_numbers {
            let number = number.trim();
            if number.is_empty() {
                return Err(NumberingError::EmptyNumber);
            }
            if !seen.insert(number) {
                return Err(NumberingError::DuplicateNumber(number.to_string()));
            }
        }
        Ok(())
    }

    /// Numeric value of the `index`-th sequence element.
    fn number_at(&self, index: u32) -> Result<u64, NumberingError> {
        self.step
            .checked_mul(u64::from(index))
            .and_then(|offset| self.start_number.checked_add(offset))
            .ok_or(NumberingError::Overflow)
    }

    fn pad(&self, number: u64) -> String {
        let digits = number.to_string();
        let width = usize::from(self.pad_width);
        let missing = width.saturating_sub(digits.chars().count());
        let mut padded = String::with_capacity(digits.len() + missing);
        padded.extend(std::iter::repeat_n(self.pad_char, missing));
        padded.push_str(&digits);
        padded
    }

    /// Formats one sequence number according to the mode.
    fn format_number(&self, number: u64) -> String {
        let padded = self.pad(number);
        match (self.mode, self.template.as_deref()) {
            (NumberingMode::Template, Some(template)) => {
                template.replace(TEMPLATE_PLACEHOLDER, &padded)
            },
            _ => [self.prefix.as_str(), padded.as_str(), self.suffix.as_str()]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(&self.separator),
        }
    }

    /// Sequence indexes in pool order.
    fn order(&self) -> Vec<u32> {
        let mut indexes: Vec<u32> = (0..self.total_tickets).collect();
        if self.mode == NumberingMode::RandomPermutation {
            let mut rng = StdRng::seed_from_u64(self.seed.unwrap_or(DEFAULT_SEED));
            indexes.shuffle(&mut rng);
        }
        indexes
    }

    /// Format the first `count` numbers of the pool plus the last one.
    ///
    /// # Errors
    ///
    /// Returns a [`NumberingError`] if the configuration is invalid.
    pub fn preview(&self, count: usize) -> Result<NumberingPreview, NumberingError> {
        self.validate()?;

        if self.mode == NumberingMode::CustomList {
            let numbers = self
                .custom_numbers
                .iter()
                .take(count)
                .map(|n| n.trim().to_string())
                .collect();
            let last = self
                .custom_numbers
                .last()
                .map(|n| n.trim().to_string())
                .unwrap_or_default();
            return Ok(NumberingPreview {
                numbers,
                last,
                total: self.total_tickets,
            });
        }

        // Only a shuffled pool needs the full order; the others are indexed directly.
        let (head, last_index) = if self.mode == NumberingMode::RandomPermutation {
            let order = self.order();
            let last = order.last().copied();
            (order.into_iter().take(count).collect::<Vec<u32>>(), last)
        } else {
            let shown = u32::try_from(count).unwrap_or(u32::MAX).min(self.total_tickets);
            (
                (0..shown).collect::<Vec<u32>>(),
                self.total_tickets.checked_sub(1),
            )
        };

        let numbers = head
            .into_iter()
            .map(|index| self.number_at(index).map(|n| self.format_number(n)))
            .collect::<Result<Vec<_>, _>>()?;
        let last = match last_index {
            Some(index) => self.format_number(self.number_at(index)?),
            None => String::new(),
        };

        Ok(NumberingPreview {
            numbers,
            last,
            total: self.total_tickets,
        })
    }

    /// Format every ticket number of the pool, in pool order.
    ///
    /// # Errors
    ///
    /// Returns a [`NumberingError`] if the configuration is invalid.
    pub fn generate_all(&self) -> Result<Vec<String>, NumberingError> {
        self.validate()?;

        if self.mode == NumberingMode::CustomList {
            return Ok(self
                .custom_numbers
                .iter()
                .map(|n| n.trim().to_string())
                .collect());
        }

        self.order()
            .into_iter()
            .map(|index| self.number_at(index).map(|n| self.format_number(n)))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn padded(width: u8) -> NumberingConfig {
        NumberingConfig {
            pad_width: width,
            ..NumberingConfig::sequential(100)
        }
    }

    #[test]
    fn pads_to_width() {
        let preview = padded(5).preview(3).unwrap();
        assert_eq!(preview.numbers, vec!["00001", "00002", "00003"]);
        assert_eq!(preview.last, "00100");
        assert_eq!(preview.total, 100);
    }

    #[test]
    fn sequential_preview_of_the_largest_pool_reads_only_the_shown_numbers() {
        let config = NumberingConfig {
            start_number: 0,
            pad_width: 8,
            ..NumberingConfig::sequential(MAX_TOTAL_TICKETS)
        };
        let preview = config.preview(2).unwrap();
        assert_eq!(preview.numbers, vec!["00000000", "00000001"]);
        assert_eq!(preview.last, format!("{:08}", MAX_TOTAL_TICKETS - 1));
        assert_eq!(preview.total, MAX_TOTAL_TICKETS);
    }

    #[test]
    fn template_preview_shows_fewer_numbers_than_requested_for_small_pools() {
        let config = NumberingConfig {
            mode: NumberingMode::Template,
            template: Some("R-{n}".into()),
            ..NumberingConfig::sequential(2)
        };
        let preview = config.preview(10).unwrap();
        assert_eq!(preview.numbers, vec!["R-1", "R-2"]);
        assert_eq!(preview.last, "R-2");
    }

    #[test]
    fn prefix_joined_with_separator() {
        let config = NumberingConfig {
            prefix: "TKT".into(),
            separator: "-".into(),
            ..padded(5)
        };
        assert_eq!(config.preview(1).unwrap().numbers, vec!["TKT-00001"]);
    }

    #[test]
    fn prefix_and_suffix_joined_with_separator() {
        let config = NumberingConfig {
            prefix: "TKT".into(),
            suffix: "A".into(),
            separator: "-".into(),
            ..padded(5)
        };
        assert_eq!(config.preview(1).unwrap().numbers, vec!["TKT-00001-A"]);
    }

    #[test]
    fn separator_ignored_without_affixes() {
        let config = NumberingConfig {
            separator: "-".into(),
            ..padded(3)
        };
        assert_eq!(config.preview(1).unwrap().numbers, vec!["001"]);
    }

    #[test]
    fn start_and_step_apply() {
        let config = NumberingConfig {
            start_number: 10,
            step: 5,
            ..NumberingConfig::sequential(4)
        };
        let preview = config.preview(10).unwrap();
        assert_eq!(preview.numbers, vec!["10", "15", "20", "25"]);
        assert_eq!(preview.last, "25");
    }

    #[test]
    fn custom_pad_char() {
        let config = NumberingConfig {
            pad_char: '*',
            ..padded(4)
        };
        assert_eq!(config.preview(1).unwrap().numbers, vec!["***1"]);
    }

    #[test]
    fn number_wider_than_pad_is_untouched() {
        let config = NumberingConfig {
            start_number: 123_456,
            ..padded(3)
        };
        assert_eq!(config.preview(1).unwrap().numbers, vec!["123456"]);
    }

    #[test]
    fn template_substitutes_padded_number() {
        let config = NumberingConfig {
            mode: NumberingMode::Template,
            template: Some("RIFA-{n}-2025".into()),
            ..padded(3)
        };
        let preview = config.preview(2).unwrap();
        assert_eq!(preview.numbers, vec!["RIFA-001-2025", "RIFA-002-2025"]);
        assert_eq!(preview.last, "RIFA-100-2025");
    }

    #[test]
    fn template_requires_placeholder() {
        let config = NumberingConfig {
            mode: NumberingMode::Template,
            template: Some("RIFA".into()),
            ..padded(3)
        };
        assert_eq!(config.validate(), Err(NumberingError::MissingPlaceholder));
    }

    #[test]
    fn custom_list_used_verbatim() {
        let config = NumberingConfig {
            mode: NumberingMode::CustomList,
            custom_numbers: vec!["A1".into(), "B7".into(), "Z9".into()],
            ..NumberingConfig::sequential(3)
        };
        let preview = config.preview(2).unwrap();
        assert_eq!(preview.numbers, vec!["A1", "B7"]);
        assert_eq!(preview.last, "Z9");
        assert_eq!(config.generate_all().unwrap().len(), 3);
    }

    #[test]
    fn custom_list_must_match_total() {
        let config = NumberingConfig {
            mode: NumberingMode::CustomList,
            custom_numbers: vec!["1".into(), "2".into()],
            ..NumberingConfig::sequential(3)
        };
        assert_eq!(
            config.validate(),
            Err(NumberingError::CustomListSize {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn custom_list_rejects_duplicates() {
        let config = NumberingConfig {
            mode: NumberingMode::CustomList,
            custom_numbers: vec!["1".into(), "2".into(), " 1 ".into()],
            ..NumberingConfig::sequential(3)
        };
        assert_eq!(
            config.validate(),
            Err(NumberingError::DuplicateNumber("1".into()))
        );
    }

    #[test]
    fn random_permutation_is_seeded() {
        let config = NumberingConfig {
            mode: NumberingMode::RandomPermutation,
            seed: Some(42),
            ..padded(3)
        };
        let first = config.generate_all().unwrap();
        let second = config.generate_all().unwrap();
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, padded(3).generate_all().unwrap());
        assert_ne!(first, sorted);
    }

    #[test]
    fn rejects_invalid_configs() {
        assert_eq!(
            NumberingConfig::sequential(0).validate(),
            Err(NumberingError::NoTickets)
        );
        assert_eq!(
            NumberingConfig {
                step: 0,
                ..NumberingConfig::sequential(10)
            }
            .validate(),
            Err(NumberingError::ZeroStep)
        );
        assert_eq!(padded(13).validate(), Err(NumberingError::PadWidthTooLarge(13)));
        assert_eq!(
            NumberingConfig {
                start_number: u64::MAX,
                ..NumberingConfig::sequential(2)
            }
            .validate(),
            Err(NumberingError::Overflow)
        );
    }

    #[test]
    fn deserializes_partial_json() {
        let config: NumberingConfig = serde_json::from_value(serde_json::json!({
            "mode": "sequential",
            "total_tickets": 500,
            "pad_width": 3,
            "prefix": "N",
            "separator": "#"
        }))
        .unwrap();
        assert_eq!(config.start_number, 1);
        assert_eq!(config.preview(1).unwrap().numbers, vec!["N#001"]);
    }
}
