//! Property tests for ticket numbering.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use raffle::numbering::{NumberingConfig, NumberingMode};
use std::collections::HashSet;

fn sequential() -> impl Strategy<Value = NumberingConfig> {
    (1u32..300, 0u64..10_000, 1u64..50, 0u8..8, "[A-Z]{0,3}", "[A-Z]{0,2}", "[-_ ]?").prop_map(
        |(total, start, step, pad, prefix, suffix, separator)| NumberingConfig {
            total_tickets: total,
            start_number: start,
            step,
            pad_width: pad,
            prefix,
            suffix,
            separator,
            ..NumberingConfig::default()
        },
    )
}

proptest! {
    #[test]
    fn pool_has_one_unique_number_per_ticket(config in sequential()) {
        let numbers = config.generate_all().unwrap();
        prop_assert_eq!(numbers.len(), config.total_tickets as usize);
        let unique: HashSet<&String> = numbers.iter().collect();
        prop_assert_eq!(unique.len(), numbers.len());
    }

    #[test]
    fn preview_is_a_prefix_of_the_pool(config in sequential(), count in 0usize..50) {
        let preview = config.preview(count).unwrap();
        let all = config.generate_all().unwrap();
        prop_assert_eq!(&preview.numbers[..], &all[..count.min(all.len())]);
        prop_assert_eq!(Some(&preview.last), all.last());
        prop_assert_eq!(preview.total, config.total_tickets);
    }

    #[test]
    fn numbers_are_padded_to_width(config in sequential()) {
        let bare = NumberingConfig {
            prefix: String::new(),
            suffix: String::new(),
            ..config
        };
        for number in bare.generate_all().unwrap() {
            prop_assert!(number.chars().count() >= usize::from(bare.pad_width));
            prop_assert!(number.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn permutation_is_a_shuffle_of_the_sequence(config in sequential(), seed in any::<u64>()) {
        let shuffled = NumberingConfig {
            mode: NumberingMode::RandomPermutation,
            seed: Some(seed),
            ..config.clone()
        };
        let mut a = shuffled.generate_all().unwrap();
        let mut b = config.generate_all().unwrap();
        prop_assert_eq!(shuffled.generate_all().unwrap(), a.clone());
        a.sort();
        b.sort();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn template_wraps_every_number(total in 1u32..200, pad in 0u8..6) {
        let config = NumberingConfig {
            mode: NumberingMode::Template,
            template: Some("R-{n}-X".into()),
            pad_width: pad,
            ..NumberingConfig::sequential(total)
        };
        for number in config.generate_all().unwrap() {
            prop_assert!(number.starts_with("R-"));
            prop_assert!(number.ends_with("-X"));
        }
    }
}
