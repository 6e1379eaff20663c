//! # Raffle Testing
//!
//! Testing utilities for reducers and services of the raffle platform.
//!
//! This crate provides:
//! - [`FixedClock`] and [`test_clock`] for deterministic timestamps
//! - [`ReducerTest`], a Given-When-Then builder for reducers
//! - Effect assertion helpers in [`assertions`]
//!
//! ## Example
//!
//! ```ignore
//! use raffle_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(TicketReducer::new())
//!     .with_env(TicketEnvironment::new(Arc::new(test_clock()), notifier))
//!     .given_state(state)
//!     .when_action(TicketAction::RejectTickets { ticket_ids })
//!     .then_state(|state| assert_eq!(state.get(&id).unwrap().status, TicketStatus::Available))
//!     .run();
//! ```

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use raffle_core::environment::Clock;

mod reducer_test;

pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until [`FixedClock::advance`] is called, which
    /// lets expiry and retention tests move time forward explicitly.
    #[derive(Debug)]
    pub struct FixedClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward by `by`.
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }

        /// Set the clock to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            if let Ok(mut time) = self.time.lock() {
                *time = to;
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot
    /// happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{test_clock, FixedClock};
