//! Per-session sequence counters and inbound freshness checks.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use skill_bridge_core::{ClockSkewConfig, ClockSkewPolicy};
use skill_bridge_transport::{VerificationFailure, codec::format_timestamp};

/// Independent outbound and inbound counters.
///
/// Both start at zero and only go back to zero through [`reset`](Self::reset),
/// which the session calls on every transport teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    client: u64,
    server: u64,
}

impl SequenceTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self { client: 0, server: 0 }
    }

    /// Last outbound sequence used.
    #[must_use]
    pub const fn client(&self) -> u64 {
        self.client
    }

    /// Last inbound sequence expected.
    #[must_use]
    pub const fn server(&self) -> u64 {
        self.server
    }

    /// Claim the next outbound sequence.
    pub fn next_client(&mut self) -> u64 {
        self.client += 1;
        self.client
    }

    /// Advance the expected inbound sequence and compare.
    ///
    /// The counter moves even when the check fails, so a gap stays a gap.
    ///
    /// # Errors
    /// Returns a mismatch if `received` is not the expected value.
    pub fn check_server(&mut self, received: u64) -> Result<(), VerificationFailure> {
        self.server += 1;
        if received == self.server {
            Ok(())
        } else {
            Err(VerificationFailure::SequenceMismatch {
                expected: self.server,
                actual: received,
            })
        }
    }

    pub fn reset(&mut self) {
        self.client = 0;
        self.server = 0;
    }
}

/// Check an inbound timestamp against the configured freshness window.
///
/// # Errors
/// Returns a failure if the timestamp does not parse or falls outside the window.
pub fn check_timestamp(
    timestamp: &str,
    now: DateTime<Utc>,
    config: &ClockSkewConfig,
) -> Result<(), VerificationFailure> {
    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| VerificationFailure::UnparseableTimestamp {
            timestamp: timestamp.to_string(),
        })?
        .with_timezone(&Utc);

    let tolerance = ChronoDuration::from_std(config.tolerance()).unwrap_or(ChronoDuration::MAX);
    let anchor = match config.policy {
        ClockSkewPolicy::ReceiverClock => now,
        ClockSkewPolicy::ParseOnly => parsed,
    };

    let lower = anchor
        .checked_sub_signed(tolerance)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let upper = anchor
        .checked_add_signed(tolerance)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    if parsed >= lower && parsed <= upper {
        Ok(())
    } else {
        Err(VerificationFailure::ClockSkew {
            timestamp: timestamp.to_string(),
            now: format_timestamp(now),
            tolerance_minutes: config.tolerance_ms / 60_000,
        })
    }
}
