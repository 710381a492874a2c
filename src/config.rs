//! Run configuration

use crate::Args;
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Placeholder for the queried lemma in the endpoint template
pub const LEMMA_PLACEHOLDER: &str = "{lemma}";

/// Final process configuration
///
/// This is the digested form of [`Args`]. Please refer to [`Args`] to know
/// more about individual fields.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,

    /// Search URL template, containing [`LEMMA_PLACEHOLDER`]
    pub endpoint: Box<str>,

    /// Pause before every request
    pub request_delay: Duration,

    /// Subset of the configuration that governs request retries
    pub retry: RetryPolicy,

    /// Which previous records are copied into the new output table
    pub carry_forward: CarryForward,

    /// Truth that a terminal progress bar should be drawn
    pub show_progress: bool,
}
//
impl Config {
    /// Determine process configuration from CLI arguments
    pub(crate) fn new(args: Args) -> Arc<Self> {
        let Args {
            input,
            output,
            endpoint,
            delay_secs,
            retries,
            connection_backoff_secs,
            rate_limit_base_secs,
            rate_limit_scale_secs,
            rate_limit_exhausted_secs,
            drop_stale,
            syslog,
        } = args;
        Arc::new(Self {
            input_path: input,
            output_path: output,
            endpoint,
            request_delay: Duration::from_secs(delay_secs),
            retry: RetryPolicy {
                max_retries: retries,
                connection_backoff: Duration::from_secs(connection_backoff_secs),
                rate_limit_base_secs,
                rate_limit_scale_secs,
                rate_limit_exhausted: Duration::from_secs(rate_limit_exhausted_secs),
            },
            carry_forward: if drop_stale {
                CarryForward::CompleteOnly
            } else {
                CarryForward::All
            },
            // Logs go to stderr otherwise, and would garble the progress bar
            show_progress: syslog,
        })
    }
}

/// Retry and backoff parameters of the request fetcher
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries allowed after the initial attempt
    pub max_retries: u32,

    /// Wait after a connection failure
    pub connection_backoff: Duration,

    /// Fixed part of the rate-limiting wait, in seconds
    pub rate_limit_base_secs: u64,

    /// Variable part of the rate-limiting wait, divided by remaining retries
    pub rate_limit_scale_secs: u64,

    /// Rate-limiting wait when no retries remain
    pub rate_limit_exhausted: Duration,
}
//
impl RetryPolicy {
    /// How long to wait after a rate-limiting response
    ///
    /// The wait shrinks as the number of remaining retries grows, which
    /// makes the last attempts more patient than the first ones.
    pub fn rate_limit_wait(&self, retries_remaining: u32) -> Duration {
        if retries_remaining > 0 {
            Duration::from_secs(
                self.rate_limit_base_secs
                    + self.rate_limit_scale_secs / u64::from(retries_remaining),
            )
        } else {
            self.rate_limit_exhausted
        }
    }
}
//
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            connection_backoff: Duration::from_secs(60),
            rate_limit_base_secs: 10,
            rate_limit_scale_secs: 60,
            rate_limit_exhausted: Duration::from_secs(120),
        }
    }
}

/// Policy for copying records of a previous run into the new output table
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CarryForward {
    /// Copy every previous record verbatim, including incomplete ones
    ///
    /// Incomplete records are retried, so their lemma may end up with two
    /// rows in the output table.
    #[default]
    All,

    /// Only copy records with complete statistics
    CompleteOnly,
}
