//! Small helpers shared across the crate: event registries, terminal colours,
//! byte/time units, key-value strings, random ids and cron schedules.

pub mod ansi;
mod cron;
mod event;
mod kv;
mod units;

pub use cron::{cron, CronError, CronHandle, Schedule};
pub use event::{Event, EventController, Registry};
pub use kv::{build_kv, parse_kv, KvValue};
pub use units::{fmt_bytes, DAY, GB, HOUR, KB, MB, MINUTE, MONTH, SECOND, TB, WEEK, YEAR};

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random string over `[0-9a-zA-Z]`, used for short public identifiers.
#[must_use]
pub fn rand_alnum(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
