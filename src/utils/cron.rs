//! Minute-resolution cron schedules evaluated in UTC.
//!
//! A rule has five space separated fields: minute, hour, day of month, month
//! and day of week (0 = Sunday). Each field is `*` or a comma separated list
//! of exact values and `*/n` intervals. The aliases `yearly`, `monthly`,
//! `weekly`, `daily`, `hourly` and `minutely` expand to the usual rules.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    /// The rule does not have exactly five fields.
    FieldCount(usize),
    /// A field entry is neither a number nor a `*/n` interval.
    InvalidValue(String),
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronError::FieldCount(n) => write!(f, "cron rule needs 5 fields, got {n}"),
            CronError::InvalidValue(v) => write!(f, "invalid cron value: {v}"),
        }
    }
}

impl std::error::Error for CronError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pat {
    Exact(u32),
    Every(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    List(Vec<Pat>),
}

impl Field {
    fn parse(def: &str) -> Result<Self, CronError> {
        if def == "*" {
            return Ok(Field::Any);
        }
        def.split(',')
            .map(|p| {
                let invalid = || CronError::InvalidValue(p.to_string());
                match p.strip_prefix("*/") {
                    Some(n) => match n.parse::<u32>() {
                        Ok(0) | Err(_) => Err(invalid()),
                        Ok(n) => Ok(Pat::Every(n)),
                    },
                    None => p.parse::<u32>().map(Pat::Exact).map_err(|_| invalid()),
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Field::List)
    }

    fn matches(&self, n: u32) -> bool {
        match self {
            Field::Any => true,
            Field::List(pats) => pats.iter().any(|p| match p {
                Pat::Exact(v) => *v == n,
                Pat::Every(i) => n % i == 0,
            }),
        }
    }
}

/// A parsed cron rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    minute: Field,
    hour: Field,
    date: Field,
    month: Field,
    weekday: Field,
}

impl Schedule {
    pub fn parse(rule: &str) -> Result<Self, CronError> {
        let rule = match rule.trim() {
            "yearly" => "0 0 1 1 *",
            "monthly" => "0 0 1 * *",
            "weekly" => "0 0 * * 0",
            "daily" => "0 0 * * *",
            "hourly" => "0 * * * *",
            "minutely" => "* * * * *",
            other => other,
        };
        let fields: Vec<&str> = rule.split_whitespace().collect();
        let [minute, hour, date, month, weekday] = fields.as_slice() else {
            return Err(CronError::FieldCount(fields.len()));
        };
        Ok(Self {
            minute: Field::parse(minute)?,
            hour: Field::parse(hour)?,
            date: Field::parse(date)?,
            month: Field::parse(month)?,
            weekday: Field::parse(weekday)?,
        })
    }

    /// Whether the rule fires in the minute containing `t`.
    #[must_use]
    pub fn matches(&self, t: &DateTime<Utc>) -> bool {
        self.month.matches(t.month())
            && self.date.matches(t.day())
            && self.weekday.matches(t.weekday().num_days_from_sunday())
            && self.hour.matches(t.hour())
            && self.minute.matches(t.minute())
    }
}

impl FromStr for Schedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Schedule::parse(s)
    }
}

/// Handle to a running cron job.
#[derive(Debug, Clone)]
pub struct CronHandle {
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl CronHandle {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Stop the job. It exits within a second.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

const TICK: Duration = Duration::from_secs(1);

/// Run `action` on a coroutine whenever `rule` matches the current UTC minute.
///
/// The rule is evaluated immediately and then once for every new minute.
pub fn cron<F>(rule: &str, action: F) -> Result<CronHandle, CronError>
where
    F: Fn() + Send + 'static,
{
    let schedule = Schedule::parse(rule)?;
    let handle = CronHandle {
        paused: Arc::new(AtomicBool::new(false)),
        cancelled: Arc::new(AtomicBool::new(false)),
    };
    let job = handle.clone();
    let rule = rule.to_string();
    may::go!(move || {
        let mut last_minute = None;
        while !job.cancelled.load(Ordering::Relaxed) {
            let now = Utc::now();
            let minute = now.timestamp() / 60;
            if last_minute != Some(minute) {
                last_minute = Some(minute);
                if !job.is_paused() && schedule.matches(&now) {
                    debug!(rule = %rule, "cron job firing");
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(&action)).is_err() {
                        warn!(rule = %rule, "cron job panicked");
                    }
                }
            }
            may::coroutine::sleep(TICK);
        }
        debug!(rule = %rule, "cron job cancelled");
    });
    Ok(handle)
}
