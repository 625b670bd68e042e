//! Date-derived event status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where an event is in time. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Before start, registration window not open
    Upcoming,
    /// Before start, registration open (missing bounds count as open)
    Open,
    /// Between start and end, inclusive
    Ongoing,
    /// After end
    Ended,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Open => "open",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Ended => "ended",
        }
    }

    /// Derive the status at `now` (unix seconds).
    pub fn derive(
        starts_at: i64,
        ends_at: i64,
        registration_opens_at: Option<i64>,
        registration_closes_at: Option<i64>,
        now: i64,
    ) -> Self {
        if now > ends_at {
            EventStatus::Ended
        } else if starts_at <= now {
            EventStatus::Ongoing
        } else if registration_opens_at.map_or(true, |t| t <= now)
            && registration_closes_at.map_or(true, |t| t >= now)
        {
            EventStatus::Open
        } else {
            EventStatus::Upcoming
        }
    }

    /// SQL predicate over the `events` table matching [`EventStatus::derive`].
    ///
    /// `now` is the placeholder bound to the current time, e.g. `"?1"`.
    pub(crate) fn sql_condition(&self, now: &str) -> String {
        match self {
            EventStatus::Ended => format!("events.ends_at < {now}"),
            EventStatus::Ongoing => format!("(events.starts_at <= {now} AND events.ends_at >= {now})"),
            EventStatus::Open => format!(
                "(events.starts_at > {now} AND events.ends_at >= {now} \
                 AND (events.registration_opens_at IS NULL OR events.registration_opens_at <= {now}) \
                 AND (events.registration_closes_at IS NULL OR events.registration_closes_at >= {now}))"
            ),
            EventStatus::Upcoming => format!(
                "(events.starts_at > {now} AND events.ends_at >= {now} \
                 AND ((events.registration_opens_at IS NOT NULL AND events.registration_opens_at > {now}) \
                 OR (events.registration_closes_at IS NOT NULL AND events.registration_closes_at < {now})))"
            ),
        }
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upcoming" => Ok(EventStatus::Upcoming),
            "open" => Ok(EventStatus::Open),
            "ongoing" => Ok(EventStatus::Ongoing),
            "ended" => Ok(EventStatus::Ended),
            other => Err(Error::validation(format!("Unknown status '{}'", other))),
        }
    }
}
