//! Event enums and input types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($s => Ok($name::$variant),)+
                    other => Err(Error::validation(format!(concat!("Unknown ", $what, " '{}'"), other))),
                }
            }
        }
    };
}

text_enum!(
    /// What kind of gathering an event is.
    EventType, "event type" {
        Hackathon => "hackathon",
        Conference => "conference",
        Meetup => "meetup",
        Workshop => "workshop",
        Other => "other",
    }
);

text_enum!(
    /// Where attendees take part.
    EventFormat, "event format" {
        InPerson => "in_person",
        Virtual => "virtual",
        Hybrid => "hybrid",
    }
);

text_enum!(
    /// How the event entered the system.
    EventSource, "event source" {
        Manual => "manual",
        Luma => "luma",
    }
);

impl Default for EventType {
    fn default() -> Self {
        EventType::Other
    }
}

impl Default for EventFormat {
    fn default() -> Self {
        EventFormat::InPerson
    }
}

/// Input for [`crate::events::EventService::create_event`].
///
/// Timestamps are unix seconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub format: EventFormat,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    #[serde(default)]
    pub registration_opens_at: Option<i64>,
    #[serde(default)]
    pub registration_closes_at: Option<i64>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

#[cfg(test)]
impl NewEvent {
    /// A one-day meetup a week from now.
    pub(crate) fn sample(title: &str, organization_id: Option<&str>) -> Self {
        let starts_at = crate::time::now_timestamp() + 7 * 86_400;
        Self {
            title: title.to_string(),
            event_type: EventType::Meetup,
            city: Some("Lima".to_string()),
            starts_at,
            ends_at: starts_at + 3 * 3600,
            organization_id: organization_id.map(str::to_string),
            ..Default::default()
        }
    }
}

/// Editable event fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<EventType>,
    pub format: Option<EventFormat>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub url: Option<String>,
    pub cover_url: Option<String>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub registration_opens_at: Option<i64>,
    pub registration_closes_at: Option<i64>,
}

/// Title must be non-empty and at most [`MAX_TITLE_LEN`] characters.
pub(crate) fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::validation("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

/// The event may not end before it starts, and the registration window may
/// not close before it opens.
pub(crate) fn validate_dates(
    starts_at: i64,
    ends_at: i64,
    registration_opens_at: Option<i64>,
    registration_closes_at: Option<i64>,
) -> Result<()> {
    if ends_at < starts_at {
        return Err(Error::validation("Event cannot end before it starts"));
    }
    if let (Some(opens), Some(closes)) = (registration_opens_at, registration_closes_at) {
        if closes < opens {
            return Err(Error::validation("Registration cannot close before it opens"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_strings() {
        assert_eq!(EventFormat::InPerson.as_str(), "in_person");
        assert_eq!("hybrid".parse::<EventFormat>().unwrap(), EventFormat::Hybrid);
        assert_eq!("luma".parse::<EventSource>().unwrap(), EventSource::Luma);
        assert!("party".parse::<EventType>().is_err());
        assert_eq!(
            serde_json::to_string(&EventType::Hackathon).unwrap(),
            "\"hackathon\""
        );
    }

    #[test]
    fn test_validation() {
        assert!(validate_title("Rust Lima").is_ok());
        assert!(validate_title("  ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
        assert!(validate_dates(10, 10, None, None).is_ok());
        assert!(validate_dates(10, 9, None, None).is_err());
        assert!(validate_dates(10, 20, Some(5), Some(4)).is_err());
    }
}
