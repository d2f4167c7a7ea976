use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Locale, Utc};
use tracing::warn;

use crate::error::ConfigError;

/// Locale used for month names on rendered dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateLocale {
    #[default]
    PtBr,
    EnUs,
}

impl DateLocale {
    fn chrono_locale(self) -> Locale {
        match self {
            DateLocale::PtBr => Locale::pt_BR,
            DateLocale::EnUs => Locale::en_US,
        }
    }

    /// Value for the `lang` attribute of the layout.
    pub fn html_lang(self) -> &'static str {
        match self {
            DateLocale::PtBr => "pt-BR",
            DateLocale::EnUs => "en-US",
        }
    }
}

impl FromStr for DateLocale {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "pt-br" | "pt" => Ok(DateLocale::PtBr),
            "en-us" | "en" => Ok(DateLocale::EnUs),
            _ => Err(ConfigError::Invalid {
                name: "DATE_LOCALE",
                value: s.to_string(),
            }),
        }
    }
}

/// Parses `first_publication_date`. Prismic sends `2021-03-25T19:25:28+0000`.
pub fn parse_publication_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map_err(|e| warn!("Ignoring unparseable publication date {:?}: {}", raw, e))
        .ok()
}

/// Formats as `dd LLL yyyy` in UTC, e.g. `05 mar 2022`.
pub fn format_publication_date(date: &DateTime<FixedOffset>, locale: DateLocale) -> String {
    date.with_timezone(&Utc)
        .format_localized("%d %b %Y", locale.chrono_locale())
        .to_string()
}
