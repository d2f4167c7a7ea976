use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::dates::DateLocale;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_endpoint: String,
    pub access_token: Option<String>,
    pub page_size: u32,
    pub locale: DateLocale,
    pub revalidate: Duration,
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
    pub port: u16,
    pub is_development: bool,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_endpoint = lookup("PRISMIC_API_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("PRISMIC_API_ENDPOINT"))?;

        let page_size: u32 = parse_or(&lookup, "POSTS_PAGE_SIZE", 1)?;
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                name: "POSTS_PAGE_SIZE",
                value: "0".to_string(),
            });
        }

        let revalidate_secs: u64 = parse_or(&lookup, "REVALIDATE_SECS", 60 * 30)?;
        if revalidate_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "REVALIDATE_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            api_endpoint,
            access_token: lookup("PRISMIC_ACCESS_TOKEN").filter(|v| !v.is_empty()),
            page_size,
            locale: parse_or(&lookup, "DATE_LOCALE", DateLocale::PtBr)?,
            revalidate: Duration::from_secs(revalidate_secs),
            template_dir: lookup("TEMPLATE_DIR")
                .unwrap_or_else(|| "templates".to_string())
                .into(),
            static_dir: lookup("STATIC_DIR")
                .unwrap_or_else(|| "static".to_string())
                .into(),
            port: parse_or(&lookup, "PORT", 8080)?,
            is_development: lookup("RUST_ENV").is_some_and(|v| v == "development"),
        })
    }
}
