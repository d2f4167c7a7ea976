use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer};

use crate::dates::parse_publication_date;
use crate::rich_text::RichText;

/// Treats an explicit `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A document as returned by the Prismic search API.
#[derive(Deserialize, Debug, Clone)]
#[serde(bound(deserialize = "D: Deserialize<'de> + Default"))]
pub struct RawDocument<D> {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type", default)]
    pub doc_type: String,
    #[serde(default)]
    pub first_publication_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: D,
}

/// One page of search results. `next_page` is the opaque URL of the following page.
#[derive(Deserialize, Debug, Clone)]
#[serde(bound(deserialize = "D: Deserialize<'de> + Default"))]
pub struct SearchPage<D> {
    #[serde(default)]
    pub results: Vec<RawDocument<D>>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Fields fetched for the post list.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SummaryFields {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtitle: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ImageField {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RawContentBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub heading: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: RichText,
}

/// Fields of a full post document.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DetailFields {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtitle: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub banner: ImageField,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<RawContentBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostSummary {
    pub id: Option<String>,
    pub publication_date: Option<DateTime<FixedOffset>>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

impl From<RawDocument<SummaryFields>> for PostSummary {
    fn from(doc: RawDocument<SummaryFields>) -> Self {
        Self {
            publication_date: doc
                .first_publication_date
                .as_deref()
                .and_then(parse_publication_date),
            id: doc.uid,
            title: doc.data.title,
            subtitle: doc.data.subtitle,
            author: doc.data.author,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub url: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub heading: String,
    pub body: RichText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub uid: Option<String>,
    pub publication_date: Option<DateTime<FixedOffset>>,
    pub title: String,
    pub subtitle: String,
    pub banner: Option<Banner>,
    pub author: String,
    pub content: Vec<ContentBlock>,
}

impl From<RawDocument<DetailFields>> for PostDetail {
    fn from(doc: RawDocument<DetailFields>) -> Self {
        let DetailFields {
            title,
            subtitle,
            author,
            banner,
            content,
        } = doc.data;

        Self {
            publication_date: doc
                .first_publication_date
                .as_deref()
                .and_then(parse_publication_date),
            uid: doc.uid,
            title,
            subtitle,
            banner: banner.url.map(|url| Banner {
                url,
                alt: banner.alt,
            }),
            author,
            content: content
                .into_iter()
                .map(|block| ContentBlock {
                    heading: block.heading,
                    body: block.body,
                })
                .collect(),
        }
    }
}
