use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::error::CmsError;
use crate::models::{DetailFields, RawDocument, SearchPage, SummaryFields};

pub const POST_TYPE: &str = "posts";

const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Opaque position in a paginated result set: the `next_page` URL.
///
/// Prismic echoes the request's `access_token` into `next_page`. Cursors never
/// carry it, since they are handed to browsers; the client adds it back per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(Url);

impl Cursor {
    pub fn parse(raw: &str) -> Result<Self, CmsError> {
        let url = Url::parse(raw).map_err(|e| CmsError::InvalidUrl(format!("{}: {}", raw, e)))?;
        Ok(Cursor(without_access_token(url)))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// A Prismic query predicate, e.g. `[at(document.type, "posts")]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate(String);

impl Predicate {
    pub fn at(path: &str, value: &str) -> Self {
        let quoted = serde_json::Value::String(value.to_string()).to_string();
        Predicate(format!("[at({}, {})]", path, quoted))
    }
}

fn without_access_token(mut url: Url) -> Url {
    if !url.query_pairs().any(|(key, _)| key == ACCESS_TOKEN_PARAM) {
        return url;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(key, _)| key.as_str() != ACCESS_TOKEN_PARAM)
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

fn query_string(predicates: &[Predicate]) -> String {
    let joined: String = predicates.iter().map(|p| p.0.as_str()).collect();
    format!("[{}]", joined)
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub fetch: Vec<String>,
    pub page_size: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ApiInfo {
    #[serde(default)]
    refs: Vec<ApiRef>,
}

#[derive(Deserialize, Debug)]
struct ApiRef {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "isMasterRef", default)]
    is_master_ref: bool,
}

/// Source of follow-up result pages.
#[async_trait]
pub trait PageSource {
    async fn fetch_page(&self, cursor: &Cursor) -> Result<SearchPage<SummaryFields>, CmsError>;
}

/// Lookup of a single post by uid.
#[async_trait]
pub trait DocumentSource {
    async fn post_by_uid(&self, uid: &str) -> Result<RawDocument<DetailFields>, CmsError>;
}

/// Client for the Prismic REST API v2.
#[derive(Clone)]
pub struct PrismicClient {
    http: Client,
    endpoint: Url,
    access_token: Option<String>,
}

impl PrismicClient {
    pub fn new(endpoint: &str, access_token: Option<String>) -> Result<Self, CmsError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| CmsError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        Ok(Self {
            http: Client::new(),
            endpoint,
            access_token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Parses a cursor received from a browser. Only URLs on the CMS origin are accepted.
    pub fn cursor_from(&self, raw: &str) -> Result<Cursor, CmsError> {
        let cursor = Cursor::parse(raw)?;
        if cursor.as_url().origin() != self.endpoint.origin() {
            return Err(CmsError::CrossOriginCursor(raw.to_string()));
        }
        Ok(cursor)
    }

    async fn get_json<T: DeserializeOwned>(&self, mut url: Url) -> Result<T, CmsError> {
        if let Some(token) = &self.access_token {
            if !url.query_pairs().any(|(key, _)| key == ACCESS_TOKEN_PARAM) {
                url.query_pairs_mut().append_pair(ACCESS_TOKEN_PARAM, token);
            }
        }

        debug!("GET {}", url);
        let res = self.http.get(url.clone()).send().await?;
        if !res.status().is_success() {
            return Err(CmsError::Status {
                status: res.status(),
                url: url.to_string(),
            });
        }
        let body = res.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Ref of the currently published content.
    pub async fn master_ref(&self) -> Result<String, CmsError> {
        let info: ApiInfo = self.get_json(self.endpoint.clone()).await?;
        info.refs
            .into_iter()
            .find(|r| r.is_master_ref)
            .map(|r| r.reference)
            .ok_or(CmsError::NoMasterRef)
    }

    pub async fn query<D>(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<SearchPage<D>, CmsError>
    where
        D: DeserializeOwned + Default,
    {
        let master_ref = self.master_ref().await?;
        let url = self.search_url(&master_ref, predicates, options)?;
        self.get_json(url).await
    }

    fn search_url(
        &self,
        master_ref: &str,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<Url, CmsError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CmsError::InvalidUrl(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["documents", "search"]);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("ref", master_ref);
            pairs.append_pair("q", &query_string(predicates));
            if !options.fetch.is_empty() {
                pairs.append_pair("fetch", &options.fetch.join(","));
            }
            if let Some(page_size) = options.page_size {
                pairs.append_pair("pageSize", &page_size.to_string());
            }
        }
        Ok(url)
    }

    pub async fn get_by_uid<D>(&self, doc_type: &str, uid: &str) -> Result<RawDocument<D>, CmsError>
    where
        D: DeserializeOwned + Default,
    {
        let predicate = Predicate::at(&format!("my.{}.uid", doc_type), uid);
        let options = QueryOptions {
            page_size: Some(1),
            ..QueryOptions::default()
        };
        let page: SearchPage<D> = self.query(&[predicate], &options).await?;
        page.results
            .into_iter()
            .next()
            .ok_or_else(|| CmsError::NotFound {
                doc_type: doc_type.to_string(),
                uid: uid.to_string(),
            })
    }

    /// Follows a `next_page` URL. The response has the same shape as a query.
    pub async fn follow<D>(&self, cursor: &Cursor) -> Result<SearchPage<D>, CmsError>
    where
        D: DeserializeOwned + Default,
    {
        self.get_json(cursor.as_url().clone()).await
    }

    /// First page of posts with only the list fields.
    pub async fn post_summaries(&self, page_size: u32) -> Result<SearchPage<SummaryFields>, CmsError> {
        let options = QueryOptions {
            fetch: ["title", "subtitle", "author"]
                .iter()
                .map(|field| format!("{}.{}", POST_TYPE, field))
                .collect(),
            page_size: Some(page_size),
        };
        self.query(&[Predicate::at("document.type", POST_TYPE)], &options)
            .await
    }

    /// Uids of the first page of posts, pre-rendered at startup.
    pub async fn post_uids(&self, page_size: u32) -> Result<Vec<String>, CmsError> {
        let options = QueryOptions {
            fetch: vec![format!("{}.uid", POST_TYPE)],
            page_size: Some(page_size),
        };
        let page: SearchPage<SummaryFields> = self
            .query(&[Predicate::at("document.type", POST_TYPE)], &options)
            .await?;
        Ok(page.results.into_iter().filter_map(|doc| doc.uid).collect())
    }
}

#[async_trait]
impl PageSource for PrismicClient {
    async fn fetch_page(&self, cursor: &Cursor) -> Result<SearchPage<SummaryFields>, CmsError> {
        self.follow(cursor).await
    }
}

#[async_trait]
impl DocumentSource for PrismicClient {
    async fn post_by_uid(&self, uid: &str) -> Result<RawDocument<DetailFields>, CmsError> {
        self.get_by_uid(POST_TYPE, uid).await
    }
}
