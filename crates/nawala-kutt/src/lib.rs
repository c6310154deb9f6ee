//! Kutt shortlink adapter.
//!
//! Uses the Kutt v2 REST API (`/api/v2/links`) authenticated with `X-API-Key`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use nawala_core::{
    config::Config, domain::ShortlinkRecord, errors::Error, ports::ShortlinkApi, Result,
};

const API_KEY_HEADER: &str = "X-API-Key";
const BODY_PREVIEW_LEN: usize = 200;

#[derive(Clone, Debug)]
pub struct KuttClient {
    base_url: String,
    api_key: String,
    page_size: usize,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LinksPage {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    data: Vec<LinkDto>,
}

#[derive(Debug, Deserialize)]
struct LinkDto {
    id: serde_json::Value,
    #[serde(default)]
    target: String,
}

impl LinkDto {
    fn into_record(self) -> Option<ShortlinkRecord> {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(ShortlinkRecord {
            id,
            target: self.target,
        })
    }
}

impl KuttClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("kutt http client build failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            page_size: page_size.max(1),
            http,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.kutt_base_url.clone(),
            cfg.kutt_api_key.clone(),
            cfg.kutt_page_size,
            cfg.kutt_timeout,
        )
    }

    fn links_url(&self) -> String {
        format!("{}/api/v2/links", self.base_url)
    }

    fn link_url(&self, id: &str) -> String {
        format!("{}/api/v2/links/{}", self.base_url, id)
    }

    async fn fetch_page(&self, skip: usize) -> Result<LinksPage> {
        let resp = self
            .http
            .get(self.links_url())
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("limit", self.page_size), ("skip", skip)])
            .send()
            .await
            .map_err(|e| Error::External(format!("kutt request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(status_error("kutt list failed", resp).await);
        }

        resp.json::<LinksPage>()
            .await
            .map_err(|e| Error::External(format!("kutt json error: {e}")))
    }
}

async fn status_error(what: &str, resp: reqwest::Response) -> Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Error::External(format!(
        "{what}: {status} {}",
        body.chars().take(BODY_PREVIEW_LEN).collect::<String>()
    ))
}

/// Whether another page is needed after collecting `seen` links.
fn has_more(page_len: usize, seen: usize, total: Option<usize>, page_size: usize) -> bool {
    if page_len == 0 {
        return false;
    }
    match total {
        Some(total) => seen < total,
        None => page_len >= page_size,
    }
}

#[async_trait]
impl ShortlinkApi for KuttClient {
    async fn list(&self) -> Result<Vec<ShortlinkRecord>> {
        let mut out = Vec::new();
        let mut skip = 0usize;
        loop {
            let page = self.fetch_page(skip).await?;
            let page_len = page.data.len();
            out.extend(page.data.into_iter().filter_map(LinkDto::into_record));
            skip += page_len;
            if !has_more(page_len, skip, page.total, self.page_size) {
                break;
            }
        }
        debug!(links = out.len(), "listed shortlinks");
        Ok(out)
    }

    async fn patch(&self, id: &str, target: &str, description: &str) -> Result<()> {
        let body = serde_json::json!({
            "target": target,
            "description": description,
        });

        let resp = self
            .http
            .patch(self.link_url(id))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("kutt request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(status_error("kutt update failed", resp).await);
        }
        Ok(())
    }
}
