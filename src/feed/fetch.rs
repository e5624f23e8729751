//! Feed download.

use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

/// Something that can produce the raw feed document for a URL.
pub trait FeedSource {
    fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>>;
}

/// Blocking HTTP feed source.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::blocking::Client,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::config(format!("cannot build http client: {e}")))?;
        Ok(Self { client })
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let wrap = |source| PipelineError::Fetch {
            url: url.to_owned(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(wrap)?;
        let body = response.bytes().map_err(wrap)?;
        Ok(body.to_vec())
    }
}
