//! Corpus queries, with retries and backoff

use crate::{
    config::{Config, LEMMA_PLACEHOLDER},
    Lemma,
};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;

/// Reasons why no response could be obtained for a lemma
#[derive(Debug, Error)]
pub enum FetchError {
    /// The endpoint template does not yield a valid URL for this lemma
    #[error("invalid query URL {url:?} for {lemma:?}")]
    InvalidUrl {
        lemma: Lemma,
        url: Box<str>,
        #[source]
        source: url::ParseError,
    },

    /// Every attempt failed at the connection level
    #[error("gave up querying {lemma:?} after {attempts} failed attempt(s)")]
    Exhausted {
        lemma: Lemma,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
}

/// Issues corpus queries, one at a time
#[derive(Clone, Debug)]
pub struct Fetcher {
    /// Endpoint and retry configuration
    config: Arc<Config>,

    /// HTTP client
    client: reqwest::Client,
}
//
impl Fetcher {
    /// Set up a fetcher
    pub fn new(config: Arc<Config>, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Search URL for a lemma
    pub fn query_url(&self, lemma: &str) -> Result<Url, FetchError> {
        let encoded = url::form_urlencoded::byte_serialize(lemma.as_bytes()).collect::<String>();
        let url = self.config.endpoint.replace(LEMMA_PLACEHOLDER, &encoded);
        Url::parse(&url).map_err(|source| FetchError::InvalidUrl {
            lemma: lemma.into(),
            url: url.into(),
            source,
        })
    }

    /// Query the corpus about a lemma, returning the response body
    ///
    /// - Connection failures are retried after a fixed wait, and yield an
    ///   error once the retry budget is spent.
    /// - Rate-limiting responses are retried after a wait that depends on
    ///   the remaining retry budget. Once the budget is spent, the body of
    ///   the last response is returned.
    /// - Other unsuccessful responses are logged and returned as-is, since
    ///   their body will just be found to contain no statistics.
    pub async fn fetch(&self, lemma: &str) -> Result<Box<str>, FetchError> {
        let url = self.query_url(lemma)?;
        let policy = self.config.retry;
        let mut retries_remaining = policy.max_retries;
        let mut attempts = 0;
        loop {
            attempts += 1;
            log::trace!("Querying {lemma:?} (attempt {attempts}) at {url}");
            let (status, body) = match self.attempt(url.clone()).await {
                Ok(response) => response,
                Err(source) => {
                    log::warn!("Connection error while querying {lemma:?}: {source}");
                    if retries_remaining == 0 {
                        return Err(FetchError::Exhausted {
                            lemma: lemma.into(),
                            attempts,
                            source,
                        });
                    }
                    log::warn!(
                        "Waiting {}s before retrying ({retries_remaining} retries left)",
                        policy.connection_backoff.as_secs()
                    );
                    sleep(policy.connection_backoff).await;
                    retries_remaining -= 1;
                    continue;
                }
            };

            if status != StatusCode::OK {
                log::warn!("Got HTTP status {status} while querying {lemma:?}");
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = policy.rate_limit_wait(retries_remaining);
                log::warn!(
                    "Too many requests, waiting {}s before retrying ({retries_remaining} retries left)",
                    wait.as_secs()
                );
                sleep(wait).await;
                if retries_remaining > 0 {
                    retries_remaining -= 1;
                    continue;
                }
            }
            return Ok(body);
        }
    }

    /// Send one request and read the full response
    async fn attempt(&self, url: Url) -> reqwest::Result<(StatusCode, Box<str>)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body.into()))
    }
}
