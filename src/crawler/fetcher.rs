//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests issued by the engine, including:
//! - Building the shared HTTP client (cookies, compression, TLS leniency)
//! - GET and form-encoded POST requests with per-source header profiles
//! - Bounded retries with capped exponential backoff and a wall-clock budget
//! - Outcome classification (HTML, skip, fatal, exhausted)
//! - Randomized pacing after successful fetches

use crate::config::FetcherConfig;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Terminal fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    /// The origin answered with a non-retryable status (4xx and friends)
    #[error("{url} answered HTTP {status}")]
    Fatal { url: String, status: u16 },

    /// Retries or the wall-clock budget ran out
    #[error("{url} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// The request could not even be built
    #[error("Invalid request for {url}: {message}")]
    InvalidRequest { url: String, message: String },
}

/// How a request is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    /// Form-encoded POST body, in field order
    PostForm(Vec<(String, String)>),
}

/// One fetchable target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub method: RequestMethod,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: RequestMethod::Get,
        }
    }

    pub fn post_form(url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            url,
            method: RequestMethod::PostForm(form),
        }
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            RequestMethod::Get => write!(f, "GET {}", self.url),
            RequestMethod::PostForm(form) => {
                write!(f, "POST {}", self.url)?;
                for (i, (key, value)) in form.iter().enumerate() {
                    let sep = if i == 0 { " [" } else { "&" };
                    write!(f, "{}{}={}", sep, key, value)?;
                }
                if !form.is_empty() {
                    write!(f, "]")?;
                }
                Ok(())
            }
        }
    }
}

/// A successfully fetched HTML document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
}

/// Non-error result of a fetch call
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Html(FetchedPage),

    /// 2xx with a non-HTML content type; the caller moves on without retrying
    Skip { content_type: String },
}

/// Retry, timeout and pacing discipline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
    pub total_budget: Duration,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            total_budget: Duration::from_millis(config.total_budget_ms),
            pacing_min: Duration::from_millis(config.pacing_min_ms),
            pacing_max: Duration::from_millis(config.pacing_max_ms),
        }
    }

    /// Delay after the failed attempt with 0-based index `attempt`
    ///
    /// `min(max_backoff, initial_backoff * 2^attempt)`, saturating at the cap.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.initial_backoff.checked_mul(factor))
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    fn pacing_delay(&self) -> Duration {
        if self.pacing_max <= self.pacing_min {
            return self.pacing_min;
        }
        rand::thread_rng().gen_range(self.pacing_min..=self.pacing_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetcherConfig::default())
    }
}

/// Builds the HTTP client shared by every source
///
/// Timeouts are applied per attempt by the [`Fetcher`], so the client itself
/// only carries a connect timeout. Redirects are followed with reqwest's
/// default policy.
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
}

enum AttemptError {
    Fatal(u16),
    Retryable(String),
    Invalid(String),
}

/// Stateless fetch layer; the client only pools connections and cookies
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    user_agents: Vec<String>,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy, user_agents: Vec<String>) -> Self {
        let user_agents = user_agents
            .into_iter()
            .filter(|ua| !ua.trim().is_empty())
            .collect();
        Self {
            client,
            policy,
            user_agents,
        }
    }

    /// Builds a fetcher over `client` from the `[fetcher]` table
    pub fn from_config(client: Client, config: &FetcherConfig) -> Self {
        Self::new(
            client,
            RetryPolicy::from_config(config),
            config.user_agents.clone(),
        )
    }

    /// Fetches one target under the retry policy
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx, HTML | Pacing delay, then `Html` |
    /// | 2xx, other content type | Immediate `Skip` |
    /// | 5xx | Retry after backoff |
    /// | Timeout / transport error | Retry after backoff |
    /// | Any other status | Immediate `Fatal`, no retry |
    ///
    /// Retrying stops after `max_attempts` attempts or as soon as the next
    /// backoff would overrun `total_budget`, yielding `Exhausted`.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        headers: &HeaderMap,
    ) -> Result<FetchOutcome, FetchError> {
        let started = Instant::now();
        let url = request.url.to_string();
        let mut attempts = 0;
        let mut last_error = String::from("time budget exhausted before first attempt");

        while attempts < self.policy.max_attempts {
            let remaining = match self.policy.total_budget.checked_sub(started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => break,
            };
            let timeout = self.policy.attempt_timeout.min(remaining);

            let attempt = attempts;
            attempts += 1;

            match self.attempt(request, headers, timeout).await {
                Ok(FetchOutcome::Html(page)) => {
                    let pause = self.policy.pacing_delay();
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    return Ok(FetchOutcome::Html(page));
                }
                Ok(skip) => {
                    tracing::debug!("Skipping non-HTML response from {}", request);
                    return Ok(skip);
                }
                Err(AttemptError::Fatal(status)) => {
                    tracing::debug!("{} answered {}; not retrying", request, status);
                    return Err(FetchError::Fatal { url, status });
                }
                Err(AttemptError::Invalid(message)) => {
                    return Err(FetchError::InvalidRequest { url, message });
                }
                Err(AttemptError::Retryable(message)) => {
                    last_error = message;
                }
            }

            if attempts >= self.policy.max_attempts {
                break;
            }

            let delay = self.policy.backoff_for(attempt);
            if started.elapsed() + delay >= self.policy.total_budget {
                tracing::debug!("{}: next backoff would overrun the time budget", request);
                break;
            }

            tracing::warn!(
                "{} attempt {}/{} failed ({}); retrying in {:?}",
                request,
                attempts,
                self.policy.max_attempts,
                last_error,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        Err(FetchError::Exhausted {
            url,
            attempts,
            last_error,
        })
    }

    async fn attempt(
        &self,
        request: &FetchRequest,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<FetchOutcome, AttemptError> {
        let builder = match &request.method {
            RequestMethod::Get => self.client.get(request.url.clone()),
            RequestMethod::PostForm(form) => self.client.post(request.url.clone()).form(form),
        };

        let mut builder = builder.timeout(timeout);
        if let Some(agent) = self.pick_user_agent() {
            builder = builder.header(USER_AGENT, agent);
        }
        // Per-source profile wins over the rotated agent
        let builder = builder.headers(headers.clone());

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Err(AttemptError::Invalid(e.to_string())),
            Err(e) if e.is_timeout() => {
                return Err(AttemptError::Retryable(format!(
                    "timed out after {:?}",
                    timeout
                )))
            }
            Err(e) => return Err(AttemptError::Retryable(e.to_string())),
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Retryable(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html(&content_type) {
            return Ok(FetchOutcome::Skip { content_type });
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Retryable(format!("reading body: {}", e)))?;

        Ok(FetchOutcome::Html(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        }))
    }

    fn pick_user_agent(&self) -> Option<HeaderValue> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .and_then(|ua| HeaderValue::from_str(ua).ok())
    }
}

fn is_html(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    lowered.contains("text/html") || lowered.contains("application/xhtml+xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&FetcherConfig::default())
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = policy();
        assert_eq!(policy.backoff_for(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(64));
        assert_eq!(policy.backoff_for(6), Duration::from_secs(100));
        assert_eq!(policy.backoff_for(9), Duration::from_secs(100));
    }

    #[test]
    fn test_backoff_never_overflows() {
        let policy = policy();
        assert_eq!(policy.backoff_for(40), Duration::from_secs(100));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(100));
    }

    #[test]
    fn test_worst_case_sleep_fits_expectations() {
        let policy = policy();
        let total: Duration = (0..policy.max_attempts - 1).map(|a| policy.backoff_for(a)).sum();
        // 2 + 4 + 8 + 16 + 32 + 64 + 100 + 100 + 100
        assert_eq!(total, Duration::from_secs(426));
        assert!((0..policy.max_attempts).all(|a| policy.backoff_for(a) <= policy.max_backoff));
    }

    #[test]
    fn test_pacing_within_bounds() {
        let policy = policy();
        for _ in 0..50 {
            let delay = policy.pacing_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_html_detection() {
        assert!(is_html("text/html; charset=UTF-8"));
        assert!(is_html("TEXT/HTML"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/pdf"));
        assert!(!is_html(""));
    }

    #[test]
    fn test_request_display() {
        let url = Url::parse("https://board.example.edu/list.do").unwrap();
        let get = FetchRequest::get(url.clone());
        assert_eq!(get.to_string(), "GET https://board.example.edu/list.do");

        let post = FetchRequest::post_form(
            url,
            vec![
                ("bbsId".to_string(), "notice".to_string()),
                ("page".to_string(), "2".to_string()),
            ],
        );
        assert_eq!(
            post.to_string(),
            "POST https://board.example.edu/list.do [bbsId=notice&page=2]"
        );
    }

    #[test]
    fn test_blank_user_agents_are_dropped() {
        let fetcher = Fetcher::new(
            Client::new(),
            policy(),
            vec!["  ".to_string(), "NoticeSweep/1.0".to_string()],
        );
        assert_eq!(fetcher.user_agents, vec!["NoticeSweep/1.0".to_string()]);
        assert_eq!(fetcher.pick_user_agent().unwrap(), "NoticeSweep/1.0");
    }
}
