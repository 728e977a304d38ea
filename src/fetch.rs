use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::{FetchError, SkipReason};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 11.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

pub fn user_agent() -> &'static str {
    USER_AGENTS.choose(&mut rand::rng()).copied().unwrap_or(USER_AGENTS[0])
}

/// Raw response: status plus body. Bodies of non-2xx answers are not read.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<Page, FetchError>;
}

/// One pooled client for the whole process; proxy and timeout apply to every request.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(proxy: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder
                .proxy(reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy {}", proxy))?);
        }
        Ok(HttpSource { client: builder.build()? })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn get(&self, url: &str) -> Result<Page, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(header::USER_AGENT, user_agent())
            .send()
            .await?;
        let status = resp.status();
        let body = if status.is_success() {
            resp.text().await.map_err(FetchError::Body)?
        } else {
            String::new()
        };
        Ok(Page { status: status.as_u16(), body })
    }
}

/// Tri-state result of one request.
#[derive(Debug)]
pub enum Outcome {
    Success(String),
    Skip(SkipReason),
    Failure(FetchError),
}

/// Single request outside the scheduler, classified the same way.
pub async fn fetch_one(source: &dyn PageSource, url: &str) -> Outcome {
    Outcome::classify(source.get(url).await)
}

impl Outcome {
    fn classify(result: Result<Page, FetchError>) -> Self {
        match result {
            Ok(page) if (200..300).contains(&page.status) => Outcome::Success(page.body),
            Ok(page) => match SkipReason::from_status(page.status) {
                Some(reason) => Outcome::Skip(reason),
                None => Outcome::Failure(FetchError::Status(page.status)),
            },
            Err(e) => Outcome::Failure(e),
        }
    }
}

pub struct FetchRequest<K> {
    pub key: K,
    pub url: String,
}

impl<K> FetchRequest<K> {
    pub fn new(key: K, url: impl Into<String>) -> Self {
        FetchRequest { key, url: url.into() }
    }
}

pub struct Completed<K> {
    pub key: K,
    pub url: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_concurrency: usize,
    /// Minimum spacing between two launches; zero disables it.
    pub launch_interval: Duration,
}

impl Limits {
    pub fn new(max_concurrency: usize, requests_per_second: f64) -> Self {
        let launch_interval = if requests_per_second > 0.0 {
            Duration::from_nanos((1e9 / requests_per_second) as u64)
        } else {
            Duration::ZERO
        };
        Limits { max_concurrency: max_concurrency.max(1), launch_interval }
    }
}

pub struct Scheduler {
    source: Arc<dyn PageSource>,
    limits: Limits,
}

impl Scheduler {
    pub fn new(source: Arc<dyn PageSource>, limits: Limits) -> Self {
        Scheduler { source, limits }
    }

    /// Launch every request (at most `max_concurrency` in flight, spaced by the
    /// launch interval) and stream results back in completion order. The
    /// receiver closes once every request has finished.
    pub fn dispatch<K>(&self, requests: Vec<FetchRequest<K>>) -> mpsc::Receiver<Completed<K>>
    where
        K: Send + 'static,
    {
        let Limits { max_concurrency, launch_interval } = self.limits;
        let (tx, rx) = mpsc::channel(max_concurrency * 2);
        let source = Arc::clone(&self.source);
        let semaphore = Arc::new(Semaphore::new(max_concurrency));

        tokio::spawn(async move {
            let mut ticker = (!launch_interval.is_zero()).then(|| {
                let mut t = tokio::time::interval(launch_interval);
                t.set_missed_tick_behavior(MissedTickBehavior::Delay);
                t
            });

            for FetchRequest { key, url } in requests {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
                let source = Arc::clone(&source);
                let tx = tx.clone();
                tokio::spawn(async move {
                    debug!("GET {}", url);
                    let outcome = fetch_one(source.as_ref(), &url).await;
                    let _ = tx.send(Completed { key, url, outcome }).await;
                    drop(permit);
                });
            }
        });

        rx
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Instant;

    use super::testing::{unlimited, FakeSite};
    use super::*;

    async fn drain<K>(mut rx: mpsc::Receiver<Completed<K>>) -> Vec<Completed<K>> {
        let mut out = Vec::new();
        while let Some(done) = rx.recv().await {
            out.push(done);
        }
        out
    }

    #[tokio::test]
    async fn outcomes_are_classified() {
        let site = Arc::new(FakeSite::new());
        site.page("http://t/ok", 200, "hello");
        site.page("http://t/forbidden", 403, "");
        site.page("http://t/error", 500, "");
        site.break_url("http://t/down");

        let scheduler = Scheduler::new(site.clone(), unlimited());
        let requests = ["ok", "forbidden", "missing", "error", "down"]
            .into_iter()
            .map(|k| FetchRequest::new(k, format!("http://t/{}", k)))
            .collect();
        let results: HashMap<&str, Outcome> = drain(scheduler.dispatch(requests))
            .await
            .into_iter()
            .map(|c| (c.key, c.outcome))
            .collect();

        assert_eq!(results.len(), 5);
        assert!(matches!(&results["ok"], Outcome::Success(b) if b == "hello"));
        assert!(matches!(results["forbidden"], Outcome::Skip(SkipReason::Forbidden)));
        assert!(matches!(results["missing"], Outcome::Skip(SkipReason::NotFound)));
        assert!(matches!(results["error"], Outcome::Failure(FetchError::Status(500))));
        assert!(matches!(results["down"], Outcome::Failure(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn in_flight_requests_are_capped() {
        let site = Arc::new(FakeSite::with_delay(Duration::from_millis(20)));
        let scheduler = Scheduler::new(
            site.clone(),
            Limits { max_concurrency: 3, launch_interval: Duration::ZERO },
        );
        let requests = (0..12)
            .map(|i| FetchRequest::new(i, format!("http://t/{}", i)))
            .collect();
        let done = drain(scheduler.dispatch(requests)).await;

        assert_eq!(done.len(), 12);
        assert_eq!(site.requests().len(), 12);
        assert!(site.peak_in_flight() <= 3, "peak {}", site.peak_in_flight());
    }

    #[tokio::test]
    async fn launches_are_spaced() {
        let site = Arc::new(FakeSite::new());
        let scheduler = Scheduler::new(site.clone(), Limits::new(10, 50.0));
        let requests = (0..5)
            .map(|i| FetchRequest::new(i, format!("http://t/{}", i)))
            .collect();
        let start = Instant::now();
        drain(scheduler.dispatch(requests)).await;
        // First tick is immediate, then four 20ms gaps.
        assert!(start.elapsed() >= Duration::from_millis(75), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn empty_batch_closes_immediately() {
        let scheduler = Scheduler::new(Arc::new(FakeSite::new()), unlimited());
        assert!(drain(scheduler.dispatch(Vec::<FetchRequest<u32>>::new())).await.is_empty());
    }

    #[test]
    fn limits_from_rate() {
        let l = Limits::new(0, 10.0);
        assert_eq!(l.max_concurrency, 1);
        assert_eq!(l.launch_interval, Duration::from_millis(100));
        assert_eq!(Limits::new(4, 0.0).launch_interval, Duration::ZERO);
    }

    #[test]
    fn user_agent_is_browser_like() {
        assert!(user_agent().starts_with("Mozilla/5.0"));
    }
}
