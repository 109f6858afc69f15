//! Test doubles for the pipeline's external collaborators

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::capability::CapabilityProbe;
use super::config::{CancelFlag, PipelineConfig, RunContext};
use super::models::{CatalogEntry, MatchCandidate, SongTask};
use crate::catalog::CatalogSource;
use crate::fetch::{FetchError, FetchEvent, FetchRequest, MediaFetcher};
use crate::search::SearchService;

/// Tracks how many calls are in flight at once
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        ProbeGuard { probe: self }
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Leaves the probe on drop, so cancelled futures are counted out too
pub struct ProbeGuard<'a> {
    probe: &'a ConcurrencyProbe,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Search service answering from a table of canned responses
#[derive(Default)]
pub struct FakeSearch {
    responses: Mutex<HashMap<String, Result<Vec<MatchCandidate>, String>>>,
    delays: Mutex<HashMap<String, Duration>>,
    pub probe: ConcurrencyProbe,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, query: &str, candidates: Vec<MatchCandidate>) {
        self.responses
            .lock()
            .unwrap()
            .insert(query.to_string(), Ok(candidates));
    }

    pub fn fail(&self, query: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(query.to_string(), Err(message.to_string()));
    }

    pub fn delay(&self, query: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(query.to_string(), delay);
    }

    pub fn calls(&self) -> usize {
        self.probe.calls()
    }
}

#[async_trait]
impl SearchService for FakeSearch {
    async fn search(&self, query: &str) -> Result<Vec<MatchCandidate>> {
        let _guard = self.probe.enter();
        let delay = self.delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.responses.lock().unwrap().get(query).cloned();
        match response {
            Some(Ok(candidates)) => Ok(candidates),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// How the fake fetcher treats one URL
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchBehavior {
    /// Two progress events, finished, exit ok
    Succeed,
    /// One progress event, an error event, non-zero exit
    ErrorMidTransfer,
    /// Several error events before a non-zero exit
    ManyErrors,
    /// Panic after the first progress event
    Panic,
    /// The tool can't be started
    SpawnFailure,
    /// Never finishes
    Hang,
}

/// Media fetcher that scripts events per URL and records every request
#[derive(Default)]
pub struct FakeFetcher {
    behaviors: Mutex<HashMap<String, FetchBehavior>>,
    requests: Mutex<Vec<FetchRequest>>,
    delay: Mutex<Option<Duration>>,
    pub probe: ConcurrencyProbe,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn behave(&self, url: &str, behavior: FetchBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    /// Pause between progress events of every transfer
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> Result<(), FetchError> {
        let _guard = self.probe.enter();
        self.requests.lock().unwrap().push(request.clone());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&request.url)
            .copied()
            .unwrap_or(FetchBehavior::Succeed);

        let progress = |downloaded_bytes| FetchEvent::Downloading {
            downloaded_bytes,
            total_bytes: Some(2_000),
        };

        match behavior {
            FetchBehavior::Succeed => {
                events.send(progress(1_000)).unwrap();
                self.pause().await;
                events.send(progress(2_000)).unwrap();
                events.send(FetchEvent::Finished).unwrap();
                Ok(())
            }
            FetchBehavior::ErrorMidTransfer => {
                events.send(progress(1_000)).unwrap();
                self.pause().await;
                events
                    .send(FetchEvent::Error("connection reset".to_string()))
                    .unwrap();
                Err(FetchError::Tool {
                    tool: "fake".to_string(),
                    status: "exit status: 1".to_string(),
                    message: "connection reset".to_string(),
                })
            }
            FetchBehavior::ManyErrors => {
                for i in 0..3 {
                    events
                        .send(FetchEvent::Error(format!("error {}", i)))
                        .unwrap();
                }
                Err(FetchError::Tool {
                    tool: "fake".to_string(),
                    status: "exit status: 1".to_string(),
                    message: "error 2".to_string(),
                })
            }
            FetchBehavior::Panic => {
                events.send(progress(1_000)).unwrap();
                self.pause().await;
                panic!("fetcher blew up");
            }
            FetchBehavior::SpawnFailure => Err(FetchError::Spawn {
                tool: "fake".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }),
            FetchBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Catalog returning a fixed list, or an error
pub struct FakeCatalog {
    pub entries: Result<Vec<CatalogEntry>, String>,
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn playlist_entries(&self, _playlist_id: &str) -> Result<Vec<CatalogEntry>> {
        self.entries.clone().map_err(|message| anyhow!(message))
    }
}

pub fn candidate(video_id: &str, duration_ms: u64) -> MatchCandidate {
    MatchCandidate {
        video_id: video_id.to_string(),
        title: format!("title {}", video_id),
        duration_ms,
    }
}

/// `count` distinct entries with distinct durations
pub fn entries(count: usize) -> Vec<CatalogEntry> {
    (0..count)
        .map(|i| {
            CatalogEntry::new(
                format!("Song {}", i),
                format!("Artist {}", i),
                180_000 + i as u64 * 1_000,
            )
        })
        .collect()
}

/// `count` tasks already matched to distinct URLs
pub fn matched_tasks(count: usize) -> Vec<SongTask> {
    entries(count)
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let duration = entry.duration_ms;
            SongTask::pending(i + 1, entry)
                .matched(&candidate(&format!("v{}", i), duration), Some(100.0))
        })
        .collect()
}

/// Context without search jitter
pub fn test_context() -> RunContext {
    RunContext::new(PipelineConfig {
        search_jitter_ms: 0..=0,
        output_dir: "test-output".into(),
        ..PipelineConfig::default()
    })
}

/// Context whose probe never finds a transcoder
pub fn context_without_transcoder(config: PipelineConfig) -> RunContext {
    let probe = CapabilityProbe::ffmpeg().with_search_dirs(Vec::new(), Vec::new());
    RunContext::new(config).with_transcoder(probe)
}

/// Trip `cancel` after `delay`, like a Ctrl-C arriving mid-run
pub fn cancel_after(cancel: &CancelFlag, delay: Duration) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        cancel.cancel();
    });
}
