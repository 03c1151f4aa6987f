// src/enrich/cache.rs
//! File-backed cache + daily call budget around any `TextGenerator`.
//! Cache hits are free; only successful real calls count against the limit.
//! A slot is taken before the real call and handed back if that call fails.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::generator::{Generated, GenerationError, GenerationRequest, TextGenerator};

pub struct CachingGenerator<G: TextGenerator> {
    inner: G,
    cache_dir: PathBuf,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

impl<G: TextGenerator> CachingGenerator<G> {
    pub fn new(inner: G, cache_dir: impl Into<PathBuf>, daily_limit: u32) -> Self {
        let cache_dir = cache_dir.into();
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!(target: "enrich", dir = %cache_dir.display(), error = %e, "cache dir unavailable");
        }
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            cache_dir,
            daily_limit,
            counter,
        }
    }

    /// Real calls made today, as persisted.
    pub fn calls_today(&self) -> u32 {
        self.counter
            .lock()
            .map(|mut g| {
                g.roll(today());
                g.count
            })
            .unwrap_or(0)
    }

    /// Take one slot of today's budget under the lock, so concurrent callers
    /// cannot all pass the check before any of them is counted.
    fn reserve(&self) -> Result<NaiveDate, GenerationError> {
        let mut g = self
            .counter
            .lock()
            .map_err(|_| GenerationError::Http("quota counter poisoned".into()))?;
        g.roll(today());
        if g.count >= self.daily_limit {
            return Err(GenerationError::QuotaExceeded);
        }
        g.count += 1;
        if let Err(e) = save_daily_counter(&self.cache_dir, &g) {
            warn!(target: "enrich", error = %e, "failed to persist daily counter");
        }
        Ok(g.date)
    }

    /// Give back a slot taken by `reserve` when the real call failed.
    fn release(&self, day: NaiveDate) {
        if let Ok(mut g) = self.counter.lock() {
            if g.date != day {
                return;
            }
            g.count = g.count.saturating_sub(1);
            if let Err(e) = save_daily_counter(&self.cache_dir, &g) {
                warn!(target: "enrich", error = %e, "failed to persist daily counter");
            }
        }
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for CachingGenerator<G> {
    async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError> {
        let key = cache_key(req);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            debug!(target: "enrich", id = %req.id, "cache hit");
            return Ok(hit);
        }

        let day = self.reserve()?;

        let fresh = match self.inner.generate(req).await {
            Ok(g) => g,
            Err(e) => {
                self.release(day);
                return Err(e);
            }
        };
        if let Err(e) = write_cache_file(&self.cache_dir, &key, &fresh) {
            warn!(target: "enrich", error = %e, "failed to write cache entry");
        }
        Ok(fresh)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

fn cache_key(req: &GenerationRequest) -> String {
    let mut h = Sha256::new();
    h.update(req.id.as_bytes());
    h.update([0u8]);
    h.update(req.title.as_bytes());
    h.update([0u8]);
    h.update(req.body.as_bytes());
    let digest = h.finalize();
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<Generated> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_atomic(path: &Path, json: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)
}

fn write_cache_file(dir: &Path, key: &str, value: &Generated) -> io::Result<()> {
    let json =
        serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&cache_path(dir, key), &json)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    /// Reset when the calendar day changed. Returns true if it did.
    fn roll(&mut self, today: NaiveDate) -> bool {
        if self.date != today {
            self.date = today;
            self.count = 0;
            return true;
        }
        false
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let json =
        serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&counter_path(dir), &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicU32>);

    #[async_trait]
    impl TextGenerator for Counting {
        async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Generated {
                title: req.title.clone(),
                summary: "s".into(),
            })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn req(id: &str) -> GenerationRequest {
        GenerationRequest {
            id: id.into(),
            title: format!("title {id}"),
            body: "body".into(),
        }
    }

    #[tokio::test]
    async fn cache_hits_skip_inner_and_quota() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let g = CachingGenerator::new(Counting(calls.clone()), tmp.path(), 1);

        assert!(g.generate(&req("a")).await.is_ok());
        // same request: served from disk even though the budget is spent
        assert!(g.generate(&req("a")).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            g.generate(&req("b")).await,
            Err(GenerationError::QuotaExceeded)
        );
        assert_eq!(g.calls_today(), 1);
    }

    #[tokio::test]
    async fn counter_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        {
            let g = CachingGenerator::new(Counting(calls.clone()), tmp.path(), 5);
            g.generate(&req("a")).await.unwrap();
            g.generate(&req("b")).await.unwrap();
        }
        let g = CachingGenerator::new(Counting(calls), tmp.path(), 5);
        assert_eq!(g.calls_today(), 2);
    }

    /// Sleeps before answering so every concurrent caller is in flight at once.
    struct Slow(Arc<AtomicU32>);

    #[async_trait]
    impl TextGenerator for Slow {
        async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(Generated {
                title: req.title.clone(),
                summary: "s".into(),
            })
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    /// Fails the first call, succeeds afterwards.
    struct FailsOnce(AtomicU32);

    #[async_trait]
    impl TextGenerator for FailsOnce {
        async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GenerationError::Http("status 502".into()));
            }
            Ok(Generated {
                title: req.title.clone(),
                summary: "s".into(),
            })
        }
        fn name(&self) -> &'static str {
            "fails-once"
        }
    }

    #[tokio::test]
    async fn concurrent_calls_never_overshoot_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let g = CachingGenerator::new(Slow(calls.clone()), tmp.path(), 1);

        let reqs: Vec<_> = ["a", "b", "c", "d"].into_iter().map(req).collect();
        let results = futures::future::join_all(reqs.iter().map(|r| g.generate(r))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(GenerationError::QuotaExceeded)))
                .count(),
            3
        );
        assert_eq!(g.calls_today(), 1);
    }

    #[tokio::test]
    async fn failed_call_returns_its_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let g = CachingGenerator::new(FailsOnce(AtomicU32::new(0)), tmp.path(), 1);

        assert!(matches!(
            g.generate(&req("a")).await,
            Err(GenerationError::Http(_))
        ));
        assert_eq!(g.calls_today(), 0);
        assert!(g.generate(&req("a")).await.is_ok());
        assert_eq!(g.calls_today(), 1);
    }

    #[test]
    fn counter_rolls_over_on_new_day() {
        let mut c = DailyCounter {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            count: 9,
        };
        assert!(c.roll(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
        assert_eq!(c.count, 0);
        assert!(!c.roll(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
    }
}
