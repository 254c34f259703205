//! Simulated Object Store with Fault Injection
//!
//! Wraps another store and injects faults from a seeded RNG, so a failing
//! run can be replayed exactly from its seed.

use crate::store::object_store::{
    ListResult, ObjectBody, ObjectStore, ObjectStoreError, StoreResult,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind};
use std::pin::Pin;
use std::time::Duration;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability of LIST failing
    pub list_fail_prob: f64,
    /// Probability of OPEN failing
    pub open_fail_prob: f64,
    /// Probability of a body coming back with invalid UTF-8 spliced in
    pub corrupt_prob: f64,
    /// Probability of PUT failing
    pub put_fail_prob: f64,
    /// Probability of any operation timing out
    pub timeout_prob: f64,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            list_fail_prob: 0.01,          // 1%
            open_fail_prob: 0.01,          // 1%
            corrupt_prob: 0.005,           // 0.5%
            put_fail_prob: 0.01,           // 1%
            timeout_prob: 0.005,           // 0.5%
            latency_range_us: (0, 1_000), // 0 - 1ms
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            list_fail_prob: 0.05,
            open_fail_prob: 0.05,
            corrupt_prob: 0.05,
            put_fail_prob: 0.1,
            timeout_prob: 0.02,
            latency_range_us: (0, 2_000),
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            list_fail_prob: 0.0,
            open_fail_prob: 0.0,
            corrupt_prob: 0.0,
            put_fail_prob: 0.0,
            timeout_prob: 0.0,
            latency_range_us: (0, 0),
        }
    }

    /// Every PUT fails, nothing else does
    pub fn failing_puts() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 1.0,
            ..Self::no_faults()
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub list_attempts: u64,
    pub list_failures: u64,
    pub open_attempts: u64,
    pub open_failures: u64,
    pub corruptions: u64,
    pub put_attempts: u64,
    pub put_failures: u64,
    pub timeouts: u64,
}

impl SimulatedStoreStats {
    /// Total number of injected faults
    pub fn faults(&self) -> u64 {
        self.list_failures
            + self.open_failures
            + self.corruptions
            + self.put_failures
            + self.timeouts
    }
}

struct SimulatedState {
    rng: ChaCha8Rng,
    stats: SimulatedStoreStats,
}

/// Simulated object store that wraps another store and injects faults
pub struct SimulatedObjectStore<S: ObjectStore> {
    inner: S,
    config: SimulatedStoreConfig,
    state: Mutex<SimulatedState>,
}

#[derive(Clone, Copy)]
enum Op {
    List,
    Open,
    Put,
}

impl<S: ObjectStore> SimulatedObjectStore<S> {
    /// Create a new simulated store seeded for reproducibility
    pub fn new(inner: S, seed: u64, config: SimulatedStoreConfig) -> Self {
        SimulatedObjectStore {
            inner,
            config,
            state: Mutex::new(SimulatedState {
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: SimulatedStoreStats::default(),
            }),
        }
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn roll(state: &mut SimulatedState, prob: f64) -> bool {
        prob > 0.0 && state.rng.gen_bool(prob.min(1.0))
    }

    /// Decide the fate of one operation up front. The lock is released
    /// before any await so the RNG sequence depends only on call order.
    fn before(&self, op: Op) -> (StoreResult<()>, Duration) {
        let mut state = self.state.lock();
        let fail_prob = match op {
            Op::List => {
                state.stats.list_attempts += 1;
                self.config.list_fail_prob
            }
            Op::Open => {
                state.stats.open_attempts += 1;
                self.config.open_fail_prob
            }
            Op::Put => {
                state.stats.put_attempts += 1;
                self.config.put_fail_prob
            }
        };

        let (min, max) = self.config.latency_range_us;
        let latency = if max > min {
            Duration::from_micros(state.rng.gen_range(min..max))
        } else {
            Duration::from_micros(min)
        };

        if Self::roll(&mut state, self.config.timeout_prob) {
            state.stats.timeouts += 1;
            let err = IoError::new(ErrorKind::TimedOut, "simulated timeout");
            return (Err(ObjectStoreError::Io(err)), latency);
        }

        if Self::roll(&mut state, fail_prob) {
            let name = match op {
                Op::List => {
                    state.stats.list_failures += 1;
                    "list"
                }
                Op::Open => {
                    state.stats.open_failures += 1;
                    "open"
                }
                Op::Put => {
                    state.stats.put_failures += 1;
                    "put"
                }
            };
            let err = ObjectStoreError::Backend(format!("simulated {} failure", name));
            return (Err(err), latency);
        }

        (Ok(()), latency)
    }

    /// Possibly splice an invalid UTF-8 byte into a body
    fn maybe_corrupt(&self, data: Bytes) -> Bytes {
        let mut state = self.state.lock();
        if data.is_empty() || !Self::roll(&mut state, self.config.corrupt_prob) {
            return data;
        }
        state.stats.corruptions += 1;
        let pos = state.rng.gen_range(0..data.len());
        let mut corrupted = BytesMut::from(&data[..]);
        corrupted[pos] = 0xFF;
        corrupted.freeze()
    }
}

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

impl<S: ObjectStore> ObjectStore for SimulatedObjectStore<S> {
    fn list<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            let (fate, latency) = self.before(Op::List);
            simulate_latency(latency).await;
            fate?;
            self.inner.list(bucket, prefix, continuation_token).await
        })
    }

    fn open<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<ObjectBody>> + Send + 'a>> {
        Box::pin(async move {
            let (fate, latency) = self.before(Op::Open);
            simulate_latency(latency).await;
            fate?;
            // The inner body is drained here and dropped, releasing its
            // lease before the (possibly corrupted) copy is handed out.
            let data = self.inner.open(bucket, key).await?.read_to_end().await?;
            Ok(ObjectBody::from_bytes(bucket, key, self.maybe_corrupt(data)))
        })
    }

    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let (fate, latency) = self.before(Op::Put);
            simulate_latency(latency).await;
            fate?;
            self.inner.put(bucket, key, data).await
        })
    }

    fn bucket_exists<'a>(
        &'a self,
        bucket: &'a str,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + 'a>> {
        self.inner.bucket_exists(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;

    fn seeded_inner() -> InMemoryObjectStore {
        let store = InMemoryObjectStore::new();
        store.create_bucket("raw-events");
        store
    }

    #[tokio::test]
    async fn test_no_faults_passes_through() {
        let sim = SimulatedObjectStore::new(seeded_inner(), 7, SimulatedStoreConfig::no_faults());

        sim.put("raw-events", "a.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let data = sim
            .open("raw-events", "a.json")
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();

        assert_eq!(&data[..], b"{}");
        assert_eq!(sim.stats().faults(), 0);
        assert_eq!(sim.inner().open_body_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_puts_never_reach_inner() {
        let sim =
            SimulatedObjectStore::new(seeded_inner(), 1, SimulatedStoreConfig::failing_puts());

        let err = sim
            .put("raw-events", "a.json", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::Backend(_)));
        assert_eq!(sim.inner().object_count("raw-events"), 0);
        assert_eq!(sim.stats().put_failures, 1);
    }

    #[tokio::test]
    async fn test_corruption_yields_invalid_utf8() {
        let config = SimulatedStoreConfig {
            corrupt_prob: 1.0,
            ..SimulatedStoreConfig::no_faults()
        };
        let sim = SimulatedObjectStore::new(seeded_inner(), 3, config);
        sim.put("raw-events", "a.json", Bytes::from_static(b"{\"id\":1}"))
            .await
            .unwrap();

        let data = sim
            .open("raw-events", "a.json")
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert!(std::str::from_utf8(&data).is_err());
        assert_eq!(sim.stats().corruptions, 1);
    }

    #[tokio::test]
    async fn test_same_seed_same_faults() {
        async fn run(seed: u64) -> Vec<bool> {
            let inner = seeded_inner();
            inner
                .put("raw-events", "a.json", Bytes::from_static(b"{}"))
                .await
                .unwrap();
            let sim = SimulatedObjectStore::new(inner, seed, SimulatedStoreConfig::high_chaos());
            let mut outcomes = Vec::new();
            for _ in 0..50 {
                outcomes.push(sim.open("raw-events", "a.json").await.is_ok());
            }
            outcomes
        }

        assert_eq!(run(42).await, run(42).await);
    }
}
