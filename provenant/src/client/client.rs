//! The resilient remote-data client.

use super::backoff::delay_for;
use super::breaker::CircuitBreaker;
use super::cache::ResponseCache;
use super::limiter::TokenBucket;
use super::transport::{RemoteRequest, Transport};
use crate::cancellation::sleep_cancellable;
use crate::config::{BatchConfig, CacheConfig, CoreConfig, EndpointConfig};
use crate::context::RunContext;
use crate::errors::{CoreError, RemoteError, RemoteErrorKind, Result};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Settings the client needs, detached from the rest of the run config.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Per-endpoint overrides.
    pub endpoints: BTreeMap<String, EndpointConfig>,
    /// Settings for endpoints without an override.
    pub defaults: EndpointConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// The upstream release token scoping cache keys.
    pub release: String,
}

impl ClientSettings {
    /// Extracts client settings from a run configuration.
    #[must_use]
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            endpoints: config.endpoints.clone(),
            defaults: config.endpoint_defaults.clone(),
            cache: config.cache.clone(),
            release: config.source_version.clone(),
        }
    }
}

/// Per-endpoint shared state: one budget, one breaker.
///
/// Owned by the client; callers only ever reach it through [`RemoteClient`]
/// methods, so token counts and failure counters cannot race.
struct EndpointState {
    config: EndpointConfig,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
}

/// Outcome of a batched fetch: per-identifier payloads and per-identifier
/// failures. A failing identifier never aborts the rest of the batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Successful payloads in identifier order.
    pub payloads: Vec<(String, serde_json::Value)>,
    /// Identifiers that could not be fetched, with their classified errors.
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Number of successful identifiers.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.payloads.len()
    }

    /// Number of failed identifiers.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// One identifier that could not be fetched.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// The identifier.
    pub id: String,
    /// The classified error for this identifier alone.
    pub error: RemoteError,
}

/// Issues outbound calls under a shared rate budget, retries transient
/// failures, trips a circuit breaker under sustained failure, caches
/// idempotent responses and adaptively shrinks oversized batch requests.
///
/// The client is the only core component designed for concurrent
/// invocation; extraction workers share one instance per run.
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    endpoints: DashMap<String, Arc<EndpointState>>,
    settings: ClientSettings,
}

impl RemoteClient {
    /// Creates a client over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
        Self {
            transport,
            cache: ResponseCache::new(&settings.cache),
            endpoints: DashMap::new(),
            settings,
        }
    }

    /// Creates a client from a run configuration.
    #[must_use]
    pub fn from_config(transport: Arc<dyn Transport>, config: &CoreConfig) -> Self {
        Self::new(transport, ClientSettings::from_config(config))
    }

    fn endpoint_state(&self, endpoint: &str) -> Arc<EndpointState> {
        self.endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                let config = self
                    .settings
                    .endpoints
                    .get(endpoint)
                    .unwrap_or(&self.settings.defaults)
                    .clone();
                Arc::new(EndpointState {
                    limiter: TokenBucket::new(&config.rate),
                    breaker: CircuitBreaker::new(&config.breaker),
                    config,
                })
            })
            .clone()
    }

    /// The batch request shape for an endpoint.
    #[must_use]
    pub fn batch_config(&self, endpoint: &str) -> BatchConfig {
        self.endpoint_state(endpoint).config.batch.clone()
    }

    /// Number of cached responses, for tests and diagnostics.
    #[must_use]
    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }

    /// Issues one idempotent call against a logical endpoint.
    ///
    /// Cache lookup happens before rate-limit token acquisition, so hits
    /// consume no rate budget. Transient failures are retried with backoff;
    /// a `Retry-After` carried by a 429 overrides the computed wait. Other
    /// 4xx failures surface immediately.
    pub async fn call(
        &self,
        ctx: &RunContext,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value> {
        let key = ResponseCache::key(endpoint, params, &self.settings.release);
        if let Some(hit) = self.cache.get(&key) {
            ctx.try_emit(
                "remote_cache_hit",
                serde_json::json!({ "endpoint": endpoint }),
            );
            return Ok(hit);
        }

        let state = self.endpoint_state(endpoint);
        let retry = &state.config.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            ctx.ensure_active()?;

            if let Err(kind) = state.breaker.try_acquire() {
                ctx.try_emit(
                    "remote_call_attempt",
                    serde_json::json!({
                        "endpoint": endpoint,
                        "attempt": attempt,
                        "outcome": kind.to_string(),
                    }),
                );
                return Err(CoreError::Remote(RemoteError::new(
                    endpoint,
                    kind,
                    attempt - 1,
                )));
            }

            let waited = match state.limiter.acquire(ctx.cancel_token()).await {
                Ok(waited) => waited,
                Err(err) => {
                    state.breaker.abort_probe();
                    return Err(err);
                }
            };

            let request = RemoteRequest {
                endpoint: endpoint.to_string(),
                params: params.to_vec(),
                timeout: Duration::from_millis(state.config.request_timeout_ms),
            };

            let kind = match self.transport.execute(request).await {
                Ok(response) => {
                    if response.is_success() {
                        state.breaker.record_success();
                        ctx.try_emit(
                            "remote_call_attempt",
                            serde_json::json!({
                                "endpoint": endpoint,
                                "attempt": attempt,
                                "outcome": "ok",
                                "throttle_wait_ms": waited.as_millis() as u64,
                            }),
                        );
                        self.cache.put(key, response.body.clone());
                        return Ok(response.body);
                    }
                    RemoteErrorKind::Status {
                        code: response.status,
                        retry_after: response.retry_after,
                    }
                }
                Err(kind) => kind,
            };

            if kind.counts_toward_circuit() {
                state.breaker.record_failure();
            } else {
                state.breaker.abort_probe();
            }

            let will_retry = kind.is_retriable() && attempt < retry.max_attempts;
            let backoff = will_retry.then(|| delay_for(retry, attempt, kind.retry_after()));

            ctx.try_emit(
                "remote_call_attempt",
                serde_json::json!({
                    "endpoint": endpoint,
                    "attempt": attempt,
                    "outcome": kind.to_string(),
                    "throttle_wait_ms": waited.as_millis() as u64,
                    "backoff_ms": backoff.map(|d| d.as_millis() as u64),
                }),
            );

            match backoff {
                Some(delay) => sleep_cancellable(delay, ctx.cancel_token()).await?,
                None => {
                    return Err(CoreError::Remote(RemoteError::new(endpoint, kind, attempt)));
                }
            }
        }
    }

    /// Fetches a set of identifiers in batched requests.
    ///
    /// Identifiers are chunked by `max_batch_size`. A chunk that times out
    /// at size above one is split in half and each half retried
    /// independently, recursively, down to single-identifier granularity;
    /// a failure at single-identifier granularity is recorded for that
    /// identifier alone. Only cancellation aborts the whole batch.
    pub async fn call_batch(
        &self,
        ctx: &RunContext,
        endpoint: &str,
        ids: &[String],
        max_batch_size: usize,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let chunk_size = max_batch_size.max(1);
        for chunk in ids.chunks(chunk_size) {
            self.fetch_chunk(ctx, endpoint, chunk, &mut outcome).await?;
        }
        Ok(outcome)
    }

    fn fetch_chunk<'a>(
        &'a self,
        ctx: &'a RunContext,
        endpoint: &'a str,
        ids: &'a [String],
        out: &'a mut BatchOutcome,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let batch = self.batch_config(endpoint);
            let params = vec![(
                batch.id_param.clone(),
                ids.join(batch.id_separator.as_str()),
            )];

            match self.call(ctx, endpoint, &params).await {
                Ok(payload) => {
                    let mut by_id = split_batch_payload(&payload, ids, &batch.id_field);
                    for id in ids {
                        match by_id.remove(id) {
                            Some(item) => out.payloads.push((id.clone(), item)),
                            None => out.failures.push(BatchFailure {
                                id: id.clone(),
                                error: RemoteError::new(
                                    endpoint,
                                    RemoteErrorKind::MissingFromBatch,
                                    1,
                                ),
                            }),
                        }
                    }
                    Ok(())
                }
                Err(CoreError::Remote(error)) => {
                    if error.kind == RemoteErrorKind::Timeout && ids.len() > 1 {
                        let mid = ids.len().div_ceil(2);
                        ctx.try_emit(
                            "remote_batch_split",
                            serde_json::json!({
                                "endpoint": endpoint,
                                "size": ids.len(),
                                "left": mid,
                                "right": ids.len() - mid,
                            }),
                        );
                        self.fetch_chunk(ctx, endpoint, &ids[..mid], out).await?;
                        self.fetch_chunk(ctx, endpoint, &ids[mid..], out).await?;
                    } else {
                        for id in ids {
                            out.failures.push(BatchFailure {
                                id: id.clone(),
                                error: error.clone(),
                            });
                        }
                    }
                    Ok(())
                }
                Err(other) => Err(other),
            }
        })
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("endpoints", &self.endpoints.len())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Associates batch-response items with the identifiers that requested them.
///
/// Handles the two shapes registries answer batches with: an object keyed by
/// identifier, or an array of items carrying the identifier in `id_field`.
/// A single-identifier request whose answer is the bare record maps to that
/// identifier directly.
fn split_batch_payload(
    payload: &serde_json::Value,
    ids: &[String],
    id_field: &str,
) -> HashMap<String, serde_json::Value> {
    let mut by_id = HashMap::new();
    match payload {
        serde_json::Value::Object(map) => {
            if ids.len() == 1 && map.contains_key(id_field) {
                by_id.insert(ids[0].clone(), payload.clone());
            } else {
                for id in ids {
                    if let Some(item) = map.get(id) {
                        by_id.insert(id.clone(), item.clone());
                    }
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                if let Some(id) = item.get(id_field).and_then(identifier_text) {
                    if ids.contains(&id) {
                        by_id.insert(id, item.clone());
                    }
                }
            }
        }
        _ => {
            if ids.len() == 1 {
                by_id.insert(ids[0].clone(), payload.clone());
            }
        }
    }
    by_id
}

fn identifier_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::client::transport::{MockTransport, RemoteResponse};
    use crate::config::{BreakerConfig, Jitter, RateLimitConfig, RetryConfig};
    use crate::events::CollectingEventSink;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn fast_settings() -> ClientSettings {
        let defaults = EndpointConfig {
            rate: RateLimitConfig {
                capacity: 1_000.0,
                refill_per_sec: 1_000.0,
            },
            retry: RetryConfig {
                max_attempts: 1,
                base_delay_ms: 1,
                max_delay_ms: 5,
                jitter: Jitter::None,
            },
            breaker: BreakerConfig {
                failure_threshold: 100,
                cooldown_secs: 60,
            },
            batch: BatchConfig::default(),
            request_timeout_ms: 1_000,
        };
        ClientSettings {
            endpoints: BTreeMap::new(),
            defaults,
            cache: CacheConfig {
                enabled: true,
                ttl_secs: 300,
            },
            release: "2025_04".to_string(),
        }
    }

    fn test_ctx(sink: Arc<CollectingEventSink>) -> RunContext {
        RunContext::new("test", "fp", sink, Arc::new(CancellationToken::new()))
    }

    fn ok_response(body: serde_json::Value) -> RemoteResponse {
        RemoteResponse {
            status: 200,
            body,
            retry_after: None,
        }
    }

    #[tokio::test]
    async fn identical_calls_within_ttl_hit_network_once() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ok_response(serde_json::json!({"value": 7}))));

        let client = RemoteClient::new(Arc::new(transport), fast_settings());
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = test_ctx(sink.clone());
        let params = vec![("id".to_string(), "P12345".to_string())];

        let first = client.call(&ctx, "uniprot", &params).await.unwrap();
        let second = client.call(&ctx, "uniprot", &params).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sink.count_of("remote_cache_hit"), 1);
        assert_eq!(client.cached_responses(), 1);
    }

    #[tokio::test]
    async fn non_retriable_status_fails_without_retry() {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).returning(|_| {
            Ok(RemoteResponse {
                status: 404,
                body: serde_json::Value::Null,
                retry_after: None,
            })
        });

        let mut settings = fast_settings();
        settings.defaults.retry.max_attempts = 5;
        let client = RemoteClient::new(Arc::new(transport), settings);
        let ctx = test_ctx(Arc::new(CollectingEventSink::new()));

        let err = client.call(&ctx, "uniprot", &[]).await.unwrap_err();
        let CoreError::Remote(remote) = err else {
            panic!("expected remote error");
        };
        assert_eq!(remote.attempts, 1);
        assert!(!remote.is_retriable());
    }

    #[tokio::test]
    async fn retry_after_overrides_backoff_and_retry_succeeds() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut transport = MockTransport::new();
        let call_counter = calls.clone();
        transport.expect_execute().times(2).returning(move |_| {
            if call_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Ok(RemoteResponse {
                    status: 429,
                    body: serde_json::Value::Null,
                    retry_after: Some(Duration::from_millis(5)),
                })
            } else {
                Ok(ok_response(serde_json::json!({"value": 1})))
            }
        });

        let mut settings = fast_settings();
        settings.defaults.retry.max_attempts = 3;
        // A computed backoff would be far larger than the server wait.
        settings.defaults.retry.base_delay_ms = 60_000;
        let client = RemoteClient::new(Arc::new(transport), settings);
        let ctx = test_ctx(Arc::new(CollectingEventSink::new()));

        let started = std::time::Instant::now();
        let payload = client.call(&ctx, "uniprot", &[]).await.unwrap();
        assert_eq!(payload["value"], 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_skips_network() {
        let mut transport = MockTransport::new();
        // Exactly two network attempts; the third call must not reach here.
        transport.expect_execute().times(2).returning(|_| {
            Ok(RemoteResponse {
                status: 503,
                body: serde_json::Value::Null,
                retry_after: None,
            })
        });

        let mut settings = fast_settings();
        settings.defaults.breaker.failure_threshold = 2;
        settings.cache.enabled = false;
        let client = RemoteClient::new(Arc::new(transport), settings);
        let ctx = test_ctx(Arc::new(CollectingEventSink::new()));

        for _ in 0..2 {
            let err = client.call(&ctx, "ensembl", &[]).await.unwrap_err();
            assert!(matches!(err, CoreError::Remote(_)));
        }

        let err = client.call(&ctx, "ensembl", &[]).await.unwrap_err();
        let CoreError::Remote(remote) = err else {
            panic!("expected remote error");
        };
        assert_eq!(remote.kind, RemoteErrorKind::CircuitOpen);
        assert_eq!(remote.attempts, 0);
    }

    #[tokio::test]
    async fn circuit_admits_trial_after_cooldown() {
        let mut transport = MockTransport::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let call_counter = calls.clone();
        transport.expect_execute().returning(move |_| {
            if call_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(RemoteErrorKind::Timeout)
            } else {
                Ok(ok_response(serde_json::json!({"value": 2})))
            }
        });

        let mut settings = fast_settings();
        settings.defaults.breaker.failure_threshold = 1;
        settings.defaults.breaker.cooldown_secs = 0;
        settings.cache.enabled = false;
        let client = RemoteClient::new(Arc::new(transport), settings);
        let ctx = test_ctx(Arc::new(CollectingEventSink::new()));

        assert!(client.call(&ctx, "ncbi", &[]).await.is_err());
        // Cooldown of zero: the next call is the half-open trial and closes
        // the circuit on success.
        let payload = client.call(&ctx, "ncbi", &[]).await.unwrap();
        assert_eq!(payload["value"], 2);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    /// Transport that times out every multi-identifier request, answers
    /// single identifiers, and rejects one specific identifier.
    struct SplitScriptTransport {
        request_sizes: Mutex<Vec<usize>>,
        failing_id: Option<String>,
        multi_ok_sizes: Vec<usize>,
    }

    impl SplitScriptTransport {
        fn parse_ids(request: &RemoteRequest) -> Vec<String> {
            request
                .params
                .first()
                .map(|(_, joined)| joined.split(',').map(str::to_string).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Transport for SplitScriptTransport {
        async fn execute(
            &self,
            request: RemoteRequest,
        ) -> std::result::Result<RemoteResponse, RemoteErrorKind> {
            let ids = Self::parse_ids(&request);
            self.request_sizes.lock().push(ids.len());

            if ids.len() > 1 && !self.multi_ok_sizes.contains(&ids.len()) {
                return Err(RemoteErrorKind::Timeout);
            }
            if ids.len() == 1 && self.failing_id.as_deref() == Some(ids[0].as_str()) {
                return Ok(RemoteResponse {
                    status: 404,
                    body: serde_json::Value::Null,
                    retry_after: None,
                });
            }
            let items: Vec<serde_json::Value> = ids
                .iter()
                .map(|id| serde_json::json!({"id": id, "value": format!("payload-{id}")}))
                .collect();
            Ok(ok_response(serde_json::Value::Array(items)))
        }
    }

    #[tokio::test]
    async fn timeout_splits_chunk_in_half() {
        let transport = Arc::new(SplitScriptTransport {
            request_sizes: Mutex::new(Vec::new()),
            failing_id: None,
            multi_ok_sizes: vec![2],
        });
        let mut settings = fast_settings();
        settings.cache.enabled = false;
        let client = RemoteClient::new(transport.clone(), settings);
        let ctx = test_ctx(Arc::new(CollectingEventSink::new()));

        let ids: Vec<String> = (0..4).map(|i| format!("id{i}")).collect();
        let outcome = client.call_batch(&ctx, "uniprot", &ids, 25).await.unwrap();

        assert_eq!(outcome.success_count(), 4);
        assert_eq!(outcome.failure_count(), 0);
        // One timeout at size 4, then the two halves of size 2 succeed.
        assert_eq!(*transport.request_sizes.lock(), vec![4, 2, 2]);
    }

    #[tokio::test]
    async fn thirty_ids_with_one_bad_identifier() {
        let transport = Arc::new(SplitScriptTransport {
            request_sizes: Mutex::new(Vec::new()),
            failing_id: Some("id27".to_string()),
            multi_ok_sizes: vec![25],
        });
        let mut settings = fast_settings();
        settings.cache.enabled = false;
        let client = RemoteClient::new(transport.clone(), settings);
        let ctx = test_ctx(Arc::new(CollectingEventSink::new()));

        let ids: Vec<String> = (0..30).map(|i| format!("id{i}")).collect();
        let outcome = client.call_batch(&ctx, "uniprot", &ids, 25).await.unwrap();

        // 25 answered in one request; the trailing 5 timed out, split down
        // to singles, and one of those singles failed non-retriably.
        assert_eq!(outcome.success_count(), 29);
        assert_eq!(outcome.failure_count(), 1);
        assert_eq!(outcome.failures[0].id, "id27");
        assert!(!outcome.failures[0].error.is_retriable());

        let sizes = transport.request_sizes.lock().clone();
        assert_eq!(sizes[0], 25);
        assert_eq!(sizes[1], 5);
        assert_eq!(sizes.iter().filter(|&&s| s == 1).count(), 5);
    }

    #[tokio::test]
    async fn cancellation_aborts_batch() {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .returning(|_| Ok(ok_response(serde_json::json!([]))));

        let client = RemoteClient::new(Arc::new(transport), fast_settings());
        let sink = Arc::new(CollectingEventSink::new());
        let cancel = Arc::new(CancellationToken::new());
        let ctx = RunContext::new("test", "fp", sink, cancel.clone());

        cancel.cancel("operator abort");
        let ids = vec!["a".to_string(), "b".to_string()];
        let err = client.call_batch(&ctx, "uniprot", &ids, 1).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn split_payload_handles_keyed_object_and_array() {
        let ids = vec!["P1".to_string(), "P2".to_string()];

        let keyed = serde_json::json!({"P1": {"x": 1}, "P2": {"x": 2}});
        let by_id = split_batch_payload(&keyed, &ids, "id");
        assert_eq!(by_id.len(), 2);

        let array = serde_json::json!([{"id": "P1"}, {"id": "P2"}, {"id": "P9"}]);
        let by_id = split_batch_payload(&array, &ids, "id");
        assert_eq!(by_id.len(), 2);
        assert!(!by_id.contains_key("P9"));

        let single = serde_json::json!({"id": "P1", "x": 1});
        let by_id = split_batch_payload(&single, &ids[..1], "id");
        assert_eq!(by_id.len(), 1);
    }
}
