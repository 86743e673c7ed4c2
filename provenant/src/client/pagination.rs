//! Pagination strategies.
//!
//! Strategy choice is a caller concern; every page request routes through
//! the same rate-limit, retry and circuit-breaker machinery as single calls.

use super::client::{BatchFailure, RemoteClient};
use crate::context::RunContext;
use crate::errors::Result;

/// How an endpoint's result set is iterated.
#[derive(Debug, Clone)]
pub enum PageStrategy {
    /// Numeric offset windows: `offset`/`limit` style.
    Offset {
        /// Items requested per page.
        page_size: usize,
        /// Name of the offset parameter.
        offset_param: String,
        /// Name of the page-size parameter.
        limit_param: String,
    },
    /// Opaque continuation tokens handed back by the server.
    Cursor {
        /// Items requested per page.
        page_size: usize,
        /// Name of the cursor parameter.
        cursor_param: String,
        /// Name of the page-size parameter.
        limit_param: String,
    },
    /// An explicit identifier list, fetched through adaptive batching.
    IdList {
        /// Identifiers to fetch.
        ids: Vec<String>,
        /// Upstream batch-size limit.
        max_batch_size: usize,
    },
}

impl PageStrategy {
    /// Offset pagination with conventional parameter names.
    #[must_use]
    pub fn offset(page_size: usize) -> Self {
        Self::Offset {
            page_size,
            offset_param: "offset".to_string(),
            limit_param: "limit".to_string(),
        }
    }

    /// Cursor pagination with conventional parameter names.
    #[must_use]
    pub fn cursor(page_size: usize, cursor_param: impl Into<String>) -> Self {
        Self::Cursor {
            page_size,
            cursor_param: cursor_param.into(),
            limit_param: "limit".to_string(),
        }
    }
}

/// What the caller's page parser extracted from one page payload.
#[derive(Debug, Clone, Default)]
pub struct PageInfo {
    /// Items carried by this page.
    pub item_count: usize,
    /// Continuation token for the next page, if the server supplied one.
    pub next_cursor: Option<String>,
}

/// All pages of a paged fetch, plus per-identifier failures for id-list
/// iteration.
#[derive(Debug, Default)]
pub struct PagedResult {
    /// Page payloads in fetch order.
    pub pages: Vec<serde_json::Value>,
    /// Identifier failures; empty for offset and cursor strategies.
    pub failures: Vec<BatchFailure>,
}

impl RemoteClient {
    /// Fetches every page of a result set.
    ///
    /// `parse` inspects each page payload and reports how many items it
    /// carried and, for cursor iteration, the continuation token.
    pub async fn fetch_pages<F>(
        &self,
        ctx: &RunContext,
        endpoint: &str,
        base_params: &[(String, String)],
        strategy: PageStrategy,
        parse: F,
    ) -> Result<PagedResult>
    where
        F: Fn(&serde_json::Value) -> PageInfo + Send + Sync,
    {
        match strategy {
            PageStrategy::Offset {
                page_size,
                offset_param,
                limit_param,
            } => {
                let page_size = page_size.max(1);
                let mut pages = Vec::new();
                let mut offset = 0usize;
                loop {
                    let mut params = base_params.to_vec();
                    params.push((limit_param.clone(), page_size.to_string()));
                    params.push((offset_param.clone(), offset.to_string()));

                    let payload = self.call(ctx, endpoint, &params).await?;
                    let info = parse(&payload);
                    pages.push(payload);

                    if info.item_count < page_size {
                        break;
                    }
                    offset += page_size;
                }
                Ok(PagedResult {
                    pages,
                    failures: Vec::new(),
                })
            }
            PageStrategy::Cursor {
                page_size,
                cursor_param,
                limit_param,
            } => {
                let page_size = page_size.max(1);
                let mut pages = Vec::new();
                let mut cursor: Option<String> = None;
                loop {
                    let mut params = base_params.to_vec();
                    params.push((limit_param.clone(), page_size.to_string()));
                    if let Some(token) = &cursor {
                        params.push((cursor_param.clone(), token.clone()));
                    }

                    let payload = self.call(ctx, endpoint, &params).await?;
                    let info = parse(&payload);
                    pages.push(payload);

                    match info.next_cursor {
                        Some(token) => cursor = Some(token),
                        None => break,
                    }
                }
                Ok(PagedResult {
                    pages,
                    failures: Vec::new(),
                })
            }
            PageStrategy::IdList {
                ids,
                max_batch_size,
            } => {
                let outcome = self.call_batch(ctx, endpoint, &ids, max_batch_size).await?;
                Ok(PagedResult {
                    pages: outcome.payloads.into_iter().map(|(_, p)| p).collect(),
                    failures: outcome.failures,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::client::client::ClientSettings;
    use crate::client::transport::{RemoteRequest, RemoteResponse, Transport};
    use crate::config::{
        BatchConfig, BreakerConfig, CacheConfig, EndpointConfig, Jitter, RateLimitConfig,
        RetryConfig,
    };
    use crate::errors::RemoteErrorKind;
    use crate::events::CollectingEventSink;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct PagingTransport {
        total_items: usize,
    }

    #[async_trait]
    impl Transport for PagingTransport {
        async fn execute(
            &self,
            request: RemoteRequest,
        ) -> std::result::Result<RemoteResponse, RemoteErrorKind> {
            let get = |name: &str| {
                request
                    .params
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
            };
            let limit: usize = get("limit").and_then(|v| v.parse().ok()).unwrap_or(10);
            let offset: usize = get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);

            let remaining = self.total_items.saturating_sub(offset);
            let count = remaining.min(limit);
            let items: Vec<serde_json::Value> = (offset..offset + count)
                .map(|i| serde_json::json!({"id": format!("id{i}")}))
                .collect();

            Ok(RemoteResponse {
                status: 200,
                body: serde_json::json!({ "items": items }),
                retry_after: None,
            })
        }
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            endpoints: BTreeMap::new(),
            defaults: EndpointConfig {
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
                breaker: BreakerConfig::default(),
                batch: BatchConfig::default(),
                request_timeout_ms: 1_000,
            },
            cache: CacheConfig {
                enabled: false,
                ttl_secs: 60,
            },
            release: "r1".to_string(),
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(
            "test",
            "fp",
            Arc::new(CollectingEventSink::new()),
            Arc::new(CancellationToken::new()),
        )
    }

    #[tokio::test]
    async fn offset_pagination_walks_all_pages() {
        let client = RemoteClient::new(Arc::new(PagingTransport { total_items: 23 }), settings());
        let ctx = ctx();

        let result = client
            .fetch_pages(&ctx, "uniprot", &[], PageStrategy::offset(10), |payload| {
                PageInfo {
                    item_count: payload["items"].as_array().map_or(0, Vec::len),
                    next_cursor: None,
                }
            })
            .await
            .unwrap();

        // 10 + 10 + 3: the short page terminates iteration.
        assert_eq!(result.pages.len(), 3);
        assert_eq!(result.pages[2]["items"].as_array().unwrap().len(), 3);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn cursor_pagination_follows_tokens() {
        struct CursorTransport;

        #[async_trait]
        impl Transport for CursorTransport {
            async fn execute(
                &self,
                request: RemoteRequest,
            ) -> std::result::Result<RemoteResponse, RemoteErrorKind> {
                let cursor = request
                    .params
                    .iter()
                    .find(|(k, _)| k == "cursor")
                    .map(|(_, v)| v.clone());
                let body = match cursor.as_deref() {
                    None => serde_json::json!({"items": [1, 2], "next": "c1"}),
                    Some("c1") => serde_json::json!({"items": [3, 4], "next": "c2"}),
                    _ => serde_json::json!({"items": [5]}),
                };
                Ok(RemoteResponse {
                    status: 200,
                    body,
                    retry_after: None,
                })
            }
        }

        let client = RemoteClient::new(Arc::new(CursorTransport), settings());
        let ctx = ctx();

        let result = client
            .fetch_pages(
                &ctx,
                "ensembl",
                &[],
                PageStrategy::cursor(2, "cursor"),
                |payload| PageInfo {
                    item_count: payload["items"].as_array().map_or(0, Vec::len),
                    next_cursor: payload["next"].as_str().map(str::to_string),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.pages.len(), 3);
    }
}
