//! Per-invocation execution context
//!
//! Every stage and every spawned task receives a [`CallContext`] value
//! carrying the correlation id of the work it performs. Concurrent
//! invocations hold separate values, so one can never observe another's id.

use crate::log_system::CorrelationId;
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Meta key a client may use to supply its own correlation id.
pub const CLIENT_CORRELATION_KEY: &str = "correlationId";

const PROGRESS_TOKEN_KEY: &str = "progressToken";

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub token: Option<Value>,
    pub progress: f64,
    pub total: Option<f64>,
    pub message: Option<String>,
}

/// Protocol-level data handed through to the stages unchanged.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub request_id: Option<Value>,
    pub meta: Map<String, Value>,
    progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl RequestContext {
    pub fn new(request_id: Option<Value>, meta: Map<String, Value>) -> Self {
        Self {
            request_id,
            meta,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn client_correlation_id(&self) -> Option<CorrelationId> {
        self.meta
            .get(CLIENT_CORRELATION_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(CorrelationId::from_client)
    }

    /// Send a progress notification if the caller asked for them. Returns
    /// whether anything was sent.
    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) -> bool {
        let Some(sink) = &self.progress else {
            return false;
        };

        sink.send(ProgressUpdate {
            token: self.meta.get(PROGRESS_TOKEN_KEY).cloned(),
            progress,
            total,
            message,
        })
        .is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    correlation: Option<CorrelationId>,
    parent: Option<CorrelationId>,
    request: Option<Arc<RequestContext>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(request: RequestContext) -> Self {
        Self {
            request: Some(Arc::new(request)),
            ..Self::default()
        }
    }

    /// Bind `id`, or a fresh one when `None`, and return it.
    pub fn set_current(&mut self, id: Option<CorrelationId>) -> CorrelationId {
        let id = id.unwrap_or_default();
        self.correlation = Some(id.clone());
        id
    }

    pub fn current(&self) -> Option<&CorrelationId> {
        self.correlation.as_ref()
    }

    pub fn clear(&mut self) {
        self.correlation = None;
    }

    /// Keep the bound id, else adopt the client's, else generate one.
    pub fn ensure_current(&mut self) -> CorrelationId {
        if let Some(id) = &self.correlation {
            return id.clone();
        }
        let client = self.request().and_then(RequestContext::client_correlation_id);
        self.set_current(client)
    }

    /// Bind a fresh id until the returned guard drops, then restore the
    /// previous binding.
    pub fn scoped(&mut self) -> CorrelationScope<'_> {
        let previous = self.correlation.take();
        self.set_current(None);
        CorrelationScope {
            ctx: self,
            previous,
        }
    }

    /// Context for a spawned sub-task: fresh id, same request, parent recorded.
    pub fn child(&self) -> CallContext {
        CallContext {
            correlation: Some(CorrelationId::new()),
            parent: self.correlation.clone(),
            request: self.request.clone(),
        }
    }

    pub fn parent(&self) -> Option<&CorrelationId> {
        self.parent.as_ref()
    }

    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }

    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) -> bool {
        self.request()
            .map(|request| request.report_progress(progress, total, message))
            .unwrap_or(false)
    }
}

pub struct CorrelationScope<'a> {
    ctx: &'a mut CallContext,
    previous: Option<CorrelationId>,
}

impl Deref for CorrelationScope<'_> {
    type Target = CallContext;

    fn deref(&self) -> &CallContext {
        self.ctx
    }
}

impl DerefMut for CorrelationScope<'_> {
    fn deref_mut(&mut self) -> &mut CallContext {
        self.ctx
    }
}

impl Drop for CorrelationScope<'_> {
    fn drop(&mut self) {
        self.ctx.correlation = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_set_and_clear() {
        let mut ctx = CallContext::new();
        assert!(ctx.current().is_none());

        let id = ctx.set_current(None);
        assert_eq!(ctx.current(), Some(&id));

        let given = CorrelationId::from_client("req_given");
        assert_eq!(ctx.set_current(Some(given.clone())), given);

        ctx.clear();
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_scope_restores_previous_binding() {
        let mut ctx = CallContext::new();
        let outer = ctx.set_current(None);

        let inner = {
            let scope = ctx.scoped();
            let inner = scope.current().cloned().unwrap();
            assert_ne!(inner, outer);
            inner
        };

        assert_eq!(ctx.current(), Some(&outer));
        assert_ne!(ctx.current(), Some(&inner));
    }

    #[test]
    fn test_scope_clears_on_early_exit() {
        fn fails(ctx: &mut CallContext) -> Result<(), &'static str> {
            let _scope = ctx.scoped();
            Err("boom")
        }

        let mut ctx = CallContext::new();
        assert!(fails(&mut ctx).is_err());
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_ensure_current_prefers_client_id() {
        let mut meta = Map::new();
        meta.insert(CLIENT_CORRELATION_KEY.into(), json!("req_from_client"));
        let mut ctx = CallContext::with_request(RequestContext::new(Some(json!(1)), meta));

        assert_eq!(ctx.ensure_current().as_str(), "req_from_client");

        let mut plain = CallContext::new();
        let generated = plain.ensure_current();
        assert!(generated.as_str().starts_with("req_"));
        assert_eq!(plain.ensure_current(), generated);
    }

    #[test]
    fn test_children_get_distinct_ids() {
        let mut parent = CallContext::new();
        let parent_id = parent.set_current(None);

        let children: Vec<CallContext> = (0..10).map(|_| parent.child()).collect();
        let ids: HashSet<_> = children.iter().map(|c| c.current().cloned().unwrap()).collect();

        assert_eq!(ids.len(), 10);
        assert!(!ids.contains(&parent_id));
        assert!(children.iter().all(|c| c.parent() == Some(&parent_id)));
    }

    #[tokio::test]
    async fn test_concurrent_invocations_never_share_ids() {
        let handles: Vec<_> = (0..20)
            .map(|_| {
                tokio::spawn(async move {
                    let mut ctx = CallContext::new();
                    let id = ctx.set_current(None);
                    tokio::task::yield_now().await;
                    assert_eq!(ctx.current(), Some(&id));
                    id
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_progress_reaches_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut meta = Map::new();
        meta.insert("progressToken".into(), json!("tok"));
        let ctx = CallContext::with_request(RequestContext::new(None, meta).with_progress(tx));

        assert!(ctx.report_progress(1.0, Some(2.0), Some("half".into())));
        let update = rx.try_recv().unwrap();
        assert_eq!(update.token, Some(json!("tok")));
        assert_eq!(update.total, Some(2.0));

        assert!(!CallContext::new().report_progress(1.0, None, None));
    }
}
