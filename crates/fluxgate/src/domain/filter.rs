use std::sync::Arc;

use async_trait::async_trait;
use fluxgate_sdk::ServeError;

use super::context::GatewayContext;

/// Terminal or wrapped invocation step. The transport invokers implement
/// this directly; filters produce wrapping invokers around a `next`.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, ctx: &mut GatewayContext) -> Result<(), ServeError>;
}

pub type ArcInvoker = Arc<dyn Invoker>;

/// Stateless interceptor with a stable id and an ordering weight.
///
/// `invoke` receives the downstream invoker and returns the wrapped one; it
/// must call `next` at most once and must not retain the context past its
/// own invocation. Returning an error without calling `next` short-circuits
/// the chain.
pub trait Filter: Send + Sync {
    /// Stable id selective endpoints reference this filter by.
    fn type_id(&self) -> &str;

    /// Ascending execution order; ties resolve by registration order.
    fn order(&self) -> i32 {
        0
    }

    fn invoke(&self, next: ArcInvoker) -> ArcInvoker;
}

struct FilterEntry {
    filter: Arc<dyn Filter>,
    order: i32,
    seq: usize,
}

/// Ordered filter container owned by the composition root.
///
/// Both lists are sorted by ascending order on insertion (stable on
/// registration sequence) and are read-only once serving starts, so lookups
/// take no locks.
#[derive(Default)]
pub struct FilterRegistry {
    global: Vec<FilterEntry>,
    selective: Vec<FilterEntry>,
    seq: usize,
}

impl FilterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, filter: Arc<dyn Filter>) {
        let order = filter.order();
        self.global.push(FilterEntry {
            filter,
            order,
            seq: self.seq,
        });
        self.seq += 1;
        self.global.sort_by_key(|e| (e.order, e.seq));
    }

    pub fn add_selective(&mut self, filter: Arc<dyn Filter>) {
        let order = filter.order();
        self.selective.push(FilterEntry {
            filter,
            order,
            seq: self.seq,
        });
        self.seq += 1;
        self.selective.sort_by_key(|e| (e.order, e.seq));
    }

    #[must_use]
    pub fn global_filters(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.global.iter().map(|e| &e.filter)
    }

    #[must_use]
    pub fn selective_by_id(&self, type_id: &str) -> Option<Arc<dyn Filter>> {
        self.selective
            .iter()
            .find(|e| e.filter.type_id() == type_id)
            .map(|e| e.filter.clone())
    }

    /// Build the per-request chain: global filters, then the endpoint's
    /// selective filters (declaration order), terminating in `terminal`.
    ///
    /// The chain folds right-to-left so the first filter runs outermost.
    #[must_use]
    pub fn build_chain(
        &self,
        selected: &[Arc<dyn Filter>],
        terminal: ArcInvoker,
    ) -> ArcInvoker {
        let mut invoker = terminal;
        for filter in selected.iter().rev() {
            invoker = filter.invoke(invoker);
        }
        for entry in self.global.iter().rev() {
            invoker = entry.filter.invoke(invoker);
        }
        invoker
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records its tag into a shared trace when invoked.
    struct TraceFilter {
        id: &'static str,
        order: i32,
        trace: Arc<Mutex<Vec<&'static str>>>,
    }

    struct TraceStep {
        id: &'static str,
        trace: Arc<Mutex<Vec<&'static str>>>,
        next: ArcInvoker,
    }

    #[async_trait]
    impl Invoker for TraceStep {
        async fn invoke(&self, ctx: &mut GatewayContext) -> Result<(), ServeError> {
            self.trace.lock().unwrap().push(self.id);
            self.next.invoke(ctx).await
        }
    }

    impl Filter for TraceFilter {
        fn type_id(&self) -> &str {
            self.id
        }

        fn order(&self) -> i32 {
            self.order
        }

        fn invoke(&self, next: ArcInvoker) -> ArcInvoker {
            Arc::new(TraceStep {
                id: self.id,
                trace: self.trace.clone(),
                next,
            })
        }
    }

    struct Terminal {
        trace: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Invoker for Terminal {
        async fn invoke(&self, _ctx: &mut GatewayContext) -> Result<(), ServeError> {
            self.trace.lock().unwrap().push("terminal");
            Ok(())
        }
    }

    struct Rejecting;

    impl Filter for Rejecting {
        fn type_id(&self) -> &str {
            "Rejecting"
        }

        fn invoke(&self, _next: ArcInvoker) -> ArcInvoker {
            struct Step;
            #[async_trait]
            impl Invoker for Step {
                async fn invoke(&self, _ctx: &mut GatewayContext) -> Result<(), ServeError> {
                    Err(ServeError::new(
                        http::StatusCode::UNAUTHORIZED,
                        fluxgate_sdk::codes::REQUEST_INVALID,
                        "rejected",
                    ))
                }
            }
            Arc::new(Step)
        }
    }

    fn trace_filter(
        id: &'static str,
        order: i32,
        trace: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn Filter> {
        Arc::new(TraceFilter {
            id,
            order,
            trace: trace.clone(),
        })
    }

    #[tokio::test]
    async fn filters_run_in_ascending_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FilterRegistry::new();
        registry.add_global(trace_filter("three", 3, &trace));
        registry.add_global(trace_filter("one", 1, &trace));
        registry.add_global(trace_filter("two", 2, &trace));

        let chain = registry.build_chain(&[], Arc::new(Terminal { trace: trace.clone() }));
        let mut ctx = GatewayContext::new();
        chain.invoke(&mut ctx).await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["one", "two", "three", "terminal"]);
    }

    #[tokio::test]
    async fn order_ties_resolve_by_registration() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FilterRegistry::new();
        registry.add_global(trace_filter("first", 5, &trace));
        registry.add_global(trace_filter("second", 5, &trace));

        let chain = registry.build_chain(&[], Arc::new(Terminal { trace: trace.clone() }));
        let mut ctx = GatewayContext::new();
        chain.invoke(&mut ctx).await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["first", "second", "terminal"]);
    }

    #[tokio::test]
    async fn selective_filters_run_after_global() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FilterRegistry::new();
        registry.add_global(trace_filter("global", 0, &trace));
        registry.add_selective(trace_filter("selected", 0, &trace));

        let selected = vec![registry.selective_by_id("selected").unwrap()];
        let chain = registry.build_chain(&selected, Arc::new(Terminal { trace: trace.clone() }));
        let mut ctx = GatewayContext::new();
        chain.invoke(&mut ctx).await.unwrap();

        assert_eq!(
            *trace.lock().unwrap(),
            vec!["global", "selected", "terminal"]
        );
    }

    #[tokio::test]
    async fn short_circuit_stops_downstream() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FilterRegistry::new();
        registry.add_global(trace_filter("outer", 1, &trace));
        registry.add_global(Arc::new(Rejecting));
        registry.add_global(trace_filter("inner", 10, &trace));

        let chain = registry.build_chain(&[], Arc::new(Terminal { trace: trace.clone() }));
        let mut ctx = GatewayContext::new();
        let err = chain.invoke(&mut ctx).await.unwrap_err();

        assert_eq!(err.status_code, http::StatusCode::UNAUTHORIZED);
        // Rejecting sorts first (order 0) and never calls next.
        assert!(trace.lock().unwrap().is_empty());
    }

    #[test]
    fn selective_lookup_by_id() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut registry = FilterRegistry::new();
        registry.add_selective(trace_filter("Auth", 0, &trace));

        assert!(registry.selective_by_id("Auth").is_some());
        assert!(registry.selective_by_id("Missing").is_none());
    }
}
