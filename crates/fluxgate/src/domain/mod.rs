pub mod assemble;
pub mod context;
pub mod filter;
pub mod lookup;
pub mod resolver;
pub mod table;

pub use assemble::{AssembleError, assemble_form, assemble_invocation};
pub use context::{ContextPool, GatewayContext, ResponseBuffer};
pub use filter::{ArcInvoker, Filter, FilterRegistry, Invoker};
pub use lookup::lookup_raw;
pub use resolver::{ResolveError, ResolveFn, ResolverRegistry};
pub use table::{EndpointTable, MultiVersionEndpoint, route_key};
