pub mod context;
pub mod interceptor;
pub mod router;

pub use context::AxumWebContext;
pub use router::{PatternRouter, RouteRegistrar};
