//! Public contract of the fluxgate API gateway.
//!
//! The SDK carries everything an adapter or registry implementation needs
//! without depending on the gateway itself: the endpoint metadata model,
//! registry event types, the serve-error structure, and the [`WebContext`]
//! capability trait.

pub mod error;
pub mod models;
pub mod web;

pub use error::{ServeError, codes};
pub use models::{
    ATTR_AUTHORIZE, ATTR_FILTERS, ArgType, Argument, Attribute, Endpoint, EndpointEvent,
    EventType, HttpScope, Protocol,
};
pub use web::WebContext;
