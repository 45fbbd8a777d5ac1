pub(crate) mod debug;
pub mod web;
