//! HTTP layer: routes, handlers, error responses and the browser page

pub mod endpoints;
pub mod error;
pub mod page;
