//! API middleware components

pub mod request;

pub use request::request_middleware;
