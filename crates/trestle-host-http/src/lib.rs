//! Trestle Host HTTP
//!
//! Outbound HTTP for actions. Every request goes through an [`HttpPolicy`]
//! (which hosts may be called) and an [`HttpClient`] that bounds each attempt
//! with a timeout and retries transport failures and 5xx responses a fixed
//! number of times.

mod client;
mod error;
mod policy;

pub use client::{HttpClient, HttpResponse, parse_method};
pub use error::HttpError;
pub use policy::HttpPolicy;
pub use reqwest::Method;
