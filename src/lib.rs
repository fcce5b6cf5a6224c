pub mod analytics;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod http;
pub mod transport;
pub mod utils;

pub use client::SubmissionClient;
pub use document::{Description, Document, Product};
pub use error::{AppError, Result};
pub use http::rate_limiter::RateLimiter;
pub use transport::{DocumentTransport, HttpTransport, TransportResponse};
pub use utils::time::TimeUnit;
