//! HTTP transport for the offer backend.

mod http;

pub use http::HttpOfferBackend;
