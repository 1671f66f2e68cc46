pub mod client;
pub mod google;
pub mod reqwest_client;

pub use reqwest;

// Re-export some types to use with the http client.
pub use reqwest::header::HeaderMap;
pub use reqwest::{Method, Request, StatusCode};
pub use url::Url;
