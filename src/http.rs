//! Shared HTTP client factory.
//!
//! One client (and its connection pool) is built at startup and shared by all
//! requests. Overall timeouts are applied per request, since they depend on
//! the endpoint variant.

use reqwest::Client;
use std::time::Duration;

/// Timeout for establishing a connection to the upstream API.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const USER_AGENT: &str = concat!("imagegen-plugin/", env!("CARGO_PKG_VERSION"));

/// Create the shared upstream HTTP client.
pub fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}
