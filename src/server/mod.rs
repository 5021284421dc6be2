//! HTTP/JSON binding of the game service.

mod bootstrap;
pub mod dto;
pub mod error;
mod logging;
mod routes;

pub use bootstrap::{run_server, DevFixtures, DevPlayer, ServerConfig};
pub use error::ApiError;
pub use logging::log_requests;
pub use routes::{BearerToken, GuerraServer};
