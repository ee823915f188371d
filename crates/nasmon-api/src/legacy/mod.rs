// Legacy web interface: cookie login, shared sessions and raw GETs
// against PHP scripts, static JSON files and HTML pages.

pub mod auth;
pub mod client;
pub mod response;
pub mod session;

pub use client::LegacyClient;
pub use response::LegacyResponse;
pub use session::{HostSession, SessionStore};
