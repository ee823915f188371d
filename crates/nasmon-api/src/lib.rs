// nasmon-api: async clients for NAS host APIs (structured query + legacy web)

pub mod auth;
pub mod error;
pub mod legacy;
pub mod query;
pub mod transport;

pub use auth::{HostEndpoint, LegacyCredentials, SessionToken};
pub use error::Error;
pub use legacy::{HostSession, LegacyClient, LegacyResponse, SessionStore};
pub use query::QueryClient;
pub use transport::{TlsMode, TransportConfig};
