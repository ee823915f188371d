// ── Host context ──
//
// Everything collectors share for one host: the config, the structured
// query client (when an API key is set) and the legacy session registered
// in the process-wide session store.

use std::sync::Arc;

use tracing::debug;

use nasmon_api::{HostEndpoint, HostSession, LegacyClient, QueryClient, SessionStore};

use crate::collector::Collector;
use crate::collector::registry;
use crate::config::HostConfig;
use crate::error::CoreError;

pub struct HostContext {
    config: HostConfig,
    endpoint: HostEndpoint,
    query: Option<QueryClient>,
    session: Arc<HostSession>,
}

impl HostContext {
    /// Build clients for `config` and register its legacy session in `sessions`.
    ///
    /// No network traffic happens here; logins are deferred to the first
    /// collector that needs one.
    pub fn new(config: HostConfig, sessions: &SessionStore) -> Result<Self, CoreError> {
        let endpoint = HostEndpoint::new(config.name.clone(), config.url.clone());
        let transport = config.tls.to_transport(config.timeout);

        let query = config
            .api_key
            .as_ref()
            .map(|key| QueryClient::from_api_key(&endpoint, key, &transport))
            .transpose()?;

        let legacy = LegacyClient::new(endpoint.clone(), &transport)?;
        let session = sessions.register(HostSession::new(legacy, config.credentials.clone()));

        debug!(
            host = %endpoint,
            query_api = query.is_some(),
            legacy_credentials = session.has_credentials(),
            "host context ready"
        );

        Ok(Self {
            config,
            endpoint,
            query,
            session,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn endpoint(&self) -> &HostEndpoint {
        &self.endpoint
    }

    pub fn query(&self) -> Option<&QueryClient> {
        self.query.as_ref()
    }

    pub fn session(&self) -> Arc<HostSession> {
        Arc::clone(&self.session)
    }

    /// Every enabled collector for this host.
    pub fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        registry::create_collectors(self)
    }

    /// A single collector by name, ignoring the disabled list.
    pub fn collector(&self, name: &str) -> Result<Arc<dyn Collector>, CoreError> {
        let factory = registry::find(name).ok_or_else(|| CoreError::Config {
            message: format!(
                "unknown collector '{name}' (known: {})",
                registry::names().collect::<Vec<_>>().join(", ")
            ),
        })?;
        let mut config = self.config.clone();
        config.disabled.clear();
        let ctx = HostContext {
            config,
            endpoint: self.endpoint.clone(),
            query: self.query.clone(),
            session: self.session(),
        };
        registry::build_one(factory, &ctx).ok_or_else(|| CoreError::Config {
            message: format!("collector '{name}' needs an API key for host '{}'", self.config.name),
        })
    }
}
