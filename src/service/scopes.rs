//! Process-wide map of service managers, one per scope.
//!
//! Scopes keep each user's running consumers separate from everyone
//! else's, plus one global scope for unowned services. The map is an
//! explicit object handed around by the application (no module-level
//! singletons); managers are created lazily and live for the process.

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::ServiceConfig;

use super::ServiceManager;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    User(String),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::User(name) => write!(f, "user:{name}"),
        }
    }
}

pub struct ServiceScopes {
    config: ServiceConfig,
    managers: DashMap<Scope, Arc<ServiceManager>>,
}

impl ServiceScopes {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            managers: DashMap::new(),
        }
    }

    pub fn manager(&self, scope: Scope) -> Arc<ServiceManager> {
        self.managers
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(ServiceManager::new(scope.to_string(), self.config)))
            .clone()
    }

    pub fn global(&self) -> Arc<ServiceManager> {
        self.manager(Scope::Global)
    }

    pub fn user(&self, name: impl Into<String>) -> Arc<ServiceManager> {
        self.manager(Scope::User(name.into()))
    }

    /// Scopes that have been touched so far.
    pub fn scopes(&self) -> Vec<Scope> {
        self.managers.iter().map(|e| e.key().clone()).collect()
    }
}
