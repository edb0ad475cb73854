//! Bounded registry of running services for one scope.
//!
//! The registry map is the single shared mutable structure of a scope;
//! start, explicit stop and quit-time deregistration all serialize on
//! its lock, so a service quitting concurrently with a stop request
//! cannot lose an update. The lock is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::ServiceConfig;
use crate::core::error::{Error, Result};

use super::{Service, ServiceWrapper};

type Registry = Arc<Mutex<HashMap<u64, Arc<ServiceWrapper>>>>;

pub struct ServiceManager {
    scope: String,
    max_consumers: usize,
    buffer_capacity: usize,
    services: Registry,
}

impl ServiceManager {
    pub fn new(scope: impl Into<String>, config: ServiceConfig) -> Self {
        Self {
            scope: scope.into(),
            max_consumers: config.max_consumers,
            buffer_capacity: config.buffer_capacity,
            services: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn max_consumers(&self) -> usize {
        self.max_consumers
    }

    /// Starts a service unless the scope is at its concurrency cap.
    /// The wrapper deregisters itself from this manager when it quits.
    pub fn start(&self, service: Arc<dyn Service>) -> Result<u64> {
        let wrapper = Arc::new(ServiceWrapper::new(service, self.buffer_capacity));

        let registry = Arc::clone(&self.services);
        let scope = self.scope.clone();
        wrapper.set_on_quit(move |sid| {
            // Idempotent versus an explicit stop that already removed us.
            if registry
                .lock()
                .expect("service registry lock poisoned")
                .remove(&sid)
                .is_some()
            {
                debug!(target: "mqprobe::service", %scope, sid, "service deregistered on quit");
            }
        });

        let mut guard = self.services.lock().expect("service registry lock poisoned");
        if guard.len() >= self.max_consumers {
            return Err(Error::CapacityExceeded {
                limit: self.max_consumers,
            });
        }
        // Insert happens under the same lock the quit hook takes, so a
        // service that terminates instantly still deregisters after the
        // insert, never before.
        let sid = wrapper.start();
        let previous = guard.insert(sid, Arc::clone(&wrapper));
        debug_assert!(previous.is_none(), "sid {sid} registered twice");
        debug!(target: "mqprobe::service", scope = %self.scope, sid, name = %wrapper.name(), "service started");
        Ok(sid)
    }

    /// Stops and removes a service. Unknown sids are a no-op so duplicate
    /// stop requests from a UI are harmless.
    pub async fn stop(&self, sid: u64) {
        let wrapper = self
            .services
            .lock()
            .expect("service registry lock poisoned")
            .remove(&sid);
        if let Some(wrapper) = wrapper {
            wrapper.stop().await;
            debug!(target: "mqprobe::service", scope = %self.scope, sid, "service stopped");
        }
    }

    /// Stops every service in this scope.
    pub async fn stop_all(&self) {
        let wrappers: Vec<Arc<ServiceWrapper>> = {
            let mut guard = self.services.lock().expect("service registry lock poisoned");
            guard.drain().map(|(_, w)| w).collect()
        };
        for wrapper in wrappers {
            wrapper.stop().await;
        }
    }

    pub fn get(&self, sid: u64) -> Option<Arc<ServiceWrapper>> {
        self.services
            .lock()
            .expect("service registry lock poisoned")
            .get(&sid)
            .cloned()
    }

    /// Read snapshot of the live registry, ordered by sid.
    pub fn all(&self) -> Vec<Arc<ServiceWrapper>> {
        let guard = self.services.lock().expect("service registry lock poisoned");
        let mut wrappers: Vec<Arc<ServiceWrapper>> = guard.values().cloned().collect();
        wrappers.sort_by_key(|w| w.sid());
        wrappers
    }

    pub fn len(&self) -> usize {
        self.services
            .lock()
            .expect("service registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
