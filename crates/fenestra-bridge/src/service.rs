//! Named service exposure over the RPC handler table.
//!
//! A service is a name plus a set of member handlers, assembled explicitly at
//! registration time. Exposing registers every member under
//! `"Service.member"` with the member name case-folded to the peer runtime's
//! lowerCamelCase convention; removing erases all of the service's entries.
//! Both are plain table operations — there is no runtime type inspection.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use fenestra_core::RateLimit;

use crate::rate_limit::{RateLimitWindow, RateLimited};
use crate::rpc::{MethodHandler, RpcService};

/// Builder for one named service's member table.
pub struct ServiceMethods {
    name: String,
    members: Vec<(String, Arc<dyn MethodHandler>)>,
}

impl ServiceMethods {
    /// Start a member table for the named service.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Add a member handler. The member name is case-folded to
    /// lowerCamelCase (`get_user` and `GetUser` both become `getUser`).
    #[must_use]
    pub fn member(mut self, name: &str, handler: impl MethodHandler + 'static) -> Self {
        self.members.push((fold_member(name), Arc::new(handler)));
        self
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Case-fold a member name to the peer runtime's lowerCamelCase convention.
fn fold_member(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for (i, segment) in name.split('_').filter(|s| !s.is_empty()).enumerate() {
        let mut chars = segment.chars();
        let Some(first) = chars.next() else { continue };
        if i == 0 {
            folded.extend(first.to_lowercase());
        } else {
            folded.extend(first.to_uppercase());
        }
        folded.push_str(chars.as_str());
    }
    folded
}

/// Registers named services into an [`RpcService`]'s handler table, wrapping
/// each member with the configured call budget.
pub struct BridgeService {
    rpc: Arc<RpcService>,
    rate_limit: Option<RateLimit>,
    exposed: Mutex<HashMap<String, Vec<String>>>,
}

impl BridgeService {
    /// Create a bridge over the given RPC endpoint.
    #[must_use]
    pub fn new(rpc: Arc<RpcService>, rate_limit: Option<RateLimit>) -> Self {
        Self {
            rpc,
            rate_limit,
            exposed: Mutex::new(HashMap::new()),
        }
    }

    /// Expose a service: register every member under `"Service.member"`.
    ///
    /// Re-exposing a service replaces its previous member table. When a rate
    /// limit is configured, each exposed method gets its own sliding window,
    /// shared across concurrent calls to that method only.
    pub fn expose(&self, methods: ServiceMethods) {
        self.remove(&methods.name);

        let mut registered = Vec::with_capacity(methods.members.len());
        for (member, handler) in methods.members {
            let full_name = format!("{}.{member}", methods.name);
            let handler = match self.rate_limit {
                Some(limit) => Arc::new(RateLimited::new(
                    ArcHandler(handler),
                    Arc::new(RateLimitWindow::new(limit)),
                )) as Arc<dyn MethodHandler>,
                None => handler,
            };
            self.rpc.handlers().register(&full_name, handler);
            registered.push(full_name);
        }

        debug!(service = methods.name, methods = registered.len(), "bridge service exposed");
        let _ = self.exposed.lock().insert(methods.name, registered);
    }

    /// Remove a service's entire member table. Idempotent.
    pub fn remove(&self, service: &str) {
        let Some(registered) = self.exposed.lock().remove(service) else {
            return;
        };
        for method in &registered {
            self.rpc.handlers().remove(method);
        }
        debug!(service, methods = registered.len(), "bridge service removed");
    }

    /// Names of currently exposed services (sorted).
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.exposed.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove every exposed service. Used at teardown.
    pub fn clear(&self) {
        let names = self.services();
        for name in names {
            self.remove(&name);
        }
    }
}

/// Lets an `Arc<dyn MethodHandler>` sit inside a [`RateLimited`] wrapper.
struct ArcHandler(Arc<dyn MethodHandler>);

#[async_trait::async_trait]
impl MethodHandler for ArcHandler {
    async fn handle(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, fenestra_core::RpcError> {
        self.0.handle(params).await
    }
}
