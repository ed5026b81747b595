//! Per-request state (§3 "Request Context") carried across the handler
//! stack. See `context` module for the task-local plumbing and the
//! session-store recovery chain built on top of this type.

use chrono::{DateTime, Utc};

use super::principal::Principal;

/// One per ingress request. `principal` is absent until authentication
/// succeeds; it is filled in by the Authentication Resolver and from then
/// on carried implicitly by the `context` module's task-local storage.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: std::net::IpAddr,
    pub user_agent: String,
    pub principal: Option<Principal>,
    pub request_start_time: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, client_ip: std::net::IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client_ip,
            user_agent: user_agent.into(),
            principal: None,
            request_start_time: Utc::now(),
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.user_id.as_str())
    }
}
