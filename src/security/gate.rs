//! The Security Gate (§4.1): the one place every ingress request — HTTP or
//! RPC — passes through before any further work happens. Evaluation order
//! is load-bearing (cheap/local checks first, expensive ones last) and is
//! not configurable.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::request_context::RequestContext;
use crate::security::audit::{AuditEvent, AuditLevel, EventType, SecurityAudit};
use crate::security::ip_tables::IpTables;
use crate::security::rate_limiter::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Allow,
    Deny,
    RateLimit,
    IpBlock,
    CaptchaRequired,
}

#[derive(Debug, Clone)]
pub struct GateDecision {
    pub action: GateAction,
    pub reason: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self { action: GateAction::Allow, reason: None }
    }

    pub fn allowed(&self) -> bool {
        self.action == GateAction::Allow
    }

    fn deny(action: GateAction, reason: impl Into<String>) -> Self {
        Self { action, reason: Some(reason.into()) }
    }

    /// Short machine-readable code for the `X-Security-Reason` response
    /// header (§8 Scenario E expects the literal `RATE_LIMIT`, not the
    /// free-text `reason` used for audit logging).
    pub fn reason_code(&self) -> &'static str {
        match self.action {
            GateAction::Allow => "ALLOW",
            GateAction::Deny => "DENIED",
            GateAction::RateLimit => "RATE_LIMIT",
            GateAction::IpBlock => "IP_BLOCKED",
            GateAction::CaptchaRequired => "CAPTCHA_REQUIRED",
        }
    }
}

static SUSPICIOUS_AGENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bot|crawler|spider|scanner").expect("static regex compiles"));

/// Request-path substrings that indicate traversal attempts (§4.1 step 6,
/// first clause).
const TRAVERSAL_PATTERNS: [&str; 4] = ["../", "..\\", "%2e%2e", "....//"];

fn looks_like_traversal(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    TRAVERSAL_PATTERNS.iter().any(|p| lowered.contains(p))
}

/// §4.1 step 6, second clause: dot-prefixed segments, `__`, or
/// `passwd`/`shadow` substrings.
fn looks_suspicious(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    if lowered.contains("passwd") || lowered.contains("shadow") || lowered.contains("__") {
        return true;
    }
    path.split('/').any(|segment| segment.starts_with('.') && !segment.is_empty())
}

#[derive(Clone)]
pub struct SecurityGate {
    ip_tables: Arc<IpTables>,
    rate_limiter: Arc<RateLimiter>,
    audit: SecurityAudit,
}

impl SecurityGate {
    pub fn new(ip_tables: Arc<IpTables>, rate_limiter: Arc<RateLimiter>, audit: SecurityAudit) -> Self {
        Self { ip_tables, rate_limiter, audit }
    }

    /// Evaluates one ingress request. `context` carries the client IP and
    /// user agent; its `principal` field may or may not be populated
    /// depending on whether this call happens before or after
    /// authentication (the user-scoped rate limit only applies once a
    /// principal is known).
    pub async fn check(&self, context: &RequestContext, request_path: &str, request_method: &str) -> GateDecision {
        let gate = self.clone();
        let task_context = context.clone();
        let task_path = request_path.to_string();

        // §4.1: any uncaught fault during evaluation fails closed. Running
        // `evaluate` on its own task means a panic there surfaces as a
        // `JoinError` here instead of unwinding this request's task, so it
        // can be turned into a DENY rather than taking the whole request
        // down with it.
        let decision = match tokio::spawn(async move { gate.evaluate(&task_context, &task_path).await }).await {
            Ok(decision) => decision,
            Err(join_error) => GateDecision::deny(GateAction::Deny, format!("security check panicked: {join_error}")),
        };

        if !decision.allowed() {
            self.audit_decision(context, request_path, request_method, &decision);
        }
        decision
    }

    async fn evaluate(&self, context: &RequestContext, request_path: &str) -> GateDecision {
        let ip = context.client_ip;

        // 1. IP allow-list.
        if !self.ip_tables.is_whitelisted(ip) {
            return GateDecision::deny(GateAction::IpBlock, "IP is not whitelisted");
        }

        // 2. IP deny-list.
        if self.ip_tables.is_blacklisted(ip) {
            return GateDecision::deny(GateAction::IpBlock, "IP is blacklisted");
        }

        // 3. Rate limit by IP.
        if !self.rate_limiter.is_allowed(&format!("ip:{ip}")).await {
            return GateDecision::deny(GateAction::RateLimit, "IP rate limit exceeded");
        }

        // 4. Rate limit by user, if known.
        if let Some(principal) = &context.principal {
            if !self.rate_limiter.is_allowed(&format!("user:{}", principal.username)).await {
                return GateDecision::deny(GateAction::RateLimit, "user rate limit exceeded");
            }
        }

        // 5. User-Agent check.
        if context.user_agent.trim().is_empty() {
            return GateDecision::deny(GateAction::Deny, "empty User-Agent");
        }
        if SUSPICIOUS_AGENT.is_match(&context.user_agent) {
            return GateDecision::deny(GateAction::Deny, "suspicious User-Agent");
        }

        // 6. Path heuristics.
        if looks_like_traversal(request_path) {
            return GateDecision::deny(GateAction::Deny, "path traversal attempt");
        }
        if looks_suspicious(request_path) {
            return GateDecision::deny(GateAction::Deny, "suspicious request path");
        }

        GateDecision::allow()
    }

    fn audit_decision(&self, context: &RequestContext, path: &str, method: &str, decision: &GateDecision) {
        let (event_type, level) = match decision.action {
            GateAction::IpBlock => (EventType::IpBlocked, AuditLevel::Warn),
            GateAction::RateLimit => (EventType::RateLimited, AuditLevel::Warn),
            GateAction::CaptchaRequired => (EventType::SuspiciousActivity, AuditLevel::Warn),
            GateAction::Deny if looks_like_traversal(path) => (EventType::MaliciousRequest, AuditLevel::Critical),
            GateAction::Deny => (EventType::AuthorizationFailure, AuditLevel::Warn),
            GateAction::Allow => return,
        };

        let mut event = AuditEvent::new(level, event_type, decision.reason.clone().unwrap_or_default())
            .with_ip(context.client_ip)
            .with_request(method, path);
        event.user_agent = Some(context.user_agent.clone());
        if let Some(principal) = &context.principal {
            event = event.with_username(principal.username.clone());
        }
        self.audit.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::principal::Principal;
    use std::time::Duration;

    fn gate() -> SecurityGate {
        let ip_tables = Arc::new(IpTables::new(false, &[], &[]));
        let rate_limiter = Arc::new(RateLimiter::new(5, 5, 100, 100));
        let audit = SecurityAudit::spawn(1, 64, true, ip_tables.clone(), 10, Duration::from_secs(60));
        SecurityGate::new(ip_tables, rate_limiter, audit)
    }

    fn ctx(ip: &str, ua: &str) -> RequestContext {
        RequestContext::new("req-1", ip.parse().unwrap(), ua)
    }

    #[tokio::test]
    async fn allows_clean_request() {
        let gate = gate();
        let decision = gate.check(&ctx("1.2.3.4", "Mozilla/5.0"), "/dav/file.txt", "GET").await;
        assert!(decision.allowed());
    }

    #[tokio::test]
    async fn denies_empty_user_agent() {
        let gate = gate();
        let decision = gate.check(&ctx("1.2.3.4", ""), "/dav/file.txt", "GET").await;
        assert_eq!(decision.action, GateAction::Deny);
    }

    #[tokio::test]
    async fn denies_suspicious_agent() {
        let gate = gate();
        let decision = gate.check(&ctx("1.2.3.4", "evil-crawler/1.0"), "/dav/file.txt", "GET").await;
        assert_eq!(decision.action, GateAction::Deny);
    }

    #[tokio::test]
    async fn denies_path_traversal_before_any_other_check() {
        let gate = gate();
        let decision = gate
            .check(&ctx("1.2.3.4", "Mozilla/5.0"), "/dav/../../etc/passwd", "GET")
            .await;
        assert_eq!(decision.action, GateAction::Deny);
    }

    #[tokio::test]
    async fn ip_blacklist_wins_over_everything_else() {
        let ip_tables = Arc::new(IpTables::new(false, &[], &["1.2.3.4/32".to_string()]));
        let rate_limiter = Arc::new(RateLimiter::new(5, 5, 100, 100));
        let audit = SecurityAudit::spawn(1, 64, true, ip_tables.clone(), 10, Duration::from_secs(60));
        let gate = SecurityGate::new(ip_tables, rate_limiter, audit);

        let decision = gate.check(&ctx("1.2.3.4", "Mozilla/5.0"), "/dav/file.txt", "GET").await;
        assert_eq!(decision.action, GateAction::IpBlock);
    }

    #[tokio::test]
    async fn rate_limit_exceeded_denies_after_burst() {
        let gate = gate();
        let context = ctx("9.9.9.9", "Mozilla/5.0");
        let mut last = GateDecision::allow();
        for _ in 0..10 {
            last = gate.check(&context, "/dav/file.txt", "GET").await;
        }
        assert_eq!(last.action, GateAction::RateLimit);
    }

    #[tokio::test]
    async fn user_scoped_limit_applies_once_principal_known() {
        let gate = gate();
        let mut context = ctx("1.1.1.1", "Mozilla/5.0");
        context.principal = Some(Principal::new("1", "alice", "USER"));
        let mut last = GateDecision::allow();
        for _ in 0..10 {
            last = gate.check(&context, "/dav/file.txt", "GET").await;
        }
        assert_eq!(last.action, GateAction::RateLimit);
    }

    #[test]
    fn traversal_detection_matches_spec_patterns() {
        assert!(looks_like_traversal("/dav/../secret"));
        assert!(looks_like_traversal("/dav/..\\secret"));
        assert!(looks_like_traversal("/dav/%2e%2e/secret"));
        assert!(looks_like_traversal("/dav/....//secret"));
        assert!(!looks_like_traversal("/dav/normal/path.txt"));
    }

    #[test]
    fn suspicious_path_detection() {
        assert!(looks_suspicious("/dav/.git/config"));
        assert!(looks_suspicious("/dav/__pycache__/x"));
        assert!(looks_suspicious("/dav/etc/passwd"));
        assert!(!looks_suspicious("/dav/normal/path.txt"));
    }
}
