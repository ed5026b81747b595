//! Security audit trail (§4.6). Emission is asynchronous and must never add
//! latency to the request path: handlers hand an `AuditEvent` to a bounded
//! MPSC channel and move on; a small worker pool drains it and (eventually)
//! ships it to the logging sink via `tracing`.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::security::ip_tables::IpTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    AuthenticationSuccess,
    AuthenticationFailure,
    AuthorizationFailure,
    IpBlocked,
    RateLimited,
    SuspiciousActivity,
    MaliciousRequest,
    SystemError,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub event_type: EventType,
    pub client_ip: Option<IpAddr>,
    pub username: Option<String>,
    pub user_agent: Option<String>,
    pub request_path: Option<String>,
    pub request_method: Option<String>,
    pub details: String,
}

impl AuditEvent {
    pub fn new(level: AuditLevel, event_type: EventType, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            event_type,
            client_ip: None,
            username: None,
            user_agent: None,
            request_path: None,
            request_method: None,
            details: details.into(),
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self.request_path = Some(path.into());
        self
    }
}

/// Masks an IPv4 address as `a.b.*.**`; IPv6 and malformed input pass
/// through unmasked since §4.6 only specifies the v4 form.
pub fn mask_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.*.**", o[0], o[1])
        }
        IpAddr::V6(v6) => v6.to_string(),
    }
}

/// Masks usernames longer than 4 chars as first-two + last-one; shorter
/// usernames are returned unchanged (nothing useful to redact).
pub fn mask_username(username: &str) -> String {
    let chars: Vec<char> = username.chars().collect();
    if chars.len() <= 4 {
        return username.to_string();
    }
    let first_two: String = chars[..2].iter().collect();
    let last: char = *chars.last().unwrap();
    format!("{}{}{}", first_two, "*".repeat(chars.len() - 3), last)
}

/// Masks a bearer token to its first/last 10 characters (§4.2).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 20 {
        return "*".repeat(token.len());
    }
    format!("{}...{}", &token[..10], &token[token.len() - 10..])
}

struct AutoBlacklistState {
    counts: DashMap<IpAddr, AtomicU32>,
    threshold: u32,
    window: Duration,
    resets: DashMap<IpAddr, tokio::time::Instant>,
}

/// Sink that owns the audit queue and worker pool. Cloned cheaply (it's an
/// `Arc` of the sender side); the workers and auto-blacklist hook live on
/// the original owned by `common::di::AppState`.
#[derive(Clone)]
pub struct SecurityAudit {
    sender: mpsc::Sender<AuditEvent>,
    mask_pii: bool,
}

impl SecurityAudit {
    /// Spawns `worker_count` workers draining a bounded channel of
    /// `queue_capacity`. Overflow policy per §5: INFO/WARN are dropped,
    /// ERROR/CRITICAL block the emitter briefly (bounded by the channel's
    /// backpressure) rather than being lost.
    pub fn spawn(
        worker_count: usize,
        queue_capacity: usize,
        mask_pii: bool,
        ip_tables: Arc<IpTables>,
        auto_blacklist_threshold: u32,
        auto_blacklist_window: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let blacklist_state = Arc::new(AutoBlacklistState {
            counts: DashMap::new(),
            threshold: auto_blacklist_threshold,
            window: auto_blacklist_window,
            resets: DashMap::new(),
        });

        for worker_id in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let ip_tables = ip_tables.clone();
            let blacklist_state = blacklist_state.clone();
            tokio::spawn(async move {
                loop {
                    let event = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    match event {
                        Some(event) => {
                            emit(&event, mask_pii);
                            handle_auto_blacklist(&event, &blacklist_state, &ip_tables);
                        }
                        None => {
                            tracing::debug!(worker_id, "audit worker shutting down, channel closed");
                            break;
                        }
                    }
                }
            });
        }

        Self { sender, mask_pii }
    }

    /// Non-blocking for INFO/WARN: if the queue is full the event is
    /// dropped rather than stalling the request path. ERROR/CRITICAL use a
    /// short bounded wait instead, per §5.
    pub fn record(&self, event: AuditEvent) {
        match event.level {
            AuditLevel::Info | AuditLevel::Warn => {
                if let Err(mpsc::error::TrySendError::Full(_)) = self.sender.try_send(event) {
                    tracing::debug!("audit queue full, dropping low-severity event");
                }
            }
            AuditLevel::Error | AuditLevel::Critical => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if tokio::time::timeout(Duration::from_millis(200), sender.send(event))
                        .await
                        .is_err()
                    {
                        tracing::error!("audit queue still full after bounded wait, dropping high-severity event");
                    }
                });
            }
        }
    }

    pub fn mask_pii(&self) -> bool {
        self.mask_pii
    }
}

fn emit(event: &AuditEvent, mask_pii: bool) {
    let ip_display = event.client_ip.map(|ip| if mask_pii { mask_ip(ip) } else { ip.to_string() });
    let username_display = event
        .username
        .as_deref()
        .map(|u| if mask_pii { mask_username(u) } else { u.to_string() });

    match event.level {
        AuditLevel::Info => tracing::info!(
            event_type = ?event.event_type,
            client_ip = ?ip_display,
            username = ?username_display,
            details = %event.details,
            "security audit"
        ),
        AuditLevel::Warn => tracing::warn!(
            event_type = ?event.event_type,
            client_ip = ?ip_display,
            username = ?username_display,
            details = %event.details,
            "security audit"
        ),
        AuditLevel::Error => tracing::error!(
            event_type = ?event.event_type,
            client_ip = ?ip_display,
            username = ?username_display,
            details = %event.details,
            "security audit"
        ),
        AuditLevel::Critical => tracing::error!(
            event_type = ?event.event_type,
            client_ip = ?ip_display,
            username = ?username_display,
            details = %event.details,
            critical = true,
            "security audit"
        ),
    }
}

/// §4.6: auto-blacklist after N `MALICIOUS_REQUEST` events from one IP
/// within a window.
fn handle_auto_blacklist(event: &AuditEvent, state: &AutoBlacklistState, ip_tables: &IpTables) {
    if event.event_type != EventType::MaliciousRequest {
        return;
    }
    let Some(ip) = event.client_ip else { return };

    let now = tokio::time::Instant::now();
    let reset_at = *state.resets.entry(ip).or_insert(now + state.window);
    if now >= reset_at {
        state.counts.remove(&ip);
        state.resets.insert(ip, now + state.window);
    }

    let counter = state.counts.entry(ip).or_insert_with(|| AtomicU32::new(0));
    let count = counter.fetch_add(1, Ordering::SeqCst) + 1;

    if count >= state.threshold {
        ip_tables.blacklist_ip(ip);
        tracing::error!(%ip, count, "auto-blacklisted IP after repeated malicious requests");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_masking_pattern() {
        let ip: IpAddr = "203.0.113.42".parse().unwrap();
        assert_eq!(mask_ip(ip), "203.0.*.**");
    }

    #[test]
    fn username_masking_threshold() {
        assert_eq!(mask_username("bob"), "bob");
        assert_eq!(mask_username("alice"), "al*e");
        assert_eq!(mask_username("alexandra"), "al*******a");
    }

    #[test]
    fn token_masking_shows_first_and_last_ten() {
        let token = "a".repeat(10) + "." + &"b".repeat(10) + "." + &"c".repeat(10);
        let masked = mask_token(&token);
        assert!(masked.starts_with("aaaaaaaaaa"));
        assert!(masked.ends_with("cccccccccc"));
    }

    #[tokio::test]
    async fn auto_blacklist_triggers_after_threshold() {
        let ip_tables = Arc::new(IpTables::new(false, &[], &[]));
        let audit = SecurityAudit::spawn(1, 16, true, ip_tables.clone(), 3, Duration::from_secs(60));
        let addr: IpAddr = "198.51.100.7".parse().unwrap();

        for _ in 0..3 {
            audit.record(
                AuditEvent::new(AuditLevel::Critical, EventType::MaliciousRequest, "path traversal").with_ip(addr),
            );
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ip_tables.is_blacklisted(addr));
    }
}
