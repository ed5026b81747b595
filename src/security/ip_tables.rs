//! IP allow/deny tables (§3 "IP Range", §4.1 "IP-table semantics").
//!
//! CIDR, dashed-range and bare-address forms are all normalized to an
//! `IpRange` of 128-bit start/end bounds (IPv4 addresses are mapped into the
//! IPv4-mapped IPv6 space for comparison purposes only — membership checks
//! always verify family equality first, so this never lets a v4 range match
//! a v6 address or vice versa).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::http::HeaderMap;
use ipnet::IpNet;

/// The default secret baked into this crate for local development; §9 open
/// question resolved as a hard boot refusal in production (see
/// `common::config::AppConfig::from_env`).
pub const DEFAULT_TEST_JWT_SECRET: &str = "JWT_TEST_ALGORITHM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub start: u128,
    pub end: u128,
    pub is_ipv6: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IpRangeError {
    #[error("invalid IP range spec: {0}")]
    InvalidSpec(String),
}

fn to_u128(addr: IpAddr) -> (u128, bool) {
    match addr {
        IpAddr::V4(v4) => (u32::from(v4) as u128, false),
        IpAddr::V6(v6) => (u128::from(v6), true),
    }
}

impl IpRange {
    /// Parses a CIDR (`a.b.c.d/n`), a dashed range (`a.b.c.d-a.b.c.e`), or a
    /// bare address, validating the prefix length against the address
    /// family (0-32 for v4, 0-128 for v6) and that a dashed range shares one
    /// family.
    pub fn parse(spec: &str) -> Result<Self, IpRangeError> {
        let spec = spec.trim();

        if let Ok(net) = spec.parse::<IpNet>() {
            let (start_u, is_v6) = to_u128(net.network());
            let (end_u, _) = to_u128(net.broadcast());
            return Ok(Self { start: start_u, end: end_u, is_ipv6: is_v6 });
        }

        if let Some((lhs, rhs)) = spec.split_once('-') {
            let start: IpAddr = lhs
                .trim()
                .parse()
                .map_err(|_| IpRangeError::InvalidSpec(spec.to_string()))?;
            let end: IpAddr = rhs
                .trim()
                .parse()
                .map_err(|_| IpRangeError::InvalidSpec(spec.to_string()))?;
            let (start_u, start_v6) = to_u128(start);
            let (end_u, end_v6) = to_u128(end);
            if start_v6 != end_v6 {
                return Err(IpRangeError::InvalidSpec(format!("{}: range crosses address families", spec)));
            }
            if start_u > end_u {
                return Err(IpRangeError::InvalidSpec(format!("{}: start is after end", spec)));
            }
            return Ok(Self { start: start_u, end: end_u, is_ipv6: start_v6 });
        }

        let addr: IpAddr = spec.parse().map_err(|_| IpRangeError::InvalidSpec(spec.to_string()))?;
        let (value, is_v6) = to_u128(addr);
        Ok(Self { start: value, end: value, is_ipv6: is_v6 })
    }

    /// Membership by 32/128-bit integer compare; cross-family always false.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let (value, is_v6) = to_u128(addr);
        if is_v6 != self.is_ipv6 {
            return false;
        }
        value >= self.start && value <= self.end
    }
}

fn private_and_loopback_ranges() -> Vec<IpRange> {
    [
        "127.0.0.0/8",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .map(|s| IpRange::parse(s).expect("static range is valid"))
    .collect()
}

/// Copy-on-write allow/deny table, rebuilt wholesale on any mutation and
/// swapped atomically (§5: "reads dominate"). A per-address membership
/// cache sits in front, invalidated whenever the table is rebuilt.
pub struct IpTables {
    inner: arc_swap::ArcSwap<Inner>,
    lookup_cache: dashmap::DashMap<IpAddr, (bool, bool)>, // ip -> (whitelisted, blacklisted)
}

struct Inner {
    whitelist_enabled: bool,
    whitelist: Vec<IpRange>,
    blacklist: Vec<IpRange>,
}

impl IpTables {
    pub fn new(whitelist_enabled: bool, whitelist_specs: &[String], blacklist_specs: &[String]) -> Self {
        let mut whitelist = private_and_loopback_ranges();
        for spec in whitelist_specs {
            match IpRange::parse(spec) {
                Ok(range) => whitelist.push(range),
                Err(e) => tracing::warn!(%spec, error = %e, "skipping invalid whitelist entry"),
            }
        }

        let blacklist = blacklist_specs
            .iter()
            .filter_map(|spec| match IpRange::parse(spec) {
                Ok(range) => Some(range),
                Err(e) => {
                    tracing::warn!(%spec, error = %e, "skipping invalid blacklist entry");
                    None
                }
            })
            .collect();

        Self {
            inner: arc_swap::ArcSwap::from_pointee(Inner { whitelist_enabled, whitelist, blacklist }),
            lookup_cache: dashmap::DashMap::new(),
        }
    }

    pub fn is_whitelisted(&self, addr: IpAddr) -> bool {
        if let Some(cached) = self.lookup_cache.get(&addr) {
            return cached.0;
        }
        let inner = self.inner.load();
        let result = !inner.whitelist_enabled || inner.whitelist.iter().any(|r| r.contains(addr));
        self.lookup_cache.entry(addr).or_insert((false, false)).0 = result;
        result
    }

    /// Current `(whitelist_len, blacklist_len)`, for admin introspection.
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.load();
        (inner.whitelist.len(), inner.blacklist.len())
    }

    pub fn is_blacklisted(&self, addr: IpAddr) -> bool {
        if let Some(cached) = self.lookup_cache.get(&addr) {
            return cached.1;
        }
        let inner = self.inner.load();
        let result = inner.blacklist.iter().any(|r| r.contains(addr));
        self.lookup_cache.entry(addr).or_insert((false, false)).1 = result;
        result
    }

    /// Hot-reloads the table from fresh specs, invalidating the lookup
    /// cache. Used by `admin::routes::reload_ip_tables` and by
    /// `AuthResolver`/`PathMappingEngine` indirectly via `clearUserCache`
    /// style invalidation when an operator blacklists an abuser.
    pub fn reload(&self, whitelist_enabled: bool, whitelist_specs: &[String], blacklist_specs: &[String]) {
        let replacement = Self::new(whitelist_enabled, whitelist_specs, blacklist_specs);
        self.inner.store(replacement.inner.load_full());
        self.lookup_cache.clear();
    }

    /// Appends a single address to the in-memory blacklist without a full
    /// reload; used by the auto-blacklist hook (§4.6, SPEC_FULL §H).
    pub fn blacklist_ip(&self, addr: IpAddr) {
        let mut inner = (**self.inner.load()).clone_inner();
        inner.blacklist.push(IpRange { start: to_u128(addr).0, end: to_u128(addr).0, is_ipv6: to_u128(addr).1 });
        self.inner.store(std::sync::Arc::new(inner));
        self.lookup_cache.remove(&addr);
    }
}

impl Inner {
    fn clone_inner(&self) -> Self {
        Self {
            whitelist_enabled: self.whitelist_enabled,
            whitelist: self.whitelist.clone(),
            blacklist: self.blacklist.clone(),
        }
    }
}

/// Strips a bracketed IPv6 literal with a port (`[::1]:8080`) down to the
/// bare address, per §6 client-IP extraction rules.
pub fn strip_brackets_and_port(raw: &str) -> &str {
    let raw = raw.trim();
    if let Some(stripped) = raw.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            return &stripped[..end];
        }
    }
    // `a.b.c.d:port` (IPv4 with port) — only strip if it parses as IPv4 once split.
    if let Some((host, _port)) = raw.rsplit_once(':') {
        if host.parse::<Ipv4Addr>().is_ok() {
            return host;
        }
    }
    raw
}

pub fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty())
}

/// First element of a comma-separated forwarding header (`X-Forwarded-For`,
/// `Forwarded-For`), stripped of brackets/port.
fn first_forwarded_element(value: &str) -> Option<IpAddr> {
    value.split(',').find_map(|candidate| strip_brackets_and_port(candidate.trim()).parse().ok())
}

/// Parses an RFC 7239 `Forwarded` header's first `for=` token, e.g.
/// `for=192.0.2.60;proto=http` or `for="[2001:db8::1]:8080"`.
fn parse_forwarded_header(value: &str) -> Option<IpAddr> {
    value.split([';', ',']).find_map(|part| {
        let part = part.trim();
        let rest = part.strip_prefix("for=").or_else(|| part.strip_prefix("For="))?;
        strip_brackets_and_port(rest.trim_matches('"')).parse().ok()
    })
}

/// Client-IP extraction per §6's header-precedence chain: `X-Real-IP` →
/// `CF-Connecting-IP` → first element of `X-Forwarded-For` → `X-Forwarded`
/// → `Forwarded-For` → `Forwarded` → the transport-level remote address.
/// A header present but unparseable as an IP is skipped rather than
/// rejected outright, falling through to the next step of the chain.
pub fn client_ip_from_headers(headers: &HeaderMap, remote: SocketAddr) -> IpAddr {
    if let Some(ip) = header_str(headers, "x-real-ip").and_then(|v| strip_brackets_and_port(v).parse().ok()) {
        return ip;
    }
    if let Some(ip) = header_str(headers, "cf-connecting-ip").and_then(|v| strip_brackets_and_port(v).parse().ok()) {
        return ip;
    }
    if let Some(ip) = header_str(headers, "x-forwarded-for").and_then(first_forwarded_element) {
        return ip;
    }
    if let Some(ip) = header_str(headers, "x-forwarded").and_then(|v| strip_brackets_and_port(v).parse().ok()) {
        return ip;
    }
    if let Some(ip) = header_str(headers, "forwarded-for").and_then(first_forwarded_element) {
        return ip;
    }
    if let Some(ip) = header_str(headers, "forwarded").and_then(parse_forwarded_header) {
        return ip;
    }
    remote.ip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_zero_matches_every_address_of_family() {
        let range = IpRange::parse("0.0.0.0/0").unwrap();
        assert!(range.contains("1.2.3.4".parse().unwrap()));
        assert!(range.contains("255.255.255.255".parse().unwrap()));
        assert!(!range.contains("::1".parse().unwrap()));
    }

    #[test]
    fn cidr_32_matches_exactly_one_v4_address() {
        let range = IpRange::parse("10.0.0.5/32").unwrap();
        assert!(range.contains("10.0.0.5".parse().unwrap()));
        assert!(!range.contains("10.0.0.6".parse().unwrap()));
    }

    #[test]
    fn cidr_128_matches_exactly_one_v6_address() {
        let range = IpRange::parse("::1/128").unwrap();
        assert!(range.contains("::1".parse().unwrap()));
        assert!(!range.contains("::2".parse().unwrap()));
    }

    #[test]
    fn dashed_range_membership() {
        let range = IpRange::parse("10.0.0.1-10.0.0.10").unwrap();
        assert!(range.contains("10.0.0.5".parse().unwrap()));
        assert!(!range.contains("10.0.0.11".parse().unwrap()));
    }

    #[test]
    fn cross_family_range_is_rejected() {
        assert!(IpRange::parse("10.0.0.1-::1").is_err());
    }

    #[test]
    fn cross_family_membership_always_false() {
        let v4 = IpRange::parse("0.0.0.0/0").unwrap();
        let v6_addr: IpAddr = "::1".parse().unwrap();
        assert!(!v4.contains(v6_addr));
    }

    #[test]
    fn whitelist_implicitly_contains_loopback_and_private_ranges() {
        let tables = IpTables::new(true, &["203.0.113.0/24".to_string()], &[]);
        assert!(tables.is_whitelisted("127.0.0.1".parse().unwrap()));
        assert!(tables.is_whitelisted("10.1.2.3".parse().unwrap()));
        assert!(tables.is_whitelisted("203.0.113.5".parse().unwrap()));
        assert!(!tables.is_whitelisted("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn whitelist_disabled_allows_everything() {
        let tables = IpTables::new(false, &[], &[]);
        assert!(tables.is_whitelisted("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn blacklist_and_reload_invalidate_cache() {
        let tables = IpTables::new(false, &[], &[]);
        let addr: IpAddr = "8.8.8.8".parse().unwrap();
        assert!(!tables.is_blacklisted(addr));
        tables.blacklist_ip(addr);
        assert!(tables.is_blacklisted(addr));
        tables.reload(false, &[], &[]);
        assert!(!tables.is_blacklisted(addr));
    }

    #[test]
    fn strip_brackets_and_port_handles_v6_and_v4() {
        assert_eq!(strip_brackets_and_port("[::1]:8443"), "::1");
        assert_eq!(strip_brackets_and_port("10.0.0.5:8443"), "10.0.0.5");
        assert_eq!(strip_brackets_and_port("10.0.0.5"), "10.0.0.5");
    }

    fn remote() -> SocketAddr {
        "127.0.0.1:54321".parse().unwrap()
    }

    #[test]
    fn client_ip_falls_back_to_remote_address_with_no_headers() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip_from_headers(&headers, remote()), "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn client_ip_prefers_x_real_ip_over_everything() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.9".parse().unwrap());
        headers.insert("cf-connecting-ip", "203.0.113.1".parse().unwrap());
        assert_eq!(client_ip_from_headers(&headers, remote()), "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn client_ip_falls_through_to_cf_connecting_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", "203.0.113.1".parse().unwrap());
        assert_eq!(client_ip_from_headers(&headers, remote()), "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn client_ip_takes_first_element_of_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.2, 10.0.0.1, 10.0.0.2".parse().unwrap());
        assert_eq!(client_ip_from_headers(&headers, remote()), "203.0.113.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn client_ip_parses_rfc7239_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("forwarded", "for=\"[2001:db8::1]:8080\";proto=https".parse().unwrap());
        assert_eq!(client_ip_from_headers(&headers, remote()), "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn client_ip_skips_unparseable_header_and_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "not-an-ip".parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.3".parse().unwrap());
        assert_eq!(client_ip_from_headers(&headers, remote()), "203.0.113.3".parse::<IpAddr>().unwrap());
    }
}
