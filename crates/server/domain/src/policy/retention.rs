use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Longest user agent kept in audit metadata, in bytes.
pub const MAX_USER_AGENT_BYTES: usize = 128;

/// Keys forwarded verbatim by [`minimize_audit_metadata`].
const FORWARDED_KEYS: [&str; 4] = ["consent_at", "signed_at", "actor_type", "actor_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub artifact_ttl: Duration,
    pub log_ttl: Duration,
    pub pii_metadata_ttl: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            artifact_ttl: Duration::days(365),
            log_ttl: Duration::days(180),
            pii_metadata_ttl: Duration::days(90),
        }
    }
}

/// Counts produced by one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleCheck {
    pub artifacts_to_purge: usize,
    pub logs_to_purge: usize,
    pub pii_to_purge: usize,
}

impl LifecycleCheck {
    pub fn total(&self) -> usize {
        self.artifacts_to_purge + self.logs_to_purge + self.pii_to_purge
    }
}

fn expired(created_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    created_at + ttl < now
}

impl RetentionPolicy {
    pub fn should_purge_artifact(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        expired(created_at, self.artifact_ttl, now)
    }

    pub fn should_purge_log(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        expired(created_at, self.log_ttl, now)
    }

    pub fn should_purge_pii(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        expired(created_at, self.pii_metadata_ttl, now)
    }

    pub fn evaluate_lifecycle_check(
        &self,
        now: DateTime<Utc>,
        artifacts: &[DateTime<Utc>],
        logs: &[DateTime<Utc>],
        pii: &[DateTime<Utc>],
    ) -> LifecycleCheck {
        LifecycleCheck {
            artifacts_to_purge: artifacts
                .iter()
                .filter(|at| self.should_purge_artifact(**at, now))
                .count(),
            logs_to_purge: logs
                .iter()
                .filter(|at| self.should_purge_log(**at, now))
                .count(),
            pii_to_purge: pii
                .iter()
                .filter(|at| self.should_purge_pii(**at, now))
                .count(),
        }
    }
}

/// Strip audit metadata down to what the trail needs: a network-masked IP,
/// a bounded user agent and the consent/actor keys. Everything else
/// (emails, names, signature payloads) is dropped. Idempotent.
pub fn minimize_audit_metadata(meta: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();

    if let Some(masked) = meta
        .get("ip_address")
        .and_then(Value::as_str)
        .and_then(mask_ip)
    {
        out.insert("ip_address".to_string(), Value::String(masked));
    }

    if let Some(agent) = meta.get("user_agent").and_then(Value::as_str) {
        let agent = truncate_bytes(agent.trim(), MAX_USER_AGENT_BYTES);
        if !agent.is_empty() {
            out.insert("user_agent".to_string(), Value::String(agent.to_string()));
        }
    }

    for key in FORWARDED_KEYS {
        if let Some(value) = meta.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    out
}

/// IPv4 to its /24 network, IPv6 to its /64. Already masked input is
/// re-masked to the same value; anything unparsable is dropped.
fn mask_ip(raw: &str) -> Option<String> {
    let addr = raw.trim();
    let addr = addr.split_once('/').map_or(addr, |(ip, _)| ip);
    match addr.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            Some(format!("{}/24", Ipv4Addr::new(a, b, c, 0)))
        }
        IpAddr::V6(v6) => {
            let masked = u128::from(v6) & (!0u128 << 64);
            Some(format!("{}/64", Ipv6Addr::from(masked)))
        }
    }
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
