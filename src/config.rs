use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::cache::DecisionCacheConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub cache: DecisionCacheConfig,
    /// How often stale pending approval requests are swept.
    pub approval_sweep_interval: Duration,
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| {
            s.parse()
                .map_err(|e| {
                    tracing::warn!("Invalid {} value '{}': {}", key, s, e);
                    e
                })
                .ok()
        })
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8082);

        let host: IpAddr = std::env::var("HOST")
            .ok()
            .and_then(|s| {
                s.parse()
                    .map_err(|e| {
                        tracing::warn!("Invalid HOST value '{}': {}", s, e);
                        e
                    })
                    .ok()
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let cache = DecisionCacheConfig {
            default_ttl: Duration::from_secs(env_u64("DECISION_CACHE_TTL_SECONDS", 300)),
            deny_ttl: Duration::from_secs(env_u64("DECISION_CACHE_DENY_TTL_SECONDS", 60)),
            max_entries: env_u64("DECISION_CACHE_MAX_ENTRIES", 10_000) as usize,
            cleanup_interval: Duration::from_secs(env_u64(
                "DECISION_CACHE_CLEANUP_INTERVAL_SECONDS",
                60,
            )),
            enabled: std::env::var("DECISION_CACHE_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        };

        let approval_sweep_interval =
            Duration::from_secs(env_u64("APPROVAL_SWEEP_INTERVAL_SECONDS", 60));

        tracing::info!("Configuration loaded: {}:{}", host, port);

        Self {
            bind_addr: SocketAddr::new(host, port),
            cache,
            approval_sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_on_garbage() {
        std::env::set_var("ENV_U64_TEST_KEY", "not-a-number");
        assert_eq!(env_u64("ENV_U64_TEST_KEY", 42), 42);
        std::env::remove_var("ENV_U64_TEST_KEY");
        assert_eq!(env_u64("ENV_U64_TEST_KEY", 7), 7);
    }
}
