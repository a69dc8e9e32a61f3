//! Node configuration from flags and environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::rate_limit::RateLimits;

/// Kredo Discovery Service
///
/// Public attestation discovery and verification for the Kredo protocol.
/// Signature-only auth: the Ed25519 signature IS the authentication.
#[derive(Parser, Debug, Clone)]
#[command(name = "kredo-node")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "kredo.db")]
    pub db_path: PathBuf,

    /// Listen address for the HTTP API
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8320")]
    pub bind_addr: SocketAddr,

    /// Allowed CORS origins (comma-separated; empty = same-origin only)
    #[arg(long, env = "CORS_ALLOW_ORIGINS", default_value = "")]
    pub cors_allow_origins: String,

    /// Trust-analysis cache TTL in seconds (0 disables the cache)
    #[arg(long, env = "TRUST_CACHE_TTL_SECONDS", default_value = "30")]
    pub trust_cache_ttl_seconds: u64,

    /// JSON overrides for the per-class rate limits
    #[arg(long, env = "RATE_LIMITS_JSON")]
    pub rate_limits_json: Option<String>,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    pub max_body_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (plain, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "plain")]
    pub log_format: String,
}

/// Resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// Allowed CORS origins; empty means same-origin only.
    pub cors_allow_origins: Vec<String>,
    /// Trust cache TTL in seconds.
    pub trust_cache_ttl_seconds: u64,
    /// Per-class rate limits.
    pub rate_limits: RateLimits,
    /// Maximum request body size.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("kredo.db"),
            bind_addr: "127.0.0.1:8320".parse().expect("static addr"),
            cors_allow_origins: Vec::new(),
            trust_cache_ttl_seconds: 30,
            rate_limits: RateLimits::default(),
            max_body_bytes: 65_536,
        }
    }
}

impl Config {
    /// Resolve runtime configuration from parsed arguments.
    ///
    /// # Errors
    ///
    /// Fails when `RATE_LIMITS_JSON` is present but unparsable; a typo in
    /// limits should stop the node rather than silently run defaults.
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let rate_limits = match &args.rate_limits_json {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| anyhow::anyhow!("invalid RATE_LIMITS_JSON: {e}"))?,
            None => RateLimits::default(),
        };
        let cors_allow_origins = args
            .cors_allow_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Ok(Self {
            db_path: args.db_path.clone(),
            bind_addr: args.bind_addr,
            cors_allow_origins,
            trust_cache_ttl_seconds: args.trust_cache_ttl_seconds,
            rate_limits,
            max_body_bytes: args.max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::LimitRule;

    fn args_from(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("kredo-node").chain(argv.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(&args_from(&[])).unwrap();
        assert_eq!(config.max_body_bytes, 65_536);
        assert_eq!(config.trust_cache_ttl_seconds, 30);
        assert!(config.cors_allow_origins.is_empty());
        assert_eq!(config.rate_limits, RateLimits::default());
    }

    #[test]
    fn test_cors_list_parsing() {
        let config = Config::from_args(&args_from(&[
            "--cors-allow-origins",
            "https://kredo.dev, https://app.kredo.dev",
        ]))
        .unwrap();
        assert_eq!(
            config.cors_allow_origins,
            vec!["https://kredo.dev", "https://app.kredo.dev"]
        );
    }

    #[test]
    fn test_rate_limit_overrides() {
        let config = Config::from_args(&args_from(&[
            "--rate-limits-json",
            r#"{"register": {"window_seconds": 30, "limit": 2}}"#,
        ]))
        .unwrap();
        assert_eq!(
            config.rate_limits.register,
            LimitRule { window_seconds: 30, limit: 2 }
        );
    }

    #[test]
    fn test_bad_rate_limits_rejected() {
        let result = Config::from_args(&args_from(&["--rate-limits-json", "not json"]));
        assert!(result.is_err());
    }
}
