//! Startup configuration.
//!
//! Everything is read from the environment once (after loading `.env` if one
//! exists) and handed to the router through `AppState`.

use std::env;
use std::net::SocketAddr;

use axum::http::HeaderValue;

const DEFAULT_TOKEN_TTL_MINUTES: i64 = 24 * 60;
pub const MAX_TOKEN_TTL_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl Default for SeedAdmin {
    fn default() -> Self {
        Self {
            email: "admin@parish.org".to_string(),
            password: "admin123".to_string(),
            name: "Admin User".to_string(),
        }
    }
}

/// Signing settings for HS256 access tokens.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub ttl_minutes: i64,
}

/// CORS origins. `Any` comes from `ALLOWED_ORIGINS=*` and is served
/// without credentials, since browsers refuse credentialed wildcard responses.
#[derive(Debug, Clone, PartialEq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// `None` means tokens are issued in the legacy `mock-token-<id>` form.
    pub jwt: Option<JwtSettings>,
    pub accept_legacy_tokens: bool,
    pub seed_admin: SeedAdmin,
    pub allowed_origins: AllowedOrigins,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            jwt: None,
            accept_legacy_tokens: true,
            seed_admin: SeedAdmin::default(),
            allowed_origins: default_origins(),
            rate_limit_per_second: 50,
            rate_limit_burst: 100,
        }
    }
}

fn default_origins() -> AllowedOrigins {
    AllowedOrigins::List(vec![
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
        HeaderValue::from_static("http://localhost:5173"),
    ])
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match non_empty(name) {
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparseable {}={}, using default", name, raw);
            default
        }),
        None => default,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `None` when no entry survives parsing.
fn parse_origins(raw: &str) -> Option<AllowedOrigins> {
    let entries: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if entries.contains(&"*") {
        if entries.len() > 1 {
            tracing::warn!("ALLOWED_ORIGINS contains '*'; other entries are ignored");
        }
        return Some(AllowedOrigins::Any);
    }

    let origins: Vec<HeaderValue> = entries
        .into_iter()
        .filter_map(|entry| match entry.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid ALLOWED_ORIGINS entry: {}", entry);
                None
            }
        })
        .collect();
    if origins.is_empty() {
        None
    } else {
        Some(AllowedOrigins::List(origins))
    }
}

fn parse_ttl_minutes(raw: Option<String>) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_TOKEN_TTL_MINUTES);
    };
    let Ok(minutes) = raw.parse::<i64>() else {
        tracing::warn!("Ignoring unparseable TOKEN_TTL_MINUTES={}, using default", raw);
        return Ok(DEFAULT_TOKEN_TTL_MINUTES);
    };
    if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&minutes) {
        anyhow::bail!(
            "TOKEN_TTL_MINUTES must be between 1 and {}, got {}",
            MAX_TOKEN_TTL_MINUTES,
            minutes
        );
    }
    Ok(minutes)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let bind_addr = match non_empty("BIND_ADDR") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid BIND_ADDR {}: {}", raw, e))?,
            None => defaults.bind_addr,
        };

        let jwt = match non_empty("JWT_SECRET") {
            Some(secret) => Some(JwtSettings {
                secret,
                issuer: non_empty("JWT_ISSUER"),
                audience: non_empty("JWT_AUDIENCE"),
                ttl_minutes: parse_ttl_minutes(non_empty("TOKEN_TTL_MINUTES"))?,
            }),
            None => None,
        };

        let accept_legacy_tokens = match non_empty("ACCEPT_LEGACY_TOKENS") {
            Some(raw) => parse_flag(&raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring unparseable ACCEPT_LEGACY_TOKENS={}", raw);
                jwt.is_none()
            }),
            None => jwt.is_none(),
        };
        if jwt.is_none() && !accept_legacy_tokens {
            anyhow::bail!("ACCEPT_LEGACY_TOKENS=false requires JWT_SECRET to be set");
        }
        if jwt.is_none() {
            tracing::warn!("JWT_SECRET not set; issuing unsigned legacy tokens");
        }

        let seed_defaults = SeedAdmin::default();
        let seed_admin = SeedAdmin {
            email: non_empty("SEED_ADMIN_EMAIL").unwrap_or(seed_defaults.email),
            password: non_empty("SEED_ADMIN_PASSWORD").unwrap_or(seed_defaults.password),
            name: non_empty("SEED_ADMIN_NAME").unwrap_or(seed_defaults.name),
        };

        let allowed_origins = non_empty("ALLOWED_ORIGINS")
            .and_then(|raw| parse_origins(&raw))
            .unwrap_or(defaults.allowed_origins);

        Ok(Config {
            bind_addr,
            jwt,
            accept_legacy_tokens,
            seed_admin,
            allowed_origins,
            rate_limit_per_second: parsed_or("RATE_LIMIT_PER_SECOND", defaults.rate_limit_per_second),
            rate_limit_burst: parsed_or("RATE_LIMIT_BURST", defaults.rate_limit_burst),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn origin_list_skips_blank_and_invalid_entries() {
        let Some(AllowedOrigins::List(origins)) =
            parse_origins("https://parish.org, ,bad\nvalue,http://localhost:3000")
        else {
            panic!("expected an origin list");
        };
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://parish.org");
        assert_eq!(parse_origins(" , "), None);
    }

    #[test]
    fn wildcard_origin_means_any() {
        assert_eq!(parse_origins("*"), Some(AllowedOrigins::Any));
        assert_eq!(parse_origins("https://parish.org, *"), Some(AllowedOrigins::Any));
    }

    #[test]
    fn token_lifetime_must_be_in_range() {
        assert_eq!(parse_ttl_minutes(None).unwrap(), DEFAULT_TOKEN_TTL_MINUTES);
        assert_eq!(parse_ttl_minutes(Some("90".into())).unwrap(), 90);
        assert_eq!(parse_ttl_minutes(Some("soon".into())).unwrap(), DEFAULT_TOKEN_TTL_MINUTES);
        assert_eq!(
            parse_ttl_minutes(Some(MAX_TOKEN_TTL_MINUTES.to_string())).unwrap(),
            MAX_TOKEN_TTL_MINUTES
        );
        for bad in ["0", "-5", "100000000000000"] {
            assert!(parse_ttl_minutes(Some(bad.into())).is_err(), "{}", bad);
        }
    }

    #[test]
    fn defaults_match_seed_account() {
        let cfg = Config::default();
        assert_eq!(cfg.seed_admin.email, "admin@parish.org");
        assert_eq!(cfg.bind_addr.port(), 8000);
        assert!(cfg.jwt.is_none());
        assert!(cfg.accept_legacy_tokens);
    }
}
