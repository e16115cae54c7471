use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Placeholder JWT secrets that MUST NOT be used in production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl: chrono::Duration,
    pub cors_origins: Vec<String>,
    pub admin_users: Vec<String>,
    pub daily_job_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let production = var("SLITHER_ENV", "development") == "production";

        let jwt_secret = var("SLITHER_JWT_SECRET", PLACEHOLDER_SECRETS[0]);
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            if production {
                bail!("SLITHER_JWT_SECRET is unset or still a placeholder");
            }
            warn!("SLITHER_JWT_SECRET is a placeholder; do not run like this in production");
        }

        let port = var("SLITHER_PORT", "8000")
            .parse()
            .context("SLITHER_PORT must be a port number")?;

        let ttl_raw = var("SLITHER_JWT_EXPIRES_IN", "7d");
        let jwt_ttl = parse_duration(&ttl_raw)
            .with_context(|| format!("SLITHER_JWT_EXPIRES_IN: invalid duration '{}'", ttl_raw))?;

        let daily_job_interval_secs: u64 = var("SLITHER_DAILY_JOB_INTERVAL_SECS", "3600")
            .parse()
            .context("SLITHER_DAILY_JOB_INTERVAL_SECS must be a whole number of seconds")?;
        if daily_job_interval_secs == 0 {
            bail!("SLITHER_DAILY_JOB_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            host: var("SLITHER_HOST", "0.0.0.0"),
            port,
            db_path: var("SLITHER_DB_PATH", "slither.db").into(),
            jwt_secret,
            jwt_ttl,
            cors_origins: split_list(&var("SLITHER_CORS_ORIGINS", "http://localhost:3000")),
            admin_users: split_list(&var("SLITHER_ADMIN_USERS", "admin")),
            daily_job_interval_secs,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Parse durations like `7d`, `12h`, `30m`, `45s`. A bare number is seconds.
fn parse_duration(raw: &str) -> Option<chrono::Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&raw[..i], c),
        _ => (raw, 's'),
    };
    let n: i64 = digits.parse().ok().filter(|n| *n > 0)?;

    match unit {
        's' => chrono::Duration::try_seconds(n),
        'm' => chrono::Duration::try_minutes(n),
        'h' => chrono::Duration::try_hours(n),
        'd' => chrono::Duration::try_days(n),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("slither.db"));
        assert_eq!(config.jwt_ttl, chrono::Duration::days(7));
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.admin_users, vec!["admin"]);
        assert_eq!(config.daily_job_interval_secs, 3600);
        assert_eq!(config.addr().unwrap().port(), 8000);
    }

    #[test]
    fn production_refuses_placeholder_secret() {
        assert!(config(&[("SLITHER_ENV", "production")]).is_err());
        assert!(
            config(&[
                ("SLITHER_ENV", "production"),
                ("SLITHER_JWT_SECRET", "dev-secret-change-me"),
            ])
            .is_err()
        );
        assert!(
            config(&[
                ("SLITHER_ENV", "production"),
                ("SLITHER_JWT_SECRET", "a-real-secret-value"),
            ])
            .is_ok()
        );
    }

    #[test]
    fn lists_are_trimmed() {
        let config = config(&[
            ("SLITHER_CORS_ORIGINS", "https://a.example, https://b.example ,"),
            ("SLITHER_ADMIN_USERS", "root,ops"),
        ])
        .unwrap();
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.admin_users, vec!["root", "ops"]);
    }

    #[test]
    fn duration_suffixes() {
        assert_eq!(parse_duration("7d"), Some(chrono::Duration::days(7)));
        assert_eq!(parse_duration("12h"), Some(chrono::Duration::hours(12)));
        assert_eq!(parse_duration("30m"), Some(chrono::Duration::minutes(30)));
        assert_eq!(parse_duration("90"), Some(chrono::Duration::seconds(90)));
        assert_eq!(parse_duration("0d"), None);
        assert_eq!(parse_duration("7w"), None);
        assert_eq!(parse_duration("d"), None);
        assert!(config(&[("SLITHER_JWT_EXPIRES_IN", "soon")]).is_err());
    }
}
