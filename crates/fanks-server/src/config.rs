use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveTime, Timelike};
use chrono_tz::Tz;
use tracing::warn;

use crate::email::normalize_email;

/// When the daily reminder goes out.
#[derive(Debug, Clone)]
pub struct PushSchedule {
    pub time_zone: Tz,
    pub hour: u32,
    pub minute: u32,
    /// How often the dispatcher wakes up to compare the clock.
    pub tick: Duration,
}

impl Default for PushSchedule {
    fn default() -> Self {
        Self {
            time_zone: chrono_tz::America::Chicago,
            hour: 21,
            minute: 0,
            tick: Duration::from_secs(60),
        }
    }
}

/// Process configuration, loaded once at startup and shared as `Arc<Config>`.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub allow_signup: bool,
    /// Normalized addresses. Empty means any address may sign up.
    pub allow_signup_emails: Vec<String>,
    /// HMAC key for session tokens ($FANKS_COOKIE_STORE_SECRET[_FILE]).
    pub cookie_secret: Vec<u8>,
    pub db_path: PathBuf,
    pub vapid_public_key: Option<String>,
    /// PEM-encoded VAPID signing key. Push is disabled when absent.
    pub vapid_private_key: Option<Vec<u8>>,
    pub push: PushSchedule,
}

impl Config {
    /// Defaults for everything except the two required settings.
    pub fn new(db_path: PathBuf, cookie_secret: Vec<u8>) -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            allow_signup: false,
            allow_signup_emails: Vec::new(),
            cookie_secret,
            db_path,
            vapid_public_key: None,
            vapid_private_key: None,
            push: PushSchedule::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from `lookup`. Every problem found is reported
    /// together rather than one per restart.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors: Vec<String> = Vec::new();

        let cookie_secret = match resolve_secret(&lookup) {
            Ok(secret) => secret,
            Err(e) => {
                errors.push(format!("{e:#}"));
                Vec::new()
            }
        };
        if !cookie_secret.is_empty() && cookie_secret.len() < 32 {
            warn!(
                len = cookie_secret.len(),
                "FANKS_COOKIE_STORE_SECRET is shorter than 32 bytes; generate one with `fanks gen-secret`"
            );
        }

        let db_path = match lookup("FANKS_DB_PATH").filter(|v| !v.trim().is_empty()) {
            Some(p) => {
                let path = PathBuf::from(p.trim());
                let dir = match path.parent() {
                    Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                if !dir.is_dir() {
                    errors.push(format!(
                        "FANKS_DB_PATH directory does not exist: {}",
                        dir.display()
                    ));
                }
                path
            }
            None => {
                errors.push("FANKS_DB_PATH environment variable is required".into());
                PathBuf::new()
            }
        };

        let mut cfg = Self::new(db_path, cookie_secret);

        if let Some(host) = lookup("FANKS_HOST") {
            cfg.host = host;
        }
        if let Some(port) = lookup("FANKS_PORT") {
            match port.trim().parse() {
                Ok(p) => cfg.port = p,
                Err(_) => errors.push(format!("FANKS_PORT is not a valid port: {port:?}")),
            }
        }

        if let Some(v) = lookup("FANKS_ALLOW_SIGNUP") {
            match parse_bool(&v) {
                Some(b) => cfg.allow_signup = b,
                None => errors.push(format!("FANKS_ALLOW_SIGNUP is not a boolean: {v:?}")),
            }
        }

        if let Some(list) = lookup("FANKS_ALLOW_SIGNUP_EMAILS") {
            for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match normalize_email(raw) {
                    Some(email) => cfg.allow_signup_emails.push(email),
                    None => errors.push(format!(
                        "FANKS_ALLOW_SIGNUP_EMAILS contains an invalid address: {raw:?}"
                    )),
                }
            }
        }

        cfg.vapid_public_key = lookup("FANKS_VAPID_PUBLIC_KEY")
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty());
        if let Some(path) = lookup("FANKS_VAPID_PRIVATE_KEY_FILE") {
            match std::fs::read(&path) {
                Ok(pem) if !pem.is_empty() => cfg.vapid_private_key = Some(pem),
                Ok(_) => errors.push(format!("VAPID private key file is empty: {path}")),
                Err(e) => errors.push(format!("read VAPID private key file {path}: {e}")),
            }
        }

        if let Some(tz) = lookup("FANKS_PUSH_TIMEZONE") {
            match tz.trim().parse::<Tz>() {
                Ok(zone) => cfg.push.time_zone = zone,
                Err(_) => errors.push(format!("FANKS_PUSH_TIMEZONE is not an IANA zone: {tz:?}")),
            }
        }
        if let Some(at) = lookup("FANKS_PUSH_AT") {
            match NaiveTime::parse_from_str(at.trim(), "%H:%M") {
                Ok(t) => {
                    cfg.push.hour = t.hour();
                    cfg.push.minute = t.minute();
                }
                Err(_) => errors.push(format!("FANKS_PUSH_AT must be HH:MM: {at:?}")),
            }
        }
        if let Some(secs) = lookup("FANKS_PUSH_TICK_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(s) if s > 0 => cfg.push.tick = Duration::from_secs(s),
                _ => errors.push(format!(
                    "FANKS_PUSH_TICK_SECS must be a positive integer: {secs:?}"
                )),
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("invalid configuration:\n  {}", errors.join("\n  "));
        }
        Ok(cfg)
    }

    /// True when `email` (already normalized) may register.
    pub fn signup_allowed_for(&self, email: &str) -> bool {
        self.allow_signup_emails.is_empty() || self.allow_signup_emails.iter().any(|e| e == email)
    }
}

/// Read a secret from a file, trimming surrounding whitespace.
/// Fails if the file cannot be read or is empty after trimming.
pub fn read_key_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read key file: {}", path.display()))?;
    let key = content.trim().to_string();
    if key.is_empty() {
        anyhow::bail!("key file is empty: {}", path.display());
    }
    Ok(key)
}

/// `FANKS_COOKIE_STORE_SECRET_FILE` wins over `FANKS_COOKIE_STORE_SECRET`.
fn resolve_secret<F>(lookup: &F) -> Result<Vec<u8>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("FANKS_COOKIE_STORE_SECRET_FILE") {
        let key = read_key_file(Path::new(&path))?;
        if lookup("FANKS_COOKIE_STORE_SECRET").is_some() {
            warn!("both FANKS_COOKIE_STORE_SECRET and FANKS_COOKIE_STORE_SECRET_FILE are set; using file");
        }
        return Ok(key.into_bytes());
    }
    lookup("FANKS_COOKIE_STORE_SECRET")
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .map(String::into_bytes)
        .context("FANKS_COOKIE_STORE_SECRET or FANKS_COOKIE_STORE_SECRET_FILE environment variable is required")
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
