use std::env;
use std::str::FromStr;

pub const DEFAULT_SCAN_INTERVAL_SECONDS: u64 = 3600;
pub const DEFAULT_TESTING_POLL_INTERVAL_MS: i64 = 5000;
pub const DEFAULT_API_PORT: u16 = 8080;
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SMTP_FROM: &str = "library@localhost";

#[derive(Debug, Clone)]
pub struct Config {
    pub scan_interval_seconds: u64,
    pub scan_jitter_seconds: u64,
    pub testing_poll_interval_ms: i64,
    pub api_port: u16,
    /// `None` means emails are logged instead of sent.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub use_tls: bool,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Unset and blank
    /// values fall back to defaults; malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let scan_interval_seconds = parse_or(&get, "SCAN_INTERVAL_SECONDS", DEFAULT_SCAN_INTERVAL_SECONDS)?;
        if scan_interval_seconds == 0 {
            return Err("SCAN_INTERVAL_SECONDS must be greater than zero".to_string());
        }

        let scan_jitter_seconds = parse_or(&get, "SCAN_JITTER_SECONDS", 0)?;
        let testing_poll_interval_ms =
            parse_or(&get, "TESTING_POLL_INTERVAL_MS", DEFAULT_TESTING_POLL_INTERVAL_MS)?;
        let api_port = parse_or(&get, "API_PORT", DEFAULT_API_PORT)?;

        let smtp = match get("SMTP_HOST") {
            None => None,
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&get, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
                username: get("SMTP_USERNAME"),
                password: get("SMTP_PASSWORD"),
                from: get("SMTP_FROM").unwrap_or_else(|| DEFAULT_SMTP_FROM.to_string()),
                use_tls: parse_bool_or(&get, "SMTP_USE_TLS", true)?,
            }),
        };

        Ok(Self {
            scan_interval_seconds,
            scan_jitter_seconds,
            testing_poll_interval_ms,
            api_port,
            smtp,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool, String>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(format!("Invalid {}: {}", key, other)),
        },
    }
}
