use std::time::Duration;

/// How much of each navigation step to surface. `Visible` is the debugging
/// aid: step-by-step navigation tracing plus dumping every fetched document
/// under `debug_pages/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    Background,
    Visible,
}

/// Runtime configuration: plain scalars, read once at startup from the
/// environment with CLI overrides. No dynamic discovery.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    /// Per-operation HTTP timeout.
    pub request_timeout: Duration,
    /// Retry attempt ceiling for navigation/extraction stages.
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Enforced pause between items, to respect the source's rate expectations.
    pub item_delay: Duration,
    /// Backups above this size get gzipped.
    pub backup_compress_bytes: u64,
    pub mode: NavigationMode,
    /// Themes used to disambiguate multi-result searches.
    pub target_themes: Vec<String>,
    pub db_path: String,
}

const DEFAULT_THEMES: &[&str] = &[
    "The Lord of the Rings",
    "The Hobbit",
    "Harry Potter",
    "Icons",
    "Games",
    "BrickHeadz",
    "Dimensions",
];

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://www.brickeconomy.com".to_string(),
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(2000),
            item_delay: Duration::from_millis(2000),
            backup_compress_bytes: 50 * 1024 * 1024,
            mode: NavigationMode::Background,
            target_themes: DEFAULT_THEMES.iter().map(|s| s.to_string()).collect(),
            db_path: "data/brickdb.sqlite".to_string(),
        }
    }
}

impl Config {
    /// Environment overrides on top of defaults. Unset or unparsable
    /// variables fall back silently; configuration errors should never keep
    /// a run from starting.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("BE_BASE_URL") {
            if !url.is_empty() {
                cfg.base_url = url.trim_end_matches('/').to_string();
            }
        }
        if let Some(secs) = env_u64("BE_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("BE_MAX_ATTEMPTS") {
            cfg.max_attempts = n.clamp(1, 10) as u32;
        }
        if let Some(ms) = env_u64("BE_RETRY_BASE_MS") {
            cfg.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("BE_ITEM_DELAY_MS") {
            cfg.item_delay = Duration::from_millis(ms);
        }
        if let Some(mb) = env_u64("BE_BACKUP_COMPRESS_MB") {
            cfg.backup_compress_bytes = mb * 1024 * 1024;
        }
        if let Ok(mode) = std::env::var("BE_NAV_MODE") {
            if mode.eq_ignore_ascii_case("visible") {
                cfg.mode = NavigationMode::Visible;
            }
        }
        if let Ok(path) = std::env::var("BE_DB_PATH") {
            if !path.is_empty() {
                cfg.db_path = path;
            }
        }
        cfg
    }

    pub fn set_search_url(&self, code: &str) -> String {
        format!("{}/search?query={}", self.base_url, urlencode(code))
    }

    pub fn minifig_url(&self, code: &str) -> String {
        format!("{}/minifig/{}", self.base_url, code)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Percent-encode the few characters that show up in catalog codes.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' => out.push(c),
            ' ' => out.push_str("%20"),
            _ => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{:02X}", b));
                }
            }
        }
    }
    out
}
