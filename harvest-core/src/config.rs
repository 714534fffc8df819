use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Backoff and lease settings for the ledger lock.
#[derive(Debug, Clone)]
pub struct LockSettings {
    /// Attempts before giving up with a lock timeout
    pub max_retries: u32,

    /// First sleep between attempts; doubled after each failure
    pub base_delay: Duration,

    /// Upper bound for the backoff sleep
    pub max_delay: Duration,

    /// Age after which a sentinel left by a dead holder is reclaimed
    pub lease: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
            lease: Duration::from_secs(60),
        }
    }
}

/// Settings for the headless-browser PDF renderer.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Browser executable used for `--print-to-pdf`
    pub chrome_path: String,

    /// Base URL of the preview page; `None` skips straight to the static fallback
    pub frontend_url: Option<String>,

    /// Per-attempt deadline
    pub timeout: Duration,

    /// Attempts on the preview page before falling back
    pub max_retries: u32,

    /// Linear backoff step between attempts
    pub retry_delay: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            chrome_path: "chromium".to_string(),
            frontend_url: None,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_delay: Duration::from_millis(3000),
        }
    }
}

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    /// CSV ledger of record
    pub ledger_path: PathBuf,

    /// Sentinel file guarding ledger mutation across processes
    pub lock_path: PathBuf,

    /// Directory holding `invoice-<no>.pdf` artifacts
    pub pdf_dir: PathBuf,

    /// JSON product catalogue served to the invoice form
    pub products_path: PathBuf,

    /// Customers in this state pay CGST + SGST, everyone else IGST
    pub seller_home_state: String,

    /// Prefix for the `pdfUrl` stored in the ledger
    pub api_base_url: String,

    pub lock: LockSettings,
    pub render: RenderSettings,

    /// How long an allocated invoice number stays reserved
    pub reservation_ttl: Duration,

    /// Sweeper poll interval
    pub sweep_interval: Duration,

    /// Unreferenced PDFs younger than this are left alone
    pub orphan_min_age: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::rooted_at(Path::new("data"))
    }
}

impl AppConfig {
    /// Default configuration with every file kept under `data_dir`.
    pub fn rooted_at(data_dir: &Path) -> Self {
        let ledger_path = data_dir.join("invoices.csv");
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            lock_path: lock_path_for(&ledger_path),
            ledger_path,
            pdf_dir: data_dir.join("pdf"),
            products_path: data_dir.join("productRates.json"),
            seller_home_state: "Andhra Pradesh".to_string(),
            api_base_url: "http://localhost:3000/api/invoices".to_string(),
            lock: LockSettings::default(),
            render: RenderSettings::default(),
            reservation_ttl: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(3600),
            orphan_min_age: Duration::from_secs(86_400),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults; set but malformed
    /// numeric values are an error naming the variable.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let defaults = Self::default();

        let ledger_path = env::var("LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.ledger_path);
        let lock_path = env::var("LOCK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| lock_path_for(&ledger_path));

        let lock = LockSettings {
            max_retries: parse_var("LOCK_MAX_RETRIES", defaults.lock.max_retries)?,
            base_delay: Duration::from_millis(parse_var("LOCK_BASE_DELAY_MS", 100u64)?),
            max_delay: Duration::from_millis(parse_var("LOCK_MAX_DELAY_MS", 2000u64)?),
            lease: Duration::from_secs(parse_var("LOCK_LEASE_SECONDS", 60u64)?),
        };

        let render = RenderSettings {
            chrome_path: env::var("CHROME_PATH").unwrap_or(defaults.render.chrome_path),
            frontend_url: env::var("FRONTEND_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            timeout: Duration::from_secs(parse_var("RENDER_TIMEOUT_SECONDS", 60u64)?),
            max_retries: parse_var("RENDER_MAX_RETRIES", defaults.render.max_retries)?,
            retry_delay: Duration::from_millis(parse_var("RENDER_RETRY_DELAY_MS", 3000u64)?),
        };

        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or(defaults.host),
            port: parse_var("SERVER_PORT", defaults.port)?,
            ledger_path,
            lock_path,
            pdf_dir: env::var("PDF_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.pdf_dir),
            products_path: env::var("PRODUCTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.products_path),
            seller_home_state: env::var("SELLER_HOME_STATE")
                .unwrap_or(defaults.seller_home_state),
            api_base_url: env::var("API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            lock,
            render,
            reservation_ttl: Duration::from_secs(parse_var("RESERVATION_TTL_SECONDS", 1800u64)?),
            sweep_interval: Duration::from_secs(parse_var("SWEEP_INTERVAL_SECONDS", 3600u64)?),
            orphan_min_age: Duration::from_secs(parse_var("ORPHAN_MIN_AGE_SECONDS", 86_400u64)?),
        })
    }
}

fn lock_path_for(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn parse_var<T>(name: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {} ({})", name, raw, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_sits_next_to_ledger() {
        let config = AppConfig::rooted_at(Path::new("/tmp/ledger"));
        assert_eq!(config.ledger_path, PathBuf::from("/tmp/ledger/invoices.csv"));
        assert_eq!(config.lock_path, PathBuf::from("/tmp/ledger/invoices.csv.lock"));
        assert_eq!(config.pdf_dir, PathBuf::from("/tmp/ledger/pdf"));
        assert_eq!(
            config.products_path,
            PathBuf::from("/tmp/ledger/productRates.json")
        );
    }

    #[test]
    fn test_default_lock_backoff() {
        let settings = LockSettings::default();
        assert_eq!(settings.max_retries, 10);
        assert_eq!(settings.base_delay, Duration::from_millis(100));
        assert_eq!(settings.max_delay, Duration::from_millis(2000));
    }
}
