use std::path::PathBuf;
use std::time::Duration;

/// Invalid worker configuration.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max concurrently executing jobs (default: `4`).
    pub concurrency: usize,
    /// Dequeue polling interval (default: 1 s).
    pub poll_interval: Duration,
    /// How often an active job re-reads its own state and renews its
    /// lease (default: 2 s).
    pub cancel_check_interval: Duration,
    /// How long a claim stays valid without renewal before another worker
    /// may take the job over (default: 30 s).
    pub job_lease: Duration,
    /// Upper bound applied to every crawl's depth (default: `5`).
    pub max_crawl_depth: u32,
    /// Where batch archives are written (default: `downloads`).
    pub download_dir: PathBuf,
    /// Language for batch requests that omit one (default: `typescript`).
    pub default_language: String,
    /// Timeout for one code generator call (default: 120 s).
    pub generator_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            cancel_check_interval: Duration::from_millis(2000),
            job_lease: Duration::from_secs(30),
            max_crawl_depth: 5,
            download_dir: PathBuf::from("downloads"),
            default_language: "typescript".into(),
            generator_timeout: Duration::from_secs(120),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default      |
    /// |-----------------------------------|--------------|
    /// | `WORKER_CONCURRENCY`              | `4`          |
    /// | `WORKER_POLL_INTERVAL_MS`         | `1000`       |
    /// | `WORKER_CANCEL_CHECK_INTERVAL_MS` | `2000`       |
    /// | `WORKER_JOB_LEASE_SECS`           | `30`         |
    /// | `CRAWL_MAX_DEPTH`                 | `5`          |
    /// | `DOWNLOAD_DIR`                    | `downloads`  |
    /// | `DEFAULT_GENERATOR_LANGUAGE`      | `typescript` |
    /// | `GENERATOR_TIMEOUT_SECS`          | `120`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let concurrency = positive(&lookup, "WORKER_CONCURRENCY")?.unwrap_or(defaults.concurrency);
        let poll_interval = positive(&lookup, "WORKER_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let cancel_check_interval = positive(&lookup, "WORKER_CANCEL_CHECK_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.cancel_check_interval);
        let job_lease = positive(&lookup, "WORKER_JOB_LEASE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.job_lease);
        if job_lease <= cancel_check_interval {
            return Err(ConfigError {
                var: "WORKER_JOB_LEASE_SECS",
                value: job_lease.as_secs().to_string(),
                reason: "must be longer than the cancel check interval".into(),
            });
        }
        let max_crawl_depth = parse(&lookup, "CRAWL_MAX_DEPTH")?.unwrap_or(defaults.max_crawl_depth);
        let download_dir = lookup("DOWNLOAD_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.download_dir);
        let default_language = lookup("DEFAULT_GENERATOR_LANGUAGE")
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.default_language);
        let generator_timeout = positive(&lookup, "GENERATOR_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.generator_timeout);

        Ok(Self {
            concurrency,
            poll_interval,
            cancel_check_interval,
            job_lease,
            max_crawl_depth,
            download_dir,
            default_language,
            generator_timeout,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|e: T::Err| ConfigError {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Like [`parse`], rejecting zero.
fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    match parse::<T>(lookup, var)? {
        Some(value) if value == T::default() => Err(ConfigError {
            var,
            value: lookup(var).unwrap_or_default(),
            reason: "must be at least 1".into(),
        }),
        other => Ok(other),
    }
}
