// # bulkopsd - bulk domain operation daemon
//
// Thin integration layer over bulkops-core. All job semantics (cursor,
// throttling, stop/resume) live in the core; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes tracing and the runtime
// 3. Starts (or resumes) one bulk job
// 4. Logs progress until the job settles, translating SIGINT/SIGTERM into a stop
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Job
// - `BULKOPSD_JOB_KIND`: sync, redirect_update, dns_add, dns_remove
// - `BULKOPSD_DOMAINS_FILE`: One domain per line, `#` starts a comment
// - `BULKOPSD_RESUME`: Resume the stored run of this kind instead of starting (1/true)
//
// ### Change parameters
// - `BULKOPSD_REDIRECT_NAME`: Redirect host (default `@`)
// - `BULKOPSD_REDIRECT_TARGET`: Redirect target URL (redirect_update)
// - `BULKOPSD_DNS_RECORD_TYPE`: Record type (dns_add, dns_remove)
// - `BULKOPSD_DNS_RECORD_NAME`: Record host (default `@`)
// - `BULKOPSD_DNS_ADDRESS`: Record value (dns_add)
// - `BULKOPSD_DNS_TTL`: Record TTL in seconds (dns_add, default 1800)
//
// ### State Store
// - `BULKOPSD_STATE_STORE_TYPE`: memory or file (default memory)
// - `BULKOPSD_STATE_STORE_PATH`: Path to the job file (for file store)
//
// ### Engine
// - `BULKOPSD_POLL_INTERVAL_SECS`: Progress log interval (default 1)
// - `BULKOPSD_AUTO_RESUME_SECS`: Resume automatically this long after a rate limit (unset: wait for operator)
// - `BULKOPSD_CHUNK_THRESHOLD`, `BULKOPSD_CHUNK_DELAY_SECS`: Chunking of large runs
// - `BULKOPSD_MIN_CALL_INTERVAL_MS`: Minimum spacing between registrar calls
// - `BULKOPSD_DRY_RUN_THROTTLE_EVERY`: Simulate throttling every N calls
// - `BULKOPSD_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export BULKOPSD_JOB_KIND=redirect_update
// export BULKOPSD_DOMAINS_FILE=/srv/bulkops/client-a.txt
// export BULKOPSD_REDIRECT_TARGET=https://client-a.example
// export BULKOPSD_STATE_STORE_TYPE=file
// export BULKOPSD_STATE_STORE_PATH=/var/lib/bulkops/jobs.json
//
// bulkopsd
// ```

use anyhow::{Context, Result};
use bulkops_core::job::change::DEFAULT_TTL;
use bulkops_core::{
    BulkOpsConfig, Change, DnsRecord, DryRunRegistrar, JobEvent, JobKind, JobRegistry, JobStatus,
    RecordType, StateStoreConfig, create_job_store,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long a stop may wait for the call in flight
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown (job completed or stopped by signal)
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected, or the job ended in `error`)
/// - 3: Job paused on a rate limit; state is persisted, rerun with `BULKOPSD_RESUME=1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkOpsExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
    RateLimitedPause = 3,
}

impl From<BulkOpsExitCode> for ExitCode {
    fn from(code: BulkOpsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    job_kind: JobKind,
    domains_file: Option<String>,
    resume: bool,
    redirect_name: Option<String>,
    redirect_target: Option<String>,
    dns_record_type: Option<String>,
    dns_record_name: Option<String>,
    dns_address: Option<String>,
    dns_ttl: Option<u32>,
    state_store_type: String,
    state_store_path: Option<String>,
    poll_interval_secs: u64,
    auto_resume_secs: Option<u64>,
    chunk_threshold: Option<usize>,
    chunk_delay_secs: Option<u64>,
    min_call_interval_ms: Option<u64>,
    dry_run_throttle_every: Option<usize>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let job_kind = env::var("BULKOPSD_JOB_KIND").context(
            "BULKOPSD_JOB_KIND is required. Set it via: export BULKOPSD_JOB_KIND=redirect_update",
        )?;

        Ok(Self {
            job_kind: job_kind.parse()?,
            domains_file: env::var("BULKOPSD_DOMAINS_FILE").ok(),
            resume: env::var("BULKOPSD_RESUME")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            redirect_name: env::var("BULKOPSD_REDIRECT_NAME").ok(),
            redirect_target: env::var("BULKOPSD_REDIRECT_TARGET").ok(),
            dns_record_type: env::var("BULKOPSD_DNS_RECORD_TYPE").ok(),
            dns_record_name: env::var("BULKOPSD_DNS_RECORD_NAME").ok(),
            dns_address: env::var("BULKOPSD_DNS_ADDRESS").ok(),
            dns_ttl: parse_var("BULKOPSD_DNS_TTL")?,
            state_store_type: env::var("BULKOPSD_STATE_STORE_TYPE")
                .unwrap_or_else(|_| "memory".to_string()),
            state_store_path: env::var("BULKOPSD_STATE_STORE_PATH").ok(),
            poll_interval_secs: parse_var("BULKOPSD_POLL_INTERVAL_SECS")?.unwrap_or(1),
            auto_resume_secs: parse_var("BULKOPSD_AUTO_RESUME_SECS")?,
            chunk_threshold: parse_var("BULKOPSD_CHUNK_THRESHOLD")?,
            chunk_delay_secs: parse_var("BULKOPSD_CHUNK_DELAY_SECS")?,
            min_call_interval_ms: parse_var("BULKOPSD_MIN_CALL_INTERVAL_MS")?,
            dry_run_throttle_every: parse_var("BULKOPSD_DRY_RUN_THROTTLE_EVERY")?,
            log_level: env::var("BULKOPSD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if !self.resume && self.domains_file.as_ref().is_none_or(|p| p.is_empty()) {
            anyhow::bail!(
                "BULKOPSD_DOMAINS_FILE is required unless BULKOPSD_RESUME is set. \
                Set it via: export BULKOPSD_DOMAINS_FILE=/path/to/domains.txt"
            );
        }

        match self.state_store_type.as_str() {
            "memory" => {
                if self.resume {
                    anyhow::bail!(
                        "BULKOPSD_RESUME needs a persistent store. \
                        Set BULKOPSD_STATE_STORE_TYPE=file and BULKOPSD_STATE_STORE_PATH"
                    );
                }
            }
            "file" => {
                let Some(path) = self.state_store_path.as_deref().filter(|p| !p.is_empty())
                else {
                    anyhow::bail!(
                        "BULKOPSD_STATE_STORE_PATH is required when BULKOPSD_STATE_STORE_TYPE=file. \
                        Set it via: export BULKOPSD_STATE_STORE_PATH=/var/lib/bulkops/jobs.json"
                    );
                };

                if let Some(parent) = std::path::Path::new(path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    anyhow::bail!(
                        "BULKOPSD_STATE_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
            _ => anyhow::bail!(
                "BULKOPSD_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if !(1..=300).contains(&self.poll_interval_secs) {
            anyhow::bail!(
                "BULKOPSD_POLL_INTERVAL_SECS must be between 1 and 300 seconds. Got: {}",
                self.poll_interval_secs
            );
        }

        if let Some(secs) = self.auto_resume_secs
            && !(1..=86_400).contains(&secs)
        {
            anyhow::bail!(
                "BULKOPSD_AUTO_RESUME_SECS must be between 1 and 86400 seconds. Got: {}",
                secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "BULKOPSD_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.change()?.validate()?;
        self.core_config().validate()?;

        Ok(())
    }

    /// Change parameters for the configured job kind
    fn change(&self) -> Result<Change> {
        let change = match self.job_kind {
            JobKind::Sync => Change::Sync,
            JobKind::RedirectUpdate => Change::RedirectUpdate {
                name: self.redirect_name.clone().unwrap_or_else(|| "@".to_string()),
                target: self.redirect_target.clone().context(
                    "BULKOPSD_REDIRECT_TARGET is required for redirect_update jobs",
                )?,
            },
            JobKind::DnsAdd => {
                let address = self
                    .dns_address
                    .clone()
                    .context("BULKOPSD_DNS_ADDRESS is required for dns_add jobs")?;
                let record = DnsRecord::new(self.record_type()?, address)
                    .with_name(self.record_name())
                    .with_ttl(self.dns_ttl.unwrap_or(DEFAULT_TTL));
                Change::DnsAdd {
                    records: vec![record],
                }
            }
            JobKind::DnsRemove => Change::DnsRemove {
                record_type: self.record_type()?,
                name: self.record_name(),
            },
        };
        Ok(change)
    }

    fn record_type(&self) -> Result<RecordType> {
        let value = self
            .dns_record_type
            .as_deref()
            .context("BULKOPSD_DNS_RECORD_TYPE is required for DNS jobs")?;
        Ok(RecordType::from_str(value)?)
    }

    fn record_name(&self) -> String {
        self.dns_record_name
            .clone()
            .unwrap_or_else(|| "@".to_string())
    }

    /// Engine configuration with environment overrides applied
    fn core_config(&self) -> BulkOpsConfig {
        let mut config = BulkOpsConfig::default();

        if let Some(threshold) = self.chunk_threshold {
            config.batching.chunk_threshold = threshold;
        }
        if let Some(delay) = self.chunk_delay_secs {
            config.batching.chunk_delay_secs = delay;
        }
        if let Some(interval) = self.min_call_interval_ms {
            config.engine.min_call_interval_ms = interval;
        }

        config.state_store = match (self.state_store_type.as_str(), &self.state_store_path) {
            ("file", Some(path)) => StateStoreConfig::File { path: path.clone() },
            _ => StateStoreConfig::Memory,
        };

        config
    }
}

/// Parse an optional numeric environment variable
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

/// Read the domain list, one per line
fn load_domains(path: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read BULKOPSD_DOMAINS_FILE {}", path))?;

    Ok(content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return BulkOpsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return BulkOpsExitCode::ConfigError.into();
    }

    let domains = match config.domains_file.as_deref() {
        Some(path) if !path.is_empty() => match load_domains(path) {
            Ok(domains) => domains,
            Err(e) => {
                eprintln!("Configuration error: {:#}", e);
                return BulkOpsExitCode::ConfigError.into();
            }
        },
        _ => Vec::new(),
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return BulkOpsExitCode::ConfigError.into();
    }

    info!("Starting bulkopsd");
    info!(
        "Job: {} over {} domain(s), store: {}",
        config.job_kind,
        domains.len(),
        config.state_store_type
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return BulkOpsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run_daemon(config, domains).await {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                BulkOpsExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Run one job until it settles
async fn run_daemon(config: Config, domains: Vec<String>) -> Result<BulkOpsExitCode> {
    let kind = config.job_kind;
    let core_config = config.core_config();
    let store = create_job_store(&core_config.state_store).await?;

    let registrar = Arc::new(
        DryRunRegistrar::new().with_throttle_every(config.dry_run_throttle_every.unwrap_or(0)),
    );
    info!("Using registrar: dry-run (changes are logged, not applied)");

    let (registry, events) = JobRegistry::new(registrar, store.clone(), core_config)?;
    tokio::spawn(log_events(events));

    let restored = registry.restore().await?;
    if !restored.is_empty() {
        info!("Restored {} stored job(s)", restored.len());
    }

    let resumable = registry
        .snapshot(kind)
        .await
        .map(|state| state.can_resume())
        .unwrap_or(false);

    if config.resume && resumable {
        registry.resume_job(kind).await?;
    } else {
        if config.resume {
            if domains.is_empty() {
                anyhow::bail!("No resumable {} job stored and no domains to start one", kind);
            }
            warn!("No resumable {} job stored, starting a new run", kind);
        }
        let change = config.change()?;
        let handle = registry.start_job(kind, domains, change).await?;
        info!("Accepted {} job over {} domain(s)", handle.kind, handle.total);
    }

    let reporter = registry.reporter();
    let mut poll = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let code = loop {
        tokio::select! {
            _ = poll.tick() => {
                if let Ok(report) = reporter.report(kind).await {
                    info!("{}", report.summary());
                }
            }

            settled = registry.wait_until_settled(kind) => {
                settled?;
                let state = registry.snapshot(kind).await?;
                match state.status {
                    JobStatus::Completed => {
                        info!("{} job completed", kind);
                        break BulkOpsExitCode::CleanShutdown;
                    }
                    JobStatus::Error => {
                        error!(
                            "{} job failed: {}",
                            kind,
                            state.error.as_deref().unwrap_or("unknown error")
                        );
                        break BulkOpsExitCode::RuntimeError;
                    }
                    JobStatus::RateLimited => {
                        let Some(secs) = config.auto_resume_secs else {
                            warn!(
                                "{} job paused on a rate limit at {}/{}. \
                                Rerun with BULKOPSD_RESUME=1 to continue.",
                                kind,
                                state.cursor,
                                state.total()
                            );
                            break BulkOpsExitCode::RateLimitedPause;
                        };

                        warn!("{} job rate limited, resuming in {}s", kind, secs);
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                                registry.resume_job(kind).await?;
                            }
                            signal = &mut shutdown => {
                                info!("Received shutdown signal: {}", signal?);
                                registry.stop_job(kind).await?;
                                break BulkOpsExitCode::CleanShutdown;
                            }
                        }
                    }
                    JobStatus::Stopped => {
                        info!("{} job stopped", kind);
                        break BulkOpsExitCode::CleanShutdown;
                    }
                    JobStatus::Running | JobStatus::Idle => {
                        debug!("{} job resumed while settling", kind);
                    }
                }
            }

            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                registry.stop_job(kind).await?;
                if tokio::time::timeout(SHUTDOWN_TIMEOUT, registry.wait_until_settled(kind))
                    .await
                    .is_err()
                {
                    warn!("Registrar call still in flight after {:?}", SHUTDOWN_TIMEOUT);
                }
                break BulkOpsExitCode::CleanShutdown;
            }
        }
    };

    if let Ok(report) = reporter.report(kind).await {
        info!("Final: {}", report.summary());
        for entry in &report.recent_errors {
            warn!("  {}: {}", entry.item, entry.message);
        }
        if report.total_errors > report.recent_errors.len() {
            warn!(
                "  ... and {} more error(s)",
                report.total_errors - report.recent_errors.len()
            );
        }
    }

    store.flush().await?;
    info!("State flushed, daemon stopped");

    Ok(code)
}

/// Log job events for monitoring
async fn log_events(events: mpsc::Receiver<JobEvent>) {
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        debug!("Job event: {:?}", event);
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(received)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: JobKind) -> Config {
        Config {
            job_kind: kind,
            domains_file: Some("domains.txt".to_string()),
            resume: false,
            redirect_name: None,
            redirect_target: None,
            dns_record_type: None,
            dns_record_name: None,
            dns_address: None,
            dns_ttl: None,
            state_store_type: "memory".to_string(),
            state_store_path: None,
            poll_interval_secs: 1,
            auto_resume_secs: None,
            chunk_threshold: None,
            chunk_delay_secs: None,
            min_call_interval_ms: None,
            dry_run_throttle_every: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn redirect_jobs_need_a_target() {
        let mut cfg = config(JobKind::RedirectUpdate);
        assert!(cfg.validate().is_err());

        cfg.redirect_target = Some("https://client.example".to_string());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.change().unwrap(), Change::redirect("https://client.example"));
    }

    #[test]
    fn dns_add_builds_one_record() {
        let mut cfg = config(JobKind::DnsAdd);
        cfg.dns_record_type = Some("cname".to_string());
        cfg.dns_record_name = Some("www".to_string());
        cfg.dns_address = Some("target.example.net".to_string());

        match cfg.change().unwrap() {
            Change::DnsAdd { records } => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].record_type, RecordType::Cname);
                assert_eq!(records[0].name, "www");
                assert_eq!(records[0].ttl, DEFAULT_TTL);
            }
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn resume_requires_file_store() {
        let mut cfg = config(JobKind::Sync);
        cfg.resume = true;
        assert!(cfg.validate().is_err());

        cfg.state_store_type = "file".to_string();
        cfg.state_store_path = Some("jobs.json".to_string());
        assert!(cfg.validate().is_ok());
        assert!(matches!(
            cfg.core_config().state_store,
            StateStoreConfig::File { .. }
        ));
    }

    #[test]
    fn domains_file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.txt");
        std::fs::write(&path, "# clients\nalpha.com\n\n  beta.org  # moved\n").unwrap();

        let domains = load_domains(path.to_str().unwrap()).unwrap();
        assert_eq!(domains, vec!["alpha.com", "beta.org"]);
    }
}
