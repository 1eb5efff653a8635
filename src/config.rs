use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the phase pipeline orchestrator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Where workflow state, audit records and progress are persisted
    pub storage: StorageConfig,
    /// Transition executor settings
    pub executor: ExecutorConfig,
    /// Workflow instance cache settings
    pub cache: CacheConfig,
    /// Domain guard thresholds
    pub prerequisites: PrerequisiteConfig,
    /// Completion detection and auto-advance settings
    pub completion: CompletionConfig,
    /// Forwarding of repeated worker failures
    pub remediation: RemediationConfig,
    /// Event bus settings
    pub events: EventsConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the file backend
    pub directory: PathBuf,
    /// SQLite database URL (requires the `database` feature)
    pub database_url: String,
    /// Run migrations on startup
    pub auto_migrate: bool,
}

/// What a second transition request for a busy workflow does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail immediately with a "transition in progress" error
    Reject,
    /// Wait (bounded by `lock_wait_timeout_seconds`) behind the in-flight request
    Queue,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Upper bound for each phase worker start/stop call
    pub worker_timeout_seconds: u64,
    pub conflict_policy: ConflictPolicy,
    /// Upper bound for queued requests waiting on the workflow lock
    pub lock_wait_timeout_seconds: u64,
}

impl ExecutorConfig {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_seconds)
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_wait_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub max_capacity: u64,
    /// Evict instances not read for this long
    pub time_to_idle_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrerequisiteConfig {
    /// Minimum ideation completion score to enter ideation_ready
    pub min_ideation_completion: f64,
    /// Maximum open blockers allowed when entering ideation_ready
    pub max_ideation_blockers: u32,
    /// Minimum building completion score to enter build_review
    pub min_build_completion: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Confidence needed to auto-advance out of ideation
    pub ideation_threshold: f64,
    /// Confidence needed to auto-advance out of specification
    pub specification_threshold: f64,
    /// Confidence needed to auto-advance out of building
    pub building_threshold: f64,
    /// Used when the confidence collaborator's output is unusable
    pub default_confidence: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemediationConfig {
    /// Worker failures with at least this many attempts are forwarded
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Buffered events per subscriber before it starts lagging
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            directory: PathBuf::from(".phase-pipeline/state"),
            database_url: "sqlite://.phase-pipeline/phase-pipeline.db".to_string(),
            auto_migrate: true,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_timeout_seconds: 30,
            conflict_policy: ConflictPolicy::Reject,
            lock_wait_timeout_seconds: 120,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_idle_seconds: 900, // 15 minutes
        }
    }
}

impl Default for PrerequisiteConfig {
    fn default() -> Self {
        Self {
            min_ideation_completion: 0.6,
            max_ideation_blockers: 2,
            min_build_completion: 0.6,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            ideation_threshold: 0.8,
            specification_threshold: 0.8,
            building_threshold: 0.85,
            default_confidence: 0.5,
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
            prerequisites: PrerequisiteConfig::default(),
            completion: CompletionConfig::default(),
            remediation: RemediationConfig::default(),
            events: EventsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (phase-pipeline.toml, .phase-pipeline-rc)
    /// 3. Environment variables (prefixed with PHASE_PIPELINE__)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("phase-pipeline.toml").exists() {
            builder = builder.add_source(File::with_name("phase-pipeline"));
        }

        if Path::new(".phase-pipeline-rc").exists() {
            builder = builder.add_source(
                File::with_name(".phase-pipeline-rc").format(config::FileFormat::Toml),
            );
        }

        // Field names contain underscores, so sections are split on a double underscore:
        // PHASE_PIPELINE__EXECUTOR__WORKER_TIMEOUT_SECONDS=10
        builder = builder.add_source(
            Environment::with_prefix("PHASE_PIPELINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<PipelineConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = PipelineConfig::load_env_file();
        PipelineConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static PipelineConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_bounds() {
        let config = PipelineConfig::default();
        assert_eq!(config.executor.worker_timeout(), Duration::from_secs(30));
        assert_eq!(config.executor.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.prerequisites.min_ideation_completion, 0.6);
        assert_eq!(config.prerequisites.max_ideation_blockers, 2);
        assert_eq!(config.completion.ideation_threshold, 0.8);
        assert_eq!(config.completion.default_confidence, 0.5);
        assert_eq!(config.remediation.failure_threshold, 3);
    }

    #[test]
    fn test_config_survives_toml_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("phase-pipeline.toml");

        let mut config = PipelineConfig::default();
        config.executor.conflict_policy = ConflictPolicy::Queue;
        config.storage.backend = StorageBackend::Memory;
        config.save_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: PipelineConfig = toml::from_str(&content).unwrap();
        assert_eq!(loaded.executor.conflict_policy, ConflictPolicy::Queue);
        assert_eq!(loaded.storage.backend, StorageBackend::Memory);
    }
}
