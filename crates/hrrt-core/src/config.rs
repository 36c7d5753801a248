use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendKind;

/// On-disk configuration (`Config.toml` plus `HRRT_*` environment overrides).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub acs: AcsConfig,
    pub local: LocalConfig,
    pub cloud: CloudConfig,
    pub database: DatabaseConfig,
    pub guard: GuardSettings,
    pub checksum: ChecksumConfig,
    pub workers: usize,
    pub ignore_patterns: Vec<String>,
    pub hostname: Option<String>,
}

/// Scanner console export roots.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcsConfig {
    pub root: String,
    pub test_root: String,
}

/// Local backup roots.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub root: String,
    pub test_root: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub enabled: bool,
    pub bucket: String,
    pub test_bucket: String,
    pub region: String,
    pub profile: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub local_path: String,
    pub test_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    pub max_test_files: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChecksumConfig {
    pub md5: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            acs: AcsConfig::default(),
            local: LocalConfig::default(),
            cloud: CloudConfig::default(),
            database: DatabaseConfig::default(),
            guard: GuardSettings::default(),
            checksum: ChecksumConfig::default(),
            workers: 4,
            ignore_patterns: Vec::new(),
            hostname: None,
        }
    }
}

impl Default for AcsConfig {
    fn default() -> Self {
        Self {
            root: "/mnt/hrrt/SCS_SCANS".to_string(),
            test_root: "~/data/hrrt_acs".to_string(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: "/data/archive".to_string(),
            test_root: "/data/archive_test".to_string(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket: "hrrt-recon".to_string(),
            test_bucket: "hrrt-recon-test".to_string(),
            region: "us-east-1".to_string(),
            profile: "hrrt-recon".to_string(),
            timeout_secs: 60,
            max_attempts: 5,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "hrrt_recon.db".to_string(),
            local_path: "hrrt_recon_local.db".to_string(),
            test_path: "hrrt_recon_test.db".to_string(),
        }
    }
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self { max_test_files: 100 }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let name = env::var("HRRT_CONFIG").unwrap_or_else(|_| "Config".to_string());
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(&name).required(false))
        .add_source(Environment::with_prefix("HRRT").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Command-line switches that change how the configuration is resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub verbose: bool,
    pub debug: bool,
    pub dummy: bool,
    pub local: bool,
    pub test: bool,
}

/// Production and test locations of one backend, as configured.
#[derive(Debug, Clone)]
pub struct RootPair {
    pub production: String,
    pub test: String,
}

#[derive(Debug, Clone)]
pub struct CloudTarget {
    pub bucket: String,
    pub region: String,
    pub profile: String,
    pub timeout: Duration,
    pub max_attempts: u32,
}

/// Configuration resolved once from [`AppConfig`] and [`RunFlags`] and passed
/// down explicitly for the rest of the run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub acs_root: PathBuf,
    pub local_root: PathBuf,
    pub cloud: Option<CloudTarget>,
    pub database_path: PathBuf,
    pub hostname: String,
    pub workers: usize,
    pub ignore_patterns: Vec<String>,
    pub compute_md5: bool,
    pub dummy: bool,
    pub test: bool,
    pub verbose: bool,
    pub acs_roots: RootPair,
    pub local_roots: RootPair,
    pub cloud_roots: RootPair,
    pub max_test_files: usize,
}

impl RunConfig {
    pub fn resolve(app: &AppConfig, flags: &RunFlags) -> Self {
        let acs_roots = RootPair {
            production: expand_home(&app.acs.root),
            test: expand_home(&app.acs.test_root),
        };
        let local_roots = RootPair {
            production: expand_home(&app.local.root),
            test: expand_home(&app.local.test_root),
        };
        let cloud_roots = RootPair {
            production: app.cloud.bucket.clone(),
            test: app.cloud.test_bucket.clone(),
        };

        let pick = |pair: &RootPair| {
            if flags.test {
                pair.test.clone()
            } else {
                pair.production.clone()
            }
        };

        let cloud = app.cloud.enabled.then(|| CloudTarget {
            bucket: pick(&cloud_roots),
            region: app.cloud.region.clone(),
            profile: app.cloud.profile.clone(),
            timeout: Duration::from_secs(app.cloud.timeout_secs),
            max_attempts: app.cloud.max_attempts,
        });

        let database_path = if flags.test {
            &app.database.test_path
        } else if flags.local {
            &app.database.local_path
        } else {
            &app.database.path
        };

        RunConfig {
            acs_root: PathBuf::from(pick(&acs_roots)),
            local_root: PathBuf::from(pick(&local_roots)),
            cloud,
            database_path: PathBuf::from(expand_home(database_path)),
            hostname: app.hostname.clone().unwrap_or_else(default_hostname),
            workers: app.workers.max(1),
            ignore_patterns: app.ignore_patterns.clone(),
            compute_md5: app.checksum.md5,
            dummy: flags.dummy,
            test: flags.test,
            verbose: flags.verbose,
            acs_roots,
            local_roots,
            cloud_roots,
            max_test_files: app.guard.max_test_files,
        }
    }

    /// Configured production/test roots for a backend kind.
    pub fn roots_for(&self, kind: BackendKind) -> &RootPair {
        match kind {
            BackendKind::Source => &self.acs_roots,
            BackendKind::Local => &self.local_roots,
            BackendKind::Cloud => &self.cloud_roots,
        }
    }
}

pub fn default_hostname() -> String {
    env::var("HOSTNAME")
        .or_else(|_| env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path.to_string(),
    }
}
