use log::warn;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Size limits that switch the pipeline to cheaper strategies.
#[derive(Clone, Debug)]
pub struct Thresholds {
    /// Above this many links the network snapshot is aggregated.
    pub network_threshold: usize,
    /// Above this many travelers per-user output is disabled.
    pub travelers_threshold: f64,
    /// Rows per bulk statement for network objects.
    pub object_chunk_size: usize,
    /// Rows per bulk statement for OD cells.
    pub matrix_chunk_size: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            network_threshold: 1000,
            travelers_threshold: 10_000_000.0,
            object_chunk_size: 10_000,
            matrix_chunk_size: 20_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportMode {
    /// Writes land as they go; a failing file leaves earlier writes in place.
    BestEffort,
    /// One transaction per imported file.
    Atomic,
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_effort" | "best-effort" => Ok(ImportMode::BestEffort),
            "atomic" => Ok(ImportMode::Atomic),
            other => Err(format!("unknown import mode: {}", other)),
        }
    }
}

/// Connection parameters handed to the simulation engine.
#[derive(Clone, Debug, Default)]
pub struct EngineDatabase {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub engine_db: EngineDatabase,
    pub base_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub engine_path: Option<PathBuf>,
    pub postprocess_command: Option<Vec<String>>,
    pub engine_timeout_secs: Option<u64>,
    pub import_mode: ImportMode,
    pub thresholds: Thresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_base_dir(".")
    }
}

impl PipelineConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            database_url: "sqlite://metropolis.db?mode=rwc".to_string(),
            max_connections: 5,
            engine_db: EngineDatabase {
                host: "localhost".to_string(),
                name: "metropolis".to_string(),
                user: "metropolis".to_string(),
                password: String::new(),
            },
            upload_dir: base_dir.join("media"),
            base_dir,
            engine_path: None,
            postprocess_command: None,
            engine_timeout_secs: None,
            import_mode: ImportMode::BestEffort,
            thresholds: Thresholds::default(),
        }
    }

    /// Loads `.env` (if any) and `METRO_*` variables on top of the defaults.
    pub fn from_env(env_file: Option<&Path>) -> Self {
        match env_file {
            Some(path) => {
                if let Err(e) = dotenv::from_path(path) {
                    warn!("could not load env file {}: {}", path.display(), e);
                }
            }
            None => {
                let _ = dotenv::dotenv();
            }
        }

        let base_dir = std::env::var("METRO_BASE_DIR").unwrap_or_else(|_| ".".to_string());
        let mut cfg = Self::with_base_dir(base_dir);

        if let Ok(v) = std::env::var("DATABASE_URL") {
            cfg.database_url = v;
        }
        if let Ok(v) = std::env::var("METRO_UPLOAD_DIR") {
            cfg.upload_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("METRO_DB_HOST") {
            cfg.engine_db.host = v;
        }
        if let Ok(v) = std::env::var("METRO_DB_NAME") {
            cfg.engine_db.name = v;
        }
        if let Ok(v) = std::env::var("METRO_DB_USER") {
            cfg.engine_db.user = v;
        }
        if let Ok(v) = std::env::var("METRO_DB_PASS") {
            cfg.engine_db.password = v;
        }
        if let Ok(v) = std::env::var("METRO_ENGINE_PATH") {
            cfg.engine_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("METRO_POSTPROCESS_COMMAND") {
            let parts: Vec<String> = v.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                cfg.postprocess_command = Some(parts);
            }
        }
        cfg.max_connections = env_parse("METRO_MAX_CONNECTIONS", cfg.max_connections);
        cfg.engine_timeout_secs = env_parse_opt("METRO_ENGINE_TIMEOUT_SECS");
        cfg.import_mode = env_parse("METRO_IMPORT_MODE", cfg.import_mode);

        let t = &mut cfg.thresholds;
        t.network_threshold = env_parse("METRO_NETWORK_THRESHOLD", t.network_threshold);
        t.travelers_threshold = env_parse("METRO_TRAVELERS_THRESHOLD", t.travelers_threshold);
        t.object_chunk_size = env_parse("METRO_OBJECT_CHUNK_SIZE", t.object_chunk_size);
        t.matrix_chunk_size = env_parse("METRO_MATRIX_CHUNK_SIZE", t.matrix_chunk_size);

        cfg
    }

    pub fn network_output_dir(&self) -> PathBuf {
        self.base_dir.join("website_files").join("network_output")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.base_dir.join("website_files").join("exports")
    }

    pub fn script_logs_dir(&self) -> PathBuf {
        self.base_dir.join("website_files").join("script_logs")
    }

    pub fn metrosim_dir(&self) -> PathBuf {
        self.base_dir.join("metrosim_files")
    }

    pub fn engine_executable(&self) -> PathBuf {
        self.engine_path
            .clone()
            .unwrap_or_else(|| self.metrosim_dir().join("execs").join("metrosim"))
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("ignoring unparsable {}={}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_parse_opt<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring unparsable {}={}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_limits() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.thresholds.network_threshold, 1000);
        assert_eq!(cfg.thresholds.travelers_threshold, 10_000_000.0);
        assert_eq!(cfg.thresholds.object_chunk_size, 10_000);
        assert_eq!(cfg.thresholds.matrix_chunk_size, 20_000);
        assert_eq!(cfg.import_mode, ImportMode::BestEffort);
    }

    #[test]
    fn layout_is_rooted_at_base_dir() {
        let cfg = PipelineConfig::with_base_dir("/srv/metro");
        assert_eq!(
            cfg.network_output_dir(),
            PathBuf::from("/srv/metro/website_files/network_output")
        );
        assert_eq!(
            cfg.engine_executable(),
            PathBuf::from("/srv/metro/metrosim_files/execs/metrosim")
        );
        assert_eq!(cfg.upload_dir, PathBuf::from("/srv/metro/media"));
    }

    #[test]
    fn import_mode_parses() {
        assert_eq!("atomic".parse::<ImportMode>(), Ok(ImportMode::Atomic));
        assert_eq!("Best-Effort".parse::<ImportMode>(), Ok(ImportMode::BestEffort));
        assert!("sometimes".parse::<ImportMode>().is_err());
    }
}
