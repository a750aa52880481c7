use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::classifier::preprocess::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::model_loader::ModelLoader;
use crate::runtime::RuntimeConfig;

pub const DEFAULT_MODEL_PATH: &str = "covid19_cnn_model.onnx";
pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Model and runtime settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct ModelConfig {
    /// Path to the ONNX model artifact
    #[arg(long = "model", env = "LUNGSCAN_MODEL", default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    /// Expected SHA-256 of the model artifact (hex); loading fails on mismatch
    #[arg(long, env = "LUNGSCAN_MODEL_SHA256")]
    pub model_sha256: Option<String>,

    /// Width scans are resized to before inference
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub input_width: u32,

    /// Height scans are resized to before inference
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub input_height: u32,

    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub intra_threads: usize,

    /// ONNX Runtime inter-op threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub inter_threads: usize,

    /// Graph optimization level, 0 (disabled) to 3 (all)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub optimization: u8,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_sha256: None,
            input_width: DEFAULT_WIDTH,
            input_height: DEFAULT_HEIGHT,
            intra_threads: 0,
            inter_threads: 0,
            optimization: 3,
        }
    }
}

impl ModelConfig {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            ..RuntimeConfig::default()
        }
        .with_optimization(self.optimization)
    }

    /// Builds the ONNX model loader for the configured artifact.
    pub fn model_loader(&self) -> ModelLoader {
        let loader = ModelLoader::new(&self.model_path, self.runtime_config())
            .with_input_size(self.input_width, self.input_height);
        match &self.model_sha256 {
            Some(hash) => loader.with_sha256(hash.clone()),
            None => loader,
        }
    }
}

/// Settings for the HTTP server.
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    #[command(flatten)]
    pub model: ModelConfig,

    /// Address to bind
    #[arg(long, env = "LUNGSCAN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "LUNGSCAN_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum upload size in bytes
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// Maximum number of sessions kept in memory; the least recently used is evicted
    #[arg(long, env = "LUNGSCAN_MAX_SESSIONS", default_value_t = DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,

    /// Seconds of inactivity after which a session and its result are dropped
    #[arg(long, env = "LUNGSCAN_SESSION_TTL", default_value_t = DEFAULT_SESSION_TTL_SECS)]
    pub session_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            body_limit: DEFAULT_BODY_LIMIT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl AppConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use ort::session::builder::GraphOptimizationLevel;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: AppConfig,
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.model.model_path, PathBuf::from("covid19_cnn_model.onnx"));
        assert_eq!((config.model.input_width, config.model.input_height), (224, 224));
        assert_eq!(config.bind_addr().unwrap().port(), 8501);
        assert_eq!(config.max_sessions, 10_000);
        assert_eq!(config.session_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_flags() {
        let cli = TestCli::try_parse_from([
            "lungscan",
            "--model",
            "/models/scan.onnx",
            "--port",
            "9000",
            "--host",
            "0.0.0.0",
            "--intra-threads",
            "4",
            "--optimization",
            "1",
            "--max-sessions",
            "50",
        ])
        .unwrap();
        let config = cli.config;
        assert_eq!(config.model.model_path, PathBuf::from("/models/scan.onnx"));
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:9000");
        assert_eq!(config.max_sessions, 50);

        let runtime = config.model.runtime_config();
        assert_eq!(runtime.intra_threads, 4);
        assert!(matches!(runtime.optimization_level, GraphOptimizationLevel::Level1));
    }

    #[test]
    fn test_optimization_out_of_range() {
        assert!(TestCli::try_parse_from(["lungscan", "--optimization", "7"]).is_err());
    }

    #[test]
    fn test_model_loader_uses_path() {
        let mut config = ModelConfig::default();
        config.model_path = PathBuf::from("/tmp/lungscan-config/model.onnx");
        let loader = config.model_loader();
        assert_eq!(loader.model_path(), config.model_path.as_path());
        assert!(!loader.is_loaded());
    }
}
