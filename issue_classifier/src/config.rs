use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub trait Validatable {
    fn validate(&self) -> Result<(), ConfigError>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    pub classifier: ClassifierConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, the layout of Keras exported models.
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_layout")]
    pub layout: TensorLayout,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_image_size() -> u32 {
    224
}

fn default_layout() -> TensorLayout {
    TensorLayout::Nhwc
}

impl ModelConfig {
    pub fn get_path(&self) -> &Path {
        &self.path
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::Invalid(format!(
                "Model file not found: {:?}",
                self.path
            )));
        }
        if self.num_instances == 0 {
            return Err(ConfigError::Invalid(
                "model.num_instances must be at least 1".into(),
            ));
        }
        if self.image_size == 0 {
            return Err(ConfigError::Invalid(
                "model.image_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    pub classes: Vec<String>,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

impl Validatable for ClassifierConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.classes.is_empty() {
            return Err(ConfigError::Invalid(
                "classifier.classes must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "classifier.confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.classifier.validate()
    }
}

/// Plain environment variables the calling backend deploys with. They win over
/// every file and `APP_*` source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model_path: Option<String>,
    pub port: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            model_path: std::env::var("MODEL_PATH").ok(),
            port: std::env::var("PORT").ok(),
        }
    }
}

/// Loads the configuration for `APP_ENVIRONMENT`. The result still has to go
/// through [`Config::validate`].
pub fn get_configuration() -> Result<Config, ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| ConfigError::Invalid(format!("failed to read current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigError::Invalid)?;

    load_configuration(&configuration_directory, &environment, &Overrides::from_env())
}

/// Layers `base.yaml`, the environment file, `APP_*` variables and finally the
/// `MODEL_PATH` / `PORT` overrides.
pub fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
    overrides: &Overrides,
) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("model.path", overrides.model_path.clone())?
        .set_override_option("server.port", overrides.port.clone())?
        .build()?;

    Ok(config.try_deserialize::<Config>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BASE: &str = r#"
log_level: info
server:
  host: 0.0.0.0
  port: 10000
model:
  path: ./models/civic_issue_model.onnx
  image_size: 224
classifier:
  confidence_threshold: 0.5
  classes:
    - Garbage
    - Potholes
    - Street Lights
    - Vandalism
    - Water Issues
"#;

    fn write_base(dir: &Path) {
        fs::write(dir.join("base.yaml"), BASE).unwrap();
    }

    #[test]
    fn test_load_base_configuration() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());

        let config =
            load_configuration(dir.path(), &Environment::Local, &Overrides::default()).unwrap();

        assert_eq!(config.server.get_address(), "0.0.0.0:10000");
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.model.image_size, 224);
        assert_eq!(config.model.layout, TensorLayout::Nhwc);
        assert!(config.model.num_instances >= 1);
        assert_eq!(config.classifier.classes.len(), 5);
        assert_eq!(config.classifier.classes[2], "Street Lights");
        assert_eq!(config.log_level.as_str(), "info");
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        fs::write(
            dir.path().join("production.yaml"),
            "log_level: debug\nmodel:\n  layout: nchw\n",
        )
        .unwrap();

        let config =
            load_configuration(dir.path(), &Environment::Production, &Overrides::default()).unwrap();

        assert_eq!(config.log_level.as_str(), "debug");
        assert_eq!(config.model.layout, TensorLayout::Nchw);
    }

    #[test]
    fn test_model_path_and_port_overrides() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        let overrides = Overrides {
            model_path: Some("/srv/models/issues.onnx".into()),
            port: Some("8080".into()),
        };

        let config = load_configuration(dir.path(), &Environment::Local, &overrides).unwrap();

        assert_eq!(config.server.port, 8080u16);
        assert_eq!(config.server.get_address(), "0.0.0.0:8080");
        assert_eq!(
            config.model.get_path(),
            Path::new("/srv/models/issues.onnx")
        );
    }

    #[test]
    fn test_non_numeric_port_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        let overrides = Overrides {
            model_path: None,
            port: Some("ten-thousand".into()),
        };

        let result = load_configuration(dir.path(), &Environment::Local, &overrides);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_model_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_base(dir.path());
        let overrides = Overrides {
            model_path: Some(dir.path().join("absent.onnx").display().to_string()),
            port: None,
        };

        let config = load_configuration(dir.path(), &Environment::Local, &overrides).unwrap();
        let err = config.validate().unwrap_err();

        assert!(err.to_string().contains("Model file not found"));
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.yaml"),
            BASE.replace("log_level: info", "log_level: trace"),
        )
        .unwrap();

        let result = load_configuration(dir.path(), &Environment::Local, &Overrides::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_model_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = ModelConfig {
            path: dir.path().join("missing.onnx"),
            num_instances: 1,
            image_size: 224,
            layout: TensorLayout::Nhwc,
        };
        assert!(model.validate().is_err());

        let model_path = dir.path().join("model.onnx");
        fs::write(&model_path, b"onnx").unwrap();
        model.path = model_path;
        assert!(model.validate().is_ok());

        model.num_instances = 0;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_classifier_validation() {
        let mut classifier = ClassifierConfig {
            confidence_threshold: 0.5,
            classes: vec!["Garbage".into()],
        };
        assert!(classifier.validate().is_ok());

        classifier.confidence_threshold = 1.5;
        assert!(classifier.validate().is_err());

        classifier.confidence_threshold = 0.5;
        classifier.classes.clear();
        assert!(classifier.validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        let env: Result<Environment, _> = "PRODUCTION".to_string().try_into();
        assert!(matches!(env, Ok(Environment::Production)));

        let env: Result<Environment, _> = "staging".to_string().try_into();
        assert!(env.is_err());
    }
}
