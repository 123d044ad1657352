use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory holding configuration files, relative to the working directory.
pub const CONFIGURATION_DIR: &str = "configuration";

const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Implemented by top-level configuration structures.
pub trait Config {
    /// Keys whose environment values are split on commas into lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    Base,
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors raised while assembling configuration from files and environment variables.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// Callers may treat this as "use built-in defaults".
    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate {kind_description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        kind_description: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("failed to load configuration from environment variables: {0}")]
    EnvironmentVariables(#[source] config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),
}

/// Loads configuration from `./configuration` for the environment named by `APP_ENVIRONMENT`.
///
/// Reads `base.(yaml|yml|json)`, then the environment file (`dev` or `prod`), then
/// `APP_`-prefixed environment variables. Nested keys use double underscores
/// (`APP_PIPELINE__MAX_RETRIES=5`) and list keys are comma separated
/// (`APP_PIPELINE__BACKENDS=prodweba,prodwebb`).
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load()?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads configuration from an explicit directory and environment.
///
/// The environment file is optional here: when it is absent only the base file and
/// environment variables are applied.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let base_file = find_configuration_file(directory, ConfigFileKind::Base)?;
    let builder = config::Config::builder().add_source(config::File::from(base_file.as_path()));
    check_source(&builder, ConfigFileKind::Base, &base_file)?;

    let env_kind = ConfigFileKind::Environment(environment);
    let builder = match find_configuration_file(directory, env_kind) {
        Ok(environment_file) => {
            let builder = builder.add_source(config::File::from(environment_file.as_path()));
            check_source(&builder, env_kind, &environment_file)?;
            builder
        }
        Err(LoadConfigError::ConfigurationFileMissing { .. }) => builder,
        Err(err) => return Err(err),
    };

    let builder = builder.add_source(environment_source::<T>());

    let settings = builder
        .build()
        .map_err(LoadConfigError::EnvironmentVariables)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

fn environment_source<T: Config>() -> config::Environment {
    let mut source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        source = source.try_parsing(true).list_separator(LIST_SEPARATOR);
        for key in T::LIST_PARSE_KEYS {
            source = source.with_list_parse_key(key);
        }
    }

    source
}

fn find_configuration_file(
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<PathBuf, LoadConfigError> {
    let stem = kind.stem();

    let candidates: Vec<PathBuf> = CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .collect();

    if let Some(found) = candidates.iter().find(|path| path.is_file()) {
        return Ok(found.clone());
    }

    let attempted = candidates
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        kind_description: kind.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

/// Builds the configuration so far to surface parse errors against the file that caused them.
fn check_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map(|_| ())
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        retries: u32,
    }

    impl Config for Sample {
        const LIST_PARSE_KEYS: &'static [&'static str] = &[];
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from::<Sample>(&dir.path().join("nope"), Environment::Dev)
            .unwrap_err();
        assert!(matches!(err, LoadConfigError::MissingConfigurationDirectory(_)));
    }

    #[test]
    fn missing_base_file_lists_attempted_paths() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from::<Sample>(dir.path(), Environment::Dev).unwrap_err();
        match err {
            LoadConfigError::ConfigurationFileMissing { attempted, .. } => {
                assert!(attempted.contains("base.yaml"));
                assert!(attempted.contains("base.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn environment_file_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.yaml"), "name: base\nretries: 1\n").unwrap();
        fs::write(dir.path().join("prod.json"), r#"{"retries": 7}"#).unwrap();

        let sample: Sample = load_config_from(dir.path(), Environment::Prod).unwrap();
        assert_eq!(sample.name, "base");
        assert_eq!(sample.retries, 7);

        let sample: Sample = load_config_from(dir.path(), Environment::Dev).unwrap();
        assert_eq!(sample.retries, 1);
    }

    #[test]
    fn malformed_file_names_its_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.json"), "{ not json").unwrap();

        let err = load_config_from::<Sample>(dir.path(), Environment::Dev).unwrap_err();
        assert!(matches!(err, LoadConfigError::ConfigurationFileLoad { .. }));
    }
}
