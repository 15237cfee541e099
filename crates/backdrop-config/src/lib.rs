use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// File name looked up under the platform config directory.
pub const CONFIG_FILE_NAME: &str = "backdrop.toml";

/// Slowest frame-rate cap accepted; `0` still means uncapped.
pub const MIN_FPS: f32 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Contents of `backdrop.toml`. Every key is optional; unset keys fall back to
/// the renderer defaults and can be overridden from the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackdropConfig {
    pub fps: Option<f32>,
    pub scale: Option<f32>,
    pub smoothing: Option<f32>,
    pub context: ContextSection,
    pub window: WindowSection,
    pub still: StillSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextSection {
    /// The background renders single-sampled; only `false` is accepted.
    pub antialias: Option<bool>,
    pub alpha: Option<bool>,
    #[serde(deserialize_with = "deserialize_power_opt")]
    pub power: Option<PowerSetting>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub title: Option<String>,
    /// Style class shown as a suffix in the window title.
    pub class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StillSection {
    /// Shader time the still is rendered at.
    #[serde(
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<Duration>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub output: Option<PathBuf>,
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_power_opt<'de, D>(deserializer: D) -> Result<Option<PowerSetting>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|raw| parse_power(&raw).map_err(de::Error::custom))
        .transpose()
}

/// Accepts the spellings people actually type for GPU power preference.
pub fn parse_power(raw: &str) -> Result<PowerSetting, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "lowpower" | "integrated" => Ok(PowerSetting::Low),
        "high" | "high-performance" | "highperformance" | "discrete" => Ok(PowerSetting::High),
        other => Err(format!(
            "invalid power preference '{other}'; expected 'low' or 'high'"
        )),
    }
}

/// Accepts `0` (uncapped) or a finite rate of at least [`MIN_FPS`].
pub fn check_fps(fps: f32) -> Result<f32, String> {
    if fps == 0.0 || (fps.is_finite() && fps >= MIN_FPS) {
        Ok(fps)
    } else {
        Err(format!(
            "fps must be 0 (uncapped) or a finite number >= {MIN_FPS}, got {fps}"
        ))
    }
}

impl BackdropConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BackdropConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(fps) = self.fps {
            check_fps(fps).map_err(ConfigError::Invalid)?;
        }

        if self.context.antialias == Some(true) {
            return Err(ConfigError::Invalid(
                "context.antialias is not supported; the background renders single-sampled"
                    .into(),
            ));
        }

        if let Some(scale) = self.scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::Invalid("scale must be greater than zero".into()));
            }
        }

        if let Some(smoothing) = self.smoothing {
            if !(smoothing > 0.0 && smoothing <= 1.0) {
                return Err(ConfigError::Invalid(
                    "smoothing must be in the range (0, 1]".into(),
                ));
            }
        }

        for (section, width, height) in [
            ("window", self.window.width, self.window.height),
            ("still", self.still.width, self.still.height),
        ] {
            if width == Some(0) || height == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "{section} dimensions must be greater than zero"
                )));
            }
        }

        if let Some(class) = &self.window.class {
            if class.trim().is_empty() || class.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "window.class '{class}' must be a single non-empty word"
                )));
            }
        }

        Ok(())
    }
}
