use std::env;
use std::fmt::Display;
use std::str::FromStr;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::llm::gemini::{
    GeminiSettings, DEFAULT_EDIT_MODEL, DEFAULT_GEMINI_BASE_URL, DEFAULT_IMAGE_MODEL,
};
use crate::llm::MissingHostPolicy;
use crate::poster::{
    AspectRatio, CompositionVariant, ImageResolution, OutputSpec, SessionDefaults, StyleVariant,
};

const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialHostKind {
    Env,
    None,
}

impl FromStr for CredentialHostKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "env" | "dotenv" => Ok(CredentialHostKind::Env),
            "none" | "off" => Ok(CredentialHostKind::None),
            other => Err(format!("unknown credential host '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub telegram_api_url: String,
    pub log_level: String,
    pub gemini_api_key_env: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_image_model: String,
    pub gemini_edit_model: String,
    pub gemini_detect_upload_mime: bool,
    pub credential_host: CredentialHostKind,
    pub missing_host_policy: MissingHostPolicy,
    pub default_composition: CompositionVariant,
    pub default_style: StyleVariant,
    pub default_aspect_ratio: AspectRatio,
    pub default_resolution: ImageResolution,
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::load);

struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str, default: &str) -> String {
        (self.lookup)(name).unwrap_or_else(|| default.to_string())
    }

    fn bool(&self, name: &str, default: bool) -> bool {
        (self.lookup)(name)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    fn parsed<T, E>(&self, name: &str, default: T) -> T
    where
        T: FromStr<Err = E>,
        E: Display,
    {
        match (self.lookup)(name) {
            Some(value) if !value.trim().is_empty() => match value.parse::<T>() {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("Invalid {} value: {}; using default.", name, err);
                    default
                }
            },
            _ => default,
        }
    }

    fn variant<T>(&self, name: &str, default: T, from_code: fn(&str) -> Option<T>) -> T {
        match (self.lookup)(name) {
            Some(value) if !value.trim().is_empty() => from_code(&value).unwrap_or_else(|| {
                warn!("Unknown {} value '{}'; using default.", name, value.trim());
                default
            }),
            _ => default,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = EnvSource { lookup };
        let gemini_api_key_env = source
            .string("GEMINI_API_KEY_ENV", DEFAULT_API_KEY_ENV)
            .trim()
            .to_string();
        let gemini_api_key = source
            .string(&gemini_api_key_env, "")
            .trim()
            .to_string();

        Config {
            bot_token: source.string("BOT_TOKEN", ""),
            telegram_api_url: source
                .string("TELEGRAM_API_URL", DEFAULT_TELEGRAM_API_URL)
                .trim()
                .trim_end_matches('/')
                .to_string(),
            log_level: source.string("LOG_LEVEL", "info"),
            gemini_api_key,
            gemini_api_key_env,
            gemini_base_url: source.string("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            gemini_image_model: source.string("GEMINI_IMAGE_MODEL", DEFAULT_IMAGE_MODEL),
            gemini_edit_model: source.string("GEMINI_EDIT_MODEL", DEFAULT_EDIT_MODEL),
            gemini_detect_upload_mime: source.bool("GEMINI_DETECT_UPLOAD_MIME", false),
            credential_host: source.parsed("CREDENTIAL_HOST", CredentialHostKind::Env),
            missing_host_policy: source
                .parsed("KEY_GATE_MISSING_HOST", MissingHostPolicy::Permissive),
            default_composition: source.variant(
                "DEFAULT_COMPOSITION",
                CompositionVariant::default(),
                CompositionVariant::from_code,
            ),
            default_style: source.variant(
                "DEFAULT_STYLE",
                StyleVariant::default(),
                StyleVariant::from_code,
            ),
            default_aspect_ratio: source.parsed("DEFAULT_ASPECT_RATIO", AspectRatio::default()),
            default_resolution: source.parsed("DEFAULT_RESOLUTION", ImageResolution::default()),
        }
    }

    pub fn uses_default_telegram_api(&self) -> bool {
        self.telegram_api_url == DEFAULT_TELEGRAM_API_URL
    }

    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults {
            composition: self.default_composition,
            style: self.default_style,
            output: OutputSpec {
                aspect_ratio: self.default_aspect_ratio,
                resolution: self.default_resolution,
            },
        }
    }

    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            base_url: self.gemini_base_url.clone(),
            image_model: self.gemini_image_model.clone(),
            edit_model: self.gemini_edit_model.clone(),
            detect_upload_mime: self.gemini_detect_upload_mime,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.log_level, "info");
        assert!(config.uses_default_telegram_api());
        assert_eq!(config.gemini_api_key_env, "GEMINI_API_KEY");
        assert!(config.gemini_api_key.is_empty());
        assert_eq!(config.gemini_base_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(config.gemini_image_model, "gemini-3-pro-image-preview");
        assert_eq!(config.gemini_edit_model, "gemini-2.5-flash-image");
        assert!(!config.gemini_detect_upload_mime);
        assert_eq!(config.credential_host, CredentialHostKind::Env);
        assert_eq!(config.missing_host_policy, MissingHostPolicy::Permissive);
        assert_eq!(config.session_defaults(), SessionDefaults::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("GEMINI_API_KEY_ENV", "VS_KEY"),
            ("VS_KEY", "  abc123  "),
            ("GEMINI_DETECT_UPLOAD_MIME", "TRUE"),
            ("CREDENTIAL_HOST", "none"),
            ("KEY_GATE_MISSING_HOST", "strict"),
            ("DEFAULT_COMPOSITION", "crest"),
            ("DEFAULT_STYLE", "Cyberpunk"),
            ("DEFAULT_ASPECT_RATIO", "16:9"),
            ("DEFAULT_RESOLUTION", "4k"),
        ]);
        assert_eq!(config.gemini_api_key, "abc123");
        assert!(config.gemini_detect_upload_mime);
        assert_eq!(config.credential_host, CredentialHostKind::None);
        assert_eq!(config.missing_host_policy, MissingHostPolicy::Strict);

        let defaults = config.session_defaults();
        assert_eq!(defaults.composition, CompositionVariant::CrestBackdrop);
        assert_eq!(defaults.style, StyleVariant::CyberpunkNeon);
        assert_eq!(defaults.output.aspect_ratio, AspectRatio::Landscape16x9);
        assert_eq!(defaults.output.resolution, ImageResolution::Res4k);
    }

    #[test]
    fn unknown_values_fall_back() {
        let config = config_from(&[
            ("CREDENTIAL_HOST", "browser"),
            ("KEY_GATE_MISSING_HOST", "maybe"),
            ("DEFAULT_COMPOSITION", "spiral"),
            ("DEFAULT_ASPECT_RATIO", "5:4"),
        ]);
        assert_eq!(config.credential_host, CredentialHostKind::Env);
        assert_eq!(config.missing_host_policy, MissingHostPolicy::Permissive);
        assert_eq!(config.default_composition, CompositionVariant::DiagonalSplit);
        assert_eq!(config.default_aspect_ratio, AspectRatio::Portrait9x16);
    }

    #[test]
    fn gemini_settings_follow_config() {
        let config = config_from(&[
            ("GEMINI_BASE_URL", "http://localhost:9000"),
            ("TELEGRAM_API_URL", " http://localhost:8081/ "),
        ]);
        assert_eq!(config.telegram_api_url, "http://localhost:8081");
        assert!(!config.uses_default_telegram_api());
        let settings = config.gemini_settings();
        assert_eq!(settings.base_url, "http://localhost:9000");
        assert_eq!(settings.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(settings.edit_model, DEFAULT_EDIT_MODEL);
    }
}
