use std::collections::HashMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::ConfigError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";
const DEFAULT_DB_LOCATION: &str = "./data";
const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LLM_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// File value first, then the process environment.
    pub fn get_prop(&self, key: &str) -> Option<String> {
        self.get(key).or_else(|| env::var(key).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Api,
    Cli,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    OpenAI {
        api_key: Option<String>,
        base_url: String,
        model: String,
    },
    Ollama {
        endpoint: String,
        model: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub timeout: Duration,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub run_mode: RunMode,
    pub bind_addr: SocketAddr,
    pub llm: LlmSettings,
    pub timezone: Tz,
    pub store: StoreLocation,
    pub api_tokens: HashMap<String, String>,
    pub default_user_id: Option<String>,
}

impl Settings {
    pub fn resolve(config: &AppConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| config.get_prop(key))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let run_mode = match get("RUN_MODE").as_deref() {
            None | Some("cli") => RunMode::Cli,
            Some("api") => RunMode::Api,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "RUN_MODE",
                    value: other.to_string(),
                });
            }
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let provider = match get("LLM_PROVIDER").as_deref() {
            None | Some("openai") => LlmProvider::OpenAI {
                api_key: get("OPENAI_API_KEY"),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            Some("ollama") => LlmProvider::Ollama {
                endpoint: get("OLLAMA_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_ENDPOINT.to_string()),
                model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LLM_PROVIDER",
                    value: other.to_string(),
                });
            }
        };

        let timeout_secs = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::Invalid {
                    key: "LLM_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => DEFAULT_LLM_TIMEOUT_SECS,
        };

        let temperature = match get("LLM_TEMPERATURE") {
            Some(raw) => raw
                .parse::<f32>()
                .ok()
                .filter(|t| (0.0..=2.0).contains(t))
                .ok_or(ConfigError::Invalid {
                    key: "LLM_TEMPERATURE",
                    value: raw,
                })?,
            None => DEFAULT_LLM_TEMPERATURE,
        };

        let tz_raw = get("USER_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = tz_raw.parse::<Tz>().map_err(|_| ConfigError::Invalid {
            key: "USER_TIMEZONE",
            value: tz_raw.clone(),
        })?;

        let store = match get("DB_LOCATION") {
            Some(location) if location == ":memory:" => StoreLocation::Memory,
            Some(location) => StoreLocation::Sqlite(location),
            None => StoreLocation::Sqlite(DEFAULT_DB_LOCATION.to_string()),
        };

        let api_tokens = match get("API_TOKENS") {
            Some(raw) => parse_token_table(&raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            run_mode,
            bind_addr,
            llm: LlmSettings {
                provider,
                timeout: Duration::from_secs(timeout_secs),
                temperature,
            },
            timezone,
            store,
            api_tokens,
            default_user_id: get("DEFAULT_USER_ID"),
        })
    }
}

// "token:user,token:user"
fn parse_token_table(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((token, user)) = entry.split_once(':') else {
            return Err(ConfigError::Invalid {
                key: "API_TOKENS",
                value: entry.to_string(),
            });
        };
        let (token, user) = (token.trim(), user.trim());
        if token.is_empty() || user.is_empty() {
            return Err(ConfigError::Invalid {
                key: "API_TOKENS",
                value: entry.to_string(),
            });
        }
        tokens.insert(token.to_string(), user.to_string());
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_file_handles_comments_exports_and_quotes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# scheduler settings").unwrap();
        writeln!(file, "export RUN_MODE=api").unwrap();
        writeln!(file, "OPENAI_MODEL=\"gpt-4o\"").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "USER_TIMEZONE='Europe/Berlin'").unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.get("RUN_MODE").as_deref(), Some("api"));
        assert_eq!(config.get("OPENAI_MODEL").as_deref(), Some("gpt-4o"));
        assert_eq!(config.get("USER_TIMEZONE").as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn parse_rejects_lines_without_equals() {
        let err = AppConfig::parse("RUN_MODE api").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLine { line: 1, .. }));
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.run_mode, RunMode::Cli);
        assert_eq!(settings.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(settings.llm.timeout, Duration::from_secs(30));
        assert_eq!(settings.timezone, chrono_tz::Asia::Shanghai);
        assert_eq!(settings.store, StoreLocation::Sqlite("./data".to_string()));
        assert!(matches!(
            settings.llm.provider,
            LlmProvider::OpenAI { api_key: None, .. }
        ));
    }

    #[test]
    fn ollama_provider_and_token_table() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("LLM_PROVIDER", "ollama"),
            ("OLLAMA_MODEL", "qwen2"),
            ("API_TOKENS", "abc:alice, def:bob"),
            ("DB_LOCATION", ":memory:"),
        ]))
        .unwrap();

        assert_eq!(
            settings.llm.provider,
            LlmProvider::Ollama {
                endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
                model: "qwen2".to_string(),
            }
        );
        assert_eq!(settings.api_tokens.get("def").map(String::as_str), Some("bob"));
        assert_eq!(settings.store, StoreLocation::Memory);
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let err = Settings::from_lookup(lookup_from(&[("LLM_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LLM_TIMEOUT_SECS", .. }));

        let err = Settings::from_lookup(lookup_from(&[("USER_TIMEZONE", "Mars/Olympus")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "USER_TIMEZONE", .. }));

        let err = Settings::from_lookup(lookup_from(&[("API_TOKENS", "no-user")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "API_TOKENS", .. }));
    }
}
