use config::{Config as ConfigLoader, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub agents: HashMap<String, String>,
    pub providers: ProvidersConfig,
    pub tools: ToolsSection,
    pub circuit_breaker: CircuitBreakerConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub max_steps: usize,
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,
}

impl From<&LlmConfig> for crmpilot::LLMConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl From<&LlmConfig> for crmpilot::TurnConfig {
    fn from(config: &LlmConfig) -> Self {
        let turn = crmpilot::TurnConfig::new().with_max_steps(config.max_steps);
        match config.execution_timeout_secs {
            Some(secs) => turn.with_timeout(std::time::Duration::from_secs(secs)),
            None => turn,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub salesforce_token_url: String,
    pub hubspot_token_url: String,
    pub google_token_url: String,
    pub microsoft_token_url: String,
    pub salesforce_api_version: String,
    pub hubspot_api_base: String,
    pub google_calendar_base: String,
}

impl ProvidersConfig {
    pub fn token_url(&self, provider: crmpilot::persist::Provider) -> &str {
        use crmpilot::persist::Provider;
        match provider {
            Provider::Salesforce => &self.salesforce_token_url,
            Provider::HubSpot => &self.hubspot_token_url,
            Provider::Google => &self.google_token_url,
            Provider::Microsoft => &self.microsoft_token_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    pub search_api_url: String,
    #[serde(default)]
    pub workflow_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// OAuth app registration for one provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub session_secret: String,
    #[serde(default)]
    pub mongodb_uri: Option<String>,
    #[serde(default)]
    pub workflow_secret: Option<String>,
    #[serde(default)]
    pub search_api_key: Option<String>,
    #[serde(default)]
    pub oauth: HashMap<String, OAuthApp>,
}

impl Secrets {
    /// Read secrets from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| ConfigError::Message(format!("{name} environment variable is required")))
        };
        let optional = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let mut oauth = HashMap::new();
        for provider in ["salesforce", "hubspot", "google", "microsoft"] {
            let upper = provider.to_uppercase();
            if let (Some(client_id), Some(client_secret)) = (
                optional(&format!("{upper}_CLIENT_ID")),
                optional(&format!("{upper}_CLIENT_SECRET")),
            ) {
                oauth.insert(provider.to_string(), OAuthApp { client_id, client_secret });
            }
        }

        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            session_secret: required("SESSION_SECRET")?,
            mongodb_uri: optional("MONGODB_URI"),
            workflow_secret: optional("WORKFLOW_WEBHOOK_SECRET"),
            search_api_key: optional("SEARCH_API_KEY"),
            oauth,
        })
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables prefixed with `CRMPILOT`, e.g. `CRMPILOT__LLM__MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                Environment::with_prefix("CRMPILOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = config.try_deserialize()?;
        cfg.secrets = Secrets::from_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend.eq_ignore_ascii_case("mongodb") && self.secrets.mongodb_uri.is_none() {
            return Err(ConfigError::Message(
                "MONGODB_URI environment variable is required for the mongodb backend".to_string(),
            ));
        }
        if self.secrets.session_secret.len() < 32 {
            return Err(ConfigError::Message("SESSION_SECRET must be at least 32 bytes".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.llm.max_steps, 10);
        assert!(config.agents.is_empty());
        assert!(config.secrets.openai_api_key.is_empty());
    }

    #[test]
    fn test_llm_section_maps_to_turn_config() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 3000

            [cors]
            enabled = false
            origins = []

            [storage]
            backend = "memory"
            database = "test"

            [llm]
            model = "gpt-4o-mini"
            max_steps = 4
            execution_timeout_secs = 30

            [agents]
            data-steward = "Be careful."

            [providers]
            salesforce_token_url = "http://sf/token"
            hubspot_token_url = "http://hs/token"
            google_token_url = "http://g/token"
            microsoft_token_url = "http://ms/token"
            salesforce_api_version = "60.0"
            hubspot_api_base = "http://hs"
            google_calendar_base = "http://g"

            [tools]
            search_api_url = "http://search"

            [circuit_breaker]
            threshold = 2
            cooldown_secs = 5

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        let turn: crmpilot::TurnConfig = (&config.llm).into();
        assert_eq!(turn.max_steps, 4);
        assert_eq!(turn.execution_timeout, Some(std::time::Duration::from_secs(30)));

        let llm: crmpilot::LLMConfig = (&config.llm).into();
        assert_eq!(llm.model, "gpt-4o-mini");
        assert_eq!(llm.temperature, None);
        assert_eq!(config.agents.get("data-steward").map(String::as_str), Some("Be careful."));
    }
}
