use std::env;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LANGUAGE: &str = "en-IN";

/// Connection settings for the agent service.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Base URL of the agent service, no trailing slash.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Applied to non-streaming requests only; streams stay open-ended.
    pub request_timeout: Duration,
    /// Default language tag for the audio channel.
    pub language_code: String,
}

impl AgentConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            language_code: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Read configuration from the environment.
    ///
    /// `AGENT_ENDPOINT` selects the service, `AGENT_API_KEY` enables bearer
    /// auth, `AGENT_TIMEOUT_SECS` and `AGENT_LANGUAGE` override defaults.
    pub fn from_env() -> Self {
        let mut config = Self::new(
            env::var("AGENT_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
        );
        config.api_key = env::var("AGENT_API_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(secs) = env::var("AGENT_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse::<u64>()
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(lang) = env::var("AGENT_LANGUAGE")
            && !lang.is_empty()
        {
            config.language_code = lang;
        }
        config
    }

    /// Absolute URL for an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
