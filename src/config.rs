use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api/chat";
pub const FALLBACK_MODEL: &str = "gpt-oss-120b";

/// Where and how to reach the chat endpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatConfig {
    pub endpoint: String,
    /// Set when talking to an OpenAI-compatible server directly instead of
    /// through the proxy.
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub stream_idle_timeout: Option<Duration>,
    pub data_dir: Option<PathBuf>,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let base_url = non_empty("OPENAI_BASE_URL").map(|url| url.trim_end_matches('/').to_string());
        let endpoint = match (&base_url, non_empty("LLM_CHAT_ENDPOINT")) {
            (_, Some(endpoint)) => endpoint,
            (Some(base), None) => format!("{base}/chat/completions"),
            (None, None) => DEFAULT_ENDPOINT.to_string(),
        };

        let stream_idle_timeout = non_empty("LLM_STREAM_IDLE_TIMEOUT_SECS")
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("LLM_STREAM_IDLE_TIMEOUT_SECS is not a number: {raw}"))
            })
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            endpoint,
            base_url,
            model: non_empty("OPENAI_MODEL"),
            api_key: non_empty("OPENAI_API_KEY"),
            stream_idle_timeout,
            data_dir: non_empty("LLM_DATA_DIR").map(PathBuf::from),
        })
    }

    /// Fills in the model for direct mode by asking the server, falling back
    /// to [`FALLBACK_MODEL`].
    pub async fn resolve_model(&mut self) {
        if self.model.is_some() {
            return;
        }
        let Some(base_url) = self.base_url.as_deref() else {
            return;
        };
        let client = reqwest::Client::new();
        let model = match crate::ai::detect_model(&client, base_url).await {
            Ok(model) => {
                tracing::info!("detected model {model}");
                model
            }
            Err(err) => {
                tracing::warn!("model detection failed: {err}; using {FALLBACK_MODEL}");
                FALLBACK_MODEL.to_string()
            }
        };
        self.model = Some(model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ChatConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ChatConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_proxy() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.base_url, None);
        assert_eq!(config.stream_idle_timeout, None);
    }

    #[test]
    fn base_url_switches_to_direct_mode() {
        let config = config_from(&[
            ("OPENAI_BASE_URL", "http://gpu-box:8000/v1/"),
            ("OPENAI_API_KEY", "secret"),
        ])
        .unwrap();
        assert_eq!(config.endpoint, "http://gpu-box:8000/v1/chat/completions");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn explicit_endpoint_wins() {
        let config = config_from(&[
            ("OPENAI_BASE_URL", "http://gpu-box:8000/v1"),
            ("LLM_CHAT_ENDPOINT", "http://proxy/api/chat"),
        ])
        .unwrap();
        assert_eq!(config.endpoint, "http://proxy/api/chat");
    }

    #[test]
    fn parses_idle_timeout() {
        let config = config_from(&[("LLM_STREAM_IDLE_TIMEOUT_SECS", "30")]).unwrap();
        assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(30)));

        assert!(config_from(&[("LLM_STREAM_IDLE_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[tokio::test]
    async fn configured_model_skips_detection() {
        let mut config = config_from(&[
            ("OPENAI_BASE_URL", "http://127.0.0.1:9/v1"),
            ("OPENAI_MODEL", "local-model"),
        ])
        .unwrap();
        config.resolve_model().await;
        assert_eq!(config.model.as_deref(), Some("local-model"));
    }
}
