use anyhow::{Context, Result};

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3:latest";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Runtime configuration loaded from environment variables.
/// Every value has a default; CLI flags override them in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub model: String,
    pub llm_timeout_secs: u64,
    pub max_concurrency: usize,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            ollama_base_url: env_or("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
            model: env_or("OLLAMA_MODEL", DEFAULT_MODEL),
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)
                .context("LLM_TIMEOUT_SECS must be a whole number of seconds")?,
            max_concurrency: parse_env("MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)
                .context("MAX_CONCURRENCY must be a positive integer")?
                .max(1),
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_falls_back_to_default_when_unset() {
        let value: u64 = parse_env("EXTRACTOR_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_env_or_uses_default_when_unset() {
        assert_eq!(
            env_or("EXTRACTOR_TEST_UNSET_STRING", "fallback"),
            "fallback"
        );
    }
}
