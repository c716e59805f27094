use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    /// Gemini API key. AI endpoints fail with a configuration error without it.
    pub api_key: Option<String>,
    /// Candidate models in fallback order. Empty means the built-in list.
    pub models: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "kondate").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = env_value("KONDATE_DB").map_or_else(|| data_dir.join("kondate.db"), PathBuf::from);

        Ok(Config {
            db_path,
            api_key: env_value("GOOGLE_API_KEY"),
            models: env_value("KONDATE_MODELS")
                .map(|list| parse_model_list(&list))
                .unwrap_or_default(),
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated model ids, blanks dropped.
fn parse_model_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_list() {
        assert_eq!(
            parse_model_list(" gemini-2.5-flash, ,gemini-1.5-pro-002 ,"),
            vec!["gemini-2.5-flash", "gemini-1.5-pro-002"]
        );
        assert!(parse_model_list("").is_empty());
    }
}
