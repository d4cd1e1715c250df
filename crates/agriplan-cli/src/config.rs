//! Configuration file management for agriplan.
//!
//! Provides a TOML-based config file at `~/.config/agriplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use agriplan_core::kb::DEFAULT_PREFERRED_DOMAIN;
use agriplan_db::config::DbConfig;

/// Chat model used when none is configured.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Embedding model used when none is configured.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// `[embedding] endpoint` value selecting the local hashing embedder.
pub const OFFLINE_EMBEDDING_ENDPOINT: &str = "offline";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default, skip_serializing_if = "ProviderSection::is_empty")]
    pub llm: ProviderSection,
    #[serde(default, skip_serializing_if = "ProviderSection::is_empty")]
    pub embedding: ProviderSection,
    #[serde(default)]
    pub rules: RulesSection,
    #[serde(default)]
    pub kb: KbSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Endpoint, key and model of an OpenAI-compatible provider.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderSection {
    fn is_empty(&self) -> bool {
        self.endpoint.is_none() && self.api_key.is_none() && self.model.is_none()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RulesSection {
    /// Operator rule file replacing the built-in stage table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KbSection {
    /// Source domain whose documents are cited first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_domain: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the agriplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/agriplan` or
/// `~/.config/agriplan`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("agriplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("agriplan")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<ConfigFile> {
    toml::from_str(contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix since it may hold API keys.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// A provider with both endpoint and key present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

/// How knowledge chunks and queries are embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint.
    Http(ProviderConfig),
    /// Deterministic local feature hashing; needs no key.
    Offline,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct AgriplanConfig {
    pub db_config: DbConfig,
    /// `None` selects the offline advisor.
    pub llm: Option<ProviderConfig>,
    /// `None` disables embeddings; search falls back to keywords.
    pub embedding: Option<EmbeddingConfig>,
    pub rules_path: Option<PathBuf>,
    pub preferred_domain: String,
}

impl AgriplanConfig {
    /// Resolve configuration from the CLI flag, the process environment and
    /// the config file (if one exists).
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file = match load_config() {
            Ok(file) => Some(file),
            Err(e) if config_path().exists() => return Err(e),
            Err(_) => None,
        };
        Ok(Self::resolve_from(cli_db_url, file.as_ref(), |key| {
            std::env::var(key).ok()
        }))
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `AGRIPLAN_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - LLM: `AGRIPLAN_LLM_*` > `[llm]`; configured only with endpoint and key
    /// - Embeddings: `AGRIPLAN_EMB_*` > `[embedding]`; same rule, except that
    ///   the endpoint `offline` selects the hashing embedder without a key
    /// - Rules: `AGRIPLAN_RULES_PATH` > `rules.path` > built-in table
    pub fn resolve_from(
        cli_db_url: Option<&str>,
        file: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let db_url = cli_db_url
            .map(str::to_owned)
            .or_else(|| env(DbConfig::ENV_VAR))
            .or_else(|| file.and_then(|f| f.database.url.clone()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());

        let llm = resolve_provider(
            file.map(|f| &f.llm),
            env("AGRIPLAN_LLM_ENDPOINT"),
            env("AGRIPLAN_LLM_API_KEY"),
            env("AGRIPLAN_LLM_MODEL"),
            DEFAULT_LLM_MODEL,
        );
        let emb_endpoint = env("AGRIPLAN_EMB_ENDPOINT")
            .or_else(|| file.and_then(|f| f.embedding.endpoint.clone()));
        let embedding = if emb_endpoint
            .as_deref()
            .is_some_and(|e| e.trim().eq_ignore_ascii_case(OFFLINE_EMBEDDING_ENDPOINT))
        {
            Some(EmbeddingConfig::Offline)
        } else {
            resolve_provider(
                file.map(|f| &f.embedding),
                emb_endpoint,
                env("AGRIPLAN_EMB_API_KEY"),
                env("AGRIPLAN_EMB_MODEL"),
                DEFAULT_EMBEDDING_MODEL,
            )
            .map(EmbeddingConfig::Http)
        };

        let rules_path = env("AGRIPLAN_RULES_PATH")
            .map(PathBuf::from)
            .or_else(|| file.and_then(|f| f.rules.path.clone()));

        let preferred_domain = file
            .and_then(|f| f.kb.preferred_domain.clone())
            .unwrap_or_else(|| DEFAULT_PREFERRED_DOMAIN.to_owned());

        Self {
            db_config: DbConfig::new(db_url),
            llm,
            embedding,
            rules_path,
            preferred_domain,
        }
    }
}

fn resolve_provider(
    section: Option<&ProviderSection>,
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    default_model: &str,
) -> Option<ProviderConfig> {
    let endpoint = endpoint.or_else(|| section.and_then(|s| s.endpoint.clone()))?;
    let api_key = api_key.or_else(|| section.and_then(|s| s.api_key.clone()))?;
    let model = model
        .or_else(|| section.and_then(|s| s.model.clone()))
        .unwrap_or_else(|| default_model.to_owned());
    Some(ProviderConfig {
        endpoint,
        api_key,
        model,
    })
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn sample_file() -> ConfigFile {
        parse_config(
            r#"
[database]
url = "postgresql://file:5432/filedb"

[llm]
endpoint = "https://llm.example"
api_key = "file-key"

[embedding]
endpoint = "https://emb.example"

[rules]
path = "/etc/agriplan/rules.toml"

[kb]
preferred_domain = "example.org"
"#,
        )
        .unwrap()
    }

    #[test]
    fn cli_flag_overrides_everything() {
        let file = sample_file();
        let env = env_from(&[("AGRIPLAN_DATABASE_URL", "postgresql://env:5432/envdb")]);
        let cfg = AgriplanConfig::resolve_from(Some("postgresql://cli:5432/clidb"), Some(&file), env);
        assert_eq!(cfg.db_config.database_url, "postgresql://cli:5432/clidb");
    }

    #[test]
    fn env_overrides_config_file() {
        let file = sample_file();
        let env = env_from(&[
            ("AGRIPLAN_DATABASE_URL", "postgresql://env:5432/envdb"),
            ("AGRIPLAN_LLM_MODEL", "env-model"),
            ("AGRIPLAN_RULES_PATH", "/tmp/rules.toml"),
        ]);
        let cfg = AgriplanConfig::resolve_from(None, Some(&file), env);
        assert_eq!(cfg.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(
            cfg.llm,
            Some(ProviderConfig {
                endpoint: "https://llm.example".to_owned(),
                api_key: "file-key".to_owned(),
                model: "env-model".to_owned(),
            })
        );
        assert_eq!(cfg.rules_path, Some(PathBuf::from("/tmp/rules.toml")));
    }

    #[test]
    fn config_file_used_when_env_is_empty() {
        let file = sample_file();
        let cfg = AgriplanConfig::resolve_from(None, Some(&file), env_from(&[]));
        assert_eq!(cfg.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(cfg.llm.unwrap().model, DEFAULT_LLM_MODEL);
        assert_eq!(cfg.preferred_domain, "example.org");
        assert_eq!(
            cfg.rules_path,
            Some(PathBuf::from("/etc/agriplan/rules.toml"))
        );
        // Endpoint without a key is not a usable provider.
        assert!(cfg.embedding.is_none());
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = AgriplanConfig::resolve_from(None, None, env_from(&[]));
        assert_eq!(cfg.db_config.database_url, DbConfig::DEFAULT_URL);
        assert!(cfg.llm.is_none());
        assert!(cfg.embedding.is_none());
        assert!(cfg.rules_path.is_none());
        assert_eq!(cfg.preferred_domain, DEFAULT_PREFERRED_DOMAIN);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let env = env_from(&[
            ("AGRIPLAN_EMB_ENDPOINT", "https://emb.example"),
            ("AGRIPLAN_EMB_API_KEY", "  "),
        ]);
        let cfg = AgriplanConfig::resolve_from(None, None, env);
        assert!(cfg.embedding.is_none());
    }

    #[test]
    fn env_alone_configures_embeddings() {
        let env = env_from(&[
            ("AGRIPLAN_EMB_ENDPOINT", "https://emb.example"),
            ("AGRIPLAN_EMB_API_KEY", "k"),
        ]);
        let cfg = AgriplanConfig::resolve_from(None, None, env);
        match cfg.embedding {
            Some(EmbeddingConfig::Http(p)) => assert_eq!(p.model, DEFAULT_EMBEDDING_MODEL),
            other => panic!("expected http embeddings, got {other:?}"),
        }
    }

    #[test]
    fn offline_endpoint_selects_hashing_embedder_without_key() {
        let cfg = AgriplanConfig::resolve_from(
            None,
            None,
            env_from(&[("AGRIPLAN_EMB_ENDPOINT", "offline")]),
        );
        assert_eq!(cfg.embedding, Some(EmbeddingConfig::Offline));

        let file = parse_config("[embedding]\nendpoint = \"Offline\"\n").unwrap();
        let cfg = AgriplanConfig::resolve_from(None, Some(&file), env_from(&[]));
        assert_eq!(cfg.embedding, Some(EmbeddingConfig::Offline));

        // Env endpoint wins over the file's offline setting.
        let env = env_from(&[
            ("AGRIPLAN_EMB_ENDPOINT", "https://emb.example"),
            ("AGRIPLAN_EMB_API_KEY", "k"),
        ]);
        let cfg = AgriplanConfig::resolve_from(None, Some(&file), env);
        assert!(matches!(cfg.embedding, Some(EmbeddingConfig::Http(_))));
    }

    #[test]
    fn minimal_file_parses_and_round_trips() {
        let file = parse_config("[database]\nurl = \"postgresql://h/db\"\n").unwrap();
        assert!(file.llm.endpoint.is_none());

        let written = toml::to_string_pretty(&file).unwrap();
        assert!(!written.contains("[llm]"));
        let reparsed = parse_config(&written).unwrap();
        assert_eq!(reparsed.database.url.as_deref(), Some("postgresql://h/db"));
    }

    #[test]
    fn save_config_writes_owner_only_file() {
        let _lock = crate::test_util::lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = save_config(&sample_file()).and_then(|()| load_config());
        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let loaded = result.unwrap();
        assert_eq!(loaded.llm.api_key.as_deref(), Some("file-key"));
        assert!(path.starts_with(tmp.path()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let _lock = crate::test_util::lock_env();
        let path = config_path();
        assert!(
            path.ends_with("agriplan/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
