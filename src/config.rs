// Settings - JSON config file + environment overrides
//
// Lookup order (later wins):
//   1. built-in defaults
//   2. JSON file (`--config PATH` or `CRM_CONFIG`), any subset of fields
//   3. CRM_* environment variables

use crate::error::{CrmError, CrmResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the REST backend
    pub api_url: String,

    /// SQLite file used by offline mode, `import` and the dev server
    pub database_path: PathBuf,

    /// ViaCEP-compatible lookup service; `{cep}/json/` is appended
    pub cep_lookup_url: String,

    /// Whether list pages start with inactive records visible
    pub show_inactive: bool,

    /// tracing filter directive, e.g. "info" or "crm_admin=debug"
    pub log_level: String,

    /// Write logs here instead of stderr (the TUI needs this to log at all)
    pub log_file: Option<PathBuf>,

    pub server_addr: String,

    pub request_timeout_secs: u64,

    /// Use the local SQLite store instead of the REST backend
    pub offline: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: "http://localhost:3001/".to_string(),
            database_path: PathBuf::from("crm.db"),
            cep_lookup_url: "https://viacep.com.br/ws/".to_string(),
            show_inactive: false,
            log_level: "info".to_string(),
            log_file: None,
            server_addr: "0.0.0.0:3001".to_string(),
            request_timeout_secs: 10,
            offline: false,
        }
    }
}

impl Settings {
    /// Defaults, then `path` (or `CRM_CONFIG`) if given, then process environment
    pub fn load(path: Option<&Path>) -> CrmResult<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let from_env = env.get("CRM_CONFIG").map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(from_env);

        let mut settings = match path {
            Some(p) => Self::from_file(&p)?,
            None => Settings::default(),
        };
        settings.apply_env(&env)?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> CrmResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CrmError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| CrmError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> CrmResult<()> {
        if let Some(v) = env.get("CRM_API_URL") {
            self.api_url = v.clone();
        }
        if let Some(v) = env.get("CRM_DATABASE") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = env.get("CRM_CEP_URL") {
            self.cep_lookup_url = v.clone();
        }
        if let Some(v) = env.get("CRM_LOG") {
            self.log_level = v.clone();
        }
        if let Some(v) = env.get("CRM_LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env.get("CRM_SERVER_ADDR") {
            self.server_addr = v.clone();
        }
        if let Some(v) = env.get("CRM_TIMEOUT_SECS") {
            self.request_timeout_secs = v
                .parse()
                .map_err(|_| CrmError::Config(format!("CRM_TIMEOUT_SECS is not a number: {}", v)))?;
        }
        if let Some(v) = env.get("CRM_OFFLINE") {
            self.offline = parse_flag(v)
                .ok_or_else(|| CrmError::Config(format!("CRM_OFFLINE must be true/false: {}", v)))?;
        }
        if let Some(v) = env.get("CRM_SHOW_INACTIVE") {
            self.show_inactive = parse_flag(v).ok_or_else(|| {
                CrmError::Config(format!("CRM_SHOW_INACTIVE must be true/false: {}", v))
            })?;
        }
        Ok(())
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
