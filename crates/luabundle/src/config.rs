//! Bundler configuration
//!
//! Values come from built-in defaults, then an optional `luabundle.toml` in the
//! project directory, then command line overrides.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::Deserialize;

use crate::{
    dirs::{self, Environment},
    error::{BundleError, Result},
};

/// Name of the optional per-project configuration file
pub const CONFIG_FILE_NAME: &str = "luabundle.toml";

/// File name that turns on multi-module bundling, compared case-insensitively
pub const MAIN_FILE_NAME: &str = "main.lua";

/// Name of the emitted bundle inside the output directory
pub const BUNDLE_FILE_NAME: &str = "Main.lua";

/// Entry candidates tried in order before the case-insensitive scan
pub const ENTRY_CANDIDATES: &[&str] = &["Main.lua", "main.lua", "MAIN.LUA"];

const DEFAULT_BUNDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SYNTAX_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Extra search roots appended after the project root
    pub src: Vec<PathBuf>,
    /// Where the bundle is written, relative to the project directory
    pub output_dir: Option<PathBuf>,
    /// Where bundles and single files are deployed
    pub deploy_dir: Option<PathBuf>,
    /// Explicit path to the Lua compiler used for syntax checks
    pub luac: Option<PathBuf>,
    /// Seconds allowed for a bundle or bundle check
    pub bundle_timeout: u64,
    /// Seconds allowed for a single-file syntax check
    pub syntax_timeout: u64,
    pub skip_syntax_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            output_dir: None,
            deploy_dir: None,
            luac: None,
            bundle_timeout: DEFAULT_BUNDLE_TIMEOUT_SECS,
            syntax_timeout: DEFAULT_SYNTAX_TIMEOUT_SECS,
            skip_syntax_check: false,
        }
    }
}

impl Config {
    /// Load `luabundle.toml` from `project_dir`, or defaults when it is absent
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }

        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(&path).map_err(|source| BundleError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&text).map_err(|message| BundleError::Config { path, message })
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    pub fn bundle_timeout(&self) -> Duration {
        Duration::from_secs(self.bundle_timeout)
    }

    pub fn syntax_timeout(&self) -> Duration {
        Duration::from_secs(self.syntax_timeout)
    }

    /// Search roots for module lookup: the project root first, then `src` entries
    pub fn search_roots(&self, project_dir: &Path) -> Vec<PathBuf> {
        let mut roots = vec![project_dir.to_path_buf()];
        for dir in &self.src {
            let root = dirs::resolve_override(project_dir, dir);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        roots
    }

    pub fn resolve_output_dir(&self, project_dir: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dirs::resolve_override(project_dir, dir),
            None => project_dir.join("build"),
        }
    }

    pub fn resolve_deploy_dir(&self, project_dir: &Path, env: &dyn Environment) -> PathBuf {
        match &self.deploy_dir {
            Some(dir) => dirs::resolve_override(project_dir, dir),
            None => dirs::default_deploy_dir(env),
        }
    }
}

/// Whether `file_name` selects multi-module bundling
pub fn is_main_file(file_name: &str) -> bool {
    file_name.eq_ignore_ascii_case(MAIN_FILE_NAME)
}
