//! Environment-derived directories
//!
//! The core never reads process environment directly. Callers pass an
//! [`Environment`] so tests can substitute a fake one.

use std::path::{Path, PathBuf};

use log::debug;

/// Subdirectory of the local application data area that holds deployed scripts
const LUA_DIR_NAME: &str = "lua";

/// Read-only view of the process environment
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;

    fn home_dir(&self) -> Option<PathBuf>;

    /// Directory of the running executable, used to find bundled tooling
    fn exe_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.is_empty())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        etcetera::home_dir().ok()
    }

    fn exe_dir(&self) -> Option<PathBuf> {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
    }
}

/// Default deploy directory: `%LOCALAPPDATA%/lua`, falling back to
/// `~/.local/share/lua` where that variable does not exist.
pub fn default_deploy_dir(env: &dyn Environment) -> PathBuf {
    if let Some(local_app_data) = env.var("LOCALAPPDATA") {
        return PathBuf::from(local_app_data).join(LUA_DIR_NAME);
    }

    let home = env.home_dir().unwrap_or_else(|| {
        debug!("No home directory available, deploying relative to the working directory");
        PathBuf::from(".")
    });
    home.join(".local").join("share").join(LUA_DIR_NAME)
}

/// Resolve an optional override against `base`; absolute overrides are used as-is
pub fn resolve_override(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::path::PathBuf;

    use rustc_hash::FxHashMap;

    use super::Environment;

    /// In-memory environment for deterministic tests
    #[derive(Debug, Default, Clone)]
    pub(crate) struct FakeEnvironment {
        pub(crate) vars: FxHashMap<String, String>,
        pub(crate) home: Option<PathBuf>,
    }

    impl FakeEnvironment {
        pub(crate) fn with_var(mut self, key: &str, value: &str) -> Self {
            self.vars.insert(key.to_owned(), value.to_owned());
            self
        }

        pub(crate) fn with_home(mut self, home: PathBuf) -> Self {
            self.home = Some(home);
            self
        }
    }

    impl Environment for FakeEnvironment {
        fn var(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }

        fn home_dir(&self) -> Option<PathBuf> {
            self.home.clone()
        }
    }
}
