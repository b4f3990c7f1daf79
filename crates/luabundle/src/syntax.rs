//! Syntax checking through an external Lua compiler
//!
//! The bundler never parses Lua itself. A [`SyntaxChecker`] takes a file and
//! reports success or the checker's diagnostic text.

use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::Duration,
};

use log::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::{
    deadline::Deadline,
    dirs::Environment,
    error::{BundleError, Result},
    resolver::LUA_EXTENSION,
};

/// Compilers shipped next to the executable, tried before `PATH`
const BUNDLED_COMPILERS: &[&str] = &["luac54.exe", "luac5.4.exe", "luac.exe"];

/// Compiler names looked up on `PATH`, in preference order
const PATH_COMPILERS: &[&str] = &["luac5.4", "luac54", "luac5.5", "luac55", "luac"];

/// Directories never swept for syntax errors
const SKIPPED_DIRS: &[&str] = &["build", "node_modules"];

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub trait SyntaxChecker {
    /// Check one file, failing with [`BundleError::Syntax`] on invalid code
    fn check(&self, path: &Path, deadline: &Deadline) -> Result<()>;
}

/// Runs `luac -p <file>`
#[derive(Debug, Clone)]
pub struct LuacChecker {
    program: PathBuf,
}

impl LuacChecker {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Find a compiler: explicit path, then bundled tooling, then `PATH`
    pub fn discover(explicit: Option<&Path>, env: &dyn Environment) -> Result<Self> {
        if let Some(program) = explicit {
            debug!("Using configured Lua compiler {}", program.display());
            return Ok(Self::new(program.to_path_buf()));
        }

        if let Some(exe_dir) = env.exe_dir() {
            let tool_dir = exe_dir.join("automations").join("bin").join("lua");
            for name in BUNDLED_COMPILERS {
                let candidate = tool_dir.join(name);
                trace!("Trying bundled compiler {}", candidate.display());
                if candidate.is_file() {
                    debug!("Found bundled Lua compiler {}", candidate.display());
                    return Ok(Self::new(candidate));
                }
            }
        }

        for name in PATH_COMPILERS {
            if let Ok(program) = which::which(name) {
                debug!("Found Lua compiler on PATH: {}", program.display());
                return Ok(Self::new(program));
            }
        }

        Err(BundleError::CompilerNotFound)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl SyntaxChecker for LuacChecker {
    fn check(&self, path: &Path, deadline: &Deadline) -> Result<()> {
        deadline.check()?;
        trace!("{} -p {}", self.program.display(), path.display());

        let mut child = Command::new(&self.program)
            .arg("-p")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BundleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().map(drain_in_background);
        let stderr = child.stderr.take().map(drain_in_background);

        let success = wait_until(&mut child, deadline).map_err(|source| BundleError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        // Readers are left detached on timeout; a grandchild may still hold the pipes
        let Some(success) = success else {
            return Err(deadline.timeout_error());
        };

        let mut output = String::new();
        for reader in [stdout, stderr].into_iter().flatten() {
            output.push_str(&reader.join().unwrap_or_default());
        }

        if success {
            Ok(())
        } else {
            Err(BundleError::Syntax {
                path: path.to_path_buf(),
                diagnostics: output.trim_end().to_owned(),
            })
        }
    }
}

fn drain_in_background<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

/// Wait for `child`; `None` when the deadline passed and the child was killed
fn wait_until(child: &mut Child, deadline: &Deadline) -> std::io::Result<Option<bool>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status.success()));
        }
        if deadline.is_expired() {
            debug!("Syntax check exceeded its deadline, killing checker");
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
    }
}

/// Syntax-check every `.lua` file under `project_dir`, skipping build output,
/// `node_modules` and hidden directories. Stops at the first failure, naming
/// the file relative to the project.
pub fn check_project(
    project_dir: &Path,
    checker: &dyn SyntaxChecker,
    deadline: &Deadline,
) -> Result<usize> {
    let files = lua_files(project_dir);
    debug!("Syntax checking {} file(s) under {}", files.len(), project_dir.display());

    for file in &files {
        deadline.check()?;
        checker.check(file, deadline).map_err(|err| match err {
            BundleError::Syntax { diagnostics, .. } => BundleError::Syntax {
                path: file
                    .strip_prefix(project_dir)
                    .unwrap_or(file)
                    .to_path_buf(),
                diagnostics,
            },
            other => other,
        })?;
    }
    Ok(files.len())
}

/// Lua files under `project_dir` in a stable order
pub fn lua_files(project_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(project_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == LUA_EXTENSION)
        })
        .map(DirEntry::into_path)
        .collect()
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}
