//! Bundle, deploy and validate pipelines
//!
//! Ties the entry-file conventions to the resolver, emitter and writer. Output
//! is written only once resolution has fully succeeded.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use indexmap::IndexSet;
use log::{debug, info};

use crate::{
    code_generator,
    config::{self, Config, ENTRY_CANDIDATES},
    deadline::Deadline,
    deploy,
    dirs::Environment,
    error::{BundleError, Result},
    module_graph::{ResolutionContext, ResolvedGraph},
    resolver::canonicalize_path,
    syntax::{self, SyntaxChecker},
};

/// Parameters of one bundle invocation
#[derive(Debug, Clone, Default)]
pub struct BundleRequest {
    pub project_dir: PathBuf,
    /// Entry file name inside the project; discovered when absent
    pub entry_file: Option<String>,
    /// Overrides the configured output directory
    pub output_dir: Option<PathBuf>,
    /// Overrides the configured deploy directory
    pub deploy_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleReport {
    Bundled {
        bundle_path: PathBuf,
        deploy_path: PathBuf,
        module_count: usize,
        external: IndexSet<String>,
    },
    SingleFile {
        deploy_path: PathBuf,
    },
}

impl fmt::Display for BundleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled {
                bundle_path,
                deploy_path,
                module_count,
                external,
            } => {
                write!(
                    f,
                    "Bundle created: {}\nDeployed to: {}\nModules bundled: {}",
                    bundle_path.display(),
                    deploy_path.display(),
                    module_count
                )?;
                if !external.is_empty() {
                    let names: Vec<&str> = external.iter().map(String::as_str).collect();
                    write!(f, "\nGlobal modules (already deployed): {}", names.join(", "))?;
                }
                Ok(())
            }
            Self::SingleFile { deploy_path } => {
                write!(f, "Single file deployed to: {}", deploy_path.display())
            }
        }
    }
}

/// Result of a dry-run check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReport {
    /// Require graph is acyclic and fully resolvable
    Bundle { module_count: usize },
    /// Non-main entry; only its syntax was checked
    SingleFile,
    /// Syntax checks are turned off, so nothing was checked
    SyntaxSkipped,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundle { module_count } => write!(
                f,
                "✓ Bundle structure is valid and can be bundled successfully ({module_count} modules)"
            ),
            Self::SingleFile => write!(f, "✓ Lua syntax is valid"),
            Self::SyntaxSkipped => {
                write!(f, "Lua syntax check skipped (syntax checks are disabled)")
            }
        }
    }
}

pub struct BundleOrchestrator<'a> {
    config: Config,
    env: &'a dyn Environment,
    /// `None` skips every syntax check
    checker: Option<&'a dyn SyntaxChecker>,
}

impl fmt::Debug for BundleOrchestrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleOrchestrator")
            .field("config", &self.config)
            .field("syntax_checks", &self.checker.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> BundleOrchestrator<'a> {
    pub fn new(
        config: Config,
        env: &'a dyn Environment,
        checker: Option<&'a dyn SyntaxChecker>,
    ) -> Self {
        Self {
            config,
            env,
            checker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bundle and deploy a project, or deploy a lone file when the entry is not
    /// the main file.
    pub fn bundle(&self, request: &BundleRequest) -> Result<BundleReport> {
        let deadline = Deadline::after("Bundle operation", self.config.bundle_timeout());
        let project_dir = canonicalize_path(request.project_dir.clone());

        let entry_file = match &request.entry_file {
            Some(name) => name.clone(),
            None => find_entry_file(&project_dir)?,
        };
        let entry_path = existing_entry(&project_dir, &entry_file)?;

        let settings = Config {
            output_dir: request
                .output_dir
                .clone()
                .or_else(|| self.config.output_dir.clone()),
            deploy_dir: request
                .deploy_dir
                .clone()
                .or_else(|| self.config.deploy_dir.clone()),
            ..self.config.clone()
        };
        let deploy_dir = settings.resolve_deploy_dir(&project_dir, self.env);

        if !config::is_main_file(&entry_file) {
            info!("{entry_file} is not a main file, deploying it on its own");
            self.check_file(&entry_path, &deadline)?;
            let deploy_path = deploy::deploy(&entry_path, &deploy_dir)?;
            return Ok(BundleReport::SingleFile { deploy_path });
        }

        let graph =
            self.resolve_project(&settings, &project_dir, &entry_path, &deploy_dir, &deadline)?;
        let bundle = code_generator::emit(&graph);

        let output_dir = settings.resolve_output_dir(&project_dir);
        let bundle_path = deploy::write_bundle(&output_dir, &bundle.text)?;
        let deploy_path = deploy::deploy(&bundle_path, &deploy_dir)?;
        info!(
            "Bundled {} module(s) into {}",
            bundle.module_count,
            bundle_path.display()
        );

        Ok(BundleReport::Bundled {
            bundle_path,
            deploy_path,
            module_count: bundle.module_count,
            external: graph.external,
        })
    }

    /// Dry run: everything `bundle` checks, without emitting or writing
    pub fn validate(&self, file_path: &Path) -> Result<ValidationReport> {
        let deadline = Deadline::after("Bundle check", self.config.bundle_timeout());
        let file_path = canonicalize_path(file_path.to_path_buf());
        let (project_dir, entry_file) = split_entry(&file_path)?;
        let entry_path = existing_entry(&project_dir, &entry_file)?;

        if !config::is_main_file(&entry_file) {
            return self.check_file(&entry_path, &deadline);
        }

        let deploy_dir = self.config.resolve_deploy_dir(&project_dir, self.env);
        let graph =
            self.resolve_project(&self.config, &project_dir, &entry_path, &deploy_dir, &deadline)?;
        Ok(ValidationReport::Bundle {
            module_count: graph.module_count(),
        })
    }

    /// Syntax-only check of one file
    pub fn check_syntax(&self, file_path: &Path) -> Result<ValidationReport> {
        let deadline = Deadline::after("Syntax check", self.config.syntax_timeout());
        if !file_path.is_file() {
            return Err(BundleError::EntryNotFound {
                path: file_path.to_path_buf(),
            });
        }
        self.check_file(file_path, &deadline)
    }

    fn resolve_project(
        &self,
        settings: &Config,
        project_dir: &Path,
        entry_path: &Path,
        deploy_dir: &Path,
        deadline: &Deadline,
    ) -> Result<ResolvedGraph> {
        if let Some(checker) = self.checker {
            let checked = syntax::check_project(project_dir, checker, deadline)?;
            debug!("{checked} file(s) passed the syntax check");
        }

        ResolutionContext::new(
            project_dir.to_path_buf(),
            settings.search_roots(project_dir),
            deploy_dir.to_path_buf(),
            *deadline,
        )
        .resolve(entry_path)
    }

    fn check_file(&self, path: &Path, deadline: &Deadline) -> Result<ValidationReport> {
        match self.checker {
            Some(checker) => {
                checker.check(path, deadline)?;
                Ok(ValidationReport::SingleFile)
            }
            None => {
                debug!("Syntax checks disabled, not checking {}", path.display());
                Ok(ValidationReport::SyntaxSkipped)
            }
        }
    }
}

/// Pick the entry file of `project_dir`: the fixed candidates first, then any
/// file whose name matches the main file name in another casing.
pub fn find_entry_file(project_dir: &Path) -> Result<String> {
    for candidate in ENTRY_CANDIDATES {
        if project_dir.join(candidate).is_file() {
            return Ok((*candidate).to_owned());
        }
    }

    let mut matches: Vec<String> = fs::read_dir(project_dir)
        .map_err(|source| BundleError::Read {
            path: project_dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| config::is_main_file(name))
        .collect();
    matches.sort();

    matches.into_iter().next().ok_or_else(|| BundleError::NoEntryFile {
        dir: project_dir.to_path_buf(),
    })
}

fn existing_entry(project_dir: &Path, entry_file: &str) -> Result<PathBuf> {
    let entry_path = project_dir.join(entry_file);
    if !entry_path.is_file() {
        return Err(BundleError::EntryNotFound { path: entry_path });
    }
    Ok(entry_path)
}

fn split_entry(file_path: &Path) -> Result<(PathBuf, String)> {
    let not_found = || BundleError::EntryNotFound {
        path: file_path.to_path_buf(),
    };
    let project_dir = file_path.parent().ok_or_else(not_found)?.to_path_buf();
    let entry_file = file_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(not_found)?
        .to_owned();
    Ok((project_dir, entry_file))
}
