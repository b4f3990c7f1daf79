//! Require graph resolution
//!
//! A depth-first walk from the entry module that reads every reachable module
//! once, keyed by canonical path, and fails on cycles or unresolved requires.
//! The resolved set keeps first-visit order, which is the emission order.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, trace, warn};
use rustc_hash::FxHashSet;

use crate::{
    deadline::Deadline,
    error::{BundleError, Result},
    requires::extract_requires,
    resolver::{ModuleResolver, canonicalize_path, find_module_in_roots},
};

/// A Lua source file reached during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaModule {
    /// Canonical absolute path, the module's identity
    pub path: PathBuf,
    pub content: String,
    /// Raw require names in text order
    pub requires: Vec<String>,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    pub project_dir: PathBuf,
    /// Canonical search roots, project directory first
    pub search_roots: Vec<PathBuf>,
    pub entry: PathBuf,
    /// Modules in first-visit order, entry included
    pub modules: IndexMap<PathBuf, LuaModule>,
    /// Require names satisfied by files already present in the deploy directory
    pub external: IndexSet<String>,
}

impl ResolvedGraph {
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn entry_module(&self) -> Option<&LuaModule> {
        self.modules.get(&self.entry)
    }

    /// Non-entry modules in emission order
    pub fn dependencies(&self) -> impl Iterator<Item = &LuaModule> {
        self.modules
            .values()
            .filter(move |module| module.path != self.entry)
    }
}

/// Per-operation state for one resolution. Never shared between operations.
#[derive(Debug)]
pub struct ResolutionContext {
    project_dir: PathBuf,
    resolver: ModuleResolver,
    /// Checked for already-deployed modules when a require is not found locally
    deploy_dir: PathBuf,
    deadline: Deadline,
    modules: IndexMap<PathBuf, LuaModule>,
    external: IndexSet<String>,
    visited: FxHashSet<PathBuf>,
    /// Paths whose subtree is being visited, outermost first
    on_stack: IndexSet<PathBuf>,
}

impl ResolutionContext {
    pub fn new(
        project_dir: PathBuf,
        search_roots: Vec<PathBuf>,
        deploy_dir: PathBuf,
        deadline: Deadline,
    ) -> Self {
        Self {
            project_dir,
            resolver: ModuleResolver::new(search_roots),
            deploy_dir,
            deadline,
            modules: IndexMap::new(),
            external: IndexSet::new(),
            visited: FxHashSet::default(),
            on_stack: IndexSet::new(),
        }
    }

    /// Resolve everything reachable from `entry` and hand back the ordered graph
    pub fn resolve(mut self, entry: &Path) -> Result<ResolvedGraph> {
        self.deadline.check()?;
        let entry = canonicalize_path(entry.to_path_buf());
        debug!("Resolving require graph from {}", entry.display());

        self.visit(&entry)?;

        info!(
            "Resolved {} module(s), {} external",
            self.modules.len(),
            self.external.len()
        );
        Ok(ResolvedGraph {
            project_dir: canonicalize_path(self.project_dir),
            search_roots: self
                .resolver
                .search_roots()
                .iter()
                .map(|root| canonicalize_path(root.clone()))
                .collect(),
            entry,
            modules: self.modules,
            external: self.external,
        })
    }

    fn visit(&mut self, path: &Path) -> Result<()> {
        if self.on_stack.contains(path) {
            let chain: Vec<String> = self
                .on_stack
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            debug!("Require chain: {} -> {}", chain.join(" -> "), path.display());
            return Err(BundleError::Cycle {
                path: path.to_path_buf(),
            });
        }

        if self.visited.contains(path) {
            trace!("Already resolved {}", path.display());
            return Ok(());
        }

        self.on_stack.insert(path.to_path_buf());
        let result = self.visit_module(path);

        // Stack membership ends with the subtree, whether or not it succeeded
        self.on_stack.shift_remove(path);
        self.visited.insert(path.to_path_buf());
        result
    }

    fn visit_module(&mut self, path: &Path) -> Result<()> {
        let content = read_module(path)?;
        let requires = extract_requires(&content);
        trace!("{} requires {:?}", path.display(), requires);

        self.modules.insert(
            path.to_path_buf(),
            LuaModule {
                path: path.to_path_buf(),
                content,
                requires: requires.clone(),
            },
        );

        for name in &requires {
            self.deadline.check()?;

            let Some(dep_path) = self.resolver.resolve_module_path(name) else {
                if self.is_deployed_module(name) {
                    debug!("Treating require('{name}') as a global module from the deploy directory");
                    self.external.insert(name.clone());
                    continue;
                }
                return Err(BundleError::Unresolved {
                    reference: name.clone(),
                    requester: path.to_path_buf(),
                });
            };

            self.visit(&dep_path)?;
        }

        Ok(())
    }

    fn is_deployed_module(&self, name: &str) -> bool {
        find_module_in_roots(name, std::slice::from_ref(&self.deploy_dir)).is_some()
    }
}

fn read_module(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| BundleError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8(bytes).unwrap_or_else(|e| {
        warn!("{} is not valid UTF-8, replacing invalid bytes", path.display());
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    struct Project {
        temp_dir: TempDir,
    }

    impl Project {
        fn new() -> Result<Self> {
            Ok(Self {
                temp_dir: TempDir::new()?,
            })
        }

        fn root(&self) -> PathBuf {
            self.temp_dir.path().join("project")
        }

        fn deploy_dir(&self) -> PathBuf {
            self.temp_dir.path().join("deploy")
        }

        fn file(&self, relative: &str, content: &str) -> Result<PathBuf> {
            write_file(&self.root().join(relative), content)
        }

        fn context(&self, limit: Duration) -> ResolutionContext {
            ResolutionContext::new(
                self.root(),
                vec![self.root()],
                self.deploy_dir(),
                Deadline::after("Bundle operation", limit),
            )
        }

        fn resolve(&self, entry: &Path) -> crate::error::Result<ResolvedGraph> {
            self.context(Duration::from_secs(30)).resolve(entry)
        }

        fn canonical(&self, relative: &str) -> PathBuf {
            self.root()
                .join(relative)
                .canonicalize()
                .expect("fixture file should exist")
        }
    }

    fn write_file(path: &Path, content: &str) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(path.to_path_buf())
    }

    #[test]
    fn test_diamond_resolves_shared_module_once() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('b')\nrequire('c')\n")?;
        project.file("b.lua", "require('d')\n")?;
        project.file("c.lua", "require('d')\n")?;
        project.file("d.lua", "return {}\n")?;

        let graph = project.resolve(&entry)?;

        let order: Vec<PathBuf> = graph.modules.keys().cloned().collect();
        assert_eq!(
            order,
            vec![
                project.canonical("Main.lua"),
                project.canonical("b.lua"),
                project.canonical("d.lua"),
                project.canonical("c.lua"),
            ]
        );
        assert_eq!(graph.module_count(), 4);
        Ok(())
    }

    #[test]
    fn test_two_module_cycle() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("a.lua", "require('b')\n")?;
        project.file("b.lua", "require('a')\n")?;

        let err = project.resolve(&entry).expect_err("cycle must fail");
        match err {
            BundleError::Cycle { path } => assert_eq!(path, project.canonical("a.lua")),
            other => panic!("expected cycle error, got {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_self_require_is_a_cycle() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('Main')\n")?;

        let err = project.resolve(&entry).expect_err("self require must fail");
        assert!(matches!(err, BundleError::Cycle { .. }));
        Ok(())
    }

    #[test]
    fn test_unresolved_names_reference_and_requester() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('lib.a')\n")?;
        project.file("lib/a.lua", "require('lib.missing')\n")?;

        let err = project.resolve(&entry).expect_err("missing module must fail");
        match err {
            BundleError::Unresolved {
                reference,
                requester,
            } => {
                assert_eq!(reference, "lib.missing");
                assert_eq!(requester, project.canonical("lib/a.lua"));
            }
            other => panic!("expected unresolved error, got {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_deployed_module_is_external() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('shared.utils')\nrequire('lib.a')\n")?;
        project.file("lib/a.lua", "return {}\n")?;
        write_file(&project.deploy_dir().join("shared/utils.lua"), "return {}\n")?;

        let graph = project.resolve(&entry)?;

        assert_eq!(graph.module_count(), 2);
        assert!(graph.external.contains("shared.utils"));
        assert!(
            graph
                .modules
                .keys()
                .all(|path| !path.starts_with(project.deploy_dir()))
        );
        Ok(())
    }

    #[test]
    fn test_deployed_directory_module_is_external() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('globals')\n")?;
        write_file(&project.deploy_dir().join("globals/init.lua"), "return {}\n")?;

        let graph = project.resolve(&entry)?;
        assert_eq!(graph.module_count(), 1);
        assert_eq!(graph.external.len(), 1);
        Ok(())
    }

    #[test]
    fn test_entry_emitted_last_even_when_required_back() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('lib.a')\nrequire('lib.b')\n")?;
        project.file("lib/a.lua", "return 1\n")?;
        project.file("lib/b.lua", "require('lib.a')\nreturn 2\n")?;

        let graph = project.resolve(&entry)?;

        let deps: Vec<PathBuf> = graph.dependencies().map(|m| m.path.clone()).collect();
        assert_eq!(
            deps,
            vec![project.canonical("lib/a.lua"), project.canonical("lib/b.lua")]
        );
        assert_eq!(graph.entry_module().map(|m| m.requires.len()), Some(2));
        Ok(())
    }

    #[test]
    fn test_missing_entry_is_read_error() -> Result<()> {
        let project = Project::new()?;
        fs::create_dir_all(project.root())?;

        let err = project
            .resolve(&project.root().join("Main.lua"))
            .expect_err("missing entry must fail");
        assert!(matches!(err, BundleError::Read { .. }));
        Ok(())
    }

    #[test]
    fn test_expired_deadline_is_timeout() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('lib.a')\n")?;
        project.file("lib/a.lua", "return {}\n")?;

        let err = project
            .context(Duration::ZERO)
            .resolve(&entry)
            .expect_err("deadline must expire");
        assert!(err.is_timeout());
        Ok(())
    }

    #[test]
    fn test_deadline_checked_between_dependencies() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('lib.a')\n")?;
        project.file("lib/a.lua", "return {}\n")?;

        // Visiting directly skips the up-front check in `resolve`
        let mut context = project.context(Duration::ZERO);
        let entry = canonicalize_path(entry);
        let err = context.visit(&entry).expect_err("deadline must expire");

        assert!(err.is_timeout());
        assert_eq!(context.modules.keys().cloned().collect::<Vec<_>>(), vec![entry]);
        assert!(context.on_stack.is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_subtree_leaves_stack_empty() -> Result<()> {
        let project = Project::new()?;
        let entry = project.file("Main.lua", "require('bad')\n")?;
        project.file("bad.lua", "require('nowhere')\n")?;

        let mut context = project.context(Duration::from_secs(30));
        let entry = canonicalize_path(entry);
        assert!(context.visit(&entry).is_err());
        assert!(context.on_stack.is_empty());
        assert!(context.visited.contains(&entry));
        assert!(context.visited.contains(&project.canonical("bad.lua")));
        Ok(())
    }
}
