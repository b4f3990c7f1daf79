use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use rustc_hash::FxHashMap;

/// Extension of Lua source files
pub const LUA_EXTENSION: &str = "lua";

/// File that makes a directory importable as a module
pub const INDEX_FILE_NAME: &str = "init.lua";

/// Module descriptor for require resolution
#[derive(Debug)]
struct RequireDescriptor {
    /// Name parts (e.g., ["lib", "util"] for "lib.util")
    name_parts: Vec<String>,
}

impl RequireDescriptor {
    /// Split a dotted name; `None` for names with empty segments like `a..b`
    fn from_module_name(name: &str) -> Option<Self> {
        let name_parts: Vec<String> = name.split('.').map(String::from).collect();
        if name_parts.iter().any(String::is_empty) {
            return None;
        }
        Some(Self { name_parts })
    }

    /// Relative path without extension, e.g. `lib/util`
    fn relative_path(&self) -> PathBuf {
        self.name_parts.iter().collect()
    }
}

/// Resolves `require` names to files under an ordered list of search roots
#[derive(Debug)]
pub struct ModuleResolver {
    search_roots: Vec<PathBuf>,
    /// Cache of resolved module paths for the current operation
    module_cache: FxHashMap<String, Option<PathBuf>>,
}

impl ModuleResolver {
    pub fn new(search_roots: Vec<PathBuf>) -> Self {
        Self {
            search_roots,
            module_cache: FxHashMap::default(),
        }
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    /// Resolve a module name to its file, trying each root in order.
    /// Within a root `<name>.lua` wins over `<name>/init.lua`.
    pub fn resolve_module_path(&mut self, module_name: &str) -> Option<PathBuf> {
        if let Some(cached_path) = self.module_cache.get(module_name) {
            return cached_path.clone();
        }

        let resolved = find_module_in_roots(module_name, &self.search_roots);
        self.module_cache
            .insert(module_name.to_owned(), resolved.clone());
        resolved
    }
}

/// Locate `module_name` in `roots` without caching
pub fn find_module_in_roots(module_name: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    let Some(descriptor) = RequireDescriptor::from_module_name(module_name) else {
        warn!("Ignoring malformed module name '{module_name}'");
        return None;
    };

    for root in roots {
        if let Some(path) = resolve_in_directory(root, &descriptor) {
            return Some(path);
        }
    }

    debug!("Module '{module_name}' not found in {} search root(s)", roots.len());
    None
}

fn resolve_in_directory(root: &Path, descriptor: &RequireDescriptor) -> Option<PathBuf> {
    let relative = descriptor.relative_path();

    let module_file = root.join(&relative).with_extension(LUA_EXTENSION);
    trace!("Trying module file {}", module_file.display());
    if module_file.is_file() {
        debug!("Found module file at: {}", module_file.display());
        return Some(canonicalize_path(module_file));
    }

    let index_file = root.join(&relative).join(INDEX_FILE_NAME);
    trace!("Trying directory module {}", index_file.display());
    if index_file.is_file() {
        debug!("Found directory module at: {}", index_file.display());
        return Some(canonicalize_path(index_file));
    }

    None
}

/// Canonicalize a path, falling back to the original on failure
pub fn canonicalize_path(path: PathBuf) -> PathBuf {
    match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) => {
            warn!("Failed to canonicalize path {}: {}", path.display(), e);
            path
        }
    }
}
