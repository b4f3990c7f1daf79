//! Bundle emission
//!
//! Every non-entry module is wrapped in an immediately invoked function bound to
//! a local derived from its dotted name. The entry module follows unwrapped so it
//! runs at top level exactly as it would unbundled.

use std::path::{Component, Path, PathBuf};

use cow_utils::CowUtils;
use log::{debug, warn};
use rustc_hash::FxHashSet;

use crate::{module_graph::ResolvedGraph, resolver::INDEX_FILE_NAME};

const GENERATOR_NAME: &str = "luabundle";
const LUA_SUFFIX: &str = ".lua";

/// Lua 5.4 reserved words, never usable as a local name
const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// A fully emitted bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub text: String,
    /// Number of modules in the resolved set, entry included
    pub module_count: usize,
    pub entry: PathBuf,
}

/// Serialize a resolved graph into one script.
///
/// Output depends only on module contents and the graph's visit order.
pub fn emit(graph: &ResolvedGraph) -> Bundle {
    let entry_name = graph
        .entry
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut text = String::new();
    text.push_str(&format!("-- Bundled Lua generated by {GENERATOR_NAME}\n"));
    text.push_str(&format!("-- Entry point: {entry_name}\n\n"));

    let mut identifiers = FxHashSet::default();
    for module in graph.dependencies() {
        let display_name = module_display_name(&module.path, &graph.search_roots);
        let identifier = module_identifier(&display_name);
        debug!("Wrapping {} as {identifier}", module.path.display());
        if !identifiers.insert(identifier.clone()) {
            warn!(
                "Module {} shares the bundle local '{identifier}' with an earlier module",
                module.path.display()
            );
        }

        text.push_str(&format!("-- Module: {display_name}\n"));
        text.push_str(&format!("local {identifier} = (function()\n"));
        text.push_str(&module.content);
        text.push_str("\nend)()\n\n");
    }

    if let Some(entry) = graph.entry_module() {
        text.push_str("-- Entry point\n");
        text.push_str(&entry.content);
    }

    Bundle {
        text,
        module_count: graph.module_count(),
        entry: graph.entry.clone(),
    }
}

/// Dotted module name for `path`, relative to the innermost root containing it.
///
/// `lib/util.lua` becomes `lib.util` and `lib/net/init.lua` becomes `lib.net`.
pub fn module_display_name(path: &Path, roots: &[PathBuf]) -> String {
    let relative = roots
        .iter()
        .filter_map(|root| path.strip_prefix(root).ok())
        .min_by_key(|relative| relative.components().count())
        .unwrap_or(path);

    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let Some(last) = parts.pop() else {
        return String::new();
    };
    let is_index = last == INDEX_FILE_NAME;
    let stem = match last.strip_suffix(LUA_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_owned(),
        _ => last,
    };

    // A root-level init.lua has no parent to collapse into
    if !is_index || parts.is_empty() {
        parts.push(stem);
    }
    parts.join(".")
}

/// Lua identifier for a display name: dots and other invalid characters become
/// `_`, and reserved words get a trailing `_`
pub fn module_identifier(display_name: &str) -> String {
    let joined = display_name.cow_replace('.', "_");
    let mut identifier: String = joined
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if identifier.is_empty() || identifier.starts_with(|c: char| c.is_ascii_digit()) {
        identifier.insert(0, '_');
    }
    if LUA_KEYWORDS.contains(&identifier.as_str()) {
        identifier.push('_');
    }
    identifier
}

#[cfg(test)]
mod tests {
    use indexmap::{IndexMap, IndexSet};
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::module_graph::LuaModule;

    fn module(path: &str, content: &str) -> (PathBuf, LuaModule) {
        let path = PathBuf::from(path);
        (
            path.clone(),
            LuaModule {
                path,
                content: content.to_owned(),
                requires: Vec::new(),
            },
        )
    }

    fn graph(modules: Vec<(PathBuf, LuaModule)>) -> ResolvedGraph {
        ResolvedGraph {
            project_dir: PathBuf::from("/project"),
            search_roots: vec![PathBuf::from("/project")],
            entry: PathBuf::from("/project/Main.lua"),
            modules: modules.into_iter().collect::<IndexMap<_, _>>(),
            external: IndexSet::new(),
        }
    }

    #[test]
    fn test_display_names() {
        let roots = vec![PathBuf::from("/project"), PathBuf::from("/vendor")];
        let name = |p: &str| module_display_name(Path::new(p), &roots);

        assert_eq!(name("/project/lib/a.lua"), "lib.a");
        assert_eq!(name("/project/lib/net/init.lua"), "lib.net");
        assert_eq!(name("/project/init.lua"), "init");
        assert_eq!(name("/project/util.lua"), "util");
        assert_eq!(name("/vendor/json.lua"), "json");
        assert_eq!(
            module_display_name(
                Path::new("/project/vendor/json.lua"),
                &[PathBuf::from("/project"), PathBuf::from("/project/vendor")]
            ),
            "json"
        );
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(module_identifier("lib.a"), "lib_a");
        assert_eq!(module_identifier("lib.my-mod"), "lib_my_mod");
        assert_eq!(module_identifier("3d.math"), "_3d_math");
        assert_eq!(module_identifier(""), "_");
        assert_eq!(module_identifier("end"), "end_");
        assert_eq!(module_identifier("goto"), "goto_");
        assert_eq!(module_identifier("lib.end"), "lib_end");
    }

    #[test]
    fn test_keyword_module_gets_valid_local() {
        let graph = graph(vec![
            module("/project/Main.lua", "require('end')"),
            module("/project/end.lua", "return 1"),
        ]);

        let text = emit(&graph).text;
        assert!(text.contains("-- Module: end\nlocal end_ = (function()\n"));
        assert!(!text.contains("local end ="));
    }

    #[test]
    fn test_emit_wraps_dependencies_and_leaves_entry_bare() {
        let graph = graph(vec![
            module("/project/Main.lua", "local a = require(\"lib.a\")\nprint(a.x)"),
            module("/project/lib/a.lua", "return { x = 1 }"),
            module("/project/lib/b/init.lua", "return {}"),
        ]);

        let bundle = emit(&graph);

        assert_eq!(bundle.module_count, 3);
        assert_snapshot!(bundle.text, @r#"
        -- Bundled Lua generated by luabundle
        -- Entry point: Main.lua

        -- Module: lib.a
        local lib_a = (function()
        return { x = 1 }
        end)()

        -- Module: lib.b
        local lib_b = (function()
        return {}
        end)()

        -- Entry point
        local a = require("lib.a")
        print(a.x)
        "#);
    }

    #[test]
    fn test_emit_is_deterministic() {
        let graph = graph(vec![
            module("/project/Main.lua", "require('z')\nrequire('a')"),
            module("/project/z.lua", "return 'z'"),
            module("/project/a.lua", "return 'a'"),
        ]);

        let first = emit(&graph);
        let second = emit(&graph);
        assert_eq!(first, second);

        let z = first.text.find("-- Module: z").expect("z emitted");
        let a = first.text.find("-- Module: a").expect("a emitted");
        assert!(z < a, "visit order must be kept");
    }

    #[test]
    fn test_entry_only_bundle() {
        let graph = graph(vec![module("/project/Main.lua", "print('hi')\n")]);

        let bundle = emit(&graph);
        assert_eq!(
            bundle.text,
            "-- Bundled Lua generated by luabundle\n-- Entry point: Main.lua\n\n-- Entry point\nprint('hi')\n"
        );
        assert_eq!(bundle.module_count, 1);
    }
}
