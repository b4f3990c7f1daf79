//! Dependency extraction by textual pattern matching
//!
//! Only literal `require("name")` and `require('name')` calls are recognised.
//! Requires built from concatenation or variables, and the parenthesis-less
//! `require "name"` form, are not seen.

use once_cell::sync::Lazy;
use regex::Regex;

static REQUIRE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"require\s*\(\s*["']([^"']+)["']\s*\)"#).expect("require pattern is valid")
});

/// Module names referenced by `source`, in text order, duplicates included
pub fn extract_requires(source: &str) -> Vec<String> {
    REQUIRE_PATTERN
        .captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
        .collect()
}
