//! Resolution of import specifiers to workspace files.
//!
//! Each language maps a module specifier to candidate file paths; the first
//! candidate present in the snapshot wins. Anything that does not resolve is
//! treated as an external dependency.

use crate::types::Language;
use std::collections::BTreeSet;
use std::path::Path;

/// Resolves import specifiers against the set of indexed paths.
pub(crate) struct ImportResolver<'a> {
    files: &'a BTreeSet<String>,
    go_module: Option<String>,
}

impl<'a> ImportResolver<'a> {
    /// Creates a resolver over `files`. `go_module` is the `module` line of the
    /// root `go.mod`, if any.
    pub(crate) fn new(files: &'a BTreeSet<String>, go_module: Option<String>) -> Self {
        Self { files, go_module }
    }

    /// Returns the indexed file `specifier` refers to, if any.
    pub(crate) fn resolve(&self, source: &str, language: Language, specifier: &str) -> Option<String> {
        let resolved = match language {
            Language::Python => self.python(source, specifier),
            Language::JavaScript | Language::TypeScript => self.typescript(source, specifier),
            Language::Rust => self.rust(source, specifier),
            Language::Go => self.go(source, specifier),
            _ => None,
        }?;
        (resolved != source).then_some(resolved)
    }

    fn first_present(&self, candidates: impl IntoIterator<Item = String>) -> Option<String> {
        candidates
            .into_iter()
            .map(|c| normalize_posix_path(&c))
            .find(|c| self.files.contains(c))
    }

    fn python(&self, source: &str, module: &str) -> Option<String> {
        if module.is_empty() {
            return None;
        }
        let base = if module.starts_with('.') {
            let levels = module.chars().take_while(|&c| c == '.').count();
            let suffix = &module[levels..];
            let mut dir = parent_dir(source);
            for _ in 0..levels.saturating_sub(1) {
                dir = parent_dir(&dir);
            }
            join(&dir, &suffix.replace('.', "/"))
        } else {
            module.replace('.', "/")
        };
        if base.is_empty() {
            return None;
        }
        self.first_present([format!("{}.py", base), format!("{}/__init__.py", base)])
    }

    fn typescript(&self, source: &str, module: &str) -> Option<String> {
        if !module.starts_with('.') {
            return None;
        }
        let base = normalize_posix_path(&join(&parent_dir(source), module));
        let mut candidates = vec![base.clone()];
        for ext in ["ts", "tsx", "js", "jsx", "mjs"] {
            candidates.push(format!("{}.{}", base, ext));
        }
        for ext in ["ts", "tsx", "js", "jsx"] {
            candidates.push(format!("{}/index.{}", base, ext));
        }
        self.first_present(candidates)
    }

    fn rust(&self, source: &str, path: &str) -> Option<String> {
        let mut segments: Vec<&str> = path.split("::").map(str::trim).collect();
        let base = match segments.first().copied()? {
            "crate" => {
                segments.remove(0);
                self.rust_crate_root(source)?
            }
            "self" => {
                segments.remove(0);
                rust_module_dir(source)
            }
            "super" => {
                let mut dir = rust_module_dir(source);
                while segments.first() == Some(&"super") {
                    segments.remove(0);
                    dir = parent_dir(&dir);
                }
                dir
            }
            _ => return None,
        };

        // Longest module prefix first: `a::b::Item` may live in a/b.rs.
        for take in (1..=segments.len()).rev() {
            let rel = segments[..take].join("/");
            let stem = join(&base, &rel);
            if let Some(found) =
                self.first_present([format!("{}.rs", stem), format!("{}/mod.rs", stem)])
            {
                return Some(found);
            }
        }
        None
    }

    /// Directory holding the `lib.rs` / `main.rs` of the crate `source` belongs to.
    fn rust_crate_root(&self, source: &str) -> Option<String> {
        let mut dir = parent_dir(source);
        loop {
            if self.files.contains(&join(&dir, "lib.rs")) || self.files.contains(&join(&dir, "main.rs")) {
                return Some(dir);
            }
            if dir.is_empty() {
                return None;
            }
            dir = parent_dir(&dir);
        }
    }

    fn go(&self, source: &str, module: &str) -> Option<String> {
        let dir = if module.starts_with('.') {
            normalize_posix_path(&join(&parent_dir(source), module))
        } else {
            let root = self.go_module.as_deref()?;
            let rel = module.strip_prefix(root)?;
            if rel.is_empty() {
                String::new()
            } else {
                rel.strip_prefix('/')?.to_string()
            }
        };
        let prefix = if dir.is_empty() { String::new() } else { format!("{}/", dir) };
        // First file of the package directory, by path order.
        self.files
            .iter()
            .find(|p| {
                p.ends_with(".go")
                    && p.starts_with(&prefix)
                    && !p[prefix.len()..].contains('/')
            })
            .cloned()
    }
}

/// Reads the module path from a root `go.mod`.
pub(crate) fn read_go_module(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("go.mod")).ok()?;
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("module "))
        .map(|m| m.trim().to_string())
}

/// Directory in which a Rust file's child modules live.
fn rust_module_dir(source: &str) -> String {
    let file = source.rsplit('/').next().unwrap_or(source);
    if matches!(file, "lib.rs" | "main.rs" | "mod.rs") {
        parent_dir(source)
    } else {
        source.trim_end_matches(".rs").to_string()
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

fn join(dir: &str, rel: &str) -> String {
    match (dir.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => dir.to_string(),
        (false, false) => format!("{}/{}", dir, rel),
    }
}

fn normalize_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }
    stack.join("/")
}
