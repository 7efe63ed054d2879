//! Project-wide codebase index.
//!
//! A [`CodebaseIndex`] is an immutable snapshot: building, rebuilding and
//! incremental updates all return a *new* snapshot with a higher version and
//! leave the receiver untouched. Unchanged file records are shared between
//! snapshots through `Arc`, so an update costs one map copy plus the changed
//! files.
//!
//! Search scores are fixed-point integers built from four tiers:
//!
//! | tier                          | weight     |
//! |-------------------------------|------------|
//! | exact symbol, file or path    | 1 000 000  |
//! | symbol name / path substring  | 10 000     |
//! | doc summary substring         | 100        |
//! | file content line             | 1          |
//!
//! Per-tier counts are capped at 99, so a lower tier can never outrank a higher
//! one.

use crate::config::IndexConfig;
use crate::content_hash::ContentHash;
use crate::error::{IceError, Result};
use crate::extract::extract;
use crate::imports::{read_go_module, ImportResolver};
use crate::types::{FileRecord, Language, SymbolKind, SymbolRecord};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const EXACT_WEIGHT: u32 = 1_000_000;
const NAME_WEIGHT: u32 = 10_000;
const DOC_WEIGHT: u32 = 100;
const CONTENT_WEIGHT: u32 = 1;
const TIER_CAP: u32 = 99;

/// Number of files listed in [`ProjectSummary::largest_files`].
const LARGEST_FILES: usize = 5;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matching file.
    pub file: Arc<FileRecord>,
    /// The symbol that matched best, if the match came from a symbol.
    pub symbol: Option<SymbolRecord>,
    /// Fixed-point relevance score.
    pub score: u32,
    /// Version of the snapshot the hit was read from.
    pub version: u64,
}

/// Totals and histograms for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub total_files: usize,
    pub total_lines: u64,
    pub total_symbols: u64,
    /// Number of files per language.
    pub languages: BTreeMap<Language, usize>,
    /// Largest files by line count, largest first.
    pub largest_files: Vec<(String, u32)>,
    /// Files whose symbols could not be extracted.
    pub degraded_files: usize,
    pub version: u64,
    pub built_at: i64,
}

/// A file together with its import neighbourhood.
#[derive(Debug, Clone, PartialEq)]
pub struct FileContext {
    pub file: Arc<FileRecord>,
    /// Files one import hop away (either direction), sorted.
    pub related: Vec<String>,
}

/// Immutable snapshot of the codebase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodebaseIndex {
    files: BTreeMap<String, Arc<FileRecord>>,
    /// Text of every indexable file, for content search.
    contents: BTreeMap<String, Arc<str>>,
    /// Raw import specifiers per file, re-resolved on every relink.
    imports: BTreeMap<String, BTreeSet<String>>,
    go_module: Option<String>,
    total_lines: u64,
    total_symbols: u64,
    version: u64,
    built_at: i64,
}

impl CodebaseIndex {
    /// An index with no files, at version 0.
    pub fn empty() -> Self {
        Self {
            files: BTreeMap::new(),
            contents: BTreeMap::new(),
            imports: BTreeMap::new(),
            go_module: None,
            total_lines: 0,
            total_symbols: 0,
            version: 0,
            built_at: 0,
        }
    }

    /// Walks `root` and indexes every source file, producing version 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use ice_core::{CodebaseIndex, IndexConfig};
    /// use tempfile::TempDir;
    ///
    /// let tmp = TempDir::new().unwrap();
    /// std::fs::write(tmp.path().join("gen.py"), "class CodeGenerator:\n    pass\n").unwrap();
    ///
    /// let index = CodebaseIndex::build(tmp.path(), &IndexConfig::default()).unwrap();
    /// assert_eq!(index.version(), 1);
    /// assert_eq!(index.search("CodeGenerator", 10)[0].file.path, "gen.py");
    /// ```
    pub fn build(root: &Path, config: &IndexConfig) -> Result<Self> {
        Self::empty().rebuild(root, config)
    }

    /// Re-indexes the whole tree into a new snapshot with the next version.
    pub fn rebuild(&self, root: &Path, config: &IndexConfig) -> Result<Self> {
        let paths = scan(root, config);
        let mut next = Self::empty();
        next.go_module = read_go_module(root);
        for rel in &paths {
            next.index_file(root, rel, config);
        }
        next.relink();
        next.version = self.version + 1;
        next.built_at = crate::unix_now();
        info!(
            files = next.files.len(),
            symbols = next.total_symbols,
            version = next.version,
            "index built"
        );
        Ok(next)
    }

    /// Re-extracts only `changed` paths into a new snapshot with the next version.
    ///
    /// A changed path that no longer exists (or is no longer indexable) is
    /// removed. The import graph is recomputed over the whole snapshot.
    pub fn incremental_update(
        &self,
        root: &Path,
        changed: &BTreeSet<String>,
        config: &IndexConfig,
    ) -> Result<Self> {
        let mut next = self.clone();
        if changed.iter().any(|p| p == "go.mod") {
            next.go_module = read_go_module(root);
        }
        for rel in changed {
            next.files.remove(rel);
            next.contents.remove(rel);
            next.imports.remove(rel);
            if is_indexable(root, rel, config) {
                next.index_file(root, rel, config);
            } else {
                debug!(path = %rel, "dropped from index");
            }
        }
        next.relink();
        next.version = self.version + 1;
        next.built_at = crate::unix_now();
        info!(
            changed = changed.len(),
            symbols = next.total_symbols,
            version = next.version,
            "index updated"
        );
        Ok(next)
    }

    /// Paths whose content differs between this snapshot and the tree,
    /// including files added to or removed from the tree.
    pub fn detect_changes(&self, root: &Path, config: &IndexConfig) -> BTreeSet<String> {
        let on_disk = scan(root, config);
        let mut changed = BTreeSet::new();
        for rel in &on_disk {
            let current = fs::read(root.join(rel)).map(|b| ContentHash::of(&b));
            match (current, self.files.get(rel)) {
                (Ok(hash), Some(record)) if record.content_hash == hash => {}
                _ => {
                    changed.insert(rel.clone());
                }
            }
        }
        let present: BTreeSet<&String> = on_disk.iter().collect();
        for rel in self.files.keys() {
            if !present.contains(rel) {
                changed.insert(rel.clone());
            }
        }
        // go.mod is not indexed itself, but it decides how Go imports resolve.
        if read_go_module(root) != self.go_module {
            changed.insert("go.mod".to_string());
        }
        changed
    }

    /// Returns a copy stamped with a different version (used when publishing).
    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    fn index_file(&mut self, root: &Path, rel: &str, config: &IndexConfig) {
        let Some(language) = Language::from_path(rel) else {
            return;
        };
        let bytes = match fs::read(root.join(rel)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %rel, "skipping unreadable file: {}", e);
                return;
            }
        };
        if bytes.len() as u64 > config.max_file_bytes {
            debug!(path = %rel, size = bytes.len(), "skipping large file");
            return;
        }

        let extraction = extract(rel, &bytes, language);
        if let Some(reason) = &extraction.degraded {
            let err = IceError::ParseDegraded {
                path: rel.to_string(),
                reason: reason.clone(),
            };
            warn!("{}", err);
        }
        if let Ok(text) = std::str::from_utf8(&bytes) {
            if !text.contains('\0') {
                self.contents.insert(rel.to_string(), Arc::from(text));
            }
        }

        self.imports.insert(rel.to_string(), extraction.imports);
        self.files.insert(
            rel.to_string(),
            Arc::new(FileRecord {
                path: rel.to_string(),
                language,
                line_count: extraction.line_count,
                content_hash: ContentHash::of(&bytes),
                symbols: extraction.symbols,
                imported_paths: BTreeSet::new(),
                imported_by: BTreeSet::new(),
                external_imports: BTreeSet::new(),
                parse_degraded: extraction.degraded.is_some(),
            }),
        );
    }

    /// Resolves every file's imports and rebuilds the inverse graph and totals.
    fn relink(&mut self) {
        let paths: BTreeSet<String> = self.files.keys().cloned().collect();
        let resolver = ImportResolver::new(&paths, self.go_module.clone());

        let mut resolved: BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();
        let mut inverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (path, record) in &self.files {
            let mut internal = BTreeSet::new();
            let mut external = BTreeSet::new();
            for spec in self.imports.get(path).into_iter().flatten() {
                match resolver.resolve(path, record.language, spec) {
                    Some(target) => {
                        inverse.entry(target.clone()).or_default().insert(path.clone());
                        internal.insert(target);
                    }
                    None if spec.chars().all(|c| c == '.') => {}
                    None => {
                        external.insert(spec.clone());
                    }
                }
            }
            resolved.insert(path.clone(), (internal, external));
        }

        let mut total_lines = 0u64;
        let mut total_symbols = 0u64;
        for (path, record) in self.files.iter_mut() {
            let (internal, external) = resolved.remove(path).unwrap_or_default();
            let importers = inverse.remove(path).unwrap_or_default();
            if record.imported_paths != internal
                || record.imported_by != importers
                || record.external_imports != external
            {
                let mut updated = FileRecord::clone(&**record);
                updated.imported_paths = internal;
                updated.imported_by = importers;
                updated.external_imports = external;
                *record = Arc::new(updated);
            }
            total_lines += u64::from(record.line_count);
            total_symbols += record.symbols.len() as u64;
        }
        self.total_lines = total_lines;
        self.total_symbols = total_symbols;
    }

    // ----- accessors --------------------------------------------------------

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Unix timestamp (seconds) of the build that produced this snapshot.
    pub fn built_at(&self) -> i64 {
        self.built_at
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    pub fn total_symbols(&self) -> u64 {
        self.total_symbols
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Looks a file up by workspace-relative path.
    pub fn file(&self, path: &str) -> Option<&Arc<FileRecord>> {
        self.files.get(path)
    }

    /// All file records, ordered by path.
    pub fn files(&self) -> impl Iterator<Item = &Arc<FileRecord>> {
        self.files.values()
    }

    /// `(path, content hash)` for every tracked file, ordered by path.
    pub fn tracked(&self) -> impl Iterator<Item = (&str, ContentHash)> {
        self.files.iter().map(|(p, r)| (p.as_str(), r.content_hash))
    }

    // ----- queries ----------------------------------------------------------

    /// Ranked search over symbol names, paths, doc summaries and content.
    ///
    /// Case-insensitive. Ties are broken by shorter path, then path order, so
    /// the result is deterministic for a given snapshot and query.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .files
            .values()
            .filter_map(|record| self.score_file(record, &needle))
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.file.path.len().cmp(&b.file.path.len()))
                .then_with(|| a.file.path.cmp(&b.file.path))
        });
        hits.truncate(limit);
        hits
    }

    /// Searches each term and merges the results, keeping every file's best
    /// score. Same ordering rules as [`search`](Self::search).
    pub fn search_terms<S: AsRef<str>>(&self, terms: &[S], limit: usize) -> Vec<SearchHit> {
        let mut best: BTreeMap<String, SearchHit> = BTreeMap::new();
        for term in terms {
            for hit in self.search(term.as_ref(), usize::MAX) {
                match best.get(&hit.file.path) {
                    Some(existing) if existing.score >= hit.score => {}
                    _ => {
                        best.insert(hit.file.path.clone(), hit);
                    }
                }
            }
        }
        let mut hits: Vec<SearchHit> = best.into_values().collect();
        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.file.path.len().cmp(&b.file.path.len()))
                .then_with(|| a.file.path.cmp(&b.file.path))
        });
        hits.truncate(limit);
        hits
    }

    fn score_file(&self, record: &Arc<FileRecord>, needle: &str) -> Option<SearchHit> {
        let path = record.path.to_lowercase();
        let file_name = path.rsplit('/').next().unwrap_or(&path);
        let stem = file_name.split('.').next().unwrap_or(file_name);

        let mut exact = path == needle || file_name == needle || stem == needle;
        let mut name_hits = u32::from(path.contains(needle));
        let mut doc_hits = 0u32;
        let mut best: Option<(u8, &SymbolRecord)> = None;

        for symbol in &record.symbols {
            if symbol.kind == SymbolKind::Import {
                continue;
            }
            let name = symbol.name.to_lowercase();
            let rank = if name == needle {
                exact = true;
                name_hits += 1;
                3
            } else if name.contains(needle) {
                name_hits += 1;
                2
            } else if symbol
                .doc_summary
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
            {
                doc_hits += 1;
                1
            } else {
                0
            };
            if rank > 0 && best.map_or(true, |(r, _)| rank > r) {
                best = Some((rank, symbol));
            }
        }

        let content_hits = self
            .contents
            .get(&record.path)
            .map(|text| {
                text.lines()
                    .filter(|line| line.to_lowercase().contains(needle))
                    .take(TIER_CAP as usize)
                    .count() as u32
            })
            .unwrap_or(0);

        let score = u32::from(exact) * EXACT_WEIGHT
            + name_hits.min(TIER_CAP) * NAME_WEIGHT
            + doc_hits.min(TIER_CAP) * DOC_WEIGHT
            + content_hits.min(TIER_CAP) * CONTENT_WEIGHT;

        (score > 0).then(|| SearchHit {
            file: Arc::clone(record),
            symbol: best.map(|(_, s)| s.clone()),
            score,
            version: self.version,
        })
    }

    /// Totals, language histogram and largest files.
    pub fn summary(&self) -> ProjectSummary {
        let mut languages = BTreeMap::new();
        for record in self.files.values() {
            *languages.entry(record.language).or_insert(0) += 1;
        }

        let mut by_size: Vec<(String, u32)> = self
            .files
            .values()
            .map(|r| (r.path.clone(), r.line_count))
            .collect();
        by_size.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        by_size.truncate(LARGEST_FILES);

        ProjectSummary {
            total_files: self.files.len(),
            total_lines: self.total_lines,
            total_symbols: self.total_symbols,
            languages,
            largest_files: by_size,
            degraded_files: self.files.values().filter(|r| r.parse_degraded).count(),
            version: self.version,
            built_at: self.built_at,
        }
    }

    /// Files within `depth` import hops of `path` (either direction),
    /// nearest first, then by path. `path` itself is excluded.
    pub fn related_files(&self, path: &str, depth: usize) -> Vec<String> {
        if !self.files.contains_key(path) {
            return Vec::new();
        }
        let mut seen: BTreeSet<&str> = BTreeSet::from([path]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(path, 0)]);
        let mut found: Vec<(usize, String)> = Vec::new();

        while let Some((current, distance)) = queue.pop_front() {
            if distance == depth {
                continue;
            }
            let Some(record) = self.files.get(current) else {
                continue;
            };
            for next in record.imported_paths.iter().chain(record.imported_by.iter()) {
                if seen.insert(next.as_str()) {
                    found.push((distance + 1, next.clone()));
                    queue.push_back((next.as_str(), distance + 1));
                }
            }
        }

        found.sort();
        found.into_iter().map(|(_, p)| p).collect()
    }

    /// A file record plus its direct import neighbours.
    pub fn context_for_file(&self, path: &str) -> Option<FileContext> {
        let file = Arc::clone(self.files.get(path)?);
        Some(FileContext {
            related: self.related_files(path, 1),
            file,
        })
    }

    /// Symbols named exactly `name` (case-insensitive), imports excluded,
    /// ordered by path and line.
    pub fn find_symbol(&self, name: &str) -> Vec<SymbolRecord> {
        let wanted = name.trim().to_lowercase();
        self.files
            .values()
            .flat_map(|r| r.symbols.iter())
            .filter(|s| s.kind != SymbolKind::Import && s.name.to_lowercase() == wanted)
            .cloned()
            .collect()
    }
}

/// Lists indexable files under `root` as sorted workspace-relative paths.
///
/// Honors `.gitignore` (even outside a git checkout), skips hidden entries,
/// the configured ignore directories, non-code extensions and oversized files.
pub fn scan(root: &Path, config: &IndexConfig) -> Vec<String> {
    let ignore_dirs = config.ignore_dirs.clone();
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    builder.filter_entry(move |entry| {
        let name = entry.file_name().to_string_lossy();
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        !(entry.depth() > 0 && is_dir && ignore_dirs.iter().any(|d| *d == name))
    });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("failed to read entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if Language::from_path(path).is_none() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.len() > config.max_file_bytes {
                debug!(path = %path.display(), size = meta.len(), "skipping large file");
                continue;
            }
        }
        if let Some(rel) = relative_path(root, path) {
            files.push(rel);
        }
    }
    files.sort();
    files
}

/// Whether a single workspace-relative path would be picked up by [`scan`]
/// (`.gitignore` aside).
fn is_indexable(root: &Path, rel: &str, config: &IndexConfig) -> bool {
    let relative = Path::new(rel);
    let hidden_or_ignored = relative.components().any(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || config.ignore_dirs.iter().any(|d| *d == name)
        }
        _ => true,
    });
    if hidden_or_ignored || Language::from_path(relative).is_none() {
        return false;
    }
    fs::metadata(root.join(relative))
        .map(|m| m.is_file() && m.len() <= config.max_file_bytes)
        .unwrap_or(false)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}
