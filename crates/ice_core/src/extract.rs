//! Symbol extraction from source text.
//!
//! Extraction is line-oriented. The content is first masked: string literals
//! and comments are blanked out (byte offsets preserved) and bracket nesting is
//! verified. Declaration patterns then run over the masked lines, so a `def`
//! inside a docstring is never mistaken for a function. Content is never
//! executed.
//!
//! Content that cannot be masked (not UTF-8, NUL bytes, unbalanced brackets)
//! produces an empty extraction tagged as degraded instead of an error, so one
//! bad file lowers index completeness without failing the build.

use crate::types::{Language, LineRange, SymbolKind, SymbolRecord};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

/// Maximum signature length kept on a symbol record.
const MAX_SIGNATURE_CHARS: usize = 200;

/// How far a multi-line statement (Rust `use`, JS `import {`) is followed.
const MAX_STATEMENT_LINES: usize = 40;

/// Result of extracting one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Symbols ordered by starting line.
    pub symbols: Vec<SymbolRecord>,
    /// Imported module specifiers as written (`os.path`, `./utils`, `crate::a::b`).
    pub imports: BTreeSet<String>,
    /// Number of lines in the content.
    pub line_count: u32,
    /// Why the content could not be parsed, if it could not.
    pub degraded: Option<String>,
}

impl Extraction {
    /// Whether the extractor gave up on this content.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    fn degraded(line_count: u32, reason: String) -> Self {
        Self {
            line_count,
            degraded: Some(reason),
            ..Default::default()
        }
    }
}

/// Extracts symbols and imports from one file's content.
///
/// `path` is only used to stamp the produced records.
///
/// # Examples
///
/// ```
/// use ice_core::{extract, Language, SymbolKind};
///
/// let src = b"import os\n\ndef greet(name):\n    \"\"\"Say hello.\"\"\"\n    print(name)\n";
/// let out = extract("hello.py", src, Language::Python);
/// assert!(!out.is_degraded());
/// assert!(out.imports.contains("os"));
/// let greet = out.symbols.iter().find(|s| s.name == "greet").unwrap();
/// assert_eq!(greet.kind, SymbolKind::Function);
/// assert_eq!(greet.doc_summary.as_deref(), Some("Say hello."));
/// ```
pub fn extract(path: &str, content: &[u8], language: Language) -> Extraction {
    let text = match std::str::from_utf8(content) {
        Ok(text) => text,
        Err(e) => {
            let lossy = String::from_utf8_lossy(content);
            debug!(path, "content is not UTF-8: {}", e);
            return Extraction::degraded(count_lines(&lossy), format!("not valid UTF-8: {}", e));
        }
    };
    let line_count = count_lines(text);

    if text.contains('\0') {
        return Extraction::degraded(line_count, "contains NUL bytes".to_string());
    }

    if !language.has_extractor() {
        return Extraction {
            line_count,
            ..Default::default()
        };
    }

    let masked = match mask_source(text, language) {
        Ok(masked) => masked,
        Err(reason) => {
            debug!(path, %reason, "masking failed, symbols dropped");
            return Extraction::degraded(line_count, reason);
        }
    };

    let raw: Vec<&str> = text.lines().collect();
    let masked_lines: Vec<&str> = masked.lines().collect();

    let mut extractor = Extractor {
        path,
        raw: &raw,
        masked: &masked_lines,
        symbols: Vec::new(),
        imports: BTreeSet::new(),
    };

    match language {
        Language::Python => extractor.python(),
        Language::Rust => extractor.rust(),
        Language::JavaScript | Language::TypeScript => extractor.javascript(),
        Language::Go => extractor.go(),
        _ => {}
    }

    Extraction {
        symbols: extractor.symbols,
        imports: extractor.imports,
        line_count,
        degraded: None,
    }
}

/// Counts lines the way editors number them (a trailing newline adds no line).
pub fn count_lines(text: &str) -> u32 {
    text.lines().count() as u32
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            CELL.get_or_init(|| Regex::new($re).expect("static pattern is valid"))
        }
    };
}

pattern!(py_def, r"^(\s*)(?:async\s+)?def\s+([A-Za-z_]\w*)");
pattern!(py_class, r"^(\s*)class\s+([A-Za-z_]\w*)");
pattern!(py_import, r"^\s*import\s+(.+)$");
pattern!(py_from, r"^\s*from\s+(\.*[\w.]*)\s+import\s+(.+)$");
pattern!(py_const, r"^([A-Z][A-Z0-9_]*)\s*(?::[^=]*)?=(?:[^=]|$)");

pattern!(
    rs_fn,
    r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern(?:\s+"[^"]*")?)\s+)*fn\s+([A-Za-z_]\w*)"#
);
pattern!(
    rs_type,
    r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|trait|union|type)\s+([A-Za-z_]\w*)"
);
pattern!(
    rs_const,
    r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+(?:mut\s+)?([A-Za-z_]\w*)\s*:"
);
pattern!(rs_use, r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+");
pattern!(rs_mod, r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_]\w*)\s*;");

pattern!(
    js_function,
    r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)"
);
pattern!(
    js_arrow,
    r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>"
);
pattern!(
    js_class,
    r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:class|interface|enum)\s+([A-Za-z_$][\w$]*)"
);
pattern!(
    ts_type,
    r"^\s*(?:export\s+)?type\s+([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*="
);
pattern!(js_const, r"^(?:export\s+)?const\s+([A-Z][A-Z0-9_]*)\s*(?::[^=]+)?=");
pattern!(js_import_kw, r"^\s*(?:import\b|export\s.*\bfrom\b)");
pattern!(js_from, r#"\bfrom\s+['"]([^'"]+)['"]"#);
pattern!(js_bare_import, r#"^\s*import\s+['"]([^'"]+)['"]"#);
pattern!(js_require, r#"require\(\s*['"]([^'"]+)['"]\s*\)"#);

pattern!(go_func, r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)");
pattern!(go_type, r"^type\s+([A-Za-z_]\w*)");
pattern!(go_const, r"^const\s+([A-Za-z_]\w*)");
pattern!(go_block_open, r"^(const|import)\s*\(");
pattern!(go_block_name, r"^\s+([A-Za-z_]\w*)");
pattern!(go_import, r#"^\s*(?:import\s+)?(?:[A-Za-z_.]\w*\s+)?"([^"]+)""#);

struct Extractor<'a> {
    path: &'a str,
    raw: &'a [&'a str],
    masked: &'a [&'a str],
    symbols: Vec<SymbolRecord>,
    imports: BTreeSet<String>,
}

impl<'a> Extractor<'a> {
    fn push(&mut self, name: &str, kind: SymbolKind, start: usize, end: usize, doc: Option<String>) {
        self.symbols.push(SymbolRecord {
            name: name.to_string(),
            kind,
            file_path: self.path.to_string(),
            line_range: LineRange::new(start as u32 + 1, end as u32 + 1),
            doc_summary: doc,
            signature: truncate_chars(self.raw[start].trim(), MAX_SIGNATURE_CHARS),
        });
    }

    fn push_import(&mut self, module: &str, line: usize) {
        let module = module.trim();
        if module.is_empty() {
            return;
        }
        self.imports.insert(module.to_string());
        self.push(module, SymbolKind::Import, line, line, None);
    }

    // ----- Python -----------------------------------------------------------

    fn python(&mut self) {
        for i in 0..self.masked.len() {
            let line = self.masked[i];

            if let Some(caps) = py_def().captures(line) {
                let end = self.indent_block_end(i);
                let doc = self
                    .python_docstring(i, end)
                    .or_else(|| self.leading_comment(i, CommentStyle::Hash));
                self.push(&caps[2], SymbolKind::Function, i, end, doc);
            } else if let Some(caps) = py_class().captures(line) {
                let end = self.indent_block_end(i);
                let doc = self
                    .python_docstring(i, end)
                    .or_else(|| self.leading_comment(i, CommentStyle::Hash));
                self.push(&caps[2], SymbolKind::Class, i, end, doc);
            } else if let Some(caps) = py_from().captures(line) {
                let module = caps[1].to_string();
                self.push_import(&module, i);
                // `from . import utils` names sibling modules, not attributes.
                if !module.is_empty() && module.chars().all(|c| c == '.') {
                    for name in split_import_names(&caps[2]) {
                        self.imports.insert(format!("{}{}", module, name));
                    }
                }
            } else if let Some(caps) = py_import().captures(line) {
                for name in split_import_names(&caps[1]) {
                    self.push_import(&name, i);
                }
            } else if let Some(caps) = py_const().captures(line) {
                let doc = self.leading_comment(i, CommentStyle::Hash);
                self.push(&caps[1], SymbolKind::Constant, i, i, doc);
            }
        }
    }

    /// Last line of an indentation block opened at `start`.
    fn indent_block_end(&self, start: usize) -> usize {
        let base = indent_of(self.masked[start]);
        let mut end = start;
        let mut header_open = !self.masked[start].trim_end().ends_with(':');
        for (j, line) in self.masked.iter().enumerate().skip(start + 1) {
            if line.trim().is_empty() {
                continue;
            }
            if header_open {
                // Multi-line signature: continuation lines belong to the header.
                end = j;
                header_open = !line.trim_end().ends_with(':');
                continue;
            }
            if indent_of(line) <= base {
                break;
            }
            end = j;
        }
        end
    }

    fn python_docstring(&self, start: usize, end: usize) -> Option<String> {
        let header_end = (start..=end).find(|&j| self.masked[j].trim_end().ends_with(':'))?;
        let body = (header_end + 1..=end).find(|&j| !self.raw[j].trim().is_empty())?;
        let first = self.raw[body].trim();
        let opener = ["\"\"\"", "'''", "r\"\"\"", "\"", "'"]
            .iter()
            .find(|q| first.starts_with(**q))?;
        let rest = first[opener.len()..]
            .trim_end_matches("\"\"\"")
            .trim_end_matches("'''")
            .trim_end_matches(['"', '\''])
            .trim();
        if !rest.is_empty() {
            return Some(rest.to_string());
        }
        self.raw
            .get(body + 1..=end)?
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .map(|l| l.trim_end_matches("\"\"\"").trim_end_matches("'''").trim().to_string())
            .filter(|l| !l.is_empty())
    }

    // ----- Rust -------------------------------------------------------------

    fn rust(&mut self) {
        let mut i = 0;
        while i < self.masked.len() {
            let line = self.masked[i];

            if let Some(caps) = rs_fn().captures(line) {
                let end = self.brace_block_end(i);
                let doc = self.leading_comment(i, CommentStyle::TripleSlash);
                self.push(&caps[1], SymbolKind::Function, i, end, doc);
            } else if let Some(caps) = rs_type().captures(line) {
                let end = self.brace_block_end(i);
                let doc = self.leading_comment(i, CommentStyle::TripleSlash);
                self.push(&caps[1], SymbolKind::Class, i, end, doc);
            } else if let Some(caps) = rs_const().captures(line) {
                let end = self.brace_block_end(i);
                let doc = self.leading_comment(i, CommentStyle::TripleSlash);
                self.push(&caps[1], SymbolKind::Constant, i, end, doc);
            } else if let Some(caps) = rs_mod().captures(line) {
                let module = format!("self::{}", &caps[1]);
                self.push_import(&module, i);
            } else if rs_use().is_match(line) {
                let (statement, last) = self.statement_until(i, ';');
                let body = rs_use()
                    .replace(&statement, "")
                    .trim_end_matches(';')
                    .to_string();
                let module = rust_use_module(&body);
                self.imports.insert(module.clone());
                self.push(&module, SymbolKind::Import, i, last, None);
                i = last;
            }
            i += 1;
        }
    }

    // ----- JavaScript / TypeScript -----------------------------------------

    fn javascript(&mut self) {
        let mut i = 0;
        while i < self.masked.len() {
            let line = self.masked[i];

            if let Some(caps) = js_function().captures(line) {
                let end = self.brace_block_end(i);
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Function, i, end, doc);
            } else if let Some(caps) = js_arrow().captures(line) {
                let body_has_brace = line
                    .split_once("=>")
                    .map(|(_, body)| body.contains('{'))
                    .unwrap_or(false);
                let end = if body_has_brace { self.brace_block_end(i) } else { i };
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Function, i, end, doc);
            } else if let Some(caps) = js_class().captures(line) {
                let end = self.brace_block_end(i);
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Class, i, end, doc);
            } else if let Some(caps) = ts_type().captures(line) {
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Class, i, i, doc);
            } else if let Some(caps) = js_const().captures(line) {
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Constant, i, i, doc);
            } else if js_import_kw().is_match(line) {
                if let Some(caps) = js_bare_import().captures(self.raw[i]) {
                    let module = caps[1].to_string();
                    self.push_import(&module, i);
                } else {
                    let last = (i..self.raw.len().min(i + MAX_STATEMENT_LINES))
                        .find(|&j| js_from().is_match(self.raw[j]));
                    if let Some(last) = last {
                        if let Some(caps) = js_from().captures(self.raw[last]) {
                            let module = caps[1].to_string();
                            self.imports.insert(module.clone());
                            self.push(&module, SymbolKind::Import, i, last, None);
                        }
                        i = last;
                    }
                }
            } else if line.contains("require(") {
                let raw = self.raw[i];
                let modules: Vec<String> = js_require()
                    .captures_iter(raw)
                    .map(|caps| caps[1].to_string())
                    .collect();
                for module in modules {
                    self.push_import(&module, i);
                }
            }
            i += 1;
        }
    }

    // ----- Go ---------------------------------------------------------------

    fn go(&mut self) {
        let mut i = 0;
        while i < self.masked.len() {
            let line = self.masked[i];

            if let Some(caps) = go_block_open().captures(line) {
                let is_import = &caps[1] == "import";
                let mut j = i + 1;
                while j < self.masked.len() && self.masked[j].trim() != ")" {
                    if is_import {
                        if let Some(caps) = go_import().captures(self.raw[j]) {
                            let module = caps[1].to_string();
                            self.push_import(&module, j);
                        }
                    } else if let Some(caps) = go_block_name().captures(self.masked[j]) {
                        let doc = self.leading_comment(j, CommentStyle::Slash);
                        self.push(&caps[1], SymbolKind::Constant, j, j, doc);
                    }
                    j += 1;
                }
                i = j;
            } else if let Some(caps) = go_func().captures(line) {
                let end = self.brace_block_end(i);
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Function, i, end, doc);
            } else if let Some(caps) = go_type().captures(line) {
                let end = self.brace_block_end(i);
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Class, i, end, doc);
            } else if let Some(caps) = go_const().captures(line) {
                let doc = self.leading_comment(i, CommentStyle::Slash);
                self.push(&caps[1], SymbolKind::Constant, i, i, doc);
            } else if line.starts_with("import") {
                if let Some(caps) = go_import().captures(self.raw[i]) {
                    let module = caps[1].to_string();
                    self.push_import(&module, i);
                }
            }
            i += 1;
        }
    }

    // ----- shared helpers ---------------------------------------------------

    /// Last line of a brace-delimited declaration starting at `start`.
    ///
    /// A `;` at nesting depth zero before any `{` ends the declaration
    /// (prototypes, `const X: u8 = 1;`, unit structs).
    fn brace_block_end(&self, start: usize) -> usize {
        let mut braces: i64 = 0;
        let mut parens: i64 = 0;
        let mut opened = false;
        for (j, line) in self.masked.iter().enumerate().skip(start) {
            for ch in line.chars() {
                match ch {
                    '(' | '[' => parens += 1,
                    ')' | ']' => parens -= 1,
                    '{' => {
                        braces += 1;
                        opened = true;
                    }
                    '}' => {
                        braces -= 1;
                        if opened && braces <= 0 {
                            return j;
                        }
                    }
                    ';' if !opened && parens <= 0 && braces <= 0 => return j,
                    _ => {}
                }
            }
        }
        start
    }

    /// Joins masked lines from `start` until one contains `terminator`.
    fn statement_until(&self, start: usize, terminator: char) -> (String, usize) {
        let mut text = String::new();
        let limit = self.masked.len().min(start + MAX_STATEMENT_LINES);
        for j in start..limit {
            text.push_str(self.masked[j].trim());
            text.push(' ');
            if self.masked[j].contains(terminator) {
                return (text, j);
            }
        }
        (text, start)
    }

    /// First meaningful line of the comment block directly above `idx`.
    fn leading_comment(&self, idx: usize, style: CommentStyle) -> Option<String> {
        let mut collected: Vec<&str> = Vec::new();
        let mut j = idx;
        let mut in_block = false;
        while j > 0 {
            j -= 1;
            let line = self.raw[j].trim();
            if in_block {
                collected.push(line);
                if line.starts_with("/*") {
                    break;
                }
                continue;
            }
            if line.starts_with("#[") || (line.starts_with('@') && style != CommentStyle::Slash) {
                continue;
            }
            match style {
                CommentStyle::Hash if line.starts_with('#') => collected.push(line),
                CommentStyle::TripleSlash if line.starts_with("///") => collected.push(line),
                CommentStyle::Slash if line.starts_with("//") => collected.push(line),
                CommentStyle::Slash if line.ends_with("*/") && collected.is_empty() => {
                    collected.push(line);
                    if line.starts_with("/*") {
                        break;
                    }
                    in_block = true;
                }
                _ => break,
            }
        }
        collected
            .iter()
            .rev()
            .map(|l| strip_comment_markers(l))
            .find(|l| !l.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentStyle {
    Hash,
    TripleSlash,
    Slash,
}

fn strip_comment_markers(line: &str) -> &str {
    let mut s = line.trim();
    for marker in ["/**", "/*", "///", "//", "#"] {
        if let Some(rest) = s.strip_prefix(marker) {
            s = rest;
            break;
        }
    }
    s = s.trim_end_matches("*/").trim();
    s.strip_prefix('*').unwrap_or(s).trim()
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn split_import_names(list: &str) -> Vec<String> {
    list.trim()
        .trim_start_matches('(')
        .trim_end_matches(['(', ')', '\\'])
        .split(',')
        .filter_map(|part| part.split_whitespace().next())
        .filter(|name| *name != "*" && !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reduces a `use` tree to the module path it reaches into.
///
/// `crate::types::{A, B}` becomes `crate::types`; `std::io::*` becomes
/// `std::io`; `super::Foo as Bar` becomes `super::Foo`.
fn rust_use_module(body: &str) -> String {
    let compact: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let head = compact.split('{').next().unwrap_or(&compact);
    let head = head.split(" as ").next().unwrap_or(head);
    head.trim()
        .trim_end_matches('*')
        .trim_end_matches("::")
        .trim()
        .to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ----- masking ----------------------------------------------------------------

/// Blanks string contents and comments, verifying bracket balance.
///
/// Every blanked character is replaced by as many spaces as it has UTF-8
/// bytes, and line breaks are kept, so byte offsets within each line of the
/// result line up with the original.
fn mask_source(text: &str, language: Language) -> Result<String, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut stack: Vec<(char, u32)> = Vec::new();
    let mut line: u32 = 1;
    let mut i = 0;

    let hash_comments = language == Language::Python;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };

        if c == '\n' {
            line += 1;
            out.push(c);
            i += 1;
            continue;
        }

        // Comments
        if (hash_comments && c == '#') || (!hash_comments && c == '/' && next == Some('/')) {
            while i < chars.len() && chars[i] != '\n' && chars[i] != '\r' {
                blank(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }
        if !hash_comments && c == '/' && next == Some('*') {
            i = skip_block_comment(&chars, i, language == Language::Rust, &mut out, &mut line)?;
            continue;
        }

        if matches!(language, Language::JavaScript | Language::TypeScript) && c == '/' && regex_allowed(&out) {
            if let Some((close, end)) = scan_regex(&chars, i) {
                out.push('/');
                for &ch in &chars[i + 1..close] {
                    blank(&mut out, ch);
                }
                out.extend(&chars[close..end]);
                i = end;
                continue;
            }
        }

        // String and character literals
        let literal = match language {
            Language::Python => python_literal(&chars, i),
            Language::Rust => rust_literal(&chars, i, prev),
            Language::JavaScript | Language::TypeScript => match c {
                // An apostrophe glued to a word is JSX text ("Don't"), not a quote.
                '\'' if prev.is_some_and(|p| p.is_alphanumeric()) => None,
                '"' | '\'' => Some(Literal::single(c)),
                '`' => Some(Literal::multi(vec!['`'], true)),
                _ => None,
            },
            Language::Go => match c {
                '"' | '\'' => Some(Literal::single(c)),
                '`' => Some(Literal::multi(vec!['`'], false)),
                _ => None,
            },
            _ => None,
        };
        if let Some(literal) = literal {
            i = scan_literal(&chars, i, &literal, &mut out, &mut line)?;
            continue;
        }

        match c {
            '(' | '[' | '{' => stack.push((c, line)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, at)) => {
                        return Err(format!(
                            "'{}' at line {} closes '{}' opened at line {}",
                            c, line, open, at
                        ))
                    }
                    None => return Err(format!("unmatched '{}' at line {}", c, line)),
                }
            }
            _ => {}
        }
        out.push(c);
        i += 1;
    }

    if let Some((open, at)) = stack.last() {
        return Err(format!("unclosed '{}' opened at line {}", open, at));
    }
    Ok(out)
}

/// Whether a `/` after the masked text so far starts a regex literal rather
/// than a division.
fn regex_allowed(masked: &str) -> bool {
    const KEYWORDS: [&str; 13] = [
        "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw", "yield", "await",
    ];
    let before = masked.trim_end();
    let Some(last) = before.chars().last() else {
        return true;
    };
    if "(,=:[!&|?{};+-*%>~^".contains(last) {
        return true;
    }
    let ident = |ch: char| ch.is_alphanumeric() || ch == '_' || ch == '$';
    if ident(last) {
        let word_len: usize = before.chars().rev().take_while(|&ch| ident(ch)).map(char::len_utf8).sum();
        return KEYWORDS.contains(&&before[before.len() - word_len..]);
    }
    false
}

/// Index of the closing `/` and the end (past the flags) of a regex literal
/// opening at `start`, or `None` if the line ends first.
fn scan_regex(chars: &[char], start: usize) -> Option<(usize, usize)> {
    if matches!(chars.get(start + 1), Some('/') | Some('*') | None) {
        return None;
    }
    let mut in_class = false;
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\n' | '\r' => return None,
            '\\' => j += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                let close = j;
                j += 1;
                while j < chars.len() && chars[j].is_ascii_alphabetic() {
                    j += 1;
                }
                return Some((close, j));
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Delimiters and rules of one literal.
struct Literal {
    open_len: usize,
    close: Vec<char>,
    escapes: bool,
    multiline: bool,
}

impl Literal {
    fn single(quote: char) -> Self {
        Self {
            open_len: 1,
            close: vec![quote],
            escapes: true,
            multiline: false,
        }
    }

    fn multi(close: Vec<char>, escapes: bool) -> Self {
        Self {
            open_len: close.len(),
            close,
            escapes,
            multiline: true,
        }
    }
}

fn python_literal(chars: &[char], i: usize) -> Option<Literal> {
    let c = chars[i];
    if c != '"' && c != '\'' {
        return None;
    }
    if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
        return Some(Literal::multi(vec![c, c, c], true));
    }
    Some(Literal::single(c))
}

fn rust_literal(chars: &[char], i: usize, prev: Option<char>) -> Option<Literal> {
    let c = chars[i];
    let ident_before = |p: Option<char>| p.is_some_and(|p| p.is_alphanumeric() || p == '_');
    match c {
        '"' => Some(Literal {
            open_len: 1,
            close: vec!['"'],
            escapes: true,
            multiline: true,
        }),
        'r' if !ident_before(prev) || (prev == Some('b') && !ident_before(i.checked_sub(2).map(|k| chars[k]))) => {
            let hashes = chars[i + 1..].iter().take_while(|&&h| h == '#').count();
            if chars.get(i + 1 + hashes) != Some(&'"') {
                return None;
            }
            let mut close = vec!['"'];
            close.extend(std::iter::repeat('#').take(hashes));
            Some(Literal {
                open_len: 2 + hashes,
                close,
                escapes: false,
                multiline: true,
            })
        }
        '\'' => {
            // Char literal ('x', '\n') versus lifetime ('a).
            if chars.get(i + 1) == Some(&'\\') || chars.get(i + 2) == Some(&'\'') {
                Some(Literal::single('\''))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn scan_literal(
    chars: &[char],
    start: usize,
    literal: &Literal,
    out: &mut String,
    line: &mut u32,
) -> Result<usize, String> {
    let start_line = *line;
    for &ch in &chars[start..start + literal.open_len] {
        out.push(ch);
    }
    let mut j = start + literal.open_len;
    while j < chars.len() {
        if chars[j..].starts_with(&literal.close) {
            for &ch in &literal.close {
                out.push(ch);
            }
            return Ok(j + literal.close.len());
        }
        match chars[j] {
            '\\' if literal.escapes => {
                blank(out, '\\');
                if let Some(&escaped) = chars.get(j + 1) {
                    if escaped == '\n' {
                        *line += 1;
                    }
                    blank(out, escaped);
                }
                j += 2;
            }
            '\n' if !literal.multiline => return Ok(j),
            '\n' => {
                *line += 1;
                out.push('\n');
                j += 1;
            }
            ch => {
                blank(out, ch);
                j += 1;
            }
        }
    }
    if literal.multiline {
        Err(format!("unterminated string starting at line {}", start_line))
    } else {
        Ok(chars.len())
    }
}

fn skip_block_comment(
    chars: &[char],
    start: usize,
    nested: bool,
    out: &mut String,
    line: &mut u32,
) -> Result<usize, String> {
    let start_line = *line;
    let mut depth = 0usize;
    let mut j = start;
    while j < chars.len() {
        if chars[j] == '/' && chars.get(j + 1) == Some(&'*') && (depth == 0 || nested) {
            depth += 1;
            out.push_str("  ");
            j += 2;
        } else if chars[j] == '*' && chars.get(j + 1) == Some(&'/') {
            depth -= 1;
            out.push_str("  ");
            j += 2;
            if depth == 0 {
                return Ok(j);
            }
        } else {
            if chars[j] == '\n' {
                *line += 1;
            }
            blank(out, chars[j]);
            j += 1;
        }
    }
    Err(format!("unterminated block comment starting at line {}", start_line))
}

fn blank(out: &mut String, ch: char) {
    if ch == '\n' || ch == '\r' {
        out.push(ch);
    } else {
        for _ in 0..ch.len_utf8() {
            out.push(' ');
        }
    }
}
