use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::AnalyzerOutput;
use super::traits::{AnalysisContext, Analyzer};

/// Files are parsed in batches of this size; the tree-sitter parsers live for
/// one batch and are dropped at its end.
const PARSE_BATCH_SIZE: usize = 30;

/// Per-file symbol sets plus the resolved import graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolData {
    pub files: BTreeMap<String, FileSymbols>,
    /// Resolved repo-relative import edges (from → to).
    pub import_edges: Vec<ImportEdge>,
    /// Extension of the most common parsed language, e.g. `rs`.
    pub primary_language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSymbols {
    pub language: String,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    /// Raw import specifiers as written in the source.
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportEdge {
    pub from: String,
    pub to: String,
}

impl SymbolData {
    /// Import-graph indegree per path, for the file scorer.
    ///
    /// Files are held in a vector-backed graph and edges reference node
    /// indices, so the cyclic import graph carries no ownership cycles.
    pub fn indegree(&self) -> BTreeMap<String, u32> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for edge in &self.import_edges {
            let from = *nodes
                .entry(&edge.from)
                .or_insert_with(|| graph.add_node(&edge.from));
            let to = *nodes
                .entry(&edge.to)
                .or_insert_with(|| graph.add_node(&edge.to));
            graph.update_edge(from, to, ());
        }
        nodes
            .into_iter()
            .map(|(path, idx)| {
                let count = graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count();
                (path.to_string(), u32::try_from(count).unwrap_or(u32::MAX))
            })
            .collect()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.import_edges
            .iter()
            .any(|e| e.from == from && e.to == to)
    }
}

#[derive(Debug, Default)]
pub struct SymbolAnalyzer;

#[async_trait::async_trait]
impl Analyzer for SymbolAnalyzer {
    fn name(&self) -> &'static str {
        "symbols"
    }

    #[instrument(skip_all, name = "symbol_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        let mut data = SymbolData::default();
        let parseable: Vec<&crate::types::FileEntry> = ctx
            .content_files()
            .filter(|f| LanguageSpec::for_extension(&f.extension).is_some())
            .collect();

        for batch in parseable.chunks(PARSE_BATCH_SIZE) {
            // One parser set per batch; dropped (released) at batch end on
            // every exit path.
            let mut parsers = ParserSet::default();
            for file in batch {
                let spec = LanguageSpec::for_extension(&file.extension)
                    .expect("filtered to parseable files");
                let Ok(source) = std::fs::read_to_string(&file.abs_path) else {
                    continue;
                };
                match parsers.parse(spec, &source) {
                    Ok(tree) => {
                        let symbols = extract_symbols(spec, &tree, &source);
                        data.files.insert(file.path.clone(), symbols);
                    }
                    Err(message) => {
                        warn!(path = %file.path, %message, "Parse failed, file skipped");
                    }
                }
            }
        }

        data.primary_language = {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for symbols in data.files.values() {
                *counts.entry(symbols.language.as_str()).or_insert(0) += 1;
            }
            counts
                .into_iter()
                .max_by_key(|&(lang, count)| (count, std::cmp::Reverse(lang)))
                .map(|(lang, _)| lang.to_string())
        };

        data.import_edges = resolve_imports(&data.files, &ctx.files);
        debug!(
            files = data.files.len(),
            edges = data.import_edges.len(),
            "Symbol extraction complete"
        );
        Ok(AnalyzerOutput::Symbols(data))
    }
}

// ── Language registry ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct LanguageSpec {
    id: &'static str,
    function_kinds: &'static [&'static str],
    class_kinds: &'static [&'static str],
    import_kinds: &'static [&'static str],
}

const RUST: LanguageSpec = LanguageSpec {
    id: "rust",
    function_kinds: &["function_item"],
    class_kinds: &["struct_item", "enum_item", "trait_item"],
    import_kinds: &["use_declaration", "mod_item"],
};

const PYTHON: LanguageSpec = LanguageSpec {
    id: "python",
    function_kinds: &["function_definition"],
    class_kinds: &["class_definition"],
    import_kinds: &["import_statement", "import_from_statement"],
};

const TYPESCRIPT: LanguageSpec = LanguageSpec {
    id: "typescript",
    function_kinds: &["function_declaration"],
    class_kinds: &["class_declaration", "interface_declaration"],
    import_kinds: &["import_statement"],
};

const JAVASCRIPT: LanguageSpec = LanguageSpec {
    id: "javascript",
    function_kinds: &["function_declaration"],
    class_kinds: &["class_declaration"],
    import_kinds: &["import_statement"],
};

const GO: LanguageSpec = LanguageSpec {
    id: "go",
    function_kinds: &["function_declaration", "method_declaration"],
    class_kinds: &["type_declaration"],
    import_kinds: &["import_declaration"],
};

impl LanguageSpec {
    fn for_extension(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(RUST),
            "py" => Some(PYTHON),
            "ts" | "tsx" => Some(TYPESCRIPT),
            "js" | "jsx" | "mjs" | "cjs" => Some(JAVASCRIPT),
            "go" => Some(GO),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self.id {
            "rust" => tree_sitter_rust::LANGUAGE.into(),
            "python" => tree_sitter_python::LANGUAGE.into(),
            "typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            "javascript" => tree_sitter_javascript::LANGUAGE.into(),
            _ => tree_sitter_go::LANGUAGE.into(),
        }
    }
}

/// Lazily-initialized parsers, one per language, scoped to a single batch.
#[derive(Default)]
struct ParserSet {
    parsers: HashMap<&'static str, tree_sitter::Parser>,
}

impl ParserSet {
    fn parse(&mut self, spec: LanguageSpec, source: &str) -> Result<tree_sitter::Tree, String> {
        if !self.parsers.contains_key(spec.id) {
            let mut parser = tree_sitter::Parser::new();
            parser
                .set_language(&spec.grammar())
                .map_err(|e| e.to_string())?;
            self.parsers.insert(spec.id, parser);
        }
        let parser = self.parsers.get_mut(spec.id).expect("inserted above");
        parser
            .parse(source, None)
            .ok_or_else(|| "parser returned no tree".to_string())
    }
}

// ── Extraction ─────────────────────────────────────────────────────

fn extract_symbols(spec: LanguageSpec, tree: &tree_sitter::Tree, source: &str) -> FileSymbols {
    let mut symbols = FileSymbols {
        language: spec.id.to_string(),
        ..Default::default()
    };
    walk(spec, tree.root_node(), source, &mut symbols, false);
    symbols
}

fn walk(
    spec: LanguageSpec,
    node: tree_sitter::Node<'_>,
    source: &str,
    out: &mut FileSymbols,
    in_export: bool,
) {
    let kind = node.kind();

    if spec.function_kinds.contains(&kind) {
        if let Some(name) = node_name(node, source) {
            if in_export || is_exported(spec, node, source, &name) {
                out.exports.push(name.clone());
            }
            out.functions.push(name);
        }
    } else if spec.class_kinds.contains(&kind) {
        if let Some(name) = class_name(spec, node, source) {
            if in_export || is_exported(spec, node, source, &name) {
                out.exports.push(name.clone());
            }
            out.classes.push(name);
        }
    } else if spec.import_kinds.contains(&kind) {
        if let Some(specifier) = import_specifier(spec, node, source) {
            out.imports.push(specifier);
        }
    }

    let export_context = in_export || kind == "export_statement";
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(spec, child, source, out, export_context);
    }
}

fn node_text<'s>(node: tree_sitter::Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn node_name(node: tree_sitter::Node<'_>, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .filter(|s| !s.is_empty())
}

fn class_name(spec: LanguageSpec, node: tree_sitter::Node<'_>, source: &str) -> Option<String> {
    if spec.id == "go" {
        // type_declaration wraps type_spec(name)
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "type_spec" {
                return node_name(child, source);
            }
        }
        return None;
    }
    node_name(node, source)
}

fn is_exported(spec: LanguageSpec, node: tree_sitter::Node<'_>, source: &str, name: &str) -> bool {
    match spec.id {
        "rust" => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .any(|c| c.kind() == "visibility_modifier")
        }
        "go" => name.chars().next().is_some_and(char::is_uppercase),
        // Python has no export syntax; JS/TS exports come from the
        // export_statement context in `walk`.
        _ => {
            let _ = source;
            false
        }
    }
}

fn import_specifier(
    spec: LanguageSpec,
    node: tree_sitter::Node<'_>,
    source: &str,
) -> Option<String> {
    match spec.id {
        "rust" => {
            if node.kind() == "mod_item" {
                // Only `mod x;` declarations (no body) reference sibling files.
                let has_body = {
                    let mut cursor = node.walk();
                    node.children(&mut cursor)
                        .any(|c| c.kind() == "declaration_list")
                };
                if has_body {
                    return None;
                }
                return node_name(node, source).map(|n| format!("mod {n}"));
            }
            let text = node_text(node, source).trim_end_matches(';').trim();
            Some(text.to_string())
        }
        "python" => Some(node_text(node, source).trim().to_string()),
        _ => first_string_literal(node, source),
    }
}

fn first_string_literal(node: tree_sitter::Node<'_>, source: &str) -> Option<String> {
    if node.kind() == "string" || node.kind() == "interpreted_string_literal" {
        let text = node_text(node, source).trim_matches(['"', '\'', '`']);
        return (!text.is_empty()).then(|| text.to_string());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_string_literal(child, source) {
            return Some(found);
        }
    }
    None
}

// ── Import resolution ──────────────────────────────────────────────

/// Resolve raw specifiers to repo-relative paths, best-effort. Unresolvable
/// (external) imports are dropped; cycles in the resulting graph are allowed.
fn resolve_imports(
    files: &BTreeMap<String, FileSymbols>,
    all_files: &[crate::types::FileEntry],
) -> Vec<ImportEdge> {
    let known: HashSet<&str> = all_files.iter().map(|f| f.path.as_str()).collect();
    let mut edges = Vec::new();
    let mut seen = HashSet::new();

    for (path, symbols) in files {
        let dir = path.rsplit_once('/').map_or("", |(d, _)| d);
        for specifier in &symbols.imports {
            let Some(target) = resolve_one(&symbols.language, dir, specifier, &known) else {
                continue;
            };
            if target == *path {
                continue;
            }
            let edge = ImportEdge {
                from: path.clone(),
                to: target,
            };
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
    }
    edges
}

fn resolve_one(
    language: &str,
    dir: &str,
    specifier: &str,
    known: &HashSet<&str>,
) -> Option<String> {
    match language {
        "rust" => {
            let name = specifier.strip_prefix("mod ")?;
            let candidates = [
                join(dir, &format!("{name}.rs")),
                join(dir, &format!("{name}/mod.rs")),
            ];
            candidates
                .into_iter()
                .find(|c| known.contains(c.as_str()))
        }
        "python" => {
            let module = specifier
                .strip_prefix("from ")
                .or_else(|| specifier.strip_prefix("import "))?
                .split_whitespace()
                .next()?;
            let relative = module.starts_with('.');
            let module = module.trim_start_matches('.');
            let rel_path = module.replace('.', "/");
            let bases = if relative {
                vec![dir.to_string()]
            } else {
                vec![String::new(), dir.to_string()]
            };
            for base in bases {
                for candidate in [
                    join(&base, &format!("{rel_path}.py")),
                    join(&base, &format!("{rel_path}/__init__.py")),
                ] {
                    if known.contains(candidate.as_str()) {
                        return Some(candidate);
                    }
                }
            }
            None
        }
        "typescript" | "javascript" => {
            if !specifier.starts_with('.') {
                return None;
            }
            let base = normalize_dots(dir, specifier)?;
            let candidates = [
                base.clone(),
                format!("{base}.ts"),
                format!("{base}.tsx"),
                format!("{base}.js"),
                format!("{base}.jsx"),
                format!("{base}/index.ts"),
                format!("{base}/index.js"),
            ];
            candidates
                .into_iter()
                .find(|c| known.contains(c.as_str()))
        }
        _ => None,
    }
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{dir}/{rest}")
    }
}

/// Resolve `./` and `../` segments of a relative specifier against `dir`.
fn normalize_dots(dir: &str, specifier: &str) -> Option<String> {
    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };
    for segment in specifier.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
