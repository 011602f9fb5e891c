use super::ParserError;
use super::python;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Class,
    Function,
    RawText,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Class => "class",
            UnitKind::Function => "function",
            UnitKind::RawText => "raw_text",
        }
    }
}

/// One parsed construct of a source file. Lines are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralUnit {
    pub file_path: String,
    pub kind: UnitKind,
    pub name: Option<String>,
    pub source_text: String,
    pub start_line: usize,
    pub end_line: usize,
    pub docstring: String,
    /// Method names, for classes.
    pub members: Vec<String>,
    /// Bare-name base classes, for classes.
    pub bases: Vec<String>,
    /// Positional parameter names, for functions.
    pub parameters: Vec<String>,
}

impl StructuralUnit {
    /// A unit covering the whole file, used when the file does not parse.
    pub fn raw_text(file_path: &str, source: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            kind: UnitKind::RawText,
            name: None,
            source_text: source.to_string(),
            start_line: 1,
            end_line: source.lines().count().max(1),
            docstring: String::new(),
            members: Vec::new(),
            bases: Vec::new(),
            parameters: Vec::new(),
        }
    }
}

/// Where a node sits relative to the module. Only `Module` matters for
/// emission, but the enclosing kind is carried so traversal state is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Module,
    Class,
    Function,
    Block,
}

pub struct Segmenter {
    parser: Parser,
}

impl Segmenter {
    pub fn new() -> Result<Self, ParserError> {
        Ok(Self {
            parser: python::parser()?,
        })
    }

    pub fn parse_file<P: AsRef<Path>>(
        &mut self,
        filepath: P,
    ) -> Result<Vec<StructuralUnit>, ParserError> {
        let filepath = filepath.as_ref();
        let content = fs::read_to_string(filepath).map_err(|source| ParserError::Io {
            path: filepath.to_path_buf(),
            source,
        })?;
        // Consistent keys across platforms.
        let path_str = filepath.to_string_lossy().replace('\\', "/");
        Ok(self.parse(&path_str, &content))
    }

    /// Split `source` into classes (any depth) and module-level functions.
    ///
    /// Never drops a file: text that fails to parse comes back as a single
    /// [`UnitKind::RawText`] unit spanning every line.
    pub fn parse(&mut self, file_path: &str, source: &str) -> Vec<StructuralUnit> {
        let tree = match python::parse_strict(&mut self.parser, source) {
            Some(tree) => tree,
            None => {
                warn!("Syntax error in {file_path}, falling back to raw text");
                return vec![StructuralUnit::raw_text(file_path, source)];
            }
        };

        let lines: Vec<&str> = source.split('\n').collect();
        let mut collector = Collector {
            source: source.as_bytes(),
            lines: &lines,
            file_path,
            units: Vec::new(),
        };
        collector.visit(tree.root_node(), Scope::Module);

        let classes = collector
            .units
            .iter()
            .filter(|u| u.kind == UnitKind::Class)
            .count();
        debug!(
            "Extracted {} classes and {} top-level functions from {file_path}",
            classes,
            collector.units.len() - classes
        );
        collector.units
    }
}

struct Collector<'a> {
    source: &'a [u8],
    lines: &'a [&'a str],
    file_path: &'a str,
    units: Vec<StructuralUnit>,
}

impl Collector<'_> {
    fn visit(&mut self, node: Node, scope: Scope) {
        let child_scope = match node.kind() {
            "module" => Scope::Module,
            "decorated_definition" => scope,
            "class_definition" => {
                if let Some(unit) = self.class_unit(node) {
                    self.units.push(unit);
                }
                Scope::Class
            }
            "function_definition" => {
                if scope == Scope::Module {
                    if let Some(unit) = self.function_unit(node) {
                        self.units.push(unit);
                    }
                }
                Scope::Function
            }
            _ if scope == Scope::Module => Scope::Block,
            _ => scope,
        };

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, child_scope);
        }
    }

    fn class_unit(&self, node: Node) -> Option<StructuralUnit> {
        let name = self.text(node.child_by_field_name("name")?);
        let (start_line, end_line) = self.line_range(node);

        let mut members = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for stmt in body.named_children(&mut cursor) {
                if let Some(def) = unwrap_decorated(stmt) {
                    if def.kind() == "function_definition" {
                        if let Some(n) = def.child_by_field_name("name") {
                            members.push(self.text(n));
                        }
                    }
                }
            }
        }

        let mut bases = Vec::new();
        if let Some(args) = node.child_by_field_name("superclasses") {
            let mut cursor = args.walk();
            for arg in args.named_children(&mut cursor) {
                if arg.kind() == "identifier" {
                    bases.push(self.text(arg));
                }
            }
        }

        Some(StructuralUnit {
            file_path: self.file_path.to_string(),
            kind: UnitKind::Class,
            name: Some(name),
            source_text: self.slice_lines(start_line, end_line),
            start_line,
            end_line,
            docstring: self.docstring(node),
            members,
            bases,
            parameters: Vec::new(),
        })
    }

    fn function_unit(&self, node: Node) -> Option<StructuralUnit> {
        let name = self.text(node.child_by_field_name("name")?);
        let (start_line, end_line) = self.line_range(node);
        let parameters = node
            .child_by_field_name("parameters")
            .map(|p| self.parameter_names(p))
            .unwrap_or_default();

        Some(StructuralUnit {
            file_path: self.file_path.to_string(),
            kind: UnitKind::Function,
            name: Some(name),
            source_text: self.slice_lines(start_line, end_line),
            start_line,
            end_line,
            docstring: self.docstring(node),
            members: Vec::new(),
            bases: Vec::new(),
            parameters,
        })
    }

    /// Plain positional parameters: positional-only names (before `/`) and
    /// everything from `*`/`*args` onward are excluded.
    fn parameter_names(&self, params: Node) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            match param.kind() {
                "identifier" => names.push(self.text(param)),
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(n) = param.child_by_field_name("name") {
                        names.push(self.text(n));
                    }
                }
                "typed_parameter" => match param.named_child(0) {
                    Some(inner) if inner.kind() == "identifier" => names.push(self.text(inner)),
                    _ => break,
                },
                "positional_separator" => names.clear(),
                "list_splat_pattern" | "dictionary_splat_pattern" | "keyword_separator" => break,
                _ => {}
            }
        }
        names
    }

    fn docstring(&self, def: Node) -> String {
        let Some(body) = def.child_by_field_name("body") else {
            return String::new();
        };
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|n| n.kind() != "comment");
        let Some(stmt) = first else {
            return String::new();
        };
        if stmt.kind() != "expression_statement" || stmt.named_child_count() != 1 {
            return String::new();
        }
        match stmt.named_child(0) {
            Some(lit) if lit.kind() == "string" => string_literal_body(&self.text(lit))
                .map(|raw| clean_docstring(&raw))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// [`line_range`] with trailing blank lines dropped; a definition never
    /// ends on an empty line.
    fn line_range(&self, node: Node) -> (usize, usize) {
        let (start, mut end) = line_range(node);
        while end > start
            && self
                .lines
                .get(end - 1)
                .is_none_or(|l| l.trim().is_empty())
        {
            end -= 1;
        }
        (start, end)
    }

    fn slice_lines(&self, start_line: usize, end_line: usize) -> String {
        let start = start_line.saturating_sub(1).min(self.lines.len());
        let end = end_line.min(self.lines.len()).max(start);
        self.lines[start..end].join("\n")
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }
}

fn unwrap_decorated(node: Node) -> Option<Node> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition")
    } else {
        Some(node)
    }
}

/// 1-based (start, end) where end is the furthest line reached by any node
/// in the definition's subtree, or the start line if nothing reaches further.
fn line_range(node: Node) -> (usize, usize) {
    let start_row = node.start_position().row;
    let mut end_row = start_row;

    let mut cursor = node.walk();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        end_row = end_row.max(last_row(n));
        stack.extend(n.children(&mut cursor));
    }

    (start_row + 1, end_row + 1)
}

/// Row of the node's last character; a node ending exactly at column 0 of a
/// later row ends on the row before it.
fn last_row(node: Node) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

/// Strip prefix and quotes from a string literal. Byte strings and f-strings
/// are not docstrings.
fn string_literal_body(literal: &str) -> Option<String> {
    let quote_at = literal.find(['"', '\''])?;
    let prefix = &literal[..quote_at];
    if prefix.chars().any(|c| matches!(c, 'b' | 'B' | 'f' | 'F')) {
        return None;
    }
    let quoted = &literal[quote_at..];
    for delim in ["\"\"\"", "'''", "\"", "'"] {
        if quoted.len() >= 2 * delim.len() && quoted.starts_with(delim) && quoted.ends_with(delim)
        {
            return Some(quoted[delim.len()..quoted.len() - delim.len()].to_string());
        }
    }
    None
}

/// Normalize docstring indentation: the first line is left-stripped, the
/// common indentation of the remaining lines is removed, and leading/trailing
/// blank lines are dropped.
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.split('\n').collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            cleaned.push(line.trim_start().to_string());
        } else {
            let indent = line.len() - line.trim_start().len();
            let rest = line.get(indent.min(margin)..).unwrap_or(line.trim_start());
            cleaned.push(rest.trim_end().to_string());
        }
    }

    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
