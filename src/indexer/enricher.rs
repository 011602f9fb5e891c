use super::ParserError;
use super::python;
use super::segmenter::{StructuralUnit, UnitKind};
use tracing::debug;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator};

/// A structural unit plus facts derived by re-parsing its own text.
///
/// Each derived field is `None` when the unit was not analyzed (raw text) or
/// its text did not parse on its own; `Some` (possibly empty) otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedUnit {
    pub unit: StructuralUnit,
    /// Imported names; from-imports are qualified as `module.name`.
    pub imports: Option<Vec<String>>,
    /// Callee names of bare-name calls, in source order, duplicates kept.
    pub called_symbols: Option<Vec<String>>,
    /// if/elif/for/while/try constructs anywhere in the unit.
    pub branch_count: Option<usize>,
}

impl EnrichedUnit {
    /// The unit with no derived facts.
    pub fn bare(unit: StructuralUnit) -> Self {
        Self {
            unit,
            imports: None,
            called_symbols: None,
            branch_count: None,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.branch_count.is_some()
    }
}

pub struct MetadataEnricher {
    call_query: Query,
    import_query: Query,
    branch_query: Query,
}

impl MetadataEnricher {
    pub fn new() -> Result<Self, ParserError> {
        let language = python::language();
        Ok(Self {
            call_query: Query::new(&language, python::CALL_QUERY)?,
            import_query: Query::new(&language, python::IMPORT_QUERY)?,
            branch_query: Query::new(&language, python::BRANCH_QUERY)?,
        })
    }

    pub fn enrich_all(&self, units: Vec<StructuralUnit>) -> Vec<EnrichedUnit> {
        units.into_iter().map(|u| self.enrich(u)).collect()
    }

    /// Derive imports, bare-name calls, and branch count for a class or
    /// function. Raw text passes through untouched; a unit whose text does not
    /// parse in isolation comes back with no derived facts.
    pub fn enrich(&self, unit: StructuralUnit) -> EnrichedUnit {
        if unit.kind == UnitKind::RawText {
            return EnrichedUnit::bare(unit);
        }

        let mut parser = match python::parser() {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping enrichment for {}: {e}", unit.file_path);
                return EnrichedUnit::bare(unit);
            }
        };
        let Some(tree) = python::parse_strict(&mut parser, &unit.source_text) else {
            debug!(
                "Unit {} in {} does not parse in isolation, leaving it unenriched",
                unit.name.as_deref().unwrap_or("?"),
                unit.file_path
            );
            return EnrichedUnit::bare(unit);
        };

        let root = tree.root_node();
        let source = unit.source_text.as_bytes();
        let imports = self.imports(root, source);
        let called_symbols = self.calls(root, source);
        let branch_count = self.count_branches(root, source);

        EnrichedUnit {
            unit,
            imports: Some(imports),
            called_symbols: Some(called_symbols),
            branch_count: Some(branch_count),
        }
    }

    fn imports(&self, root: Node, source: &[u8]) -> Vec<String> {
        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.import_query, root, source);
        while let Some(m) = matches.next() {
            for cap in m.captures {
                let node = cap.node;
                match node.kind() {
                    "import_statement" => {
                        imports.extend(imported_names(node, source));
                    }
                    "import_from_statement" => {
                        let module = node
                            .child_by_field_name("module_name")
                            .and_then(|m| module_name(m, source));
                        let mut names = imported_names(node, source);
                        let mut walker = node.walk();
                        if node
                            .named_children(&mut walker)
                            .any(|c| c.kind() == "wildcard_import")
                        {
                            names.push("*".to_string());
                        }
                        imports.extend(names.into_iter().map(|name| match &module {
                            Some(module) => format!("{module}.{name}"),
                            None => name,
                        }));
                    }
                    _ => {}
                }
            }
        }
        imports
    }

    fn calls(&self, root: Node, source: &[u8]) -> Vec<String> {
        let mut calls = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.call_query, root, source);
        while let Some(m) = matches.next() {
            for cap in m.captures {
                if let Ok(name) = cap.node.utf8_text(source) {
                    calls.push(name.to_string());
                }
            }
        }
        calls
    }

    fn count_branches(&self, root: Node, source: &[u8]) -> usize {
        let mut count = 0;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.branch_query, root, source);
        while let Some(m) = matches.next() {
            count += m.captures.len();
        }
        count
    }
}

/// Names bound by an import, without aliases.
fn imported_names(stmt: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = stmt.walk();
    for item in stmt.children_by_field_name("name", &mut cursor) {
        let dotted = if item.kind() == "aliased_import" {
            item.child_by_field_name("name")
        } else {
            Some(item)
        };
        if let Some(text) = dotted.and_then(|n| n.utf8_text(source).ok()) {
            names.push(text.to_string());
        }
    }
    names
}

/// Module of a from-import with relative dots stripped; `None` for a bare
/// `from . import x`.
fn module_name(node: Node, source: &[u8]) -> Option<String> {
    let text = node.utf8_text(source).ok()?;
    let module = text.trim_start_matches('.').trim();
    if module.is_empty() {
        None
    } else {
        Some(module.to_string())
    }
}
