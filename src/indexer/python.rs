use tree_sitter::{Language, Node, Parser, Tree};

use super::ParserError;

/// Bare-name call sites only; `obj.method()` and `mod.func()` are not captured.
pub const CALL_QUERY: &str = r#"
(call
  function: (identifier) @call)
"#;

pub const IMPORT_QUERY: &str = r#"
(import_statement) @import
(import_from_statement) @import
"#;

/// Constructs counted toward a unit's branch count. `elif` counts as its own
/// branch, matching how a nested `if` would be counted.
pub const BRANCH_QUERY: &str = r#"
[
  (if_statement)
  (elif_clause)
  (for_statement)
  (while_statement)
  (try_statement)
] @branch
"#;

pub fn language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

/// A parser already bound to the Python grammar.
pub fn parser() -> Result<Parser, ParserError> {
    let mut parser = Parser::new();
    parser.set_language(&language())?;
    Ok(parser)
}

/// Statements the grammar still accepts from Python 2.
const LEGACY_STATEMENTS: [&str; 2] = ["print_statement", "exec_statement"];

/// Parse `source`, returning `None` when the text is not valid Python 3.
///
/// tree-sitter always recovers a tree; any `ERROR` or `MISSING` node anywhere
/// in it is treated as a syntax failure, and so is a Python 2 `print` or
/// `exec` statement.
pub fn parse_strict(parser: &mut Parser, source: &str) -> Option<Tree> {
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    if root.has_error() || contains_legacy_statement(root) {
        None
    } else {
        Some(tree)
    }
}

fn contains_legacy_statement(root: Node) -> bool {
    let mut cursor = root.walk();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if LEGACY_STATEMENTS.contains(&node.kind()) {
            return true;
        }
        stack.extend(node.named_children(&mut cursor));
    }
    false
}
