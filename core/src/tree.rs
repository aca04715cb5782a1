//! Syntax tree provider.
//!
//! Parses one source file into an arena of typed nodes with stable 1-based
//! line/column positions. Nodes are addressed by index into the per-file
//! arena; children are index lists and the parent is an optional index, so
//! upward navigation works without ownership cycles. Parsing is stateless:
//! every call builds a fresh tree and two parses of the same text yield
//! structurally identical arenas.

use std::path::Path;

use thiserror::Error;
use tree_sitter::Parser;

/// Index of a node within its tree's arena.
pub type NodeId = u32;

/// Source language, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    TypeScript,
    Tsx,
    Python,
    Rust,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }
}

/// Normalized node tag shared by every analyzer.
/// Constructs the grammars disagree on are folded into one tag each;
/// anything an analyzer has no use for becomes `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Function,
    Method,
    Constructor,
    Accessor,
    Lambda,
    Class,
    Parameter,
    If,
    For,
    While,
    DoWhile,
    SwitchCase,
    Catch,
    Ternary,
    LogicalAnd,
    LogicalOr,
    Call,
    StringLiteral,
    RegexLiteral,
    Comment,
    Other,
}

impl NodeKind {
    /// Function/method/constructor/accessor/lambda bodies all carry their
    /// own complexity scope.
    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            NodeKind::Function
                | NodeKind::Method
                | NodeKind::Constructor
                | NodeKind::Accessor
                | NodeKind::Lambda
        )
    }

    /// Branching constructs counted by cyclomatic/cognitive complexity.
    pub fn is_branching(self) -> bool {
        matches!(
            self,
            NodeKind::If
                | NodeKind::For
                | NodeKind::While
                | NodeKind::DoWhile
                | NodeKind::SwitchCase
                | NodeKind::Catch
                | NodeKind::Ternary
        )
    }

    pub fn is_logical_op(self) -> bool {
        matches!(self, NodeKind::LogicalAnd | NodeKind::LogicalOr)
    }
}

/// One node of a parsed file.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Raw grammar kind, kept for predicates that need more detail than the
    /// normalized tag.
    pub raw_kind: &'static str,
    pub start_byte: usize,
    pub end_byte: usize,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// Arena-backed syntax tree for a single file. Never mutated after
/// construction; each analysis pass builds its own.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub language: Language,
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Preorder traversal over the whole arena.
    pub fn iter(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.nodes.iter()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &SyntaxNode> {
        self.nodes[id as usize]
            .children
            .iter()
            .map(move |&c| &self.nodes[c as usize])
    }

    pub fn parent(&self, id: NodeId) -> Option<&SyntaxNode> {
        self.nodes[id as usize].parent.map(|p| &self.nodes[p as usize])
    }

    /// Source text covered by a node.
    pub fn text<'a>(&self, id: NodeId, source: &'a str) -> &'a str {
        let node = self.node(id);
        source.get(node.start_byte..node.end_byte).unwrap_or("")
    }

    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    /// Count of nodes that open a function-like scope.
    pub fn function_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind.is_function_like()).count()
    }

    pub fn class_count(&self) -> usize {
        self.count_kind(NodeKind::Class)
    }
}

/// Why a file could not be parsed. Returned as a value; the analysis engine
/// converts it into a single Critical `parser-error` issue at line 1.
#[derive(Debug, Clone, Error)]
pub enum ParseFailure {
    #[error("unsupported language for `{0}`")]
    UnsupportedLanguage(String),
    #[error("parser initialization failed for `{0}`")]
    ParserInit(String),
    #[error("source failed to parse: {0}")]
    Malformed(String),
}

/// Parse one file's text into a syntax tree. Stateless and repeatable.
pub fn parse(path: &Path, text: &str) -> Result<SyntaxTree, ParseFailure> {
    let language = Language::from_path(path)
        .ok_or_else(|| ParseFailure::UnsupportedLanguage(path.display().to_string()))?;

    let mut parser = Parser::new();
    parser
        .set_language(&language.grammar())
        .map_err(|_| ParseFailure::ParserInit(path.display().to_string()))?;

    let ts_tree = parser
        .parse(text, None)
        .ok_or_else(|| ParseFailure::Malformed("tree-sitter returned no tree".into()))?;

    let root = ts_tree.root_node();
    if root.has_error() {
        let (errors, named) = count_error_nodes(root);
        // A stray ERROR node is tolerated; a tree that is mostly errors is a
        // parse failure.
        if root.is_error() || (named > 0 && errors * 4 > named) {
            return Err(ParseFailure::Malformed(format!(
                "{} syntax error node(s) in {} named nodes",
                errors, named
            )));
        }
    }

    let mut nodes = Vec::new();
    build_arena(root, text, None, &mut nodes);
    Ok(SyntaxTree { language, nodes })
}

fn count_error_nodes(root: tree_sitter::Node) -> (usize, usize) {
    let mut errors = 0usize;
    let mut named = 0usize;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_named() {
            named += 1;
            if node.is_error() || node.is_missing() {
                errors += 1;
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    (errors, named)
}

fn build_arena(
    ts_node: tree_sitter::Node,
    source: &str,
    parent: Option<NodeId>,
    nodes: &mut Vec<SyntaxNode>,
) -> NodeId {
    let id = nodes.len() as NodeId;
    nodes.push(SyntaxNode {
        id,
        kind: classify(&ts_node, source),
        raw_kind: ts_node.kind(),
        start_byte: ts_node.start_byte(),
        end_byte: ts_node.end_byte(),
        line: ts_node.start_position().row + 1,
        column: ts_node.start_position().column + 1,
        end_line: ts_node.end_position().row + 1,
        children: Vec::new(),
        parent,
    });

    let mut cursor = ts_node.walk();
    let mut child_ids = Vec::new();
    for child in ts_node.children(&mut cursor) {
        child_ids.push(build_arena(child, source, Some(id), nodes));
    }
    nodes[id as usize].children = child_ids;
    id
}

fn classify(node: &tree_sitter::Node, source: &str) -> NodeKind {
    match node.kind() {
        // Function-likes
        "function_declaration" | "function_expression" | "function" | "function_item"
        | "generator_function" | "generator_function_declaration" => NodeKind::Function,
        "function_definition" => {
            let name = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source.as_bytes()).ok())
                .unwrap_or("");
            if name == "__init__" {
                NodeKind::Constructor
            } else {
                NodeKind::Function
            }
        }
        "arrow_function" | "lambda" | "closure_expression" => NodeKind::Lambda,
        "method_definition" => classify_method(node, source),

        // Type containers
        "class_declaration" | "class" | "class_definition" | "struct_item" | "enum_item"
        | "trait_item" => NodeKind::Class,

        // Parameters
        "identifier" | "required_parameter" | "optional_parameter" | "default_parameter"
        | "typed_parameter" | "typed_default_parameter" | "parameter" | "self_parameter"
        | "rest_pattern" => {
            if parent_is_parameter_list(node) {
                NodeKind::Parameter
            } else {
                NodeKind::Other
            }
        }

        // Branching constructs
        "if_statement" | "if_expression" | "if_let_expression" | "elif_clause" => NodeKind::If,
        "for_statement" | "for_in_statement" | "for_of_statement" | "for_expression" => {
            NodeKind::For
        }
        "while_statement" | "while_expression" | "while_let_expression" | "loop_expression" => {
            NodeKind::While
        }
        "do_statement" => NodeKind::DoWhile,
        "switch_case" | "switch_default" | "case_clause" | "match_arm" => NodeKind::SwitchCase,
        "catch_clause" | "except_clause" => NodeKind::Catch,
        "ternary_expression" | "conditional_expression" => NodeKind::Ternary,

        // Short-circuit operators
        "binary_expression" | "boolean_operator" => classify_binary(node, source),

        "call_expression" | "new_expression" | "call" | "macro_invocation" => NodeKind::Call,

        "string" | "template_string" | "string_literal" | "raw_string_literal"
        | "string_fragment" => NodeKind::StringLiteral,
        "regex" => NodeKind::RegexLiteral,
        "comment" | "line_comment" | "block_comment" => NodeKind::Comment,

        _ => NodeKind::Other,
    }
}

fn parent_is_parameter_list(node: &tree_sitter::Node) -> bool {
    node.parent().map_or(false, |p| {
        matches!(
            p.kind(),
            "formal_parameters" | "parameters" | "lambda_parameters" | "closure_parameters"
        )
    })
}

fn classify_method(node: &tree_sitter::Node, source: &str) -> NodeKind {
    let name = node
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .unwrap_or("");
    if name == "constructor" {
        return NodeKind::Constructor;
    }
    // `get foo()` / `set foo()` carry a bare get/set keyword child.
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(child.kind(), "get" | "set") {
            return NodeKind::Accessor;
        }
    }
    NodeKind::Method
}

fn classify_binary(node: &tree_sitter::Node, source: &str) -> NodeKind {
    let op = node
        .child_by_field_name("operator")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .unwrap_or("");
    match op {
        "&&" | "and" => NodeKind::LogicalAnd,
        "||" | "or" => NodeKind::LogicalOr,
        _ => NodeKind::Other,
    }
}

/// Extract the name of a function-like node, used for issue messages.
pub fn function_name(tree: &SyntaxTree, id: NodeId, source: &str) -> String {
    let node = tree.node(id);
    for child in tree.children(id) {
        if child.raw_kind == "identifier"
            || child.raw_kind == "property_identifier"
            || child.raw_kind == "field_identifier"
        {
            let text = tree.text(child.id, source);
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }
    format!("anonymous_{}", node.line)
}
