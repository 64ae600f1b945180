use std::fmt;

use serde::Serialize;
use strum::Display;

/// A line/column position in the source text (both 1-indexed).
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source range of a node, used for error reporting and for deciding
/// textual order between a reference and a declaration.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, Serialize)]
pub struct CodeRange {
    pub start: CodeLoc,
    pub end: CodeLoc,
}

impl CodeRange {
    #[must_use]
    pub const fn new(start: CodeLoc, end: CodeLoc) -> Self {
        Self { start, end }
    }

    /// Returns a range spanning from the start of `self` to the end of `other`.
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }

    /// True when this range ends strictly before `other` begins.
    #[must_use]
    pub fn precedes(self, other: Self) -> bool {
        self.end <= other.start
    }
}

/// Custom Debug implementation to make dumping nodes much less verbose.
impl fmt::Debug for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Index of a node inside the [`Ast`] arena.
///
/// All cross-node references (children, resolved declarations, parent
/// methods) are arena indices rather than pointers, so attributes can be
/// keyed by `(NodeId, Attr)` and nodes stay `Copy`-cheap to pass around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("AST too large for u32 node ids"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Binary operators of the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    /// Structural shape compatibility between two class instances.
    /// Both the `ciblingsOf` and `siblingsOf` spellings parse to this.
    #[strum(serialize = "ciblingsOf")]
    Ciblings,
}

impl BinaryOp {
    /// Arithmetic operators, producing `Int` or `Float`.
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Rem)
    }

    /// Ordering comparisons over numbers, producing `Bool`.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }

    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::NotEq)
    }

    #[must_use]
    pub fn is_logic(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum UnaryOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "-")]
    Neg,
}

/// Built-in declarations seeded into the root scope before analysis.
///
/// These are synthesized as arena nodes so that references to them resolve
/// through the ordinary scope machinery and carry an ordinary `decl`
/// attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Builtin {
    #[strum(serialize = "print")]
    Print,
    Int,
    Float,
    Bool,
    String,
    Void,
    Type,
    Auto,
    #[strum(serialize = "true")]
    True,
    #[strum(serialize = "false")]
    False,
    #[strum(serialize = "null")]
    Null,
}

impl Builtin {
    pub(crate) const ALL: [Self; 11] = [
        Self::Print,
        Self::Int,
        Self::Float,
        Self::Bool,
        Self::String,
        Self::Void,
        Self::Type,
        Self::Auto,
        Self::True,
        Self::False,
        Self::Null,
    ];
}

/// A node of the syntax tree.
///
/// Declarations, statements, expressions and type expressions share one
/// tagged enum; the analyzer dispatches on the variant during its walk and
/// the interpreter dispatches on it again at execution time.
#[derive(Debug, Clone, Serialize)]
pub enum NodeKind {
    /// The whole program. Acts as an implicit function body: a top-level
    /// `return` ends the program with that value.
    Root { statements: Vec<NodeId> },
    Block { statements: Vec<NodeId> },

    // --- declarations ---
    /// `var name: Type = initializer`. Doubles as a class field declaration
    /// when it appears directly inside a class body.
    VarDecl {
        name: String,
        declared_type: NodeId,
        initializer: NodeId,
    },
    /// A struct field: `var name: Type` (no initializer inside `struct`).
    FieldDecl { name: String, declared_type: NodeId },
    /// `fun name(params): ret { body }`. A function declared directly inside
    /// a class body is a method; one whose name matches the class is its
    /// constructor and is registered under the name `<constructor>`.
    FunDecl {
        name: String,
        params: Vec<NodeId>,
        return_type: NodeId,
        body: NodeId,
    },
    Param { name: String, declared_type: NodeId },
    StructDecl { name: String, fields: Vec<NodeId> },
    /// `class Name sonOf Parent { members }`. The parent is a *name*; the
    /// analyzer resolves it in the class's enclosing scope.
    ClassDecl {
        name: String,
        parent: Option<String>,
        members: Vec<NodeId>,
    },
    /// Built-in declaration seeded into the root scope.
    Synthetic { builtin: Builtin },

    // --- statements ---
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While { condition: NodeId, body: NodeId },
    Return { value: Option<NodeId> },
    ExprStmt { expr: NodeId },
    /// `born(f)` / `born(f, v)`: join the async function behind `f` and
    /// optionally assign its recorded return value to the variable `v`.
    Born {
        fun_ref: NodeId,
        var_ref: Option<NodeId>,
    },

    // --- expressions ---
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    /// A name used as an expression; resolved to a declaration by the
    /// analyzer (`decl` + `scope` attributes).
    Reference { name: String },
    /// `$Name`: constructor value for the struct declared as `Name`.
    Constructor { reference: NodeId },
    ArrayLiteral { elements: Vec<NodeId> },
    ArrayAccess { array: NodeId, index: NodeId },
    FieldAccess { stem: NodeId, field: String },
    FunCall { callee: NodeId, args: Vec<NodeId> },
    /// `Daddy(args)`: call of the overridden parent-class method.
    DaddyCall { args: Vec<NodeId> },
    /// `lhs = rhs`; the left side must be a reference, field access or
    /// array access. Evaluates to the assigned value.
    Assignment { lhs: NodeId, rhs: NodeId },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary { op: UnaryOp, operand: NodeId },

    // --- type expressions ---
    /// A named type (`Int`, `MyClass`, ...); resolved like a reference.
    SimpleType { name: String },
    /// `T[]`
    ArrayType { element: NodeId },
    /// `Unborn<T>`
    UnbornType { inner: NodeId },
}

impl NodeKind {
    /// True for nodes that introduce a name into a scope.
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            Self::VarDecl { .. }
                | Self::FieldDecl { .. }
                | Self::FunDecl { .. }
                | Self::Param { .. }
                | Self::StructDecl { .. }
                | Self::ClassDecl { .. }
                | Self::Synthetic { .. }
        )
    }

    /// The declared name, for declaration nodes.
    #[must_use]
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Self::VarDecl { name, .. }
            | Self::FieldDecl { name, .. }
            | Self::FunDecl { name, .. }
            | Self::Param { name, .. }
            | Self::StructDecl { name, .. }
            | Self::ClassDecl { name, .. } => Some(name),
            Self::Synthetic { .. } => None,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub range: CodeRange,
    pub kind: NodeKind,
}

/// The syntax tree, stored as a flat arena.
///
/// `root` is pushed last by the parser; synthetic built-in declarations are
/// appended by [`Ast::seed_builtins`] before analysis so they have ids like
/// any other declaration.
#[derive(Debug, Clone, Serialize)]
pub struct Ast {
    nodes: Vec<Node>,
    pub root: NodeId,
}

impl Ast {
    pub(crate) fn new(nodes: Vec<Node>, root: NodeId) -> Self {
        Self { nodes, root }
    }

    pub(crate) fn push(&mut self, range: CodeRange, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node { range, kind });
        id
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    #[must_use]
    pub fn range(&self, id: NodeId) -> CodeRange {
        self.nodes[id.index()].range
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The declared name of a declaration node.
    ///
    /// # Panics
    /// Panics when `id` is not a named declaration; callers hold ids that
    /// the analyzer already classified.
    #[must_use]
    pub fn decl_name(&self, id: NodeId) -> &str {
        match self.kind(id) {
            NodeKind::Synthetic { builtin } => match builtin {
                Builtin::Print => "print",
                Builtin::Int => "Int",
                Builtin::Float => "Float",
                Builtin::Bool => "Bool",
                Builtin::String => "String",
                Builtin::Void => "Void",
                Builtin::Type => "Type",
                Builtin::Auto => "Auto",
                Builtin::True => "true",
                Builtin::False => "false",
                Builtin::Null => "null",
            },
            kind => kind
                .declared_name()
                .expect("decl_name called on a non-declaration node"),
        }
    }

    /// Appends one synthetic declaration per [`Builtin`] and returns their ids.
    pub(crate) fn seed_builtins(&mut self) -> Vec<NodeId> {
        Builtin::ALL
            .iter()
            .map(|&builtin| self.push(CodeRange::default(), NodeKind::Synthetic { builtin }))
            .collect()
    }
}
