#![forbid(unsafe_code)]

//! AST for templates in the source dialect.
//!
//! The tree is produced once by `jintt-parse` and then walked read-only by
//! `jintt-emit`. Statement nodes carry the whitespace-control flags captured
//! from their opening tag; expression nodes carry a span for diagnostics.

use miette::SourceSpan;

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

pub fn join(a: Span, b: Span) -> Span {
    let start = a.offset().min(b.offset());
    let end = (a.offset() + a.len()).max(b.offset() + b.len());
    span_between(start, end)
}

/// Root of a parsed template.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Text(TextStmt),
    Comment(CommentStmt),
    Output(OutputStmt),
    If(IfStmt),
    For(ForStmt),
    Block(BlockStmt),
    Extends(ExtendsStmt),
    Include(IncludeStmt),
    Import(ImportStmt),
    FromImport(FromImportStmt),
    Set(SetStmt),
    Macro(MacroStmt),
    CallBlock(CallBlockStmt),
    FilterBlock(FilterBlockStmt),
    Raw(RawStmt),
    With(WithStmt),
    Autoescape(AutoescapeStmt),
}

/// Literal text between tags, passed through verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct TextStmt {
    pub span: Span,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommentStmt {
    pub span: Span,
    pub value: String,
}

/// `{{ expr }}` interpolation.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputStmt {
    pub span: Span,
    pub expr: Expr,
    pub strip_before: bool,
    pub strip_after: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Vec<Stmt>,
    pub branches: Vec<IfBranch>,
    pub strip_before: bool,
    pub strip_after: bool,
}

/// Zero or more `Elif` arms followed by at most one terminal `Else`.
#[derive(Clone, Debug, PartialEq)]
pub enum IfBranch {
    Elif { cond: Expr, body: Vec<Stmt> },
    Else { body: Vec<Stmt> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub span: Span,
    /// Non-empty; more than one name means a destructuring target.
    pub loop_vars: Vec<String>,
    pub iterable: Expr,
    /// Trailing `if <expr>` loop filter.
    pub filter: Option<Expr>,
    pub recursive: bool,
    pub body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
    pub strip_before: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockStmt {
    pub span: Span,
    pub name: String,
    pub scoped: bool,
    pub body: Vec<Stmt>,
    pub strip_before: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtendsStmt {
    pub span: Span,
    pub template: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IncludeStmt {
    pub span: Span,
    pub template: Expr,
    pub ignore_missing: bool,
    pub with_context: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportStmt {
    pub span: Span,
    pub template: Expr,
    pub alias: String,
    pub with_context: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FromImportStmt {
    pub span: Span,
    pub template: Expr,
    pub imports: Vec<ImportName>,
    pub with_context: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

/// `{% set a = 1 %}` (inline) or `{% set a %}…{% endset %}` (block capture).
/// Exactly one of `value` / `body` is populated.
#[derive(Clone, Debug, PartialEq)]
pub struct SetStmt {
    pub span: Span,
    pub names: Vec<String>,
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MacroStmt {
    pub span: Span,
    pub name: String,
    pub args: Vec<MacroArg>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MacroArg {
    pub name: String,
    pub default: Option<Expr>,
}

/// `{% call [(args)] macro(...) %}…{% endcall %}`.
#[derive(Clone, Debug, PartialEq)]
pub struct CallBlockStmt {
    pub span: Span,
    pub args: Vec<String>,
    pub call: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterBlockStmt {
    pub span: Span,
    pub filters: Vec<FilterApply>,
    pub body: Vec<Stmt>,
}

/// One link of a `{% filter a|b(...) %}` chain.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterApply {
    pub name: String,
    pub args: Vec<Expr>,
}

/// Verbatim slice of the input between `raw` and `endraw`.
#[derive(Clone, Debug, PartialEq)]
pub struct RawStmt {
    pub span: Span,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WithStmt {
    pub span: Span,
    pub assignments: Vec<(String, Expr)>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AutoescapeStmt {
    pub span: Span,
    pub enabled: bool,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Name(String),
    /// Decoded string literal (quotes stripped, escapes resolved at parse time).
    StrLit(String),
    /// Numeric literal as written, digit-group underscores included.
    NumLit(String),
    BoolLit(bool),
    NoneLit,
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `then if cond else otherwise`; `otherwise` is absent in the short form.
    Ternary {
        then: Box<Expr>,
        cond: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    GetAttr {
        base: Box<Expr>,
        attr: String,
    },
    GetItem {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    /// `base | name(args)`. Chains nest: `a|f|g` is `Filter{g, Filter{f, a}}`.
    Filter {
        name: String,
        base: Box<Expr>,
        args: Vec<Expr>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// `name=value` inside a filter or call argument list.
    NamedArg {
        name: String,
        value: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    /// `~` string concatenation.
    Concat,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,

    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}
