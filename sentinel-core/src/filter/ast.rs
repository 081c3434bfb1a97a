//! Filter abstract syntax tree (§3, §4.5).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Match,
    NotMatch,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
    List(Vec<Literal>),
}

/// A node in the filter AST. Each node owns its children; there is no
/// sharing, so the tree can be dropped without reference counting.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    Literal(Literal),
    Compare {
        op: CompareOp,
        field: Box<Expr>,
        value: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}
