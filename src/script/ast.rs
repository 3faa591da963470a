// AST definitions for the interpreted JavaScript subset

use std::rc::Rc;

/// Source location information for error reporting and step lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical (short-circuit)
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,    // -x
    Plus,   // +x
    Not,    // !x
    Typeof, // typeof x
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Arrow function with an expression body
    Expr(Box<Expr>),
}

/// Function declaration, expression or arrow function
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64, SourceLocation),
    Str(String, SourceLocation),
    Bool(bool, SourceLocation),
    Null(SourceLocation),
    Undefined(SourceLocation),
    Ident(String, SourceLocation),
    Array(Vec<Expr>, SourceLocation),
    Object(Vec<(String, Expr)>, SourceLocation),
    Function(Rc<FunctionDef>),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        location: SourceLocation,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
        location: SourceLocation,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        location: SourceLocation,
    },
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        location: SourceLocation,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        location: SourceLocation,
    },
    CompoundAssign {
        op: BinOp,
        target: Box<Expr>,
        value: Box<Expr>,
        location: SourceLocation,
    },
    Member {
        object: Box<Expr>,
        property: String,
        location: SourceLocation,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        location: SourceLocation,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    New {
        class_name: String,
        args: Vec<Expr>,
        location: SourceLocation,
    },
}

impl Expr {
    pub fn location(&self) -> SourceLocation {
        match self {
            Expr::Number(_, loc)
            | Expr::Str(_, loc)
            | Expr::Bool(_, loc)
            | Expr::Null(loc)
            | Expr::Undefined(loc)
            | Expr::Ident(_, loc)
            | Expr::Array(_, loc)
            | Expr::Object(_, loc) => *loc,
            Expr::Function(def) => def.location,
            Expr::Unary { location, .. }
            | Expr::Update { location, .. }
            | Expr::Binary { location, .. }
            | Expr::Ternary { location, .. }
            | Expr::Assign { location, .. }
            | Expr::CompoundAssign { location, .. }
            | Expr::Member { location, .. }
            | Expr::Index { location, .. }
            | Expr::Call { location, .. }
            | Expr::New { location, .. } => *location,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    VarDecl {
        kind: DeclKind,
        declarations: Vec<(String, Option<Expr>)>,
        location: SourceLocation,
    },
    FunctionDecl(Rc<FunctionDef>),
    Expression {
        expr: Expr,
        location: SourceLocation,
    },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        location: SourceLocation,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    DoWhile {
        body: Vec<Stmt>,
        condition: Expr,
        location: SourceLocation,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    ForOf {
        kind: DeclKind,
        name: String,
        iterable: Expr,
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    Break {
        location: SourceLocation,
    },
    Continue {
        location: SourceLocation,
    },
    Return {
        value: Option<Expr>,
        location: SourceLocation,
    },
    Throw {
        value: Expr,
        location: SourceLocation,
    },
    Block {
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    Empty {
        location: SourceLocation,
    },
}

impl Stmt {
    pub fn location(&self) -> SourceLocation {
        match self {
            Stmt::FunctionDecl(def) => def.location,
            Stmt::VarDecl { location, .. }
            | Stmt::Expression { location, .. }
            | Stmt::If { location, .. }
            | Stmt::While { location, .. }
            | Stmt::DoWhile { location, .. }
            | Stmt::For { location, .. }
            | Stmt::ForOf { location, .. }
            | Stmt::Break { location }
            | Stmt::Continue { location }
            | Stmt::Return { location, .. }
            | Stmt::Throw { location, .. }
            | Stmt::Block { location, .. }
            | Stmt::Empty { location } => *location,
        }
    }

    /// Whether execution pauses before this statement
    pub fn is_step(&self) -> bool {
        !matches!(
            self,
            Stmt::FunctionDecl(_) | Stmt::Block { .. } | Stmt::Empty { .. }
        )
    }
}

/// Top-level program structure
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}
