//! AST type definitions.

use std::fmt;

use friendscript_types::Value;

/// Byte range of a node in the program source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
}

impl Span {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// The span covering `start` through `end` inclusive.
    pub fn between(start: Span, end: Span) -> Self {
        let stop = end.end().max(start.end());
        Self {
            offset: start.offset,
            length: stop.saturating_sub(start.offset),
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// The source text this span covers, if it lies within `source`.
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.offset..self.end())
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end.saturating_sub(range.start))
    }
}

/// A parsed program: its top-level blocks plus the text it came from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub blocks: Vec<Block>,
    /// Source text, kept for error snippets.
    pub source: String,
}

/// A top-level unit of a program or of a loop/conditional body.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// A run of ordinary statements.
    Statements(StatementBlock),
    /// `on <event> { ... }`
    EventHandler(EventHandler),
    /// `break [N]` or `continue [N]`
    Flow(FlowControl),
}

impl Block {
    pub fn span(&self) -> Span {
        match self {
            Block::Statements(block) => block.span,
            Block::EventHandler(handler) => handler.span,
            Block::Flow(flow) => flow.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementBlock {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventHandler {
    pub event: String,
    pub body: Vec<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Break,
    Continue,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::Break => write!(f, "break"),
            FlowKind::Continue => write!(f, "continue"),
        }
    }
}

/// A loop-control block. `level` counts enclosing loops, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowControl {
    pub kind: FlowKind,
    pub level: i64,
    pub span: Span,
}

/// A single statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `$a, $b = 1, 2`, `$x += 1`, `$list << $item`
    Assignment(Assignment),
    /// `declare $x`, `unset $x`, `include "file.fs"`
    Directive(Directive),
    /// `if ... { } else if ... { } else { }`
    Conditional(Conditional),
    /// `loop ... { }`
    Loop(Loop),
    /// `module::name <arg> {options} -> $out`
    Command(Command),
    /// Nothing to do (an empty statement).
    NoOp(Span),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Assignment(assignment) => assignment.span,
            Statement::Directive(directive) => directive.span,
            Statement::Conditional(conditional) => conditional.span,
            Statement::Loop(lp) => lp.span,
            Statement::Command(command) => command.span,
            Statement::NoOp(span) => *span,
        }
    }

    /// Short name of the statement kind, used in contexts and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Assignment(_) => "assignment",
            Statement::Directive(_) => "directive",
            Statement::Conditional(_) => "conditional",
            Statement::Loop(_) => "loop",
            Statement::Command(_) => "command",
            Statement::NoOp(_) => "noop",
        }
    }
}

/// Assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Subtract,
    /// `*=`
    Multiply,
    /// `/=`
    Divide,
    /// `<<`
    Append,
}

impl AssignOp {
    /// Plain `=` replaces its targets; every other operator combines with the
    /// current value.
    pub fn clears_targets(self) -> bool {
        matches!(self, AssignOp::Assign)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Subtract => "-=",
            AssignOp::Multiply => "*=",
            AssignOp::Divide => "/=",
            AssignOp::Append => "<<",
        }
    }
}

/// `$targets... <op> values...`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Variable names without the `$`, possibly dotted (`a.b`).
    pub targets: Vec<String>,
    pub op: AssignOp,
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveKind {
    Declare(Vec<String>),
    Unset(Vec<String>),
    Include(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub span: Span,
}

impl Directive {
    pub fn keyword(&self) -> &'static str {
        match self.kind {
            DirectiveKind::Declare(_) => "declare",
            DirectiveKind::Unset(_) => "unset",
            DirectiveKind::Include(_) => "include",
        }
    }
}

/// `if [not] <condition> { ... }` plus its `else if` chain and `else` body.
///
/// Entries of `else_ifs` carry their own condition and body; their
/// `else_ifs`/`else_blocks` are always empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Condition,
    pub negated: bool,
    pub then_blocks: Vec<Block>,
    pub else_ifs: Vec<Conditional>,
    pub else_blocks: Option<Vec<Block>>,
    pub span: Span,
}

/// The test part of a conditional or a `while`-style loop header.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `$x = <expr>; <test>`: run the assignment, then evaluate the test.
    Assignment {
        assignment: Assignment,
        test: Box<Condition>,
    },
    /// `<command> [; <test>]`: run the command, then evaluate the test, or
    /// the command's own result when no test is given.
    Command {
        command: Command,
        test: Option<Box<Condition>>,
    },
    /// `<expr> =~ /pattern/` or `<expr> !~ /pattern/`
    Match {
        value: Expr,
        pattern: String,
        negated: bool,
    },
    /// `<expr>` alone (truthiness) or `<expr> <comparator> <expr>`
    Compare {
        left: Expr,
        comparison: Option<(Comparator, Expr)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    In,
    NotIn,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Comparator::Eq => "==",
            Comparator::NotEq => "!=",
            Comparator::Gt => ">",
            Comparator::GtEq => ">=",
            Comparator::Lt => "<",
            Comparator::LtEq => "<=",
            Comparator::In => "in",
            Comparator::NotIn => "not in",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub kind: LoopKind,
    pub body: Vec<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopKind {
    /// `loop { ... }`
    Unconditional,
    /// `loop count <N> { ... }`
    Count(Expr),
    /// `loop $item in <source> { ... }`, `loop $k, $v in $map { ... }`
    Iterate {
        targets: Vec<String>,
        source: IterSource,
    },
    /// `loop <init>; <condition>; <step> { ... }`
    Bounded {
        init: LoopStep,
        condition: Condition,
        step: LoopStep,
    },
    /// `loop <condition> { ... }`
    While(Condition),
}

/// Where an iterating loop gets its items.
#[derive(Debug, Clone, PartialEq)]
pub enum IterSource {
    Command(Command),
    Expr(Expr),
}

/// The initializer or step of a bounded loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStep {
    Assignment(Assignment),
    Command(Command),
}

/// A command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Module prefix (`file` in `file::read`); `None` for the default module.
    pub module: Option<String>,
    pub name: String,
    /// The leading positional argument.
    pub positional: Option<Expr>,
    /// The keyword options object, as written.
    pub options: Option<Vec<(String, Expr)>>,
    /// Variable receiving the result (`-> $out`).
    pub output: Option<String>,
    pub span: Span,
}

impl Command {
    /// Script spelling: `module::name` or bare `name`.
    pub fn qualified_name(&self) -> String {
        match &self.module {
            Some(module) => format!("{}::{}", module, self.name),
            None => self.name.clone(),
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        };
        f.write_str(text)
    }
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A double-quoted string containing `{name}` placeholders.
    Interpolated(String),
    /// `$name` or `$name.field.0`, stored without the `$`.
    Variable(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Negate(Box<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
}
