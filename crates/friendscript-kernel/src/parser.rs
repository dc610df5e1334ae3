//! Recursive-descent parser for Friendscript.
//!
//! Consumes the token stream produced by [`crate::lexer`] and builds the
//! [`crate::ast`] tree. Expressions use precedence climbing: `+`/`-` bind
//! looser than `*`/`/`/`%`, with unary minus tightest.
//!
//! One piece of context matters: inside a conditional or loop header a `{`
//! normally opens the body, so a command there only takes an options object
//! when the brace is visibly followed by `key:`.

use thiserror::Error;

use friendscript_types::Value;

use crate::ast::{
    AssignOp, Assignment, BinaryOp, Block, Command, Comparator, Condition, Conditional, Directive,
    DirectiveKind, EventHandler, Expr, FlowControl, FlowKind, IterSource, Loop, LoopKind,
    LoopStep, Program, Span, Statement, StatementBlock,
};
use crate::lexer::{tokenize, Spanned, Token};

/// A syntax error with the location it was detected at.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error at byte {}: {}", .span.offset, .message)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Parse a complete program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source).map_err(|errors| match errors.into_iter().next() {
        Some(first) => ParseError::new(first.token.to_string(), first.span.into()),
        None => ParseError::new("invalid input", Span::default()),
    })?;

    let mut parser = Parser::new(tokens, source.len());
    let blocks = parser.parse_blocks(false)?;
    Ok(Program {
        blocks,
        source: source.to_string(),
    })
}

struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    eof: usize,
    /// Parsing a conditional or loop header, where `{` opens the body.
    in_header: bool,
}

impl Parser {
    fn new(tokens: Vec<Spanned<Token>>, eof: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            eof,
            in_header: false,
        }
    }

    // ------------------------------------------------------------------
    // Token navigation
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|spanned| &spanned.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|spanned| spanned.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|current| std::mem::discriminant(current) == std::mem::discriminant(token))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<Span, ParseError> {
        if self.eat(token) {
            Ok(self.previous_span())
        } else {
            Err(self.expected(what))
        }
    }

    fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(spanned) => spanned.span.clone().into(),
            None => Span::new(self.eof, 0),
        }
    }

    fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(spanned) => spanned.span.clone().into(),
            None => Span::default(),
        }
    }

    fn expected(&self, what: &str) -> ParseError {
        let found = match self.peek() {
            Some(token) => token.to_string(),
            None => "end of input".to_string(),
        };
        ParseError::new(format!("expected {what}, found {found}"), self.current_span())
    }

    /// Skip newlines, reporting whether any were skipped.
    fn skip_newlines(&mut self) -> bool {
        let start = self.pos;
        while self.eat(&Token::Newline) {}
        self.pos > start
    }

    fn skip_separators(&mut self) {
        while self.eat(&Token::Newline) || self.eat(&Token::Semi) {}
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.expected(what)),
        }
    }

    fn expect_variable(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Variable(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.expected("a variable")),
        }
    }

    /// Run `f` with header rules in effect.
    fn with_header<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = std::mem::replace(&mut self.in_header, true);
        let result = f(self);
        self.in_header = saved;
        result
    }

    // ------------------------------------------------------------------
    // Blocks and statements
    // ------------------------------------------------------------------

    /// Parse blocks until end of input, or until `}` when `nested`.
    fn parse_blocks(&mut self, nested: bool) -> Result<Vec<Block>, ParseError> {
        let mut blocks = Vec::new();
        let mut pending = Vec::new();

        loop {
            self.skip_separators();
            match self.peek() {
                None => break,
                Some(Token::RBrace) if nested => break,
                Some(Token::RBrace) => return Err(self.expected("a statement")),
                Some(Token::Break | Token::Continue) => {
                    flush_statements(&mut blocks, &mut pending);
                    blocks.push(Block::Flow(self.parse_flow()?));
                }
                Some(Token::On) => {
                    flush_statements(&mut blocks, &mut pending);
                    blocks.push(Block::EventHandler(self.parse_event_handler()?));
                }
                Some(_) => pending.push(self.parse_statement()?),
            }
            self.expect_statement_end()?;
        }

        flush_statements(&mut blocks, &mut pending);
        Ok(blocks)
    }

    fn expect_statement_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            None | Some(Token::Newline | Token::Semi | Token::RBrace) => Ok(()),
            Some(_) => Err(self.expected("end of statement")),
        }
    }

    fn parse_body(&mut self) -> Result<Vec<Block>, ParseError> {
        self.expect(&Token::LBrace, "'{'")?;
        let blocks = self.parse_blocks(true)?;
        self.expect(&Token::RBrace, "'}'")?;
        Ok(blocks)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek() {
            Some(Token::Variable(_)) => Ok(Statement::Assignment(self.parse_assignment()?)),
            Some(Token::Declare | Token::Unset | Token::Include) => {
                Ok(Statement::Directive(self.parse_directive()?))
            }
            Some(Token::If) => Ok(Statement::Conditional(self.parse_conditional()?)),
            Some(Token::Loop) => Ok(Statement::Loop(self.parse_loop()?)),
            Some(Token::Ident(_)) => Ok(Statement::Command(self.parse_command()?)),
            _ => Err(self.expected("a statement")),
        }
    }

    fn parse_flow(&mut self) -> Result<FlowControl, ParseError> {
        let start = self.current_span();
        let kind = match self.advance() {
            Some(Token::Break) => FlowKind::Break,
            Some(Token::Continue) => FlowKind::Continue,
            _ => return Err(ParseError::new("expected 'break' or 'continue'", start)),
        };

        let negative = matches!(self.peek(), Some(Token::Minus))
            && matches!(self.peek_at(1), Some(Token::Int(_)));
        if negative {
            self.pos += 1;
        }
        let level = match self.peek() {
            Some(Token::Int(n)) => {
                let n = *n;
                self.pos += 1;
                if negative { -n } else { n }
            }
            _ => 1,
        };

        Ok(FlowControl {
            kind,
            level,
            span: Span::between(start, self.previous_span()),
        })
    }

    fn parse_event_handler(&mut self) -> Result<EventHandler, ParseError> {
        let start = self.expect(&Token::On, "'on'")?;
        let event = match self.advance() {
            Some(Token::Ident(name) | Token::String(name) | Token::RawString(name)) => name,
            _ => return Err(ParseError::new("expected an event name after 'on'", self.previous_span())),
        };
        let body = self.parse_body()?;
        Ok(EventHandler {
            event,
            body,
            span: Span::between(start, self.previous_span()),
        })
    }

    fn parse_variable_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.expect_variable()?];
        while self.eat(&Token::Comma) {
            names.push(self.expect_variable()?);
        }
        Ok(names)
    }

    /// `$a, $b` followed by an assignment operator.
    fn assignment_ahead(&self) -> bool {
        self.variable_list_followed_by(|token| {
            matches!(
                token,
                Token::Eq | Token::PlusEq | Token::MinusEq | Token::StarEq | Token::SlashEq | Token::Append
            )
        })
    }

    /// `$a, $b` followed by `in`.
    fn iteration_ahead(&self) -> bool {
        self.variable_list_followed_by(|token| matches!(token, Token::In))
    }

    fn variable_list_followed_by(&self, terminator: impl Fn(&Token) -> bool) -> bool {
        let mut i = 0;
        loop {
            if !matches!(self.peek_at(i), Some(Token::Variable(_))) {
                return false;
            }
            i += 1;
            match self.peek_at(i) {
                Some(Token::Comma) => i += 1,
                Some(token) => return terminator(token),
                None => return false,
            }
        }
    }

    fn parse_assignment(&mut self) -> Result<Assignment, ParseError> {
        let start = self.current_span();
        let targets = self.parse_variable_list()?;
        let op = match self.peek() {
            Some(Token::Eq) => AssignOp::Assign,
            Some(Token::PlusEq) => AssignOp::Add,
            Some(Token::MinusEq) => AssignOp::Subtract,
            Some(Token::StarEq) => AssignOp::Multiply,
            Some(Token::SlashEq) => AssignOp::Divide,
            Some(Token::Append) => AssignOp::Append,
            _ => return Err(self.expected("an assignment operator")),
        };
        self.pos += 1;

        let mut values = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            values.push(self.parse_expr()?);
        }

        Ok(Assignment {
            targets,
            op,
            values,
            span: Span::between(start, self.previous_span()),
        })
    }

    fn parse_directive(&mut self) -> Result<Directive, ParseError> {
        let start = self.current_span();
        let kind = match self.advance() {
            Some(Token::Declare) => DirectiveKind::Declare(self.parse_variable_list()?),
            Some(Token::Unset) => DirectiveKind::Unset(self.parse_variable_list()?),
            Some(Token::Include) => match self.advance() {
                Some(Token::String(path) | Token::RawString(path)) => DirectiveKind::Include(path),
                _ => return Err(ParseError::new("expected a path after 'include'", self.previous_span())),
            },
            _ => return Err(ParseError::new("expected a directive", start)),
        };
        Ok(Directive {
            kind,
            span: Span::between(start, self.previous_span()),
        })
    }

    // ------------------------------------------------------------------
    // Conditionals and loops
    // ------------------------------------------------------------------

    fn parse_conditional(&mut self) -> Result<Conditional, ParseError> {
        let start = self.expect(&Token::If, "'if'")?;
        let (negated, condition, then_blocks) = self.parse_conditional_arm()?;

        let mut else_ifs = Vec::new();
        let mut else_blocks = None;
        loop {
            let checkpoint = self.pos;
            self.skip_newlines();
            if !self.eat(&Token::Else) {
                self.pos = checkpoint;
                break;
            }
            if self.eat(&Token::If) {
                let arm_start = self.previous_span();
                let (negated, condition, then_blocks) = self.parse_conditional_arm()?;
                else_ifs.push(Conditional {
                    condition,
                    negated,
                    then_blocks,
                    else_ifs: Vec::new(),
                    else_blocks: None,
                    span: Span::between(arm_start, self.previous_span()),
                });
            } else {
                else_blocks = Some(self.parse_body()?);
                break;
            }
        }

        Ok(Conditional {
            condition,
            negated,
            then_blocks,
            else_ifs,
            else_blocks,
            span: Span::between(start, self.previous_span()),
        })
    }

    fn parse_conditional_arm(&mut self) -> Result<(bool, Condition, Vec<Block>), ParseError> {
        let negated = self.eat(&Token::Not);
        let condition = self.with_header(|p| p.parse_condition())?;
        let blocks = self.parse_body()?;
        Ok((negated, condition, blocks))
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        match self.peek() {
            Some(Token::Variable(_)) if self.assignment_ahead() => {
                let assignment = self.parse_assignment()?;
                self.expect(&Token::Semi, "';' after the guard assignment")?;
                let test = self.parse_test()?;
                Ok(Condition::Assignment {
                    assignment,
                    test: Box::new(test),
                })
            }
            Some(Token::Ident(_)) => {
                let command = self.parse_command()?;
                let test = if self.eat(&Token::Semi) {
                    Some(Box::new(self.parse_test()?))
                } else {
                    None
                };
                Ok(Condition::Command { command, test })
            }
            _ => self.parse_test(),
        }
    }

    fn parse_test(&mut self) -> Result<Condition, ParseError> {
        let left = self.parse_expr()?;

        let comparator = match self.peek() {
            Some(Token::Match(_) | Token::NotMatch(_)) => {
                let (negated, inline) = match self.advance() {
                    Some(Token::NotMatch(pattern)) => (true, pattern),
                    Some(Token::Match(pattern)) => (false, pattern),
                    _ => (false, None),
                };
                let pattern = match inline {
                    Some(pattern) => pattern,
                    None => match self.advance() {
                        Some(Token::String(pattern) | Token::RawString(pattern)) => pattern,
                        _ => {
                            return Err(ParseError::new(
                                "expected /pattern/ or a quoted pattern",
                                self.previous_span(),
                            ));
                        }
                    },
                };
                return Ok(Condition::Match {
                    value: left,
                    pattern,
                    negated,
                });
            }
            Some(Token::EqEq) => Comparator::Eq,
            Some(Token::NotEq) => Comparator::NotEq,
            Some(Token::Gt) => Comparator::Gt,
            Some(Token::GtEq) => Comparator::GtEq,
            Some(Token::Lt) => Comparator::Lt,
            Some(Token::LtEq) => Comparator::LtEq,
            Some(Token::In) => Comparator::In,
            Some(Token::Not) if matches!(self.peek_at(1), Some(Token::In)) => {
                self.pos += 1;
                Comparator::NotIn
            }
            _ => {
                return Ok(Condition::Compare {
                    left,
                    comparison: None,
                });
            }
        };
        self.pos += 1;

        let right = self.parse_expr()?;
        Ok(Condition::Compare {
            left,
            comparison: Some((comparator, right)),
        })
    }

    fn parse_loop(&mut self) -> Result<Loop, ParseError> {
        let start = self.expect(&Token::Loop, "'loop'")?;

        let kind = match self.peek() {
            Some(Token::LBrace) => LoopKind::Unconditional,
            Some(Token::Count) => {
                self.pos += 1;
                LoopKind::Count(self.with_header(|p| p.parse_expr())?)
            }
            Some(Token::Variable(_)) if self.iteration_ahead() => {
                let targets = self.parse_variable_list()?;
                self.expect(&Token::In, "'in'")?;
                let source = self.with_header(|p| match p.peek() {
                    Some(Token::Ident(_)) => Ok(IterSource::Command(p.parse_command()?)),
                    _ => Ok(IterSource::Expr(p.parse_expr()?)),
                })?;
                LoopKind::Iterate { targets, source }
            }
            _ => self.with_header(|p| p.parse_loop_header())?,
        };

        let body = self.parse_body()?;
        Ok(Loop {
            kind,
            body,
            span: Span::between(start, self.previous_span()),
        })
    }

    /// A `while`-style condition, or `init; condition; step`.
    fn parse_loop_header(&mut self) -> Result<LoopKind, ParseError> {
        let condition = self.parse_condition()?;
        if !self.eat(&Token::Semi) {
            return Ok(LoopKind::While(condition));
        }

        let (init, condition) = match condition {
            Condition::Assignment { assignment, test } => (LoopStep::Assignment(assignment), *test),
            Condition::Command {
                command,
                test: Some(test),
            } => (LoopStep::Command(command), *test),
            _ => {
                return Err(ParseError::new(
                    "a bounded loop needs an initializer, a condition and a step",
                    self.previous_span(),
                ));
            }
        };

        let step = match self.peek() {
            Some(Token::Variable(_)) => LoopStep::Assignment(self.parse_assignment()?),
            Some(Token::Ident(_)) => LoopStep::Command(self.parse_command()?),
            _ => return Err(self.expected("a loop step")),
        };

        Ok(LoopKind::Bounded {
            init,
            condition,
            step,
        })
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        let start = self.current_span();
        let first = self.expect_ident("a command name")?;
        let (module, name) = if self.eat(&Token::PathSep) {
            (Some(first), self.expect_ident("a command name after '::'")?)
        } else {
            (None, first)
        };

        let mut positional = None;
        let mut options = None;
        if self.object_ahead() {
            options = Some(self.parse_object_entries()?);
        } else if self.expression_ahead() {
            positional = Some(self.parse_expr()?);
            if self.object_ahead() {
                options = Some(self.parse_object_entries()?);
            }
        }

        let output = if self.eat(&Token::Arrow) {
            Some(self.expect_variable()?)
        } else {
            None
        };

        Ok(Command {
            module,
            name,
            positional,
            options,
            output,
            span: Span::between(start, self.previous_span()),
        })
    }

    /// Whether a `{` here starts a command's options object.
    fn object_ahead(&self) -> bool {
        if !self.check(&Token::LBrace) {
            return false;
        }
        if !self.in_header {
            return true;
        }

        let mut i = 1;
        while matches!(self.peek_at(i), Some(Token::Newline)) {
            i += 1;
        }
        let is_key = match self.peek_at(i) {
            Some(Token::Ident(_) | Token::String(_) | Token::RawString(_)) => true,
            Some(token) => token.keyword_text().is_some(),
            None => false,
        };
        is_key && matches!(self.peek_at(i + 1), Some(Token::Colon))
    }

    fn expression_ahead(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Int(_)
                    | Token::Float(_)
                    | Token::String(_)
                    | Token::RawString(_)
                    | Token::True
                    | Token::False
                    | Token::Null
                    | Token::Variable(_)
                    | Token::LBracket
                    | Token::LParen
                    | Token::Minus
            )
        )
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::Percent) => BinaryOp::Modulo,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if !self.eat(&Token::Minus) {
            return self.parse_primary();
        }
        // fold negative number literals
        match self.peek() {
            Some(Token::Int(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Literal(Value::Int(-n)))
            }
            Some(Token::Float(x)) => {
                let x = *x;
                self.pos += 1;
                Ok(Expr::Literal(Value::Float(-x)))
            }
            _ => Ok(Expr::Negate(Box::new(self.parse_unary()?))),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if self.check(&Token::LBrace) {
            let entries = self.parse_object_entries()?;
            return Ok(Expr::Object(entries));
        }

        let expr = match self.peek() {
            Some(Token::Int(n)) => Expr::Literal(Value::Int(*n)),
            Some(Token::Float(x)) => Expr::Literal(Value::Float(*x)),
            Some(Token::True) => Expr::Literal(Value::Bool(true)),
            Some(Token::False) => Expr::Literal(Value::Bool(false)),
            Some(Token::Null) => Expr::Literal(Value::Null),
            Some(Token::String(s)) if s.contains('{') => Expr::Interpolated(s.clone()),
            Some(Token::String(s) | Token::RawString(s)) => Expr::Literal(Value::String(s.clone())),
            Some(Token::Variable(name)) => Expr::Variable(name.clone()),
            Some(Token::LBracket) => return self.parse_array(),
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                return Ok(inner);
            }
            _ => return Err(self.expected("an expression")),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn parse_array(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::LBracket, "'['")?;
        let saved = std::mem::replace(&mut self.in_header, false);
        let result = self.parse_array_items();
        self.in_header = saved;
        result.map(Expr::Array)
    }

    fn parse_array_items(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&Token::RBracket) {
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            let had_newline = self.skip_newlines();
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RBracket) {
                return Ok(items);
            }
            if !had_newline {
                return Err(self.expected("',' or ']'"));
            }
        }
    }

    /// `{ key: value, ... }`, commas or newlines between entries.
    fn parse_object_entries(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        self.expect(&Token::LBrace, "'{'")?;
        let saved = std::mem::replace(&mut self.in_header, false);
        let result = self.parse_object_items();
        self.in_header = saved;
        result
    }

    fn parse_object_items(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut entries = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&Token::RBrace) {
                return Ok(entries);
            }

            let key = match self.advance() {
                Some(Token::Ident(key) | Token::String(key) | Token::RawString(key)) => key,
                Some(Token::Int(n)) => n.to_string(),
                Some(token) => match token.keyword_text() {
                    Some(keyword) => keyword.to_string(),
                    None => return Err(ParseError::new("expected an object key", self.previous_span())),
                },
                None => return Err(self.expected("an object key")),
            };
            self.expect(&Token::Colon, "':' after object key")?;
            self.skip_newlines();
            let value = self.parse_expr()?;
            entries.push((key, value));

            let had_newline = self.skip_newlines();
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RBrace) {
                return Ok(entries);
            }
            if !had_newline {
                return Err(self.expected("',' or '}'"));
            }
        }
    }
}

fn flush_statements(blocks: &mut Vec<Block>, pending: &mut Vec<Statement>) {
    if pending.is_empty() {
        return;
    }
    let statements = std::mem::take(pending);
    let span = match (statements.first(), statements.last()) {
        (Some(first), Some(last)) => Span::between(first.span(), last.span()),
        _ => Span::default(),
    };
    blocks.push(Block::Statements(StatementBlock { statements, span }));
}
