//! Lexer for Friendscript source code.
//!
//! Converts source text into a stream of tokens using the logos lexer
//! generator. Keywords are listed before identifiers so they win ties.
//!
//! # Token Categories
//!
//! - **Keywords**: `if`, `else`, `loop`, `count`, `in`, `not`, `break`, `continue`,
//!   `declare`, `unset`, `include`, `on`, `true`, `false`, `null`
//! - **Literals**: double-quoted strings (escapes, `{var}` placeholders),
//!   single-quoted raw strings, integers, floats
//! - **Operators**: assignment (`=`, `+=`, `-=`, `*=`, `/=`, `<<`), comparison
//!   (`==`, `!=`, `>`, `>=`, `<`, `<=`, `=~`, `!~`), arithmetic, `->`, `::`
//! - **Variables**: `$name`, `$name.field.0`

use std::fmt;

use logos::{Logos, Span};
use thiserror::Error;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Default, Error)]
pub enum LexerError {
    #[default]
    #[error("unexpected character")]
    UnexpectedCharacter,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unterminated regular expression")]
    UnterminatedRegex,
    #[error("unknown regular expression flag '{0}'")]
    InvalidRegexFlag(char),
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid number")]
    InvalidNumber,
}

/// Tokens produced by the Friendscript lexer.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    // Keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("loop")]
    Loop,
    #[token("count")]
    Count,
    #[token("in")]
    In,
    #[token("not")]
    Not,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("declare")]
    Declare,
    #[token("unset")]
    Unset,
    #[token("include")]
    Include,
    #[token("on")]
    On,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Multi-character operators
    #[token("->")]
    Arrow,
    #[token("::")]
    PathSep,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("<<")]
    Append,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token(">=")]
    GtEq,
    #[token("<=")]
    LtEq,
    /// `=~`, with the `/pattern/flags` that follows it when written inline.
    #[token("=~", lex_regex_operand)]
    Match(Option<String>),
    /// `!~`, as [`Token::Match`].
    #[token("!~", lex_regex_operand)]
    NotMatch(Option<String>),

    // Single-character operators and punctuation
    #[token("=")]
    Eq,
    #[token(">")]
    Gt,
    #[token("<")]
    Lt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    // Literals
    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    String(String),
    #[regex(r"'[^']*'", lex_raw_string)]
    RawString(String),
    #[regex(r"[0-9]+", lex_int)]
    Int(i64),
    #[regex(r"[0-9]+\.[0-9]+", lex_float)]
    Float(f64),

    /// `$name.path`, stored without the `$`.
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z0-9_]+)*", lex_variable)]
    Variable(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", lex_ident)]
    Ident(String),

    #[regex(r"#[^\n]*", allow_greedy = true)]
    Comment,

    #[token("\n")]
    Newline,
}

impl Token {
    /// Keyword tokens spelled as text, for places where a keyword may stand
    /// in for a plain name (object keys).
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::If => "if",
            Token::Else => "else",
            Token::Loop => "loop",
            Token::Count => "count",
            Token::In => "in",
            Token::Not => "not",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Declare => "declare",
            Token::Unset => "unset",
            Token::Include => "include",
            Token::On => "on",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.keyword_text() {
            return write!(f, "'{keyword}'");
        }
        match self {
            Token::Arrow => write!(f, "'->'"),
            Token::PathSep => write!(f, "'::'"),
            Token::PlusEq => write!(f, "'+='"),
            Token::MinusEq => write!(f, "'-='"),
            Token::StarEq => write!(f, "'*='"),
            Token::SlashEq => write!(f, "'/='"),
            Token::Append => write!(f, "'<<'"),
            Token::EqEq => write!(f, "'=='"),
            Token::NotEq => write!(f, "'!='"),
            Token::GtEq => write!(f, "'>='"),
            Token::LtEq => write!(f, "'<='"),
            Token::Match(_) => write!(f, "'=~'"),
            Token::NotMatch(_) => write!(f, "'!~'"),
            Token::Eq => write!(f, "'='"),
            Token::Gt => write!(f, "'>'"),
            Token::Lt => write!(f, "'<'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Colon => write!(f, "':'"),
            Token::Comma => write!(f, "','"),
            Token::Semi => write!(f, "';'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::String(s) => write!(f, "string \"{s}\""),
            Token::RawString(s) => write!(f, "string '{s}'"),
            Token::Int(i) => write!(f, "integer {i}"),
            Token::Float(x) => write!(f, "float {x}"),
            Token::Variable(name) => write!(f, "variable ${name}"),
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::Comment => write!(f, "comment"),
            Token::Newline => write!(f, "newline"),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// Lex a double-quoted string literal, processing escape sequences.
fn lex_string(lex: &mut logos::Lexer<Token>) -> Result<String, LexerError> {
    parse_string_literal(lex.slice())
}

/// Lex a single-quoted string literal (no escape processing).
fn lex_raw_string(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

/// `$NAME.path` → `NAME.path`
fn lex_variable(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice()[1..].to_string()
}

fn lex_int(lex: &mut logos::Lexer<Token>) -> Result<i64, LexerError> {
    lex.slice().parse().map_err(|_| LexerError::InvalidNumber)
}

fn lex_float(lex: &mut logos::Lexer<Token>) -> Result<f64, LexerError> {
    lex.slice().parse().map_err(|_| LexerError::InvalidNumber)
}

fn lex_ident(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice().to_string()
}

/// After `=~`/`!~`, consume an inline `/pattern/flags` if one follows.
///
/// The pattern is returned with flags folded in as a `(?flags)` prefix. When
/// no slash follows, the operand is left for the parser (a quoted string).
fn lex_regex_operand(lex: &mut logos::Lexer<Token>) -> Result<Option<String>, LexerError> {
    let rest = lex.remainder();
    let trimmed = rest.trim_start_matches([' ', '\t']);
    let skipped = rest.len() - trimmed.len();
    if !trimmed.starts_with('/') {
        return Ok(None);
    }

    let mut pattern = String::new();
    let mut escaped = false;
    for (i, ch) in trimmed.char_indices().skip(1) {
        if escaped {
            // `\/` is just a slash; every other escape belongs to the regex
            if ch != '/' {
                pattern.push('\\');
            }
            pattern.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '\n' => return Err(LexerError::UnterminatedRegex),
            '/' => {
                let flags: String = trimmed[i + 1..]
                    .chars()
                    .take_while(|c| c.is_ascii_alphabetic())
                    .collect();
                if let Some(bad) = flags.chars().find(|c| !matches!(c, 'i' | 'm' | 's' | 'x' | 'U')) {
                    return Err(LexerError::InvalidRegexFlag(bad));
                }
                lex.bump(skipped + i + 1 + flags.len());
                if flags.is_empty() {
                    return Ok(Some(pattern));
                }
                return Ok(Some(format!("(?{flags}){pattern}")));
            }
            _ => pattern.push(ch),
        }
    }
    Err(LexerError::UnterminatedRegex)
}

/// Unquote a double-quoted string literal and process its escapes.
///
/// Unknown escapes keep their backslash so regex text survives intact.
pub fn parse_string_literal(source: &str) -> Result<String, LexerError> {
    if source.len() < 2 || !source.starts_with('"') || !source.ends_with('"') {
        return Err(LexerError::UnterminatedString);
    }

    let inner = &source[1..source.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return Err(LexerError::InvalidEscape);
                }
                let codepoint = u32::from_str_radix(&hex, 16).map_err(|_| LexerError::InvalidEscape)?;
                result.push(char::from_u32(codepoint).ok_or(LexerError::InvalidEscape)?);
            }
            Some(next) => {
                result.push('\\');
                result.push(next);
            }
            None => return Err(LexerError::InvalidEscape),
        }
    }

    Ok(result)
}

/// Tokenize source code into a vector of spanned tokens.
///
/// Comments are dropped. Every lexer error is collected, not just the first.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Vec<Spanned<LexerError>>> {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, span) in lexer.spanned() {
        match result {
            Ok(Token::Comment) => {}
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => errors.push(Spanned::new(err, span)),
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn lex(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("lexing failed")
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn assignment_tokens() {
        assert_eq!(
            lex("$x = 1"),
            vec![Token::Variable("x".into()), Token::Eq, Token::Int(1)]
        );
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(
            lex("loop count countdown"),
            vec![Token::Loop, Token::Count, Token::Ident("countdown".into())]
        );
    }

    #[test]
    fn module_qualified_command() {
        assert_eq!(
            lex("file::read 'a.txt' -> $out"),
            vec![
                Token::Ident("file".into()),
                Token::PathSep,
                Token::Ident("read".into()),
                Token::RawString("a.txt".into()),
                Token::Arrow,
                Token::Variable("out".into()),
            ]
        );
    }

    #[rstest]
    #[case("+=", Token::PlusEq)]
    #[case("-=", Token::MinusEq)]
    #[case("*=", Token::StarEq)]
    #[case("/=", Token::SlashEq)]
    #[case("<<", Token::Append)]
    #[case("<=", Token::LtEq)]
    #[case("!=", Token::NotEq)]
    fn compound_operators(#[case] source: &str, #[case] expected: Token) {
        assert_eq!(lex(source), vec![expected]);
    }

    #[test]
    fn dotted_variables() {
        assert_eq!(lex("$user.emails.0"), vec![Token::Variable("user.emails.0".into())]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(lex(r#""a\tb\"c""#), vec![Token::String("a\tb\"c".into())]);
        assert_eq!(lex(r#""\d+""#), vec![Token::String("\\d+".into())]);
    }

    #[test]
    fn inline_regex_operand() {
        assert_eq!(
            lex("$x =~ /^a\\/b$/i"),
            vec![Token::Variable("x".into()), Token::Match(Some("(?i)^a/b$".into()))]
        );
    }

    #[test]
    fn regex_operand_may_be_a_string() {
        assert_eq!(
            lex("$x !~ \"abc\""),
            vec![
                Token::Variable("x".into()),
                Token::NotMatch(None),
                Token::String("abc".into()),
            ]
        );
    }

    #[test]
    fn unterminated_regex_is_an_error() {
        assert!(tokenize("$x =~ /abc").is_err());
    }

    #[test]
    fn comments_and_newlines() {
        assert_eq!(
            lex("put 1 # trailing\n# whole line\nput 2"),
            vec![
                Token::Ident("put".into()),
                Token::Int(1),
                Token::Newline,
                Token::Newline,
                Token::Ident("put".into()),
                Token::Int(2),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(lex("3.25 -4"), vec![Token::Float(3.25), Token::Minus, Token::Int(4)]);
    }

    #[test]
    fn errors_carry_spans() {
        let errors = tokenize("put @").expect_err("should fail");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, 4..5);
    }
}
