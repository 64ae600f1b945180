use logos::Logos;

use crate::{
    ast::{CodeLoc, CodeRange},
    errors::ParseError,
};

/// Unescapes the body of a double-quoted string literal.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some('0') => result.push('\0'),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/// Token types of the Sigh grammar.
///
/// Newlines are real tokens: the parser skips them freely but needs
/// same-line lookahead to decide whether a `return` carries a value.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[token("\n")]
    Newline,

    // Keywords
    #[token("var")]
    Var,
    #[token("fun")]
    Fun,
    #[token("struct")]
    Struct,
    #[token("class")]
    Class,
    #[token("sonOf")]
    SonOf,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("Unborn")]
    Unborn,
    #[token("born")]
    Born,
    // both spellings are accepted in sources
    #[token("ciblingsOf")]
    #[token("siblingsOf")]
    CiblingsOf,

    // Literals
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntLiteral(i64),
    #[regex(r#""(\\.|[^"\\])*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    StringLiteral(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    // Operators and punctuation
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
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("$")]
    Dollar,
}

impl Token {
    /// Human-readable token description used in parse error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Newline => "end of line".to_owned(),
            Self::Ident(name) => format!("identifier `{name}`"),
            Self::IntLiteral(v) => format!("integer literal `{v}`"),
            Self::FloatLiteral(v) => format!("float literal `{v}`"),
            Self::StringLiteral(_) => "string literal".to_owned(),
            other => format!("`{}`", other.text()),
        }
    }

    fn text(&self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Fun => "fun",
            Self::Struct => "struct",
            Self::Class => "class",
            Self::SonOf => "sonOf",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::Return => "return",
            Self::Unborn => "Unborn",
            Self::Born => "born",
            Self::CiblingsOf => "ciblingsOf",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            Self::Eq => "=",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Dot => ".",
            Self::Dollar => "$",
            _ => "",
        }
    }
}

/// A token together with its source range.
#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub range: CodeRange,
}

/// Maps byte offsets to line/column positions.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { line_starts }
    }

    fn loc(&self, offset: usize) -> CodeLoc {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let column = offset - self.line_starts[line - 1] + 1;
        CodeLoc {
            line: u32::try_from(line).unwrap_or(u32::MAX),
            column: u32::try_from(column).unwrap_or(u32::MAX),
        }
    }

    fn range(&self, span: std::ops::Range<usize>) -> CodeRange {
        CodeRange::new(self.loc(span.start), self.loc(span.end))
    }
}

/// Tokenizes `source`, producing positioned tokens.
///
/// Lexing stops at the first unrecognized character or malformed literal
/// (for example an integer overflowing `i64`) and reports it as a syntax
/// error with its position.
pub fn lex(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let range = index.range(lexer.span());
        match result {
            Ok(token) => tokens.push(Spanned { token, range }),
            Err(()) => {
                return Err(ParseError::new(
                    format!("unrecognized token `{}`", lexer.slice().escape_default()),
                    range,
                ));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            kinds("var x fun sonOf Unborny"),
            vec![
                Token::Var,
                Token::Ident("x".to_owned()),
                Token::Fun,
                Token::SonOf,
                Token::Ident("Unborny".to_owned()),
            ]
        );
    }

    #[test]
    fn both_cibling_spellings() {
        assert_eq!(kinds("ciblingsOf"), vec![Token::CiblingsOf]);
        assert_eq!(kinds("siblingsOf"), vec![Token::CiblingsOf]);
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            kinds("12 3.5"),
            vec![Token::IntLiteral(12), Token::FloatLiteral(3.5)]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b""#),
            vec![Token::StringLiteral("a\n\"b".to_owned())]
        );
    }

    #[test]
    fn comments_are_skipped_newline_kept() {
        assert_eq!(
            kinds("1 // comment\n2"),
            vec![Token::IntLiteral(1), Token::Newline, Token::IntLiteral(2)]
        );
    }

    #[test]
    fn int_overflow_is_an_error() {
        let err = lex("99999999999999999999").unwrap_err();
        assert!(err.to_string().contains("unrecognized token"));
    }

    #[test]
    fn positions_are_one_indexed() {
        let tokens = lex("a\n  b").unwrap();
        assert_eq!(tokens[0].range.start, CodeLoc { line: 1, column: 1 });
        assert_eq!(tokens[2].range.start, CodeLoc { line: 2, column: 3 });
    }
}
