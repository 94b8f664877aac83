//! # Lexer
//!
//! Converts a byte stream into a finite token sequence with precise source
//! locations (spec.md §4.1). Whitespace and comments are discarded. The first
//! lexical error aborts the translation unit — there is no error recovery.

use crate::ast::token::{SourceLocation, Token, TokenKind};
use crate::ast::types::Type;
use crate::compiler::error::CompileError;

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek2(&self) -> Option<char> {
        let mut clone = self.chars.clone();
        clone.next();
        clone.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    let start = self.loc();
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(c) = self.peek() {
                        if c == '*' && self.peek2() == Some('/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        return Err(CompileError::lexical(start, "unterminated block comment"));
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_escape(&mut self) -> Result<char, CompileError> {
        let loc = self.loc();
        let c = self
            .advance()
            .ok_or_else(|| CompileError::lexical(loc, "unterminated escape sequence"))?;
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            '0' => '\0',
            'x' => {
                let mut value: u32 = 0;
                for _ in 0..2 {
                    let hex_loc = self.loc();
                    let hc = self
                        .advance()
                        .ok_or_else(|| CompileError::lexical(hex_loc, "truncated \\x escape"))?;
                    let digit = hc.to_digit(16).ok_or_else(|| {
                        CompileError::lexical(hex_loc, format!("invalid hex digit `{}`", hc))
                    })?;
                    value = value * 16 + digit;
                }
                value as u8 as char
            }
            other => {
                return Err(CompileError::lexical(
                    loc,
                    format!("unknown escape sequence `\\{}`", other),
                ));
            }
        })
    }

    fn read_string(&mut self) -> Result<String, CompileError> {
        let mut s = String::new();
        loop {
            let loc = self.loc();
            match self.advance() {
                None | Some('\n') => {
                    return Err(CompileError::lexical(loc, "unterminated string literal"));
                }
                Some('"') => break,
                Some('\\') => s.push(self.read_escape()?),
                Some(c) => s.push(c),
            }
        }
        Ok(s)
    }

    fn read_char(&mut self) -> Result<char, CompileError> {
        let loc = self.loc();
        let c = match self.advance() {
            Some('\\') => self.read_escape()?,
            Some(c) => c,
            None => return Err(CompileError::lexical(loc, "unterminated character literal")),
        };
        match self.advance() {
            Some('\'') => Ok(c),
            _ => Err(CompileError::lexical(
                loc,
                "character literal must contain exactly one character",
            )),
        }
    }

    fn read_number(&mut self) -> Result<TokenKind, CompileError> {
        let start_loc = self.loc();
        let mut text = String::new();

        if self.peek() == Some('0') && matches!(self.peek2(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() || c == '_' {
                    if c != '_' {
                        digits.push(c);
                    }
                    self.advance();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                return Err(CompileError::lexical(start_loc, "empty hex literal"));
            }
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| CompileError::lexical(start_loc, "hex literal out of range"))?;
            return Ok(TokenKind::IntegerLiteral(value));
        }

        if self.peek() == Some('0') && matches!(self.peek2(), Some('b') | Some('B')) {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c == '0' || c == '1' || c == '_' {
                    if c != '_' {
                        digits.push(c);
                    }
                    self.advance();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                return Err(CompileError::lexical(start_loc, "empty binary literal"));
            }
            let value = i64::from_str_radix(&digits, 2)
                .map_err(|_| CompileError::lexical(start_loc, "binary literal out of range"))?;
            return Ok(TokenKind::IntegerLiteral(value));
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    if c != '_' {
                        text.push(c);
                    }
                    self.advance();
                } else {
                    break;
                }
            }
            let value: f64 = text
                .parse()
                .map_err(|_| CompileError::lexical(start_loc, format!("malformed float `{}`", text)))?;
            // Scale ×1000 into a fixed-point i64 representation (spec.md §4.1).
            let scaled = (value * 1000.0).round() as i64;
            return Ok(TokenKind::FloatLiteral(scaled));
        }

        let value: i64 = text
            .parse()
            .map_err(|_| CompileError::lexical(start_loc, format!("malformed integer `{}`", text)))?;
        Ok(TokenKind::IntegerLiteral(value))
    }

    fn read_identifier(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn keyword_or_identifier(ident: String) -> TokenKind {
        if let Some(ty) = Type::from_name(&ident) {
            return TokenKind::PrimitiveType(ty);
        }
        match ident.as_str() {
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "fn" => TokenKind::Fn,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "import" => TokenKind::Import,
            "as" => TokenKind::As,
            "from" => TokenKind::From,
            "true" => TokenKind::BoolLiteral(true),
            "false" => TokenKind::BoolLiteral(false),
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier(ident),
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_whitespace_and_comments()?;
        let loc = self.loc();

        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, "", loc));
        };

        macro_rules! single {
            ($kind:expr, $lexeme:expr) => {{
                self.advance();
                Ok(Token::new($kind, $lexeme, loc))
            }};
        }

        macro_rules! one_or_two {
            ($second:expr, $two_kind:expr, $two_lexeme:expr, $one_kind:expr, $one_lexeme:expr) => {{
                self.advance();
                if self.peek() == Some($second) {
                    self.advance();
                    Ok(Token::new($two_kind, $two_lexeme, loc))
                } else {
                    Ok(Token::new($one_kind, $one_lexeme, loc))
                }
            }};
        }

        match c {
            '"' => {
                self.advance();
                let s = self.read_string()?;
                Ok(Token::new(TokenKind::StringLiteral(s.clone()), s, loc))
            }
            '\'' => {
                self.advance();
                let ch = self.read_char()?;
                Ok(Token::new(TokenKind::CharLiteral(ch), ch.to_string(), loc))
            }
            '0'..='9' => {
                let kind = self.read_number()?;
                Ok(Token::new(kind, "", loc))
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                let kind = Self::keyword_or_identifier(ident.clone());
                Ok(Token::new(kind, ident, loc))
            }
            '+' => one_or_two!('=', TokenKind::PlusEq, "+=", TokenKind::Plus, "+"),
            '-' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::MinusEq, "-=", loc))
                } else if self.peek() == Some('>') {
                    self.advance();
                    Ok(Token::new(TokenKind::Arrow, "->", loc))
                } else {
                    Ok(Token::new(TokenKind::Minus, "-", loc))
                }
            }
            '*' => {
                self.advance();
                if self.peek() == Some('*') {
                    self.advance();
                    Ok(Token::new(TokenKind::StarStar, "**", loc))
                } else if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::StarEq, "*=", loc))
                } else {
                    Ok(Token::new(TokenKind::Star, "*", loc))
                }
            }
            '/' => one_or_two!('=', TokenKind::SlashEq, "/=", TokenKind::Slash, "/"),
            '%' => one_or_two!('=', TokenKind::PercentEq, "%=", TokenKind::Percent, "%"),
            '^' => single!(TokenKind::Caret, "^"),
            '~' => single!(TokenKind::Tilde, "~"),
            '&' => one_or_two!('&', TokenKind::AmpAmp, "&&", TokenKind::Ampersand, "&"),
            '|' => one_or_two!('|', TokenKind::PipePipe, "||", TokenKind::Pipe, "|"),
            '=' => one_or_two!('=', TokenKind::EqEq, "==", TokenKind::Eq, "="),
            '!' => one_or_two!('=', TokenKind::BangEq, "!=", TokenKind::Bang, "!"),
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::LtEq, "<=", loc))
                } else if self.peek() == Some('<') {
                    self.advance();
                    Ok(Token::new(TokenKind::Shl, "<<", loc))
                } else {
                    Ok(Token::new(TokenKind::Lt, "<", loc))
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::new(TokenKind::GtEq, ">=", loc))
                } else if self.peek() == Some('>') {
                    self.advance();
                    Ok(Token::new(TokenKind::Shr, ">>", loc))
                } else {
                    Ok(Token::new(TokenKind::Gt, ">", loc))
                }
            }
            '(' => single!(TokenKind::LParen, "("),
            ')' => single!(TokenKind::RParen, ")"),
            '{' => single!(TokenKind::LBrace, "{"),
            '}' => single!(TokenKind::RBrace, "}"),
            '[' => single!(TokenKind::LBracket, "["),
            ']' => single!(TokenKind::RBracket, "]"),
            ',' => single!(TokenKind::Comma, ","),
            ':' => single!(TokenKind::Colon, ":"),
            ';' => single!(TokenKind::Semicolon, ";"),
            '.' => single!(TokenKind::Dot, "."),
            other => Err(CompileError::lexical(
                loc,
                format!("unexpected byte `{}`", other),
            )),
        }
    }
}

/// Tokenizes Anvil source text. Aborts on the first lexical error
/// (spec.md §4.1): there is no recovery across a bad token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_decimal_hex_and_binary_integers() {
        assert_eq!(
            kinds("10 0x1A 0b101"),
            vec![
                TokenKind::IntegerLiteral(10),
                TokenKind::IntegerLiteral(26),
                TokenKind::IntegerLiteral(5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scales_float_literals_by_1000() {
        assert_eq!(
            kinds("3.14"),
            vec![TokenKind::FloatLiteral(3140), TokenKind::Eof]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        let toks = tokenize(r#""a\nb""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::StringLiteral("a\nb".to_string()));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(tokenize("\"abc").is_err());
    }

    #[test]
    fn skips_line_and_block_comments() {
        assert_eq!(
            kinds("// hi\n1 /* block\nspan */ 2"),
            vec![
                TokenKind::IntegerLiteral(1),
                TokenKind::IntegerLiteral(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let toks = tokenize("x\ny").unwrap();
        assert_eq!(toks[0].location, SourceLocation::new(1, 1));
        assert_eq!(toks[1].location, SourceLocation::new(2, 1));
    }

    #[test]
    fn primitive_type_names_are_not_identifiers() {
        assert_eq!(
            kinds("Int64"),
            vec![TokenKind::PrimitiveType(Type::Int64), TokenKind::Eof]
        );
    }
}
