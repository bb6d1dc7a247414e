//! # ClickHouse Type Parser
//!
//! Parses the type expressions returned by `DESCRIBE TABLE` back into
//! [`ClickHouseType`] values.
//!
//! Input is first split into [`Token`]s by a `logos` lexer that understands
//! single-quoted strings with backslash escapes, quoted identifiers, numbers
//! and punctuation. The same token stream backs [`inner_spec`] and
//! [`split_top_level`], which the engine and reflection code use to take
//! apart `engine_full` and codec expressions.

use logos::Logos;
use tracing::warn;

use crate::errors::ParseError;
use crate::types::{ClickHouseFloat, ClickHouseInt, ClickHouseType, EnumBits, TupleElement};

// =========================================================
// Lexer
// =========================================================

/// Tokens of ClickHouse type expressions and engine definitions.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    /// Type, function, column or keyword name
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    /// `'value'`, backslash escapes allowed
    #[regex(r"'([^'\\]|\\.)*'")]
    StringLiteral,

    /// `` `name` `` or `"name"`
    #[regex(r"`[^`]*`")]
    #[regex(r#""([^"\\]|\\.)*""#)]
    QuotedIdentifier,

    #[regex(r"[0-9]+")]
    Number,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token(",")]
    Comma,

    #[token("=")]
    Equals,

    /// Any other run of punctuation: `-`, `+`, `.`, `{`, `>`, ...
    #[regex(r#"[^ \t\r\n\fa-zA-Z0-9_'`"()\[\],=]+"#)]
    Symbol,
}

/// A token with the slice of input it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub token: Token,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Tokenizes `input`. Whitespace is dropped; an unterminated quote is an error.
pub fn tokenize(input: &str) -> Result<Vec<Lexeme<'_>>, ParseError> {
    let mut lexer = Token::lexer(input);
    let mut lexemes = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => lexemes.push(Lexeme {
                token,
                text: lexer.slice(),
                start: span.start,
                end: span.end,
            }),
            Err(()) => {
                let rest = &input[span.start..];
                return Err(if rest.starts_with(['\'', '`', '"']) {
                    ParseError::UnterminatedString {
                        input: input.to_string(),
                    }
                } else {
                    ParseError::UnexpectedToken {
                        expected: "token".to_string(),
                        found: lexer.slice().to_string(),
                    }
                });
            }
        }
    }

    Ok(lexemes)
}

/// Index of the lexeme closing the group opened at `open`.
pub(crate) fn matching_close(lexemes: &[Lexeme], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, lexeme) in lexemes.iter().enumerate().skip(open) {
        match lexeme.token {
            Token::LeftParen | Token::LeftBracket => depth += 1,
            Token::RightParen | Token::RightBracket => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Returns the content between the first `(` of `text` and its matching `)`,
/// together with whatever follows the closing parenthesis.
pub fn inner_spec(text: &str) -> Result<(&str, &str), ParseError> {
    let lexemes = tokenize(text)?;
    let open = lexemes
        .iter()
        .position(|l| l.token == Token::LeftParen)
        .ok_or_else(|| ParseError::UnexpectedToken {
            expected: "'('".to_string(),
            found: text.to_string(),
        })?;
    let close = matching_close(&lexemes, open).ok_or_else(|| ParseError::UnbalancedParentheses {
        input: text.to_string(),
    })?;
    Ok((
        &text[lexemes[open].end..lexemes[close].start],
        &text[lexemes[close].end..],
    ))
}

/// Splits `text` at every comma outside parentheses, brackets and quotes.
/// Parts are trimmed; an empty input yields no parts.
pub fn split_top_level(text: &str) -> Result<Vec<&str>, ParseError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut part_start = 0;

    for lexeme in tokenize(text)? {
        match lexeme.token {
            Token::LeftParen | Token::LeftBracket => depth += 1,
            Token::RightParen | Token::RightBracket => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                parts.push(text[part_start..lexeme.start].trim());
                part_start = lexeme.end;
            }
            _ => {}
        }
    }
    parts.push(text[part_start..].trim());
    Ok(parts)
}

/// Resolves the backslash escapes of a [`Token::StringLiteral`] slice.
fn unescape(literal: &str) -> String {
    let body = &literal[1..literal.len() - 1];
    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => result.extend(chars.next()),
            c => result.push(c),
        }
    }
    result
}

/// Strips one level of single quotes and resolves backslash escapes.
pub fn unquote(text: &str) -> Result<String, ParseError> {
    match tokenize(text)?.as_slice() {
        [literal] if literal.token == Token::StringLiteral => Ok(unescape(literal.text)),
        _ => Err(ParseError::UnexpectedToken {
            expected: "quoted string".to_string(),
            found: text.trim().to_string(),
        }),
    }
}

// =========================================================
// Parser
// =========================================================

/// Parses a ClickHouse type expression.
///
/// Unknown family names degrade to [`ClickHouseType::NullType`] with a warning;
/// structural problems (unbalanced parentheses, bad parameters) are errors.
pub fn parse_clickhouse_type(input: &str) -> Result<ClickHouseType, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser::new(input, tokenize(input)?);
    let parsed = parser.parse_type()?;
    match parser.peek() {
        None => Ok(parsed),
        Some(lexeme) => Err(ParseError::TrailingInput {
            trailing: input[lexeme.start..].to_string(),
        }),
    }
}

struct Parser<'a> {
    input: &'a str,
    lexemes: Vec<Lexeme<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, lexemes: Vec<Lexeme<'a>>) -> Self {
        Self {
            input,
            lexemes,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<Lexeme<'a>> {
        self.lexemes.get(self.pos).copied()
    }

    fn peek_token(&self, offset: usize) -> Option<Token> {
        self.lexemes.get(self.pos + offset).map(|l| l.token)
    }

    fn advance(&mut self) -> Option<Lexeme<'a>> {
        let lexeme = self.peek()?;
        self.pos += 1;
        Some(lexeme)
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek_token(0) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<Lexeme<'a>, ParseError> {
        match self.advance() {
            Some(lexeme) if lexeme.token == token => Ok(lexeme),
            Some(lexeme) => Err(ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: lexeme.text.to_string(),
            }),
            None => Err(ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: "end of input".to_string(),
            }),
        }
    }

    fn expect_close(&mut self) -> Result<(), ParseError> {
        match self.advance() {
            Some(lexeme) if lexeme.token == Token::RightParen => Ok(()),
            Some(lexeme) => Err(ParseError::UnexpectedToken {
                expected: "')'".to_string(),
                found: lexeme.text.to_string(),
            }),
            None => Err(ParseError::UnbalancedParentheses {
                input: self.input.to_string(),
            }),
        }
    }

    fn parse_type(&mut self) -> Result<ClickHouseType, ParseError> {
        let name = self.expect(Token::Identifier, "type name")?;
        if self.peek_token(0) != Some(Token::LeftParen) {
            return Ok(parse_simple(name.text));
        }
        let open = self.pos;
        self.pos += 1;
        let parsed = self.parse_parameterized(name, open)?;
        self.expect_close()?;
        Ok(parsed)
    }

    fn parse_integer<T: std::str::FromStr>(&mut self, type_name: &str) -> Result<T, ParseError> {
        let lexeme = self.advance();
        lexeme
            .filter(|l| l.token == Token::Number)
            .and_then(|l| l.text.parse::<T>().ok())
            .ok_or_else(|| {
                invalid_parameter(
                    type_name,
                    format!(
                        "expected an integer, found '{}'",
                        lexeme.map_or("end of input", |l| l.text)
                    ),
                )
            })
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        Ok(unescape(self.expect(Token::StringLiteral, "quoted string")?.text))
    }

    fn parse_parameterized(
        &mut self,
        name: Lexeme<'a>,
        open: usize,
    ) -> Result<ClickHouseType, ParseError> {
        let type_name = name.text;
        match type_name {
            "Array" => Ok(ClickHouseType::Array(Box::new(self.parse_type()?))),
            "Nullable" => Ok(ClickHouseType::Nullable(Box::new(self.parse_type()?))),
            "LowCardinality" => Ok(ClickHouseType::LowCardinality(Box::new(self.parse_type()?))),
            "FixedString" => Ok(ClickHouseType::FixedString(self.parse_integer(type_name)?)),
            "Decimal" => {
                let precision = self.parse_integer(type_name)?;
                if !self.eat(Token::Comma) {
                    return Err(invalid_parameter(type_name, "expected precision and scale"));
                }
                Ok(ClickHouseType::Decimal {
                    precision,
                    scale: self.parse_integer(type_name)?,
                })
            }
            "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => {
                let precision = match type_name {
                    "Decimal32" => 9,
                    "Decimal64" => 18,
                    "Decimal128" => 38,
                    _ => 76,
                };
                Ok(ClickHouseType::Decimal {
                    precision,
                    scale: self.parse_integer(type_name)?,
                })
            }
            "DateTime" => Ok(ClickHouseType::DateTime {
                timezone: Some(self.parse_string()?),
            }),
            "DateTime64" => {
                let precision: u8 = self.parse_integer(type_name)?;
                if precision > 9 {
                    return Err(invalid_parameter(
                        type_name,
                        format!("precision {precision} is out of range 0-9"),
                    ));
                }
                let timezone = if self.eat(Token::Comma) {
                    Some(self.parse_string()?)
                } else {
                    None
                };
                Ok(ClickHouseType::DateTime64 {
                    precision,
                    timezone,
                })
            }
            "Enum8" => Ok(ClickHouseType::Enum {
                bits: EnumBits::Enum8,
                members: self.parse_enum_options(type_name)?,
            }),
            "Enum16" => Ok(ClickHouseType::Enum {
                bits: EnumBits::Enum16,
                members: self.parse_enum_options(type_name)?,
            }),
            "Tuple" => Ok(ClickHouseType::Tuple(self.parse_tuple_elements()?)),
            "Nested" => {
                let fields = self
                    .parse_tuple_elements()?
                    .into_iter()
                    .map(|element| match element {
                        TupleElement::Named { name, element_type } => Ok((name, element_type)),
                        TupleElement::Unnamed(element_type) => Err(ParseError::UnexpectedToken {
                            expected: "named field".to_string(),
                            found: element_type.to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ClickHouseType::Nested(fields))
            }
            "Map" => {
                let key_type = self.parse_type()?;
                if !self.eat(Token::Comma) {
                    return Err(invalid_parameter(type_name, "expected key and value types"));
                }
                Ok(ClickHouseType::Map {
                    key_type: Box::new(key_type),
                    value_type: Box::new(self.parse_type()?),
                })
            }
            "AggregateFunction" | "SimpleAggregateFunction" => {
                let function_name = self.parse_function_name(type_name)?;
                let mut argument_types = Vec::new();
                while self.eat(Token::Comma) {
                    argument_types.push(self.parse_type()?);
                }
                if type_name == "AggregateFunction" {
                    Ok(ClickHouseType::AggregateFunction {
                        function_name,
                        argument_types,
                    })
                } else {
                    Ok(ClickHouseType::SimpleAggregateFunction {
                        function_name,
                        argument_types,
                    })
                }
            }
            _ => {
                let close = matching_close(&self.lexemes, open).ok_or_else(|| {
                    ParseError::UnbalancedParentheses {
                        input: self.input.to_string(),
                    }
                })?;
                self.pos = close;
                Ok(unknown_type(&self.input[name.start..self.lexemes[close].end]))
            }
        }
    }

    /// A tuple element is `Type` or `name Type`.
    fn parse_tuple_elements(&mut self) -> Result<Vec<TupleElement>, ParseError> {
        let mut elements = Vec::new();
        if self.peek_token(0) == Some(Token::RightParen) {
            return Ok(elements);
        }
        loop {
            let named = self.peek_token(0) == Some(Token::Identifier)
                && self.peek_token(1) == Some(Token::Identifier);
            if named {
                let name = self.expect(Token::Identifier, "field name")?;
                elements.push(TupleElement::Named {
                    name: name.text.to_string(),
                    element_type: self.parse_type()?,
                });
            } else {
                elements.push(TupleElement::Unnamed(self.parse_type()?));
            }
            if !self.eat(Token::Comma) {
                return Ok(elements);
            }
        }
    }

    /// The aggregate function, verbatim, up to the first top-level comma.
    /// Parametric functions such as `quantiles(0.5, 0.9)` keep their parameters.
    fn parse_function_name(&mut self, type_name: &str) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(lexeme) = self.peek() {
            match lexeme.token {
                Token::Comma | Token::RightParen => break,
                Token::LeftParen | Token::LeftBracket => {
                    self.pos = matching_close(&self.lexemes, self.pos).ok_or_else(|| {
                        ParseError::UnbalancedParentheses {
                            input: self.input.to_string(),
                        }
                    })? + 1;
                }
                _ => self.pos += 1,
            }
        }
        if self.pos == start {
            return Err(invalid_parameter(type_name, "missing function name"));
        }
        Ok(self.input[self.lexemes[start].start..self.lexemes[self.pos - 1].end].to_string())
    }

    /// Parses `'label' = code, …` as found inside `Enum8(…)` / `Enum16(…)`.
    fn parse_enum_options(&mut self, type_name: &str) -> Result<Vec<(String, i16)>, ParseError> {
        let mut members = Vec::new();
        if self.peek_token(0) == Some(Token::RightParen) {
            return Ok(members);
        }
        loop {
            let label = unescape(self.expect(Token::StringLiteral, "quoted enum label")?.text);
            if !self.eat(Token::Equals) {
                return Err(invalid_parameter(
                    type_name,
                    format!("expected '=' after label '{label}'"),
                ));
            }

            let mut code = String::new();
            if let Some(sign) = self
                .peek()
                .filter(|l| l.token == Token::Symbol && matches!(l.text, "-" | "+"))
            {
                code.push_str(sign.text);
                self.pos += 1;
            }
            let digits = self.advance().filter(|l| l.token == Token::Number);
            code.push_str(digits.map_or("", |l| l.text));
            let code = code.parse::<i16>().map_err(|_| {
                invalid_parameter(
                    type_name,
                    format!("expected an integer code for label '{label}'"),
                )
            })?;
            members.push((label, code));

            if !self.eat(Token::Comma) {
                return Ok(members);
            }
        }
    }
}

fn parse_simple(name: &str) -> ClickHouseType {
    if let Some(int) = ClickHouseInt::from_name(name) {
        return ClickHouseType::Int(int);
    }
    match name {
        "Float32" => ClickHouseType::Float(ClickHouseFloat::Float32),
        "Float64" => ClickHouseType::Float(ClickHouseFloat::Float64),
        "Bool" | "Boolean" => ClickHouseType::Boolean,
        "Date" => ClickHouseType::Date,
        "Date32" => ClickHouseType::Date32,
        "DateTime" => ClickHouseType::DateTime { timezone: None },
        "String" => ClickHouseType::String,
        "UUID" => ClickHouseType::Uuid,
        "IPv4" => ClickHouseType::IPv4,
        "IPv6" => ClickHouseType::IPv6,
        _ => unknown_type(name),
    }
}

fn unknown_type(original: &str) -> ClickHouseType {
    warn!("Did not recognize type '{}'", original);
    ClickHouseType::NullType {
        original: original.to_string(),
    }
}

fn invalid_parameter(type_name: &str, message: impl Into<String>) -> ParseError {
    ParseError::InvalidParameter {
        type_name: type_name.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_spec() {
        assert_eq!(
            inner_spec("Array(Nullable(String))").unwrap(),
            ("Nullable(String)", "")
        );
        assert_eq!(inner_spec("(a, (b)) tail").unwrap(), ("a, (b)", " tail"));
        assert_eq!(inner_spec("Enum8('(' = 1)").unwrap(), ("'(' = 1", ""));
        assert!(matches!(
            inner_spec("Array(String"),
            Err(ParseError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(
            inner_spec("Enum8('a = 1)"),
            Err(ParseError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("Int32, Decimal(18, 2)").unwrap(),
            vec!["Int32", "Decimal(18, 2)"]
        );
        assert_eq!(
            split_top_level(r"'a, b' = 1, 'c\', d' = 2").unwrap(),
            vec!["'a, b' = 1", r"'c\', d' = 2"]
        );
        assert_eq!(
            split_top_level("[1, 2], f(x, y)").unwrap(),
            vec!["[1, 2]", "f(x, y)"]
        );
        assert_eq!(split_top_level("  ").unwrap(), Vec::<&str>::new());
        assert_eq!(split_top_level("x").unwrap(), vec!["x"]);
        assert!(matches!(
            split_top_level("'open, x"),
            Err(ParseError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<Token> = tokenize(r"Enum8('a\'b' = -1) `c d`")
            .unwrap()
            .iter()
            .map(|l| l.token)
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Identifier,
                Token::LeftParen,
                Token::StringLiteral,
                Token::Equals,
                Token::Symbol,
                Token::Number,
                Token::RightParen,
                Token::QuotedIdentifier,
            ]
        );

        let lexemes = tokenize("  Map( String )").unwrap();
        assert_eq!(lexemes[2].text, "String");
        assert_eq!((lexemes[2].start, lexemes[2].end), (7, 13));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r"'it\'s'").unwrap(), "it's");
        assert_eq!(unquote(" 'CSV' ").unwrap(), "CSV");
        assert!(unquote("CSV").is_err());
        assert!(unquote("'a' 'b'").is_err());
    }

    #[test]
    fn test_parse_simple_types() {
        assert_eq!(
            parse_clickhouse_type("Int32").unwrap(),
            ClickHouseType::Int(ClickHouseInt::Int32)
        );
        assert_eq!(
            parse_clickhouse_type("UInt256").unwrap(),
            ClickHouseType::Int(ClickHouseInt::UInt256)
        );
        assert_eq!(
            parse_clickhouse_type("Float64").unwrap(),
            ClickHouseType::Float(ClickHouseFloat::Float64)
        );
        assert_eq!(parse_clickhouse_type("UUID").unwrap(), ClickHouseType::Uuid);
        assert_eq!(parse_clickhouse_type("Bool").unwrap(), ClickHouseType::Boolean);
        assert_eq!(parse_clickhouse_type(" String ").unwrap(), ClickHouseType::String);
    }

    #[test]
    fn test_boolean_reads_back_as_uint8() {
        // Boolean columns are stored as UInt8, so DESCRIBE reports UInt8 and
        // reflection cannot recover the original Boolean.
        assert_eq!(ClickHouseType::Boolean.to_string(), "UInt8");
        assert_eq!(
            parse_clickhouse_type(&ClickHouseType::Boolean.to_string()).unwrap(),
            ClickHouseType::Int(ClickHouseInt::UInt8)
        );
    }

    #[test]
    fn test_parse_unknown_type_degrades() {
        assert_eq!(
            parse_clickhouse_type("Point").unwrap(),
            ClickHouseType::NullType {
                original: "Point".to_string()
            }
        );
        assert_eq!(
            parse_clickhouse_type("Variant(String, UInt8)").unwrap(),
            ClickHouseType::NullType {
                original: "Variant(String, UInt8)".to_string()
            }
        );
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(
            parse_clickhouse_type("Decimal(18, 2)").unwrap(),
            ClickHouseType::Decimal {
                precision: 18,
                scale: 2
            }
        );
        assert_eq!(
            parse_clickhouse_type("Decimal64(4)").unwrap(),
            ClickHouseType::Decimal {
                precision: 18,
                scale: 4
            }
        );
        assert!(parse_clickhouse_type("Decimal(18)").is_err());
    }

    #[test]
    fn test_parse_datetimes() {
        assert_eq!(
            parse_clickhouse_type("DateTime('Europe/Moscow')").unwrap(),
            ClickHouseType::DateTime {
                timezone: Some("Europe/Moscow".to_string())
            }
        );
        assert_eq!(
            parse_clickhouse_type("DateTime64(3)").unwrap(),
            ClickHouseType::DateTime64 {
                precision: 3,
                timezone: None
            }
        );
        assert_eq!(
            parse_clickhouse_type("DateTime64(4, 'Pacific/Honolulu')").unwrap(),
            ClickHouseType::DateTime64 {
                precision: 4,
                timezone: Some("Pacific/Honolulu".to_string())
            }
        );
        assert!(parse_clickhouse_type("DateTime64(12)").is_err());
    }

    #[test]
    fn test_parse_enum_with_special_labels() {
        let parsed = parse_clickhouse_type(r"Enum8(' \' t = ' = 1, 'comma, ' = -2)").unwrap();
        assert_eq!(
            parsed,
            ClickHouseType::Enum {
                bits: EnumBits::Enum8,
                members: vec![(" ' t = ".to_string(), 1), ("comma, ".to_string(), -2)],
            }
        );
    }

    #[test]
    fn test_parse_enum_errors() {
        assert!(parse_clickhouse_type("Enum8(a = 1)").is_err());
        assert!(parse_clickhouse_type("Enum8('a' 1)").is_err());
        assert!(parse_clickhouse_type("Enum8('a' = x)").is_err());
    }

    #[test]
    fn test_parse_containers() {
        assert_eq!(
            parse_clickhouse_type("Nullable(Array(LowCardinality(String)))").unwrap(),
            ClickHouseType::Nullable(Box::new(ClickHouseType::array(
                ClickHouseType::LowCardinality(Box::new(ClickHouseType::String))
            )))
        );
        assert_eq!(
            parse_clickhouse_type("Map(String, Array(UUID))").unwrap(),
            ClickHouseType::map(
                ClickHouseType::String,
                ClickHouseType::array(ClickHouseType::Uuid)
            )
        );
        assert_eq!(
            parse_clickhouse_type("Tuple(Int32, Decimal(18, 2))").unwrap(),
            ClickHouseType::Tuple(vec![
                TupleElement::Unnamed(ClickHouseType::Int(ClickHouseInt::Int32)),
                TupleElement::Unnamed(ClickHouseType::Decimal {
                    precision: 18,
                    scale: 2
                }),
            ])
        );
    }

    #[test]
    fn test_parse_named_tuple_and_nested() {
        assert_eq!(
            parse_clickhouse_type("Tuple(a String, b Nullable(Int64))").unwrap(),
            ClickHouseType::Tuple(vec![
                TupleElement::Named {
                    name: "a".to_string(),
                    element_type: ClickHouseType::String
                },
                TupleElement::Named {
                    name: "b".to_string(),
                    element_type: ClickHouseType::Nullable(Box::new(ClickHouseType::Int(
                        ClickHouseInt::Int64
                    )))
                },
            ])
        );
        assert_eq!(
            parse_clickhouse_type("Nested(key String, value UInt32)").unwrap(),
            ClickHouseType::Nested(vec![
                ("key".to_string(), ClickHouseType::String),
                ("value".to_string(), ClickHouseType::Int(ClickHouseInt::UInt32)),
            ])
        );
        assert!(parse_clickhouse_type("Nested(String)").is_err());
    }

    #[test]
    fn test_parse_aggregate_functions() {
        assert_eq!(
            parse_clickhouse_type("AggregateFunction(quantiles(0.5, 0.9), UInt64)").unwrap(),
            ClickHouseType::AggregateFunction {
                function_name: "quantiles(0.5, 0.9)".to_string(),
                argument_types: vec![ClickHouseType::Int(ClickHouseInt::UInt64)],
            }
        );
        assert_eq!(
            parse_clickhouse_type("SimpleAggregateFunction(anyLast, Nullable(String))").unwrap(),
            ClickHouseType::SimpleAggregateFunction {
                function_name: "anyLast".to_string(),
                argument_types: vec![ClickHouseType::Nullable(Box::new(ClickHouseType::String))],
            }
        );
        assert_eq!(
            parse_clickhouse_type("AggregateFunction(count)").unwrap(),
            ClickHouseType::AggregateFunction {
                function_name: "count".to_string(),
                argument_types: vec![],
            }
        );
    }

    #[test]
    fn test_error_handling() {
        assert_eq!(parse_clickhouse_type(""), Err(ParseError::Empty));
        assert!(matches!(
            parse_clickhouse_type("Array(String"),
            Err(ParseError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(
            parse_clickhouse_type("Array(String) extra"),
            Err(ParseError::TrailingInput { .. })
        ));
        assert!(matches!(
            parse_clickhouse_type("String extra"),
            Err(ParseError::TrailingInput { .. })
        ));
        assert!(matches!(
            parse_clickhouse_type("(String)"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(parse_clickhouse_type("FixedString(abc)").is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        // Boolean is left out: it renders as UInt8 and does not survive the
        // round trip (see test_boolean_reads_back_as_uint8).
        fn simple_type_strategy() -> impl Strategy<Value = ClickHouseType> {
            prop_oneof![
                prop::sample::select(ClickHouseInt::ALL.to_vec()).prop_map(ClickHouseType::Int),
                Just(ClickHouseType::Float(ClickHouseFloat::Float32)),
                Just(ClickHouseType::Float(ClickHouseFloat::Float64)),
                Just(ClickHouseType::String),
                Just(ClickHouseType::Uuid),
                Just(ClickHouseType::Date),
                Just(ClickHouseType::Date32),
                Just(ClickHouseType::IPv4),
                Just(ClickHouseType::IPv6),
                (1u64..256).prop_map(ClickHouseType::FixedString),
            ]
        }

        fn identifier_strategy() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_]{0,10}".prop_map(|s| s.to_string())
        }

        fn timezone_strategy() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("UTC".to_string()),
                Just("America/New_York".to_string()),
                Just("Pacific/Honolulu".to_string()),
                Just("Asia/Kolkata".to_string()),
            ]
        }

        fn enum_label_strategy() -> impl Strategy<Value = String> {
            prop_oneof![
                "[a-z ,='\\\\()]{0,12}".prop_map(|s| s.to_string()),
                Just(" ' t = ".to_string()),
                Just("comma, ".to_string()),
            ]
        }

        fn clickhouse_type_strategy(depth: u32) -> BoxedStrategy<ClickHouseType> {
            if depth == 0 {
                return simple_type_strategy().boxed();
            }
            prop_oneof![
                8 => simple_type_strategy(),
                3 => clickhouse_type_strategy(depth - 1)
                    .prop_map(|inner| ClickHouseType::Nullable(Box::new(inner))),
                3 => clickhouse_type_strategy(depth - 1).prop_map(ClickHouseType::array),
                1 => clickhouse_type_strategy(depth - 1)
                    .prop_map(|inner| ClickHouseType::LowCardinality(Box::new(inner))),
                1 => (1u8..38, 0u8..38)
                    .prop_filter("scale must be <= precision", |(p, s)| s <= p)
                    .prop_map(|(precision, scale)| ClickHouseType::Decimal { precision, scale }),
                1 => prop::option::of(timezone_strategy())
                    .prop_map(|timezone| ClickHouseType::DateTime { timezone }),
                1 => (0u8..=9, prop::option::of(timezone_strategy()))
                    .prop_map(|(precision, timezone)| ClickHouseType::DateTime64 {
                        precision,
                        timezone,
                    }),
                1 => (
                    prop_oneof![Just(EnumBits::Enum8), Just(EnumBits::Enum16)],
                    prop::collection::vec((enum_label_strategy(), -128i16..127), 1..4),
                )
                    .prop_map(|(bits, members)| ClickHouseType::Enum { bits, members }),
                1 => prop::collection::vec(
                    prop_oneof![
                        clickhouse_type_strategy(depth - 1).prop_map(TupleElement::Unnamed),
                        (identifier_strategy(), clickhouse_type_strategy(depth - 1)).prop_map(
                            |(name, element_type)| TupleElement::Named { name, element_type }
                        ),
                    ],
                    1..4,
                )
                .prop_map(ClickHouseType::Tuple),
                1 => prop::collection::vec(
                    (identifier_strategy(), clickhouse_type_strategy(depth - 1)),
                    1..4,
                )
                .prop_map(ClickHouseType::Nested),
                1 => (
                    clickhouse_type_strategy(depth - 1),
                    clickhouse_type_strategy(depth - 1),
                )
                    .prop_map(|(k, v)| ClickHouseType::map(k, v)),
                1 => (
                    prop_oneof![
                        identifier_strategy(),
                        Just("quantiles(0.5, 0.9)".to_string()),
                    ],
                    prop::collection::vec(clickhouse_type_strategy(depth - 1), 0..3),
                )
                    .prop_map(|(function_name, argument_types)| {
                        ClickHouseType::AggregateFunction {
                            function_name,
                            argument_types,
                        }
                    }),
                1 => (identifier_strategy(), clickhouse_type_strategy(depth - 1)).prop_map(
                    |(function_name, arg)| ClickHouseType::SimpleAggregateFunction {
                        function_name,
                        argument_types: vec![arg],
                    }
                ),
            ]
            .boxed()
        }

        proptest! {
            /// parse(render(type)) == type
            #[test]
            fn test_roundtrip_property(node in clickhouse_type_strategy(3)) {
                let rendered = node.to_string();
                let parsed = parse_clickhouse_type(&rendered);
                prop_assert!(
                    parsed.is_ok(),
                    "Failed to parse rendered type '{}': {:?}",
                    rendered,
                    parsed.err()
                );
                prop_assert_eq!(parsed.unwrap(), node, "Roundtrip failed for '{}'", rendered);
            }

            #[test]
            fn test_parse_never_panics(s in "\\PC{0,200}") {
                let _ = parse_clickhouse_type(&s);
            }
        }
    }
}
