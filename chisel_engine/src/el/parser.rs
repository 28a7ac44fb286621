// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use super::expression::{BinaryOp, ExpressionNode, UnaryOp};
use super::value::{FileLocation, Value};

/// Token types are single bits so that parse errors can report the whole
/// set of acceptable tokens as a mask.
pub mod token {
    pub type Type = u64;

    pub const NAME: Type = 1 << 1;
    pub const STRING: Type = 1 << 2;
    pub const NUMBER: Type = 1 << 3;
    pub const BOOLEAN: Type = 1 << 4;
    pub const O_BRACKET: Type = 1 << 5;
    pub const C_BRACKET: Type = 1 << 6;
    pub const O_BRACE: Type = 1 << 7;
    pub const C_BRACE: Type = 1 << 8;
    pub const O_PAREN: Type = 1 << 9;
    pub const C_PAREN: Type = 1 << 10;
    pub const ADDITION: Type = 1 << 11;
    pub const SUBTRACTION: Type = 1 << 12;
    pub const MULTIPLICATION: Type = 1 << 13;
    pub const DIVISION: Type = 1 << 14;
    pub const MODULUS: Type = 1 << 15;
    pub const COLON: Type = 1 << 16;
    pub const COMMA: Type = 1 << 17;
    pub const RANGE: Type = 1 << 18;
    pub const LOGICAL_NEGATION: Type = 1 << 19;
    pub const LOGICAL_AND: Type = 1 << 20;
    pub const LOGICAL_OR: Type = 1 << 21;
    pub const LESS: Type = 1 << 22;
    pub const LESS_OR_EQUAL: Type = 1 << 23;
    pub const EQUAL: Type = 1 << 24;
    pub const NOT_EQUAL: Type = 1 << 25;
    pub const GREATER_OR_EQUAL: Type = 1 << 26;
    pub const GREATER: Type = 1 << 27;
    pub const CASE: Type = 1 << 28;
    pub const BITWISE_NEGATION: Type = 1 << 29;
    pub const BITWISE_AND: Type = 1 << 30;
    pub const BITWISE_XOR: Type = 1 << 31;
    pub const BITWISE_OR: Type = 1 << 32;
    pub const BITWISE_SHIFT_LEFT: Type = 1 << 33;
    pub const BITWISE_SHIFT_RIGHT: Type = 1 << 34;
    pub const DOUBLE_O_BRACE: Type = 1 << 35;
    pub const DOUBLE_C_BRACE: Type = 1 << 36;
    pub const NULL: Type = 1 << 37;
    pub const EOF: Type = 1 << 38;

    pub const LITERAL: Type = STRING | NUMBER | BOOLEAN | NULL;
    pub const UNARY_OPERATOR: Type =
        ADDITION | SUBTRACTION | LOGICAL_NEGATION | BITWISE_NEGATION;
    pub const SIMPLE_TERM: Type =
        NAME | LITERAL | O_PAREN | O_BRACKET | O_BRACE | UNARY_OPERATOR;
    pub const COMPOUND_TERM: Type = ADDITION
        | SUBTRACTION
        | MULTIPLICATION
        | DIVISION
        | MODULUS
        | LOGICAL_AND
        | LOGICAL_OR
        | LESS
        | LESS_OR_EQUAL
        | EQUAL
        | NOT_EQUAL
        | GREATER_OR_EQUAL
        | GREATER
        | CASE
        | BITWISE_AND
        | BITWISE_XOR
        | BITWISE_OR
        | BITWISE_SHIFT_LEFT
        | BITWISE_SHIFT_RIGHT;

    /// Human readable description of a token mask.
    pub fn describe(mask: Type) -> String {
        const NAMES: &[(Type, &str)] = &[
            (NAME, "variable"),
            (STRING, "string"),
            (NUMBER, "number"),
            (BOOLEAN, "boolean"),
            (NULL, "'null'"),
            (O_BRACKET, "'['"),
            (C_BRACKET, "']'"),
            (O_BRACE, "'{'"),
            (C_BRACE, "'}'"),
            (O_PAREN, "'('"),
            (C_PAREN, "')'"),
            (ADDITION, "'+'"),
            (SUBTRACTION, "'-'"),
            (MULTIPLICATION, "'*'"),
            (DIVISION, "'/'"),
            (MODULUS, "'%'"),
            (COLON, "':'"),
            (COMMA, "','"),
            (RANGE, "'..'"),
            (LOGICAL_NEGATION, "'!'"),
            (LOGICAL_AND, "'&&'"),
            (LOGICAL_OR, "'||'"),
            (LESS, "'<'"),
            (LESS_OR_EQUAL, "'<='"),
            (EQUAL, "'=='"),
            (NOT_EQUAL, "'!='"),
            (GREATER_OR_EQUAL, "'>='"),
            (GREATER, "'>'"),
            (CASE, "'->'"),
            (BITWISE_NEGATION, "'~'"),
            (BITWISE_AND, "'&'"),
            (BITWISE_XOR, "'^'"),
            (BITWISE_OR, "'|'"),
            (BITWISE_SHIFT_LEFT, "'<<'"),
            (BITWISE_SHIFT_RIGHT, "'>>'"),
            (DOUBLE_O_BRACE, "'{{'"),
            (DOUBLE_C_BRACE, "'}}'"),
            (EOF, "end of input"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| mask & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        names.join(" or ")
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    kind: token::Type,
    /// For strings this holds the unescaped content; for everything else
    /// the raw token text.
    text: String,
    location: FileLocation,
}

impl Token {
    pub fn kind(&self) -> token::Type {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn location(&self) -> FileLocation {
        self.location
    }

    pub fn has_type(&self, mask: token::Type) -> bool {
        self.kind & mask != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected} but got '{actual}' at {location}")]
    UnexpectedToken {
        expected_mask: token::Type,
        expected: String,
        actual: String,
        location: FileLocation,
    },
    #[error("unterminated string at {location}")]
    UnterminatedString { location: FileLocation },
    #[error("unexpected character '{character}' at {location}")]
    UnknownCharacter {
        character: char,
        location: FileLocation,
    },
}

/* ============= */
/*   Tokenizer   */
/* ============= */

mod lex {
    use nom::branch::alt;
    use nom::bytes::complete::{tag, take_while, take_while1};
    use nom::character::complete::{char, digit1};
    use nom::combinator::{opt, recognize};
    use nom::sequence::pair;
    use nom::IResult;

    /// Identifiers are letters, digits and underscores and may not lead
    /// with a digit.
    pub fn identifier(input: &str) -> IResult<&str, &str> {
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        ))(input)
    }

    /// Decimal numbers. `1..3` backtracks to the integer `1` because the
    /// fraction requires a digit after the dot.
    pub fn number(input: &str) -> IResult<&str, &str> {
        recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
    }

    /// Multi-character operators, longest first.
    pub fn operator(input: &str) -> IResult<&str, &str> {
        alt((
            tag("{{"),
            tag("}}"),
            tag("&&"),
            tag("||"),
            tag("<<"),
            tag(">>"),
            tag("<="),
            tag(">="),
            tag("=="),
            tag("!="),
            tag("->"),
            tag(".."),
        ))(input)
    }
}

struct Tokenizer<'a> {
    rest: &'a str,
    line: usize,
    column: usize,
    peeked: Option<Token>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            rest: input,
            line: 1,
            column: 1,
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lex(),
        }
    }

    fn advance(&mut self, consumed: usize) {
        let (eaten, rest) = self.rest.split_at(consumed);
        for c in eaten.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.rest = rest;
    }

    fn location(&self) -> FileLocation {
        FileLocation::new(self.line, self.column)
    }

    fn skip_trivia(&mut self) {
        loop {
            let trimmed = self.rest.trim_start_matches([' ', '\t', '\r', '\n']);
            self.advance(self.rest.len() - trimmed.len());
            if self.rest.starts_with("//") {
                let end = self.rest.find('\n').unwrap_or(self.rest.len());
                self.advance(end);
            } else {
                return;
            }
        }
    }

    fn lex(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia();
        let location = self.location();

        let mut chars = self.rest.chars();
        let c = match chars.next() {
            None => {
                return Ok(Token {
                    kind: token::EOF,
                    text: String::new(),
                    location,
                })
            }
            Some(c) => c,
        };

        // Multi-character operators take precedence over their prefixes.
        if let Ok((_, text)) = lex::operator(self.rest) {
            let kind = match text {
                "{{" => token::DOUBLE_O_BRACE,
                "}}" => token::DOUBLE_C_BRACE,
                "&&" => token::LOGICAL_AND,
                "||" => token::LOGICAL_OR,
                "<<" => token::BITWISE_SHIFT_LEFT,
                ">>" => token::BITWISE_SHIFT_RIGHT,
                "<=" => token::LESS_OR_EQUAL,
                ">=" => token::GREATER_OR_EQUAL,
                "==" => token::EQUAL,
                "!=" => token::NOT_EQUAL,
                "->" => token::CASE,
                ".." => token::RANGE,
                _ => unreachable!(),
            };
            let text = text.to_owned();
            self.advance(text.len());
            return Ok(Token {
                kind,
                text,
                location,
            });
        }

        let single = match c {
            '[' => Some(token::O_BRACKET),
            ']' => Some(token::C_BRACKET),
            '{' => Some(token::O_BRACE),
            '}' => Some(token::C_BRACE),
            '(' => Some(token::O_PAREN),
            ')' => Some(token::C_PAREN),
            '+' => Some(token::ADDITION),
            '-' => Some(token::SUBTRACTION),
            '*' => Some(token::MULTIPLICATION),
            '/' => Some(token::DIVISION),
            '%' => Some(token::MODULUS),
            ':' => Some(token::COLON),
            ',' => Some(token::COMMA),
            '!' => Some(token::LOGICAL_NEGATION),
            '~' => Some(token::BITWISE_NEGATION),
            '&' => Some(token::BITWISE_AND),
            '|' => Some(token::BITWISE_OR),
            '^' => Some(token::BITWISE_XOR),
            '<' => Some(token::LESS),
            '>' => Some(token::GREATER),
            _ => None,
        };
        if let Some(kind) = single {
            self.advance(c.len_utf8());
            return Ok(Token {
                kind,
                text: c.to_string(),
                location,
            });
        }

        if c == '\'' || c == '"' {
            return self.lex_string(c, location);
        }

        if c.is_ascii_digit() {
            return self.lex_number(location);
        }

        if let Ok((_, text)) = lex::identifier(self.rest) {
            let kind = match text {
                "true" | "false" => token::BOOLEAN,
                "null" => token::NULL,
                _ => token::NAME,
            };
            let text = text.to_owned();
            self.advance(text.len());
            return Ok(Token {
                kind,
                text,
                location,
            });
        }

        Err(ParseError::UnknownCharacter {
            character: c,
            location,
        })
    }

    fn lex_number(&mut self, location: FileLocation) -> Result<Token, ParseError> {
        let (rest, text) = lex::number(self.rest).expect("leading digit was checked");

        // A second dot that does not start a range, or a letter glued to
        // the number, cannot begin any token.
        let mut lookahead = rest.chars();
        if let Some(next) = lookahead.next() {
            let bad_dot = next == '.' && lookahead.next() != Some('.');
            if bad_dot || next.is_alphabetic() || next == '_' {
                let mut error_location = location;
                error_location.column += text.chars().count();
                return Err(ParseError::UnknownCharacter {
                    character: next,
                    location: error_location,
                });
            }
        }

        let text = text.to_owned();
        self.advance(text.len());
        Ok(Token {
            kind: token::NUMBER,
            text,
            location,
        })
    }

    fn lex_string(
        &mut self,
        delimiter: char,
        location: FileLocation,
    ) -> Result<Token, ParseError> {
        let mut text = String::new();
        let mut consumed = delimiter.len_utf8();
        let mut chars = self.rest[consumed..].chars();

        loop {
            let c = match chars.next() {
                None => return Err(ParseError::UnterminatedString { location }),
                Some(c) => c,
            };
            consumed += c.len_utf8();
            if c == delimiter {
                break;
            }
            if c == '\\' {
                // Only the delimiter and the backslash itself are escaped;
                // any other sequence is kept verbatim.
                match chars.clone().next() {
                    Some(escaped) if escaped == delimiter || escaped == '\\' => {
                        chars.next();
                        consumed += escaped.len_utf8();
                        text.push(escaped);
                    }
                    _ => text.push('\\'),
                }
            } else {
                text.push(c);
            }
        }

        self.advance(consumed);
        Ok(Token {
            kind: token::STRING,
            text,
            location,
        })
    }
}

/* ========== */
/*   Parser   */
/* ========== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Requires end of input after the top level expression.
    Strict,
    /// Ignores trailing input; used for inline expressions embedded in
    /// mixed-content strings.
    Lenient,
}

pub struct ElParser<'a> {
    mode: ParseMode,
    tokenizer: Tokenizer<'a>,
}

type Result_<T> = std::result::Result<T, ParseError>;

impl<'a> ElParser<'a> {
    pub fn new(mode: ParseMode, input: &'a str) -> Self {
        Self {
            mode,
            tokenizer: Tokenizer::new(input),
        }
    }

    pub fn parse_strict(input: &str) -> Result_<ExpressionNode> {
        ElParser::new(ParseMode::Strict, input).parse()
    }

    pub fn parse_lenient(input: &str) -> Result_<ExpressionNode> {
        ElParser::new(ParseMode::Lenient, input).parse()
    }

    pub fn parse(&mut self) -> Result_<ExpressionNode> {
        let result = self.parse_expression()?;
        if self.mode == ParseMode::Strict {
            let token = self.tokenizer.peek()?.clone();
            expect(token::EOF, &token)?;
        }
        Ok(result)
    }

    fn parse_expression(&mut self) -> Result_<ExpressionNode> {
        if self.tokenizer.peek()?.has_type(token::O_PAREN) {
            self.parse_grouped_term()
        } else {
            self.parse_term()
        }
    }

    fn parse_grouped_term(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.next()?;
        expect(token::O_PAREN, &token)?;
        let expression = self.parse_term()?;
        let closing = self.tokenizer.next()?;
        expect(token::C_PAREN, &closing)?;

        let lhs = ExpressionNode::unary(UnaryOp::Group, expression, Some(token.location()));
        if self.tokenizer.peek()?.has_type(token::COMPOUND_TERM) {
            self.parse_compound_term(lhs)
        } else {
            Ok(lhs)
        }
    }

    fn parse_term(&mut self) -> Result_<ExpressionNode> {
        expect(
            token::SIMPLE_TERM | token::DOUBLE_O_BRACE,
            self.tokenizer.peek()?,
        )?;

        let lhs = self.parse_simple_term_or_switch()?;
        if self.tokenizer.peek()?.has_type(token::COMPOUND_TERM) {
            self.parse_compound_term(lhs)
        } else {
            Ok(lhs)
        }
    }

    fn parse_simple_term_or_switch(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.peek()?;
        expect(token::SIMPLE_TERM | token::DOUBLE_O_BRACE, token)?;

        if token.has_type(token::SIMPLE_TERM) {
            self.parse_simple_term_or_subscript()
        } else {
            self.parse_switch()
        }
    }

    fn parse_simple_term_or_subscript(&mut self) -> Result_<ExpressionNode> {
        let mut term = self.parse_simple_term()?;
        while self.tokenizer.peek()?.has_type(token::O_BRACKET) {
            term = self.parse_subscript(term)?;
        }
        Ok(term)
    }

    fn parse_simple_term(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.peek()?;
        expect(token::SIMPLE_TERM, token)?;

        if token.has_type(token::UNARY_OPERATOR) {
            self.parse_unary_operator()
        } else if token.has_type(token::O_PAREN) {
            self.parse_grouped_term()
        } else if token.has_type(token::NAME) {
            self.parse_variable()
        } else {
            self.parse_literal()
        }
    }

    fn parse_subscript(&mut self, lhs: ExpressionNode) -> Result_<ExpressionNode> {
        let token = self.tokenizer.next()?;
        let location = Some(token.location());
        expect(token::O_BRACKET, &token)?;

        let mut elements = Vec::new();
        if !self.tokenizer.peek()?.has_type(token::C_BRACKET) {
            loop {
                elements.push(self.parse_expression_or_any_range()?);
                let separator = self.tokenizer.next()?;
                expect(token::COMMA | token::C_BRACKET, &separator)?;
                if separator.has_type(token::C_BRACKET) {
                    break;
                }
            }
        } else {
            self.tokenizer.next()?;
        }

        let rhs = if elements.len() == 1 {
            elements.pop().unwrap()
        } else {
            ExpressionNode::array(elements, location)
        };
        Ok(ExpressionNode::subscript(lhs, rhs, location))
    }

    fn parse_variable(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.next()?;
        expect(token::NAME, &token)?;
        Ok(ExpressionNode::variable(
            token.text(),
            Some(token.location()),
        ))
    }

    fn parse_literal(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.peek()?.clone();
        expect(
            token::LITERAL | token::O_BRACKET | token::O_BRACE,
            &token,
        )?;

        if token.has_type(token::STRING) {
            self.tokenizer.next()?;
            return Ok(ExpressionNode::literal(
                Value::from(token.text()),
                Some(token.location()),
            ));
        }
        if token.has_type(token::NUMBER) {
            self.tokenizer.next()?;
            let number: f64 = token.text().parse().expect("lexed number must parse");
            return Ok(ExpressionNode::literal(
                Value::from(number),
                Some(token.location()),
            ));
        }
        if token.has_type(token::BOOLEAN) {
            self.tokenizer.next()?;
            return Ok(ExpressionNode::literal(
                Value::from(token.text() == "true"),
                Some(token.location()),
            ));
        }
        if token.has_type(token::NULL) {
            self.tokenizer.next()?;
            return Ok(ExpressionNode::literal(
                Value::null(),
                Some(token.location()),
            ));
        }

        if token.has_type(token::O_BRACKET) {
            self.parse_array()
        } else {
            self.parse_map()
        }
    }

    fn parse_array(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.next()?;
        let location = Some(token.location());
        expect(token::O_BRACKET, &token)?;

        let mut elements = Vec::new();
        if !self.tokenizer.peek()?.has_type(token::C_BRACKET) {
            loop {
                elements.push(self.parse_expression_or_range()?);
                let separator = self.tokenizer.next()?;
                expect(token::COMMA | token::C_BRACKET, &separator)?;
                if separator.has_type(token::C_BRACKET) {
                    break;
                }
            }
        } else {
            self.tokenizer.next()?;
        }

        Ok(ExpressionNode::array(elements, location))
    }

    fn parse_expression_or_range(&mut self) -> Result_<ExpressionNode> {
        let mut expression = self.parse_expression()?;
        if self.tokenizer.peek()?.has_type(token::RANGE) {
            let token = self.tokenizer.next()?;
            expression = ExpressionNode::binary(
                BinaryOp::Range,
                expression,
                self.parse_expression()?,
                Some(token.location()),
            );
        }
        Ok(expression)
    }

    /// Subscript items may leave either endpoint of a range open: `..b`,
    /// `a..` and `..` expand with the auto range parameter.
    fn parse_expression_or_any_range(&mut self) -> Result_<ExpressionNode> {
        if self.tokenizer.peek()?.has_type(token::RANGE) {
            let token = self.tokenizer.next()?;
            let location = Some(token.location());
            if self.tokenizer.peek()?.has_type(token::SIMPLE_TERM) {
                return Ok(ExpressionNode::auto_range_with_right_operand(
                    self.parse_expression()?,
                    location,
                ));
            }
            // A bare `..` selects everything.
            return Ok(ExpressionNode::binary(
                BinaryOp::Range,
                ExpressionNode::literal(Value::from(0.0), location),
                ExpressionNode::variable(super::expression::AUTO_RANGE_PARAMETER, location),
                location,
            ));
        }

        let expression = self.parse_expression()?;
        if self.tokenizer.peek()?.has_type(token::RANGE) {
            let token = self.tokenizer.next()?;
            let location = Some(token.location());
            if self.tokenizer.peek()?.has_type(token::SIMPLE_TERM) {
                return Ok(ExpressionNode::binary(
                    BinaryOp::Range,
                    expression,
                    self.parse_expression()?,
                    location,
                ));
            }
            return Ok(ExpressionNode::auto_range_with_left_operand(
                expression, location,
            ));
        }
        Ok(expression)
    }

    fn parse_map(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.next()?;
        let location = Some(token.location());
        expect(token::O_BRACE, &token)?;

        let mut entries = BTreeMap::new();
        if !self.tokenizer.peek()?.has_type(token::C_BRACE) {
            loop {
                let key_token = self.tokenizer.next()?;
                expect(token::STRING | token::NAME, &key_token)?;
                let key = key_token.text().to_owned();

                let colon = self.tokenizer.next()?;
                expect(token::COLON, &colon)?;
                entries.insert(key, self.parse_expression()?);

                let separator = self.tokenizer.next()?;
                expect(token::COMMA | token::C_BRACE, &separator)?;
                if separator.has_type(token::C_BRACE) {
                    break;
                }
            }
        } else {
            self.tokenizer.next()?;
        }

        Ok(ExpressionNode::map(entries, location))
    }

    fn parse_unary_operator(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.next()?;
        expect(token::UNARY_OPERATOR, &token)?;

        let op = match token.kind() {
            token::ADDITION => UnaryOp::Plus,
            token::SUBTRACTION => UnaryOp::Minus,
            token::LOGICAL_NEGATION => UnaryOp::LogicalNegation,
            token::BITWISE_NEGATION => UnaryOp::BitwiseNegation,
            _ => unreachable!(),
        };
        Ok(ExpressionNode::unary(
            op,
            self.parse_simple_term_or_switch()?,
            Some(token.location()),
        ))
    }

    fn parse_switch(&mut self) -> Result_<ExpressionNode> {
        let token = self.tokenizer.next()?;
        let location = Some(token.location());
        expect(token::DOUBLE_O_BRACE, &token)?;

        let mut cases = Vec::new();
        let first = self.tokenizer.peek()?;
        expect(token::SIMPLE_TERM | token::DOUBLE_C_BRACE, first)?;

        if first.has_type(token::SIMPLE_TERM) {
            loop {
                cases.push(self.parse_expression()?);
                let separator = self.tokenizer.next()?;
                expect(token::COMMA | token::DOUBLE_C_BRACE, &separator)?;
                if separator.has_type(token::DOUBLE_C_BRACE) {
                    break;
                }
            }
        } else {
            self.tokenizer.next()?;
        }

        Ok(ExpressionNode::switch(cases, location))
    }

    fn parse_compound_term(&mut self, mut lhs: ExpressionNode) -> Result_<ExpressionNode> {
        while self.tokenizer.peek()?.has_type(token::COMPOUND_TERM) {
            let token = self.tokenizer.next()?;
            expect(token::COMPOUND_TERM, &token)?;

            let op = match token.kind() {
                token::ADDITION => BinaryOp::Addition,
                token::SUBTRACTION => BinaryOp::Subtraction,
                token::MULTIPLICATION => BinaryOp::Multiplication,
                token::DIVISION => BinaryOp::Division,
                token::MODULUS => BinaryOp::Modulus,
                token::LOGICAL_AND => BinaryOp::LogicalAnd,
                token::LOGICAL_OR => BinaryOp::LogicalOr,
                token::BITWISE_AND => BinaryOp::BitwiseAnd,
                token::BITWISE_XOR => BinaryOp::BitwiseXor,
                token::BITWISE_OR => BinaryOp::BitwiseOr,
                token::BITWISE_SHIFT_LEFT => BinaryOp::BitwiseShiftLeft,
                token::BITWISE_SHIFT_RIGHT => BinaryOp::BitwiseShiftRight,
                token::LESS => BinaryOp::Less,
                token::LESS_OR_EQUAL => BinaryOp::LessOrEqual,
                token::GREATER => BinaryOp::Greater,
                token::GREATER_OR_EQUAL => BinaryOp::GreaterOrEqual,
                token::EQUAL => BinaryOp::Equal,
                token::NOT_EQUAL => BinaryOp::NotEqual,
                token::RANGE => BinaryOp::Range,
                token::CASE => BinaryOp::Case,
                _ => unreachable!(),
            };
            lhs = ExpressionNode::binary(
                op,
                lhs,
                self.parse_simple_term_or_switch()?,
                Some(token.location()),
            );
        }
        Ok(lhs)
    }
}

fn expect(mask: token::Type, actual: &Token) -> Result_<()> {
    if actual.has_type(mask) {
        Ok(())
    } else {
        Err(ParseError::UnexpectedToken {
            expected_mask: mask,
            expected: token::describe(mask),
            actual: if actual.has_type(token::EOF) {
                "end of input".to_owned()
            } else {
                actual.text().to_owned()
            },
            location: actual.location(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::el::value::{ArrayType, VariableTable};

    fn evaluate(input: &str) -> Value {
        ElParser::parse_strict(input)
            .unwrap()
            .evaluate(&VariableTable::new())
            .unwrap()
    }

    #[test]
    fn test_literals() {
        assert_eq!(evaluate("true"), Value::from(true));
        assert_eq!(evaluate("false"), Value::from(false));
        assert_eq!(evaluate("'asdf'"), Value::from("asdf"));
        assert_eq!(evaluate("\"asdf\""), Value::from("asdf"));
        assert_eq!(evaluate("2"), Value::from(2.0));
        assert_eq!(evaluate("2.5"), Value::from(2.5));
        assert_eq!(evaluate("-2"), Value::from(-2.0));
        assert_eq!(evaluate("null"), Value::null());
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(evaluate(r#"'it\'s'"#), Value::from("it's"));
        assert_eq!(evaluate(r#""a\"b""#), Value::from("a\"b"));
        assert_eq!(evaluate(r#"'back\\slash'"#), Value::from("back\\slash"));
    }

    #[test]
    fn test_array_and_map_literals() {
        assert_eq!(evaluate("[]"), Value::from(ArrayType::new()));
        assert_eq!(
            evaluate("[1, 2, 3]"),
            Value::from(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)])
        );
        // Embedded ranges flatten.
        assert_eq!(
            evaluate("[1..3]"),
            Value::from(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)])
        );
        assert_eq!(
            evaluate("{k1: 2, 'k2': 3}[\"k2\"]"),
            Value::from(3.0)
        );
    }

    #[test]
    fn test_comments_and_whitespace() {
        assert_eq!(evaluate("1 + // ignored\n 2"), Value::from(3.0));
        assert_eq!(evaluate("  \t\n 7 "), Value::from(7.0));
    }

    #[test]
    fn test_subscript_ranges() {
        assert_eq!(
            evaluate("[1, 2, 3][1..]"),
            Value::from(vec![Value::from(2.0), Value::from(3.0)])
        );
        // The open left endpoint starts at the last index, so the range
        // runs backwards.
        assert_eq!(
            evaluate("[1, 2, 3][..1]"),
            Value::from(vec![Value::from(3.0), Value::from(2.0)])
        );
        assert_eq!(
            evaluate("[1, 2, 3][..]"),
            Value::from(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)])
        );
        assert_eq!(evaluate("'chisel'[0, 1, 2]"), Value::from("chi"));
    }

    #[test]
    fn test_switch_syntax() {
        assert_eq!(evaluate("{{ false -> 1, 2 }}"), Value::from(2.0));
        assert!(evaluate("{{}}").is_undefined());
    }

    #[test]
    fn test_strict_rejects_trailing_garbage() {
        assert!(matches!(
            ElParser::parse_strict("1 + 2 asdf"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert_eq!(
            ElParser::parse_lenient("1 + 2 asdf")
                .unwrap()
                .evaluate(&VariableTable::new())
                .unwrap(),
            Value::from(3.0)
        );
    }

    #[test]
    fn test_lenient_stops_after_expression() {
        // The parser looks one token past the expression and leaves the
        // rest untouched.
        let value = ElParser::parse_lenient("7 } trailing text")
            .unwrap()
            .evaluate(&VariableTable::new())
            .unwrap();
        assert_eq!(value, Value::from(7.0));
    }

    #[test]
    fn test_errors_carry_locations() {
        match ElParser::parse_strict("'unterminated") {
            Err(ParseError::UnterminatedString { location }) => {
                assert_eq!(location, FileLocation::new(1, 1));
            }
            other => panic!("expected unterminated string error, got {other:?}"),
        }

        match ElParser::parse_strict("1 + $") {
            Err(ParseError::UnknownCharacter {
                character,
                location,
            }) => {
                assert_eq!(character, '$');
                assert_eq!(location, FileLocation::new(1, 5));
            }
            other => panic!("expected unknown character error, got {other:?}"),
        }

        match ElParser::parse_strict("{k 1}") {
            Err(ParseError::UnexpectedToken {
                expected_mask,
                location,
                ..
            }) => {
                assert_eq!(expected_mask, token::COLON);
                assert_eq!(location, FileLocation::new(1, 4));
            }
            other => panic!("expected unexpected token error, got {other:?}"),
        }
    }

    #[test]
    fn test_number_lexing_edge_cases() {
        assert_eq!(evaluate("1.5 + 2"), Value::from(3.5));
        assert!(ElParser::parse_strict("1.2.3").is_err());
        assert!(ElParser::parse_strict("12abc").is_err());
    }

    #[test]
    fn test_display_matches_token_stream() {
        for input in [
            "2 + 3 * 4",
            "1 - 2 + 3",
            "x && y || z",
            "a[1..3]",
            "( 1 + 2 ) * 3",
            "{{ x > 0 -> \"pos\", \"other\" }}",
        ] {
            assert_eq!(ElParser::parse_strict(input).unwrap().to_string(), input);
        }
    }
}
