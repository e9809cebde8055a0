//! 规则文本词法分析

use crate::error::{Result, RuleError};
use crate::operators::Comparator;
use crate::value::Value;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Comparator(Comparator),
    Ident(String),
    Literal(Value),
}

impl TokenKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::And | Self::Or => "逻辑操作符",
            Self::Comparator(_) => "比较操作符",
            Self::Ident(_) => "标识符",
            Self::Literal(_) => "字面量",
        }
    }
}

/// 词法单元，`position` 为其在原文中的字节偏移
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
    pub text: String,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// 将整个输入切分为词法单元
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let Some(&(start, c)) = self.chars.peek() else {
            return Ok(None);
        };

        let kind = match c {
            '(' => {
                self.chars.next();
                TokenKind::LParen
            }
            ')' => {
                self.chars.next();
                TokenKind::RParen
            }
            '=' | '!' | '<' | '>' => self.comparator(start)?,
            '\'' | '"' => self.string(start, c)?,
            '-' | '0'..='9' => self.number(start)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.word(start),
            _ => {
                return Err(RuleError::syntax(
                    "无法识别的字符",
                    c.to_string(),
                    start,
                ));
            }
        };

        let end = self.offset();
        Ok(Some(Token {
            kind,
            position: start,
            text: self.input[start..end].to_string(),
        }))
    }

    /// 当前读取位置
    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |(i, _)| *i)
    }

    fn comparator(&mut self, start: usize) -> Result<TokenKind> {
        self.chars.next();
        self.chars.next_if(|(_, c)| *c == '=');
        let symbol = &self.input[start..self.offset()];

        Comparator::from_symbol(symbol)
            .map(TokenKind::Comparator)
            .ok_or_else(|| RuleError::syntax("无法识别的比较操作符", symbol, start))
    }

    fn string(&mut self, start: usize, quote: char) -> Result<TokenKind> {
        self.chars.next();
        let mut value = String::new();

        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(TokenKind::Literal(Value::String(value))),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                Some((_, c)) => value.push(c),
                None => break,
            }
        }

        Err(RuleError::syntax(
            "字符串未闭合",
            &self.input[start..],
            start,
        ))
    }

    fn number(&mut self, start: usize) -> Result<TokenKind> {
        self.chars.next_if(|(_, c)| *c == '-');
        let digits_start = self.offset();
        while self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}

        if self.offset() == digits_start {
            return Err(RuleError::syntax("'-' 之后缺少数字", "-", start));
        }

        if self.chars.next_if(|(_, c)| *c == '.').is_some() {
            let fraction_start = self.offset();
            while self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}
            if self.offset() == fraction_start {
                return Err(RuleError::syntax(
                    "小数点之后缺少数字",
                    &self.input[start..self.offset()],
                    start,
                ));
            }
        }

        // 形如 30abc 的输入不是合法的数字
        if let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                while self
                    .chars
                    .next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
                    .is_some()
                {}
                return Err(RuleError::syntax(
                    "无效的数字字面量",
                    &self.input[start..self.offset()],
                    start,
                ));
            }
        }

        let text = &self.input[start..self.offset()];
        text.parse::<f64>()
            .map(|n| TokenKind::Literal(Value::Number(n)))
            .map_err(|_| RuleError::syntax("无效的数字字面量", text, start))
    }

    fn word(&mut self, start: usize) -> TokenKind {
        while self
            .chars
            .next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
            .is_some()
        {}
        let word = &self.input[start..self.offset()];

        if word.eq_ignore_ascii_case("and") {
            TokenKind::And
        } else if word.eq_ignore_ascii_case("or") {
            TokenKind::Or
        } else if word.eq_ignore_ascii_case("true") {
            TokenKind::Literal(Value::Bool(true))
        } else if word.eq_ignore_ascii_case("false") {
            TokenKind::Literal(Value::Bool(false))
        } else {
            TokenKind::Ident(word.to_string())
        }
    }
}

/// 切分规则文本
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input).tokenize()
}
