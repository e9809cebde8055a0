//! 规则解析器
//!
//! 递归下降解析，语法如下（关键字不区分大小写）：
//!
//! ```text
//! expr       := term (("AND"|"OR") term)*
//! term       := "(" expr ")" | comparison
//! comparison := IDENT COMPARATOR (NUMBER|STRING|BOOL)
//!             | IDENT "(" (NUMBER|STRING|BOOL|IDENT) ")"
//! ```
//!
//! AND 与 OR 优先级相同，严格从左到右折叠，括号是唯一的优先级手段。

use crate::ast::{Argument, Ast, Operand};
use crate::error::{Result, RuleError};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::operators::LogicalOperator;

/// 默认最大括号嵌套层级
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// 规则解析器
#[derive(Debug, Clone)]
pub struct RuleParser {
    max_depth: usize,
}

impl RuleParser {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// 限制括号嵌套层级
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 解析规则文本
    pub fn parse(&self, input: &str) -> Result<Ast> {
        if input.trim().is_empty() {
            return Err(RuleError::syntax("规则为空", input, 0));
        }

        let tokens = tokenize(input)?;
        let mut cursor = Cursor {
            tokens: &tokens,
            pos: 0,
            input_len: input.len(),
            depth: 0,
            max_depth: self.max_depth,
        };

        let ast = cursor.expr()?;

        if let Some(token) = cursor.next() {
            let message = if token.kind == TokenKind::RParen {
                "括号不匹配，多余的 ')'"
            } else {
                "条件之后存在多余内容，缺少 AND/OR"
            };
            return Err(RuleError::syntax(message, &token.text, token.position));
        }

        Ok(ast)
    }
}

impl Default for RuleParser {
    fn default() -> Self {
        Self::new()
    }
}

/// 使用默认配置解析规则文本
pub fn parse(input: &str) -> Result<Ast> {
    RuleParser::new().parse(input)
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    input_len: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn end_of_input(&self, message: &str) -> RuleError {
        RuleError::syntax(message, "", self.input_len)
    }

    fn expr(&mut self) -> Result<Ast> {
        let mut ast = self.term()?;

        loop {
            let operator = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::And) => LogicalOperator::And,
                Some(TokenKind::Or) => LogicalOperator::Or,
                _ => break,
            };
            self.next();
            let rhs = self.term()?;
            ast = ast.join(operator, rhs);
        }

        Ok(ast)
    }

    fn term(&mut self) -> Result<Ast> {
        let Some(token) = self.next() else {
            return Err(self.end_of_input("规则意外结束，期望条件或 '('"));
        };

        match &token.kind {
            TokenKind::LParen => {
                self.depth += 1;
                if self.depth > self.max_depth {
                    return Err(RuleError::syntax(
                        format!("括号嵌套超过上限 {}", self.max_depth),
                        &token.text,
                        token.position,
                    ));
                }

                let inner = self.expr()?;

                match self.next() {
                    Some(t) if t.kind == TokenKind::RParen => {}
                    Some(t) => {
                        return Err(RuleError::syntax(
                            "括号不匹配，期望 ')'",
                            &t.text,
                            t.position,
                        ));
                    }
                    None => {
                        return Err(RuleError::syntax(
                            "括号不匹配，缺少 ')'",
                            &token.text,
                            token.position,
                        ));
                    }
                }

                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::Ident(name) => self.comparison(name, token),
            other => Err(RuleError::syntax(
                format!("期望条件或 '('，实际为{}", other.describe()),
                &token.text,
                token.position,
            )),
        }
    }

    fn comparison(&mut self, name: &str, name_token: &'a Token) -> Result<Ast> {
        let Some(token) = self.next() else {
            return Err(RuleError::syntax(
                "缺少比较操作符",
                &name_token.text,
                name_token.position,
            ));
        };

        match &token.kind {
            TokenKind::Comparator(comparator) => match self.next() {
                Some(Token {
                    kind: TokenKind::Literal(value),
                    ..
                }) => Ok(Ast::operand(Operand::comparison(
                    name,
                    *comparator,
                    value.clone(),
                ))),
                Some(t) => Err(RuleError::syntax(
                    "比较操作符之后缺少字面量",
                    &t.text,
                    t.position,
                )),
                None => Err(RuleError::syntax(
                    "比较操作符之后缺少字面量",
                    &token.text,
                    token.position,
                )),
            },
            TokenKind::LParen => self.function_call(name, token),
            _ => Err(RuleError::syntax(
                "缺少比较操作符",
                &token.text,
                token.position,
            )),
        }
    }

    fn function_call(&mut self, name: &str, lparen: &'a Token) -> Result<Ast> {
        let argument = match self.next() {
            Some(Token {
                kind: TokenKind::Literal(value),
                ..
            }) => Argument::Literal(value.clone()),
            Some(Token {
                kind: TokenKind::Ident(field),
                ..
            }) => Argument::Field(field.clone()),
            Some(t) => {
                return Err(RuleError::syntax(
                    "函数参数必须是字面量或字段名",
                    &t.text,
                    t.position,
                ));
            }
            None => {
                return Err(RuleError::syntax(
                    "函数调用缺少参数",
                    &lparen.text,
                    lparen.position,
                ));
            }
        };

        match self.next() {
            Some(t) if t.kind == TokenKind::RParen => {
                Ok(Ast::operand(Operand::function(name, argument)))
            }
            Some(t) => Err(RuleError::syntax(
                "函数调用只接受一个参数，期望 ')'",
                &t.text,
                t.position,
            )),
            None => Err(self.end_of_input("函数调用缺少 ')'")),
        }
    }
}
