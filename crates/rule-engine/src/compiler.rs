//! 规则编译器
//!
//! 将规则文本解析为规则树，校验结构完整性和属性白名单，
//! 并提取规则使用的字段与函数。
//! 解析本身从不检查字段是否存在，白名单校验是解析之后的独立步骤。

use crate::ast::{Argument, Ast, Operand};
use crate::error::{Result, RuleError};
use crate::parser::RuleParser;
use std::collections::HashSet;

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// 规则树
    pub ast: Ast,
    /// 规则中使用的所有字段（用于预先检查记录）
    pub required_fields: HashSet<String>,
    /// 规则中调用的函数
    pub functions: HashSet<String>,
    /// 编译版本号（用于缓存失效）
    pub compile_version: u64,
}

/// 规则编译器
#[derive(Debug, Clone, Default)]
pub struct RuleCompiler {
    parser: RuleParser,
    /// 允许使用的属性，为空时不限制
    catalog: HashSet<String>,
    compile_version: u64,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(mut self, parser: RuleParser) -> Self {
        self.parser = parser;
        self
    }

    /// 设置属性白名单
    pub fn with_catalog<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalog = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn parser(&self) -> &RuleParser {
        &self.parser
    }

    /// 从规则文本编译
    pub fn compile(&mut self, text: &str) -> Result<CompiledRule> {
        let ast = self.parser.parse(text)?;
        self.compile_ast(ast)
    }

    /// 编译已有的规则树（例如修改后的规则）
    pub fn compile_ast(&mut self, ast: Ast) -> Result<CompiledRule> {
        ast.validate()?;
        self.validate_fields(&ast)?;

        let required_fields = required_fields(&ast);
        let functions = function_names(&ast);

        self.compile_version += 1;

        Ok(CompiledRule {
            ast,
            required_fields,
            functions,
            compile_version: self.compile_version,
        })
    }

    /// 生成可持久化的规范文本
    ///
    /// 文本必须能被同一解析器还原为结构相同的规则树。非法标识符或
    /// 关键字作为字段名时，生成的文本无法还原，返回错误而不是写入坏规则。
    pub fn canonical_text(&self, ast: &Ast) -> Result<String> {
        let text = ast.to_string();
        let reparsed = self.parser.parse(&text)?;

        if reparsed != *ast {
            return Err(RuleError::MalformedTree(format!(
                "规范文本无法还原为同一规则树: {}",
                text
            )));
        }
        Ok(text)
    }

    /// 校验规则使用的属性都在白名单中
    pub fn validate_fields(&self, ast: &Ast) -> Result<()> {
        if self.catalog.is_empty() {
            return Ok(());
        }

        let mut fields: Vec<String> = required_fields(ast)
            .into_iter()
            .filter(|field| !self.catalog.contains(field))
            .collect();
        fields.sort();

        match fields.into_iter().next() {
            Some(field) => Err(RuleError::UnknownAttribute(field)),
            None => Ok(()),
        }
    }
}

/// 提取规则使用的所有字段，包括作为函数参数的字段
pub fn required_fields(ast: &Ast) -> HashSet<String> {
    ast.operands()
        .filter_map(|operand| match operand {
            Operand::Comparison { field, .. } => Some(field.clone()),
            Operand::Function {
                argument: Argument::Field(field),
                ..
            } => Some(field.clone()),
            Operand::Function { .. } => None,
        })
        .collect()
}

/// 提取规则调用的所有函数名
pub fn function_names(ast: &Ast) -> HashSet<String> {
    ast.operands()
        .filter_map(|operand| match operand {
            Operand::Function { name, .. } => Some(name.clone()),
            Operand::Comparison { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const RULE: &str = "(age > 30 AND department == 'Sales') \
                        OR (is_experienced(experience) AND salary > 50000) OR is_vip(true)";

    #[test]
    fn test_compile_extracts_fields() {
        let mut compiler = RuleCompiler::new();
        let compiled = compiler.compile(RULE).unwrap();

        assert_eq!(compiled.required_fields.len(), 4);
        for field in ["age", "department", "experience", "salary"] {
            assert!(compiled.required_fields.contains(field));
        }
        assert_eq!(compiled.functions.len(), 2);
        assert!(compiled.functions.contains("is_experienced"));
        assert!(compiled.functions.contains("is_vip"));
    }

    #[test]
    fn test_compile_version() {
        let mut compiler = RuleCompiler::new();

        let compiled1 = compiler.compile("age > 1").unwrap();
        let compiled2 = compiler.compile("age > 2").unwrap();

        assert_eq!(compiled1.compile_version, 1);
        assert_eq!(compiled2.compile_version, 2);
    }

    #[test]
    fn test_catalog_accepts_known_fields() {
        let mut compiler =
            RuleCompiler::new().with_catalog(["age", "department", "salary", "experience"]);
        assert!(compiler.compile(RULE).is_ok());
    }

    #[test]
    fn test_catalog_rejects_unknown_field() {
        let mut compiler = RuleCompiler::new().with_catalog(["age", "department"]);
        let err = compiler
            .compile("age > 30 AND bonus > 10 AND commission > 5")
            .unwrap_err();

        assert!(matches!(err, RuleError::UnknownAttribute(ref field) if field == "bonus"));
        assert!(err.to_string().contains("bonus"));
    }

    #[test]
    fn test_parse_never_checks_catalog() {
        // 解析本身不关心字段是否存在
        assert!(parse("anything_goes == 1").is_ok());
    }

    #[test]
    fn test_compile_rejects_malformed_tree() {
        use crate::ast::Side;

        let mut ast = parse("a == 1 AND b == 2").unwrap();
        let root = ast.root();
        ast.set_child(root, Side::Left, None).unwrap();

        let mut compiler = RuleCompiler::new();
        assert!(matches!(
            compiler.compile_ast(ast),
            Err(RuleError::MalformedTree(_))
        ));
    }

    #[test]
    fn test_compile_syntax_error() {
        let mut compiler = RuleCompiler::new();
        assert!(matches!(
            compiler.compile("age >"),
            Err(RuleError::Syntax { .. })
        ));
    }

    #[test]
    fn test_canonical_text_round_trips() {
        let compiler = RuleCompiler::new();
        let ast = parse(RULE).unwrap();

        let text = compiler.canonical_text(&ast).unwrap();
        assert_eq!(parse(&text).unwrap(), ast);
    }

    #[test]
    fn test_canonical_text_rejects_unparsable_trees() {
        use crate::ast::Side;
        use crate::operators::Comparator;

        let compiler = RuleCompiler::new();

        for field in ["first name", "and", "1st"] {
            let ast = Ast::operand(Operand::comparison(field, Comparator::Eq, 1));
            assert!(compiler.canonical_text(&ast).is_err(), "{}", field);
        }

        // 字段名中夹带操作符时文本可以解析，但结构不同
        let ast = Ast::operand(Operand::comparison("a == 1 AND b", Comparator::Eq, 2));
        assert!(matches!(
            compiler.canonical_text(&ast),
            Err(RuleError::MalformedTree(_))
        ));

        let mut ast = parse("a == 1 AND b == 2").unwrap();
        let root = ast.root();
        let fresh = ast.insert_operand(Operand::comparison("c d", Comparator::Eq, 3));
        ast.replace(root, Side::Right, fresh).unwrap();
        assert!(compiler.canonical_text(&ast).is_err());
    }

    #[test]
    fn test_canonical_text_respects_parser_depth() {
        let compiler = RuleCompiler::new().with_parser(RuleParser::new().with_max_depth(1));
        let ast = parse("a == 1 AND (b == 2 AND (c == 3 OR d == 4))").unwrap();

        assert!(matches!(
            compiler.canonical_text(&ast),
            Err(RuleError::Syntax { .. })
        ));
    }

    #[test]
    fn test_custom_parser_depth() {
        let mut compiler =
            RuleCompiler::new().with_parser(RuleParser::new().with_max_depth(1));
        assert!(compiler.compile("(a == 1)").is_ok());
        assert!(compiler.compile("((a == 1))").is_err());
    }
}
