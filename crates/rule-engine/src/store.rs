//! 规则存储管理
//!
//! 规则以原始文本形式持久化，读取后重新解析。
//! `RuleRepository` 定义存储抽象，`RuleStore` 使用 DashMap 提供线程安全的内存实现。

use crate::error::{Result, RuleError};
use crate::models::{RuleMetadata, StoredRule};
use crate::parser::parse;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则仓储接口
#[cfg_attr(test, mockall::automock)]
pub trait RuleRepository: Send + Sync {
    /// 读取规则原始文本，不存在时返回 `RuleNotFound`
    fn load_rule_text(&self, rule_id: &str) -> Result<String>;

    /// 新增或覆盖规则
    fn save_rule(&self, rule_id: &str, text: &str, metadata: RuleMetadata) -> Result<()>;

    /// 获取包含元数据的完整规则，不存在时返回 `RuleNotFound`
    fn get_rule(&self, rule_id: &str) -> Result<StoredRule>;

    fn delete_rule(&self, rule_id: &str) -> Result<()>;

    fn list_rule_ids(&self) -> Result<Vec<String>>;
}

/// 内存规则存储
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Arc<DashMap<String, StoredRule>>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 导出所有规则为 JSON 数组，按 ID 排序
    pub fn export_json(&self) -> Result<String> {
        let mut rules: Vec<StoredRule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(serde_json::to_string_pretty(&rules)?)
    }

    /// 从 JSON 数组批量导入规则，返回导入的规则 ID
    ///
    /// 所有规则文本都能解析时才写入，任一条失败则整批不导入。
    #[instrument(skip(self, json))]
    pub fn import_json(&self, json: &str) -> Result<Vec<String>> {
        let rules: Vec<StoredRule> = serde_json::from_str(json)?;

        for rule in &rules {
            if let Err(e) = parse(&rule.text) {
                warn!("导入的规则无法解析: {} - {}", rule.id, e);
                return Err(e);
            }
        }

        let ids: Vec<String> = rules.iter().map(|r| r.id.clone()).collect();

        for rule in rules {
            self.rules.insert(rule.id.clone(), rule);
        }

        info!("批量导入完成: {} 条规则", ids.len());
        Ok(ids)
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }
}

impl RuleRepository for RuleStore {
    fn load_rule_text(&self, rule_id: &str) -> Result<String> {
        self.rules
            .get(rule_id)
            .map(|r| r.text.clone())
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))
    }

    fn get_rule(&self, rule_id: &str) -> Result<StoredRule> {
        self.rules
            .get(rule_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))
    }

    #[instrument(skip(self, text, metadata), fields(version = metadata.version))]
    fn save_rule(&self, rule_id: &str, text: &str, metadata: RuleMetadata) -> Result<()> {
        self.rules.insert(
            rule_id.to_string(),
            StoredRule {
                id: rule_id.to_string(),
                text: text.to_string(),
                metadata,
            },
        );

        info!("规则已保存: {}", rule_id);
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_rule(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已删除: {}", rule_id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    fn list_rule_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.rules.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(store: &RuleStore, id: &str, text: &str) {
        store
            .save_rule(id, text, RuleMetadata::new(format!("rule_{}", id)))
            .unwrap();
    }

    #[test]
    fn test_save_and_get() {
        let store = RuleStore::new();
        save(&store, "r1", "age > 30 AND department = 'Sales'");

        assert_eq!(store.len(), 1);
        assert!(store.contains("r1"));

        // 保存原始文本，不做规范化
        assert_eq!(
            store.load_rule_text("r1").unwrap(),
            "age > 30 AND department = 'Sales'"
        );
        assert_eq!(store.get_rule("r1").unwrap().metadata.name, "rule_r1");
    }

    #[test]
    fn test_get_missing_rule() {
        let store = RuleStore::new();
        assert!(matches!(
            store.load_rule_text("missing"),
            Err(RuleError::RuleNotFound(ref id)) if id == "missing"
        ));
        assert!(store.get_rule("missing").is_err());
    }

    #[test]
    fn test_save_overwrites() {
        let store = RuleStore::new();
        save(&store, "r1", "a == 1");
        save(&store, "r1", "a == 2");

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_rule("r1").unwrap().text, "a == 2");
    }

    #[test]
    fn test_delete() {
        let store = RuleStore::new();
        save(&store, "r1", "a == 1");

        store.delete_rule("r1").unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.delete_rule("r1"),
            Err(RuleError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_list_ids_sorted() {
        let store = RuleStore::new();
        for id in ["c", "a", "b"] {
            save(&store, id, "a == 1");
        }
        assert_eq!(store.list_rule_ids().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_export_import_json() {
        let store = RuleStore::new();
        save(&store, "r1", "a == 1");
        save(&store, "r2", "is_vip(true)");

        let json = store.export_json().unwrap();

        let restored = RuleStore::new();
        let ids = restored.import_json(&json).unwrap();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(restored.get_rule("r2").unwrap(), store.get_rule("r2").unwrap());
    }

    #[test]
    fn test_import_invalid_json() {
        let store = RuleStore::new();
        assert!(matches!(
            store.import_json("not json"),
            Err(RuleError::JsonError(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_import_rejects_unparsable_rule() {
        let source = RuleStore::new();
        save(&source, "r1", "a == 1");
        save(&source, "r2", "age > NaN");
        let json = source.export_json().unwrap();

        let store = RuleStore::new();
        save(&store, "r0", "b == 2");

        assert!(matches!(
            store.import_json(&json),
            Err(RuleError::Syntax { .. })
        ));
        // 整批不导入
        assert_eq!(store.list_rule_ids().unwrap(), vec!["r0"]);
    }

    #[test]
    fn test_clear() {
        let store = RuleStore::new();
        save(&store, "r1", "a == 1");
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::new();
        let mut handles = vec![];

        for i in 0..10 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                save(&store, &format!("rule-{}", i), "score > 10");
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 10);
    }
}
