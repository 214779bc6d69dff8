//! 规则存储管理
//!
//! `RuleRepository` 是规则持久化的抽象：按 id 保存规则名称和序列化后的语法树。
//! `InMemoryRuleStore` 使用 DashMap 提供线程安全的内存实现。

use crate::error::{Result, RuleError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// 存储中的规则记录，语法树保持序列化形式
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRule {
    pub id: String,
    pub name: String,
    pub expression: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// 写入顺序，用于稳定的列表顺序
    pub sequence: u64,
}

/// 规则持久化接口
#[cfg_attr(test, mockall::automock)]
pub trait RuleRepository: Send + Sync {
    /// 保存规则，返回新分配的 id
    fn put(&self, name: &str, expression: &str, payload: Vec<u8>) -> Result<String>;

    /// 按给定顺序取回规则，任一 id 不存在时返回 `RuleNotFound`
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredRule>>;

    /// 按写入顺序返回全部规则
    fn get_all(&self) -> Result<Vec<StoredRule>>;
}

impl<T: RuleRepository + ?Sized> RuleRepository for Arc<T> {
    fn put(&self, name: &str, expression: &str, payload: Vec<u8>) -> Result<String> {
        (**self).put(name, expression, payload)
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredRule>> {
        (**self).get_by_ids(ids)
    }

    fn get_all(&self) -> Result<Vec<StoredRule>> {
        (**self).get_all()
    }
}

/// 内存规则存储
#[derive(Clone, Default)]
pub struct InMemoryRuleStore {
    rules: Arc<DashMap<String, StoredRule>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryRuleStore {
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

    /// 直接写入一条已有记录（导入或恢复数据时使用）
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub fn load(&self, mut rule: StoredRule) {
        rule.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.rules.insert(rule.id.clone(), rule);
        debug!("规则记录已导入");
    }
}

impl RuleRepository for InMemoryRuleStore {
    #[instrument(skip(self, expression, payload))]
    fn put(&self, name: &str, expression: &str, payload: Vec<u8>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let rule = StoredRule {
            id: id.clone(),
            name: name.to_string(),
            expression: expression.to_string(),
            payload,
            created_at: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.rules.insert(id.clone(), rule);

        info!(rule_id = %id, "规则已保存");
        Ok(id)
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredRule>> {
        ids.iter()
            .map(|id| {
                self.rules
                    .get(id)
                    .map(|r| r.value().clone())
                    .ok_or_else(|| RuleError::RuleNotFound(id.clone()))
            })
            .collect()
    }

    fn get_all(&self) -> Result<Vec<StoredRule>> {
        let mut rules: Vec<StoredRule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by_key(|r| r.sequence);
        Ok(rules)
    }
}
