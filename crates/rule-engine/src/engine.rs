//! 规则引擎服务
//!
//! 串联解析、存储、组合与执行：
//! 规则文本 → 语法树 → 序列化存储 …… 取回 → 反序列化 → 组合 → 评估。

use crate::combiner::combine;
use crate::error::{Result, RuleError};
use crate::executor;
use crate::models::{self, DataContext, Node, Rule};
use crate::parser;
use crate::store::{RuleRepository, StoredRule};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// 单次请求最多引用的规则 id 数
pub const MAX_RULE_IDS: usize = 256;

/// 规则引擎
pub struct RuleEngine<R> {
    store: R,
}

impl<R: RuleRepository> RuleEngine<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    /// 解析并保存一条规则
    ///
    /// 语法错误时规则不会被保存。
    #[instrument(skip(self, expression))]
    pub fn create_rule(&self, name: &str, expression: &str) -> Result<Rule> {
        let name = name.trim();
        let expression = expression.trim();
        if name.is_empty() {
            return Err(RuleError::Validation("规则名称不能为空".to_string()));
        }
        if expression.is_empty() {
            return Err(RuleError::Validation("规则表达式不能为空".to_string()));
        }

        let ast = parser::parse(expression).inspect_err(|e| {
            metrics::counter!("rule_parse_failures_total").increment(1);
            warn!(error = %e, "规则表达式解析失败");
        })?;

        let payload = models::serialize(&ast)?;
        let id = self.store.put(name, expression, payload)?;

        metrics::counter!("rules_created_total").increment(1);
        info!(rule_id = %id, fields = ?ast.fields(), "规则已创建");

        // 回读一次，返回带存储元数据的规则
        let stored = self.store.get_by_ids(std::slice::from_ref(&id))?;
        stored
            .into_iter()
            .next()
            .map(decode)
            .unwrap_or_else(|| Err(RuleError::RuleNotFound(id)))
    }

    /// 列出全部规则
    pub fn rules(&self) -> Result<Vec<Rule>> {
        self.store.get_all()?.into_iter().map(decode).collect()
    }

    /// 返回组合后的语法树，不做评估
    #[instrument(skip(self))]
    pub fn combine_rules(&self, ids: &[String]) -> Result<Option<Node>> {
        check_id_count(ids)?;
        let trees = self.load_trees(ids)?;
        Ok(combine(trees.into_iter().map(|(_, ast)| ast)))
    }

    /// 将所有规则按 AND 组合后评估，返回单个结果
    #[instrument(skip(self, context), fields(fields = context.len()))]
    pub fn evaluate_combined(&self, ids: &[String], context: &DataContext) -> Result<bool> {
        require_ids(ids)?;
        let trees = self.load_trees(ids)?;
        let combined = combine(trees.into_iter().map(|(_, ast)| ast));

        let matched = executor::evaluate(combined.as_ref(), context);

        metrics::counter!("rule_evaluations_total", "mode" => "combined").increment(1);
        debug!(matched, "组合评估完成");
        Ok(matched)
    }

    /// 分别评估每条规则，返回 id 到结果的映射
    #[instrument(skip(self, context), fields(fields = context.len()))]
    pub fn evaluate_each(
        &self,
        ids: &[String],
        context: &DataContext,
    ) -> Result<BTreeMap<String, bool>> {
        require_ids(ids)?;
        let results: BTreeMap<String, bool> = self
            .load_trees(ids)?
            .into_iter()
            .map(|(id, ast)| {
                let matched = executor::evaluate_node(&ast, context);
                (id, matched)
            })
            .collect();

        metrics::counter!("rule_evaluations_total", "mode" => "each").increment(1);
        debug!(
            matched = results.values().filter(|m| **m).count(),
            total = results.len(),
            "逐条评估完成"
        );
        Ok(results)
    }

    fn load_trees(&self, ids: &[String]) -> Result<Vec<(String, Node)>> {
        self.store
            .get_by_ids(ids)?
            .into_iter()
            .map(|stored| {
                let ast = decode_payload(&stored)?;
                Ok((stored.id, ast))
            })
            .collect()
    }
}

fn require_ids(ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(RuleError::Validation("规则 id 列表不能为空".to_string()));
    }
    check_id_count(ids)
}

fn check_id_count(ids: &[String]) -> Result<()> {
    if ids.len() > MAX_RULE_IDS {
        return Err(RuleError::Validation(format!(
            "规则 id 列表最多 {} 个，实际 {} 个",
            MAX_RULE_IDS,
            ids.len()
        )));
    }
    Ok(())
}

fn decode_payload(stored: &StoredRule) -> Result<Node> {
    models::deserialize(&stored.payload).map_err(|e| {
        warn!(rule_id = %stored.id, error = %e, "规则载荷损坏");
        match e {
            RuleError::Format(msg) => RuleError::Format(format!("规则 {}: {}", stored.id, msg)),
            other => other,
        }
    })
}

fn decode(stored: StoredRule) -> Result<Rule> {
    let ast = decode_payload(&stored)?;
    Ok(Rule {
        id: stored.id,
        name: stored.name,
        expression: stored.expression,
        ast,
        created_at: stored.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyntaxError;
    use crate::store::{InMemoryRuleStore, MockRuleRepository};
    use chrono::Utc;

    fn engine() -> RuleEngine<InMemoryRuleStore> {
        RuleEngine::new(InMemoryRuleStore::new())
    }

    #[test]
    fn test_create_rule() {
        let engine = engine();
        let rule = engine.create_rule("Temperature Check", "temperature > 30").unwrap();

        assert_eq!(rule.name, "Temperature Check");
        assert_eq!(rule.expression, "temperature > 30");
        assert_eq!(rule.ast, Node::operand("temperature > 30"));
        assert!(engine.store().contains(&rule.id));
    }

    #[test]
    fn test_create_rule_validation() {
        let engine = engine();
        assert!(matches!(
            engine.create_rule("", "a > 1"),
            Err(RuleError::Validation(_))
        ));
        assert!(matches!(
            engine.create_rule("name", "   "),
            Err(RuleError::Validation(_))
        ));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_syntax_error_is_not_stored() {
        let engine = engine();
        let err = engine.create_rule("bad", "f(x)").unwrap_err();
        assert!(matches!(err, RuleError::Syntax(SyntaxError::Unsupported { .. })));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_same_name_creates_new_rule() {
        let engine = engine();
        let first = engine.create_rule("dup", "a > 1").unwrap();
        let second = engine.create_rule("dup", "a > 2").unwrap();

        assert_ne!(first.id, second.id);
        let rules = engine.rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].ast, Node::operand("a > 1"));
        assert_eq!(rules[1].ast, Node::operand("a > 2"));
    }

    #[test]
    fn test_evaluate_combined() {
        let engine = engine();
        let t = engine.create_rule("t", "temperature > 30").unwrap();
        let h = engine.create_rule("h", "humidity < 80").unwrap();
        let ids = vec![t.id, h.id];

        let ok = DataContext::new().with("temperature", 35).with("humidity", 50);
        let too_humid = DataContext::new().with("temperature", 35).with("humidity", 90);

        assert!(engine.evaluate_combined(&ids, &ok).unwrap());
        assert!(!engine.evaluate_combined(&ids, &too_humid).unwrap());
    }

    #[test]
    fn test_evaluate_each() {
        let engine = engine();
        let t = engine.create_rule("t", "temperature > 30").unwrap();
        let h = engine.create_rule("h", "humidity < 80").unwrap();

        let ctx = DataContext::new().with("temperature", 35).with("humidity", 90);
        let results = engine
            .evaluate_each(&[t.id.clone(), h.id.clone()], &ctx)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[&t.id]);
        assert!(!results[&h.id]);
    }

    #[test]
    fn test_evaluate_requires_ids() {
        let engine = engine();
        let ctx = DataContext::new();
        assert!(matches!(
            engine.evaluate_combined(&[], &ctx),
            Err(RuleError::Validation(_))
        ));
        assert!(matches!(
            engine.evaluate_each(&[], &ctx),
            Err(RuleError::Validation(_))
        ));
    }

    #[test]
    fn test_rule_id_limit() {
        let engine = engine();
        let deep = vec!["a > 1"; models::MAX_TREE_DEPTH].join(" && ");
        let rule = engine.create_rule("deep", &deep).unwrap();
        let ctx = DataContext::new().with("a", 2);

        let at_limit = vec![rule.id.clone(); MAX_RULE_IDS];
        assert!(engine.evaluate_combined(&at_limit, &ctx).unwrap());
        assert!(engine.evaluate_each(&at_limit, &ctx).unwrap()[&rule.id]);
        assert!(engine.combine_rules(&at_limit).unwrap().is_some());

        let flood = vec![rule.id; 40_000];
        assert!(matches!(
            engine.evaluate_combined(&flood, &ctx),
            Err(RuleError::Validation(_))
        ));
        assert!(matches!(
            engine.evaluate_each(&flood, &ctx),
            Err(RuleError::Validation(_))
        ));
        assert!(matches!(
            engine.combine_rules(&flood[..MAX_RULE_IDS + 1]),
            Err(RuleError::Validation(_))
        ));
    }

    #[test]
    fn test_overly_deep_expression_is_not_stored() {
        let engine = engine();
        let long = vec!["a > 1"; 150_000].join(" && ");
        let err = engine.create_rule("long", &long).unwrap_err();
        assert!(matches!(err, RuleError::Syntax(SyntaxError::Malformed { .. })));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_unknown_rule_id() {
        let engine = engine();
        let err = engine
            .evaluate_combined(&["missing".to_string()], &DataContext::new())
            .unwrap_err();
        assert!(matches!(err, RuleError::RuleNotFound(_)));
    }

    #[test]
    fn test_combine_rules_shape() {
        let engine = engine();
        let ids: Vec<String> = ["a > 1", "b > 2", "c > 3"]
            .iter()
            .map(|e| engine.create_rule(e, e).unwrap().id)
            .collect();

        let combined = engine.combine_rules(&ids).unwrap().unwrap();
        assert_eq!(
            combined,
            Node::and(
                Node::and(Node::operand("a > 1"), Node::operand("b > 2")),
                Node::operand("c > 3")
            )
        );
        assert_eq!(engine.combine_rules(&[]).unwrap(), None);
        assert_eq!(
            engine.combine_rules(&ids[..1]).unwrap(),
            Some(Node::operand("a > 1"))
        );
    }

    #[test]
    fn test_combination_does_not_touch_stored_rules() {
        let engine = engine();
        let a = engine.create_rule("a", "a > 1 || a < 0").unwrap();
        let b = engine.create_rule("b", "b = 'x'").unwrap();
        let before = engine.rules().unwrap();

        engine.combine_rules(&[a.id.clone(), b.id.clone()]).unwrap();
        engine
            .evaluate_combined(&[a.id, b.id], &DataContext::new())
            .unwrap();

        assert_eq!(engine.rules().unwrap(), before);
    }

    #[test]
    fn test_corrupt_payload_is_format_error() {
        let store = InMemoryRuleStore::new();
        store.load(StoredRule {
            id: "corrupt".to_string(),
            name: "corrupt".to_string(),
            expression: "a > 1".to_string(),
            payload: b"{\"type\":\"mystery\"}".to_vec(),
            created_at: Utc::now(),
            sequence: 0,
        });
        let engine = RuleEngine::new(store);

        let err = engine
            .evaluate_combined(&["corrupt".to_string()], &DataContext::new())
            .unwrap_err();
        assert!(matches!(err, RuleError::Format(msg) if msg.contains("corrupt")));
        assert!(matches!(engine.rules(), Err(RuleError::Format(_))));
    }

    #[test]
    fn test_storage_failure_is_propagated() {
        let mut store = MockRuleRepository::new();
        store
            .expect_put()
            .returning(|_, _, _| Err(RuleError::Storage("connection refused".to_string())));
        let engine = RuleEngine::new(store);

        let err = engine.create_rule("t", "temperature > 30").unwrap_err();
        assert!(matches!(err, RuleError::Storage(_)));
    }

    #[test]
    fn test_create_parses_before_touching_store() {
        let mut store = MockRuleRepository::new();
        store.expect_put().never();
        let engine = RuleEngine::new(store);

        assert!(matches!(
            engine.create_rule("t", "temperature >"),
            Err(RuleError::Syntax(_))
        ));
    }
}
