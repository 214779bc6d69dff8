//! 规则组合
//!
//! 多条规则按给定顺序左折叠成一棵 AND 树：
//! `combine([a, b, c]) = AND(AND(a, b), c)`。

use crate::models::Node;

/// 组合多棵语法树
///
/// 空输入返回 `None`，单个输入原样返回。
pub fn combine<I>(nodes: I) -> Option<Node>
where
    I: IntoIterator<Item = Node>,
{
    nodes.into_iter().reduce(Node::and)
}

/// 组合借用的语法树，输入不会被修改
pub fn combine_refs(nodes: &[&Node]) -> Option<Node> {
    combine(nodes.iter().map(|node| (*node).clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::LogicalOperator;

    fn leaf(text: &str) -> Node {
        Node::operand(text)
    }

    #[test]
    fn test_combine_empty() {
        assert_eq!(combine(Vec::new()), None);
        assert_eq!(combine_refs(&[]), None);
    }

    #[test]
    fn test_combine_single_is_identity() {
        let tree = Node::or(leaf("a > 1"), leaf("b < 2"));
        assert_eq!(combine(vec![tree.clone()]), Some(tree.clone()));
        assert_eq!(combine_refs(&[&tree]), Some(tree));
    }

    #[test]
    fn test_combine_left_fold() {
        let (a, b, c) = (leaf("a > 1"), leaf("b > 2"), leaf("c > 3"));
        let combined = combine(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(combined, Node::and(Node::and(a, b), c));
    }

    #[test]
    fn test_combine_refs_leaves_inputs_untouched() {
        let a = Node::or(leaf("a > 1"), leaf("a < 0"));
        let b = leaf("b = 'x'");
        let before = (a.clone(), b.clone());

        let combined = combine_refs(&[&a, &b]).unwrap();

        assert_eq!((a.clone(), b.clone()), before);
        match combined {
            Node::Operator { op, left, right } => {
                assert_eq!(op, LogicalOperator::And);
                assert_eq!(*left, a);
                assert_eq!(*right, b);
            }
            Node::Operand { .. } => panic!("组合结果应为 AND 节点"),
        }
    }

    #[test]
    fn test_combine_many_depth() {
        let nodes: Vec<_> = (0..10).map(|i| leaf(&format!("x > {}", i))).collect();
        let combined = combine(nodes).unwrap();
        assert_eq!(combined.depth(), 10);
        assert_eq!(combined.operands().len(), 10);
        assert_eq!(combined.operands()[0], "x > 0");
        assert_eq!(combined.operands()[9], "x > 9");
    }
}
