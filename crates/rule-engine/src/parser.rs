//! 规则表达式解析器
//!
//! 将 `temperature > 30 && (status = 'active' || level = 3)` 这样的表达式
//! 解析成语法树。比较子句作为独立的产生式整体收进一个 `Operand` 叶子，
//! 逻辑连接符才会生成 `Operator` 节点。
//!
//! 文法：
//!
//! ```text
//! expr       := and_expr (("||" | "OR") and_expr)*
//! and_expr   := primary (("&&" | "AND") primary)*
//! primary    := "(" expr ")" | comparison
//! comparison := IDENT ("<" | ">" | "=" | "==") literal
//! literal    := ["-"] NUMBER | 'string' | IDENT
//! ```

use crate::error::SyntaxError;
use crate::models::{MAX_TREE_DEPTH, Node};
use crate::operators::{ComparisonOperator, LogicalOperator};

/// 括号最大嵌套层数
const MAX_NESTING: usize = 256;

/// 子树及其高度
type Subtree = (Node, usize);

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    /// 无符号数字的源码写法
    Number(String),
    /// 单引号内的内容
    Str(String),
    LParen,
    RParen,
    And,
    Or,
    Cmp(ComparisonOperator),
    Minus,
    Bang,
    Comma,
    /// 不支持的其他二元操作符
    Op(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

/// 解析规则表达式
pub fn parse(text: &str) -> Result<Node, SyntaxError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(SyntaxError::malformed("表达式为空", 0));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: text.len(),
    };
    let (node, _) = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(unexpected(token));
    }
    Ok(node)
}

fn tokenize(text: &str) -> Result<Vec<Token>, SyntaxError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        let kind = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b'&' if bytes.get(i + 1) == Some(&b'&') => {
                i += 2;
                TokenKind::And
            }
            b'|' if bytes.get(i + 1) == Some(&b'|') => {
                i += 2;
                TokenKind::Or
            }
            b'=' => {
                // `==` 与 `=` 同义
                i += if bytes.get(i + 1) == Some(&b'=') { 2 } else { 1 };
                TokenKind::Cmp(ComparisonOperator::Eq)
            }
            b'>' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Op(">=")
            }
            b'>' => {
                i += 1;
                TokenKind::Cmp(ComparisonOperator::Gt)
            }
            b'<' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Op("<=")
            }
            b'<' if bytes.get(i + 1) == Some(&b'>') => {
                i += 2;
                TokenKind::Op("<>")
            }
            b'<' => {
                i += 1;
                TokenKind::Cmp(ComparisonOperator::Lt)
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Op("!=")
            }
            b'!' => {
                i += 1;
                TokenKind::Bang
            }
            b'-' => {
                i += 1;
                TokenKind::Minus
            }
            b'&' | b'|' | b'+' | b'*' | b'/' | b'%' | b'^' => {
                i += 1;
                TokenKind::Op(match c {
                    b'&' => "&",
                    b'|' => "|",
                    b'+' => "+",
                    b'*' => "*",
                    b'/' => "/",
                    b'%' => "%",
                    _ => "^",
                })
            }
            b'\'' => {
                let close = text[i + 1..]
                    .find('\'')
                    .ok_or_else(|| SyntaxError::malformed("字符串缺少结束引号", start))?;
                let content = &text[i + 1..i + 1 + close];
                i += close + 2;
                TokenKind::Str(content.to_string())
            }
            b'"' => return Err(SyntaxError::unsupported("双引号字符串", start)),
            b'0'..=b'9' => {
                i = scan_number(bytes, i);
                TokenKind::Number(text[start..i].to_string())
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                match &text[start..i] {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    ident => TokenKind::Ident(ident.to_string()),
                }
            }
            _ => {
                let ch = text[start..].chars().next().unwrap_or('?');
                return Err(SyntaxError::malformed(format!("无法识别的字符 '{}'", ch), start));
            }
        };

        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    Ok(tokens)
}

/// 扫描 `123`、`12.5`、`1e5`、`2.5E-3` 形式的数字，返回结束位置
fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    let digits = |bytes: &[u8], mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    i = digits(bytes, i);
    if bytes.get(i) == Some(&b'.') && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
        i = digits(bytes, i + 1);
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        if bytes.get(j).is_some_and(u8::is_ascii_digit) {
            i = digits(bytes, j);
        }
    }
    i
}

/// 用逻辑连接符合并两棵子树，高度超过上限时报错
fn join(
    op: LogicalOperator,
    left: Subtree,
    right: Subtree,
    offset: usize,
) -> Result<Subtree, SyntaxError> {
    let depth = 1 + left.1.max(right.1);
    if depth > MAX_TREE_DEPTH {
        return Err(SyntaxError::malformed(
            format!("逻辑子句过多，语法树超过 {} 层", MAX_TREE_DEPTH),
            offset,
        ));
    }
    Ok((Node::operator(op, left.0, right.0), depth))
}

/// 解析到不应出现的记号时的诊断
fn unexpected(token: &Token) -> SyntaxError {
    let offset = token.offset;
    match &token.kind {
        TokenKind::Op(sym) => SyntaxError::unsupported(format!("二元操作符 '{}'", sym), offset),
        TokenKind::Minus => SyntaxError::unsupported("二元操作符 '-'", offset),
        TokenKind::Bang => SyntaxError::unsupported("一元操作符 '!'", offset),
        TokenKind::Cmp(op) => SyntaxError::unsupported(format!("链式比较 '{}'", op), offset),
        TokenKind::LParen => SyntaxError::unsupported("函数调用", offset),
        TokenKind::RParen => SyntaxError::malformed("多余的右括号", offset),
        TokenKind::Comma => SyntaxError::malformed("意外的逗号", offset),
        TokenKind::And | TokenKind::Or => SyntaxError::malformed("逻辑连接符缺少操作数", offset),
        TokenKind::Ident(s) => SyntaxError::malformed(format!("意外的标识符 '{}'", s), offset),
        TokenKind::Number(s) => SyntaxError::malformed(format!("意外的数字 '{}'", s), offset),
        TokenKind::Str(s) => SyntaxError::malformed(format!("意外的字符串 '{}'", s), offset),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Subtree, SyntaxError> {
        let mut left = self.parse_and()?;
        while let Some(token) = self.next_if(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = join(LogicalOperator::Or, left, right, token.offset)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Subtree, SyntaxError> {
        let mut left = self.parse_primary()?;
        while let Some(token) = self.next_if(&TokenKind::And) {
            let right = self.parse_primary()?;
            left = join(LogicalOperator::And, left, right, token.offset)?;
        }
        Ok(left)
    }

    fn next_if(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.peek_kind() == Some(kind) {
            self.advance()
        } else {
            None
        }
    }

    fn parse_primary(&mut self) -> Result<Subtree, SyntaxError> {
        let Some(token) = self.advance() else {
            return Err(SyntaxError::malformed("表达式意外结束", self.end));
        };

        match token.kind {
            TokenKind::LParen => self.parse_group(token.offset),
            TokenKind::Ident(field) => Ok((self.parse_comparison(field, token.offset)?, 1)),
            TokenKind::Number(_) | TokenKind::Str(_) => Err(SyntaxError::unsupported(
                "比较左侧必须是字段名",
                token.offset,
            )),
            TokenKind::Minus => Err(SyntaxError::unsupported("一元操作符 '-'", token.offset)),
            _ => Err(unexpected(&token)),
        }
    }

    fn parse_group(&mut self, open: usize) -> Result<Subtree, SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(SyntaxError::malformed("括号嵌套过深", open));
        }

        let inner = self.parse_or()?;

        match self.advance() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => {
                self.depth -= 1;
                Ok(inner)
            }
            Some(token) => Err(unexpected(&token)),
            None => Err(SyntaxError::malformed("括号不匹配，缺少右括号", open)),
        }
    }

    fn parse_comparison(&mut self, field: String, offset: usize) -> Result<Node, SyntaxError> {
        let op = match self.peek() {
            Some(Token {
                kind: TokenKind::Cmp(op),
                ..
            }) => *op,
            Some(Token {
                kind: TokenKind::LParen,
                offset,
            }) => {
                return Err(SyntaxError::unsupported(
                    format!("函数调用 '{}(...)'", field),
                    *offset,
                ));
            }
            Some(token)
                if matches!(
                    token.kind,
                    TokenKind::Op(_) | TokenKind::Minus | TokenKind::Bang
                ) =>
            {
                return Err(unexpected(token));
            }
            _ => {
                return Err(SyntaxError::unsupported(
                    format!("缺少比较的操作数 '{}'", field),
                    offset,
                ));
            }
        };
        self.advance();

        let literal = self.parse_literal()?;
        Ok(Node::operand(format!("{} {} {}", field, op.symbol(), literal)))
    }

    /// 返回字面量在操作数子句中的写法
    fn parse_literal(&mut self) -> Result<String, SyntaxError> {
        let Some(token) = self.advance() else {
            return Err(SyntaxError::malformed("比较缺少右侧的值", self.end));
        };

        match token.kind {
            TokenKind::Number(n) => Ok(n),
            TokenKind::Str(s) => Ok(format!("'{}'", s)),
            TokenKind::Ident(name) => {
                if let Some(next) = self.peek()
                    && next.kind == TokenKind::LParen
                {
                    return Err(SyntaxError::unsupported(
                        format!("函数调用 '{}(...)'", name),
                        next.offset,
                    ));
                }
                Ok(name)
            }
            TokenKind::Minus => match self.peek() {
                // 紧跟数字的负号视为负数字面量
                Some(Token {
                    kind: TokenKind::Number(n),
                    offset,
                }) if *offset == token.offset + 1 => {
                    let literal = format!("-{}", n);
                    self.advance();
                    Ok(literal)
                }
                _ => Err(SyntaxError::unsupported("一元操作符 '-'", token.offset)),
            },
            TokenKind::Bang => Err(SyntaxError::unsupported("一元操作符 '!'", token.offset)),
            TokenKind::LParen => Err(SyntaxError::unsupported(
                "比较右侧的子表达式",
                token.offset,
            )),
            _ => Err(SyntaxError::malformed("比较缺少右侧的值", token.offset)),
        }
    }
}
