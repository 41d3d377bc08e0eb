//! 动态值：解码到“任意类型”槽位时的落点。
//!
//! 与 [`Node`] 不同，[`Value`] 只保留宿主语言惯用的几种形态：超出 `i64` 的整数与
//! `Digits` 小数都会被折算为 `f64`，因此这条路径有损；需要保真时请直接使用 `Node`。

use std::collections::HashMap;

use crate::codec::{Decode, DecodeContext, Encode, EncodeContext};
use crate::error::Result;
use crate::node::{Map, Node};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn from_node(node: &Node) -> Value {
        match node {
            Node::Nil => Value::Null,
            Node::Bool(flag) => Value::Bool(*flag),
            Node::Integer(value) => Value::Int(*value),
            Node::Float(value) => Value::Float(*value),
            Node::Digits(digits) => Value::Float(digits.to_f64()),
            Node::String(text) => Value::String(text.clone()),
            Node::List(items) => Value::List(items.iter().map(Value::from_node).collect()),
            Node::Pairs(_) | Node::Map(_) => Value::Map(
                node.entries()
                    .into_iter()
                    .flatten()
                    .map(|(key, value)| (key.to_owned(), Value::from_node(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_node(&self) -> Node {
        match self {
            Value::Null => Node::Nil,
            Value::Bool(flag) => Node::Bool(*flag),
            Value::Int(value) => Node::Integer(*value),
            Value::Float(value) => Node::Float(*value),
            Value::String(text) => Node::String(text.clone()),
            Value::List(items) => Node::List(items.iter().map(Value::to_node).collect()),
            Value::Map(map) => Node::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_node()))
                    .collect::<Map>(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&Node> for Value {
    fn from(node: &Node) -> Self {
        Value::from_node(node)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl Encode for Value {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(self.to_node())
    }
}

impl Decode for Value {
    fn decode_into(&mut self, node: &Node, _cx: &mut DecodeContext<'_>) -> Result<()> {
        *self = Value::from_node(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Digits;

    #[test]
    fn wide_integers_become_lossy_floats() {
        let value = Value::from_node(&Node::Digits(Digits::from(u64::MAX)));
        assert_eq!(value, Value::Float(u64::MAX as f64));
        assert_eq!(Value::from_node(&Node::Integer(i64::MIN)), Value::Int(i64::MIN));
    }
}
