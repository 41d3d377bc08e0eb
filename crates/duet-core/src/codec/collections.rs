//! 容器类型的编解码：`Option`、`Box`、引用、`Vec` 以及字符串键映射。

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use super::{Decode, DecodeContext, Encode, EncodeContext, decode_new};
use crate::error::Result;
use crate::node::{Map, Node};
use crate::path::Segment;

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node> {
        (**self).encode(cx)
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node> {
        (**self).encode(cx)
    }
}

impl<T: Decode + ?Sized> Decode for Box<T> {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        (**self).decode_into(node, cx)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node> {
        match self {
            Some(value) => value.encode(cx),
            None => Ok(Node::Nil),
        }
    }
}

/// `Nil` 置为 `None`；已有值时在原值上覆写，否则从 `T::default()` 起步。
impl<T: Decode + Default> Decode for Option<T> {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        if node.is_nil() {
            *self = None;
            return Ok(());
        }
        match self {
            Some(value) => value.decode_into(node, cx),
            None => {
                *self = Some(decode_new(node, cx)?);
                Ok(())
            }
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node> {
        self.as_slice().encode(cx)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node> {
        let mut items = Vec::with_capacity(self.len());
        for (index, item) in self.iter().enumerate() {
            items.push(cx.descend(Segment::Index(index), |cx| item.encode(cx))?);
        }
        Ok(Node::List(items))
    }
}

/// 列表整体替换，不与旧元素逐个合并。
impl<T: Decode + Default> Decode for Vec<T> {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        match node {
            Node::Nil => self.clear(),
            Node::List(items) => {
                let mut decoded = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    decoded.push(cx.descend(Segment::Index(index), |cx| decode_new(item, cx))?);
                }
                *self = decoded;
            }
            other => return Err(cx.mismatch("list", other)),
        }
        Ok(())
    }
}

fn encode_entries<'v, V: Encode + 'v>(
    entries: impl Iterator<Item = (&'v String, &'v V)>,
    cx: &mut EncodeContext<'_>,
) -> Result<Node> {
    let mut map = Map::new();
    for (key, value) in entries {
        let node = cx.descend(Segment::Key(key.clone()), |cx| value.encode(cx))?;
        map.insert(key.clone(), node);
    }
    Ok(Node::Map(map))
}

fn decode_entries<V: Decode + Default>(
    node: &Node,
    cx: &mut DecodeContext<'_>,
    mut insert: impl FnMut(String, V),
) -> Result<()> {
    let entries = node.entries().ok_or_else(|| cx.mismatch("map", node))?;
    for (key, value) in entries {
        let decoded = cx.descend(Segment::Key(key.to_owned()), |cx| decode_new(value, cx))?;
        insert(key.to_owned(), decoded);
    }
    Ok(())
}

impl<V: Encode, S> Encode for HashMap<String, V, S> {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node> {
        encode_entries(self.iter(), cx)
    }
}

impl<V: Decode + Default, S: BuildHasher> Decode for HashMap<String, V, S> {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        self.clear();
        if node.is_nil() {
            return Ok(());
        }
        decode_entries(node, cx, |key, value| {
            self.insert(key, value);
        })
    }
}

impl<V: Encode> Encode for BTreeMap<String, V> {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node> {
        encode_entries(self.iter(), cx)
    }
}

impl<V: Decode + Default> Decode for BTreeMap<String, V> {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        self.clear();
        if node.is_nil() {
            return Ok(());
        }
        decode_entries(node, cx, |key, value| {
            self.insert(key, value);
        })
    }
}

/// 原样携带的节点，适合透传身份凭据或任意 JSON 片段。
impl Encode for Node {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(self.clone())
    }
}

impl Decode for Node {
    fn decode_into(&mut self, node: &Node, _cx: &mut DecodeContext<'_>) -> Result<()> {
        node.clone_into(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DuetError;
    use crate::schema::SchemaRegistry;

    #[test]
    fn nested_list_errors_carry_indices() {
        let registry = SchemaRegistry::new();
        let node = Node::List(vec![
            Node::List(vec![Node::Integer(1)]),
            Node::List(vec![Node::Integer(2), Node::from("x")]),
        ]);
        let error = decode_new::<Vec<Vec<i32>>>(&node, &mut DecodeContext::new(&registry))
            .expect_err("第二行第二个元素不是整数");
        assert_eq!(error.path().map(ToString::to_string).as_deref(), Some("[1][1]"));
    }

    #[test]
    fn option_overlays_existing_value() {
        let registry = SchemaRegistry::new();
        let mut slot: Option<Vec<u8>> = Some(vec![1]);
        slot.decode_into(&Node::List(vec![Node::Integer(5)]), &mut DecodeContext::new(&registry))
            .expect("列表");
        assert_eq!(slot, Some(vec![5]));
        slot.decode_into(&Node::Nil, &mut DecodeContext::new(&registry))
            .expect("null");
        assert_eq!(slot, None);
    }

    #[test]
    fn maps_accept_pairs_and_encode_sorted() {
        let registry = SchemaRegistry::new();
        let mut pairs = crate::node::Pairs::new();
        pairs.push_wire("b", Node::Integer(2));
        pairs.push_wire("a", Node::Integer(1));
        let decoded: HashMap<String, i64> =
            decode_new(&Node::Pairs(pairs), &mut DecodeContext::new(&registry)).expect("映射");
        assert_eq!(decoded.get("a"), Some(&1));

        let encoded = decoded.encode(&mut EncodeContext::new(&registry)).expect("编码");
        assert_eq!(encoded.to_string(), r#"{"a":1,"b":2}"#);

        let error = decode_new::<HashMap<String, i64>>(&Node::Integer(3), &mut DecodeContext::new(&registry))
            .expect_err("整数不是映射");
        assert!(matches!(error, DuetError::TypeMismatch { expected: "map", .. }));
    }
}
