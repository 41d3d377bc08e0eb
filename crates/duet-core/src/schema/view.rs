use tracing::trace;

use super::{Field, Role, Schema, ViewIndex};
use crate::codec::{DecodeContext, EncodeContext};
use crate::config::UnknownFields;
use crate::error::{DuetError, Result};
use crate::node::{Node, Pair, Pairs};
use crate::path::Segment;

/// Schema 的一个角色切片。
///
/// # 教案式说明
/// - **意图 (Why)**：四个传输函数的差别只在“用哪组字段”，视图把这组字段连同编码/解码行为
///   一起封装，绑定层无需再按标签过滤。
/// - **契约 (What)**：
///   - `encode` 产出 `Pairs`，条目顺序即 Schema 顺序，键为线上名；
///   - `decode_into` 只改写视图内且在节点中出现的字段，`Nil` 节点不做任何修改；
///   - 视图外的键按上下文的未知字段策略处理（默认忽略）。
pub struct View<'s, T> {
    schema: &'s Schema<T>,
    index: &'s ViewIndex,
    role: Role,
}

impl<T> Clone for View<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for View<'_, T> {}

impl<'s, T: 'static> View<'s, T> {
    pub(super) fn new(schema: &'s Schema<T>, index: &'s ViewIndex, role: Role) -> Self {
        Self {
            schema,
            index,
            role,
        }
    }

    /// 视图所属角色。
    pub fn role(&self) -> Role {
        self.role
    }

    /// 视图所依附的 Schema。
    pub fn schema(&self) -> &'s Schema<T> {
        self.schema
    }

    /// 视图包含的字段数。
    pub fn len(&self) -> usize {
        self.index.picks.len()
    }

    /// 视图内没有字段时为 `true`，例如没有 `auth` 字段的类型。
    pub fn is_empty(&self) -> bool {
        self.index.picks.is_empty()
    }

    /// 按 Schema 声明顺序遍历视图内字段。
    pub fn fields(self) -> impl Iterator<Item = &'s Field<T>> {
        let fields = &self.schema.fields;
        self.index.picks.iter().map(move |&index| &fields[index])
    }

    /// 按线上名查找视图内字段。
    pub fn field(&self, wire: &str) -> Option<&'s Field<T>> {
        let fields = &self.schema.fields;
        self.index.by_wire.get(wire).map(|&index| &fields[index])
    }

    /// `wire` 是否属于本视图。
    pub fn contains(&self, wire: &str) -> bool {
        self.index.by_wire.contains_key(wire)
    }

    /// 编码为 `Pairs`，字段顺序与 [`View::fields`] 一致。
    pub fn encode(&self, value: &T, cx: &mut EncodeContext<'_>) -> Result<Node> {
        let mut pairs = Pairs::with_capacity(self.len());
        for field in self.fields() {
            let wire = field.wire_name();
            let node = cx.descend(Segment::Field(wire.to_owned()), |cx| field.encode_value(value, cx))?;
            pairs.push(Pair::new(field.name(), wire, node));
        }
        Ok(Node::Pairs(pairs))
    }

    /// 把对象节点覆写到 `target`；`null` 不改动目标，视图外的键按未知字段策略处理。
    pub fn decode_into(&self, target: &mut T, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        if node.is_nil() {
            return Ok(());
        }
        let entries = node.entries().ok_or_else(|| cx.mismatch("object", node))?;
        for (wire, value) in entries {
            match self.field(wire) {
                Some(field) => cx.descend(Segment::Field(wire.to_owned()), |cx| {
                    field.decode_value(target, value, cx)
                })?,
                None if cx.unknown_fields() == UnknownFields::Reject => {
                    return Err(DuetError::UnknownField {
                        path: cx.path().child(Segment::Field(wire.to_owned())),
                    });
                }
                None => trace!(
                    target: "duet::codec",
                    type_name = self.schema.type_name(),
                    role = ?self.role,
                    field = wire,
                    "ignoring unknown field"
                ),
            }
        }
        Ok(())
    }
}
