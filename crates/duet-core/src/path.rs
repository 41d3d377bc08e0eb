//! 字段路径：错误定位与深度计量共用的线索。
//!
//! 路径段按线上名（wire name）记录，渲染形如 `a.b[2].c`；根路径渲染为 `$`。

use std::fmt;

/// 路径中的单个段。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// 结构体字段，按线上名记录。
    Field(String),
    /// 列表下标。
    Index(usize),
    /// 字符串键映射中的键。
    Key(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) | Segment::Key(name) => f.write_str(name),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// 自根节点起的字段路径。
///
/// # 教案式说明
/// - **意图 (Why)**：解码错误需要告诉客户端“哪里错了”；同时编码/解码的递归深度等于路径长度，
///   两个关注点共用同一个栈，避免重复维护计数器。
/// - **契约 (What)**：`push`/`pop` 必须成对出现，由 [`crate::codec::EncodeContext::descend`]
///   等作用域函数保证；渲染结果对同一路径稳定。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// 以单个字段段构造路径，常用于顶层缺失字段的报告。
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Field(name.into())],
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    /// 返回追加一个段后的新路径，原路径保持不变。
    pub fn child(&self, segment: Segment) -> Self {
        let mut next = self.clone();
        next.push(segment);
        next
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("$");
        }
        for (position, segment) in self.segments.iter().enumerate() {
            if position > 0 && !matches!(segment, Segment::Index(_)) {
                f.write_str(".")?;
            }
            segment.fmt(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fields_indices_and_keys() {
        let mut path = FieldPath::root();
        assert_eq!(path.to_string(), "$", "根路径应渲染为 $");

        path.push(Segment::Field("a".into()));
        path.push(Segment::Field("b".into()));
        path.push(Segment::Index(2));
        path.push(Segment::Key("c".into()));
        assert_eq!(path.to_string(), "a.b[2].c");

        let leading_index = FieldPath::root().child(Segment::Index(0));
        assert_eq!(leading_index.to_string(), "[0]", "下标开头不应带点号");
    }
}
