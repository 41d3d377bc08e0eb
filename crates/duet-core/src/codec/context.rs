use crate::config::UnknownFields;
use crate::error::{DuetError, Result};
use crate::node::Node;
use crate::path::{FieldPath, Segment};
use crate::schema::{Object, SchemaRegistry};

/// 编码上下文。
///
/// # 教案式说明
/// - **意图 (Why)**：复合类型在递归编码时需要共享三样东西：用于解析嵌套结构体 Schema 的注册表、
///   当前字段路径，以及深度上限。
/// - **契约 (What)**：
///   - 深度等于路径长度，进入第 `max_depth + 1` 层时返回 `DepthExceeded`；
///   - [`EncodeContext::descend`] 保证段的压栈与出栈成对出现，即使闭包返回错误。
/// - **设计权衡 (Trade-offs)**：以闭包划定作用域而非返回守卫对象，调用方无需通过守卫再借用上下文。
pub struct EncodeContext<'a> {
    registry: &'a SchemaRegistry,
    path: FieldPath,
    max_depth: usize,
}

impl<'a> EncodeContext<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            path: FieldPath::root(),
            max_depth: registry.config().max_depth,
        }
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// 进入一个子段并在其中执行 `f`。
    pub fn descend<R>(
        &mut self,
        segment: Segment,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        if self.path.len() >= self.max_depth {
            return Err(DuetError::DepthExceeded {
                path: self.path.child(segment),
                limit: self.max_depth,
            });
        }
        self.path.push(segment);
        let outcome = f(self);
        self.path.pop();
        outcome
    }

    /// 按类型的完整 Schema 编码结构体。派生宏生成的 `Encode` 实现委托到这里。
    pub fn encode_object<T: Object>(&mut self, value: &T) -> Result<Node> {
        let registry = self.registry;
        let schema = registry.schema::<T>()?;
        schema.full_view().encode(value, self)
    }
}

/// 解码上下文。
///
/// 与 [`EncodeContext`] 对称，额外携带未知字段策略，并提供构造解码错误的便捷方法，
/// 使错误总是带上当前路径。
pub struct DecodeContext<'a> {
    registry: &'a SchemaRegistry,
    path: FieldPath,
    max_depth: usize,
    unknown_fields: UnknownFields,
}

impl<'a> DecodeContext<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        let config = registry.config();
        Self {
            registry,
            path: FieldPath::root(),
            max_depth: config.max_depth,
            unknown_fields: config.unknown_fields,
        }
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn unknown_fields(&self) -> UnknownFields {
        self.unknown_fields
    }

    pub fn descend<R>(
        &mut self,
        segment: Segment,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        if self.path.len() >= self.max_depth {
            return Err(DuetError::DepthExceeded {
                path: self.path.child(segment),
                limit: self.max_depth,
            });
        }
        self.path.push(segment);
        let outcome = f(self);
        self.path.pop();
        outcome
    }

    /// 按类型的完整 Schema 覆写结构体。
    pub fn decode_object<T: Object>(&mut self, target: &mut T, node: &Node) -> Result<()> {
        let registry = self.registry;
        let schema = registry.schema::<T>()?;
        schema.full_view().decode_into(target, node, self)
    }

    pub fn mismatch(&self, expected: &'static str, found: &Node) -> DuetError {
        DuetError::TypeMismatch {
            path: self.path.clone(),
            expected,
            found: found.kind(),
        }
    }

    pub fn overflow(&self, target: &'static str, literal: impl Into<String>) -> DuetError {
        DuetError::Overflow {
            path: self.path.clone(),
            target,
            literal: literal.into(),
        }
    }
}
