//! # codec 模块说明
//!
//! ## 角色定位（Why）
//! - 定义原生值与 [`Node`] 之间的双向转换契约：[`Encode`] 把值投影为节点，[`Decode`] 把节点
//!   覆写到既有值上；
//! - 结构体、列表、映射等复合类型在转换时通过上下文的 `descend` 记录路径，统一承担深度限制
//!   与错误定位。
//!
//! ## 设计要求（What）
//! - 解码采用“覆写”语义：调用方先持有一个实例（通常是原型的浅拷贝），节点中出现的键才会
//!   改写对应字段，未出现的键保持原值；
//! - `Nil` 节点把标量置为零值、把 `Option` 置为 `None`，对结构体不做任何修改；
//! - 数值转换遵循“能精确表达才接受”，否则返回 `Overflow` 或 `TypeMismatch`。

mod collections;
mod context;
mod scalar;

pub use context::{DecodeContext, EncodeContext};

use crate::error::Result;
use crate::node::Node;

/// 将值投影为 [`Node`]。
pub trait Encode {
    fn encode(&self, cx: &mut EncodeContext<'_>) -> Result<Node>;
}

/// 将 [`Node`] 覆写到既有值上。
///
/// # 教案式说明
/// - **意图 (Why)**：操作在服务端由原型浅拷贝而来，依赖等非载荷字段必须在解码后保留，因此
///   解码不是“构造新值”而是“按节点改写”。
/// - **契约 (What)**：实现者只改写节点中出现的部分；失败时目标可能处于部分改写状态，调用方
///   应丢弃该实例。
pub trait Decode {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()>;
}

/// 以 `T::default()` 为起点解码出一个新值。
pub fn decode_new<T: Decode + Default>(node: &Node, cx: &mut DecodeContext<'_>) -> Result<T> {
    let mut value = T::default();
    value.decode_into(node, cx)?;
    Ok(value)
}
