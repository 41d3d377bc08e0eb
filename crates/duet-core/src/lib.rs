#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "duet-core: 保精度的 JSON 节点编解码与按角色裁剪的双向操作 Schema。"]
#![doc = ""]
#![doc = "== 数据流 =="]
#![doc = "原生结构体 →（`SchemaRegistry`，每类型一次）→ `Schema` →（角色视图）→ 请求/响应视图 →（`Encode`/`Decode`）→ `Node` →（`JsonCodec`）→ 字节；解码方向对称。"]
#![doc = ""]
#![doc = "== 角色契约 =="]
#![doc = "同一个 `#[derive(Object)]` 类型同时是请求 Schema（客户端发送/服务端接收）与响应 Schema（服务端发送/客户端接收），由 `Binder` 组装四个传输函数以及流式 `Emitter`。"]

// 派生宏展开使用 `::duet_core::…` 绝对路径，本 crate 内部（如 `transport::Frame`）同样需要解析。
extern crate self as duet_core;

/// 框架级过程宏出口。
///
/// 与 trait [`schema::Object`] 同名但位于宏命名空间，调用方只需 `use duet_core::Object;`
/// 即可同时获得 trait 与派生宏。
pub use duet_macros::Object;

pub mod binder;
pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod json;
pub mod node;
pub mod path;
pub mod schema;
pub mod tag;
pub mod transport;
pub mod value;

pub use binder::{Binder, Binding, EmitSink, Emitter, Operation, StreamBinder, StreamError, StreamingOperation};
pub use codec::{Decode, DecodeContext, Encode, EncodeContext};
pub use config::{EmbedCollisions, RegistryConfig, UnknownFields};
pub use contract::{CallContext, Cancellation};
pub use error::{BoxError, DuetError, ErrorCategory, Result, codes};
pub use json::{JsonCodec, ObjectShape};
pub use node::{Digits, Map, Node, Pair, Pairs};
pub use path::{FieldPath, Segment};
pub use schema::{Field, FieldSet, Object, Role, Schema, SchemaRegistry, View};
pub use tag::{Direction, FieldAttrs, FieldTag};
pub use value::Value;
