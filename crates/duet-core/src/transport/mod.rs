//! # transport 模块说明
//!
//! ## 角色定位（Why）
//! - 真正的 HTTP/WebSocket 服务器不在本 crate 范围内，但它们与绑定层之间的契约在这里落地：
//!   请求/响应交换（[`exchange`]、[`exchange_stream`]）与双工通道（[`serve_channel`]）；
//! - 适配层负责把 [`crate::DuetError`] 折算为面向客户端的状态码与错误主体，服务器实现只需
//!   搬运字节。
//!
//! ## 设计要求（What）
//! - 接收阶段的输入问题归为 400，执行失败默认 500 且不向客户端暴露细节，取消为 499；
//! - 工作单元可返回 [`Rejection`] 自选状态码，低于 500 时其消息对客户端可见；
//! - 流式输出为换行分隔的 JSON，已输出的行在后续失败时保留。

mod channel;
mod exchange;

pub use channel::{Frame, FrameKind, serve_channel};
pub use exchange::{
    ExchangeError, JsonLines, Rejection, STATUS_CLIENT_CLOSED, StreamBody, exchange, exchange_stream,
};
