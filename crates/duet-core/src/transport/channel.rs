//! 双工通道的帧模型与单次流式会话。

use tracing::{debug, info};

use crate::binder::{StreamBinder, StreamError, StreamingOperation};
use crate::codec::{Decode, DecodeContext, Encode, EncodeContext};
use crate::contract::CallContext;
use crate::Object;
use crate::error::{DuetError, ErrorCategory, Result};
use crate::node::Node;
use crate::path::FieldPath;

/// 帧类型。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrameKind {
    #[default]
    Data,
    Open,
    Error,
    Close,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Data => "data",
            FrameKind::Open => "open",
            FrameKind::Error => "error",
            FrameKind::Close => "close",
        }
    }

    /// 解析线上文本；`new` 是 `open` 的旧别名。
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "data" => Some(FrameKind::Data),
            "open" | "new" => Some(FrameKind::Open),
            "error" => Some(FrameKind::Error),
            "close" => Some(FrameKind::Close),
            _ => None,
        }
    }
}

impl Encode for FrameKind {
    fn encode(&self, _cx: &mut EncodeContext<'_>) -> Result<Node> {
        Ok(Node::from(self.as_str()))
    }
}

impl Decode for FrameKind {
    fn decode_into(&mut self, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        if node.is_nil() {
            *self = FrameKind::default();
            return Ok(());
        }
        let kind = node
            .as_str()
            .and_then(FrameKind::parse)
            .ok_or_else(|| cx.mismatch("frame type", node))?;
        *self = kind;
        Ok(())
    }
}

/// 通道上传输的一帧。
///
/// `channel` 标识会话，`path` 路由到具体操作，`data` 携带请求或条目本身。
#[derive(Object, Clone, Debug, Default, PartialEq)]
pub struct Frame {
    #[enc("channel")]
    pub channel: String,
    #[enc("path")]
    pub path: String,
    #[enc("type")]
    pub kind: FrameKind,
    #[enc("data")]
    pub data: Node,
}

impl Frame {
    pub fn open(channel: impl Into<String>, path: impl Into<String>, data: Node) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
            kind: FrameKind::Open,
            data,
        }
    }

    pub fn data(channel: impl Into<String>, path: impl Into<String>, data: Node) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
            kind: FrameKind::Data,
            data,
        }
    }

    pub fn error(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            path: String::new(),
            kind: FrameKind::Error,
            data: Node::String(message.into()),
        }
    }

    pub fn close(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            path: String::new(),
            kind: FrameKind::Close,
            data: Node::Nil,
        }
    }
}

/// 在通道上运行一次流式操作。
///
/// # 教案式说明
/// - **意图 (Why)**：通道客户端以 `open` 帧发起请求，之后持续接收标注了通道与路径的 `data` 帧，
///   直到 `close` 或 `error` 帧结束会话。
/// - **契约 (What)**：
///   - `open.kind` 必须是 [`FrameKind::Open`]，否则在发射前失败；
///   - 每次成功发射对应一帧 `data`，`path` 沿用 `open` 帧的路径；
///   - 成功时以 `close` 结束；失败时发送携带错误信息的 `error` 帧并返回 [`StreamError`]。
///     服务端内部错误只发送通用描述，细节留在日志。
pub fn serve_channel<T: StreamingOperation>(
    binder: &StreamBinder<T>,
    open: &Frame,
    cx: &CallContext,
    out: &mut dyn FnMut(Frame) -> Result<()>,
) -> std::result::Result<usize, StreamError> {
    let channel = open.channel.as_str();
    let outcome = if open.kind == FrameKind::Open {
        info!(
            target: "duet::channel",
            channel,
            path = %open.path,
            operation = %binder.name(),
            "channel opened"
        );
        let mut sink =
            |item: Node| -> Result<()> { out(Frame::data(channel, open.path.as_str(), item)) };
        binder.serve_node(&open.data, cx, &mut sink)
    } else {
        Err(StreamError {
            emitted: 0,
            error: DuetError::TypeMismatch {
                path: FieldPath::field("type"),
                expected: "open",
                found: open.kind.as_str(),
            },
        })
    };

    match outcome {
        Ok(emitted) => {
            debug!(target: "duet::channel", channel, emitted, "channel closing");
            out(Frame::close(channel)).map_err(|error| StreamError { emitted, error })?;
            Ok(emitted)
        }
        Err(failure) => {
            let category = failure.error.category();
            let message = if category.is_client_fault() || category == ErrorCategory::Cancelled {
                failure.error.to_string()
            } else {
                "internal error".to_owned()
            };
            debug!(
                target: "duet::channel",
                channel,
                emitted = failure.emitted,
                error = %failure.error,
                "channel failed"
            );
            // 错误帧投递失败时仍以原始错误为准。
            if let Err(delivery) = out(Frame::error(channel, message)) {
                debug!(
                    target: "duet::channel",
                    channel,
                    error = %delivery,
                    "error frame not delivered"
                );
            }
            Err(failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonCodec;
    use crate::schema::SchemaRegistry;

    #[test]
    fn frames_use_wire_names_and_accept_new_alias() {
        let registry = SchemaRegistry::new();
        let frame = Frame::close("c1");
        let text = JsonCodec::default().encode_to_string(&registry.marshal(&frame).expect("编码"));
        assert_eq!(text, r#"{"channel":"c1","path":"","type":"close","data":null}"#);

        let node = JsonCodec::default()
            .decode_str(r#"{"channel":"c2","path":"words","type":"new","data":{"in":"x"}}"#)
            .expect("合法帧");
        let decoded: Frame = registry.unmarshal(&node).expect("解码");
        assert_eq!(decoded.kind, FrameKind::Open);
        assert_eq!(decoded.path, "words");
    }

    #[test]
    fn unknown_frame_type_is_a_decode_error() {
        let registry = SchemaRegistry::new();
        let node = JsonCodec::default()
            .decode_str(r#"{"type":"return"}"#)
            .expect("合法 JSON");
        let error = registry.unmarshal::<Frame>(&node).expect_err("未知帧类型");
        assert_eq!(error.path().map(ToString::to_string).as_deref(), Some("type"));
    }

    #[test]
    fn null_frame_type_reads_as_data() {
        let registry = SchemaRegistry::new();
        let mut frame = Frame::close("c3");
        let node = JsonCodec::default()
            .decode_str(r#"{"channel":"c3","type":null}"#)
            .expect("合法 JSON");
        registry.unmarshal_into(&node, &mut frame).expect("null 重置为默认帧类型");
        assert_eq!(frame.kind, FrameKind::Data);
    }
}
