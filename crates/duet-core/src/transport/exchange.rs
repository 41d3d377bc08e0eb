use thiserror::Error;
use tracing::{debug, warn};

use crate::binder::{Binder, EmitSink, Operation, StreamBinder, StreamError, StreamingOperation};
use crate::contract::CallContext;
use crate::error::{DuetError, ErrorCategory, Result};
use crate::json::JsonCodec;
use crate::node::{Node, Pair, Pairs};

/// 客户端已断开或调用被取消时使用的非标准状态码。
pub const STATUS_CLIENT_CLOSED: u16 = 499;

/// 工作单元主动拒绝请求，并指定面向客户端的状态码。
///
/// 例如在校验业务规则失败时返回 `Rejection::bad_request("...")`；状态码低于 500 时
/// 消息原样出现在错误主体中。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Rejection {
    status: u16,
    message: String,
}

impl Rejection {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Receive,
    Execute,
    Send,
}

/// 交换失败的分类结果。
///
/// # 教案式说明
/// - **意图 (Why)**：服务器实现只需要状态码与响应主体，完整错误信息留给日志。
/// - **契约 (What)**：
///   - `status < 500` 时主体形如 `{"error":"…","tracking":"…"}`；
///   - `status >= 500` 时主体只含 `tracking`，内部细节仅通过 [`ExchangeError::message`] 供日志使用；
///   - 没有追踪标识时 `tracking` 为 `null`。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{status} {code}: {message}")]
pub struct ExchangeError {
    status: u16,
    code: &'static str,
    message: String,
    client_message: Option<String>,
    tracking: Option<String>,
}

impl ExchangeError {
    fn classify(phase: Phase, error: &DuetError, cx: &CallContext) -> Self {
        let category = error.category();
        let rejection = match error {
            DuetError::Execution(source) => source.downcast_ref::<Rejection>(),
            _ => None,
        };
        let (status, client_message) = if let Some(rejection) = rejection {
            let status = rejection.status();
            (status, (status < 500).then(|| rejection.message().to_owned()))
        } else if category == ErrorCategory::Cancelled {
            (STATUS_CLIENT_CLOSED, Some(error.to_string()))
        } else if phase != Phase::Send && category.is_client_fault() {
            (400, Some(error.to_string()))
        } else {
            (500, None)
        };

        let classified = Self {
            status,
            code: error.code(),
            message: error.to_string(),
            client_message,
            tracking: cx.tracking_id().map(str::to_owned),
        };
        if status >= 500 {
            warn!(
                target: "duet::transport",
                phase = ?phase,
                status,
                code = classified.code,
                tracking = cx.tracking_id(),
                error = %classified.message,
                "exchange failed"
            );
        } else {
            debug!(
                target: "duet::transport",
                phase = ?phase,
                status,
                code = classified.code,
                tracking = cx.tracking_id(),
                error = %classified.message,
                "exchange rejected"
            );
        }
        classified
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 完整错误信息，仅用于日志。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 对客户端可见的错误信息；5xx 为 `None`。
    pub fn client_message(&self) -> Option<&str> {
        self.client_message.as_deref()
    }

    pub fn tracking(&self) -> Option<&str> {
        self.tracking.as_deref()
    }

    pub fn body_node(&self) -> Node {
        let mut pairs = Pairs::with_capacity(2);
        if let Some(message) = &self.client_message {
            pairs.push(Pair::new("error", "error", Node::from(message.as_str())));
        }
        let tracking = self.tracking.as_deref().map_or(Node::Nil, Node::from);
        pairs.push(Pair::new("tracking", "tracking", tracking));
        Node::Pairs(pairs)
    }

    pub fn body(&self) -> Vec<u8> {
        JsonCodec::default().encode(&self.body_node())
    }
}

/// 空主体视为空对象，与无参数调用兼容。
fn effective_input(input: &[u8]) -> &[u8] {
    if input.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        input
    }
}

/// 请求/响应交换：接收 → 执行 → 发送，每个阶段的失败分别分类。
pub fn exchange<T: Operation>(
    binder: &Binder<T>,
    input: &[u8],
    cx: &CallContext,
) -> std::result::Result<Vec<u8>, ExchangeError> {
    let mut op = binder
        .server_receive(effective_input(input), cx.identity())
        .map_err(|error| ExchangeError::classify(Phase::Receive, &error, cx))?;
    binder
        .execute(&mut op, cx)
        .map_err(|error| ExchangeError::classify(Phase::Execute, &error, cx))?;
    binder
        .server_send(&op)
        .map_err(|error| ExchangeError::classify(Phase::Send, &error, cx))
}

/// 换行分隔 JSON 的累积器，每个条目一行，强制紧凑输出。
#[derive(Debug, Default)]
pub struct JsonLines {
    codec: JsonCodec,
    body: Vec<u8>,
    lines: usize,
}

impl JsonLines {
    pub fn new(codec: JsonCodec) -> Self {
        Self {
            codec: codec.with_indent(false),
            body: Vec::new(),
            lines: 0,
        }
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

impl EmitSink for JsonLines {
    fn deliver(&mut self, item: Node) -> Result<()> {
        self.body.extend_from_slice(&self.codec.encode(&item));
        self.body.push(b'\n');
        self.lines += 1;
        Ok(())
    }
}

/// 流式交换的结果。
///
/// 发射过条目之后的失败不会丢弃已写出的行，而是作为 `failure` 一并返回，由服务器决定如何
/// 终止连接。
#[derive(Debug)]
pub struct StreamBody {
    body: Vec<u8>,
    emitted: usize,
    failure: Option<ExchangeError>,
}

impl StreamBody {
    /// 没有任何输出且未失败时为 204，否则为 200。
    pub fn status(&self) -> u16 {
        if self.emitted == 0 && self.failure.is_none() {
            204
        } else {
            200
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn failure(&self) -> Option<&ExchangeError> {
        self.failure.as_ref()
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// 流式交换：输出换行分隔的 JSON。首个条目之前的失败整体作为错误返回。
pub fn exchange_stream<T: StreamingOperation>(
    binder: &StreamBinder<T>,
    input: &[u8],
    cx: &CallContext,
) -> std::result::Result<StreamBody, ExchangeError> {
    let mut op = binder
        .server_receive(effective_input(input), cx.identity())
        .map_err(|error| ExchangeError::classify(Phase::Receive, &error, cx))?;
    let mut lines = JsonLines::new(*binder.codec());
    match binder.run(&mut op, cx, &mut lines) {
        Ok(emitted) => Ok(StreamBody {
            body: lines.into_body(),
            emitted,
            failure: None,
        }),
        Err(StreamError { emitted: 0, error }) => {
            Err(ExchangeError::classify(Phase::Execute, &error, cx))
        }
        Err(StreamError { emitted, error }) => {
            warn!(
                target: "duet::transport",
                emitted,
                tracking = cx.tracking_id(),
                %error,
                "stream failed after partial output"
            );
            Ok(StreamBody {
                body: lines.into_body(),
                emitted,
                failure: Some(ExchangeError::classify(Phase::Execute, &error, cx)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_hide_details_in_body() {
        let cx = CallContext::new().with_tracking_id("t-1");
        let error = DuetError::from_execution(Box::new(std::io::Error::other("disk on fire")));
        let classified = ExchangeError::classify(Phase::Execute, &error, &cx);
        assert_eq!(classified.status(), 500);
        assert_eq!(classified.client_message(), None);
        assert_eq!(classified.body(), br#"{"tracking":"t-1"}"#.to_vec());
        assert!(classified.message().contains("disk on fire"), "日志侧保留完整信息");
    }

    #[test]
    fn rejection_status_passes_through() {
        let cx = CallContext::new();
        let error = DuetError::from_execution(Box::new(Rejection::not_found("no such key")));
        let classified = ExchangeError::classify(Phase::Execute, &error, &cx);
        assert_eq!(classified.status(), 404);
        assert_eq!(
            classified.body(),
            br#"{"error":"no such key","tracking":null}"#.to_vec()
        );
    }

    #[test]
    fn blank_input_is_an_empty_object() {
        assert_eq!(effective_input(b"  \n"), b"{}");
        assert_eq!(effective_input(b"[]"), b"[]");
    }
}
