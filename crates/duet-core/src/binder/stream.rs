use std::ops::Deref;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use super::Binding;
use crate::codec::{DecodeContext, EncodeContext};
use crate::contract::{CallContext, Cancellation};
use crate::error::{BoxError, DuetError, Result};
use crate::node::Node;
use crate::schema::{Object, Schema, SchemaRegistry};

/// 流式工作单元：执行期间通过 [`Emitter`] 发射零个或多个条目。
///
/// 返回 `Ok` 表示流正常结束；返回错误表示流在已发射的条目之后失败，已发射的条目不会撤回。
pub trait StreamingOperation: Object + Clone {
    type Item: Object;

    fn stream(
        &mut self,
        cx: &CallContext,
        emitter: &mut Emitter<'_, Self::Item>,
    ) -> std::result::Result<(), BoxError>;
}

/// 发射条目的去向，通常由传输层提供。
pub trait EmitSink {
    fn deliver(&mut self, item: Node) -> Result<()>;
}

impl<F: FnMut(Node) -> Result<()>> EmitSink for F {
    fn deliver(&mut self, item: Node) -> Result<()> {
        self(item)
    }
}

/// 收集到内存，便于测试与进程内调用。
impl EmitSink for Vec<Node> {
    fn deliver(&mut self, item: Node) -> Result<()> {
        self.push(item);
        Ok(())
    }
}

/// 流式发射器。
///
/// # 教案式说明
/// - **意图 (Why)**：执行体只面对类型化的条目，编码、取消检查与投递由发射器统一完成。
/// - **契约 (What)**：
///   - 每次 `emit` 先检查取消位，已取消则返回 `Cancelled` 且不投递；
///   - 条目按其响应视图编码，与单次调用的 `server_send` 规则一致；
///   - 只有投递成功的条目才计入 [`Emitter::emitted`]。
pub struct Emitter<'a, I> {
    registry: &'a SchemaRegistry,
    schema: &'a Schema<I>,
    cancellation: &'a Cancellation,
    sink: &'a mut dyn EmitSink,
    emitted: usize,
    refused: bool,
}

impl<'a, I: Object> Emitter<'a, I> {
    pub(crate) fn new(
        registry: &'a SchemaRegistry,
        schema: &'a Schema<I>,
        cancellation: &'a Cancellation,
        sink: &'a mut dyn EmitSink,
    ) -> Self {
        Self {
            registry,
            schema,
            cancellation,
            sink,
            emitted: 0,
            refused: false,
        }
    }

    pub fn emit(&mut self, item: &I) -> Result<()> {
        if let Err(error) = self.cancellation.check() {
            if !self.refused {
                debug!(
                    target: "duet::stream",
                    emitted = self.emitted,
                    reason = self.cancellation.reason(),
                    "emission refused after cancellation"
                );
            }
            self.refused = true;
            return Err(error);
        }
        let node = self
            .schema
            .response_view()
            .encode(item, &mut EncodeContext::new(self.registry))?;
        self.sink.deliver(node)?;
        self.emitted += 1;
        trace!(target: "duet::stream", emitted = self.emitted, "item delivered");
        Ok(())
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// 流在发射若干条目之后失败。
#[derive(Debug, Error)]
#[error("stream failed after {emitted} item(s): {error}")]
pub struct StreamError {
    /// 失败前已投递的条目数。
    pub emitted: usize,
    #[source]
    pub error: DuetError,
}

impl StreamError {
    fn before_emission(error: DuetError) -> Self {
        Self { emitted: 0, error }
    }
}

/// 流式操作的绑定。
///
/// 请求方向与 [`Binding`] 相同；响应方向改为逐条发射，条目类型的 Schema 在构造时一并解析。
pub struct StreamBinder<T: StreamingOperation> {
    binding: Binding<T>,
    item_schema: Arc<Schema<T::Item>>,
}

impl<T: StreamingOperation> Deref for StreamBinder<T> {
    type Target = Binding<T>;

    fn deref(&self) -> &Self::Target {
        &self.binding
    }
}

impl<T: StreamingOperation> StreamBinder<T> {
    pub fn new(registry: &SchemaRegistry, prototype: T) -> Result<Self> {
        let binding = Binding::new(registry, prototype)?;
        let item_schema = registry.schema::<T::Item>()?;
        Ok(Self {
            binding,
            item_schema,
        })
    }

    pub fn binding(&self) -> &Binding<T> {
        &self.binding
    }

    pub fn item_schema(&self) -> &Schema<T::Item> {
        &self.item_schema
    }

    /// 接收请求并运行流，返回投递的条目数。
    pub fn serve(
        &self,
        payload: &[u8],
        cx: &CallContext,
        sink: &mut dyn EmitSink,
    ) -> std::result::Result<usize, StreamError> {
        let mut op = self
            .server_receive(payload, cx.identity())
            .map_err(StreamError::before_emission)?;
        self.run(&mut op, cx, sink)
    }

    pub fn serve_node(
        &self,
        payload: &Node,
        cx: &CallContext,
        sink: &mut dyn EmitSink,
    ) -> std::result::Result<usize, StreamError> {
        let mut op = self
            .server_receive_node(payload, cx.identity())
            .map_err(StreamError::before_emission)?;
        self.run(&mut op, cx, sink)
    }

    /// 在已接收的实例上运行流。
    pub fn run(
        &self,
        op: &mut T,
        cx: &CallContext,
        sink: &mut dyn EmitSink,
    ) -> std::result::Result<usize, StreamError> {
        cx.cancellation()
            .check()
            .map_err(StreamError::before_emission)?;

        let mut emitter = Emitter::new(
            self.binding.registry(),
            &self.item_schema,
            cx.cancellation(),
            sink,
        );
        let outcome = op.stream(cx, &mut emitter);
        let emitted = emitter.emitted();
        let refused = emitter.refused;

        let failure = match outcome {
            Err(error) => Some(DuetError::from_execution(error)),
            // 执行体吞掉了取消错误，仍需把取消原因作为终止结果报告。
            Ok(()) if refused => Some(
                cx.cancellation()
                    .check()
                    .err()
                    .unwrap_or_else(|| DuetError::cancelled("cancelled")),
            ),
            Ok(()) => None,
        };
        match failure {
            None => {
                debug!(
                    target: "duet::stream",
                    operation = self.schema().short_name(),
                    emitted,
                    "stream completed"
                );
                Ok(emitted)
            }
            Some(error) => {
                debug!(
                    target: "duet::stream",
                    operation = self.schema().short_name(),
                    tracking = cx.tracking_id(),
                    emitted,
                    code = error.code(),
                    %error,
                    "stream terminated with error"
                );
                Err(StreamError { emitted, error })
            }
        }
    }

    /// 客户端接收一个流条目。
    pub fn client_receive_item_node(&self, item: &Node) -> Result<T::Item>
    where
        T::Item: Default,
    {
        let mut value = T::Item::default();
        self.item_schema.response_view().decode_into(
            &mut value,
            item,
            &mut DecodeContext::new(self.binding.registry()),
        )?;
        Ok(value)
    }

    pub fn client_receive_item(&self, item: &[u8]) -> Result<T::Item>
    where
        T::Item: Default,
    {
        let node = self.decoder().decode(item)?;
        self.client_receive_item_node(&node)
    }

    /// 把整段换行分隔的 JSON 主体解码为条目列表，空行被跳过。
    pub fn client_receive_lines(&self, body: &[u8]) -> Result<Vec<T::Item>>
    where
        T::Item: Default,
    {
        body.split(|&byte| byte == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| self.client_receive_item(line))
            .collect()
    }
}

