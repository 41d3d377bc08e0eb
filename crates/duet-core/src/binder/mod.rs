//! # binder 模块说明
//!
//! ## 角色定位（Why）
//! - 把 Schema、角色视图与编解码引擎组装成四个传输函数：客户端发送、服务端接收、服务端发送、
//!   客户端接收；
//! - 同一个 `#[derive(Object)]` 类型既描述请求也描述响应，绑定层负责在两个方向上选用正确的视图。
//!
//! ## 设计要求（What）
//! - 服务端每次调用都从注册时的原型浅拷贝（`Clone`）出工作实例，共享依赖（通常包在 `Arc` 中）
//!   被保留，载荷只覆写请求视图内的字段；
//! - `auth` 字段只从 [`CallContext::identity`] 填充，客户端字节中的同名键按未知字段处理；
//!   对象身份按线上名逐字段取值，无法填充时视为服务端错误；
//! - 必填字段在解码与身份注入之后校验，缺失时报告 `MissingField`。

mod stream;

pub use stream::{EmitSink, Emitter, StreamBinder, StreamError, StreamingOperation};

use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use crate::codec::{DecodeContext, EncodeContext};
use crate::contract::CallContext;
use crate::error::{BoxError, DuetError, Result};
use crate::json::{JsonCodec, ObjectShape};
use crate::node::Node;
use crate::path::{FieldPath, Segment};
use crate::schema::{Object, Schema, SchemaRegistry};

/// 单次请求/响应的工作单元。
///
/// 执行体读取请求视图字段、写入响应视图字段；返回的错误原样交给传输层分类，若需要指定
/// 面向客户端的状态，可返回 [`crate::transport::Rejection`]。
pub trait Operation: Object + Clone {
    fn execute(&mut self, cx: &CallContext) -> std::result::Result<(), BoxError>;
}

/// 某个操作类型的四个传输函数。
///
/// # 教案式说明
/// - **意图 (Why)**：客户端与服务端共享同一份类型定义，绑定对象把“哪个方向用哪个视图”固化下来，
///   调用方只需关心字节或节点。
/// - **契约 (What)**：
///   - 构造时即解析 Schema，标签非法或字段冲突在这里失败，而不是在第一次调用时；
///   - 解码统一以 `Pairs` 形态读取对象，保留线上顺序；
///   - 字节形式与节点形式语义相同，前者只是多了一层 [`JsonCodec`]。
pub struct Binding<T> {
    registry: SchemaRegistry,
    schema: Arc<Schema<T>>,
    prototype: T,
    codec: JsonCodec,
}

impl<T: Object + Clone> Binding<T> {
    pub fn new(registry: &SchemaRegistry, prototype: T) -> Result<Self> {
        let schema = registry.schema::<T>()?;
        debug!(
            target: "duet::binder",
            operation = schema.short_name(),
            request = schema.payload_view().len(),
            auth = schema.auth_view().len(),
            response = schema.response_view().len(),
            "operation bound"
        );
        Ok(Self {
            registry: registry.clone(),
            schema,
            prototype,
            codec: JsonCodec::default().with_max_depth(registry.config().max_depth),
        })
    }

    /// 替换编码使用的 JSON 选项（例如缩进）；解码始终按 `Pairs` 形态读取。
    pub fn with_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn schema(&self) -> &Schema<T> {
        &self.schema
    }

    pub fn prototype(&self) -> &T {
        &self.prototype
    }

    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    /// 路由标签：首字母小写的类型短名，如 `WordFilter` → `wordFilter`。
    pub fn name(&self) -> String {
        lower_camel(self.schema.short_name())
    }

    pub(crate) fn decoder(&self) -> JsonCodec {
        self.codec.with_objects(ObjectShape::Pairs)
    }

    /// 客户端发送：编码载荷视图（请求视图减去身份字段）。
    pub fn client_send_node(&self, op: &T) -> Result<Node> {
        self.schema
            .payload_view()
            .encode(op, &mut EncodeContext::new(&self.registry))
    }

    pub fn client_send(&self, op: &T) -> Result<Vec<u8>> {
        Ok(self.codec.encode(&self.client_send_node(op)?))
    }

    /// 服务端接收：克隆原型、覆写载荷视图、注入身份字段、校验必填项。
    pub fn server_receive_node(&self, payload: &Node, identity: Option<&Node>) -> Result<T> {
        let mut instance = self.prototype.clone();
        self.overlay_request(&mut instance, payload, identity)
            .inspect_err(|error| self.log_rejected(error))?;
        Ok(instance)
    }

    pub fn server_receive(&self, payload: &[u8], identity: Option<&Node>) -> Result<T> {
        let node = self
            .decoder()
            .decode(payload)
            .inspect_err(|error| self.log_rejected(error))?;
        self.server_receive_node(&node, identity)
    }

    fn log_rejected(&self, error: &DuetError) {
        debug!(
            target: "duet::binder",
            operation = self.schema.short_name(),
            code = error.code(),
            %error,
            "request rejected"
        );
    }

    /// 在既有实例上执行服务端接收的覆写与校验步骤。
    ///
    /// 身份为对象时，每个 `auth` 字段只读取同名成员；标量身份只能填充唯一的 `auth` 字段。
    /// 身份由服务端提供，填充失败报告为 [`DuetError::Internal`]，不归咎于客户端。
    pub fn overlay_request(&self, instance: &mut T, payload: &Node, identity: Option<&Node>) -> Result<()> {
        let mut cx = DecodeContext::new(&self.registry);
        self.schema.payload_view().decode_into(instance, payload, &mut cx)?;
        let auth = self.schema.auth_view();
        if let Some(identity) = identity.filter(|node| !node.is_nil()) {
            if !identity.is_object() && auth.len() > 1 {
                return Err(DuetError::internal(format!(
                    "{} identity cannot populate {} auth fields of {}",
                    identity.kind(),
                    auth.len(),
                    self.schema.short_name()
                )));
            }
            for field in auth.fields() {
                let Some(member) = identity_member(identity, field.wire_name(), auth.len()) else {
                    continue;
                };
                cx.descend(Segment::Field(field.wire_name().to_owned()), |cx| {
                    field.decode_value(instance, member, cx)
                })
                .map_err(|error| {
                    DuetError::internal(format!(
                        "identity does not fit auth field {}: {error}",
                        field.wire_name()
                    ))
                })?;
            }
        }
        self.validate_required(payload, identity)
    }

    fn validate_required(&self, payload: &Node, identity: Option<&Node>) -> Result<()> {
        let auth_fields = self.schema.auth_view().len();
        for field in self.schema.fields() {
            let tag = field.tag();
            if !tag.is_required() {
                continue;
            }
            let present = if tag.is_auth() {
                identity
                    .and_then(|node| identity_member(node, field.wire_name(), auth_fields))
                    .is_some()
            } else if tag.direction().is_input() {
                payload.get(field.wire_name()).is_some_and(|node| !node.is_nil())
            } else {
                true
            };
            if !present {
                return Err(DuetError::MissingField {
                    path: FieldPath::field(field.wire_name()),
                });
            }
        }
        Ok(())
    }

    /// 服务端发送：编码响应视图。
    pub fn server_send_node(&self, op: &T) -> Result<Node> {
        self.schema
            .response_view()
            .encode(op, &mut EncodeContext::new(&self.registry))
    }

    pub fn server_send(&self, op: &T) -> Result<Vec<u8>> {
        Ok(self.codec.encode(&self.server_send_node(op)?))
    }

    /// 客户端接收：把响应视图覆写到调用方持有的实例上。
    pub fn client_receive_node(&self, payload: &Node, op: &mut T) -> Result<()> {
        self.schema
            .response_view()
            .decode_into(op, payload, &mut DecodeContext::new(&self.registry))
    }

    pub fn client_receive(&self, payload: &[u8], op: &mut T) -> Result<()> {
        let node = self.decoder().decode(payload)?;
        self.client_receive_node(&node, op)
    }
}

/// 请求/响应式操作的绑定。
///
/// 通过 `Deref` 暴露 [`Binding`] 的四个传输函数，并增加执行相关的组合：[`Binder::serve`]
/// 完成服务端整条链路，[`Binder::round_trip`] 在进程内模拟一次完整的客户端往返。
pub struct Binder<T> {
    binding: Binding<T>,
}

impl<T> Deref for Binder<T> {
    type Target = Binding<T>;

    fn deref(&self) -> &Self::Target {
        &self.binding
    }
}

impl<T: Operation> Binder<T> {
    pub fn new(registry: &SchemaRegistry, prototype: T) -> Result<Self> {
        Ok(Self {
            binding: Binding::new(registry, prototype)?,
        })
    }

    pub fn with_codec(self, codec: JsonCodec) -> Self {
        Self {
            binding: self.binding.with_codec(codec),
        }
    }

    pub fn binding(&self) -> &Binding<T> {
        &self.binding
    }

    /// 执行一次工作单元；已取消的调用不会进入执行体。
    pub fn execute(&self, op: &mut T, cx: &CallContext) -> Result<()> {
        cx.cancellation().check()?;
        op.execute(cx).map_err(|error| {
            let error = DuetError::from_execution(error);
            debug!(
                target: "duet::binder",
                operation = self.schema().short_name(),
                tracking = cx.tracking_id(),
                code = error.code(),
                %error,
                "operation failed"
            );
            error
        })
    }

    /// 服务端链路：接收 → 执行 → 发送。
    pub fn serve(&self, payload: &[u8], cx: &CallContext) -> Result<Vec<u8>> {
        let mut op = self.server_receive(payload, cx.identity())?;
        self.execute(&mut op, cx)?;
        self.server_send(&op)
    }

    /// 进程内往返：客户端发送 → 服务端链路 → 客户端接收。
    pub fn round_trip(&self, op: &mut T, cx: &CallContext) -> Result<()> {
        let request = self.client_send(op)?;
        let response = self.serve(&request, cx)?;
        self.client_receive(&response, op)
    }
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 身份中对应某个 `auth` 字段的非空部分。
///
/// 对象身份按线上名取成员；只有唯一 `auth` 字段时，标量身份整体作为该字段的值。
fn identity_member<'n>(identity: &'n Node, wire: &str, auth_fields: usize) -> Option<&'n Node> {
    let member = if identity.is_object() {
        identity.get(wire)
    } else {
        (auth_fields == 1).then_some(identity)
    };
    member.filter(|node| !node.is_nil())
}
