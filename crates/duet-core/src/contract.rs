//! 调用契约：取消令牌与单次调用的上下文。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::DuetError;
use crate::node::Node;

/// 取消原语。
///
/// # 设计背景（Why）
/// - 流式操作可能长时间运行，客户端断开或上游超时后需要协作式地停止后续发射。
///
/// # 逻辑解析（How）
/// - 内部以 [`AtomicBool`] 表达取消状态，通过 [`Arc`] 在调用方、执行体与发射器之间共享；
/// - `cancel_with` 首次成功时记录原因，后续调用返回 `false` 且不覆盖原因。
///
/// # 契约说明（What）
/// - **后置条件**：一旦取消成功，`is_cancelled` 对所有克隆立即可见；发射器在每次发射前检查该位。
/// - 框架不会强制中断正在运行的执行体，执行体需要自行轮询。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
    reason: OnceLock<String>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 标记取消。返回 `true` 表示本次调用首次触发取消。
    pub fn cancel(&self) -> bool {
        self.cancel_with("cancelled by caller")
    }

    /// 携带原因标记取消，原因只在首次触发时记录。
    pub fn cancel_with(&self, reason: impl Into<String>) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            let _ = self.inner.reason.set(reason.into());
        }
        first
    }

    /// 取消原因；未取消时为 `None`。
    pub fn reason(&self) -> Option<&str> {
        if !self.is_cancelled() {
            return None;
        }
        Some(self.inner.reason.get().map_or("cancelled", String::as_str))
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// 已取消时返回携带原因的 `Cancelled` 错误。
    pub fn check(&self) -> Result<(), DuetError> {
        match self.reason() {
            Some(reason) => Err(DuetError::cancelled(reason)),
            None => Ok(()),
        }
    }
}

/// 单次调用的上下文。
///
/// # 教案式说明
/// - **意图 (Why)**：执行体与绑定层需要共享三样与载荷无关的东西：取消令牌、来自受信来源的
///   身份（用于填充 `auth` 字段），以及用于关联日志与错误响应的追踪标识。
/// - **契约 (What)**：身份节点由传输层在认证之后写入，绝不来自客户端载荷。
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    cancellation: Cancellation,
    identity: Option<Node>,
    tracking_id: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_identity(mut self, identity: Node) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_tracking_id(mut self, tracking_id: impl Into<String>) -> Self {
        self.tracking_id = Some(tracking_id.into());
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn identity(&self) -> Option<&Node> {
        self.identity.as_ref()
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }
}
