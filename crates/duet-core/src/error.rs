//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为 Schema 构建、节点编解码、操作执行与取消提供集中定义的错误域；
//! - 每个变体都映射到稳定的 `<域>.<原因>` 错误码与 [`ErrorCategory`]，传输适配层据此决定
//!   面向客户端的状态码，而无需解析错误文本。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，可与 `?` 和 `Box<dyn Error>` 互通；
//! - 解码类错误携带 [`FieldPath`]，指出出错的线上字段位置；
//! - 单元执行失败以 [`BoxError`] 原样保存，传输层可以向下转型识别调用方自定义的拒绝类型。

use std::error::Error as StdError;

use thiserror::Error;

use crate::path::FieldPath;

/// 操作执行体返回的开放错误类型。
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 本 crate 的统一结果别名。
pub type Result<T, E = DuetError> = std::result::Result<T, E>;

/// 稳定错误码。
///
/// 命名遵循 `<域>.<原因>`，供日志检索与告警规则引用；新增错误码只追加，不复用旧值。
pub mod codes {
    pub const SCHEMA_INVALID_TAG: &str = "schema.invalid_tag";
    pub const SCHEMA_FIELD_COLLISION: &str = "schema.field_collision";
    pub const CONFIG_INVALID: &str = "config.invalid";
    pub const DECODE_MALFORMED: &str = "decode.malformed";
    pub const DECODE_TYPE_MISMATCH: &str = "decode.type_mismatch";
    pub const DECODE_OVERFLOW: &str = "decode.overflow";
    pub const DECODE_UNKNOWN_FIELD: &str = "decode.unknown_field";
    pub const VALIDATION_MISSING_FIELD: &str = "validation.missing_field";
    pub const STRUCTURE_DEPTH_EXCEEDED: &str = "structure.depth_exceeded";
    pub const EXECUTION_FAILED: &str = "execution.failed";
    pub const CALL_CANCELLED: &str = "call.cancelled";
    pub const INTERNAL: &str = "internal";
}

/// 错误分类。
///
/// # 教案式说明
/// - **意图 (Why)**：传输适配层只关心“谁的错”与“能否重试”，分类把几十种细节收敛为少数几个桶。
/// - **契约 (What)**：`Decode`、`Overflow`、`Validation` 以及接收阶段的 `Structural` 都是客户端
///   输入问题；`Configuration`、`Execution` 与 `Internal` 属于服务端；`Cancelled` 单独处理。
/// - `Configuration` 只出现在 Schema 构建期；`Internal` 是运行期的框架或投递故障。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Decode,
    Overflow,
    Validation,
    Structural,
    Execution,
    Internal,
    Cancelled,
}

impl ErrorCategory {
    /// 该类别是否可以归咎于请求内容本身。
    pub fn is_client_fault(self) -> bool {
        matches!(
            self,
            ErrorCategory::Decode
                | ErrorCategory::Overflow
                | ErrorCategory::Validation
                | ErrorCategory::Structural
        )
    }
}

/// duet 核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：统一 Schema 构建期（配置错误）与运行期（载荷错误、执行失败、取消）的
///   失败表达，调用方通过 [`DuetError::code`] 与 [`DuetError::category`] 做机器可读判断。
/// - **契约 (What)**：
///   - 构建期错误（`InvalidTag`、`FieldCollision`、`InvalidConfig`）在首次解析类型时立即返回，
///     不会被缓存；
///   - 运行期解码错误携带线上路径，渲染与客户端看到的字段名一致；
///   - `Execution` 保留单元返回的原始错误，`source()` 可取回。
/// - **设计权衡 (Trade-offs)**：类型名使用 `&'static str`（来自 `std::any::type_name`），
///   避免为每次报错分配；字段名与原因使用 `String`，换取可读性。
#[derive(Debug, Error)]
pub enum DuetError {
    /// 字段标签包含无法识别的记号。
    #[error("invalid tag on {type_name}.{field}: unknown token {token:?}")]
    InvalidTag {
        type_name: &'static str,
        field: String,
        token: String,
    },

    /// 多个字段（通常来自内嵌结构体提升）解析到同一线上名。
    #[error("field name collision on {type_name}: wire name {wire:?} is claimed by {first} and {second}")]
    FieldCollision {
        type_name: &'static str,
        wire: String,
        first: String,
        second: String,
    },

    /// 注册表或编解码器配置不合法。
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    /// 字节流不是合法 JSON。
    #[error("malformed payload at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    /// 节点类型与目标类型不匹配。
    #[error("cannot decode {found} into {expected} at {path}")]
    TypeMismatch {
        path: FieldPath,
        expected: &'static str,
        found: &'static str,
    },

    /// 数值超出目标类型范围。
    #[error("number {literal} overflows {target} at {path}")]
    Overflow {
        path: FieldPath,
        target: &'static str,
        literal: String,
    },

    /// 必填字段缺失或为空。
    #[error("missing required field {path}")]
    MissingField { path: FieldPath },

    /// 严格模式下遇到视图之外的键。
    #[error("unknown field {path}")]
    UnknownField { path: FieldPath },

    /// 嵌套深度超过上限。
    #[error("nesting depth exceeds {limit} at {path}")]
    DepthExceeded { path: FieldPath, limit: usize },

    /// 单元执行失败。
    #[error("execution failed: {0}")]
    Execution(#[source] BoxError),

    /// 调用被取消。
    #[error("call cancelled: {reason}")]
    Cancelled { reason: String },

    /// 无法归类的内部异常。
    #[error("internal failure: {detail}")]
    Internal { detail: String },
}

impl DuetError {
    /// 包装单元返回的错误。
    ///
    /// 若错误本身就是 [`DuetError`]（例如单元内部调用了注册表并 `?` 传播），直接拆箱返回，
    /// 保留其原有分类，避免把解码错误误报为执行失败。
    pub fn from_execution(error: BoxError) -> Self {
        match error.downcast::<DuetError>() {
            Ok(inner) => *inner,
            Err(other) => DuetError::Execution(other),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        DuetError::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        DuetError::Internal {
            detail: detail.into(),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            DuetError::InvalidTag { .. } => codes::SCHEMA_INVALID_TAG,
            DuetError::FieldCollision { .. } => codes::SCHEMA_FIELD_COLLISION,
            DuetError::InvalidConfig { .. } => codes::CONFIG_INVALID,
            DuetError::Malformed { .. } => codes::DECODE_MALFORMED,
            DuetError::TypeMismatch { .. } => codes::DECODE_TYPE_MISMATCH,
            DuetError::Overflow { .. } => codes::DECODE_OVERFLOW,
            DuetError::MissingField { .. } => codes::VALIDATION_MISSING_FIELD,
            DuetError::UnknownField { .. } => codes::DECODE_UNKNOWN_FIELD,
            DuetError::DepthExceeded { .. } => codes::STRUCTURE_DEPTH_EXCEEDED,
            DuetError::Execution(_) => codes::EXECUTION_FAILED,
            DuetError::Cancelled { .. } => codes::CALL_CANCELLED,
            DuetError::Internal { .. } => codes::INTERNAL,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DuetError::InvalidTag { .. }
            | DuetError::FieldCollision { .. }
            | DuetError::InvalidConfig { .. } => ErrorCategory::Configuration,
            DuetError::Malformed { .. }
            | DuetError::TypeMismatch { .. }
            | DuetError::UnknownField { .. } => ErrorCategory::Decode,
            DuetError::Overflow { .. } => ErrorCategory::Overflow,
            DuetError::MissingField { .. } => ErrorCategory::Validation,
            DuetError::DepthExceeded { .. } => ErrorCategory::Structural,
            DuetError::Execution(_) => ErrorCategory::Execution,
            DuetError::Cancelled { .. } => ErrorCategory::Cancelled,
            DuetError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// 解码类错误的出错位置。
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            DuetError::TypeMismatch { path, .. }
            | DuetError::Overflow { path, .. }
            | DuetError::MissingField { path }
            | DuetError::UnknownField { path }
            | DuetError::DepthExceeded { path, .. } => Some(path),
            _ => None,
        }
    }
}
