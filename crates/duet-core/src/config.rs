//! 注册表配置。
//!
//! 配置只描述策略，不负责从文件加载；宿主可用 `toml`/`serde_json` 反序列化后交给
//! [`crate::SchemaRegistry::with_config`]，后者会先调用 [`RegistryConfig::validate`]。

use serde::{Deserialize, Serialize};

use crate::error::{DuetError, Result};

/// 默认嵌套深度上限。
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// 解码时遇到视图之外的键如何处理。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFields {
    /// 静默忽略，并以 `trace` 级别记录。
    #[default]
    Ignore,
    /// 返回 `UnknownField` 错误。
    Reject,
}

/// 内嵌结构体提升后出现同名线上字段时如何处理。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedCollisions {
    /// 任何冲突都在 Schema 构建时报错。
    #[default]
    Reject,
    /// 提升层级最浅的字段胜出；同一层级仍冲突则报错。
    ShallowestWins,
}

/// Schema 注册表的策略集合。
///
/// # 教案式说明
/// - **意图 (Why)**：未知字段与提升冲突的处理在不同部署中诉求不同（公网 API 倾向严格，
///   内部服务倾向宽松），因此做成显式配置而非硬编码。
/// - **契约 (What)**：`max_depth` 同时约束编码与解码的嵌套层级，必须大于 0。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub unknown_fields: UnknownFields,
    pub embed_collisions: EmbedCollisions,
    pub max_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            unknown_fields: UnknownFields::Ignore,
            embed_collisions: EmbedCollisions::Reject,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RegistryConfig {
    pub fn with_unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown_fields = policy;
        self
    }

    pub fn with_embed_collisions(mut self, policy: EmbedCollisions) -> Self {
        self.embed_collisions = policy;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(DuetError::InvalidConfig {
                detail: "max_depth must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}
