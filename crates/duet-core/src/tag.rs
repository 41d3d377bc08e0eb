//! # tag 模块说明
//!
//! ## 角色定位（Why）
//! - 字段上的声明式标签决定两件事：线上名，以及该字段在请求/响应两个方向上的角色；
//! - 解析在 Schema 构建时一次完成，结果 [`FieldTag`] 此后不可变。
//!
//! ## 设计要求（What）
//! - 线上名取第一个非空者：编码器专用名（`enc`，逗号前部分）→ 通用序列化名（`serde`）→ 字段标识符；
//! - 方向记号 `in`/`out`/`both`/`required`/`auth`，大小写敏感，空记号忽略；
//! - 未知记号立即返回 `InvalidTag`，绝不拖延到调用时。

use crate::error::{DuetError, Result};

/// 派生宏收集到的原始标签文本。
///
/// 空字符串表示未声明；三者均保留原文，解析统一在 [`FieldTag::classify`] 中完成。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldAttrs {
    pub api: &'static str,
    pub enc: &'static str,
    pub serde: &'static str,
}

/// 字段在传输中的方向。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 纯进程内状态或只作身份注入，不出现在请求/响应视图中。
    #[default]
    Neither,
    Input,
    Output,
    Both,
}

impl Direction {
    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::Both)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Direction::Output | Direction::Both)
    }

    fn with_input(self) -> Self {
        match self {
            Direction::Neither | Direction::Input => Direction::Input,
            Direction::Output | Direction::Both => Direction::Both,
        }
    }

    fn with_output(self) -> Self {
        match self {
            Direction::Neither | Direction::Output => Direction::Output,
            Direction::Input | Direction::Both => Direction::Both,
        }
    }
}

/// 单个字段解析后的描述。
///
/// # 教案式说明
/// - **意图 (Why)**：把标签文本一次性折算为结构化描述，视图计算与绑定层只读这些布尔量。
/// - **契约 (What)**：字段私有，仅通过访问器读取；`auth` 字段即便同时标记 `in`，其值也只来自
///   受信身份，不会从客户端载荷中解码。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldTag {
    wire_name: String,
    direction: Direction,
    required: bool,
    auth: bool,
}

impl FieldTag {
    /// 解析一个字段的标签。`type_name` 与 `ident` 仅用于错误信息与名称回退。
    pub fn classify(type_name: &'static str, ident: &str, attrs: &FieldAttrs) -> Result<Self> {
        let mut tag = FieldTag {
            wire_name: resolve_wire_name(ident, attrs),
            direction: Direction::Neither,
            required: false,
            auth: false,
        };
        for token in attrs.api.split(',').map(str::trim) {
            match token {
                "" => {}
                "in" => tag.direction = tag.direction.with_input(),
                "out" => tag.direction = tag.direction.with_output(),
                "both" => tag.direction = Direction::Both,
                "required" => tag.required = true,
                "auth" => tag.auth = true,
                other => {
                    return Err(DuetError::InvalidTag {
                        type_name,
                        field: ident.to_owned(),
                        token: other.to_owned(),
                    });
                }
            }
        }
        Ok(tag)
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_auth(&self) -> bool {
        self.auth
    }
}

/// 线上名解析：`enc` 名 → `serde` 名 → 字段标识符，取第一个非空者。
pub fn resolve_wire_name(ident: &str, attrs: &FieldAttrs) -> String {
    [name_part(attrs.enc), name_part(attrs.serde), ident]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(ident)
        .to_owned()
}

fn name_part(raw: &str) -> &str {
    raw.split_once(',').map_or(raw, |(name, _)| name).trim()
}
