//! # schema 模块说明
//!
//! ## 角色定位（Why）
//! - 把一个原生结构体的字段列表（由 `#[derive(Object)]` 声明）折算为带标签的有序 [`Schema`]；
//! - 由 Schema 派生四种角色视图：请求、响应、身份注入，以及“请求减去身份”的实际载荷视图。
//!
//! ## 设计要求（What）
//! - 字段顺序即声明顺序，内嵌结构体（`flatten`）的字段在嵌入点原位展开；
//! - 提升后线上名冲突按 [`EmbedCollisions`] 策略处理，标签错误与冲突都在构建期失败；
//! - 每个字段携带类型擦除的访问器闭包，Schema 本身 `Send + Sync`，可跨线程共享。
//!
//! ## 扩展建议（How）
//! - 外部文档生成器可遍历 [`Schema::fields`]，读取声明名、线上名、方向、必填/身份标记与
//!   Rust 类型名，无需接触访问器。

mod registry;
mod view;

pub use registry::SchemaRegistry;
pub use view::View;

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::codec::{Decode, DecodeContext, Encode, EncodeContext};
use crate::config::EmbedCollisions;
use crate::error::{DuetError, Result};
use crate::node::Node;
use crate::tag::{FieldAttrs, FieldTag};

type EncodeFn<T> = Arc<dyn Fn(&T, &mut EncodeContext<'_>) -> Result<Node> + Send + Sync>;
type DecodeFn<T> = Arc<dyn Fn(&mut T, &Node, &mut DecodeContext<'_>) -> Result<()> + Send + Sync>;
type ExpandFn<T> = Box<dyn FnOnce(&SchemaRegistry) -> Result<Vec<Field<T>>>>;

/// 可被反射的结构体。
///
/// # 教案式说明
/// - **意图 (Why)**：Rust 没有运行时反射，由派生宏在编译期生成字段清单，注册表在首次使用时
///   调用 [`Object::declare`] 构建 Schema。
/// - **契约 (What)**：`declare` 必须是纯函数，每次调用声明相同的字段；实现通常只由派生宏生成。
pub trait Object: Encode + Decode + Sized + 'static {
    fn declare(fields: &mut FieldSet<Self>);
}

/// 字段清单收集器，由 [`Object::declare`] 填充。
pub struct FieldSet<T> {
    declarations: Vec<Declaration<T>>,
}

enum Declaration<T> {
    Field {
        ident: &'static str,
        attrs: FieldAttrs,
        type_name: &'static str,
        encode: EncodeFn<T>,
        decode: DecodeFn<T>,
    },
    Embed {
        ident: &'static str,
        expand: ExpandFn<T>,
    },
}

impl<T: 'static> FieldSet<T> {
    fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    /// 声明一个普通字段。
    pub fn field<F: Encode + Decode + 'static>(
        &mut self,
        ident: &'static str,
        attrs: FieldAttrs,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        self.declarations.push(Declaration::Field {
            ident,
            attrs,
            type_name: type_name::<F>(),
            encode: Arc::new(move |value: &T, cx: &mut EncodeContext<'_>| get(value).encode(cx)),
            decode: Arc::new(move |value: &mut T, node: &Node, cx: &mut DecodeContext<'_>| {
                get_mut(value).decode_into(node, cx)
            }),
        });
        self
    }

    /// 声明一个内嵌结构体，其字段提升到当前层级。
    pub fn embed<E: Object>(
        &mut self,
        ident: &'static str,
        get: fn(&T) -> &E,
        get_mut: fn(&mut T) -> &mut E,
    ) -> &mut Self {
        self.declarations.push(Declaration::Embed {
            ident,
            expand: Box::new(move |registry: &SchemaRegistry| {
                let inner = registry.schema::<E>()?;
                Ok(inner
                    .fields()
                    .iter()
                    .map(|field| field.project(ident, get, get_mut))
                    .collect())
            }),
        });
        self
    }
}

/// Schema 中的一个字段。
pub struct Field<T> {
    name: String,
    tag: FieldTag,
    type_name: &'static str,
    depth: usize,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tag: self.tag.clone(),
            type_name: self.type_name,
            depth: self.depth,
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Field<T> {
    /// 声明名；提升字段为 `outer.inner` 形式。
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &FieldTag {
        &self.tag
    }

    pub fn wire_name(&self) -> &str {
        self.tag.wire_name()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 提升层级，直接声明的字段为 0。
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn encode_value(&self, value: &T, cx: &mut EncodeContext<'_>) -> Result<Node> {
        (self.encode)(value, cx)
    }

    pub fn decode_value(&self, target: &mut T, node: &Node, cx: &mut DecodeContext<'_>) -> Result<()> {
        (self.decode)(target, node, cx)
    }

    fn project<O: 'static>(
        &self,
        outer: &str,
        get: fn(&O) -> &T,
        get_mut: fn(&mut O) -> &mut T,
    ) -> Field<O> {
        let encode = Arc::clone(&self.encode);
        let decode = Arc::clone(&self.decode);
        Field {
            name: format!("{outer}.{}", self.name),
            tag: self.tag.clone(),
            type_name: self.type_name,
            depth: self.depth + 1,
            encode: Arc::new(move |value: &O, cx: &mut EncodeContext<'_>| encode(get(value), cx)),
            decode: Arc::new(move |value: &mut O, node: &Node, cx: &mut DecodeContext<'_>| {
                decode(get_mut(value), node, cx)
            }),
        }
    }
}

/// 视图角色。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// 全部字段，用于通用 marshal/unmarshal。
    All,
    /// 标记 `in` 或 `both` 的字段。
    Request,
    /// 标记 `out` 或 `both` 的字段。
    Response,
    /// 标记 `auth` 的字段。
    Auth,
    /// 请求视图减去身份字段，即真正从客户端字节中解码的部分。
    Payload,
}

impl Role {
    fn admits(self, tag: &FieldTag) -> bool {
        match self {
            Role::All => true,
            Role::Request => tag.direction().is_input(),
            Role::Response => tag.direction().is_output(),
            Role::Auth => tag.is_auth(),
            Role::Payload => tag.direction().is_input() && !tag.is_auth(),
        }
    }
}

/// 预先计算的视图索引：字段下标列表与线上名查找表。
#[derive(Debug)]
pub(crate) struct ViewIndex {
    picks: Vec<usize>,
    by_wire: HashMap<String, usize>,
}

impl ViewIndex {
    fn select<T: 'static>(fields: &[Field<T>], role: Role) -> Self {
        let picks: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, field)| role.admits(field.tag()))
            .map(|(index, _)| index)
            .collect();
        let by_wire = picks
            .iter()
            .map(|&index| (fields[index].wire_name().to_owned(), index))
            .collect();
        Self { picks, by_wire }
    }
}

/// 一个类型的反射描述。
///
/// # 教案式说明
/// - **意图 (Why)**：字段分类与视图划分只依赖类型本身，构建一次后由注册表缓存复用。
/// - **契约 (What)**：
///   - [`Schema::fields`] 的顺序即编码输出顺序；
///   - 线上名在 Schema 内唯一（冲突已在构建期处理）；
///   - 各视图是字段下标的子序列，保持 Schema 顺序。
/// - **设计权衡 (Trade-offs)**：五个视图在构建时全部预计算，用少量内存换取调用路径上零分配的视图访问。
pub struct Schema<T> {
    type_name: &'static str,
    fields: Vec<Field<T>>,
    all: ViewIndex,
    request: ViewIndex,
    response: ViewIndex,
    auth: ViewIndex,
    payload: ViewIndex,
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl<T: Object> Schema<T> {
    pub(crate) fn build(registry: &SchemaRegistry) -> Result<Self> {
        let type_name = type_name::<T>();
        let mut set = FieldSet::new();
        T::declare(&mut set);

        let mut fields = Vec::with_capacity(set.declarations.len());
        for declaration in set.declarations {
            match declaration {
                Declaration::Field {
                    ident,
                    attrs,
                    type_name: field_type,
                    encode,
                    decode,
                } => fields.push(Field {
                    name: ident.to_owned(),
                    tag: FieldTag::classify(type_name, ident, &attrs)?,
                    type_name: field_type,
                    depth: 0,
                    encode,
                    decode,
                }),
                Declaration::Embed { ident, expand } => {
                    let promoted = expand(registry)?;
                    debug!(
                        target: "duet::schema",
                        type_name,
                        embedded = ident,
                        promoted = promoted.len(),
                        "promoting embedded fields"
                    );
                    fields.extend(promoted);
                }
            }
        }

        let fields = resolve_collisions(type_name, fields, registry.config().embed_collisions)?;
        Ok(Self {
            type_name,
            all: ViewIndex::select(&fields, Role::All),
            request: ViewIndex::select(&fields, Role::Request),
            response: ViewIndex::select(&fields, Role::Response),
            auth: ViewIndex::select(&fields, Role::Auth),
            payload: ViewIndex::select(&fields, Role::Payload),
            fields,
        })
    }
}

impl<T: 'static> Schema<T> {
    /// 完整 Rust 类型路径。
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 去掉模块路径与泛型参数后的类型名。
    pub fn short_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    /// 按线上名查找字段。
    pub fn field(&self, wire: &str) -> Option<&Field<T>> {
        self.all.by_wire.get(wire).map(|&index| &self.fields[index])
    }

    pub fn view(&self, role: Role) -> View<'_, T> {
        let index = match role {
            Role::All => &self.all,
            Role::Request => &self.request,
            Role::Response => &self.response,
            Role::Auth => &self.auth,
            Role::Payload => &self.payload,
        };
        View::new(self, index, role)
    }

    pub fn full_view(&self) -> View<'_, T> {
        self.view(Role::All)
    }

    pub fn request_view(&self) -> View<'_, T> {
        self.view(Role::Request)
    }

    pub fn response_view(&self) -> View<'_, T> {
        self.view(Role::Response)
    }

    pub fn auth_view(&self) -> View<'_, T> {
        self.view(Role::Auth)
    }

    pub fn payload_view(&self) -> View<'_, T> {
        self.view(Role::Payload)
    }
}

/// 处理同名线上字段。
///
/// 按字段顺序遍历，保证同一类型每次报告的冲突一致。
fn resolve_collisions<T: 'static>(
    type_name: &'static str,
    fields: Vec<Field<T>>,
    policy: EmbedCollisions,
) -> Result<Vec<Field<T>>> {
    let mut by_wire: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, field) in fields.iter().enumerate() {
        by_wire.entry(field.wire_name()).or_default().push(index);
    }

    let mut keep = vec![true; fields.len()];
    for (index, field) in fields.iter().enumerate() {
        let claimants = &by_wire[field.wire_name()];
        if claimants.len() < 2 || claimants[0] != index {
            continue;
        }
        let shallowest = claimants
            .iter()
            .map(|&claimant| fields[claimant].depth)
            .min()
            .unwrap_or(0);
        let winners: Vec<usize> = claimants
            .iter()
            .copied()
            .filter(|&claimant| fields[claimant].depth == shallowest)
            .collect();
        if policy != EmbedCollisions::ShallowestWins || winners.len() != 1 {
            return Err(DuetError::FieldCollision {
                type_name,
                wire: field.wire_name().to_owned(),
                first: fields[claimants[0]].name.clone(),
                second: fields[claimants[1]].name.clone(),
            });
        }
        for &claimant in claimants {
            if claimant != winners[0] {
                debug!(
                    target: "duet::schema",
                    type_name,
                    shadowed = %fields[claimant].name,
                    winner = %fields[winners[0]].name,
                    "dropping shadowed promoted field"
                );
                keep[claimant] = false;
            }
        }
    }

    Ok(fields
        .into_iter()
        .zip(keep)
        .filter_map(|(field, kept)| kept.then_some(field))
        .collect())
}
