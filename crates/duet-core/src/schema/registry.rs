use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use super::{Object, Schema};
use crate::codec::{Decode, DecodeContext, Encode, EncodeContext, decode_new};
use crate::config::RegistryConfig;
use crate::error::Result;
use crate::json::JsonCodec;
use crate::node::Node;

type SchemaTable = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Schema 注册表。
///
/// # 教案式说明
/// - **意图 (Why)**：反射结果只依赖类型，每个类型构建一次即可在所有调用间共享；注册表是显式
///   持有的句柄而非全局单例，测试之间互不干扰。
/// - **契约 (What)**：
///   - `clone` 只复制一个 `Arc`，所有克隆共享同一缓存与配置；
///   - 读路径无锁（`ArcSwap::load`），写路径以 `rcu` 复制并发布新表，首个发布者胜出，
///     并发构建同一类型时其余结果被丢弃，调用方拿到的总是已发布的那份；
///   - 构建失败（标签非法、字段冲突）不会写入缓存，每次请求都会重新报告同一错误。
/// - **执行逻辑 (How)**：表中以 `Arc<dyn Any>` 存放 `Schema<T>`，取用时 `Arc::downcast` 还原类型；
///   构建内嵌类型时递归调用 [`SchemaRegistry::schema`]，期间不持有任何锁。
/// - **设计权衡 (Trade-offs)**：每次发布复制整张表，写入代价随类型数线性增长；类型集合在进程
///   启动后很快稳定，读多写少，换来调用路径上的零竞争。
#[derive(Clone)]
pub struct SchemaRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    config: RegistryConfig,
    schemas: ArcSwap<SchemaTable>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("config", &self.inner.config)
            .field("schemas", &self.len())
            .finish()
    }
}

impl SchemaRegistry {
    /// 以默认配置创建注册表。
    pub fn new() -> Self {
        Self::from_validated(RegistryConfig::default())
    }

    /// 以自定义配置创建注册表，配置非法时返回 `InvalidConfig`。
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                schemas: ArcSwap::from_pointee(SchemaTable::new()),
            }),
        }
    }

    /// 构建时使用的配置。
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// 已缓存的类型数。
    pub fn len(&self) -> usize {
        self.inner.schemas.load().len()
    }

    /// 尚未缓存任何 Schema。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 类型 `T` 的 Schema 是否已发布。
    pub fn contains<T: 'static>(&self) -> bool {
        self.inner.schemas.load().contains_key(&TypeId::of::<T>())
    }

    /// 取得（必要时构建）类型 `T` 的 Schema。
    pub fn schema<T: Object>(&self) -> Result<Arc<Schema<T>>> {
        let id = TypeId::of::<T>();
        if let Some(cached) = self.lookup::<T>(id) {
            return Ok(cached);
        }

        let built: Arc<dyn Any + Send + Sync> = match Schema::<T>::build(self) {
            Ok(schema) => Arc::new(schema),
            Err(error) => {
                warn!(
                    target: "duet::schema",
                    type_name = type_name::<T>(),
                    code = error.code(),
                    %error,
                    "schema construction failed"
                );
                return Err(error);
            }
        };
        self.inner.schemas.rcu(|current| {
            let mut next = SchemaTable::clone(current);
            next.entry(id).or_insert_with(|| Arc::clone(&built));
            next
        });
        debug!(target: "duet::schema", type_name = type_name::<T>(), "schema published");

        self.lookup::<T>(id).ok_or_else(|| {
            crate::error::DuetError::internal(format!(
                "schema for {} vanished after publication",
                type_name::<T>()
            ))
        })
    }

    fn lookup<T: Object>(&self, id: TypeId) -> Option<Arc<Schema<T>>> {
        let table = self.inner.schemas.load();
        let entry = table.get(&id)?;
        Arc::clone(entry).downcast::<Schema<T>>().ok()
    }

    /// 以完整视图把值投影为节点。
    pub fn marshal<T: Encode + ?Sized>(&self, value: &T) -> Result<Node> {
        value.encode(&mut EncodeContext::new(self))
    }

    /// 从节点解码出新值。
    pub fn unmarshal<T: Decode + Default>(&self, node: &Node) -> Result<T> {
        decode_new(node, &mut DecodeContext::new(self))
    }

    /// 把节点覆写到既有值上。
    pub fn unmarshal_into<T: Decode + ?Sized>(&self, node: &Node, target: &mut T) -> Result<()> {
        target.decode_into(node, &mut DecodeContext::new(self))
    }

    /// [`SchemaRegistry::marshal`] 后直接编码为字节。
    pub fn to_json<T: Encode + ?Sized>(&self, value: &T, codec: &JsonCodec) -> Result<Vec<u8>> {
        Ok(codec.encode(&self.marshal(value)?))
    }

    /// 解码字节并从 `T::default()` 开始覆写。
    pub fn from_json<T: Decode + Default>(&self, input: &[u8], codec: &JsonCodec) -> Result<T> {
        self.unmarshal(&codec.decode(input)?)
    }
}
