//! # 后端协作者
//!
//! 客户端的全部持久状态都托管在外部后端：关系查询、行写入、原子远程过程、
//! 实时变更订阅与对象存储。本模块以能力 trait 描述这些协作接口，
//! 并提供一个内存实现用于本地运行与测试。

pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{InMemoryBackend, InMemoryBackendBuilder, JoinShape};
pub use types::{
    ChangeEvent, ChangeKind, Counter, Filter, Join, Order, PurchaseReceipt, PurchaseRequest, Row,
    SelectQuery, Subscription, SubscriptionScope, Unsubscribe, UploadRequest, format_timestamp,
    from_row, row_i64, row_str, to_row,
};

/// 查询能力
#[async_trait]
pub trait QueryCapability: Send + Sync {
    /// 按过滤、排序、分页与关联查询行
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>>;
}

/// 写入能力
#[async_trait]
pub trait WriteCapability: Send + Sync {
    /// 插入一行，返回服务端补全后的行（id、created_at）
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// 按过滤条件更新指定字段，返回受影响行数
    async fn update(&self, table: &str, filters: &[Filter], changes: Row) -> Result<u64>;

    /// 按过滤条件删除，返回受影响行数
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64>;
}

/// 原子远程过程能力
#[async_trait]
pub trait ProcedureCapability: Send + Sync {
    /// 原子增减反规范化计数器，结果不低于 0
    async fn adjust_counter(&self, counter: Counter, entity_id: &str, delta: i64) -> Result<i64>;

    /// 记录积分流水并更新用户积分总数，返回新的总数
    async fn add_points(&self, user_id: &str, delta: i64, reason: &str) -> Result<i64>;

    /// 付费内容购买事务：积分转移 + 授权访问
    async fn purchase_post(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt>;

    /// 获取或创建两个用户之间的会话，返回会话 ID
    async fn get_or_create_conversation(&self, user_a: &str, user_b: &str) -> Result<String>;
}

/// 实时订阅能力
#[async_trait]
pub trait SubscriptionCapability: Send + Sync {
    async fn subscribe(&self, scope: SubscriptionScope) -> Result<Subscription>;
}

/// 对象存储能力
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 上传对象，返回可公开访问的 URL
    async fn upload(&self, request: UploadRequest) -> Result<String>;
}

/// 完整的后端协作者
pub trait Backend:
    QueryCapability + WriteCapability + ProcedureCapability + SubscriptionCapability + ObjectStorage
{
}

impl<T> Backend for T where
    T: QueryCapability
        + WriteCapability
        + ProcedureCapability
        + SubscriptionCapability
        + ObjectStorage
{
}
