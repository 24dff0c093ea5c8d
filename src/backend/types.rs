//! 后端交互的数据类型：行、过滤条件、查询、变更事件、订阅范围、远程过程参数

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{ErrorCode, InfraResultExt, Result};
use crate::metrics::METRICS;

/// 后端返回的一行数据
pub type Row = serde_json::Map<String, Value>;

/// 将实体序列化为行
pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value).into_flare(ErrorCode::Internal, "row serialisation failed")? {
        Value::Object(map) => Ok(map),
        other => Err(crate::error::FlareError::internal(format!(
            "expected an object row, got {other}"
        ))),
    }
}

/// 将行反序列化为实体
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row))
        .into_flare(ErrorCode::RemoteReadFailed, "unexpected row shape")
}

/// 读取字符串列
pub fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

/// 读取整数列
pub fn row_i64(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_i64)
}

/// 统一的时间戳格式（固定精度，字典序即时间序）
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 过滤条件
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    In(String, Vec<Value>),
    /// 大小写不敏感的模式匹配，`%` 为通配符
    ILike(String, String),
}

impl Filter {
    pub fn eq<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn neq<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Filter::Neq(column.into(), value.into())
    }

    pub fn any_of<C, I, V>(column: C, values: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn ilike<C: Into<String>, P: Into<String>>(column: C, pattern: P) -> Self {
        Filter::ILike(column.into(), pattern.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _)
            | Filter::Neq(column, _)
            | Filter::In(column, _)
            | Filter::ILike(column, _) => column,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, expected) => value == expected,
            Filter::Neq(_, expected) => value != expected,
            Filter::In(_, candidates) => candidates.iter().any(|candidate| candidate == value),
            Filter::ILike(_, pattern) => value
                .as_str()
                .map(|text| ilike_matches(text, pattern))
                .unwrap_or(false),
        }
    }
}

/// `%` 通配的大小写不敏感匹配
pub fn ilike_matches(value: &str, pattern: &str) -> bool {
    let value = value.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return value == pattern;
    }

    let last = parts.len() - 1;
    let mut pos = 0;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            if !value.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if index == last {
            return value.len() >= pos + part.len() && value[pos..].ends_with(part);
        } else {
            match value[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }
    true
}

/// 排序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// 关联查询
///
/// 以 `local_key` 列的值匹配 `relation` 表的 `foreign_key` 列，结果嵌入到 `alias` 字段。
/// 后端可能返回对象、单元素数组或空值，调用方需要做形状归一化。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub relation: String,
    pub local_key: String,
    pub foreign_key: String,
    pub alias: String,
}

impl Join {
    pub fn new<R, L, A>(relation: R, local_key: L, alias: A) -> Self
    where
        R: Into<String>,
        L: Into<String>,
        A: Into<String>,
    {
        Self {
            relation: relation.into(),
            local_key: local_key.into(),
            foreign_key: "id".to_string(),
            alias: alias.into(),
        }
    }
}

/// 查询描述
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    /// 闭区间分页 [from, to]
    pub range: Option<(usize, usize)>,
    pub joins: Vec<Join>,
}

impl SelectQuery {
    pub fn from<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: Vec::new(),
            range: None,
            joins: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq<C: Into<String>, V: Into<Value>>(self, column: C, value: V) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_by<C: Into<String>>(mut self, column: C, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.range = Some((from, to));
        self
    }

    /// 按页码计算闭区间分页
    pub fn page(self, page: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let from = page * page_size;
        self.range(from, from + page_size - 1)
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }
}

/// JSON 值的排序比较（null 最小）
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务端推送的行级变更事件
///
/// 事件本身没有客户端标识，身份完全由行主键决定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    /// 插入 / 更新后的行
    pub new: Option<Row>,
    /// 更新前 / 被删除的行（删除事件可能只包含主键）
    pub old: Option<Row>,
    pub commit_ts: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn insert<T: Into<String>>(table: T, row: Row) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table: table.into(),
            new: Some(row),
            old: None,
            commit_ts: Utc::now(),
        }
    }

    pub fn update<T: Into<String>>(table: T, new: Row, old: Option<Row>) -> Self {
        Self {
            kind: ChangeKind::Update,
            table: table.into(),
            new: Some(new),
            old,
            commit_ts: Utc::now(),
        }
    }

    pub fn delete<T: Into<String>>(table: T, old: Row) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table: table.into(),
            new: None,
            old: Some(old),
            commit_ts: Utc::now(),
        }
    }

    /// 事件携带的行（删除事件取旧行）
    pub fn record(&self) -> Option<&Row> {
        match self.kind {
            ChangeKind::Delete => self.old.as_ref(),
            _ => self.new.as_ref().or(self.old.as_ref()),
        }
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.record().and_then(|row| row_str(row, "id"))
    }
}

/// 订阅范围：某张表的全部变更，或满足等值过滤的变更
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionScope {
    pub table: String,
    pub filter: Option<(String, Value)>,
}

impl SubscriptionScope {
    pub fn table<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    pub fn filtered<T, C, V>(table: T, column: C, value: V) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        V: Into<Value>,
    {
        Self {
            table: table.into(),
            filter: Some((column.into(), value.into())),
        }
    }

    /// 订阅的标识键，例如 `messages:conversation_id=eq.c1`
    pub fn key(&self) -> String {
        match &self.filter {
            Some((column, value)) => {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                format!("{}:{}=eq.{}", self.table, column, value)
            }
            None => self.table.clone(),
        }
    }

    /// 删除事件若缺少过滤列，无法判断归属，按表级投递
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        let Some((column, expected)) = &self.filter else {
            return true;
        };
        match event.record().and_then(|row| row.get(column)) {
            Some(actual) => actual == expected,
            None => event.kind == ChangeKind::Delete,
        }
    }
}

/// 取消订阅能力
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, subscription_id: u64);
}

/// 一个已打开的订阅；丢弃即取消订阅
pub struct Subscription {
    id: u64,
    scope: SubscriptionScope,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    closer: Option<Arc<dyn Unsubscribe>>,
}

impl Subscription {
    pub fn new(
        id: u64,
        scope: SubscriptionScope,
        receiver: mpsc::UnboundedReceiver<ChangeEvent>,
        closer: Arc<dyn Unsubscribe>,
    ) -> Self {
        METRICS.active_subscriptions.inc();
        Self {
            id,
            scope,
            receiver,
            closer: Some(closer),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> &SubscriptionScope {
        &self.scope
    }

    /// 等待下一个事件；订阅被关闭时返回 None
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// 取出一个已到达的事件，不等待
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// 显式关闭
    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer.unsubscribe(self.id);
            METRICS.active_subscriptions.dec();
            tracing::debug!(subscription_id = self.id, scope = %self.scope.key(), "subscription closed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}

/// 反规范化计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    PostLikes,
    PostComments,
    ProfileFollowers,
    ProfileFollowing,
}

impl Counter {
    pub fn table(&self) -> &'static str {
        match self {
            Counter::PostLikes | Counter::PostComments => "posts",
            Counter::ProfileFollowers | Counter::ProfileFollowing => "profiles",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Counter::PostLikes => "likes_count",
            Counter::PostComments => "comments_count",
            Counter::ProfileFollowers => "followers_count",
            Counter::ProfileFollowing => "following_count",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::PostLikes => "post_likes",
            Counter::PostComments => "post_comments",
            Counter::ProfileFollowers => "profile_followers",
            Counter::ProfileFollowing => "profile_following",
        }
    }
}

/// 付费内容购买请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub buyer_id: String,
    pub seller_id: String,
    pub post_id: String,
    pub price: i64,
}

/// 购买事务结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub buyer_balance: Option<i64>,
}

impl PurchaseReceipt {
    pub fn rejected<T: Into<String>>(message: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            buyer_balance: None,
        }
    }
}

/// 对象上传请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub bucket: String,
    pub folder: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: String,
}
