//! 内存后端
//!
//! 在一把锁内原子地实现全部后端能力，并把行级变更推送给匹配的订阅。
//! 支持按操作注入故障、切换关联结果形状、切换删除事件载荷形状。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{
    ChangeEvent, Counter, Filter, Join, PurchaseReceipt, PurchaseRequest, Row, SelectQuery,
    Subscription, SubscriptionScope, Unsubscribe, UploadRequest, compare_values,
    format_timestamp, row_i64, row_str,
};
use super::{
    ObjectStorage, ProcedureCapability, QueryCapability, SubscriptionCapability, WriteCapability,
};
use crate::config::FlareSocialConfig;
use crate::error::{ErrorCode, FlareError, Result};

/// 关联结果的返回形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinShape {
    /// `{"profiles": {...}}`
    #[default]
    Object,
    /// `{"profiles": [{...}]}`
    Array,
}

#[derive(Debug, Clone)]
struct BackendOptions {
    join_shape: JoinShape,
    full_delete_payloads: bool,
    public_base_url: String,
    unique_keys: HashMap<String, Vec<Vec<String>>>,
}

/// 内存后端构建器
pub struct InMemoryBackendBuilder {
    options: BackendOptions,
}

impl Default for InMemoryBackendBuilder {
    fn default() -> Self {
        let mut unique_keys = HashMap::new();
        for (table, columns) in [
            ("likes", vec!["post_id", "user_id"]),
            ("follows", vec!["follower_id", "following_id"]),
            ("post_purchases", vec!["post_id", "buyer_id"]),
            ("message_reactions", vec!["message_id", "user_id", "emoji"]),
        ] {
            unique_keys.insert(
                table.to_string(),
                vec![columns.into_iter().map(str::to_string).collect()],
            );
        }

        Self {
            options: BackendOptions {
                join_shape: JoinShape::Object,
                full_delete_payloads: false,
                public_base_url: "https://storage.local".to_string(),
                unique_keys,
            },
        }
    }
}

impl InMemoryBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从客户端配置初始化
    pub fn from_config(config: &FlareSocialConfig) -> Self {
        let mut builder = Self::default().full_delete_payloads(config.realtime.full_delete_payloads);
        let profile = config.media_profile.as_deref().unwrap_or("media");
        if let Some(base) = config
            .object_store_profile(profile)
            .and_then(|store| store.public_base_url.clone())
        {
            builder = builder.public_base_url(base);
        }
        builder
    }

    pub fn join_shape(mut self, shape: JoinShape) -> Self {
        self.options.join_shape = shape;
        self
    }

    pub fn full_delete_payloads(mut self, enabled: bool) -> Self {
        self.options.full_delete_payloads = enabled;
        self
    }

    pub fn public_base_url<T: Into<String>>(mut self, url: T) -> Self {
        self.options.public_base_url = url.into();
        self
    }

    /// 声明唯一约束
    pub fn unique_key(mut self, table: &str, columns: &[&str]) -> Self {
        self.options
            .unique_keys
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn build(self) -> InMemoryBackend {
        InMemoryBackend {
            state: Mutex::new(MemoryState::default()),
            hub: Arc::new(SubscriptionHub::default()),
            faults: DashMap::new(),
            objects: DashMap::new(),
            options: self.options,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    last_ts: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// 单调递增的服务端时间戳
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let ts = match self.last_ts {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_ts = Some(ts);
        ts
    }

    fn table(&self, name: &str) -> &[Row] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn table_mut(&mut self, name: &str) -> &mut Vec<Row> {
        self.tables.entry(name.to_string()).or_default()
    }

    fn find_index(&self, table: &str, id: &str) -> Option<usize> {
        self.table(table)
            .iter()
            .position(|row| row_str(row, "id") == Some(id))
    }
}

#[derive(Default)]
struct SubscriptionHub {
    next_id: AtomicU64,
    channels: DashMap<u64, (SubscriptionScope, mpsc::UnboundedSender<ChangeEvent>)>,
}

impl SubscriptionHub {
    fn publish(&self, event: &ChangeEvent) {
        for entry in self.channels.iter() {
            let (scope, sender) = entry.value();
            if scope.matches(event) && sender.send(event.clone()).is_err() {
                debug!(subscription_id = *entry.key(), "dropping event for closed receiver");
            }
        }
    }
}

impl Unsubscribe for SubscriptionHub {
    fn unsubscribe(&self, subscription_id: u64) {
        self.channels.remove(&subscription_id);
    }
}

/// 已上传对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// 内存后端
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    hub: Arc<SubscriptionHub>,
    faults: DashMap<String, u32>,
    objects: DashMap<String, StoredObject>,
    options: BackendOptions,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        InMemoryBackendBuilder::default().build()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryBackendBuilder {
        InMemoryBackendBuilder::new()
    }

    /// 令下一次指定操作失败，例如 `insert:likes`、`rpc:adjust_counter`
    pub fn fail_next(&self, operation: &str) {
        self.fail_times(operation, 1);
    }

    /// 令接下来 n 次指定操作失败
    pub fn fail_times(&self, operation: &str, times: u32) {
        *self.faults.entry(operation.to_string()).or_insert(0) += times;
    }

    /// 直接写入初始数据，不触发故障与变更推送
    pub async fn seed(&self, table: &str, value: Value) -> Row {
        let mut row = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Row::new();
                map.insert("value".into(), other);
                map
            }
        };
        let mut state = self.state.lock().await;
        let ts = state.next_timestamp();
        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        row.entry("created_at")
            .or_insert_with(|| Value::String(format_timestamp(ts)));
        state.table_mut(table).push(row.clone());
        row
    }

    /// 表内全部行（按写入顺序）
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.state.lock().await.table(table).to_vec()
    }

    /// 按主键读取一行
    pub async fn find(&self, table: &str, id: &str) -> Option<Row> {
        let state = self.state.lock().await;
        state
            .find_index(table, id)
            .map(|index| state.table(table)[index].clone())
    }

    /// 满足过滤条件的行数
    pub async fn count(&self, table: &str, filters: &[Filter]) -> usize {
        let state = self.state.lock().await;
        state
            .table(table)
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .count()
    }

    /// 当前打开的订阅数
    pub fn active_subscriptions(&self) -> usize {
        self.hub.channels.len()
    }

    /// 直接推送一个变更事件（模拟重放或他端写入）
    pub fn emit(&self, event: ChangeEvent) {
        self.hub.publish(&event);
    }

    /// 按存储键读取已上传对象
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    fn check_fault(&self, operation: &str) -> Result<()> {
        let triggered = match self.faults.get_mut(operation) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if !triggered {
            return Ok(());
        }

        warn!(operation, "injected backend failure");
        let code = match operation.split(':').next().unwrap_or_default() {
            "select" => ErrorCode::RemoteReadFailed,
            "rpc" => ErrorCode::ProcedureFailed,
            "subscribe" => ErrorCode::SubscriptionFailed,
            "upload" => ErrorCode::StorageFailed,
            _ => ErrorCode::RemoteWriteFailed,
        };
        Err(FlareError::new(
            code,
            format!("injected failure for {operation}"),
        ))
    }

    /// 删除 / 更新事件的旧行载荷
    fn old_payload(&self, row: &Row) -> Row {
        if self.options.full_delete_payloads {
            return row.clone();
        }
        let mut key_only = Row::new();
        if let Some(id) = row.get("id") {
            key_only.insert("id".into(), id.clone());
        }
        key_only
    }

    fn publish_all(&self, events: Vec<ChangeEvent>) {
        for event in &events {
            self.hub.publish(event);
        }
    }

    fn resolve_joins(&self, state: &MemoryState, mut row: Row, joins: &[Join]) -> Row {
        for join in joins {
            let related = row.get(&join.local_key).and_then(|key| {
                state
                    .table(&join.relation)
                    .iter()
                    .find(|candidate| candidate.get(&join.foreign_key) == Some(key))
                    .cloned()
            });
            let embedded = match (self.options.join_shape, related) {
                (JoinShape::Object, Some(found)) => Value::Object(found),
                (JoinShape::Object, None) => Value::Null,
                (JoinShape::Array, Some(found)) => Value::Array(vec![Value::Object(found)]),
                (JoinShape::Array, None) => Value::Array(Vec::new()),
            };
            row.insert(join.alias.clone(), embedded);
        }
        row
    }

    fn insert_locked(
        &self,
        state: &mut MemoryState,
        table: &str,
        mut row: Row,
    ) -> Result<(Row, ChangeEvent)> {
        let ts = state.next_timestamp();
        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        row.entry("created_at")
            .or_insert_with(|| Value::String(format_timestamp(ts)));

        if let Some(constraints) = self.options.unique_keys.get(table) {
            for columns in constraints {
                let clash = state.table(table).iter().any(|existing| {
                    columns
                        .iter()
                        .all(|column| existing.get(column) == row.get(column))
                });
                if clash {
                    return Err(FlareError::new(
                        ErrorCode::AlreadyExists,
                        format!("duplicate key on {table} ({})", columns.join(", ")),
                    ));
                }
            }
        }
        if let Some(id) = row_str(&row, "id") {
            if state.find_index(table, id).is_some() {
                return Err(FlareError::new(
                    ErrorCode::AlreadyExists,
                    format!("duplicate primary key {id} on {table}"),
                ));
            }
        }

        state.table_mut(table).push(row.clone());
        let event = ChangeEvent::insert(table, row.clone());
        Ok((row, event))
    }

    fn update_locked(
        &self,
        state: &mut MemoryState,
        table: &str,
        filters: &[Filter],
        changes: &Row,
        events: &mut Vec<ChangeEvent>,
    ) -> u64 {
        let ts = format_timestamp(state.next_timestamp());
        let mut affected = 0;
        let mut updated = Vec::new();
        for row in state.table_mut(table).iter_mut() {
            if !filters.iter().all(|filter| filter.matches(row)) {
                continue;
            }
            let before = row.clone();
            for (column, value) in changes {
                row.insert(column.clone(), value.clone());
            }
            row.insert("updated_at".into(), Value::String(ts.clone()));
            affected += 1;
            updated.push((row.clone(), before));
        }
        for (row, before) in updated {
            events.push(ChangeEvent::update(table, row, Some(self.old_payload(&before))));
        }
        affected
    }

    fn add_points_locked(
        &self,
        state: &mut MemoryState,
        user_id: &str,
        delta: i64,
        reason: &str,
        events: &mut Vec<ChangeEvent>,
    ) -> Result<i64> {
        let index = state.find_index("profiles", user_id).ok_or_else(|| {
            FlareError::new(ErrorCode::NotFound, format!("profile {user_id} not found"))
        })?;
        let current = row_i64(&state.table("profiles")[index], "points").unwrap_or(0);
        let total = (current + delta).max(0);

        let mut ledger = Row::new();
        ledger.insert("user_id".into(), json!(user_id));
        ledger.insert("amount".into(), json!(delta));
        ledger.insert("reason".into(), json!(reason));
        let (_, event) = self.insert_locked(state, "point_transactions", ledger)?;
        events.push(event);

        let mut changes = Row::new();
        changes.insert("points".into(), json!(total));
        self.update_locked(
            state,
            "profiles",
            &[Filter::eq("id", user_id)],
            &changes,
            events,
        );
        Ok(total)
    }
}

#[async_trait]
impl QueryCapability for InMemoryBackend {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        self.check_fault(&format!("select:{}", query.table))?;
        let state = self.state.lock().await;

        let mut rows: Vec<Row> = state
            .table(&query.table)
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();

        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                for order in &query.order {
                    let left = a.get(&order.column).unwrap_or(&Value::Null);
                    let right = b.get(&order.column).unwrap_or(&Value::Null);
                    let ordering = compare_values(left, right);
                    let ordering = if order.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                    if ordering.is_ne() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        if let Some((from, to)) = query.range {
            rows = rows
                .into_iter()
                .skip(from)
                .take(to.saturating_sub(from).saturating_add(1))
                .collect();
        }

        Ok(rows
            .into_iter()
            .map(|row| self.resolve_joins(&state, row, &query.joins))
            .collect())
    }
}

#[async_trait]
impl WriteCapability for InMemoryBackend {
    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        self.check_fault(&format!("insert:{table}"))?;
        let (row, event) = {
            let mut state = self.state.lock().await;
            self.insert_locked(&mut state, table, row)?
        };
        self.hub.publish(&event);
        Ok(row)
    }

    async fn update(&self, table: &str, filters: &[Filter], changes: Row) -> Result<u64> {
        self.check_fault(&format!("update:{table}"))?;
        let mut events = Vec::new();
        let affected = {
            let mut state = self.state.lock().await;
            self.update_locked(&mut state, table, filters, &changes, &mut events)
        };
        self.publish_all(events);
        Ok(affected)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        self.check_fault(&format!("delete:{table}"))?;
        let removed = {
            let mut state = self.state.lock().await;
            let rows = state.table_mut(table);
            let (removed, kept): (Vec<Row>, Vec<Row>) = rows
                .drain(..)
                .partition(|row| filters.iter().all(|filter| filter.matches(row)));
            *rows = kept;
            removed
        };
        let affected = removed.len() as u64;
        self.publish_all(
            removed
                .iter()
                .map(|row| ChangeEvent::delete(table, self.old_payload(row)))
                .collect(),
        );
        Ok(affected)
    }
}

#[async_trait]
impl ProcedureCapability for InMemoryBackend {
    async fn adjust_counter(&self, counter: Counter, entity_id: &str, delta: i64) -> Result<i64> {
        self.check_fault("rpc:adjust_counter")?;
        let mut events = Vec::new();
        let value = {
            let mut state = self.state.lock().await;
            let index = state.find_index(counter.table(), entity_id).ok_or_else(|| {
                FlareError::new(
                    ErrorCode::NotFound,
                    format!("{} {entity_id} not found", counter.table()),
                )
            })?;
            let current = row_i64(&state.table(counter.table())[index], counter.column()).unwrap_or(0);
            let value = (current + delta).max(0);
            let mut changes = Row::new();
            changes.insert(counter.column().into(), json!(value));
            self.update_locked(
                &mut state,
                counter.table(),
                &[Filter::eq("id", entity_id)],
                &changes,
                &mut events,
            );
            value
        };
        self.publish_all(events);
        debug!(counter = counter.as_str(), entity_id, delta, value, "counter adjusted");
        Ok(value)
    }

    async fn add_points(&self, user_id: &str, delta: i64, reason: &str) -> Result<i64> {
        self.check_fault("rpc:add_points")?;
        let mut events = Vec::new();
        let total = {
            let mut state = self.state.lock().await;
            self.add_points_locked(&mut state, user_id, delta, reason, &mut events)?
        };
        self.publish_all(events);
        debug!(user_id, delta, reason, total, "points added");
        Ok(total)
    }

    async fn purchase_post(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt> {
        self.check_fault("rpc:purchase_post")?;
        let mut events = Vec::new();
        let receipt = {
            let mut state = self.state.lock().await;
            if request.buyer_id == request.seller_id {
                return Ok(PurchaseReceipt::rejected("cannot purchase your own post"));
            }
            if state.find_index("posts", &request.post_id).is_none() {
                return Ok(PurchaseReceipt::rejected("post not found"));
            }
            let already = state.table("post_purchases").iter().any(|row| {
                row_str(row, "post_id") == Some(request.post_id.as_str())
                    && row_str(row, "buyer_id") == Some(request.buyer_id.as_str())
            });
            if already {
                return Ok(PurchaseReceipt::rejected("post already purchased"));
            }
            let balance = state
                .find_index("profiles", &request.buyer_id)
                .and_then(|index| row_i64(&state.table("profiles")[index], "points"))
                .unwrap_or(0);
            if balance < request.price {
                return Ok(PurchaseReceipt::rejected(format!(
                    "insufficient points: balance {balance}, price {}",
                    request.price
                )));
            }

            let buyer_balance = self.add_points_locked(
                &mut state,
                &request.buyer_id,
                -request.price,
                "post_purchase",
                &mut events,
            )?;
            self.add_points_locked(
                &mut state,
                &request.seller_id,
                request.price,
                "post_sale",
                &mut events,
            )?;

            let mut grant = Row::new();
            grant.insert("post_id".into(), json!(request.post_id));
            grant.insert("buyer_id".into(), json!(request.buyer_id));
            grant.insert("price".into(), json!(request.price));
            let (_, event) = self.insert_locked(&mut state, "post_purchases", grant)?;
            events.push(event);

            PurchaseReceipt {
                success: true,
                message: "purchase completed".to_string(),
                buyer_balance: Some(buyer_balance),
            }
        };
        self.publish_all(events);
        Ok(receipt)
    }

    async fn get_or_create_conversation(&self, user_a: &str, user_b: &str) -> Result<String> {
        self.check_fault("rpc:get_or_create_conversation")?;
        if user_a == user_b {
            return Err(FlareError::invalid_argument(
                "cannot start a conversation with yourself",
            ));
        }

        let (id, event) = {
            let mut state = self.state.lock().await;
            let existing = state.table("conversations").iter().find_map(|row| {
                let p1 = row_str(row, "participant1_id");
                let p2 = row_str(row, "participant2_id");
                let matches = (p1 == Some(user_a) && p2 == Some(user_b))
                    || (p1 == Some(user_b) && p2 == Some(user_a));
                if matches {
                    row_str(row, "id").map(str::to_string)
                } else {
                    None
                }
            });
            match existing {
                Some(id) => (id, None),
                None => {
                    let ts = format_timestamp(state.next_timestamp());
                    let mut row = Row::new();
                    row.insert("participant1_id".into(), json!(user_a));
                    row.insert("participant2_id".into(), json!(user_b));
                    row.insert("last_message".into(), Value::Null);
                    row.insert("last_message_at".into(), json!(ts));
                    let (row, event) = self.insert_locked(&mut state, "conversations", row)?;
                    let id = row_str(&row, "id").unwrap_or_default().to_string();
                    (id, Some(event))
                }
            }
        };
        if let Some(event) = event {
            self.hub.publish(&event);
        }
        Ok(id)
    }
}

#[async_trait]
impl SubscriptionCapability for InMemoryBackend {
    async fn subscribe(&self, scope: SubscriptionScope) -> Result<Subscription> {
        self.check_fault(&format!("subscribe:{}", scope.table))?;
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub.channels.insert(id, (scope.clone(), sender));
        debug!(subscription_id = id, scope = %scope.key(), "subscription opened");
        let closer: Arc<dyn Unsubscribe> = self.hub.clone();
        Ok(Subscription::new(id, scope, receiver, closer))
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn upload(&self, request: UploadRequest) -> Result<String> {
        self.check_fault(&format!("upload:{}", request.bucket))?;
        if request.bytes.is_empty() {
            return Err(FlareError::invalid_argument("cannot upload an empty file"));
        }

        let folder = request.folder.trim_matches('/');
        let extension = request.extension.trim_start_matches('.');
        let key = if folder.is_empty() {
            format!("{}.{extension}", Uuid::new_v4())
        } else {
            format!("{folder}/{}.{extension}", Uuid::new_v4())
        };
        let url = format!(
            "{}/{}/{}",
            self.options.public_base_url.trim_end_matches('/'),
            request.bucket,
            key
        );
        self.objects.insert(
            key.clone(),
            StoredObject {
                bucket: request.bucket,
                key,
                content_type: request.content_type,
                bytes: request.bytes,
            },
        );
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChangeKind;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_identity_and_publishes() {
        let backend = InMemoryBackend::new();
        let mut sub = backend
            .subscribe(SubscriptionScope::filtered("messages", "conversation_id", "c1"))
            .await
            .unwrap();

        let inserted = backend
            .insert("messages", row(json!({"conversation_id": "c1", "content": "hi"})))
            .await
            .unwrap();
        backend
            .insert("messages", row(json!({"conversation_id": "c2", "content": "other"})))
            .await
            .unwrap();

        assert!(row_str(&inserted, "id").is_some());
        assert!(row_str(&inserted, "created_at").is_some());
        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.primary_key(), row_str(&inserted, "id"));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unique_constraint_rejects_duplicate_like() {
        let backend = InMemoryBackend::new();
        let like = row(json!({"post_id": "p1", "user_id": "u1"}));
        backend.insert("likes", like.clone()).await.unwrap();
        let err = backend.insert("likes", like).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn test_counter_clamps_at_zero() {
        let backend = InMemoryBackend::new();
        backend.seed("posts", json!({"id": "p1", "likes_count": 0})).await;
        let value = backend
            .adjust_counter(Counter::PostLikes, "p1", -1)
            .await
            .unwrap();
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn test_open_ended_range_does_not_overflow() {
        let backend = InMemoryBackend::new();
        for n in 0..3 {
            backend.seed("notifications", json!({"user_id": "u1", "message": format!("n{n}")})).await;
        }

        let rows = backend
            .select(&SelectQuery::from("notifications").range(1, usize::MAX))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_fault_injection_is_consumed() {
        let backend = InMemoryBackend::new();
        backend.seed("posts", json!({"id": "p1", "likes_count": 1})).await;
        backend.fail_next("rpc:adjust_counter");

        let err = backend
            .adjust_counter(Counter::PostLikes, "p1", 1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ProcedureFailed);
        assert_eq!(
            backend.adjust_counter(Counter::PostLikes, "p1", 1).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_join_shapes() {
        for (shape, expect_array) in [(JoinShape::Object, false), (JoinShape::Array, true)] {
            let backend = InMemoryBackend::builder().join_shape(shape).build();
            backend.seed("profiles", json!({"id": "u1", "username": "ayse"})).await;
            backend.seed("posts", json!({"id": "p1", "user_id": "u1"})).await;

            let rows = backend
                .select(&SelectQuery::from("posts").join(Join::new("profiles", "user_id", "profiles")))
                .await
                .unwrap();
            assert_eq!(rows[0]["profiles"].is_array(), expect_array);
        }
    }

    #[tokio::test]
    async fn test_delete_payload_shape() {
        let backend = InMemoryBackend::new();
        backend
            .seed("message_reactions", json!({"id": "r1", "message_id": "m1", "user_id": "u1", "emoji": "👍"}))
            .await;
        let mut sub = backend
            .subscribe(SubscriptionScope::table("message_reactions"))
            .await
            .unwrap();

        backend
            .delete("message_reactions", &[Filter::eq("id", "r1")])
            .await
            .unwrap();
        let event = sub.try_recv().unwrap();
        let old = event.old.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(row_str(&old, "id"), Some("r1"));
    }

    #[tokio::test]
    async fn test_purchase_transfers_points() {
        let backend = InMemoryBackend::new();
        backend.seed("profiles", json!({"id": "buyer", "points": 80})).await;
        backend.seed("profiles", json!({"id": "seller", "points": 0})).await;
        backend.seed("posts", json!({"id": "p1", "user_id": "seller"})).await;
        let request = PurchaseRequest {
            buyer_id: "buyer".into(),
            seller_id: "seller".into(),
            post_id: "p1".into(),
            price: 50,
        };

        let receipt = backend.purchase_post(&request).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.buyer_balance, Some(30));
        let seller = backend.find("profiles", "seller").await.unwrap();
        assert_eq!(row_i64(&seller, "points"), Some(50));

        let again = backend.purchase_post(&request).await.unwrap();
        assert!(!again.success);
    }

    #[tokio::test]
    async fn test_conversation_is_reused_in_either_order() {
        let backend = InMemoryBackend::new();
        let first = backend.get_or_create_conversation("a", "b").await.unwrap();
        let second = backend.get_or_create_conversation("b", "a").await.unwrap();
        assert_eq!(first, second);
        assert!(backend.get_or_create_conversation("a", "a").await.is_err());
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let backend = InMemoryBackend::new();
        let sub = backend
            .subscribe(SubscriptionScope::table("notifications"))
            .await
            .unwrap();
        assert_eq!(backend.active_subscriptions(), 1);
        drop(sub);
        assert_eq!(backend.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_upload_returns_public_url() {
        let backend = InMemoryBackend::builder()
            .public_base_url("https://cdn.example")
            .build();
        let url = backend
            .upload(UploadRequest {
                bucket: "post-images".into(),
                folder: "u1".into(),
                bytes: vec![1, 2, 3],
                content_type: "image/png".into(),
                extension: "png".into(),
            })
            .await
            .unwrap();
        assert!(url.starts_with("https://cdn.example/post-images/u1/"));
        assert!(url.ends_with(".png"));
    }
}
