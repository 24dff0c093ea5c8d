use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use flare_social_core::Result;
use flare_social_core::backend::{
    Backend, Counter, Filter, Join, ObjectStorage, ProcedureCapability, PurchaseReceipt,
    PurchaseRequest, QueryCapability, Row, SelectQuery, UploadRequest, WriteCapability, from_row,
    row_str,
};
use flare_social_core::utils::normalize_join;

use crate::domain::model::{
    AuthorSnapshot, Comment, CommentDraft, ImageUpload, NotificationDraft, NotificationKind,
    PointTransaction, Post, PostDraft, Profile,
};
use crate::domain::repository::EngagementRepository;

const POSTS: &str = "posts";
const COMMENTS: &str = "comments";
const PROFILES: &str = "profiles";
const LIKES: &str = "likes";
const FOLLOWS: &str = "follows";
const NOTIFICATIONS: &str = "notifications";
const POINT_TRANSACTIONS: &str = "point_transactions";
const POST_PURCHASES: &str = "post_purchases";

/// 关联作者资料的别名
const AUTHOR_ALIAS: &str = "profiles";

/// 基于后端协作接口的互动仓储
pub struct BackendEngagementRepository {
    backend: Arc<dyn Backend>,
}

impl BackendEngagementRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    fn author_join() -> Join {
        Join::new(PROFILES, "user_id", AUTHOR_ALIAS)
    }

    /// 拆出关联的作者资料后解析实体
    fn split_author(mut row: Row) -> (Row, Option<AuthorSnapshot>) {
        let author = normalize_join(row.remove(AUTHOR_ALIAS).as_ref());
        (row, author)
    }

    fn post_from_row(row: Row) -> Result<Post> {
        let (row, author) = Self::split_author(row);
        let mut post: Post = from_row(row)?;
        post.author = author;
        Ok(post)
    }

    fn comment_from_row(row: Row) -> Result<Comment> {
        let (row, author) = Self::split_author(row);
        let mut comment: Comment = from_row(row)?;
        comment.author = author;
        Ok(comment)
    }

    fn pair_filters(a: (&str, &str), b: (&str, &str)) -> [Filter; 2] {
        [Filter::eq(a.0, a.1), Filter::eq(b.0, b.1)]
    }

    async fn exists(&self, table: &str, filters: [Filter; 2]) -> Result<bool> {
        let query = filters
            .into_iter()
            .fold(SelectQuery::from(table), SelectQuery::filter)
            .range(0, 0);
        Ok(!self.backend.select(&query).await?.is_empty())
    }

    async fn matching_post_ids(
        &self,
        table: &str,
        owner_column: &str,
        owner_id: &str,
        post_ids: &[String],
    ) -> Result<HashSet<String>> {
        if post_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let query = SelectQuery::from(table)
            .eq(owner_column, owner_id)
            .filter(Filter::any_of("post_id", post_ids.iter().cloned()));
        let rows = self.backend.select(&query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row_str(row, "post_id").map(str::to_string))
            .collect())
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }
}

#[async_trait]
impl EngagementRepository for BackendEngagementRepository {
    async fn insert_like(&self, post_id: &str, user_id: &str) -> Result<()> {
        self.backend
            .insert(LIKES, Self::row(json!({"post_id": post_id, "user_id": user_id})))
            .await?;
        Ok(())
    }

    async fn delete_like(&self, post_id: &str, user_id: &str) -> Result<u64> {
        self.backend
            .delete(LIKES, &Self::pair_filters(("post_id", post_id), ("user_id", user_id)))
            .await
    }

    async fn has_liked(&self, post_id: &str, user_id: &str) -> Result<bool> {
        self.exists(LIKES, Self::pair_filters(("post_id", post_id), ("user_id", user_id)))
            .await
    }

    async fn liked_post_ids(&self, user_id: &str, post_ids: &[String]) -> Result<HashSet<String>> {
        self.matching_post_ids(LIKES, "user_id", user_id, post_ids).await
    }

    async fn insert_follow(&self, follower_id: &str, following_id: &str) -> Result<()> {
        self.backend
            .insert(
                FOLLOWS,
                Self::row(json!({"follower_id": follower_id, "following_id": following_id})),
            )
            .await?;
        Ok(())
    }

    async fn delete_follow(&self, follower_id: &str, following_id: &str) -> Result<u64> {
        self.backend
            .delete(
                FOLLOWS,
                &Self::pair_filters(("follower_id", follower_id), ("following_id", following_id)),
            )
            .await
    }

    async fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        self.exists(
            FOLLOWS,
            Self::pair_filters(("follower_id", follower_id), ("following_id", following_id)),
        )
        .await
    }

    async fn adjust_counter(&self, counter: Counter, entity_id: &str, delta: i64) -> Result<i64> {
        self.backend.adjust_counter(counter, entity_id, delta).await
    }

    async fn insert_comment(&self, draft: &CommentDraft) -> Result<Comment> {
        let inserted = self
            .backend
            .insert(
                COMMENTS,
                Self::row(json!({
                    "post_id": draft.post_id,
                    "user_id": draft.user_id,
                    "content": draft.content,
                    "hashtags": draft.hashtags,
                })),
            )
            .await?;
        let Some(id) = row_str(&inserted, "id").map(str::to_string) else {
            return Self::comment_from_row(inserted);
        };

        // 重新读取以带上作者资料；读取失败时退回插入结果
        let query = SelectQuery::from(COMMENTS)
            .eq("id", id.as_str())
            .join(Self::author_join());
        match self.backend.select(&query).await {
            Ok(mut rows) if !rows.is_empty() => Self::comment_from_row(rows.swap_remove(0)),
            Ok(_) => Self::comment_from_row(inserted),
            Err(err) => {
                warn!(comment_id = %id, error = %err, "comment re-read failed, author fields missing");
                Self::comment_from_row(inserted)
            }
        }
    }

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let query = SelectQuery::from(COMMENTS)
            .eq("post_id", post_id)
            .order_by("created_at", true)
            .join(Self::author_join());
        self.backend
            .select(&query)
            .await?
            .into_iter()
            .map(Self::comment_from_row)
            .collect()
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let query = SelectQuery::from(POSTS)
            .eq("id", post_id)
            .join(Self::author_join());
        self.backend
            .select(&query)
            .await?
            .into_iter()
            .next()
            .map(Self::post_from_row)
            .transpose()
    }

    async fn feed_page(&self, page: usize, page_size: usize) -> Result<Vec<Post>> {
        let query = SelectQuery::from(POSTS)
            .order_by("created_at", false)
            .page(page, page_size)
            .join(Self::author_join());
        self.backend
            .select(&query)
            .await?
            .into_iter()
            .map(Self::post_from_row)
            .collect()
    }

    async fn search_posts(&self, pattern: &str) -> Result<Vec<Post>> {
        let query = SelectQuery::from(POSTS)
            .filter(Filter::ilike("content", pattern))
            .order_by("created_at", false)
            .join(Self::author_join());
        self.backend
            .select(&query)
            .await?
            .into_iter()
            .map(Self::post_from_row)
            .collect()
    }

    async fn insert_post(&self, draft: &PostDraft) -> Result<Post> {
        let inserted = self
            .backend
            .insert(
                POSTS,
                Self::row(json!({
                    "user_id": draft.user_id,
                    "content": draft.content,
                    "image_url": draft.image_url,
                    "hashtags": draft.hashtags,
                    "likes_count": 0,
                    "comments_count": 0,
                    "is_premium": draft.is_premium,
                    "price": draft.price,
                })),
            )
            .await?;
        Self::post_from_row(inserted)
    }

    async fn upload_image(&self, bucket: &str, folder: &str, image: ImageUpload) -> Result<String> {
        self.backend
            .upload(UploadRequest {
                bucket: bucket.to_string(),
                folder: folder.to_string(),
                bytes: image.bytes,
                content_type: image.content_type,
                extension: image.extension,
            })
            .await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let query = SelectQuery::from(PROFILES).eq("id", user_id);
        self.backend
            .select(&query)
            .await?
            .into_iter()
            .next()
            .map(from_row)
            .transpose()
    }

    async fn add_points(&self, user_id: &str, delta: i64, reason: &str) -> Result<i64> {
        self.backend.add_points(user_id, delta, reason).await
    }

    async fn point_history(&self, user_id: &str, limit: usize) -> Result<Vec<PointTransaction>> {
        let query = SelectQuery::from(POINT_TRANSACTIONS)
            .eq("user_id", user_id)
            .order_by("created_at", false)
            .range(0, limit.saturating_sub(1));
        self.backend
            .select(&query)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }

    async fn purchased_post_ids(&self, buyer_id: &str, post_ids: &[String]) -> Result<HashSet<String>> {
        self.matching_post_ids(POST_PURCHASES, "buyer_id", buyer_id, post_ids)
            .await
    }

    async fn purchase(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt> {
        self.backend.purchase_post(request).await
    }

    async fn insert_notification(&self, draft: &NotificationDraft) -> Result<()> {
        self.backend
            .insert(
                NOTIFICATIONS,
                Self::row(json!({
                    "user_id": draft.user_id,
                    "actor_id": draft.actor_id,
                    "type": draft.kind.as_str(),
                    "post_id": draft.post_id,
                    "message": draft.message,
                    "read": false,
                })),
            )
            .await?;
        Ok(())
    }

    async fn delete_notification(
        &self,
        user_id: &str,
        actor_id: &str,
        kind: NotificationKind,
        post_id: Option<&str>,
    ) -> Result<u64> {
        let mut filters = vec![
            Filter::eq("user_id", user_id),
            Filter::eq("actor_id", actor_id),
            Filter::eq("type", kind.as_str()),
        ];
        if let Some(post_id) = post_id {
            filters.push(Filter::eq("post_id", post_id));
        }
        self.backend.delete(NOTIFICATIONS, &filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flare_social_core::backend::{InMemoryBackend, JoinShape};

    async fn seeded(shape: JoinShape) -> (Arc<InMemoryBackend>, BackendEngagementRepository) {
        let backend = Arc::new(InMemoryBackend::builder().join_shape(shape).build());
        backend
            .seed(PROFILES, json!({"id": "u1", "username": "ayse", "points": 0}))
            .await;
        backend
            .seed(POSTS, json!({"id": "p1", "user_id": "u1", "content": "Hello #rust", "hashtags": ["rust"]}))
            .await;
        let repo = BackendEngagementRepository::new(backend.clone());
        (backend, repo)
    }

    #[tokio::test]
    async fn test_author_join_is_normalised_for_both_shapes() {
        for shape in [JoinShape::Object, JoinShape::Array] {
            let (_backend, repo) = seeded(shape).await;
            let post = repo.get_post("p1").await.unwrap().unwrap();
            assert_eq!(post.author.map(|a| a.username), Some("ayse".to_string()));
        }
    }

    #[tokio::test]
    async fn test_like_rows_round_trip() {
        let (_backend, repo) = seeded(JoinShape::Object).await;
        repo.insert_like("p1", "u2").await.unwrap();
        assert!(repo.has_liked("p1", "u2").await.unwrap());

        let liked = repo
            .liked_post_ids("u2", &["p1".to_string(), "p9".to_string()])
            .await
            .unwrap();
        assert_eq!(liked, HashSet::from(["p1".to_string()]));

        assert_eq!(repo.delete_like("p1", "u2").await.unwrap(), 1);
        assert!(!repo.has_liked("p1", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_inserted_comment_carries_author() {
        let (_backend, repo) = seeded(JoinShape::Array).await;
        let comment = repo
            .insert_comment(&CommentDraft {
                post_id: "p1".into(),
                user_id: "u1".into(),
                content: "nice".into(),
                hashtags: vec![],
            })
            .await
            .unwrap();
        assert!(!comment.id.is_empty());
        assert!(comment.created_at.is_some());
        assert_eq!(comment.author.map(|a| a.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_hashtag_search_is_case_insensitive() {
        let (_backend, repo) = seeded(JoinShape::Object).await;
        let posts = repo.search_posts("%#RUST%").await.unwrap();
        assert_eq!(posts.len(), 1);
        assert!(repo.search_posts("%#go%").await.unwrap().is_empty());
    }
}
