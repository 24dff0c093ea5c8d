use std::collections::HashSet;

use async_trait::async_trait;
use flare_social_core::Result;
use flare_social_core::backend::{Counter, PurchaseReceipt, PurchaseRequest};

use crate::domain::model::{
    Comment, CommentDraft, ImageUpload, NotificationDraft, NotificationKind, PointTransaction,
    Post, PostDraft, Profile,
};

/// 互动仓储接口（需要作为 trait 对象使用，保留 async-trait）
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    // 点赞
    async fn insert_like(&self, post_id: &str, user_id: &str) -> Result<()>;
    async fn delete_like(&self, post_id: &str, user_id: &str) -> Result<u64>;
    async fn has_liked(&self, post_id: &str, user_id: &str) -> Result<bool>;
    async fn liked_post_ids(&self, user_id: &str, post_ids: &[String]) -> Result<HashSet<String>>;

    // 关注
    async fn insert_follow(&self, follower_id: &str, following_id: &str) -> Result<()>;
    async fn delete_follow(&self, follower_id: &str, following_id: &str) -> Result<u64>;
    async fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool>;

    /// 原子计数器
    async fn adjust_counter(&self, counter: Counter, entity_id: &str, delta: i64) -> Result<i64>;

    // 评论
    async fn insert_comment(&self, draft: &CommentDraft) -> Result<Comment>;
    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>>;

    // 帖子
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>>;
    async fn feed_page(&self, page: usize, page_size: usize) -> Result<Vec<Post>>;
    async fn search_posts(&self, pattern: &str) -> Result<Vec<Post>>;
    async fn insert_post(&self, draft: &PostDraft) -> Result<Post>;
    async fn upload_image(&self, bucket: &str, folder: &str, image: ImageUpload) -> Result<String>;

    // 资料与积分
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;
    async fn add_points(&self, user_id: &str, delta: i64, reason: &str) -> Result<i64>;
    async fn point_history(&self, user_id: &str, limit: usize) -> Result<Vec<PointTransaction>>;

    // 付费内容
    async fn purchased_post_ids(&self, buyer_id: &str, post_ids: &[String]) -> Result<HashSet<String>>;
    async fn purchase(&self, request: &PurchaseRequest) -> Result<PurchaseReceipt>;

    // 通知
    async fn insert_notification(&self, draft: &NotificationDraft) -> Result<()>;
    async fn delete_notification(
        &self,
        user_id: &str,
        actor_id: &str,
        kind: NotificationKind,
        post_id: Option<&str>,
    ) -> Result<u64>;
}
