use serde::{Deserialize, Serialize};

use flare_social_core::gamification::LevelProgress;
use flare_social_core::optimistic::ListEntity;
use flare_social_core::realtime::Keyed;
use flare_social_core::session::AuthSession;

/// 作者资料快照（来自关联查询或本地会话）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<&AuthSession> for AuthorSnapshot {
    fn from(session: &AuthSession) -> Self {
        Self {
            id: session.user_id.clone(),
            username: session.username.clone(),
            full_name: session.full_name.clone(),
            avatar_url: session.avatar_url.clone(),
        }
    }
}

/// 帖子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(skip)]
    pub author: Option<AuthorSnapshot>,
}

impl Post {
    pub fn reference(&self) -> PostRef {
        PostRef {
            id: self.id.clone(),
            owner_id: self.user_id.clone(),
        }
    }

    pub fn premium_reference(&self) -> Option<PremiumPostRef> {
        self.is_premium.then(|| PremiumPostRef {
            id: self.id.clone(),
            owner_id: self.user_id.clone(),
            price: self.price,
        })
    }
}

/// 操作目标帖子的引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub id: String,
    pub owner_id: String,
}

/// 付费帖子的引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumPostRef {
    pub id: String,
    pub owner_id: String,
    pub price: i64,
}

/// 信息流条目：帖子 + 当前用户的点赞与解锁状态
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub post: Post,
    pub liked: bool,
    pub unlocked: bool,
}

/// 评论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(skip)]
    pub author: Option<AuthorSnapshot>,
}

impl Keyed for Comment {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl ListEntity for Comment {
    fn reconciles(&self, provisional: &Self) -> bool {
        self.post_id == provisional.post_id
            && self.user_id == provisional.user_id
            && self.content == provisional.content
    }
}

/// 新评论
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentDraft {
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    pub hashtags: Vec<String>,
}

/// 待上传的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: String,
}

/// 新帖子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub user_id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub hashtags: Vec<String>,
    pub is_premium: bool,
    pub price: i64,
}

/// 用户资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub following_count: i64,
}

/// 资料页
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileView {
    pub profile: Profile,
    pub level: LevelProgress,
    /// 当前用户是否关注了该资料（查看自己时为 false）
    pub is_following: bool,
}

/// 积分流水
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Purchase,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Purchase => "purchase",
        }
    }
}

/// 新通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub user_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub message: String,
}

/// 付费内容的本地视图状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PremiumAccess {
    pub unlocked: bool,
    /// 当前用户的积分余额
    pub balance: i64,
}

/// 付费解锁结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Unlocked { balance: i64 },
    Skipped,
}
