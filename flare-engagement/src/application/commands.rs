use flare_social_core::optimistic::{ToggleState, ViewCell};

use crate::domain::model::{Comment, ImageUpload, PostRef, PremiumAccess, PremiumPostRef};

/// 点赞 / 取消点赞命令
#[derive(Debug, Clone)]
pub struct ToggleLikeCommand {
    pub post: PostRef,
    /// 屏幕持有的点赞状态
    pub state: ViewCell<ToggleState>,
}

/// 关注 / 取消关注命令
#[derive(Debug, Clone)]
pub struct ToggleFollowCommand {
    pub profile_id: String,
    pub state: ViewCell<ToggleState>,
}

/// 发表评论命令
#[derive(Debug, Clone)]
pub struct AddCommentCommand {
    pub post: PostRef,
    pub content: String,
    /// 屏幕持有的评论列表
    pub comments: ViewCell<Vec<Comment>>,
}

/// 解锁付费帖子命令
#[derive(Debug, Clone)]
pub struct PurchasePostCommand {
    pub post: PremiumPostRef,
    pub access: ViewCell<PremiumAccess>,
}

/// 发帖命令
#[derive(Debug, Clone)]
pub struct CreatePostCommand {
    pub content: String,
    pub image: Option<ImageUpload>,
    /// 设置价格即为付费帖子
    pub price: Option<i64>,
}
