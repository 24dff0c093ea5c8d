use std::sync::Arc;

use tracing::{debug, info, warn};

use flare_social_core::CommandFeedback;
use flare_social_core::optimistic::{AppendOutcome, ToggleOutcome, ToggleState};

use crate::application::commands::{
    AddCommentCommand, CreatePostCommand, PurchasePostCommand, ToggleFollowCommand,
    ToggleLikeCommand,
};
use crate::application::queries::{
    CommentsQuery, FeedQuery, HashtagQuery, LikeStatusQuery, PointHistoryQuery, ProfileQuery,
};
use crate::domain::model::{Comment, FeedItem, PointTransaction, Post, ProfileView, PurchaseOutcome};
use crate::domain::service::EngagementDomainService;

fn toggle_feedback(result: flare_social_core::Result<ToggleOutcome>) -> CommandFeedback<ToggleState> {
    match result {
        Ok(ToggleOutcome::Applied(state)) => CommandFeedback::Done(state),
        Ok(ToggleOutcome::Skipped) => CommandFeedback::Ignored,
        Err(err) => CommandFeedback::from_result(Err(err)),
    }
}

/// 互动命令处理器
///
/// 屏幕边界：所有错误在这里转换为 `CommandFeedback`，不再向外传播。
pub struct EngagementCommandHandler {
    domain_service: Arc<EngagementDomainService>,
}

impl EngagementCommandHandler {
    pub fn new(domain_service: Arc<EngagementDomainService>) -> Self {
        Self { domain_service }
    }

    /// 处理点赞命令
    pub async fn handle_toggle_like(&self, command: ToggleLikeCommand) -> CommandFeedback<ToggleState> {
        debug!(post_id = %command.post.id, "Handling toggle like command");

        let result = self
            .domain_service
            .toggle_like(&command.post, &command.state)
            .await;
        if let Err(err) = &result {
            warn!(post_id = %command.post.id, error = %err, "Toggle like failed");
        }
        toggle_feedback(result)
    }

    /// 处理关注命令
    pub async fn handle_toggle_follow(&self, command: ToggleFollowCommand) -> CommandFeedback<ToggleState> {
        debug!(profile_id = %command.profile_id, "Handling toggle follow command");

        let result = self
            .domain_service
            .toggle_follow(&command.profile_id, &command.state)
            .await;
        if let Err(err) = &result {
            warn!(profile_id = %command.profile_id, error = %err, "Toggle follow failed");
        }
        toggle_feedback(result)
    }

    /// 处理评论命令
    pub async fn handle_add_comment(&self, command: AddCommentCommand) -> CommandFeedback<Comment> {
        debug!(post_id = %command.post.id, "Handling add comment command");

        match self
            .domain_service
            .comment(&command.post, &command.content, &command.comments)
            .await
        {
            Ok(AppendOutcome::Confirmed(comment)) => {
                info!(post_id = %command.post.id, comment_id = %comment.id, "Comment added");
                CommandFeedback::Done(comment)
            }
            Ok(AppendOutcome::Skipped) => CommandFeedback::Ignored,
            Err(err) => {
                warn!(post_id = %command.post.id, error = %err, "Add comment failed");
                CommandFeedback::from_result(Err(err))
            }
        }
    }

    /// 处理付费解锁命令，成功时返回最新余额
    pub async fn handle_purchase(&self, command: PurchasePostCommand) -> CommandFeedback<i64> {
        debug!(post_id = %command.post.id, price = command.post.price, "Handling purchase command");

        match self
            .domain_service
            .purchase(&command.post, &command.access)
            .await
        {
            Ok(PurchaseOutcome::Unlocked { balance }) => CommandFeedback::Done(balance),
            Ok(PurchaseOutcome::Skipped) => CommandFeedback::Ignored,
            Err(err) => {
                warn!(post_id = %command.post.id, error = %err, "Purchase failed");
                CommandFeedback::from_result(Err(err))
            }
        }
    }

    /// 处理发帖命令
    pub async fn handle_create_post(&self, command: CreatePostCommand) -> CommandFeedback<Post> {
        debug!(
            has_image = command.image.is_some(),
            premium = command.price.is_some(),
            "Handling create post command"
        );

        let result = self
            .domain_service
            .create_post(&command.content, command.image, command.price)
            .await;
        if let Err(err) = &result {
            warn!(error = %err, "Create post failed");
        }
        CommandFeedback::from_result(result)
    }
}

/// 互动查询处理器
pub struct EngagementQueryHandler {
    domain_service: Arc<EngagementDomainService>,
}

impl EngagementQueryHandler {
    pub fn new(domain_service: Arc<EngagementDomainService>) -> Self {
        Self { domain_service }
    }

    pub async fn handle_feed(&self, query: FeedQuery) -> CommandFeedback<Vec<FeedItem>> {
        debug!(page = query.page, "Handling feed query");
        CommandFeedback::from_result(self.domain_service.feed(query.page).await)
    }

    pub async fn handle_hashtag(&self, query: HashtagQuery) -> CommandFeedback<Vec<FeedItem>> {
        debug!(tag = %query.tag, "Handling hashtag query");
        CommandFeedback::from_result(self.domain_service.search_hashtag(&query.tag).await)
    }

    pub async fn handle_comments(&self, query: CommentsQuery) -> CommandFeedback<Vec<Comment>> {
        debug!(post_id = %query.post_id, "Handling comments query");
        CommandFeedback::from_result(self.domain_service.comments(&query.post_id).await)
    }

    pub async fn handle_like_status(&self, query: LikeStatusQuery) -> CommandFeedback<bool> {
        CommandFeedback::from_result(self.domain_service.like_status(&query.post_id).await)
    }

    pub async fn handle_profile(&self, query: ProfileQuery) -> CommandFeedback<ProfileView> {
        debug!(user_id = %query.user_id, "Handling profile query");
        CommandFeedback::from_result(self.domain_service.profile(&query.user_id).await)
    }

    pub async fn handle_point_history(
        &self,
        query: PointHistoryQuery,
    ) -> CommandFeedback<Vec<PointTransaction>> {
        CommandFeedback::from_result(self.domain_service.point_history(query.limit).await)
    }
}
