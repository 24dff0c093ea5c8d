use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use flare_social_core::backend::{SubscriptionCapability, SubscriptionScope, format_timestamp};
use flare_social_core::hooks::{EnrichmentEvent, HookContext, HookDispatcher};
use flare_social_core::optimistic::{AppendController, AppendOutcome};
use flare_social_core::realtime::{ChangeHandler, contains_key, remove_by_key};
use flare_social_core::session::{AuthSession, SessionContext};
use flare_social_core::utils::{excerpt, is_temp_id, new_temp_id};
use flare_social_core::{ErrorCode, FlareError, Result, ensure_valid};

use super::{CONVERSATIONS, ChatFeed, InboxFeed, MESSAGES, REACTIONS};
use crate::domain::model::{
    ChatScreen, ConversationSummary, InboxScreen, Message, MessageDraft, Reaction,
    sort_by_recency,
};
use crate::domain::repository::ChatRepository;

/// 消息预览长度
const PREVIEW_CHARS: usize = 60;

/// 私信领域服务
///
/// 聊天屏幕与收件箱各自持有一组订阅；切换会话时旧订阅先释放再打开新订阅。
pub struct ChatDomainService {
    repo: Arc<dyn ChatRepository>,
    feed: Arc<dyn SubscriptionCapability>,
    session: Arc<SessionContext>,
    enrichment: HookDispatcher,
    sends: AppendController,
}

impl ChatDomainService {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        feed: Arc<dyn SubscriptionCapability>,
        session: Arc<SessionContext>,
        enrichment: HookDispatcher,
    ) -> Self {
        Self {
            repo,
            feed,
            session,
            enrichment,
            sends: AppendController::new("message"),
        }
    }

    pub fn enrichment(&self) -> &HookDispatcher {
        &self.enrichment
    }

    /// 为当前用户创建聊天屏幕
    pub async fn chat_screen(&self) -> Result<ChatScreen> {
        let viewer = self.session.current().await?;
        Ok(ChatScreen::new(viewer.user_id))
    }

    pub async fn inbox_screen(&self) -> Result<InboxScreen> {
        let viewer = self.session.current().await?;
        Ok(InboxScreen::new(viewer.user_id))
    }

    /// 与对方开始会话，已存在时返回已有会话
    pub async fn start_conversation(&self, peer_id: &str) -> Result<String> {
        let viewer = self.session.current().await?;
        ensure_valid!(!peer_id.trim().is_empty(), "peer id is required");
        ensure_valid!(
            viewer.user_id != peer_id,
            "cannot start a conversation with yourself"
        );
        let conversation_id = self
            .repo
            .get_or_create_conversation(&viewer.user_id, peer_id)
            .await?;
        info!(conversation_id = %conversation_id, peer_id, "conversation ready");
        Ok(conversation_id)
    }

    /// 打开会话：订阅消息与表情回应后加载历史
    ///
    /// 已绑定到同一会话时不做任何事并返回 `false`。
    pub async fn open_chat(&self, screen: &mut ChatScreen, conversation_id: &str) -> Result<bool> {
        let key = format!("chat:{conversation_id}");
        if screen.listener.is_bound_to(&key) {
            debug!(conversation_id, "chat already open");
            return Ok(false);
        }

        let conversation = self
            .repo
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                FlareError::new(
                    ErrorCode::NotFound,
                    format!("conversation not found: {conversation_id}"),
                )
            })?;
        if !conversation.involves(&screen.viewer_id) {
            return Err(FlareError::new(
                ErrorCode::PermissionDenied,
                "not a participant of this conversation",
            ));
        }

        screen.close().await;
        let handler: Arc<dyn ChangeHandler> =
            Arc::new(ChatFeed::new(conversation_id, screen.messages.clone()));
        screen
            .listener
            .bind(
                &key,
                self.feed.as_ref(),
                vec![
                    (
                        SubscriptionScope::filtered(MESSAGES, "conversation_id", conversation_id),
                        handler.clone(),
                    ),
                    (SubscriptionScope::table(REACTIONS), handler),
                ],
            )
            .await?;

        let messages = match self.load_messages(conversation_id).await {
            Ok(messages) => messages,
            Err(err) => {
                screen.listener.release();
                return Err(err);
            }
        };
        debug!(conversation_id, messages = messages.len(), "chat history loaded");
        screen.messages.set(messages).await;
        screen.conversation = Some(conversation);
        Ok(true)
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut messages = self.repo.list_messages(conversation_id).await?;
        let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        if ids.is_empty() {
            return Ok(messages);
        }

        let mut grouped: HashMap<String, Vec<Reaction>> = HashMap::new();
        match self.repo.list_reactions(&ids).await {
            Ok(reactions) => {
                for reaction in reactions {
                    grouped
                        .entry(reaction.message_id.clone())
                        .or_default()
                        .push(reaction);
                }
            }
            Err(err) => {
                warn!(conversation_id, error = %err, "reaction load failed, showing messages without them");
            }
        }
        for message in &mut messages {
            message.reactions = grouped.remove(&message.id).unwrap_or_default();
        }
        Ok(messages)
    }

    /// 离开聊天
    pub async fn close_chat(&self, screen: &mut ChatScreen) {
        screen.close().await;
    }

    /// 发送消息
    ///
    /// 临时消息立即出现在列表末尾，远程插入成功后原位替换；
    /// 若实时事件先到，按 `client_ref` 完成替换，列表中只保留一条。
    pub async fn send_message(
        &self,
        screen: &ChatScreen,
        content: &str,
    ) -> Result<AppendOutcome<Message>> {
        let viewer = self.session.current().await?;
        let content = content.trim();
        ensure_valid!(!content.is_empty(), "message cannot be empty");
        let conversation = screen
            .conversation
            .clone()
            .ok_or_else(|| FlareError::invalid_argument("no conversation is open"))?;
        let receiver_id = conversation
            .peer_of(&viewer.user_id)
            .ok_or_else(|| {
                FlareError::new(
                    ErrorCode::PermissionDenied,
                    "not a participant of this conversation",
                )
            })?
            .to_string();

        let temp_id = new_temp_id();
        let now = format_timestamp(Utc::now());
        let provisional = Message {
            id: temp_id.clone(),
            conversation_id: conversation.id.clone(),
            sender_id: viewer.user_id.clone(),
            receiver_id: receiver_id.clone(),
            content: content.to_string(),
            read: false,
            client_ref: Some(temp_id.clone()),
            created_at: Some(now.clone()),
            updated_at: None,
            reactions: Vec::new(),
        };
        let draft = MessageDraft {
            conversation_id: conversation.id.clone(),
            sender_id: viewer.user_id.clone(),
            receiver_id: receiver_id.clone(),
            content: content.to_string(),
            client_ref: temp_id,
        };

        let key = format!("message:{}", conversation.id);
        let outcome = self
            .sends
            .append(&key, &screen.messages, provisional, |_| {
                self.repo.insert_message(&draft)
            })
            .await?;

        if let AppendOutcome::Confirmed(message) = &outcome {
            let sent_at = message.created_at.clone().unwrap_or(now);
            if let Err(err) = self
                .repo
                .touch_conversation(&conversation.id, &message.content, &sent_at)
                .await
            {
                warn!(conversation_id = %conversation.id, error = %err, "conversation summary update failed");
            }
            self.enrich(
                &viewer,
                EnrichmentEvent::MessageSent {
                    sender_id: viewer.user_id.clone(),
                    receiver_id,
                    conversation_id: conversation.id.clone(),
                    message_id: message.id.clone(),
                    preview: excerpt(&message.content, PREVIEW_CHARS),
                },
            )
            .await;
        }
        Ok(outcome)
    }

    /// 把当前会话中发给自己的消息标记为已读
    pub async fn mark_read(&self, screen: &ChatScreen) -> Result<u64> {
        let conversation_id = screen
            .conversation_id()
            .ok_or_else(|| FlareError::invalid_argument("no conversation is open"))?;
        let viewer_id = screen.viewer_id.clone();
        let updated = self.repo.mark_read(conversation_id, &viewer_id).await?;
        screen
            .messages
            .update(|list| {
                list.iter_mut()
                    .filter(|m| m.receiver_id == viewer_id)
                    .for_each(|m| m.read = true)
            })
            .await;
        debug!(conversation_id, updated, "messages marked read");
        Ok(updated)
    }

    /// 添加表情回应
    pub async fn add_reaction(
        &self,
        screen: &ChatScreen,
        message_id: &str,
        emoji: &str,
    ) -> Result<Reaction> {
        let viewer = self.session.current().await?;
        ensure_valid!(!emoji.trim().is_empty(), "emoji is required");
        let known = screen
            .messages
            .read(|list| list.iter().any(|m| m.id == message_id && !is_temp_id(&m.id)))
            .await;
        ensure_valid!(known, "message is not loaded or not yet confirmed");

        let reaction = self
            .repo
            .insert_reaction(message_id, &viewer.user_id, emoji.trim())
            .await?;
        let local = reaction.clone();
        screen
            .messages
            .update(move |list| {
                if let Some(message) = list.iter_mut().find(|m| m.id == local.message_id) {
                    if !contains_key(&message.reactions, &local.id) {
                        message.reactions.push(local);
                    }
                }
            })
            .await;
        Ok(reaction)
    }

    /// 撤回表情回应
    pub async fn remove_reaction(&self, screen: &ChatScreen, reaction_id: &str) -> Result<()> {
        self.session.current().await?;
        self.repo.delete_reaction(reaction_id).await?;
        screen
            .messages
            .update(|list| {
                list.iter_mut()
                    .any(|m| remove_by_key(&mut m.reactions, reaction_id).is_some())
            })
            .await;
        Ok(())
    }

    /// 打开收件箱：订阅消息与会话表后加载会话列表
    pub async fn open_inbox(&self, screen: &mut InboxScreen) -> Result<bool> {
        let key = format!("inbox:{}", screen.viewer_id);
        if screen.listener.is_bound_to(&key) {
            return Ok(false);
        }

        let handler: Arc<dyn ChangeHandler> = Arc::new(InboxFeed::new(
            screen.viewer_id.clone(),
            screen.conversations.clone(),
            self.repo.clone(),
        ));
        screen
            .listener
            .bind(
                &key,
                self.feed.as_ref(),
                vec![
                    (SubscriptionScope::table(MESSAGES), handler.clone()),
                    (SubscriptionScope::table(CONVERSATIONS), handler),
                ],
            )
            .await?;

        match self.load_inbox(&screen.viewer_id).await {
            Ok(summaries) => {
                debug!(conversations = summaries.len(), "inbox loaded");
                screen.conversations.set(summaries).await;
                Ok(true)
            }
            Err(err) => {
                screen.listener.release();
                Err(err)
            }
        }
    }

    async fn load_inbox(&self, viewer_id: &str) -> Result<Vec<ConversationSummary>> {
        let conversations = self.repo.list_conversations(viewer_id).await?;
        let mut summaries: Vec<ConversationSummary> = conversations
            .into_iter()
            .filter_map(|c| ConversationSummary::new(c, viewer_id))
            .collect();

        let peer_ids: Vec<String> = summaries.iter().map(|s| s.peer_id.clone()).collect();
        if !peer_ids.is_empty() {
            match self.repo.get_profiles(&peer_ids).await {
                Ok(profiles) => {
                    let by_id: HashMap<String, _> =
                        profiles.into_iter().map(|p| (p.id.clone(), p)).collect();
                    for summary in &mut summaries {
                        summary.peer = by_id.get(&summary.peer_id).cloned();
                    }
                }
                Err(err) => {
                    warn!(viewer_id, error = %err, "peer profiles load failed");
                }
            }
        }

        match self.repo.unread_messages(viewer_id).await {
            Ok(unread) => {
                for message in unread {
                    if let Some(summary) = summaries
                        .iter_mut()
                        .find(|s| s.conversation.id == message.conversation_id)
                    {
                        summary.unread.insert(message.id);
                    }
                }
            }
            Err(err) => {
                warn!(viewer_id, error = %err, "unread messages load failed");
            }
        }

        sort_by_recency(&mut summaries);
        Ok(summaries)
    }

    pub fn close_inbox(&self, screen: &mut InboxScreen) {
        screen.close();
    }

    async fn enrich(&self, viewer: &AuthSession, event: EnrichmentEvent) {
        let ctx = HookContext::new(viewer.user_id.clone())
            .with_attribute("username", viewer.username.clone());
        if let Some(report) = self.enrichment.enrich(ctx, event).await {
            debug!(
                completed = report.completed.len(),
                failed = report.failed.len(),
                "enrichment dispatched"
            );
        }
    }
}
