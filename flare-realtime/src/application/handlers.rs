use std::sync::Arc;

use tracing::{debug, info, warn};

use flare_social_core::CommandFeedback;
use flare_social_core::optimistic::AppendOutcome;

use crate::application::commands::{
    AddReactionCommand, DeleteNotificationCommand, MarkNotificationReadCommand,
    RemoveReactionCommand, SendMessageCommand, StartConversationCommand,
};
use crate::application::queries::OpenChatQuery;
use crate::domain::model::{ChatScreen, InboxScreen, Message, NotificationCenter, Reaction};
use crate::domain::service::{ChatDomainService, NotificationDomainService};

/// 私信与通知命令处理器
///
/// 屏幕边界：所有错误在这里转换为 `CommandFeedback`，不再向外传播。
pub struct RealtimeCommandHandler {
    chat: Arc<ChatDomainService>,
    notifications: Arc<NotificationDomainService>,
}

impl RealtimeCommandHandler {
    pub fn new(chat: Arc<ChatDomainService>, notifications: Arc<NotificationDomainService>) -> Self {
        Self {
            chat,
            notifications,
        }
    }

    /// 处理发起会话命令，返回会话 ID
    pub async fn handle_start_conversation(
        &self,
        command: StartConversationCommand,
    ) -> CommandFeedback<String> {
        debug!(peer_id = %command.peer_id, "Handling start conversation command");

        let result = self.chat.start_conversation(&command.peer_id).await;
        if let Err(err) = &result {
            warn!(peer_id = %command.peer_id, error = %err, "Start conversation failed");
        }
        CommandFeedback::from_result(result)
    }

    /// 处理发送消息命令
    pub async fn handle_send_message(
        &self,
        screen: &ChatScreen,
        command: SendMessageCommand,
    ) -> CommandFeedback<Message> {
        debug!(conversation_id = ?screen.conversation_id(), "Handling send message command");

        match self.chat.send_message(screen, &command.content).await {
            Ok(AppendOutcome::Confirmed(message)) => {
                info!(conversation_id = %message.conversation_id, message_id = %message.id, "Message sent");
                CommandFeedback::Done(message)
            }
            Ok(AppendOutcome::Skipped) => CommandFeedback::Ignored,
            Err(err) => {
                warn!(conversation_id = ?screen.conversation_id(), error = %err, "Send message failed");
                CommandFeedback::from_result(Err(err))
            }
        }
    }

    /// 处理标记已读命令，返回更新的消息数
    pub async fn handle_mark_read(&self, screen: &ChatScreen) -> CommandFeedback<u64> {
        debug!(conversation_id = ?screen.conversation_id(), "Handling mark read command");
        CommandFeedback::from_result(self.chat.mark_read(screen).await)
    }

    pub async fn handle_add_reaction(
        &self,
        screen: &ChatScreen,
        command: AddReactionCommand,
    ) -> CommandFeedback<Reaction> {
        debug!(message_id = %command.message_id, "Handling add reaction command");

        let result = self
            .chat
            .add_reaction(screen, &command.message_id, &command.emoji)
            .await;
        if let Err(err) = &result {
            warn!(message_id = %command.message_id, error = %err, "Add reaction failed");
        }
        CommandFeedback::from_result(result)
    }

    pub async fn handle_remove_reaction(
        &self,
        screen: &ChatScreen,
        command: RemoveReactionCommand,
    ) -> CommandFeedback<()> {
        debug!(reaction_id = %command.reaction_id, "Handling remove reaction command");
        CommandFeedback::from_result(self.chat.remove_reaction(screen, &command.reaction_id).await)
    }

    pub async fn handle_mark_notification_read(
        &self,
        center: &NotificationCenter,
        command: MarkNotificationReadCommand,
    ) -> CommandFeedback<()> {
        debug!(notification_id = %command.notification_id, "Handling mark notification read command");
        CommandFeedback::from_result(
            self.notifications
                .mark_read(center, &command.notification_id)
                .await,
        )
    }

    pub async fn handle_mark_all_notifications_read(
        &self,
        center: &NotificationCenter,
    ) -> CommandFeedback<u64> {
        debug!("Handling mark all notifications read command");
        CommandFeedback::from_result(self.notifications.mark_all_read(center).await)
    }

    pub async fn handle_delete_notification(
        &self,
        center: &NotificationCenter,
        command: DeleteNotificationCommand,
    ) -> CommandFeedback<()> {
        debug!(notification_id = %command.notification_id, "Handling delete notification command");
        CommandFeedback::from_result(
            self.notifications
                .delete(center, &command.notification_id)
                .await,
        )
    }
}

/// 屏幕打开处理器：加载初始数据并绑定订阅
pub struct RealtimeQueryHandler {
    chat: Arc<ChatDomainService>,
    notifications: Arc<NotificationDomainService>,
}

impl RealtimeQueryHandler {
    pub fn new(chat: Arc<ChatDomainService>, notifications: Arc<NotificationDomainService>) -> Self {
        Self {
            chat,
            notifications,
        }
    }

    /// 打开会话；重复打开同一会话返回 `Done(false)`
    pub async fn handle_open_chat(
        &self,
        screen: &mut ChatScreen,
        query: OpenChatQuery,
    ) -> CommandFeedback<bool> {
        debug!(conversation_id = %query.conversation_id, "Handling open chat query");

        let result = self.chat.open_chat(screen, &query.conversation_id).await;
        if let Err(err) = &result {
            warn!(conversation_id = %query.conversation_id, error = %err, "Open chat failed");
        }
        CommandFeedback::from_result(result)
    }

    pub async fn handle_open_inbox(&self, screen: &mut InboxScreen) -> CommandFeedback<bool> {
        debug!("Handling open inbox query");

        let result = self.chat.open_inbox(screen).await;
        if let Err(err) = &result {
            warn!(error = %err, "Open inbox failed");
        }
        CommandFeedback::from_result(result)
    }

    pub async fn handle_open_notifications(
        &self,
        center: &mut NotificationCenter,
    ) -> CommandFeedback<bool> {
        debug!("Handling open notifications query");

        let result = self.notifications.open(center).await;
        if let Err(err) = &result {
            warn!(error = %err, "Open notifications failed");
        }
        CommandFeedback::from_result(result)
    }
}
