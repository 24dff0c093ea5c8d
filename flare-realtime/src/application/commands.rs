/// 发起会话命令
#[derive(Debug, Clone)]
pub struct StartConversationCommand {
    pub peer_id: String,
}

/// 发送消息命令（发往聊天屏幕当前打开的会话）
#[derive(Debug, Clone)]
pub struct SendMessageCommand {
    pub content: String,
}

/// 添加表情回应命令
#[derive(Debug, Clone)]
pub struct AddReactionCommand {
    pub message_id: String,
    pub emoji: String,
}

/// 撤回表情回应命令
#[derive(Debug, Clone)]
pub struct RemoveReactionCommand {
    pub reaction_id: String,
}

/// 标记单条通知已读命令
#[derive(Debug, Clone)]
pub struct MarkNotificationReadCommand {
    pub notification_id: String,
}

/// 删除通知命令
#[derive(Debug, Clone)]
pub struct DeleteNotificationCommand {
    pub notification_id: String,
}
