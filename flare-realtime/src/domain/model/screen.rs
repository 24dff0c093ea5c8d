//! 屏幕持有的本地状态
//!
//! 每个屏幕实例独占自己的视图单元与订阅；屏幕被丢弃时订阅随之关闭。

use flare_social_core::optimistic::ViewCell;
use flare_social_core::realtime::ScopedListener;

use super::{Conversation, ConversationSummary, Message, Notification};

/// 聊天屏幕
#[derive(Debug)]
pub struct ChatScreen {
    pub(crate) viewer_id: String,
    pub(crate) conversation: Option<Conversation>,
    pub(crate) messages: ViewCell<Vec<Message>>,
    pub(crate) listener: ScopedListener,
}

impl ChatScreen {
    pub fn new<T: Into<String>>(viewer_id: T) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            conversation: None,
            messages: ViewCell::new(Vec::new()),
            listener: ScopedListener::new(),
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }

    pub fn messages(&self) -> &ViewCell<Vec<Message>> {
        &self.messages
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener.current_key().is_some()
    }

    /// 处理已到达的实时事件
    pub async fn sync(&mut self) -> usize {
        self.listener.drain_ready().await
    }

    /// 离开聊天：关闭订阅并清空消息
    pub async fn close(&mut self) {
        self.listener.release();
        self.conversation = None;
        self.messages.set(Vec::new()).await;
    }
}

/// 收件箱屏幕
#[derive(Debug)]
pub struct InboxScreen {
    pub(crate) viewer_id: String,
    pub(crate) conversations: ViewCell<Vec<ConversationSummary>>,
    pub(crate) listener: ScopedListener,
}

impl InboxScreen {
    pub fn new<T: Into<String>>(viewer_id: T) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            conversations: ViewCell::new(Vec::new()),
            listener: ScopedListener::new(),
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn conversations(&self) -> &ViewCell<Vec<ConversationSummary>> {
        &self.conversations
    }

    /// 全部会话的未读总数
    pub async fn unread_total(&self) -> usize {
        self.conversations
            .read(|list| list.iter().map(ConversationSummary::unread_count).sum())
            .await
    }

    pub async fn sync(&mut self) -> usize {
        self.listener.drain_ready().await
    }

    pub fn close(&mut self) {
        self.listener.release();
    }
}

/// 通知中心
#[derive(Debug)]
pub struct NotificationCenter {
    pub(crate) viewer_id: String,
    pub(crate) items: ViewCell<Vec<Notification>>,
    pub(crate) listener: ScopedListener,
}

impl NotificationCenter {
    pub fn new<T: Into<String>>(viewer_id: T) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            items: ViewCell::new(Vec::new()),
            listener: ScopedListener::new(),
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn items(&self) -> &ViewCell<Vec<Notification>> {
        &self.items
    }

    pub async fn unread_count(&self) -> usize {
        self.items
            .read(|list| list.iter().filter(|n| !n.read).count())
            .await
    }

    pub async fn sync(&mut self) -> usize {
        self.listener.drain_ready().await
    }

    pub fn close(&mut self) {
        self.listener.release();
    }
}
