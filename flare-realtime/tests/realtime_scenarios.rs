use std::sync::Arc;

use serde_json::json;

use flare_realtime::application::commands::{
    AddReactionCommand, DeleteNotificationCommand, MarkNotificationReadCommand,
    SendMessageCommand, StartConversationCommand,
};
use flare_realtime::application::queries::OpenChatQuery;
use flare_realtime::{ApplicationBootstrap, ApplicationContext, ChatScreen};
use flare_social_core::backend::{
    ChangeEvent, Filter, InMemoryBackend, ProcedureCapability, QueryCapability, Row, SelectQuery,
    WriteCapability,
};
use flare_social_core::{AuthSession, ErrorCode, FlareSocialConfig, SessionContext};

const VIEWER: &str = "u-viewer";
const PEER: &str = "u-peer";
const OTHER: &str = "u-other";

struct Harness {
    context: ApplicationContext,
    backend: Arc<InMemoryBackend>,
}

async fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let session = Arc::new(SessionContext::signed_in(AuthSession::new(VIEWER, "ayse")));
    let (context, backend) =
        ApplicationBootstrap::in_memory(&FlareSocialConfig::default(), session)
            .await
            .unwrap();

    for (id, username) in [(VIEWER, "ayse"), (PEER, "mehmet"), (OTHER, "zeynep")] {
        backend
            .seed("profiles", json!({"id": id, "username": username}))
            .await;
    }

    Harness { context, backend }
}

impl Harness {
    async fn start(&self, peer_id: &str) -> String {
        self.context
            .command_handler
            .handle_start_conversation(StartConversationCommand {
                peer_id: peer_id.into(),
            })
            .await
            .into_done()
            .unwrap()
    }

    async fn open_chat(&self, conversation_id: &str) -> ChatScreen {
        let mut screen = self.context.chat_service.chat_screen().await.unwrap();
        let opened = self
            .context
            .query_handler
            .handle_open_chat(
                &mut screen,
                OpenChatQuery {
                    conversation_id: conversation_id.into(),
                },
            )
            .await;
        assert_eq!(opened.into_done(), Some(true));
        screen
    }

    /// 模拟对方客户端直接写入一条消息
    async fn peer_says(&self, conversation_id: &str, content: &str) -> Row {
        self.backend
            .insert(
                "messages",
                json!({
                    "conversation_id": conversation_id,
                    "sender_id": PEER,
                    "receiver_id": VIEWER,
                    "content": content,
                    "read": false,
                })
                .as_object()
                .cloned()
                .unwrap(),
            )
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_duplicate_insert_event_leaves_chat_unchanged() {
    let h = harness().await;
    let conversation_id = h.start(PEER).await;
    let mut screen = h.open_chat(&conversation_id).await;

    let row = h.peer_says(&conversation_id, "hey there").await;
    assert_eq!(screen.sync().await, 1);
    assert_eq!(screen.messages().snapshot().await.len(), 1);

    h.backend.emit(ChangeEvent::insert("messages", row));
    assert_eq!(screen.sync().await, 1);

    let messages = screen.messages().snapshot().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hey there");
}

#[tokio::test]
async fn test_sent_message_echo_is_not_duplicated() {
    let h = harness().await;
    let conversation_id = h.start(PEER).await;
    let mut screen = h.open_chat(&conversation_id).await;

    let sent = h
        .context
        .command_handler
        .handle_send_message(
            &screen,
            SendMessageCommand {
                content: "  hello  ".into(),
            },
        )
        .await
        .into_done()
        .unwrap();
    assert_eq!(sent.content, "hello");

    screen.sync().await;
    let messages = screen.messages().snapshot().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, sent.id);

    // 会话摘要随发送更新
    let conversation = h.backend.find("conversations", &conversation_id).await.unwrap();
    assert_eq!(conversation.get("last_message"), Some(&json!("hello")));
}

#[tokio::test]
async fn test_failed_send_removes_provisional_message() {
    let h = harness().await;
    let conversation_id = h.start(PEER).await;
    let screen = h.open_chat(&conversation_id).await;
    h.backend.fail_next("insert:messages");

    let feedback = h
        .context
        .command_handler
        .handle_send_message(
            &screen,
            SendMessageCommand {
                content: "lost".into(),
            },
        )
        .await;

    assert!(!feedback.is_done());
    assert!(screen.messages().snapshot().await.is_empty());

    let blank = h
        .context
        .command_handler
        .handle_send_message(&screen, SendMessageCommand { content: "   ".into() })
        .await;
    assert_eq!(blank.error_code(), Some(ErrorCode::InvalidArgument));
}

#[tokio::test]
async fn test_self_conversation_rejected() {
    let h = harness().await;
    let feedback = h
        .context
        .command_handler
        .handle_start_conversation(StartConversationCommand {
            peer_id: VIEWER.into(),
        })
        .await;
    assert_eq!(feedback.error_code(), Some(ErrorCode::InvalidArgument));
    assert!(h.backend.rows("conversations").await.is_empty());
}

#[tokio::test]
async fn test_switching_chats_never_accumulates_subscriptions() {
    let h = harness().await;
    let first = h.start(PEER).await;
    let second = h.start(OTHER).await;
    h.peer_says(&first, "in first").await;

    let mut screen = h.open_chat(&first).await;
    assert_eq!(h.backend.active_subscriptions(), 2);
    assert_eq!(screen.messages().snapshot().await.len(), 1);

    let reopened = h
        .context
        .query_handler
        .handle_open_chat(
            &mut screen,
            OpenChatQuery {
                conversation_id: first.clone(),
            },
        )
        .await;
    assert_eq!(reopened.into_done(), Some(false));

    let switched = h
        .context
        .query_handler
        .handle_open_chat(
            &mut screen,
            OpenChatQuery {
                conversation_id: second.clone(),
            },
        )
        .await;
    assert_eq!(switched.into_done(), Some(true));
    assert_eq!(h.backend.active_subscriptions(), 2);
    assert!(screen.messages().snapshot().await.is_empty());

    // 旧会话的消息不再进入当前屏幕
    h.peer_says(&first, "late").await;
    screen.sync().await;
    assert!(screen.messages().snapshot().await.is_empty());

    h.context.chat_service.close_chat(&mut screen).await;
    assert_eq!(h.backend.active_subscriptions(), 0);
    assert!(!screen.is_subscribed());
}

#[tokio::test]
async fn test_reaction_delete_without_parent_key() {
    let h = harness().await;
    let conversation_id = h.start(PEER).await;
    h.peer_says(&conversation_id, "react to me").await;
    let mut screen = h.open_chat(&conversation_id).await;
    let message_id = screen.messages().snapshot().await[0].id.clone();

    let reaction = h
        .context
        .command_handler
        .handle_add_reaction(
            &screen,
            AddReactionCommand {
                message_id: message_id.clone(),
                emoji: "🔥".into(),
            },
        )
        .await
        .into_done()
        .unwrap();
    screen.sync().await;
    assert_eq!(screen.messages().snapshot().await[0].reactions.len(), 1);

    // 另一端撤回；删除事件只带主键
    h.backend
        .delete("message_reactions", &[Filter::eq("id", reaction.id.as_str())])
        .await
        .unwrap();
    assert_eq!(screen.sync().await, 1);
    assert!(screen.messages().snapshot().await[0].reactions.is_empty());
}

#[tokio::test]
async fn test_inbox_moves_active_conversation_to_front() {
    let h = harness().await;
    let older = h.start(PEER).await;
    let newer = h.start(OTHER).await;

    let mut inbox = h.context.chat_service.inbox_screen().await.unwrap();
    let opened = h.context.query_handler.handle_open_inbox(&mut inbox).await;
    assert_eq!(opened.into_done(), Some(true));

    let order: Vec<String> = inbox
        .conversations()
        .snapshot()
        .await
        .into_iter()
        .map(|s| s.conversation.id)
        .collect();
    assert_eq!(order, vec![newer.clone(), older.clone()]);

    let row = h.peer_says(&older, "are you there?").await;
    inbox.sync().await;
    h.backend.emit(ChangeEvent::insert("messages", row));
    inbox.sync().await;

    let summaries = inbox.conversations().snapshot().await;
    assert_eq!(summaries[0].conversation.id, older);
    assert_eq!(summaries[0].conversation.last_message.as_deref(), Some("are you there?"));
    assert_eq!(summaries[0].peer.as_ref().map(|p| p.username.as_str()), Some("mehmet"));
    assert_eq!(inbox.unread_total().await, 1);

    // 在聊天中标记已读后收件箱未读清零
    let chat = h.open_chat(&older).await;
    let marked = h.context.command_handler.handle_mark_read(&chat).await;
    assert_eq!(marked.into_done(), Some(1));
    inbox.sync().await;
    assert_eq!(inbox.unread_total().await, 0);
}

#[tokio::test]
async fn test_inbox_picks_up_new_conversation() {
    let h = harness().await;
    let mut inbox = h.context.chat_service.inbox_screen().await.unwrap();
    h.context.query_handler.handle_open_inbox(&mut inbox).await;
    assert!(inbox.conversations().snapshot().await.is_empty());

    let conversation_id = h.backend.get_or_create_conversation(OTHER, VIEWER).await.unwrap();
    // 与自己无关的会话不会出现
    h.backend.get_or_create_conversation(OTHER, PEER).await.unwrap();
    inbox.sync().await;

    let summaries = inbox.conversations().snapshot().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].conversation.id, conversation_id);
    assert_eq!(summaries[0].peer_id, OTHER);

    inbox.close();
    assert_eq!(h.backend.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_notification_center_lifecycle() {
    let h = harness().await;
    h.backend
        .seed(
            "notifications",
            json!({"user_id": VIEWER, "actor_id": PEER, "type": "follow", "message": "mehmet started following you", "read": false}),
        )
        .await;

    let service = &h.context.notification_service;
    let mut center = service.notification_center().await.unwrap();
    let opened = h.context.query_handler.handle_open_notifications(&mut center).await;
    assert_eq!(opened.into_done(), Some(true));
    assert_eq!(center.unread_count().await, 1);

    let live = h
        .backend
        .insert(
            "notifications",
            json!({"user_id": VIEWER, "actor_id": OTHER, "type": "like", "message": "zeynep liked your post", "read": false})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .await
        .unwrap();
    // 发给别人的通知不在本人订阅范围内
    h.backend
        .insert(
            "notifications",
            json!({"user_id": PEER, "type": "like", "message": "other", "read": false})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .await
        .unwrap();
    center.sync().await;

    let items = center.items().snapshot().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].message, "zeynep liked your post");
    let live_id = live.get("id").and_then(|v| v.as_str()).unwrap().to_string();

    let marked = h
        .context
        .command_handler
        .handle_mark_notification_read(
            &center,
            MarkNotificationReadCommand {
                notification_id: live_id.clone(),
            },
        )
        .await;
    assert!(marked.is_done());
    assert_eq!(center.unread_count().await, 1);

    h.backend.fail_next("delete:notifications");
    let failed = h
        .context
        .command_handler
        .handle_delete_notification(
            &center,
            DeleteNotificationCommand {
                notification_id: live_id.clone(),
            },
        )
        .await;
    assert!(!failed.is_done());
    assert_eq!(center.items().snapshot().await.len(), 2);

    let deleted = h
        .context
        .command_handler
        .handle_delete_notification(
            &center,
            DeleteNotificationCommand {
                notification_id: live_id,
            },
        )
        .await;
    assert!(deleted.is_done());
    center.sync().await;
    assert_eq!(center.items().snapshot().await.len(), 1);

    let all = h
        .context
        .command_handler
        .handle_mark_all_notifications_read(&center)
        .await;
    assert_eq!(all.into_done(), Some(1));
    assert_eq!(center.unread_count().await, 0);

    let unread = h
        .backend
        .select(&SelectQuery::from("notifications").eq("user_id", VIEWER).eq("read", false))
        .await
        .unwrap();
    assert!(unread.is_empty());
}

#[tokio::test]
async fn test_dropping_screens_releases_subscriptions() {
    let h = harness().await;
    let conversation_id = h.start(PEER).await;
    {
        let _chat = h.open_chat(&conversation_id).await;
        let mut inbox = h.context.chat_service.inbox_screen().await.unwrap();
        h.context.query_handler.handle_open_inbox(&mut inbox).await;
        let mut center = h.context.notification_service.notification_center().await.unwrap();
        h.context.query_handler.handle_open_notifications(&mut center).await;
        assert_eq!(h.backend.active_subscriptions(), 5);
    }
    assert_eq!(h.backend.active_subscriptions(), 0);
}
