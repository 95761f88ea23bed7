//! `deepsearch chats`: Read-only views over stored conversations.

use deepsearch_config::AppConfig;
use deepsearch_core::identity::UserId;
use deepsearch_core::message::{ConversationId, ConversationSummary, Message, Part};
use deepsearch_core::store::ConversationStore;
use deepsearch_store::SqliteStore;

async fn open_store() -> Result<SqliteStore, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(SqliteStore::new(&config.database.url).await?)
}

pub async fn list(user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store().await?;
    let chats = store.list(&UserId::from(user)).await?;

    println!("💬 Conversations for {user}");
    println!("========================");
    if chats.is_empty() {
        println!("   No conversations yet.");
    }
    for chat in &chats {
        println!("  {}", summary_line(chat));
    }
    Ok(())
}

pub async fn show(user: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store().await?;
    let conversation = store
        .get(&ConversationId::from(id), &UserId::from(user))
        .await?
        .ok_or("Conversation not found")?;

    println!("💬 {}", conversation.title);
    println!("   id: {}  updated: {}", conversation.id, conversation.updated_at.to_rfc3339());
    println!();
    for (order, message) in conversation.messages.iter().enumerate() {
        for line in message_lines(order, message) {
            println!("{line}");
        }
    }
    Ok(())
}

fn summary_line(chat: &ConversationSummary) -> String {
    format!(
        "{}  {}  {}",
        chat.updated_at.format("%Y-%m-%d %H:%M"),
        chat.id,
        chat.title
    )
}

fn message_lines(order: usize, message: &Message) -> Vec<String> {
    let mut lines = vec![format!("[{order}] {}", message.role.as_str())];
    for part in &message.parts {
        match part {
            Part::Text { text } => lines.push(format!("    {text}")),
            Part::ToolInvocation(invocation) => {
                lines.push(format!(
                    "    ⚙ {}({}) [{:?}]",
                    invocation.tool_name, invocation.args, invocation.state
                ));
            }
            Part::Unknown(_) => lines.push("    (unsupported part)".to_string()),
        }
    }
    lines
}
