// src/chat.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::error;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::models::{message_type, ArchivedChat, Conversation, Crew, Message, MessageSnapshot};
use crate::roster;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub message_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Archived chat with both snapshots deserialized for display.
#[derive(Debug, Serialize)]
pub struct ArchivedChatDetail {
    pub archive_id: String,
    pub conversation_id: String,
    pub reason: String,
    pub archived_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<MessageSnapshot>,
    pub participants: Vec<String>,
}

fn current_user(req: &HttpRequest) -> Option<String> {
    req.extensions().get::<String>().cloned()
}

// ─── CONVERSATIONS ─────────────────────────────────────────────────────────────

// GET /conversations
// Conversations the authenticated user participates in, newest first.
pub async fn list_conversations(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let conversations = data.mongodb.db.collection::<Conversation>("conversations");
    let mut cursor = match conversations.find(doc! { "participants": &user_id }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching conversations: {}", err))
        }
    };

    let mut items: Vec<Conversation> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(conv) => items.push(conv),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating conversations: {}", err))
            }
        }
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    HttpResponse::Ok().json(items)
}

// GET /conversations/{conversation_id}
// Conversation detail with chronological messages; reading marks them read.
pub async fn get_conversation(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let conversations = data.mongodb.db.collection::<Conversation>("conversations");
    let conversation = match conversations
        .find_one(doc! { "conversation_id": &*conversation_id })
        .await
    {
        Ok(Some(conv)) => conv,
        Ok(None) => return HttpResponse::NotFound().body("Conversation not found"),
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching conversation: {}", err))
        }
    };
    if !conversation.participants.contains(&user_id) {
        return HttpResponse::Unauthorized().body("Not a participant of this conversation");
    }

    let messages_coll = data.mongodb.db.collection::<Message>("messages");
    let mut cursor = match messages_coll
        .find(doc! { "conversation_id": &conversation.conversation_id })
        .await
    {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching messages: {}", err))
        }
    };

    let mut messages: Vec<Message> = Vec::new();
    while let Some(res) = cursor.next().await {
        if let Ok(m) = res {
            messages.push(m);
        }
    }
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    // Reading the conversation marks everything as read for this user.
    let _ = messages_coll
        .update_many(
            doc! { "conversation_id": &conversation.conversation_id },
            doc! { "$addToSet": { "read_by": &user_id } },
        )
        .await;

    HttpResponse::Ok().json(ConversationDetail { conversation, messages })
}

// POST /conversations/private/{user_id}
// Gets or creates the private conversation between the caller and the
// given user.
pub async fn create_private_conversation(
    req: HttpRequest,
    data: web::Data<AppState>,
    other_user: web::Path<String>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if *other_user == user_id {
        return HttpResponse::BadRequest().body("Cannot open a private conversation with yourself");
    }

    let conversations = data.mongodb.db.collection::<Conversation>("conversations");
    let filter = doc! {
        "is_group": false,
        "archived": false,
        "participants": { "$all": [&user_id, &*other_user] },
    };
    match conversations.find_one(filter).await {
        Ok(Some(existing)) => return HttpResponse::Ok().json(existing),
        Ok(None) => {}
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching conversation: {}", err))
        }
    }

    let conversation = Conversation {
        conversation_id: Uuid::new_v4().to_string(),
        name: None,
        is_group: false,
        crew_id: None,
        participants: vec![user_id, other_user.into_inner()],
        archived: false,
        created_at: Utc::now(),
    };
    match conversations.insert_one(&conversation).await {
        Ok(_) => HttpResponse::Ok().json(conversation),
        Err(err) => {
            error!("Error creating private conversation: {}", err);
            HttpResponse::InternalServerError().body("Error creating conversation")
        }
    }
}

// POST /conversations/{conversation_id}/messages
pub async fn send_message(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
    info: web::Json<SendMessageRequest>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if info.content.trim().is_empty() {
        return HttpResponse::BadRequest().body("Message content is required");
    }
    let kind = info.message_type.clone().unwrap_or_else(|| message_type::TEXT.to_string());
    if !message_type::ALL.contains(&kind.as_str()) {
        return HttpResponse::BadRequest().body("Invalid message type");
    }

    let conversations = data.mongodb.db.collection::<Conversation>("conversations");
    let conversation = match conversations
        .find_one(doc! { "conversation_id": &*conversation_id })
        .await
    {
        Ok(Some(conv)) => conv,
        Ok(None) => return HttpResponse::NotFound().body("Conversation not found"),
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching conversation: {}", err))
        }
    };
    if !conversation.participants.contains(&user_id) {
        return HttpResponse::Unauthorized().body("Not a participant of this conversation");
    }
    if conversation.archived {
        return HttpResponse::BadRequest().body("Conversation is archived");
    }

    let message = Message {
        message_id: Uuid::new_v4().to_string(),
        conversation_id: conversation.conversation_id.clone(),
        sender_id: Some(user_id.clone()),
        content: info.content.trim().to_string(),
        message_type: kind,
        // The sender has read their own message.
        read_by: vec![user_id],
        created_at: Utc::now(),
    };
    let messages = data.mongodb.db.collection::<Message>("messages");
    match messages.insert_one(&message).await {
        Ok(_) => HttpResponse::Ok().json(message),
        Err(err) => HttpResponse::InternalServerError().body(format!("Error sending message: {}", err)),
    }
}

// POST /conversations/{conversation_id}/archive
// Manual archival by a participant or a chief. Idempotent: an archived
// conversation (or a trivial one) yields no new snapshot.
pub async fn archive_conversation(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
    info: web::Json<ArchiveRequest>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let conversations = data.mongodb.db.collection::<Conversation>("conversations");
    let conversation = match conversations
        .find_one(doc! { "conversation_id": &*conversation_id })
        .await
    {
        Ok(Some(conv)) => conv,
        Ok(None) => return HttpResponse::NotFound().body("Conversation not found"),
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching conversation: {}", err))
        }
    };

    let allowed = conversation.participants.contains(&user_id)
        || auth::is_chief(&data.mongodb.db, &user_id).await;
    if !allowed {
        return HttpResponse::Unauthorized().body("Not allowed to archive this conversation");
    }

    let reason = info.reason.clone().unwrap_or_else(|| "archived by user".to_string());
    match roster::archive_conversation(&data.mongodb.db, &conversation, Some(&user_id), &reason).await
    {
        Some(archive) => HttpResponse::Ok().json(archive),
        None => HttpResponse::Ok().body("Nothing to archive"),
    }
}

// ─── ARCHIVED CHATS ────────────────────────────────────────────────────────────

/// Resolves the live conversation and crew leader behind an archive, when
/// they still exist, for the access check.
async fn archive_context(
    data: &web::Data<AppState>,
    archive: &ArchivedChat,
) -> (Option<Conversation>, Option<String>) {
    let conversations = data.mongodb.db.collection::<Conversation>("conversations");
    let live = conversations
        .find_one(doc! { "conversation_id": &archive.conversation_id })
        .await
        .unwrap_or(None);

    let leader = match live.as_ref().and_then(|c| c.crew_id.clone()) {
        Some(crew_id) => {
            let crews = data.mongodb.db.collection::<Crew>("crews");
            crews
                .find_one(doc! { "crew_id": crew_id })
                .await
                .unwrap_or(None)
                .and_then(|c| c.leader_id)
        }
        None => None,
    };
    (live, leader)
}

// GET /archived_chats
// Every archive the authenticated user may view.
pub async fn list_archived_chats(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let is_admin = auth::is_chief(&data.mongodb.db, &user_id).await;

    let archives = data.mongodb.db.collection::<ArchivedChat>("archived_chats");
    let mut cursor = match archives.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching archived chats: {}", err))
        }
    };

    let mut visible: Vec<ArchivedChat> = Vec::new();
    while let Some(res) = cursor.next().await {
        let archive = match res {
            Ok(a) => a,
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating archived chats: {}", err))
            }
        };
        let (live, leader) = archive_context(&data, &archive).await;
        if roster::can_view_archive(&user_id, is_admin, &archive, live.as_ref(), leader.as_deref()) {
            visible.push(archive);
        }
    }
    visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    HttpResponse::Ok().json(visible)
}

// GET /archived_chats/{archive_id}
// The snapshot is the durable source of truth: access keeps working after
// the live conversation row is deleted.
pub async fn get_archived_chat(
    req: HttpRequest,
    data: web::Data<AppState>,
    archive_id: web::Path<String>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let archives = data.mongodb.db.collection::<ArchivedChat>("archived_chats");
    let archive = match archives.find_one(doc! { "archive_id": &*archive_id }).await {
        Ok(Some(a)) => a,
        Ok(None) => return HttpResponse::NotFound().body("Archived chat not found"),
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching archived chat: {}", err))
        }
    };

    let is_admin = auth::is_chief(&data.mongodb.db, &user_id).await;
    let (live, leader) = archive_context(&data, &archive).await;
    if !roster::can_view_archive(&user_id, is_admin, &archive, live.as_ref(), leader.as_deref()) {
        return HttpResponse::Unauthorized().body("Not allowed to view this archived chat");
    }

    let detail = ArchivedChatDetail {
        archive_id: archive.archive_id.clone(),
        conversation_id: archive.conversation_id.clone(),
        reason: archive.reason.clone(),
        archived_by: archive.archived_by.clone(),
        created_at: archive.created_at,
        messages: archive.messages(),
        participants: archive.participant_ids(),
    };
    HttpResponse::Ok().json(detail)
}
