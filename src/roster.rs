// src/roster.rs
//
// Crew-roster synchronizer: keeps the group conversation of a crew
// consistent with its live membership, and archives conversations when a
// crew or project reaches end of life.
//
// Every entry point is a convergence pass, re-run after each membership
// mutation instead of computing deltas. The passes are idempotent and each
// side-effect is individually fault-isolated: a failed step is logged and
// the pass continues.

use std::collections::{HashMap, HashSet};

use futures_util::StreamExt;
use log::{error, info, warn};
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;

use crate::models::{
    Account, ArchivedChat, Assignment, Conversation, Crew, Message, MessageSnapshot,
};
use crate::notifications;

/// Fewest messages a conversation needs before archival produces a snapshot.
/// Below this the chat is considered trivial and silently skipped.
const ARCHIVE_MIN_MESSAGES: usize = 2;

// ─── PURE DECISION CORE ────────────────────────────────────────────────────────

/// Deterministic name of a crew's group conversation.
pub fn group_conversation_name(crew_name: &str) -> String {
    format!("Crew {}", crew_name)
}

/// Whether archival should produce a snapshot for this conversation.
/// Already-archived conversations are never re-archived, and chats with
/// fewer than two messages never had enough content to retire.
pub fn archive_eligible(conversation: &Conversation, message_count: usize) -> bool {
    !conversation.archived && message_count >= ARCHIVE_MIN_MESSAGES
}

/// Serializes messages into snapshot entries, chronologically. Unknown
/// senders fall back to their raw id; absent senders are the system.
pub fn build_message_snapshots(
    messages: &[Message],
    display_names: &HashMap<String, String>,
) -> Vec<MessageSnapshot> {
    let mut ordered: Vec<&Message> = messages.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    ordered
        .into_iter()
        .map(|m| MessageSnapshot {
            sender_id: m.sender_id.clone(),
            sender_username: match &m.sender_id {
                Some(id) => display_names.get(id).cloned().unwrap_or_else(|| id.clone()),
                None => "System".to_string(),
            },
            content: m.content.clone(),
            message_type: m.message_type.clone(),
            created_at: m.created_at.to_rfc3339(),
        })
        .collect()
}

/// Live member set of a crew: every assignment holder plus the leader. A
/// leader who also holds an assignment counts once.
pub fn crew_member_set(
    assigned: impl IntoIterator<Item = String>,
    leader: Option<&str>,
) -> HashSet<String> {
    let mut members: HashSet<String> = assigned.into_iter().collect();
    if let Some(leader) = leader {
        members.insert(leader.to_string());
    }
    members
}

/// Access policy for archived chats. The participant snapshot is the durable
/// source of truth: it must keep answering after the live conversation row
/// is gone.
pub fn can_view_archive(
    user_id: &str,
    is_admin: bool,
    archive: &ArchivedChat,
    live: Option<&Conversation>,
    crew_leader_id: Option<&str>,
) -> bool {
    if is_admin {
        return true;
    }
    if archive.archived_by.as_deref() == Some(user_id) {
        return true;
    }
    if archive.participant_ids().iter().any(|p| p == user_id) {
        return true;
    }
    if let Some(conv) = live {
        if conv.participants.iter().any(|p| p == user_id) {
            return true;
        }
        if crew_leader_id == Some(user_id) {
            return true;
        }
    }
    false
}

// ─── GROUP CONVERSATION LIFECYCLE ──────────────────────────────────────────────

/// Converges the group conversation of `crew` onto its live membership:
/// with at least `min_members` members (assignments plus leader) the
/// conversation exists and contains every member; below the threshold a
/// never-archived conversation is deleted outright.
///
/// Safe to call repeatedly; participant additions are idempotent.
pub async fn ensure_group_for_crew(
    db: &Database,
    crew: &Crew,
    min_members: usize,
) -> Option<Conversation> {
    let assignments = db.collection::<Assignment>("assignments");
    let mut cursor = match assignments.find(doc! { "crew_id": &crew.crew_id }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error fetching assignments for crew {}: {}", crew.crew_id, err);
            return None;
        }
    };

    let mut assigned: Vec<String> = Vec::new();
    while let Some(res) = cursor.next().await {
        if let Ok(a) = res {
            assigned.push(a.worker_id);
        }
    }
    let members = crew_member_set(assigned, crew.leader_id.as_deref());

    let conversations = db.collection::<Conversation>("conversations");
    let filter = doc! { "is_group": true, "crew_id": &crew.crew_id };
    let existing = match conversations.find_one(filter.clone()).await {
        Ok(conv) => conv,
        Err(err) => {
            error!("Error looking up group conversation for crew {}: {}", crew.crew_id, err);
            return None;
        }
    };

    if members.len() >= min_members {
        let conv = match existing {
            Some(conv) => conv,
            None => {
                let conv = Conversation {
                    conversation_id: Uuid::new_v4().to_string(),
                    name: Some(group_conversation_name(&crew.name)),
                    is_group: true,
                    crew_id: Some(crew.crew_id.clone()),
                    participants: Vec::new(),
                    archived: false,
                    created_at: chrono::Utc::now(),
                };
                if let Err(err) = conversations.insert_one(&conv).await {
                    error!("Error creating group conversation for crew {}: {}", crew.crew_id, err);
                    return None;
                }
                info!("Created group conversation for crew {}", crew.name);
                conv
            }
        };

        // Idempotent membership add; replays and races converge to the
        // same participant set.
        let member_list: Vec<String> = members.into_iter().collect();
        let update = doc! { "$addToSet": { "participants": { "$each": member_list } } };
        if let Err(err) = conversations
            .update_one(doc! { "conversation_id": &conv.conversation_id }, update)
            .await
        {
            error!("Error adding participants to conversation {}: {}", conv.conversation_id, err);
        }

        match conversations
            .find_one(doc! { "conversation_id": &conv.conversation_id })
            .await
        {
            Ok(Some(fresh)) => Some(fresh),
            _ => Some(conv),
        }
    } else {
        // Below critical mass. This path is for conversations that never
        // had it; a retired (archived) conversation is left alone.
        if let Some(conv) = existing {
            if !conv.archived {
                delete_conversation(db, &conv.conversation_id).await;
                info!(
                    "Deleted group conversation of crew {} ({} member(s) left)",
                    crew.name,
                    members.len()
                );
            }
        }
        None
    }
}

/// Removes a conversation row and its messages. Archive snapshots, if any,
/// are untouched.
pub async fn delete_conversation(db: &Database, conversation_id: &str) {
    let messages = db.collection::<Message>("messages");
    if let Err(err) = messages.delete_many(doc! { "conversation_id": conversation_id }).await {
        warn!("Error deleting messages of conversation {}: {}", conversation_id, err);
    }
    let conversations = db.collection::<Conversation>("conversations");
    if let Err(err) = conversations
        .delete_one(doc! { "conversation_id": conversation_id })
        .await
    {
        error!("Error deleting conversation {}: {}", conversation_id, err);
    }
}

// ─── ARCHIVAL ──────────────────────────────────────────────────────────────────

/// Writes the immutable snapshot of a conversation and flips its `archived`
/// flag. No-op (returning `None`) when the conversation is already archived
/// or has fewer than two messages. The live row is not deleted here.
pub async fn archive_conversation(
    db: &Database,
    conversation: &Conversation,
    archived_by: Option<&str>,
    reason: &str,
) -> Option<ArchivedChat> {
    let messages_coll = db.collection::<Message>("messages");
    let mut cursor = match messages_coll
        .find(doc! { "conversation_id": &conversation.conversation_id })
        .await
    {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error fetching messages of conversation {}: {}", conversation.conversation_id, err);
            return None;
        }
    };

    let mut messages: Vec<Message> = Vec::new();
    while let Some(res) = cursor.next().await {
        if let Ok(m) = res {
            messages.push(m);
        }
    }

    if !archive_eligible(conversation, messages.len()) {
        return None;
    }

    let display_names = account_display_names(db, &messages).await;
    let snapshots = build_message_snapshots(&messages, &display_names);

    let messages_json = match serde_json::to_string(&snapshots) {
        Ok(json) => json,
        Err(err) => {
            error!("Error serializing message snapshot for {}: {}", conversation.conversation_id, err);
            return None;
        }
    };
    let participants_json = match serde_json::to_string(&conversation.participants) {
        Ok(json) => json,
        Err(err) => {
            error!("Error serializing participant snapshot for {}: {}", conversation.conversation_id, err);
            return None;
        }
    };

    let archive = ArchivedChat {
        archive_id: Uuid::new_v4().to_string(),
        conversation_id: conversation.conversation_id.clone(),
        messages_json,
        participants_json,
        reason: reason.to_string(),
        archived_by: archived_by.map(String::from),
        created_at: chrono::Utc::now(),
    };

    let archives = db.collection::<ArchivedChat>("archived_chats");
    if let Err(err) = archives.insert_one(&archive).await {
        error!("Error persisting archive of conversation {}: {}", conversation.conversation_id, err);
        return None;
    }

    let conversations = db.collection::<Conversation>("conversations");
    if let Err(err) = conversations
        .update_one(
            doc! { "conversation_id": &conversation.conversation_id },
            doc! { "$set": { "archived": true } },
        )
        .await
    {
        // Snapshot already persisted; if the flag write fails the next
        // pass could produce a duplicate.
        error!("Error flagging conversation {} as archived: {}", conversation.conversation_id, err);
    }

    info!("Archived conversation {} ({})", conversation.conversation_id, reason);
    Some(archive)
}

/// Display names for every distinct sender in `messages`.
async fn account_display_names(db: &Database, messages: &[Message]) -> HashMap<String, String> {
    let sender_ids: Vec<String> = messages
        .iter()
        .filter_map(|m| m.sender_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if sender_ids.is_empty() {
        return HashMap::new();
    }

    let accounts = db.collection::<Account>("accounts");
    let mut cursor = match accounts.find(doc! { "user_id": { "$in": sender_ids } }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            warn!("Error fetching sender accounts for snapshot: {}", err);
            return HashMap::new();
        }
    };

    let mut names = HashMap::new();
    while let Some(res) = cursor.next().await {
        if let Ok(account) = res {
            names.insert(account.user_id, account.display_name);
        }
    }
    names
}

// ─── MUTATION REACTIONS ────────────────────────────────────────────────────────

/// Reaction to a removed assignment: re-converge the crew's group
/// conversation, retire the removed worker's private chats (leaving a crew
/// should not keep crew-adjacent private channels live), and reset their
/// availability state.
pub async fn after_assignment_removed(
    db: &Database,
    crew_id: &str,
    removed_user_id: &str,
    min_members: usize,
) {
    if let Some(crew) = load_crew(db, crew_id).await {
        ensure_group_for_crew(db, &crew, min_members).await;
    }
    archive_private_chats(db, removed_user_id, "participant removed from crew").await;
    crate::availability::reset_state_after_removal(db, removed_user_id).await;
}

/// Archives every live private conversation `user_id` participates in.
pub async fn archive_private_chats(db: &Database, user_id: &str, reason: &str) {
    let conversations = db.collection::<Conversation>("conversations");
    let filter = doc! { "is_group": false, "participants": user_id, "archived": false };
    let mut cursor = match conversations.find(filter).await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error fetching private conversations of {}: {}", user_id, err);
            return;
        }
    };

    let mut private: Vec<Conversation> = Vec::new();
    while let Some(res) = cursor.next().await {
        if let Ok(conv) = res {
            private.push(conv);
        }
    }
    for conv in private {
        archive_conversation(db, &conv, None, reason).await;
    }
}

/// Dissolves a crew: snapshot its group conversation, drop the live
/// conversation, cascade-delete assignments, notify everyone affected and
/// finally remove the crew itself. The caller has already verified that the
/// crew has no project. Returns false only when the crew row itself could
/// not be deleted.
pub async fn dissolve_crew(db: &Database, crew: &Crew, dissolved_by: &str) -> bool {
    let conversations = db.collection::<Conversation>("conversations");
    let conv_filter = doc! { "is_group": true, "crew_id": &crew.crew_id };
    if let Ok(Some(conv)) = conversations.find_one(conv_filter).await {
        archive_conversation(db, &conv, Some(dissolved_by), "crew dissolved").await;
        delete_conversation(db, &conv.conversation_id).await;
    }

    let assignments = db.collection::<Assignment>("assignments");
    let mut member_ids: Vec<String> = Vec::new();
    if let Ok(mut cursor) = assignments.find(doc! { "crew_id": &crew.crew_id }).await {
        while let Some(res) = cursor.next().await {
            if let Ok(a) = res {
                member_ids.push(a.worker_id);
            }
        }
    }
    if let Err(err) = assignments.delete_many(doc! { "crew_id": &crew.crew_id }).await {
        error!("Error deleting assignments of crew {}: {}", crew.crew_id, err);
    }

    for user_id in &member_ids {
        notifications::notify(db, user_id, &notifications::messages::crew_dissolved(&crew.name)).await;
        crate::availability::reset_state_after_removal(db, user_id).await;
    }
    if let Some(leader) = &crew.leader_id {
        notifications::notify(db, leader, &notifications::messages::crew_dissolved_leader(&crew.name)).await;
    }

    let crews = db.collection::<Crew>("crews");
    match crews.delete_one(doc! { "crew_id": &crew.crew_id }).await {
        Ok(res) if res.deleted_count == 1 => {
            info!("Dissolved crew {}", crew.name);
            true
        }
        Ok(_) => false,
        Err(err) => {
            error!("Error deleting crew {}: {}", crew.crew_id, err);
            false
        }
    }
}

/// Project finalization pass: archive every conversation tied to a crew of
/// the project, then release the crews.
pub async fn finalize_project_crews(db: &Database, project_id: &str, finalized_by: &str) {
    let crews_coll = db.collection::<Crew>("crews");
    let mut cursor = match crews_coll.find(doc! { "project_id": project_id }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error fetching crews of project {}: {}", project_id, err);
            return;
        }
    };

    let mut crews: Vec<Crew> = Vec::new();
    while let Some(res) = cursor.next().await {
        if let Ok(c) = res {
            crews.push(c);
        }
    }

    let conversations = db.collection::<Conversation>("conversations");
    for crew in &crews {
        let filter = doc! { "crew_id": &crew.crew_id, "archived": false };
        if let Ok(mut conv_cursor) = conversations.find(filter).await {
            while let Some(res) = conv_cursor.next().await {
                if let Ok(conv) = res {
                    archive_conversation(db, &conv, Some(finalized_by), "project finalized").await;
                }
            }
        }
        if let Some(leader) = &crew.leader_id {
            notifications::notify(db, leader, &notifications::messages::crew_released(&crew.name)).await;
        }
    }

    if let Err(err) = crews_coll
        .update_many(doc! { "project_id": project_id }, doc! { "$set": { "project_id": null } })
        .await
    {
        error!("Error releasing crews of project {}: {}", project_id, err);
    }
}

async fn load_crew(db: &Database, crew_id: &str) -> Option<Crew> {
    let crews = db.collection::<Crew>("crews");
    match crews.find_one(doc! { "crew_id": crew_id }).await {
        Ok(crew) => crew,
        Err(err) => {
            error!("Error loading crew {}: {}", crew_id, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message_type;
    use chrono::{Duration, Utc};

    fn conversation(archived: bool) -> Conversation {
        Conversation {
            conversation_id: "conv1".to_string(),
            name: Some("Crew North".to_string()),
            is_group: true,
            crew_id: Some("crew1".to_string()),
            participants: vec!["u1".to_string(), "u2".to_string()],
            archived,
            created_at: Utc::now(),
        }
    }

    fn message(id: &str, sender: Option<&str>, offset_secs: i64) -> Message {
        Message {
            message_id: id.to_string(),
            conversation_id: "conv1".to_string(),
            sender_id: sender.map(String::from),
            content: format!("message {}", id),
            message_type: message_type::TEXT.to_string(),
            read_by: Vec::new(),
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn trivial_conversations_are_not_archived() {
        let conv = conversation(false);
        assert!(!archive_eligible(&conv, 0));
        assert!(!archive_eligible(&conv, 1));
        assert!(archive_eligible(&conv, 2));
    }

    #[test]
    fn archived_conversations_are_never_rearchived() {
        let conv = conversation(true);
        assert!(!archive_eligible(&conv, 10));
    }

    #[test]
    fn snapshots_are_chronological() {
        let messages = vec![
            message("m3", Some("u1"), 30),
            message("m1", Some("u2"), 10),
            message("m2", None, 20),
        ];
        let mut names = HashMap::new();
        names.insert("u1".to_string(), "Ana Rojas".to_string());
        names.insert("u2".to_string(), "Luis Soto".to_string());

        let snaps = build_message_snapshots(&messages, &names);
        assert_eq!(snaps.len(), 3);
        assert_eq!(snaps[0].content, "message m1");
        assert_eq!(snaps[1].content, "message m2");
        assert_eq!(snaps[2].content, "message m3");
        assert!(snaps[0].created_at < snaps[1].created_at);
    }

    #[test]
    fn system_messages_snapshot_without_sender() {
        let messages = vec![message("m1", None, 0)];
        let snaps = build_message_snapshots(&messages, &HashMap::new());
        assert_eq!(snaps[0].sender_id, None);
        assert_eq!(snaps[0].sender_username, "System");
    }

    #[test]
    fn unknown_senders_fall_back_to_their_id() {
        let messages = vec![message("m1", Some("ghost"), 0)];
        let snaps = build_message_snapshots(&messages, &HashMap::new());
        assert_eq!(snaps[0].sender_username, "ghost");
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let messages = vec![message("m1", Some("u1"), 0), message("m2", None, 5)];
        let snaps = build_message_snapshots(&messages, &HashMap::new());
        let json = serde_json::to_string(&snaps).unwrap();
        let back: Vec<MessageSnapshot> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snaps);
    }

    fn archive_with(participants: &[&str], archived_by: Option<&str>) -> ArchivedChat {
        let ids: Vec<String> = participants.iter().map(|p| p.to_string()).collect();
        ArchivedChat {
            archive_id: "a1".to_string(),
            conversation_id: "conv1".to_string(),
            messages_json: "[]".to_string(),
            participants_json: serde_json::to_string(&ids).unwrap(),
            reason: "crew dissolved".to_string(),
            archived_by: archived_by.map(String::from),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_participants_keep_access_after_row_deletion() {
        let archive = archive_with(&["u1", "u2"], None);
        assert!(can_view_archive("u1", false, &archive, None, None));
        assert!(!can_view_archive("u3", false, &archive, None, None));
    }

    #[test]
    fn archiver_and_admin_always_have_access() {
        let archive = archive_with(&["u1"], Some("boss"));
        assert!(can_view_archive("boss", false, &archive, None, None));
        assert!(can_view_archive("anyone", true, &archive, None, None));
    }

    #[test]
    fn live_participants_and_crew_leader_have_access() {
        let archive = archive_with(&["u1"], None);
        let live = conversation(true);
        assert!(can_view_archive("u2", false, &archive, Some(&live), None));
        assert!(can_view_archive("lead", false, &archive, Some(&live), Some("lead")));
        assert!(!can_view_archive("lead", false, &archive, None, Some("lead")));
    }

    #[test]
    fn member_set_unions_assignments_and_leader() {
        let members = crew_member_set(vec!["u1".to_string(), "u2".to_string()], Some("lead"));
        assert_eq!(members.len(), 3);
        assert!(members.contains("lead"));
    }

    #[test]
    fn leader_with_own_assignment_counts_once() {
        // One assigned worker plus a leader who is also assigned: exactly
        // two members, enough for a group conversation at the default
        // threshold.
        let members = crew_member_set(vec!["u1".to_string(), "lead".to_string()], Some("lead"));
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn leaderless_crew_counts_assignments_only() {
        let members = crew_member_set(vec!["u1".to_string()], None);
        assert_eq!(members.len(), 1);
    }

    #[test]
    fn group_names_are_deterministic() {
        assert_eq!(group_conversation_name("North"), group_conversation_name("North"));
        assert_ne!(group_conversation_name("North"), group_conversation_name("South"));
    }
}
