// src/notifications.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt;
use log::warn;
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::Notification;

/// Fire-and-forget notification sink. A failed insert is logged and
/// swallowed; notifications never abort the operation that raised them.
pub async fn notify(db: &Database, user_id: &str, message: &str) {
    if user_id.is_empty() {
        return;
    }
    let notification = Notification {
        notification_id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        message: message.to_string(),
        read: false,
        created_at: chrono::Utc::now(),
    };
    let notifications = db.collection::<Notification>("notifications");
    if let Err(err) = notifications.insert_one(&notification).await {
        warn!("Error notifying user {}: {}", user_id, err);
    }
}

/// Message templates for the system notifications raised by crew and
/// project lifecycle changes.
pub mod messages {
    pub fn assigned_to_crew(crew_name: &str, role: Option<&str>) -> String {
        match role {
            Some(role) => format!("You have been assigned to crew '{}'. Role: {}.", crew_name, role),
            None => format!("You have been assigned to crew '{}'.", crew_name),
        }
    }

    pub fn removed_from_crew(crew_name: &str) -> String {
        format!("You have been removed from crew '{}'.", crew_name)
    }

    pub fn leader_of_new_crew(crew_name: &str) -> String {
        format!("You are the leader of the new crew '{}'.", crew_name)
    }

    pub fn leadership_assigned(crew_name: &str) -> String {
        format!("You have been assigned as leader of crew '{}'.", crew_name)
    }

    pub fn leadership_removed(crew_name: &str) -> String {
        format!("You are no longer the leader of crew '{}'.", crew_name)
    }

    pub fn crew_dissolved(crew_name: &str) -> String {
        format!("Crew '{}' has been dissolved. You no longer belong to that crew.", crew_name)
    }

    pub fn crew_dissolved_leader(crew_name: &str) -> String {
        format!("Crew '{}', which you led, has been dissolved.", crew_name)
    }

    pub fn crew_released(crew_name: &str) -> String {
        format!("Crew '{}' has been released from its project.", crew_name)
    }

    pub fn crew_project_changed(crew_name: &str, project_name: &str) -> String {
        format!("Crew '{}' is now working on project '{}'.", crew_name, project_name)
    }

    pub fn role_changed(crew_name: &str, role: Option<&str>) -> String {
        match role {
            Some(role) => format!("Your role in crew '{}' is now '{}'.", crew_name, role),
            None => format!("Your role in crew '{}' has been removed.", crew_name),
        }
    }

    pub fn work_state_changed(new_state: &str) -> String {
        format!("Your work state has changed to: {}.", new_state)
    }
}

// ─── ENDPOINTS ─────────────────────────────────────────────────────────────────

// GET /notifications
// Lists the authenticated user's notifications, newest first.
pub async fn list_notifications(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };

    let notifications = data.mongodb.db.collection::<Notification>("notifications");
    let mut cursor = match notifications.find(doc! { "user_id": &current_user }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching notifications: {}", err))
        }
    };

    let mut items: Vec<Notification> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(n) => items.push(n),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating notifications: {}", err))
            }
        }
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    HttpResponse::Ok().json(items)
}

// POST /notifications/{notification_id}/read
pub async fn mark_notification_read(
    req: HttpRequest,
    data: web::Data<AppState>,
    notification_id: web::Path<String>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };

    let notifications = data.mongodb.db.collection::<Notification>("notifications");
    let filter = doc! { "notification_id": &*notification_id, "user_id": &current_user };
    match notifications.update_one(filter, doc! { "$set": { "read": true } }).await {
        Ok(res) if res.matched_count == 1 => HttpResponse::Ok().body("Notification read"),
        Ok(_) => HttpResponse::NotFound().body("Notification not found"),
        Err(err) => HttpResponse::InternalServerError()
            .body(format!("Error updating notification: {}", err)),
    }
}
