// src/requests.rs
//
// Worker requests (crew changes, leave, HR matters) and field incident
// notices, both auto-linked to the submitting user's crew.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use log::error;
use mongodb::bson::doc;
use mongodb::Database;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::models::{incident_severity, request_status, Assignment, Crew, IncidentNotice, WorkerRequest};

#[derive(Debug, Deserialize)]
pub struct SubmitRequestPayload {
    pub subject: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequestPayload {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportIncidentPayload {
    pub description: String,
    pub severity: Option<String>,
}

fn current_user(req: &HttpRequest) -> Option<String> {
    req.extensions().get::<String>().cloned()
}

/// The crew behind the user's first live assignment, if any.
async fn crew_of_user(db: &Database, user_id: &str) -> Option<String> {
    let assignments = db.collection::<Assignment>("assignments");
    match assignments.find_one(doc! { "worker_id": user_id }).await {
        Ok(Some(a)) => Some(a.crew_id),
        Ok(None) => None,
        Err(err) => {
            error!("Error resolving crew of {}: {}", user_id, err);
            None
        }
    }
}

/// Ids of the crews this user leads.
async fn led_crew_ids(db: &Database, user_id: &str) -> Vec<String> {
    let crews = db.collection::<Crew>("crews");
    let mut ids = Vec::new();
    if let Ok(mut cursor) = crews.find(doc! { "leader_id": user_id }).await {
        while let Some(res) = cursor.next().await {
            if let Ok(c) = res {
                ids.push(c.crew_id);
            }
        }
    }
    ids
}

// ─── WORKER REQUESTS ───────────────────────────────────────────────────────────

// POST /requests
pub async fn submit_request(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SubmitRequestPayload>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if payload.subject.trim().is_empty() {
        return HttpResponse::BadRequest().body("Subject is required");
    }

    let request = WorkerRequest {
        request_id: Uuid::new_v4().to_string(),
        worker_id: user_id.clone(),
        crew_id: crew_of_user(&data.mongodb.db, &user_id).await,
        subject: payload.subject.trim().to_string(),
        description: payload.description.clone().unwrap_or_default(),
        status: request_status::PENDING.to_string(),
        created_at: Utc::now(),
    };
    let requests = data.mongodb.db.collection::<WorkerRequest>("worker_requests");
    match requests.insert_one(&request).await {
        Ok(_) => HttpResponse::Ok().json(request),
        Err(err) => HttpResponse::InternalServerError().body(format!("Error creating request: {}", err)),
    }
}

// GET /requests
// Chiefs see everything, leaders the requests of their crews, workers
// their own submissions.
pub async fn list_requests(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let db = &data.mongodb.db;

    let filter = if auth::is_chief(db, &user_id).await {
        doc! {}
    } else {
        let led = led_crew_ids(db, &user_id).await;
        if led.is_empty() {
            doc! { "worker_id": &user_id }
        } else {
            doc! { "crew_id": { "$in": led } }
        }
    };

    let requests = db.collection::<WorkerRequest>("worker_requests");
    let mut cursor = match requests.find(filter).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching requests: {}", err))
        }
    };

    let mut items: Vec<WorkerRequest> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(r) => items.push(r),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating requests: {}", err))
            }
        }
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    HttpResponse::Ok().json(items)
}

// POST /requests/{request_id}/status
pub async fn update_request_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    request_id: web::Path<String>,
    payload: web::Json<UpdateRequestPayload>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if !request_status::ALL.contains(&payload.status.as_str()) {
        return HttpResponse::BadRequest().body("Invalid status");
    }
    let db = &data.mongodb.db;

    let requests = db.collection::<WorkerRequest>("worker_requests");
    let request = match requests.find_one(doc! { "request_id": &*request_id }).await {
        Ok(Some(r)) => r,
        Ok(None) => return HttpResponse::NotFound().body("Request not found"),
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching request: {}", err))
        }
    };

    let allowed = auth::is_chief(db, &user_id).await
        || match &request.crew_id {
            Some(crew_id) => led_crew_ids(db, &user_id).await.contains(crew_id),
            None => false,
        };
    if !allowed {
        return HttpResponse::Unauthorized().body("Not allowed to act on this request");
    }

    match requests
        .update_one(
            doc! { "request_id": &request.request_id },
            doc! { "$set": { "status": &payload.status } },
        )
        .await
    {
        Ok(_) => HttpResponse::Ok().body("Request updated"),
        Err(err) => HttpResponse::InternalServerError().body(format!("Error updating request: {}", err)),
    }
}

// ─── INCIDENTS ─────────────────────────────────────────────────────────────────

// POST /incidents
pub async fn report_incident(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<ReportIncidentPayload>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if payload.description.trim().is_empty() {
        return HttpResponse::BadRequest().body("Description is required");
    }
    let severity = payload
        .severity
        .clone()
        .unwrap_or_else(|| incident_severity::LOW.to_string());
    if !incident_severity::ALL.contains(&severity.as_str()) {
        return HttpResponse::BadRequest().body("Invalid severity");
    }

    let incident = IncidentNotice {
        incident_id: Uuid::new_v4().to_string(),
        crew_id: crew_of_user(&data.mongodb.db, &user_id).await,
        reporter_id: Some(user_id),
        description: payload.description.trim().to_string(),
        severity,
        acknowledged: false,
        created_at: Utc::now(),
    };
    let incidents = data.mongodb.db.collection::<IncidentNotice>("incidents");
    match incidents.insert_one(&incident).await {
        Ok(_) => HttpResponse::Ok().json(incident),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error reporting incident: {}", err))
        }
    }
}

// GET /incidents
pub async fn list_incidents(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let db = &data.mongodb.db;

    let filter = if auth::is_chief(db, &user_id).await {
        doc! {}
    } else {
        let led = led_crew_ids(db, &user_id).await;
        if led.is_empty() {
            doc! { "reporter_id": &user_id }
        } else {
            doc! { "crew_id": { "$in": led } }
        }
    };

    let incidents = db.collection::<IncidentNotice>("incidents");
    let mut cursor = match incidents.find(filter).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching incidents: {}", err))
        }
    };

    let mut items: Vec<IncidentNotice> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(i) => items.push(i),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating incidents: {}", err))
            }
        }
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    HttpResponse::Ok().json(items)
}

// POST /incidents/{incident_id}/acknowledge
pub async fn acknowledge_incident(
    req: HttpRequest,
    data: web::Data<AppState>,
    incident_id: web::Path<String>,
) -> impl Responder {
    let user_id = match current_user(&req) {
        Some(id) => id,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let db = &data.mongodb.db;

    let incidents = db.collection::<IncidentNotice>("incidents");
    let incident = match incidents.find_one(doc! { "incident_id": &*incident_id }).await {
        Ok(Some(i)) => i,
        Ok(None) => return HttpResponse::NotFound().body("Incident not found"),
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching incident: {}", err))
        }
    };

    let allowed = auth::is_chief(db, &user_id).await
        || match &incident.crew_id {
            Some(crew_id) => led_crew_ids(db, &user_id).await.contains(crew_id),
            None => false,
        };
    if !allowed {
        return HttpResponse::Unauthorized().body("Not allowed to acknowledge this incident");
    }

    match incidents
        .update_one(
            doc! { "incident_id": &incident.incident_id },
            doc! { "$set": { "acknowledged": true } },
        )
        .await
    {
        Ok(_) => HttpResponse::Ok().body("Incident acknowledged"),
        Err(err) => {
            HttpResponse::InternalServerError().body(format!("Error updating incident: {}", err))
        }
    }
}
