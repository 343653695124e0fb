// src/worker_management.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::availability;
use crate::models::{
    clean_id_number, valid_email, valid_id_number, worker_state, worker_type, Account, Worker,
};
use crate::notifications;
use crate::{auth, notifications::messages};

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateWorkerRequest {
    pub id_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub worker_type: Option<String>,
    pub specialty: Option<String>,
    pub years_experience: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkerRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub worker_type: Option<String>,
    pub specialty: Option<String>,
    pub years_experience: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SetStateRequest {
    pub state: String,
}

/// Worker enriched with the resolved availability and the
/// project-committed flag (the definition dashboards and eligibility use).
#[derive(Debug, Serialize)]
pub struct WorkerInfo {
    #[serde(flatten)]
    pub worker: Worker,
    pub availability: String,
    pub project_committed: bool,
}

// ─── ENDPOINTS ─────────────────────────────────────────────────────────────────

// POST /workers
// Creates a worker plus their login account. Validation failures here are
// the only hard errors in the subsystem: id-number shape and uniqueness,
// email shape, required names.
pub async fn create_worker(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<CreateWorkerRequest>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return HttpResponse::Unauthorized().body("Only a chief can create workers");
    }

    if !valid_id_number(&info.id_number) {
        return HttpResponse::BadRequest().body("The id number must contain exactly 9 digits");
    }
    if info.first_name.trim().is_empty() || info.last_name.trim().is_empty() {
        return HttpResponse::BadRequest().body("First and last name are required");
    }
    if !valid_email(&info.email) {
        return HttpResponse::BadRequest().body("Invalid email address");
    }
    let kind = info.worker_type.clone().unwrap_or_else(|| worker_type::WORKER.to_string());
    if !worker_type::ALL.contains(&kind.as_str()) {
        return HttpResponse::BadRequest().body("Invalid worker type");
    }

    let username = clean_id_number(&info.id_number);
    let workers = data.mongodb.db.collection::<Worker>("workers");
    match workers.find_one(doc! { "id_number": &info.id_number }).await {
        Ok(Some(_)) => return HttpResponse::BadRequest().body("A worker with this id number already exists"),
        Ok(None) => {}
        Err(err) => {
            error!("Error checking id number uniqueness: {}", err);
            return HttpResponse::InternalServerError().body("Error creating worker");
        }
    }

    // The login account: username is the cleaned id number, and so is the
    // generated first password (rotated on first login).
    let hashed = match hash(&username, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => return HttpResponse::InternalServerError().body("Error hashing password"),
    };
    let account = Account {
        user_id: Uuid::new_v4().to_string(),
        username,
        password: hashed,
        email: info.email.clone(),
        display_name: format!("{} {}", info.first_name.trim(), info.last_name.trim()),
        role: kind.clone(),
        active: true,
    };
    let accounts = data.mongodb.db.collection::<Account>("accounts");
    if let Err(err) = accounts.insert_one(&account).await {
        error!("Error creating account: {}", err);
        return HttpResponse::InternalServerError().body("Error creating worker account");
    }

    let now = Utc::now();
    let worker = Worker {
        worker_id: Uuid::new_v4().to_string(),
        id_number: info.id_number.clone(),
        first_name: info.first_name.trim().to_string(),
        last_name: info.last_name.trim().to_string(),
        email: info.email.clone(),
        phone: info.phone.clone(),
        address: info.address.clone(),
        worker_type: kind,
        specialty: info.specialty.clone(),
        state: worker_state::AVAILABLE.to_string(),
        manual_override: false,
        years_experience: info.years_experience.unwrap_or(0),
        user_id: account.user_id.clone(),
        active: true,
        initial_password: true,
        created_at: now,
        updated_at: now,
    };
    match workers.insert_one(&worker).await {
        Ok(_) => {
            info!("Worker created: {}", worker.id_number);
            HttpResponse::Ok().json(worker)
        }
        Err(err) => {
            error!("Error creating worker: {}", err);
            HttpResponse::InternalServerError().body("Error creating worker")
        }
    }
}

// GET /workers
// Active workers enriched with resolved availability.
pub async fn list_workers(data: web::Data<AppState>) -> impl Responder {
    let workers_coll = data.mongodb.db.collection::<Worker>("workers");
    let mut cursor = match workers_coll.find(doc! { "active": true }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching workers: {}", err))
        }
    };

    let mut workers: Vec<Worker> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(w) => workers.push(w),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating workers: {}", err))
            }
        }
    }

    let mut enriched: Vec<WorkerInfo> = Vec::new();
    for worker in workers {
        let availability = availability::resolve_availability(&data.mongodb.db, &worker).await;
        let project_committed =
            availability::is_project_committed(&data.mongodb.db, &worker.user_id).await;
        enriched.push(WorkerInfo { worker, availability, project_committed });
    }

    HttpResponse::Ok().json(enriched)
}

// GET /workers/{worker_id}
pub async fn get_worker(data: web::Data<AppState>, worker_id: web::Path<String>) -> impl Responder {
    let workers = data.mongodb.db.collection::<Worker>("workers");
    match workers.find_one(doc! { "worker_id": &*worker_id }).await {
        Ok(Some(worker)) => {
            let availability = availability::resolve_availability(&data.mongodb.db, &worker).await;
            let project_committed =
                availability::is_project_committed(&data.mongodb.db, &worker.user_id).await;
            HttpResponse::Ok().json(WorkerInfo { worker, availability, project_committed })
        }
        Ok(None) => HttpResponse::NotFound().body("Worker not found"),
        Err(err) => HttpResponse::InternalServerError().body(format!("Error fetching worker: {}", err)),
    }
}

// PUT /workers/{worker_id}
pub async fn update_worker(
    req: HttpRequest,
    data: web::Data<AppState>,
    worker_id: web::Path<String>,
    info: web::Json<UpdateWorkerRequest>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return HttpResponse::Unauthorized().body("Only a chief can update workers");
    }

    let workers = data.mongodb.db.collection::<Worker>("workers");
    let worker = match workers.find_one(doc! { "worker_id": &*worker_id }).await {
        Ok(Some(w)) => w,
        Ok(None) => return HttpResponse::NotFound().body("Worker not found"),
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching worker: {}", err))
        }
    };

    let mut set_doc = doc! {};
    if let Some(first_name) = &info.first_name {
        set_doc.insert("first_name", first_name.trim());
    }
    if let Some(last_name) = &info.last_name {
        set_doc.insert("last_name", last_name.trim());
    }
    if let Some(email) = &info.email {
        if !valid_email(email) {
            return HttpResponse::BadRequest().body("Invalid email address");
        }
        set_doc.insert("email", email.clone());
    }
    if let Some(phone) = &info.phone {
        set_doc.insert("phone", phone.clone());
    }
    if let Some(address) = &info.address {
        set_doc.insert("address", address.clone());
    }
    if let Some(kind) = &info.worker_type {
        if !worker_type::ALL.contains(&kind.as_str()) {
            return HttpResponse::BadRequest().body("Invalid worker type");
        }
        set_doc.insert("worker_type", kind.clone());
    }
    if let Some(specialty) = &info.specialty {
        set_doc.insert("specialty", specialty.clone());
    }
    if let Some(years) = info.years_experience {
        set_doc.insert("years_experience", years);
    }
    if set_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }
    set_doc.insert("updated_at", chrono::Utc::now().to_rfc3339());

    if let Err(err) = workers
        .update_one(doc! { "worker_id": &*worker_id }, doc! { "$set": set_doc })
        .await
    {
        return HttpResponse::InternalServerError().body(format!("Error updating worker: {}", err));
    }

    // Keep the login account in sync with the basic identity fields.
    let mut account_doc = doc! {};
    if let (Some(first), Some(last)) = (&info.first_name, &info.last_name) {
        account_doc.insert("display_name", format!("{} {}", first.trim(), last.trim()));
    }
    if let Some(email) = &info.email {
        account_doc.insert("email", email.clone());
    }
    if let Some(kind) = &info.worker_type {
        account_doc.insert("role", kind.clone());
    }
    if !account_doc.is_empty() {
        let accounts = data.mongodb.db.collection::<Account>("accounts");
        let _ = accounts
            .update_one(doc! { "user_id": &worker.user_id }, doc! { "$set": account_doc })
            .await;
    }

    HttpResponse::Ok().body("Worker updated")
}

// POST /workers/{worker_id}/state
// Sets a manual availability override. The operator-set value wins over any
// derived state until the override is cleared.
pub async fn set_worker_state(
    req: HttpRequest,
    data: web::Data<AppState>,
    worker_id: web::Path<String>,
    info: web::Json<SetStateRequest>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return HttpResponse::Unauthorized().body("Only a chief can change worker state");
    }
    if !worker_state::MANUAL.contains(&info.state.as_str()) {
        return HttpResponse::BadRequest().body("Invalid state");
    }

    let workers = data.mongodb.db.collection::<Worker>("workers");
    let worker = match workers.find_one(doc! { "worker_id": &*worker_id }).await {
        Ok(Some(w)) => w,
        Ok(None) => return HttpResponse::NotFound().body("Worker not found"),
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching worker: {}", err))
        }
    };

    let update = doc! { "$set": {
        "state": &info.state,
        "manual_override": true,
        "updated_at": chrono::Utc::now().to_rfc3339(),
    } };
    if let Err(err) = workers.update_one(doc! { "worker_id": &*worker_id }, update).await {
        return HttpResponse::InternalServerError().body(format!("Error updating state: {}", err));
    }

    notifications::notify(&data.mongodb.db, &worker.user_id, &messages::work_state_changed(&info.state))
        .await;
    HttpResponse::Ok().body("State updated")
}

// DELETE /workers/{worker_id}/state
// Clears the manual override; the very next availability read re-derives
// from live assignment data.
pub async fn clear_worker_state(
    req: HttpRequest,
    data: web::Data<AppState>,
    worker_id: web::Path<String>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return HttpResponse::Unauthorized().body("Only a chief can change worker state");
    }

    let workers = data.mongodb.db.collection::<Worker>("workers");
    let update = doc! { "$set": {
        "state": worker_state::AVAILABLE,
        "manual_override": false,
        "updated_at": chrono::Utc::now().to_rfc3339(),
    } };
    match workers.update_one(doc! { "worker_id": &*worker_id }, update).await {
        Ok(res) if res.matched_count == 1 => HttpResponse::Ok().body("Override cleared"),
        Ok(_) => HttpResponse::NotFound().body("Worker not found"),
        Err(err) => HttpResponse::InternalServerError().body(format!("Error updating state: {}", err)),
    }
}

// DELETE /workers/{worker_id}
// Soft delete: the record is kept, the login is disabled.
pub async fn deactivate_worker(
    req: HttpRequest,
    data: web::Data<AppState>,
    worker_id: web::Path<String>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return HttpResponse::Unauthorized().body("Only a chief can deactivate workers");
    }

    let workers = data.mongodb.db.collection::<Worker>("workers");
    let worker = match workers.find_one(doc! { "worker_id": &*worker_id }).await {
        Ok(Some(w)) => w,
        Ok(None) => return HttpResponse::NotFound().body("Worker not found"),
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching worker: {}", err))
        }
    };

    let update = doc! { "$set": {
        "active": false,
        "state": worker_state::INACTIVE,
        "manual_override": true,
        "updated_at": chrono::Utc::now().to_rfc3339(),
    } };
    if let Err(err) = workers.update_one(doc! { "worker_id": &*worker_id }, update).await {
        return HttpResponse::InternalServerError().body(format!("Error deactivating worker: {}", err));
    }

    let accounts = data.mongodb.db.collection::<Account>("accounts");
    let _ = accounts
        .update_one(doc! { "user_id": &worker.user_id }, doc! { "$set": { "active": false } })
        .await;

    info!("Worker {} deactivated", worker.id_number);
    HttpResponse::Ok().body("Worker deactivated")
}
