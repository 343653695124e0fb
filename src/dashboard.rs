// src/dashboard.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::Database;

use crate::app_state::AppState;
use crate::auth;
use crate::availability;
use crate::models::{Crew, IncidentNotice, Project, Worker, WorkerRequest};

/// Builds the chief panel counts. The "available workers" figure uses the
/// project-committed definition: a worker on a projectless crew still counts
/// as available here. Mixing in the broader any-assignment notion is what
/// produced the negative-count defects this figure used to have.
async fn compute_dashboard(db: &Database, chief_id: &str) -> Result<Document, mongodb::error::Error> {
    let mut out = Document::new();

    let projects = db.collection::<Project>("projects");
    let active_projects = projects
        .count_documents(doc! { "chief_id": chief_id, "active": true })
        .await?;
    let finished_projects = projects
        .count_documents(doc! { "chief_id": chief_id, "active": false })
        .await?;
    out.insert(
        "projects",
        doc! { "active": active_projects as i64, "finished": finished_projects as i64 },
    );

    let crews = db.collection::<Crew>("crews");
    let total_crews = crews.count_documents(doc! {}).await?;
    let committed_crews = crews.count_documents(doc! { "project_id": { "$ne": null } }).await?;
    out.insert(
        "crews",
        doc! {
            "total": total_crews as i64,
            "on_project": committed_crews as i64,
            "idle": (total_crews - committed_crews) as i64,
        },
    );

    let workers_coll = db.collection::<Worker>("workers");
    let mut cursor = workers_coll.find(doc! { "active": true }).await?;
    let mut total_workers: i64 = 0;
    let mut available_workers: i64 = 0;
    let mut committed_workers: i64 = 0;
    while let Some(res) = cursor.next().await {
        if let Ok(worker) = res {
            total_workers += 1;
            if availability::is_project_committed(db, &worker.user_id).await {
                committed_workers += 1;
            } else if availability::is_assignable(db, &worker).await {
                available_workers += 1;
            }
        }
    }
    out.insert(
        "workers",
        doc! {
            "total": total_workers,
            "available": available_workers,
            "committed": committed_workers,
        },
    );

    let requests = db.collection::<WorkerRequest>("worker_requests");
    let pending_requests = requests.count_documents(doc! { "status": "pending" }).await?;
    let incidents = db.collection::<IncidentNotice>("incidents");
    let open_incidents = incidents.count_documents(doc! { "acknowledged": false }).await?;
    out.insert(
        "attention",
        doc! {
            "pending_requests": pending_requests as i64,
            "open_incidents": open_incidents as i64,
        },
    );

    Ok(out)
}

// GET /dashboard
pub async fn get_dashboard(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return HttpResponse::Unauthorized().body("Only a chief can view the dashboard");
    }

    match compute_dashboard(&data.mongodb.db, &current_user).await {
        Ok(doc) => HttpResponse::Ok().json(doc),
        Err(err) => HttpResponse::InternalServerError().body(format!("Error building dashboard: {}", err)),
    }
}
