// src/project.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::models::{project_complexity, project_kind, Crew, Project};
use crate::notifications::{self, messages};
use crate::roster;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub complexity: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub complexity: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AssignCrewsRequest {
    pub crew_ids: Vec<String>,
}

async fn require_chief(req: &HttpRequest, data: &web::Data<AppState>) -> Result<String, HttpResponse> {
    let current_user = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Err(HttpResponse::Unauthorized().body("Unauthorized")),
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return Err(HttpResponse::Unauthorized().body("Only a chief can manage projects"));
    }
    Ok(current_user)
}

/// Loads a project and checks the caller owns it.
async fn load_owned_project(
    data: &web::Data<AppState>,
    project_id: &str,
    chief_id: &str,
) -> Result<Project, HttpResponse> {
    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects.find_one(doc! { "project_id": project_id }).await {
        Ok(Some(project)) => {
            if project.chief_id != chief_id {
                Err(HttpResponse::Unauthorized().body("Only the owning chief can manage this project"))
            } else {
                Ok(project)
            }
        }
        Ok(None) => Err(HttpResponse::NotFound().body("Project not found")),
        Err(err) => {
            Err(HttpResponse::InternalServerError().body(format!("Error fetching project: {}", err)))
        }
    }
}

// POST /projects
pub async fn create_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<CreateProjectRequest>,
) -> impl Responder {
    let current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if info.name.trim().is_empty() {
        return HttpResponse::BadRequest().body("Project name is required");
    }
    let kind = info.kind.clone().unwrap_or_else(|| project_kind::OTHER.to_string());
    if !project_kind::ALL.contains(&kind.as_str()) {
        return HttpResponse::BadRequest().body("Invalid project kind");
    }
    let complexity = info
        .complexity
        .clone()
        .unwrap_or_else(|| project_complexity::MEDIUM.to_string());
    if !project_complexity::ALL.contains(&complexity.as_str()) {
        return HttpResponse::BadRequest().body("Invalid project complexity");
    }

    let project = Project {
        project_id: Uuid::new_v4().to_string(),
        name: info.name.trim().to_string(),
        description: info.description.clone().unwrap_or_default(),
        kind,
        complexity,
        start_date: info.start_date.unwrap_or_else(Utc::now),
        end_date: info.end_date,
        chief_id: current_user,
        active: true,
        created_at: Utc::now(),
    };
    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects.insert_one(&project).await {
        Ok(_) => {
            info!("Project created: {}", project.name);
            HttpResponse::Ok().json(project)
        }
        Err(err) => {
            error!("Error creating project: {}", err);
            HttpResponse::InternalServerError().body("Error creating project")
        }
    }
}

// GET /projects
// The chief's own projects.
pub async fn list_projects(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let projects_coll = data.mongodb.db.collection::<Project>("projects");
    let mut cursor = match projects_coll.find(doc! { "chief_id": &current_user }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching projects: {}", err))
        }
    };

    let mut projects = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(p) => projects.push(p),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating projects: {}", err))
            }
        }
    }
    HttpResponse::Ok().json(projects)
}

// GET /projects/{project_id}
pub async fn get_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> impl Responder {
    let current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match load_owned_project(&data, &project_id, &current_user).await {
        Ok(project) => HttpResponse::Ok().json(project),
        Err(resp) => resp,
    }
}

// PUT /projects/{project_id}
pub async fn update_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    info: web::Json<UpdateProjectRequest>,
) -> impl Responder {
    let current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let project = match load_owned_project(&data, &project_id, &current_user).await {
        Ok(project) => project,
        Err(resp) => return resp,
    };

    let mut set_doc = doc! {};
    if let Some(name) = &info.name {
        if name.trim().is_empty() {
            return HttpResponse::BadRequest().body("Project name is required");
        }
        set_doc.insert("name", name.trim());
    }
    if let Some(description) = &info.description {
        set_doc.insert("description", description.clone());
    }
    if let Some(kind) = &info.kind {
        if !project_kind::ALL.contains(&kind.as_str()) {
            return HttpResponse::BadRequest().body("Invalid project kind");
        }
        set_doc.insert("kind", kind.clone());
    }
    if let Some(complexity) = &info.complexity {
        if !project_complexity::ALL.contains(&complexity.as_str()) {
            return HttpResponse::BadRequest().body("Invalid project complexity");
        }
        set_doc.insert("complexity", complexity.clone());
    }
    if let Some(end_date) = &info.end_date {
        set_doc.insert("end_date", end_date.to_rfc3339());
    }
    if set_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    let projects = data.mongodb.db.collection::<Project>("projects");
    match projects
        .update_one(doc! { "project_id": &project.project_id }, doc! { "$set": set_doc })
        .await
    {
        Ok(_) => HttpResponse::Ok().body("Project updated"),
        Err(err) => HttpResponse::InternalServerError().body(format!("Error updating project: {}", err)),
    }
}

// POST /projects/{project_id}/finalize
// The end-of-life transition: the project goes inactive, its crews are
// released and every crew conversation is archived. Re-invoking on an
// already-finalized project is a no-op.
pub async fn finalize_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> impl Responder {
    let current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let project = match load_owned_project(&data, &project_id, &current_user).await {
        Ok(project) => project,
        Err(resp) => return resp,
    };

    if !project.active {
        return HttpResponse::Ok().body("Project already finalized");
    }

    let projects = data.mongodb.db.collection::<Project>("projects");
    let update = doc! { "$set": {
        "active": false,
        "end_date": project.end_date.unwrap_or_else(Utc::now).to_rfc3339(),
    } };
    if let Err(err) = projects
        .update_one(doc! { "project_id": &project.project_id }, update)
        .await
    {
        return HttpResponse::InternalServerError().body(format!("Error finalizing project: {}", err));
    }

    roster::finalize_project_crews(&data.mongodb.db, &project.project_id, &current_user).await;

    info!("Project {} finalized", project.name);
    HttpResponse::Ok().body("Project finalized")
}

// PUT /projects/{project_id}/crews
// Replaces the set of crews attached to the project.
pub async fn assign_crews(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    info: web::Json<AssignCrewsRequest>,
) -> impl Responder {
    let current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let project = match load_owned_project(&data, &project_id, &current_user).await {
        Ok(project) => project,
        Err(resp) => return resp,
    };
    if !project.active {
        return HttpResponse::BadRequest().body("Cannot assign crews to a finalized project");
    }

    let crews = data.mongodb.db.collection::<Crew>("crews");

    // Detach the previous set, then attach the submitted one.
    if let Err(err) = crews
        .update_many(
            doc! { "project_id": &project.project_id },
            doc! { "$set": { "project_id": null } },
        )
        .await
    {
        return HttpResponse::InternalServerError().body(format!("Error releasing crews: {}", err));
    }
    if let Err(err) = crews
        .update_many(
            doc! { "crew_id": { "$in": info.crew_ids.clone() } },
            doc! { "$set": { "project_id": &project.project_id } },
        )
        .await
    {
        return HttpResponse::InternalServerError().body(format!("Error assigning crews: {}", err));
    }

    let mut cursor = match crews.find(doc! { "project_id": &project.project_id }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching crews: {}", err))
        }
    };
    while let Some(res) = cursor.next().await {
        if let Ok(crew) = res {
            if let Some(leader) = &crew.leader_id {
                notifications::notify(
                    &data.mongodb.db,
                    leader,
                    &messages::crew_project_changed(&crew.name, &project.name),
                )
                .await;
            }
        }
    }

    HttpResponse::Ok().body("Crews updated")
}
