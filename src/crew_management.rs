// src/crew_management.rs

use std::collections::HashMap;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, error, info};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::availability;
use crate::models::{Assignment, Crew, Project, Worker};
use crate::notifications::{self, messages};
use crate::{auth, roster};

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MemberSelection {
    pub worker_id: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCrewRequest {
    pub name: String,
    pub project_id: Option<String>,
    pub leader_id: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberSelection>,
}

/// Full-form update: the crew is set to exactly this shape, mirroring the
/// create payload. Members absent from the list are unassigned.
#[derive(Debug, Deserialize)]
pub struct UpdateCrewRequest {
    pub name: String,
    pub project_id: Option<String>,
    pub leader_id: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberSelection>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CrewMemberInfo {
    pub user_id: String,
    pub worker_id: String,
    pub name: String,
    pub role: Option<String>,
    pub availability: String,
}

#[derive(Debug, Serialize)]
pub struct CrewDetail {
    pub crew: Crew,
    pub project_name: Option<String>,
    pub members: Vec<CrewMemberInfo>,
}

// ─── HELPERS ───────────────────────────────────────────────────────────────────

async fn require_chief(req: &HttpRequest, data: &web::Data<AppState>) -> Result<String, HttpResponse> {
    let current_user = match req.extensions().get::<String>() {
        Some(id) => id.clone(),
        None => return Err(HttpResponse::Unauthorized().body("Unauthorized")),
    };
    if !auth::is_chief(&data.mongodb.db, &current_user).await {
        return Err(HttpResponse::Unauthorized().body("Only a chief can manage crews"));
    }
    Ok(current_user)
}

async fn load_crew(data: &web::Data<AppState>, crew_id: &str) -> Result<Crew, HttpResponse> {
    let crews = data.mongodb.db.collection::<Crew>("crews");
    match crews.find_one(doc! { "crew_id": crew_id }).await {
        Ok(Some(crew)) => Ok(crew),
        Ok(None) => Err(HttpResponse::NotFound().body("Crew not found")),
        Err(err) => Err(HttpResponse::InternalServerError().body(format!("Error fetching crew: {}", err))),
    }
}

/// Creates assignments for the selected workers, silently skipping every
/// candidate the eligibility check rejects, so a batch partially succeeds.
/// Returns the user ids that were actually assigned.
async fn assign_members(
    data: &web::Data<AppState>,
    crew: &Crew,
    members: &[MemberSelection],
) -> Vec<String> {
    let db = &data.mongodb.db;
    let workers = db.collection::<Worker>("workers");
    let assignments = db.collection::<Assignment>("assignments");
    let mut assigned = Vec::new();

    for selection in members {
        let worker = match workers.find_one(doc! { "worker_id": &selection.worker_id }).await {
            Ok(Some(w)) => w,
            Ok(None) => {
                debug!("Skipping unknown worker {}", selection.worker_id);
                continue;
            }
            Err(err) => {
                error!("Error loading worker {}: {}", selection.worker_id, err);
                continue;
            }
        };

        // Re-evaluated per candidate at submission time; never cached.
        if !availability::is_assignable(db, &worker).await {
            debug!("Skipping worker {}: not assignable", worker.id_number);
            continue;
        }

        let assignment = Assignment {
            assignment_id: Uuid::new_v4().to_string(),
            worker_id: worker.user_id.clone(),
            crew_id: crew.crew_id.clone(),
            role: selection.role.clone(),
            created_at: Utc::now(),
        };
        if let Err(err) = assignments.insert_one(&assignment).await {
            error!("Error assigning worker {}: {}", worker.id_number, err);
            continue;
        }

        notifications::notify(
            db,
            &worker.user_id,
            &messages::assigned_to_crew(&crew.name, selection.role.as_deref()),
        )
        .await;
        assigned.push(worker.user_id);
    }
    assigned
}

// ─── ENDPOINTS ─────────────────────────────────────────────────────────────────

// POST /crews
pub async fn create_crew(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<CreateCrewRequest>,
) -> impl Responder {
    let _current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if info.name.trim().is_empty() {
        return HttpResponse::BadRequest().body("Crew name is required");
    }

    if let Some(leader_id) = &info.leader_id {
        let (free, reason) = availability::leader_available(&data.mongodb.db, leader_id, None).await;
        if !free {
            return HttpResponse::BadRequest()
                .body(reason.unwrap_or_else(|| "Leader is not available".to_string()));
        }
    }

    let crew = Crew {
        crew_id: Uuid::new_v4().to_string(),
        name: info.name.trim().to_string(),
        project_id: info.project_id.clone(),
        leader_id: info.leader_id.clone(),
        created_at: Utc::now(),
    };
    let crews = data.mongodb.db.collection::<Crew>("crews");
    if let Err(err) = crews.insert_one(&crew).await {
        error!("Error creating crew: {}", err);
        return HttpResponse::InternalServerError().body("Error creating crew");
    }
    info!("Crew created: {}", crew.name);

    if let Some(leader_id) = &crew.leader_id {
        notifications::notify(&data.mongodb.db, leader_id, &messages::leader_of_new_crew(&crew.name))
            .await;
    }

    assign_members(&data, &crew, &info.members).await;
    roster::ensure_group_for_crew(&data.mongodb.db, &crew, data.config.group_chat_min_members).await;

    HttpResponse::Ok().json(crew)
}

// GET /crews
pub async fn list_crews(data: web::Data<AppState>) -> impl Responder {
    let crews_coll = data.mongodb.db.collection::<Crew>("crews");
    let mut cursor = match crews_coll.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error fetching crews: {}", err))
        }
    };

    let mut crews = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(c) => crews.push(c),
            Err(err) => {
                return HttpResponse::InternalServerError()
                    .body(format!("Error iterating crews: {}", err))
            }
        }
    }
    HttpResponse::Ok().json(crews)
}

// GET /crews/{crew_id}
// Crew detail with every member's resolved availability.
pub async fn get_crew(data: web::Data<AppState>, crew_id: web::Path<String>) -> impl Responder {
    let crew = match load_crew(&data, &crew_id).await {
        Ok(crew) => crew,
        Err(resp) => return resp,
    };
    let db = &data.mongodb.db;

    let project_name = match &crew.project_id {
        Some(project_id) => {
            let projects = db.collection::<Project>("projects");
            match projects.find_one(doc! { "project_id": project_id }).await {
                Ok(Some(p)) => Some(p.name),
                _ => None,
            }
        }
        None => None,
    };

    let assignments = db.collection::<Assignment>("assignments");
    let mut cursor = match assignments.find(doc! { "crew_id": &crew.crew_id }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            return HttpResponse::InternalServerError()
                .body(format!("Error fetching assignments: {}", err))
        }
    };

    let mut roles_by_user: HashMap<String, Option<String>> = HashMap::new();
    while let Some(res) = cursor.next().await {
        if let Ok(a) = res {
            roles_by_user.insert(a.worker_id, a.role);
        }
    }

    let workers = db.collection::<Worker>("workers");
    let mut members = Vec::new();
    for (user_id, role) in roles_by_user {
        if let Ok(Some(worker)) = workers.find_one(doc! { "user_id": &user_id }).await {
            let availability = availability::resolve_availability(db, &worker).await;
            members.push(CrewMemberInfo {
                user_id,
                worker_id: worker.worker_id.clone(),
                name: worker.full_name(),
                role,
                availability,
            });
        }
    }
    members.sort_by(|a, b| a.name.cmp(&b.name));

    HttpResponse::Ok().json(CrewDetail { crew, project_name, members })
}

// PUT /crews/{crew_id}
// Full-form edit: name, project, leader and the exact member list. Newly
// selected workers go through the eligibility check (skip-not-fail);
// deselected ones are unassigned with the usual removal side effects.
pub async fn update_crew(
    req: HttpRequest,
    data: web::Data<AppState>,
    crew_id: web::Path<String>,
    info: web::Json<UpdateCrewRequest>,
) -> impl Responder {
    let _current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let crew = match load_crew(&data, &crew_id).await {
        Ok(crew) => crew,
        Err(resp) => return resp,
    };
    let db = &data.mongodb.db;

    if info.name.trim().is_empty() {
        return HttpResponse::BadRequest().body("Crew name is required");
    }

    // The crew's own leader stays selectable; only a conflict with some
    // *other* project crew rejects the candidate.
    if let Some(leader_id) = &info.leader_id {
        let (free, reason) =
            availability::leader_available(db, leader_id, Some(&crew.crew_id)).await;
        if !free {
            return HttpResponse::BadRequest()
                .body(reason.unwrap_or_else(|| "Leader is not available".to_string()));
        }
    }

    let crews = data.mongodb.db.collection::<Crew>("crews");
    let update = doc! { "$set": {
        "name": info.name.trim(),
        "project_id": info.project_id.clone(),
        "leader_id": info.leader_id.clone(),
    } };
    if let Err(err) = crews.update_one(doc! { "crew_id": &crew.crew_id }, update).await {
        return HttpResponse::InternalServerError().body(format!("Error updating crew: {}", err));
    }

    // Leadership change notifications.
    if crew.leader_id != info.leader_id {
        if let Some(old_leader) = &crew.leader_id {
            notifications::notify(db, old_leader, &messages::leadership_removed(&crew.name)).await;
        }
        if let Some(new_leader) = &info.leader_id {
            notifications::notify(db, new_leader, &messages::leadership_assigned(&info.name)).await;
        }
    }

    let updated = Crew {
        name: info.name.trim().to_string(),
        project_id: info.project_id.clone(),
        leader_id: info.leader_id.clone(),
        ..crew
    };

    // Diff current assignments against the submitted member list.
    let assignments = db.collection::<Assignment>("assignments");
    let mut current: HashMap<String, Assignment> = HashMap::new();
    if let Ok(mut cursor) = assignments.find(doc! { "crew_id": &updated.crew_id }).await {
        while let Some(res) = cursor.next().await {
            if let Ok(a) = res {
                current.insert(a.worker_id.clone(), a);
            }
        }
    }

    let workers = db.collection::<Worker>("workers");
    let mut new_members: Vec<MemberSelection> = Vec::new();
    for selection in &info.members {
        let worker = match workers.find_one(doc! { "worker_id": &selection.worker_id }).await {
            Ok(Some(w)) => w,
            _ => continue,
        };
        if let Some(existing) = current.remove(&worker.user_id) {
            if existing.role != selection.role {
                let _ = assignments
                    .update_one(
                        doc! { "assignment_id": &existing.assignment_id },
                        doc! { "$set": { "role": selection.role.clone() } },
                    )
                    .await;
                notifications::notify(
                    db,
                    &worker.user_id,
                    &messages::role_changed(&updated.name, selection.role.as_deref()),
                )
                .await;
            }
        } else {
            new_members.push(MemberSelection {
                worker_id: selection.worker_id.clone(),
                role: selection.role.clone(),
            });
        }
    }

    assign_members(&data, &updated, &new_members).await;

    // Whatever is left in `current` was deselected.
    for (user_id, assignment) in current {
        if let Err(err) = assignments
            .delete_one(doc! { "assignment_id": &assignment.assignment_id })
            .await
        {
            error!("Error removing assignment {}: {}", assignment.assignment_id, err);
            continue;
        }
        notifications::notify(db, &user_id, &messages::removed_from_crew(&updated.name)).await;
        roster::after_assignment_removed(
            db,
            &updated.crew_id,
            &user_id,
            data.config.group_chat_min_members,
        )
        .await;
    }

    roster::ensure_group_for_crew(db, &updated, data.config.group_chat_min_members).await;
    HttpResponse::Ok().json(updated)
}

// DELETE /crews/{crew_id}/members
// Removes a single member. Allowed for a chief or the crew's own leader.
pub async fn remove_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    crew_id: web::Path<String>,
    info: web::Json<RemoveMemberRequest>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };
    let crew = match load_crew(&data, &crew_id).await {
        Ok(crew) => crew,
        Err(resp) => return resp,
    };
    let db = &data.mongodb.db;

    let allowed = auth::is_chief(db, &current_user).await
        || crew.leader_id.as_deref() == Some(current_user.as_str());
    if !allowed {
        return HttpResponse::Unauthorized().body("Not allowed to remove members from this crew");
    }

    let assignments = db.collection::<Assignment>("assignments");
    let filter = doc! { "crew_id": &crew.crew_id, "worker_id": &info.user_id };
    match assignments.delete_one(filter).await {
        Ok(res) if res.deleted_count == 1 => {}
        Ok(_) => return HttpResponse::NotFound().body("Member not found in crew"),
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error removing member: {}", err))
        }
    }

    notifications::notify(db, &info.user_id, &messages::removed_from_crew(&crew.name)).await;
    roster::after_assignment_removed(db, &crew.crew_id, &info.user_id, data.config.group_chat_min_members)
        .await;

    HttpResponse::Ok().body("Member removed")
}

// DELETE /crews/{crew_id}
// Dissolution. Only permitted while the crew has no project; the group
// conversation is snapshotted before the crew and its assignments go.
pub async fn dissolve_crew(
    req: HttpRequest,
    data: web::Data<AppState>,
    crew_id: web::Path<String>,
) -> impl Responder {
    let current_user = match require_chief(&req, &data).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let crew = match load_crew(&data, &crew_id).await {
        Ok(crew) => crew,
        Err(resp) => return resp,
    };

    if crew.project_id.is_some() {
        return HttpResponse::BadRequest()
            .body(format!("Crew '{}' cannot be dissolved while attached to a project", crew.name));
    }

    if roster::dissolve_crew(&data.mongodb.db, &crew, &current_user).await {
        HttpResponse::Ok().body("Crew dissolved")
    } else {
        HttpResponse::InternalServerError().body("Error dissolving crew")
    }
}
