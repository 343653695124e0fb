// src/availability.rs
//
// Resolves a single authoritative availability label for a worker and
// answers the two eligibility questions built on top of it: "can this
// worker be assigned to a crew" and "can this user lead another crew".
//
// Two notions of "busy" exist and are kept apart on purpose:
//   - assignment-occupied: any live assignment at all. Only used to derive
//     the `assigned` availability label.
//   - project-committed: a live assignment to a crew with a non-null
//     project. Used by every eligibility check and by the dashboard count.

use futures_util::StreamExt;
use log::error;
use mongodb::bson::doc;
use mongodb::Database;

use crate::models::{worker_state, Assignment, Crew, Worker};

// ─── PURE RESOLUTION CORE ──────────────────────────────────────────────────────

/// Effective availability of a worker. The manual override wins
/// unconditionally; otherwise a live assignment derives `assigned`, and a
/// worker with neither keeps their stored state (default `available`).
pub fn resolve_state(worker: &Worker, has_live_assignment: bool) -> String {
    if worker.manual_override {
        return worker.state.clone();
    }
    if has_live_assignment {
        return worker_state::ASSIGNED.to_string();
    }
    worker.state.clone()
}

/// Whether a resolved availability label permits assignment at all.
pub fn state_allows_assignment(resolved: &str) -> bool {
    !worker_state::NON_ASSIGNABLE.contains(&resolved)
}

/// Assignment eligibility from already-fetched signals. Not assignable when
/// the resolved state blocks it, or when the worker is already committed to
/// a crew with a project.
pub fn assignable(worker: &Worker, has_live_assignment: bool, project_committed: bool) -> bool {
    let resolved = resolve_state(worker, has_live_assignment);
    if !state_allows_assignment(&resolved) {
        return false;
    }
    !project_committed
}

/// Leader conflict core: `led` holds (crew_id, has_project) for every crew
/// the candidate currently leads. The crew being edited is excluded so its
/// own leader can stay selected.
pub fn leader_is_free(led: &[(String, bool)], excluding_crew: Option<&str>) -> bool {
    !led.iter().any(|(crew_id, has_project)| {
        *has_project && excluding_crew != Some(crew_id.as_str())
    })
}

// ─── DATASTORE SIGNALS ─────────────────────────────────────────────────────────

/// Whether the account holds any live assignment (assignment-occupied).
pub async fn has_live_assignment(db: &Database, user_id: &str) -> bool {
    let assignments = db.collection::<Assignment>("assignments");
    match assignments.count_documents(doc! { "worker_id": user_id }).await {
        Ok(n) => n > 0,
        Err(err) => {
            error!("Error counting assignments for {}: {}", user_id, err);
            false
        }
    }
}

/// Whether the account is project-committed: a live assignment to a crew
/// whose project is non-null.
pub async fn is_project_committed(db: &Database, user_id: &str) -> bool {
    let assignments = db.collection::<Assignment>("assignments");
    let mut cursor = match assignments.find(doc! { "worker_id": user_id }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error fetching assignments for {}: {}", user_id, err);
            return false;
        }
    };

    let mut crew_ids = Vec::new();
    while let Some(res) = cursor.next().await {
        if let Ok(a) = res {
            crew_ids.push(a.crew_id);
        }
    }
    if crew_ids.is_empty() {
        return false;
    }

    let crews = db.collection::<Crew>("crews");
    let filter = doc! { "crew_id": { "$in": crew_ids }, "project_id": { "$ne": null } };
    match crews.count_documents(filter).await {
        Ok(n) => n > 0,
        Err(err) => {
            error!("Error checking project commitment for {}: {}", user_id, err);
            false
        }
    }
}

/// Resolve the worker's effective availability against live data. Must be
/// re-queried on every read: turning the override off re-derives immediately.
pub async fn resolve_availability(db: &Database, worker: &Worker) -> String {
    if worker.manual_override {
        return worker.state.clone();
    }
    let occupied = has_live_assignment(db, &worker.user_id).await;
    resolve_state(worker, occupied)
}

/// Eligibility check applied per candidate at assignment time. Never fails:
/// a datastore error is logged and the candidate reported as not assignable
/// so batch operations skip them and continue.
pub async fn is_assignable(db: &Database, worker: &Worker) -> bool {
    let occupied = has_live_assignment(db, &worker.user_id).await;
    let committed = is_project_committed(db, &worker.user_id).await;
    assignable(worker, occupied, committed)
}

/// Whether `user_id` may be set as leader of a crew. Rejected when they
/// already lead another crew with a project, excluding the crew under edit.
/// Returns a human-readable rejection message instead of an error.
pub async fn leader_available(
    db: &Database,
    user_id: &str,
    excluding_crew: Option<&str>,
) -> (bool, Option<String>) {
    let crews = db.collection::<Crew>("crews");
    let mut cursor = match crews.find(doc! { "leader_id": user_id }).await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error fetching led crews for {}: {}", user_id, err);
            return (false, Some("Could not verify leader availability".to_string()));
        }
    };

    let mut led = Vec::new();
    while let Some(res) = cursor.next().await {
        if let Ok(c) = res {
            led.push((c.crew_id, c.project_id.is_some()));
        }
    }

    if leader_is_free(&led, excluding_crew) {
        (true, None)
    } else {
        (
            false,
            Some("The selected user already leads another crew attached to an active project".to_string()),
        )
    }
}

/// Puts a worker back into a sane state after removal from a crew: a special
/// manual override (vacation, medical leave, unavailable) is cleared to
/// automatic/available, and a non-override worker is set available. Failures
/// are logged and swallowed; this runs inside the convergence pass.
pub async fn reset_state_after_removal(db: &Database, user_id: &str) {
    let workers = db.collection::<Worker>("workers");
    let worker = match workers.find_one(doc! { "user_id": user_id }).await {
        Ok(Some(w)) => w,
        Ok(None) => return,
        Err(err) => {
            error!("Error loading worker {} after removal: {}", user_id, err);
            return;
        }
    };

    let update = if worker.manual_override && worker_state::SPECIAL.contains(&worker.state.as_str()) {
        doc! { "$set": { "manual_override": false, "state": worker_state::AVAILABLE } }
    } else if !worker.manual_override {
        doc! { "$set": { "state": worker_state::AVAILABLE } }
    } else {
        return;
    };

    if let Err(err) = workers.update_one(doc! { "user_id": user_id }, update).await {
        error!("Error resetting state for worker {}: {}", user_id, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn worker(state: &str, manual_override: bool) -> Worker {
        Worker {
            worker_id: "w1".to_string(),
            id_number: "123456789".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Rojas".to_string(),
            email: "ana@example.com".to_string(),
            phone: None,
            address: None,
            worker_type: "worker".to_string(),
            specialty: None,
            state: state.to_string(),
            manual_override,
            years_experience: 3,
            user_id: "u1".to_string(),
            active: true,
            initial_password: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn override_wins_over_derived_occupancy() {
        let w = worker(worker_state::VACATION, true);
        assert_eq!(resolve_state(&w, true), worker_state::VACATION);
        assert_eq!(resolve_state(&w, false), worker_state::VACATION);
    }

    #[test]
    fn live_assignment_derives_assigned() {
        let w = worker(worker_state::AVAILABLE, false);
        assert_eq!(resolve_state(&w, true), worker_state::ASSIGNED);
    }

    #[test]
    fn clearing_override_rederives_immediately() {
        let mut w = worker(worker_state::VACATION, true);
        assert_eq!(resolve_state(&w, true), worker_state::VACATION);
        w.manual_override = false;
        assert_eq!(resolve_state(&w, true), worker_state::ASSIGNED);
        assert_eq!(resolve_state(&w, false), worker_state::VACATION);
    }

    #[test]
    fn idle_worker_keeps_stored_state() {
        let w = worker(worker_state::AVAILABLE, false);
        assert_eq!(resolve_state(&w, false), worker_state::AVAILABLE);
    }

    #[test]
    fn blocking_states_are_not_assignable() {
        for state in worker_state::NON_ASSIGNABLE {
            let w = worker(state, true);
            assert!(!assignable(&w, false, false), "{} should block", state);
        }
    }

    #[test]
    fn project_commitment_blocks_even_when_available() {
        let w = worker(worker_state::AVAILABLE, false);
        assert!(!assignable(&w, true, true));
    }

    #[test]
    fn occupied_without_project_is_still_assignable() {
        // A live assignment to a projectless crew derives `assigned`, which
        // does not block: only project commitment does.
        let w = worker(worker_state::AVAILABLE, false);
        assert!(assignable(&w, true, false));
    }

    #[test]
    fn leader_conflict_excludes_crew_under_edit() {
        let led = vec![("c1".to_string(), true)];
        assert!(!leader_is_free(&led, None));
        assert!(leader_is_free(&led, Some("c1")));
        assert!(!leader_is_free(&led, Some("c2")));
    }

    #[test]
    fn projectless_crews_never_conflict() {
        let led = vec![("c1".to_string(), false), ("c2".to_string(), false)];
        assert!(leader_is_free(&led, None));
    }
}
