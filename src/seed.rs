// src/seed.rs
//
// One-shot provisioning step, run with `-- seed` instead of at every
// process start. Safe to re-run: every write is an upsert.

use log::info;
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;

use crate::models::RoleLabel;

const DEFAULT_ROLES: [&str; 6] = [
    "mason",
    "carpenter",
    "electrician",
    "welder",
    "machine operator",
    "laborer",
];

pub async fn run(db: &Database) {
    let roles = db.collection::<RoleLabel>("roles");
    let mut created = 0;

    for name in DEFAULT_ROLES {
        match roles.find_one(doc! { "name": name }).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let role = RoleLabel {
                    role_id: Uuid::new_v4().to_string(),
                    name: name.to_string(),
                };
                if roles.insert_one(&role).await.is_ok() {
                    created += 1;
                    info!("Seeded role label '{}'", name);
                }
            }
            Err(err) => {
                eprintln!("Error checking role '{}': {}", name, err);
            }
        }
    }

    if created == 0 {
        println!("Nothing to seed (all role labels exist)");
    } else {
        println!("Seeded {} role label(s)", created);
    }
}
