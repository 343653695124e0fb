use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::error;
use mongodb::bson::doc;
use mongodb::Database;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::{worker_type, Account, Worker};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordInfo {
    pub current_password: String,
    pub new_password: String,
}

// JWT creation
pub fn create_jwt(user_id: &str, secret: &str) -> String {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .unwrap_or_default()
}

// JWT validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Loads the account behind a user id; `None` on lookup failure too.
pub async fn load_account(db: &Database, user_id: &str) -> Option<Account> {
    let accounts = db.collection::<Account>("accounts");
    match accounts.find_one(doc! { "user_id": user_id }).await {
        Ok(account) => account,
        Err(err) => {
            error!("Error loading account {}: {}", user_id, err);
            None
        }
    }
}

/// Chiefs are the privileged administrators of the system.
pub async fn is_chief(db: &Database, user_id: &str) -> bool {
    matches!(load_account(db, user_id).await, Some(a) if a.role == worker_type::CHIEF)
}

// POST /auth/login
pub async fn login(data: web::Data<AppState>, login_info: web::Json<LoginInfo>) -> impl Responder {
    let accounts = data.mongodb.db.collection::<Account>("accounts");
    let account = match accounts.find_one(doc! { "username": &login_info.username }).await {
        Ok(Some(account)) => account,
        Ok(None) => return HttpResponse::Unauthorized().body("Invalid credentials"),
        Err(err) => {
            error!("Error logging in {}: {}", login_info.username, err);
            return HttpResponse::InternalServerError().body("Error logging in");
        }
    };

    if !account.active {
        return HttpResponse::Unauthorized().body("Account is inactive");
    }
    if !verify(&login_info.password, &account.password).unwrap_or(false) {
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    // The generated first password must be rotated; the client is told on
    // every login until it happens.
    let workers = data.mongodb.db.collection::<Worker>("workers");
    let must_change_password = match workers.find_one(doc! { "user_id": &account.user_id }).await {
        Ok(Some(worker)) => worker.initial_password,
        _ => false,
    };

    let token = create_jwt(&account.user_id, &data.config.jwt_secret);
    HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user_id": account.user_id,
        "role": account.role,
        "must_change_password": must_change_password,
    }))
}

// POST /auth/change_password
pub async fn change_password(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<ChangePasswordInfo>,
) -> impl Responder {
    let current_user = if let Some(id) = req.extensions().get::<String>() {
        id.clone()
    } else {
        return HttpResponse::Unauthorized().body("Unauthorized");
    };

    let accounts = data.mongodb.db.collection::<Account>("accounts");
    let account = match accounts.find_one(doc! { "user_id": &current_user }).await {
        Ok(Some(account)) => account,
        Ok(None) => return HttpResponse::NotFound().body("Account not found"),
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("Error loading account: {}", err))
        }
    };

    if !verify(&info.current_password, &account.password).unwrap_or(false) {
        return HttpResponse::Unauthorized().body("Current password does not match");
    }
    let hashed = match hash(&info.new_password, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => return HttpResponse::InternalServerError().body("Error hashing password"),
    };

    if let Err(err) = accounts
        .update_one(
            doc! { "user_id": &current_user },
            doc! { "$set": { "password": hashed } },
        )
        .await
    {
        return HttpResponse::InternalServerError().body(format!("Error updating password: {}", err));
    }

    // Clear the first-password flag on the worker record, if any.
    let workers = data.mongodb.db.collection::<Worker>("workers");
    let _ = workers
        .update_one(
            doc! { "user_id": &current_user },
            doc! { "$set": { "initial_password": false } },
        )
        .await;

    HttpResponse::Ok().body("Password updated")
}
