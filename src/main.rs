// src/main.rs

mod app_state;
mod auth;
mod availability;
mod chat;
mod config;
mod crew_management;
mod dashboard;
mod db;
mod models;
mod notifications;
mod project;
mod requests;
mod roster;
mod seed;
mod worker_management;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};

use crate::app_state::AppState;
use crate::auth::{change_password, login};
use crate::chat::{
    archive_conversation, create_private_conversation, get_archived_chat, get_conversation,
    list_archived_chats, list_conversations, send_message,
};
use crate::crew_management::{
    create_crew, dissolve_crew, get_crew, list_crews, remove_member, update_crew,
};
use crate::dashboard::get_dashboard;
use crate::notifications::{list_notifications, mark_notification_read};
use crate::project::{
    assign_crews, create_project, finalize_project, get_project, list_projects, update_project,
};
use crate::requests::{
    acknowledge_incident, list_incidents, list_requests, report_incident, submit_request,
    update_request_status,
};
use crate::worker_management::{
    clear_worker_state, create_worker, deactivate_worker, get_worker, list_workers,
    set_worker_state, update_worker,
};

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    match verify_token(&token) {
                        Ok(user_id) => {
                            // Insert user_id as a string extension
                            req.extensions_mut().insert(user_id);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

fn verify_token(token: &str) -> Result<String, String> {
    let secret = env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
    match auth::validate_jwt(token, &secret) {
        Ok(claims) => Ok(claims.sub),
        Err(e) => Err(format!("Token decode error: {}", e)),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);

    // `cargo run -- seed` provisions the default role labels and exits.
    if env::args().any(|arg| arg == "seed") {
        seed::run(&mongodb.db).await;
        return Ok(());
    }

    let frontend_origin =
        env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

    println!("Server running at http://0.0.0.0:8080");
    println!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/change_password", web::post().to(change_password)),
            )
            // WORKERS
            .service(
                web::scope("/workers")
                    .route("", web::post().to(create_worker))
                    .route("", web::get().to(list_workers))
                    .service(
                        web::scope("/{worker_id}")
                            .route("", web::get().to(get_worker))
                            .route("", web::put().to(update_worker))
                            .route("", web::delete().to(deactivate_worker))
                            .route("/state", web::post().to(set_worker_state))
                            .route("/state", web::delete().to(clear_worker_state)),
                    ),
            )
            // CREWS
            .service(
                web::scope("/crews")
                    .route("", web::post().to(create_crew))
                    .route("", web::get().to(list_crews))
                    .service(
                        web::scope("/{crew_id}")
                            .route("", web::get().to(get_crew))
                            .route("", web::put().to(update_crew))
                            .route("", web::delete().to(dissolve_crew))
                            .route("/members", web::delete().to(remove_member)),
                    ),
            )
            // PROJECTS
            .service(
                web::scope("/projects")
                    .route("", web::post().to(create_project))
                    .route("", web::get().to(list_projects))
                    .service(
                        web::scope("/{project_id}")
                            .route("", web::get().to(get_project))
                            .route("", web::put().to(update_project))
                            .route("/finalize", web::post().to(finalize_project))
                            .route("/crews", web::put().to(assign_crews)),
                    ),
            )
            // CONVERSATIONS
            .service(
                web::scope("/conversations")
                    .route("", web::get().to(list_conversations))
                    .route("/private/{user_id}", web::post().to(create_private_conversation))
                    .service(
                        web::scope("/{conversation_id}")
                            .route("", web::get().to(get_conversation))
                            .route("/messages", web::post().to(send_message))
                            .route("/archive", web::post().to(archive_conversation)),
                    ),
            )
            // ARCHIVED CHATS
            .service(
                web::scope("/archived_chats")
                    .route("", web::get().to(list_archived_chats))
                    .route("/{archive_id}", web::get().to(get_archived_chat)),
            )
            // REQUESTS & INCIDENTS
            .service(
                web::scope("/requests")
                    .route("", web::post().to(submit_request))
                    .route("", web::get().to(list_requests))
                    .route("/{request_id}/status", web::post().to(update_request_status)),
            )
            .service(
                web::scope("/incidents")
                    .route("", web::post().to(report_incident))
                    .route("", web::get().to(list_incidents))
                    .route("/{incident_id}/acknowledge", web::post().to(acknowledge_incident)),
            )
            // NOTIFICATIONS
            .service(
                web::scope("/notifications")
                    .route("", web::get().to(list_notifications))
                    .route("/{notification_id}/read", web::post().to(mark_notification_read)),
            )
            // DASHBOARD
            .service(web::resource("/dashboard").route(web::get().to(get_dashboard)))
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}
