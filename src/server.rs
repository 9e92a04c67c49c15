use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use log::{error, info};
use serde::Deserialize;
use std::sync::Arc;

use project_harvester_lib::config::DEFAULT_PAGES;
use project_harvester_lib::job_manager::{ChromeResources, StartError};
use project_harvester_lib::{logger, AppConfig, HarvestError, JobManager};

struct AppState {
    job_manager: Arc<JobManager>,
}

#[derive(Debug, Deserialize)]
struct ScrapeParams {
    pages: Option<usize>,
}

#[get("/api/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json("Server is running")
}

#[post("/scrape-projects/")]
async fn scrape_projects(query: web::Query<ScrapeParams>, data: web::Data<AppState>) -> impl Responder {
    let pages = query.pages.unwrap_or(DEFAULT_PAGES);

    match data.job_manager.start_run(pages) {
        Ok(run_id) => HttpResponse::Accepted().json(serde_json::json!({
            "message": format!("Started scraping {} pages of projects.", pages),
            "run_id": run_id,
        })),
        Err(StartError::AlreadyRunning(run_id)) => HttpResponse::Conflict().json(serde_json::json!({
            "message": "A scrape is already in progress.",
            "run_id": run_id,
        })),
        Err(StartError::Invalid(e)) => HttpResponse::BadRequest().json(serde_json::json!({
            "message": e.to_string(),
        })),
    }
}

#[get("/projects/")]
async fn list_projects(data: web::Data<AppState>) -> impl Responder {
    let resources = data.job_manager.resources();
    let projects = web::block(move || -> Result<_, HarvestError> {
        let mut store = resources.open_store()?;
        Ok(store.all()?)
    })
    .await;

    match projects {
        Ok(Ok(projects)) => HttpResponse::Ok().json(projects),
        Ok(Err(e)) => {
            error!("Failed to list projects: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({ "message": e.to_string() }))
        }
        Err(e) => {
            error!("Project listing task failed: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/scrape-status/")]
async fn scrape_status(data: web::Data<AppState>) -> impl Responder {
    match data.job_manager.status() {
        Some(status) => HttpResponse::Ok().json(status),
        None => HttpResponse::NotFound().json("No scrape has been started"),
    }
}

#[post("/scrape-stop/")]
async fn scrape_stop(data: web::Data<AppState>) -> impl Responder {
    match data.job_manager.stop() {
        Some(run_id) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Stop requested.",
            "run_id": run_id,
        })),
        None => HttpResponse::NotFound().json("No scrape in progress"),
    }
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(scrape_projects)
        .service(list_projects)
        .service(scrape_status)
        .service(scrape_stop);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    logger::init();

    let config = AppConfig::from_env().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let bind_addr = config.bind_addr.clone();

    let job_manager = Arc::new(JobManager::new(Arc::new(ChromeResources::new(config))));
    let state = web::Data::new(AppState { job_manager });

    info!("Starting Web Server at http://{}", bind_addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
