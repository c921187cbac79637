use actix_web::{middleware::Logger, web, App, HttpServer};
use std::error::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use course_insight::api::{self, AppState};
use course_insight::{data, AppConfig, Database};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Course Insight v{} starting", env!("CARGO_PKG_VERSION"));

    let db = Database::connect(&config.database.url, config.database.max_connections).await?;
    if config.seed_demo_data {
        data::seed_demo_data(&db).await?;
    }

    let state = web::Data::new(AppState::new(db, &config));
    let (host, port) = config.bind_address();
    info!("Listening on http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(api::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}
