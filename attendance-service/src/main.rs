use eventhub_shared::auth::require_local_secret;
use log::info;
use std::env;

mod error;
mod handlers;
mod models;
mod routes;


#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Attendance Service");

    // Inside Lambda the runtime API variable is always set
    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("Running under the Lambda runtime");
        let app = routes::create_router().await;
        return lambda_http::run(app).await;
    }

    require_local_secret(env::var("AUTH_JWT_SECRET").ok().as_deref())?;
    let app = routes::create_router().await;

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
