use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;
mod store;

use api::create_api_router;
use state::AppState;

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deepscan_web=debug,deepscan_core=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 初始化状态
    let state = AppState::new().await?;

    // 启动服务器
    let bind_address =
        std::env::var("DEEPSCAN_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    tracing::info!("DeepScan Web server listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(Cors::permissive())
            // API 路由
            .service(create_api_router())
            // 健康检查
            .route("/health", web::get().to(health_check))
    })
    .bind(bind_address)?
    .run()
    .await?;

    Ok(())
}
