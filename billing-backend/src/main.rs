// billing-backend/src/main.rs
use axum::middleware;
use billing_backend::api::{app_router, with_http_layers, AppState};
use billing_backend::catalog::{CatalogLoader, XmlCatalogLoader};
use billing_backend::config::AppConfig;
use billing_backend::db::connect_and_migrate;
use billing_backend::logging::{inject_request_context, logging_middleware};
use billing_backend::service::{
    account_service::AccountService,
    event_bus::SubscriptionEventBus,
    migration_service::MigrationService,
    subscription_service::{event_notifier_task, SubscriptionService},
};
use billing_backend::utils::clock::{Clock, SystemClock};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // トレーシングの設定
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billing_backend=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("Starting Billing Backend server...");

    // 設定を読み込む
    let app_config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded: {:?}", app_config);

    // カタログを読み込む（不正なカタログでは起動しない）
    let catalog = Arc::new(XmlCatalogLoader::new().load(&app_config.catalog_path)?);
    tracing::info!(
        catalog = %catalog.catalog_name(),
        versions = catalog.versions().len(),
        "Catalog loaded"
    );

    // データベース接続とマイグレーション
    let db_pool = connect_and_migrate(&app_config).await?;
    tracing::info!("Database pool created successfully.");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = SubscriptionEventBus::new();

    let subscription_service = Arc::new(SubscriptionService::new(
        db_pool.clone(),
        catalog.clone(),
        clock.clone(),
        bus.clone(),
    ));
    let app_state = AppState {
        account_service: Arc::new(AccountService::new(db_pool.clone())),
        subscription_service: subscription_service.clone(),
        migration_service: Arc::new(MigrationService::new(
            db_pool,
            catalog.clone(),
            clock,
            bus,
        )),
        catalog,
    };

    // 期日を迎えたイベントの通知
    tokio::spawn(event_notifier_task(
        subscription_service,
        app_config.event_notifier_interval,
    ));

    // ルーターの設定
    let app_router = with_http_layers(app_router(app_state), &app_config)?
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(inject_request_context));

    // サーバーの起動
    let server_addr = app_config.server_addr();
    tracing::info!("Router configured. Server listening on {}", server_addr);

    let listener = TcpListener::bind(&server_addr).await?;
    axum::serve(listener, app_router.into_make_service()).await?;

    Ok(())
}
