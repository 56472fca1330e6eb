// billing-backend/src/config/app.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// カタログXMLファイル、またはバージョンごとのファイルを置いたディレクトリ
    pub catalog_path: PathBuf,
    /// 期日を迎えたイベントを通知するバックグラウンド処理の間隔
    pub event_notifier_interval: Duration,
    /// CORSで許可するオリジン
    pub cors_allowed_origin: String,
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok(); // .env ファイルを読み込む (存在しなくてもエラーにしない)

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| "Invalid PORT value")?,
            database_url: env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "resources/catalog".to_string())
                .into(),
            event_notifier_interval: Duration::from_secs(
                env::var("EVENT_NOTIFIER_INTERVAL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .map_err(|_| "Invalid EVENT_NOTIFIER_INTERVAL_SECS value")?,
            ),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            request_timeout: Duration::from_secs(
                env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .map_err(|_| "Invalid REQUEST_TIMEOUT_SECS value")?,
            ),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_test(&self) -> bool {
        self.environment == "test"
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// テスト用の設定を作成
    pub fn for_testing() -> Self {
        // 環境変数から読み込み、なければデフォルト値を使用
        Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "test".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            database_url: "sqlite::memory:".to_string(),
            catalog_path: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources/catalog"),
            event_notifier_interval: Duration::from_secs(1),
            cors_allowed_origin: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}
