use feast_pass::{
    api::{self, AppState},
    config::{self, database},
    core::roster::StudentFeed,
    errors::Result,
    mailer::HttpMailer,
};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also be set externally
    dotenv().ok();

    // 3. Load the main application configuration
    let app_config = config::app::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    if app_config.email.coupon_endpoint.is_none() {
        warn!("EMAIL_API_URL is not set; coupon issuance is disabled");
    }

    // 4. Connect to the database and make sure the tables exist
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Serve the API
    let mailer = HttpMailer::new(&app_config.email)?;
    let state = AppState {
        db,
        mailer: Arc::new(mailer),
        config: Arc::new(app_config),
        feed: StudentFeed::new(),
    };
    api::serve(state).await
}
