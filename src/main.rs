use cms_oauth_relay::{run_server, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // LOG_FORMAT=json for production, pretty (or unset) for development
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cms_oauth_relay=info,tower_http=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(log_format = %log_format, "Starting CMS OAuth relay");

    let config = Config::from_env()?;
    info!(
        port = config.port,
        github = config.github.is_some(),
        gitlab = config.gitlab.is_some(),
        allowed_domains = config.allowed_domains.len(),
        "Configuration loaded from environment"
    );

    run_server(config).await?;
    Ok(())
}
