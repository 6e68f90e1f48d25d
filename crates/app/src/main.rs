mod about;
mod blogs;
mod contacts;
mod envelope;
mod homepage;
mod list_cache;
mod listing;
mod notifier;
mod products;
mod references;
mod router;
mod taxonomy;
mod telemetry;

use std::{net::SocketAddr, time::Duration};

use tracing::{info, warn};
use url::Url;

use storefront_client::MailRelayClient;
use storefront_storage::Database;
use storefront_util::{load_env_file, AppConfig};

use crate::list_cache::ListCache;
use crate::notifier::Notifier;

const RELAY_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    let notifier = match &config.mail_relay {
        Some(relay) => {
            let http = reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?;
            let client = MailRelayClient::new(Url::parse(&relay.url)?, relay.secret.clone(), http);
            info!(stage = "mail", admin_email = %relay.admin_email, "mail relay enabled");
            Notifier::new(client, relay.admin_email.clone())
        }
        None => {
            warn!(stage = "mail", "MAIL_RELAY_URL not set; contact notifications disabled");
            Notifier::disabled()
        }
    };
    if config.admin_token.is_none() {
        warn!(stage = "app", "ADMIN_TOKEN not set; admin API disabled");
    }

    let list_cache = ListCache::new(config.list_cache_max_entries, config.list_cache_ttl);
    let state = router::AppState::new(
        metrics,
        database,
        config.admin_token.clone(),
        notifier,
        list_cache,
    );

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
