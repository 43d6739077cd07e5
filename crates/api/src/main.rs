use std::sync::Arc;

use crudforge_api::config::ApiConfig;
use crudforge_core::SharedStore;
use crudforge_infra::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    crudforge_observability::init_with(config.log_format);

    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let users = users_store(&config).await?;
    let app = crudforge_api::app::build_app(users, &config.jwt_secret)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "postgres")]
async fn users_store(config: &ApiConfig) -> anyhow::Result<SharedStore> {
    if let Some(url) = &config.database_url {
        let store = crudforge_infra::PgStore::connect(url, "users").await?;
        tracing::info!("users stored in postgres");
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(InMemoryStore::new("users")))
}

#[cfg(not(feature = "postgres"))]
async fn users_store(config: &ApiConfig) -> anyhow::Result<SharedStore> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored: built without the postgres feature");
    }
    Ok(Arc::new(InMemoryStore::new("users")))
}
