use crate::api::{serve, ServerSettings};
use crate::cli::actions::Action;
use anyhow::Result;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            access_secret,
            refresh_secret,
            config,
            cors_origins,
        } => {
            // Fail on malformed DSNs here rather than deep inside the pool.
            Url::parse(&dsn)?;

            serve(ServerSettings {
                port,
                dsn,
                access_secret,
                refresh_secret,
                config,
                cors_origins,
            })
            .await?;
        }
    }

    Ok(())
}
