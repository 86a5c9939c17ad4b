pub mod server;

use secrecy::SecretString;

use crate::auth::AuthConfig;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        access_secret: SecretString,
        refresh_secret: SecretString,
        config: AuthConfig,
        cors_origins: Vec<String>,
    },
}
