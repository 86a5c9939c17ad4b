//! Auth engine configuration.

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;

/// Tunables for token lifetimes and login lockout.
///
/// Values resolve flag -> environment -> these fallbacks; the CLI layer
/// handles the first two, so by the time a config reaches the engine every
/// field is concrete.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    max_login_attempts: u32,
    lockout_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> u32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }

    /// Failed attempts age out on the same clock as the lockout itself.
    #[must_use]
    pub fn attempt_window_seconds(&self) -> i64 {
        self.lockout_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;

    #[test]
    fn defaults_match_contract() {
        let config = AuthConfig::new();
        assert_eq!(config.access_ttl_seconds(), 900);
        assert_eq!(config.refresh_ttl_seconds(), 2_592_000);
        assert_eq!(config.max_login_attempts(), 5);
        assert_eq!(config.lockout_seconds(), 900);
    }

    #[test]
    fn overrides_apply() {
        let config = AuthConfig::new()
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(3600)
            .with_max_login_attempts(3)
            .with_lockout_seconds(30);
        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.refresh_ttl_seconds(), 3600);
        assert_eq!(config.max_login_attempts(), 3);
        assert_eq!(config.lockout_seconds(), 30);
        assert_eq!(config.attempt_window_seconds(), 30);
    }
}
