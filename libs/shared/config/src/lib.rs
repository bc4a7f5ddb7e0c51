use std::env;
use std::str::FromStr;
use tracing::warn;

/// Process configuration for the calendar platform. Supabase coordinates
/// must come from the environment; server tunables fall back to defaults
/// when absent or malformed.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Port the API binds on (`PORT`).
    pub server_port: u16,
    /// Seconds between maintenance passes: materialization window warm-up,
    /// drift audit, retention (`CALENDAR_MAINTENANCE_INTERVAL_SECS`).
    pub maintenance_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: required_var("SUPABASE_URL"),
            supabase_anon_key: required_var("SUPABASE_ANON_PUBLIC_KEY"),
            supabase_jwt_secret: required_var("SUPABASE_JWT_SECRET"),
            server_port: tunable_var("PORT", 3000),
            maintenance_interval_secs: tunable_var("CALENDAR_MAINTENANCE_INTERVAL_SECS", 6 * 3600),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn required_var(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

fn tunable_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value {:?}, using the default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunables_fall_back_on_garbage() {
        env::set_var("TEST_CALENDAR_TUNABLE", "not-a-number");
        let value: u64 = tunable_var("TEST_CALENDAR_TUNABLE", 42);
        assert_eq!(value, 42);
        env::remove_var("TEST_CALENDAR_TUNABLE");
    }

    #[test]
    fn tunables_parse_when_valid() {
        env::set_var("TEST_CALENDAR_PORT", "8080");
        let value: u16 = tunable_var("TEST_CALENDAR_PORT", 3000);
        assert_eq!(value, 8080);
        env::remove_var("TEST_CALENDAR_PORT");
    }
}
