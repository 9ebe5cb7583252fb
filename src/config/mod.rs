use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub clients: ClientsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_slow_query_warning: bool,
    pub slow_query_threshold_ms: u64,
}

/// Locations and credentials for the collaborating services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientsConfig {
    pub identity_url: String,
    pub auth_url: String,
    pub sharing_url: String,
    pub metadata_url: String,
    pub server_name: String,
    #[serde(skip_serializing)]
    pub server_secret: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_response_compression: bool,
}

impl ClientsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("PORT") {
            self.service.port = v.parse().unwrap_or(self.service.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_SLOW_QUERY_WARNING") {
            self.database.enable_slow_query_warning = v.parse().unwrap_or(self.database.enable_slow_query_warning);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        // Client overrides
        if let Ok(v) = env::var("IDENTITY_URL") {
            self.clients.identity_url = v;
        }
        if let Ok(v) = env::var("AUTH_URL") {
            self.clients.auth_url = v;
        }
        if let Ok(v) = env::var("SHARING_URL") {
            self.clients.sharing_url = v;
        }
        if let Ok(v) = env::var("METADATA_URL") {
            self.clients.metadata_url = v;
        }
        if let Ok(v) = env::var("SERVER_NAME") {
            self.clients.server_name = v;
        }
        if let Ok(v) = env::var("SERVER_SECRET") {
            self.clients.server_secret = v;
        }
        if let Ok(v) = env::var("CLIENT_TIMEOUT_MS") {
            self.clients.timeout_ms = v.parse().unwrap_or(self.clients.timeout_ms);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_RESPONSE_COMPRESSION") {
            self.api.enable_response_compression = v.parse().unwrap_or(self.api.enable_response_compression);
        }

        self
    }

    fn local_clients() -> ClientsConfig {
        ClientsConfig {
            identity_url: "http://localhost:9107".to_string(),
            auth_url: "http://localhost:9222".to_string(),
            sharing_url: "http://localhost:9123".to_string(),
            metadata_url: "http://localhost:9120".to_string(),
            server_name: "device-data-api".to_string(),
            server_secret: String::new(),
            timeout_ms: 10_000,
        }
    }

    /// Development profile defaults, without environment overrides
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            service: ServiceConfig { port: 9127 },
            database: DatabaseConfig {
                url: "postgres://localhost/device_data".to_string(),
                max_connections: 10,
                connection_timeout: 30,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 100,
            },
            clients: Self::local_clients(),
            api: ApiConfig {
                enable_response_compression: false,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            service: ServiceConfig { port: 9127 },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 20,
                connection_timeout: 10,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 500,
            },
            clients: ClientsConfig {
                timeout_ms: 5_000,
                ..Self::local_clients()
            },
            api: ApiConfig {
                enable_response_compression: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            service: ServiceConfig { port: 9127 },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 50,
                connection_timeout: 5,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 1000,
            },
            clients: ClientsConfig {
                timeout_ms: 5_000,
                ..Self::local_clients()
            },
            api: ApiConfig {
                enable_response_compression: true,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.service.port, 9127);
        assert!(!config.api.enable_response_compression);
        assert!(config.database.url.starts_with("postgres://"));
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.api.enable_response_compression);
        assert_eq!(config.clients.timeout(), Duration::from_secs(5));
        assert!(config.database.url.is_empty());
    }

    #[test]
    fn test_server_secret_not_serialized() {
        let mut config = AppConfig::development();
        config.clients.server_secret = "shh".to_string();
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("shh"));
    }
}
