use serde::{Deserialize, Serialize};
use std::env;

/// Process configuration. Built once in `main` and handed to every component
/// that needs it; nothing reads the environment after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which Storage collaborator backs the CRUD engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(StorageBackend::Postgres),
            "memory" | "mem" => Some(StorageBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: Option<String>,
    pub test_url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub backend: StorageBackend,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub secret_key: String,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

const DEFAULT_TEST_URL: &str = "postgres://postgres@localhost/passfoo";
const DEFAULT_SESSION_TABLE: &str = "session_store";

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

    /// Fully in-process configuration: memory storage, memory sessions.
    pub fn in_memory() -> Self {
        let mut config = Self::development();
        config.database.backend = StorageBackend::Memory;
        config.session.backend = StorageBackend::Memory;
        config
    }

    /// Connection string for the selected target (`--test` picks `DB_TEST`).
    pub fn database_url(&self, test: bool) -> Option<&str> {
        if test {
            Some(self.database.test_url.as_str())
        } else {
            self.database.url.as_deref()
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("DAEMON_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("DAEMON_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Ok(v) = env::var("STORAGE_BACKEND") {
            self.database.backend = StorageBackend::parse(&v).unwrap_or(self.database.backend);
        }
        if let Ok(v) = env::var("DB_DEFAULT").or_else(|_| env::var("DATABASE_URL")) {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DB_TEST") {
            self.database.test_url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // Session overrides
        if let Ok(v) = env::var("SESSION_BACKEND") {
            self.session.backend = StorageBackend::parse(&v).unwrap_or(self.session.backend);
        }
        if let Ok(v) = env::var("SESSION_TABLE") {
            self.session.table = v;
        }

        // Security overrides
        if let Ok(v) = env::var("SECRET_KEY") {
            self.security.secret_key = v;
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
            },
            database: DatabaseConfig {
                backend: StorageBackend::Postgres,
                url: None,
                test_url: DEFAULT_TEST_URL.to_string(),
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
            },
            session: SessionConfig {
                backend: StorageBackend::Memory,
                table: DEFAULT_SESSION_TABLE.to_string(),
            },
            security: SecurityConfig {
                secret_key: "development-secret-key".to_string(),
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 4000,
            },
            database: DatabaseConfig {
                backend: StorageBackend::Postgres,
                url: None,
                test_url: DEFAULT_TEST_URL.to_string(),
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: true,
            },
            session: SessionConfig {
                backend: StorageBackend::Postgres,
                table: DEFAULT_SESSION_TABLE.to_string(),
            },
            security: SecurityConfig {
                secret_key: String::new(),
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 4000,
            },
            database: DatabaseConfig {
                backend: StorageBackend::Postgres,
                url: None,
                test_url: DEFAULT_TEST_URL.to_string(),
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
            },
            session: SessionConfig {
                backend: StorageBackend::Postgres,
                table: DEFAULT_SESSION_TABLE.to_string(),
            },
            security: SecurityConfig {
                secret_key: String::new(),
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}
