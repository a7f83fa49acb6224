use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub limiter: LimiterConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_request_logging: bool,
    pub enable_cors: bool,
    pub max_request_size_bytes: usize,
    pub search_max_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Verification key ring, "kid:secret" pairs. Multiple entries allow
    /// rotation without downtime: old tokens verify against the old key
    /// until they expire.
    pub jwt_keys: Vec<JwtKey>,
    /// Signing algorithms accepted during verification. Tokens carrying any
    /// other algorithm are rejected before the signature is checked.
    pub jwt_allowed_algs: Vec<String>,
    pub jwt_expiry_hours: u64,
    /// Server-held secret for deriving tenant handles. Never sent anywhere.
    pub tenant_secret: String,
    /// Root key for per-tenant metadata encryption keys, hex-encoded 32 bytes.
    pub codec_root_key: String,
    /// Per-stage timeout applied to store round-trips.
    pub stage_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtKey {
    pub kid: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub window_secs: u64,
    pub free_capacity: u32,
    pub pro_capacity: u32,
    /// When the counter store is unreachable: admit with a logged warning
    /// (true) or deny with 503 (false). One mode for the whole process.
    pub fail_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_SEARCH_MAX_LIMIT") {
            self.api.search_max_limit = v.parse().unwrap_or(self.api.search_max_limit);
        }

        // Security overrides
        if let Ok(v) = env::var("CARREL_JWT_KEYS") {
            let keys = Self::parse_key_ring(&v);
            if !keys.is_empty() {
                self.security.jwt_keys = keys;
            }
        }
        if let Ok(v) = env::var("CARREL_JWT_ALGS") {
            self.security.jwt_allowed_algs = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("CARREL_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("CARREL_TENANT_SECRET") {
            self.security.tenant_secret = v;
        }
        if let Ok(v) = env::var("CARREL_ROOT_KEY") {
            self.security.codec_root_key = v;
        }
        if let Ok(v) = env::var("CARREL_STAGE_TIMEOUT_MS") {
            self.security.stage_timeout_ms = v.parse().unwrap_or(self.security.stage_timeout_ms);
        }

        // Limiter overrides
        if let Ok(v) = env::var("LIMITER_WINDOW_SECS") {
            self.limiter.window_secs = v.parse().unwrap_or(self.limiter.window_secs);
        }
        if let Ok(v) = env::var("LIMITER_FREE_CAPACITY") {
            self.limiter.free_capacity = v.parse().unwrap_or(self.limiter.free_capacity);
        }
        if let Ok(v) = env::var("LIMITER_PRO_CAPACITY") {
            self.limiter.pro_capacity = v.parse().unwrap_or(self.limiter.pro_capacity);
        }
        if let Ok(v) = env::var("LIMITER_FAIL_OPEN") {
            self.limiter.fail_open = v.parse().unwrap_or(self.limiter.fail_open);
        }

        // Store overrides
        if let Ok(v) = env::var("STORE_BACKEND") {
            self.store.backend = match v.to_ascii_lowercase().as_str() {
                "postgres" | "pg" => StoreBackend::Postgres,
                _ => StoreBackend::Memory,
            };
        }
        if let Ok(v) = env::var("STORE_MAX_CONNECTIONS") {
            self.store.max_connections = v.parse().unwrap_or(self.store.max_connections);
        }
        if let Ok(v) = env::var("STORE_CONNECTION_TIMEOUT_SECS") {
            self.store.connection_timeout_secs =
                v.parse().unwrap_or(self.store.connection_timeout_secs);
        }

        self
    }

    /// Parse "kid1:secret1,kid2:secret2". An entry without a colon gets the
    /// kid "default".
    fn parse_key_ring(raw: &str) -> Vec<JwtKey> {
        raw.split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                if entry.is_empty() {
                    return None;
                }
                match entry.split_once(':') {
                    Some((kid, secret)) if !secret.is_empty() => Some(JwtKey {
                        kid: kid.to_string(),
                        secret: secret.to_string(),
                    }),
                    Some(_) => None,
                    None => Some(JwtKey {
                        kid: "default".to_string(),
                        secret: entry.to_string(),
                    }),
                }
            })
            .collect()
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                enable_request_logging: true,
                enable_cors: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                search_max_limit: 100,
            },
            security: SecurityConfig {
                jwt_keys: vec![JwtKey {
                    kid: "dev".to_string(),
                    secret: "carrel-dev-only-verification-secret".to_string(),
                }],
                jwt_allowed_algs: vec!["HS256".to_string()],
                jwt_expiry_hours: 24 * 7,
                tenant_secret: "carrel-dev-only-tenant-secret".to_string(),
                // "dev-only-root-key-32-bytes-long!"
                codec_root_key: "6465762d6f6e6c792d726f6f742d6b65792d33322d62797465732d6c6f6e6721"
                    .to_string(),
                stage_timeout_ms: 5_000,
            },
            limiter: LimiterConfig {
                window_secs: 3600,
                free_capacity: 100,
                pro_capacity: 1000,
                fail_open: false,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                max_connections: 10,
                connection_timeout_secs: 30,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                enable_request_logging: true,
                enable_cors: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                search_max_limit: 50,
            },
            security: SecurityConfig {
                // Real key material comes from the environment; an empty
                // ring fails closed at resolver construction.
                jwt_keys: vec![],
                jwt_allowed_algs: vec!["HS256".to_string()],
                jwt_expiry_hours: 24,
                tenant_secret: String::new(),
                codec_root_key: String::new(),
                stage_timeout_ms: 3_000,
            },
            limiter: LimiterConfig {
                window_secs: 3600,
                free_capacity: 100,
                pro_capacity: 1000,
                fail_open: false,
            },
            store: StoreConfig {
                backend: StoreBackend::Postgres,
                max_connections: 20,
                connection_timeout_secs: 10,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                enable_request_logging: false,
                enable_cors: true,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                search_max_limit: 25,
            },
            security: SecurityConfig {
                jwt_keys: vec![],
                jwt_allowed_algs: vec!["HS256".to_string()],
                jwt_expiry_hours: 4,
                tenant_secret: String::new(),
                codec_root_key: String::new(),
                stage_timeout_ms: 2_000,
            },
            limiter: LimiterConfig {
                window_secs: 3600,
                free_capacity: 100,
                pro_capacity: 1000,
                fail_open: false,
            },
            store: StoreConfig {
                backend: StoreBackend::Postgres,
                max_connections: 50,
                connection_timeout_secs: 5,
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
