use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub swagger: SwaggerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_size: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

/// MinIO/S3 storage configuration for file payloads
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// MinIO/S3 endpoint URL
    pub endpoint: String,
    /// Access key for authentication
    pub access_key: String,
    /// Secret key for authentication
    pub secret_key: String,
    /// Bucket name for storing files
    pub bucket: String,
    /// AWS region (for S3 compatibility)
    pub region: String,
    /// Lifetime of download links in seconds
    pub presigned_url_expiry_secs: u32,
}

/// Which implementation backs a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Durable external service (Postgres for metadata, MinIO for blobs)
    External,
    /// Process-local maps, for local development
    Memory,
}

/// Metadata store tuning: batch sizes, list limits and per-call timeouts
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub metadata_backend: Backend,
    pub blob_backend: Backend,
    /// Maximum ids per batch-read round
    pub batch_get_limit: usize,
    /// Maximum ids per batch-write round
    pub batch_write_limit: usize,
    pub default_list_limit: i64,
    pub max_list_limit: i64,
    pub metadata_timeout: Duration,
    pub blob_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let metadata = MetadataConfig::from_env()?;
        let database = DatabaseConfig::from_env(metadata.metadata_backend)?;

        Ok(Config {
            app: AppConfig::from_env()?,
            database,
            swagger: SwaggerConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            metadata,
        })
    }
}

impl AppConfig {
    const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 100 * 1024 * 1024; // 100MB

    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "5001".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_request_body_size = env::var("MAX_REQUEST_BODY_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_REQUEST_BODY_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| "MAX_REQUEST_BODY_SIZE must be a valid number".to_string())?;

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            max_request_body_size,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    /// DATABASE_URL is only mandatory when metadata lives in Postgres
    pub fn from_env(backend: Backend) -> Result<Self, String> {
        let url = match (env::var("DATABASE_URL"), backend) {
            (Ok(url), _) => url,
            (Err(_), Backend::Memory) => String::new(),
            (Err(_), Backend::External) => return Err("DATABASE_URL must be set".to_string()),
        };

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title = env::var("SWAGGER_TITLE").unwrap_or_else(|_| "File Management API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Upload, list, update and delete files".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

impl StorageConfig {
    const DEFAULT_PRESIGNED_URL_EXPIRY_SECS: u32 = 3600; // 1 hour

    pub fn from_env() -> Result<Self, String> {
        let endpoint =
            env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".to_string());

        let access_key = env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());

        let secret_key = env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());

        let bucket = env::var("MINIO_BUCKET")
            .or_else(|_| env::var("S3_BUCKET_NAME"))
            .unwrap_or_else(|_| "file-vault".to_string());

        let region = env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string());

        let presigned_url_expiry_secs = env::var("MINIO_PRESIGNED_URL_EXPIRY_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_PRESIGNED_URL_EXPIRY_SECS.to_string())
            .parse::<u32>()
            .map_err(|_| "MINIO_PRESIGNED_URL_EXPIRY_SECS must be a valid number".to_string())?;

        Ok(Self {
            endpoint,
            access_key,
            secret_key,
            bucket,
            region,
            presigned_url_expiry_secs,
        })
    }
}

impl MetadataConfig {
    // Storage technology limits: 100 keys per batch read, 25 per batch write
    pub const DEFAULT_BATCH_GET_LIMIT: usize = 100;
    pub const DEFAULT_BATCH_WRITE_LIMIT: usize = 25;
    pub const DEFAULT_LIST_LIMIT: i64 = 100;
    pub const MAX_LIST_LIMIT: i64 = 1000;
    const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_BLOB_TIMEOUT_SECS: u64 = 30;

    pub fn from_env() -> Result<Self, String> {
        let metadata_backend = parse_backend("METADATA_BACKEND", "postgres")?;
        let blob_backend = parse_backend("BLOB_BACKEND", "minio")?;

        let batch_get_limit = env::var("BATCH_GET_LIMIT")
            .unwrap_or_else(|_| Self::DEFAULT_BATCH_GET_LIMIT.to_string())
            .parse::<usize>()
            .map_err(|_| "BATCH_GET_LIMIT must be a valid number".to_string())?;

        let batch_write_limit = env::var("BATCH_WRITE_LIMIT")
            .unwrap_or_else(|_| Self::DEFAULT_BATCH_WRITE_LIMIT.to_string())
            .parse::<usize>()
            .map_err(|_| "BATCH_WRITE_LIMIT must be a valid number".to_string())?;

        if batch_get_limit == 0 || batch_write_limit == 0 {
            return Err("Batch limits must be greater than zero".to_string());
        }

        let metadata_timeout_secs = env::var("METADATA_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_METADATA_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "METADATA_TIMEOUT_SECS must be a valid number".to_string())?;

        let blob_timeout_secs = env::var("BLOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_BLOB_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "BLOB_TIMEOUT_SECS must be a valid number".to_string())?;

        Ok(Self {
            metadata_backend,
            blob_backend,
            batch_get_limit,
            batch_write_limit,
            default_list_limit: Self::DEFAULT_LIST_LIMIT,
            max_list_limit: Self::MAX_LIST_LIMIT,
            metadata_timeout: Duration::from_secs(metadata_timeout_secs),
            blob_timeout: Duration::from_secs(blob_timeout_secs),
        })
    }

    /// Clamp a client supplied page size into `1..=max_list_limit`
    pub fn clamp_list_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_list_limit)
            .clamp(1, self.max_list_limit)
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            metadata_backend: Backend::Memory,
            blob_backend: Backend::Memory,
            batch_get_limit: Self::DEFAULT_BATCH_GET_LIMIT,
            batch_write_limit: Self::DEFAULT_BATCH_WRITE_LIMIT,
            default_list_limit: Self::DEFAULT_LIST_LIMIT,
            max_list_limit: Self::MAX_LIST_LIMIT,
            metadata_timeout: Duration::from_secs(Self::DEFAULT_METADATA_TIMEOUT_SECS),
            blob_timeout: Duration::from_secs(Self::DEFAULT_BLOB_TIMEOUT_SECS),
        }
    }
}

fn parse_backend(var: &str, external_name: &str) -> Result<Backend, String> {
    let value = env::var(var).unwrap_or_else(|_| external_name.to_string());
    match value.to_lowercase().as_str() {
        "memory" => Ok(Backend::Memory),
        v if v == external_name => Ok(Backend::External),
        other => Err(format!(
            "{} must be '{}' or 'memory', got '{}'",
            var, external_name, other
        )),
    }
}
