/// Content type recorded when the client does not send one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Display name recorded when the multipart part carries no filename
pub const UNNAMED_FILE: &str = "unnamed";
