/// Application name
pub const APP_NAME: &str = "Haven";

/// Identity used when a caller presents neither a valid token nor a legacy header
pub const ANONYMOUS_USER_ID: &str = "default-user";

/// Legacy caller-identity header accepted from un-migrated clients
pub const LEGACY_USER_HEADER: &str = "x-user-id";

/// Default bearer token lifetime (7 days)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Minimum accepted password length at sign-up
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum chat topic key length in characters
pub const MAX_TOPIC_KEY_LEN: usize = 128;

/// Maximum chat message text length in bytes (32 KiB)
pub const MAX_CHAT_TEXT_LEN: usize = 32 * 1024;

/// Maximum transcription upload size in bytes (25 MiB)
pub const MAX_AUDIO_SIZE: usize = 25 * 1024 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8787;

/// Reply used when the completion service answers in a shape we don't recognise
pub const ASSISTANT_FALLBACK_TEXT: &str = "Sorry — I couldn't generate a response.";

/// Payload keys owned by the server; stripped from inbound payloads
pub const RESERVED_RECORD_KEYS: [&str; 4] = ["id", "userId", "createdAt", "updatedAt"];
