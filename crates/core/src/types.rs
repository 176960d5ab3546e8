/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Workers pick their own identity; it is a UUID carried in the admission
/// key and the registration payload.
pub type WorkerId = uuid::Uuid;
