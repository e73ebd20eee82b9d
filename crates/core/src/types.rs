/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier tying one execution's output buffer to its persisted record.
pub type CorrelationId = uuid::Uuid;
