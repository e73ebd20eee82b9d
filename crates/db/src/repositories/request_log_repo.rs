//! Repository for the capped `request_logs` table.

use sqlx::types::Json;
use sqlx::PgPool;
use snipgate_core::request_log::NewRequestLog;

use crate::models::request_log::RequestLogRow;

/// Column list for `request_logs` queries.
const COLUMNS: &str = "id, logged_at, method, path, query_params, headers, client_ip, \
                       status_code, response_body, response_time_ms";

pub struct RequestLogRepo;

impl RequestLogRepo {
    pub async fn insert(pool: &PgPool, entry: &NewRequestLog) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO request_logs \
                (logged_at, method, path, query_params, headers, client_ip, \
                 status_code, response_body, response_time_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.timestamp)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(Json(&entry.query_params))
        .bind(Json(&entry.headers))
        .bind(&entry.client_ip)
        .bind(i32::from(entry.status_code))
        .bind(&entry.response_body)
        .bind(entry.response_time_ms)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete everything but the newest `keep` rows.
    pub async fn trim(pool: &PgPool, keep: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM request_logs WHERE id <= ( \
                 SELECT id FROM request_logs ORDER BY id DESC OFFSET $1 LIMIT 1 \
             )",
        )
        .bind(keep)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Newest first.
    pub async fn list(pool: &PgPool, limit: i64) -> Result<Vec<RequestLogRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM request_logs ORDER BY id DESC LIMIT $1");
        sqlx::query_as::<_, RequestLogRow>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn clear(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM request_logs").execute(pool).await?;
        Ok(result.rows_affected())
    }
}
