use super::{ActiveUserRow, Database};
use anyhow::Result;
use chrono::NaiveDate;

impl Database {
    pub async fn list_active_users(&self, date: Option<NaiveDate>) -> Result<Vec<ActiveUserRow>> {
        let rows = sqlx::query_as::<_, ActiveUserRow>(
            "SELECT id, uid, date, last_active_time, session_count
             FROM active_users
             WHERE ($1::DATE IS NULL OR date = $1)
             ORDER BY date DESC, last_active_time DESC",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Record activity for `uid` on `date`. The first call of the day creates
    /// the row; later calls bump `session_count`.
    pub async fn record_activity(&self, uid: &str, date: NaiveDate) -> Result<ActiveUserRow> {
        let row = sqlx::query_as::<_, ActiveUserRow>(
            "INSERT INTO active_users (uid, date, last_active_time, session_count)
             VALUES ($1, $2, NOW(), 1)
             ON CONFLICT ON CONSTRAINT active_users_uid_date_key DO UPDATE SET
               last_active_time = NOW(),
               session_count = active_users.session_count + 1
             RETURNING id, uid, date, last_active_time, session_count",
        )
        .bind(uid)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_active_users_on(&self, date: NaiveDate) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM active_users WHERE date = $1")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Distinct users and summed sessions with `start <= date <= end`.
    pub async fn activity_totals(&self, start: NaiveDate, end: NaiveDate) -> Result<(i64, i64)> {
        let totals = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(DISTINCT uid), COALESCE(SUM(session_count), 0)::BIGINT
             FROM active_users WHERE date >= $1 AND date <= $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}
