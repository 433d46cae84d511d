use super::{Database, UserRow};
use crate::dto::UserInput;
use anyhow::Result;

impl Database {
    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, birthname, username, email, createdat FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, birthname, username, email, createdat FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_user(&self, input: &UserInput) -> Result<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (birthname, username, email)
             VALUES ($1, $2, $3)
             RETURNING id, birthname, username, email, createdat",
        )
        .bind(&input.birthname)
        .bind(&input.username)
        .bind(&input.email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_user(&self, id: i64, input: &UserInput) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET birthname = $2, username = $3, email = $4
             WHERE id = $1
             RETURNING id, birthname, username, email, createdat",
        )
        .bind(id)
        .bind(&input.birthname)
        .bind(&input.username)
        .bind(&input.email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
