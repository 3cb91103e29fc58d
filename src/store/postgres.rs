use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Account, IdentityStore, RefreshTokenRecord, Role};
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::validators::normalize;

const ACCOUNT_COLUMNS: &str = r#"
    id, email, normalized_email, user_name, normalized_user_name, first_name, last_name,
    phone_number, password_hash, security_version, concurrency_stamp, date_created, date_updated
"#;

pub struct PostgresIdentityStore {
    pool: PgPool,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguishes "gone" from "changed underneath us" after a guarded write matched no row
    async fn stale_or_missing(&self, table: &str, id: Uuid) -> AppError {
        let exists = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
            table
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await;

        match exists {
            Ok(true) => DatabaseError::ConcurrencyConflict(table.trim_end_matches('s').to_string()).into(),
            Ok(false) => DatabaseError::NotFound(table.trim_end_matches('s').to_string()).into(),
            Err(e) => e.into(),
        }
    }

    async fn role_ids(&self, role_names: &[String]) -> Result<Vec<Uuid>, AppError> {
        let mut ids = Vec::with_capacity(role_names.len());
        for name in role_names {
            let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE normalized_name = $1")
                .bind(normalize(name))
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ValidationError::UnknownRole(name.clone()))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[tracing::instrument(name = "Fetch account by id", skip(self))]
    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    #[tracing::instrument(name = "Fetch account by user name", skip_all)]
    async fn find_account_by_user_name(
        &self,
        normalized_user_name: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE normalized_user_name = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(normalized_user_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn email_in_use(
        &self,
        normalized_email: &str,
        except: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let in_use = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM accounts
                WHERE normalized_email = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(normalized_email)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(in_use)
    }

    async fn count_accounts(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_accounts(
        &self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Account>, AppError> {
        // LIMIT NULL means no limit
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts ORDER BY date_created DESC, id LIMIT $1 OFFSET $2",
            ACCOUNT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    #[tracing::instrument(name = "Insert account", skip_all, fields(account_id = %account.id))]
    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, email, normalized_email, user_name, normalized_user_name, first_name,
                last_name, phone_number, password_hash, security_version, concurrency_stamp,
                date_created, date_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.normalized_email)
        .bind(&account.user_name)
        .bind(&account.normalized_user_name)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.phone_number)
        .bind(&account.password_hash)
        .bind(account.security_version)
        .bind(account.concurrency_stamp)
        .bind(account.date_created)
        .bind(account.date_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Update account", skip_all, fields(account_id = %account.id))]
    async fn update_account(&self, account: &Account) -> Result<Account, AppError> {
        let updated = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE accounts
            SET email = $3, normalized_email = $4, user_name = $5, normalized_user_name = $6,
                first_name = $7, last_name = $8, phone_number = $9, password_hash = $10,
                security_version = $11, concurrency_stamp = $12, date_updated = $13
            WHERE id = $1 AND concurrency_stamp = $2
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id)
        .bind(account.concurrency_stamp)
        .bind(&account.email)
        .bind(&account.normalized_email)
        .bind(&account.user_name)
        .bind(&account.normalized_user_name)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.phone_number)
        .bind(&account.password_hash)
        .bind(account.security_version)
        .bind(Uuid::new_v4())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(account) => Ok(account),
            None => Err(self.stale_or_missing("accounts", account.id).await),
        }
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(name = "Rotate security version", skip(self))]
    async fn rotate_security_version(&self, id: Uuid) -> Result<i32, AppError> {
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE accounts
            SET security_version = security_version + 1, concurrency_stamp = $2
            WHERE id = $1
            RETURNING security_version
            "#,
        )
        .bind(id)
        .bind(Uuid::new_v4())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("account".to_string()))?;
        Ok(version)
    }

    async fn roles_for_account(&self, account_id: Uuid) -> Result<Vec<String>, AppError> {
        let roles = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name FROM roles r
            JOIN account_roles ar ON ar.role_id = r.id
            WHERE ar.account_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn roles_for_accounts(
        &self,
        account_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<String>>, AppError> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT ar.account_id, r.name FROM account_roles ar
            JOIN roles r ON r.id = ar.role_id
            WHERE ar.account_id = ANY($1)
            ORDER BY r.name
            "#,
        )
        .bind(account_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut lookup: HashMap<Uuid, Vec<String>> =
            account_ids.iter().map(|id| (*id, Vec::new())).collect();
        for (account_id, role) in rows {
            lookup.entry(account_id).or_default().push(role);
        }
        Ok(lookup)
    }

    #[tracing::instrument(name = "Add account to roles", skip(self))]
    async fn add_to_roles(&self, account_id: Uuid, role_names: &[String]) -> Result<(), AppError> {
        let role_ids = self.role_ids(role_names).await?;
        let mut tx = self.pool.begin().await?;
        for role_id in role_ids {
            sqlx::query(
                r#"
                INSERT INTO account_roles (account_id, role_id) VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(account_id)
            .bind(role_id)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(name = "Remove account from roles", skip(self))]
    async fn remove_from_roles(
        &self,
        account_id: Uuid,
        role_names: &[String],
    ) -> Result<(), AppError> {
        let role_ids = self.role_ids(role_names).await?;
        sqlx::query("DELETE FROM account_roles WHERE account_id = $1 AND role_id = ANY($2)")
            .bind(account_id)
            .bind(role_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_roles(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_roles(&self, offset: i64, limit: Option<i64>) -> Result<Vec<Role>, AppError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, normalized_name, concurrency_stamp FROM roles
            ORDER BY name LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, normalized_name, concurrency_stamp FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn find_role_by_name(&self, normalized_name: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, normalized_name, concurrency_stamp FROM roles WHERE normalized_name = $1",
        )
        .bind(normalized_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn insert_role(&self, role: &Role) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO roles (id, name, normalized_name, concurrency_stamp) VALUES ($1, $2, $3, $4)",
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.normalized_name)
        .bind(role.concurrency_stamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> Result<Role, AppError> {
        let updated = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles SET name = $3, normalized_name = $4, concurrency_stamp = $5
            WHERE id = $1 AND concurrency_stamp = $2
            RETURNING id, name, normalized_name, concurrency_stamp
            "#,
        )
        .bind(role.id)
        .bind(role.concurrency_stamp)
        .bind(&role.name)
        .bind(&role.normalized_name)
        .bind(Uuid::new_v4())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(role) => Ok(role),
            None => Err(self.stale_or_missing("roles", role.id).await),
        }
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(name = "Save refresh token", skip_all, fields(account_id = %record.account_id))]
    async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (account_id, token_hash, security_version, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                security_version = EXCLUDED.security_version,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(record.account_id)
        .bind(&record.token_hash)
        .bind(record.security_version)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        account_id: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT account_id, token_hash, security_version, expires_at, created_at
            FROM refresh_tokens
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn remove_refresh_token(&self, account_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
