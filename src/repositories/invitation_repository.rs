use super::{map_unique_violation, RepositoryResult};
use crate::models::invitation::{Invitation, InvitationStatus, NewInvitation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// Persistence for invitations.
///
/// Status transitions that matter for security (`mark_used`, `mark_sent`,
/// `rotate_token`, `revoke_by_id`, `save`) are conditional updates: they only touch a
/// row whose status is still live and report whether a row changed. Callers
/// must treat `false` as "someone else got there first".
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait InvitationRepository: Send + Sync {
    /// Newest invitation for the email that is not revoked (used and expired ones count).
    async fn find_latest_active_by_email(&self, email: &str)
        -> RepositoryResult<Option<Invitation>>;
    /// Revoke every pending or sent invitation for the email.
    async fn revoke_pending_and_sent(&self, email: &str) -> RepositoryResult<u64>;
    async fn create(&self, invitation: &NewInvitation) -> RepositoryResult<Invitation>;
    /// Revoke whatever is live for the email and insert the new invitation as
    /// one write transaction. Returns the number revoked and the new row.
    async fn replace_live(&self, invitation: &NewInvitation)
        -> RepositoryResult<(u64, Invitation)>;
    /// Overwrite token, expiry and status of a pending or sent invitation.
    /// Used and revoked rows are left alone and report `false`.
    async fn save(&self, invitation: &Invitation) -> RepositoryResult<bool>;
    async fn find_by_token(&self, token: &str) -> RepositoryResult<Option<Invitation>>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Invitation>>;
    /// Newest first. A limit of zero or less returns everything.
    async fn list(&self, limit: i64) -> RepositoryResult<Vec<Invitation>>;
    async fn revoke_by_id(&self, id: i64) -> RepositoryResult<bool>;
    /// Revoke every non-revoked invitation for the email, used ones included.
    async fn revoke_all_by_email(&self, email: &str) -> RepositoryResult<u64>;
    /// pending|sent -> used
    async fn mark_used(&self, id: i64, used_at: DateTime<Utc>) -> RepositoryResult<bool>;
    /// pending|sent -> sent
    async fn mark_sent(&self, id: i64) -> RepositoryResult<bool>;
    /// Replace token and expiry of a live invitation and reset it to `pending`.
    async fn rotate_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<bool>;
}

pub struct SqliteInvitationRepository {
    pool: SqlitePool,
}

impl SqliteInvitationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const INVITATION_COLUMNS: &str = "id, email, token, status, created_at, expires_at, used_at";

async fn revoke_live_on(conn: &mut SqliteConnection, email: &str) -> RepositoryResult<u64> {
    let result = sqlx::query(
        "UPDATE invitations SET status = ? WHERE email = ? AND status IN (?, ?)",
    )
    .bind(InvitationStatus::Revoked)
    .bind(email)
    .bind(InvitationStatus::Pending)
    .bind(InvitationStatus::Sent)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_on(
    conn: &mut SqliteConnection,
    invitation: &NewInvitation,
) -> RepositoryResult<Invitation> {
    sqlx::query_as::<_, Invitation>(&format!(
        r#"
        INSERT INTO invitations (email, token, status, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING {INVITATION_COLUMNS}
        "#
    ))
    .bind(&invitation.email)
    .bind(&invitation.token)
    .bind(InvitationStatus::Pending)
    .bind(Utc::now())
    .bind(invitation.expires_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_unique_violation)
}

#[async_trait]
impl InvitationRepository for SqliteInvitationRepository {
    async fn find_latest_active_by_email(
        &self,
        email: &str,
    ) -> RepositoryResult<Option<Invitation>> {
        let invitation = sqlx::query_as::<_, Invitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS}
            FROM invitations
            WHERE email = ? AND status <> ?
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(email)
        .bind(InvitationStatus::Revoked)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invitation)
    }

    async fn revoke_pending_and_sent(&self, email: &str) -> RepositoryResult<u64> {
        let mut conn = self.pool.acquire().await?;
        revoke_live_on(&mut conn, email).await
    }

    async fn create(&self, invitation: &NewInvitation) -> RepositoryResult<Invitation> {
        let mut conn = self.pool.acquire().await?;
        insert_on(&mut conn, invitation).await
    }

    async fn replace_live(
        &self,
        invitation: &NewInvitation,
    ) -> RepositoryResult<(u64, Invitation)> {
        let mut conn = self.pool.acquire().await?;

        // IMMEDIATE takes the write lock up front, so overlapping callers for
        // the same email wait on the busy timeout instead of interleaving.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome = match revoke_live_on(&mut conn, &invitation.email).await {
            Ok(revoked) => insert_on(&mut conn, invitation)
                .await
                .map(|created| (revoked, created)),
            Err(e) => Err(e),
        };

        let finish = if outcome.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = sqlx::query(finish).execute(&mut *conn).await {
            // Never hand a connection with an open transaction back to the pool
            drop(conn.detach());
            return Err(e.into());
        }

        outcome
    }

    async fn save(&self, invitation: &Invitation) -> RepositoryResult<bool> {
        if invitation.status.is_terminal() {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET token = ?, status = ?, expires_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(&invitation.token)
        .bind(invitation.status)
        .bind(invitation.expires_at)
        .bind(invitation.id)
        .bind(InvitationStatus::Pending)
        .bind(InvitationStatus::Sent)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_token(&self, token: &str) -> RepositoryResult<Option<Invitation>> {
        let invitation = sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invitation)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Invitation>> {
        let invitation = sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invitation)
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<Invitation>> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = if limit > 0 { limit } else { -1 };

        let invitations = sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations ORDER BY id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(invitations)
    }

    async fn revoke_by_id(&self, id: i64) -> RepositoryResult<bool> {
        let result = sqlx::query("UPDATE invitations SET status = ? WHERE id = ? AND status IN (?, ?)")
            .bind(InvitationStatus::Revoked)
            .bind(id)
            .bind(InvitationStatus::Pending)
            .bind(InvitationStatus::Sent)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_by_email(&self, email: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("UPDATE invitations SET status = ? WHERE email = ? AND status <> ?")
            .bind(InvitationStatus::Revoked)
            .bind(email)
            .bind(InvitationStatus::Revoked)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn mark_used(&self, id: i64, used_at: DateTime<Utc>) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET status = ?, used_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(InvitationStatus::Used)
        .bind(used_at)
        .bind(id)
        .bind(InvitationStatus::Pending)
        .bind(InvitationStatus::Sent)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_sent(&self, id: i64) -> RepositoryResult<bool> {
        let result = sqlx::query("UPDATE invitations SET status = ? WHERE id = ? AND status IN (?, ?)")
            .bind(InvitationStatus::Sent)
            .bind(id)
            .bind(InvitationStatus::Pending)
            .bind(InvitationStatus::Sent)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn rotate_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET token = ?, expires_at = ?, status = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(InvitationStatus::Pending)
        .bind(id)
        .bind(InvitationStatus::Pending)
        .bind(InvitationStatus::Sent)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(result.rows_affected() == 1)
    }
}
