//! Invitation and magic-link lifecycle.
//!
//! Invitation status moves `pending -> sent -> used`, or to `revoked` from any
//! live state. `used` and `revoked` are terminal. Every transition goes through
//! a conditional update in the store so concurrent callers cannot both win.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;

use crate::config::AuthSettings;
use crate::models::invitation::{Invitation, InvitationStatus, InvitationView, NewInvitation};
use crate::models::user::{normalize_email, Identity, Role, User};
use crate::repositories::{InvitationRepository, RepositoryError, UserRepository};
use crate::services::email_service::{EmailError, Mailer};
use crate::services::token::{generate_token, TokenError, MAGIC_TOKEN_BYTES};

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Email not invited")]
    NotInvited,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired or used")]
    ExpiredOrUsed,
    #[error("User is disabled")]
    UserDisabled,
    #[error("User already revoked")]
    AlreadyRevoked,
    #[error("Invitation not found")]
    InvitationNotFound,
    #[error("Cannot send this invite")]
    CannotSend,
    #[error("Cannot revoke this invite")]
    CannotRevoke,
    #[error("Token generation failed: {0}")]
    Token(#[from] TokenError),
    #[error("Email error: {0}")]
    Email(#[from] EmailError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl AuthServiceError {
    /// Token rejections the caller should report uniformly.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            AuthServiceError::InvalidToken
                | AuthServiceError::ExpiredOrUsed
                | AuthServiceError::UserDisabled
        )
    }
}

/// Redemption URL for a token.
pub fn build_magic_link(base_url: &str, token: &str) -> String {
    format!("{}/magic?token={}", base_url.trim().trim_end_matches('/'), token)
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    invites: Arc<dyn InvitationRepository>,
    mailer: Arc<dyn Mailer>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        invites: Arc<dyn InvitationRepository>,
        mailer: Arc<dyn Mailer>,
        settings: &AuthSettings,
    ) -> Self {
        Self {
            users,
            invites,
            mailer,
            settings: settings.clone(),
        }
    }

    /// Upsert the bootstrap administrator and stamp a login.
    pub async fn ensure_admin(&self, email: &str) -> Result<User, AuthServiceError> {
        let email = validated_email(email)?;

        let mut user = self
            .users
            .find_by_email(&email)
            .await?
            .unwrap_or_else(|| User::new(&email, Role::Admin));
        user.role = Role::Admin;
        user.last_login = Some(Utc::now());

        let user = self.users.save(&user).await?;
        tracing::info!(email = %user.email, "Ensured admin user");
        Ok(user)
    }

    /// Revoke the email's live invitations, issue a fresh one and mail it.
    ///
    /// The invitation is persisted as `pending` first and only flipped to
    /// `sent` once the mailer confirms delivery. If sending fails or times
    /// out, it stays `pending` and the error is returned.
    pub async fn create_magic_link_invite(
        &self,
        email: &str,
        base_url: &str,
    ) -> Result<String, AuthServiceError> {
        let invitation = self.stage_invitation(email).await?;
        let token = invitation.token.clone();
        self.dispatch(&invitation, base_url).await?;
        Ok(token)
    }

    /// Send a new magic link to an address that has been invited before.
    pub async fn require_and_send_magic_link(
        &self,
        email: &str,
        base_url: &str,
    ) -> Result<(), AuthServiceError> {
        let email = validated_email(email)?;

        if self
            .invites
            .find_latest_active_by_email(&email)
            .await?
            .is_none()
        {
            tracing::info!(email = %email, "Magic link requested for an address that was never invited");
            return Err(AuthServiceError::NotInvited);
        }

        if self.is_user_disabled(&email).await? {
            tracing::warn!(email = %email, "Magic link requested for a disabled user");
            return Err(AuthServiceError::UserDisabled);
        }

        self.create_magic_link_invite(&email, base_url).await?;
        Ok(())
    }

    /// Exchange a magic-link token for an identity.
    ///
    /// The token is claimed with a conditional update before the user is
    /// touched, so at most one redemption per token succeeds.
    pub async fn redeem_magic_token<F>(
        &self,
        token: &str,
        is_admin_email: F,
    ) -> Result<Identity, AuthServiceError>
    where
        F: Fn(&str) -> bool + Send + Sync,
    {
        let invitation = self
            .invites
            .find_by_token(token)
            .await?
            .ok_or(AuthServiceError::InvalidToken)?;

        let now = Utc::now();
        if !invitation.is_redeemable_at(now) {
            tracing::warn!(
                invitation_id = invitation.id,
                status = %invitation.status,
                "Rejected redemption of expired or used token"
            );
            return Err(AuthServiceError::ExpiredOrUsed);
        }

        let existing = self.users.find_by_email(&invitation.email).await?;
        if existing.as_ref().is_some_and(|u| u.disabled) {
            tracing::warn!(email = %invitation.email, "Rejected redemption for disabled user");
            return Err(AuthServiceError::UserDisabled);
        }

        if !self.invites.mark_used(invitation.id, now).await? {
            tracing::warn!(invitation_id = invitation.id, "Token was redeemed concurrently");
            return Err(AuthServiceError::ExpiredOrUsed);
        }

        let mut user = existing.unwrap_or_else(|| User::new(&invitation.email, Role::User));
        if is_admin_email(&user.email) {
            user.role = Role::Admin;
        }
        user.last_login = Some(now);
        let user = self.users.save(&user).await?;

        tracing::info!(
            invitation_id = invitation.id,
            email = %user.email,
            role = %user.role,
            "Magic link redeemed"
        );
        Ok(user.identity())
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<User>, AuthServiceError> {
        Ok(self.users.find_by_email(&normalize_email(email)).await?)
    }

    /// Unknown users are not disabled.
    pub async fn is_user_disabled(&self, email: &str) -> Result<bool, AuthServiceError> {
        Ok(self
            .find_user(email)
            .await?
            .map(|user| user.disabled)
            .unwrap_or(false))
    }

    /// Lock a user out. Unknown emails get a pre-disabled record so they can
    /// never sign in later.
    pub async fn disable_user(&self, email: &str) -> Result<User, AuthServiceError> {
        let email = validated_email(email)?;

        let user = match self.users.find_by_email(&email).await? {
            None => {
                let mut user = User::new(&email, Role::User);
                user.disabled = true;
                match self.users.create(&user).await {
                    Ok(user) => user,
                    // Lost a race with a concurrent creation; disable that record instead
                    Err(RepositoryError::AlreadyExists) => self.users.save(&user).await?,
                    Err(e) => return Err(e.into()),
                }
            }
            Some(user) if user.disabled => return Err(AuthServiceError::AlreadyRevoked),
            Some(mut user) => {
                user.disabled = true;
                self.users.save(&user).await?
            }
        };

        tracing::info!(email = %user.email, "User disabled");
        Ok(user)
    }

    /// Revoke every invitation for the email that isn't already revoked.
    pub async fn revoke_all_for_email(&self, email: &str) -> Result<u64, AuthServiceError> {
        let email = validated_email(email)?;
        let revoked = self.invites.revoke_all_by_email(&email).await?;
        tracing::info!(email = %email, revoked, "Revoked all invitations for email");
        Ok(revoked)
    }

    /// Admin creation of an invitation without sending it.
    pub async fn create_invitation(&self, email: &str) -> Result<Invitation, AuthServiceError> {
        self.stage_invitation(email).await
    }

    /// Mail a live invitation by id. The token is regenerated on every send.
    pub async fn send_invitation_by_id(
        &self,
        id: i64,
        base_url: &str,
    ) -> Result<Invitation, AuthServiceError> {
        let mut invitation = self
            .invites
            .find_by_id(id)
            .await?
            .ok_or(AuthServiceError::InvitationNotFound)?;

        if invitation.status.is_terminal() {
            return Err(AuthServiceError::CannotSend);
        }

        let token = generate_token(MAGIC_TOKEN_BYTES)?;
        let expires_at = Utc::now() + self.settings.invite_ttl;
        if !self.invites.rotate_token(id, &token, expires_at).await? {
            return Err(AuthServiceError::CannotSend);
        }
        invitation.token = token;
        invitation.expires_at = expires_at;
        invitation.status = InvitationStatus::Pending;

        self.dispatch(&invitation, base_url).await?;

        self.invites
            .find_by_id(id)
            .await?
            .ok_or(AuthServiceError::InvitationNotFound)
    }

    pub async fn revoke_invitation_by_id(&self, id: i64) -> Result<Invitation, AuthServiceError> {
        let invitation = self
            .invites
            .find_by_id(id)
            .await?
            .ok_or(AuthServiceError::InvitationNotFound)?;

        if invitation.status.is_terminal() || !self.invites.revoke_by_id(id).await? {
            return Err(AuthServiceError::CannotRevoke);
        }

        tracing::info!(invitation_id = id, email = %invitation.email, "Invitation revoked");
        self.invites
            .find_by_id(id)
            .await?
            .ok_or(AuthServiceError::InvitationNotFound)
    }

    pub async fn list_invitations(&self, limit: i64) -> Result<Vec<Invitation>, AuthServiceError> {
        Ok(self.invites.list(limit).await?)
    }

    /// Join invitations with the disabled flag of their user.
    pub async fn annotate_invites_with_user_disabled(
        &self,
        invitations: Vec<Invitation>,
    ) -> Result<Vec<InvitationView>, AuthServiceError> {
        let emails: Vec<String> = invitations
            .iter()
            .map(|inv| inv.email.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let disabled: HashMap<String, bool> = self
            .users
            .list_by_emails(&emails)
            .await?
            .into_iter()
            .map(|user| (user.email, user.disabled))
            .collect();

        Ok(invitations
            .into_iter()
            .map(|invitation| {
                let user_disabled = disabled.get(&invitation.email).copied().unwrap_or(false);
                InvitationView {
                    invitation,
                    user_disabled,
                }
            })
            .collect())
    }

    /// First half of the invite protocol: revoke whatever is live for the
    /// email and persist a new `pending` invitation.
    async fn stage_invitation(&self, email: &str) -> Result<Invitation, AuthServiceError> {
        let email = validated_email(email)?;

        let token = generate_token(MAGIC_TOKEN_BYTES)?;
        let (revoked, invitation) = self
            .invites
            .replace_live(&NewInvitation {
                email,
                token,
                expires_at: Utc::now() + self.settings.invite_ttl,
            })
            .await?;
        if revoked > 0 {
            tracing::debug!(email = %invitation.email, revoked, "Revoked superseded invitations");
        }

        tracing::info!(invitation_id = invitation.id, email = %invitation.email, "Invitation created");
        Ok(invitation)
    }

    /// Second half: deliver the link, then promote to `sent`. A failed or timed
    /// out delivery leaves the status untouched.
    async fn dispatch(&self, invitation: &Invitation, base_url: &str) -> Result<(), AuthServiceError> {
        let link = build_magic_link(base_url, &invitation.token);

        let sent = tokio::time::timeout(
            self.settings.mail_timeout,
            self.mailer.send_magic_link(&invitation.email, &link),
        )
        .await
        .unwrap_or(Err(EmailError::Timeout(self.settings.mail_timeout)));

        if let Err(e) = sent {
            tracing::warn!(
                invitation_id = invitation.id,
                email = %invitation.email,
                error = %e,
                "Magic link delivery failed; invitation left pending"
            );
            return Err(e.into());
        }

        if !self.invites.mark_sent(invitation.id).await? {
            // Revoked or redeemed while the mail was in flight
            tracing::warn!(invitation_id = invitation.id, "Invitation changed state during delivery");
        } else {
            tracing::info!(invitation_id = invitation.id, email = %invitation.email, "Invitation sent");
        }

        Ok(())
    }
}

fn validated_email(email: &str) -> Result<String, AuthServiceError> {
    let email = normalize_email(email);
    if email.is_empty() || email.len() > 255 || !email.contains('@') {
        return Err(AuthServiceError::InvalidEmail);
    }
    Ok(email)
}
