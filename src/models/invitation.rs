use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of an invitation.
///
/// `Pending` and `Sent` are the live states; `Used` and `Revoked` are terminal.
/// Expiry is not a status: a live invitation past `expires_at` is simply
/// rejected when someone tries to redeem it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Sent,
    Used,
    Revoked,
}

impl InvitationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, InvitationStatus::Pending | InvitationStatus::Sent)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Sent => "sent",
            InvitationStatus::Used => "used",
            InvitationStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Invitation {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Whether the token can still be exchanged for a session.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && !self.is_expired_at(now)
    }
}

/// Fields needed to insert a new invitation.
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// An invitation joined with the disabled flag of the matching user, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationView {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub user_disabled: bool,
}
