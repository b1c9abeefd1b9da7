use chrono::{Duration, Utc};
use quickr::{
    models::{invitation::InvitationStatus, user::Role},
    repositories::{
        invitation_repository::SqliteInvitationRepository, InvitationRepository,
    },
    services::{auth_service::AuthServiceError, email_service::EmailError},
    test_utils::test_helpers::{self, FailingMailer, RecordingMailer, SlowMailer},
};
use std::sync::Arc;

const BASE_URL: &str = "https://go.example.com/";

fn never_admin(_: &str) -> bool {
    false
}

async fn statuses_for(pool: &sqlx::SqlitePool, email: &str) -> Vec<InvitationStatus> {
    sqlx::query_scalar::<_, InvitationStatus>(
        "SELECT status FROM invitations WHERE email = ? ORDER BY id",
    )
    .bind(email)
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_invite_sends_link_and_marks_sent() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());
    let service = test_helpers::create_auth_service(&pool, mailer.clone());

    let token = service
        .create_magic_link_invite("  New.User@Example.com ", BASE_URL)
        .await
        .unwrap();

    let mail = mailer.last().unwrap();
    assert_eq!(mail.to, "new.user@example.com");
    assert_eq!(
        mail.link,
        format!("https://go.example.com/magic?token={}", token)
    );
    assert_eq!(token.len(), 43);
    assert_eq!(
        statuses_for(&pool, "new.user@example.com").await,
        vec![InvitationStatus::Sent]
    );
}

#[tokio::test]
async fn test_token_redeems_only_once() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let token = service
        .create_magic_link_invite("once@example.com", BASE_URL)
        .await
        .unwrap();

    let identity = service.redeem_magic_token(&token, never_admin).await.unwrap();
    assert_eq!(identity.email, "once@example.com");
    assert_eq!(identity.role, Role::User);

    let second = service.redeem_magic_token(&token, never_admin).await;
    assert!(matches!(second, Err(AuthServiceError::ExpiredOrUsed)));

    let user = service.find_user("once@example.com").await.unwrap().unwrap();
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn test_concurrent_redemptions_have_one_winner() {
    let (pool, _file) = test_helpers::create_test_db_file().await.unwrap();
    let service = Arc::new(test_helpers::create_auth_service(
        &pool,
        Arc::new(RecordingMailer::default()),
    ));

    let token = service
        .create_magic_link_invite("race@example.com", BASE_URL)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            service.redeem_magic_token(&token, never_admin).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AuthServiceError::ExpiredOrUsed) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_new_invite_revokes_previous_ones() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let first = service
        .create_magic_link_invite("twice@example.com", BASE_URL)
        .await
        .unwrap();
    let second = service
        .create_magic_link_invite("twice@example.com", BASE_URL)
        .await
        .unwrap();

    assert_eq!(
        statuses_for(&pool, "twice@example.com").await,
        vec![InvitationStatus::Revoked, InvitationStatus::Sent]
    );

    let stale = service.redeem_magic_token(&first, never_admin).await;
    assert!(matches!(stale, Err(AuthServiceError::ExpiredOrUsed)));
    assert!(service.redeem_magic_token(&second, never_admin).await.is_ok());
}

#[tokio::test]
async fn test_magic_link_requires_prior_invitation() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());
    let service = test_helpers::create_auth_service(&pool, mailer.clone());

    let result = service
        .require_and_send_magic_link("stranger@example.com", BASE_URL)
        .await;
    assert!(matches!(result, Err(AuthServiceError::NotInvited)));
    assert!(mailer.sent().is_empty());
    assert!(statuses_for(&pool, "stranger@example.com").await.is_empty());
}

#[tokio::test]
async fn test_used_invitation_still_allows_new_links() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());
    let service = test_helpers::create_auth_service(&pool, mailer.clone());

    let token = service
        .create_magic_link_invite("returning@example.com", BASE_URL)
        .await
        .unwrap();
    service.redeem_magic_token(&token, never_admin).await.unwrap();

    service
        .require_and_send_magic_link("RETURNING@example.com", BASE_URL)
        .await
        .unwrap();

    assert_eq!(mailer.sent().len(), 2);
    assert_eq!(
        statuses_for(&pool, "returning@example.com").await,
        vec![InvitationStatus::Used, InvitationStatus::Sent]
    );
}

#[tokio::test]
async fn test_revoked_history_does_not_count_as_invited() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    service
        .create_magic_link_invite("gone@example.com", BASE_URL)
        .await
        .unwrap();
    service.revoke_all_for_email("gone@example.com").await.unwrap();

    let result = service
        .require_and_send_magic_link("gone@example.com", BASE_URL)
        .await;
    assert!(matches!(result, Err(AuthServiceError::NotInvited)));
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let token = service
        .create_magic_link_invite("late@example.com", BASE_URL)
        .await
        .unwrap();

    sqlx::query("UPDATE invitations SET expires_at = ? WHERE token = ?")
        .bind(Utc::now() - Duration::minutes(1))
        .bind(&token)
        .execute(&pool)
        .await
        .unwrap();

    let result = service.redeem_magic_token(&token, never_admin).await;
    assert!(matches!(result, Err(AuthServiceError::ExpiredOrUsed)));
    assert!(service.find_user("late@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_token_is_invalid() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let result = service.redeem_magic_token("no-such-token", never_admin).await;
    assert!(matches!(result, Err(AuthServiceError::InvalidToken)));
}

#[tokio::test]
async fn test_disable_user_twice_reports_already_revoked() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let user = service.disable_user("Ghost@Example.com").await.unwrap();
    assert_eq!(user.email, "ghost@example.com");
    assert!(user.disabled);
    assert!(service.is_user_disabled("ghost@example.com").await.unwrap());

    let again = service.disable_user("ghost@example.com").await;
    assert!(matches!(again, Err(AuthServiceError::AlreadyRevoked)));
}

#[tokio::test]
async fn test_unknown_user_is_not_disabled() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    assert!(!service.is_user_disabled("nobody@example.com").await.unwrap());
}

#[tokio::test]
async fn test_disabled_user_cannot_redeem_or_request_links() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());
    let service = test_helpers::create_auth_service(&pool, mailer.clone());

    let token = service
        .create_magic_link_invite("blocked@example.com", BASE_URL)
        .await
        .unwrap();
    service.disable_user("blocked@example.com").await.unwrap();

    let redeem = service.redeem_magic_token(&token, never_admin).await;
    assert!(matches!(redeem, Err(AuthServiceError::UserDisabled)));

    let request = service
        .require_and_send_magic_link("blocked@example.com", BASE_URL)
        .await;
    assert!(matches!(request, Err(AuthServiceError::UserDisabled)));
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_mail_failure_leaves_invitation_pending() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service = test_helpers::create_auth_service(&pool, Arc::new(FailingMailer));

    let result = service
        .create_magic_link_invite("bounce@example.com", BASE_URL)
        .await;

    assert!(matches!(
        result,
        Err(AuthServiceError::Email(EmailError::SendFailed(_)))
    ));
    assert_eq!(
        statuses_for(&pool, "bounce@example.com").await,
        vec![InvitationStatus::Pending]
    );
}

#[tokio::test]
async fn test_mail_timeout_leaves_invitation_pending() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service = test_helpers::create_auth_service(
        &pool,
        Arc::new(SlowMailer(std::time::Duration::from_secs(5))),
    );

    let result = service
        .create_magic_link_invite("slow@example.com", BASE_URL)
        .await;

    assert!(matches!(
        result,
        Err(AuthServiceError::Email(EmailError::Timeout(_)))
    ));
    assert_eq!(
        statuses_for(&pool, "slow@example.com").await,
        vec![InvitationStatus::Pending]
    );
}

#[tokio::test]
async fn test_admin_predicate_promotes_on_redemption() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let token = service
        .create_magic_link_invite("boss@example.com", BASE_URL)
        .await
        .unwrap();

    let identity = service
        .redeem_magic_token(&token, |email| email == "boss@example.com")
        .await
        .unwrap();
    assert_eq!(identity.role, Role::Admin);
    assert!(identity.is_admin());
}

#[tokio::test]
async fn test_ensure_admin_creates_and_promotes() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let admin = service.ensure_admin(" Admin@Example.com").await.unwrap();
    assert_eq!(admin.email, "admin@example.com");
    assert_eq!(admin.role, Role::Admin);
    assert!(admin.last_login.is_some());

    let again = service.ensure_admin("admin@example.com").await.unwrap();
    assert_eq!(again.id, admin.id);
}

#[tokio::test]
async fn test_invalid_email_is_rejected() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    for email in ["", "   ", "no-at-sign"] {
        let result = service.create_magic_link_invite(email, BASE_URL).await;
        assert!(matches!(result, Err(AuthServiceError::InvalidEmail)));
    }

    let too_long = format!("{}@example.com", "a".repeat(250));
    let result = service.create_magic_link_invite(&too_long, BASE_URL).await;
    assert!(matches!(result, Err(AuthServiceError::InvalidEmail)));
}

#[tokio::test]
async fn test_send_by_id_rotates_token() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());
    let service = test_helpers::create_auth_service(&pool, mailer.clone());

    let invitation = service.create_invitation("later@example.com").await.unwrap();
    assert_eq!(invitation.status, InvitationStatus::Pending);
    assert!(mailer.sent().is_empty());

    let sent = service
        .send_invitation_by_id(invitation.id, BASE_URL)
        .await
        .unwrap();
    assert_eq!(sent.status, InvitationStatus::Sent);
    assert_ne!(sent.token, invitation.token);

    let old = service.redeem_magic_token(&invitation.token, never_admin).await;
    assert!(matches!(old, Err(AuthServiceError::InvalidToken)));

    let mail = mailer.last().unwrap();
    assert!(service.redeem_magic_token(mail.token(), never_admin).await.is_ok());
}

#[tokio::test]
async fn test_failed_resend_returns_invitation_to_pending() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());
    let service = test_helpers::create_auth_service(&pool, mailer.clone());

    service
        .create_magic_link_invite("resend@example.com", BASE_URL)
        .await
        .unwrap();
    let delivered = mailer.last().unwrap();
    let invitation = service.list_invitations(1).await.unwrap().remove(0);
    assert_eq!(invitation.status, InvitationStatus::Sent);

    let failing = test_helpers::create_auth_service(&pool, Arc::new(FailingMailer));
    let result = failing.send_invitation_by_id(invitation.id, BASE_URL).await;
    assert!(matches!(result, Err(AuthServiceError::Email(_))));

    let after = service.list_invitations(1).await.unwrap().remove(0);
    assert_eq!(after.id, invitation.id);
    assert_eq!(after.status, InvitationStatus::Pending);
    assert_ne!(after.token, invitation.token);

    // The previously mailed link died with the rotation
    let old = service.redeem_magic_token(delivered.token(), never_admin).await;
    assert!(matches!(old, Err(AuthServiceError::InvalidToken)));

    // A later successful resend promotes it again
    let resent = service
        .send_invitation_by_id(invitation.id, BASE_URL)
        .await
        .unwrap();
    assert_eq!(resent.status, InvitationStatus::Sent);
}

#[tokio::test]
async fn test_terminal_invitations_cannot_be_sent_or_revoked() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let invitation = service.create_invitation("done@example.com").await.unwrap();
    let revoked = service.revoke_invitation_by_id(invitation.id).await.unwrap();
    assert_eq!(revoked.status, InvitationStatus::Revoked);

    let send = service.send_invitation_by_id(invitation.id, BASE_URL).await;
    assert!(matches!(send, Err(AuthServiceError::CannotSend)));

    let revoke = service.revoke_invitation_by_id(invitation.id).await;
    assert!(matches!(revoke, Err(AuthServiceError::CannotRevoke)));

    let missing = service.revoke_invitation_by_id(9999).await;
    assert!(matches!(missing, Err(AuthServiceError::InvitationNotFound)));
}

#[tokio::test]
async fn test_listing_is_idempotent_and_annotated() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    service.create_invitation("one@example.com").await.unwrap();
    service.create_invitation("two@example.com").await.unwrap();
    service.disable_user("two@example.com").await.unwrap();

    let first = service
        .annotate_invites_with_user_disabled(service.list_invitations(200).await.unwrap())
        .await
        .unwrap();
    let second = service
        .annotate_invites_with_user_disabled(service.list_invitations(200).await.unwrap())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    // Newest first
    assert_eq!(first[0].invitation.email, "two@example.com");
    assert!(first[0].user_disabled);
    assert!(!first[1].user_disabled);

    assert_eq!(service.list_invitations(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_revoke_all_includes_used_invitations() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let token = service
        .create_magic_link_invite("all@example.com", BASE_URL)
        .await
        .unwrap();
    service.redeem_magic_token(&token, never_admin).await.unwrap();
    service.create_invitation("all@example.com").await.unwrap();

    let revoked = service.revoke_all_for_email("all@example.com").await.unwrap();
    assert_eq!(revoked, 2);
    assert_eq!(service.revoke_all_for_email("all@example.com").await.unwrap(), 0);
}

#[tokio::test]
async fn test_one_live_invitation_per_email_is_enforced_by_store() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let repo = SqliteInvitationRepository::new(pool.clone());

    let new = |token: &str| quickr::models::invitation::NewInvitation {
        email: "dup@example.com".to_string(),
        token: token.to_string(),
        expires_at: Utc::now() + Duration::days(1),
    };

    repo.create(&new("t1")).await.unwrap();
    assert!(repo.create(&new("t2")).await.is_err());

    repo.revoke_pending_and_sent("dup@example.com").await.unwrap();
    assert!(repo.create(&new("t3")).await.is_ok());

    let (revoked, live) = repo.replace_live(&new("t4")).await.unwrap();
    assert_eq!(revoked, 1);
    assert_eq!(live.status, InvitationStatus::Pending);
    assert_eq!(
        statuses_for(&pool, "dup@example.com").await,
        vec![
            InvitationStatus::Revoked,
            InvitationStatus::Revoked,
            InvitationStatus::Pending,
        ]
    );
}

#[tokio::test]
async fn test_concurrent_invites_for_one_email_all_succeed() {
    let (pool, _file) = test_helpers::create_test_db_file().await.unwrap();
    let service = Arc::new(test_helpers::create_auth_service(
        &pool,
        Arc::new(RecordingMailer::default()),
    ));

    for _ in 0..10 {
        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .create_magic_link_invite("race@example.com", BASE_URL)
                    .await
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await.unwrap() {
                panic!("concurrent invite failed: {}", e);
            }
        }

        let live = statuses_for(&pool, "race@example.com")
            .await
            .into_iter()
            .filter(|status| status.is_active())
            .count();
        assert_eq!(live, 1);
    }
}

#[tokio::test]
async fn test_save_leaves_terminal_invitations_alone() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let repo = SqliteInvitationRepository::new(pool.clone());
    let service =
        test_helpers::create_auth_service(&pool, Arc::new(RecordingMailer::default()));

    let token = service
        .create_magic_link_invite("keep@example.com", BASE_URL)
        .await
        .unwrap();
    service.redeem_magic_token(&token, never_admin).await.unwrap();

    let mut used = repo.find_by_token(&token).await.unwrap().unwrap();
    assert_eq!(used.status, InvitationStatus::Used);
    used.status = InvitationStatus::Pending;
    assert!(!repo.save(&used).await.unwrap());
    assert_eq!(
        repo.find_by_id(used.id).await.unwrap().unwrap().status,
        InvitationStatus::Used
    );

    let mut live = service.create_invitation("keep@example.com").await.unwrap();
    live.expires_at = Utc::now() + Duration::days(30);
    live.status = InvitationStatus::Sent;
    assert!(repo.save(&live).await.unwrap());
    assert_eq!(
        repo.find_by_id(live.id).await.unwrap().unwrap().status,
        InvitationStatus::Sent
    );

    live.status = InvitationStatus::Revoked;
    assert!(!repo.save(&live).await.unwrap());
}
