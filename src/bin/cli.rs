use clap::{Parser, Subcommand};
use quickr::{
    config::{AuthSettings, MailerSettings},
    db,
    repositories::{SqliteInvitationRepository, SqliteUserRepository},
    services::{auth_service::AuthService, email_service::create_mailer},
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quickr-cli")]
#[command(about = "CLI tool for managing Quickr invitations and users", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invitation management commands
    Invite {
        #[command(subcommand)]
        command: InviteCommands,
    },
    /// User management commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum InviteCommands {
    /// Create an invitation and email the magic link
    Create {
        /// Email address to invite
        #[arg(short, long)]
        email: String,

        /// Only store the invitation, don't send it
        #[arg(long)]
        no_send: bool,
    },

    /// (Re)send an invitation by id with a fresh token
    Send {
        #[arg(long)]
        id: i64,
    },

    /// Revoke a single invitation by id
    Revoke {
        #[arg(long)]
        id: i64,
    },

    /// Revoke every invitation for an email
    RevokeEmail {
        #[arg(short, long)]
        email: String,
    },

    /// List invitations, newest first
    List {
        /// Maximum number of invitations to display
        #[arg(short, long, default_value_t = 200)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Disable a user (creates a disabled record for unknown emails)
    Disable {
        #[arg(short, long)]
        email: String,
    },

    /// Create or promote an admin user
    EnsureAdmin {
        #[arg(short, long)]
        email: String,
    },

    /// Show a user
    Show {
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // The CLI doesn't need a session secret, so read only what it uses
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/quickr.db?mode=rwc".to_string());
    let base_url =
        std::env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let mailer_settings = MailerSettings::from_env()?;

    // Connect to database
    let pool = db::create_pool(&database_url).await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Initialize services
    let auth_service = AuthService::new(
        Arc::new(SqliteUserRepository::new(pool.clone())),
        Arc::new(SqliteInvitationRepository::new(pool.clone())),
        Arc::from(create_mailer(&mailer_settings)),
        &AuthSettings::from_env()?,
    );

    match cli.command {
        Commands::Invite { command } => match command {
            InviteCommands::Create { email, no_send } => {
                if no_send {
                    match auth_service.create_invitation(&email).await {
                        Ok(invitation) => {
                            println!("✅ Invitation {} created for {}", invitation.id, invitation.email)
                        }
                        Err(e) => fail(format!("Error creating invitation: {}", e)),
                    }
                } else {
                    match auth_service.create_magic_link_invite(&email, &base_url).await {
                        Ok(_) => println!("✅ Magic link sent to {}", email.trim()),
                        Err(e) => fail(format!("Error sending invitation: {}", e)),
                    }
                }
            }

            InviteCommands::Send { id } => {
                match auth_service.send_invitation_by_id(id, &base_url).await {
                    Ok(invitation) => println!("✅ Invitation {} sent to {}", id, invitation.email),
                    Err(e) => fail(format!("Error sending invitation {}: {}", id, e)),
                }
            }

            InviteCommands::Revoke { id } => match auth_service.revoke_invitation_by_id(id).await {
                Ok(invitation) => println!("✅ Invitation {} for {} revoked", id, invitation.email),
                Err(e) => fail(format!("Error revoking invitation {}: {}", id, e)),
            },

            InviteCommands::RevokeEmail { email } => {
                match auth_service.revoke_all_for_email(&email).await {
                    Ok(count) => println!("✅ Revoked {} invitation(s) for {}", count, email.trim()),
                    Err(e) => fail(format!("Error revoking invitations: {}", e)),
                }
            }

            InviteCommands::List { limit } => {
                let invitations = match auth_service.list_invitations(limit).await {
                    Ok(invitations) => invitations,
                    Err(e) => fail(format!("Error listing invitations: {}", e)),
                };
                let views = match auth_service
                    .annotate_invites_with_user_disabled(invitations)
                    .await
                {
                    Ok(views) => views,
                    Err(e) => fail(format!("Error loading users: {}", e)),
                };

                if views.is_empty() {
                    println!("No invitations found");
                } else {
                    println!(
                        "{:<6} {:<40} {:<8} {:<26} {:<8}",
                        "ID", "Email", "Status", "Expires", "Disabled"
                    );
                    println!("{}", "-".repeat(92));
                    for view in views {
                        let inv = &view.invitation;
                        println!(
                            "{:<6} {:<40} {:<8} {:<26} {:<8}",
                            inv.id,
                            inv.email,
                            inv.status,
                            inv.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
                            if view.user_disabled { "yes" } else { "no" }
                        );
                    }
                }
            }
        },

        Commands::User { command } => match command {
            UserCommands::Disable { email } => match auth_service.disable_user(&email).await {
                Ok(user) => println!("✅ User {} disabled", user.email),
                Err(e) => fail(format!("Error disabling user: {}", e)),
            },

            UserCommands::EnsureAdmin { email } => match auth_service.ensure_admin(&email).await {
                Ok(user) => println!("✅ {} is an admin", user.email),
                Err(e) => fail(format!("Error ensuring admin: {}", e)),
            },

            UserCommands::Show { email } => match auth_service.find_user(&email).await {
                Ok(Some(user)) => {
                    println!("Email:      {}", user.email);
                    println!("Role:       {}", user.role);
                    println!("Disabled:   {}", user.disabled);
                    println!("Created:    {}", user.created_at);
                    match user.last_login {
                        Some(at) => println!("Last login: {}", at),
                        None => println!("Last login: never"),
                    }
                }
                Ok(None) => fail(format!("User not found: {}", email.trim())),
                Err(e) => fail(format!("Error loading user: {}", e)),
            },
        },
    }

    Ok(())
}

fn fail(message: String) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

