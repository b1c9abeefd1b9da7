pub mod invitation;
pub mod user;

pub use invitation::{Invitation, InvitationStatus, InvitationView, NewInvitation};
pub use user::{normalize_email, Identity, Role, User};
