pub mod handlers;
pub mod middleware;
pub mod session;

pub use session::{Claims, SessionError, SessionManager};
