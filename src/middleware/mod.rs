pub mod rate_limit;

pub use rate_limit::{client_ip, rate_limit_login, IpRateLimiter};
