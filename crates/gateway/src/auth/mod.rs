pub mod admin;
pub mod cache;
pub mod middleware;

pub use admin::AdminGuard;
pub use cache::AuthCache;
pub use middleware::CurrentUser;
