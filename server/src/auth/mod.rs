//! Bearer-token authentication for admin routes.

mod middleware;

pub use middleware::AuthUser;
