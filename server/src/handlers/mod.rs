//! Request handlers for the waitlist service.

mod subscribe;
mod subscribers;
mod websocket;

pub use subscribe::*;
pub use subscribers::*;
pub use websocket::*;
