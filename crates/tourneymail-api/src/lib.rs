//! TourneyMail API - REST API server
//!
//! Operator endpoints to queue, inspect and cancel scheduled campaigns,
//! send a campaign immediately and trigger a scheduler tick.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
