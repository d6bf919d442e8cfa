pub mod api_error;
pub mod apply;
pub mod config;
pub mod context;
pub mod db;
pub mod detect;
pub mod diff;
pub mod error;
pub mod handlers;
pub mod hubspot;
pub mod lock;
pub mod mirror;
pub mod model;
pub mod revert;
pub mod routes;
pub mod sheets;
pub mod state;
pub mod tracker;
