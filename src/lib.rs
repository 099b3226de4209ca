pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod observability;
pub mod protocol;
pub mod schema;
pub mod state;
pub mod stream;
pub mod upstream;

mod util;
