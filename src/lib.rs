pub mod admin;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod folders;
pub mod identity;
pub mod models;
pub mod pagination;
pub mod request;
pub mod routes;
pub mod schema;
pub mod state;

pub mod utils {
    pub mod json;
}
