//! Parley DM chat server library. Modules are public so integration tests
//! can boot a full server; the binary entry point lives in main.rs.

pub mod auth;
pub mod chats;
pub mod config;
pub mod db;
pub mod messages;
pub mod routes;
pub mod state;
pub mod uploads;
pub mod users;
pub mod ws;
