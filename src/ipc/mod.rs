//! IPC module for status queries and event subscriptions

mod protocol;
mod server;

pub use server::Server;
