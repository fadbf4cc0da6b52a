//! Intake bot: conversational data entry for staff and residents.

pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod forms;
pub mod routes;
pub mod store;
