mod admin_api;

pub use admin_api::{AdminServer, AdminState};
