pub mod auth_extract;
pub mod handlers;
pub mod propfind;

pub use handlers::webdav_routes;
