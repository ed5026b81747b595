pub mod handlers;

pub use handlers::admin_routes;
