pub mod registry;
pub mod session_store;

pub use registry::{scope, ContextRegistry, MostRecentPrincipal};
pub use session_store::SessionStore;
