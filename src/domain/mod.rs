pub mod file_metadata;
pub mod path_mapping;
pub mod path_node;
pub mod principal;
pub mod request_context;
