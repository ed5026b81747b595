pub mod admin;
pub mod auth;
pub mod common;
pub mod context;
pub mod domain;
pub mod pathmap;
pub mod resource;
pub mod rpc;
pub mod security;
pub mod webdav;
