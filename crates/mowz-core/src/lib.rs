pub mod bindings;
pub mod config;
pub mod pidfile;
