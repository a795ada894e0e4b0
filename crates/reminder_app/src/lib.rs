pub mod app;
pub mod backend;
