pub mod connection;
pub mod entity;
pub mod files;
pub mod repository;

pub use connection::establish_connection;
pub use files::{FileStore, LocalFileStore};
