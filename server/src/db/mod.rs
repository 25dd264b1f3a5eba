pub mod backend;
pub mod file;
pub mod pool;
pub mod sqlite;
