pub mod db;
pub mod items;
pub mod jobs;
pub mod models;
pub mod owner_lock;
pub mod qdrant;
pub mod queries;
pub mod schema;
pub mod vector;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
