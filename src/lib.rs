pub mod config;
pub mod error;
pub mod db;
pub mod network;
pub mod export;
pub mod service;
pub mod watch;

pub use config::Config;
pub use error::{BionetError, Result};
pub use network::{Explorer, ExploreRequest, GraphDocument};
