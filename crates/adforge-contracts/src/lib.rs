pub mod brand;
pub mod captions;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod jobs;
pub mod prompts;
pub mod runs;
pub mod units;

pub use error::CreativeError;
