//! Network, image and archive side of the ad-creative pipeline.
//!
//! Every remote call goes through [`transport::HttpTransport`]; the
//! [`orchestrator::Orchestrator`] wires the stages together and runs units on
//! a bounded worker pool.

pub mod archive;
pub mod captions;
pub mod image_edit;
pub mod orchestrator;
pub mod pool;
pub mod postprocess;
pub mod prompting;
pub mod transport;
pub mod vision;

pub use orchestrator::{archive_file_name, CreativeArchive, CreativeRequest, Orchestrator};
pub use transport::{HttpTransport, ReqwestTransport};
