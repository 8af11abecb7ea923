//! Request pipeline: validation, staging, separation, packaging, delivery

pub mod orchestrator;
pub mod request;
pub mod response;
pub mod workspace;

pub use orchestrator::{Delivered, Handler, Outcome, Rejected, Stage};
pub use request::{RawRequest, SeparationRequest};
pub use response::Response;
pub use workspace::RequestWorkspace;
