//! Registry module
//!
//! Models, their versions and evaluation metrics, and the organizations
//! that own them.

mod models;
mod service;

pub use models::*;
pub use service::RegistryService;
