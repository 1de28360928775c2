pub mod catalog;
pub mod config;
pub mod docx;
pub mod engine;
pub mod error;
pub mod extract;
pub mod intake;
pub mod prompts;

pub use catalog::{TemplateCatalog, TemplateInfo};
pub use engine::{fill_bytes, TemplateEngine};
pub use error::{ErrorKind, FillError, IntakeError};
