//! Upstream of the fill: turning an uploaded document into text, and text
//! into template values.

pub mod fields;
pub mod text;

pub use fields::{
    build_extraction_prompt, parse_model_reply, stringify_value, ExtractionPrompt, FieldExtractor,
    JsonValuesExtractor,
};
pub use text::{extract_text, file_extension};
