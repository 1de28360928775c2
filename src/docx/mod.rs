pub mod fill;
pub mod merge;
pub mod package;
pub mod placeholder;
pub mod text;
pub mod tree;
pub mod validate;
pub mod xml;

/// The body part every template must have.
pub const MAIN_PART: &str = "word/document.xml";

/// Parts that are parsed and filled, in processing order. Everything else in
/// the container is carried over untouched.
pub const RELEVANT_PARTS: [&str; 7] = [
    MAIN_PART,
    "word/header1.xml",
    "word/header2.xml",
    "word/header3.xml",
    "word/footer1.xml",
    "word/footer2.xml",
    "word/footer3.xml",
];
