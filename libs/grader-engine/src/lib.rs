//! Grading engine for untrusted Python submissions.
//!
//! Single-case flow: validator → fixture → harness → sandbox → decoder.
//! Full-suite flow: validator → batch grader.

pub mod batch;
pub mod decoder;
pub mod error;
pub mod fixture;
pub mod grader;
pub mod harness;
pub mod literal;
pub mod problems;
pub mod sandbox;
pub mod scrape;
pub mod validator;


pub use error::GradeError;
pub use grader::Grader;
