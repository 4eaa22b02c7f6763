//! Integration tests for the processor module
//!
//! Tests the assembler and the processing pipeline against synthetic RAPIC
//! streams built with the crate's own encoders.

pub mod assembler_tests;
