//! Basic numerical concepts used throughout the program

#![allow(missing_docs)]

// Floating-point precision is configured here
#[cfg(feature = "f32")]
pub type Float = f32;
#[cfg(not(feature = "f32"))]
pub type Float = f64;
