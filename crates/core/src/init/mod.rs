//! Initialization module for creating .bulk-kit directory structures.
//!
//! This module provides functionality to initialize a new bulk-kit project
//! by generating a `.bulk-kit/` directory with pre-configured templates for:
//! - Global configuration (`config.toml`)
//! - A sandbox directory snapshot (`directory.yaml`)
//! - Example jobs (`jobs/*.yaml`)
//!
//! # Example
//!
//! ```no_run
//! use bk_core::init::{InitOptions, generate_bulk_kit_structure};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = InitOptions {
//!     target_dir: PathBuf::from("."),
//!     force: false,
//!     minimal: false,
//! };
//!
//! generate_bulk_kit_structure(options).await?;
//! println!("bulk-kit initialized successfully!");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{InitError, InitResult};
pub use generator::{generate_bulk_kit_structure, InitOptions};
pub use templates::{get_template, list_templates};
