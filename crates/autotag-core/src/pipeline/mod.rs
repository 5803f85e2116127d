//! Per-image processing stages and the catalog run loop.
//!
//! - **validate**: existence, size and magic-byte checks
//! - **decode**: format sniffing and decoding with a timeout
//! - **processor**: ranks each image and merges keywords into its sidecar
//! - **stop**: cooperative cancellation between images

pub mod decode;
pub mod processor;
pub mod stop;
pub mod validate;

pub use decode::ImageDecoder;
pub use processor::{CatalogPipeline, RunOptions};
pub use stop::StopSignal;
pub use validate::Validator;
