//! Rust binding for the Lynx streaming speech-to-text engine.
//!
//! Lynx ships as a precompiled native shared library plus an acoustic model
//! file. This crate locates those artifacts for the current platform, loads
//! the library at runtime, and wraps the engine's streaming C API in a safe
//! session type:
//!
//! ```no_run
//! use lynx_stt::LynxBuilder;
//!
//! let lynx = LynxBuilder::new()
//!     .access_key("${ACCESS_KEY}")
//!     .init()?;
//!
//! let frame = vec![0i16; lynx.frame_length() as usize];
//! let partial = lynx.process(&frame)?;
//! print!("{}", partial.text);
//! if partial.is_endpoint {
//!     let remainder = lynx.flush()?;
//!     println!("{}", remainder.text);
//! }
//! # Ok::<(), lynx_stt::LynxError>(())
//! ```
//!
//! Audio must be single-channel, 16-bit linear PCM at [`Lynx::sample_rate`],
//! fed in frames of exactly [`Lynx::frame_length`] samples.

mod engine;
pub mod error;
pub mod platform;
pub mod resources;
mod session;

pub use error::{EngineFailure, LynxError, Status};
pub use session::{Lynx, LynxBuilder, Transcript};
