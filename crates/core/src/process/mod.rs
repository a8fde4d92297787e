//! Process module for assembling and running ffmpeg commands.
//!
//! [`FfmpegProcess`] assembles a multi-input, multi-output ffmpeg command line
//! and proxies status queries to an [`ExecutionHandle`]. The default handle,
//! [`ExecBuffer`], runs the command under `sh` and captures all output in a
//! temp file, so a non-blocking run can be resumed later from a
//! [`PortableId`].
//!
//! # Features
//!
//! - Ordered pre-input, per-output and post-output command scopes
//! - Input placement by append, prepend or explicit index
//! - Blocking and non-blocking execution
//! - Output removal when the tool reports an error
//! - `[tag @ address]` diagnostic extraction
//!
//! # Example
//!
//! ```ignore
//! use vidkit_core::process::{FfmpegProcess, ProcessConfig};
//!
//! let config = ProcessConfig::default();
//! let mut process = FfmpegProcess::from_config(&config);
//! process
//!     .add_input("/path/to/input.mkv")
//!     .add_command("-c:a", "aac".into(), false)
//!     .set_output_path("/path/to/output.mp4");
//!
//! process.start()?;
//! let id = process.portable_id()?;
//! println!("resume with {}", id);
//!
//! // Later, possibly in another process:
//! let resumed = FfmpegProcess::resume(&id.to_string().parse()?, &config)?;
//! if resumed.is_completed()? && resumed.has_error(false)? {
//!     println!("{:?}", resumed.messages()?);
//! }
//! ```

mod builder;
mod config;
mod error;
mod exec_buffer;
mod ffmpeg;
mod messages;
mod portable;
mod traits;
mod types;

pub use builder::{quote, ProcessBuilder};
pub use config::{ProcessConfig, FFMPEG_LOG_LEVELS};
pub use error::ProcessError;
pub use exec_buffer::{ExecBuffer, ExecBufferFactory, STORAGE_PREFIX};
pub use ffmpeg::{FfmpegProcess, INPUT_MARKER};
pub use messages::{parse_messages, MessageInstance, MessageSource, Messages};
pub use portable::PortableId;
pub use traits::{ExecutionHandle, HandleFactory};
pub use types::{CommandArgument, CommandEntry, CommandSet, InputPosition, Insertion, Operation};

pub(crate) use exec_buffer::{last_line_of, last_split_of};
