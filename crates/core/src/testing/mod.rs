//! Testing utilities and mock implementations.
//!
//! This module provides a mock execution handle and factory, allowing the
//! process proxy to be tested without spawning ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidkit_core::testing::MockHandleFactory;
//!
//! let factory = MockHandleFactory::new().with_exit_code(1);
//! let mut process = FfmpegProcess::with_factory("ffmpeg", Arc::new(factory.clone()));
//!
//! process.add_input("in.mp4").set_output_path("out.mp4");
//! process.execute()?;
//!
//! let handle = factory.last_handle().unwrap();
//! assert_eq!(handle.created_command(), "ffmpeg -i in.mp4 out.mp4");
//! ```

mod mock_handle;

pub use mock_handle::{MockHandle, MockHandleFactory};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::fs;
    use std::path::{Path, PathBuf};

    /// Typical ffmpeg stderr containing component diagnostics.
    pub const FFMPEG_ERROR_OUTPUT: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':
[mov,mp4,m4a,3gp,3g2,mj2 @ 0x55d0c8a1b2c0] ignored
[h264 @ 0x55d0c8a2f100] non-existing PPS 0 referenced
[h264 @ 0x55d0c8a2f100] decode_slice_header error
[aac @ 0x55d0c8a30400] Input buffer exhausted before END element found
frame=   12 fps=0.0 q=28.0 size=       0kB time=00:00:00.40 bitrate=   0.0kbits/s\r\
frame=   48 fps= 47 q=28.0 size=     256kB time=00:00:01.92 bitrate=1092.3kbits/s\r
Conversion failed!
";

    /// Create an output file with some content, as ffmpeg would leave behind.
    pub fn output_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"partial output").unwrap_or_else(|e| {
            panic!("failed to create fixture {}: {}", path.display(), e)
        });
        path
    }
}
