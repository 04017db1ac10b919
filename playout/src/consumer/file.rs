use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::format::VideoFormat;
use crate::mixer::OutputFrame;

use super::Consumer;

/// Options for [`FfmpegConsumer`].
#[derive(Clone, Debug)]
pub struct FfmpegConsumerOpts {
    /// Output file path (container chosen by extension).
    pub out_path: PathBuf,
    /// Overwrite the output file if it exists.
    pub overwrite: bool,
}

impl FfmpegConsumerOpts {
    /// Options writing to `out_path`, overwriting by default.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
        }
    }
}

/// Streams mixed frames to the system `ffmpeg` as rawvideo on stdin.
pub struct FfmpegConsumer {
    opts: FfmpegConsumerOpts,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    frame_bytes: usize,
}

impl FfmpegConsumer {
    /// Create an unattached consumer.
    pub fn new(opts: FfmpegConsumerOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            frame_bytes: 0,
        }
    }

    fn finish(&mut self) -> PlayoutResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| PlayoutError::consumer(format!("waiting for ffmpeg failed: {e}")))?;
        let stderr = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .ok()
                .and_then(|r| r.ok())
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(PlayoutError::consumer(format!(
                "ffmpeg exited with {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Consumer for FfmpegConsumer {
    fn initialize(&mut self, format: &VideoFormat) -> PlayoutResult<()> {
        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(PlayoutError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        let rate = format!("{}/{}", format.framerate.num, format.framerate.den);
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .arg(if self.opts.overwrite { "-y" } else { "-n" })
            .args([
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgra",
                "-s",
                &format!("{}x{}", format.width, format.height),
                "-r",
                &rate,
                "-i",
                "pipe:0",
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ])
            .arg(&self.opts.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            PlayoutError::consumer(format!(
                "failed to spawn ffmpeg (is it on PATH?): {e}"
            ))
        })?;
        self.stdin = child.stdin.take();
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| PlayoutError::consumer("failed to open ffmpeg stderr"))?;
        self.stderr_drain = Some(std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        }));
        self.child = Some(child);
        self.frame_bytes = format.frame_bytes();
        Ok(())
    }

    fn consume(&mut self, frame: &OutputFrame) -> PlayoutResult<()> {
        if frame.data.len() != self.frame_bytes {
            return Err(PlayoutError::validation(format!(
                "frame size mismatch: got {} bytes, expected {}",
                frame.data.len(),
                self.frame_bytes
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PlayoutError::consumer("ffmpeg consumer is not attached"))?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| PlayoutError::consumer(format!("writing to ffmpeg failed: {e}")))
    }

    fn buffer_depth(&self) -> u32 {
        // ffmpeg's own pipe buffering.
        2
    }

    fn print(&self) -> String {
        format!("ffmpeg[{}]", self.opts.out_path.display())
    }

    fn abort(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "ffmpeg consumer did not finish cleanly");
        }
    }
}

impl Drop for FfmpegConsumer {
    fn drop(&mut self) {
        Consumer::abort(self);
    }
}

fn ensure_parent_dir(path: &Path) -> PlayoutResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            PlayoutError::validation(format!(
                "failed to create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}
