//! Media-file producer decoding through the system `ffmpeg`/`ffprobe`.
//!
//! The decode loop runs on an internal thread and hands BGRA frames to the
//! stage through a bounded, abortable queue (capacity 2). Commands issued via
//! `call` are executed by that thread between frames, so seeks and loop
//! toggles never race the decoder.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::diag::MetricSink;
use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::foundation::executor::{TaskFuture, TaskPromise};
use crate::foundation::queue::{AbortGuard, QueueReceiver, QueueSender, frame_queue};
use crate::format::VideoFormat;
use crate::frame::draw_frame::DrawFrame;
use crate::frame::pixel::PixelDesc;
use crate::producer::{FrameFactory, Producer, ReceiveFlags};

const DECODE_QUEUE_DEPTH: usize = 2;

/// Construction options for [`MediaProducer`].
#[derive(Clone, Debug)]
pub struct MediaProducerOpts {
    /// Source file path.
    pub path: PathBuf,
    /// Restart from `start` at end-of-media instead of reporting eof.
    pub loop_playback: bool,
    /// First frame to play, in channel frames.
    pub start: u64,
    /// Play at most this many frames; `None` plays to the end.
    pub length: Option<u64>,
}

impl MediaProducerOpts {
    /// Options playing `path` once from the beginning.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loop_playback: false,
            start: 0,
            length: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct MediaInfo {
    frame_number: u64,
    frame_count: u64,
    looping: bool,
    width: u32,
    height: u32,
}

enum DecodeItem {
    Frame {
        frame: DrawFrame,
        number: u64,
        epoch: u64,
    },
    Eof {
        epoch: u64,
    },
}

enum SeekTarget {
    Frame(u64),
    In,
    Out,
    End,
}

enum MediaCommand {
    Loop(Option<bool>, TaskPromise<PlayoutResult<String>>),
    Seek(SeekTarget, TaskPromise<PlayoutResult<String>>),
    In(Option<u64>, TaskPromise<PlayoutResult<String>>),
    Out(Option<u64>, TaskPromise<PlayoutResult<String>>),
    Length(Option<u64>, TaskPromise<PlayoutResult<String>>),
    Deinterlace(bool),
}

/// Probed source metadata.
#[derive(Clone, Debug)]
struct ProbeInfo {
    width: u32,
    height: u32,
    nb_frames: Option<u64>,
    duration_secs: Option<f64>,
}

fn probe(path: &std::path::Path) -> PlayoutResult<ProbeInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        nb_frames: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| PlayoutError::producer(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(PlayoutError::producer(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| PlayoutError::producer(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PlayoutError::producer("no video stream found"))?;

    Ok(ProbeInfo {
        width: video
            .width
            .ok_or_else(|| PlayoutError::producer("missing video width"))?,
        height: video
            .height
            .ok_or_else(|| PlayoutError::producer("missing video height"))?,
        nb_frames: video.nb_frames.as_deref().and_then(|s| s.parse().ok()),
        duration_secs: parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|s| s.parse().ok()),
    })
}

/// The decoder illustrative of the producer contract: internal thread,
/// bounded abortable queue, repeat-last smoothness policy, async commands.
pub struct MediaProducer {
    opts: MediaProducerOpts,
    metrics: Arc<dyn MetricSink>,

    info: Arc<Mutex<MediaInfo>>,
    epoch: Arc<AtomicU64>,

    frames: Option<QueueReceiver<DecodeItem>>,
    abort: Option<AbortGuard>,
    commands: Option<Sender<MediaCommand>>,
    child: Arc<Mutex<Option<Child>>>,
    worker: Option<JoinHandle<()>>,

    last_frame: DrawFrame,
    eof_delivered: bool,
    deinterlace: bool,
}

impl MediaProducer {
    /// Create an uninitialized media producer.
    pub fn new(opts: MediaProducerOpts, metrics: Arc<dyn MetricSink>) -> Self {
        Self {
            opts,
            metrics,
            info: Arc::new(Mutex::new(MediaInfo::default())),
            epoch: Arc::new(AtomicU64::new(0)),
            frames: None,
            abort: None,
            commands: None,
            child: Arc::new(Mutex::new(None)),
            worker: None,
            last_frame: DrawFrame::empty(),
            eof_delivered: false,
            deinterlace: false,
        }
    }

    fn send_command(&self, cmd: MediaCommand) -> PlayoutResult<()> {
        self.commands
            .as_ref()
            .ok_or_else(|| PlayoutError::producer("media producer not initialized"))?
            .send(cmd)
            .map_err(|_| PlayoutError::aborted("media decode thread is gone"))
    }

    fn info_snapshot(&self) -> MediaInfo {
        *self.info.lock().expect("media info lock poisoned")
    }
}

impl Producer for MediaProducer {
    fn receive(&mut self, flags: ReceiveFlags) -> PlayoutResult<DrawFrame> {
        if self.frames.is_none() || self.eof_delivered {
            return Ok(DrawFrame::empty());
        }

        // Flag changes reconfigure the decode filter chain asynchronously;
        // frames already queued keep their old epoch and are skipped below.
        let want_deinterlace = flags.contains(ReceiveFlags::DEINTERLACE);
        if want_deinterlace != self.deinterlace {
            self.deinterlace = want_deinterlace;
            let _ = self.send_command(MediaCommand::Deinterlace(want_deinterlace));
        }

        enum Picked {
            Frame(DrawFrame, u64, usize),
            Eof,
            Underflow,
        }

        let current_epoch = self.epoch.load(Ordering::Acquire);
        let picked = {
            let frames = self.frames.as_ref().expect("checked above");
            loop {
                match frames.try_recv() {
                    Some(DecodeItem::Frame { epoch, .. }) if epoch < current_epoch => continue,
                    Some(DecodeItem::Eof { epoch }) if epoch < current_epoch => continue,
                    Some(DecodeItem::Frame { frame, number, .. }) => {
                        break Picked::Frame(frame, number, frames.len());
                    }
                    Some(DecodeItem::Eof { .. }) => break Picked::Eof,
                    None => break Picked::Underflow,
                }
            }
        };

        match picked {
            Picked::Frame(frame, number, buffered) => {
                self.metrics
                    .set_value("buffer-count", buffered as f64 / DECODE_QUEUE_DEPTH as f64);
                self.info
                    .lock()
                    .expect("media info lock poisoned")
                    .frame_number = number;
                self.last_frame = frame.clone();
                Ok(frame)
            }
            Picked::Eof => {
                self.eof_delivered = true;
                Ok(DrawFrame::eof())
            }
            Picked::Underflow => {
                self.metrics.tag("underflow");
                tracing::warn!(file = %self.opts.path.display(), "media decode underflow");
                Ok(self.last_frame.clone())
            }
        }
    }

    fn initialize(&mut self, factory: Arc<dyn FrameFactory>) -> PlayoutResult<()> {
        let probed = probe(&self.opts.path)?;
        let format = factory.video_format().clone();

        let frame_count = probed.nb_frames.or_else(|| {
            probed
                .duration_secs
                .map(|secs| (secs * format.fps()).floor() as u64)
        });

        {
            let mut info = self.info.lock().expect("media info lock poisoned");
            info.width = probed.width;
            info.height = probed.height;
            info.looping = self.opts.loop_playback;
            info.frame_count = frame_count.unwrap_or(u64::from(u32::MAX));
        }

        let (tx, rx, guard) = frame_queue::<DecodeItem>(DECODE_QUEUE_DEPTH);
        let (cmd_tx, cmd_rx) = unbounded::<MediaCommand>();

        let worker = DecodeWorker {
            path: self.opts.path.clone(),
            format,
            factory,
            width: probed.width,
            height: probed.height,
            start: self.opts.start,
            length: self.opts.length,
            looping: self.opts.loop_playback,
            total: frame_count,
            deinterlace: false,
            epoch: self.epoch.clone(),
            info: self.info.clone(),
            child: self.child.clone(),
            out: tx,
            commands: cmd_rx,
        };
        let handle = std::thread::Builder::new()
            .name("media-decode".to_owned())
            .spawn(move || worker.run())
            .map_err(|e| PlayoutError::producer(format!("failed to spawn decode thread: {e}")))?;

        self.frames = Some(rx);
        self.abort = Some(guard);
        self.commands = Some(cmd_tx);
        self.worker = Some(handle);
        Ok(())
    }

    fn call(&mut self, params: &[String]) -> TaskFuture<PlayoutResult<String>> {
        let (promise, future) = TaskFuture::pair();
        let cmd = params.first().map(|s| s.to_ascii_uppercase());
        let value = params.get(1).cloned();

        let parse_u64 = |v: &Option<String>| -> PlayoutResult<Option<u64>> {
            v.as_deref()
                .map(|s| {
                    s.parse::<u64>()
                        .map_err(|_| PlayoutError::validation(format!("bad frame count '{s}'")))
                })
                .transpose()
        };

        let command = match cmd.as_deref() {
            Some("LOOP") => {
                let flag = value.as_deref().map(|v| matches!(v, "1" | "true" | "TRUE"));
                Ok(MediaCommand::Loop(flag, promise))
            }
            Some("SEEK") => match value.as_deref() {
                Some("in") | Some("IN") => Ok(MediaCommand::Seek(SeekTarget::In, promise)),
                Some("out") | Some("OUT") => Ok(MediaCommand::Seek(SeekTarget::Out, promise)),
                Some("end") | Some("END") => Ok(MediaCommand::Seek(SeekTarget::End, promise)),
                Some(v) => match v.parse::<u64>() {
                    Ok(frame) => Ok(MediaCommand::Seek(SeekTarget::Frame(frame), promise)),
                    Err(_) => Err((promise, format!("bad seek target '{v}'"))),
                },
                None => Err((promise, "SEEK requires a target".to_owned())),
            },
            Some("IN") | Some("START") => match parse_u64(&value) {
                Ok(v) => Ok(MediaCommand::In(v, promise)),
                Err(e) => Err((promise, e.to_string())),
            },
            Some("OUT") => match parse_u64(&value) {
                Ok(v) => Ok(MediaCommand::Out(v, promise)),
                Err(e) => Err((promise, e.to_string())),
            },
            Some("LENGTH") => match parse_u64(&value) {
                Ok(v) => Ok(MediaCommand::Length(v, promise)),
                Err(e) => Err((promise, e.to_string())),
            },
            _ => Err((
                promise,
                format!("unknown media command {:?}", params.first()),
            )),
        };

        match command {
            Ok(cmd) => {
                if let Err(e) = self.send_command(cmd) {
                    return TaskFuture::ready(Err(e));
                }
            }
            Err((promise, msg)) => promise.set(Err(PlayoutError::validation(msg))),
        }
        future
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn info(&self) -> serde_json::Value {
        let info = self.info_snapshot();
        serde_json::json!({
            "type": "ffmpeg-producer",
            "filename": self.opts.path.display().to_string(),
            "width": info.width,
            "height": info.height,
            "loop": info.looping,
            "file-frame-number": info.frame_number,
            "file-nb-frames": info.frame_count,
        })
    }

    fn print(&self) -> String {
        let info = self.info_snapshot();
        format!(
            "ffmpeg[{}|{}/{}]",
            self.opts.path.display(),
            info.frame_number,
            info.frame_count
        )
    }

    fn nb_frames(&self) -> u32 {
        let info = self.info_snapshot();
        if info.looping {
            u32::MAX
        } else {
            info.frame_count.min(u64::from(u32::MAX)) as u32
        }
    }

    fn abort(&mut self) {
        if let Some(guard) = &self.abort {
            guard.abort();
        }
        self.commands.take();
        if let Some(mut child) = self.child.lock().expect("media child lock poisoned").take() {
            let _ = child.kill();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for MediaProducer {
    fn drop(&mut self) {
        Producer::abort(self);
    }
}

struct DecodeWorker {
    path: PathBuf,
    format: VideoFormat,
    factory: Arc<dyn FrameFactory>,
    width: u32,
    height: u32,
    start: u64,
    length: Option<u64>,
    looping: bool,
    total: Option<u64>,
    deinterlace: bool,
    epoch: Arc<AtomicU64>,
    info: Arc<Mutex<MediaInfo>>,
    child: Arc<Mutex<Option<Child>>>,
    out: QueueSender<DecodeItem>,
    commands: Receiver<MediaCommand>,
}

enum WorkerStep {
    Restart(u64),
    Stop,
}

impl DecodeWorker {
    fn run(mut self) {
        let mut position = self.start;
        loop {
            match self.decode_from(position) {
                Ok(WorkerStep::Restart(at)) => position = at,
                Ok(WorkerStep::Stop) => break,
                Err(e) => {
                    if !e.is_abort() {
                        tracing::error!(
                            file = %self.path.display(),
                            error = %e,
                            "media decode failed"
                        );
                        let epoch = self.epoch.load(Ordering::Acquire);
                        let _ = self.out.send(DecodeItem::Eof { epoch });
                    }
                    break;
                }
            }
        }
        self.kill_child();
    }

    fn spawn_child(&self, position: u64) -> PlayoutResult<ChildStdout> {
        let rate = format!("{}/{}", self.format.framerate.num, self.format.framerate.den);
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .args(["-loglevel", "error"]);
        if position > 0 {
            let secs = self.format.frames_to_us(position as i64) as f64 / 1e6;
            cmd.args(["-ss", &format!("{secs:.6}")]);
        }
        cmd.arg("-i").arg(&self.path);
        if self.deinterlace {
            cmd.args(["-vf", "yadif=0:-1"]);
        }
        cmd.args(["-f", "rawvideo", "-pix_fmt", "bgra", "-r", &rate, "pipe:1"]);

        let mut child = cmd
            .spawn()
            .map_err(|e| PlayoutError::producer(format!("failed to spawn ffmpeg: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayoutError::producer("failed to open ffmpeg stdout"))?;
        self.kill_child();
        *self.child.lock().expect("media child lock poisoned") = Some(child);
        Ok(stdout)
    }

    fn kill_child(&self) {
        if let Some(mut child) = self.child.lock().expect("media child lock poisoned").take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn decode_from(&mut self, position: u64) -> PlayoutResult<WorkerStep> {
        let mut stdout = self.spawn_child(position)?;
        let desc = PixelDesc::bgra(self.width, self.height);
        let frame_bytes = desc.planes[0].byte_len();
        let mut buf = vec![0u8; frame_bytes];
        let mut number = position;

        loop {
            if let Some(step) = self.drain_commands(number)? {
                return Ok(step);
            }

            if let Some(length) = self.length
                && number >= self.start.saturating_add(length)
            {
                return self.end_of_media(number);
            }

            match read_exact_or_eof(&mut stdout, &mut buf) {
                Ok(true) => {}
                Ok(false) => return self.end_of_media(number),
                Err(e) => {
                    return Err(PlayoutError::producer(format!(
                        "ffmpeg read failed: {e}"
                    )));
                }
            }

            let frame = self.factory.create_frame(&desc, &[&buf])?;
            let epoch = self.epoch.load(Ordering::Acquire);
            self.out.send(DecodeItem::Frame {
                frame,
                number,
                epoch,
            })?;
            number += 1;
        }
    }

    fn end_of_media(&mut self, number: u64) -> PlayoutResult<WorkerStep> {
        if self.looping {
            return Ok(WorkerStep::Restart(self.start));
        }
        let epoch = self.epoch.load(Ordering::Acquire);
        self.out.send(DecodeItem::Eof { epoch })?;
        // Past the end the worker only serves commands; a seek revives it.
        loop {
            match self.commands.recv() {
                Ok(cmd) => {
                    if let Some(step) = self.apply_command(cmd, number)? {
                        return Ok(step);
                    }
                }
                Err(_) => return Ok(WorkerStep::Stop),
            }
        }
    }

    fn drain_commands(&mut self, number: u64) -> PlayoutResult<Option<WorkerStep>> {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => {
                    if let Some(step) = self.apply_command(cmd, number)? {
                        return Ok(Some(step));
                    }
                }
                Err(crossbeam_channel::TryRecvError::Empty) => return Ok(None),
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    return Ok(Some(WorkerStep::Stop));
                }
            }
        }
    }

    fn apply_command(
        &mut self,
        cmd: MediaCommand,
        number: u64,
    ) -> PlayoutResult<Option<WorkerStep>> {
        match cmd {
            MediaCommand::Loop(flag, reply) => {
                if let Some(flag) = flag {
                    self.looping = flag;
                    self.info.lock().expect("media info lock poisoned").looping = flag;
                }
                reply.set(Ok(self.looping.to_string()));
                Ok(None)
            }
            MediaCommand::Seek(target, reply) => {
                let frame = match target {
                    SeekTarget::Frame(f) => f,
                    SeekTarget::In => self.start,
                    SeekTarget::Out => self
                        .length
                        .map(|l| self.start.saturating_add(l))
                        .or(self.total)
                        .unwrap_or(0),
                    SeekTarget::End => self.total.unwrap_or(0),
                };
                self.epoch.fetch_add(1, Ordering::AcqRel);
                reply.set(Ok(frame.to_string()));
                Ok(Some(WorkerStep::Restart(frame)))
            }
            MediaCommand::In(value, reply) => {
                if let Some(v) = value {
                    self.start = v;
                }
                reply.set(Ok(self.start.to_string()));
                Ok(None)
            }
            MediaCommand::Out(value, reply) => {
                if let Some(v) = value {
                    self.length = Some(v.saturating_sub(self.start));
                }
                let out = self
                    .length
                    .map(|l| self.start.saturating_add(l))
                    .or(self.total)
                    .unwrap_or(0);
                reply.set(Ok(out.to_string()));
                Ok(None)
            }
            MediaCommand::Length(value, reply) => {
                if let Some(v) = value {
                    self.length = Some(v);
                }
                let len = self.length.or(self.total).unwrap_or(0);
                reply.set(Ok(len.to_string()));
                Ok(None)
            }
            MediaCommand::Deinterlace(enable) => {
                if enable != self.deinterlace {
                    self.deinterlace = enable;
                    self.epoch.fetch_add(1, Ordering::AcqRel);
                    return Ok(Some(WorkerStep::Restart(number)));
                }
                Ok(None)
            }
        }
    }
}

// A trailing partial frame counts as end-of-stream.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
