//! Owner of numbered channels sharing one GPU context.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::channel::Channel;
use crate::diag::MetricSink;
use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::format::VideoFormat;
use crate::mixer::GpuContext;

/// A set of output channels, one pipeline per video format.
pub struct Server {
    gpu: Arc<GpuContext>,
    metrics: Arc<dyn MetricSink>,
    channels: Mutex<BTreeMap<i32, Arc<Channel>>>,
}

impl Server {
    /// Create a server drawing through the given device context.
    pub fn new(gpu: Arc<GpuContext>, metrics: Arc<dyn MetricSink>) -> Self {
        Self {
            gpu,
            metrics,
            channels: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a channel under `index` for a named format (e.g. `1080i50`).
    pub fn add_channel(&self, index: i32, format_name: &str) -> PlayoutResult<Arc<Channel>> {
        let format = VideoFormat::find(format_name).ok_or_else(|| {
            PlayoutError::validation(format!("unknown video format '{format_name}'"))
        })?;
        let mut channels = self.channels.lock().expect("server channels lock poisoned");
        if channels.contains_key(&index) {
            return Err(PlayoutError::validation(format!(
                "channel {index} already exists"
            )));
        }
        let channel = Channel::new(format, self.gpu.clone(), self.metrics.clone());
        channels.insert(index, channel.clone());
        Ok(channel)
    }

    /// Look up a channel.
    pub fn channel(&self, index: i32) -> Option<Arc<Channel>> {
        self.channels
            .lock()
            .expect("server channels lock poisoned")
            .get(&index)
            .cloned()
    }

    /// Tear down a channel.
    pub fn remove_channel(&self, index: i32) -> bool {
        self.channels
            .lock()
            .expect("server channels lock poisoned")
            .remove(&index)
            .is_some()
    }

    /// Structured description of every channel.
    pub fn info(&self) -> PlayoutResult<serde_json::Value> {
        let channels = self.channels.lock().expect("server channels lock poisoned");
        let mut out = Vec::with_capacity(channels.len());
        for (index, channel) in channels.iter() {
            out.push(serde_json::json!({
                "index": index,
                "info": channel.info()?,
            }));
        }
        Ok(serde_json::Value::Array(out))
    }
}
