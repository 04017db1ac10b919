use crate::frame::draw_frame::DrawFrame;
use crate::producer::{Producer, ReceiveFlags, empty_producer};

/// Playback state of one compositing slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerState {
    /// No producer loaded.
    Empty,
    /// A producer is loaded but not showing; `receive` is empty.
    Stopped,
    /// Pulling one frame per tick from the foreground producer.
    Playing,
    /// Frozen; `receive` repeats the last frame.
    Paused,
}

/// One compositing slot: a foreground producer, an optional queued
/// background producer, and the playback state machine between them.
///
/// All transitions are no-fail: a producer error clears the layer back to
/// `Empty` and is logged, never propagated to the stage tick.
pub struct Layer {
    index: i32,
    foreground: Box<dyn Producer>,
    background: Option<Box<dyn Producer>>,
    state: LayerState,
    auto_play_delta: Option<u32>,
    frame_number: u32,
    last_frame: DrawFrame,
}

impl Layer {
    /// Create an empty layer.
    pub fn new(index: i32) -> Self {
        Self {
            index,
            foreground: empty_producer(),
            background: None,
            state: LayerState::Empty,
            auto_play_delta: None,
            frame_number: 0,
            last_frame: DrawFrame::empty(),
        }
    }

    /// The slot index within the stage.
    pub fn index(&self) -> i32 {
        self.index
    }

    /// Current state.
    pub fn state(&self) -> LayerState {
        self.state
    }

    /// Load a producer.
    ///
    /// With no foreground present the producer lands in the foreground:
    /// stopped by default, or paused on its first frame when `preview` is
    /// set. Otherwise it queues in the background and `auto_play_delta`
    /// (when given) promotes it that many frames before the foreground runs
    /// out.
    pub fn load(&mut self, producer: Box<dyn Producer>, preview: bool, auto_play_delta: Option<u32>) {
        if self.state == LayerState::Empty {
            self.foreground = producer;
            self.frame_number = 0;
            self.last_frame = DrawFrame::empty();
            if preview {
                self.state = LayerState::Playing;
                let first = self.receive(ReceiveFlags::NONE);
                self.last_frame = first;
                self.state = LayerState::Paused;
            } else {
                self.state = LayerState::Stopped;
            }
            return;
        }

        if let Some(old) = self.background.replace(producer) {
            drop(old);
        }
        self.auto_play_delta = auto_play_delta;
    }

    /// Start or resume playback; a queued background promotes first.
    pub fn play(&mut self) {
        if self.background.is_some() {
            self.promote_background();
        }
        if self.state != LayerState::Empty {
            self.state = LayerState::Playing;
        }
    }

    /// Freeze on the current frame.
    pub fn pause(&mut self) {
        if self.state == LayerState::Playing {
            self.state = LayerState::Paused;
        }
    }

    /// Stop showing; `receive` returns the empty frame until `play`.
    pub fn stop(&mut self) {
        if self.state != LayerState::Empty {
            self.state = LayerState::Stopped;
            self.last_frame = DrawFrame::empty();
        }
    }

    /// Release both producers and return to `Empty`.
    pub fn clear(&mut self) {
        self.foreground.abort();
        self.foreground = empty_producer();
        if let Some(mut bg) = self.background.take() {
            bg.abort();
        }
        self.state = LayerState::Empty;
        self.auto_play_delta = None;
        self.frame_number = 0;
        self.last_frame = DrawFrame::empty();
    }

    /// Pull the frame for this tick.
    pub fn receive(&mut self, flags: ReceiveFlags) -> DrawFrame {
        match self.state {
            LayerState::Empty | LayerState::Stopped => DrawFrame::empty(),
            LayerState::Paused => self.last_frame.clone(),
            LayerState::Playing => {
                // Auto-play: hand over before the foreground runs dry.
                if let Some(delta) = self.auto_play_delta
                    && self.background.is_some()
                {
                    let total = self.foreground.nb_frames();
                    if total != u32::MAX && total.saturating_sub(self.frame_number) <= delta {
                        self.promote_background();
                    }
                }

                match self.foreground.receive(flags) {
                    Err(e) => {
                        tracing::error!(layer = self.index, error = %e, "producer failed; clearing layer");
                        self.clear();
                        DrawFrame::empty()
                    }
                    Ok(frame) if frame.is_eof() => {
                        if self.background.is_some() {
                            self.promote_background();
                            match self.foreground.receive(flags) {
                                Ok(frame) if !frame.is_eof() && !frame.is_empty() => {
                                    self.frame_number += 1;
                                    self.last_frame = frame.clone();
                                    frame
                                }
                                _ => self.last_frame.clone(),
                            }
                        } else {
                            // Finished media cannot resume; release it now.
                            self.foreground.abort();
                            self.foreground = empty_producer();
                            self.state = LayerState::Stopped;
                            self.last_frame = DrawFrame::empty();
                            DrawFrame::empty()
                        }
                    }
                    Ok(frame) if frame.is_empty() => {
                        // Transient underflow; repeat the previous frame.
                        self.last_frame.clone()
                    }
                    Ok(frame) => {
                        self.frame_number += 1;
                        self.last_frame = frame.clone();
                        frame
                    }
                }
            }
        }
    }

    /// Async command to the foreground or background producer.
    pub fn call(
        &mut self,
        foreground: bool,
        params: &[String],
    ) -> crate::foundation::executor::TaskFuture<crate::foundation::error::PlayoutResult<String>>
    {
        if foreground {
            self.foreground.call(params)
        } else if let Some(bg) = self.background.as_mut() {
            bg.call(params)
        } else {
            crate::foundation::executor::TaskFuture::ready(Err(
                crate::foundation::error::PlayoutError::validation("no background producer"),
            ))
        }
    }

    /// Description of the foreground producer.
    pub fn foreground_info(&self) -> serde_json::Value {
        self.foreground.info()
    }

    /// Description of the queued background producer, if any.
    pub fn background_info(&self) -> serde_json::Value {
        self.background
            .as_ref()
            .map(|p| p.info())
            .unwrap_or(serde_json::Value::Null)
    }

    /// Structured state dump for the control surface.
    pub fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "index": self.index,
            "state": self.state,
            "frame-number": self.frame_number,
            "nb-frames": self.foreground.nb_frames(),
            "foreground": self.foreground.info(),
            "background": self.background_info(),
        })
    }

    fn promote_background(&mut self) {
        if let Some(bg) = self.background.take() {
            let mut old = std::mem::replace(&mut self.foreground, bg);
            old.abort();
            self.frame_number = 0;
            self.auto_play_delta = None;
            self.state = LayerState::Playing;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stage/layer.rs"]
mod tests;
