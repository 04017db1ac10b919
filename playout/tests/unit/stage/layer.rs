use super::*;
use crate::foundation::error::{PlayoutError, PlayoutResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Producer serving `total` numbered dummy frames, then eof once, then empty.
struct CountedProducer {
    total: u32,
    served: u32,
    eof_sent: bool,
    receives: Arc<AtomicU32>,
    aborted: Arc<AtomicBool>,
}

impl CountedProducer {
    fn new(total: u32) -> (Self, Arc<AtomicU32>, Arc<AtomicBool>) {
        let receives = Arc::new(AtomicU32::new(0));
        let aborted = Arc::new(AtomicBool::new(false));
        (
            Self {
                total,
                served: 0,
                eof_sent: false,
                receives: receives.clone(),
                aborted: aborted.clone(),
            },
            receives,
            aborted,
        )
    }

    fn frame() -> DrawFrame {
        // A frame that is neither empty nor eof; no textures needed.
        DrawFrame::composite(vec![])
    }
}

impl Producer for CountedProducer {
    fn receive(&mut self, _flags: ReceiveFlags) -> PlayoutResult<DrawFrame> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        if self.served < self.total {
            self.served += 1;
            Ok(Self::frame())
        } else if !self.eof_sent {
            self.eof_sent = true;
            Ok(DrawFrame::eof())
        } else {
            Ok(DrawFrame::empty())
        }
    }

    fn name(&self) -> &str {
        "counted"
    }

    fn nb_frames(&self) -> u32 {
        self.total
    }

    fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

struct FailingProducer;

impl Producer for FailingProducer {
    fn receive(&mut self, _flags: ReceiveFlags) -> PlayoutResult<DrawFrame> {
        Err(PlayoutError::producer("boom"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[test]
fn empty_layer_receives_empty() {
    let mut layer = Layer::new(10);
    assert_eq!(layer.state(), LayerState::Empty);
    assert!(layer.receive(ReceiveFlags::NONE).is_empty());
}

#[test]
fn load_without_preview_is_stopped_until_play() {
    let (p, receives, _) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(p), false, None);
    assert_eq!(layer.state(), LayerState::Stopped);
    assert!(layer.receive(ReceiveFlags::NONE).is_empty());
    assert_eq!(receives.load(Ordering::SeqCst), 0);

    layer.play();
    assert_eq!(layer.state(), LayerState::Playing);
    assert!(!layer.receive(ReceiveFlags::NONE).is_empty());
}

#[test]
fn preview_load_pauses_on_first_frame() {
    let (p, receives, _) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(p), true, None);
    assert_eq!(layer.state(), LayerState::Paused);
    assert_eq!(receives.load(Ordering::SeqCst), 1);

    // Paused repeats without pulling again.
    let f = layer.receive(ReceiveFlags::NONE);
    assert!(!f.is_empty());
    assert_eq!(receives.load(Ordering::SeqCst), 1);
}

#[test]
fn load_play_stop_roundtrip_emits_empty() {
    let (p, _, _) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(p), false, None);
    layer.play();
    assert!(!layer.receive(ReceiveFlags::NONE).is_empty());
    layer.stop();
    assert!(layer.receive(ReceiveFlags::NONE).is_empty());
}

#[test]
fn pause_repeats_last_frame_and_play_resumes() {
    let (p, receives, _) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(p), false, None);
    layer.play();
    layer.receive(ReceiveFlags::NONE);
    layer.pause();
    layer.receive(ReceiveFlags::NONE);
    layer.receive(ReceiveFlags::NONE);
    assert_eq!(receives.load(Ordering::SeqCst), 1);
    layer.play();
    layer.receive(ReceiveFlags::NONE);
    assert_eq!(receives.load(Ordering::SeqCst), 2);
}

#[test]
fn second_load_queues_background_and_play_promotes() {
    let (a, a_receives, _) = CountedProducer::new(10);
    let (b, b_receives, _) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(a), false, None);
    layer.play();
    layer.receive(ReceiveFlags::NONE);

    layer.load(Box::new(b), false, None);
    // Background is queued; foreground still feeds the output.
    layer.receive(ReceiveFlags::NONE);
    assert_eq!(a_receives.load(Ordering::SeqCst), 2);
    assert_eq!(b_receives.load(Ordering::SeqCst), 0);

    layer.play();
    layer.receive(ReceiveFlags::NONE);
    assert_eq!(b_receives.load(Ordering::SeqCst), 1);
}

#[test]
fn eof_without_background_stops_and_releases_producer() {
    let (p, _, aborted) = CountedProducer::new(2);
    let mut layer = Layer::new(10);
    layer.load(Box::new(p), false, None);
    layer.play();
    layer.receive(ReceiveFlags::NONE);
    layer.receive(ReceiveFlags::NONE);
    // Third pull hits eof: layer stops and emits empty.
    assert!(layer.receive(ReceiveFlags::NONE).is_empty());
    assert_eq!(layer.state(), LayerState::Stopped);
    assert!(aborted.load(Ordering::SeqCst));
}

#[test]
fn eof_with_background_promotes_without_empty_frames() {
    let (a, _, _) = CountedProducer::new(2);
    let (b, b_receives, _) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(a), false, None);
    layer.play();
    layer.load(Box::new(b), false, None);

    for _ in 0..6 {
        assert!(
            !layer.receive(ReceiveFlags::NONE).is_empty(),
            "no empty frames across the handover"
        );
    }
    assert!(b_receives.load(Ordering::SeqCst) >= 1);
}

#[test]
fn auto_play_delta_promotes_before_foreground_runs_out() {
    let (a, _, _) = CountedProducer::new(20);
    let (b, b_receives, _) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(a), false, None);
    layer.play();
    // B takes over when A has <= 5 frames remaining, i.e. after 15 pulls.
    layer.load(Box::new(b), false, Some(5));

    for _ in 0..15 {
        layer.receive(ReceiveFlags::NONE);
    }
    assert_eq!(b_receives.load(Ordering::SeqCst), 0);
    layer.receive(ReceiveFlags::NONE);
    assert_eq!(b_receives.load(Ordering::SeqCst), 1);
}

#[test]
fn clear_releases_producers_and_never_pulls_again() {
    let (p, receives, aborted) = CountedProducer::new(10);
    let mut layer = Layer::new(10);
    layer.load(Box::new(p), false, None);
    layer.play();
    layer.receive(ReceiveFlags::NONE);
    layer.clear();
    assert_eq!(layer.state(), LayerState::Empty);
    assert!(aborted.load(Ordering::SeqCst));

    let before = receives.load(Ordering::SeqCst);
    layer.receive(ReceiveFlags::NONE);
    assert_eq!(receives.load(Ordering::SeqCst), before);
}

#[test]
fn producer_error_clears_layer_and_returns_empty() {
    let mut layer = Layer::new(10);
    layer.load(Box::new(FailingProducer), false, None);
    layer.play();
    assert!(layer.receive(ReceiveFlags::NONE).is_empty());
    assert_eq!(layer.state(), LayerState::Empty);
}

#[test]
fn transient_empty_repeats_previous_frame() {
    struct Stutter {
        tick: u32,
    }
    impl Producer for Stutter {
        fn receive(&mut self, _flags: ReceiveFlags) -> PlayoutResult<DrawFrame> {
            self.tick += 1;
            if self.tick % 2 == 0 {
                Ok(DrawFrame::empty())
            } else {
                Ok(DrawFrame::composite(vec![]))
            }
        }
        fn name(&self) -> &str {
            "stutter"
        }
    }

    let mut layer = Layer::new(10);
    layer.load(Box::new(Stutter { tick: 0 }), false, None);
    layer.play();
    assert!(!layer.receive(ReceiveFlags::NONE).is_empty());
    // Underflow tick: previous frame is repeated rather than going blank.
    assert!(!layer.receive(ReceiveFlags::NONE).is_empty());
}
