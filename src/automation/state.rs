//! Scan state machine.
//!
//! The engine walks the Hall of Fame list one position per step:
//! Idle → WaitingStart (countdown) → Scanning → Stopped(reason)
//!
//! Each Scanning step settles, acquires a fresh view (nudging the game once
//! if the view did not redraw), samples the panel a few more times, flags the
//! position when the samples differ, then moves one entry on. Cancellation is
//! polled before anything that sends keys or records a result.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::automation::abort::CancelSignal;
use crate::automation::config::{AnomalyConfig, ScanConfig};
use crate::automation::detection::{difference_score, Snapshot};
use crate::automation::diagnostics::{NoopObserver, ScanObserver, StepReport};
use crate::automation::guard::AnomalyGuard;
use crate::automation::input::{Direction, InputDriver};
use crate::automation::results::ResultSink;
use crate::automation::sampler::FrameSampler;
use crate::automation::timing::{Pacer, ThreadPacer, Timings};

/// 1-based index into the ranked player list.
pub type Position = i64;

/// Samples taken after the baseline when checking one position.
pub const EXTRA_SAMPLES: usize = 3;

/// Advance/retreat pairs sent when a view did not redraw.
pub const NUDGE_PAIRS: usize = 3;

/// Why a scan ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Operator held an exit key
    UserCancelled,
    /// Findings piled up in an implausible pattern
    AnomalyDetected,
    /// `scan_limit` steps were taken
    Exhausted,
    /// Position dropped below the configured floor
    PositionFloorReached,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::UserCancelled => write!(f, "User exits script"),
            StopReason::AnomalyDetected => {
                write!(f, "Too many players with new scrap in row found")
            }
            StopReason::Exhausted => write!(f, "Scan limit reached"),
            StopReason::PositionFloorReached => write!(f, "Reached the top of the list"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    /// Countdown before the first capture
    WaitingStart,
    Scanning,
    Stopped(StopReason),
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanState::Idle => write!(f, "Idle"),
            ScanState::WaitingStart => write!(f, "Waiting to start"),
            ScanState::Scanning => write!(f, "Scanning"),
            ScanState::Stopped(reason) => write!(f, "Stopped: {}", reason),
        }
    }
}

/// Settings for one scan, resolved from config and operator prompts.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanParams {
    pub start: Position,
    pub direction: Direction,
    /// A position is flagged when the largest sample difference exceeds this
    pub diff_limit: f64,
    /// Maximum number of evaluated positions
    pub scan_limit: u32,
    /// Lowest position that is still evaluated
    pub position_floor: Position,
    /// Below this score the new view counts as not redrawn
    pub stale_threshold: f64,
    pub countdown_secs: u32,
    pub timings: Timings,
    pub anomaly: AnomalyConfig,
}

impl ScanParams {
    pub fn from_config(config: &ScanConfig, start: Position, direction: Direction) -> Self {
        Self {
            start,
            direction,
            diff_limit: config.diff_limit,
            scan_limit: config.scan_limit,
            position_floor: config.position_floor,
            stale_threshold: config.stale_threshold,
            countdown_secs: config.countdown_secs,
            timings: Timings::for_speed(config.speed),
            anomaly: config.anomaly.clone(),
        }
    }
}

/// Result of the multi-sample check of one position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleOutcome {
    pub max_diff: f64,
    /// Snapshots compared, baseline included
    pub samples: usize,
}

/// Compares up to `extra` new snapshots against the baseline and each other.
///
/// Every new snapshot is scored against all earlier ones. Both comparing and
/// sampling stop at the first score above `limit`, which is then returned.
pub fn max_pairwise_difference(
    baseline: &Snapshot,
    extra: usize,
    limit: f64,
    mut next: impl FnMut() -> Result<Snapshot>,
) -> Result<SampleOutcome> {
    let mut taken: Vec<Snapshot> = Vec::with_capacity(extra);
    let mut max_diff = 0.0_f64;

    for _ in 0..extra {
        let sample = next()?;
        let mut exceeded = false;
        for previous in std::iter::once(baseline).chain(taken.iter()) {
            max_diff = max_diff.max(difference_score(previous, &sample)?);
            if max_diff > limit {
                exceeded = true;
                break;
            }
        }
        taken.push(sample);
        if exceeded {
            break;
        }
    }

    Ok(SampleOutcome {
        max_diff,
        samples: taken.len() + 1,
    })
}

/// Outcome of `retry_once`.
#[derive(Debug, PartialEq)]
pub enum Attempt<T> {
    /// The first value was accepted
    First(T),
    /// Value of the second attempt, accepted or not
    Retried { value: T, accepted: bool },
    /// Recovery declined to run
    Abandoned,
}

/// Runs `attempt`, and when `accept` rejects the value runs `recover` once
/// and attempts again. There is never a third attempt.
pub fn retry_once<S, T>(
    state: &mut S,
    mut attempt: impl FnMut(&mut S) -> Result<T>,
    accept: impl Fn(&S, &T) -> Result<bool>,
    recover: impl FnOnce(&mut S) -> Result<bool>,
) -> Result<Attempt<T>> {
    let first = attempt(state)?;
    if accept(state, &first)? {
        return Ok(Attempt::First(first));
    }
    if !recover(state)? {
        return Ok(Attempt::Abandoned);
    }
    let value = attempt(state)?;
    let accepted = accept(state, &value)?;
    Ok(Attempt::Retried { value, accepted })
}

/// Nudges the list so the game redraws the selected entry.
///
/// Sends `NUDGE_PAIRS` advance/retreat pairs, which leaves the selection
/// where it was.
pub fn nudge(input: &mut dyn InputDriver, pacer: &mut dyn Pacer, timings: &Timings) -> Result<()> {
    for _ in 0..NUDGE_PAIRS {
        pacer.pause(timings.nudge_pulse);
        input.press(Direction::Advance)?;
        pacer.pause(timings.nudge_pulse);
        input.press(Direction::Retreat)?;
    }
    Ok(())
}

/// Drives one scan from countdown to stop.
pub struct ScanEngine {
    pub state: ScanState,
    pub params: ScanParams,
    /// Position currently selected in the game
    pub position: Position,
    /// Positions fully evaluated so far
    pub steps_taken: u32,
    /// Baseline snapshot of the previous position
    pub old_image: Option<Snapshot>,
    /// Flagged positions in discovery order
    pub found: Vec<Position>,
    sampler: FrameSampler,
    input: Box<dyn InputDriver>,
    sink: Box<dyn ResultSink>,
    cancel: Box<dyn CancelSignal>,
    pacer: Box<dyn Pacer>,
    guard: AnomalyGuard,
    observer: Arc<dyn ScanObserver>,
}

impl ScanEngine {
    pub fn new(
        params: ScanParams,
        sampler: FrameSampler,
        input: Box<dyn InputDriver>,
        sink: Box<dyn ResultSink>,
        cancel: Box<dyn CancelSignal>,
    ) -> Self {
        Self {
            state: ScanState::Idle,
            position: params.start,
            guard: AnomalyGuard::new(&params.anomaly),
            params,
            steps_taken: 0,
            old_image: None,
            found: Vec::new(),
            sampler,
            input,
            sink,
            cancel,
            pacer: Box::new(ThreadPacer),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_pacer(mut self, pacer: Box<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `Ok(false)` once the scan has stopped. Capture and input
    /// failures are returned as errors; result file failures are not.
    pub fn step(&mut self) -> Result<bool> {
        match self.state {
            ScanState::Idle => {
                self.observer.debug(&format!(
                    "Scan from {} going {} (limit {}, diff {})",
                    self.params.start,
                    self.params.direction,
                    self.params.scan_limit,
                    self.params.diff_limit
                ));
                self.state = ScanState::WaitingStart;
                Ok(true)
            }
            ScanState::WaitingStart => {
                for seconds_left in (1..=self.params.countdown_secs).rev() {
                    self.observer.countdown(self.params.start, seconds_left);
                    self.pacer.pause(self.params.timings.countdown_tick);
                }
                self.state = ScanState::Scanning;
                Ok(true)
            }
            ScanState::Scanning => self.scan_position(),
            ScanState::Stopped(_) => Ok(false),
        }
    }

    /// Runs until the scan stops and returns why.
    pub fn run(&mut self) -> Result<StopReason> {
        while self.step()? {}
        let ScanState::Stopped(reason) = self.state else {
            bail!("Scan ended in state {}", self.state);
        };
        self.observer.stopped(reason, &self.found);
        Ok(reason)
    }

    fn stop(&mut self, reason: StopReason) -> bool {
        self.observer.debug(&format!("{} at position {}", reason, self.position));
        self.state = ScanState::Stopped(reason);
        false
    }

    fn limit_reached(&self) -> Option<StopReason> {
        if self.steps_taken >= self.params.scan_limit {
            Some(StopReason::Exhausted)
        } else if self.position < self.params.position_floor {
            Some(StopReason::PositionFloorReached)
        } else {
            None
        }
    }

    /// True when `snapshot` barely differs from the previous position's view.
    fn is_stale(&self, snapshot: &Snapshot) -> Result<bool> {
        match &self.old_image {
            Some(old) => Ok(difference_score(old, snapshot)? < self.params.stale_threshold),
            None => Ok(false),
        }
    }

    /// Captures the current position, nudging once if the view is stale.
    ///
    /// Returns `None` when cancelled before the nudge.
    fn acquire_fresh(&mut self) -> Result<Option<Snapshot>> {
        let attempt = retry_once(
            self,
            |engine| engine.sampler.sample(),
            |engine, snapshot| Ok(!engine.is_stale(snapshot)?),
            |engine| engine.redraw(),
        )?;
        match attempt {
            Attempt::First(snapshot) => Ok(Some(snapshot)),
            Attempt::Retried { value, accepted } => {
                if !accepted {
                    self.observer.debug(&format!(
                        "Player {} still not refreshed, continuing",
                        self.position
                    ));
                }
                Ok(Some(value))
            }
            Attempt::Abandoned => Ok(None),
        }
    }

    /// Nudges the game after a stale capture. Returns false when cancelled.
    fn redraw(&mut self) -> Result<bool> {
        self.observer
            .debug(&format!("Player {} is not refreshed", self.position));
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        let timings = self.params.timings;
        nudge(self.input.as_mut(), self.pacer.as_mut(), &timings)?;
        self.pacer.pause(timings.nudge_settle);
        Ok(true)
    }

    fn scan_position(&mut self) -> Result<bool> {
        if let Some(reason) = self.limit_reached() {
            return Ok(self.stop(reason));
        }
        if self.cancel.is_cancelled() {
            return Ok(self.stop(StopReason::UserCancelled));
        }

        self.pacer.pause(self.params.timings.settle);

        let Some(baseline) = self.acquire_fresh()? else {
            return Ok(self.stop(StopReason::UserCancelled));
        };

        let timings = self.params.timings;
        let sampler = &mut self.sampler;
        let pacer = &mut self.pacer;
        let outcome = max_pairwise_difference(
            &baseline,
            EXTRA_SAMPLES,
            self.params.diff_limit,
            || {
                pacer.pause(timings.sample_interval);
                let sample = sampler.sample()?;
                pacer.pause(timings.sample_interval);
                Ok(sample)
            },
        )?;
        self.old_image = Some(baseline);

        self.observer.debug(&format!(
            "Player {} - {} samples, max difference {:.2}",
            self.position, outcome.samples, outcome.max_diff
        ));

        if self.cancel.is_cancelled() {
            return Ok(self.stop(StopReason::UserCancelled));
        }

        if outcome.max_diff > self.params.diff_limit {
            self.record(self.position);
        }

        self.observer.step_finished(&StepReport {
            position: self.position,
            step: self.steps_taken,
            max_diff: outcome.max_diff,
            found: &self.found,
        });

        if self.guard.check(&self.found) {
            return Ok(self.stop(StopReason::AnomalyDetected));
        }

        self.input.press(self.params.direction)?;
        self.position += self.params.direction.delta();
        self.steps_taken += 1;
        Ok(true)
    }

    fn record(&mut self, position: Position) {
        self.found.push(position);
        self.observer.position_found(position);
        if let Err(e) = self.sink.append(position) {
            self.observer
                .warn(&format!("Failed to save position {}: {:#}", position, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::abort::AbortFlag;
    use crate::automation::sampler::RegionExtractor;
    use crate::capture::{CaptureSource, CropBox, ScreenRect};
    use anyhow::anyhow;
    use image::{Rgb, RgbImage};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::rc::Rc;
    use std::sync::Mutex;
    use std::time::Duration;

    const SIDE: u32 = 40;
    /// Pixels repainted on alternate grabs at a position with new scrap;
    /// scores about 5.0 against the plain view
    const FLICKER_PIXELS: u32 = 57;
    /// Large repaint; scores about 70 against the plain view
    const FLASH_PIXELS: u32 = 800;

    /// Simulated Hall of Fame list. Key presses move the selection, captures
    /// render the selected entry.
    #[derive(Default)]
    struct FakeGame {
        position: Position,
        presses: Vec<Direction>,
        grabs: usize,
        grabs_at: HashMap<Position, usize>,
        /// Entries whose panel flickers between grabs
        flicker: HashSet<Position>,
        /// Entries whose panel flashes a large area between grabs
        flash: HashSet<Position>,
        /// Entries that show the plain view of the previous entry until nudged
        stale_until_nudged: HashSet<Position>,
        /// Entry the selection was on before the last press
        came_from: Option<Position>,
        /// Raises the flag when the n-th grab happens (1-based)
        abort_on_grab: Option<(usize, AbortFlag)>,
        fail_capture: bool,
    }

    /// Unchanging view of entry `p`; neighbours always score above 50.
    fn plain_view(p: Position) -> RgbImage {
        let gray = ((p.rem_euclid(200)) * 7 % 200 + 20) as u8;
        RgbImage::from_pixel(SIDE, SIDE, Rgb([gray, gray, gray]))
    }

    fn paint(img: &mut RgbImage, pixels: u32) {
        for i in 0..pixels {
            img.put_pixel(i % SIDE, i / SIDE, Rgb([255, 255, 255]));
        }
    }

    impl FakeGame {
        fn render(&mut self) -> RgbImage {
            let p = self.position;
            let count = self.grabs_at.entry(p).or_insert(0);
            let nth = *count;
            *count += 1;

            let mut img = plain_view(p);
            if nth % 2 == 1 {
                if self.flash.contains(&p) {
                    paint(&mut img, FLASH_PIXELS);
                } else if self.flicker.contains(&p) {
                    paint(&mut img, FLICKER_PIXELS);
                }
            }
            img
        }
    }

    struct FakeCapture(Rc<RefCell<FakeGame>>);

    impl CaptureSource for FakeCapture {
        fn grab(&mut self, _rect: &ScreenRect) -> Result<RgbImage> {
            let mut game = self.0.borrow_mut();
            if game.fail_capture {
                return Err(anyhow!("display unavailable"));
            }
            game.grabs += 1;
            if let Some((n, flag)) = &game.abort_on_grab {
                if *n == game.grabs {
                    flag.request_abort();
                }
            }
            let p = game.position;
            let stale = game.stale_until_nudged.contains(&p);
            match game.came_from {
                Some(previous) if stale => Ok(plain_view(previous)),
                _ => Ok(game.render()),
            }
        }
    }

    struct FakeInput(Rc<RefCell<FakeGame>>);

    impl InputDriver for FakeInput {
        fn press(&mut self, direction: Direction) -> Result<()> {
            let mut game = self.0.borrow_mut();
            let p = game.position;
            // Any movement off a stale entry forces a redraw on return
            if direction == Direction::Advance {
                game.stale_until_nudged.remove(&p);
            }
            game.presses.push(direction);
            game.came_from = Some(p);
            game.position += direction.delta();
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MemorySink(Rc<RefCell<Vec<Position>>>);

    impl ResultSink for MemorySink {
        fn append(&mut self, position: Position) -> Result<()> {
            self.0.borrow_mut().push(position);
            Ok(())
        }
    }

    struct BrokenSink;

    impl ResultSink for BrokenSink {
        fn append(&mut self, _position: Position) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingPacer(Rc<RefCell<Vec<Duration>>>);

    impl Pacer for RecordingPacer {
        fn pause(&mut self, duration: Duration) {
            self.0.borrow_mut().push(duration);
        }
    }

    #[derive(Default)]
    struct Recorder {
        warnings: Mutex<Vec<String>>,
        stopped: Mutex<Option<StopReason>>,
    }

    impl ScanObserver for Recorder {
        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }

        fn stopped(&self, reason: StopReason, _found: &[Position]) {
            *self.stopped.lock().unwrap() = Some(reason);
        }
    }

    fn params(start: Position, direction: Direction, scan_limit: u32) -> ScanParams {
        ScanParams {
            start,
            direction,
            diff_limit: 3.0,
            scan_limit,
            position_floor: 1,
            stale_threshold: 50.0,
            countdown_secs: 0,
            timings: Timings::zero(),
            anomaly: AnomalyConfig::default(),
        }
    }

    fn engine(
        game: &Rc<RefCell<FakeGame>>,
        params: ScanParams,
        sink: Box<dyn ResultSink>,
        cancel: AbortFlag,
    ) -> ScanEngine {
        game.borrow_mut().position = params.start;
        let sampler = FrameSampler::new(
            Box::new(FakeCapture(game.clone())),
            ScreenRect::new(0, 0, SIDE as i32, SIDE as i32),
            RegionExtractor::new(CropBox::default()),
            Arc::new(NoopObserver),
        );
        ScanEngine::new(
            params,
            sampler,
            Box::new(FakeInput(game.clone())),
            sink,
            Box::new(cancel),
        )
        .with_pacer(Box::new(RecordingPacer::default()))
    }

    fn snapshot(gray: u8, painted: u32) -> Snapshot {
        let mut img = RgbImage::from_pixel(SIDE, SIDE, Rgb([gray, gray, gray]));
        paint(&mut img, painted);
        Snapshot::new(img)
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", ScanState::Idle), "Idle");
        assert_eq!(
            format!("{}", ScanState::Stopped(StopReason::UserCancelled)),
            "Stopped: User exits script"
        );
    }

    #[test]
    fn test_fake_views_are_distinct_and_flicker_scores_above_limit() {
        let a = snapshot(20, 0);
        let b = snapshot(27, 0);
        assert!(difference_score(&a, &b).unwrap() >= 50.0);

        let flickered = snapshot(20, FLICKER_PIXELS);
        let diff = difference_score(&a, &flickered).unwrap();
        assert!(diff > 3.0 && diff < 6.0, "diff {}", diff);
    }

    #[test]
    fn test_sampling_stops_after_extra_samples() {
        let baseline = snapshot(100, 0);
        let mut calls = 0_i32;
        let outcome = max_pairwise_difference(&baseline, EXTRA_SAMPLES, 3.0, || {
            calls += 1;
            Ok(snapshot(100, 0))
        })
        .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(outcome.samples, 4);
        assert_eq!(outcome.max_diff, 0.0);
    }

    #[test]
    fn test_sampling_short_circuits_above_limit() {
        let baseline = snapshot(100, 0);
        let mut calls = 0_i32;
        let outcome = max_pairwise_difference(&baseline, EXTRA_SAMPLES, 3.0, || {
            calls += 1;
            Ok(snapshot(100, FLICKER_PIXELS))
        })
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(outcome.samples, 2);
        assert!(outcome.max_diff > 3.0);
    }

    #[test]
    fn test_sampling_compares_every_pair() {
        // Only pairs that mix a painted and a plain frame differ
        let frames = vec![snapshot(100, 10), snapshot(100, 0), snapshot(100, 0)];
        let baseline = snapshot(100, 10);
        let mut iter = frames.into_iter();
        let outcome = max_pairwise_difference(&baseline, EXTRA_SAMPLES, 1000.0, || {
            iter.next().ok_or_else(|| anyhow!("out of frames"))
        })
        .unwrap();

        let expected = difference_score(&snapshot(100, 10), &snapshot(100, 0)).unwrap();
        assert!((outcome.max_diff - expected).abs() < 1e-9);
        assert_eq!(outcome.samples, 4);
    }

    #[test]
    fn test_sampling_returns_first_score_above_limit() {
        // The last sample clears the limit against the baseline first; its
        // larger score against the first sample is never computed
        let baseline = snapshot(100, 40);
        let first = snapshot(100, 41);
        let second = snapshot(100, 0);
        let expected = difference_score(&baseline, &second).unwrap();
        assert!(expected > 3.0);
        assert!(difference_score(&first, &second).unwrap() > expected);
        assert!(difference_score(&baseline, &first).unwrap() < 3.0);

        let mut frames = vec![first, second].into_iter();
        let outcome = max_pairwise_difference(&baseline, EXTRA_SAMPLES, 3.0, || {
            frames.next().ok_or_else(|| anyhow!("out of frames"))
        })
        .unwrap();

        assert_eq!(outcome.max_diff, expected);
        assert_eq!(outcome.samples, 3);
    }

    #[test]
    fn test_retry_once_accepts_first() {
        let mut calls = 0_i32;
        let result = retry_once(
            &mut calls,
            |c| {
                *c += 1;
                Ok(*c)
            },
            |_, _| Ok(true),
            |_| Ok(true),
        );
        assert_eq!(result.unwrap(), Attempt::First(1));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_once_never_tries_a_third_time() {
        let mut calls = 0_i32;
        let mut recoveries = 0;
        let result = retry_once(
            &mut calls,
            |c| {
                *c += 1;
                Ok(*c)
            },
            |_, _| Ok(false),
            |_| {
                recoveries += 1;
                Ok(true)
            },
        );
        assert_eq!(
            result.unwrap(),
            Attempt::Retried {
                value: 2,
                accepted: false
            }
        );
        assert_eq!(calls, 2);
        assert_eq!(recoveries, 1);
    }

    #[test]
    fn test_retry_once_abandons_when_recovery_declines() {
        let mut calls = 0_i32;
        let result = retry_once(
            &mut calls,
            |c| {
                *c += 1;
                Ok(*c)
            },
            |_, _| Ok(false),
            |_| Ok(false),
        );
        assert_eq!(result.unwrap(), Attempt::<i32>::Abandoned);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_nudge_sends_pairs_and_returns_to_position() {
        let game = Rc::new(RefCell::new(FakeGame {
            position: 10,
            ..Default::default()
        }));
        let mut input = FakeInput(game.clone());
        let mut pacer = RecordingPacer::default();

        nudge(&mut input, &mut pacer, &Timings::BASE).unwrap();

        let game = game.borrow();
        assert_eq!(game.position, 10);
        assert_eq!(
            game.presses,
            [Direction::Advance, Direction::Retreat].repeat(NUDGE_PAIRS)
        );
        assert_eq!(pacer.0.borrow().len(), NUDGE_PAIRS * 2);
    }

    #[test]
    fn test_scan_finds_flickering_position_and_exhausts() {
        let game = Rc::new(RefCell::new(FakeGame {
            flicker: HashSet::from([94]),
            ..Default::default()
        }));
        let sink = MemorySink::default();
        let mut scan = engine(
            &game,
            params(100, Direction::Retreat, 10),
            Box::new(sink.clone()),
            AbortFlag::new(),
        );

        let reason = scan.run().unwrap();

        assert_eq!(reason, StopReason::Exhausted);
        assert_eq!(scan.found, vec![94]);
        assert_eq!(*sink.0.borrow(), vec![94]);
        assert_eq!(scan.position, 90);
        assert_eq!(scan.steps_taken, 10);
        assert_eq!(scan.state, ScanState::Stopped(StopReason::Exhausted));

        let game = game.borrow();
        assert_eq!(game.presses, vec![Direction::Retreat; 10]);
        // Plain positions take baseline plus all extra samples
        assert_eq!(game.grabs_at[&100], 1 + EXTRA_SAMPLES);
        // The flicker shows on the first extra sample
        assert_eq!(game.grabs_at[&94], 2);
    }

    #[test]
    fn test_stale_view_is_nudged_once() {
        let game = Rc::new(RefCell::new(FakeGame {
            stale_until_nudged: HashSet::from([50]),
            ..Default::default()
        }));
        let mut scan = engine(
            &game,
            params(51, Direction::Retreat, 2),
            Box::new(MemorySink::default()),
            AbortFlag::new(),
        );

        assert_eq!(scan.run().unwrap(), StopReason::Exhausted);
        assert_eq!(scan.position, 49);
        assert!(scan.found.is_empty());

        let game = game.borrow();
        let mut expected = vec![Direction::Retreat];
        expected.extend([Direction::Advance, Direction::Retreat].repeat(NUDGE_PAIRS));
        expected.push(Direction::Retreat);
        assert_eq!(game.presses, expected);
    }

    #[test]
    fn test_stale_check_compares_against_previous_baseline() {
        // 30 ends on a flashed sample; 29 first shows 30's plain baseline
        let game = Rc::new(RefCell::new(FakeGame {
            flash: HashSet::from([30]),
            stale_until_nudged: HashSet::from([29]),
            ..Default::default()
        }));
        let mut p = params(30, Direction::Retreat, 2);
        p.diff_limit = 1000.0;
        let mut scan = engine(&game, p, Box::new(MemorySink::default()), AbortFlag::new());

        assert_eq!(scan.run().unwrap(), StopReason::Exhausted);
        assert!(scan.found.is_empty());

        let game = game.borrow();
        assert_eq!(game.grabs_at[&30], 1 + EXTRA_SAMPLES);
        let mut expected = vec![Direction::Retreat];
        expected.extend([Direction::Advance, Direction::Retreat].repeat(NUDGE_PAIRS));
        expected.push(Direction::Retreat);
        assert_eq!(game.presses, expected);
    }

    #[test]
    fn test_still_stale_after_nudge_proceeds() {
        let game = Rc::new(RefCell::new(FakeGame::default()));
        // Same view everywhere: every position after the first looks stale
        let sampler = FrameSampler::new(
            Box::new(ConstantCapture),
            ScreenRect::new(0, 0, SIDE as i32, SIDE as i32),
            RegionExtractor::new(CropBox::default()),
            Arc::new(NoopObserver),
        );
        let mut scan = ScanEngine::new(
            params(20, Direction::Retreat, 3),
            sampler,
            Box::new(FakeInput(game.clone())),
            Box::new(MemorySink::default()),
            Box::new(AbortFlag::new()),
        )
        .with_pacer(Box::new(RecordingPacer::default()));

        assert_eq!(scan.run().unwrap(), StopReason::Exhausted);
        assert_eq!(scan.position, 17);

        // One nudge for each of the two stale positions, never more
        let presses = &game.borrow().presses;
        let nudges = presses
            .iter()
            .filter(|&&d| d == Direction::Advance)
            .count();
        assert_eq!(nudges, 2 * NUDGE_PAIRS);
        assert_eq!(presses.len(), 3 + 2 * NUDGE_PAIRS * 2);
    }

    struct ConstantCapture;

    impl CaptureSource for ConstantCapture {
        fn grab(&mut self, _rect: &ScreenRect) -> Result<RgbImage> {
            Ok(RgbImage::from_pixel(SIDE, SIDE, Rgb([90, 90, 90])))
        }
    }

    #[test]
    fn test_cancel_mid_step_halts_without_navigation() {
        let cancel = AbortFlag::new();
        let game = Rc::new(RefCell::new(FakeGame {
            flicker: HashSet::from([50]),
            // 50 flickers on its second grab; the flag goes up on 49's first extra sample
            abort_on_grab: Some((4, cancel.clone())),
            ..Default::default()
        }));
        let sink = MemorySink::default();
        let mut scan = engine(
            &game,
            params(50, Direction::Retreat, 100),
            Box::new(sink.clone()),
            cancel,
        );

        assert_eq!(scan.run().unwrap(), StopReason::UserCancelled);
        assert_eq!(scan.found, vec![50]);
        assert_eq!(*sink.0.borrow(), vec![50]);
        assert_eq!(scan.position, 49);
        assert_eq!(scan.steps_taken, 1);
        assert_eq!(game.borrow().presses, vec![Direction::Retreat]);
    }

    #[test]
    fn test_cancel_before_start_takes_no_capture() {
        let cancel = AbortFlag::new();
        cancel.request_abort();
        let game = Rc::new(RefCell::new(FakeGame::default()));
        let mut scan = engine(
            &game,
            params(10, Direction::Advance, 100),
            Box::new(MemorySink::default()),
            cancel,
        );

        assert_eq!(scan.run().unwrap(), StopReason::UserCancelled);
        assert_eq!(game.borrow().grabs, 0);
        assert!(game.borrow().presses.is_empty());
    }

    #[test]
    fn test_floor_stops_scan() {
        let game = Rc::new(RefCell::new(FakeGame::default()));
        let mut scan = engine(
            &game,
            params(3, Direction::Retreat, 100),
            Box::new(MemorySink::default()),
            AbortFlag::new(),
        );

        assert_eq!(scan.run().unwrap(), StopReason::PositionFloorReached);
        assert_eq!(scan.steps_taken, 3);
        assert_eq!(scan.position, 0);
    }

    #[test]
    fn test_advance_direction_counts_up() {
        let game = Rc::new(RefCell::new(FakeGame {
            flicker: HashSet::from([7]),
            ..Default::default()
        }));
        let mut scan = engine(
            &game,
            params(5, Direction::Advance, 4),
            Box::new(MemorySink::default()),
            AbortFlag::new(),
        );

        assert_eq!(scan.run().unwrap(), StopReason::Exhausted);
        assert_eq!(scan.position, 9);
        assert_eq!(scan.found, vec![7]);
        assert_eq!(game.borrow().presses, vec![Direction::Advance; 4]);
    }

    #[test]
    fn test_anomaly_stops_before_moving_on() {
        let game = Rc::new(RefCell::new(FakeGame {
            flicker: (1..=100).collect(),
            ..Default::default()
        }));
        let mut p = params(100, Direction::Retreat, 100);
        p.anomaly = AnomalyConfig {
            min_findings: 3,
            window: 3,
            max_span: 1,
        };
        let mut scan = engine(&game, p, Box::new(MemorySink::default()), AbortFlag::new());

        assert_eq!(scan.run().unwrap(), StopReason::AnomalyDetected);
        assert_eq!(scan.found, vec![100, 99, 98]);
        assert_eq!(scan.position, 98);
        assert_eq!(game.borrow().presses.len(), 2);
    }

    #[test]
    fn test_sink_failure_is_not_fatal() {
        let game = Rc::new(RefCell::new(FakeGame {
            flicker: HashSet::from([10]),
            ..Default::default()
        }));
        let recorder = Arc::new(Recorder::default());
        let mut scan = engine(
            &game,
            params(10, Direction::Retreat, 2),
            Box::new(BrokenSink),
            AbortFlag::new(),
        )
        .with_observer(recorder.clone());

        assert_eq!(scan.run().unwrap(), StopReason::Exhausted);
        assert_eq!(scan.found, vec![10]);
        assert_eq!(scan.position, 8);

        let warnings = recorder.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("disk full"));
        assert_eq!(*recorder.stopped.lock().unwrap(), Some(StopReason::Exhausted));
    }

    #[test]
    fn test_capture_failure_is_fatal() {
        let game = Rc::new(RefCell::new(FakeGame {
            fail_capture: true,
            ..Default::default()
        }));
        let mut scan = engine(
            &game,
            params(10, Direction::Retreat, 5),
            Box::new(MemorySink::default()),
            AbortFlag::new(),
        );

        let err = scan.run().unwrap_err();
        assert!(format!("{:#}", err).contains("display unavailable"));
        assert_eq!(scan.state, ScanState::Scanning);
        assert!(game.borrow().presses.is_empty());
    }

    #[test]
    fn test_countdown_ticks_once_per_second() {
        let game = Rc::new(RefCell::new(FakeGame::default()));
        let pacer = RecordingPacer::default();
        let mut p = params(10, Direction::Retreat, 10);
        p.countdown_secs = 5;
        p.timings = Timings::BASE;
        let mut scan = engine(&game, p, Box::new(MemorySink::default()), AbortFlag::new())
            .with_pacer(Box::new(pacer.clone()));

        assert!(scan.step().unwrap());
        assert!(scan.step().unwrap());
        assert_eq!(scan.state, ScanState::Scanning);
        assert_eq!(*pacer.0.borrow(), vec![Duration::from_secs(1); 5]);
        assert_eq!(game.borrow().grabs, 0);
    }
}
