//! Render Pass Pipeline Tests
//!
//! Tests for:
//! - Phased init: producer outputs are valid during a consumer's init_late
//! - Resize propagation through resize / resize_late
//! - Registration order as execution order, with debug groups per pass
//! - Declared dependency validation (missing producer, wrong order)
//! - Duplicate registration and failed init
//! - Reverse-order, idempotent shutdown
//! - Stale output lookups
//!
//! Runs against a plain-struct backend, no GPU required.

use std::cell::RefCell;
use std::rc::Rc;

use tessera::errors::{Result, TesseraError};
use tessera::renderer::graph::{
    PassBackend, PassDependency, PassLookup, PassOutput, PassState, RenderPass, RenderPassPipeline,
};

// ============================================================================
// Test Backend
// ============================================================================

struct TestBackend;

struct TestInit {
    width: u32,
    height: u32,
}

#[derive(Default)]
struct TestFrame {
    events: Vec<String>,
}

impl PassBackend for TestBackend {
    type Init<'a> = TestInit;
    type Frame<'a> = TestFrame;

    fn push_debug_group(frame: &mut TestFrame, label: &str) {
        frame.events.push(format!("push {label}"));
    }

    fn pop_debug_group(frame: &mut TestFrame) {
        frame.events.push("pop".to_string());
    }
}

fn init_ctx(width: u32, height: u32) -> TestInit {
    let _ = env_logger::builder().is_test(true).try_init();
    TestInit { width, height }
}

type Log = Rc<RefCell<Vec<&'static str>>>;

// ============================================================================
// Test Passes
// ============================================================================

struct Attachment {
    id: u32,
    width: u32,
    height: u32,
}

/// Owns a viewport-sized attachment, recreated on every resize.
#[derive(Default)]
struct Producer {
    allocations: u32,
    output: Option<Attachment>,
    fail_resize: bool,
}

impl Producer {
    fn allocate(&mut self, width: u32, height: u32) {
        self.allocations += 1;
        self.output = Some(Attachment {
            id: self.allocations,
            width,
            height,
        });
    }
}

impl PassOutput for Producer {
    type Output = Attachment;

    fn output(&self) -> Option<&Attachment> {
        self.output.as_ref()
    }
}

impl RenderPass<TestBackend> for Producer {
    fn name(&self) -> &'static str {
        "producer"
    }

    fn init(&mut self, ctx: &mut TestInit) -> Result<()> {
        self.allocate(ctx.width, ctx.height);
        Ok(())
    }

    fn update(&mut self, frame: &mut TestFrame, _passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        frame.events.push("update producer".to_string());
        Ok(())
    }

    fn resize(&mut self, _ctx: &mut TestInit, width: u32, height: u32) -> Result<()> {
        if self.fail_resize {
            return Err(TesseraError::PassFailed {
                pass: "producer".to_string(),
                stage: "resize",
                reason: "out of memory".to_string(),
            });
        }
        self.allocate(width, height);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.output = None;
    }
}

/// Binds the producer's attachment in init_late / resize_late.
#[derive(Default)]
struct Consumer {
    bound: Option<(u32, u32, u32)>,
    init_late_calls: u32,
}

impl Consumer {
    fn bind(&mut self, passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        self.init_late_calls += 1;
        let attachment = passes
            .output::<Producer>()
            .ok_or_else(|| TesseraError::PassFailed {
                pass: "consumer".to_string(),
                stage: "init_late",
                reason: "producer output missing".to_string(),
            })?;
        self.bound = Some((attachment.id, attachment.width, attachment.height));
        Ok(())
    }
}

impl RenderPass<TestBackend> for Consumer {
    fn name(&self) -> &'static str {
        "consumer"
    }

    fn dependencies(&self) -> Vec<PassDependency> {
        vec![PassDependency::on::<Producer>()]
    }

    fn init(&mut self, _ctx: &mut TestInit) -> Result<()> {
        Ok(())
    }

    fn init_late(&mut self, _ctx: &mut TestInit, passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        self.bind(passes)
    }

    fn update(&mut self, frame: &mut TestFrame, passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        let width = passes.output::<Producer>().map_or(0, |a| a.width);
        frame.events.push(format!("update consumer {width}"));
        Ok(())
    }

    fn resize_late(&mut self, _ctx: &mut TestInit, passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        self.bind(passes)
    }
}

/// Reads the producer during init_late without declaring the dependency.
#[derive(Default)]
struct EagerReader {
    saw_output: Option<bool>,
}

impl RenderPass<TestBackend> for EagerReader {
    fn name(&self) -> &'static str {
        "eager"
    }

    fn init(&mut self, _ctx: &mut TestInit) -> Result<()> {
        Ok(())
    }

    fn init_late(&mut self, _ctx: &mut TestInit, passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        self.saw_output = Some(passes.output::<Producer>().is_some());
        Ok(())
    }

    fn update(&mut self, _frame: &mut TestFrame, _passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        Ok(())
    }
}

const MARKER_NAMES: [&str; 3] = ["first", "second", "third"];

/// Records its shutdown into a shared log.
struct Marker<const N: usize> {
    log: Log,
}

impl<const N: usize> RenderPass<TestBackend> for Marker<N> {
    fn name(&self) -> &'static str {
        MARKER_NAMES[N]
    }

    fn init(&mut self, _ctx: &mut TestInit) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, frame: &mut TestFrame, _passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        frame.events.push(format!("update {}", MARKER_NAMES[N]));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.log.borrow_mut().push(MARKER_NAMES[N]);
    }
}

/// Fails in the hook selected at construction.
struct Failing {
    fail_init: bool,
    fail_resize: bool,
    log: Log,
}

impl RenderPass<TestBackend> for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn init(&mut self, _ctx: &mut TestInit) -> Result<()> {
        if self.fail_init {
            return Err(TesseraError::PassFailed {
                pass: "failing".to_string(),
                stage: "init",
                reason: "no device".to_string(),
            });
        }
        Ok(())
    }

    fn update(&mut self, frame: &mut TestFrame, _passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        frame.events.push("update failing".to_string());
        Ok(())
    }

    fn resize(&mut self, _ctx: &mut TestInit, _width: u32, _height: u32) -> Result<()> {
        if self.fail_resize {
            return Err(TesseraError::PassFailed {
                pass: "failing".to_string(),
                stage: "resize",
                reason: "attachment too large".to_string(),
            });
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.log.borrow_mut().push("failing");
    }
}

/// Same name as [`Producer`], different type.
struct Impostor;

impl RenderPass<TestBackend> for Impostor {
    fn name(&self) -> &'static str {
        "producer"
    }

    fn init(&mut self, _ctx: &mut TestInit) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, _frame: &mut TestFrame, _passes: &PassLookup<'_, TestBackend>) -> Result<()> {
        Ok(())
    }
}

fn producer_consumer(width: u32, height: u32) -> RenderPassPipeline<TestBackend> {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(width, height);
    pipeline.add_pass(Producer::default(), &mut ctx).unwrap();
    pipeline.add_pass(Consumer::default(), &mut ctx).unwrap();
    pipeline.init_late_all(&mut ctx).unwrap();
    pipeline
}

// ============================================================================
// Phased Initialization
// ============================================================================

#[test]
fn init_late_sees_valid_producer_output() {
    let pipeline = producer_consumer(1600, 900);

    let consumer = pipeline.get_pass::<Consumer>().unwrap();
    assert_eq!(consumer.bound, Some((1, 1600, 900)));
    assert_eq!(pipeline.state("producer"), Some(PassState::Ready));
    assert_eq!(pipeline.state("consumer"), Some(PassState::Ready));
}

#[test]
fn add_pass_returns_registration_index() {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);
    assert_eq!(pipeline.add_pass(Producer::default(), &mut ctx).unwrap(), 0);
    assert_eq!(pipeline.add_pass(Consumer::default(), &mut ctx).unwrap(), 1);
    assert_eq!(pipeline.state("consumer"), Some(PassState::Initialized));
    assert_eq!(pipeline.names().collect::<Vec<_>>(), vec!["producer", "consumer"]);
}

#[test]
fn lookup_by_type_and_name() {
    let pipeline = producer_consumer(320, 240);

    assert_eq!(pipeline.get_pass_output::<Producer>().map(|a| a.width), Some(320));
    assert_eq!(pipeline.get_pass_by_name("consumer").map(|pass| pass.name()), Some("consumer"));
    assert!(pipeline.get_pass_by_name("missing").is_none());
    assert!(pipeline.get_pass::<EagerReader>().is_none());
}

// ============================================================================
// Resize
// ============================================================================

#[test]
fn resize_rebinds_consumer_to_new_attachment() {
    let mut pipeline = producer_consumer(1600, 900);

    let mut ctx = init_ctx(800, 450);
    pipeline.resize_all(&mut ctx, 800, 450).unwrap();
    assert_eq!(pipeline.state("consumer"), Some(PassState::Initialized));
    pipeline.resize_late_all(&mut ctx).unwrap();

    let consumer = pipeline.get_pass::<Consumer>().unwrap();
    assert_eq!(consumer.bound, Some((2, 800, 450)));
    assert_eq!(consumer.init_late_calls, 2);
    assert_eq!(pipeline.state("consumer"), Some(PassState::Ready));
}

#[test]
fn failed_resize_parks_pass_until_next_resize() {
    let log = Log::default();
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(100, 100);
    pipeline
        .add_pass(
            Failing {
                fail_init: false,
                fail_resize: true,
                log: Rc::clone(&log),
            },
            &mut ctx,
        )
        .unwrap();
    pipeline.init_late_all(&mut ctx).unwrap();

    let err = pipeline.resize_all(&mut init_ctx(200, 200), 200, 200).unwrap_err();
    assert!(matches!(err, TesseraError::PassFailed { stage: "resize", .. }));
    assert_eq!(pipeline.state("failing"), Some(PassState::Registered));

    let mut frame = TestFrame::default();
    pipeline.update_all(&mut frame).unwrap();
    assert!(frame.events.is_empty());

    pipeline.shutdown_all();
    assert_eq!(*log.borrow(), vec!["failing"]);
}

fn producer_failing_consumer(log: &Log) -> RenderPassPipeline<TestBackend> {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(1600, 900);
    pipeline.add_pass(Producer::default(), &mut ctx).unwrap();
    pipeline
        .add_pass(
            Failing {
                fail_init: false,
                fail_resize: true,
                log: Rc::clone(log),
            },
            &mut ctx,
        )
        .unwrap();
    pipeline.add_pass(Consumer::default(), &mut ctx).unwrap();
    pipeline.init_late_all(&mut ctx).unwrap();
    pipeline
}

#[test]
fn failed_resize_in_the_middle_still_resizes_the_rest() {
    let log = Log::default();
    let mut pipeline = producer_failing_consumer(&log);

    let mut ctx = init_ctx(800, 450);
    let err = pipeline.resize_all(&mut ctx, 800, 450).unwrap_err();
    assert!(matches!(err, TesseraError::PassFailed { stage: "resize", .. }));
    pipeline.resize_late_all(&mut ctx).unwrap();

    assert_eq!(pipeline.state("producer"), Some(PassState::Ready));
    assert_eq!(pipeline.state("failing"), Some(PassState::Registered));
    assert_eq!(pipeline.state("consumer"), Some(PassState::Ready));
    assert_eq!(pipeline.get_pass::<Consumer>().unwrap().bound, Some((2, 800, 450)));

    let mut frame = TestFrame::default();
    pipeline.update_all(&mut frame).unwrap();
    assert_eq!(
        frame.events,
        vec![
            "push producer",
            "update producer",
            "pop",
            "push consumer",
            "update consumer 800",
            "pop",
        ]
    );
}

#[test]
fn consumer_of_failed_producer_is_parked_until_retry() {
    let mut pipeline = producer_consumer(1600, 900);
    pipeline.get_pass_mut::<Producer>().unwrap().fail_resize = true;

    let mut ctx = init_ctx(800, 450);
    assert!(pipeline.resize_all(&mut ctx, 800, 450).is_err());
    pipeline.resize_late_all(&mut ctx).unwrap();

    assert_eq!(pipeline.state("producer"), Some(PassState::Registered));
    assert_eq!(pipeline.state("consumer"), Some(PassState::Registered));
    assert_eq!(pipeline.get_pass::<Consumer>().unwrap().init_late_calls, 1);

    // Nothing reads the parked producer.
    let mut frame = TestFrame::default();
    pipeline.update_all(&mut frame).unwrap();
    assert!(frame.events.is_empty());

    // Retrying at the same size recovers both.
    pipeline.get_pass_mut::<Producer>().unwrap().fail_resize = false;
    pipeline.resize_all(&mut ctx, 800, 450).unwrap();
    pipeline.resize_late_all(&mut ctx).unwrap();
    assert_eq!(pipeline.state("producer"), Some(PassState::Ready));
    assert_eq!(pipeline.state("consumer"), Some(PassState::Ready));
    assert_eq!(pipeline.get_pass::<Consumer>().unwrap().bound, Some((2, 800, 450)));
}

// ============================================================================
// Execution Order
// ============================================================================

#[test]
fn update_runs_in_registration_order_inside_debug_groups() {
    let mut pipeline = producer_consumer(640, 480);

    let mut frame = TestFrame::default();
    pipeline.update_all(&mut frame).unwrap();

    assert_eq!(
        frame.events,
        vec![
            "push producer",
            "update producer",
            "pop",
            "push consumer",
            "update consumer 640",
            "pop",
        ]
    );
}

#[test]
fn passes_before_init_late_are_not_updated() {
    let log = Log::default();
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(8, 8);
    pipeline.add_pass(Marker::<0> { log: Rc::clone(&log) }, &mut ctx).unwrap();

    let mut frame = TestFrame::default();
    pipeline.update_all(&mut frame).unwrap();
    assert!(frame.events.is_empty());

    pipeline.init_late_all(&mut ctx).unwrap();
    pipeline.update_all(&mut frame).unwrap();
    assert_eq!(frame.events, vec!["push first", "update first", "pop"]);
}

// ============================================================================
// Dependency Validation
// ============================================================================

#[test]
fn consumer_registered_before_producer_is_rejected() {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);
    pipeline.add_pass(Consumer::default(), &mut ctx).unwrap();
    pipeline.add_pass(Producer::default(), &mut ctx).unwrap();

    let err = pipeline.init_late_all(&mut ctx).unwrap_err();
    match err {
        TesseraError::PassOrderViolation { consumer, producer } => {
            assert_eq!(consumer, "consumer");
            assert_eq!(producer, "producer");
        }
        other => panic!("expected order violation, got {other:?}"),
    }

    // Validation runs before any init_late hook.
    assert_eq!(pipeline.get_pass::<Consumer>().unwrap().init_late_calls, 0);
    assert_eq!(pipeline.state("producer"), Some(PassState::Initialized));
}

#[test]
fn missing_producer_is_rejected() {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);
    pipeline.add_pass(Consumer::default(), &mut ctx).unwrap();

    let err = pipeline.init_late_all(&mut ctx).unwrap_err();
    assert!(matches!(err, TesseraError::MissingDependency { .. }));
}

// ============================================================================
// Registration Errors
// ============================================================================

#[test]
fn duplicate_name_is_rejected() {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);
    pipeline.add_pass(Producer::default(), &mut ctx).unwrap();

    let err = pipeline.add_pass(Impostor, &mut ctx).unwrap_err();
    assert!(matches!(err, TesseraError::DuplicatePass(ref name) if name == "producer"));

    let err = pipeline.add_pass(Producer::default(), &mut ctx).unwrap_err();
    assert!(matches!(err, TesseraError::DuplicatePass(_)));
    assert_eq!(pipeline.len(), 1);
}

#[test]
fn failed_init_is_shut_down_and_not_registered() {
    let log = Log::default();
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);

    let result = pipeline.add_pass(
        Failing {
            fail_init: true,
            fail_resize: false,
            log: Rc::clone(&log),
        },
        &mut ctx,
    );

    assert!(result.is_err());
    assert!(pipeline.is_empty());
    assert_eq!(pipeline.state("failing"), None);
    assert_eq!(*log.borrow(), vec!["failing"]);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn shutdown_is_reverse_order_and_idempotent() {
    let log = Log::default();
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);
    pipeline.add_pass(Marker::<0> { log: Rc::clone(&log) }, &mut ctx).unwrap();
    pipeline.add_pass(Marker::<1> { log: Rc::clone(&log) }, &mut ctx).unwrap();
    pipeline.add_pass(Marker::<2> { log: Rc::clone(&log) }, &mut ctx).unwrap();
    pipeline.init_late_all(&mut ctx).unwrap();

    pipeline.shutdown_all();
    pipeline.shutdown_all();

    assert_eq!(*log.borrow(), vec!["third", "second", "first"]);
    assert_eq!(pipeline.state("second"), Some(PassState::ShutDown));

    let mut frame = TestFrame::default();
    pipeline.update_all(&mut frame).unwrap();
    assert!(frame.events.is_empty());
}

// ============================================================================
// Stale Lookups
// ============================================================================

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "read in state")]
fn reading_output_before_producer_is_ready_asserts() {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);
    pipeline.add_pass(EagerReader::default(), &mut ctx).unwrap();
    pipeline.add_pass(Producer::default(), &mut ctx).unwrap();
    let _ = pipeline.init_late_all(&mut ctx);
}

#[test]
#[cfg(not(debug_assertions))]
fn reading_output_before_producer_is_ready_yields_none() {
    let mut pipeline = RenderPassPipeline::new();
    let mut ctx = init_ctx(64, 64);
    pipeline.add_pass(EagerReader::default(), &mut ctx).unwrap();
    pipeline.add_pass(Producer::default(), &mut ctx).unwrap();
    pipeline.init_late_all(&mut ctx).unwrap();

    assert_eq!(pipeline.get_pass::<EagerReader>().unwrap().saw_output, Some(false));
}
