//! Top-level evaluation with a single-flight guard
//!
//! One evaluation is one task on the rayon pool. While a task is in flight
//! further requests are dropped, not queued. Results come back as
//! [`EvaluationReport`]s over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use super::context::{EvaluationContext, Rectangle};
use super::document::{Document, EvaluationTarget};
use super::reporter::{LogReporter, ProgressTracker, Reporter};
use crate::config::EngineConfig;
use crate::error::EvaluationError;
use crate::nodes::execution_engine::{run_pass, ExecutionPass};
use crate::nodes::interface::NodeData;
use crate::nodes::operator::OperatorKind;
use crate::nodes::{Graph, OutputRef};
use crate::operators::evaluate_objects;

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub session: Uuid,
    pub message: String,
    pub target: EvaluationTarget,
    /// Names of the nodes that ran, in completion order
    pub executed: Vec<String>,
    /// `(node name, message)` pairs
    pub warnings: Vec<(String, String)>,
    pub elapsed: Duration,
    pub result: Result<(), EvaluationError>,
}

/// Clears the in-flight flag when the evaluation ends, even by panic
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything a single evaluation task needs
struct EvaluationJob {
    session: Uuid,
    message: String,
    document: Arc<Mutex<Document>>,
    progress: ProgressTracker,
    config: EngineConfig,
    guard: FlightGuard,
    reports: Sender<EvaluationReport>,
}

impl EvaluationJob {
    fn run(self) -> EvaluationReport {
        let report = evaluate_document(self.session, &self.message, &self.document, &self.progress, &self.config);
        drop(self.guard);
        if self.reports.send(report.clone()).is_err() {
            debug!("Evaluation report dropped, nobody is listening");
        }
        report
    }
}

/// Evaluates a shared [`Document`] for one session
pub struct Evaluator {
    session: Uuid,
    document: Arc<Mutex<Document>>,
    in_flight: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
    progress: ProgressTracker,
    config: EngineConfig,
    sender: Sender<EvaluationReport>,
    receiver: Receiver<EvaluationReport>,
}

impl Evaluator {
    pub fn new(document: Document, reporter: Arc<dyn Reporter>, config: EngineConfig) -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = channel();
        let session = Uuid::new_v4();
        debug!("Created evaluation session {}", session);
        Self {
            session,
            document: Arc::new(Mutex::new(document)),
            in_flight: Arc::new(AtomicBool::new(false)),
            progress: ProgressTracker::new(reporter, interrupted.clone()),
            interrupted,
            config,
            sender,
            receiver,
        }
    }

    /// Evaluator reporting through the log with the global configuration
    pub fn with_defaults(document: Document) -> Self {
        Self::new(document, Arc::new(LogReporter), EngineConfig::global().clone())
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn document(&self) -> Arc<Mutex<Document>> {
        self.document.clone()
    }

    /// Run `f` on the locked document
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> Result<R, EvaluationError> {
        let mut document = self.document.lock().map_err(|_| EvaluationError::LockPoisoned)?;
        Ok(f(&mut document))
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Ask a running evaluation to stop at its next polling point
    pub fn interrupt(&self) {
        info!("Interrupting evaluation of session {}", self.session);
        self.interrupted.store(true, Ordering::Relaxed);
    }

    /// The flag polled by long loops, for callers that cancel from elsewhere
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Start an evaluation unless one is already in flight.
    ///
    /// Runs on the rayon pool, or inline while the document is playing.
    /// Returns whether the request was accepted.
    pub fn request(&self, message: &str) -> bool {
        let Some(job) = self.acquire(message) else {
            return false;
        };
        let playing = self.document.lock().map(|document| document.playing).unwrap_or(false);
        if playing {
            job.run();
        } else {
            rayon::spawn(move || {
                job.run();
            });
        }
        true
    }

    /// Evaluate on the calling thread
    pub fn evaluate_now(&self, message: &str) -> Result<EvaluationReport, EvaluationError> {
        let job = self.acquire(message).ok_or(EvaluationError::Busy)?;
        Ok(job.run())
    }

    /// Next report if one is ready
    pub fn try_report(&self) -> Option<EvaluationReport> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next report
    pub fn wait_report(&self, timeout: Duration) -> Option<EvaluationReport> {
        match self.receiver.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn acquire(&self, message: &str) -> Option<EvaluationJob> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if self.config.log_evaluation {
                info!("Evaluation in flight, dropping '{}'", message);
            } else {
                debug!("Evaluation in flight, dropping '{}'", message);
            }
            return None;
        }
        self.interrupted.store(false, Ordering::Relaxed);
        Some(EvaluationJob {
            session: self.session,
            message: message.to_string(),
            document: self.document.clone(),
            progress: self.progress.clone(),
            config: self.config.clone(),
            guard: FlightGuard(self.in_flight.clone()),
            reports: self.sender.clone(),
        })
    }
}

fn node_names(graph: &Graph, pass: &ExecutionPass) -> Vec<String> {
    pass.executed()
        .iter()
        .filter_map(|id| graph.node(*id).map(|node| node.name.clone()))
        .collect()
}

fn evaluate_document(
    session: Uuid,
    message: &str,
    document: &Mutex<Document>,
    progress: &ProgressTracker,
    config: &EngineConfig,
) -> EvaluationReport {
    let started = Instant::now();
    progress.begin(message);

    let mut report = EvaluationReport {
        session,
        message: message.to_string(),
        target: EvaluationTarget::Composite,
        executed: Vec::new(),
        warnings: Vec::new(),
        elapsed: Duration::ZERO,
        result: Ok(()),
    };

    match document.lock() {
        Ok(mut document) => {
            report.target = document.context.target();
            report.result = match report.target {
                EvaluationTarget::Composite => evaluate_composite(&mut document, progress, config, &mut report),
                EvaluationTarget::Scene => evaluate_scene(&mut document, progress, config, &mut report),
                EvaluationTarget::Object => evaluate_object(&mut document, progress, config, &mut report),
            };
        }
        Err(_) => report.result = Err(EvaluationError::LockPoisoned),
    }

    report.elapsed = started.elapsed();
    if let Err(e) = &report.result {
        warn!("Evaluation '{}' failed: {}", message, e);
    }
    progress.end(report.elapsed);
    report
}

fn context_for(document: &Document, progress: &ProgressTracker, config: &EngineConfig) -> EvaluationContext {
    let [width, height] = document.resolution;
    EvaluationContext::new(
        document.time,
        Rectangle::from_resolution(width, height),
        progress.clone(),
        config.clone(),
    )
}

fn evaluate_composite(
    document: &mut Document,
    progress: &ProgressTracker,
    config: &EngineConfig,
    report: &mut EvaluationReport,
) -> Result<(), EvaluationError> {
    let remembered = document.last_viewer.filter(|id| {
        document
            .composite
            .node(*id)
            .is_some_and(|node| node.operator_kind() == Some(OperatorKind::Viewer))
    });
    let viewer = remembered
        .or_else(|| document.composite.find_sink(OperatorKind::Viewer))
        .ok_or(EvaluationError::NoSink("viewer"))?;
    document.last_viewer = Some(viewer);

    let context = context_for(document, progress, config);
    let (pass, result) = run_pass(&mut document.composite, viewer, &context);
    report.executed = node_names(&document.composite, &pass);
    report.warnings = pass.warnings().to_vec();
    result?;

    document.last_image = document
        .composite
        .node(viewer)
        .and_then(|node| node.operator.as_ref())
        .and_then(|operator| operator.result())
        .cloned()
        .and_then(NodeData::into_image);
    Ok(())
}

fn evaluate_scene(
    document: &mut Document,
    progress: &ProgressTracker,
    config: &EngineConfig,
    report: &mut EvaluationReport,
) -> Result<(), EvaluationError> {
    let context = context_for(document, progress, config);
    let (pass, result) = evaluate_objects(&mut document.scene, &context);
    report.executed = node_names(&document.scene, &pass);
    report.warnings = pass.warnings().to_vec();
    document.last_scene = Some(result?);
    Ok(())
}

fn evaluate_object(
    document: &mut Document,
    progress: &ProgressTracker,
    config: &EngineConfig,
    report: &mut EvaluationReport,
) -> Result<(), EvaluationError> {
    let object = document
        .scene
        .active_node
        .filter(|id| {
            document
                .scene
                .node(*id)
                .is_some_and(|node| node.operator_kind() == Some(OperatorKind::Object))
        })
        .ok_or(EvaluationError::NoSink("object"))?;

    let context = context_for(document, progress, config);
    let (pass, result) = run_pass(&mut document.scene, object, &context);
    report.executed = node_names(&document.scene, &pass);
    report.warnings = pass.warnings().to_vec();
    result?;

    document.last_object = document
        .scene
        .cached_output(OutputRef::new(object, 0))
        .cloned()
        .and_then(NodeData::into_object);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;
    use crate::evaluation::reporter::tests::RecordingReporter;
    use crate::evaluation::EditingContext;
    use crate::nodes::factory::NodeFactory;
    use crate::nodes::interface::ParamValue;
    use crate::operators::{ObjectOperator, SolidColorOperator, ViewerOperator};

    fn composite_document() -> Document {
        let mut document = Document::new();
        document.resolution = [8, 4];
        let solid = document.composite.add("Solid", SolidColorOperator::create());
        let viewer = document.composite.add("Viewer", ViewerOperator::create());
        document
            .composite
            .set_parameter(solid, "color", ParamValue::Color([1.0, 0.0, 0.0, 1.0]))
            .unwrap();
        document.composite.connect_ports(solid, 0, viewer, 0).unwrap();
        document
    }

    /// Blocks in `on_begin` until released
    struct GateReporter {
        gate: Mutex<Receiver<()>>,
    }

    impl Reporter for GateReporter {
        fn on_begin(&self, _message: &str) {
            let _ = self.gate.lock().unwrap().recv();
        }

        fn on_progress(&self, _fraction: f32) {}
    }

    /// Raises the cancellation flag as soon as evaluation begins
    #[derive(Default)]
    struct CancellingReporter {
        flag: Mutex<Option<Arc<AtomicBool>>>,
    }

    impl Reporter for CancellingReporter {
        fn on_begin(&self, _message: &str) {
            if let Some(flag) = self.flag.lock().unwrap().as_ref() {
                flag.store(true, Ordering::Relaxed);
            }
        }

        fn on_progress(&self, _fraction: f32) {}
    }

    #[test]
    fn test_composite_evaluation_produces_image() {
        let reporter = Arc::new(RecordingReporter::default());
        let evaluator = Evaluator::new(composite_document(), reporter.clone(), EngineConfig::default());

        let report = evaluator.evaluate_now("Compositing").unwrap();
        assert_eq!(report.result, Ok(()));
        assert_eq!(report.target, EvaluationTarget::Composite);
        assert_eq!(report.executed, vec!["Solid".to_string(), "Viewer".to_string()]);
        assert_eq!(report.session, evaluator.session());

        let image = evaluator.with_document(|document| document.last_image.clone()).unwrap().unwrap();
        assert_eq!((image.width, image.height), (8, 4));
        assert_eq!(image.pixel(0, 0), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(*reporter.begun.lock().unwrap(), vec!["Compositing".to_string()]);
        assert!(reporter.ended.load(Ordering::SeqCst));
    }

    #[test]
    fn test_second_evaluation_skips_clean_nodes() {
        let evaluator = Evaluator::new(composite_document(), Arc::new(RecordingReporter::default()), EngineConfig::default());
        evaluator.evaluate_now("first").unwrap();
        let report = evaluator.evaluate_now("second").unwrap();
        assert!(report.executed.is_empty());
        assert_eq!(report.result, Ok(()));
    }

    #[test]
    fn test_missing_viewer() {
        let evaluator = Evaluator::new(Document::new(), Arc::new(RecordingReporter::default()), EngineConfig::default());
        let report = evaluator.evaluate_now("nothing").unwrap();
        assert_eq!(report.result, Err(EvaluationError::NoSink("viewer")));
    }

    #[test]
    fn test_requests_are_dropped_while_in_flight() {
        let (release, gate) = channel();
        let reporter = Arc::new(GateReporter { gate: Mutex::new(gate) });
        let evaluator = Evaluator::new(composite_document(), reporter, EngineConfig::default());

        assert!(evaluator.request("first"));
        assert!(evaluator.is_running());
        assert!(!evaluator.request("second"));
        assert_eq!(evaluator.evaluate_now("third").unwrap_err(), EvaluationError::Busy);

        release.send(()).unwrap();
        let report = evaluator.wait_report(Duration::from_secs(10)).unwrap();
        assert_eq!(report.message, "first");
        assert!(!evaluator.is_running());
        assert!(evaluator.try_report().is_none());

        release.send(()).unwrap();
        assert!(evaluator.request("fourth"));
        let report = evaluator.wait_report(Duration::from_secs(10)).unwrap();
        assert_eq!(report.message, "fourth");
    }

    #[test]
    fn test_playback_evaluates_inline() {
        let mut document = composite_document();
        document.playing = true;
        let evaluator = Evaluator::new(document, Arc::new(RecordingReporter::default()), EngineConfig::default());
        assert!(evaluator.request("frame"));
        assert!(!evaluator.is_running());
        assert_eq!(evaluator.try_report().unwrap().message, "frame");
    }

    #[test]
    fn test_cancellation_is_cooperative() {
        let reporter = Arc::new(CancellingReporter::default());
        let evaluator = Evaluator::new(composite_document(), reporter.clone(), EngineConfig::default());
        *reporter.flag.lock().unwrap() = Some(evaluator.cancellation_flag());

        let report = evaluator.evaluate_now("cancelled").unwrap();
        assert_eq!(report.result, Err(EvaluationError::Execution(ExecutionError::Interrupted)));
        assert!(report.executed.is_empty());

        // The next request clears the flag before starting.
        *reporter.flag.lock().unwrap() = None;
        let report = evaluator.evaluate_now("again").unwrap();
        assert_eq!(report.result, Ok(()));
    }

    #[test]
    fn test_scene_and_object_strategies() {
        let mut document = Document::new();
        let ground = document.scene.add("Ground", ObjectOperator::create());
        document.scene.add("Cloud", ObjectOperator::create());
        document.context = EditingContext::Scene;
        let evaluator = Evaluator::new(document, Arc::new(RecordingReporter::default()), EngineConfig::default());

        let report = evaluator.evaluate_now("scene").unwrap();
        assert_eq!(report.target, EvaluationTarget::Scene);
        assert_eq!(report.executed, vec!["Ground".to_string(), "Cloud".to_string()]);
        let objects = evaluator
            .with_document(|document| document.last_scene.clone().map(|scene| scene.objects.len()))
            .unwrap();
        assert_eq!(objects, Some(2));

        evaluator
            .with_document(|document| {
                document.context = EditingContext::Object;
                document.scene.active_node = Some(ground);
                document.scene.mark_stale(ground);
            })
            .unwrap();
        let report = evaluator.evaluate_now("object").unwrap();
        assert_eq!(report.target, EvaluationTarget::Object);
        assert_eq!(report.executed, vec!["Ground".to_string()]);
        let name = evaluator
            .with_document(|document| document.last_object.clone().map(|object| object.name))
            .unwrap();
        assert_eq!(name.as_deref(), Some("Ground"));
    }

    #[test]
    fn test_object_strategy_needs_active_object() {
        let mut document = Document::new();
        document.context = EditingContext::Mesh;
        let evaluator = Evaluator::new(document, Arc::new(RecordingReporter::default()), EngineConfig::default());
        let report = evaluator.evaluate_now("object").unwrap();
        assert_eq!(report.result, Err(EvaluationError::NoSink("object")));
    }
}
