//! Sandboxed execution host.
//!
//! Each attempt runs on a dedicated worker thread (the "surface"). Only
//! strings cross the channel boundary; the worker owns its arena, its
//! interpreter, and every evaluated value. Two timers supervise the
//! attempt: a global ceiling armed at launch, and a render timer armed the
//! moment the worker reports a resolved component. When either fires the
//! surface is abandoned: the thread keeps spinning until its loop ends or
//! the process exits, but nothing it produces is ever read again.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use tracing::{debug, warn};

use crate::error::{EngineError, TimeoutKind};
use crate::interp::Interpreter;
use crate::render::render_value;
use crate::resolve::{empty_props, is_renderable, resolve_component, scan_candidates};

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Ceiling on the whole attempt, armed at surface launch.
    pub global_timeout: Duration,
    /// Armed when resolution succeeds; bounds mount and serialization.
    pub render_timeout: Duration,
    /// How long surface startup may take before it is declared dead.
    pub bootstrap_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            global_timeout: Duration::from_secs(10),
            render_timeout: Duration::from_secs(5),
            bootstrap_timeout: Duration::from_secs(1),
        }
    }
}

/// Successful output of one hosted attempt.
#[derive(Debug, Clone)]
pub struct RenderedPreview {
    pub body_html: String,
    pub resolved_name: String,
}

enum WorkerEvent {
    Ready,
    Resolved(String),
    Finished(Result<RenderedPreview, EngineError>),
}

/// Run compiled constructor-call code on an isolated surface and wait for
/// its outcome under the configured timers.
pub fn execute(
    compiled: &str,
    declared_name: &str,
    config: &HostConfig,
) -> Result<RenderedPreview, EngineError> {
    let (tx, rx) = mpsc::channel();
    let code = compiled.to_string();
    let declared = declared_name.to_string();

    thread::Builder::new()
        .name("preview-surface".to_string())
        .spawn(move || {
            let _ = tx.send(WorkerEvent::Ready);
            let result = run_surface(&code, &declared, &tx);
            let _ = tx.send(WorkerEvent::Finished(result));
        })
        .map_err(|e| EngineError::surface(format!("failed to launch surface: {e}")))?;

    match rx.recv_timeout(config.bootstrap_timeout) {
        Ok(WorkerEvent::Ready) => {}
        Ok(_) | Err(RecvTimeoutError::Timeout) => {
            return Err(EngineError::surface(
                "surface did not signal readiness".to_string(),
            ));
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(EngineError::surface(
                "surface terminated during bootstrap".to_string(),
            ));
        }
    }

    supervise(&rx, Instant::now(), config)
}

/// Wait for the surface's outcome under the configured timers. The global
/// deadline is fixed at entry; the render deadline arms on the resolution
/// signal and wins whenever it is the nearer of the two.
fn supervise(
    rx: &Receiver<WorkerEvent>,
    started: Instant,
    config: &HostConfig,
) -> Result<RenderedPreview, EngineError> {
    let global_deadline = started + config.global_timeout;
    let mut render_deadline: Option<Instant> = None;

    loop {
        let now = Instant::now();
        let (deadline, which) = match render_deadline {
            Some(rd) if rd < global_deadline => (rd, TimeoutKind::Render),
            _ => (global_deadline, TimeoutKind::Global),
        };
        if now >= deadline {
            warn!(?which, "surface timed out, abandoning");
            return Err(EngineError::Timeout {
                which,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        match rx.recv_timeout(deadline - now) {
            Ok(WorkerEvent::Ready) => {}
            Ok(WorkerEvent::Resolved(name)) => {
                debug!(component = %name, "surface resolved a component");
                render_deadline = Some(Instant::now() + config.render_timeout);
            }
            Ok(WorkerEvent::Finished(result)) => return result,
            Err(RecvTimeoutError::Timeout) => {
                // Loop re-checks deadlines and reports the timer that fired.
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(EngineError::surface(
                    "surface terminated without reporting".to_string(),
                ));
            }
        }
    }
}

fn run_surface(
    compiled: &str,
    declared_name: &str,
    tx: &Sender<WorkerEvent>,
) -> Result<RenderedPreview, EngineError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, compiled, SourceType::default()).parse();
    if !ret.errors.is_empty() {
        let detail = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(EngineError::runtime(format!(
            "compiled code failed to parse on surface: {detail}"
        )));
    }
    let program = allocator.alloc(ret.program);

    let interp = Interpreter::new();
    // Best effort: declarations bound before a failing statement survive
    // and remain eligible for resolution.
    if let Err(err) = interp.run_program(program) {
        debug!(error = %err, "top-level execution halted early");
    }

    let candidates = scan_candidates(compiled, declared_name);
    match resolve_component(&interp, &candidates) {
        Ok((name, value)) => {
            let _ = tx.send(WorkerEvent::Resolved(name.clone()));
            let body_html = catch_unwind(AssertUnwindSafe(|| render_value(&value)))
                .map_err(|_| EngineError::runtime("panic while serializing".to_string()))?;
            Ok(RenderedPreview {
                body_html,
                resolved_name: name,
            })
        }
        Err(primary) => {
            // Second strategy: re-evaluate the whole text inside an entry
            // function that hands the candidate back explicitly, which
            // rescues bindings the top-level pass never reached.
            for candidate in &candidates {
                if let Ok(preview) = wrapped_attempt(compiled, &candidate.name, tx) {
                    return Ok(preview);
                }
            }
            Err(primary)
        }
    }
}

/// Evaluate the compiled text inside a synthetic entry function returning
/// the named binding, then validate and serialize it. Resolution is
/// reported before serialization so the render timer covers it.
fn wrapped_attempt(
    compiled: &str,
    name: &str,
    tx: &Sender<WorkerEvent>,
) -> Result<RenderedPreview, EngineError> {
    let source = format!(
        "function __preview_entry__() {{\n{}\nreturn {};\n}}",
        compiled, name
    );
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &source, SourceType::default()).parse();
    if !ret.errors.is_empty() {
        return Err(EngineError::runtime("entry wrapper failed to parse".to_string()));
    }
    let program = allocator.alloc(ret.program);

    let interp = Interpreter::new();
    interp
        .run_program(program)
        .map_err(|e| EngineError::runtime(e.to_string()))?;
    let entry = interp
        .lookup("__preview_entry__")
        .ok_or_else(|| EngineError::runtime("entry wrapper missing".to_string()))?;
    let candidate = interp
        .call_value(&entry, vec![])
        .map_err(|e| EngineError::runtime(e.to_string()))?;
    if !candidate.is_callable() {
        return Err(EngineError::runtime(format!(
            "{name} is not callable"
        )));
    }
    let value = interp
        .call_value(&candidate, vec![empty_props()])
        .map_err(|e| EngineError::runtime(e.to_string()))?;
    if !is_renderable(&value) {
        return Err(EngineError::runtime(format!(
            "{name} did not produce markup"
        )));
    }
    let _ = tx.send(WorkerEvent::Resolved(name.to_string()));
    let body_html = catch_unwind(AssertUnwindSafe(|| render_value(&value)))
        .map_err(|_| EngineError::runtime("panic while serializing".to_string()))?;
    Ok(RenderedPreview {
        body_html,
        resolved_name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> HostConfig {
        HostConfig {
            global_timeout: Duration::from_millis(500),
            render_timeout: Duration::from_millis(250),
            bootstrap_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn renders_a_simple_component() {
        let code = "function Card() { return h(\"div\", { className: \"card\" }, [\"hello\"]); }";
        let preview = execute(code, "Card", &HostConfig::default()).unwrap();
        assert_eq!(preview.resolved_name, "Card");
        assert_eq!(preview.body_html, "<div class=\"card\">hello</div>");
    }

    #[test]
    fn infinite_loop_hits_global_timer() {
        let code = "while (true) {}\nfunction Card() { return h(\"div\", null, null); }";
        let err = execute(code, "Card", &fast_config()).unwrap_err();
        match err {
            EngineError::Timeout { which, .. } => assert_eq!(which, TimeoutKind::Global),
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[test]
    fn runaway_component_body_hits_global_timer() {
        // The loop spins inside validation, so no resolution signal ever
        // arrives and the global timer is the one that fires.
        let code = "function Card() { while (true) {} }";
        let err = execute(code, "Card", &fast_config()).unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }

    #[test]
    fn no_valid_candidate_is_a_resolution_error() {
        let code = "function Card() { return \"just text\"; }";
        let err = execute(code, "Card", &HostConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Resolution { .. }));
    }

    #[test]
    fn declarations_before_a_failure_still_resolve() {
        let code =
            "const Card = () => h(\"div\", null, [\"ok\"]);\nexplode();";
        let preview = execute(code, "Card", &HostConfig::default()).unwrap();
        assert_eq!(preview.resolved_name, "Card");
    }

    #[test]
    fn wrapped_attempt_recovers_named_binding() {
        let (tx, rx) = mpsc::channel();
        let code = "const Hero = () => h(\"section\", null, [\"hi\"]);";
        let preview = wrapped_attempt(code, "Hero", &tx).unwrap();
        assert_eq!(preview.resolved_name, "Hero");
        assert_eq!(preview.body_html, "<section>hi</section>");
        // The resolution signal was emitted so the render timer could arm.
        assert!(matches!(rx.try_recv(), Ok(WorkerEvent::Resolved(name)) if name == "Hero"));
    }

    #[test]
    fn render_timer_fires_after_resolution_signal() {
        let (tx, rx) = mpsc::channel();
        tx.send(WorkerEvent::Resolved("Card".to_string())).unwrap();
        let config = HostConfig {
            global_timeout: Duration::from_secs(5),
            render_timeout: Duration::from_millis(50),
            bootstrap_timeout: Duration::from_millis(500),
        };
        // The worker never finishes, so the nearer render deadline is the
        // one that fires.
        let err = supervise(&rx, Instant::now(), &config).unwrap_err();
        match err {
            EngineError::Timeout { which, .. } => assert_eq!(which, TimeoutKind::Render),
            other => panic!("expected render timeout, got {other}"),
        }
    }
}
