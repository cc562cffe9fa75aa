//! Scripted multi-frame simulations for `train simulate`.
//!
//! A scenario describes one page: its origin, the frames embedded in it and
//! a list of steps run against the trains of those contexts. Posted messages
//! are drained after every bootstrap and every step.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};
use train_core::testing::Page;
use train_core::{Activity, HandshakeState, Listener, Train, TrainConfig};
use train_proto::{EventEnvelope, EventSource};

/// Name of the top-level context in steps and reports.
pub const TOP: &str = "top";

fn default_origin() -> String {
    "https://portal.example".to_string()
}

/// A page to simulate.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_origin")]
    pub origin: String,

    /// Configuration of the top-level train. Falls back to the CLI config.
    #[serde(default)]
    pub config: Option<TrainConfig>,

    #[serde(default)]
    pub frames: Vec<FrameSpec>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A frame embedded directly in the top-level document.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameSpec {
    /// CSS class of the frame element; also the context name in steps.
    pub class: String,

    /// Origin of the frame document. Defaults to the page origin.
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub config: TrainConfig,
}

/// One scripted action.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Subscribe {
        context: String,
        event: String,
    },
    Publish {
        context: String,
        event: String,
        #[serde(default)]
        payload: Option<Value>,
    },
    RegisterPublic {
        context: String,
        events: Vec<String>,
    },
    UnsubscribeAll {
        context: String,
    },
}

impl Step {
    fn context(&self) -> &str {
        match self {
            Step::Subscribe { context, .. }
            | Step::Publish { context, .. }
            | Step::RegisterPublic { context, .. }
            | Step::UnsubscribeAll { context } => context,
        }
    }
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }
}

/// Final state of one context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReport {
    pub name: String,
    pub label: String,
    pub handshake: HandshakeState,
    pub catalog: Vec<String>,
}

/// An envelope received by a scripted subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub context: String,
    pub event: String,
    pub source: EventSource,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    pub context: String,
    #[serde(flatten)]
    pub activity: Activity,
}

/// Everything a simulation observed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub name: Option<String>,
    pub contexts: Vec<ContextReport>,
    pub deliveries: Vec<Delivery>,
    pub failures: Vec<String>,
    pub activities: Vec<ActivityRow>,
    pub messages_delivered: usize,
}

/// Runs a scenario. Step failures are recorded and do not stop the run.
pub fn simulate(scenario: &Scenario, fallback: &TrainConfig) -> Result<SimulationReport> {
    let page = Page::new(&scenario.origin);
    let top_window = page.top();
    let top_config = scenario.config.as_ref().unwrap_or(fallback);

    let mut contexts: Vec<(String, Rc<Train>)> = Vec::new();
    let top = Train::bootstrap(top_window.clone(), top_config).context("Failed to bootstrap top")?;
    contexts.push((TOP.to_string(), top));
    let mut messages_delivered = page.run_until_idle()?;

    for frame in &scenario.frames {
        if frame.class == TOP || contexts.iter().any(|(name, _)| *name == frame.class) {
            bail!("Duplicate context name in scenario: {}", frame.class);
        }
        let origin = frame.origin.as_deref().unwrap_or(&scenario.origin);
        let window = page.embed(&top_window, &frame.class, origin);
        let train = Train::bootstrap(window, &frame.config)
            .with_context(|| format!("Failed to bootstrap frame {}", frame.class))?;
        debug!(frame = %frame.class, origin = %origin, "Frame bootstrapped");
        contexts.push((frame.class.clone(), train));
        messages_delivered += page.run_until_idle()?;
    }

    let deliveries = Rc::new(RefCell::new(Vec::new()));
    let mut failures = Vec::new();

    for (index, step) in scenario.steps.iter().enumerate() {
        let Some((name, train)) = contexts.iter().find(|(name, _)| name == step.context()) else {
            bail!("Step {} names unknown context: {}", index + 1, step.context());
        };

        let outcome = match step {
            Step::Subscribe { event, .. } => {
                train.subscribe(event, recording_listener(name, train, &deliveries))
            }
            Step::Publish { event, payload, .. } => train.publish(event, payload.clone()),
            Step::RegisterPublic { events, .. } => train.register_public_events(events.clone()),
            Step::UnsubscribeAll { .. } => train.unsubscribe_all(),
        };
        if let Err(err) = outcome {
            warn!(step = index + 1, context = %name, error = %err, "Step failed");
            failures.push(format!("step {} ({}): {}", index + 1, name, err));
        }

        match page.run_until_idle() {
            Ok(count) => messages_delivered += count,
            Err(err) => failures.push(format!("step {} delivery: {}", index + 1, err)),
        }
    }

    let report = SimulationReport {
        name: scenario.name.clone(),
        contexts: contexts
            .iter()
            .map(|(name, train)| ContextReport {
                name: name.clone(),
                label: train.context_label(),
                handshake: train.handshake_state(),
                catalog: train.lookup_registered_event(),
            })
            .collect(),
        deliveries: deliveries.borrow().clone(),
        failures,
        activities: contexts
            .iter()
            .flat_map(|(name, train)| {
                train.activities().into_iter().map(move |activity| ActivityRow {
                    context: name.clone(),
                    activity,
                })
            })
            .collect(),
        messages_delivered,
    };
    info!(
        contexts = report.contexts.len(),
        deliveries = report.deliveries.len(),
        failures = report.failures.len(),
        "Simulation finished"
    );
    Ok(report)
}

fn recording_listener(
    context: &str,
    train: &Rc<Train>,
    deliveries: &Rc<RefCell<Vec<Delivery>>>,
) -> Listener {
    let context = context.to_string();
    let train = Rc::downgrade(train);
    let deliveries = Rc::clone(deliveries);
    Rc::new(move |envelope: &EventEnvelope| {
        let event = train.upgrade().map_or_else(
            || envelope.event_name.clone(),
            |train| train.resolve_name(&envelope.event_name),
        );
        deliveries.borrow_mut().push(Delivery {
            context: context.clone(),
            event,
            source: envelope.event_source,
            payload: envelope.payload.clone(),
        });
        Ok(())
    })
}
