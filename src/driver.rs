//! Local apply driver behind the CLI
//!
//! A manifest holds the provider block and the desired resources. The driver
//! compares it with the [`StateFile`] and creates, updates, replaces or
//! deletes resources through the [`Provider`]. The steps of one run execute
//! concurrently, so rules created together are placed by a single reorder
//! pass per rule kind.
//!
//! Every run returns a [`Report`] even when some steps fail; successful steps
//! are already reflected in the state and must be saved by the caller. A
//! create that fails after ZIA assigned an id is stored as tainted and
//! replaced by the next apply, so the object is never created twice.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::core::error::{Error, Result};
use crate::core::state::{ResourceState, StateFile, validate_resource_name};
use crate::provider::{CreateFailed, Diagnostic, Diagnostics, Provider, ResourceData};

/// Desired configuration read from a manifest file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Settings of the `provider "zia"` block
    #[serde(default)]
    pub provider: Map<String, Value>,
    #[serde(default)]
    pub resources: Vec<ResourceBlock>,
}

/// One `resource "<type>" "<name>"` block
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceBlock {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ResourceBlock {
    pub fn address(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }
}

impl Manifest {
    /// # Errors
    ///
    /// Returns `Error::Config` if `json` is not a valid manifest.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid manifest: {e}")))
    }

    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read or parsed.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let manifest = Self::parse(&json)?;
        info!(path = %path.display(), resources = manifest.resources.len(), "Loaded manifest");
        Ok(manifest)
    }

    /// Checks names, duplicate addresses and every resource configuration.
    pub fn validate(&self, provider: &Provider) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let mut seen = BTreeSet::new();
        for block in &self.resources {
            let address = block.address();
            if let Err(e) = validate_resource_name(&block.name) {
                diags.push(Diagnostic::from_error(format!("Invalid name for {address}"), &e));
            }
            if !seen.insert(address.clone()) {
                diags.push(Diagnostic::error(
                    "Duplicate resource",
                    format!("{address} is declared more than once"),
                ));
            }
            for mut diagnostic in provider.validate_resource_config(&block.type_name, &block.config) {
                diagnostic.summary = format!("{address}: {}", diagnostic.summary);
                diags.push(diagnostic);
            }
        }
        diags
    }
}

/// What happened to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Created,
    Updated,
    Replaced,
    Deleted,
    Refreshed,
    /// Removed from state because the remote object is gone
    Dropped,
    Imported,
    /// Created but failed afterwards; replaced by the next apply
    Tainted,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub address: String,
    pub action: Action,
    /// Line diff of the stored values, when they changed
    pub diff: Option<String>,
}

/// Outcome of a driver run
#[derive(Debug, Default)]
pub struct Report {
    pub changes: Vec<Change>,
    pub diagnostics: Diagnostics,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

enum Step {
    Create(ResourceBlock),
    Update(ResourceBlock, ResourceState),
    Replace(ResourceBlock, ResourceState, Vec<String>),
    Delete(ResourceState),
    Refresh(ResourceState),
}

/// A failed step, with the tainted state to keep if something was created
struct StepFailed {
    diagnostics: Diagnostics,
    tainted: Option<ResourceState>,
}

impl From<Diagnostics> for StepFailed {
    fn from(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            tainted: None,
        }
    }
}

struct StepResult {
    address: String,
    action: Action,
    prior: Option<Map<String, Value>>,
    /// `Some` to store, `None` to forget
    outcome: std::result::Result<Option<ResourceState>, StepFailed>,
}

/// Line diff of two value maps in pretty JSON; `None` when equal.
pub fn render_diff(old: &Map<String, Value>, new: &Map<String, Value>) -> Option<String> {
    use std::fmt::Write;

    let old_text = serde_json::to_string_pretty(old).unwrap_or_default();
    let new_text = serde_json::to_string_pretty(new).unwrap_or_default();
    if old_text == new_text {
        return None;
    }

    let diff = similar::TextDiff::from_lines(&old_text, &new_text);
    let mut result = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "- ",
            similar::ChangeTag::Insert => "+ ",
            similar::ChangeTag::Equal => "  ",
        };
        let _ = write!(result, "{sign}{change}");
    }
    Some(result)
}

/// Sets compare order-insensitively.
fn normalized(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(normalized).collect();
            items.sort_by_key(ToString::to_string);
            Value::Array(items)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalized(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Returns `true` if any configured attribute differs from the stored value.
pub fn config_differs(config: &Map<String, Value>, stored: &Map<String, Value>) -> bool {
    config.iter().any(|(key, wanted)| {
        let current = stored.get(key).unwrap_or(&Value::Null);
        !(wanted.is_null() && current.is_null()) && normalized(wanted) != normalized(current)
    })
}

fn to_state(type_name: &str, name: &str, data: ResourceData) -> ResourceState {
    ResourceState {
        type_name: type_name.to_string(),
        name: name.to_string(),
        id: data.id().unwrap_or_default().to_string(),
        values: data.into_values(),
        updated_at: Utc::now(),
        tainted: false,
    }
}

async fn create(provider: &Provider, block: &ResourceBlock) -> std::result::Result<ResourceState, StepFailed> {
    match provider.create_tracked(&block.type_name, block.config.clone()).await {
        Ok(data) => Ok(to_state(&block.type_name, &block.name, data)),
        Err(CreateFailed { diagnostics, partial }) => Err(StepFailed {
            diagnostics,
            tainted: partial.map(|data| ResourceState {
                tainted: true,
                ..to_state(&block.type_name, &block.name, data)
            }),
        }),
    }
}

async fn run_step(provider: Arc<Provider>, step: Step) -> StepResult {
    match step {
        Step::Create(block) => StepResult {
            address: block.address(),
            action: Action::Created,
            prior: None,
            outcome: create(&provider, &block).await.map(Some),
        },
        Step::Update(block, prior) => {
            let updated = provider
                .update(
                    &block.type_name,
                    &prior.id,
                    prior.values.clone(),
                    block.config.clone(),
                )
                .await;
            let outcome = match updated {
                Ok(Some(data)) => Ok(Some(to_state(&block.type_name, &block.name, data))),
                Ok(None) => {
                    warn!(address = %block.address(), "Resource vanished, creating it again");
                    create(&provider, &block).await.map(Some)
                }
                Err(diags) => Err(diags.into()),
            };
            StepResult {
                address: block.address(),
                action: Action::Updated,
                prior: Some(prior.values),
                outcome,
            }
        }
        Step::Replace(block, prior, attributes) => {
            info!(address = %block.address(), ?attributes, "Replacing resource");
            let outcome = match provider
                .delete(&prior.type_name, &prior.id, prior.values.clone())
                .await
            {
                Ok(()) => create(&provider, &block).await.map(Some),
                Err(diags) => Err(diags.into()),
            };
            StepResult {
                address: block.address(),
                action: Action::Replaced,
                prior: Some(prior.values),
                outcome,
            }
        }
        Step::Delete(prior) => StepResult {
            address: prior.address(),
            action: Action::Deleted,
            outcome: provider
                .delete(&prior.type_name, &prior.id, prior.values.clone())
                .await
                .map(|()| None)
                .map_err(StepFailed::from),
            prior: Some(prior.values),
        },
        Step::Refresh(prior) => {
            let refreshed = provider
                .read(&prior.type_name, &prior.id, prior.values.clone())
                .await;
            let (action, outcome) = match refreshed {
                Ok(Some(data)) => (
                    Action::Refreshed,
                    Ok(Some(ResourceState {
                        tainted: prior.tainted,
                        ..to_state(&prior.type_name, &prior.name, data)
                    })),
                ),
                Ok(None) => (Action::Dropped, Ok(None)),
                Err(diags) => (Action::Refreshed, Err(diags.into())),
            };
            StepResult {
                address: prior.address(),
                action,
                prior: Some(prior.values),
                outcome,
            }
        }
    }
}

/// Runs `steps` concurrently and folds their results into `state`.
async fn execute(provider: &Arc<Provider>, steps: Vec<Step>, state: &mut StateFile, report: &mut Report) {
    let mut tasks = JoinSet::new();
    for step in steps {
        tasks.spawn(run_step(Arc::clone(provider), step));
    }

    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                report
                    .diagnostics
                    .push(Diagnostic::error("Resource task failed", e.to_string()));
                continue;
            }
        };
        match result.outcome {
            Ok(Some(resource)) => {
                let diff = result
                    .prior
                    .as_ref()
                    .map_or_else(|| render_diff(&Map::new(), &resource.values), |prior| {
                        render_diff(prior, &resource.values)
                    });
                let action = if diff.is_none() && result.action == Action::Refreshed {
                    Action::Unchanged
                } else {
                    result.action
                };
                state.upsert(resource);
                report.changes.push(Change {
                    address: result.address,
                    action,
                    diff,
                });
            }
            Ok(None) => {
                state.remove(&result.address);
                report.changes.push(Change {
                    address: result.address,
                    action: result.action,
                    diff: None,
                });
            }
            Err(StepFailed {
                diagnostics,
                tainted,
            }) => {
                if let Some(resource) = tainted {
                    warn!(address = %result.address, id = %resource.id, "Keeping created resource as tainted");
                    state.upsert(resource);
                    report.changes.push(Change {
                        address: result.address,
                        action: Action::Tainted,
                        diff: None,
                    });
                }
                report.diagnostics.extend(diagnostics);
            }
        }
    }
    report.changes.sort_by(|a, b| a.address.cmp(&b.address));
}

/// Brings the remote objects and `state` in line with `manifest`.
///
/// Resources tracked in `state` but absent from the manifest are deleted.
pub async fn apply(provider: &Arc<Provider>, manifest: &Manifest, state: &mut StateFile) -> Report {
    let mut report = Report {
        diagnostics: manifest.validate(provider),
        ..Report::default()
    };
    if report.has_errors() {
        return report;
    }

    let wanted: BTreeSet<String> = manifest.resources.iter().map(ResourceBlock::address).collect();
    let mut steps = Vec::new();
    for block in &manifest.resources {
        let Some(prior) = state.get(&block.address()).cloned() else {
            steps.push(Step::Create(block.clone()));
            continue;
        };
        let mut replace = provider.requires_replace(&block.type_name, &prior.values, &block.config);
        if prior.tainted {
            replace.push("tainted".to_string());
        }
        if !replace.is_empty() {
            steps.push(Step::Replace(block.clone(), prior, replace));
        } else if config_differs(&block.config, &prior.values) {
            steps.push(Step::Update(block.clone(), prior));
        } else {
            report.changes.push(Change {
                address: block.address(),
                action: Action::Unchanged,
                diff: None,
            });
        }
    }
    steps.extend(
        state
            .resources
            .iter()
            .filter(|(address, _)| !wanted.contains(*address))
            .map(|(_, prior)| Step::Delete(prior.clone())),
    );

    info!(steps = steps.len(), "Applying manifest");
    execute(provider, steps, state, &mut report).await;
    report
}

/// Re-reads every tracked resource, dropping the ones that no longer exist.
pub async fn refresh(provider: &Arc<Provider>, state: &mut StateFile) -> Report {
    let steps = state.resources.values().cloned().map(Step::Refresh).collect();
    let mut report = Report::default();
    execute(provider, steps, state, &mut report).await;
    report
}

/// Deletes every tracked resource.
pub async fn destroy(provider: &Arc<Provider>, state: &mut StateFile) -> Report {
    let steps = state.resources.values().cloned().map(Step::Delete).collect();
    let mut report = Report::default();
    execute(provider, steps, state, &mut report).await;
    report
}

/// Starts tracking an existing object under `<type_name>.<name>`.
pub async fn import(
    provider: &Provider,
    state: &mut StateFile,
    type_name: &str,
    name: &str,
    id_or_name: &str,
) -> Report {
    let mut report = Report::default();
    if let Err(e) = validate_resource_name(name) {
        report
            .diagnostics
            .push(Diagnostic::from_error("Invalid resource name", &e));
        return report;
    }

    match provider.import(type_name, id_or_name).await {
        Ok(data) => {
            let resource = to_state(type_name, name, data);
            let address = resource.address();
            match state.track_new(resource) {
                Ok(()) => report.changes.push(Change {
                    address,
                    action: Action::Imported,
                    diff: None,
                }),
                Err(e) => report
                    .diagnostics
                    .push(Diagnostic::from_error("Import refused", &e)),
            }
        }
        Err(diags) => report.diagnostics.extend(diags),
    }
    report
}
