use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use polaris_core::differ::{Diff, diff};
use polaris_core::provider::Provider;
use polaris_core::resource::{Resource, ResourceId, State, Value};
use polaris_provider::feature::{Cloud, FeatureRegistry};
use polaris_provider::plan::{OperationKind, ReconcilePlan};
use polaris_provider::resources::SLA_DOMAIN_ASSIGNMENT;
use polaris_provider::sla::SlaDomainAssignment;
use polaris_provider::{MemoryApi, PolarisProvider, ProviderConfig};

mod input;
mod state;

use input::Definitions;
use state::{StateFile, state_path};

#[derive(Parser)]
#[command(name = "polaris")]
#[command(about = "Manage RSC cloud accounts and SLA domain assignments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a resource definition file
    Validate {
        /// Path to the definition file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show the operations needed to reach the definitions
    Plan {
        /// Path to the definition file
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Path to the state file
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Apply the definitions
    Apply {
        /// Path to the definition file
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Path to the state file
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Offboard every resource recorded in the state file
    Destroy {
        /// Path to the state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling pending waits");
            on_signal.cancel();
        }
    });

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file, state } => run_plan(&file, &state_path(state), &cancel).await,
        Commands::Apply { file, state } => run_apply(&file, &state_path(state), &cancel).await,
        Commands::Destroy {
            state,
            auto_approve,
        } => run_destroy(&state_path(state), auto_approve, &cancel).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

// =============================================================================
// Commands
// =============================================================================

fn run_validate(file: &Path) -> Result<(), String> {
    let defs = Definitions::load(file)?;

    println!("{}", "Validating...".cyan());

    ProviderConfig::from_attributes(&defs.provider).map_err(|e| e.to_string())?;
    let api = Arc::new(MemoryApi::new());
    let provider = PolarisProvider::new(api.clone(), api, ProviderConfig::default());
    validate_resources(&provider, &defs.resources)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            defs.resources.len()
        )
        .green()
        .bold()
    );
    for resource in &defs.resources {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_plan(file: &Path, state: &Path, cancel: &CancellationToken) -> Result<(), String> {
    let defs = Definitions::load(file)?;
    let state_file = StateFile::load(state)?;
    let session = Session::open(&defs.provider, &state_file, cancel)?;
    validate_resources(&session.provider, &defs.resources)?;

    let changes = session.changes(&defs.resources, &state_file).await?;
    print_changes(&changes);
    Ok(())
}

async fn run_apply(file: &Path, state: &Path, cancel: &CancellationToken) -> Result<(), String> {
    let defs = Definitions::load(file)?;
    let mut state_file = StateFile::load(state)?;
    let session = Session::open(&defs.provider, &state_file, cancel)?;
    validate_resources(&session.provider, &defs.resources)?;

    let changes = session.changes(&defs.resources, &state_file).await?;
    print_changes(&changes);
    if changes.iter().all(|c| !c.is_change()) {
        // Refreshed state is still worth keeping
        for change in &changes {
            change.record_current(&mut state_file);
        }
        state_file.remote = session.api.store();
        return state_file.save(state);
    }

    println!();
    println!("{}", "Applying changes...".cyan().bold());
    session.apply(&changes, &mut state_file, state).await
}

async fn run_destroy(
    state: &Path,
    auto_approve: bool,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let mut state_file = StateFile::load(state)?;
    if state_file.resources.is_empty() {
        println!("{}", "No resources recorded in the state file.".yellow());
        return Ok(());
    }

    let session = Session::open(&HashMap::new(), &state_file, cancel)?;
    let changes = session.changes(&[], &state_file).await?;
    print_changes(&changes);
    if changes.iter().all(|c| !c.is_change()) {
        return Ok(());
    }

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!();
    println!("{}", "Destroying resources...".red().bold());
    session.apply(&changes, &mut state_file, state).await
}

fn validate_resources(provider: &PolarisProvider, resources: &[Resource]) -> Result<(), String> {
    let errors: Vec<String> = resources
        .iter()
        .filter_map(|r| provider.validate_resource(r).err())
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!();
    println!("{}", question.yellow().bold());
    print!("  Only 'yes' will be accepted to approve: ");
    io::stdout()
        .flush()
        .map_err(|e| format!("Failed to flush stdout: {}", e))?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .map_err(|e| format!("Failed to read input: {}", e))?;
    Ok(answer.trim() == "yes")
}

// =============================================================================
// Planning and execution
// =============================================================================

/// Change to one resource
#[derive(Debug)]
enum Change {
    /// Cloud account to onboard or reconcile
    Account {
        to: Resource,
        current: State,
        plan: ReconcilePlan,
        /// Non-feature attributes that changed
        changed: Vec<String>,
    },
    /// Cloud account to offboard
    Offboard { current: State, plan: ReconcilePlan },
    /// SLA domain assignment to create, update or keep
    Sla { diff: Diff, current: State },
    /// SLA domain assignment to remove
    SlaRemove { current: State },
}

impl Change {
    fn id(&self) -> &ResourceId {
        match self {
            Change::Account { to, .. } => &to.id,
            Change::Offboard { current, .. }
            | Change::SlaRemove { current }
            | Change::Sla { current, .. } => &current.id,
        }
    }

    fn is_change(&self) -> bool {
        match self {
            Change::Account {
                current,
                plan,
                changed,
                ..
            } => !current.exists || !plan.is_empty() || !changed.is_empty(),
            Change::Offboard { current, .. } | Change::SlaRemove { current } => current.exists,
            Change::Sla { diff, .. } => diff.is_change(),
        }
    }

    fn record_current(&self, state_file: &mut StateFile) {
        match self {
            Change::Account { current, .. } | Change::Sla { current, .. } => {
                state_file.record(&current.id, current)
            }
            Change::Offboard { current, .. } | Change::SlaRemove { current } => {
                if !current.exists {
                    state_file.forget(&current.id);
                }
            }
        }
    }
}

/// Provider bound to the simulated remote of a state file
struct Session {
    api: Arc<MemoryApi>,
    provider: PolarisProvider,
}

impl Session {
    fn open(
        provider_attributes: &HashMap<String, Value>,
        state_file: &StateFile,
        cancel: &CancellationToken,
    ) -> Result<Self, String> {
        let config = ProviderConfig::from_attributes(provider_attributes).map_err(|e| e.to_string())?;
        if let Some(account) = &config.service_account {
            log::info!(
                "service account '{}' validated; changes apply to the local simulation",
                account.name
            );
        }

        let api = Arc::new(MemoryApi::from_store(state_file.remote.clone()));
        let provider = PolarisProvider::new(api.clone(), api.clone(), config)
            .with_cancellation(cancel.clone());
        Ok(Self { api, provider })
    }

    async fn refresh(&self, id: &ResourceId, prior: Option<&State>) -> Result<State, String> {
        let identifier = prior.and_then(|s| s.identifier.as_deref());
        self.provider
            .read(id, identifier, prior)
            .await
            .map_err(|e| format!("Failed to read {}: {}", id, e))
    }

    /// Changes turning the recorded state into `resources`
    ///
    /// Recorded resources missing from `resources` are removed, SLA
    /// assignments before accounts.
    async fn changes(
        &self,
        resources: &[Resource],
        state_file: &StateFile,
    ) -> Result<Vec<Change>, String> {
        let mut changes = Vec::new();

        for resource in resources {
            let prior = state_file.get(&resource.id)?;
            let current = self.refresh(&resource.id, prior.as_ref()).await?;
            changes.push(self.change_for(resource, current).await?);
        }

        let mut removals = Vec::new();
        for record in state_file.resources.values() {
            let id = record.id();
            if resources.iter().any(|r| r.id == id) {
                continue;
            }
            let prior = record.to_state()?;
            let current = self.refresh(&id, Some(&prior)).await?;
            if id.resource_type == SLA_DOMAIN_ASSIGNMENT {
                removals.push((0, Change::SlaRemove { current }));
            } else {
                let plan = if current.exists {
                    self.provider
                        .plan_offboard(&current)
                        .await
                        .map_err(|e| e.to_string())?
                } else {
                    ReconcilePlan::new()
                };
                removals.push((1, Change::Offboard { current, plan }));
            }
        }
        removals.sort_by_key(|(rank, _)| *rank);
        changes.extend(removals.into_iter().map(|(_, c)| c));

        Ok(changes)
    }

    async fn change_for(&self, resource: &Resource, current: State) -> Result<Change, String> {
        let attributes = self
            .provider
            .validate_resource(resource)
            .map_err(|e| e.to_string())?;

        if resource.id.resource_type == SLA_DOMAIN_ASSIGNMENT {
            // Compare in canonical form so object ordering is not a change
            let canonical = SlaDomainAssignment::from_attributes(&attributes)
                .map_err(|errors| {
                    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                    format!("{}: {}", resource.id, messages.join("; "))
                })?
                .to_attributes();
            let desired = Resource {
                id: resource.id.clone(),
                attributes: canonical,
            };
            return Ok(Change::Sla {
                diff: diff(&desired, &current),
                current,
            });
        }

        let cloud = Cloud::from_resource_type(&resource.id.resource_type)
            .ok_or_else(|| format!("Unsupported resource type: {}", resource.id.resource_type))?;
        let plan = self
            .provider
            .plan_account(current.exists.then_some(&current), resource)
            .await
            .map_err(|e| e.to_string())?;

        let mut desired = Resource {
            id: resource.id.clone(),
            attributes,
        };
        desired
            .attributes
            .entry("name".to_string())
            .or_insert_with(|| Value::String(resource.id.name.clone()));
        let changed = match diff(&desired, &current) {
            Diff::Update {
                changed_attributes,
                ..
            } if current.exists => {
                let registry = FeatureRegistry::for_cloud(cloud);
                changed_attributes
                    .into_iter()
                    .filter(|name| registry.by_key(name).is_none())
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(Change::Account {
            to: resource.clone(),
            current,
            plan,
            changed,
        })
    }

    /// Execute changes in order, saving the state after each one
    async fn apply(
        &self,
        changes: &[Change],
        state_file: &mut StateFile,
        path: &Path,
    ) -> Result<(), String> {
        let mut failed = None;

        for change in changes {
            if !change.is_change() {
                change.record_current(state_file);
                continue;
            }

            match self.execute(change).await {
                Ok(Some(state)) => {
                    println!("  {} {}", "✓".green(), change.id());
                    state_file.record(&state.id, &state);
                }
                Ok(None) => {
                    println!("  {} {}", "✓".green(), change.id());
                    state_file.forget(change.id());
                }
                Err(e) => {
                    println!("  {} {}", "✗".red(), change.id());
                    failed = Some(format!("{}: {}", change.id(), e));
                    break;
                }
            }
        }

        // Remote changes made before a failure are kept
        state_file.remote = self.api.store();
        state_file.save(path)?;

        match failed {
            Some(e) => Err(e),
            None => {
                println!();
                println!("{}", "Apply complete!".green().bold());
                Ok(())
            }
        }
    }

    async fn execute(&self, change: &Change) -> Result<Option<State>, String> {
        let provider = &self.provider;
        let result = match change {
            Change::Account { to, current, .. } | Change::Sla {
                diff: Diff::Update { to, .. } | Diff::Create(to),
                current,
            } => match current.identifier.as_deref().filter(|_| current.exists) {
                Some(identifier) => provider
                    .update(&to.id, identifier, current, to)
                    .await
                    .map(Some),
                None => provider.create(to).await.map(Some),
            },
            Change::Sla {
                diff: Diff::NoChange(_),
                current,
            } => Ok(Some(current.clone())),
            Change::Offboard { current, .. } | Change::SlaRemove { current } => {
                match current.identifier.as_deref() {
                    Some(identifier) => provider
                        .delete(&current.id, identifier, current)
                        .await
                        .map(|()| None),
                    None => Ok(None),
                }
            }
        };
        result.map_err(|e| e.to_string())
    }
}

// =============================================================================
// Output
// =============================================================================

fn print_changes(changes: &[Change]) {
    let pending: Vec<&Change> = changes.iter().filter(|c| c.is_change()).collect();
    if pending.is_empty() {
        println!("{}", "No changes. Accounts are up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    let (mut create, mut update, mut destroy) = (0, 0, 0);
    for change in pending {
        match change {
            Change::Account {
                current,
                plan,
                changed,
                ..
            } => {
                if current.exists {
                    update += 1;
                    println!("  {} {}", "~".yellow().bold(), change.id().to_string().yellow());
                } else {
                    create += 1;
                    println!("  {} {}", "+".green().bold(), change.id().to_string().green());
                }
                print_operations(plan);
                for name in changed {
                    println!("      {} {}", "~".yellow(), name);
                }
            }
            Change::Offboard { plan, .. } => {
                destroy += 1;
                println!("  {} {}", "-".red().bold(), change.id().to_string().red());
                print_operations(plan);
            }
            Change::Sla { diff, .. } => match diff {
                Diff::Create(_) => {
                    create += 1;
                    println!("  {} {}", "+".green().bold(), change.id().to_string().green());
                }
                Diff::Update {
                    changed_attributes,
                    ..
                } => {
                    update += 1;
                    println!("  {} {}", "~".yellow().bold(), change.id().to_string().yellow());
                    for name in changed_attributes {
                        println!("      {} {}", "~".yellow(), name);
                    }
                }
                Diff::NoChange(_) => {}
            },
            Change::SlaRemove { .. } => {
                destroy += 1;
                println!("  {} {}", "-".red().bold(), change.id().to_string().red());
            }
        }
    }

    println!();
    println!(
        "Plan: {} to create, {} to update, {} to destroy.",
        create.to_string().green(),
        update.to_string().yellow(),
        destroy.to_string().red()
    );
}

fn print_operations(plan: &ReconcilePlan) {
    for op in plan.operations() {
        let line = format!("[{:>2}] {}", op.order, op);
        let line = match op.kind {
            OperationKind::AddFeature => line.green(),
            OperationKind::RemoveFeature => line.red(),
            OperationKind::TemporaryRemoveFeature | OperationKind::UpdateInPlace => line.yellow(),
            OperationKind::AcknowledgePermissions => line.cyan(),
        };
        println!("      {}", line);
    }
    if !plan.is_empty() {
        println!("      {}", plan.summary().to_string().dimmed());
    }
}
