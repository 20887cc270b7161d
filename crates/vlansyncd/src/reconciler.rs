//! Reconciliation pass orchestration
//!
//! A pass runs the prober, collector, differ and applier in sequence:
//!
//! ```text
//! probe ──unsupported──> Skipped
//!   │
//! collect ──error──> Err (nothing applied)
//!   │
//! diff ──dry run──> Planned
//!   │
//! apply removals, then additions ──> Completed(PassReport)
//! ```
//!
//! Individual apply failures are recorded on the [`PassReport`] and never
//! abort the pass. Passes are serialized: [`Reconciler::reconcile`] waits for
//! a running pass, [`Reconciler::try_reconcile`] refuses to wait.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use vlansync_common::{ExecContext, HostCommand, VlanError, VlanResult};

use crate::applier::{AddOutcome, Applier, RemoveOutcome};
use crate::collector::Collector;
use crate::commands::CommandSet;
use crate::config::VlansyncConfig;
use crate::differ::{diff, Diff};
use crate::prober::Prober;
use crate::types::{AddressFamily, DesiredState, IdentityKey};

/// Kind of apply action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Create a VLAN child
    Add,
    /// Delete a VLAN child
    Remove,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Add => write!(f, "add"),
            ActionKind::Remove => write!(f, "remove"),
        }
    }
}

/// How a single action ended
#[derive(Debug)]
pub enum ActionStatus {
    /// The host was changed
    Applied,
    /// The host was already in the target state
    AlreadyConverged,
    /// The action failed; retried on the next pass
    Failed(VlanError),
    /// The pass was cancelled before or while the action ran
    Cancelled,
}

/// Outcome of one add or remove action
#[derive(Debug)]
pub struct ActionOutcome {
    /// Action kind
    pub kind: ActionKind,
    /// Identity of the interface acted on
    pub key: IdentityKey,
    /// Kernel name of the child
    pub child_name: String,
    /// How the action ended
    pub status: ActionStatus,
}

impl ActionOutcome {
    /// Returns the error if the action failed
    pub fn error(&self) -> Option<&VlanError> {
        match &self.status {
            ActionStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Summary of an applied pass.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Pass number, starting at 1
    pub pass: u64,
    /// Removals first, then additions, in execution order
    pub outcomes: Vec<ActionOutcome>,
    /// Keys present on both sides
    pub unchanged: Vec<IdentityKey>,
    /// True if cancellation left actions unattempted
    pub cancelled: bool,
}

impl PassReport {
    /// Number of actions that changed the host
    pub fn applied_count(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Applied))
    }

    /// Number of actions whose target state already held
    pub fn converged_count(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::AlreadyConverged))
    }

    /// Number of failed actions
    pub fn failure_count(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Failed(_)))
    }

    /// Number of actions not completed because of cancellation
    pub fn cancelled_count(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Cancelled))
    }

    /// Failed actions
    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ActionStatus::Failed(_)))
    }

    /// Returns true if every action succeeded and nothing was cancelled
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failure_count() == 0 && self.cancelled_count() == 0
    }

    fn count(&self, pred: impl Fn(&ActionStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.failure_count();
        write!(
            f,
            "completed with {} failure{}",
            failures,
            if failures == 1 { "" } else { "s" }
        )?;
        if self.cancelled {
            write!(f, ", cancelled with {} not attempted", self.cancelled_count())?;
        }
        Ok(())
    }
}

/// Result of one pass
#[derive(Debug)]
pub enum PassOutcome {
    /// Host has no 802.1Q support; nothing was collected or applied
    Skipped,
    /// Dry run: actions computed but not applied
    Planned(Diff),
    /// Actions applied
    Completed(PassReport),
}

impl PassOutcome {
    /// The apply report, if the pass applied anything
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Converges host VLAN sub-interfaces to a desired-state list.
pub struct Reconciler<H: HostCommand> {
    host: H,
    commands: CommandSet,
    families: Vec<AddressFamily>,
    dry_run: bool,
    command_timeout: Option<Duration>,
    guard: Mutex<()>,
    passes: AtomicU64,
}

impl<H: HostCommand> Reconciler<H> {
    /// Create a reconciler with default command paths, both address
    /// families and no command deadline
    pub fn new(host: H) -> Self {
        Self {
            host,
            commands: CommandSet::default(),
            families: AddressFamily::ALL.to_vec(),
            dry_run: false,
            command_timeout: None,
            guard: Mutex::new(()),
            passes: AtomicU64::new(0),
        }
    }

    /// Create a reconciler from daemon configuration
    pub fn from_config(host: H, config: &VlansyncConfig) -> Self {
        Self::new(host)
            .with_commands(config.command_set())
            .with_families(config.reconcile.address_families.clone())
            .with_dry_run(config.reconcile.dry_run)
            .with_command_timeout(config.command_timeout())
    }

    /// Use custom command builders
    pub fn with_commands(mut self, commands: CommandSet) -> Self {
        self.commands = commands;
        self
    }

    /// Address families to collect
    pub fn with_families(mut self, families: Vec<AddressFamily>) -> Self {
        self.families = families;
        self
    }

    /// Stop after computing the diff
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Per-command deadline
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// The host command capability
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Number of passes started so far
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one pass, waiting for any pass already in progress.
    pub async fn reconcile(
        &self,
        desired: &DesiredState,
        cancel: &CancellationToken,
    ) -> VlanResult<PassOutcome> {
        let _guard = self.guard.lock().await;
        self.run_pass(desired, cancel).await
    }

    /// Run one pass, or fail with `PassInProgress` if one is running.
    pub async fn try_reconcile(
        &self,
        desired: &DesiredState,
        cancel: &CancellationToken,
    ) -> VlanResult<PassOutcome> {
        let _guard = self
            .guard
            .try_lock()
            .map_err(|_| VlanError::PassInProgress)?;
        self.run_pass(desired, cancel).await
    }

    async fn run_pass(
        &self,
        desired: &DesiredState,
        cancel: &CancellationToken,
    ) -> VlanResult<PassOutcome> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("pass", pass);
        self.execute_pass(pass, desired, cancel).instrument(span).await
    }

    async fn execute_pass(
        &self,
        pass: u64,
        desired: &DesiredState,
        cancel: &CancellationToken,
    ) -> VlanResult<PassOutcome> {
        let mut ctx = ExecContext::new().with_cancel(cancel.clone());
        if let Some(limit) = self.command_timeout {
            ctx = ctx.with_timeout(limit);
        }

        if !Prober::new(&self.host, &self.commands).supported(&ctx).await? {
            info!("802.1Q not supported on this host, skipping pass");
            return Ok(PassOutcome::Skipped);
        }

        let observed = Collector::new(&self.host, &self.commands, &self.families)
            .collect(&ctx)
            .await?;

        let plan = diff(&observed, desired.interfaces());
        info!(
            observed = observed.len(),
            desired = desired.len(),
            to_add = plan.to_add.len(),
            to_remove = plan.to_remove.len(),
            unchanged = plan.unchanged.len(),
            "Computed VLAN diff"
        );

        if self.dry_run {
            for iface in &plan.to_remove {
                info!(child = %iface.child_name, key = %iface.key(), "Would remove VLAN child");
            }
            for iface in &plan.to_add {
                info!(child = %iface.child_name(), key = %iface.key(), "Would add VLAN child");
            }
            return Ok(PassOutcome::Planned(plan));
        }

        let report = self.apply(pass, plan, &ctx).await;
        if report.is_clean() {
            info!(applied = report.applied_count(), "Pass {}", report);
        } else {
            warn!(
                applied = report.applied_count(),
                failed = report.failure_count(),
                cancelled = report.cancelled_count(),
                "Pass {}",
                report
            );
        }
        Ok(PassOutcome::Completed(report))
    }

    async fn apply(&self, pass: u64, plan: Diff, ctx: &ExecContext) -> PassReport {
        let applier = Applier::new(&self.host, &self.commands);
        let mut report = PassReport {
            pass,
            outcomes: Vec::with_capacity(plan.action_count()),
            unchanged: plan.unchanged,
            cancelled: false,
        };

        for iface in &plan.to_remove {
            let status = if ctx.is_cancelled() {
                ActionStatus::Cancelled
            } else {
                match applier.remove(iface, ctx).await {
                    Ok(RemoveOutcome::Removed) => ActionStatus::Applied,
                    Ok(RemoveOutcome::AlreadyAbsent) => ActionStatus::AlreadyConverged,
                    Err(e) => failed_status(e),
                }
            };
            report.outcomes.push(record(
                ActionKind::Remove,
                iface.key(),
                iface.child_name.clone(),
                status,
            ));
        }

        for iface in &plan.to_add {
            let status = if ctx.is_cancelled() {
                ActionStatus::Cancelled
            } else {
                match applier.add(iface, ctx).await {
                    Ok(AddOutcome::Created) => ActionStatus::Applied,
                    Ok(AddOutcome::AlreadyPresent) => ActionStatus::AlreadyConverged,
                    Err(e) => failed_status(e),
                }
            };
            report.outcomes.push(record(
                ActionKind::Add,
                iface.key(),
                iface.child_name(),
                status,
            ));
        }

        report.cancelled = report.cancelled_count() > 0;
        report
    }
}

fn failed_status(e: VlanError) -> ActionStatus {
    if e.is_cancelled() {
        ActionStatus::Cancelled
    } else {
        ActionStatus::Failed(e)
    }
}

fn record(
    kind: ActionKind,
    key: IdentityKey,
    child_name: String,
    status: ActionStatus,
) -> ActionOutcome {
    match &status {
        ActionStatus::Failed(e) => {
            warn!(action = %kind, key = %key, child = %child_name, error = %e, "VLAN action failed")
        }
        ActionStatus::Cancelled => {
            debug!(action = %kind, key = %key, child = %child_name, "VLAN action not attempted")
        }
        _ => {}
    }
    ActionOutcome {
        kind,
        key,
        child_name,
        status,
    }
}
