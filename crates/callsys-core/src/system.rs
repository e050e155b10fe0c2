//! The assembled queue service.
//!
//! [`QueueSystem`] owns every component and is what the HTTP layer talks
//! to. Operator commands take an authenticated [`Session`]; the permission
//! check runs before any line lookup or state change. Every successful
//! command publishes its events through the [`Broadcaster`].

use std::sync::Arc;

use callsys_db::{RecordStore, StateStore};
use callsys_types::{
    AdminLogEntry, Appointment, AppointmentId, Audience, BroadcastEvent, DailyStats, Direction,
    FeaturedContent, HistoryRecord, LineId, LineSnapshot, Permission, QueueLine, Role, Session,
    Snapshot, SystemMode,
};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::auth::{Authenticator, require};
use crate::broadcaster::Broadcaster;
use crate::clock::LocalClock;
use crate::config::CallsysConfig;
use crate::controller::{Effect, Outcome, QueueController};
use crate::dispatcher::Dispatcher;
use crate::error::QueueError;
use crate::lines::LineRegistry;
use crate::notifier::Notifier;
use crate::reporting::Reports;
use crate::settings::Settings;
use crate::subscriptions::{SubscriptionService, SubscriptionStatus};
use crate::templates::MessageTemplates;

/// Operator name recorded for scheduled work.
pub const SYSTEM_OPERATOR: &str = "system";

/// Lifetime of the once-per-date reset lock.
const DAILY_RESET_LOCK_SECS: u64 = 2 * 24 * 60 * 60;

/// Stores and transports the system runs on.
#[derive(Debug, Clone)]
pub struct Backends {
    /// Shared queue state.
    pub state: StateStore,
    /// Durable records.
    pub records: RecordStore,
    /// Outbound chat-bot messages.
    pub notifier: Notifier,
    /// Event fan-out to clients.
    pub broadcaster: Broadcaster,
}

impl Backends {
    /// Everything in process; messages are only logged.
    pub fn in_memory() -> Self {
        Self {
            state: StateStore::in_memory(),
            records: RecordStore::in_memory(),
            notifier: Notifier::Log,
            broadcaster: Broadcaster::local(),
        }
    }
}

/// The queue service facade.
#[derive(Debug)]
pub struct QueueSystem {
    config: CallsysConfig,
    clock: LocalClock,
    state: StateStore,
    lines: LineRegistry,
    controller: QueueController,
    settings: Settings,
    subscriptions: SubscriptionService,
    reports: Reports,
    auth: Authenticator,
    broadcaster: Broadcaster,
}

impl QueueSystem {
    /// Assemble the system.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Template`] if a configured message template
    /// does not compile.
    pub fn new(config: CallsysConfig, backends: Backends) -> Result<Self, QueueError> {
        let Backends {
            state,
            records,
            notifier,
            broadcaster,
        } = backends;
        let clock = LocalClock::new(&config.clock);
        let templates = Arc::new(
            MessageTemplates::new(&config.notifications.templates)
                .map_err(|e| QueueError::Template(e.to_string()))?,
        );
        let dispatcher = Dispatcher::new(
            state.clone(),
            notifier,
            Arc::clone(&templates),
            config.queue.proximity_lookahead,
        );
        let controller = QueueController::new(
            state.clone(),
            records.clone(),
            dispatcher,
            clock.clone(),
            &config,
        );

        Ok(Self {
            lines: LineRegistry::new(records.clone()),
            settings: Settings::new(state.clone()),
            subscriptions: SubscriptionService::new(
                state.clone(),
                templates,
                config.queue.subscription_ttl_secs,
            ),
            reports: Reports::new(records, state.clone(), clock.clone()),
            auth: Authenticator::new(state.clone(), config.users.clone(), &config.sessions),
            controller,
            broadcaster,
            clock,
            state,
            config,
        })
    }

    /// Create the default line when none exists.
    pub async fn start(&self) -> Result<Option<QueueLine>, QueueError> {
        let created = self
            .lines
            .ensure_default(&self.config.queue.default_line)
            .await?;
        if let Some(line) = &created {
            info!(line_id = %line.id, prefix = %line.prefix, "default line created");
        }
        Ok(created)
    }

    /// Effective configuration.
    pub const fn config(&self) -> &CallsysConfig {
        &self.config
    }

    /// Local clock.
    pub const fn clock(&self) -> &LocalClock {
        &self.clock
    }

    /// Session handling.
    pub const fn auth(&self) -> &Authenticator {
        &self.auth
    }

    /// Event fan-out.
    pub const fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Line registry.
    pub const fn lines(&self) -> &LineRegistry {
        &self.lines
    }

    async fn emit(&self, events: &[BroadcastEvent]) {
        self.broadcaster.publish(events).await;
    }

    async fn emit_outcome(&self, outcome: Outcome) -> Outcome {
        self.emit(&outcome.events).await;
        outcome
    }

    async fn emit_effect<T>(&self, effect: Effect<T>) -> T {
        self.emit(&effect.events).await;
        effect.value
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Full state for a newly connected client.
    ///
    /// The operator log is included for privileged clients only.
    pub async fn snapshot(&self, audience: Audience) -> Result<Snapshot, QueueError> {
        let mut lines = Vec::new();
        for line in self.lines.list().await? {
            let state = self.state.queue_state(line.id).await?;
            let passed = self.state.list_passed(line.id).await?;
            let wait_minutes = self.controller.estimator().estimate(line.id, false).await;
            lines.push(LineSnapshot {
                line,
                state,
                passed,
                wait_minutes,
            });
        }
        let admin_log = match audience {
            Audience::Privileged => self.reports.admin_log().await?,
            Audience::Public => Vec::new(),
        };
        Ok(Snapshot {
            lines,
            featured: self.settings.featured().await?,
            is_public: self.settings.is_public().await?,
            sound_enabled: self.settings.sound_enabled().await?,
            mode: self.settings.mode().await?,
            admin_log,
        })
    }

    // =========================================================================
    // Counter commands
    // =========================================================================

    /// Call the next number or roll back by one.
    pub async fn call(
        &self,
        session: &Session,
        line_id: LineId,
        direction: Direction,
    ) -> Result<Outcome, QueueError> {
        require(session, Permission::Call)?;
        let line = self.lines.get(line_id).await?;
        let outcome = match direction {
            Direction::Next => self.controller.call_next(&line, &session.nickname).await?,
            Direction::Prev => self.controller.call_prev(&line, &session.nickname).await?,
        };
        Ok(self.emit_outcome(outcome).await)
    }

    /// Set the current number; zero resets the line.
    pub async fn set_call(
        &self,
        session: &Session,
        line_id: LineId,
        number: u64,
    ) -> Result<Outcome, QueueError> {
        require(session, Permission::Call)?;
        let line = self.lines.get(line_id).await?;
        let outcome = self
            .controller
            .set_current(&line, number, &session.nickname)
            .await?;
        Ok(self.emit_outcome(outcome).await)
    }

    /// Issue the next ticket or withdraw the last one.
    pub async fn issue(
        &self,
        session: &Session,
        line_id: LineId,
        direction: Direction,
    ) -> Result<Outcome, QueueError> {
        require(session, Permission::Issue)?;
        let line = self.lines.get(line_id).await?;
        let outcome = match direction {
            Direction::Next => self.controller.issue_next(&line, &session.nickname).await?,
            Direction::Prev => self.controller.issue_prev(&line, &session.nickname).await?,
        };
        Ok(self.emit_outcome(outcome).await)
    }

    /// Set the issued number.
    pub async fn set_issue(
        &self,
        session: &Session,
        line_id: LineId,
        number: u64,
    ) -> Result<Outcome, QueueError> {
        require(session, Permission::Issue)?;
        let line = self.lines.get(line_id).await?;
        let outcome = self
            .controller
            .set_issued(&line, number, &session.nickname)
            .await?;
        Ok(self.emit_outcome(outcome).await)
    }

    /// Self-service ticket for an anonymous caller.
    pub async fn take_ticket(&self, caller: &str, line_id: LineId) -> Result<Outcome, QueueError> {
        let line = self.lines.get(line_id).await?;
        let outcome = self.controller.take_ticket(&line, caller).await?;
        Ok(self.emit_outcome(outcome).await)
    }

    /// Pass the current number and call the next.
    pub async fn pass_current(&self, session: &Session, line_id: LineId) -> Result<Outcome, QueueError> {
        require(session, Permission::Pass)?;
        let line = self.lines.get(line_id).await?;
        let outcome = self.controller.mark_passed(&line, &session.nickname).await?;
        Ok(self.emit_outcome(outcome).await)
    }

    /// Recall a passed number.
    pub async fn recall_passed(
        &self,
        session: &Session,
        line_id: LineId,
        number: u64,
    ) -> Result<Outcome, QueueError> {
        require(session, Permission::Recall)?;
        let line = self.lines.get(line_id).await?;
        let outcome = self
            .controller
            .recall_passed(&line, number, &session.nickname)
            .await?;
        Ok(self.emit_outcome(outcome).await)
    }

    /// Add a number to the passed list.
    pub async fn add_passed(
        &self,
        session: &Session,
        line_id: LineId,
        number: u64,
    ) -> Result<Vec<u64>, QueueError> {
        require(session, Permission::Recall)?;
        let line = self.lines.get(line_id).await?;
        let effect = self
            .controller
            .add_passed(&line, number, &session.nickname)
            .await?;
        Ok(self.emit_effect(effect).await)
    }

    /// Remove a number from the passed list.
    pub async fn remove_passed(
        &self,
        session: &Session,
        line_id: LineId,
        number: u64,
    ) -> Result<Vec<u64>, QueueError> {
        require(session, Permission::Recall)?;
        let line = self.lines.get(line_id).await?;
        let effect = self
            .controller
            .remove_passed(&line, number, &session.nickname)
            .await?;
        Ok(self.emit_effect(effect).await)
    }

    /// Clear the passed list.
    pub async fn clear_passed(&self, session: &Session, line_id: LineId) -> Result<(), QueueError> {
        require(session, Permission::Recall)?;
        let line = self.lines.get(line_id).await?;
        let effect = self.controller.clear_passed(&line, &session.nickname).await?;
        self.emit_effect(effect).await;
        Ok(())
    }

    /// Passed numbers of a line (public).
    pub async fn passed(&self, line_id: LineId) -> Result<Vec<u64>, QueueError> {
        let line = self.lines.get(line_id).await?;
        self.subscriptions.list_passed(&line).await
    }

    /// Reset one line.
    pub async fn reset(&self, session: &Session, line_id: LineId) -> Result<Outcome, QueueError> {
        require(session, Permission::Settings)?;
        let line = self.lines.get(line_id).await?;
        let outcome = self.controller.reset(&line, &session.nickname).await?;
        Ok(self.emit_outcome(outcome).await)
    }

    /// Reset every line once per local date, across all instances.
    ///
    /// Returns `false` when another instance already ran it.
    pub async fn run_daily_reset(&self, date: NaiveDate) -> Result<bool, QueueError> {
        let lock = format!("daily-reset:{}", date.format("%Y-%m-%d"));
        if !self.state.claim_once(&lock, DAILY_RESET_LOCK_SECS).await? {
            info!(%date, "daily reset already claimed by another instance");
            return Ok(false);
        }
        for line in self.lines.refresh().await? {
            match self.controller.reset(&line, SYSTEM_OPERATOR).await {
                Ok(outcome) => {
                    self.emit_outcome(outcome).await;
                }
                Err(e) => warn!(line_id = %line.id, error = %e, "daily reset of line failed"),
            }
        }
        info!(%date, "daily reset complete");
        Ok(true)
    }

    /// Evict expired in-process entries and dangling subscription indexes.
    pub async fn sweep(&self) -> Result<usize, QueueError> {
        let ids: Vec<LineId> = self.lines.list().await?.iter().map(|l| l.id).collect();
        Ok(self.state.sweep(&ids).await?)
    }

    // =========================================================================
    // Appointments
    // =========================================================================

    /// Reserve a number for a scheduled time.
    pub async fn add_appointment(
        &self,
        session: &Session,
        line_id: LineId,
        number: u64,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Appointment, QueueError> {
        require(session, Permission::Appointment)?;
        let line = self.lines.get(line_id).await?;
        let effect = self
            .controller
            .add_appointment(&line, number, scheduled_at, &session.nickname)
            .await?;
        Ok(self.emit_effect(effect).await)
    }

    /// Delete an appointment.
    pub async fn remove_appointment(
        &self,
        session: &Session,
        id: AppointmentId,
    ) -> Result<(), QueueError> {
        require(session, Permission::Appointment)?;
        let effect = self
            .controller
            .remove_appointment(id, &session.nickname)
            .await?;
        self.emit_effect(effect).await;
        Ok(())
    }

    /// List appointments, optionally for one line.
    pub async fn list_appointments(
        &self,
        session: &Session,
        line_id: Option<LineId>,
    ) -> Result<Vec<Appointment>, QueueError> {
        require(session, Permission::Appointment)?;
        self.controller.list_appointments(line_id).await
    }

    // =========================================================================
    // Lines
    // =========================================================================

    /// Create a line (admin only).
    pub async fn create_line(
        &self,
        session: &Session,
        name: &str,
        prefix: &str,
        color: &str,
    ) -> Result<QueueLine, QueueError> {
        require_admin(session)?;
        let line = self.lines.create(name, prefix, color).await?;
        self.lines_changed(session, format!("created line {} ({})", line.name, line.prefix))
            .await?;
        Ok(line)
    }

    /// Delete a line and its queue state (admin only).
    pub async fn delete_line(&self, session: &Session, line_id: LineId) -> Result<(), QueueError> {
        require_admin(session)?;
        let line = self.lines.delete(line_id).await?;
        self.state.reset_counters(line.id).await?;
        self.state.clear_subscriptions(line.id).await?;
        self.lines_changed(session, format!("deleted line {} ({})", line.name, line.prefix))
            .await
    }

    async fn lines_changed(&self, session: &Session, message: String) -> Result<(), QueueError> {
        let lines = self.lines.list().await?;
        let log = self.controller.log_action(&session.nickname, message).await;
        self.emit(&[BroadcastEvent::LinesUpdated { lines }, log]).await;
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    async fn setting_changed(&self, session: &Session, event: BroadcastEvent, message: String) {
        let log = self.controller.log_action(&session.nickname, message).await;
        self.emit(&[event, log]).await;
    }

    /// Open or close the system to the public.
    pub async fn set_public(&self, session: &Session, is_public: bool) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        let event = self.settings.set_public(is_public).await?;
        let message = if is_public { "opened the system" } else { "closed the system" };
        self.setting_changed(session, event, message.to_owned()).await;
        Ok(())
    }

    /// Toggle display sounds.
    pub async fn set_sound(&self, session: &Session, enabled: bool) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        let event = self.settings.set_sound(enabled).await?;
        let message = if enabled { "enabled sound" } else { "muted sound" };
        self.setting_changed(session, event, message.to_owned()).await;
        Ok(())
    }

    /// Switch between ticketing and manual-input mode.
    pub async fn set_mode(&self, session: &Session, mode: SystemMode) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        let event = self.settings.set_mode(mode).await?;
        self.setting_changed(session, event, format!("switched to {} mode", mode.as_str()))
            .await;
        Ok(())
    }

    /// Featured links (public).
    pub async fn featured(&self) -> Result<Vec<FeaturedContent>, QueueError> {
        self.settings.featured().await
    }

    /// Add or replace a featured link.
    pub async fn add_featured(
        &self,
        session: &Session,
        link_text: &str,
        link_url: &str,
    ) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        let event = self.settings.add_featured(link_text, link_url).await?;
        self.setting_changed(session, event, format!("featured {}", link_url.trim()))
            .await;
        Ok(())
    }

    /// Remove a featured link.
    pub async fn remove_featured(&self, session: &Session, link_url: &str) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        let event = self.settings.remove_featured(link_url).await?;
        self.setting_changed(session, event, format!("unfeatured {}", link_url.trim()))
            .await;
        Ok(())
    }

    /// Remove every featured link.
    pub async fn clear_featured(&self, session: &Session) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        let event = self.settings.clear_featured().await?;
        self.setting_changed(session, event, "cleared featured links".to_owned())
            .await;
        Ok(())
    }

    /// Push a one-off announcement to every display.
    pub async fn announce(&self, session: &Session, message: &str) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        let event = Settings::announce(message)?;
        self.setting_changed(session, event, format!("announced: {}", message.trim()))
            .await;
        Ok(())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe to a number on the line with `prefix`.
    pub async fn subscribe(
        &self,
        subscriber_id: &str,
        prefix: &str,
        number: u64,
    ) -> Result<SubscriptionStatus, QueueError> {
        let line = self.lines.by_prefix(prefix).await?;
        self.subscriptions.subscribe(subscriber_id, &line, number).await
    }

    /// Cancel a subscriber's target.
    pub async fn cancel_subscription(
        &self,
        subscriber_id: &str,
    ) -> Result<Option<SubscriptionStatus>, QueueError> {
        self.subscriptions.cancel(subscriber_id, &self.lines).await
    }

    /// A subscriber's live target.
    pub async fn query_subscription(
        &self,
        subscriber_id: &str,
    ) -> Result<Option<SubscriptionStatus>, QueueError> {
        self.subscriptions.query(subscriber_id, &self.lines).await
    }

    /// Passed numbers of the line with `prefix`.
    pub async fn passed_by_prefix(&self, prefix: &str) -> Result<Vec<u64>, QueueError> {
        let line = self.lines.by_prefix(prefix).await?;
        self.subscriptions.list_passed(&line).await
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// History of a date range (any authenticated session).
    pub async fn history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        line_id: Option<LineId>,
    ) -> Result<Vec<HistoryRecord>, QueueError> {
        self.reports.history(from, to, line_id).await
    }

    /// Hourly call statistics of one day (any authenticated session).
    pub async fn daily_stats(
        &self,
        date: NaiveDate,
        line_id: Option<LineId>,
    ) -> Result<DailyStats, QueueError> {
        self.reports.daily_stats(date, line_id).await
    }

    /// Operator log, newest first (any authenticated session).
    pub async fn admin_log(&self) -> Result<Vec<AdminLogEntry>, QueueError> {
        self.reports.admin_log().await
    }

    /// Delete the operator log.
    pub async fn clear_admin_log(&self, session: &Session) -> Result<(), QueueError> {
        require(session, Permission::Settings)?;
        self.reports.clear_admin_log().await
    }
}

/// Line management is reserved to admins.
fn require_admin(session: &Session) -> Result<(), QueueError> {
    if session.role == Role::Admin {
        Ok(())
    } else {
        Err(QueueError::Forbidden(Permission::Settings))
    }
}
