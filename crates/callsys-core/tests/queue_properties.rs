//! End-to-end queue behavior through [`QueueSystem`] on the in-process
//! backends, with a recording notifier standing in for LINE.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    missing_docs
)]

use callsys_core::config::UserConfig;
use callsys_core::notifier::{Notifier, Recorder};
use callsys_core::{Backends, CallsysConfig, QueueError, QueueSystem};
use callsys_db::{RecordStore, StateStore};
use callsys_types::{
    AppointmentStatus, Audience, Direction, HistoryAction, QueueLine, QueueState, Role, Session,
    SystemMode,
};
use chrono::{Duration, Utc};

struct Harness {
    system: QueueSystem,
    store: StateStore,
    records: RecordStore,
    recorder: Recorder,
    admin: Session,
    operator: Session,
    line: QueueLine,
}

fn user(username: &str, role: Role) -> UserConfig {
    UserConfig {
        username: username.to_owned(),
        password: "pw".to_owned(),
        role,
        nickname: String::new(),
    }
}

async fn harness() -> Harness {
    let config = CallsysConfig {
        users: vec![user("admin", Role::Admin), user("alice", Role::Operator)],
        ..CallsysConfig::default()
    };
    let recorder = Recorder::new();
    let backends = Backends {
        notifier: Notifier::Recording(recorder.clone()),
        ..Backends::in_memory()
    };
    let store = backends.state.clone();
    let records = backends.records.clone();
    let system = QueueSystem::new(config, backends).expect("system builds");
    let admin = system.auth().login("admin", "pw").await.unwrap();
    let operator = system.auth().login("alice", "pw").await.unwrap();
    let line = system
        .create_line(&admin, "General", "G", "#336699")
        .await
        .unwrap();
    Harness {
        system,
        store,
        records,
        recorder,
        admin,
        operator,
        line,
    }
}

impl Harness {
    async fn state(&self) -> QueueState {
        let snapshot = self.system.snapshot(Audience::Public).await.unwrap();
        snapshot
            .lines
            .into_iter()
            .find(|l| l.line.id == self.line.id)
            .map(|l| l.state)
            .expect("line in snapshot")
    }

    async fn set(&self, current: u64, issued: u64) {
        self.system
            .set_issue(&self.operator, self.line.id, issued)
            .await
            .unwrap();
        self.system
            .set_call(&self.operator, self.line.id, current)
            .await
            .unwrap();
    }

    async fn history_count(&self) -> usize {
        let today = Utc::now().date_naive();
        let from = today.pred_opt().unwrap();
        let to = today.succ_opt().unwrap();
        self.system
            .history(from, to, Some(self.line.id))
            .await
            .unwrap()
            .len()
    }
}

#[tokio::test]
async fn issued_never_falls_below_current() {
    let h = harness().await;
    let id = h.line.id;
    let op = &h.operator;

    for step in 0..40_u64 {
        let _ = match step % 7 {
            0 | 1 => h.system.issue(op, id, Direction::Next).await,
            2 | 3 => h.system.call(op, id, Direction::Next).await,
            4 => h.system.call(op, id, Direction::Prev).await,
            5 => h.system.issue(op, id, Direction::Prev).await,
            _ => h.system.set_call(op, id, step / 2).await,
        };
        let state = h.state().await;
        assert!(
            state.issued >= state.current,
            "step {step}: issued {} < current {}",
            state.issued,
            state.current
        );
    }
}

#[tokio::test]
async fn call_next_stops_at_issued() {
    let h = harness().await;
    h.system
        .set_issue(&h.operator, h.line.id, 3)
        .await
        .unwrap();

    for expected in 1..=3 {
        let outcome = h
            .system
            .call(&h.operator, h.line.id, Direction::Next)
            .await
            .unwrap();
        assert_eq!(outcome.number, expected);
    }
    let err = h
        .system
        .call(&h.operator, h.line.id, Direction::Next)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::Exhausted {
            current: 3,
            issued: 3
        }
    ));
    assert_eq!(h.state().await, QueueState::new(3, 3));
}

#[tokio::test]
async fn call_prev_at_zero_writes_nothing() {
    let h = harness().await;
    let before = h.history_count().await;
    let outcome = h
        .system
        .call(&h.operator, h.line.id, Direction::Prev)
        .await
        .unwrap();
    assert_eq!(outcome.number, 0);
    assert!(outcome.events.is_empty());
    assert_eq!(h.history_count().await, before);
}

#[tokio::test]
async fn resubscribing_moves_the_subscriber() {
    let h = harness().await;
    h.system.set_issue(&h.operator, h.line.id, 12).await.unwrap();
    h.system.subscribe("U1", "G", 10).await.unwrap();
    h.system.subscribe("U1", "g", 12).await.unwrap();

    let status = h.system.query_subscription("U1").await.unwrap().unwrap();
    assert_eq!(status.subscription.number, 12);

    h.system.set_call(&h.operator, h.line.id, 10).await.unwrap();
    assert!(h.recorder.take().await.is_empty());

    h.system.set_call(&h.operator, h.line.id, 12).await.unwrap();
    let sent = h.recorder.take().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "U1");
    assert!(sent[0].text.contains("G12"));
}

#[tokio::test]
async fn arrival_is_delivered_once() {
    let h = harness().await;
    h.system.set_issue(&h.operator, h.line.id, 3).await.unwrap();
    h.system.subscribe("U1", "G", 2).await.unwrap();

    h.system.call(&h.operator, h.line.id, Direction::Next).await.unwrap();
    h.system.call(&h.operator, h.line.id, Direction::Next).await.unwrap();
    assert_eq!(h.recorder.take().await.len(), 1);
    assert!(h.system.query_subscription("U1").await.unwrap().is_none());

    h.system.call(&h.operator, h.line.id, Direction::Prev).await.unwrap();
    h.system.call(&h.operator, h.line.id, Direction::Next).await.unwrap();
    assert!(h.recorder.take().await.is_empty());
}

#[tokio::test]
async fn proximity_message_precedes_arrival() {
    let h = harness().await;
    h.system.set_issue(&h.operator, h.line.id, 9).await.unwrap();
    h.system.subscribe("U1", "G", 8).await.unwrap();

    h.system.set_call(&h.operator, h.line.id, 3).await.unwrap();
    let sent = h.recorder.take().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("5 more to go"));
    assert!(h.system.query_subscription("U1").await.unwrap().is_some());
}

#[tokio::test]
async fn due_appointment_preempts_sequential_call() {
    let h = harness().await;
    h.set(5, 10).await;
    let appointment = h
        .system
        .add_appointment(&h.admin, h.line.id, 8, Utc::now() - Duration::minutes(1))
        .await
        .unwrap();

    let outcome = h
        .system
        .call(&h.operator, h.line.id, Direction::Next)
        .await
        .unwrap();
    assert_eq!(outcome.number, 8);
    assert_eq!(h.state().await, QueueState::new(8, 10));

    let listed = h
        .system
        .list_appointments(&h.admin, Some(h.line.id))
        .await
        .unwrap();
    let stored = listed.iter().find(|a| a.id == appointment.id).unwrap();
    assert_eq!(stored.status, AppointmentStatus::Called);

    let history = h
        .system
        .history(
            Utc::now().date_naive().pred_opt().unwrap(),
            Utc::now().date_naive().succ_opt().unwrap(),
            Some(h.line.id),
        )
        .await
        .unwrap();
    assert!(
        history
            .iter()
            .any(|r| r.action == HistoryAction::AppointmentCall && r.number == 8)
    );
}

#[tokio::test]
async fn pass_with_nothing_waiting_returns_passed_number() {
    let h = harness().await;
    h.set(5, 5).await;

    let outcome = h.system.pass_current(&h.operator, h.line.id).await.unwrap();
    assert_eq!(outcome.number, 5);
    assert_eq!(h.system.passed(h.line.id).await.unwrap(), vec![5]);
    assert_eq!(h.state().await, QueueState::new(5, 5));
}

#[tokio::test]
async fn recall_raises_issued_and_empties_passed() {
    let h = harness().await;
    h.set(5, 6).await;
    h.system.pass_current(&h.operator, h.line.id).await.unwrap();
    assert_eq!(h.state().await, QueueState::new(6, 6));
    h.system
        .add_passed(&h.operator, h.line.id, 20)
        .await
        .unwrap();

    let outcome = h
        .system
        .recall_passed(&h.operator, h.line.id, 20)
        .await
        .unwrap();
    assert_eq!(outcome.number, 20);
    assert_eq!(h.state().await, QueueState::new(20, 20));
    assert_eq!(h.system.passed(h.line.id).await.unwrap(), vec![5]);

    h.system
        .recall_passed(&h.operator, h.line.id, 5)
        .await
        .unwrap();
    assert_eq!(h.state().await, QueueState::new(5, 20));
    assert!(h.system.passed(h.line.id).await.unwrap().is_empty());
    assert!(matches!(
        h.system.recall_passed(&h.operator, h.line.id, 5).await,
        Err(QueueError::NotFound(_))
    ));
}

#[tokio::test]
async fn set_current_raises_but_never_lowers_issued() {
    let h = harness().await;
    h.system.set_issue(&h.operator, h.line.id, 10).await.unwrap();

    h.system.set_call(&h.operator, h.line.id, 3).await.unwrap();
    assert_eq!(h.state().await, QueueState::new(3, 10));

    h.system.set_call(&h.operator, h.line.id, 50).await.unwrap();
    assert_eq!(h.state().await, QueueState::new(50, 50));

    h.system.set_call(&h.operator, h.line.id, 7).await.unwrap();
    assert_eq!(h.state().await, QueueState::new(7, 50));
}

#[tokio::test]
async fn appointment_overtaken_by_another_caller_is_not_served_again() {
    let h = harness().await;
    let id = h.line.id;
    h.set(5, 10).await;
    let appointment = h
        .system
        .add_appointment(&h.admin, id, 8, Utc::now() - Duration::minutes(1))
        .await
        .unwrap();

    // One caller claims the appointment while current is still 5.
    let claimed = h
        .records
        .claim_due_appointment(id, Utc::now(), 5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, appointment.id);

    // Another caller runs ahead to 9 before the jump lands.
    for _ in 0..4 {
        assert!(h.store.call_next(id).await.unwrap().applied);
    }
    let jump = h.store.call_ahead(id, claimed.number).await.unwrap();
    assert!(!jump.applied);
    assert_eq!(h.state().await, QueueState::new(9, 10));
    assert!(h.records.release_appointment(claimed.id).await.unwrap());

    // The released appointment is now stale and the next call is sequential.
    let outcome = h.system.call(&h.operator, id, Direction::Next).await.unwrap();
    assert_eq!(outcome.number, 10);
    let listed = h.system.list_appointments(&h.admin, Some(id)).await.unwrap();
    let stored = listed.iter().find(|a| a.id == appointment.id).unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn reset_clears_appointments_and_subscriptions() {
    let h = harness().await;
    h.set(2, 10).await;
    let later = Utc::now() + Duration::hours(2);
    h.system
        .add_appointment(&h.admin, h.line.id, 7, later)
        .await
        .unwrap();
    h.system
        .add_appointment(&h.admin, h.line.id, 9, later)
        .await
        .unwrap();
    for (subscriber, number) in [("U1", 4), ("U2", 5), ("U3", 6)] {
        h.system.subscribe(subscriber, "G", number).await.unwrap();
    }

    let outcome = h.system.reset(&h.admin, h.line.id).await.unwrap();
    assert_eq!(outcome.number, 0);
    assert_eq!(h.state().await, QueueState::new(0, 0));

    let appointments = h
        .system
        .list_appointments(&h.admin, Some(h.line.id))
        .await
        .unwrap();
    assert_eq!(appointments.len(), 2);
    assert!(
        appointments
            .iter()
            .all(|a| a.status == AppointmentStatus::Cancelled)
    );
    for subscriber in ["U1", "U2", "U3"] {
        assert!(h.system.query_subscription(subscriber).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn permission_checked_before_anything_else() {
    let h = harness().await;
    let err = h.system.reset(&h.operator, h.line.id).await.unwrap_err();
    assert!(matches!(err, QueueError::Forbidden(_)));

    let err = h
        .system
        .create_line(&h.operator, "Second", "S", "#000")
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Forbidden(_)));
}

#[tokio::test]
async fn public_intake_respects_mode_status_and_rate() {
    let h = harness().await;
    let id = h.line.id;

    h.system.set_mode(&h.admin, SystemMode::Input).await.unwrap();
    assert!(matches!(
        h.system.take_ticket("10.0.0.1", id).await,
        Err(QueueError::ManualInputOnly)
    ));
    h.system.set_mode(&h.admin, SystemMode::Ticketing).await.unwrap();

    h.system.set_public(&h.admin, false).await.unwrap();
    assert!(matches!(
        h.system.take_ticket("10.0.0.1", id).await,
        Err(QueueError::Closed)
    ));
    h.system.set_public(&h.admin, true).await.unwrap();

    let limit = h.system.config().intake.max_per_window;
    for n in 1..=limit {
        let outcome = h.system.take_ticket("10.0.0.1", id).await.unwrap();
        assert_eq!(outcome.number, n);
    }
    assert!(matches!(
        h.system.take_ticket("10.0.0.1", id).await,
        Err(QueueError::RateLimited)
    ));
    assert!(h.system.take_ticket("10.0.0.2", id).await.is_ok());
}

#[tokio::test]
async fn privileged_snapshot_carries_the_operator_log() {
    let h = harness().await;
    h.system.set_issue(&h.operator, h.line.id, 1).await.unwrap();

    let public = h.system.snapshot(Audience::Public).await.unwrap();
    assert!(public.admin_log.is_empty());
    let privileged = h.system.snapshot(Audience::Privileged).await.unwrap();
    assert!(!privileged.admin_log.is_empty());
    assert_eq!(privileged.admin_log[0].operator, "alice");
}

#[tokio::test]
async fn daily_reset_runs_once_per_date() {
    let h = harness().await;
    h.set(3, 4).await;
    let today = Utc::now().date_naive();

    assert!(h.system.run_daily_reset(today).await.unwrap());
    assert_eq!(h.state().await, QueueState::new(0, 0));

    h.set(1, 1).await;
    assert!(!h.system.run_daily_reset(today).await.unwrap());
    assert_eq!(h.state().await, QueueState::new(1, 1));
}

#[tokio::test]
async fn events_reach_local_subscribers() {
    let h = harness().await;
    let mut rx = h.system.broadcaster().subscribe();
    h.system.issue(&h.operator, h.line.id, Direction::Next).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(
        event,
        callsys_types::BroadcastEvent::queue(h.line.id, QueueState::new(0, 1))
    );
}
