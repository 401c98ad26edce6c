//! In-memory authority for every in-flight payment capture session.
//!
//! All mutators take the single write lock for the whole read-modify-write so
//! concurrent callbacks and capability calls never lose updates. A mutation
//! against an unknown session returns `None` and logs; it never panics.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::field::PaymentField;
use super::session::{FieldUpdate, PaymentFieldState, PaymentSessionState, SessionKey, SessionStatus};
use super::snapshot::PaymentSnapshot;

pub const DEFAULT_ERROR_MESSAGE: &str = "unspecified payment capture error";

#[derive(Default)]
struct StoreState {
    sessions: HashMap<SessionKey, PaymentSessionState>,
    snapshots: HashMap<String, PaymentSnapshot>,
}

#[derive(Default)]
pub struct PaymentSessionStore {
    inner: RwLock<StoreState>,
}

impl PaymentSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh session, replacing any existing one under the same key.
    pub fn create_session(&self, call_sid: &str, payment_sid: &str) -> PaymentSessionState {
        let session = PaymentSessionState::new(call_sid, payment_sid);
        let mut state = self.write();
        state.sessions.insert(session.key(), session.clone());
        session
    }

    /// Creates the session if it does not exist yet and marks it in progress.
    pub fn open_session(&self, call_sid: &str, payment_sid: &str) -> PaymentSessionState {
        let mut state = self.write();
        let session = state
            .sessions
            .entry(SessionKey::new(call_sid, payment_sid))
            .or_insert_with(|| PaymentSessionState::new(call_sid, payment_sid));
        if session.status == SessionStatus::Initialized {
            session.status = SessionStatus::InProgress;
        }
        session.last_updated = Utc::now();
        session.clone()
    }

    pub fn get_session(&self, call_sid: &str, payment_sid: &str) -> Option<PaymentSessionState> {
        self.read().sessions.get(&SessionKey::new(call_sid, payment_sid)).cloned()
    }

    pub fn update_field_state(
        &self,
        call_sid: &str,
        payment_sid: &str,
        field: PaymentField,
        update: FieldUpdate,
    ) -> Option<PaymentSessionState> {
        self.mutate(call_sid, payment_sid, "update_field_state", |session| {
            session.field_mut(field).apply(update);
        })
    }

    /// Builds the update from the field's current state under the same lock,
    /// so derived values such as the next attempt count cannot race.
    pub fn modify_field<F>(
        &self,
        call_sid: &str,
        payment_sid: &str,
        field: PaymentField,
        build: F,
    ) -> Option<PaymentSessionState>
    where
        F: FnOnce(&PaymentFieldState) -> FieldUpdate,
    {
        self.mutate(call_sid, payment_sid, "modify_field", |session| {
            let update = build(session.field(field));
            session.field_mut(field).apply(update);
        })
    }

    pub fn update_session_status(
        &self,
        call_sid: &str,
        payment_sid: &str,
        status: SessionStatus,
        error_message: Option<String>,
    ) -> Option<PaymentSessionState> {
        self.mutate(call_sid, payment_sid, "update_session_status", |session| {
            session.status = status;
            session.error_message = match status {
                SessionStatus::Error => Some(
                    error_message
                        .filter(|message| !message.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
                ),
                _ => None,
            };
        })
    }

    /// The only path into `complete`. Overrides a prior `error` status.
    pub fn set_payment_token(
        &self,
        call_sid: &str,
        payment_sid: &str,
        token: impl Into<String>,
    ) -> Option<PaymentSessionState> {
        let token = token.into();
        self.mutate(call_sid, payment_sid, "set_payment_token", |session| {
            session.token = Some(token);
            session.status = SessionStatus::Complete;
            session.error_message = None;
        })
    }

    pub fn reset_field(
        &self,
        call_sid: &str,
        payment_sid: &str,
        field: PaymentField,
    ) -> Option<PaymentSessionState> {
        self.mutate(call_sid, payment_sid, "reset_field", |session| {
            session.field_mut(field).reset();
        })
    }

    /// Merges `snapshot` into the payment's cached view. Only payments with a
    /// tracked session are cached; anything else returns `None` untouched.
    pub fn record_snapshot(
        &self,
        call_sid: &str,
        payment_sid: &str,
        snapshot: PaymentSnapshot,
    ) -> Option<PaymentSnapshot> {
        let mut state = self.write();
        if !state.sessions.contains_key(&SessionKey::new(call_sid, payment_sid)) {
            warn!(
                event_name = "payment.store.session_missing",
                call_sid,
                payment_sid,
                operation = "record_snapshot",
                "no payment session for key; snapshot dropped"
            );
            return None;
        }
        let entry = state.snapshots.entry(payment_sid.to_string()).or_default();
        entry.merge(snapshot);
        Some(entry.clone())
    }

    pub fn snapshot(&self, payment_sid: &str) -> Option<PaymentSnapshot> {
        self.read().snapshots.get(payment_sid).cloned()
    }

    /// Drops sessions idle for longer than `max_idle`, then any snapshot no
    /// remaining session refers to. A window reaching past the earliest
    /// representable instant expires nothing.
    pub fn prune_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|max_idle| now.checked_sub_signed(max_idle));

        let mut state = self.write();
        let expired: Vec<SessionKey> = match cutoff {
            Some(cutoff) => state
                .sessions
                .iter()
                .filter(|(_, session)| session.last_updated < cutoff)
                .map(|(key, _)| key.clone())
                .collect(),
            None => Vec::new(),
        };

        for key in &expired {
            state.sessions.remove(key);
        }

        let StoreState { sessions, snapshots } = &mut *state;
        let live: HashSet<&str> = sessions.keys().map(|key| key.payment_sid.as_str()).collect();
        snapshots.retain(|payment_sid, _| live.contains(payment_sid.as_str()));

        expired.len()
    }

    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate<F>(
        &self,
        call_sid: &str,
        payment_sid: &str,
        operation: &'static str,
        apply: F,
    ) -> Option<PaymentSessionState>
    where
        F: FnOnce(&mut PaymentSessionState),
    {
        let mut state = self.write();
        let Some(session) = state.sessions.get_mut(&SessionKey::new(call_sid, payment_sid))
        else {
            warn!(
                event_name = "payment.store.session_missing",
                call_sid,
                payment_sid,
                operation,
                "no payment session for key; mutation skipped"
            );
            return None;
        };

        apply(session);
        session.last_updated = Utc::now();
        Some(session.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::{PaymentSessionStore, SessionKey, DEFAULT_ERROR_MESSAGE};
    use crate::payment::{FieldUpdate, PaymentField, PaymentSnapshot, SessionStatus};

    #[test]
    fn created_session_starts_initialized_with_empty_fields() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");

        let session = store.get_session("CA1", "PA1").expect("session exists");
        assert_eq!(session.status, SessionStatus::Initialized);
        for field in PaymentField::CANONICAL_ORDER {
            let state = session.field(field);
            assert!(!state.complete);
            assert!(!state.needs_reentry);
            assert_eq!(state.masked, "");
            assert_eq!(state.attempts, 0);
        }
        assert_eq!(session.token, None);
    }

    #[test]
    fn create_session_clobbers_existing_state() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");
        store.update_field_state("CA1", "PA1", PaymentField::CardNumber, FieldUpdate::captured("1234"));

        let fresh = store.create_session("CA1", "PA1");
        assert!(!fresh.card_number.complete);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn open_session_keeps_existing_progress() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");
        store.update_field_state("CA1", "PA1", PaymentField::CardNumber, FieldUpdate::captured("1234"));

        let opened = store.open_session("CA1", "PA1");
        assert_eq!(opened.status, SessionStatus::InProgress);
        assert!(opened.card_number.complete);

        let brand_new = store.open_session("CA2", "PA2");
        assert_eq!(brand_new.status, SessionStatus::InProgress);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn set_payment_token_overrides_error_status() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");
        store.update_session_status("CA1", "PA1", SessionStatus::Error, Some("declined".into()));

        let session = store.set_payment_token("CA1", "PA1", "tok_abc").expect("session exists");
        assert_eq!(session.status, SessionStatus::Complete);
        assert_eq!(session.token.as_deref(), Some("tok_abc"));
        assert_eq!(session.error_message, None);
    }

    #[test]
    fn reset_field_strictly_increments_attempts() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");
        store.update_field_state(
            "CA1",
            "PA1",
            PaymentField::SecurityCode,
            FieldUpdate::rejected("too short", 1),
        );

        let mut previous = 1;
        for _ in 0..3 {
            let session =
                store.reset_field("CA1", "PA1", PaymentField::SecurityCode).expect("session exists");
            let field = &session.security_code;
            assert_eq!(field.attempts, previous + 1);
            assert!(!field.needs_reentry);
            assert!(!field.complete);
            assert_eq!(field.reentry_reason, None);
            assert_eq!(field.masked, "");
            previous = field.attempts;
        }
    }

    #[test]
    fn mutators_on_unknown_session_return_none() {
        let store = PaymentSessionStore::new();

        assert!(store
            .update_field_state("CAx", "PAx", PaymentField::CardNumber, FieldUpdate::captured("1"))
            .is_none());
        assert!(store.update_session_status("CAx", "PAx", SessionStatus::InProgress, None).is_none());
        assert!(store.set_payment_token("CAx", "PAx", "tok").is_none());
        assert!(store.reset_field("CAx", "PAx", PaymentField::ExpirationDate).is_none());
        assert!(store.modify_field("CAx", "PAx", PaymentField::CardNumber, |_| FieldUpdate::default()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn error_status_always_carries_a_message() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");

        let session =
            store.update_session_status("CA1", "PA1", SessionStatus::Error, None).expect("session");
        assert_eq!(session.error_message.as_deref(), Some(DEFAULT_ERROR_MESSAGE));

        let session = store
            .update_session_status("CA1", "PA1", SessionStatus::InProgress, Some("ignored".into()))
            .expect("session");
        assert_eq!(session.error_message, None);
    }

    #[test]
    fn captured_card_number_leaves_security_code_pending() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");
        store.update_field_state(
            "CA1",
            "PA1",
            PaymentField::CardNumber,
            FieldUpdate {
                complete: Some(true),
                masked: Some("**** **** **** 1234".into()),
                ..FieldUpdate::default()
            },
        );

        let session = store.get_session("CA1", "PA1").expect("session");
        assert!(session.card_number.complete);
        assert_eq!(session.card_number.masked, "**** **** **** 1234");
        assert!(!session.security_code.complete);
    }

    #[test]
    fn mutations_bump_last_updated() {
        let store = PaymentSessionStore::new();
        let created = store.create_session("CA1", "PA1");
        std::thread::sleep(Duration::from_millis(5));

        let updated = store
            .update_session_status("CA1", "PA1", SessionStatus::InProgress, None)
            .expect("session");
        assert!(updated.last_updated > created.last_updated);
    }

    #[test]
    fn concurrent_modifications_do_not_lose_attempts() {
        let store = Arc::new(PaymentSessionStore::new());
        store.create_session("CA1", "PA1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.modify_field("CA1", "PA1", PaymentField::CardNumber, |current| {
                            FieldUpdate::rejected("retry", current.attempts + 1)
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        let session = store.get_session("CA1", "PA1").expect("session");
        assert_eq!(session.card_number.attempts, 200);
    }

    #[test]
    fn prune_idle_removes_stale_sessions_and_snapshots() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");
        store
            .record_snapshot(
                "CA1",
                "PA1",
                PaymentSnapshot { result: Some("success".into()), ..PaymentSnapshot::default() },
            )
            .expect("snapshot for tracked session");

        assert_eq!(store.prune_idle(Utc::now(), Duration::from_secs(60)), 0);
        assert_eq!(store.len(), 1);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(store.prune_idle(later, Duration::from_secs(60)), 1);
        assert!(store.get_session("CA1", "PA1").is_none());
        assert!(store.snapshot("PA1").is_none());
    }

    #[test]
    fn snapshots_for_untracked_payments_are_not_cached() {
        let store = PaymentSessionStore::new();
        for index in 0..500 {
            let payment_sid = format!("PA{index}");
            let recorded = store.record_snapshot(
                "CA-unknown",
                &payment_sid,
                PaymentSnapshot { result: Some("success".into()), ..PaymentSnapshot::default() },
            );
            assert!(recorded.is_none());
            assert!(store.snapshot(&payment_sid).is_none());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn prune_idle_sweeps_snapshots_without_a_session() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");
        store.create_session("CA2", "PA2");
        store.record_snapshot("CA1", "PA1", PaymentSnapshot::default()).expect("snapshot PA1");
        store.record_snapshot("CA2", "PA2", PaymentSnapshot::default()).expect("snapshot PA2");

        store.write().sessions.remove(&SessionKey::new("CA2", "PA2"));

        assert_eq!(store.prune_idle(Utc::now(), Duration::from_secs(60)), 0);
        assert!(store.snapshot("PA1").is_some());
        assert!(store.snapshot("PA2").is_none());
    }

    #[test]
    fn prune_idle_with_oversized_window_expires_nothing() {
        let store = PaymentSessionStore::new();
        store.create_session("CA1", "PA1");

        assert_eq!(store.prune_idle(Utc::now(), Duration::from_secs(10_000_000_000_000)), 0);
        assert_eq!(store.prune_idle(Utc::now(), Duration::MAX), 0);
        assert!(store.get_session("CA1", "PA1").is_some());
    }
}
