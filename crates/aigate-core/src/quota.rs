use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use uuid::Uuid;

use aigate_common::{PrincipalId, QuotaKind, QuotaReservationId, QuotaWindow, QuotaWindowSpec};
use aigate_storage::Store;

/// One principal's configured windows, keyed by kind. A principal with no
/// entry for a kind has no ceiling on that axis (unlimited).
pub type PrincipalQuotaConfig = HashMap<QuotaKind, QuotaWindowSpec>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub kind: QuotaKind,
    pub next_rollover_unix: u64,
}

impl std::fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "quota/exceeded: {:?} window full, next rollover at unix {}",
            self.kind, self.next_rollover_unix
        )
    }
}

impl std::error::Error for QuotaExceeded {}

struct Reservation {
    principal: PrincipalId,
    amounts: Vec<(QuotaKind, u64)>,
}

struct PrincipalState {
    windows: HashMap<QuotaKind, QuotaWindow>,
}

/// Per-(principal, window-kind) counters with reserve/commit/refund (§4.4).
/// Locking is per-principal rather than per-window: coarser than the spec's
/// "ordered by stable identifier" prescription for cross-window deadlock
/// avoidance, but race-free by construction since one Reserve only ever
/// touches windows belonging to the principal it locks.
pub struct QuotaEnforcer {
    store: Arc<dyn Store>,
    principals: Mutex<HashMap<PrincipalId, PrincipalState>>,
    reservations: Mutex<HashMap<QuotaReservationId, Reservation>>,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            principals: Mutex::new(HashMap::new()),
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) the windows a principal is subject to.
    /// Existing counters for unchanged kinds are preserved.
    pub fn configure_principal(&self, principal: &PrincipalId, config: &PrincipalQuotaConfig, now_unix: u64) {
        let mut principals = self.principals.lock().unwrap();
        let state = principals.entry(principal.clone()).or_insert_with(|| PrincipalState {
            windows: HashMap::new(),
        });
        for (kind, spec) in config {
            state
                .windows
                .entry(*kind)
                .and_modify(|window| window.spec = *spec)
                .or_insert_with(|| QuotaWindow::new(*spec, now_unix));
        }
    }

    /// Reserves `estimate` against every configured window for `principal`.
    /// Either every applicable window accepts the estimate or none is
    /// modified (§4.4's Reserve atomicity contract).
    pub async fn reserve(
        &self,
        principal: &PrincipalId,
        estimate: &[(QuotaKind, u64)],
        now_unix: u64,
    ) -> Result<QuotaReservationId, QuotaExceeded> {
        let (reservation_id, to_persist) = {
            let mut principals = self.principals.lock().unwrap();
            let Some(state) = principals.get_mut(principal) else {
                let id = Uuid::new_v4();
                self.reservations.lock().unwrap().insert(
                    id,
                    Reservation { principal: principal.clone(), amounts: Vec::new() },
                );
                return Ok(id);
            };

            for (kind, amount) in estimate {
                let Some(window) = state.windows.get_mut(kind) else {
                    continue;
                };
                window.roll_if_elapsed(now_unix);
                if *amount > window.available() {
                    return Err(QuotaExceeded {
                        kind: *kind,
                        next_rollover_unix: window.window_started_at_unix + window.spec.period_secs,
                    });
                }
            }

            let mut applied = Vec::new();
            for (kind, amount) in estimate {
                if let Some(window) = state.windows.get_mut(kind) {
                    window.try_reserve(*amount);
                    applied.push((*kind, *amount));
                }
            }

            let id = Uuid::new_v4();
            self.reservations
                .lock()
                .unwrap()
                .insert(id, Reservation { principal: principal.clone(), amounts: applied });

            let snapshot: Vec<(QuotaKind, QuotaWindow)> =
                state.windows.iter().map(|(k, w)| (*k, w.clone())).collect();
            (id, snapshot)
        };

        for (kind, window) in to_persist {
            let _ = self.store.save_quota_window(principal, kind, &window).await;
        }
        Ok(reservation_id)
    }

    /// Replaces the estimate with the measured consumption. If actual
    /// exceeds the estimate, the window is allowed to run over (the
    /// already-served request is never rolled back) and the caller is
    /// responsible for emitting `quota/overrun`.
    pub async fn commit(&self, reservation_id: QuotaReservationId, actual: &[(QuotaKind, u64)]) {
        let Some(reservation) = self.reservations.lock().unwrap().remove(&reservation_id) else {
            return;
        };
        let actual: HashMap<QuotaKind, u64> = actual.iter().copied().collect();
        self.apply_and_persist(&reservation, |window, kind, reserved_amount| {
            window.commit(reserved_amount, actual.get(&kind).copied().unwrap_or(0));
        })
        .await;
    }

    /// Current window state for every kind configured for `principal`, for
    /// the admin surface. Returns an empty vec for a principal with no
    /// configured windows (unlimited on every axis).
    pub fn status(&self, principal: &PrincipalId) -> Vec<(QuotaKind, QuotaWindow)> {
        self.principals
            .lock()
            .unwrap()
            .get(principal)
            .map(|state| state.windows.iter().map(|(k, w)| (*k, w.clone())).collect())
            .unwrap_or_default()
    }

    pub async fn refund(&self, reservation_id: QuotaReservationId) {
        let Some(reservation) = self.reservations.lock().unwrap().remove(&reservation_id) else {
            return;
        };
        self.apply_and_persist(&reservation, |window, _kind, reserved_amount| {
            window.refund(reserved_amount);
        })
        .await;
    }

    async fn apply_and_persist(
        &self,
        reservation: &Reservation,
        mut apply: impl FnMut(&mut QuotaWindow, QuotaKind, u64),
    ) {
        let to_persist = {
            let mut principals = self.principals.lock().unwrap();
            let Some(state) = principals.get_mut(&reservation.principal) else {
                return;
            };
            let mut touched = Vec::new();
            for (kind, reserved_amount) in &reservation.amounts {
                if let Some(window) = state.windows.get_mut(kind) {
                    apply(window, *kind, *reserved_amount);
                    touched.push((*kind, window.clone()));
                }
            }
            touched
        };
        for (kind, window) in to_persist {
            let _ = self.store.save_quota_window(&reservation.principal, kind, &window).await;
        }
    }
}

/// Estimates a request's cost along each configured axis before execution.
/// Requests always count one against the `requests` window; token/cost
/// estimates come from a caller-supplied size hint (e.g. input byte count)
/// since the real count isn't known until the adapter replies.
pub fn estimate_for_request(input_size_hint: u64) -> Vec<(QuotaKind, u64)> {
    vec![
        (QuotaKind::Requests, 1),
        (QuotaKind::Tokens, input_size_hint.max(1)),
    ]
}

pub fn unix_now() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigate_storage::InMemoryStore;

    fn enforcer() -> QuotaEnforcer {
        QuotaEnforcer::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn reserve_commit_round_trips_within_limit() {
        let enforcer = enforcer();
        let principal = "alice".to_string();
        let mut config = PrincipalQuotaConfig::new();
        config.insert(QuotaKind::Requests, QuotaWindowSpec { kind: QuotaKind::Requests, period_secs: 60, limit: 10 });
        enforcer.configure_principal(&principal, &config, 0);

        let id = enforcer.reserve(&principal, &[(QuotaKind::Requests, 1)], 0).await.unwrap();
        enforcer.commit(id, &[(QuotaKind::Requests, 1)]).await;

        let err = {
            let mut all_ones: Vec<(QuotaKind, u64)> = Vec::new();
            for _ in 0..9 {
                all_ones.push((QuotaKind::Requests, 1));
            }
            let mut last = Ok(Uuid::new_v4());
            for pair in all_ones {
                last = enforcer.reserve(&principal, &[pair], 0).await;
            }
            last
        };
        assert!(err.is_ok());
        let exhausted = enforcer.reserve(&principal, &[(QuotaKind::Requests, 1)], 0).await;
        assert!(exhausted.is_err());
    }

    #[tokio::test]
    async fn refund_restores_capacity() {
        let enforcer = enforcer();
        let principal = "bob".to_string();
        let mut config = PrincipalQuotaConfig::new();
        config.insert(QuotaKind::Requests, QuotaWindowSpec { kind: QuotaKind::Requests, period_secs: 60, limit: 1 });
        enforcer.configure_principal(&principal, &config, 0);

        let id = enforcer.reserve(&principal, &[(QuotaKind::Requests, 1)], 0).await.unwrap();
        assert!(enforcer.reserve(&principal, &[(QuotaKind::Requests, 1)], 0).await.is_err());
        enforcer.refund(id).await;
        assert!(enforcer.reserve(&principal, &[(QuotaKind::Requests, 1)], 0).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_principal_is_unlimited() {
        let enforcer = enforcer();
        let principal = "nobody".to_string();
        let id = enforcer.reserve(&principal, &[(QuotaKind::Tokens, 999_999)], 0).await.unwrap();
        enforcer.commit(id, &[(QuotaKind::Tokens, 999_999)]).await;
    }
}
