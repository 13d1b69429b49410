use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a single reservation so it can be committed or refunded
/// exactly once. Opaque to callers outside the Quota Enforcer.
pub type QuotaReservationId = Uuid;

/// What a window counts against. `Tokens` covers prompt+completion tokens
/// combined; the enforcer never splits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Requests,
    Tokens,
    Cost,
}

/// Static configuration for one window assigned to a principal: what it
/// counts, its rollover period and its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaWindowSpec {
    pub kind: QuotaKind,
    pub period_secs: u64,
    pub limit: u64,
}

/// Mutable counters for one window instance. `reserved` tracks outstanding
/// reservations not yet committed or refunded; `used` tracks committed
/// consumption. A window admits a new reservation only if
/// `used + reserved + amount <= spec.limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWindow {
    pub spec: QuotaWindowSpec,
    pub window_started_at_unix: u64,
    pub used: u64,
    pub reserved: u64,
}

impl QuotaWindow {
    pub fn new(spec: QuotaWindowSpec, window_started_at_unix: u64) -> Self {
        Self {
            spec,
            window_started_at_unix,
            used: 0,
            reserved: 0,
        }
    }

    /// Rolls the window over if `now_unix` has moved past the period.
    /// Outstanding reservations are carried across the rollover intact
    /// (decided in DESIGN.md: a reservation started in one window and
    /// committed in the next still counts against the window it was made
    /// in, not the one it lands in).
    pub fn roll_if_elapsed(&mut self, now_unix: u64) -> bool {
        if now_unix.saturating_sub(self.window_started_at_unix) >= self.spec.period_secs {
            self.window_started_at_unix = now_unix;
            self.used = 0;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> u64 {
        self.spec.limit.saturating_sub(self.used + self.reserved)
    }

    pub fn try_reserve(&mut self, amount: u64) -> bool {
        if amount <= self.available() {
            self.reserved += amount;
            true
        } else {
            false
        }
    }

    /// Commits a reservation, replacing the reserved hold with the actual
    /// consumed amount (which may differ from the estimate, e.g. streamed
    /// token counts). Never lets `used` or `reserved` underflow.
    pub fn commit(&mut self, reserved_amount: u64, actual_amount: u64) {
        self.reserved = self.reserved.saturating_sub(reserved_amount);
        self.used += actual_amount;
    }

    pub fn refund(&mut self, reserved_amount: u64) {
        self.reserved = self.reserved.saturating_sub(reserved_amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> QuotaWindowSpec {
        QuotaWindowSpec {
            kind: QuotaKind::Tokens,
            period_secs: 60,
            limit: 1000,
        }
    }

    #[test]
    fn reserve_commit_conserves_total() {
        let mut window = QuotaWindow::new(spec(), 0);
        assert!(window.try_reserve(400));
        assert_eq!(window.available(), 600);
        window.commit(400, 350);
        assert_eq!(window.used, 350);
        assert_eq!(window.reserved, 0);
        assert_eq!(window.available(), 650);
    }

    #[test]
    fn reserve_refund_restores_capacity() {
        let mut window = QuotaWindow::new(spec(), 0);
        assert!(window.try_reserve(1000));
        assert!(!window.try_reserve(1));
        window.refund(1000);
        assert_eq!(window.available(), 1000);
    }

    #[test]
    fn rollover_clears_used_but_not_outstanding_reservations() {
        let mut window = QuotaWindow::new(spec(), 0);
        window.try_reserve(200);
        window.commit(200, 200);
        assert_eq!(window.used, 200);

        window.try_reserve(100);
        assert!(window.roll_if_elapsed(61));
        assert_eq!(window.used, 0);
        assert_eq!(window.reserved, 100);
    }
}
