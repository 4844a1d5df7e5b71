//! Pricing and timing of a downpayment reservation.

use chrono::Duration;

use super::OrderError;

/// Longest hold a reservation may have.
pub const MAX_HOLD: Duration = Duration::days(365);

/// How much of the order total is held as a downpayment, and for how long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownpaymentTerms {
    percent: f64,
    hold: Duration,
}

impl DownpaymentTerms {
    /// Creates reservation terms.
    ///
    /// `percent` is a fraction of the order total in `(0, 1]`; `hold` is how
    /// long the reservation stays valid and must be positive and at most
    /// [`MAX_HOLD`].
    pub fn new(percent: f64, hold: Duration) -> Result<Self, OrderError> {
        if !(percent > 0.0 && percent <= 1.0) {
            return Err(OrderError::InvalidTerms(format!(
                "percent must be in (0, 1], got {percent}"
            )));
        }
        if hold <= Duration::zero() {
            return Err(OrderError::InvalidTerms(format!(
                "hold duration must be positive, got {hold}"
            )));
        }
        if hold > MAX_HOLD {
            return Err(OrderError::InvalidTerms(format!(
                "hold duration must be at most {MAX_HOLD}, got {hold}"
            )));
        }
        Ok(Self { percent, hold })
    }

    /// Fraction of the total amount taken as downpayment.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// How long the reservation is held before it expires.
    pub fn hold(&self) -> Duration {
        self.hold
    }
}

impl Default for DownpaymentTerms {
    /// 15% held for 48 hours.
    fn default() -> Self {
        Self {
            percent: 0.15,
            hold: Duration::hours(48),
        }
    }
}
