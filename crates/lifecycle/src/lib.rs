//! Order lifecycle orchestration.
//!
//! - [`ReservationService`]: the request path (load, transition, write, publish)
//! - [`ExpirationSweeper`]: background job cancelling lapsed reservations

pub mod error;
pub mod service;
pub mod sweeper;

pub use error::{LifecycleError, Result};
pub use service::{DEFAULT_REQUEST_TIMEOUT, ReservationService};
pub use sweeper::{ExpirationSweeper, SweepReport, SweeperConfig};
