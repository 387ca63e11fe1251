//! Shared scalar, geographic, time, and error types for the `wx-*` workspace.
//!
//! ```text
//!          +-----------+     +-----------+
//!          |  wx-grid  |     | wx-domain |
//!          +-----------+     +-----------+
//!                 \               /
//!                  \             /
//!                +-----------------+
//!                |    wx-common    |   <-- this crate
//!                +-----------------+
//! ```
//!
//! Every other crate in the workspace depends on this one for its error
//! type and its time/geo primitives; it has no internal dependencies of
//! its own.

pub mod error;
pub mod geo;
pub mod time;

pub use error::{WxError, WxResult};
pub use geo::BoundingBox;
pub use time::{Timestamp, TimerangeDt, TimerangeError};
