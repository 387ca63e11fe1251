//! Temporal interpolation kernels (§4.4): linear, Hermite/Catmull-Rom, and
//! solar-backwards-averaged. New code with no direct teacher analog; written
//! in the small numeric-helper style of `wms-common::grid`.

pub mod kernels;
pub mod solar;

pub use kernels::{hermite, linear};
pub use solar::{instantaneous_etr, integrated_etr, solar_backwards_averaged, ETR_EPSILON_WS_M2};
