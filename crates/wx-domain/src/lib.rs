//! The Domain/Variable data model: what an NWP source is, and what a
//! Variable declares about itself (units, scalefactor, capability table).

pub mod domain;
pub mod variable;

pub use domain::{Domain, DomainKind};
pub use variable::{InterpolationKind, Unit, Variable, VariableCapability};
