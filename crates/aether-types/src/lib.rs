//! AetherOS shared vocabulary - access levels, information categories,
//! cycle phases, context elements, and the kernel error taxonomy.

pub mod access;
pub mod clock;
pub mod element;
pub mod error;
pub mod phase;

pub use access::{AccessLevel, InformationCategory};
pub use clock::{Clock, ManualClock, SystemClock};
pub use element::{ContextElement, ElementKind};
pub use error::{AetherError, Result};
pub use phase::AtoPhase;
