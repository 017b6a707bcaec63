pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod record;
pub mod schedule;
pub mod service;
pub mod streak;

pub use crate::chain::HabitChain;
pub use crate::config::StackConfig;
pub use crate::error::{ChainError, HabitError};
pub use crate::record::{Completion, HabitDraft, HabitId, HabitPatch, HabitRecord, TimeGroup};
pub use crate::service::{HabitStackService, HabitStackServiceBuilder};
