//! Window-side half of the profile sync service: request and real-time
//! transports, the per-window controller, profile management workflows and
//! drag reordering.

pub mod api;
pub mod binding;
pub mod controller;
pub mod drag;
pub mod link;
pub mod manager;
pub mod mutation;

pub use api::{ClientError, HttpProfileApi, ProfileApi};
pub use binding::{BindingStore, FileBinding, MemoryBinding};
pub use controller::{BootstrapHints, ConfigClient, EventOutcome, Phase, RollbackPolicy};
pub use drag::{DragReorderEngine, DragSession, DropOutcome, HoverOutcome};
pub use link::{HubConnection, HubLink, ReconnectPolicy};
pub use manager::{ProfileManager, RenameOutcome};
pub use mutation::{Document, DocumentKind, Mutation, MutationError};
