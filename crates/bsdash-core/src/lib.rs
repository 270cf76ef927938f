//! bsdash-core: status interpretation, view model and polling engine for the
//! BrainSuite pipeline dashboard.
//!
//! The central design principle: all dashboard state is owned by one
//! controller task. User actions and status polls are messages to that task;
//! everything it renders goes out as [`ViewUpdate`]s on a broadcast channel.

pub mod annotations;
pub mod catalog;
pub mod controller;
pub mod documents;
pub mod engine;
pub mod error;
pub mod poller;
pub mod render;
pub mod stats;
pub mod status;
pub mod view;

pub use catalog::{Catalog, GroupFilter, OutputArtifact};
pub use controller::{Dashboard, EngineConfig};
pub use engine::DashboardEngine;
pub use error::DashError;
pub use poller::{FileStatusSource, StatusSource};
pub use render::{DashboardStats, DashboardView, ViewUpdate};
pub use status::{Classification, ColorScheme, StageCode, StatusString, SubjectStatus};
pub use view::{Action, RenderRequest, ViewState};
