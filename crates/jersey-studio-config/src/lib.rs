pub mod config;
pub mod view;
pub mod workspace;

pub use config::StudioConfig;
pub use view::JerseyView;
pub use workspace::{WorkspaceDoc, WorkspaceState, WorkspaceStore};
