pub mod dto;
pub mod error;
pub mod graph;
pub mod resource;
pub mod rules;
pub mod session;
pub mod settings;
pub mod store;
pub mod template;

pub use dto::{from_persisted, to_persisted, LoadSummary, PersistedGraph};
pub use error::{BoundaryError, Error, ExtractionError, IntegrityError};
pub use graph::{Element, Group, Link, Node, Position, Properties, TopologyGraph};
pub use session::{DesignSession, LoadOutcome, SaveOutcome};
pub use settings::{read_settings, StoreSettings, StudioSettings};
pub use store::{open_store, DesignStore, FileDesignStore, HttpDesignStore, MemoryDesignStore};
pub use template::{build_template, ArmTemplate, ParameterDef, Resource};
