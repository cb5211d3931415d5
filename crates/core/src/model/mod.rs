mod ids;
mod progress;
mod roadmap;

pub use ids::{NodeId, ParseIdError, ProgressId, RoadmapId, UserId};
pub use progress::{ProgressRecord, ProgressTree};
pub use roadmap::{Node, Roadmap, Section};
