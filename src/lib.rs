//! Evolution of segmented critters on the surface of a unit sphere.
//!
//! Each critter runs a tiny genome program one instruction per tick,
//! moving, biting, photosynthesizing and reproducing with mutation.

pub mod agent;
pub mod config;
pub mod constants;
pub mod control;
pub mod error;
pub mod genome;
pub mod instruction;
pub mod persistence;
pub mod report;
pub mod spatial;
pub mod utils;
pub mod world;

pub use agent::{Agent, AgentFlags, AgentId, DeathCause, Lineage, Segment, Status};
pub use config::SimulationConfig;
pub use control::SharedWorld;
pub use error::{CatalogError, GenomeError, PersistError, WorldError};
pub use genome::{Genome, MutationKind};
pub use instruction::{Condition, Instruction, InstructionCatalog, Opcode};
pub use report::{DeathCounts, SpeciesCount, TickSummary};
pub use spatial::{Neighbor, SegmentId, SpatialIndex};
pub use world::{SimRng, World};
