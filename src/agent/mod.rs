mod motion;
mod senses;
mod spawn;
mod step;

pub use spawn::DeathCause;

use crate::config::SimulationConfig;
use crate::constants::MAX_SEGMENTS;
use crate::error::GenomeError;
use crate::genome::Genome;
use crate::instruction::{Instruction, Opcode};
use crate::spatial::SegmentId;
use crate::utils::{step_on_sphere, tangent_at};
use glam::Vec3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u32);

impl AgentId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Status {
    Alive,
    /// Barriers: registered and blocking, never stepped, never die.
    Inanimate,
    #[default]
    NonExistent,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Segment {
    pub location: Vec3,
    pub opcode: Opcode,
    /// Covered by another body part: no photosynthesis, not edible.
    pub occluded: bool,
    pub anchored: bool,
    pub index: u8,
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            location: Vec3::Z,
            opcode: Opcode::Photosynthesize,
            occluded: false,
            anchored: false,
            index: 0,
        }
    }
}

/// Behavior flags. `was_blocked` and `was_preyed_on` are one-shot: the
/// matching test instruction consumes them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct AgentFlags {
    pub condition: bool,
    pub secondary_condition: bool,
    pub allow_mutate: bool,
    pub was_blocked: bool,
    pub is_motile: bool,
    pub is_hyper: bool,
    pub was_eaten: bool,
    pub was_preyed_on: bool,
    pub anchored: bool,
    pub touched_self: bool,
    /// The current photosynthesize instruction already held the counter.
    pub pc_held: bool,
}

impl AgentFlags {
    /// Sets the condition flag, keeping the previous value as the secondary.
    #[inline]
    pub fn set_condition(&mut self, value: bool) {
        self.secondary_condition = self.condition;
        self.condition = value;
    }

    #[inline]
    pub fn take_blocked(&mut self) -> bool {
        std::mem::take(&mut self.was_blocked)
    }

    #[inline]
    pub fn take_preyed_on(&mut self) -> bool {
        std::mem::take(&mut self.was_preyed_on)
    }

    pub fn to_bits(self) -> u32 {
        [
            self.condition,
            self.secondary_condition,
            self.allow_mutate,
            self.was_blocked,
            self.is_motile,
            self.is_hyper,
            self.was_eaten,
            self.was_preyed_on,
            self.anchored,
            self.touched_self,
            self.pc_held,
        ]
        .iter()
        .enumerate()
        .fold(0, |bits, (i, &set)| bits | ((set as u32) << i))
    }

    pub fn from_bits(bits: u32) -> Self {
        let bit = |i: u32| bits & (1 << i) != 0;
        Self {
            condition: bit(0),
            secondary_condition: bit(1),
            allow_mutate: bit(2),
            was_blocked: bit(3),
            is_motile: bit(4),
            is_hyper: bit(5),
            was_eaten: bit(6),
            was_preyed_on: bit(7),
            anchored: bit(8),
            touched_self: bit(9),
            pc_held: bit(10),
        }
    }
}

/// Where an agent's genome came from, for genealogy reporting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Lineage {
    /// Tick at which this genome first appeared.
    pub first_tick: u64,
    pub parent: Option<Genome>,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub status: Status,
    pub genome: Genome,
    pub(crate) segments: [Segment; MAX_SEGMENTS],
    pub(crate) num_segments: usize,
    pub energy: f32,
    pub spawn_energy: f32,
    pub lifespan: u32,
    pub flags: AgentFlags,
    pub(crate) active_segment: usize,
    pub sleep: u32,
    pub dormancy: u32,
    pub spawn_delay: u32,
    /// Vacated tail position offspring are placed at; `None` until the first move.
    pub spawn_location: Option<Vec3>,
    pub birth_location: Vec3,
    pub move_vector: Vec3,
    pub lineage: Lineage,
}

impl Agent {
    pub fn empty(id: AgentId) -> Self {
        Self {
            id,
            status: Status::NonExistent,
            genome: Genome::plant(),
            segments: [Segment::default(); MAX_SEGMENTS],
            num_segments: 0,
            energy: 0.0,
            spawn_energy: 0.0,
            lifespan: 0,
            flags: AgentFlags::default(),
            active_segment: 0,
            sleep: 0,
            dormancy: 0,
            spawn_delay: 0,
            spawn_location: None,
            birth_location: Vec3::Z,
            move_vector: Vec3::ZERO,
            lineage: Lineage::default(),
        }
    }

    /// Energy needed before a critter with this genome may reproduce.
    pub fn spawn_energy_for(genome: &Genome, config: &SimulationConfig) -> f32 {
        config.base_spawn_energy
            + config.segment_spawn_energy * genome.len() as f32
            + config.move_spawn_energy * genome.count(Opcode::Move) as f32
            + config.eat_spawn_energy * genome.count(Opcode::MoveAndEat) as f32
    }

    /// Lays out one segment per instruction, trailing from `location` away
    /// from `direction`. The agent stays `NonExistent` until the world
    /// registers it.
    pub fn initialize(
        &mut self,
        genome: Genome,
        location: Vec3,
        direction: Vec3,
        config: &SimulationConfig,
    ) -> Result<(), GenomeError> {
        if genome.is_empty() {
            return Err(GenomeError::Empty);
        }
        let head = location.normalize_or_zero();
        let head = if head == Vec3::ZERO { Vec3::Z } else { head };
        let heading = tangent_at(head, direction);

        let mut locations = [head; MAX_SEGMENTS];
        let mut back = -heading;
        for i in 1..genome.len().min(MAX_SEGMENTS) {
            let prev = locations[i - 1];
            back = tangent_at(prev, back);
            locations[i] = step_on_sphere(prev, back * config.move_distance);
        }
        self.place(genome, &locations[..genome.len().min(MAX_SEGMENTS)], config)?;
        self.move_vector = heading * config.move_distance;
        Ok(())
    }

    /// Resets every field and puts one segment per instruction at the given
    /// locations (extra instructions share the last location).
    pub(crate) fn place(
        &mut self,
        genome: Genome,
        locations: &[Vec3],
        config: &SimulationConfig,
    ) -> Result<(), GenomeError> {
        let Some(&last) = locations.last() else {
            return Err(GenomeError::Empty);
        };
        if genome.is_empty() {
            return Err(GenomeError::Empty);
        }
        let id = self.id;
        *self = Agent::empty(id);
        for (i, ins) in genome.iter().take(MAX_SEGMENTS).enumerate() {
            self.segments[i] = Segment {
                location: locations.get(i).copied().unwrap_or(last),
                opcode: ins.opcode,
                occluded: false,
                anchored: false,
                index: i as u8,
            };
            self.num_segments = i + 1;
        }
        self.genome = genome;
        self.spawn_energy = Self::spawn_energy_for(&genome, config);
        self.lifespan = config.lifespan;
        self.spawn_delay = config.spawn_delay_ticks;
        self.birth_location = self.segments[0].location;
        self.move_vector = tangent_at(self.segments[0].location, Vec3::X) * config.move_distance;
        self.flags.is_motile = genome.is_motile();
        self.flags.allow_mutate = true;
        Ok(())
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.status != Status::NonExistent
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status == Status::Alive
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments[..self.num_segments]
    }

    #[inline]
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    #[inline]
    pub fn head(&self) -> Option<&Segment> {
        self.segments().first()
    }

    #[inline]
    pub fn active_segment(&self) -> usize {
        self.active_segment
    }

    #[inline]
    pub fn segment_id(&self, index: usize) -> SegmentId {
        SegmentId::new(self.id, index)
    }

    pub fn active_instruction(&self) -> Option<Instruction> {
        self.genome.get(self.active_segment)
    }

    pub fn photosynthesize_segments(&self) -> usize {
        self.segments()
            .iter()
            .filter(|s| s.opcode == Opcode::Photosynthesize)
            .count()
    }

    pub fn lit_segments(&self) -> usize {
        self.segments()
            .iter()
            .filter(|s| s.opcode == Opcode::Photosynthesize && !s.occluded)
            .count()
    }

    #[inline]
    pub fn is_dormant(&self) -> bool {
        self.dormancy > 0
    }

    /// Predation rule: live, uneaten prey of a different genome unless
    /// cannibalism is allowed.
    pub fn can_eat(&self, prey: &Agent, config: &SimulationConfig) -> bool {
        prey.id != self.id
            && prey.status == Status::Alive
            && !prey.flags.was_eaten
            && (config.allow_cannibalism || prey.genome != self.genome)
    }
}
