// --- World: agent pool and tick scheduler ---

use crate::agent::{Agent, AgentId, DeathCause, Status};
use crate::config::SimulationConfig;
use crate::constants::{MAX_AGENTS, MAX_GENOME_LENGTH};
use crate::error::WorldError;
use crate::genome::Genome;
use crate::instruction::{Instruction, InstructionCatalog, Opcode};
use crate::report::TickSummary;
use crate::spatial::{Neighbor, SpatialIndex};
use crate::utils::{random_tangent, random_unit_vector};
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;

pub type SimRng = StdRng;

/// Per-tick snapshot of everything the agent steps read but never write.
pub(crate) struct TickContext {
    pub config: SimulationConfig,
    pub catalog: InstructionCatalog,
    pub tick: u64,
}

pub struct World {
    pub(crate) agents: Vec<Agent>,
    free: Vec<AgentId>,
    num_agents: usize,
    max_live_index: Option<usize>,
    pub(crate) index: SpatialIndex,
    config: SimulationConfig,
    catalog: InstructionCatalog,
    pub(crate) rng: SimRng,
    tick: u64,
    // Reused query buffer; taken out while a step holds the results.
    pub(crate) scratch: Vec<Neighbor>,
    pub(crate) summary: TickSummary,
}

impl World {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_rng(MAX_AGENTS, config, SimRng::from_entropy())
    }

    pub fn with_seed(config: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(MAX_AGENTS, config, SimRng::seed_from_u64(seed))
    }

    pub fn with_capacity(capacity: usize, config: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(capacity, config, SimRng::seed_from_u64(seed))
    }

    pub(crate) fn with_rng(capacity: usize, config: SimulationConfig, rng: SimRng) -> Self {
        let capacity = capacity.max(1);
        Self {
            agents: (0..capacity).map(|i| Agent::empty(AgentId(i as u32))).collect(),
            free: (0..capacity).rev().map(|i| AgentId(i as u32)).collect(),
            num_agents: 0,
            max_live_index: None,
            index: SpatialIndex::new(capacity),
            config,
            catalog: InstructionCatalog::default(),
            rng,
            tick: 0,
            scratch: Vec::new(),
            summary: TickSummary::default(),
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn capacity(&self) -> usize {
        self.agents.len()
    }

    #[inline]
    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    #[inline]
    pub fn max_live_index(&self) -> Option<usize> {
        self.max_live_index
    }

    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id.index())
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id.index())
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn living(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.agents.iter().filter(|a| a.is_alive())
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    pub fn catalog(&self) -> &InstructionCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut InstructionCatalog {
        &mut self.catalog
    }

    // --- Pool ---

    fn check_slot(&self, id: AgentId) -> Result<(), WorldError> {
        if id.index() >= self.agents.len() {
            return Err(WorldError::SlotOutOfRange {
                index: id.index(),
                capacity: self.agents.len(),
            });
        }
        Ok(())
    }

    /// Hands out a free slot. When the pool is full and `kill_if_necessary`
    /// is set, the lowest-index living agent is evicted first.
    pub fn create_empty_slot(
        &mut self,
        kill_if_necessary: bool,
    ) -> Result<Option<AgentId>, WorldError> {
        if let Some(id) = self.free.pop() {
            return Ok(Some(id));
        }
        if !kill_if_necessary {
            return Ok(None);
        }
        let Some(victim) = self.agents.iter().position(Agent::is_alive) else {
            return Ok(None);
        };
        self.kill(AgentId(victim as u32))?;
        self.summary.record_death(DeathCause::Evicted);
        Ok(self.free.pop())
    }

    /// Returns a slot handed out by `create_empty_slot` that was never used.
    pub(crate) fn release_slot(&mut self, id: AgentId) {
        if !self.agents[id.index()].exists() {
            self.free.push(id);
        }
    }

    pub fn add_to_world(&mut self, id: AgentId) -> Result<(), WorldError> {
        self.add_with_status(id, Status::Alive)
    }

    fn add_with_status(&mut self, id: AgentId, status: Status) -> Result<(), WorldError> {
        self.check_slot(id)?;
        let agent = &mut self.agents[id.index()];
        if agent.num_segments() == 0 {
            return Err(WorldError::NoSegments(id.index()));
        }
        let was_present = agent.exists();
        agent.status = status;
        for (i, segment) in agent.segments().iter().enumerate() {
            self.index.insert(agent.segment_id(i), segment.location);
        }
        if !was_present {
            self.num_agents += 1;
        }
        if status == Status::Alive {
            self.max_live_index = Some(self.max_live_index.map_or(id.index(), |m| m.max(id.index())));
        }
        Ok(())
    }

    pub fn kill(&mut self, id: AgentId) -> Result<(), WorldError> {
        self.check_slot(id)?;
        let agent = &mut self.agents[id.index()];
        if !agent.exists() {
            return Err(WorldError::SlotAlreadyEmpty(id.index()));
        }
        for i in 0..agent.num_segments() {
            self.index.remove(agent.segment_id(i));
        }
        *agent = Agent::empty(id);
        self.free.push(id);
        self.num_agents -= 1;
        Ok(())
    }

    // --- Scheduler ---

    /// Advances every living agent once, in ascending slot order.
    ///
    /// Offspring placed in a slot above the scan position are stepped in
    /// their birth tick; offspring placed below it wait for the next tick.
    pub fn step(&mut self) -> Result<TickSummary, WorldError> {
        let ctx = TickContext {
            config: self.config.clone(),
            catalog: self.catalog.clone(),
            tick: self.tick,
        };
        self.summary = TickSummary::new(self.tick);

        let mut i = 0;
        while self.max_live_index.is_some_and(|max| i <= max) {
            if self.agents[i].is_alive() {
                self.step_agent(AgentId(i as u32), &ctx)?;
            }
            i += 1;
        }
        self.max_live_index = self.agents.iter().rposition(Agent::is_alive);

        self.tick += 1;
        let mut summary = std::mem::take(&mut self.summary);
        summary.population = self.num_agents;
        Ok(summary)
    }

    // --- Control Operations ---

    pub fn reset(&mut self) {
        for (i, agent) in self.agents.iter_mut().enumerate() {
            *agent = Agent::empty(AgentId(i as u32));
        }
        self.free = (0..self.agents.len()).rev().map(|i| AgentId(i as u32)).collect();
        self.index.clear();
        self.num_agents = 0;
        self.max_live_index = None;
        self.tick = 0;
        log::info!("world reset ({} slots)", self.agents.len());
    }

    /// Places a new living agent. `energy` defaults to half its spawn
    /// threshold. Returns `None` when the pool is full.
    pub fn spawn_agent(
        &mut self,
        genome: Genome,
        location: Vec3,
        direction: Vec3,
        energy: Option<f32>,
    ) -> Result<Option<AgentId>, WorldError> {
        let Some(id) = self.create_empty_slot(false)? else {
            return Ok(None);
        };
        let config = self.config.clone();
        let agent = &mut self.agents[id.index()];
        if let Err(err) = agent.initialize(genome, location, direction, &config) {
            self.release_slot(id);
            return Err(err.into());
        }
        agent.energy = energy.unwrap_or(agent.spawn_energy * 0.5);
        agent.lineage.first_tick = self.tick;
        self.add_to_world(id)?;
        Ok(Some(id))
    }

    /// Scatters `count` copies of `genome` uniformly over the sphere.
    /// Returns how many were placed before the pool ran out.
    pub fn seed_random(&mut self, genome: Genome, count: usize) -> Result<usize, WorldError> {
        let mut placed = 0;
        for _ in 0..count {
            let location = random_unit_vector(&mut self.rng);
            let direction = random_tangent(location, &mut self.rng);
            if self.spawn_agent(genome, location, direction, None)?.is_none() {
                log::warn!("pool exhausted after seeding {placed} of {count} agents");
                break;
            }
            placed += 1;
        }
        Ok(placed)
    }

    /// Adds an immortal barrier whose segments sit exactly on `points`
    /// (at most `MAX_GENOME_LENGTH` of them).
    pub fn add_barrier(&mut self, points: &[Vec3]) -> Result<Option<AgentId>, WorldError> {
        let points = &points[..points.len().min(MAX_GENOME_LENGTH)];
        let genome = Genome::new(&vec![Instruction::always(Opcode::Barrier); points.len()])?;
        let Some(id) = self.create_empty_slot(false)? else {
            return Ok(None);
        };
        let locations: Vec<Vec3> = points.iter().map(|p| p.normalize_or_zero()).collect();
        let config = self.config.clone();
        if let Err(err) = self.agents[id.index()].place(genome, &locations, &config) {
            self.release_slot(id);
            return Err(err.into());
        }
        self.add_with_status(id, Status::Inanimate)?;
        Ok(Some(id))
    }

    /// Rebuilds pool bookkeeping and the spatial index from agent state.
    pub(crate) fn rebuild(&mut self) {
        self.index.clear();
        self.free.clear();
        self.num_agents = 0;
        for i in (0..self.agents.len()).rev() {
            let agent = &self.agents[i];
            if agent.exists() {
                self.num_agents += 1;
                for (s, segment) in agent.segments().iter().enumerate() {
                    self.index.insert(agent.segment_id(s), segment.location);
                }
            } else {
                self.free.push(AgentId(i as u32));
            }
        }
        self.max_live_index = self.agents.iter().rposition(Agent::is_alive);
    }

    pub(crate) fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Checks pool counters, program counters and index/segment agreement.
    pub fn check_invariants(&self) -> bool {
        let existing = self.agents.iter().filter(|a| a.exists()).count();
        if existing != self.num_agents {
            log::warn!("num_agents {} but {} slots in use", self.num_agents, existing);
            return false;
        }
        if let Some(last_alive) = self.agents.iter().rposition(Agent::is_alive) {
            if self.max_live_index.is_none_or(|max| max < last_alive) {
                log::warn!("agent {last_alive} is alive beyond max_live_index");
                return false;
            }
        }
        let mut registered = 0;
        for agent in self.agents.iter().filter(|a| a.exists()) {
            if agent.num_segments() > 0 && agent.active_segment() >= agent.num_segments() {
                return false;
            }
            for (i, segment) in agent.segments().iter().enumerate() {
                if self.index.location_of(agent.segment_id(i)) != Some(segment.location) {
                    log::warn!("segment {i} of agent {:?} is out of sync", agent.id);
                    return false;
                }
                registered += 1;
            }
        }
        registered == self.index.len() && self.index.is_consistent()
    }
}
