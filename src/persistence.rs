//! Binary world snapshots.
//!
//! Layout: a header, the config record, then every agent slot and every
//! segment slot as fixed-size `Pod` records in native byte order. The
//! leading tag lets a reader on a different-endian machine refuse the file.
//! The RNG is not stored; a loaded world draws fresh entropy.

use crate::agent::{Agent, AgentFlags, AgentId, Lineage, Segment, Status};
use crate::config::SimulationConfig;
use crate::constants::{MAX_SEGMENTS, SNAPSHOT_ENDIAN_TAG, SNAPSHOT_VERSION};
use crate::error::PersistError;
use crate::genome::{GENOME_BYTES, Genome};
use crate::instruction::{InstructionCatalog, Opcode};
use crate::world::{SimRng, World};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rand::SeedableRng;
use std::mem::size_of;

#[derive(Debug, Copy, Clone, Pod, Zeroable)]
#[repr(C)]
struct SnapshotHeader {
    endian_tag: u32,
    version: u32,
    capacity: u32,
    max_segments: u32,
    tick: [u32; 2],
    config_size: u32,
    agent_size: u32,
    segment_size: u32,
}

#[derive(Debug, Copy, Clone, Pod, Zeroable)]
#[repr(C)]
struct ConfigRecord {
    move_distance: f32,
    mouth_size: f32,
    turn_angle: f32,
    hard_turn_angle: f32,
    overlap_factor: f32,
    instruction_energy_cost: f32,
    skip_energy_cost: f32,
    sleep_energy_cost: f32,
    hyper_energy_cost: f32,
    move_energy_cost: f32,
    eat_energy_cost: f32,
    photosynthesis_energy: f32,
    photosynthesize_op_energy: f32,
    bite_strength: f32,
    digestion_efficiency: f32,
    base_spawn_energy: f32,
    segment_spawn_energy: f32,
    move_spawn_energy: f32,
    eat_spawn_energy: f32,
    mutation_percent: f32,
    spawn_delay_ticks: u32,
    spawn_sleep_ticks: u32,
    spawn_min_spread: f32,
    spawn_max_spread: f32,
    tail_spawn_offset: f32,
    crowding_radius: f32,
    crowding_cap: u32,
    crowding_penalty: f32,
    crowding_dormancy: u32,
    lifespan: u32,
    sleep_ticks: u32,
    food_dormancy: u32,
    look_steps: u32,
    look_distance: f32,
    look_spread: f32,
    threat_radius_factor: f32,
    speed: f32,
    slow_lane_period: u32,
    // become_food, decimate, allow_self_overlap, allow_cannibalism, allow_or
    toggles: u32,
    // Bit `code - 1` set for every available opcode.
    catalog: u32,
}

#[derive(Debug, Copy, Clone, Pod, Zeroable)]
#[repr(C)]
struct AgentRecord {
    status: u32,
    genome: [u8; GENOME_BYTES],
    parent_genome: [u8; GENOME_BYTES],
    has_parent: u32,
    first_tick: [u32; 2],
    num_segments: u32,
    active_segment: u32,
    energy: f32,
    spawn_energy: f32,
    lifespan: u32,
    flags: u32,
    sleep: u32,
    dormancy: u32,
    spawn_delay: u32,
    has_spawn_location: u32,
    spawn_location: [f32; 3],
    birth_location: [f32; 3],
    move_vector: [f32; 3],
}

#[derive(Debug, Copy, Clone, Pod, Zeroable)]
#[repr(C)]
struct SegmentRecord {
    location: [f32; 3],
    opcode: u8,
    occluded: u8,
    anchored: u8,
    index: u8,
}

const HEADER_SIZE: usize = size_of::<SnapshotHeader>();
const CONFIG_SIZE: usize = size_of::<ConfigRecord>();
const AGENT_SIZE: usize = size_of::<AgentRecord>();
const SEGMENT_SIZE: usize = size_of::<SegmentRecord>();

fn split_tick(tick: u64) -> [u32; 2] {
    [tick as u32, (tick >> 32) as u32]
}

fn join_tick(parts: [u32; 2]) -> u64 {
    parts[0] as u64 | ((parts[1] as u64) << 32)
}

fn status_code(status: Status) -> u32 {
    match status {
        Status::NonExistent => 0,
        Status::Alive => 1,
        Status::Inanimate => 2,
    }
}

fn status_from_code(code: u32) -> Result<Status, PersistError> {
    match code {
        0 => Ok(Status::NonExistent),
        1 => Ok(Status::Alive),
        2 => Ok(Status::Inanimate),
        _ => Err(PersistError::Corrupt("agent status")),
    }
}

impl ConfigRecord {
    fn new(config: &SimulationConfig, catalog: &InstructionCatalog) -> Self {
        let toggles = [
            config.become_food,
            config.decimate,
            config.allow_self_overlap,
            config.allow_cannibalism,
            config.allow_or,
        ]
        .iter()
        .enumerate()
        .fold(0, |bits, (i, &on)| bits | ((on as u32) << i));
        let catalog = catalog
            .available()
            .fold(0, |bits, op| bits | (1u32 << (op.code() - 1)));
        Self {
            move_distance: config.move_distance,
            mouth_size: config.mouth_size,
            turn_angle: config.turn_angle,
            hard_turn_angle: config.hard_turn_angle,
            overlap_factor: config.overlap_factor,
            instruction_energy_cost: config.instruction_energy_cost,
            skip_energy_cost: config.skip_energy_cost,
            sleep_energy_cost: config.sleep_energy_cost,
            hyper_energy_cost: config.hyper_energy_cost,
            move_energy_cost: config.move_energy_cost,
            eat_energy_cost: config.eat_energy_cost,
            photosynthesis_energy: config.photosynthesis_energy,
            photosynthesize_op_energy: config.photosynthesize_op_energy,
            bite_strength: config.bite_strength,
            digestion_efficiency: config.digestion_efficiency,
            base_spawn_energy: config.base_spawn_energy,
            segment_spawn_energy: config.segment_spawn_energy,
            move_spawn_energy: config.move_spawn_energy,
            eat_spawn_energy: config.eat_spawn_energy,
            mutation_percent: config.mutation_percent,
            spawn_delay_ticks: config.spawn_delay_ticks,
            spawn_sleep_ticks: config.spawn_sleep_ticks,
            spawn_min_spread: config.spawn_min_spread,
            spawn_max_spread: config.spawn_max_spread,
            tail_spawn_offset: config.tail_spawn_offset,
            crowding_radius: config.crowding_radius,
            crowding_cap: config.crowding_cap as u32,
            crowding_penalty: config.crowding_penalty,
            crowding_dormancy: config.crowding_dormancy,
            lifespan: config.lifespan,
            sleep_ticks: config.sleep_ticks,
            food_dormancy: config.food_dormancy,
            look_steps: config.look_steps,
            look_distance: config.look_distance,
            look_spread: config.look_spread,
            threat_radius_factor: config.threat_radius_factor,
            speed: config.speed,
            slow_lane_period: config.slow_lane_period,
            toggles,
            catalog,
        }
    }

    fn config(&self) -> SimulationConfig {
        let toggle = |i: u32| self.toggles & (1 << i) != 0;
        SimulationConfig {
            move_distance: self.move_distance,
            mouth_size: self.mouth_size,
            turn_angle: self.turn_angle,
            hard_turn_angle: self.hard_turn_angle,
            overlap_factor: self.overlap_factor,
            instruction_energy_cost: self.instruction_energy_cost,
            skip_energy_cost: self.skip_energy_cost,
            sleep_energy_cost: self.sleep_energy_cost,
            hyper_energy_cost: self.hyper_energy_cost,
            move_energy_cost: self.move_energy_cost,
            eat_energy_cost: self.eat_energy_cost,
            photosynthesis_energy: self.photosynthesis_energy,
            photosynthesize_op_energy: self.photosynthesize_op_energy,
            bite_strength: self.bite_strength,
            digestion_efficiency: self.digestion_efficiency,
            base_spawn_energy: self.base_spawn_energy,
            segment_spawn_energy: self.segment_spawn_energy,
            move_spawn_energy: self.move_spawn_energy,
            eat_spawn_energy: self.eat_spawn_energy,
            mutation_percent: self.mutation_percent,
            spawn_delay_ticks: self.spawn_delay_ticks,
            spawn_sleep_ticks: self.spawn_sleep_ticks,
            spawn_min_spread: self.spawn_min_spread,
            spawn_max_spread: self.spawn_max_spread,
            tail_spawn_offset: self.tail_spawn_offset,
            crowding_radius: self.crowding_radius,
            crowding_cap: self.crowding_cap as usize,
            crowding_penalty: self.crowding_penalty,
            crowding_dormancy: self.crowding_dormancy,
            lifespan: self.lifespan,
            sleep_ticks: self.sleep_ticks,
            food_dormancy: self.food_dormancy,
            become_food: toggle(0),
            decimate: toggle(1),
            look_steps: self.look_steps,
            look_distance: self.look_distance,
            look_spread: self.look_spread,
            threat_radius_factor: self.threat_radius_factor,
            allow_self_overlap: toggle(2),
            allow_cannibalism: toggle(3),
            allow_or: toggle(4),
            speed: self.speed,
            slow_lane_period: self.slow_lane_period,
        }
    }

    fn catalog(&self) -> InstructionCatalog {
        let mut catalog = InstructionCatalog::empty();
        for op in Opcode::ALL {
            catalog.set_available(op, self.catalog & (1 << (op.code() - 1)) != 0);
        }
        catalog
    }
}

impl AgentRecord {
    fn new(agent: &Agent) -> Self {
        let parent = agent.lineage.parent;
        let spawn_location = agent.spawn_location.unwrap_or(Vec3::ZERO);
        Self {
            status: status_code(agent.status),
            genome: agent.genome.to_bytes(),
            parent_genome: parent.map_or([0; GENOME_BYTES], |g| g.to_bytes()),
            has_parent: parent.is_some() as u32,
            first_tick: split_tick(agent.lineage.first_tick),
            num_segments: agent.num_segments as u32,
            active_segment: agent.active_segment as u32,
            energy: agent.energy,
            spawn_energy: agent.spawn_energy,
            lifespan: agent.lifespan,
            flags: agent.flags.to_bits(),
            sleep: agent.sleep,
            dormancy: agent.dormancy,
            spawn_delay: agent.spawn_delay,
            has_spawn_location: agent.spawn_location.is_some() as u32,
            spawn_location: spawn_location.to_array(),
            birth_location: agent.birth_location.to_array(),
            move_vector: agent.move_vector.to_array(),
        }
    }

    fn restore(&self, agent: &mut Agent, segments: &[SegmentRecord]) -> Result<(), PersistError> {
        let status = status_from_code(self.status)?;
        if status == Status::NonExistent {
            *agent = Agent::empty(agent.id);
            return Ok(());
        }
        let num_segments = self.num_segments as usize;
        if num_segments == 0 || num_segments > MAX_SEGMENTS {
            return Err(PersistError::Corrupt("segment count"));
        }
        if self.active_segment as usize >= num_segments {
            return Err(PersistError::Corrupt("program counter"));
        }
        agent.status = status;
        agent.genome = Genome::from_bytes(&self.genome)?;
        agent.lineage = Lineage {
            first_tick: join_tick(self.first_tick),
            parent: if self.has_parent != 0 {
                Some(Genome::from_bytes(&self.parent_genome)?)
            } else {
                None
            },
        };
        for (slot, record) in agent.segments.iter_mut().zip(segments) {
            *slot = Segment {
                location: Vec3::from_array(record.location),
                opcode: Opcode::from_code(record.opcode)
                    .ok_or(PersistError::Corrupt("segment opcode"))?,
                occluded: record.occluded != 0,
                anchored: record.anchored != 0,
                index: record.index,
            };
        }
        agent.num_segments = num_segments;
        agent.active_segment = self.active_segment as usize;
        agent.energy = self.energy;
        agent.spawn_energy = self.spawn_energy;
        agent.lifespan = self.lifespan;
        agent.flags = AgentFlags::from_bits(self.flags);
        agent.sleep = self.sleep;
        agent.dormancy = self.dormancy;
        agent.spawn_delay = self.spawn_delay;
        agent.spawn_location =
            (self.has_spawn_location != 0).then(|| Vec3::from_array(self.spawn_location));
        agent.birth_location = Vec3::from_array(self.birth_location);
        agent.move_vector = Vec3::from_array(self.move_vector);
        Ok(())
    }
}

impl SegmentRecord {
    fn new(segment: &Segment) -> Self {
        Self {
            location: segment.location.to_array(),
            opcode: segment.opcode.code(),
            occluded: segment.occluded as u8,
            anchored: segment.anchored as u8,
            index: segment.index,
        }
    }
}

/// Serializes the whole pool, including empty slots.
pub fn save(world: &World) -> Vec<u8> {
    let capacity = world.capacity();
    let header = SnapshotHeader {
        endian_tag: SNAPSHOT_ENDIAN_TAG,
        version: SNAPSHOT_VERSION,
        capacity: capacity as u32,
        max_segments: MAX_SEGMENTS as u32,
        tick: split_tick(world.tick()),
        config_size: CONFIG_SIZE as u32,
        agent_size: AGENT_SIZE as u32,
        segment_size: SEGMENT_SIZE as u32,
    };
    let mut bytes = Vec::with_capacity(snapshot_len(capacity));
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(bytemuck::bytes_of(&ConfigRecord::new(
        world.config(),
        world.catalog(),
    )));
    let agents: Vec<AgentRecord> = world.agents().iter().map(AgentRecord::new).collect();
    bytes.extend_from_slice(bytemuck::cast_slice(&agents));
    let segments: Vec<SegmentRecord> = world
        .agents()
        .iter()
        .flat_map(|agent| agent.segments.iter().map(SegmentRecord::new))
        .collect();
    bytes.extend_from_slice(bytemuck::cast_slice(&segments));
    log::debug!("saved {} agents at tick {} ({} bytes)", world.num_agents(), world.tick(), bytes.len());
    bytes
}

/// Rebuilds a world from `save` output. The spatial index and pool
/// bookkeeping are reconstructed from the agent records.
pub fn load(bytes: &[u8]) -> Result<World, PersistError> {
    let mut reader = Reader { bytes, offset: 0 };
    let tag: u32 = reader.peek()?;
    if tag == SNAPSHOT_ENDIAN_TAG.swap_bytes() {
        return Err(PersistError::ForeignEndianness);
    }
    if tag != SNAPSHOT_ENDIAN_TAG {
        return Err(PersistError::Corrupt("snapshot tag"));
    }
    let header: SnapshotHeader = reader.read()?;
    if header.version != SNAPSHOT_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: header.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    if header.max_segments as usize != MAX_SEGMENTS
        || header.config_size as usize != CONFIG_SIZE
        || header.agent_size as usize != AGENT_SIZE
        || header.segment_size as usize != SEGMENT_SIZE
    {
        return Err(PersistError::Corrupt("record layout"));
    }
    let capacity = header.capacity as usize;
    if capacity == 0 {
        return Err(PersistError::Corrupt("capacity"));
    }
    let needed = snapshot_len(capacity);
    if bytes.len() < needed {
        return Err(PersistError::Truncated {
            needed,
            found: bytes.len(),
        });
    }

    let config_record: ConfigRecord = reader.read()?;
    let mut world = World::with_rng(
        capacity,
        config_record.config(),
        SimRng::from_entropy(),
    );
    *world.catalog_mut() = config_record.catalog();

    let agent_records: Vec<AgentRecord> = (0..capacity)
        .map(|_| reader.read())
        .collect::<Result<_, _>>()?;
    let segment_records: Vec<SegmentRecord> = (0..capacity * MAX_SEGMENTS)
        .map(|_| reader.read())
        .collect::<Result<_, _>>()?;
    for (i, record) in agent_records.iter().enumerate() {
        let agent = &mut world.agents[i];
        agent.id = AgentId(i as u32);
        let segments = &segment_records[i * MAX_SEGMENTS..(i + 1) * MAX_SEGMENTS];
        record.restore(agent, segments)?;
    }
    world.set_tick(join_tick(header.tick));
    world.rebuild();
    log::info!("loaded {} agents at tick {}", world.num_agents(), world.tick());
    Ok(world)
}

fn snapshot_len(capacity: usize) -> usize {
    HEADER_SIZE + CONFIG_SIZE + capacity * AGENT_SIZE + capacity * MAX_SEGMENTS * SEGMENT_SIZE
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn peek<T: Pod>(&self) -> Result<T, PersistError> {
        let end = self.offset + size_of::<T>();
        let chunk = self.bytes.get(self.offset..end).ok_or(PersistError::Truncated {
            needed: end,
            found: self.bytes.len(),
        })?;
        Ok(bytemuck::pod_read_unaligned(chunk))
    }

    fn read<T: Pod>(&mut self) -> Result<T, PersistError> {
        let value = self.peek()?;
        self.offset += size_of::<T>();
        Ok(value)
    }
}
