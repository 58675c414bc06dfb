use critters::persistence;
use critters::utils::{random_unit_vector, step_on_sphere};
use critters::{
    AgentId, Genome, Instruction, Opcode, SegmentId, SimulationConfig, Status, World,
};
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn quiet_config() -> SimulationConfig {
    SimulationConfig {
        mutation_percent: 0.0,
        spawn_delay_ticks: 0,
        ..SimulationConfig::uniform()
    }
}

fn genome(ops: &[Opcode]) -> Genome {
    let program: Vec<Instruction> = ops.iter().map(|&op| Instruction::always(op)).collect();
    Genome::new(&program).unwrap()
}

fn grazer() -> Genome {
    genome(&[Opcode::MoveAndEat])
}

fn worm() -> Genome {
    genome(&[Opcode::Move, Opcode::Photosynthesize, Opcode::Photosynthesize])
}

fn energy(world: &World, id: AgentId) -> f32 {
    world.agent(id).unwrap().energy
}

#[test]
fn lone_plant_gains_light_and_spawns_once() {
    let config = SimulationConfig {
        instruction_energy_cost: 0.0,
        photosynthesize_op_energy: 0.0,
        ..quiet_config()
    };
    let mut world = World::with_capacity(8, config.clone(), 11);
    let plant = world
        .spawn_agent(Genome::plant(), Vec3::Z, Vec3::X, None)
        .unwrap()
        .unwrap();
    let threshold = world.agent(plant).unwrap().spawn_energy;

    for _ in 0..10 {
        let before = energy(&world, plant);
        world.step().unwrap();
        let delta = energy(&world, plant) - before;
        assert!((delta - config.photosynthesis_energy).abs() < 1e-4);
    }
    assert_eq!(world.num_agents(), 1);

    world.agent_mut(plant).unwrap().energy = threshold - config.photosynthesis_energy * 0.5;
    let summary = world.step().unwrap();
    assert_eq!(summary.births, 1);
    assert_eq!(world.num_agents(), 2);
    assert_eq!(energy(&world, plant), threshold * 0.5);

    // The child landed in a higher slot, so it already ran once.
    let child = world.living().find(|a| a.id != plant).unwrap();
    assert_eq!(child.genome, Genome::plant());
    assert!(child.id.index() > plant.index());
    let expected = threshold * 0.5 + config.photosynthesis_energy;
    assert!((child.energy - expected).abs() < 1e-4);

    let summary = world.step().unwrap();
    assert_eq!(summary.births, 0);
    assert!(world.check_invariants());
}

#[test]
fn bite_drains_prey_which_dies_on_its_next_step() {
    let config = quiet_config();
    let mut world = World::with_capacity(8, config.clone(), 12);
    let ahead = step_on_sphere(Vec3::Z, Vec3::X * config.move_distance);
    let plant = world
        .spawn_agent(Genome::plant(), ahead, Vec3::Y, Some(1.5))
        .unwrap()
        .unwrap();
    let hunter = world
        .spawn_agent(grazer(), Vec3::Z, Vec3::X, Some(30.0))
        .unwrap()
        .unwrap();

    let summary = world.step().unwrap();
    assert_eq!(summary.bites, 1);
    let prey = world.agent(plant).unwrap();
    assert_eq!(prey.status, Status::Alive);
    assert!(prey.flags.was_eaten);
    assert!(prey.flags.was_preyed_on);
    assert_eq!(prey.energy, 0.0);

    let gain = config.bite_strength * config.digestion_efficiency;
    let expected = 30.0 - config.instruction_energy_cost - config.eat_energy_cost + gain;
    assert!((energy(&world, hunter) - expected).abs() < 1e-4);
    let head = world.agent(hunter).unwrap().head().unwrap().location;
    assert!(head.distance(ahead) < 1e-5);

    let summary = world.step().unwrap();
    assert_eq!(summary.deaths.eaten, 1);
    assert_eq!(summary.food_seeds, 0, "plants leave no food");
    assert_eq!(world.agent(plant).unwrap().status, Status::NonExistent);
    assert!(world.check_invariants());
}

#[test]
fn starved_worm_turns_into_dormant_food() {
    let config = SimulationConfig {
        photosynthesis_energy: 0.0,
        ..quiet_config()
    };
    let mut world = World::with_capacity(8, config.clone(), 13);
    let id = world
        .spawn_agent(worm(), Vec3::Z, Vec3::X, Some(0.0))
        .unwrap()
        .unwrap();
    let body: Vec<Vec3> = world
        .agent(id)
        .unwrap()
        .segments()
        .iter()
        .map(|s| s.location)
        .collect();
    let share = world.agent(id).unwrap().spawn_energy / 3.0 / 2.0;

    let summary = world.step().unwrap();
    assert_eq!(summary.deaths.starvation, 1);
    assert_eq!(summary.food_seeds, 3);

    let seeds: Vec<_> = world.living().collect();
    assert_eq!(seeds.len(), 3);
    for seed in &seeds {
        assert_eq!(seed.genome, Genome::plant());
        assert!(!seed.flags.allow_mutate);
        assert!((seed.energy - share).abs() < 1e-5);
        assert!(seed.dormancy + 1 >= config.food_dormancy);
        let at = seed.head().unwrap().location;
        assert!(body.iter().any(|&p| p == at));
    }
    assert!(world.check_invariants());
}

#[test]
fn barrier_blocks_and_the_flag_is_read_once() {
    let config = quiet_config();
    let mut world = World::with_capacity(8, config.clone(), 14);
    let walker = world
        .spawn_agent(genome(&[Opcode::Move, Opcode::TestBlocked]), Vec3::Z, Vec3::X, Some(10.0))
        .unwrap()
        .unwrap();
    let ahead = step_on_sphere(Vec3::Z, Vec3::X * config.move_distance);
    world.add_barrier(&[ahead]).unwrap().unwrap();

    world.step().unwrap();
    let agent = world.agent(walker).unwrap();
    assert_eq!(agent.head().unwrap().location, Vec3::Z);
    assert!(agent.flags.was_blocked);
    assert_eq!(agent.active_segment(), 1);

    world.step().unwrap();
    let agent = world.agent(walker).unwrap();
    assert!(agent.flags.condition);
    assert!(!agent.flags.was_blocked);
}

#[test]
fn hyper_runs_until_the_program_wraps() {
    let config = quiet_config();
    let mut world = World::with_capacity(4, config.clone(), 15);
    let id = world
        .spawn_agent(
            genome(&[Opcode::Hyper, Opcode::TurnLeft, Opcode::TurnRight]),
            Vec3::Z,
            Vec3::X,
            Some(10.0),
        )
        .unwrap()
        .unwrap();
    world.step().unwrap();

    let agent = world.agent(id).unwrap();
    assert_eq!(agent.active_segment(), 0);
    assert!(!agent.flags.is_hyper);
    let spent = 3.0 * config.instruction_energy_cost + 2.0 * config.hyper_energy_cost;
    assert!((agent.energy - (10.0 - spent)).abs() < 1e-4);
    // Left then right leaves the heading where it started.
    assert!(agent.move_vector.normalize().distance(Vec3::X) < 1e-4);
}

#[test]
fn long_run_keeps_pool_and_index_consistent() {
    let mut world = World::with_capacity(400, SimulationConfig::new(), 16);
    world.seed_random(Genome::plant(), 150).unwrap();
    world
        .seed_random(
            genome(&[Opcode::MoveAndEat, Opcode::TestSeeFood, Opcode::TurnRight]),
            30,
        )
        .unwrap();
    for _ in 0..300 {
        world.step().unwrap();
        assert!(world.check_invariants(), "tick {}", world.tick());
        for agent in world.agents().iter().filter(|a| a.exists()) {
            assert!(agent.active_segment() < agent.num_segments());
        }
    }
}

#[test]
fn snapshot_round_trip_answers_queries_identically() {
    let mut world = World::with_capacity(200, quiet_config(), 17);
    world.seed_random(Genome::plant(), 80).unwrap();
    world.seed_random(worm(), 20).unwrap();
    for _ in 0..40 {
        world.step().unwrap();
    }
    let loaded = persistence::load(&persistence::save(&world)).unwrap();
    assert_eq!(loaded.num_agents(), world.num_agents());

    let nearby = |w: &World, point: Vec3| {
        let mut hits = Vec::new();
        w.index().query_near(point, 0.2, usize::MAX, None, &mut hits);
        let mut ids: Vec<SegmentId> = hits.iter().map(|n| n.segment).collect();
        ids.sort();
        ids
    };
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..20 {
        let point = random_unit_vector(&mut rng);
        assert_eq!(nearby(&world, point), nearby(&loaded, point));
    }
    for (a, b) in world.agents().iter().zip(loaded.agents()) {
        assert_eq!(a.status, b.status);
        assert_eq!(a.energy, b.energy);
        assert_eq!(a.genome, b.genome);
    }
}
