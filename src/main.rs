use critters::constants::{
    INITIAL_GRAZER_COUNT, INITIAL_PLANT_COUNT, REPORT_INTERVAL_TICKS, RUNNER_SEED,
    RUNNER_TOTAL_TICKS,
};
use critters::{Condition, Genome, Instruction, Opcode, SharedWorld, SimulationConfig, World};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

// --- Runner Settings ---
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SPECIES_REPORTED: usize = 5;

/// Eats while it can see food, veers right otherwise and swerves hard when
/// blocked.
fn grazer() -> Result<Genome, critters::GenomeError> {
    Genome::new(&[
        Instruction::always(Opcode::MoveAndEat),
        Instruction::always(Opcode::TestSeeFood),
        Instruction::new(Opcode::TurnRight, Condition::NotIf),
        Instruction::always(Opcode::TestBlocked),
        Instruction::new(Opcode::HardTurnLeft, Condition::If),
    ])
}

fn report(shared: &SharedWorld) {
    let summary = shared.latest_summary();
    log::info!("{summary}");
    shared.with_world(|world| {
        for (rank, species) in world.top_species(SPECIES_REPORTED).iter().enumerate() {
            let since = world.first_tick_seen(&species.genome).unwrap_or_default();
            log::info!(
                "  #{} {} x{} (since tick {since})",
                rank + 1,
                species.genome,
                species.count
            );
        }
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let mut world = World::with_seed(SimulationConfig::new(), RUNNER_SEED);
    let plants = world.seed_random(Genome::plant(), INITIAL_PLANT_COUNT)?;
    let grazers = world.seed_random(grazer()?, INITIAL_GRAZER_COUNT)?;
    log::info!("seeded {plants} plants and {grazers} grazers");

    let shared = SharedWorld::new(world);
    let stop = Arc::new(AtomicBool::new(false));
    let worker = shared.spawn_worker(Some(RUNNER_TOTAL_TICKS), stop);
    let started = Instant::now();
    let mut next_report = REPORT_INTERVAL_TICKS;

    while !worker.is_finished() {
        std::thread::sleep(POLL_INTERVAL);
        let tick = shared.with_world(|world| world.tick());
        if tick >= next_report {
            report(&shared);
            next_report = tick + REPORT_INTERVAL_TICKS;
        }
    }
    let ticks = worker
        .join()
        .map_err(|_| "simulation worker panicked")??;
    report(&shared);
    log::info!(
        "ran {ticks} ticks in {:.1}s",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
