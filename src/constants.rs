// --- File: constants.rs ---
// --- Global Simulation Constants ---

/// Longest genome a critter can carry (live instructions, sentinel excluded).
pub const MAX_GENOME_LENGTH: usize = 15;
/// Body capacity of a single critter.
pub const MAX_SEGMENTS: usize = 20;
/// Number of slots in the agent pool.
pub const MAX_AGENTS: usize = 30_000;

// Spatial grid resolution per axis over the [-1, 1] cube.
pub const GRID_DIM: usize = 64;

pub const MAX_HYPER_STEPS: usize = 5;
pub const DECIMATE_FRACTION: f64 = 0.1;

// Query buffer sizes. Results past these are dropped silently.
pub const MAX_MOVE_RESULTS: usize = 64;
pub const MAX_LOOK_RESULTS: usize = 32;
pub const MAX_CROWD_RESULTS: usize = 256;

// Clear the condition flag whenever the program counter wraps.
pub const RESET_CONDITION_ON_WRAP: bool = false;

// --- Snapshot Format ---
pub const SNAPSHOT_ENDIAN_TAG: u32 = 0x0102_0304;
pub const SNAPSHOT_VERSION: u32 = 1;

// --- Headless Runner ---
pub const INITIAL_PLANT_COUNT: usize = 400;
pub const INITIAL_GRAZER_COUNT: usize = 60;
pub const RUNNER_SEED: u64 = 0x5EED_C417;
pub const REPORT_INTERVAL_TICKS: u64 = 200;
pub const RUNNER_TOTAL_TICKS: u64 = 2_000;
// --- End of File: constants.rs ---
