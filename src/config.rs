// --- File: config.rs ---
use std::f32::consts::PI;

// Fraction of move distance under which two bodies count as overlapping.
const DEFAULT_OVERLAP_FACTOR: f32 = 0.5;

// Distances are unit-sphere coordinates; durations are ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    // --- Motion ---
    pub move_distance: f32,
    /// Scales the eat/collision radius of move-and-eat heads.
    pub mouth_size: f32,
    pub turn_angle: f32,
    pub hard_turn_angle: f32,
    pub overlap_factor: f32,

    // --- Energy ---
    pub instruction_energy_cost: f32,
    pub skip_energy_cost: f32,
    pub sleep_energy_cost: f32,
    pub hyper_energy_cost: f32,
    pub move_energy_cost: f32,
    pub eat_energy_cost: f32,
    /// Passive gain per unoccluded photosynthesize segment per tick.
    pub photosynthesis_energy: f32,
    /// Extra gain when the photosynthesize instruction itself runs.
    pub photosynthesize_op_energy: f32,
    pub bite_strength: f32,
    pub digestion_efficiency: f32,

    // --- Reproduction ---
    pub base_spawn_energy: f32,
    pub segment_spawn_energy: f32,
    pub move_spawn_energy: f32,
    pub eat_spawn_energy: f32,
    pub mutation_percent: f32,
    pub spawn_delay_ticks: u32,
    pub spawn_sleep_ticks: u32,
    // Never-moved parents place offspring between these multiples of move distance.
    pub spawn_min_spread: f32,
    pub spawn_max_spread: f32,
    pub tail_spawn_offset: f32,
    pub crowding_radius: f32,
    pub crowding_cap: usize,
    pub crowding_penalty: f32,
    pub crowding_dormancy: u32,

    // --- Lifecycle ---
    pub lifespan: u32,
    pub sleep_ticks: u32,
    pub food_dormancy: u32,
    pub become_food: bool,
    pub decimate: bool,

    // --- Senses ---
    pub look_steps: u32,
    pub look_distance: f32,
    pub look_spread: f32,
    /// Radius multiplier used by test-occluded when scanning for eaters.
    pub threat_radius_factor: f32,

    // --- Rule Toggles ---
    pub allow_self_overlap: bool,
    pub allow_cannibalism: bool,
    pub allow_or: bool,

    // --- Pacing ---
    /// Global speed in (0, 1]; values below 1 pad agents with dormancy.
    pub speed: f32,
    /// Northern-born agents only act on multiples of this tick count.
    pub slow_lane_period: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            move_distance: 0.004,
            mouth_size: 1.5,
            turn_angle: PI / 16.0,
            hard_turn_angle: PI / 2.0,
            overlap_factor: DEFAULT_OVERLAP_FACTOR,

            instruction_energy_cost: 0.05,
            skip_energy_cost: 0.01,
            sleep_energy_cost: 0.01,
            hyper_energy_cost: 0.1,
            move_energy_cost: 0.1,
            eat_energy_cost: 0.15,
            photosynthesis_energy: 0.1,
            photosynthesize_op_energy: 0.05,
            bite_strength: 2.0,
            digestion_efficiency: 0.5,

            base_spawn_energy: 20.0,
            segment_spawn_energy: 5.0,
            move_spawn_energy: 10.0,
            eat_spawn_energy: 15.0,
            mutation_percent: 10.0,
            spawn_delay_ticks: 0,
            spawn_sleep_ticks: 10,
            spawn_min_spread: 2.0,
            spawn_max_spread: 4.0,
            tail_spawn_offset: 0.5,
            crowding_radius: 0.02,
            crowding_cap: 12,
            crowding_penalty: 1_000.0,
            crowding_dormancy: 50,

            lifespan: 20_000,
            sleep_ticks: 4,
            food_dormancy: 200,
            become_food: true,
            decimate: false,

            look_steps: 6,
            look_distance: 0.04,
            look_spread: 1.3,
            threat_radius_factor: 3.0,

            allow_self_overlap: false,
            allow_cannibalism: false,
            allow_or: false,

            speed: 1.0,
            slow_lane_period: 2,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset without the regional and pacing asymmetries. Handy for
    /// experiments that compare agents placed anywhere on the sphere.
    pub fn uniform() -> Self {
        let mut config = Self::default();
        config.slow_lane_period = 1;
        config.speed = 1.0;
        config
    }

    #[inline]
    pub fn eat_radius(&self) -> f32 {
        self.move_distance * self.mouth_size
    }

    #[inline]
    pub fn overlap_radius(&self) -> f32 {
        self.move_distance * self.overlap_factor
    }

    #[inline]
    pub fn mutation_probability(&self) -> f64 {
        (self.mutation_percent as f64 / 100.0).clamp(0.0, 1.0)
    }

    /// Dormancy added after each tick so slow settings keep real-time pacing.
    pub fn pacing_dormancy(&self) -> u32 {
        if self.speed >= 1.0 || self.speed <= 0.0 {
            return 0;
        }
        (1.0 / self.speed - 1.0).round() as u32
    }
}
// --- End of File: config.rs ---
