//! Particle simulation
//!
//! Particles are spawned at the root, travel their route at a fixed speed
//! and are counted on arrival. All mutable state lives in
//! [`SimulationState`]; [`ParticleSimulator`] only borrows the read-only
//! route cache and distribution, so several simulations can share one
//! diagram.
//!
//! Each tick runs, in order: spawn, advance/arrive, count, resolve
//! positions.

use rand::Rng;
use serde::Serialize;

use crate::config::{Palette, SpeedRange};
use crate::distribution::Distribution;
use crate::route::RouteCache;

/// Simulation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Maximum particles spawned per tick
    pub density: u32,
    pub speed_range: SpeedRange,
    /// Offsets are drawn within half a band either side of the route
    pub band_height: f64,
    pub palette: Palette,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            density: 5,
            speed_range: SpeedRange::default(),
            band_height: 10.0,
            palette: Palette::default(),
        }
    }
}

/// A particle in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: u64,
    /// Index into the distribution's targets
    pub target: usize,
    /// Index into the route cache
    pub route: usize,
    pub speed: f64,
    /// Band-axis offset from the route center line
    pub offset: f64,
    /// Distance traveled along the route
    pub pos: f64,
    pub created_at: u64,
    pub path_length: f64,
}

impl Particle {
    fn advance(&mut self, tick: u64) {
        self.pos = (tick - self.created_at) as f64 * self.speed;
    }

    fn has_arrived(&self) -> bool {
        self.pos >= self.path_length
    }
}

/// Mutable state of one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    particles: Vec<Particle>,
    arrivals: Vec<u64>,
    /// Spawns still owed to each target
    remaining: Vec<u64>,
    tick: u64,
    spawned: u64,
    total_particles: u64,
    next_id: u64,
}

impl SimulationState {
    /// Fresh state with one quota per target of `distribution`
    pub fn new(distribution: &Distribution) -> Self {
        let remaining: Vec<u64> = distribution.targets().iter().map(|t| t.count).collect();
        Self {
            particles: Vec::new(),
            arrivals: vec![0; remaining.len()],
            remaining,
            tick: 0,
            spawned: 0,
            total_particles: distribution.total(),
            next_id: 0,
        }
    }

    /// Particles currently in flight, in spawn order
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Arrivals per target, in distribution order
    pub fn arrivals(&self) -> &[u64] {
        &self.arrivals
    }

    /// Index of the next tick to run
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn total_particles(&self) -> u64 {
        self.total_particles
    }

    /// Every particle has been spawned and has arrived
    pub fn is_complete(&self) -> bool {
        self.spawned >= self.total_particles && self.particles.is_empty()
    }
}

/// A particle ready to draw
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sprite {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub color: String,
}

/// Arrival tally for one (leaf, group) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    pub leaf_name: String,
    pub group_key: String,
    pub absolute_count: u64,
    /// Arrivals over all particles of the run
    pub percent: f64,
}

/// Renderer-facing snapshot of one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub tick: u64,
    pub particles: Vec<Sprite>,
    pub counters: Vec<Counter>,
    pub spawned: u64,
    pub active: usize,
    pub complete: bool,
}

/// Runs ticks against a diagram's shared geometry and distribution
#[derive(Debug, Clone, Copy)]
pub struct ParticleSimulator<'a> {
    routes: &'a RouteCache,
    distribution: &'a Distribution,
    config: &'a SimulationConfig,
    /// Route index per target
    target_routes: &'a [usize],
}

impl<'a> ParticleSimulator<'a> {
    /// `target_routes[i]` must be the route index of target `i`
    pub fn new(
        routes: &'a RouteCache,
        distribution: &'a Distribution,
        config: &'a SimulationConfig,
        target_routes: &'a [usize],
    ) -> Self {
        Self {
            routes,
            distribution,
            config,
            target_routes,
        }
    }

    /// Run one tick and return what to draw
    pub fn tick<R: Rng>(&self, state: &mut SimulationState, rng: &mut R) -> Frame {
        let t = state.tick;

        self.spawn(state, rng, t);

        for particle in &mut state.particles {
            particle.advance(t);
        }
        let mut arrived = 0usize;
        let arrivals = &mut state.arrivals;
        state.particles.retain(|p| {
            if p.has_arrived() {
                arrivals[p.target] += 1;
                arrived += 1;
                false
            } else {
                true
            }
        });

        let counters = self.counters(state);
        let particles = self.sprites(state);

        tracing::trace!(
            tick = t,
            spawned = state.spawned,
            active = state.particles.len(),
            arrived,
            "tick"
        );

        state.tick += 1;

        Frame {
            tick: t,
            particles,
            counters,
            spawned: state.spawned,
            active: state.particles.len(),
            complete: state.is_complete(),
        }
    }

    /// Tick until every particle has arrived or `max_ticks` have run.
    ///
    /// Returns the last frame, or `None` if no tick ran.
    pub fn run_to_completion<R: Rng>(
        &self,
        state: &mut SimulationState,
        rng: &mut R,
        max_ticks: u64,
    ) -> Option<Frame> {
        let mut last = None;
        for _ in 0..max_ticks {
            if state.is_complete() {
                break;
            }
            last = Some(self.tick(state, rng));
        }
        last
    }

    fn spawn<R: Rng>(&self, state: &mut SimulationState, rng: &mut R, t: u64) {
        let wanted = rng.random_range(0..=self.config.density);
        let SpeedRange { min, max } = self.config.speed_range;
        let half_band = self.config.band_height / 2.0;

        for _ in 0..wanted {
            if state.spawned >= state.total_particles {
                break;
            }
            let Some(target) = self.draw_target(state, rng) else {
                break;
            };
            state.remaining[target] -= 1;

            let route = self.target_routes[target];
            let path_length = self.routes.route(route).map_or(0.0, |r| r.len() as f64);

            state.particles.push(Particle {
                id: state.next_id,
                target,
                route,
                speed: rng.random_range(min..=max),
                offset: rng.random_range(-half_band..=half_band),
                pos: 0.0,
                created_at: t,
                path_length,
            });
            state.next_id += 1;
            state.spawned += 1;
        }
    }

    /// Draw from the distribution; if that target's quota is spent, redraw
    /// in proportion to the quotas that are left.
    fn draw_target<R: Rng>(&self, state: &SimulationState, rng: &mut R) -> Option<usize> {
        let drawn = self.distribution.sample_index(rng);
        if state.remaining[drawn] > 0 {
            return Some(drawn);
        }

        let left: u64 = state.remaining.iter().sum();
        if left == 0 {
            return None;
        }
        let mut pick = rng.random_range(0..left);
        for (i, &quota) in state.remaining.iter().enumerate() {
            if pick < quota {
                return Some(i);
            }
            pick -= quota;
        }
        None
    }

    /// One counter per input group; zero-count groups stay at zero
    fn counters(&self, state: &SimulationState) -> Vec<Counter> {
        let total = state.total_particles.max(1) as f64;
        self.distribution
            .slots()
            .iter()
            .map(|slot| {
                let count = slot.target.map_or(0, |i| state.arrivals[i]);
                Counter {
                    leaf_name: slot.leaf_name.clone(),
                    group_key: slot.group_key.clone(),
                    absolute_count: count,
                    percent: count as f64 / total,
                }
            })
            .collect()
    }

    fn sprites(&self, state: &SimulationState) -> Vec<Sprite> {
        let targets = self.distribution.targets();
        state
            .particles
            .iter()
            .filter_map(|p| {
                let route = self.routes.route(p.route)?;
                match route.point_at(p.pos) {
                    Ok(point) => Some(Sprite {
                        id: p.id,
                        x: point.x,
                        y: point.y + p.offset,
                        color: self
                            .config
                            .palette
                            .color_for(&targets[p.target].group_key)
                            .to_string(),
                    }),
                    Err(err) => {
                        tracing::warn!(particle = p.id, %err, "skipping particle this tick");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;
    use crate::layout::{Layout, LayoutConfig};
    use crate::route::RouteConfig;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;

    struct Fixture {
        routes: RouteCache,
        distribution: Distribution,
        config: SimulationConfig,
        target_routes: Vec<usize>,
    }

    impl Fixture {
        fn new(input: serde_json::Value) -> Self {
            let tree = HierarchyBuilder::default().build(&input).unwrap();
            let layout = Layout::compute(&tree, &LayoutConfig::default()).unwrap();
            let routes = RouteCache::build(&layout, &RouteConfig::default());
            let distribution = Distribution::from_tree(&tree).unwrap();
            let target_routes = distribution
                .targets()
                .iter()
                .map(|t| routes.index_of(&t.leaf_name).unwrap())
                .collect();
            Self {
                routes,
                distribution,
                config: SimulationConfig::default(),
                target_routes,
            }
        }

        fn simulator(&self) -> ParticleSimulator<'_> {
            ParticleSimulator::new(
                &self.routes,
                &self.distribution,
                &self.config,
                &self.target_routes,
            )
        }
    }

    #[test]
    fn counts_match_input_exactly() {
        let fx = Fixture::new(json!({"A": {"failed": 3, "success": 7}}));
        let sim = fx.simulator();
        let mut state = SimulationState::new(&fx.distribution);
        let mut rng = SmallRng::seed_from_u64(7);

        let frame = sim.run_to_completion(&mut state, &mut rng, 100_000).unwrap();

        assert!(frame.complete);
        assert!(state.is_complete());
        assert_eq!(state.arrivals(), &[3, 7]);
        assert_eq!(frame.counters[0].absolute_count, 3);
        assert!((frame.counters[0].percent - 0.3).abs() < 1e-12);
        assert_eq!(frame.counters[1].absolute_count, 7);
    }

    #[test]
    fn zero_count_groups_report_an_empty_counter() {
        let fx = Fixture::new(json!({"A": {"failed": 0, "success": 4}}));
        let sim = fx.simulator();
        let mut state = SimulationState::new(&fx.distribution);
        let mut rng = SmallRng::seed_from_u64(13);

        let frame = sim.run_to_completion(&mut state, &mut rng, 100_000).unwrap();

        assert_eq!(frame.counters.len(), 2);
        assert_eq!(frame.counters[0].group_key, "failed");
        assert_eq!(frame.counters[0].absolute_count, 0);
        assert_eq!(frame.counters[0].percent, 0.0);
        assert_eq!(frame.counters[1].group_key, "success");
        assert_eq!(frame.counters[1].absolute_count, 4);
        assert_eq!(frame.counters[1].percent, 1.0);
    }

    #[test]
    fn never_spawns_past_the_cap() {
        let fx = Fixture::new(json!({"A": {"failed": 1, "success": 1}}));
        let sim = fx.simulator();
        let mut state = SimulationState::new(&fx.distribution);
        let mut rng = SmallRng::seed_from_u64(1);

        for _ in 0..50 {
            sim.tick(&mut state, &mut rng);
            assert!(state.spawned() <= 2);
        }
        assert_eq!(state.spawned(), 2);
    }

    #[test]
    fn positions_only_move_forward() {
        let fx = Fixture::new(json!({"A": {"failed": 30, "success": 70}}));
        let sim = fx.simulator();
        let mut state = SimulationState::new(&fx.distribution);
        let mut rng = SmallRng::seed_from_u64(3);

        let mut last_pos = std::collections::HashMap::new();
        for _ in 0..200 {
            sim.tick(&mut state, &mut rng);
            for p in state.particles() {
                if let Some(&prev) = last_pos.get(&p.id) {
                    assert!(p.pos > prev, "particle {} stalled at {}", p.id, p.pos);
                }
                last_pos.insert(p.id, p.pos);
            }
        }
    }

    #[test]
    fn position_is_derived_from_elapsed_ticks() {
        let fx = Fixture::new(json!({"A": {"failed": 5, "success": 5}}));
        let sim = fx.simulator();
        let mut state = SimulationState::new(&fx.distribution);
        let mut rng = SmallRng::seed_from_u64(11);

        for _ in 0..20 {
            sim.tick(&mut state, &mut rng);
            let elapsed_tick = state.tick() - 1;
            for p in state.particles() {
                assert_eq!(p.pos, (elapsed_tick - p.created_at) as f64 * p.speed);
                assert!(p.pos < p.path_length);
            }
        }
    }

    #[test]
    fn sprites_stay_within_band_of_route() {
        let fx = Fixture::new(json!({"A": {"failed": 40, "success": 60}}));
        let sim = fx.simulator();
        let mut state = SimulationState::new(&fx.distribution);
        let mut rng = SmallRng::seed_from_u64(5);

        for _ in 0..30 {
            let frame = sim.tick(&mut state, &mut rng);
            assert_eq!(frame.particles.len(), frame.active);
            for (sprite, particle) in frame.particles.iter().zip(state.particles()) {
                let center = fx.routes.route(particle.route).unwrap().point_at(particle.pos).unwrap();
                assert_eq!(sprite.x, center.x);
                assert!((sprite.y - center.y).abs() <= fx.config.band_height / 2.0 + 1e-9);
                assert!(sprite.color == "#e15759" || sprite.color == "#59a14f");
            }
        }
    }

    #[test]
    fn lookup_miss_skips_particle_but_keeps_it_active() {
        let fx = Fixture::new(json!({"A": {"failed": 1}}));
        let sim = fx.simulator();
        let mut state = SimulationState::new(&fx.distribution);
        state.particles.push(Particle {
            id: 99,
            target: 0,
            route: 0,
            speed: 1.0,
            offset: 0.0,
            pos: 0.0,
            created_at: 0,
            // longer than the cached route, so lookups miss near the end
            path_length: 1e9,
        });
        state.tick = fx.routes.route(0).unwrap().len() as u64 + 5;

        let frame = sim.tick(&mut state, &mut rng());
        assert!(frame.particles.iter().all(|s| s.id != 99));
        assert!(state.particles().iter().any(|p| p.id == 99));
    }

    #[test]
    fn independent_states_do_not_interfere() {
        let fx = Fixture::new(json!({"A": {"failed": 2, "success": 2}}));
        let sim = fx.simulator();
        let mut first = SimulationState::new(&fx.distribution);
        let mut second = SimulationState::new(&fx.distribution);

        sim.run_to_completion(&mut first, &mut SmallRng::seed_from_u64(1), 10_000);

        assert!(first.is_complete());
        assert_eq!(second.spawned(), 0);
        sim.run_to_completion(&mut second, &mut SmallRng::seed_from_u64(2), 10_000);
        assert_eq!(first.arrivals(), second.arrivals());
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let fx = Fixture::new(json!({"a": {"failed": 4, "success": 9}, "b": {"failed": 2, "success": 1}}));
        let sim = fx.simulator();

        let run = |seed| {
            let mut state = SimulationState::new(&fx.distribution);
            let mut rng = SmallRng::seed_from_u64(seed);
            (0..40).map(|_| sim.tick(&mut state, &mut rng)).collect::<Vec<_>>()
        };

        assert_eq!(run(9), run(9));
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0)
    }
}
