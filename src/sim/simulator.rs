use std::sync::{Arc, RwLock};
use std::thread;

use anyhow::bail;
use log::{debug, info};

use crate::base::unit::{lock_read, lock_write, Unit, UnitHandle};

pub type Cycle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(usize);

/// Owns every unit and drives the two-phase clock: all units rise, then all units fall.
///
/// Units are registered into groups. In parallel mode each group runs a phase on its own
/// thread and the end of the phase is the barrier; groups must not share mutable state beyond
/// the port contract, which only lets a unit touch its downstream neighbour's ports.
pub struct Simulator {
    units: Vec<UnitHandle>,
    groups: Vec<Vec<usize>>,
    cycle: Cycle,
    timeout: Cycle,
    parallel: bool,
}

impl Simulator {
    pub fn new(timeout: Cycle, parallel: bool) -> Self {
        Self {
            units: Vec::new(),
            groups: vec![Vec::new()],
            cycle: 0,
            timeout,
            parallel,
        }
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    pub fn start_new_unit_group(&mut self) {
        if self.groups.last().is_some_and(|group| !group.is_empty()) {
            self.groups.push(Vec::new());
        }
    }

    pub fn register<U: Unit + 'static>(&mut self, unit: Arc<RwLock<U>>) -> UnitId {
        let id = self.units.len();
        debug!("register unit {} as {}", lock_read(&unit).name(), id);
        self.units.push(unit);
        if let Some(group) = self.groups.last_mut() {
            group.push(id);
        }
        UnitId(id)
    }

    pub fn unit(&self, id: UnitId) -> &UnitHandle {
        &self.units[id.0]
    }

    pub fn is_executing(&self) -> bool {
        self.units.iter().any(|unit| lock_read(unit).is_executing())
    }

    fn run_phase(&self, phase: fn(&mut dyn Unit)) {
        if self.parallel && self.groups.len() > 1 {
            thread::scope(|scope| {
                for group in self.groups.iter() {
                    let units = &self.units;
                    scope.spawn(move || {
                        for &id in group {
                            phase(&mut *lock_write(&units[id]));
                        }
                    });
                }
            });
        } else {
            for unit in self.units.iter() {
                phase(&mut *lock_write(unit));
            }
        }
    }

    pub fn step(&mut self) {
        self.run_phase(|unit| unit.clock_rise());
        self.run_phase(|unit| unit.clock_fall());
        self.cycle += 1;
    }

    /// Clocks until no unit has outstanding work. Returns the cycle count.
    pub fn execute(&mut self) -> Result<Cycle, anyhow::Error> {
        info!(
            "executing {} units in {} groups{}",
            self.units.len(),
            self.groups.len(),
            if self.parallel { " in parallel" } else { "" }
        );
        while self.is_executing() {
            if self.cycle >= self.timeout {
                bail!("simulation did not drain within {} cycles", self.timeout);
            }
            self.step();
        }
        info!("simulation drained after {} cycles", self.cycle);
        Ok(self.cycle)
    }
}
