use std::sync::Arc;

use tracing::{error, info};

use crate::track_sim::handoff::{self, HandoffReader, HandoffWriter};
use crate::track_sim::{
    ChassisState, ConfigError, Diagnostics, ForceBuffer, ForceCommand, GroundProbe, RuntimeState,
    TickInput, TickOutput, ValidatedConfig, VehicleConfig, VehicleSnapshot, run_tick,
};

/// One simulated tracked vehicle: its configuration, the state carried
/// between steps, and the publishing side of its handoff.
///
/// The rigid body lives with the host; `step` only reads a `ChassisState`
/// and leaves the resulting forces in an internal buffer for the host to
/// apply once the step is done.
pub struct TrackedVehicle {
    id: String,
    config: Arc<ValidatedConfig>,
    runtime: RuntimeState,
    handoff: HandoffWriter,
    diagnostics: Diagnostics,
    forces: ForceBuffer,
}

impl TrackedVehicle {
    /// True when `config` describes something the pipeline can run.
    pub fn can_simulate(config: &VehicleConfig) -> bool {
        config.clone().validate().is_ok()
    }

    pub fn new(id: impl Into<String>, config: VehicleConfig) -> Result<Self, ConfigError> {
        let id = id.into();
        let name = config.name.clone();
        let validated = config.validate().inspect_err(|e| {
            error!(vehicle = %id, config = %name, error = %e, "vehicle configuration rejected");
        })?;
        Ok(Self::from_validated(id, Arc::new(validated)))
    }

    /// Several vehicles may share one validated configuration.
    pub fn from_validated(id: impl Into<String>, config: Arc<ValidatedConfig>) -> Self {
        let id = id.into();
        let runtime = RuntimeState::new(&config);
        let (handoff, _) = handoff::channel(runtime.to_output());
        info!(vehicle = %id, config = %config.name, wheels = config.wheel_count(), "vehicle created");
        Self {
            id,
            config,
            runtime,
            handoff,
            diagnostics: Diagnostics::default(),
            forces: ForceBuffer::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &Arc<ValidatedConfig> {
        &self.config
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn reset_diagnostics(&mut self) {
        self.diagnostics.reset();
    }

    /// New consumer of the published steps.
    pub fn reader(&self) -> HandoffReader {
        self.handoff.subscribe()
    }

    /// Swap in a new configuration between steps. Runtime state is rebuilt
    /// when the wheel count changes; otherwise it carries over.
    pub fn reconfigure(&mut self, config: VehicleConfig) -> Result<(), ConfigError> {
        let validated = config.validate().inspect_err(|e| {
            error!(vehicle = %self.id, error = %e, "reconfigure rejected");
        })?;

        if validated.wheel_count() != self.runtime.wheels.len() {
            let step = self.runtime.step;
            self.runtime = RuntimeState::new(&validated);
            self.runtime.step = step;
        } else {
            let cfg_tx = &validated.transmission;
            let tx = &mut self.runtime.vehicle.transmission;
            let gear = tx.current_gear.clamp(cfg_tx.lowest_reverse(), cfg_tx.top_gear());
            tx.set_gear(cfg_tx, gear, true);
            self.runtime.vehicle.layout = validated.layout.clone();
            for (state, setup) in self.runtime.wheels.iter_mut().zip(&validated.wheels) {
                state.local_position = setup.offset;
            }
        }

        info!(vehicle = %self.id, config = %validated.name, "vehicle reconfigured");
        self.config = Arc::new(validated);
        Ok(())
    }

    /// Run one step. Forces from the previous step are dropped first.
    pub fn step<P>(&mut self, input: &TickInput, chassis: &ChassisState, probe: &P) -> Arc<TickOutput>
    where
        P: GroundProbe + ?Sized,
    {
        self.forces.clear();
        run_tick(
            &self.config,
            &mut self.runtime,
            input,
            chassis,
            probe,
            &mut self.forces,
            &mut self.diagnostics,
            &mut self.handoff,
        )
    }

    pub fn forces(&self) -> &ForceBuffer {
        &self.forces
    }

    /// Hand the buffered forces of the last step to the host.
    pub fn drain_forces(&mut self) -> impl Iterator<Item = ForceCommand> + '_ {
        self.forces.drain()
    }

    pub fn export_snapshot(&self, chassis: &ChassisState) -> VehicleSnapshot {
        VehicleSnapshot::capture(&self.config, &self.runtime, chassis)
    }

    /// Overwrite runtime state from `snapshot`. Returns the chassis pose for
    /// the host to put on its body. The vehicle is untouched on error.
    pub fn import_snapshot(&mut self, snapshot: &VehicleSnapshot) -> Result<ChassisState, ConfigError> {
        let chassis = snapshot
            .restore(&self.config, &mut self.runtime, self.config.chassis_mass)
            .inspect_err(|e| error!(vehicle = %self.id, error = %e, "snapshot import rejected"))?;
        self.forces.clear();
        Ok(chassis)
    }
}

impl Drop for TrackedVehicle {
    fn drop(&mut self) {
        self.handoff.discard();
        info!(vehicle = %self.id, steps = self.diagnostics.steps, "vehicle destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_sim::{ProbeHit, ProbeRequest};
    use nalgebra::Isometry3;

    struct NoGround;

    impl GroundProbe for NoGround {
        fn probe(&self, _: &ProbeRequest) -> Option<ProbeHit> {
            None
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let mut cfg = VehicleConfig::tank();
        cfg.transmission.forward_ratios.clear();
        assert!(!TrackedVehicle::can_simulate(&cfg));
        assert_eq!(TrackedVehicle::new("t", cfg).err(), Some(ConfigError::EmptyGearTable));
        assert!(TrackedVehicle::can_simulate(&VehicleConfig::dozer()));
    }

    #[test]
    fn reconfigure_with_new_wheel_count_resets_runtime() {
        let mut v = TrackedVehicle::new("t", VehicleConfig::tank()).expect("tank");
        let chassis = ChassisState::at_rest(Isometry3::translation(0.0, 20.0, 0.0), 1.0);
        v.step(&TickInput::with_dt(0.01), &chassis, &NoGround);
        assert_eq!(v.runtime().step, 1);

        v.reconfigure(VehicleConfig::dozer()).expect("dozer");
        assert_eq!(v.runtime().wheels.len(), v.config().wheel_count());
        assert_eq!(v.runtime().step, 1);
        assert_eq!(v.config().name, VehicleConfig::dozer().name);
    }

    #[test]
    fn failed_reconfigure_keeps_old_config() {
        let mut v = TrackedVehicle::new("t", VehicleConfig::tank()).expect("tank");
        let mut bad = VehicleConfig::dozer();
        bad.wheels.clear();
        assert_eq!(v.reconfigure(bad).err(), Some(ConfigError::NoWheels));
        assert_eq!(v.config().name, VehicleConfig::tank().name);
    }

    #[test]
    fn readers_close_when_vehicle_is_dropped() {
        let v = TrackedVehicle::new("t", VehicleConfig::tank()).expect("tank");
        let reader = v.reader();
        assert!(!reader.is_closed());
        drop(v);
        assert!(reader.is_closed());
    }
}
