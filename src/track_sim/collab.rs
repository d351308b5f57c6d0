// ==============================================================================
// collab.rs — BOUNDARY TO THE COLLISION + RIGID-BODY HOST
// ------------------------------------------------------------------------------
// GroundProbe: ray / sphere-sweep queries against the scene. probe_batch() lets
//              a host answer all wheels in one query; per-wheel semantics are
//              identical to probe().
// ForceSink:   fire-and-forget per-step forces, chassis torques or suspension
//              constraints.
//              ForceBuffer records them so the host applies them only after the
//              step completes (and drops them if the vehicle is gone).
// ==============================================================================

use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProbeShape {
    #[default]
    Ray,
    Sphere { radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeRequest {
    pub wheel: usize,
    pub origin: Point3<f32>,
    pub direction: Unit<Vector3<f32>>,
    pub length: f32,
    pub shape: ProbeShape,
    /// Collision channel / group bits the probe should hit.
    pub channel: u32,
    /// Per-wheel friction response override (replaces the surface value).
    pub friction_override: Option<f32>,
}

/// Surface response of the contacted material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMaterial {
    pub friction: f32,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self { friction: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeHit {
    /// Distance travelled along the probe direction.
    pub distance: f32,
    pub point: Point3<f32>,
    pub normal: Unit<Vector3<f32>>,
    pub material: SurfaceMaterial,
    /// Opaque id of the contacted component, if the host has one.
    pub component: Option<u64>,
}

pub trait GroundProbe {
    fn probe(&self, request: &ProbeRequest) -> Option<ProbeHit>;

    /// `margin` expands the broad-phase bounds for pre-filtering.
    fn probe_batch(&self, requests: &[ProbeRequest], _margin: f32) -> Vec<Option<ProbeHit>> {
        requests.iter().map(|r| self.probe(r)).collect()
    }
}

impl<P: GroundProbe + ?Sized> GroundProbe for &P {
    fn probe(&self, request: &ProbeRequest) -> Option<ProbeHit> {
        (**self).probe(request)
    }

    fn probe_batch(&self, requests: &[ProbeRequest], margin: f32) -> Vec<Option<ProbeHit>> {
        (**self).probe_batch(requests, margin)
    }
}

/// Parameters for hosts that model the suspension as a constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionConstraint {
    pub wheel: usize,
    pub anchor: Point3<f32>,
    pub axis: Unit<Vector3<f32>>,
    pub target_length: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub enabled: bool,
}

pub trait ForceSink {
    fn add_force_at_point(&mut self, wheel: usize, force: Vector3<f32>, point: Point3<f32>);
    fn set_suspension_constraint(&mut self, constraint: SuspensionConstraint);
    /// Force on the chassis itself (aero, stabilisers), not tied to a wheel.
    fn add_chassis_force(&mut self, force: Vector3<f32>, point: Point3<f32>);
    fn add_torque(&mut self, torque: Vector3<f32>);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForceCommand {
    AtPoint { wheel: usize, force: Vector3<f32>, point: Point3<f32> },
    Constraint(SuspensionConstraint),
    ChassisForce { force: Vector3<f32>, point: Point3<f32> },
    Torque(Vector3<f32>),
}

/// Deferred force list; flushed by the host after the step.
#[derive(Debug, Clone, Default)]
pub struct ForceBuffer {
    pub commands: Vec<ForceCommand>,
}

impl ForceBuffer {
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, ForceCommand> {
        self.commands.drain(..)
    }

    /// Sum of all point forces (handy for tests and diagnostics).
    pub fn net_force(&self) -> Vector3<f32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                ForceCommand::AtPoint { force, .. } | ForceCommand::ChassisForce { force, .. } => Some(*force),
                ForceCommand::Constraint(_) | ForceCommand::Torque(_) => None,
            })
            .sum()
    }

    pub fn net_torque(&self) -> Vector3<f32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                ForceCommand::Torque(t) => Some(*t),
                _ => None,
            })
            .sum()
    }
}

impl ForceSink for ForceBuffer {
    fn add_force_at_point(&mut self, wheel: usize, force: Vector3<f32>, point: Point3<f32>) {
        self.commands.push(ForceCommand::AtPoint { wheel, force, point });
    }

    fn set_suspension_constraint(&mut self, constraint: SuspensionConstraint) {
        self.commands.push(ForceCommand::Constraint(constraint));
    }

    fn add_chassis_force(&mut self, force: Vector3<f32>, point: Point3<f32>) {
        self.commands.push(ForceCommand::ChassisForce { force, point });
    }

    fn add_torque(&mut self, torque: Vector3<f32>) {
        self.commands.push(ForceCommand::Torque(torque));
    }
}
