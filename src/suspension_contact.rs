// ==============================================================================
// suspension_contact.rs — RAPIER GROUND PROBE FOR THE WHEEL SUSPENSION
// ------------------------------------------------------------------------------
// Answers the simulation's ProbeRequests against the rapier query pipeline:
// - Ray:    cast_ray_and_get_normal from the probe origin along the axis.
// - Sphere: cast_shape of a ball with the wheel radius, then a ray from the
//           ball centre re-measures the surface and the touch point is solved
//           against that plane. The reported distance is travel + radius so
//           both shapes measure to the contact patch the same way
//           (hit_distance - radius = free suspension length).
//
// Filtering:
// - the vehicle's own chassis body is excluded
// - request.channel selects which collision groups count as ground
//
// probe_batch() culls against one AABB around all probes (expanded by the
// margin) before casting; when nothing but the vehicle's own chassis is in
// that box every wheel misses.
//
// This file does NOT apply forces. It only measures.
// ==============================================================================

use nalgebra::{Point3, Unit, Vector3};
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::*;

use crate::physics::GROUP_CHASSIS;
use crate::track_sim::collab::{ProbeShape, SurfaceMaterial};
use crate::track_sim::{GroundProbe, ProbeHit, ProbeRequest};

pub struct RapierGroundProbe<'a> {
    pub query: &'a QueryPipeline,
    pub bodies: &'a RigidBodySet,
    pub colliders: &'a ColliderSet,
    /// The chassis the wheels belong to.
    pub exclude: RigidBodyHandle,
}

impl<'a> RapierGroundProbe<'a> {
    fn filter(&self, channel: u32) -> QueryFilter<'a> {
        QueryFilter::default()
            .exclude_rigid_body(self.exclude)
            .groups(InteractionGroups::new(GROUP_CHASSIS, Group::from_bits_truncate(channel)))
    }

    fn material(&self, collider: ColliderHandle) -> SurfaceMaterial {
        self.colliders
            .get(collider)
            .map(|c| SurfaceMaterial { friction: c.friction() })
            .unwrap_or_default()
    }

    fn cast_ray(&self, request: &ProbeRequest) -> Option<ProbeHit> {
        let ray = Ray::new(request.origin, request.direction.into_inner());
        let (collider, hit) = self.query.cast_ray_and_get_normal(
            self.bodies,
            self.colliders,
            &ray,
            request.length,
            true,
            self.filter(request.channel),
        )?;
        let toi = hit.time_of_impact;
        Some(ProbeHit {
            distance: toi,
            point: ray.point_at(toi),
            normal: Unit::try_new(hit.normal, 1e-6).unwrap_or_else(Vector3::y_axis),
            material: self.material(collider),
            component: Some(component_id(collider)),
        })
    }

    fn cast_sphere(&self, request: &ProbeRequest, radius: f32) -> Option<ProbeHit> {
        let ball = Ball::new(radius);
        // the ball starts at the probe origin and may travel until its
        // surface reaches the end of the probe
        let travel = (request.length - radius).max(0.0);
        let start = Isometry::translation(request.origin.x, request.origin.y, request.origin.z);
        let dir = request.direction.into_inner();
        let filter = self.filter(request.channel);
        let options = ShapeCastOptions {
            max_time_of_impact: travel,
            target_distance: 0.0,
            stop_at_penetration: true,
            compute_impact_geometry_on_penetration: true,
        };
        let (collider, hit) =
            self.query
                .cast_shape(self.bodies, self.colliders, &start, &dir, &ball, options, filter)?;

        // the sweep's time of impact is only approximate: re-measure the
        // surface under the ball with a ray and solve the touch exactly
        let toi = hit.time_of_impact.clamp(0.0, travel);
        let center: Point3<f32> = request.origin + dir * toi;
        let ray = Ray::new(center, dir);
        let surface = self.query.cast_ray_and_get_normal(
            self.bodies,
            self.colliders,
            &ray,
            request.length - toi + radius,
            true,
            filter,
        );

        let (collider, toi, normal) = match surface {
            Some((surface_collider, s)) => {
                let n = Unit::try_new(s.normal, 1e-6).unwrap_or_else(Vector3::y_axis);
                let q = ray.point_at(s.time_of_impact);
                touch_time(request.origin, dir, q, &n, radius)
                    .map(|t| (surface_collider, t.clamp(0.0, travel), n))
                    .unwrap_or((surface_collider, toi, n))
            }
            // edge contact beside the probe line: keep the sweep result
            None => {
                let n = Unit::try_new(-hit.normal2.into_inner(), 1e-6).unwrap_or_else(Vector3::y_axis);
                (collider, toi, n)
            }
        };

        let center: Point3<f32> = request.origin + dir * toi;
        Some(ProbeHit {
            distance: toi + radius,
            point: center - normal.into_inner() * radius,
            normal,
            material: self.material(collider),
            component: Some(component_id(collider)),
        })
    }

    /// True when some collider other than the vehicle's own chassis overlaps
    /// `bounds`.
    fn ground_near(&self, bounds: &Aabb) -> bool {
        let mut found = false;
        self.query.colliders_with_aabb_intersecting_aabb(bounds, |handle| {
            let own = self
                .colliders
                .get(*handle)
                .and_then(|c| c.parent())
                .is_some_and(|parent| parent == self.exclude);
            found = !own;
            own
        });
        found
    }
}

/// Travel along `dir` at which a ball of `radius` starting at `origin`
/// touches the plane through `q` with normal `n`.
fn touch_time(
    origin: Point3<f32>,
    dir: Vector3<f32>,
    q: Point3<f32>,
    n: &Unit<Vector3<f32>>,
    radius: f32,
) -> Option<f32> {
    let closing = dir.dot(&n.into_inner());
    if closing > -1e-4 {
        return None;
    }
    Some((radius + (q - origin).dot(&n.into_inner())) / closing)
}

impl GroundProbe for RapierGroundProbe<'_> {
    fn probe(&self, request: &ProbeRequest) -> Option<ProbeHit> {
        match request.shape {
            ProbeShape::Ray => self.cast_ray(request),
            ProbeShape::Sphere { radius } if radius > 0.0 => self.cast_sphere(request, radius),
            ProbeShape::Sphere { .. } => self.cast_ray(request),
        }
    }

    fn probe_batch(&self, requests: &[ProbeRequest], margin: f32) -> Vec<Option<ProbeHit>> {
        let Some(bounds) = probe_bounds(requests, margin) else {
            return Vec::new();
        };
        if !self.ground_near(&bounds) {
            return vec![None; requests.len()];
        }
        requests.iter().map(|r| self.probe(r)).collect()
    }
}

/// Box covering every probe segment, sphere radius included.
fn probe_bounds(requests: &[ProbeRequest], margin: f32) -> Option<Aabb> {
    let mut mins = Point3::new(f32::MAX, f32::MAX, f32::MAX);
    let mut maxs = Point3::new(f32::MIN, f32::MIN, f32::MIN);
    for r in requests {
        let pad = match r.shape {
            ProbeShape::Ray => 0.0,
            ProbeShape::Sphere { radius } => radius.max(0.0),
        } + margin.max(0.0);
        let end = r.origin + r.direction.into_inner() * r.length;
        for p in [r.origin, end] {
            mins = mins.inf(&(p - Vector3::repeat(pad)));
            maxs = maxs.sup(&(p + Vector3::repeat(pad)));
        }
    }
    (!requests.is_empty()).then(|| Aabb::new(mins, maxs))
}

fn component_id(handle: ColliderHandle) -> u64 {
    let (index, generation) = handle.into_raw_parts();
    (u64::from(generation) << 32) | u64::from(index)
}
