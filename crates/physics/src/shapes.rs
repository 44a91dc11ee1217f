//! Collision shape construction.
//!
//! [`build_shape`] is also the "shape only" path used when assembling
//! compound shapes: it never creates a body.

use crate::convert::{isometry, point_to_na, unit_axis};
use crate::descriptor::{ChildShape, ShapeKind, ShapeSpec};
use crate::error::{PhysicsError, PhysicsResult};
use glam::Vec3;
use rapier3d::prelude::*;

fn invalid(kind: ShapeKind, reason: &'static str) -> PhysicsError {
    PhysicsError::InvalidShape { kind, reason }
}

/// Margin to apply, if any. Rapier has no collision margin, so a margin is
/// expressed by shrinking the core shape and rounding it by the margin.
fn margin_of(margin: Option<f32>) -> Option<f32> {
    margin.filter(|m| *m > 0.0)
}

/// Scale a flat `xyz` buffer per-axis into points.
fn scaled_points(vertices: &[f32], size: Vec3) -> Vec<Point<Real>> {
    vertices
        .chunks_exact(3)
        .map(|v| point_to_na(Vec3::new(v[0], v[1], v[2]) * size))
        .collect()
}

fn hull(points: &[Point<Real>], margin: Option<f32>, kind: ShapeKind) -> PhysicsResult<SharedShape> {
    let shape = match margin_of(margin) {
        Some(m) => SharedShape::round_convex_hull(points, m),
        None => SharedShape::convex_hull(points),
    };
    shape.ok_or(invalid(kind, "points do not span a volume"))
}

/// Build the collision shape for `spec`. `mass` selects between the static
/// (exact triangle mesh) and dynamic (convex hull) mesh representations.
pub fn build_shape(
    spec: &ShapeSpec,
    size: Vec3,
    mass: f32,
    margin: Option<f32>,
) -> PhysicsResult<SharedShape> {
    let kind = spec.kind();
    let shape = match spec {
        ShapeSpec::Plane { normal } => {
            if mass != 0.0 {
                return Err(invalid(kind, "planes must be static"));
            }
            SharedShape::halfspace(unit_axis(*normal))
        }
        ShapeSpec::Box => {
            let half = size * 0.5;
            match margin_of(margin) {
                Some(m) if half.min_element() > m => {
                    SharedShape::round_cuboid(half.x - m, half.y - m, half.z - m, m)
                }
                _ => SharedShape::cuboid(half.x, half.y, half.z),
            }
        }
        ShapeSpec::Sphere => SharedShape::ball(size.x),
        ShapeSpec::Cylinder => {
            let (half_height, radius) = (size.y * 0.5, size.x);
            match margin_of(margin) {
                Some(m) if half_height > m && radius > m => {
                    SharedShape::round_cylinder(half_height - m, radius - m, m)
                }
                _ => SharedShape::cylinder(half_height, radius),
            }
        }
        ShapeSpec::Cone => {
            let (half_height, radius) = (size.y * 0.5, size.x);
            match margin_of(margin) {
                Some(m) if half_height > m && radius > m => {
                    SharedShape::round_cone(half_height - m, radius - m, m)
                }
                _ => SharedShape::cone(half_height, radius),
            }
        }
        ShapeSpec::Capsule => SharedShape::capsule_y(size.y * 0.5, size.x),
        ShapeSpec::Compound(children) => {
            let mut parts = Vec::with_capacity(children.len());
            collect_children(children, &Isometry::identity(), &mut parts)?;
            if parts.is_empty() {
                return Err(invalid(kind, "compound has no children"));
            }
            SharedShape::compound(parts)
        }
        ShapeSpec::TriangleMesh { vertices } => {
            if vertices.is_empty() || vertices.len() % 9 != 0 {
                return Err(invalid(kind, "vertex buffer must hold whole triangles"));
            }
            let points = scaled_points(vertices, size);
            if mass == 0.0 {
                let indices = (0..points.len() as u32 / 3)
                    .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
                    .collect();
                SharedShape::trimesh(points, indices)
            } else {
                hull(&points, margin, kind)?
            }
        }
        ShapeSpec::ConvexHull { vertices } => {
            if vertices.len() < 12 || vertices.len() % 3 != 0 {
                return Err(invalid(kind, "hull needs at least four xyz points"));
            }
            hull(&scaled_points(vertices, size), margin, kind)?
        }
    };
    Ok(shape)
}

/// Flatten a (possibly nested) child list into compound parts, composing
/// each child's local transform with its parent's.
fn collect_children(
    children: &[ChildShape],
    parent: &Isometry<Real>,
    out: &mut Vec<(Isometry<Real>, SharedShape)>,
) -> PhysicsResult<()> {
    for child in children {
        let local = parent * isometry(child.position, child.rotation);
        match &child.shape {
            ShapeSpec::Compound(nested) => collect_children(nested, &local, out)?,
            ShapeSpec::Plane { .. } | ShapeSpec::TriangleMesh { .. } => {
                return Err(invalid(
                    ShapeKind::Compound,
                    "compound children must be bounded convex shapes",
                ));
            }
            shape => out.push((local, build_shape(shape, child.size, 0.0, child.margin)?)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use rapier3d::parry::shape::ShapeType;

    fn unit_cube_hull() -> Vec<f32> {
        let mut v = Vec::new();
        for x in [-0.5, 0.5] {
            for y in [-0.5, 0.5] {
                for z in [-0.5, 0.5] {
                    v.extend_from_slice(&[x, y, z]);
                }
            }
        }
        v
    }

    #[test]
    fn primitive_dimensions_follow_size() {
        let cube = build_shape(&ShapeSpec::Box, Vec3::new(2.0, 4.0, 6.0), 1.0, None).unwrap();
        let half = cube.as_cuboid().unwrap().half_extents;
        assert_eq!((half.x, half.y, half.z), (1.0, 2.0, 3.0));

        let ball = build_shape(&ShapeSpec::Sphere, Vec3::splat(0.5), 1.0, None).unwrap();
        assert_eq!(ball.as_ball().unwrap().radius, 0.5);

        let cyl = build_shape(&ShapeSpec::Cylinder, Vec3::new(1.0, 4.0, 1.0), 1.0, None).unwrap();
        let cyl = cyl.as_cylinder().unwrap();
        assert_eq!((cyl.half_height, cyl.radius), (2.0, 1.0));
    }

    #[test]
    fn margin_rounds_box_without_growing_it() {
        let shape = build_shape(&ShapeSpec::Box, Vec3::splat(2.0), 1.0, Some(0.1)).unwrap();
        assert_eq!(shape.shape_type(), ShapeType::RoundCuboid);
        let aabb = shape.compute_local_aabb();
        assert!((aabb.maxs.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn mesh_is_exact_when_static_and_hull_when_dynamic() {
        let tri = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let spec = ShapeSpec::TriangleMesh { vertices: tri };
        let fixed = build_shape(&spec, Vec3::ONE, 0.0, None).unwrap();
        assert_eq!(fixed.shape_type(), ShapeType::TriMesh);

        let partial = ShapeSpec::TriangleMesh { vertices: vec![0.0; 8] };
        assert!(matches!(
            build_shape(&partial, Vec3::ONE, 0.0, None),
            Err(PhysicsError::InvalidShape { kind: ShapeKind::TriangleMesh, .. })
        ));

        let hull = ShapeSpec::ConvexHull { vertices: unit_cube_hull() };
        let shape = build_shape(&hull, Vec3::splat(2.0), 1.0, None).unwrap();
        assert_eq!(shape.shape_type(), ShapeType::ConvexPolyhedron);
        assert!((shape.compute_local_aabb().maxs.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn nested_compounds_are_flattened() {
        let inner = ChildShape::new(
            ShapeSpec::Compound(vec![
                ChildShape::new(ShapeSpec::Sphere, Vec3::splat(0.5), Vec3::X),
                ChildShape::new(ShapeSpec::Box, Vec3::ONE, -Vec3::X),
            ]),
            Vec3::ONE,
            Vec3::new(0.0, 2.0, 0.0),
        );
        let mut top = ChildShape::new(ShapeSpec::Capsule, Vec3::new(0.25, 1.0, 0.25), Vec3::ZERO);
        top.rotation = Quat::from_rotation_z(0.3);
        let spec = ShapeSpec::Compound(vec![top, inner]);

        let shape = build_shape(&spec, Vec3::ONE, 1.0, None).unwrap();
        let parts = shape.as_compound().unwrap().shapes();
        assert_eq!(parts.len(), 3);
        // The sphere inherits its parent's offset.
        let sphere_pos = parts[1].0.translation.vector;
        assert!((sphere_pos.x - 1.0).abs() < 1e-6 && (sphere_pos.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn unbounded_children_are_rejected() {
        let spec = ShapeSpec::Compound(vec![ChildShape::new(ShapeSpec::plane(), Vec3::ONE, Vec3::ZERO)]);
        assert!(build_shape(&spec, Vec3::ONE, 0.0, None).is_err());
        assert!(build_shape(&ShapeSpec::Compound(Vec::new()), Vec3::ONE, 0.0, None).is_err());
        assert!(build_shape(&ShapeSpec::plane(), Vec3::ONE, 1.0, None).is_err());
    }
}
