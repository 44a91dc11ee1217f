//! Entity descriptors: what the host asks the physics side to build.
//!
//! All angles here are radians and all rotations are unit quaternions; the
//! host converts from degrees before anything crosses the bridge.

use crate::collision::{CollisionFlags, ALL_GROUPS, DEFAULT_GROUP};
use glam::{Quat, Vec3};

/// The nine supported collision shape families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Plane,
    Box,
    Sphere,
    Cylinder,
    Cone,
    Capsule,
    Compound,
    TriangleMesh,
    ConvexHull,
}

/// Shape geometry. Primitive dimensions come from the descriptor's `size`:
/// - box: full extents
/// - sphere: `size.x` is the radius
/// - cylinder / cone / capsule: `size.x` is the radius, `size.y` the full height
///
/// Mesh and hull vertices are flat `xyz` buffers scaled per-axis by `size`.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeSpec {
    Plane { normal: Vec3 },
    Box,
    Sphere,
    Cylinder,
    Cone,
    Capsule,
    Compound(Vec<ChildShape>),
    /// Nine scalars per triangle.
    TriangleMesh { vertices: Vec<f32> },
    /// Three scalars per point.
    ConvexHull { vertices: Vec<f32> },
}

impl ShapeSpec {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Plane { .. } => ShapeKind::Plane,
            Self::Box => ShapeKind::Box,
            Self::Sphere => ShapeKind::Sphere,
            Self::Cylinder => ShapeKind::Cylinder,
            Self::Cone => ShapeKind::Cone,
            Self::Capsule => ShapeKind::Capsule,
            Self::Compound(_) => ShapeKind::Compound,
            Self::TriangleMesh { .. } => ShapeKind::TriangleMesh,
            Self::ConvexHull { .. } => ShapeKind::ConvexHull,
        }
    }

    pub fn plane() -> Self {
        Self::Plane { normal: Vec3::Y }
    }
}

/// A child of a compound shape, placed by its local transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildShape {
    pub shape: ShapeSpec,
    pub size: Vec3,
    pub position: Vec3,
    pub rotation: Quat,
    pub margin: Option<f32>,
}

impl ChildShape {
    pub fn new(shape: ShapeSpec, size: Vec3, position: Vec3) -> Self {
        Self {
            shape,
            size,
            position,
            rotation: Quat::IDENTITY,
            margin: None,
        }
    }
}

/// How the solver treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    /// Integrated by the solver; read back every step.
    Dynamic,
    /// In the world, never moves, never read back.
    Static,
    /// Driven by the host; never integrated.
    Kinematic,
}

impl MotionKind {
    pub fn classify(mass: f32, kinematic: bool) -> Self {
        if kinematic {
            Self::Kinematic
        } else if mass != 0.0 {
            Self::Dynamic
        } else {
            Self::Static
        }
    }

    /// Whether the body occupies a slot in the result buffer.
    pub fn is_read_back(self) -> bool {
        !matches!(self, Self::Static)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyDescriptor {
    pub name: Option<String>,
    pub shape: ShapeSpec,
    pub size: Vec3,
    /// Zero means static unless `kinematic` is set.
    pub mass: f32,
    pub kinematic: bool,
    pub position: Vec3,
    pub rotation: Quat,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
    pub linear_damping: Option<f32>,
    pub angular_damping: Option<f32>,
    pub rolling_friction: Option<f32>,
    pub margin: Option<f32>,
    pub flags: CollisionFlags,
    pub group: u32,
    pub mask: u32,
    pub linear_velocity: Option<Vec3>,
}

impl Default for RigidBodyDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            shape: ShapeSpec::Box,
            size: Vec3::ONE,
            mass: 0.0,
            kinematic: false,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            friction: None,
            restitution: None,
            linear_damping: None,
            angular_damping: None,
            rolling_friction: None,
            margin: None,
            flags: CollisionFlags::empty(),
            group: DEFAULT_GROUP,
            mask: ALL_GROUPS,
            linear_velocity: None,
        }
    }
}

impl RigidBodyDescriptor {
    pub fn new(shape: ShapeSpec) -> Self {
        Self {
            shape,
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_size(mut self, size: Vec3) -> Self {
        self.size = size;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotated(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn kinematic(mut self) -> Self {
        self.kinematic = true;
        self
    }

    pub fn motion(&self) -> MotionKind {
        MotionKind::classify(self.mass, self.kinematic)
    }
}

/// Per-axis limits for a 6-DOF joint, in the joint frame of body A.
/// For each axis: `lower == upper` locks it, `lower < upper` limits it,
/// `lower > upper` leaves it free.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DofLimits {
    pub linear_lower: Vec3,
    pub linear_upper: Vec3,
    pub angular_lower: Vec3,
    pub angular_upper: Vec3,
}

/// Springs on the six joint axes, ordered linear xyz then angular xyz.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpringParams {
    pub enabled: [bool; 6],
    pub stiffness: [f32; 6],
    pub damping: [f32; 6],
}

/// Angular velocity motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMotor {
    pub target_velocity: f32,
    pub max_impulse: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    PointToPoint,
    Hinge {
        axis_a: Vec3,
        axis_b: Vec3,
        /// `[lower, upper]` around the hinge axis.
        limit: Option<[f32; 2]>,
        motor: Option<JointMotor>,
    },
    /// Translation along the X axis of frame A.
    Slider { limit: Option<[f32; 2]> },
    ConeTwist {
        swing_span1: f32,
        swing_span2: f32,
        twist_span: f32,
    },
    SixDof(DofLimits),
    SixDofSpring(DofLimits, SpringParams),
}

impl JointKind {
    /// Tag written into the joint's result-buffer slot.
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::PointToPoint => 1,
            Self::Hinge { .. } => 2,
            Self::Slider { .. } => 3,
            Self::ConeTwist { .. } => 4,
            Self::SixDof(_) => 5,
            Self::SixDofSpring(..) => 6,
        }
    }

    pub fn hinge(axis: Vec3) -> Self {
        Self::Hinge {
            axis_a: axis,
            axis_b: axis,
            limit: None,
            motor: None,
        }
    }
}

/// A constraint between two already-registered bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct JointDescriptor {
    pub name: Option<String>,
    pub kind: JointKind,
    pub body_a: String,
    pub body_b: String,
    pub anchor_a: Vec3,
    pub anchor_b: Vec3,
    pub frame_rotation_a: Quat,
    pub frame_rotation_b: Quat,
    /// Let the two constrained bodies collide with each other.
    pub allow_collision: bool,
}

impl JointDescriptor {
    pub fn new(kind: JointKind, body_a: impl Into<String>, body_b: impl Into<String>) -> Self {
        Self {
            name: None,
            kind,
            body_a: body_a.into(),
            body_b: body_b.into(),
            anchor_a: Vec3::ZERO,
            anchor_b: Vec3::ZERO,
            frame_rotation_a: Quat::IDENTITY,
            frame_rotation_b: Quat::IDENTITY,
            allow_collision: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn anchors(mut self, a: Vec3, b: Vec3) -> Self {
        self.anchor_a = a;
        self.anchor_b = b;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
}

/// A static height-field surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainDescriptor {
    pub name: String,
    /// World extents; `size.y` bounds the height range.
    pub size: Vec3,
    /// Grid resolution `[columns along x, rows along z]`.
    pub samples: [usize; 2],
    /// Row-major, `samples[0] * samples[1]` values.
    pub heights: Vec<f32>,
    pub position: Vec3,
    pub rotation: Quat,
    pub up_axis: UpAxis,
    pub margin: f32,
    pub friction: f32,
    pub restitution: f32,
    pub group: u32,
    pub mask: u32,
}

impl Default for TerrainDescriptor {
    fn default() -> Self {
        Self {
            name: "terrain".to_string(),
            size: Vec3::ONE,
            samples: [64, 64],
            heights: vec![0.0; 64 * 64],
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            up_axis: UpAxis::Y,
            margin: 0.02,
            friction: 0.5,
            restitution: 0.0,
            group: DEFAULT_GROUP,
            mask: ALL_GROUPS,
        }
    }
}

impl TerrainDescriptor {
    pub fn sample_count(&self) -> usize {
        self.samples[0] * self.samples[1]
    }
}

/// Anything `add` can create.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDescriptor {
    Body(RigidBodyDescriptor),
    Joint(JointDescriptor),
    Terrain(TerrainDescriptor),
}

impl EntityDescriptor {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Body(b) => b.name.as_deref(),
            Self::Joint(j) => j.name.as_deref(),
            Self::Terrain(t) => Some(&t.name),
        }
    }
}

impl From<RigidBodyDescriptor> for EntityDescriptor {
    fn from(d: RigidBodyDescriptor) -> Self {
        Self::Body(d)
    }
}

impl From<JointDescriptor> for EntityDescriptor {
    fn from(d: JointDescriptor) -> Self {
        Self::Joint(d)
    }
}

impl From<TerrainDescriptor> for EntityDescriptor {
    fn from(d: TerrainDescriptor) -> Self {
        Self::Terrain(d)
    }
}
