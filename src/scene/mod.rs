mod camera;

pub use camera::Camera;

use std::sync::{mpsc, Arc};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use tracing::debug;

use crate::color::{ColoredGeometry, Rgb};
use crate::math::Aabb;
use crate::tessellation::TriangleMesh;

new_key_type! {
    /// Key of an actor in [`RenderState`].
    pub struct ActorId;
}

/// Viewport and appearance settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Background color.
    pub background: Rgb,
    /// Solid color of the static surface.
    pub static_color: Rgb,
    /// Vertical field of view in degrees.
    pub view_angle_deg: f64,
    /// Viewport width divided by height.
    pub aspect: f64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            background: Rgb::new(0.4, 0.4, 0.4),
            static_color: Rgb::new(1.0, 1.0, 1.0),
            view_angle_deg: 30.0,
            aspect: 1.0,
        }
    }
}

/// What an actor draws.
#[derive(Debug, Clone)]
pub enum ActorGeometry {
    /// Nothing yet.
    Empty,
    /// A surface drawn in one solid color.
    Surface { mesh: Arc<TriangleMesh>, color: Rgb },
    /// Tube geometry with per-vertex colors.
    Colored(Arc<ColoredGeometry>),
}

impl ActorGeometry {
    fn mesh(&self) -> Option<&TriangleMesh> {
        match self {
            Self::Empty => None,
            Self::Surface { mesh, .. } => Some(mesh.as_ref()),
            Self::Colored(colored) => Some(&colored.geometry.mesh),
        }
    }
}

/// A drawable scene element.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Display name.
    pub name: &'static str,
    /// Bound geometry.
    pub geometry: ActorGeometry,
}

impl Actor {
    /// Bounds of the bound geometry (empty when there is none).
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.geometry.mesh().map_or_else(Aabb::empty, TriangleMesh::bounds)
    }
}

/// Why a scene update was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// First frame after startup.
    Initial,
    /// The dynamic actor's geometry or colors changed.
    Geometry,
    /// The camera was re-fitted.
    Camera,
}

/// Per-actor summary carried by a [`SceneUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorSummary {
    pub name: &'static str,
    pub vertices: usize,
    pub triangles: usize,
    /// Preset index of the bound color table, if any.
    pub color_preset: Option<i64>,
}

/// An opaque frame description handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneUpdate {
    /// Monotonic render revision.
    pub revision: u64,
    pub reason: UpdateReason,
    pub camera: Camera,
    pub background: Rgb,
    pub actors: Vec<ActorSummary>,
}

/// Port through which rendered updates leave the core.
pub trait FrameSink: Send {
    /// Hands an update to the transport. Must not block on the network.
    fn publish(&self, update: &SceneUpdate);
}

/// A sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn publish(&self, _update: &SceneUpdate) {}
}

impl FrameSink for mpsc::Sender<SceneUpdate> {
    fn publish(&self, update: &SceneUpdate) {
        // A closed channel means the transport has gone away.
        let _ = self.send(update.clone());
    }
}

/// Camera and actors. The static actor is bound once in [`RenderState::init`];
/// only the dynamic actor's binding changes afterwards.
#[derive(Debug, Clone)]
pub struct RenderState {
    camera: Camera,
    actors: SlotMap<ActorId, Actor>,
    static_actor: ActorId,
    dynamic_actor: ActorId,
    background: Rgb,
    revision: u64,
}

impl RenderState {
    /// Builds the static actor, an empty dynamic actor, and fits the camera.
    #[must_use]
    pub fn init(static_mesh: Arc<TriangleMesh>, settings: &ViewSettings) -> Self {
        let mut actors = SlotMap::with_key();
        let static_actor = actors.insert(Actor {
            name: "surface",
            geometry: ActorGeometry::Surface {
                mesh: static_mesh,
                color: settings.static_color,
            },
        });
        let dynamic_actor = actors.insert(Actor {
            name: "streamlines",
            geometry: ActorGeometry::Empty,
        });

        let mut state = Self {
            camera: Camera::new(settings.view_angle_deg, settings.aspect),
            actors,
            static_actor,
            dynamic_actor,
            background: settings.background,
            revision: 0,
        };
        let bounds = state.scene_bounds();
        state.camera.fit(&bounds);
        state
    }

    /// Replaces the dynamic actor's geometry and color binding and requests a redraw.
    pub fn update(&mut self, colored: Arc<ColoredGeometry>) -> SceneUpdate {
        if let Some(actor) = self.actors.get_mut(self.dynamic_actor) {
            actor.geometry = ActorGeometry::Colored(colored);
        }
        self.revision += 1;
        debug!(revision = self.revision, "dynamic actor updated");
        self.frame(UpdateReason::Geometry)
    }

    /// Re-fits the camera to the current scene bounds and requests a redraw.
    pub fn reset_camera(&mut self) -> SceneUpdate {
        let bounds = self.scene_bounds();
        self.camera.fit(&bounds);
        self.revision += 1;
        debug!(revision = self.revision, "camera reset");
        self.frame(UpdateReason::Camera)
    }

    /// Union of all actor bounds.
    #[must_use]
    pub fn scene_bounds(&self) -> Aabb {
        self.actors
            .values()
            .fold(Aabb::empty(), |acc, actor| acc.union(&actor.bounds()))
    }

    /// Describes the current state.
    #[must_use]
    pub fn frame(&self, reason: UpdateReason) -> SceneUpdate {
        let actors = [self.static_actor, self.dynamic_actor]
            .into_iter()
            .filter_map(|id| self.actors.get(id))
            .map(|actor| {
                let (vertices, triangles) = actor
                    .geometry
                    .mesh()
                    .map_or((0, 0), |m| (m.vertices.len(), m.triangle_count()));
                let color_preset = match &actor.geometry {
                    ActorGeometry::Colored(c) => Some(i64::from(c.table.preset())),
                    _ => None,
                };
                ActorSummary {
                    name: actor.name,
                    vertices,
                    triangles,
                    color_preset,
                }
            })
            .collect();
        SceneUpdate {
            revision: self.revision,
            reason,
            camera: self.camera,
            background: self.background,
            actors,
        }
    }

    /// Returns the camera.
    #[must_use]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Returns an actor by id.
    #[must_use]
    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(id)
    }

    /// Id of the static surface actor.
    #[must_use]
    pub fn static_actor(&self) -> ActorId {
        self.static_actor
    }

    /// Id of the streamline tube actor.
    #[must_use]
    pub fn dynamic_actor(&self) -> ActorId {
        self.dynamic_actor
    }

    /// Current render revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::{ColorPreset, ColorTable, MapColors, ScalarRange};
    use crate::integrate::{Streamline, StreamlineSet, Termination};
    use crate::math::Point3;
    use crate::tessellation::{TessellateTubes, TubeParams};

    fn static_mesh() -> Arc<TriangleMesh> {
        Arc::new(TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            indices: vec![[0, 1, 2]],
            ..TriangleMesh::default()
        })
    }

    fn colored_tube(z_end: f64) -> Arc<ColoredGeometry> {
        let set = StreamlineSet {
            array_name: "k".to_owned(),
            lines: vec![Streamline {
                seed: Point3::origin(),
                points: vec![Point3::new(0.5, 0.5, 0.0), Point3::new(0.5, 0.5, z_end)],
                scalars: vec![0.0, 1.0],
                termination: Termination::MaxPropagation,
            }],
        };
        let tubes = Arc::new(TessellateTubes::new(TubeParams::default()).execute(&set).unwrap());
        Arc::new(
            MapColors::new(&ColorTable::build(ColorPreset::Ordinal), "k", ScalarRange::default())
                .execute(tubes)
                .unwrap(),
        )
    }

    #[test]
    fn init_fits_static_mesh() {
        let state = RenderState::init(static_mesh(), &ViewSettings::default());
        assert_eq!(state.revision(), 0);
        assert_eq!(state.camera().focal_point, Point3::new(0.5, 0.5, 0.0));
        assert!(state.camera().sees(&Point3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn update_touches_only_the_dynamic_actor() {
        let mesh = static_mesh();
        let mut state = RenderState::init(Arc::clone(&mesh), &ViewSettings::default());
        let camera_before = *state.camera();

        let frame = state.update(colored_tube(1.0));
        assert_eq!(frame.revision, 1);
        assert_eq!(frame.reason, UpdateReason::Geometry);
        assert_eq!(frame.actors[1].color_preset, Some(1));
        assert!(frame.actors[1].triangles > 0);
        assert_eq!(*state.camera(), camera_before);

        match &state.actor(state.static_actor()).unwrap().geometry {
            ActorGeometry::Surface { mesh: bound, .. } => assert!(Arc::ptr_eq(bound, &mesh)),
            other => panic!("static actor rebound to {other:?}"),
        }
    }

    #[test]
    fn reset_camera_frames_the_tubes() {
        let mut state = RenderState::init(static_mesh(), &ViewSettings::default());
        state.update(colored_tube(5.0));
        let far = Point3::new(0.5, 0.5, 5.0);
        assert!(!state.camera().sees(&far));

        let frame = state.reset_camera();
        assert_eq!(frame.reason, UpdateReason::Camera);
        assert_eq!(frame.revision, 2);
        assert!(state.camera().sees(&far));
        assert!(state.camera().sees(&Point3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn channel_sink_forwards_updates() {
        let (tx, rx) = mpsc::channel();
        let state = RenderState::init(static_mesh(), &ViewSettings::default());
        tx.publish(&state.frame(UpdateReason::Initial));
        assert_eq!(rx.recv().unwrap().reason, UpdateReason::Initial);
    }
}
