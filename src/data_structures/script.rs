//! User behaviour attached to game objects.
//!
//! A [`Behaviour`] implements any subset of the per-frame hooks. The world
//! calls them phase by phase through [`Script::run`]; `on_start` runs once,
//! right before the first other hook of that script.

use crate::{
    data_structures::{
        entity::{EntityAllocator, EntityId},
        game_object::GameObject,
        scene::Scene,
    },
    error::EngineError,
    flow::FrameTime,
    resources::buffers::GpuResources,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Start,
    FixedUpdate,
    Update,
    LateUpdate,
    PreRender,
    PostRender,
    DrawOverlay,
}

/// What a hook may touch while it runs.
///
/// Objects are never removed from the scene while scripts run. A script asks
/// for removal through [`ScriptContext::destroy`]; the world destroys the
/// requested objects, their subtrees and GPU resources once the phase has
/// finished.
pub struct ScriptContext<'a> {
    /// The game object the script is attached to.
    pub object: EntityId,
    pub gpu: &'a mut GpuResources,
    pub ids: &'a mut EntityAllocator,
    pub time: FrameTime,
    scene: &'a mut Scene,
    destroy_requests: &'a mut Vec<EntityId>,
}

impl<'a> ScriptContext<'a> {
    pub(crate) fn new(
        object: EntityId,
        scene: &'a mut Scene,
        gpu: &'a mut GpuResources,
        ids: &'a mut EntityAllocator,
        time: FrameTime,
        destroy_requests: &'a mut Vec<EntityId>,
    ) -> Self {
        Self {
            object,
            gpu,
            ids,
            time,
            scene,
            destroy_requests,
        }
    }

    pub fn scene(&self) -> &Scene {
        self.scene
    }

    pub fn game_object_mut(&mut self, id: EntityId) -> Option<&mut GameObject> {
        self.scene.game_object_mut(id)
    }

    pub fn add_game_object(&mut self, object: GameObject) -> Result<EntityId, EngineError> {
        self.scene.add_game_object(object)
    }

    pub fn set_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), EngineError> {
        self.scene.set_parent(child, parent)
    }

    /// Queues `id` for destruction at the end of the current phase.
    pub fn destroy(&mut self, id: EntityId) {
        if !self.destroy_requests.contains(&id) {
            self.destroy_requests.push(id);
        }
    }
}

pub trait Behaviour {
    fn on_start(&mut self, _ctx: &mut ScriptContext) {}
    fn on_fixed_update(&mut self, _ctx: &mut ScriptContext) {}
    fn on_update(&mut self, _ctx: &mut ScriptContext) {}
    fn on_late_update(&mut self, _ctx: &mut ScriptContext) {}
    fn on_pre_render(&mut self, _ctx: &mut ScriptContext) {}
    fn on_post_render(&mut self, _ctx: &mut ScriptContext) {}
    fn on_draw_overlay(&mut self, _ctx: &mut ScriptContext) {}
}

pub struct Script {
    behaviour: Option<Box<dyn Behaviour>>,
    started: bool,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("attached", &self.behaviour.is_some())
            .field("started", &self.started)
            .finish()
    }
}

impl Script {
    pub fn new(behaviour: impl Behaviour + 'static) -> Self {
        Self {
            behaviour: Some(Box::new(behaviour)),
            started: false,
        }
    }

    /// A script slot with nothing attached.
    pub fn empty() -> Self {
        Self {
            behaviour: None,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Detaches the behaviour so it can run while the scene is borrowed
    /// mutably. Must be handed back with [`Script::restore`].
    pub(crate) fn take(&mut self) -> Option<(Box<dyn Behaviour>, bool)> {
        let behaviour = self.behaviour.take()?;
        Some((behaviour, self.started))
    }

    pub(crate) fn restore(&mut self, behaviour: Box<dyn Behaviour>, started: bool) {
        self.behaviour = Some(behaviour);
        self.started = started;
    }

    /// Runs `phase` on a detached behaviour. Returns the new started flag.
    pub(crate) fn run(
        behaviour: &mut dyn Behaviour,
        started: bool,
        phase: LifecyclePhase,
        ctx: &mut ScriptContext,
    ) -> bool {
        if phase == LifecyclePhase::Start {
            if !started {
                behaviour.on_start(ctx);
            }
            return true;
        }
        if !started {
            behaviour.on_start(ctx);
        }
        match phase {
            LifecyclePhase::Start => (),
            LifecyclePhase::FixedUpdate => behaviour.on_fixed_update(ctx),
            LifecyclePhase::Update => behaviour.on_update(ctx),
            LifecyclePhase::LateUpdate => behaviour.on_late_update(ctx),
            LifecyclePhase::PreRender => behaviour.on_pre_render(ctx),
            LifecyclePhase::PostRender => behaviour.on_post_render(ctx),
            LifecyclePhase::DrawOverlay => behaviour.on_draw_overlay(ctx),
        }
        true
    }
}
