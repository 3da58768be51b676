//! Fixed set of component kinds in typed columns.
//!
//! Every kind has its own `Vec<Option<C>>` indexed by [`Entity::index`].
//! The [`Component`] trait maps a type to its column at compile time, so
//! lookups are a bounds check and a generation check, never a type search.

use glam::Vec3;
use tracing::debug;

use ember_core::ParticleConfig;

use crate::entity::{Entity, EntityAllocator};
use crate::error::{SceneError, SceneResult};
use crate::transform::Transform;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    PointLight,
    Color,
    ParticleEmitter,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Transform,
        ComponentKind::PointLight,
        ComponentKind::Color,
        ComponentKind::ParticleEmitter,
    ];
}

/// A point light. Its position comes from the entity's [`Transform`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub intensity: f32,
    pub color: Vec3,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            color: Vec3::ONE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color(pub Vec3);

/// Emitter parameters. The emitter position is the entity's translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleEmitter {
    pub max_particles: u32,
    pub emission_rate: f32,
    pub lifetime: f32,
    pub size: f32,
    pub color: Vec3,
    pub active: bool,
}

impl Default for ParticleEmitter {
    fn default() -> Self {
        Self::from(&ParticleConfig::default())
    }
}

impl From<&ParticleConfig> for ParticleEmitter {
    fn from(config: &ParticleConfig) -> Self {
        Self {
            max_particles: config.max_particles,
            emission_rate: config.emission_rate,
            lifetime: config.lifetime,
            size: config.size,
            color: Vec3::from_array(config.color),
            active: true,
        }
    }
}

/// A type stored in one of the [`ComponentStore`] columns.
pub trait Component: Sized + 'static {
    const KIND: ComponentKind;

    fn column(store: &ComponentStore) -> &[Option<Self>];

    fn column_mut(store: &mut ComponentStore) -> &mut Vec<Option<Self>>;
}

macro_rules! impl_component {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Component for $ty {
            const KIND: ComponentKind = ComponentKind::$kind;

            fn column(store: &ComponentStore) -> &[Option<Self>] {
                &store.$field
            }

            fn column_mut(store: &mut ComponentStore) -> &mut Vec<Option<Self>> {
                &mut store.$field
            }
        }
    };
}

impl_component!(Transform, Transform, transforms);
impl_component!(PointLight, PointLight, point_lights);
impl_component!(Color, Color, colors);
impl_component!(ParticleEmitter, ParticleEmitter, emitters);

/// Entities and their components.
#[derive(Debug, Default)]
pub struct ComponentStore {
    entities: EntityAllocator,
    transforms: Vec<Option<Transform>>,
    point_lights: Vec<Option<PointLight>>,
    colors: Vec<Option<Color>>,
    emitters: Vec<Option<ParticleEmitter>>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.allocate();
        let len = self.entities.slot_count();
        self.transforms.resize(len, None);
        self.point_lights.resize(len, None);
        self.colors.resize(len, None);
        self.emitters.resize(len, None);
        entity
    }

    /// Frees `entity` and drops all of its components. Returns `false` for
    /// stale ids.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.entities.free(entity) {
            return false;
        }
        let index = entity.index();
        self.transforms[index] = None;
        self.point_lights[index] = None;
        self.colors[index] = None;
        self.emitters[index] = None;
        debug!("Despawned entity {}", entity);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entities(&self) -> &EntityAllocator {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Attaches `component`, returning the one it replaced.
    ///
    /// # Errors
    ///
    /// [`SceneError::DeadEntity`] for freed or stale ids.
    pub fn insert<C: Component>(&mut self, entity: Entity, component: C) -> SceneResult<Option<C>> {
        if !self.entities.is_alive(entity) {
            return Err(SceneError::DeadEntity(entity));
        }
        Ok(C::column_mut(self)[entity.index()].replace(component))
    }

    /// Builder-style [`insert`](Self::insert) for freshly spawned entities.
    pub fn with<C: Component>(&mut self, entity: Entity, component: C) -> SceneResult<&mut Self> {
        self.insert(entity, component)?;
        Ok(self)
    }

    pub fn remove<C: Component>(&mut self, entity: Entity) -> Option<C> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        C::column_mut(self)[entity.index()].take()
    }

    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        C::column(self).get(entity.index())?.as_ref()
    }

    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        C::column_mut(self).get_mut(entity.index())?.as_mut()
    }

    pub fn has<C: Component>(&self, entity: Entity) -> bool {
        self.get::<C>(entity).is_some()
    }

    /// Every live entity with a `C`, in slot order.
    pub fn iter<C: Component>(&self) -> impl Iterator<Item = (Entity, &C)> + '_ {
        C::column(self)
            .iter()
            .enumerate()
            .filter_map(move |(index, component)| {
                Some((self.entities.entity_at(index)?, component.as_ref()?))
            })
    }

    /// Lights joined with their transforms, transforms mutable.
    pub fn lights_mut(&mut self) -> impl Iterator<Item = (Entity, &PointLight, &mut Transform)> + '_ {
        let entities = &self.entities;
        self.point_lights
            .iter()
            .zip(self.transforms.iter_mut())
            .enumerate()
            .filter_map(move |(index, (light, transform))| {
                Some((entities.entity_at(index)?, light.as_ref()?, transform.as_mut()?))
            })
    }

    /// How many live entities carry a component of `kind`.
    pub fn count(&self, kind: ComponentKind) -> usize {
        match kind {
            ComponentKind::Transform => self.iter::<Transform>().count(),
            ComponentKind::PointLight => self.iter::<PointLight>().count(),
            ComponentKind::Color => self.iter::<Color>().count(),
            ComponentKind::ParticleEmitter => self.iter::<ParticleEmitter>().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut store = ComponentStore::new();
        let e = store.spawn();

        assert!(store.insert(e, Color(Vec3::X)).unwrap().is_none());
        assert_eq!(store.get::<Color>(e), Some(&Color(Vec3::X)));
        assert!(!store.has::<Transform>(e));

        let old = store.insert(e, Color(Vec3::Y)).unwrap();
        assert_eq!(old, Some(Color(Vec3::X)));

        assert_eq!(store.remove::<Color>(e), Some(Color(Vec3::Y)));
        assert!(!store.has::<Color>(e));
    }

    #[test]
    fn test_despawn_drops_components_and_rejects_stale_ids() {
        let mut store = ComponentStore::new();
        let old = store.spawn();
        store.insert(old, Transform::new()).unwrap();
        store.insert(old, PointLight::default()).unwrap();
        assert!(store.despawn(old));

        let new = store.spawn();
        assert_eq!(new.index(), old.index());
        assert!(!store.has::<Transform>(new));
        assert!(store.get::<Transform>(old).is_none());
        assert!(matches!(
            store.insert(old, Color::default()),
            Err(SceneError::DeadEntity(e)) if e == old
        ));
        assert!(!store.despawn(old));
    }

    #[test]
    fn test_get_mut() {
        let mut store = ComponentStore::new();
        let e = store.spawn();
        store.insert(e, Transform::new()).unwrap();
        store.get_mut::<Transform>(e).unwrap().translation = Vec3::ONE;
        assert_eq!(store.get::<Transform>(e).unwrap().translation, Vec3::ONE);
    }

    #[test]
    fn test_iter_in_slot_order() {
        let mut store = ComponentStore::new();
        let a = store.spawn();
        let b = store.spawn();
        let c = store.spawn();
        store.insert(a, Color(Vec3::X)).unwrap();
        store.insert(c, Color(Vec3::Z)).unwrap();
        store.insert(b, Transform::new()).unwrap();

        let colors: Vec<_> = store.iter::<Color>().map(|(e, _)| e).collect();
        assert_eq!(colors, vec![a, c]);
        assert_eq!(store.count(ComponentKind::Color), 2);
        assert_eq!(store.count(ComponentKind::Transform), 1);
        assert_eq!(store.count(ComponentKind::ParticleEmitter), 0);
    }

    #[test]
    fn test_lights_mut_needs_both_components() {
        let mut store = ComponentStore::new();
        let lit = store.spawn();
        store
            .with(lit, Transform::new())
            .unwrap()
            .with(lit, PointLight::default())
            .unwrap();
        let unplaced = store.spawn();
        store.insert(unplaced, PointLight::default()).unwrap();

        for (_, _, transform) in store.lights_mut() {
            transform.translation.x += 1.0;
        }

        let moved: Vec<_> = store.iter::<Transform>().map(|(e, t)| (e, t.translation.x)).collect();
        assert_eq!(moved, vec![(lit, 1.0)]);
    }

    #[test]
    fn test_emitter_from_config() {
        let config = ParticleConfig::default();
        let emitter = ParticleEmitter::from(&config);
        assert_eq!(emitter.max_particles, config.max_particles);
        assert_eq!(emitter.color, Vec3::from_array(config.color));
        assert!(emitter.active);
    }

    #[test]
    fn test_kind_constants() {
        assert_eq!(<Transform as Component>::KIND, ComponentKind::Transform);
        assert_eq!(<ParticleEmitter as Component>::KIND, ComponentKind::ParticleEmitter);
        assert_eq!(ComponentKind::ALL.len(), 4);
    }
}
