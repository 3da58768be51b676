//! Scene state for the ember renderer.
//!
//! - Generational entity ids and their allocator
//! - Typed component columns (transform, point light, color, particle emitter)
//! - Asset table with generational handles and explicit eviction
//! - Camera and keyboard movement controller

pub mod assets;
pub mod camera;
pub mod components;
pub mod controller;
pub mod entity;
mod error;
pub mod transform;

pub use assets::{AssetHandle, AssetTable};
pub use camera::Camera;
pub use components::{Color, Component, ComponentKind, ComponentStore, ParticleEmitter, PointLight};
pub use controller::{KeyMappings, MovementController};
pub use entity::{Entity, EntityAllocator};
pub use error::{SceneError, SceneResult};
pub use transform::Transform;
