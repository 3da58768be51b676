use thiserror::Error;

use crate::entity::Entity;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("entity {0} is not alive")]
    DeadEntity(Entity),
}

pub type SceneResult<T> = std::result::Result<T, SceneError>;
