//! Gatherers fetch the raw provider objects a lookup needs. Picking the one
//! result out of what was gathered happens in [`crate::context`].

use async_trait::async_trait;
use std::error::Error;
pub mod aws;

#[async_trait]
pub trait Gatherer {
    type Resource;
    async fn gather(&self) -> Result<Vec<Self::Resource>, Box<dyn Error + Send + Sync>>;
}
