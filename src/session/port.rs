use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

use crate::ari::AriClient;

pub type ControlFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Control-plane operations the session controller depends on. The ARI
/// client is the production implementation; tests substitute a recorder.
pub trait ControlPort: Send + Sync {
    fn create_mixing_bridge(&self) -> ControlFuture<Result<String>>;
    fn add_channel_to_bridge(&self, bridge_id: String, channel_id: String)
        -> ControlFuture<Result<()>>;
    fn create_external_media(&self, external_host: String) -> ControlFuture<Result<String>>;
    fn channel_exists(&self, channel_id: String) -> ControlFuture<Result<bool>>;
    fn get_channel_var(
        &self,
        channel_id: String,
        var: String,
    ) -> ControlFuture<Result<Option<String>>>;
    fn bridge_has_channel(
        &self,
        bridge_id: String,
        channel_id: String,
    ) -> ControlFuture<Result<bool>>;
    fn delete_bridge(&self, bridge_id: String) -> ControlFuture<Result<()>>;
}

impl ControlPort for AriClient {
    fn create_mixing_bridge(&self) -> ControlFuture<Result<String>> {
        let client = self.clone();
        Box::pin(async move { client.create_mixing_bridge().await })
    }

    fn add_channel_to_bridge(
        &self,
        bridge_id: String,
        channel_id: String,
    ) -> ControlFuture<Result<()>> {
        let client = self.clone();
        Box::pin(async move { client.add_channel_to_bridge(&bridge_id, &channel_id).await })
    }

    fn create_external_media(&self, external_host: String) -> ControlFuture<Result<String>> {
        let client = self.clone();
        Box::pin(async move { client.create_external_media(&external_host).await })
    }

    fn channel_exists(&self, channel_id: String) -> ControlFuture<Result<bool>> {
        let client = self.clone();
        Box::pin(async move { client.channel_exists(&channel_id).await })
    }

    fn get_channel_var(
        &self,
        channel_id: String,
        var: String,
    ) -> ControlFuture<Result<Option<String>>> {
        let client = self.clone();
        Box::pin(async move { client.get_channel_var(&channel_id, &var).await })
    }

    fn bridge_has_channel(
        &self,
        bridge_id: String,
        channel_id: String,
    ) -> ControlFuture<Result<bool>> {
        let client = self.clone();
        Box::pin(async move { client.bridge_has_channel(&bridge_id, &channel_id).await })
    }

    fn delete_bridge(&self, bridge_id: String) -> ControlFuture<Result<()>> {
        let client = self.clone();
        Box::pin(async move { client.delete_bridge(&bridge_id).await })
    }
}
