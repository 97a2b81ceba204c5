//! Scripted device endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::lock;
use crate::domain::ports::{DeviceRequest, DeviceResponse, DeviceTransport, DeviceTransportError};

/// Device transport answering from a queue and recording every request.
#[derive(Default)]
pub struct ScriptedDeviceTransport {
    replies: Mutex<VecDeque<Result<DeviceResponse, DeviceTransportError>>>,
    requests: Mutex<Vec<DeviceRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedDeviceTransport {
    pub fn new(replies: impl IntoIterator<Item = Result<DeviceResponse, DeviceTransportError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Delay every reply by `delay` of tokio time.
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<DeviceRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl DeviceTransport for ScriptedDeviceTransport {
    async fn send(&self, request: &DeviceRequest) -> Result<DeviceResponse, DeviceTransportError> {
        lock(&self.requests).push(request.clone());
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(DeviceTransportError::request("no scripted reply left")))
    }
}
