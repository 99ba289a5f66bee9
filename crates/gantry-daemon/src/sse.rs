//! Server-sent event streams of device events

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::Stream;
use gantry_core::{Device, ListenerId};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api;
use crate::master::Master;

/// One client's subscription to one device event.
///
/// Dropping the stream (client disconnect) removes exactly the listener it
/// registered.
pub struct EventStream {
    device: Arc<Device>,
    event: String,
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl EventStream {
    pub fn subscribe(device: Arc<Device>, event: impl Into<String>) -> Self {
        let event = event.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = device.events().subscribe(event.clone(), move |payload: &Value| {
            // Receiver gone means the stream is being dropped
            let _ = tx.send(payload.clone());
        });
        debug!(device = %device.name(), event = %event, "Event stream subscribed");
        Self { device, event, id, rx }
    }
}

impl Stream for EventStream {
    type Item = Result<Event, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
            .map(|payload| payload.map(|p| Event::default().json_data(p)))
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.device.events().unsubscribe(&self.event, self.id);
        debug!(device = %self.device.name(), event = %self.event, "Event stream closed");
    }
}

/// `GET /robots/{robot}/devices/{device}/events/{event}`
pub async fn device_events(
    State(master): State<Arc<Master>>,
    Path((robot, device, event)): Path<(String, String, String)>,
) -> Response {
    match master.lookup_robot_device(&robot, &device) {
        Ok(device) => {
            info!(robot = %robot, device = %device.name(), event = %event, "Event stream client connected");
            Sse::new(EventStream::subscribe(device, event))
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(e) => api::lookup_failed(e),
    }
}
