use crate::error::Error;
use crate::AppState;
use ::sse::{ChannelSink, ClientId};
use async_stream::stream;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use log::*;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamParams {
    /// Id to register the stream under; a random one is generated when absent.
    client_id: Option<String>,
}

/// SSE handler that establishes a long-lived connection for real-time updates.
///
/// The connection runs in its own task. The response is sent once that task
/// has written the preamble, and dropping the response body (client went
/// away, server closed the socket) cancels the task.
pub(crate) async fn sse_handler(
    State(app_state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Response {
    let client_id = params
        .client_id
        .filter(|id| !id.trim().is_empty())
        .map(ClientId::from)
        .unwrap_or_else(ClientId::generate);
    debug!("Establishing SSE connection for client {client_id}");

    let (sink, mut events) = ChannelSink::new();
    let cancel = CancellationToken::new();
    let manager = app_state.sse_manager.clone();
    let token = cancel.clone();
    tokio::spawn(async move {
        let reason = manager
            .serve_connection(client_id.clone(), Arc::new(sink), Vec::new(), token)
            .await;
        debug!("SSE connection for client {client_id} closed: {reason:?}");
    });

    let Some(headers) = events.preamble().await else {
        return Error::StreamUnavailable.into_response();
    };

    let disconnect_guard = cancel.drop_guard();
    let body = stream! {
        let _disconnect_guard = disconnect_guard;
        while let Some(frame) = events.recv().await {
            yield Ok::<_, Infallible>(frame);
        }
    };

    let mut response = Response::new(Body::from_stream(body));
    for (name, value) in headers {
        response.headers_mut().insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}
