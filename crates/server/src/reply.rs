//! Per-call reply state machine.
//!
//! A [`Reply`] accepts one payload or error, runs the extension chains around
//! it, and hands the encoded envelope to the transport. Further `send` calls
//! are ignored until [`Reply::next`] rearms it for another message.

use {
    courier_common::{CallContext, HookPoint, ReplyMessage, Response, RpcError},
    serde::Serialize,
    serde_json::Value,
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, reply as reply_metrics};

use crate::{events::ServerEvent, server::Courier};

pub struct Reply {
    courier: Courier,
    call: CallContext,
    response: Response,
    sent: bool,
    is_error: bool,
}

impl Reply {
    pub(crate) fn new(courier: Courier, call: CallContext) -> Self {
        #[cfg(feature = "metrics")]
        counter!(reply_metrics::STARTED_TOTAL).increment(1);

        let response = Response::new(call.reply_to.clone());
        Self {
            courier,
            call,
            response,
            sent: false,
            is_error: false,
        }
    }

    pub fn call(&self) -> &CallContext {
        &self.call
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn payload(&self) -> &Value {
        self.response.payload()
    }

    pub fn error(&self) -> Option<&RpcError> {
        self.response.error()
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Accept a payload or error and push it through the send pipeline.
    ///
    /// Only the first call has any effect. A payload offered after an error
    /// was accepted is rejected. Neither case is reported to the caller.
    pub async fn send(&mut self, message: impl Into<ReplyMessage>) {
        let message = message.into();

        if self.sent {
            #[cfg(feature = "metrics")]
            counter!(reply_metrics::DUPLICATE_SENDS_TOTAL).increment(1);
            warn!(request_id = ?self.call.request_id(), "reply already sent");
            return;
        }

        if self.is_error && !message.is_error() {
            #[cfg(feature = "metrics")]
            counter!(reply_metrics::REJECTED_SENDS_TOTAL).increment(1);
            let rejected =
                RpcError::internal("Response error must be an error value, got a payload");
            error!(
                request_id = ?self.call.request_id(),
                error = %rejected,
                "rejected payload after error"
            );
            return;
        }

        self.sent = true;

        match message {
            ReplyMessage::Error(err) => {
                self.accept_error(err);
                if let Err(e) = self
                    .courier
                    .extensions()
                    .run(HookPoint::OnError, &self.call, &mut self.response)
                    .await
                {
                    warn!(
                        request_id = ?self.call.request_id(),
                        error = %e,
                        "onError extension failed, continuing with response"
                    );
                }
                self.server_send().await;
            },
            ReplyMessage::Payload(payload) => {
                self.response.set_payload(payload);
                self.server_send().await;
            },
        }
    }

    /// Serialize `value` and send it. A value that cannot be represented as
    /// JSON is sent as an `EncodingError`.
    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) {
        let message = match serde_json::to_value(value) {
            Ok(payload) => ReplyMessage::Payload(payload),
            Err(e) => ReplyMessage::Error(
                RpcError::encoding("Server payload encoding")
                    .caused_by(RpcError::new(e.to_string())),
            ),
        };
        self.send(message).await;
    }

    /// Rearm the reply and send another message through the full pipeline.
    pub async fn next(&mut self, message: impl Into<ReplyMessage>) {
        self.sent = false;
        self.send(message).await;
    }

    fn accept_error(&mut self, mut err: RpcError) {
        let hop = self.courier.hop(&self.call);
        err.root_mut().attach_hop(hop);
        self.is_error = true;
        self.response.set_error(err);
    }

    async fn server_send(&mut self) {
        self.courier.events().emit(ServerEvent::PreResponse {
            request_id: self.call.request_id().map(str::to_string),
        });

        let outcome = self
            .courier
            .extensions()
            .run(HookPoint::OnSend, &self.call, &mut self.response)
            .await;
        self.on_send_complete(outcome.err()).await;
    }

    async fn on_send_complete(&mut self, extension_error: Option<RpcError>) {
        let request_id = self.call.request_id().map(str::to_string);

        if let Some(cause) = extension_error {
            let mut failure = RpcError::internal("onSend extension").caused_by(cause);
            failure.root_mut().attach_hop(self.courier.hop(&self.call));
            error!(request_id = ?request_id, error = %failure, "onSend extension failed");
            self.courier.events().emit(ServerEvent::ResponseError {
                request_id: request_id.clone(),
                error: failure.clone(),
            });
            self.response.set_error(failure);
        }

        let Some(reply_to) = self.response.reply_to().map(str::to_string) else {
            #[cfg(feature = "metrics")]
            counter!(reply_metrics::FIRE_AND_FORGET_TOTAL).increment(1);
            debug!(request_id = ?request_id, "no reply destination, response not delivered");
            return;
        };

        let message = self.courier.message_builder().build(
            &self.response,
            self.call.meta.as_ref(),
            self.call.trace.as_ref(),
            self.call.request.as_ref(),
        );

        match self.courier.transport().send(&reply_to, message).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(reply_metrics::DELIVERED_TOTAL).increment(1);
                debug!(request_id = ?request_id, reply_to = %reply_to, "response delivered");

                if let Err(e) = self
                    .courier
                    .extensions()
                    .run(HookPoint::OnResponse, &self.call, &mut self.response)
                    .await
                {
                    error!(request_id = ?request_id, error = %e, "onResponse extension failed");
                }
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(reply_metrics::DELIVERY_FAILURES_TOTAL).increment(1);
                let failure =
                    RpcError::internal("response delivery").caused_by(RpcError::new(e.to_string()));
                error!(
                    request_id = ?request_id,
                    reply_to = %reply_to,
                    error = %e,
                    "failed to deliver response"
                );
                self.courier.events().emit(ServerEvent::ResponseError {
                    request_id,
                    error: failure,
                });
            },
        }
    }
}
