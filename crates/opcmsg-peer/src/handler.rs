use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use opcmsg_codec::{
    Call, CallResponse, Event, Message, MessageHeader, MessageType, Notification, ParamId,
    ParamRequest, ParamValue, ReadResponse, Status, StatusResponse, Write,
};
use opcmsg_frame::hex;
use opcmsg_transport::{MessageListener, Outbound, TransportError};
use tracing::{debug, error, info, trace, warn};

use crate::error::Result;
use crate::provider::{DataProvider, ProviderError};

/// Serves requests from the connected client out of a [`DataProvider`].
///
/// Install it as the server's [`MessageListener`]. Read, Write, Subscribe
/// and Unsubscribe are answered inline on the framing thread. Calls are
/// queued to one dedicated worker so they run one at a time without
/// holding up reassembly of later messages.
///
/// Provider failures become status responses: not found maps to
/// `InvalidParameter`, invalid values to `InvalidParamValue`, and an
/// application error on a Call to `ApplicationError` carrying the code and
/// message.
pub struct MessageHandler<P: DataProvider + 'static> {
    provider: Arc<P>,
    outbound: Outbound,
    calls: Option<Sender<Call>>,
    call_worker: Option<JoinHandle<()>>,
    next_id: AtomicU32,
}

impl<P: DataProvider + 'static> MessageHandler<P> {
    pub fn new(provider: Arc<P>, outbound: Outbound) -> Result<Self> {
        let (calls, queue) = channel::unbounded();
        let worker_provider = Arc::clone(&provider);
        let worker_outbound = outbound.clone();
        let call_worker = thread::Builder::new()
            .name("opcmsg-calls".to_string())
            .spawn(move || serve_calls(worker_provider.as_ref(), &worker_outbound, queue))
            .map_err(TransportError::from)?;

        Ok(Self {
            provider,
            outbound,
            calls: Some(calls),
            call_worker: Some(call_worker),
            next_id: AtomicU32::new(1),
        })
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Push a Notification to the client. Returns its correlation id.
    pub fn notify(&self, params: Vec<(ParamId, ParamValue)>) -> Result<u32> {
        let message = Message::Notification(Notification {
            correlation_id: self.next_id(),
            params,
        });
        self.outbound.submit_message(&message)?;
        trace!(message = %message, "notification queued");
        Ok(message.correlation_id())
    }

    /// Push an Event stamped with the current time. Returns its correlation id.
    pub fn event(
        &self,
        event_type_id: ParamId,
        param_id: ParamId,
        severity: i32,
        message: impl Into<String>,
        params: Vec<(ParamId, ParamValue)>,
    ) -> Result<u32> {
        let message = Message::Event(Event {
            correlation_id: self.next_id(),
            event_type_id,
            param_id,
            timestamp: Event::now_millis(),
            severity,
            message: message.into(),
            params,
        });
        self.outbound.submit_message(&message)?;
        trace!(message = %message, "event queued");
        Ok(message.correlation_id())
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn dispatch(&self, message: Message) {
        let provider = self.provider.as_ref();
        match message {
            Message::Read(request) => {
                let response = read_response(provider, &request);
                respond(&self.outbound, MessageType::Read, response, Status::InvalidParamType);
            }
            Message::Write(Write {
                correlation_id,
                param_id,
                value,
            }) => {
                let status = outcome("write", &param_id, provider.write(&param_id, value));
                let response = Message::WriteResponse(StatusResponse::new(correlation_id, status));
                respond(&self.outbound, MessageType::Write, response, Status::InvalidMessage);
            }
            Message::Subscribe(request) => {
                let status = outcome(
                    "subscribe",
                    &request.param_id,
                    provider.subscribe(&request.param_id),
                );
                let response =
                    Message::SubscribeResponse(StatusResponse::new(request.correlation_id, status));
                respond(&self.outbound, MessageType::Subscribe, response, Status::InvalidMessage);
            }
            Message::Unsubscribe(request) => {
                let status = outcome(
                    "unsubscribe",
                    &request.param_id,
                    provider.unsubscribe(&request.param_id),
                );
                let response = Message::UnsubscribeResponse(StatusResponse::new(
                    request.correlation_id,
                    status,
                ));
                respond(&self.outbound, MessageType::Unsubscribe, response, Status::InvalidMessage);
            }
            Message::Call(call) => {
                let id = call.correlation_id;
                let queued = self.calls.as_ref().is_some_and(|calls| calls.send(call).is_ok());
                if !queued {
                    error!(correlation_id = id, "call worker gone, rejecting call");
                    if let Some(response) =
                        Message::status_response(MessageType::Call, id, Status::InvalidMessage)
                    {
                        respond(&self.outbound, MessageType::Call, response, Status::InvalidMessage);
                    }
                }
            }
            other => {
                debug!(
                    message_type = %other.message_type(),
                    correlation_id = other.correlation_id(),
                    "ignoring unsupported message"
                );
            }
        }
    }
}

impl<P: DataProvider + 'static> MessageListener for MessageHandler<P> {
    fn received(&self, header: &MessageHeader, body: &[u8]) {
        let message = match Message::decode(header, body) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    message_type = %header.message_type,
                    correlation_id = header.correlation_id,
                    len = header.length,
                    body = %hex(body),
                    error = %err,
                    "failed to decode message"
                );
                if let Some(response) = Message::status_response(
                    header.message_type,
                    header.correlation_id,
                    Status::InvalidMessage,
                ) {
                    respond(&self.outbound, header.message_type, response, Status::InvalidMessage);
                }
                return;
            }
        };
        trace!(message = %message, "received");
        self.dispatch(message);
    }

    fn sent(&self, bytes: &[u8]) {
        trace!(len = bytes.len(), "sent");
    }

    fn accepted(&self, peer: SocketAddr) {
        debug!(peer = %peer, "client accepted");
    }

    fn rejected(&self, peer: SocketAddr) {
        debug!(peer = %peer, "client rejected");
    }

    fn disconnected(&self, peer: SocketAddr) {
        debug!(peer = %peer, "client gone, resetting provider");
        self.provider.reset();
    }

    fn error_occurred(&self, error: &TransportError) {
        warn!(error = %error, "transport error");
    }
}

impl<P: DataProvider + 'static> Drop for MessageHandler<P> {
    fn drop(&mut self) {
        drop(self.calls.take());
        if let Some(worker) = self.call_worker.take() {
            if worker.join().is_err() {
                warn!("call worker panicked");
            }
        }
    }
}

fn serve_calls<P: DataProvider>(provider: &P, outbound: &Outbound, queue: Receiver<Call>) {
    for mut call in queue.iter() {
        trace!(correlation_id = call.correlation_id, method = %call.method_id, "call");
        let args = std::mem::take(&mut call.args);
        let response = match provider.call(&call.method_id, &call.param_id, args) {
            Ok(values) => CallResponse::success(&call, values),
            Err(ProviderError::Application { code, message }) => {
                info!(
                    correlation_id = call.correlation_id,
                    method = %call.method_id,
                    code,
                    message = %message,
                    "call ended with application error"
                );
                CallResponse::application_error(&call, code, message)
            }
            Err(err) => {
                let status = outcome::<()>("call", &call.method_id, Err(err));
                CallResponse::failure(call.correlation_id, status)
            }
        };
        respond(
            outbound,
            MessageType::Call,
            Message::CallResponse(response),
            Status::InvalidMessage,
        );
    }
    debug!("call worker stopped");
}

fn read_response<P: DataProvider>(provider: &P, request: &ParamRequest) -> Message {
    let response = match provider.read(&request.param_id) {
        Ok(value) => ReadResponse::success(request, value),
        Err(err) => {
            let status = outcome::<()>("read", &request.param_id, Err(err));
            ReadResponse::failure(request.correlation_id, status)
        }
    };
    Message::ReadResponse(response)
}

/// Map a provider result to a response status, logging failures.
fn outcome<T>(op: &str, id: &ParamId, result: std::result::Result<T, ProviderError>) -> Status {
    match result {
        Ok(_) => Status::Success,
        Err(err) => {
            let status = err.status();
            match err {
                // Probing for unused parameters is routine.
                ProviderError::NotFound(_) => debug!(op, param = %id, %status, error = %err, "request failed"),
                _ => warn!(op, param = %id, %status, error = %err, "request failed"),
            }
            status
        }
    }
}

/// Queue a response. If it cannot be serialized, answer with `fallback`
/// instead so the request is never left without a response.
fn respond(outbound: &Outbound, request_type: MessageType, response: Message, fallback: Status) {
    let id = response.correlation_id();
    let err = match outbound.submit_message(&response) {
        Ok(()) => {
            trace!(message = %response, "response queued");
            return;
        }
        Err(err) => err,
    };

    match err {
        TransportError::Codec(codec) => {
            warn!(correlation_id = id, error = %codec, %fallback, "response not encodable");
            let Some(fallback) = Message::status_response(request_type, id, fallback) else {
                return;
            };
            if let Err(err) = outbound.submit_message(&fallback) {
                warn!(correlation_id = id, error = %err, "failed to send response");
            }
        }
        err => warn!(correlation_id = id, error = %err, "failed to send response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;

    fn provider() -> MemoryProvider {
        MemoryProvider::new()
            .with_value(ParamId::numeric(2, 1), ParamValue::Int(5))
            .with_value(ParamId::numeric(2, 2), ParamValue::from("\u{263A}"))
    }

    #[test]
    fn read_maps_not_found_to_invalid_parameter() {
        let p = provider();
        let request = ParamRequest {
            correlation_id: 9,
            param_id: ParamId::numeric(2, 404),
        };
        let response = read_response(&p, &request);
        assert_eq!(
            response,
            Message::ReadResponse(ReadResponse::failure(9, Status::InvalidParameter))
        );
    }

    #[test]
    fn read_success_echoes_param_id() {
        let p = provider();
        let request = ParamRequest {
            correlation_id: 3,
            param_id: ParamId::numeric(2, 1),
        };
        match read_response(&p, &request) {
            Message::ReadResponse(r) => {
                assert_eq!(r.status, Status::Success);
                let result = r.result.unwrap();
                assert_eq!(result.param_id, ParamId::numeric(2, 1));
                assert_eq!(result.value, ParamValue::Int(5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unencodable_read_result_is_detected_before_sending() {
        let p = provider();
        let request = ParamRequest {
            correlation_id: 4,
            param_id: ParamId::numeric(2, 2),
        };
        assert!(read_response(&p, &request).serialize().is_err());
    }

    #[test]
    fn outcome_statuses() {
        let id = ParamId::numeric(0, 1);
        assert_eq!(outcome("write", &id, Ok(())), Status::Success);
        assert_eq!(
            outcome::<()>("write", &id, Err(ProviderError::invalid("range"))),
            Status::InvalidParamValue
        );
        assert_eq!(
            outcome::<()>("write", &id, Err(ProviderError::not_found(&id))),
            Status::InvalidParameter
        );
    }
}
