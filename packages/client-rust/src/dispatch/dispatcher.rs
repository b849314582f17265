//! Dispatcher: allocate, build, register, hand off.
//!
//! Every dispatch follows the same order:
//!
//! 1. allocate a request id,
//! 2. build and validate the envelope (nothing is registered if this fails),
//! 3. register the completion listener on `{operation, request id}`,
//! 4. hand the envelope to the worker without blocking.
//!
//! Registration strictly precedes hand-off, so a worker that completes the
//! request synchronously inside `submit` still reaches the listener. If the
//! hand-off fails the listener is withdrawn and the callback never runs.

use std::sync::Arc;

use optube_core::{
    params::require_json_object, result_keys, CommandEnvelope, CreateConversationParams,
    DispatchRequest, EnvelopeError, ImMessage, MessageOption, OpenParams, Operation,
    OperationParams, Primitive, RemoteError, RequestId, ResultMap, Topic,
};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info_span, warn};

use super::error::DispatchError;
use super::listener::{callback, BoxedCallback, CompletionListener, PendingCompletion};
use super::worker::Worker;
use crate::context::TubeContext;
use crate::session::LocalSession;

// ---------------------------------------------------------------------------
// Typed results
// ---------------------------------------------------------------------------

/// Handle to the client a session operation acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandle {
    pub client_id: String,
}

/// Connection state reported by `ClientStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    None,
    Opened,
    Paused,
}

impl ClientStatus {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::None => 110,
            Self::Opened => 111,
            Self::Paused => 120,
        }
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            110 => Some(Self::None),
            111 => Some(Self::Opened),
            120 => Some(Self::Paused),
            _ => None,
        }
    }
}

/// Callback for open/close: receives the client handle.
pub type ClientCallback = Box<dyn FnOnce(Result<ClientHandle, RemoteError>) + Send + 'static>;
/// Callback for operations whose success carries no data.
pub type AckCallback = Box<dyn FnOnce(Result<(), RemoteError>) + Send + 'static>;
/// Callback for status queries. `None` when the worker reported no status.
pub type StatusCallback =
    Box<dyn FnOnce(Result<Option<ClientStatus>, RemoteError>) + Send + 'static>;
/// Callback for online-client queries.
pub type OnlineClientsCallback =
    Box<dyn FnOnce(Result<Vec<String>, RemoteError>) + Send + 'static>;

/// Adapts a typed callback to the raw outcome form.
fn typed<T, F>(
    cb: Box<dyn FnOnce(Result<T, RemoteError>) + Send + 'static>,
    decode: F,
) -> BoxedCallback
where
    T: 'static,
    F: FnOnce(Option<ResultMap>) -> Result<T, RemoteError> + Send + 'static,
{
    callback(move |outcome| cb(outcome.and_then(decode)))
}

fn decode_status(result: Option<&ResultMap>) -> Option<ClientStatus> {
    result
        .and_then(|map| map.get(result_keys::CLIENT_STATUS))
        .and_then(Primitive::as_i64)
        .and_then(ClientStatus::from_code)
}

/// The list travels as a JSON string since result maps are flat.
fn decode_online_clients(result: Option<&ResultMap>) -> Result<Vec<String>, RemoteError> {
    let Some(encoded) = result
        .and_then(|map| map.get(result_keys::ONLINE_CLIENTS))
        .and_then(Primitive::as_str)
    else {
        return Ok(Vec::new());
    };
    serde_json::from_str(encoded)
        .map_err(|err| RemoteError::new(format!("malformed online client list: {err}")))
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Issues operations and wires their completions back to callers.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and may be
/// called from any thread.
pub struct Dispatcher {
    ctx: Arc<TubeContext>,
    worker: Arc<dyn Worker>,
    session: Option<Arc<dyn LocalSession>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(ctx: Arc<TubeContext>, worker: Arc<dyn Worker>) -> Self {
        Self {
            ctx,
            worker,
            session: None,
        }
    }

    /// Attaches the in-process session used by fast-path queries.
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn LocalSession>) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub const fn context(&self) -> &Arc<TubeContext> {
        &self.ctx
    }

    /// Dispatches `request`, returning the allocated id on acceptance.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` if the context is shut down, ids are
    /// exhausted, the request is malformed, or the worker refused the
    /// envelope. In every error case the callback has been dropped without
    /// running and nothing stays registered.
    pub fn try_dispatch(
        &self,
        request: DispatchRequest,
        callback: Option<BoxedCallback>,
    ) -> Result<RequestId, DispatchError> {
        if self.ctx.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        let request_id = self.ctx.allocator().next()?;

        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            operation = %request.operation,
            client_id = %request.client_id
        );
        let _guard = span.enter();

        let envelope = request.into_envelope(request_id)?;
        let registered = match callback {
            Some(cb) => Some(self.register(&envelope, cb)?),
            None => None,
        };

        let topic = envelope.topic();
        if let Err(err) = self.worker.submit(envelope) {
            if let Some(topic) = registered {
                self.ctx.bus().unsubscribe(topic);
            }
            return Err(err.into());
        }
        debug!(%topic, "envelope handed off");
        Ok(request_id)
    }

    fn register(
        &self,
        envelope: &CommandEnvelope,
        cb: BoxedCallback,
    ) -> Result<Topic, DispatchError> {
        let topic = envelope.topic();
        self.ctx
            .bus()
            .subscribe(CompletionListener::new(topic, cb))?;
        // A concurrent shutdown may have swept the bus before we subscribed.
        if self.ctx.is_shut_down() {
            self.ctx.bus().unsubscribe(topic);
            return Err(DispatchError::ShutDown);
        }
        Ok(topic)
    }

    /// Dispatches `request`; `false` means it was not accepted and the
    /// callback will never run. The reason is logged.
    pub fn dispatch(&self, request: DispatchRequest, callback: Option<BoxedCallback>) -> bool {
        let operation = request.operation;
        let client_id = request.client_id.clone();
        match self.try_dispatch(request, callback) {
            Ok(_) => true,
            Err(err) => {
                warn!(%operation, %client_id, error = %err, "dispatch rejected");
                false
            }
        }
    }

    /// Dispatches `request` and returns a future of its outcome.
    ///
    /// # Errors
    ///
    /// Same as [`try_dispatch`](Self::try_dispatch).
    pub fn call(&self, request: DispatchRequest) -> Result<PendingCompletion, DispatchError> {
        let (cb, rx) = PendingCompletion::channel();
        let request_id = self.try_dispatch(request, Some(cb))?;
        Ok(PendingCompletion::new(request_id, rx))
    }

    // -- client session -----------------------------------------------------

    pub fn open_client(
        &self,
        client_id: &str,
        params: OpenParams,
        callback: Option<ClientCallback>,
    ) -> bool {
        let handle = ClientHandle {
            client_id: client_id.to_string(),
        };
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ClientOpen)
                .params(OperationParams::Open(params)),
            callback.map(|cb| typed(cb, move |_| Ok(handle))),
        )
    }

    pub fn query_client_status(&self, client_id: &str, callback: Option<StatusCallback>) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ClientStatus),
            callback.map(|cb| typed(cb, |result| Ok(decode_status(result.as_ref())))),
        )
    }

    pub fn close_client(&self, client_id: &str, callback: Option<ClientCallback>) -> bool {
        let handle = ClientHandle {
            client_id: client_id.to_string(),
        };
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ClientDisconnect),
            callback.map(|cb| typed(cb, move |_| Ok(handle))),
        )
    }

    pub fn renew_session_token(&self, client_id: &str, callback: Option<AckCallback>) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ClientRefreshToken),
            callback.map(|cb| typed(cb, |_| Ok(()))),
        )
    }

    pub fn query_online_clients(
        &self,
        client_id: &str,
        clients: Vec<String>,
        callback: Option<OnlineClientsCallback>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ClientOnlineQuery)
                .params(OperationParams::OnlineClients { clients }),
            callback.map(|cb| typed(cb, |result| decode_online_clients(result.as_ref()))),
        )
    }

    // -- conversations ------------------------------------------------------

    pub fn create_conversation(
        &self,
        client_id: &str,
        params: CreateConversationParams,
        callback: Option<BoxedCallback>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ConversationCreation)
                .params(OperationParams::CreateConversation(params)),
            callback,
        )
    }

    /// Conversation query routed through the worker.
    pub fn query_conversations(
        &self,
        client_id: &str,
        query: &str,
        callback: Option<BoxedCallback>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ConversationQuery).params(
                OperationParams::Query {
                    query: query.to_string(),
                },
            ),
            callback,
        )
    }

    /// Conversation query served by the attached [`LocalSession`]. The
    /// callback is parked in the request cache and resolved without the bus.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::NoSession` without a session, `Malformed` if
    /// `query` is not a JSON object, or the session's hand-off error. The
    /// cache entry is removed again on every error.
    pub fn try_query_conversations_internally(
        &self,
        client_id: &str,
        query: &str,
        callback: BoxedCallback,
    ) -> Result<RequestId, DispatchError> {
        if self.ctx.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        let session = self.session.as_ref().ok_or(DispatchError::NoSession)?;
        if client_id.is_empty() {
            return Err(EnvelopeError::EmptyClientId.into());
        }
        let query = require_json_object(Operation::ConversationQuery, query)?;
        let request_id = self.ctx.allocator().next()?;

        let cache = self.ctx.cache();
        cache.put(client_id, None, request_id, callback)?;
        if self.ctx.is_shut_down() {
            cache.remove(client_id, None, request_id);
            return Err(DispatchError::ShutDown);
        }
        if let Err(err) = session.query_conversations(client_id, query, request_id) {
            cache.remove(client_id, None, request_id);
            return Err(err.into());
        }
        debug!(%client_id, %request_id, "conversation query started in-process");
        Ok(request_id)
    }

    pub fn query_conversations_internally(
        &self,
        client_id: &str,
        query: &str,
        callback: BoxedCallback,
    ) -> bool {
        match self.try_query_conversations_internally(client_id, query, callback) {
            Ok(_) => true,
            Err(err) => {
                warn!(%client_id, error = %err, "in-process conversation query rejected");
                false
            }
        }
    }

    // -- messages -----------------------------------------------------------

    pub fn send_message(
        &self,
        client_id: &str,
        conv_type: i32,
        message: ImMessage,
        option: Option<MessageOption>,
        callback: Option<BoxedCallback>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ConversationSendMessage)
                .conv_type(conv_type)
                .params(OperationParams::Send { message, option }),
            callback,
        )
    }

    pub fn update_message(
        &self,
        client_id: &str,
        conv_type: i32,
        old: ImMessage,
        new: ImMessage,
        callback: Option<BoxedCallback>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ConversationUpdateMessage)
                .conv_type(conv_type)
                .params(OperationParams::Update { old, new }),
            callback,
        )
    }

    pub fn recall_message(
        &self,
        client_id: &str,
        conv_type: i32,
        message: ImMessage,
        callback: Option<BoxedCallback>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ConversationRecallMessage)
                .conv_type(conv_type)
                .params(OperationParams::Recall { message }),
            callback,
        )
    }

    /// History query. Always dispatched as `ConversationMessageQuery`.
    pub fn query_messages(
        &self,
        client_id: &str,
        conversation_id: &str,
        conv_type: i32,
        params: &str,
        callback: Option<BoxedCallback>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ConversationMessageQuery)
                .conversation(conversation_id)
                .conv_type(conv_type)
                .params(OperationParams::Raw {
                    params: params.to_string(),
                }),
            callback,
        )
    }

    /// Membership and conversation-attribute operations.
    ///
    /// # Errors
    ///
    /// `DispatchError::Unsupported` if `operation` is not a member operation;
    /// otherwise as [`try_dispatch`](Self::try_dispatch).
    pub fn try_process_members(
        &self,
        client_id: &str,
        conversation_id: &str,
        conv_type: i32,
        params: &str,
        operation: Operation,
        callback: Option<BoxedCallback>,
    ) -> Result<RequestId, DispatchError> {
        if !operation.is_member_operation() {
            return Err(DispatchError::Unsupported(operation));
        }
        self.try_dispatch(
            DispatchRequest::new(client_id, operation)
                .conversation(conversation_id)
                .conv_type(conv_type)
                .params(OperationParams::Raw {
                    params: params.to_string(),
                }),
            callback,
        )
    }

    pub fn process_members(
        &self,
        client_id: &str,
        conversation_id: &str,
        conv_type: i32,
        params: &str,
        operation: Operation,
        callback: Option<BoxedCallback>,
    ) -> bool {
        match self.try_process_members(
            client_id,
            conversation_id,
            conv_type,
            params,
            operation,
            callback,
        ) {
            Ok(_) => true,
            Err(err) => {
                warn!(%operation, %client_id, error = %err, "member operation rejected");
                false
            }
        }
    }

    /// Marks a conversation read up to `last_message`. Fire-and-forget.
    pub fn mark_conversation_read(
        &self,
        client_id: &str,
        conversation_id: &str,
        conv_type: i32,
        last_message: Option<Map<String, JsonValue>>,
    ) -> bool {
        self.dispatch(
            DispatchRequest::new(client_id, Operation::ConversationRead)
                .conversation(conversation_id)
                .conv_type(conv_type)
                .params(OperationParams::Read { last_message }),
            None,
        )
    }

    /// Receipt timestamps are not served by the worker protocol. Always
    /// returns `false`; the callback is dropped without running.
    pub fn fetch_receipt_timestamps(
        &self,
        client_id: &str,
        conversation_id: &str,
        _conv_type: i32,
        _callback: Option<BoxedCallback>,
    ) -> bool {
        debug!(%client_id, %conversation_id, "receipt timestamp fetch is not supported");
        false
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("ctx", &self.ctx)
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
