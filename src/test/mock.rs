//! An in-memory deployment. Every checked out connection is one end of a duplex pipe whose other
//! end is served by a task that records each command and answers from a script.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use tokio::{io::DuplexStream, sync::watch};

use crate::{
    bson::{Document, RawDocumentBuf},
    cmap::{
        conn::wire::{next_request_id, Message, MessageFlags},
        Connection,
        StreamDescription,
    },
    error::{Error, Result},
    options::{ClientOptions, ServerAddress},
    sdam::{Deployment, TopologyDescription},
    Client,
};

const PIPE_CAPACITY: usize = 64 * 1024;

/// How a scripted server answers one command.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Answers with this document.
    Document(Document),
    /// Closes the connection without answering.
    Close,
    /// Never answers.
    Hang,
    /// Answers with each document in turn, flagging all but the last `moreToCome`.
    Stream(Vec<Document>),
}

impl From<Document> for Reply {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

type Responder = Box<dyn FnMut(&ServerAddress, &Document) -> Reply + Send>;

/// A command as a server received it, with document sequences folded into the body.
#[derive(Debug, Clone)]
pub(crate) struct ReceivedCommand {
    pub(crate) address: ServerAddress,
    pub(crate) connection_id: u32,
    pub(crate) body: Document,
    /// The top-level keys of the command body as sent, duplicates included.
    pub(crate) keys: Vec<String>,
    pub(crate) exhaust_allowed: bool,
}

impl ReceivedCommand {
    pub(crate) fn name(&self) -> &str {
        self.body.keys().next().map(String::as_str).unwrap_or_default()
    }
}

struct Script {
    responder: Mutex<Responder>,
    received: Mutex<Vec<ReceivedCommand>>,
}

impl Script {
    fn answer(&self, address: &ServerAddress, connection_id: u32, request: &Message) -> Reply {
        let body = request.get_command_document();
        let keys = request
            .document_payload
            .iter()
            .filter_map(|element| element.ok().map(|(key, _)| key.to_string()))
            .collect();
        let reply = (self.responder.lock().unwrap())(address, &body);
        self.received.lock().unwrap().push(ReceivedCommand {
            address: address.clone(),
            connection_id,
            body,
            keys,
            exhaust_allowed: request.flags.contains(MessageFlags::EXHAUST_ALLOWED),
        });
        reply
    }
}

pub(crate) struct MockDeployment {
    topology: watch::Sender<TopologyDescription>,
    stream_description: StreamDescription,
    script: Arc<Script>,
    check_out_failures: Mutex<VecDeque<Error>>,
    next_connection_id: AtomicU32,
    checked_in: AtomicUsize,
    broken_check_ins: AtomicUsize,
    application_errors: Mutex<Vec<ServerAddress>>,
}

impl MockDeployment {
    /// A deployment described by `topology` whose servers answer with `responder`. Connections
    /// look like they were handshaked with a 7.0 replica set member.
    pub(crate) fn new(
        topology: TopologyDescription,
        responder: impl FnMut(&ServerAddress, &Document) -> Reply + Send + 'static,
    ) -> Self {
        Self {
            topology: watch::Sender::new(topology),
            stream_description: StreamDescription::with_wire_version(21),
            script: Arc::new(Script {
                responder: Mutex::new(Box::new(responder)),
                received: Mutex::new(Vec::new()),
            }),
            check_out_failures: Mutex::new(VecDeque::new()),
            next_connection_id: AtomicU32::new(1),
            checked_in: AtomicUsize::new(0),
            broken_check_ins: AtomicUsize::new(0),
            application_errors: Mutex::new(Vec::new()),
        }
    }

    /// Changes what every connection reports from its handshake.
    pub(crate) fn with_stream_description(
        mut self,
        update: impl FnOnce(&mut StreamDescription),
    ) -> Self {
        update(&mut self.stream_description);
        self
    }

    /// Makes the next checkout fail with `error`.
    pub(crate) fn fail_next_check_out(&self, error: Error) {
        self.check_out_failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn into_client(self) -> (Client, Arc<Self>) {
        self.into_client_with_options(ClientOptions::default())
    }

    pub(crate) fn into_client_with_options(self, options: ClientOptions) -> (Client, Arc<Self>) {
        let deployment = Arc::new(self);
        let client = Client::new(deployment.clone(), options).unwrap();
        (client, deployment)
    }

    pub(crate) fn set_topology(&self, topology: TopologyDescription) {
        self.topology.send_replace(topology);
    }

    pub(crate) fn received(&self) -> Vec<ReceivedCommand> {
        self.script.received.lock().unwrap().clone()
    }

    pub(crate) fn received_named(&self, name: &str) -> Vec<ReceivedCommand> {
        self.received()
            .into_iter()
            .filter(|command| command.name() == name)
            .collect()
    }

    pub(crate) fn command_names(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|command| command.name().to_string())
            .collect()
    }

    pub(crate) fn checked_in(&self) -> usize {
        self.checked_in.load(Ordering::SeqCst)
    }

    pub(crate) fn broken_check_ins(&self) -> usize {
        self.broken_check_ins.load(Ordering::SeqCst)
    }

    pub(crate) fn application_errors(&self) -> Vec<ServerAddress> {
        self.application_errors.lock().unwrap().clone()
    }
}

impl Deployment for MockDeployment {
    fn description(&self) -> TopologyDescription {
        self.topology.borrow().clone()
    }

    fn wait_for_change(&self) -> BoxFuture<'_, ()> {
        let mut receiver = self.topology.subscribe();
        async move {
            let _ = receiver.changed().await;
        }
        .boxed()
    }

    fn request_check(&self) {}

    fn check_out<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, Result<Connection>> {
        async move {
            if let Some(error) = self.check_out_failures.lock().unwrap().pop_front() {
                return Err(error);
            }

            let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
            let (client_side, server_side) = tokio::io::duplex(PIPE_CAPACITY);
            let mut connection = Connection::new(address.clone(), id, client_side);
            connection.stream_description = Some(self.stream_description.clone());

            tokio::spawn(serve(
                server_side,
                address.clone(),
                id,
                self.script.clone(),
            ));
            Ok(connection)
        }
        .boxed()
    }

    fn check_in(&self, connection: Connection) {
        self.checked_in.fetch_add(1, Ordering::SeqCst);
        if connection.is_broken() {
            self.broken_check_ins.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handle_application_error(&self, address: &ServerAddress, _error: &Error) {
        self.application_errors.lock().unwrap().push(address.clone());
    }
}

async fn serve(mut stream: DuplexStream, address: ServerAddress, id: u32, script: Arc<Script>) {
    loop {
        let Ok(request) = Message::read_from(&mut stream, None).await else {
            return;
        };
        match script.answer(&address, id, &request) {
            Reply::Document(document) => {
                let reply = Message {
                    document_payload: RawDocumentBuf::from_document(&document).unwrap(),
                    document_sequences: Vec::new(),
                    response_to: request.request_id.unwrap_or_default(),
                    flags: MessageFlags::empty(),
                    request_id: None,
                };
                if reply.write_to(&mut stream).await.is_err() {
                    return;
                }
            }
            Reply::Close => return,
            Reply::Hang => std::future::pending::<()>().await,
            Reply::Stream(documents) => {
                let mut response_to = request.request_id.unwrap_or_default();
                let last = documents.len().saturating_sub(1);
                for (i, document) in documents.iter().enumerate() {
                    let request_id = next_request_id();
                    let reply = Message {
                        document_payload: RawDocumentBuf::from_document(document).unwrap(),
                        document_sequences: Vec::new(),
                        response_to,
                        flags: if i < last {
                            MessageFlags::MORE_TO_COME
                        } else {
                            MessageFlags::empty()
                        },
                        request_id: Some(request_id),
                    };
                    if reply.write_to(&mut stream).await.is_err() {
                        return;
                    }
                    response_to = request_id;
                }
            }
        }
    }
}
