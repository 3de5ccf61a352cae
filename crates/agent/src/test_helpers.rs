//! Shared test doubles for the dispatch, streaming and engine tests.

use async_trait::async_trait;
use leadline_core::error::{FetchError, ProviderError};
use leadline_core::lookup::FetchGateway;
use leadline_core::message::Message;
use leadline_core::provider::{
    ModelBinding, ModelFactory, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted outcome for a model invocation.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply { text: String, usage: Option<Usage> },
    Fail(ProviderError),
}

/// A reply with exact usage.
pub fn reply(text: &str, input: u64, output: u64) -> Scripted {
    Scripted::Reply {
        text: text.into(),
        usage: Some(Usage::exact(input, output)),
    }
}

/// A reply whose backend reports no usage.
pub fn reply_without_usage(text: &str) -> Scripted {
    Scripted::Reply {
        text: text.into(),
        usage: None,
    }
}

/// A mock provider that plays back a queue of scripted outcomes and
/// records every request it receives.
///
/// Panics if more calls are made than outcomes provided.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ProviderRequest) -> Scripted {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let mut script = self.script.lock().unwrap();
        script
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no more outcomes"))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Scripted::Reply { text, usage } => Ok(ProviderResponse {
                message: Message::assistant(text),
                usage,
                model: "scripted-model".into(),
            }),
            Scripted::Fail(e) => Err(e),
        }
    }

    /// Streams the scripted text word by word; usage rides on the last chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let (text, usage) = match self.next(request) {
            Scripted::Reply { text, usage } => (text, usage),
            Scripted::Fail(e) => return Err(e),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(2);
        tokio::spawn(async move {
            for word in text.split_inclusive(' ') {
                let chunk = StreamChunk {
                    content: Some(word.to_string()),
                    done: false,
                    usage: None,
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage,
                }))
                .await;
        });
        Ok(rx)
    }
}

/// A model factory that binds every new session to `provider`.
pub fn factory(provider: Arc<ScriptedProvider>) -> ModelFactory {
    Arc::new(move || ModelBinding::new(provider.clone(), "scripted-model"))
}

/// A fetch gateway with a fixed outcome that counts its calls.
pub struct CountingFetchGateway {
    outcome: Result<String, FetchError>,
    queries: Mutex<Vec<String>>,
}

impl CountingFetchGateway {
    pub fn ok(data: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(data.into()),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: FetchError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchGateway for CountingFetchGateway {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch(&self, query: &str) -> Result<String, FetchError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.outcome.clone()
    }
}
