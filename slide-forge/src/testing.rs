//! Scripted collaborators for tests and dry runs
//!
//! - [`ScriptedModel`]: per-role queues of canned replies or failures, with
//!   optional responder closures and fallbacks
//! - [`RecordingImageGenerator`]: deterministic images, records every request
//!   and tracks how many calls were in flight at once
//! - [`CannedSearch`]: fixed search results, records queries

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use slide_forge_sdk::{
    AgentRole, CollaboratorError, CollaboratorResult, ContinuationToken, GeneratedImage,
    ImageGenerator, ImageRequest, ModelClient, ModelRequest, ObjectStore, SearchTool,
};

use crate::config::EngineSettings;
use crate::context::{Collaborators, EngineContext};

type Responder = Arc<dyn Fn(&ModelRequest) -> CollaboratorResult<Value> + Send + Sync>;

enum Scripted {
    Reply(Value),
    Fail(String),
}

/// Model client answering from per-role scripts.
///
/// Lookup order for a call: the role's queue, then its responder, then its
/// fallback. A role with nothing scripted fails the call.
#[derive(Default)]
pub struct ScriptedModel {
    queues: Mutex<HashMap<AgentRole, VecDeque<Scripted>>>,
    responders: Mutex<HashMap<AgentRole, Responder>>,
    fallbacks: Mutex<HashMap<AgentRole, Value>>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, role: AgentRole, value: Value) -> Self {
        self.push(role, Scripted::Reply(value));
        self
    }

    pub fn fail(self, role: AgentRole, message: impl Into<String>) -> Self {
        self.push(role, Scripted::Fail(message.into()));
        self
    }

    /// Answer every unscripted call for `role` with `value`
    pub fn fallback(self, role: AgentRole, value: Value) -> Self {
        if let Ok(mut fallbacks) = self.fallbacks.lock() {
            fallbacks.insert(role, value);
        }
        self
    }

    pub fn with_responder<F>(self, role: AgentRole, responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> CollaboratorResult<Value> + Send + Sync + 'static,
    {
        if let Ok(mut responders) = self.responders.lock() {
            responders.insert(role, Arc::new(responder));
        }
        self
    }

    fn push(&self, role: AgentRole, scripted: Scripted) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(role).or_default().push_back(scripted);
        }
    }

    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, role: AgentRole) -> usize {
        self.calls().iter().filter(|c| c.role == role).count()
    }

    /// Scripted replies not consumed yet
    pub fn remaining(&self, role: AgentRole) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(&role).map(VecDeque::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, request: ModelRequest) -> CollaboratorResult<Value> {
        let role = request.role;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        let queued = self
            .queues
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&role).and_then(VecDeque::pop_front));
        match queued {
            Some(Scripted::Reply(value)) => return Ok(value),
            Some(Scripted::Fail(message)) => {
                return Err(CollaboratorError::service("model", message))
            }
            None => {}
        }

        let responder = self
            .responders
            .lock()
            .ok()
            .and_then(|r| r.get(&role).cloned());
        if let Some(responder) = responder {
            return responder(&request);
        }

        self.fallbacks
            .lock()
            .ok()
            .and_then(|f| f.get(&role).cloned())
            .ok_or_else(|| {
                CollaboratorError::service("model", format!("no scripted response for {}", role))
            })
    }
}

/// Image generator producing `IMG{n}:{prompt}` bytes and `tok-{n}` tokens
#[derive(Default)]
pub struct RecordingImageGenerator {
    delay: Duration,
    fail_on: Vec<String>,
    issued: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<ImageRequest>>,
}

impl RecordingImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold each call open for `delay` so overlap is observable
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail any request whose prompt contains `needle`
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    pub fn calls(&self) -> Vec<ImageRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for RecordingImageGenerator {
    async fn generate(&self, request: ImageRequest) -> CollaboratorResult<GeneratedImage> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.iter().any(|needle| request.prompt.contains(needle)) {
            return Err(CollaboratorError::service(
                "image",
                format!("generation rejected for call {}", n),
            ));
        }

        Ok(GeneratedImage {
            bytes: Bytes::from(format!("IMG{}:{}", n, request.prompt)),
            continuation_token: Some(ContinuationToken::new(format!("tok-{}", n).into_bytes())),
        })
    }
}

/// Search tool returning `Results for: {query}` or a fixed text
#[derive(Default)]
pub struct CannedSearch {
    response: Option<String>,
    failure: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl CannedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.response = Some(text.into());
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchTool for CannedSearch {
    async fn search(&self, query: &str) -> CollaboratorResult<String> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if let Some(message) = &self.failure {
            return Err(CollaboratorError::service("search", message.clone()));
        }
        Ok(self
            .response
            .clone()
            .unwrap_or_else(|| format!("Results for: {}", query)))
    }
}

/// Engine context wired to the given collaborators
pub fn engine_with(
    model: Arc<dyn ModelClient>,
    images: Arc<dyn ImageGenerator>,
    store: Arc<dyn ObjectStore>,
    search: Arc<dyn SearchTool>,
    settings: EngineSettings,
) -> EngineContext {
    EngineContext::new(
        Collaborators {
            model,
            images,
            store,
            search,
        },
        settings,
    )
}
