use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use docqa_common::RetrievedChunk;
use docqa_knowledge::document_processor::preview;
use docqa_knowledge::{DocumentProcessor, DocumentStore, Retriever, TextChunker};
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::generator::{build_context, AnswerGenerator};

pub const MSG_EMPTY_QUESTION: &str = "Please enter a question.";
pub const MSG_NO_DOCUMENTS: &str = "Please upload a document first before asking questions.";
pub const MSG_NO_RELEVANT_INFORMATION: &str =
    "No relevant information found in the uploaded documents.";
pub const MSG_EXTRACTION_FAILED: &str =
    "Could not extract text from the PDF. Please try a different file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    DocumentUploaded,
    Indexed,
    QueryInFlight,
    AnswerReady,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Indexed {
        filename: String,
        chunks_created: usize,
        preview: String,
    },
    Rejected {
        filename: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AskOutcome {
    EmptyQuestion,
    NoDocuments,
    NoRelevantInformation {
        /// Present when retrieval failed rather than matching nothing.
        warning: Option<String>,
    },
    Answered {
        answer: String,
        sources: Vec<RetrievedChunk>,
    },
}

impl AskOutcome {
    /// User-facing text for outcomes that stop before generation.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            AskOutcome::EmptyQuestion => Some(MSG_EMPTY_QUESTION),
            AskOutcome::NoDocuments => Some(MSG_NO_DOCUMENTS),
            AskOutcome::NoRelevantInformation { .. } => Some(MSG_NO_RELEVANT_INFORMATION),
            AskOutcome::Answered { .. } => None,
        }
    }
}

pub enum AskStream {
    /// Generation was not attempted; the outcome explains why.
    Notice(AskOutcome),
    Streaming {
        sources: Vec<RetrievedChunk>,
        fragments: BoxStream<'static, String>,
    },
}

#[derive(Debug)]
struct Phase {
    state: SessionState,
    /// Bumped by every reset. A query started under an older value must not
    /// move the session out of `Idle`.
    resets: u64,
}

type SharedPhase = Arc<Mutex<Phase>>;

fn lock(phase: &SharedPhase) -> MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the session in `QueryInFlight` for one question.
///
/// `complete` moves to `AnswerReady`. Dropping the guard without completing
/// puts back the state seen when the query began. Neither applies once a
/// reset or another transition has replaced `QueryInFlight`.
struct QueryGuard {
    phase: SharedPhase,
    resets: u64,
    previous: SessionState,
    settled: bool,
}

impl QueryGuard {
    fn begin(phase: &SharedPhase) -> Self {
        let mut current = lock(phase);
        let previous = current.state;
        current.state = SessionState::QueryInFlight;
        Self {
            phase: phase.clone(),
            resets: current.resets,
            previous,
            settled: false,
        }
    }

    fn settle(&mut self, next: SessionState) {
        if self.settled {
            return;
        }
        self.settled = true;

        let mut current = lock(&self.phase);
        if current.resets == self.resets && current.state == SessionState::QueryInFlight {
            current.state = next;
        } else {
            debug!(state = ?current.state, "Session moved on while the query ran");
        }
    }

    fn complete(mut self) {
        self.settle(SessionState::AnswerReady);
    }
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        self.settle(previous);
    }
}

/// Drives upload, question answering and reset for one session.
///
/// `gate` serializes store writes (upload, clear) against retrieval so a
/// query never observes a half-indexed or half-deleted document set.
/// Generation runs outside the gate.
pub struct SessionController {
    processor: DocumentProcessor,
    chunker: TextChunker,
    store: Arc<dyn DocumentStore>,
    retriever: Retriever,
    generator: AnswerGenerator,
    gate: RwLock<()>,
    phase: SharedPhase,
}

enum Gated {
    Stop(AskOutcome),
    Proceed {
        context: String,
        sources: Vec<RetrievedChunk>,
        guard: QueryGuard,
    },
}

impl SessionController {
    pub fn new(
        chunker: TextChunker,
        store: Arc<dyn DocumentStore>,
        retriever: Retriever,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            processor: DocumentProcessor::new(),
            chunker,
            store,
            retriever,
            generator,
            gate: RwLock::new(()),
            phase: Arc::new(Mutex::new(Phase {
                state: SessionState::Idle,
                resets: 0,
            })),
        }
    }

    pub async fn state(&self) -> SessionState {
        lock(&self.phase).state
    }

    fn set_state(&self, state: SessionState) {
        lock(&self.phase).state = state;
    }

    /// Extracts, chunks and indexes an uploaded PDF.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> UploadOutcome {
        info!(filename, size = bytes.len(), "Processing upload");

        let text = match self.processor.extract_text(bytes).await {
            Ok(text) => text,
            Err(e) => {
                warn!(filename, error = %e, "Rejected upload");
                return UploadOutcome::Rejected {
                    filename: filename.to_string(),
                    reason: MSG_EXTRACTION_FAILED.to_string(),
                };
            }
        };

        self.ingest_text(filename, &text).await
    }

    /// Chunks and indexes already extracted text. Whitespace-only text is
    /// rejected without touching the store.
    pub async fn ingest_text(&self, filename: &str, text: &str) -> UploadOutcome {
        if text.trim().is_empty() {
            warn!(filename, "No text to index");
            return UploadOutcome::Rejected {
                filename: filename.to_string(),
                reason: MSG_EXTRACTION_FAILED.to_string(),
            };
        }

        let _write = self.gate.write().await;
        let previous = self.state().await;
        self.set_state(SessionState::DocumentUploaded);

        let chunks = self.chunker.split(text);
        let chunk_count = chunks.len();
        debug!(filename, chunks = chunk_count, "Split document");

        match self.store.add(filename, chunks).await {
            Ok(ids) => {
                self.set_state(SessionState::Indexed);
                info!(filename, chunks = ids.len(), "Document indexed");
                UploadOutcome::Indexed {
                    filename: filename.to_string(),
                    chunks_created: ids.len(),
                    preview: preview(text),
                }
            }
            Err(e) => {
                warn!(filename, error = %e, "Indexing failed");
                self.set_state(previous);
                UploadOutcome::Rejected {
                    filename: filename.to_string(),
                    reason: format!("Failed to index document: {}", e),
                }
            }
        }
    }

    /// Checks the question and the store, then retrieves context under the
    /// read gate. Leaves the state untouched unless retrieval is attempted.
    async fn prepare(&self, question: &str) -> Gated {
        let question = question.trim();
        if question.is_empty() {
            return Gated::Stop(AskOutcome::EmptyQuestion);
        }

        let _read = self.gate.read().await;
        if self.count_or_zero().await == 0 {
            info!("Question asked with no documents indexed");
            return Gated::Stop(AskOutcome::NoDocuments);
        }

        let guard = QueryGuard::begin(&self.phase);

        let retrieval = self.retriever.retrieve(question).await;
        if retrieval.result.is_empty() {
            drop(guard);
            return Gated::Stop(AskOutcome::NoRelevantInformation {
                warning: retrieval.warning,
            });
        }

        Gated::Proceed {
            context: build_context(&retrieval.result),
            sources: retrieval.result.chunks,
            guard,
        }
    }

    pub async fn ask(&self, question: &str) -> AskOutcome {
        let (context, sources, guard) = match self.prepare(question).await {
            Gated::Stop(outcome) => return outcome,
            Gated::Proceed {
                context,
                sources,
                guard,
            } => (context, sources, guard),
        };

        let answer = self.generator.generate(question.trim(), &context).await;
        guard.complete();

        AskOutcome::Answered { answer, sources }
    }

    /// Like [`ask`](Self::ask) but hands back the answer fragments as they
    /// arrive. The state moves to `AnswerReady` once the stream is drained;
    /// dropping the stream early restores the state the query started from.
    pub async fn ask_stream(&self, question: &str) -> AskStream {
        let (context, sources, guard) = match self.prepare(question).await {
            Gated::Stop(outcome) => return AskStream::Notice(outcome),
            Gated::Proceed {
                context,
                sources,
                guard,
            } => (context, sources, guard),
        };

        let finished = stream::once(async move { guard.complete() })
            .filter_map(|_| ready(None::<String>));

        let fragments = self
            .generator
            .stream(question.trim(), &context)
            .await
            .chain(finished)
            .boxed();

        AskStream::Streaming { sources, fragments }
    }

    /// Empties the store. The session returns to `Idle` even if the store
    /// reports a failure.
    pub async fn clear(&self) -> bool {
        let _write = self.gate.write().await;
        let cleared = self.store.reset().await;

        let mut phase = lock(&self.phase);
        phase.state = SessionState::Idle;
        phase.resets += 1;
        cleared
    }

    pub async fn chunk_count(&self) -> usize {
        let _read = self.gate.read().await;
        self.count_or_zero().await
    }

    async fn count_or_zero(&self) -> usize {
        match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(backend = self.store.backend(), error = %e, "Could not count chunks");
                0
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}
