use crate::llm_factory::LLMProviderFactory;
use crate::llm_provider::{response_stream, GenerationConfig, LLMProvider, TokenStream};
use crate::prompt::PromptBuilder;
use crate::session::Session;
use crate::turn::PendingTurn;
use chatdocs_core::{
    document_set_fingerprint, AnswerWithSources, ChatDocsConfig, ChatDocsError, Document, Result,
    RetryPolicy, Turn,
};
use chatdocs_vector::{
    create_embedding_provider, BuildReport, EmbeddingProvider, IndexBuilder, IndexRetriever,
    Retriever,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Result of [`RAGOrchestrator::sync_documents`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Rebuilt(BuildReport),
    Unchanged,
}

/// Drives ingest, retrieval, prompting and generation for sessions.
///
/// The orchestrator itself is stateless between calls; all per-user state
/// lives in the [`Session`] passed to each operation.
pub struct RAGOrchestrator {
    config: ChatDocsConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LLMProvider>,
    builder: IndexBuilder,
    prompt: PromptBuilder,
    generation: GenerationConfig,
    retry: RetryPolicy,
}

impl RAGOrchestrator {
    /// Validates `config` before anything else is constructed.
    pub fn new(
        config: ChatDocsConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LLMProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let builder = IndexBuilder::from_config(&config, Arc::clone(&embedder))?;
        Ok(Self {
            prompt: PromptBuilder::from_config(&config.retrieval),
            generation: GenerationConfig::from(&config.llm),
            retry: config.retry.clone(),
            builder,
            embedder,
            llm,
            config,
        })
    }

    /// Build both providers from configuration.
    pub fn from_config(config: ChatDocsConfig) -> Result<Self> {
        config.validate()?;
        let embedder = create_embedding_provider(&config.embedding)?;
        let llm = LLMProviderFactory::create_from_config(&config.llm)?;
        Self::new(config, embedder, llm)
    }

    pub fn config(&self) -> &ChatDocsConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn llm(&self) -> &Arc<dyn LLMProvider> {
        &self.llm
    }

    pub fn index_builder(&self) -> &IndexBuilder {
        &self.builder
    }

    /// Replace the session's index with one built from `documents`.
    ///
    /// On failure the session keeps its previous index, memory and state.
    #[instrument(skip(self, session, documents), fields(session = %session.id(), documents = documents.len()))]
    pub async fn build_index(
        &self,
        session: &mut Session,
        documents: &[Document],
    ) -> Result<BuildReport> {
        let built = self.builder.build(documents).await?;
        let report = built.report.clone();
        session.install_index(built, document_set_fingerprint(documents));
        info!(
            "Session {} ready with {} chunks (generation {})",
            session.id(),
            report.indexed_chunks,
            session.generation()
        );
        Ok(report)
    }

    /// Rebuild only if the document set differs from the one already indexed.
    pub async fn sync_documents(
        &self,
        session: &mut Session,
        documents: &[Document],
    ) -> Result<SyncOutcome> {
        let fingerprint = document_set_fingerprint(documents);
        if session.fingerprint() == Some(fingerprint.as_str()) {
            debug!("Document set unchanged, keeping current index");
            return Ok(SyncOutcome::Unchanged);
        }
        self.build_index(session, documents)
            .await
            .map(SyncOutcome::Rebuilt)
    }

    /// Answer one question and record the exchange.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Result<AnswerWithSources> {
        let turn = self.begin_turn(session, question).await?;
        self.finish_turn(session, turn).await
    }

    /// Retrieve context, assemble the prompt and open the answer stream.
    ///
    /// Any turn still pending on the session is cancelled first.
    #[instrument(skip(self, session, question), fields(session = %session.id()))]
    pub async fn begin_turn(&self, session: &mut Session, question: &str) -> Result<PendingTurn> {
        let retriever = session
            .index()
            .map(|built| built.retriever())
            .ok_or(ChatDocsError::NotReady)?;

        let (generation, token) = session.start_turn();
        debug!("Starting turn {}", generation);

        match self.prepare(session, question, &retriever).await {
            Ok((sources, stream)) => Ok(PendingTurn::new(
                generation,
                question.to_string(),
                sources,
                token,
                stream,
            )),
            Err(err) => {
                warn!("Turn {} failed before answering: {}", generation, err);
                session.settle(generation);
                Err(err)
            }
        }
    }

    /// Drain `turn` and commit it to memory if it is still current.
    pub async fn finish_turn(
        &self,
        session: &mut Session,
        mut turn: PendingTurn,
    ) -> Result<AnswerWithSources> {
        let started = Instant::now();
        let generation = turn.generation;
        let token = turn.token.clone();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = turn.next() => next,
            };
            match next {
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("Turn {} failed while streaming: {}", generation, err);
                    session.settle(generation);
                    return Err(err);
                }
                None => break,
            }
        }

        if let Some(err) = turn.take_failure() {
            session.settle(generation);
            return Err(err);
        }
        if generation != session.generation() {
            debug!(
                "Discarding stale turn {} (current {})",
                generation,
                session.generation()
            );
            return Err(ChatDocsError::StaleTurn { generation });
        }
        if token.is_cancelled() {
            session.settle(generation);
            return Err(ChatDocsError::Cancelled);
        }

        let (question, answer, sources, citations) = turn.into_parts();
        let memory = session.memory_mut();
        memory.append(Turn::user(question));
        memory.append(Turn::assistant(answer.clone()));
        session.settle(generation);

        debug!(
            "Turn {} committed: {} chars, {} sources, {}ms streaming",
            generation,
            answer.len(),
            sources.len(),
            started.elapsed().as_millis()
        );

        Ok(AnswerWithSources {
            text: answer,
            source_chunk_ids: sources.iter().map(|s| s.chunk_id).collect(),
            sources,
            citations,
        })
    }

    async fn prepare(
        &self,
        session: &Session,
        question: &str,
        retriever: &IndexRetriever,
    ) -> Result<(Vec<chatdocs_core::SourceRef>, TokenStream)> {
        let memory = session.memory();
        let search_query = if self.config.retrieval.condense_question && !memory.is_empty() {
            self.condense(question, session).await?
        } else {
            question.to_string()
        };

        let query_vector = self
            .retry
            .run("embedding question", || self.embedder.embed_one(&search_query))
            .await?;

        let hits = retriever.retrieve(
            &query_vector,
            self.config.retrieval.top_k,
            self.config.retrieval.min_score,
        )?;
        debug!("Retrieved {} chunks", hits.len());

        let messages = self.prompt.build(question, &hits, memory);
        let messages = &messages;
        let stream = if self.config.llm.streaming {
            self.retry
                .run("opening answer stream", || {
                    self.llm.stream_chat(messages, &self.generation)
                })
                .await?
        } else {
            let response = self
                .retry
                .run("generating answer", || {
                    self.llm.generate_chat(messages, &self.generation)
                })
                .await?;
            response_stream(response)
        };

        Ok((hits.iter().map(|hit| hit.source_ref()).collect(), stream))
    }

    /// Rewrite a follow-up into a standalone question for retrieval.
    async fn condense(&self, question: &str, session: &Session) -> Result<String> {
        let messages = self.prompt.condense(question, session.memory());
        let messages = &messages;
        let response = self
            .retry
            .run("condensing question", || {
                self.llm.generate_chat(messages, &self.generation)
            })
            .await?;

        let standalone = response.content.trim();
        if standalone.is_empty() {
            Ok(question.to_string())
        } else {
            debug!("Condensed question: {}", standalone);
            Ok(standalone.to_string())
        }
    }
}
