use crate::llm_provider::{StreamEvent, TokenStream};
use chatdocs_core::{ChatDocsError, ServiceErrorKind, SourceRef};
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// An answer being streamed for one question.
///
/// Yields answer fragments in arrival order. Once the turn is cancelled the
/// stream ends and no further fragments are taken from the model. Hand it
/// back to [`RAGOrchestrator::finish_turn`](crate::RAGOrchestrator::finish_turn)
/// to commit the exchange to memory.
pub struct PendingTurn {
    pub(crate) generation: u64,
    pub(crate) question: String,
    pub(crate) sources: Vec<SourceRef>,
    pub(crate) token: CancellationToken,
    stream: TokenStream,
    answer: String,
    citations: Vec<String>,
    failure: Option<(ServiceErrorKind, String)>,
    finished: bool,
}

impl PendingTurn {
    pub(crate) fn new(
        generation: u64,
        question: String,
        sources: Vec<SourceRef>,
        token: CancellationToken,
        stream: TokenStream,
    ) -> Self {
        Self {
            generation,
            question,
            sources,
            token,
            stream,
            answer: String::new(),
            citations: Vec::new(),
            failure: None,
            finished: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Retrieved context, best first.
    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// Fragments received so far, concatenated.
    pub fn answer_so_far(&self) -> &str {
        &self.answer
    }

    pub fn citations(&self) -> &[String] {
        &self.citations
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn into_parts(self) -> (String, String, Vec<SourceRef>, Vec<String>) {
        (self.question, self.answer, self.sources, self.citations)
    }

    /// The stream error, if one was already handed to the caller.
    pub(crate) fn take_failure(&mut self) -> Option<ChatDocsError> {
        self.failure
            .take()
            .map(|(kind, message)| ChatDocsError::LlmService { kind, message })
    }
}

impl Stream for PendingTurn {
    type Item = chatdocs_core::Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.token.is_cancelled() {
            this.finished = true;
            return Poll::Ready(None);
        }

        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(StreamEvent::Delta(fragment)))) => {
                    this.answer.push_str(&fragment);
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Poll::Ready(Some(Ok(StreamEvent::Citations(citations)))) => {
                    this.citations = citations;
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    let kind = if err.is_retryable() {
                        ServiceErrorKind::Transient
                    } else {
                        ServiceErrorKind::Permanent
                    };
                    this.failure = Some((kind, err.to_string()));
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl fmt::Debug for PendingTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTurn")
            .field("generation", &self.generation)
            .field("question", &self.question)
            .field("sources", &self.sources.len())
            .field("received", &self.answer.len())
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};

    fn turn(events: Vec<chatdocs_core::Result<StreamEvent>>) -> PendingTurn {
        PendingTurn::new(
            1,
            "q".to_string(),
            Vec::new(),
            CancellationToken::new(),
            Box::pin(stream::iter(events)),
        )
    }

    #[tokio::test]
    async fn fragments_accumulate_and_citations_are_kept() {
        let mut pending = turn(vec![
            Ok(StreamEvent::Delta("Par".to_string())),
            Ok(StreamEvent::Citations(vec!["a".to_string()])),
            Ok(StreamEvent::Delta("is".to_string())),
        ]);
        let fragments: Vec<_> = (&mut pending).map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, ["Par", "is"]);
        assert_eq!(pending.answer_so_far(), "Paris");
        assert_eq!(pending.citations(), ["a".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_turn_stops_consuming() {
        let mut pending = turn(vec![
            Ok(StreamEvent::Delta("one".to_string())),
            Ok(StreamEvent::Delta("two".to_string())),
        ]);
        assert_eq!(pending.next().await.unwrap().unwrap(), "one");
        pending.cancel();
        assert!(pending.next().await.is_none());
        assert_eq!(pending.answer_so_far(), "one");
    }

    #[tokio::test]
    async fn stream_error_is_remembered() {
        let mut pending = turn(vec![
            Ok(StreamEvent::Delta("half".to_string())),
            Err(ChatDocsError::llm_transient("connection reset")),
            Ok(StreamEvent::Delta("never".to_string())),
        ]);
        assert!(pending.next().await.unwrap().is_ok());
        assert!(pending.next().await.unwrap().is_err());
        assert!(pending.next().await.is_none());
        let failure = pending.take_failure().unwrap();
        assert!(failure.is_retryable());
    }
}
