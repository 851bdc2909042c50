use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::citations::{aggregate_capped, render_citation_block};
use crate::error::{DeliveryError, DeliveryResult};
use crate::guard::RequestGuard;
use crate::markup::sanitize;
use crate::models::{Delivery, DeliveryUnit, GeneratedAnswer, PassageRecord, Principal};
use crate::segment::segment;

pub const FAILURE_NOTICE: &str =
    "❌ I couldn't put together an answer. Please try rephrasing your design question.";
pub const BUSY_NOTICE: &str = "⏳ I'm still working on your previous question. Please wait...";

#[derive(Clone, Debug)]
pub struct DeliverySettings {
    pub max_chunk_size: usize,
    pub max_references: Option<usize>,
}

/// Turns a raw answer and its passages into the messages a transport sends.
#[derive(Clone, Debug)]
pub struct AnswerDeliveryPipeline {
    guard: RequestGuard,
    settings: DeliverySettings,
}

impl AnswerDeliveryPipeline {
    pub fn new(guard: RequestGuard, settings: DeliverySettings) -> Self {
        Self { guard, settings }
    }

    pub fn guard(&self) -> &RequestGuard {
        &self.guard
    }

    pub fn deliver(
        &self,
        principal: Principal,
        raw_answer: &str,
        passages: &[PassageRecord],
    ) -> Delivery {
        let Ok(_permit) = self.guard.acquire(principal) else {
            tracing::info!(%principal, "rejected request: already in flight");
            return Delivery::Rejected;
        };
        self.finish(principal, self.render(raw_answer, passages))
    }

    /// Holds the principal's slot while `produce` runs, then renders its output.
    pub async fn deliver_with<F, Fut>(&self, principal: Principal, produce: F) -> Delivery
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<GeneratedAnswer>>,
    {
        let Ok(_permit) = self.guard.acquire(principal) else {
            tracing::info!(%principal, "rejected request: already in flight");
            return Delivery::Rejected;
        };

        match produce().await {
            Ok(generated) => {
                self.finish(principal, self.render(&generated.text, &generated.passages))
            }
            Err(err) => {
                tracing::error!(%principal, error = %format!("{err:#}"), "answer generation failed");
                Delivery::Failed(FAILURE_NOTICE.to_string())
            }
        }
    }

    /// Sanitize, segment and cite without admission control.
    pub fn render(
        &self,
        raw_answer: &str,
        passages: &[PassageRecord],
    ) -> DeliveryResult<Vec<DeliveryUnit>> {
        let sanitized = catch_unwind(AssertUnwindSafe(|| sanitize(raw_answer))).map_err(|panic| {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            DeliveryError::SanitizationFailure(detail)
        })?;

        let mut units: Vec<DeliveryUnit> = segment(&sanitized, self.settings.max_chunk_size)?
            .into_iter()
            .map(DeliveryUnit::Chunk)
            .collect();

        let citations = aggregate_capped(passages, self.settings.max_references);
        if let Some(block) = render_citation_block(&citations) {
            units.push(DeliveryUnit::Citations(block));
        }

        Ok(units)
    }

    fn finish(&self, principal: Principal, rendered: DeliveryResult<Vec<DeliveryUnit>>) -> Delivery {
        match rendered {
            Ok(units) => {
                tracing::debug!(%principal, units = units.len(), "answer rendered");
                Delivery::Delivered(units)
            }
            Err(err) => {
                tracing::error!(%principal, error = %err, "answer delivery failed");
                Delivery::Failed(FAILURE_NOTICE.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageChunk;
    use tokio::sync::oneshot;

    fn pipeline(max_chunk_size: usize) -> AnswerDeliveryPipeline {
        AnswerDeliveryPipeline::new(
            RequestGuard::new(),
            DeliverySettings {
                max_chunk_size,
                max_references: None,
            },
        )
    }

    fn chunks(units: &[DeliveryUnit]) -> Vec<&MessageChunk> {
        units
            .iter()
            .filter_map(|unit| match unit {
                DeliveryUnit::Chunk(chunk) => Some(chunk),
                DeliveryUnit::Citations(_) => None,
            })
            .collect()
    }

    #[test]
    fn delivers_chunks_then_citations() {
        let pipeline = pipeline(3500);
        let passages = vec![
            PassageRecord::new("UX_Research.pdf", [2, 5]),
            PassageRecord::new("UX_Research.pdf", [5, 9]),
        ];

        let Delivery::Delivered(units) =
            pipeline.deliver(Principal(1), "**Personas** help _focus_.", &passages)
        else {
            panic!("expected delivery");
        };

        assert_eq!(units.len(), 2);
        let DeliveryUnit::Chunk(first) = &units[0] else {
            panic!("expected chunk first");
        };
        assert_eq!(first.text.as_str(), "*Personas* help _focus_\\.");
        assert!(first.is_final);
        assert_eq!(
            units[1],
            DeliveryUnit::Citations(
                "📚 References consulted:\n\n• UX Research (p. 2, 5, 9)\n".to_string()
            )
        );
        assert!(!pipeline.guard().is_in_flight(Principal(1)));
    }

    #[test]
    fn no_citation_block_without_sources() {
        let Delivery::Delivered(units) = pipeline(3500).deliver(Principal(1), "hi", &[]) else {
            panic!("expected delivery");
        };
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn failure_emits_only_the_notice_and_releases() {
        let pipeline = pipeline(0);
        let outcome = pipeline.deliver(
            Principal(3),
            "anything",
            &[PassageRecord::new("Doc.pdf", [1])],
        );

        assert_eq!(outcome, Delivery::Failed(FAILURE_NOTICE.to_string()));
        assert!(!pipeline.guard().is_in_flight(Principal(3)));
    }

    #[test]
    fn busy_principal_is_rejected_without_output() {
        let pipeline = pipeline(3500);
        assert!(pipeline.guard().try_acquire(Principal(4)));

        assert!(pipeline.deliver(Principal(4), "text", &[]).is_rejected());
        // the rejected call must not release the slot it never acquired
        assert!(pipeline.guard().is_in_flight(Principal(4)));
    }

    #[test]
    fn long_answer_is_split_with_a_single_final_chunk() {
        let answer = vec!["a".repeat(3000); 3].join("\n\n");
        let Delivery::Delivered(units) = pipeline(3500).deliver(Principal(5), &answer, &[]) else {
            panic!("expected delivery");
        };

        let chunks = chunks(&units);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].is_final);
        assert!(!chunks[0].is_final && !chunks[1].is_final);
    }

    #[tokio::test]
    async fn back_to_back_requests_reject_the_second() {
        let pipeline = pipeline(3500);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .deliver_with(Principal(8), || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(GeneratedAnswer {
                            text: "first answer".to_string(),
                            passages: vec![],
                        })
                    })
                    .await
            })
        };

        started_rx.await.expect("first request started");
        let second = pipeline
            .deliver_with(Principal(8), || async {
                Ok(GeneratedAnswer {
                    text: "second answer".to_string(),
                    passages: vec![],
                })
            })
            .await;
        assert!(second.is_rejected());

        release_tx.send(()).expect("release first");
        let first = first.await.expect("join");
        assert!(matches!(first, Delivery::Delivered(ref units) if units.len() == 1));
        assert!(!pipeline.guard().is_in_flight(Principal(8)));
    }

    #[tokio::test]
    async fn failed_generation_is_reported_and_released() {
        let pipeline = pipeline(3500);
        let outcome = pipeline
            .deliver_with(Principal(9), || async {
                Err(anyhow::anyhow!("ollama unreachable"))
            })
            .await;

        assert_eq!(outcome, Delivery::Failed(FAILURE_NOTICE.to_string()));
        assert!(!pipeline.guard().is_in_flight(Principal(9)));
    }

    #[tokio::test]
    async fn dropped_request_releases_the_slot() {
        let pipeline = pipeline(3500);
        let pending = pipeline.deliver_with(Principal(10), || std::future::pending());
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;

        assert!(timed_out.is_err());
        assert!(!pipeline.guard().is_in_flight(Principal(10)));
    }
}
