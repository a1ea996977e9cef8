// Routes gateway requests to the pipeline and runs the line loop.

use super::commands::{Request, Response};
use super::formatter::{badges_for, flag_catalog, summarize_outcome, summarize_queue_item};
use crate::core::collaborators::ContentSnapshot;
use crate::core::penalties::{PenaltyView, UserPenalty};
use crate::core::pipeline::{ModerationPipeline, PipelineError};
use crate::infra::collaborators::InMemoryContentStore;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    pipeline: Arc<ModerationPipeline>,
    /// Submitted content is registered here so decisions can change its
    /// visibility.
    content: Arc<InMemoryContentStore>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<ModerationPipeline>, content: Arc<InMemoryContentStore>) -> Self {
        Self { pipeline, content }
    }

    /// Read requests until EOF or shutdown. Each line gets exactly one
    /// response line.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        mut writer: W,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.changed() => {
                    info!("Gateway shutting down");
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("Gateway input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle_line(&line).await;
            writer.write_all(response.to_line().as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok(())
    }

    pub async fn handle_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed gateway request");
                return Response::error(format!("Invalid request: {}", e));
            }
        };

        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Gateway request failed");
                Response::error(e.to_string())
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, PipelineError> {
        let pipeline = &self.pipeline;

        let response = match request {
            Request::Classify(submission) => {
                self.content
                    .upsert(ContentSnapshot::from_submission(&submission));
                let outcome = pipeline.classify_and_flag(&submission).await?;
                Response::ok(json!({
                    "summary": summarize_outcome(&outcome),
                    "badges": badges_for(&outcome.result),
                    "outcome": outcome,
                }))
            }
            Request::ProcessBatch { items } => {
                for submission in &items {
                    self.content
                        .upsert(ContentSnapshot::from_submission(submission));
                }
                Response::ok(pipeline.process_batch(items, None).await?)
            }

            Request::ListQueue { filter } => {
                let items = pipeline.list_queue(&filter).await?;
                let summaries: Vec<String> = items.iter().map(summarize_queue_item).collect();
                Response::ok(json!({ "items": items, "summaries": summaries }))
            }
            Request::QueueStats => Response::ok(pipeline.queue_statistics().await?),
            Request::DequeueNext {
                moderator_id,
                filter,
            } => Response::ok(pipeline.dequeue_next(&filter, &moderator_id).await?),
            Request::Release { content_id } => {
                Response::ok(json!({ "released": pipeline.release(&content_id).await? }))
            }
            Request::Report { content_id, delta } => {
                match pipeline.report_content(&content_id, delta).await? {
                    Some(item) => Response::ok(item),
                    None => Response::error(format!("Not found: {} is not queued", content_id)),
                }
            }

            Request::RegisterModerator { moderator_id } => {
                Response::ok(pipeline.register_moderator(&moderator_id).await?)
            }
            Request::DeactivateModerator { moderator_id } => Response::ok(json!({
                "deactivated": pipeline.deactivate_moderator(&moderator_id)
            })),
            Request::ListModerators => Response::ok(pipeline.list_moderators()),
            Request::AssignModerator {
                content_id,
                moderator_id,
            } => Response::ok(json!({
                "assigned": pipeline.assign_moderator(&content_id, &moderator_id).await?
            })),
            Request::Decide(decision) => {
                let outcome = pipeline.decide(decision).await;
                match &outcome.error {
                    Some(error) => Response::error(error.clone()),
                    None => Response::ok(outcome),
                }
            }
            Request::Workload { moderator_id } => {
                match pipeline.get_moderator_workload(&moderator_id).await? {
                    Some(workload) => Response::ok(workload),
                    None => Response::error(format!("Not found: moderator {}", moderator_id)),
                }
            }
            Request::Metrics {
                moderator_id,
                time_range,
            } => Response::ok(
                pipeline
                    .get_moderation_metrics(&moderator_id, time_range)
                    .await?,
            ),
            Request::SystemStats { time_range } => {
                Response::ok(pipeline.get_system_moderation_stats(time_range).await?)
            }

            Request::SubmitAppeal {
                user_id,
                content_id,
                moderation_action_id,
                reason,
                evidence,
            } => Response::ok(
                pipeline
                    .submit_appeal(&user_id, &content_id, &moderation_action_id, &reason, evidence)
                    .await?,
            ),
            Request::ReviewAppeal {
                appeal_id,
                moderator_id,
                decision,
                reason,
            } => Response::ok(json!({
                "reviewed": pipeline
                    .review_appeal(&appeal_id, &moderator_id, decision, &reason)
                    .await?
            })),
            Request::GetAppeal { appeal_id } => match pipeline.get_appeal(&appeal_id).await? {
                Some(appeal) => Response::ok(appeal),
                None => Response::error(format!("Not found: appeal {}", appeal_id)),
            },
            Request::ListAppeals { status } => Response::ok(pipeline.list_appeals(status).await?),

            Request::ApplyPenalty(params) => {
                Response::ok(PenaltyView::from(pipeline.apply_penalty(params).await?))
            }
            Request::RemovePenalty {
                penalty_id,
                removed_by,
                reason,
            } => Response::ok(json!({
                "removed": pipeline.remove_penalty(&penalty_id, &removed_by, &reason).await?
            })),
            Request::ActivePenalties { user_id } => {
                Response::ok(views(pipeline.get_active_penalties(&user_id).await?))
            }
            Request::PenaltyHistory { user_id } => {
                Response::ok(views(pipeline.get_penalty_history(&user_id).await?))
            }

            Request::GetRules => Response::ok(pipeline.get_flagging_rules().await),
            Request::UpdateRules { rules } => {
                pipeline.update_flagging_rules(rules).await;
                Response::ok(pipeline.get_flagging_rules().await)
            }
            Request::FlaggingStats => {
                let stats = pipeline.flagging_statistics();
                Response::ok(json!({
                    "statistics": stats,
                    "autoApprovalRate": stats.auto_approval_rate(),
                    "autoRejectionRate": stats.auto_rejection_rate(),
                    "humanReviewRate": stats.human_review_rate(),
                }))
            }
            Request::DescribeFlags => Response::ok(flag_catalog()),
        };
        Ok(response)
    }
}

fn views(penalties: Vec<UserPenalty>) -> Vec<PenaltyView> {
    penalties.into_iter().map(PenaltyView::from).collect()
}
