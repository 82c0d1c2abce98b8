//! Front end — turns channel messages into scheduler calls.
//!
//! Owns the message loop: read a message, parse it into a command, submit
//! or administer, and reply. Late notices from executors and the scheduler
//! arrive on a separate reply channel and are forwarded as they come.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::admission::WorkflowRegistry;
use crate::channels::{Channel, IncomingMessage, OutgoingResponse, ReplyHandle};
use crate::commands::{Command, CommandParser};
use crate::error::Error;
use crate::queue::{AccessLevel, CallerCapabilities, Job, LaneScheduler, WorkExecutor};

/// Workflow identifier given to conversational requests.
pub const CHAT_WORKFLOW: &str = "chat";

/// Capacity of the late-notice channel.
const REPLY_CHANNEL_CAPACITY: usize = 64;

/// What a local operator is allowed to do.
#[derive(Debug, Clone, Copy)]
pub struct OperatorPolicy {
    pub access_level: AccessLevel,
    /// Whether a `!` prefix is honoured.
    pub may_skip_queue: bool,
}

/// Shared components for the front end.
pub struct FrontendDeps {
    pub scheduler: Arc<LaneScheduler>,
    pub workflows: Arc<WorkflowRegistry>,
    pub executor: Arc<dyn WorkExecutor>,
    pub operators: OperatorPolicy,
}

pub struct Frontend {
    deps: FrontendDeps,
    channel: Arc<dyn Channel>,
    reply_tx: mpsc::Sender<OutgoingResponse>,
    reply_rx: Option<mpsc::Receiver<OutgoingResponse>>,
}

impl Frontend {
    pub fn new(deps: FrontendDeps, channel: Arc<dyn Channel>) -> Self {
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        Self {
            deps,
            channel,
            reply_tx,
            reply_rx: Some(reply_rx),
        }
    }

    /// Run until `/quit`, Ctrl+C, or the channel stream ends.
    pub async fn run(mut self) -> Result<(), Error> {
        let Some(mut notices) = self.reply_rx.take() else {
            return Ok(());
        };
        let mut messages = self.channel.start().await?;
        tracing::info!(channel = self.channel.name(), "Front end listening");

        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                Some(notice) = notices.recv() => {
                    if let Err(e) = self.channel.notify(notice).await {
                        tracing::warn!("Failed to forward notice: {}", e);
                    }
                }
                msg = messages.next() => {
                    let Some(message) = msg else {
                        tracing::info!("Channel stream ended, shutting down...");
                        break;
                    };
                    match self.handle_message(&message).await {
                        Ok(Some(text)) => {
                            let _ = self
                                .channel
                                .respond(&message, OutgoingResponse::text(text))
                                .await;
                        }
                        Ok(None) => {
                            tracing::info!("Shutdown command received, exiting...");
                            break;
                        }
                        Err(e) => {
                            let _ = self
                                .channel
                                .respond(&message, OutgoingResponse::text(format!("Error: {e}")))
                                .await;
                        }
                    }
                }
            }
        }

        self.channel.shutdown().await?;
        Ok(())
    }

    /// Handle one message. `Ok(None)` means shut down.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<Option<String>, Error> {
        let scheduler = &self.deps.scheduler;

        let reply = match CommandParser::parse(&message.content) {
            Command::Generate {
                workflow,
                prompt,
                urgent,
            } => {
                let job = self.build_job(message, &workflow, &prompt, urgent);
                let advisory = scheduler.enqueue(job).await?;
                if advisory.is_empty() {
                    format!("Starting {workflow}...")
                } else {
                    advisory
                }
            }
            Command::Chat { content, urgent } => {
                let job = self.build_job(message, CHAT_WORKFLOW, &content, urgent);
                scheduler.enqueue(job).await?
            }
            Command::Status => scheduler.detailed_status().await.to_string(),
            Command::Clear { lane: Some(lane) } => {
                let dropped = scheduler.clear_queue(lane).await;
                format!("Cleared {dropped} pending job(s) from the {lane} lane.")
            }
            Command::Clear { lane: None } => {
                let dropped = scheduler.clear_all_queues().await;
                format!("Cleared {dropped} pending job(s).")
            }
            Command::Forget => {
                if scheduler.remove_current_item().await {
                    "Stopped tracking the running job(s). They may still finish in the background."
                        .to_string()
                } else {
                    "Nothing is running.".to_string()
                }
            }
            Command::Help => self.help_text(),
            Command::Invalid { reason } => format!("Error: {reason}"),
            Command::Quit => return Ok(None),
        };

        Ok(Some(reply))
    }

    fn build_job(&self, message: &IncomingMessage, workflow: &str, prompt: &str, urgent: bool) -> Job {
        let operators = self.deps.operators;
        let caller = CallerCapabilities::new(&message.user_id, operators.access_level)
            .with_skip_queue(urgent && operators.may_skip_queue);
        let reply = ReplyHandle::new(self.reply_tx.clone()).with_thread(message.thread_id.clone());
        Job::new(
            workflow,
            prompt,
            caller,
            Arc::clone(&self.deps.executor),
            reply,
        )
    }

    fn help_text(&self) -> String {
        let names = self.deps.workflows.names();
        let workflows = if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        };
        format!(
            "Commands:\n  \
             /gen <workflow> [prompt]  run a workflow\n  \
             /status                   show both lanes\n  \
             /clear [high|low|all]     drop pending jobs\n  \
             /forget                   stop tracking running jobs\n  \
             /quit                     exit\n\
             Prefix with ! to skip the queue. Anything else is chat.\n\
             Workflows: {workflows}"
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::admission::{
        HardwareStatus, LiveAdmissionPolicy, StaticStatusSource, WorkflowMetadata,
    };
    use crate::channels::MessageStream;
    use crate::config::QueueConfig;
    use crate::error::ChannelError;
    use crate::queue::Lane;

    struct NullChannel;

    #[async_trait]
    impl Channel for NullChannel {
        fn name(&self) -> &str {
            "null"
        }
        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }
        async fn respond(
            &self,
            _msg: &IncomingMessage,
            _response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn frontend(may_skip_queue: bool) -> Frontend {
        let config = QueueConfig::default();
        let workflows = Arc::new(
            WorkflowRegistry::new()
                .with(WorkflowMetadata::new("sdxl", AccessLevel::Guest))
                .with(WorkflowMetadata::new("video", AccessLevel::Admin).big()),
        );
        let source = Arc::new(StaticStatusSource::new(HardwareStatus::available()));
        let policy = Arc::new(LiveAdmissionPolicy::from_config(source, &config));
        let scheduler = Arc::new(LaneScheduler::new(&config, policy, workflows.clone()));
        let executor: Arc<dyn WorkExecutor> =
            Arc::new(crate::executor::SimulatedExecutor::new(Duration::from_millis(1)));

        Frontend::new(
            FrontendDeps {
                scheduler,
                workflows,
                executor,
                operators: OperatorPolicy {
                    access_level: AccessLevel::Member,
                    may_skip_queue,
                },
            },
            Arc::new(NullChannel),
        )
    }

    fn msg(content: &str) -> IncomingMessage {
        IncomingMessage::new("test", "dave", content)
    }

    #[tokio::test]
    async fn generate_routes_and_replies() {
        let fe = frontend(false);
        let reply = fe.handle_message(&msg("/gen sdxl a boat")).await.unwrap();
        assert_eq!(reply.as_deref(), Some("Starting sdxl..."));
        assert_eq!(fe.deps.scheduler.lane(Lane::High).len().await, 1);
    }

    #[tokio::test]
    async fn rejection_is_an_error() {
        let fe = frontend(false);
        let err = fe.handle_message(&msg("/gen video")).await.unwrap_err();
        assert!(err.to_string().contains("requires admin access"));
    }

    #[tokio::test]
    async fn chat_goes_to_low_lane() {
        let fe = frontend(false);
        fe.handle_message(&msg("how are you?")).await.unwrap();
        let queued = fe.deps.scheduler.lane(Lane::Low).peek().await.unwrap();
        assert_eq!(queued.workflow, CHAT_WORKFLOW);
        assert_eq!(queued.prompt, "how are you?");
    }

    #[tokio::test]
    async fn skip_queue_only_when_allowed() {
        let fe = frontend(false);
        fe.handle_message(&msg("!hi")).await.unwrap();
        let queued = fe.deps.scheduler.lane(Lane::Low).peek().await.unwrap();
        assert!(!queued.caller.skip_queue);

        let fe = frontend(true);
        fe.handle_message(&msg("!hi")).await.unwrap();
        let queued = fe.deps.scheduler.lane(Lane::Low).peek().await.unwrap();
        assert!(queued.caller.skip_queue);
    }

    #[tokio::test]
    async fn admin_commands() {
        let fe = frontend(false);
        fe.handle_message(&msg("hello")).await.unwrap();
        let status = fe.handle_message(&msg("/status")).await.unwrap().unwrap();
        assert!(status.contains("low-performance lane: idle, 1/20 queued [chat]"));

        let cleared = fe.handle_message(&msg("/clear low")).await.unwrap().unwrap();
        assert_eq!(cleared, "Cleared 1 pending job(s) from the low-performance lane.");

        let forget = fe.handle_message(&msg("/forget")).await.unwrap().unwrap();
        assert_eq!(forget, "Nothing is running.");
    }

    #[tokio::test]
    async fn help_lists_workflows_and_quit_stops() {
        let fe = frontend(false);
        let help = fe.handle_message(&msg("/help")).await.unwrap().unwrap();
        assert!(help.contains("Workflows: sdxl, video"));
        assert!(fe.handle_message(&msg("/quit")).await.unwrap().is_none());
    }
}
