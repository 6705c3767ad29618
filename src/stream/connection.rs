//! Per-connection state: decoding, rate limiting, pipelines, calibration
//! status.
//!
//! Each WebSocket connection owns one `ConnectionState`. The rate limiter is
//! part of the connection itself, created on connect and dropped on
//! disconnect, rather than a global map that needs separate eviction. The session
//! pipelines live here too, so filter history dies with the connection.

use crate::config::{PipelineConfig, ServerConfig};
use crate::error::GloveError;
use crate::frame;
use crate::pipeline::SessionPipeline;
use crate::stream::coordinator::ScorePayload;
use crate::stream::protocol::Envelope;
use std::time::{Duration, Instant};

/// What to do with one inbound text message.
#[derive(Debug)]
pub struct HandleOutcome {
    /// Envelope to send back immediately (error or calibration status).
    pub reply: Option<Envelope>,
    /// Processed payload to hand to the coordinator.
    pub payload: Option<ScorePayload>,
}

impl HandleOutcome {
    fn drop_silently() -> Self {
        Self {
            reply: None,
            payload: None,
        }
    }
}

/// State owned by a single streaming connection.
pub struct ConnectionState {
    pipeline_config: PipelineConfig,
    right: SessionPipeline,
    left: Option<SessionPipeline>,
    rate_limit: Duration,
    last_accepted: Option<Instant>,
    ready_sent: bool,
}

impl ConnectionState {
    /// Build connection state from configuration.
    pub fn new(pipeline: &PipelineConfig, server: &ServerConfig) -> Self {
        Self {
            pipeline_config: pipeline.clone(),
            right: SessionPipeline::new(pipeline),
            left: None,
            rate_limit: server.rate_limit_interval(),
            last_accepted: None,
            ready_sent: false,
        }
    }

    /// Status envelope sent when the connection is established.
    pub fn initial_status(&self) -> Envelope {
        let progress = self.right.calibration_progress();
        Envelope::calibrating(progress.seen, progress.needed)
    }

    /// Handle one inbound text message.
    ///
    /// Malformed input yields an error envelope and no payload; the caller
    /// keeps the connection open. Frames arriving faster than the rate limit
    /// are dropped silently: no response, no submission. Accepted frames are
    /// folded through the session pipelines into a [`ScorePayload`].
    pub fn handle_text(&mut self, text: &str) -> HandleOutcome {
        let message = match frame::decode(text) {
            Ok(message) => message,
            Err(GloveError::MalformedFrame(reason)) => {
                tracing::debug!(%reason, "malformed frame");
                return HandleOutcome {
                    reply: Some(Envelope::error(reason)),
                    payload: None,
                };
            }
            Err(other) => {
                return HandleOutcome {
                    reply: Some(Envelope::error(other.to_string())),
                    payload: None,
                };
            }
        };

        let now = Instant::now();
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.rate_limit {
                tracing::trace!("frame dropped by rate limiter");
                return HandleOutcome::drop_silently();
            }
        }
        self.last_accepted = Some(now);

        let right = self.right.process(&message.right);
        let left = message.left.as_ref().map(|left_frame| {
            let pipeline_config = &self.pipeline_config;
            self.left
                .get_or_insert_with(|| SessionPipeline::new(pipeline_config))
                .process(left_frame)
        });

        let payload = ScorePayload {
            timestamp: message.timestamp,
            right: right.features().to_vec(),
            left: left.map(|f| f.features().to_vec()),
        };

        // Surface calibration completion exactly once.
        let reply = if !self.ready_sent && self.right.calibration_progress().calibrated {
            self.ready_sent = true;
            Some(Envelope::ready())
        } else {
            None
        };

        HandleOutcome {
            reply,
            payload: Some(payload),
        }
    }
}
