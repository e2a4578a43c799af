//! # Telemetry Pipeline
//!
//! The single driving loop: pull a frame, transform it, hand the updates to the
//! publisher. Recoverable frame errors are logged and skipped; the loop only
//! ends when the byte source is gone.

use crate::ams::decoder::FrameDecoder;
use crate::error::AmsError;
use crate::publisher::Publisher;
use crate::telemetry::Telemetry;
use log::{debug, error, warn};

/// Counters kept by the pipeline for the exit log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_decoded: u64,
    pub frames_discarded: u64,
    pub updates_queued: u64,
    pub updates_dropped: u64,
}

pub struct Pipeline {
    decoder: FrameDecoder,
    telemetry: Telemetry,
    verbose: bool,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(decoder: FrameDecoder, telemetry: Telemetry, verbose: bool) -> Self {
        Pipeline {
            decoder,
            telemetry,
            verbose,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Runs until a fatal error and returns it.
    pub async fn run(&mut self, publisher: &Publisher) -> AmsError {
        loop {
            let message = match self.decoder.next().await {
                Ok(message) => message,
                Err(e) if e.is_fatal() => {
                    error!("{}", e);
                    return e;
                }
                Err(e) => {
                    self.stats.frames_discarded += 1;
                    error!("{}", e);
                    continue;
                }
            };
            self.stats.frames_decoded += 1;
            debug!("decoded {} message", message.kind());

            for update in self.telemetry.process(&message) {
                match publisher.publish(&update).await {
                    Ok(()) => self.stats.updates_queued += 1,
                    Err(e) => {
                        self.stats.updates_dropped += 1;
                        error!("Dropped update for sensor {}: {}", update.idx, e);
                    }
                }
            }

            if self.verbose {
                match serde_json::to_string(&message) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Couldn't render {} message: {}", message.kind(), e),
                }
            }
        }
    }
}
