// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Output side of a running pipeline
//!
//! The pipeline task pushes native chunks through a [`StreamEmitter`]; they
//! are transformed into public lines and sent to the HTTP handler over a
//! bounded channel. A closed channel means the client went away.

use tokio::sync::mpsc;

use super::classifier::ClassifiedError;
use super::progress::ProgressEvent;
use super::transform::ChunkTransformer;
use super::wire::{Annotation, DataChunk};
use crate::error::{RelayError, Result};

/// What the handler receives from the pipeline task
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
    /// One public protocol line, newline included
    Line(String),
    /// The request failed before any line was sent
    Failed(ClassifiedError),
}

/// Sends transformed output to the handler
pub struct StreamEmitter {
    tx: mpsc::Sender<PipelineOutput>,
    transformer: ChunkTransformer,
    started: bool,
}

impl StreamEmitter {
    /// Create an emitter and the receiving end for the handler
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PipelineOutput>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                transformer: ChunkTransformer::new(),
                started: false,
            },
            rx,
        )
    }

    /// Whether any line has been sent yet
    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// A handle whose `closed()` resolves when the client goes away
    pub fn closed_handle(&self) -> mpsc::Sender<PipelineOutput> {
        self.tx.clone()
    }

    pub async fn emit(&mut self, chunk: DataChunk) -> Result<()> {
        for line in self.transformer.push(chunk) {
            self.send_line(line).await?;
        }
        Ok(())
    }

    pub async fn annotate(&mut self, annotation: Annotation) -> Result<()> {
        self.emit(DataChunk::annotation(&annotation)).await
    }

    pub async fn progress(&mut self, event: ProgressEvent) -> Result<()> {
        self.annotate(Annotation::Progress(event)).await
    }

    /// Report a failure. Before the first line the handler turns it into a
    /// JSON error response; afterwards it goes in-band.
    pub async fn fail(&mut self, error: ClassifiedError) -> Result<()> {
        if !self.started {
            return self
                .tx
                .send(PipelineOutput::Failed(error))
                .await
                .map_err(|_| RelayError::Cancelled);
        }
        self.emit(DataChunk::error(&error.message)).await?;
        self.annotate(Annotation::Error(error)).await
    }

    /// Flush a reasoning run still open at end of stream
    pub async fn close(&mut self) -> Result<()> {
        for line in self.transformer.finish() {
            self.send_line(line).await?;
        }
        Ok(())
    }

    async fn send_line(&mut self, line: String) -> Result<()> {
        self.tx
            .send(PipelineOutput::Line(line))
            .await
            .map_err(|_| RelayError::Cancelled)?;
        self.started = true;
        Ok(())
    }
}
