// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ordered middleware pipeline.
//!
//! ```text
//!   event ──> stage 0 ──next──> stage 1 ──next──> ... ──next──> terminal
//!                │                 │
//!                └─ return false   └─ return false      (event dropped)
//! ```
//!
//! Each stage receives the event and a [`Next`] continuation. Calling
//! [`Next::run`] hands the event to the following stage; returning without
//! calling it drops the event, and neither later stages nor the terminal run.

use crate::event::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(0);

/// One step of the pipeline.
///
/// # Returns
///
/// * `true` - the event reached the terminal
/// * `false` - the event was dropped by this stage or a later one
pub trait Stage: Send {
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool;
}

impl<F> Stage for F
where
    F: Fn(&mut Event, Next<'_>) -> bool + Send,
{
    fn handle(&self, event: &mut Event, next: Next<'_>) -> bool {
        self(event, next)
    }
}

/// Opaque token identifying a registered stage. Unique across pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle(u64);

impl StageHandle {
    fn allocate() -> Self {
        StageHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Continuation into the rest of the pipeline.
pub struct Next<'a> {
    remaining: &'a [(StageHandle, Box<dyn Stage>)],
    terminal: Box<dyn FnOnce(&mut Event) -> bool + 'a>,
}

impl Next<'_> {
    /// Runs the remaining stages, then the terminal.
    pub fn run(self, event: &mut Event) -> bool {
        match self.remaining.split_first() {
            Some(((_, stage), rest)) => stage.handle(
                event,
                Next {
                    remaining: rest,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(event),
        }
    }
}

#[derive(Default)]
pub struct Pipeline {
    stages: Vec<(StageHandle, Box<dyn Stage>)>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    pub fn pipe<S>(&mut self, stage: S) -> StageHandle
    where
        S: Stage + 'static,
    {
        let handle = StageHandle::allocate();
        self.stages.push((handle, Box::new(stage)));
        handle
    }

    /// Appends a closure stage.
    pub fn pipe_fn<F>(&mut self, stage: F) -> StageHandle
    where
        F: Fn(&mut Event, Next<'_>) -> bool + Send + 'static,
    {
        self.pipe(stage)
    }

    /// Inserts a stage immediately before the stage registered as `before`.
    /// Unknown handles append at the end.
    pub fn insert_before<S>(&mut self, stage: S, before: StageHandle) -> StageHandle
    where
        S: Stage + 'static,
    {
        let handle = StageHandle::allocate();
        match self.stages.iter().position(|(h, _)| *h == before) {
            Some(index) => self.stages.insert(index, (handle, Box::new(stage))),
            None => {
                debug!("Stage {:?} not found, appending new stage at the end", before);
                self.stages.push((handle, Box::new(stage)));
            }
        }
        handle
    }

    /// Runs `event` through every stage, ending with `terminal`.
    ///
    /// Returns whether the terminal ran and accepted the event.
    pub fn execute<'a, T>(&'a self, event: &mut Event, terminal: T) -> bool
    where
        T: FnOnce(&mut Event) -> bool + 'a,
    {
        Next {
            remaining: &self.stages,
            terminal: Box::new(terminal),
        }
        .run(event)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}
