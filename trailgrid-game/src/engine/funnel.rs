//! Single-writer queue merging foreground and background position streams.
//!
//! Both streams feed one channel drained by the only [`TripSession`] writer. A fix
//! delivered by both streams reaches the filter twice and the second copy is
//! rejected as stale, so distance is never counted twice.
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::KvStore;
use crate::engine::event::EventSink;
use crate::engine::session::{IngestOutcome, TripError, TripSession};
use crate::filter::{FilterReject, PositionSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaggedSample {
    pub source: StreamSource,
    pub sample: PositionSample,
}

/// Counts from draining a funnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelReport {
    pub foreground: u32,
    pub background: u32,
    pub accepted: u32,
    pub rejected: u32,
    /// Rejections for samples not newer than the last accepted fix.
    pub duplicates: u32,
}

impl FunnelReport {
    fn record(&mut self, source: StreamSource, outcome: &IngestOutcome) {
        match source {
            StreamSource::Foreground => self.foreground += 1,
            StreamSource::Background => self.background += 1,
        }
        match outcome {
            IngestOutcome::Rejected(FilterReject::Stale { .. }) => {
                self.rejected += 1;
                self.duplicates += 1;
            }
            IngestOutcome::Rejected(_) => self.rejected += 1,
            IngestOutcome::Anchored { .. } | IngestOutcome::Moved { .. } => self.accepted += 1,
        }
    }
}

/// Producer side handed to one sensor stream.
#[derive(Debug, Clone)]
pub struct FunnelHandle {
    source: StreamSource,
    tx: Sender<TaggedSample>,
}

impl FunnelHandle {
    /// Queue a sample. Returns `false` once the funnel has been drained and dropped.
    pub fn send(&self, sample: PositionSample) -> bool {
        self.tx
            .send(TaggedSample {
                source: self.source,
                sample,
            })
            .is_ok()
    }

    #[must_use]
    pub const fn source(&self) -> StreamSource {
        self.source
    }
}

#[derive(Debug)]
pub struct SampleFunnel {
    tx: Sender<TaggedSample>,
    rx: Receiver<TaggedSample>,
}

impl Default for SampleFunnel {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleFunnel {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    #[must_use]
    pub fn handle(&self, source: StreamSource) -> FunnelHandle {
        FunnelHandle {
            source,
            tx: self.tx.clone(),
        }
    }

    /// Ingest whatever is queued right now without blocking.
    ///
    /// # Errors
    ///
    /// Stops at the first `TripError`; later samples stay queued.
    pub fn pump<S, E>(
        &self,
        session: &mut TripSession<S>,
        sink: &mut E,
    ) -> Result<FunnelReport, TripError>
    where
        S: KvStore,
        E: EventSink + ?Sized,
    {
        let mut report = FunnelReport::default();
        for tagged in self.rx.try_iter() {
            let outcome = session.ingest(&tagged.sample, sink)?;
            report.record(tagged.source, &outcome);
        }
        Ok(report)
    }

    /// Block until every handle is dropped, ingesting samples in arrival order.
    ///
    /// # Errors
    ///
    /// Stops at the first `TripError`.
    pub fn drain_into<S, E>(
        self,
        session: &mut TripSession<S>,
        sink: &mut E,
    ) -> Result<FunnelReport, TripError>
    where
        S: KvStore,
        E: EventSink + ?Sized,
    {
        let Self { tx, rx } = self;
        drop(tx);
        let mut report = FunnelReport::default();
        for tagged in rx {
            let outcome = session.ingest(&tagged.sample, sink)?;
            report.record(tagged.source, &outcome);
        }
        log::debug!(
            "funnel drained: {} accepted, {} duplicates",
            report.accepted,
            report.duplicates
        );
        Ok(report)
    }
}

/// Tokio flavour of [`SampleFunnel`] for hosts whose sensor callbacks are async.
#[cfg(feature = "async")]
pub mod tokio_funnel {
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

    use super::{FunnelReport, StreamSource, TaggedSample};
    use crate::KvStore;
    use crate::engine::event::EventSink;
    use crate::engine::session::{TripError, TripSession};
    use crate::filter::PositionSample;

    #[derive(Debug, Clone)]
    pub struct AsyncFunnelHandle {
        source: StreamSource,
        tx: UnboundedSender<TaggedSample>,
    }

    impl AsyncFunnelHandle {
        pub fn send(&self, sample: PositionSample) -> bool {
            self.tx
                .send(TaggedSample {
                    source: self.source,
                    sample,
                })
                .is_ok()
        }
    }

    #[derive(Debug)]
    pub struct AsyncSampleFunnel {
        tx: UnboundedSender<TaggedSample>,
        rx: UnboundedReceiver<TaggedSample>,
    }

    impl Default for AsyncSampleFunnel {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AsyncSampleFunnel {
        #[must_use]
        pub fn new() -> Self {
            let (tx, rx) = unbounded_channel();
            Self { tx, rx }
        }

        #[must_use]
        pub fn handle(&self, source: StreamSource) -> AsyncFunnelHandle {
            AsyncFunnelHandle {
                source,
                tx: self.tx.clone(),
            }
        }

        /// Await samples until every handle is dropped.
        ///
        /// # Errors
        ///
        /// Stops at the first `TripError`.
        pub async fn drain_into<S, E>(
            self,
            session: &mut TripSession<S>,
            sink: &mut E,
        ) -> Result<FunnelReport, TripError>
        where
            S: KvStore,
            E: EventSink + ?Sized,
        {
            let Self { tx, mut rx } = self;
            drop(tx);
            let mut report = FunnelReport::default();
            while let Some(tagged) = rx.recv().await {
                let outcome = session.ingest(&tagged.sample, sink)?;
                report.record(tagged.source, &outcome);
            }
            Ok(report)
        }
    }

}
