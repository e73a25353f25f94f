use tracing::info_span;
use tracing::Span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Sync;

#[derive(Copy, Clone, Debug)]
pub enum Phase { FetchFeed, KnownIds, FetchItem, Summarize, WriteSummary, Reconcile }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::FetchFeed => "fetch_feed",
            Phase::KnownIds => "known_ids",
            Phase::FetchItem => "fetch_item",
            Phase::Summarize => "summarize",
            Phase::WriteSummary => "write_summary",
            Phase::Reconcile => "reconcile",
        }
    }
    fn span(&self) -> Span {
        match self {
            Phase::FetchFeed => info_span!("fetch_feed"),
            Phase::KnownIds => info_span!("known_ids"),
            Phase::FetchItem => info_span!("fetch_item"),
            Phase::Summarize => info_span!("summarize"),
            Phase::WriteSummary => info_span!("write_summary"),
            Phase::Reconcile => info_span!("reconcile"),
        }
    }
}

impl OpMarker for Sync {
    const NAME: &'static str = "sync";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("sync") }
}
