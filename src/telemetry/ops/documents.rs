use tracing::info_span;
use tracing::Span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Documents;

#[derive(Copy, Clone, Debug)]
pub enum Phase { FetchFeed, FetchItem, Reconcile, Replace }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::FetchFeed => "fetch_feed",
            Phase::FetchItem => "fetch_item",
            Phase::Reconcile => "reconcile",
            Phase::Replace => "replace",
        }
    }
    fn span(&self) -> Span {
        match self {
            Phase::FetchFeed => info_span!("fetch_feed"),
            Phase::FetchItem => info_span!("fetch_item"),
            Phase::Reconcile => info_span!("reconcile"),
            Phase::Replace => info_span!("replace"),
        }
    }
}

impl OpMarker for Documents {
    const NAME: &'static str = "documents";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("documents") }
}
