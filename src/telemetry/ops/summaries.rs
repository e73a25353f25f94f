use tracing::info_span;
use tracing::Span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Summaries;

#[derive(Copy, Clone, Debug)]
pub enum Phase { FetchFeed, FetchItem, Summarize, StoreRows }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::FetchFeed => "fetch_feed",
            Phase::FetchItem => "fetch_item",
            Phase::Summarize => "summarize",
            Phase::StoreRows => "store_rows",
        }
    }
    fn span(&self) -> Span {
        match self {
            Phase::FetchFeed => info_span!("fetch_feed"),
            Phase::FetchItem => info_span!("fetch_item"),
            Phase::Summarize => info_span!("summarize"),
            Phase::StoreRows => info_span!("store_rows"),
        }
    }
}

impl OpMarker for Summaries {
    const NAME: &'static str = "summaries";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("summaries") }
}
