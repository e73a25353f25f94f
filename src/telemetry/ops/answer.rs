use tracing::info_span;
use tracing::Span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Answer;

#[derive(Copy, Clone, Debug)]
pub enum Phase { RecordQuestion, Engine, RecordAnswer }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::RecordQuestion => "record_question",
            Phase::Engine => "engine",
            Phase::RecordAnswer => "record_answer",
        }
    }
    fn span(&self) -> Span {
        match self {
            Phase::RecordQuestion => info_span!("record_question"),
            Phase::Engine => info_span!("engine"),
            Phase::RecordAnswer => info_span!("record_answer"),
        }
    }
}

impl OpMarker for Answer {
    const NAME: &'static str = "answer";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("answer") }
}
