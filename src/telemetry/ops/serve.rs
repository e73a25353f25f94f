use tracing::info_span;
use tracing::Span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Serve;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Bind }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::Bind => "bind" } }
    fn span(&self) -> Span { match self { Phase::Bind => info_span!("bind") } }
}

impl OpMarker for Serve {
    const NAME: &'static str = "serve";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("serve") }
}
