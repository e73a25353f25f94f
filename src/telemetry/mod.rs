pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

pub fn init() -> LogCtx<ops::init::Init> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn sync() -> LogCtx<ops::sync::Sync> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn documents() -> LogCtx<ops::documents::Documents> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn summaries() -> LogCtx<ops::summaries::Summaries> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn answer() -> LogCtx<ops::answer::Answer> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn serve() -> LogCtx<ops::serve::Serve> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
