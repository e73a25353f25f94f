pub mod answer;
pub mod documents;
pub mod init;
pub mod serve;
pub mod summaries;
pub mod sync;
