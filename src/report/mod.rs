//! Output of agent runs: live terminal rendering and session transcripts.

pub mod presenter;
pub mod transcript;

pub use presenter::StepPresenter;
pub use transcript::{generate_json_transcript, generate_markdown_transcript, Exchange, Transcript};
