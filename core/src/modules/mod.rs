pub mod summarizer;
pub mod supervisor;
pub mod zap;
